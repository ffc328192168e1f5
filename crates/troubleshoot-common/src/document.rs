/// Schemaless documents as they are kept by the store backends.
///
/// A document is a JSON object carrying a store-owned `_id` plus `created_at` / `updated_at`
/// timestamps. Everything else is whatever the client submitted.
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::error::CommonError;

pub type Document = Map<String, Value>;

/// Store-internal identifier field.
pub const ID_FIELD: &str = "_id";

/// Fields owned by the store. Client-supplied values for these are dropped on insert;
/// `id` is reserved because listings expose `_id` under that name.
const RESERVED_FIELDS: [&str; 4] = [ID_FIELD, "id", "created_at", "updated_at"];

static DOCUMENT_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Build a new document from a client payload: assigns a fresh `_id` and stamps both
/// timestamps with the current UTC time.
///
/// Fails with `InvalidDocument` if the payload does not serialize to a JSON object.
pub fn new_document<T: Serialize>(payload: &T) -> Result<Document, CommonError> {
    let Value::Object(mut doc) = serde_json::to_value(payload)? else {
        return Err(CommonError::InvalidDocument(
            "payload must serialize to a JSON object".to_string(),
        ));
    };

    for field in RESERVED_FIELDS {
        doc.remove(field);
    }

    let now = serde_json::to_value(Utc::now())?;
    doc.insert(ID_FIELD.to_string(), Value::String(new_document_id()));
    doc.insert("created_at".to_string(), now.clone());
    doc.insert("updated_at".to_string(), now);
    Ok(doc)
}

/// Returns the store-internal id of a document, if present.
pub fn document_id(doc: &Document) -> Option<&str> {
    doc.get(ID_FIELD).and_then(Value::as_str)
}

/// Move the internal `_id` to the public `id` field.
pub fn expose_id(mut doc: Document) -> Result<Document, CommonError> {
    let id = match doc.remove(ID_FIELD) {
        Some(Value::String(id)) => id,
        Some(other) => other.to_string(),
        None => {
            return Err(CommonError::InvalidDocument(
                "stored document has no _id".to_string(),
            ))
        }
    };
    doc.insert("id".to_string(), Value::String(id));
    Ok(doc)
}

/// 24 lowercase hex characters, the width of a document-database object id.
pub fn new_document_id() -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0));
    let counter = DOCUMENT_COUNTER.fetch_add(1, Ordering::Relaxed);
    let pid = std::process::id();

    let mut h = Sha256::new();
    h.update(now.as_nanos().to_le_bytes());
    h.update(pid.to_le_bytes());
    h.update(counter.to_le_bytes());
    let digest = h.finalize();
    hex_lower(&digest[..12])
}

fn hex_lower(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        out.push(HEX[(b >> 4) as usize] as char);
        out.push(HEX[(b & 0x0f) as usize] as char);
    }
    out
}
