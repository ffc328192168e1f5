/// Redis-backed document store.
///
/// Documents are grouped into collections under a database namespace. Unlike a cache, every
/// operation reports failure to the caller: a report that was not written must not look saved.
///
/// Key schema:
/// - `{database}:{collection}:doc:{id}` — JSON-serialized document, including `_id`
/// - `{database}:{collection}:order` — list of ids in insertion order
use std::collections::BTreeSet;

use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tracing::{debug, warn};

use crate::document::{document_id, Document};
use crate::error::CommonError;

const FETCH_BATCH: isize = 100;
const SCAN_COUNT: usize = 100;

pub struct RedisDocumentStore {
    client: redis::Client,
    database: String,
}

impl RedisDocumentStore {
    /// Create a client for `url`. No connection is made until the first operation.
    pub fn open(url: &str, database: &str) -> Result<Self, CommonError> {
        let client = redis::Client::open(url)
            .inspect_err(|e| warn!(error = %e, "failed to create redis client"))?;
        Ok(Self {
            client,
            database: database.to_string(),
        })
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    async fn connection(&self) -> Result<MultiplexedConnection, CommonError> {
        let conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .inspect_err(|e| warn!(error = %e, "redis connection failed"))?;
        Ok(conn)
    }

    /// Round-trip a PING.
    pub async fn ping(&self) -> Result<(), CommonError> {
        let mut conn = self.connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    /// Store a document built by [`crate::document::new_document`] and return its id.
    ///
    /// The document body and its position in the insertion index are written in one
    /// MULTI/EXEC block.
    pub async fn insert(&self, collection: &str, doc: &Document) -> Result<String, CommonError> {
        let id = document_id(doc)
            .ok_or_else(|| CommonError::InvalidDocument("document has no _id".to_string()))?
            .to_string();
        let raw = serde_json::to_string(doc)?;

        let mut conn = self.connection().await?;
        redis::pipe()
            .atomic()
            .set(doc_key(&self.database, collection, &id), raw)
            .ignore()
            .rpush(order_key(&self.database, collection), &id)
            .ignore()
            .query_async::<()>(&mut conn)
            .await
            .inspect_err(|e| warn!(error = %e, collection, "redis insert failed"))?;

        debug!(collection, id = %id, "document inserted");
        Ok(id)
    }

    /// Walk `collection` in insertion order and keep what `select` maps to `Some`.
    ///
    /// Only kept values count toward `limit`; `None` returns every one. Documents that
    /// fail to parse are skipped with a warning; ids whose body has gone missing are
    /// skipped silently.
    pub async fn find_map<T, F>(
        &self,
        collection: &str,
        mut select: F,
        limit: Option<usize>,
    ) -> Result<Vec<T>, CommonError>
    where
        F: FnMut(&Document) -> Option<T>,
    {
        let mut conn = self.connection().await?;
        let order = order_key(&self.database, collection);
        let mut found = Vec::new();
        let mut start: isize = 0;

        loop {
            let ids: Vec<String> = conn.lrange(&order, start, start + FETCH_BATCH - 1).await?;
            if ids.is_empty() {
                break;
            }
            start += ids.len() as isize;

            let keys: Vec<String> = ids
                .iter()
                .map(|id| doc_key(&self.database, collection, id))
                .collect();
            let bodies: Vec<Option<String>> =
                redis::cmd("MGET").arg(&keys).query_async(&mut conn).await?;

            if select_batch(collection, bodies, &mut select, limit, &mut found) {
                break;
            }
        }

        Ok(found)
    }

    /// Names of the collections present in this database, sorted, at most `limit`.
    /// Uses SCAN (not KEYS, which blocks).
    pub async fn collection_names(&self, limit: usize) -> Result<Vec<String>, CommonError> {
        let mut conn = self.connection().await?;
        let pattern = format!("{}:*", self.database);
        let mut names = BTreeSet::new();
        let mut cursor: u64 = 0;

        loop {
            let (next_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_COUNT)
                .query_async(&mut conn)
                .await
                .inspect_err(|e| warn!(error = %e, pattern, "redis SCAN failed"))?;

            names.extend(
                keys.iter()
                    .filter_map(|k| collection_of(&self.database, k))
                    .map(str::to_string),
            );

            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }

        Ok(names.into_iter().take(limit).collect())
    }
}

/// Parse one MGET reply and push the selected values onto `found`.
/// Returns true once `limit` is reached.
fn select_batch<T, F>(
    collection: &str,
    bodies: Vec<Option<String>>,
    select: &mut F,
    limit: Option<usize>,
    found: &mut Vec<T>,
) -> bool
where
    F: FnMut(&Document) -> Option<T>,
{
    for raw in bodies.into_iter().flatten() {
        let doc: Document = match serde_json::from_str(&raw) {
            Ok(doc) => doc,
            Err(e) => {
                warn!(error = %e, collection, "skipping unreadable document");
                continue;
            }
        };
        if let Some(value) = select(&doc) {
            found.push(value);
            if limit.is_some_and(|n| found.len() >= n) {
                return true;
            }
        }
    }
    false
}

fn doc_key(database: &str, collection: &str, id: &str) -> String {
    format!("{database}:{collection}:doc:{id}")
}

fn order_key(database: &str, collection: &str) -> String {
    format!("{database}:{collection}:order")
}

/// Extract the collection segment from a key in `database`'s namespace.
fn collection_of<'a>(database: &str, key: &'a str) -> Option<&'a str> {
    let rest = key.strip_prefix(database)?.strip_prefix(':')?;
    let (collection, _) = rest.split_once(':')?;
    (!collection.is_empty()).then_some(collection)
}
