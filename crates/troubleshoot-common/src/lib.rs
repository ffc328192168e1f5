pub mod document;
pub mod error;
pub mod http_api;
pub mod redis;
