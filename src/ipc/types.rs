use std::path::PathBuf;
use std::time::Duration;

use crate::cache::{MemoryCache, MetricsCache, DEFAULT_TTL};
use rusqlite::Connection;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    /// Injected so dashboards work unchanged against a disabled cache.
    pub cache: Box<dyn MetricsCache>,
    pub cache_ttl: Duration,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            workspace: None,
            db: None,
            cache: Box::new(MemoryCache::new()),
            cache_ttl: DEFAULT_TTL,
        }
    }
}
