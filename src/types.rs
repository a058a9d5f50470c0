/// Shared types used across the codebase

use serde::Serialize;
use serde_json::{Map, Value};

/// Document collections owned by this service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Movies,
    WatchList,
}

impl Collection {
    pub fn name(&self) -> &'static str {
        match self {
            Collection::Movies => "movies",
            Collection::WatchList => "watchList",
        }
    }
}

/// Authenticated subject derived from a verified bearer token.
/// Lives only for the duration of one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Identity {
    pub uid: String,
    pub email: Option<String>,
    pub claims: Map<String, Value>,
}

impl Identity {
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            email: None,
            claims: Map::new(),
        }
    }

    /// True when `owner` names this identity
    pub fn owns(&self, owner: &str) -> bool {
        self.uid == owner
    }
}
