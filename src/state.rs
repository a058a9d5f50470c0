use std::sync::Arc;

use crate::auth::Verifier;
use crate::database::{Connection, ConnectionManager, DatabaseError};

/// Long-lived resources shared by every request
#[derive(Clone)]
pub struct AppState {
    pub connections: Arc<ConnectionManager>,
    pub verifier: Verifier,
}

impl AppState {
    pub fn new(connections: ConnectionManager, verifier: Verifier) -> Self {
        Self {
            connections: Arc::new(connections),
            verifier,
        }
    }

    /// Shorthand for `connections.get()`
    pub async fn db(&self) -> Result<Connection, DatabaseError> {
        self.connections.get().await
    }
}
