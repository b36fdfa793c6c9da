use std::time::Instant;

use crate::portal::PortalClient;

/// State shared by every request handler.
pub struct AppState {
    /// The portal facade, which owns the session store
    pub client: PortalClient,
    /// When the server started, for the health endpoint
    pub started_at: Instant,
}

impl AppState {
    pub fn new(client: PortalClient) -> Self {
        Self {
            client,
            started_at: Instant::now(),
        }
    }
}
