//! Server application state shared across handlers

use std::sync::Arc;

use crate::cms::CmsBackend;
use crate::storage::Storage;

/// Shared state for the server: storage, the CMS adapter, and the secret
/// gating the cron endpoint.
#[derive(Clone)]
pub struct ServerAppState {
    pub storage: Storage,
    pub cms: Arc<dyn CmsBackend>,
    /// Shared secret for `/api/cron/backup`, compared timing-safely
    pub cron_secret: Arc<String>,
}

impl ServerAppState {
    pub fn new(storage: Storage, cms: Arc<dyn CmsBackend>, cron_secret: String) -> Self {
        Self {
            storage,
            cms,
            cron_secret: Arc::new(cron_secret),
        }
    }
}
