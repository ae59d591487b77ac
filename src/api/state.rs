//! Application state for the API server

use crate::api::auth::InitDataVerifier;
use crate::{Config, MediaRelay};
use std::sync::Arc;

/// Shared application state accessible to all route handlers
///
/// Cloned for each request (cheap Arc clone).
#[derive(Clone)]
pub struct AppState {
    /// The relay jobs are submitted to
    pub relay: Arc<MediaRelay>,

    /// Configuration (read-only)
    pub config: Arc<Config>,

    /// initData checker for the configured bot, if a token is set
    pub init_data: Option<Arc<InitDataVerifier>>,
}

impl AppState {
    /// Create a new AppState
    pub fn new(
        relay: Arc<MediaRelay>,
        config: Arc<Config>,
        init_data: Option<Arc<InitDataVerifier>>,
    ) -> Self {
        Self {
            relay,
            config,
            init_data,
        }
    }
}
