use std::sync::Arc;

use arbor_engine::ConversationService;

use crate::config::Config;

/// Shared application state passed to all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub service: Arc<ConversationService>,
}

impl AppState {
    pub fn new(config: Config, service: ConversationService) -> Self {
        Self {
            config: Arc::new(config),
            service: Arc::new(service),
        }
    }
}
