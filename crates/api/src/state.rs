//! Application state

use std::sync::Arc;

use helpdesk_shared::{Clock, ConversationStore};

use crate::auth::{AuthState, TokenVerifier};
use crate::config::Config;
use crate::realtime::EventHub;
use crate::support::SupportEngine;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub engine: Arc<SupportEngine>,
    pub hub: EventHub,
    pub verifier: Arc<dyn TokenVerifier>,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn ConversationStore>,
        verifier: Arc<dyn TokenVerifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let hub = EventHub::new();
        let engine = SupportEngine::new(store, hub.clone(), clock, config.sla_policy())
            .with_risk_window(config.risk_window())
            .with_max_page_size(config.list_max_page_size);

        Self {
            config: Arc::new(config),
            engine: Arc::new(engine),
            hub,
            verifier,
        }
    }

    /// Get auth state for middleware
    pub fn auth_state(&self) -> AuthState {
        AuthState {
            verifier: self.verifier.clone(),
        }
    }
}
