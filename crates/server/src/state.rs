use std::sync::Arc;

use hibiki_core::{Authenticator, Config, Orchestrator, ProgressBroadcaster, SanitizedConfig};

/// Shared application state
pub struct AppState {
    config: Config,
    authenticator: Arc<dyn Authenticator>,
    orchestrator: Arc<Orchestrator>,
}

impl AppState {
    pub fn new(
        config: Config,
        authenticator: Arc<dyn Authenticator>,
        orchestrator: Arc<Orchestrator>,
    ) -> Self {
        Self {
            config,
            authenticator,
            orchestrator,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn authenticator(&self) -> &dyn Authenticator {
        self.authenticator.as_ref()
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        self.orchestrator.as_ref()
    }

    pub fn broadcaster(&self) -> &ProgressBroadcaster {
        self.orchestrator.broadcaster()
    }
}
