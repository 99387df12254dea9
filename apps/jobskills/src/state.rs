use std::sync::Arc;

use tracing::info;

use crate::api_client::{ApiTransport, HttpTransport};
use crate::associations::{AssociationController, AssociationStore};
use crate::config::Config;
use crate::errors::ApiError;
use crate::skills::SkillResolver;

/// Everything one client session owns. Built once at session start and
/// dropped at session end; nothing here lives in process-wide state.
#[derive(Clone)]
pub struct Session {
    pub config: Config,
    pub api: Arc<dyn ApiTransport>,
    pub resolver: SkillResolver,
    pub store: AssociationStore,
    pub controller: AssociationController,
}

impl Session {
    /// Session against the configured backend over HTTP.
    pub fn connect(config: Config) -> Result<Self, ApiError> {
        let api: Arc<dyn ApiTransport> = Arc::new(HttpTransport::from_config(&config)?);
        info!("API client initialized (base: {})", config.api_base_url);
        Ok(Self::with_transport(config, api))
    }

    /// Session over any transport.
    pub fn with_transport(config: Config, api: Arc<dyn ApiTransport>) -> Self {
        let resolver = SkillResolver::new(api.clone());
        let store = AssociationStore::new(api.clone(), resolver.clone());
        let controller = AssociationController::new(store.clone());
        Self {
            config,
            api,
            resolver,
            store,
            controller,
        }
    }
}
