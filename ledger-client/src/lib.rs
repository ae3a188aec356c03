#![deny(clippy::string_slice)]
//! Client-side substrate for the shared-expense ledger app.
//!
//! The server owns every number (splits, balances, settlements). This crate
//! keeps a local view of what it last said and makes sure that view is never
//! shown as current after a write could have changed it:
//!
//! - [`session::SessionManager`] holds the token and the login state machine.
//! - [`gateway::Gateway`] is the only path to the network. It attaches the
//!   token and turns a 401 into a logout.
//! - [`cache::EntityCache`] stores fetched entities with one load per key in
//!   flight.
//! - [`mutation::MutationCoordinator`] performs writes and applies the
//!   [`invalidation::InvalidationGraph`] before handing back the result.
//!
//! [`Client`] wires one of each together and exposes the typed endpoints.
pub mod api;
pub mod cache;
pub mod config;
pub mod gateway;
pub mod invalidation;
pub mod mutation;
pub mod session;
pub mod token_store;
pub mod transport;

use std::sync::{Arc, LazyLock};

pub use cache::{CacheKey, EntityCache, Freshness};
pub use config::{ClientConfig, ConfigError};
pub use gateway::{Gateway, GatewayError, GatewayErrorKind};
pub use invalidation::{AffectedIds, InvalidationGraph, MutationDescriptor, MutationKind};
pub use mutation::MutationCoordinator;
pub use session::{
    ListenerKey, SessionError, SessionEvent, SessionManager, SessionState, SignOutReason,
};
pub use token_store::{FileTokenStore, MemoryTokenStore, StorageError, TokenStore};
pub use transport::{ReqwestTransport, Transport, TransportError};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("failed to decode entity: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ClientError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ClientError::Gateway(e) if e.is_unauthorized())
    }
}

// putting this inside LOGGER prevents us from accidentally initializing the logger more than once
static LOGGER: LazyLock<()> = LazyLock::new(|| {
    if env_logger::try_init().is_ok() {
        log::info!("Logging initialized");
    }
});

/// Installs `env_logger` unless something already set a logger.
pub fn init_logging() {
    LazyLock::force(&LOGGER);
}

pub struct Client {
    session: Arc<SessionManager>,
    gateway: Arc<Gateway>,
    cache: Arc<EntityCache>,
    mutations: MutationCoordinator,
}

impl Client {
    pub fn new(
        config: &ClientConfig,
        transport: Arc<dyn Transport>,
        token_store: Arc<dyn TokenStore>,
    ) -> Self {
        let cache = Arc::new(EntityCache::new(config.stale_after));

        let purge_target = Arc::clone(&cache);
        let session = Arc::new(SessionManager::new(token_store, move || {
            purge_target.purge_all()
        }));

        let gateway = Arc::new(Gateway::new(config, transport, Arc::clone(&session)));
        let mutations = MutationCoordinator::new(Arc::clone(&cache));

        Self {
            session,
            gateway,
            cache,
            mutations,
        }
    }

    /// Same as [`Client::new`] with the reqwest transport and the configured timeout.
    pub fn with_reqwest(
        config: &ClientConfig,
        token_store: Arc<dyn TokenStore>,
    ) -> Result<Self, TransportError> {
        let transport = ReqwestTransport::new(config.request_timeout)?;
        Ok(Self::new(config, Arc::new(transport), token_store))
    }

    /// Reads the stored token. Call once at startup.
    pub async fn initialize(&self) -> SessionState {
        self.session.initialize().await
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    pub fn gateway(&self) -> &Arc<Gateway> {
        &self.gateway
    }

    pub fn cache(&self) -> &Arc<EntityCache> {
        &self.cache
    }

    pub fn mutations(&self) -> &MutationCoordinator {
        &self.mutations
    }
}
