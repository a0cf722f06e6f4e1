/// Board, roster and turn rules of a match.
pub mod game;
/// Connection groups keyed by match code.
pub mod groups;
/// Registry of live matches.
pub mod registry;
/// Match lifecycle state machine.
pub mod state_machine;
/// Lifecycle transitions persisted under the match guard.
pub mod transitions;
/// Role-based projection of card colors.
pub mod visibility;

use std::{sync::Arc, time::Duration};

use tokio::sync::{RwLock, watch};
use uuid::Uuid;

use crate::{
    auth::SecurityConfig,
    config::AppConfig,
    dao::match_store::MatchStore,
    error::ServiceError,
    relay::RelayPublisher,
};

pub use self::groups::{ClientConnection, GroupHub};
pub use self::registry::{MatchHandle, SessionRegistry};
pub use self::state_machine::{AbortError, ApplyError, Plan, PlanError, PlanId};

/// Application state shared across handlers and tasks.
pub type SharedState = Arc<AppState>;

/// Central application state: live matches, connection groups, storage and relay handles.
pub struct AppState {
    config: Arc<AppConfig>,
    security: SecurityConfig,
    instance_id: Uuid,
    registry: SessionRegistry,
    groups: GroupHub,
    match_store: RwLock<Option<Arc<dyn MatchStore>>>,
    degraded: watch::Sender<bool>,
    relay: RelayPublisher,
    transition_timeout: Option<Duration>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(
        config: AppConfig,
        security: SecurityConfig,
        instance_id: Uuid,
        relay: RelayPublisher,
    ) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        let transition_timeout = config.transition_timeout();
        Arc::new(Self {
            config: Arc::new(config),
            security,
            instance_id,
            registry: SessionRegistry::new(),
            groups: GroupHub::new(),
            match_store: RwLock::new(None),
            degraded: degraded_tx,
            relay,
            transition_timeout,
        })
    }

    /// Loaded application configuration.
    pub fn config(&self) -> Arc<AppConfig> {
        self.config.clone()
    }

    /// Token verification settings.
    pub fn security(&self) -> &SecurityConfig {
        &self.security
    }

    /// Identifier of this process in relay envelopes.
    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    /// Live matches keyed by join code.
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Connections attached to each match.
    pub fn groups(&self) -> &GroupHub {
        &self.groups
    }

    /// Queue used to publish match events to the broker.
    pub fn relay(&self) -> &RelayPublisher {
        &self.relay
    }

    /// Bound applied to storage work inside lifecycle transitions.
    pub fn transition_timeout(&self) -> Option<Duration> {
        self.transition_timeout
    }

    /// Obtain a handle to the current match store, if one is installed.
    pub async fn match_store(&self) -> Option<Arc<dyn MatchStore>> {
        let guard = self.match_store.read().await;
        guard.as_ref().cloned()
    }

    /// Install a new match store implementation and leave degraded mode.
    pub async fn install_match_store(&self, store: Arc<dyn MatchStore>) {
        {
            let mut guard = self.match_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false).await;
    }

    /// Remove the current match store and enter degraded mode.
    pub async fn clear_match_store(&self) {
        {
            let mut guard = self.match_store.write().await;
            guard.take();
        }
        self.update_degraded(true).await;
    }

    /// Current degraded flag.
    pub async fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub async fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        });
    }

    /// Match store usable right now, or [`ServiceError::Degraded`].
    pub async fn require_match_store(&self) -> Result<Arc<dyn MatchStore>, ServiceError> {
        if self.is_degraded().await {
            return Err(ServiceError::Degraded);
        }
        self.match_store().await.ok_or(ServiceError::Degraded)
    }
}
