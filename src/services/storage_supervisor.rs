//! Keeps a match store installed for the lifetime of the process.
//!
//! A store that fails its health check switches the instance to degraded
//! mode until a reconnect succeeds. When every reconnect attempt fails the
//! store is dropped and a fresh connection is made.

use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::{sleep, timeout};
use tracing::{info, warn};

use crate::{
    dao::{
        match_store::MatchStore,
        storage::{StorageError, StorageResult},
    },
    state::{AppState, SharedState},
};

const FIRST_RETRY_DELAY: Duration = Duration::from_millis(1_000);
const MAX_RETRY_DELAY: Duration = Duration::from_secs(10);
const POLL_INTERVAL: Duration = Duration::from_secs(5);
const RECONNECT_ATTEMPTS: u32 = 3;

/// Doubling delay between attempts, capped at [`MAX_RETRY_DELAY`].
struct Backoff {
    next: Duration,
}

impl Backoff {
    fn new() -> Self {
        Self {
            next: FIRST_RETRY_DELAY,
        }
    }

    async fn wait(&mut self) {
        sleep(self.next).await;
        self.next = (self.next * 2).min(MAX_RETRY_DELAY);
    }
}

/// Connect through `connect`, install the store, and keep it healthy forever.
pub async fn run<F, Fut>(state: SharedState, mut connect: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Arc<dyn MatchStore>, StorageError>> + Send,
{
    let mut backoff = Backoff::new();

    loop {
        match connect().await {
            Ok(store) => {
                state.install_match_store(store.clone()).await;
                info!(
                    live_matches = state.registry().count(),
                    "match store connected; leaving degraded mode"
                );
                backoff = Backoff::new();

                watch(&state, store.as_ref()).await;

                state.clear_match_store().await;
                warn!(
                    live_matches = state.registry().count(),
                    "match store unrecoverable; dropped it and reconnecting"
                );
            }
            Err(err) => warn!(error = %err, "match store connection failed"),
        }
        backoff.wait().await;
    }
}

/// Poll `store` until it cannot be recovered.
async fn watch(state: &AppState, store: &dyn MatchStore) {
    loop {
        match bounded(state, "health check", store.health_check()).await {
            Ok(()) => {
                if state.is_degraded().await {
                    info!("match store healthy again; leaving degraded mode");
                    state.update_degraded(false).await;
                }
            }
            Err(err) => {
                warn!(
                    error = %err,
                    live_matches = state.registry().count(),
                    "match store health check failed; entering degraded mode"
                );
                state.update_degraded(true).await;
                if !reconnect(state, store).await {
                    return;
                }
            }
        }
        sleep(POLL_INTERVAL).await;
    }
}

/// Returns `false` once every attempt failed.
async fn reconnect(state: &AppState, store: &dyn MatchStore) -> bool {
    let mut backoff = Backoff::new();
    for attempt in 1..=RECONNECT_ATTEMPTS {
        match bounded(state, "reconnect", store.try_reconnect()).await {
            Ok(()) => {
                info!(attempt, "match store reconnected; leaving degraded mode");
                state.update_degraded(false).await;
                return true;
            }
            Err(err) => {
                warn!(attempt, error = %err, "match store reconnect failed");
                backoff.wait().await;
            }
        }
    }
    false
}

/// Bound a storage check by the lifecycle transition timeout.
async fn bounded<Fut>(state: &AppState, operation: &str, check: Fut) -> StorageResult<()>
where
    Fut: Future<Output = StorageResult<()>>,
{
    let Some(limit) = state.transition_timeout() else {
        return check.await;
    };
    match timeout(limit, check).await {
        Ok(result) => result,
        Err(elapsed) => Err(StorageError::unavailable(
            format!("{operation} timed out"),
            elapsed,
        )),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    use futures::future::{self, BoxFuture};
    use uuid::Uuid;

    use super::*;
    use crate::{
        auth::SecurityConfig, config::AppConfig, dao::models::MatchEntity,
        relay::RelayPublisher,
    };

    /// Store whose health follows a flag; a hung store never answers.
    struct FlakyStore {
        healthy: Arc<AtomicBool>,
        hung: bool,
    }

    impl FlakyStore {
        fn answer(&self) -> BoxFuture<'static, StorageResult<()>> {
            if self.hung {
                return Box::pin(future::pending());
            }
            let healthy = self.healthy.load(Ordering::SeqCst);
            Box::pin(async move {
                if healthy {
                    Ok(())
                } else {
                    Err(StorageError::unavailable(
                        "ping",
                        std::io::Error::other("unreachable"),
                    ))
                }
            })
        }
    }

    impl MatchStore for FlakyStore {
        fn save_match(&self, _game: MatchEntity) -> BoxFuture<'static, StorageResult<()>> {
            self.answer()
        }

        fn find_match(
            &self,
            _code: String,
        ) -> BoxFuture<'static, StorageResult<Option<MatchEntity>>> {
            Box::pin(async { Ok(None) })
        }

        fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
            self.answer()
        }

        fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
            self.answer()
        }
    }

    fn state(transition_timeout: Option<Duration>) -> SharedState {
        AppState::new(
            AppConfig::default().with_transition_timeout(transition_timeout),
            SecurityConfig::from_secret("secret"),
            Uuid::new_v4(),
            RelayPublisher::disabled(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn failing_health_checks_toggle_degraded_mode() {
        let state = state(None);
        let healthy = Arc::new(AtomicBool::new(true));
        let store = Arc::new(FlakyStore {
            healthy: healthy.clone(),
            hung: false,
        });

        let supervisor = tokio::spawn(run(state.clone(), move || {
            let store = store.clone();
            async move { Ok(store as Arc<dyn MatchStore>) }
        }));

        let mut degraded = state.degraded_watcher();
        degraded.wait_for(|degraded| !*degraded).await.unwrap();

        healthy.store(false, Ordering::SeqCst);
        degraded.wait_for(|degraded| *degraded).await.unwrap();
        assert!(state.require_match_store().await.is_err());

        healthy.store(true, Ordering::SeqCst);
        degraded.wait_for(|degraded| !*degraded).await.unwrap();
        assert!(state.require_match_store().await.is_ok());

        supervisor.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn hung_store_is_dropped_and_reconnected() {
        let state = state(Some(Duration::from_millis(200)));
        let connects = Arc::new(AtomicU32::new(0));

        let supervisor = tokio::spawn(run(state.clone(), {
            let connects = connects.clone();
            move || {
                let attempt = connects.fetch_add(1, Ordering::SeqCst);
                async move {
                    let store = FlakyStore {
                        healthy: Arc::new(AtomicBool::new(true)),
                        hung: attempt == 0,
                    };
                    Ok(Arc::new(store) as Arc<dyn MatchStore>)
                }
            }
        }));

        while connects.load(Ordering::SeqCst) < 2 {
            sleep(POLL_INTERVAL).await;
        }
        sleep(POLL_INTERVAL).await;
        assert!(!state.is_degraded().await);
        assert!(state.require_match_store().await.is_ok());
        assert_eq!(connects.load(Ordering::SeqCst), 2);

        supervisor.abort();
    }
}
