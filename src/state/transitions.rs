use std::{
    future::Future,
    time::{Duration, SystemTime},
};

use tokio::time::timeout;
use tracing::warn;

use crate::{
    dao::models::MatchEntity,
    error::ServiceError,
    state::{
        game::Match,
        state_machine::{LifecycleEvent, MatchStatus, Plan},
    },
};

/// Drive one lifecycle transition of `game`: plan it, run `work` against the
/// record the match will have once committed, then apply or abort.
///
/// The caller holds the match guard for the whole call, so no other command
/// observes the pending plan. `work` is bounded by `limit`; on timeout or
/// error the plan is aborted and the match is left untouched.
pub async fn run_transition<F, Fut, T>(
    game: &mut Match,
    event: LifecycleEvent,
    limit: Option<Duration>,
    work: F,
) -> Result<(T, MatchStatus), ServiceError>
where
    F: FnOnce(MatchEntity) -> Fut,
    Fut: Future<Output = Result<T, ServiceError>>,
{
    let now = SystemTime::now();
    let Plan {
        id: plan_id, to, ..
    } = game.lifecycle_mut().plan(event.clone())?;
    let staged = game.staged_entity(&event, to, now);

    let work_future = work(staged);
    let outcome = if let Some(limit) = limit {
        match timeout(limit, work_future).await {
            Ok(result) => result,
            Err(_) => {
                if let Err(abort_err) = game.lifecycle_mut().abort(plan_id) {
                    warn!(
                        code = %game.code(),
                        event = ?event,
                        plan_id = %plan_id,
                        error = ?abort_err,
                        "failed to abort transition after timeout"
                    );
                }
                return Err(ServiceError::Timeout);
            }
        }
    } else {
        work_future.await
    };

    match outcome {
        Ok(value) => {
            let next = game.lifecycle_mut().apply(plan_id)?;
            game.commit_effects(&event, now);
            Ok((value, next))
        }
        Err(err) => {
            if let Err(abort_err) = game.lifecycle_mut().abort(plan_id) {
                warn!(
                    code = %game.code(),
                    event = ?event,
                    plan_id = %plan_id,
                    error = ?abort_err,
                    "failed to abort transition after work error"
                );
            }
            Err(err)
        }
    }
}
