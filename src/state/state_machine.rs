use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::state::game::TeamColor;

/// Lifecycle status of a match. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    /// Players are joining and picking teams.
    Waiting,
    /// Turns are being played.
    Active,
    /// Terminal status, reached through a win or a forced end.
    Over,
}

/// Events that can be applied to a match lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// A roster member starts the match.
    Start,
    /// A team revealed all of its own cards.
    Win(TeamColor),
    /// The match is force-terminated.
    End,
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while {from:?}")]
pub struct InvalidTransition {
    /// The status the match was in when the invalid event was received.
    pub from: MatchStatus,
    /// The event that cannot be applied from this status.
    pub event: LifecycleEvent,
}

/// Errors that can occur when planning a lifecycle transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    /// A transition is already pending and must be applied or aborted.
    AlreadyPending,
    /// The requested transition is not valid from the current status.
    InvalidTransition(InvalidTransition),
}

/// Errors that can occur when applying a planned lifecycle transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyError {
    /// No transition is currently pending.
    NoPending,
    /// Plan ID does not match the pending plan.
    IdMismatch {
        /// Expected plan ID.
        expected: PlanId,
        /// Provided plan ID.
        got: PlanId,
    },
    /// Status changed since the plan was created.
    StatusMismatch {
        /// Status when plan was created.
        expected: MatchStatus,
        /// Current status.
        actual: MatchStatus,
    },
    /// Version changed since the plan was created.
    VersionMismatch {
        /// Version when plan was created.
        expected: usize,
        /// Current version.
        actual: usize,
    },
}

/// Errors that can occur when aborting a planned lifecycle transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortError {
    /// No transition is currently pending.
    NoPending,
    /// Plan ID does not match the pending plan.
    IdMismatch {
        /// Expected plan ID.
        expected: PlanId,
        /// Provided plan ID.
        got: PlanId,
    },
}

/// Unique identifier for a planned lifecycle transition.
pub type PlanId = Uuid;

/// A planned transition that has been validated but not yet applied.
#[derive(Debug, Clone)]
pub struct Plan {
    /// Unique identifier for this plan.
    pub id: PlanId,
    /// Status the match is currently in.
    pub from: MatchStatus,
    /// Status the match will transition to.
    pub to: MatchStatus,
    /// Event that triggered this transition.
    pub event: LifecycleEvent,
    /// Version number after applying this transition.
    pub version_next: usize,
}

/// Two-step lifecycle machine: a transition is planned, the caller performs
/// its side effects (storage), then the plan is applied or aborted.
#[derive(Debug, Clone)]
pub struct MatchLifecycle {
    status: MatchStatus,
    version: usize,
    pending: Option<Plan>,
}

impl Default for MatchLifecycle {
    fn default() -> Self {
        Self {
            status: MatchStatus::Waiting,
            version: 0,
            pending: None,
        }
    }
}

impl MatchLifecycle {
    /// Create a lifecycle initialised in the waiting status.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inspect the current status.
    pub fn status(&self) -> MatchStatus {
        self.status
    }

    /// Plan a transition by validating that the event can be applied from the current status.
    pub fn plan(&mut self, event: LifecycleEvent) -> Result<Plan, PlanError> {
        if self.pending.is_some() {
            return Err(PlanError::AlreadyPending);
        }

        let next = self
            .compute_transition(event.clone())
            .map_err(PlanError::InvalidTransition)?;

        let plan = Plan {
            id: Uuid::new_v4(),
            from: self.status,
            to: next,
            event,
            version_next: self.version + 1,
        };

        self.pending = Some(plan.clone());

        Ok(plan)
    }

    /// Apply a planned transition and return the new status.
    pub fn apply(&mut self, plan_id: PlanId) -> Result<MatchStatus, ApplyError> {
        let plan = self.pending.take().ok_or(ApplyError::NoPending)?;

        if plan.id != plan_id {
            let expected_plan_id = plan.id;
            self.pending = Some(plan);
            return Err(ApplyError::IdMismatch {
                expected: expected_plan_id,
                got: plan_id,
            });
        }

        if self.status != plan.from {
            return Err(ApplyError::StatusMismatch {
                expected: plan.from,
                actual: self.status,
            });
        }

        if self.version + 1 != plan.version_next {
            return Err(ApplyError::VersionMismatch {
                expected: plan.version_next,
                actual: self.version + 1,
            });
        }

        self.status = plan.to;
        self.version = plan.version_next;

        Ok(self.status)
    }

    /// Drop a planned transition without applying it.
    pub fn abort(&mut self, plan_id: PlanId) -> Result<(), AbortError> {
        let plan = self.pending.as_ref().ok_or(AbortError::NoPending)?;

        if plan.id != plan_id {
            return Err(AbortError::IdMismatch {
                expected: plan.id,
                got: plan_id,
            });
        }

        self.pending = None;
        Ok(())
    }

    fn compute_transition(&self, event: LifecycleEvent) -> Result<MatchStatus, InvalidTransition> {
        let next = match (self.status, event) {
            (MatchStatus::Waiting, LifecycleEvent::Start) => MatchStatus::Active,
            (MatchStatus::Active, LifecycleEvent::Win(_)) => MatchStatus::Over,
            // End is a forced termination: it is accepted from every status,
            // including Over so a finished match can still be dropped.
            (_, LifecycleEvent::End) => MatchStatus::Over,
            (from, event) => return Err(InvalidTransition { from, event }),
        };

        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(lifecycle: &mut MatchLifecycle, event: LifecycleEvent) -> MatchStatus {
        let plan = lifecycle.plan(event).unwrap();
        lifecycle.apply(plan.id).unwrap()
    }

    #[test]
    fn initial_status_is_waiting() {
        let lifecycle = MatchLifecycle::new();
        assert_eq!(lifecycle.status(), MatchStatus::Waiting);
    }

    #[test]
    fn start_then_win() {
        let mut lifecycle = MatchLifecycle::new();
        assert_eq!(apply(&mut lifecycle, LifecycleEvent::Start), MatchStatus::Active);
        assert_eq!(
            apply(&mut lifecycle, LifecycleEvent::Win(TeamColor::Blue)),
            MatchStatus::Over
        );
        assert_eq!(lifecycle.version, 2);
    }

    #[test]
    fn win_is_rejected_while_waiting() {
        let mut lifecycle = MatchLifecycle::new();
        let err = lifecycle.plan(LifecycleEvent::Win(TeamColor::Red)).unwrap_err();
        match err {
            PlanError::InvalidTransition(invalid) => {
                assert_eq!(invalid.from, MatchStatus::Waiting);
                assert_eq!(invalid.event, LifecycleEvent::Win(TeamColor::Red));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn status_never_moves_backwards() {
        let mut lifecycle = MatchLifecycle::new();
        apply(&mut lifecycle, LifecycleEvent::Start);
        apply(&mut lifecycle, LifecycleEvent::Win(TeamColor::Red));

        assert!(lifecycle.plan(LifecycleEvent::Start).is_err());
        assert!(lifecycle.plan(LifecycleEvent::Win(TeamColor::Blue)).is_err());
        assert_eq!(apply(&mut lifecycle, LifecycleEvent::End), MatchStatus::Over);
    }

    #[test]
    fn second_plan_is_rejected_while_pending() {
        let mut lifecycle = MatchLifecycle::new();
        let _plan = lifecycle.plan(LifecycleEvent::Start).unwrap();
        assert_eq!(
            lifecycle.plan(LifecycleEvent::End).unwrap_err(),
            PlanError::AlreadyPending
        );
    }

    #[test]
    fn abort_clears_pending() {
        let mut lifecycle = MatchLifecycle::new();
        let plan = lifecycle.plan(LifecycleEvent::Start).unwrap();
        lifecycle.abort(plan.id).unwrap();
        assert!(lifecycle.pending.is_none());
        assert_eq!(lifecycle.status(), MatchStatus::Waiting);
    }

    #[test]
    fn apply_with_foreign_plan_id_keeps_pending() {
        let mut lifecycle = MatchLifecycle::new();
        let plan = lifecycle.plan(LifecycleEvent::Start).unwrap();
        let err = lifecycle.apply(Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, ApplyError::IdMismatch { .. }));
        assert_eq!(lifecycle.apply(plan.id).unwrap(), MatchStatus::Active);
    }
}
