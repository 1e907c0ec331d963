//! Deployment phase state machine.
//!
//! ```text
//!   Initialized ──start──▶ Progressing ──complete──▶ Succeeded
//!        ▲                   │      ▲                    │
//!        │                 fail   retry                  │
//!        │                   ▼      │                    │
//!        │                   Failed ─┘                   │
//!        └───────────────────── next cycle ──────────────┘
//! ```
//!
//! Every mutation of `DeploymentState` goes through one of the methods
//! below. An operation that would need any other edge fails with
//! `StateError::IllegalTransition` before it touches infrastructure.

use serde::{Deserialize, Serialize};
use tracing::debug;

use helmsman_core::StackIndex;

use crate::error::{StateError, StateResult};

/// Lifecycle phase of a blue/green rollout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentPhase {
    Initialized,
    Progressing,
    Succeeded,
    Failed,
}

impl DeploymentPhase {
    /// Whether `self -> to` is one of the five legal edges.
    pub fn can_transition_to(self, to: DeploymentPhase) -> bool {
        use DeploymentPhase::*;
        matches!(
            (self, to),
            (Initialized, Progressing)
                | (Progressing, Succeeded)
                | (Progressing, Failed)
                | (Failed, Progressing)
                | (Succeeded, Initialized)
        )
    }

    /// No rollout in flight: exactly one stack serves traffic.
    pub fn is_steady(self) -> bool {
        matches!(self, DeploymentPhase::Initialized | DeploymentPhase::Succeeded)
    }
}

/// Which stack is live, which one a rollout targets, and where the
/// rollout stands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentState {
    phase: DeploymentPhase,
    active_stack: StackIndex,
    target_stack: StackIndex,
    /// Unix timestamp (seconds) when this deployment was first created.
    created_at: u64,
}

impl DeploymentState {
    /// State for a deployment that has never served traffic.
    ///
    /// Stack 1 is nominally active so the first rollout lands on stack 0.
    pub fn new(created_at: u64) -> Self {
        Self {
            phase: DeploymentPhase::Initialized,
            active_stack: StackIndex::One,
            target_stack: StackIndex::One,
            created_at,
        }
    }

    pub fn phase(&self) -> DeploymentPhase {
        self.phase
    }

    pub fn active_stack(&self) -> StackIndex {
        self.active_stack
    }

    pub fn target_stack(&self) -> StackIndex {
        self.target_stack
    }

    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    fn transition(&mut self, to: DeploymentPhase) -> StateResult<()> {
        if !self.phase.can_transition_to(to) {
            return Err(StateError::IllegalTransition {
                from: self.phase,
                to,
            });
        }
        debug!(from = ?self.phase, ?to, "phase transition");
        self.phase = to;
        Ok(())
    }

    /// Start a deploy/redeploy onto the inactive stack.
    ///
    /// A `Succeeded` deployment first falls back to `Initialized` (the
    /// stacks swap roles); a `Failed` one is retried. Returns the target.
    pub fn begin_rollout(&mut self) -> StateResult<StackIndex> {
        if self.phase == DeploymentPhase::Succeeded {
            self.transition(DeploymentPhase::Initialized)?;
        }
        self.transition(DeploymentPhase::Progressing)?;
        self.target_stack = self.active_stack.other();
        Ok(self.target_stack)
    }

    /// The target stack took all traffic and the fleet is healthy.
    pub fn complete_rollout(&mut self) -> StateResult<()> {
        self.transition(DeploymentPhase::Succeeded)?;
        self.active_stack = self.target_stack;
        Ok(())
    }

    /// Health-check timeout, error budget exhausted, or cancelled.
    pub fn fail(&mut self) -> StateResult<()> {
        self.transition(DeploymentPhase::Failed)
    }

    /// Start draining the target stack after a failure. Returns the stack
    /// whose canary traffic is being withdrawn.
    pub fn begin_revert(&mut self) -> StateResult<StackIndex> {
        if self.phase != DeploymentPhase::Failed {
            return Err(StateError::IllegalTransition {
                from: self.phase,
                to: DeploymentPhase::Progressing,
            });
        }
        self.transition(DeploymentPhase::Progressing)?;
        Ok(self.target_stack)
    }

    /// The target stack is drained; the previous stack stays active.
    pub fn complete_revert(&mut self) -> StateResult<()> {
        self.transition(DeploymentPhase::Succeeded)?;
        self.target_stack = self.active_stack;
        Ok(())
    }

    /// Explicitly start the next cycle.
    pub fn reset(&mut self) -> StateResult<()> {
        self.transition(DeploymentPhase::Initialized)
    }

    /// Adopt the stack that live traffic says is active.
    ///
    /// A `Progressing` or `Failed` rollout whose target already carries all
    /// traffic is completed (a failed one is retried first, so only legal
    /// edges are taken); in any other phase the cached stack is replaced.
    /// Returns whether anything changed.
    pub fn adopt_active(&mut self, live: StackIndex) -> StateResult<bool> {
        if live == self.active_stack {
            return Ok(false);
        }
        let rolling_out = matches!(
            self.phase,
            DeploymentPhase::Progressing | DeploymentPhase::Failed
        );
        if rolling_out && live == self.target_stack {
            if self.phase == DeploymentPhase::Failed {
                self.transition(DeploymentPhase::Progressing)?;
            }
            self.complete_rollout()?;
        } else {
            self.active_stack = live;
            self.target_stack = live;
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use DeploymentPhase::*;

    const ALL: [DeploymentPhase; 4] = [Initialized, Progressing, Succeeded, Failed];

    #[test]
    fn only_five_edges_are_legal() {
        let legal = [
            (Initialized, Progressing),
            (Progressing, Succeeded),
            (Progressing, Failed),
            (Failed, Progressing),
            (Succeeded, Initialized),
        ];
        for from in ALL {
            for to in ALL {
                assert_eq!(
                    from.can_transition_to(to),
                    legal.contains(&(from, to)),
                    "{from:?} -> {to:?}"
                );
            }
        }
    }

    #[test]
    fn first_rollout_targets_stack_zero() {
        let mut state = DeploymentState::new(1000);
        let target = state.begin_rollout().unwrap();
        assert_eq!(target, StackIndex::Zero);
        assert_eq!(state.phase(), Progressing);

        state.complete_rollout().unwrap();
        assert_eq!(state.phase(), Succeeded);
        assert_eq!(state.active_stack(), StackIndex::Zero);
    }

    #[test]
    fn next_cycle_swaps_stacks() {
        let mut state = DeploymentState::new(1000);
        state.begin_rollout().unwrap();
        state.complete_rollout().unwrap();

        // Succeeded -> Initialized -> Progressing in one call.
        let target = state.begin_rollout().unwrap();
        assert_eq!(target, StackIndex::One);
        assert_eq!(state.active_stack(), StackIndex::Zero);
    }

    #[test]
    fn rollout_while_progressing_is_rejected() {
        let mut state = DeploymentState::new(1000);
        state.begin_rollout().unwrap();
        let before = state.clone();

        let err = state.begin_rollout().unwrap_err();
        assert!(matches!(
            err,
            StateError::IllegalTransition {
                from: Progressing,
                to: Progressing
            }
        ));
        assert_eq!(state, before);
    }

    #[test]
    fn failed_rollout_can_be_retried() {
        let mut state = DeploymentState::new(1000);
        state.begin_rollout().unwrap();
        state.fail().unwrap();
        assert_eq!(state.phase(), Failed);

        let target = state.begin_rollout().unwrap();
        assert_eq!(target, StackIndex::Zero);
        assert_eq!(state.phase(), Progressing);
    }

    #[test]
    fn revert_keeps_previous_stack_active() {
        let mut state = DeploymentState::new(1000);
        state.begin_rollout().unwrap();
        state.complete_rollout().unwrap();
        state.begin_rollout().unwrap();
        state.fail().unwrap();

        let drained = state.begin_revert().unwrap();
        assert_eq!(drained, StackIndex::One);
        state.complete_revert().unwrap();
        assert_eq!(state.phase(), Succeeded);
        assert_eq!(state.active_stack(), StackIndex::Zero);
        assert_eq!(state.target_stack(), StackIndex::Zero);
    }

    #[test]
    fn revert_requires_failed() {
        let mut state = DeploymentState::new(1000);
        assert!(state.begin_revert().is_err());
        state.begin_rollout().unwrap();
        assert!(state.begin_revert().is_err());
    }

    #[test]
    fn fail_from_steady_state_is_illegal() {
        let mut state = DeploymentState::new(1000);
        assert!(state.fail().is_err());
        assert!(state.complete_rollout().is_err());
    }

    #[test]
    fn adopt_active_completes_interrupted_rollout() {
        let mut state = DeploymentState::new(1000);
        state.begin_rollout().unwrap();

        // Crash after the weight flip, before the commit.
        assert!(state.adopt_active(StackIndex::Zero).unwrap());
        assert_eq!(state.phase(), Succeeded);
        assert_eq!(state.active_stack(), StackIndex::Zero);
    }

    #[test]
    fn adopt_active_completes_failed_rollout_that_took_traffic() {
        let mut state = DeploymentState::new(1000);
        state.begin_rollout().unwrap();
        state.complete_rollout().unwrap();
        state.begin_rollout().unwrap();
        state.fail().unwrap();

        // A retry flipped traffic to stack 1, then crashed before the commit.
        assert!(state.adopt_active(StackIndex::One).unwrap());
        assert_eq!(state.phase(), Succeeded);
        assert_eq!(state.active_stack(), StackIndex::One);
        assert_eq!(state.target_stack(), StackIndex::One);
        assert!(state.begin_revert().is_err());
    }

    #[test]
    fn adopt_active_is_noop_when_consistent() {
        let mut state = DeploymentState::new(1000);
        assert!(!state.adopt_active(StackIndex::One).unwrap());
        assert_eq!(state.phase(), Initialized);
    }

    #[test]
    fn phase_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&Progressing).unwrap(), "\"progressing\"");
    }
}
