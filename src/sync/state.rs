//! Sync run state machine.

use chrono::{DateTime, Utc};

use crate::error::SyncError;

/// Phase of a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncState {
    /// Nothing fetched yet.
    Idle,
    /// Reading members and rules.
    Fetching,
    /// Computing the difference.
    Diffing,
    /// Dry run: report only, no changes.
    DryRunReport,
    /// Creating and deleting rules.
    Applying,
    /// Run finished.
    Done,
}

impl SyncState {
    /// Check if this state allows transitioning to another state.
    pub fn can_transition_to(&self, target: SyncState) -> bool {
        use SyncState::*;

        matches!(
            (self, target),
            (Idle, Fetching)
                | (Fetching, Diffing)
                | (Diffing, DryRunReport)
                | (Diffing, Applying)
                | (DryRunReport, Done)
                | (Applying, Done)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done)
    }
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Fetching => "fetching",
            Self::Diffing => "diffing",
            Self::DryRunReport => "dry_run_report",
            Self::Applying => "applying",
            Self::Done => "done",
        };
        write!(f, "{s}")
    }
}

/// A state transition event.
#[derive(Debug, Clone)]
pub struct StateTransition {
    /// Previous state.
    pub from: SyncState,
    /// New state.
    pub to: SyncState,
    /// When the transition occurred.
    pub timestamp: DateTime<Utc>,
}

/// Current state plus the transitions that led to it.
#[derive(Debug, Clone)]
pub struct SyncRun {
    /// Current state.
    pub state: SyncState,
    /// When the run was created.
    pub started_at: DateTime<Utc>,
    /// When the run reached `Done`.
    pub finished_at: Option<DateTime<Utc>>,
    /// State transition history.
    pub transitions: Vec<StateTransition>,
}

impl SyncRun {
    pub fn new() -> Self {
        Self {
            state: SyncState::Idle,
            started_at: Utc::now(),
            finished_at: None,
            transitions: Vec::new(),
        }
    }

    /// Move to `next`, rejecting transitions the state machine does not allow.
    pub fn transition_to(&mut self, next: SyncState) -> Result<(), SyncError> {
        if !self.state.can_transition_to(next) {
            return Err(SyncError::InvalidTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }

        tracing::debug!(from = %self.state, to = %next, "Sync state change");
        let now = Utc::now();
        self.transitions.push(StateTransition {
            from: self.state,
            to: next,
            timestamp: now,
        });
        self.state = next;
        if next.is_terminal() {
            self.finished_at = Some(now);
        }
        Ok(())
    }

    /// States visited so far, starting with `Idle`.
    pub fn path(&self) -> Vec<SyncState> {
        std::iter::once(SyncState::Idle)
            .chain(self.transitions.iter().map(|t| t.to))
            .collect()
    }
}

impl Default for SyncRun {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dry_run_path() {
        let mut run = SyncRun::new();
        for next in [
            SyncState::Fetching,
            SyncState::Diffing,
            SyncState::DryRunReport,
            SyncState::Done,
        ] {
            run.transition_to(next).unwrap();
        }
        assert!(run.state.is_terminal());
        assert!(run.finished_at.is_some());
        assert_eq!(run.path().len(), 5);
    }

    #[test]
    fn test_apply_path() {
        let mut run = SyncRun::new();
        run.transition_to(SyncState::Fetching).unwrap();
        run.transition_to(SyncState::Diffing).unwrap();
        run.transition_to(SyncState::Applying).unwrap();
        run.transition_to(SyncState::Done).unwrap();
        assert_eq!(run.transitions.len(), 4);
    }

    #[test]
    fn test_invalid_transitions() {
        assert!(!SyncState::Idle.can_transition_to(SyncState::Applying));
        assert!(!SyncState::DryRunReport.can_transition_to(SyncState::Applying));
        assert!(!SyncState::Done.can_transition_to(SyncState::Idle));
        assert!(!SyncState::Fetching.can_transition_to(SyncState::Done));

        let mut run = SyncRun::new();
        let err = run.transition_to(SyncState::Diffing).unwrap_err();
        assert!(err.to_string().contains("idle"));
        assert_eq!(run.state, SyncState::Idle);
        assert!(run.transitions.is_empty());
    }
}
