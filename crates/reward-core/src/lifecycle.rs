//! File-sync session transitions.
//!
//! One session exists per project, selected by its label. The engine maps
//! each environment verb onto a [`SyncEvent`]; [`plan`] turns the current
//! [`SyncState`] and that event into the steps to run.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Absent,
    Running,
    Paused,
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Absent => "absent",
            Self::Running => "running",
            Self::Paused => "paused",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncEvent {
    /// `env up` or `env start` finished.
    Up,
    /// `env stop` is about to run.
    Stop,
    /// `env down` finished.
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStep {
    Terminate,
    Create,
    AwaitReady,
    Pause,
    Resume,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub next: SyncState,
    pub steps: Vec<SyncStep>,
}

const RECREATE: [SyncStep; 3] = [SyncStep::Terminate, SyncStep::Create, SyncStep::AwaitReady];

/// Steps taking a session in `current` through `event`. `container_changed`
/// only matters for [`SyncEvent::Up`]; an absent session is always
/// recreated.
pub fn plan(current: SyncState, event: SyncEvent, container_changed: bool) -> Transition {
    let (next, steps) = match (current, event) {
        (SyncState::Absent, SyncEvent::Up) => (SyncState::Running, RECREATE.to_vec()),
        (_, SyncEvent::Up) if container_changed => (SyncState::Running, RECREATE.to_vec()),
        (SyncState::Running | SyncState::Paused, SyncEvent::Up) => {
            (SyncState::Running, vec![SyncStep::Resume])
        }
        (SyncState::Running | SyncState::Paused, SyncEvent::Stop) => {
            (SyncState::Paused, vec![SyncStep::Pause])
        }
        (SyncState::Absent, SyncEvent::Stop) => (SyncState::Absent, Vec::new()),
        (_, SyncEvent::Down) => (SyncState::Absent, vec![SyncStep::Terminate]),
    };
    Transition { next, steps }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn up_recreates_absent_or_changed_sessions() {
        for state in [SyncState::Absent, SyncState::Running, SyncState::Paused] {
            let t = plan(state, SyncEvent::Up, true);
            assert_eq!(t.next, SyncState::Running);
            assert_eq!(t.steps, RECREATE.to_vec());
        }
        // absent wins over an unchanged container
        assert_eq!(plan(SyncState::Absent, SyncEvent::Up, false).steps, RECREATE.to_vec());
    }

    #[test]
    fn up_resumes_unchanged_sessions() {
        for state in [SyncState::Running, SyncState::Paused] {
            let t = plan(state, SyncEvent::Up, false);
            assert_eq!(t.next, SyncState::Running);
            assert_eq!(t.steps, vec![SyncStep::Resume]);
        }
    }

    #[test]
    fn stop_pauses_existing_sessions_only() {
        assert_eq!(
            plan(SyncState::Running, SyncEvent::Stop, false),
            Transition {
                next: SyncState::Paused,
                steps: vec![SyncStep::Pause]
            }
        );
        assert!(plan(SyncState::Absent, SyncEvent::Stop, false).steps.is_empty());
    }

    #[test]
    fn down_always_terminates() {
        for state in [SyncState::Absent, SyncState::Running, SyncState::Paused] {
            let t = plan(state, SyncEvent::Down, false);
            assert_eq!(t.next, SyncState::Absent);
            assert_eq!(t.steps, vec![SyncStep::Terminate]);
        }
    }
}
