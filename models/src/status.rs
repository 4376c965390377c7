// SPDX-FileCopyrightText: 2025 ScanOrch Authors
//
// SPDX-License-Identifier: GPL-2.0-or-later

use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a task.
///
/// `Success`, `Failure` and `Stopped` are sinks; every permitted transition
/// is encoded in [`TaskStatus::can_transition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskStatus {
    /// Created and editable, not yet queued
    #[default]
    Created,
    /// Queued, waiting for a worker to claim it
    Pending,
    /// Claimed and executing on a worker
    Started,
    /// Checkpointed by the worker, waiting for resume
    Paused,
    /// Finished without errors
    Success,
    /// Finished with an error summary
    Failure,
    /// Aborted by the operator
    Stopped,
}

impl TaskStatus {
    /// Terminal states cannot be left except through an explicit retry,
    /// which rotates the task id instead of transitioning.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failure | Self::Stopped)
    }

    /// Whether moving from `self` to `to` is a permitted transition.
    pub fn can_transition(&self, to: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, to),
            (Created, Pending)
                | (Pending, Started)
                | (Pending, Stopped)
                | (Started, Success)
                | (Started, Failure)
                | (Started, Paused)
                | (Started, Stopped)
                | (Paused, Pending)
                | (Paused, Stopped)
                | (Success, Pending)
                | (Failure, Pending)
                | (Stopped, Pending)
        )
    }
}

impl Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "CREATED"),
            Self::Pending => write!(f, "PENDING"),
            Self::Started => write!(f, "STARTED"),
            Self::Paused => write!(f, "PAUSED"),
            Self::Success => write!(f, "SUCCESS"),
            Self::Failure => write!(f, "FAILURE"),
            Self::Stopped => write!(f, "STOPPED"),
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATED" => Ok(Self::Created),
            "PENDING" => Ok(Self::Pending),
            "STARTED" => Ok(Self::Started),
            "PAUSED" => Ok(Self::Paused),
            "SUCCESS" => Ok(Self::Success),
            "FAILURE" => Ok(Self::Failure),
            "STOPPED" => Ok(Self::Stopped),
            x => Err(format!("`{x}` is not a task status")),
        }
    }
}

/// Control signal written by the control plane, read by workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ControlSignal {
    Pause,
    Stop,
}

impl Display for ControlSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pause => write!(f, "PAUSE"),
            Self::Stop => write!(f, "STOP"),
        }
    }
}

impl std::str::FromStr for ControlSignal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PAUSE" => Ok(Self::Pause),
            "STOP" => Ok(Self::Stop),
            x => Err(format!("`{x}` is not a control signal")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_form_the_documented_graph() {
        use TaskStatus::*;
        assert!(Created.can_transition(Pending));
        assert!(Pending.can_transition(Started));
        assert!(Started.can_transition(Paused));
        assert!(Paused.can_transition(Pending));
        assert!(Started.can_transition(Stopped));
        assert!(Paused.can_transition(Stopped));
        assert!(Pending.can_transition(Stopped));
        // sinks only leave through retry
        for terminal in [Success, Failure, Stopped] {
            assert!(terminal.is_terminal());
            assert!(terminal.can_transition(Pending));
            assert!(!terminal.can_transition(Started));
        }
        assert!(!Created.can_transition(Started));
        assert!(!Stopped.can_transition(Success));
    }

    #[test]
    fn status_round_trips_as_uppercase() {
        let s = serde_json::to_string(&TaskStatus::Paused).unwrap();
        assert_eq!(s, "\"PAUSED\"");
        let back: TaskStatus = serde_json::from_str(&s).unwrap();
        assert_eq!(back, TaskStatus::Paused);
        assert_eq!("STARTED".parse::<TaskStatus>().unwrap(), TaskStatus::Started);
    }
}
