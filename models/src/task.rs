// SPDX-FileCopyrightText: 2025 ScanOrch Authors
//
// SPDX-License-Identifier: GPL-2.0-or-later

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Asset, TaskStatus};

/// The persistent task record.
///
/// `id` is stable for the life of the record; `task_id` is the short lived
/// execution identifier that rotates on every retry and keys the control
/// bus and the per task log stream.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MainTask {
    pub id: String,
    pub task_id: String,
    pub workspace_id: String,
    pub name: String,
    pub target: String,
    #[serde(default)]
    pub profile_id: String,
    #[serde(default)]
    pub profile_name: String,
    /// Fully resolved job payload as a JSON string.
    #[serde(default)]
    pub config: String,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub progress: u8,
    #[serde(default)]
    pub result: String,
    /// Checkpoint blob, set only while the task is PAUSED.
    #[serde(default)]
    pub task_state: String,
    #[serde(default)]
    pub is_cron: bool,
    #[serde(default)]
    pub cron_rule: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_time: Option<DateTime<Utc>>,
}

/// A reusable configuration template referenced by tasks.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskProfile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Profile body as a JSON string; merged with the target on creation.
    pub config: String,
}

/// Checkpoint written by a worker when a task pauses, consumed on resume.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskState {
    pub completed_phases: Vec<String>,
    pub assets: Vec<Asset>,
}

impl TaskState {
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_state_round_trips() {
        let state = TaskState {
            completed_phases: vec!["portscan".into()],
            assets: vec![Asset::open_port("127.0.0.1", 80)],
        };
        let raw = state.to_json();
        assert!(raw.contains("completedPhases"));
        let back = TaskState::parse(&raw).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn paused_task_state_is_an_object_with_both_keys() {
        let raw = r#"{"completedPhases":["portscan"],"assets":[]}"#;
        let state = TaskState::parse(raw).unwrap();
        assert_eq!(state.completed_phases, vec!["portscan"]);
        assert!(state.assets.is_empty());
    }
}
