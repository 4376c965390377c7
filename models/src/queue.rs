// SPDX-FileCopyrightText: 2025 ScanOrch Authors
//
// SPDX-License-Identifier: GPL-2.0-or-later

use serde::{Deserialize, Serialize};

/// One entry of the task queue.
///
/// Delivery is at least once; everything a worker writes is keyed so that
/// a second delivery folds into the first.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskInfo {
    pub task_id: String,
    pub main_task_id: String,
    pub workspace_id: String,
    #[serde(default)]
    pub task_name: String,
    /// Resolved job payload as a JSON string.
    pub config: String,
    #[serde(default)]
    pub priority: i32,
}

/// Heartbeat record a worker writes under its own name.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerStatus {
    pub worker_name: String,
    pub cpu_load: f64,
    pub mem_used: f64,
    pub task_started_number: u32,
    pub task_executed_number: u32,
    #[serde(default)]
    pub is_daemon: bool,
    /// Wire format `YYYY-MM-DD HH:MM:SS`; the operator view derives
    /// online/offline from its age.
    pub update_time: String,
}

/// The `workspaceId`/`mainTaskId` mapping published next to a queued task
/// so that log consumers can resolve an execution id without a DB lookup.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskInfoMapping {
    pub workspace_id: String,
    pub main_task_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_time: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_record_matches_the_wire_format() {
        let raw = r#"{"taskId":"u","mainTaskId":"m","workspaceId":"w",
 "taskName":"scan","config":"{}","priority":1}"#;
        let t: TaskInfo = serde_json::from_str(raw).unwrap();
        assert_eq!(t.task_id, "u");
        assert_eq!(t.priority, 1);
        let v = serde_json::to_value(&t).unwrap();
        assert_eq!(v["mainTaskId"], "m");
    }
}
