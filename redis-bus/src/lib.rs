// SPDX-FileCopyrightText: 2025 ScanOrch Authors
//
// SPDX-License-Identifier: GPL-2.0-or-later

//! The queue and control bus.
//!
//! Every ephemeral keyspace of the system lives here: the priority task
//! queue, control signals, the task info mapping, log streams with their
//! live channels, worker heartbeats and the status query channel. All keys
//! sit under the `scano:` prefix; nothing outside this crate touches a raw
//! connection.

mod bus;
mod error;
mod membus;

pub use bus::RedisBus;
pub use error::BusError;
pub use membus::MemBus;
/// Re-exported so subscribers don't need their own redis dependency.
pub use redis::aio::PubSub;

use async_trait::async_trait;
use models::{ControlSignal, LogRecord, TaskInfo, TaskInfoMapping, WorkerStatus};

/// Bound of the per worker log stream.
pub const WORKER_LOG_CAP: usize = 10_000;
/// Bound of each per task log stream.
pub const TASK_LOG_CAP: usize = 5_000;
/// Lifetime of control signals, task info mappings and validation results.
pub const EPHEMERAL_TTL_SECS: u64 = 24 * 60 * 60;
/// Lifetime of a worker heartbeat.
pub const HEARTBEAT_TTL_SECS: u64 = 10 * 60;

pub(crate) mod keys {
    pub const PREFIX: &str = "scano";

    pub fn queue() -> String {
        format!("{PREFIX}:task:queue")
    }
    pub fn queue_seq() -> String {
        format!("{PREFIX}:task:queue:seq")
    }
    pub fn ctrl(task_id: &str) -> String {
        format!("{PREFIX}:task:ctrl:{task_id}")
    }
    pub fn task_info(task_id: &str) -> String {
        format!("{PREFIX}:task:info:{task_id}")
    }
    pub fn task_result(task_id: &str) -> String {
        format!("{PREFIX}:task:result:{task_id}")
    }
    pub fn worker_logs() -> String {
        format!("{PREFIX}:worker:logs")
    }
    pub fn task_logs(task_id: &str) -> String {
        format!("{PREFIX}:task:logs:{task_id}")
    }
    pub fn worker_logs_live() -> String {
        format!("{PREFIX}:worker:logs:live")
    }
    pub fn task_logs_live() -> String {
        format!("{PREFIX}:task:logs:live")
    }
    // `workers`, not `worker`: keeps the heartbeat scan pattern disjoint
    // from the log stream and query channel keys
    pub fn heartbeat(name: &str) -> String {
        format!("{PREFIX}:workers:{name}")
    }
    pub fn heartbeat_pattern() -> String {
        format!("{PREFIX}:workers:*")
    }
    pub fn query_channel() -> String {
        format!("{PREFIX}:worker:query")
    }
}

/// The bus operations the control plane and the workers rely on.
///
/// [`RedisBus`] is the production implementation; [`MemBus`] backs tests
/// and single process setups.
#[async_trait]
pub trait Bus {
    async fn push_task(&self, task: &TaskInfo) -> Result<(), BusError>;
    /// Pops the highest priority task, FIFO within a priority band.
    async fn pop_task(&self) -> Result<Option<TaskInfo>, BusError>;

    async fn set_signal(&self, task_id: &str, signal: ControlSignal) -> Result<(), BusError>;
    async fn signal(&self, task_id: &str) -> Result<Option<ControlSignal>, BusError>;
    async fn clear_signal(&self, task_id: &str) -> Result<(), BusError>;

    async fn set_task_info(&self, task_id: &str, info: &TaskInfoMapping) -> Result<(), BusError>;
    async fn task_info(&self, task_id: &str) -> Result<Option<TaskInfoMapping>, BusError>;

    /// Stores a POC validation outcome under the task result key.
    async fn set_task_result(&self, task_id: &str, result: &str) -> Result<(), BusError>;
    async fn task_result(&self, task_id: &str) -> Result<Option<String>, BusError>;

    async fn push_worker_log(&self, record: &LogRecord) -> Result<(), BusError>;
    async fn push_task_log(&self, record: &LogRecord) -> Result<(), BusError>;
    async fn worker_logs(&self, count: usize) -> Result<Vec<LogRecord>, BusError>;
    async fn task_logs(&self, task_id: &str, count: usize) -> Result<Vec<LogRecord>, BusError>;

    async fn put_heartbeat(&self, status: &WorkerStatus) -> Result<(), BusError>;
    async fn list_workers(&self) -> Result<Vec<WorkerStatus>, BusError>;

    /// Asks every worker to refresh its heartbeat immediately.
    async fn publish_query(&self) -> Result<(), BusError>;
}
