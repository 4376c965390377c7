// SPDX-FileCopyrightText: 2025 ScanOrch Authors
//
// SPDX-License-Identifier: GPL-2.0-or-later

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use models::{ControlSignal, LogRecord, TaskInfo, TaskInfoMapping, WorkerStatus};

use crate::{Bus, BusError, TASK_LOG_CAP, WORKER_LOG_CAP};

/// An in process [`Bus`] with the same ordering semantics as the Redis
/// one. Backs tests; TTLs are not enforced.
#[derive(Default)]
pub struct MemBus {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    seq: i64,
    // key sorted ascending, mirrors the ZPOPMIN ordering
    queue: BTreeMap<(i64, i64), TaskInfo>,
    signals: HashMap<String, ControlSignal>,
    task_infos: HashMap<String, TaskInfoMapping>,
    task_results: HashMap<String, String>,
    worker_logs: Vec<LogRecord>,
    task_logs: HashMap<String, Vec<LogRecord>>,
    heartbeats: HashMap<String, WorkerStatus>,
    queries: u64,
}

impl MemBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of refresh queries published so far.
    pub fn query_count(&self) -> u64 {
        self.inner.lock().unwrap().queries
    }

    pub fn queued_len(&self) -> usize {
        self.inner.lock().unwrap().queue.len()
    }
}

#[async_trait]
impl Bus for MemBus {
    async fn push_task(&self, task: &TaskInfo) -> Result<(), BusError> {
        let mut inner = self.inner.lock().unwrap();
        inner.seq += 1;
        let key = (-(task.priority as i64), inner.seq);
        inner.queue.insert(key, task.clone());
        Ok(())
    }

    async fn pop_task(&self) -> Result<Option<TaskInfo>, BusError> {
        let mut inner = self.inner.lock().unwrap();
        let key = match inner.queue.keys().next() {
            Some(k) => *k,
            None => return Ok(None),
        };
        Ok(inner.queue.remove(&key))
    }

    async fn set_signal(&self, task_id: &str, signal: ControlSignal) -> Result<(), BusError> {
        self.inner
            .lock()
            .unwrap()
            .signals
            .insert(task_id.to_string(), signal);
        Ok(())
    }

    async fn signal(&self, task_id: &str) -> Result<Option<ControlSignal>, BusError> {
        Ok(self.inner.lock().unwrap().signals.get(task_id).copied())
    }

    async fn clear_signal(&self, task_id: &str) -> Result<(), BusError> {
        self.inner.lock().unwrap().signals.remove(task_id);
        Ok(())
    }

    async fn set_task_info(&self, task_id: &str, info: &TaskInfoMapping) -> Result<(), BusError> {
        self.inner
            .lock()
            .unwrap()
            .task_infos
            .insert(task_id.to_string(), info.clone());
        Ok(())
    }

    async fn task_info(&self, task_id: &str) -> Result<Option<TaskInfoMapping>, BusError> {
        Ok(self.inner.lock().unwrap().task_infos.get(task_id).cloned())
    }

    async fn set_task_result(&self, task_id: &str, result: &str) -> Result<(), BusError> {
        self.inner
            .lock()
            .unwrap()
            .task_results
            .insert(task_id.to_string(), result.to_string());
        Ok(())
    }

    async fn task_result(&self, task_id: &str) -> Result<Option<String>, BusError> {
        Ok(self.inner.lock().unwrap().task_results.get(task_id).cloned())
    }

    async fn push_worker_log(&self, record: &LogRecord) -> Result<(), BusError> {
        let mut inner = self.inner.lock().unwrap();
        inner.worker_logs.push(record.clone());
        let len = inner.worker_logs.len();
        if len > WORKER_LOG_CAP {
            inner.worker_logs.drain(..len - WORKER_LOG_CAP);
        }
        Ok(())
    }

    async fn push_task_log(&self, record: &LogRecord) -> Result<(), BusError> {
        let mut inner = self.inner.lock().unwrap();
        let logs = inner.task_logs.entry(record.task_id.clone()).or_default();
        logs.push(record.clone());
        let len = logs.len();
        if len > TASK_LOG_CAP {
            logs.drain(..len - TASK_LOG_CAP);
        }
        Ok(())
    }

    async fn worker_logs(&self, count: usize) -> Result<Vec<LogRecord>, BusError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.worker_logs.iter().rev().take(count).cloned().collect())
    }

    async fn task_logs(&self, task_id: &str, count: usize) -> Result<Vec<LogRecord>, BusError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .task_logs
            .get(task_id)
            .map(|logs| logs.iter().rev().take(count).cloned().collect())
            .unwrap_or_default())
    }

    async fn put_heartbeat(&self, status: &WorkerStatus) -> Result<(), BusError> {
        self.inner
            .lock()
            .unwrap()
            .heartbeats
            .insert(status.worker_name.clone(), status.clone());
        Ok(())
    }

    async fn list_workers(&self) -> Result<Vec<WorkerStatus>, BusError> {
        Ok(self.inner.lock().unwrap().heartbeats.values().cloned().collect())
    }

    async fn publish_query(&self) -> Result<(), BusError> {
        self.inner.lock().unwrap().queries += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: &str, priority: i32) -> TaskInfo {
        TaskInfo {
            task_id: id.to_string(),
            priority,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn queue_is_fifo_within_priority() {
        let bus = MemBus::new();
        bus.push_task(&task("a", 0)).await.unwrap();
        bus.push_task(&task("b", 0)).await.unwrap();
        bus.push_task(&task("c", 0)).await.unwrap();
        assert_eq!(bus.pop_task().await.unwrap().unwrap().task_id, "a");
        assert_eq!(bus.pop_task().await.unwrap().unwrap().task_id, "b");
        assert_eq!(bus.pop_task().await.unwrap().unwrap().task_id, "c");
        assert!(bus.pop_task().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn higher_priority_dequeues_first() {
        let bus = MemBus::new();
        bus.push_task(&task("low", 0)).await.unwrap();
        bus.push_task(&task("high", 5)).await.unwrap();
        bus.push_task(&task("low2", 0)).await.unwrap();
        assert_eq!(bus.pop_task().await.unwrap().unwrap().task_id, "high");
        assert_eq!(bus.pop_task().await.unwrap().unwrap().task_id, "low");
    }

    #[tokio::test]
    async fn signals_are_per_task_and_clearable() {
        let bus = MemBus::new();
        bus.set_signal("t1", ControlSignal::Pause).await.unwrap();
        assert_eq!(bus.signal("t1").await.unwrap(), Some(ControlSignal::Pause));
        assert_eq!(bus.signal("t2").await.unwrap(), None);
        bus.clear_signal("t1").await.unwrap();
        assert_eq!(bus.signal("t1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn task_logs_are_bounded() {
        let bus = MemBus::new();
        for i in 0..(TASK_LOG_CAP + 10) {
            let r = LogRecord::for_task("w", "t", models::LogLevel::Info, format!("{i}"));
            bus.push_task_log(&r).await.unwrap();
        }
        let logs = bus.task_logs("t", TASK_LOG_CAP + 10).await.unwrap();
        assert_eq!(logs.len(), TASK_LOG_CAP);
        // newest first
        assert_eq!(logs[0].message, format!("{}", TASK_LOG_CAP + 9));
    }
}
