// SPDX-FileCopyrightText: 2025 ScanOrch Authors
//
// SPDX-License-Identifier: GPL-2.0-or-later

//! Log fan-out.
//!
//! Every record is printed to stdout through tracing AND pushed to the
//! worker stream; task scoped records additionally land in the per task
//! stream. This module is the only place that knows about the log bus.

use std::sync::Arc;

use models::{LogLevel, LogRecord};
use redis_bus::Bus;

/// Worker level logger.
#[derive(Clone)]
pub struct LogPublisher {
    bus: Option<Arc<dyn Bus + Send + Sync>>,
    worker_name: String,
}

impl LogPublisher {
    pub fn new(bus: Option<Arc<dyn Bus + Send + Sync>>, worker_name: &str) -> Self {
        Self {
            bus,
            worker_name: worker_name.to_string(),
        }
    }

    /// A logger that stamps every record with the given task id.
    pub fn task(&self, task_id: &str) -> TaskLogger {
        TaskLogger {
            publisher: self.clone(),
            task_id: task_id.to_string(),
        }
    }

    pub async fn info(&self, message: impl Into<String>) {
        self.publish(LogLevel::Info, message.into()).await;
    }

    pub async fn warn(&self, message: impl Into<String>) {
        self.publish(LogLevel::Warn, message.into()).await;
    }

    pub async fn error(&self, message: impl Into<String>) {
        self.publish(LogLevel::Error, message.into()).await;
    }

    pub async fn debug(&self, message: impl Into<String>) {
        self.publish(LogLevel::Debug, message.into()).await;
    }

    async fn publish(&self, level: LogLevel, message: String) {
        emit(level, &self.worker_name, "", &message);
        if let Some(bus) = &self.bus {
            let record = LogRecord::new(&self.worker_name, level, message);
            if let Err(e) = bus.push_worker_log(&record).await {
                tracing::debug!(%e, "worker log not streamed");
            }
        }
    }
}

/// Task scoped logger; writes the worker stream and the task stream.
#[derive(Clone)]
pub struct TaskLogger {
    publisher: LogPublisher,
    task_id: String,
}

impl TaskLogger {
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub async fn info(&self, message: impl Into<String>) {
        self.publish(LogLevel::Info, message.into()).await;
    }

    pub async fn warn(&self, message: impl Into<String>) {
        self.publish(LogLevel::Warn, message.into()).await;
    }

    pub async fn error(&self, message: impl Into<String>) {
        self.publish(LogLevel::Error, message.into()).await;
    }

    pub async fn debug(&self, message: impl Into<String>) {
        self.publish(LogLevel::Debug, message.into()).await;
    }

    async fn publish(&self, level: LogLevel, message: String) {
        emit(level, &self.publisher.worker_name, &self.task_id, &message);
        if let Some(bus) = &self.publisher.bus {
            let record = LogRecord::for_task(
                &self.publisher.worker_name,
                &self.task_id,
                level,
                message,
            );
            if let Err(e) = bus.push_worker_log(&record).await {
                tracing::debug!(%e, "worker log not streamed");
            }
            if let Err(e) = bus.push_task_log(&record).await {
                tracing::debug!(%e, "task log not streamed");
            }
        }
    }
}

fn emit(level: LogLevel, worker: &str, task_id: &str, message: &str) {
    match level {
        LogLevel::Debug => tracing::debug!(worker, task_id, "{message}"),
        LogLevel::Info => tracing::info!(worker, task_id, "{message}"),
        LogLevel::Warn => tracing::warn!(worker, task_id, "{message}"),
        LogLevel::Error => tracing::error!(worker, task_id, "{message}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use redis_bus::MemBus;

    #[tokio::test]
    async fn task_records_land_in_both_streams() {
        let bus = Arc::new(MemBus::new());
        let publisher = LogPublisher::new(Some(bus.clone()), "w1");
        publisher.info("worker only").await;
        publisher.task("t1").info("task scoped").await;

        let worker_logs = bus.worker_logs(10).await.unwrap();
        assert_eq!(worker_logs.len(), 2);
        let task_logs = bus.task_logs("t1", 10).await.unwrap();
        assert_eq!(task_logs.len(), 1);
        assert_eq!(task_logs[0].message, "task scoped");
        assert_eq!(task_logs[0].task_id, "t1");
        assert_eq!(task_logs[0].worker_name, "w1");
    }

    #[tokio::test]
    async fn without_a_bus_logging_is_a_no_op_on_streams() {
        let publisher = LogPublisher::new(None, "w1");
        publisher.info("stdout only").await;
        publisher.task("t").error("also stdout only").await;
    }
}
