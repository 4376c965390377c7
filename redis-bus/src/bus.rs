// SPDX-FileCopyrightText: 2025 ScanOrch Authors
//
// SPDX-License-Identifier: GPL-2.0-or-later

use std::collections::HashMap;

use async_trait::async_trait;
use models::{ControlSignal, LogRecord, TaskInfo, TaskInfoMapping, WorkerStatus};
use redis::aio::ConnectionManager;

use crate::{keys, Bus, BusError, EPHEMERAL_TTL_SECS, HEARTBEAT_TTL_SECS, TASK_LOG_CAP, WORKER_LOG_CAP};

/// Spreads priorities far enough apart that the FIFO sequence number can
/// never cross into the next priority band.
const PRIORITY_STRIDE: f64 = (1u64 << 40) as f64;

/// Production bus on top of Redis.
///
/// Holds a multiplexed connection manager for commands plus the client
/// itself for pub/sub subscriptions (which need a dedicated connection).
#[derive(Clone)]
pub struct RedisBus {
    client: redis::Client,
    manager: ConnectionManager,
}

impl std::fmt::Debug for RedisBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RedisBus({})", self.client.get_connection_info().addr)
    }
}

impl RedisBus {
    /// Connects and verifies the connection with a PING.
    pub async fn connect(url: &str) -> Result<Self, BusError> {
        let client = redis::Client::open(url).map_err(BusError::from)?;
        let mut manager = client.get_connection_manager().await?;
        redis::cmd("PING").query_async::<_, ()>(&mut manager).await?;
        Ok(Self { client, manager })
    }

    /// A dedicated pub/sub connection subscribed to the status query
    /// channel.
    pub async fn subscribe_query(&self) -> Result<redis::aio::PubSub, BusError> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(keys::query_channel()).await?;
        Ok(pubsub)
    }

    /// A dedicated pub/sub connection for live log tailing.
    pub async fn subscribe_live_logs(&self, per_task: bool) -> Result<redis::aio::PubSub, BusError> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        let channel = if per_task {
            keys::task_logs_live()
        } else {
            keys::worker_logs_live()
        };
        pubsub.subscribe(channel).await?;
        Ok(pubsub)
    }

    async fn xadd(&self, key: &str, cap: usize, payload: &str) -> Result<(), BusError> {
        let mut conn = self.manager.clone();
        redis::cmd("XADD")
            .arg(key)
            .arg("MAXLEN")
            .arg("~")
            .arg(cap)
            .arg("*")
            .arg("data")
            .arg(payload)
            .query_async::<_, String>(&mut conn)
            .await?;
        Ok(())
    }

    async fn xrevrange(&self, key: &str, count: usize) -> Result<Vec<LogRecord>, BusError> {
        let mut conn = self.manager.clone();
        let entries: Vec<(String, HashMap<String, String>)> = redis::cmd("XREVRANGE")
            .arg(key)
            .arg("+")
            .arg("-")
            .arg("COUNT")
            .arg(count)
            .query_async(&mut conn)
            .await?;
        let mut records = Vec::with_capacity(entries.len());
        for (_, fields) in entries {
            if let Some(data) = fields.get("data") {
                match serde_json::from_str(data) {
                    Ok(record) => records.push(record),
                    Err(e) => tracing::debug!(%e, "dropping unparseable log entry"),
                }
            }
        }
        Ok(records)
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<(), BusError> {
        let mut conn = self.manager.clone();
        redis::cmd("PUBLISH")
            .arg(channel)
            .arg(payload)
            .query_async::<_, i64>(&mut conn)
            .await?;
        Ok(())
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: u64) -> Result<(), BusError> {
        let mut conn = self.manager.clone();
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl)
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, BusError> {
        let mut conn = self.manager.clone();
        let value: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

}

#[async_trait]
impl Bus for RedisBus {
    async fn push_task(&self, task: &TaskInfo) -> Result<(), BusError> {
        let mut conn = self.manager.clone();
        let seq: i64 = redis::cmd("INCR")
            .arg(keys::queue_seq())
            .query_async(&mut conn)
            .await?;
        let score = seq as f64 - task.priority as f64 * PRIORITY_STRIDE;
        let payload = serde_json::to_string(task)?;
        redis::cmd("ZADD")
            .arg(keys::queue())
            .arg(score)
            .arg(payload)
            .query_async::<_, i64>(&mut conn)
            .await?;
        Ok(())
    }

    async fn pop_task(&self) -> Result<Option<TaskInfo>, BusError> {
        let mut conn = self.manager.clone();
        let popped: Vec<(String, f64)> = redis::cmd("ZPOPMIN")
            .arg(keys::queue())
            .query_async(&mut conn)
            .await?;
        match popped.into_iter().next() {
            Some((payload, _)) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }

    async fn set_signal(&self, task_id: &str, signal: ControlSignal) -> Result<(), BusError> {
        self.set_ex(&keys::ctrl(task_id), &signal.to_string(), EPHEMERAL_TTL_SECS)
            .await
    }

    async fn signal(&self, task_id: &str) -> Result<Option<ControlSignal>, BusError> {
        Ok(self
            .get(&keys::ctrl(task_id))
            .await?
            .and_then(|raw| raw.parse().ok()))
    }

    async fn clear_signal(&self, task_id: &str) -> Result<(), BusError> {
        let mut conn = self.manager.clone();
        redis::cmd("DEL")
            .arg(keys::ctrl(task_id))
            .query_async::<_, i64>(&mut conn)
            .await?;
        Ok(())
    }

    async fn set_task_info(&self, task_id: &str, info: &TaskInfoMapping) -> Result<(), BusError> {
        let payload = serde_json::to_string(info)?;
        self.set_ex(&keys::task_info(task_id), &payload, EPHEMERAL_TTL_SECS)
            .await
    }

    async fn task_info(&self, task_id: &str) -> Result<Option<TaskInfoMapping>, BusError> {
        match self.get(&keys::task_info(task_id)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn set_task_result(&self, task_id: &str, result: &str) -> Result<(), BusError> {
        self.set_ex(&keys::task_result(task_id), result, EPHEMERAL_TTL_SECS)
            .await
    }

    async fn task_result(&self, task_id: &str) -> Result<Option<String>, BusError> {
        self.get(&keys::task_result(task_id)).await
    }

    async fn push_worker_log(&self, record: &LogRecord) -> Result<(), BusError> {
        let payload = serde_json::to_string(record)?;
        self.xadd(&keys::worker_logs(), WORKER_LOG_CAP, &payload).await?;
        self.publish(&keys::worker_logs_live(), &payload).await
    }

    async fn push_task_log(&self, record: &LogRecord) -> Result<(), BusError> {
        let payload = serde_json::to_string(record)?;
        self.xadd(&keys::task_logs(&record.task_id), TASK_LOG_CAP, &payload)
            .await?;
        self.publish(&keys::task_logs_live(), &payload).await
    }

    async fn worker_logs(&self, count: usize) -> Result<Vec<LogRecord>, BusError> {
        self.xrevrange(&keys::worker_logs(), count).await
    }

    async fn task_logs(&self, task_id: &str, count: usize) -> Result<Vec<LogRecord>, BusError> {
        self.xrevrange(&keys::task_logs(task_id), count).await
    }

    async fn put_heartbeat(&self, status: &WorkerStatus) -> Result<(), BusError> {
        let payload = serde_json::to_string(status)?;
        self.set_ex(
            &keys::heartbeat(&status.worker_name),
            &payload,
            HEARTBEAT_TTL_SECS,
        )
        .await
    }

    async fn list_workers(&self) -> Result<Vec<WorkerStatus>, BusError> {
        let mut conn = self.manager.clone();
        let worker_keys: Vec<String> = redis::cmd("KEYS")
            .arg(keys::heartbeat_pattern())
            .query_async(&mut conn)
            .await?;
        let mut workers = Vec::with_capacity(worker_keys.len());
        for key in worker_keys {
            if let Some(raw) = self.get(&key).await? {
                if let Ok(status) = serde_json::from_str(&raw) {
                    workers.push(status);
                }
            }
        }
        Ok(workers)
    }

    async fn publish_query(&self) -> Result<(), BusError> {
        self.publish(&keys::query_channel(), "refresh").await
    }
}
