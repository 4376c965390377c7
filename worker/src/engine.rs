// SPDX-FileCopyrightText: 2025 ScanOrch Authors
//
// SPDX-License-Identifier: GPL-2.0-or-later

//! The worker process internals: claim loop, bounded executor pool,
//! heartbeat loop and the status query responder.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::StreamExt;
use models::rpc::{CheckTaskReq, KeepAliveReq};
use models::TaskInfo;
use redis_bus::{Bus, PubSub};
use sysinfo::System;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::config::WorkerConfig;
use crate::logbus::LogPublisher;
use crate::pipeline::{Outcome, Pipeline};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const CLAIM_BASE_INTERVAL: Duration = Duration::from_secs(1);
const CLAIM_MAX_INTERVAL: Duration = Duration::from_secs(5);
const CLAIM_HOT_INTERVAL: Duration = Duration::from_millis(100);

/// `tasks_started` / `tasks_executed`, shared across the loops.
#[derive(Debug, Default)]
pub struct Counters {
    counts: Mutex<(u32, u32)>,
}

impl Counters {
    pub fn inc_started(&self) {
        self.counts.lock().unwrap().0 += 1;
    }

    pub fn inc_executed(&self) {
        self.counts.lock().unwrap().1 += 1;
    }

    pub fn snapshot(&self) -> (u32, u32) {
        *self.counts.lock().unwrap()
    }
}

/// CPU and memory percent, clamped to 0..100.
struct Sampler {
    system: Mutex<System>,
}

impl Sampler {
    fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }

    fn sample(&self) -> (f64, f64) {
        let mut system = self.system.lock().unwrap();
        system.refresh_cpu_usage();
        system.refresh_memory();
        let cpu = system.global_cpu_info().cpu_usage() as f64;
        let mem = if system.total_memory() > 0 {
            system.used_memory() as f64 / system.total_memory() as f64 * 100.0
        } else {
            0.0
        };
        (cpu.clamp(0.0, 100.0), mem.clamp(0.0, 100.0))
    }
}

pub struct Engine {
    config: WorkerConfig,
    pipeline: Arc<Pipeline>,
    bus: Option<Arc<dyn Bus + Send + Sync>>,
    logger: LogPublisher,
    counters: Arc<Counters>,
    sampler: Sampler,
    task_tx: mpsc::Sender<TaskInfo>,
    task_rx: Mutex<Option<mpsc::Receiver<TaskInfo>>>,
    shutdown_tx: watch::Sender<bool>,
}

impl Engine {
    pub fn new(
        config: WorkerConfig,
        pipeline: Arc<Pipeline>,
        bus: Option<Arc<dyn Bus + Send + Sync>>,
        logger: LogPublisher,
    ) -> Arc<Self> {
        let (task_tx, task_rx) = mpsc::channel(config.concurrency.max(1));
        let (shutdown_tx, _) = watch::channel(false);
        Arc::new(Self {
            config,
            pipeline,
            bus,
            logger,
            counters: Arc::new(Counters::default()),
            sampler: Sampler::new(),
            task_tx,
            task_rx: Mutex::new(Some(task_rx)),
            shutdown_tx,
        })
    }

    pub fn counters(&self) -> &Arc<Counters> {
        &self.counters
    }

    /// Spawns the claim loop, the executor slots and the heartbeat loop.
    pub async fn start(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();
        let receiver = self
            .task_rx
            .lock()
            .unwrap()
            .take()
            .expect("engine started twice");
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        for _ in 0..self.config.concurrency.max(1) {
            handles.push(tokio::spawn(
                Arc::clone(self).executor_slot(Arc::clone(&receiver)),
            ));
        }
        handles.push(tokio::spawn(Arc::clone(self).claim_loop()));
        handles.push(tokio::spawn(Arc::clone(self).heartbeat_loop()));
        self.logger
            .info(format!(
                "Worker {} started with {} workers",
                self.config.name, self.config.concurrency
            ))
            .await;
        handles
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    fn shutting_down(&self) -> bool {
        *self.shutdown_tx.subscribe().borrow()
    }

    /// Periodically asks the control plane for work. Backoff grows with
    /// consecutive empty polls, capped at five seconds so a fresh task is
    /// never stuck longer than that.
    async fn claim_loop(self: Arc<Self>) {
        let mut empty_count: u32 = 0;
        loop {
            if self.shutting_down() {
                return;
            }
            // claim only when an executor slot is free
            if self.task_tx.capacity() == 0 {
                tokio::time::sleep(CLAIM_BASE_INTERVAL).await;
                continue;
            }
            let claimed = match self
                .pipeline
                .client
                .check_task(&CheckTaskReq {
                    worker_name: self.config.name.clone(),
                })
                .await
            {
                Ok(resp) if resp.is_exist && !resp.is_finished => Some(TaskInfo {
                    task_id: resp.task_id,
                    main_task_id: resp.main_task_id,
                    workspace_id: resp.workspace_id,
                    task_name: "scan".to_string(),
                    config: resp.config,
                    priority: 0,
                }),
                Ok(_) => None,
                Err(e) => {
                    tracing::debug!(%e, "check task failed");
                    None
                }
            };
            match claimed {
                Some(task) => {
                    empty_count = 0;
                    if self.task_tx.send(task).await.is_err() {
                        return;
                    }
                    tokio::time::sleep(CLAIM_HOT_INTERVAL).await;
                }
                None => {
                    empty_count += 1;
                    let interval = CLAIM_BASE_INTERVAL
                        .saturating_mul(empty_count)
                        .min(CLAIM_MAX_INTERVAL);
                    tokio::time::sleep(interval).await;
                }
            }
        }
    }

    /// One slot of the bounded executor pool.
    async fn executor_slot(
        self: Arc<Self>,
        receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<TaskInfo>>>,
    ) {
        let mut shutdown = self.shutdown_tx.subscribe();
        loop {
            let task = {
                let mut receiver = receiver.lock().await;
                tokio::select! {
                    task = receiver.recv() => task,
                    _ = shutdown.changed() => return,
                }
            };
            let Some(task) = task else { return };
            self.counters.inc_started();
            let outcome = self.pipeline.execute(&task).await;
            if outcome == Outcome::Success {
                self.counters.inc_executed();
            }
            tracing::debug!(task_id = %task.task_id, ?outcome, "task settled");
        }
    }

    /// Every 30 seconds: sample, report, obey the reply flags.
    async fn heartbeat_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
        let mut shutdown = self.shutdown_tx.subscribe();
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => return,
            }
            self.send_heartbeat().await;
        }
    }

    async fn send_heartbeat(self: &Arc<Self>) {
        let (cpu_load, mem_used) = self.sampler.sample();
        let (started, executed) = self.counters.snapshot();
        let reply = self
            .pipeline
            .client
            .keep_alive(&KeepAliveReq {
                worker_name: self.config.name.clone(),
                cpu_load,
                mem_used,
                task_started_number: started,
                task_executed_number: executed,
                is_daemon: false,
            })
            .await;
        let reply = match reply {
            Ok(reply) => reply,
            Err(e) => {
                self.logger.error(format!("keepalive failed: {e}")).await;
                return;
            }
        };
        if reply.manual_stop_flag {
            self.logger
                .info("received stop signal, stopping worker...")
                .await;
            self.shutdown();
            std::process::exit(0);
        }
        if reply.manual_reload_flag {
            self.logger.info("received reload signal").await;
            self.pipeline.load_http_mappings().await;
        }
    }

    /// Immediately refreshes the heartbeat record, without the RPC round
    /// trip. Used when the operator view asks for fresh numbers.
    pub async fn report_status(&self) {
        let Some(bus) = &self.bus else { return };
        let (cpu_load, mem_used) = self.sampler.sample();
        let (started, executed) = self.counters.snapshot();
        let status = models::WorkerStatus {
            worker_name: self.config.name.clone(),
            cpu_load,
            mem_used,
            task_started_number: started,
            task_executed_number: executed,
            is_daemon: false,
            update_time: models::now_string(),
        };
        if let Err(e) = bus.put_heartbeat(&status).await {
            tracing::debug!(%e, "status report failed");
        }
    }

    /// Answers every message on the status query channel with a fresh
    /// heartbeat.
    pub fn spawn_query_responder(self: &Arc<Self>, mut pubsub: PubSub) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            tracing::info!(worker = %engine.config.name, "subscribed to status query channel");
            let mut stream = pubsub.on_message();
            while let Some(_msg) = stream.next().await {
                if engine.shutting_down() {
                    return;
                }
                engine.report_status().await;
            }
        })
    }

}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use models::rpc::CheckTaskResp;
    use models::scanner::{Lambda, ScanOutput};
    use redis_bus::MemBus;

    use super::*;
    use crate::client::testing::FakePlane;
    use crate::httpcheck::HttpServiceTable;
    use crate::scanners::Scanners;

    fn lambda_scanners() -> Scanners {
        let noop = || {
            Arc::new(Lambda::named("noop").with_scan(|_| Ok(ScanOutput::default())))
                as Arc<dyn models::scanner::Scan + Send + Sync>
        };
        Scanners {
            naabu: noop(),
            masscan: noop(),
            nmap: noop(),
            fingerprint: noop(),
            nuclei: noop(),
        }
    }

    fn engine_with(plane: Arc<FakePlane>, bus: Arc<MemBus>) -> Arc<Engine> {
        let config = WorkerConfig {
            name: "w-test".into(),
            concurrency: 2,
            ..Default::default()
        };
        let bus: Arc<dyn Bus + Send + Sync> = bus;
        let logger = LogPublisher::new(Some(Arc::clone(&bus)), &config.name);
        let pipeline = Arc::new(Pipeline {
            worker_name: config.name.clone(),
            client: plane,
            bus: Some(Arc::clone(&bus)),
            logger: logger.clone(),
            scanners: lambda_scanners(),
            http_table: Arc::new(HttpServiceTable::new()),
            task_timeout: Duration::from_secs(60),
        });
        Engine::new(config, pipeline, Some(bus), logger)
    }

    fn queued_task(id: &str) -> CheckTaskResp {
        CheckTaskResp {
            is_exist: true,
            is_finished: false,
            task_id: id.to_string(),
            main_task_id: format!("m-{id}"),
            workspace_id: "ws".to_string(),
            config: r#"{"target":"127.0.0.1","portscan":{"enable":true,"ports":"80"}}"#.to_string(),
        }
    }

    #[tokio::test]
    async fn claims_and_executes_queued_tasks() {
        let plane = Arc::new(FakePlane::new());
        plane.state.lock().unwrap().queue.push(queued_task("t1"));
        plane.state.lock().unwrap().queue.push(queued_task("t2"));
        let bus = Arc::new(MemBus::new());
        let engine = engine_with(Arc::clone(&plane), bus);
        let handles = engine.start().await;

        // both tasks run to SUCCESS through the lambda scanners
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let done = {
                    let state = plane.state.lock().unwrap();
                    state
                        .updates
                        .iter()
                        .filter(|u| u.state == "SUCCESS")
                        .count()
                };
                if done == 2 {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("tasks finish");

        assert_eq!(engine.counters().snapshot(), (2, 2));
        assert_eq!(plane.states("t1"), vec!["STARTED", "SUCCESS"]);
        engine.shutdown();
        for handle in handles {
            handle.abort();
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrency_bounds_the_started_tasks() {
        let plane = Arc::new(FakePlane::new());
        for i in 0..6 {
            plane
                .state
                .lock()
                .unwrap()
                .queue
                .push(queued_task(&format!("t{i}")));
        }
        let bus = Arc::new(MemBus::new());
        let engine = engine_with(Arc::clone(&plane), bus);

        // a slow portscan keeps slots busy
        let slow = Arc::new(Lambda::named("slow").with_scan(|_| {
            std::thread::sleep(Duration::from_millis(500));
            Ok(ScanOutput::default())
        })) as Arc<dyn models::scanner::Scan + Send + Sync>;
        // rebuild the engine with a slow scanner set
        let mut scanners = lambda_scanners();
        scanners.naabu = slow;
        let logger = LogPublisher::new(None, "w-test");
        let pipeline = Arc::new(Pipeline {
            worker_name: "w-test".into(),
            client: Arc::clone(&plane) as Arc<dyn crate::client::TaskPlane>,
            bus: None,
            logger: logger.clone(),
            scanners,
            http_table: Arc::new(HttpServiceTable::new()),
            task_timeout: Duration::from_secs(60),
        });
        let engine2 = Engine::new(
            WorkerConfig {
                name: "w-test".into(),
                concurrency: 2,
                ..Default::default()
            },
            pipeline,
            None,
            logger,
        );
        drop(engine);
        let handles = engine2.start().await;
        tokio::time::sleep(Duration::from_millis(150)).await;
        let (started, _) = engine2.counters().snapshot();
        // only the two executor slots may have picked up work
        assert!(started <= 2, "started={started}");
        engine2.shutdown();
        for handle in handles {
            handle.abort();
        }
    }

    #[tokio::test]
    async fn report_status_writes_the_heartbeat_key() {
        let plane = Arc::new(FakePlane::new());
        let bus = Arc::new(MemBus::new());
        let engine = engine_with(plane, Arc::clone(&bus));
        engine.report_status().await;
        let workers = bus.list_workers().await.unwrap();
        assert_eq!(workers.len(), 1);
        assert_eq!(workers[0].worker_name, "w-test");
        assert!(!workers[0].update_time.is_empty());
    }
}
