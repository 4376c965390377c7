// SPDX-FileCopyrightText: 2025 ScanOrch Authors
//
// SPDX-License-Identifier: GPL-2.0-or-later

//! The task lifecycle.
//!
//! Every state change of a task record goes through [`TaskControl`], which
//! owns the storage and the bus so that the transition table, the control
//! signal writes and the queue pushes cannot drift apart.

use std::collections::HashSet;
use std::fmt::Display;

use models::{
    ControlSignal, MainTask, Severity, TaskConfig, TaskInfo, TaskInfoMapping, TaskStatus,
};
use redis_bus::{Bus, BusError};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::storage::{self, CatalogStore, Storage, TaskUpdate};

#[derive(Debug)]
pub enum Error {
    /// The task (or its profile) does not exist.
    NotFound,
    /// The requested operation is not allowed in the task's current state.
    InvalidState(String),
    /// The request itself is malformed (empty target, unparseable config).
    InvalidInput(String),
    Storage(storage::Error),
    Bus(BusError),
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::NotFound => write!(f, "task was not found"),
            Error::InvalidState(e) => write!(f, "invalid state: {e}"),
            Error::InvalidInput(e) => write!(f, "invalid input: {e}"),
            Error::Storage(e) => write!(f, "storage error occurred: {e}"),
            Error::Bus(e) => write!(f, "bus error occurred: {e}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<storage::Error> for Error {
    fn from(value: storage::Error) -> Self {
        match value {
            storage::Error::NotFound => Self::NotFound,
            value => Self::Storage(value),
        }
    }
}

impl From<BusError> for Error {
    fn from(value: BusError) -> Self {
        Self::Bus(value)
    }
}

/// Parameters of task creation; updates reuse the same shape.
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub name: String,
    pub target: String,
    pub profile_id: String,
    pub is_cron: bool,
    pub cron_rule: String,
}

/// Core component of the control plane; owns task records, the queue and
/// the control signal keyspace.
#[derive(Debug)]
pub struct TaskControl<DB, B> {
    db: DB,
    bus: B,
    /// Workers flagged for shutdown at their next heartbeat.
    stop_flags: RwLock<HashSet<String>>,
    /// Workers flagged for a config reload at their next heartbeat.
    reload_flags: RwLock<HashSet<String>>,
}

impl<DB, B> TaskControl<DB, B> {
    pub fn new(db: DB, bus: B) -> Self {
        Self {
            db,
            bus,
            stop_flags: RwLock::new(HashSet::new()),
            reload_flags: RwLock::new(HashSet::new()),
        }
    }

    pub fn storage(&self) -> &DB {
        &self.db
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub async fn flag_worker_stop(&self, name: &str) {
        self.stop_flags.write().await.insert(name.to_string());
    }

    pub async fn flag_worker_reload(&self, name: &str) {
        self.reload_flags.write().await.insert(name.to_string());
    }
}

impl<DB, B> TaskControl<DB, B>
where
    DB: Storage + Send + Sync + 'static,
    B: Bus + Send + Sync,
{
    /// Creates a task in CREATED: the config is resolved and catalog
    /// references injected, but nothing is queued yet.
    pub async fn create(&self, workspace_id: &str, req: NewTask) -> Result<String, Error> {
        if req.target.trim().is_empty() {
            return Err(Error::InvalidInput("target is empty".to_string()));
        }
        let profile = self.db.find_profile(&req.profile_id).await?;
        let config = self.resolve_config(&req.target, &profile.config).await?;

        let task = MainTask {
            id: Uuid::new_v4().to_string(),
            task_id: Uuid::new_v4().to_string(),
            workspace_id: workspace_id.to_string(),
            name: req.name,
            target: req.target,
            profile_id: profile.id.clone(),
            profile_name: profile.name.clone(),
            config,
            status: TaskStatus::Created,
            is_cron: req.is_cron,
            cron_rule: req.cron_rule,
            ..Default::default()
        };
        let id = task.id.clone();
        self.db.insert_task(workspace_id, task).await?;
        tracing::info!(%id, workspace_id, "task created, waiting for start");
        Ok(id)
    }

    /// Re-resolves a CREATED task. Any other state is rejected.
    pub async fn update(&self, workspace_id: &str, id: &str, req: NewTask) -> Result<(), Error> {
        let task = self.db.find_task(workspace_id, id).await?;
        if task.status != TaskStatus::Created {
            return Err(Error::InvalidState(
                "only tasks waiting for start can be edited".to_string(),
            ));
        }
        let profile = self.db.find_profile(&req.profile_id).await?;
        let config = self.resolve_config(&req.target, &profile.config).await?;
        self.db
            .update_task(
                workspace_id,
                id,
                TaskUpdate {
                    name: Some(req.name),
                    target: Some(req.target),
                    profile_id: Some(profile.id.clone()),
                    profile_name: Some(profile.name.clone()),
                    config: Some(config),
                    ..Default::default()
                },
            )
            .await?;
        Ok(())
    }

    /// CREATED -> PENDING: enqueue and publish the task info mapping.
    pub async fn start(&self, workspace_id: &str, id: &str) -> Result<(), Error> {
        let task = self.db.find_task(workspace_id, id).await?;
        if task.status != TaskStatus::Created {
            return Err(Error::InvalidState(
                "only tasks waiting for start can be started".to_string(),
            ));
        }
        self.set_status(workspace_id, id, TaskStatus::Pending).await?;
        self.enqueue(workspace_id, &task, task.config.clone()).await?;
        tracing::info!(task_id = %task.task_id, workspace_id, "task queued");
        Ok(())
    }

    /// STARTED -> PAUSED: the worker checkpoints at the next phase
    /// boundary; resumption stays crash safe because the state blob is
    /// persisted on the record, not on the worker.
    pub async fn pause(&self, workspace_id: &str, id: &str) -> Result<(), Error> {
        let task = self.db.find_task(workspace_id, id).await?;
        if task.status != TaskStatus::Started {
            return Err(Error::InvalidState(
                "only running tasks can be paused".to_string(),
            ));
        }
        self.bus.set_signal(&task.task_id, ControlSignal::Pause).await?;
        self.set_status(workspace_id, id, TaskStatus::Paused).await?;
        tracing::info!(task_id = %task.task_id, "task paused");
        Ok(())
    }

    /// PAUSED -> PENDING: clear the signal, embed the saved checkpoint
    /// into the config and re-enqueue.
    pub async fn resume(&self, workspace_id: &str, id: &str) -> Result<(), Error> {
        let task = self.db.find_task(workspace_id, id).await?;
        if task.status != TaskStatus::Paused {
            return Err(Error::InvalidState(
                "only paused tasks can be resumed".to_string(),
            ));
        }
        self.bus.clear_signal(&task.task_id).await?;
        self.set_status(workspace_id, id, TaskStatus::Pending).await?;

        let mut config = task.config.clone();
        if !task.task_state.is_empty() {
            if let Ok(mut parsed) = TaskConfig::parse(&config) {
                parsed.resume_state = Some(task.task_state.clone());
                config = parsed.to_json();
            }
        }
        self.enqueue(workspace_id, &task, config).await?;
        tracing::info!(task_id = %task.task_id, has_state = !task.task_state.is_empty(), "task resumed");
        Ok(())
    }

    /// STARTED/PAUSED/PENDING -> STOPPED. The terminal state is written
    /// here; the worker aborts without another status update.
    pub async fn stop(&self, workspace_id: &str, id: &str) -> Result<(), Error> {
        let task = self.db.find_task(workspace_id, id).await?;
        if !matches!(
            task.status,
            TaskStatus::Started | TaskStatus::Paused | TaskStatus::Pending
        ) {
            return Err(Error::InvalidState(
                "task cannot be stopped in its current state".to_string(),
            ));
        }
        self.bus.set_signal(&task.task_id, ControlSignal::Stop).await?;
        self.db
            .update_task(
                workspace_id,
                id,
                TaskUpdate {
                    status: Some(TaskStatus::Stopped),
                    result: Some("任务已手动停止".to_string()),
                    ..Default::default()
                },
            )
            .await?;
        tracing::info!(task_id = %task.task_id, "task stopped");
        Ok(())
    }

    /// Terminal -> PENDING with a fresh `task_id`; the config is
    /// re-resolved so catalog edits made since the last run take effect.
    pub async fn retry(&self, workspace_id: &str, id: &str) -> Result<(), Error> {
        let task = self.db.find_task(workspace_id, id).await?;
        if !task.status.is_terminal() {
            return Err(Error::InvalidState(
                "only finished tasks can be retried".to_string(),
            ));
        }
        let profile = self.db.find_profile(&task.profile_id).await?;
        let config = self.resolve_config(&task.target, &profile.config).await?;
        let task_id = Uuid::new_v4().to_string();
        self.db
            .update_task(
                workspace_id,
                id,
                TaskUpdate {
                    task_id: Some(task_id.clone()),
                    status: Some(TaskStatus::Pending),
                    progress: Some(0),
                    result: Some(String::new()),
                    task_state: Some(String::new()),
                    config: Some(config.clone()),
                    ..Default::default()
                },
            )
            .await?;
        let rotated = MainTask {
            task_id,
            ..task
        };
        self.enqueue(workspace_id, &rotated, config).await?;
        tracing::info!(task_id = %rotated.task_id, "task retried");
        Ok(())
    }

    /// Hands the next queued task to a claiming worker.
    pub async fn check_task(&self, worker_name: &str) -> Result<Option<TaskInfo>, Error> {
        let task = self.bus.pop_task().await?;
        if let Some(info) = &task {
            tracing::debug!(task_id = %info.task_id, worker_name, "task claimed");
        }
        Ok(task)
    }

    /// State update written by a worker. A STOPPED record never moves
    /// again, no matter what the worker reports afterwards.
    pub async fn update_from_worker(
        &self,
        task_id: &str,
        state: &str,
        worker: &str,
        result: &str,
    ) -> Result<(), Error> {
        let status: TaskStatus = state
            .parse()
            .map_err(|e: String| Error::InvalidInput(e))?;
        let (workspace_id, task) = self.db.find_task_by_task_id(task_id).await?;
        if task.status == TaskStatus::Stopped {
            tracing::debug!(task_id, state, "ignoring update for stopped task");
            return Ok(());
        }

        let update = match status {
            TaskStatus::Paused => TaskUpdate {
                status: Some(TaskStatus::Paused),
                task_state: Some(result.to_string()),
                ..Default::default()
            },
            TaskStatus::Success => TaskUpdate {
                status: Some(TaskStatus::Success),
                progress: Some(100),
                result: Some(result.to_string()),
                ..Default::default()
            },
            TaskStatus::Failure => TaskUpdate {
                status: Some(TaskStatus::Failure),
                result: Some(result.to_string()),
                ..Default::default()
            },
            other => TaskUpdate {
                status: Some(other),
                ..Default::default()
            },
        };
        if !worker.is_empty() {
            tracing::debug!(task_id, worker, state, "worker status update");
        }
        self.db.update_task(&workspace_id, &task.id, update).await?;
        Ok(())
    }

    /// Stores a heartbeat and answers with the manual control flags. A
    /// consumed flag is cleared so it fires exactly once.
    pub async fn keepalive(
        &self,
        status: &models::WorkerStatus,
    ) -> Result<(bool, bool), Error> {
        self.bus.put_heartbeat(status).await?;
        let stop = self.stop_flags.write().await.remove(&status.worker_name);
        let reload = self.reload_flags.write().await.remove(&status.worker_name);
        Ok((stop, reload))
    }

    async fn set_status(
        &self,
        workspace_id: &str,
        id: &str,
        status: TaskStatus,
    ) -> Result<(), Error> {
        self.db
            .update_task(
                workspace_id,
                id,
                TaskUpdate {
                    status: Some(status),
                    ..Default::default()
                },
            )
            .await?;
        Ok(())
    }

    async fn enqueue(
        &self,
        workspace_id: &str,
        task: &MainTask,
        config: String,
    ) -> Result<(), Error> {
        self.bus
            .push_task(&TaskInfo {
                task_id: task.task_id.clone(),
                main_task_id: task.id.clone(),
                workspace_id: workspace_id.to_string(),
                task_name: task.name.clone(),
                config,
                priority: 1,
            })
            .await?;
        self.bus
            .set_task_info(
                &task.task_id,
                &TaskInfoMapping {
                    workspace_id: workspace_id.to_string(),
                    main_task_id: task.id.clone(),
                    ..Default::default()
                },
            )
            .await?;
        Ok(())
    }

    /// Merges the profile body with the target and injects catalog
    /// references.
    async fn resolve_config(&self, target: &str, profile_config: &str) -> Result<String, Error> {
        let mut config = if profile_config.is_empty() {
            TaskConfig::default()
        } else {
            TaskConfig::parse(profile_config)
                .map_err(|e| Error::InvalidInput(format!("unparseable profile config: {e}")))?
        };
        config.target = target.to_string();
        inject_poc_config(&self.db, &mut config).await?;
        Ok(config.to_json())
    }
}

/// Injects catalog references into the `pocscan` section: IDs, never
/// content, so payloads stay bounded and catalog edits reach queued tasks.
///
/// Used by creation, update and retry alike, which keeps the paths
/// behavior-equivalent by construction.
pub async fn inject_poc_config<DB: CatalogStore + Sync>(
    db: &DB,
    config: &mut TaskConfig,
) -> Result<(), storage::Error> {
    let Some(pocscan) = config.pocscan.as_mut() else {
        return Ok(());
    };
    if !pocscan.enable || !pocscan.use_nuclei {
        return Ok(());
    }

    // Auto-scan modes defer template selection until after fingerprinting;
    // the worker resolves templates from the discovered apps.
    if pocscan.auto_scan || pocscan.automatic_scan {
        if pocscan.auto_scan {
            let mappings = db.enabled_tag_mappings().await?;
            if !mappings.is_empty() {
                pocscan.tag_mappings = mappings
                    .into_iter()
                    .map(|m| (m.app_name, m.nuclei_tags))
                    .collect();
                tracing::info!(
                    count = pocscan.tag_mappings.len(),
                    "injected tag mappings for auto-scan"
                );
            }
        }
        return Ok(());
    }

    if pocscan.custom_poc_only {
        let pocs = db.enabled_custom_pocs().await?;
        pocscan.custom_poc_ids = pocs.into_iter().map(|p| p.id).collect();
        tracing::info!(
            count = pocscan.custom_poc_ids.len(),
            "injected custom POC ids (custom only)"
        );
        return Ok(());
    }

    if !pocscan.severity.is_empty() {
        let severities: Vec<Severity> = Severity::parse_list(&pocscan.severity);
        let templates = db.templates_by_severity(&severities).await?;
        pocscan.nuclei_template_ids = templates.into_iter().map(|t| t.id).collect();
        tracing::info!(
            count = pocscan.nuclei_template_ids.len(),
            severity = %pocscan.severity,
            "injected nuclei template ids"
        );
    }
    let pocs = db.enabled_custom_pocs().await?;
    pocscan.custom_poc_ids = pocs.into_iter().map(|p| p.id).collect();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::inmemory;
    use crate::storage::{ProfileStorer, TaskStorer};
    use models::{CustomPoc, NucleiTemplate, PocScanConfig, TagMapping, TaskProfile};
    use redis_bus::MemBus;

    async fn control() -> TaskControl<inmemory::Storage, MemBus> {
        let db = inmemory::Storage::new();
        db.insert_profile(TaskProfile {
            id: "p1".into(),
            name: "default".into(),
            config: r#"{"portscan":{"enable":true,"ports":"80"}}"#.into(),
            ..Default::default()
        })
        .await
        .unwrap();
        TaskControl::new(db, MemBus::new())
    }

    fn new_task() -> NewTask {
        NewTask {
            name: "t".into(),
            target: "127.0.0.1".into(),
            profile_id: "p1".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn create_does_not_enqueue() {
        let ctl = control().await;
        let id = ctl.create("ws", new_task()).await.unwrap();
        let task = ctl.storage().find_task("ws", &id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Created);
        assert_eq!(ctl.bus().queued_len(), 0);
        // the target was merged into the resolved config
        let cfg = TaskConfig::parse(&task.config).unwrap();
        assert_eq!(cfg.target, "127.0.0.1");
        assert_eq!(cfg.portscan.unwrap().ports, "80");
    }

    #[tokio::test]
    async fn empty_target_is_rejected() {
        let ctl = control().await;
        let req = NewTask {
            target: "  ".into(),
            ..new_task()
        };
        assert!(matches!(
            ctl.create("ws", req).await,
            Err(Error::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn start_moves_to_pending_and_enqueues() {
        let ctl = control().await;
        let id = ctl.create("ws", new_task()).await.unwrap();
        ctl.start("ws", &id).await.unwrap();
        let task = ctl.storage().find_task("ws", &id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        let queued = ctl.bus().pop_task().await.unwrap().unwrap();
        assert_eq!(queued.task_id, task.task_id);
        assert_eq!(queued.main_task_id, id);
        // the task info mapping is published alongside
        let info = ctl.bus().task_info(&task.task_id).await.unwrap().unwrap();
        assert_eq!(info.workspace_id, "ws");
        // starting twice is rejected
        assert!(matches!(
            ctl.start("ws", &id).await,
            Err(Error::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn update_only_in_created() {
        let ctl = control().await;
        let id = ctl.create("ws", new_task()).await.unwrap();
        ctl.update("ws", &id, new_task()).await.unwrap();
        ctl.start("ws", &id).await.unwrap();
        assert!(matches!(
            ctl.update("ws", &id, new_task()).await,
            Err(Error::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn pause_resume_cycle() {
        let ctl = control().await;
        let id = ctl.create("ws", new_task()).await.unwrap();
        ctl.start("ws", &id).await.unwrap();
        let task = ctl.storage().find_task("ws", &id).await.unwrap();

        // worker claims and reports STARTED, then checkpoints
        ctl.update_from_worker(&task.task_id, "STARTED", "w1", "")
            .await
            .unwrap();
        ctl.pause("ws", &id).await.unwrap();
        assert_eq!(
            ctl.bus().signal(&task.task_id).await.unwrap(),
            Some(ControlSignal::Pause)
        );
        let state = r#"{"completedPhases":["portscan"],"assets":[]}"#;
        ctl.update_from_worker(&task.task_id, "PAUSED", "w1", state)
            .await
            .unwrap();
        let paused = ctl.storage().find_task("ws", &id).await.unwrap();
        assert_eq!(paused.status, TaskStatus::Paused);
        assert_eq!(paused.task_state, state);

        // resume clears the signal and embeds the checkpoint
        ctl.bus().pop_task().await.unwrap();
        ctl.resume("ws", &id).await.unwrap();
        assert_eq!(ctl.bus().signal(&task.task_id).await.unwrap(), None);
        let queued = ctl.bus().pop_task().await.unwrap().unwrap();
        let cfg = TaskConfig::parse(&queued.config).unwrap();
        assert_eq!(cfg.resume_state.as_deref(), Some(state));
    }

    #[tokio::test]
    async fn stop_is_a_sink_for_worker_updates() {
        let ctl = control().await;
        let id = ctl.create("ws", new_task()).await.unwrap();
        ctl.start("ws", &id).await.unwrap();
        let task = ctl.storage().find_task("ws", &id).await.unwrap();
        ctl.update_from_worker(&task.task_id, "STARTED", "w1", "")
            .await
            .unwrap();
        ctl.stop("ws", &id).await.unwrap();
        assert_eq!(
            ctl.bus().signal(&task.task_id).await.unwrap(),
            Some(ControlSignal::Stop)
        );

        // a late SUCCESS from the worker must not win
        ctl.update_from_worker(&task.task_id, "SUCCESS", "w1", "done")
            .await
            .unwrap();
        let stopped = ctl.storage().find_task("ws", &id).await.unwrap();
        assert_eq!(stopped.status, TaskStatus::Stopped);
    }

    #[tokio::test]
    async fn retry_rotates_the_task_id() {
        let ctl = control().await;
        let id = ctl.create("ws", new_task()).await.unwrap();
        ctl.start("ws", &id).await.unwrap();
        let first = ctl.storage().find_task("ws", &id).await.unwrap();
        ctl.update_from_worker(&first.task_id, "STARTED", "w1", "")
            .await
            .unwrap();
        ctl.update_from_worker(&first.task_id, "FAILURE", "w1", "boom")
            .await
            .unwrap();

        ctl.retry("ws", &id).await.unwrap();
        let retried = ctl.storage().find_task("ws", &id).await.unwrap();
        assert_ne!(retried.task_id, first.task_id);
        assert_eq!(retried.status, TaskStatus::Pending);
        assert_eq!(retried.progress, 0);
        assert_eq!(retried.result, "");
        // retrying a running task is rejected
        assert!(matches!(
            ctl.retry("ws", &id).await,
            Err(Error::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn keepalive_flags_fire_once() {
        let ctl = control().await;
        let status = models::WorkerStatus {
            worker_name: "w1".into(),
            ..Default::default()
        };
        assert_eq!(ctl.keepalive(&status).await.unwrap(), (false, false));
        ctl.flag_worker_stop("w1").await;
        assert_eq!(ctl.keepalive(&status).await.unwrap(), (true, false));
        assert_eq!(ctl.keepalive(&status).await.unwrap(), (false, false));
    }

    async fn seeded_db() -> inmemory::Storage {
        let db = inmemory::Storage::new();
        db.seed_templates(vec![
            NucleiTemplate {
                id: "n1".into(),
                template_id: "cve-a".into(),
                severity: models::Severity::Critical,
                enabled: true,
                ..Default::default()
            },
            NucleiTemplate {
                id: "n2".into(),
                template_id: "cve-b".into(),
                severity: models::Severity::Info,
                enabled: true,
                ..Default::default()
            },
        ])
        .await;
        db.seed_custom_pocs(vec![
            CustomPoc {
                id: "c1".into(),
                enabled: true,
                ..Default::default()
            },
            CustomPoc {
                id: "c2".into(),
                enabled: false,
                ..Default::default()
            },
        ])
        .await;
        db.seed_tag_mappings(vec![TagMapping {
            id: "m1".into(),
            app_name: "nginx".into(),
            nuclei_tags: vec!["nginx".into()],
            enabled: true,
            ..Default::default()
        }])
        .await;
        db
    }

    fn poc_config(f: impl FnOnce(&mut PocScanConfig)) -> TaskConfig {
        let mut poc = PocScanConfig {
            enable: true,
            use_nuclei: true,
            ..Default::default()
        };
        f(&mut poc);
        TaskConfig {
            pocscan: Some(poc),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn injection_disabled_when_poc_scan_off() {
        let db = seeded_db().await;
        let mut cfg = poc_config(|p| p.enable = false);
        inject_poc_config(&db, &mut cfg).await.unwrap();
        let poc = cfg.pocscan.unwrap();
        assert!(poc.nuclei_template_ids.is_empty());
        assert!(poc.custom_poc_ids.is_empty());
    }

    #[tokio::test]
    async fn auto_scan_injects_mappings_not_ids() {
        let db = seeded_db().await;
        let mut cfg = poc_config(|p| p.auto_scan = true);
        inject_poc_config(&db, &mut cfg).await.unwrap();
        let poc = cfg.pocscan.unwrap();
        assert!(poc.nuclei_template_ids.is_empty());
        assert_eq!(poc.tag_mappings["nginx"], vec!["nginx"]);
    }

    #[tokio::test]
    async fn automatic_scan_injects_nothing() {
        let db = seeded_db().await;
        let mut cfg = poc_config(|p| p.automatic_scan = true);
        inject_poc_config(&db, &mut cfg).await.unwrap();
        let poc = cfg.pocscan.unwrap();
        assert!(poc.nuclei_template_ids.is_empty());
        assert!(poc.tag_mappings.is_empty());
    }

    #[tokio::test]
    async fn custom_poc_only_injects_enabled_custom_ids() {
        let db = seeded_db().await;
        let mut cfg = poc_config(|p| p.custom_poc_only = true);
        inject_poc_config(&db, &mut cfg).await.unwrap();
        let poc = cfg.pocscan.unwrap();
        assert!(poc.nuclei_template_ids.is_empty());
        assert_eq!(poc.custom_poc_ids, vec!["c1"]);
    }

    #[tokio::test]
    async fn default_injects_severity_filtered_templates_plus_custom() {
        let db = seeded_db().await;
        let mut cfg = poc_config(|p| p.severity = "critical,high".into());
        inject_poc_config(&db, &mut cfg).await.unwrap();
        let poc = cfg.pocscan.unwrap();
        assert_eq!(poc.nuclei_template_ids, vec!["n1"]);
        assert_eq!(poc.custom_poc_ids, vec!["c1"]);
    }
}
