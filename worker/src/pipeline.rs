// SPDX-FileCopyrightText: 2025 ScanOrch Authors
//
// SPDX-License-Identifier: GPL-2.0-or-later

//! Per task execution.
//!
//! Phases run strictly in order: portscan, fingerprint, pocscan. Each is
//! skippable by config, checkpointable at its boundary and guarded by the
//! control signal. A watchdog polls the signal once per second and
//! cancels the task on STOP; phase boundaries additionally handle PAUSE
//! by checkpointing through the control plane.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use models::rpc::{GetTemplatesByIdsReq, GetTemplatesByTagsReq, SaveTaskResultReq, SaveVulResultReq, UpdateTaskReq};
use models::scanner::{NmapOptions, NucleiOptions, ScanJob, ScanOptions, FingerprintOptions};
use models::{
    Asset, ControlSignal, Phase, PocScanConfig, PortScanConfig, TaskConfig, TaskInfo, TaskState,
    TaskStatus, Vulnerability,
};
use redis_bus::Bus;
use tokio::sync::{mpsc, watch};

use crate::client::TaskPlane;
use crate::httpcheck::HttpServiceTable;
use crate::logbus::{LogPublisher, TaskLogger};
use crate::mapping::{parse_app_name, WAPPALYZER_NUCLEI_MAPPING};
use crate::scanners::Scanners;
use crate::validate;
use crate::vulbuffer::{VulBuffer, FLUSH_INTERVAL_SECS, FLUSH_SIZE};

/// How a task run ended, from the worker's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
    /// STOP signal observed; the control plane owns the terminal state.
    Stopped,
    /// Checkpointed; the task re-enters the queue on resume.
    Paused,
}

/// Everything one task execution needs.
pub struct Pipeline {
    pub worker_name: String,
    pub client: Arc<dyn TaskPlane>,
    pub bus: Option<Arc<dyn Bus + Send + Sync>>,
    pub logger: LogPublisher,
    pub scanners: Scanners,
    pub http_table: Arc<HttpServiceTable>,
    /// Per task deadline; exceeding it fails the task with a timeout.
    pub task_timeout: Duration,
}

impl Pipeline {
    pub async fn execute(&self, task: &TaskInfo) -> Outcome {
        let start = Instant::now();
        let tlog = self.logger.task(&task.task_id);

        // the task may have been stopped while still queued
        if self.signal(&task.task_id).await == Some(ControlSignal::Stop) {
            tlog.info(format!("Task {} was stopped before execution", task.task_id))
                .await;
            return Outcome::Stopped;
        }

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let watchdog = self.spawn_watchdog(task.task_id.clone(), cancel_tx, tlog.clone());

        self.update_status(&task.task_id, TaskStatus::Started, "").await;

        let config = match TaskConfig::parse(&task.config) {
            Ok(config) => config,
            Err(e) => {
                watchdog.abort();
                self.update_status(
                    &task.task_id,
                    TaskStatus::Failure,
                    &format!("配置解析失败: {e}"),
                )
                .await;
                return Outcome::Failure;
            }
        };

        if config.task_type.as_deref() == Some("poc_validate") {
            let outcome = validate::execute(self, task, &tlog, start).await;
            watchdog.abort();
            return outcome;
        }

        if config.target.is_empty() {
            watchdog.abort();
            self.update_status(&task.task_id, TaskStatus::Failure, "目标为空")
                .await;
            return Outcome::Failure;
        }

        let outcome = match tokio::time::timeout(
            self.task_timeout,
            self.run_phases(task, &config, &tlog, cancel_rx, start),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => {
                tlog.error(format!(
                    "Task {} exceeded its {}s deadline",
                    task.task_id,
                    self.task_timeout.as_secs()
                ))
                .await;
                self.update_status(&task.task_id, TaskStatus::Failure, "timeout")
                    .await;
                Outcome::Failure
            }
        };
        watchdog.abort();
        outcome
    }

    async fn run_phases(
        &self,
        task: &TaskInfo,
        config: &TaskConfig,
        tlog: &TaskLogger,
        mut cancel: watch::Receiver<bool>,
        start: Instant,
    ) -> Outcome {
        let mut assets: Vec<Asset> = Vec::new();
        let mut completed: HashSet<String> = HashSet::new();
        let mut vul_count = 0usize;

        if let Some(raw) = config.resume_state.as_deref().filter(|s| !s.is_empty()) {
            match TaskState::parse(raw) {
                Ok(state) => {
                    tlog.info(format!(
                        "Resuming task from saved state: phases={:?}, assets={}",
                        state.completed_phases,
                        state.assets.len()
                    ))
                    .await;
                    completed.extend(state.completed_phases);
                    assets = state.assets;
                }
                Err(e) => {
                    tlog.warn(format!("Saved state unusable, starting over: {e}"))
                        .await
                }
            }
        }

        let portscan_cfg = config.portscan.clone().unwrap_or_default();
        tlog.info(format!(
            "Port threshold config: {} (0=no filter)",
            portscan_cfg.port_threshold
        ))
        .await;

        // ---- phase: portscan
        if portscan_cfg.enable && !completed.contains(&Phase::Portscan.to_string()) {
            match self.signal(&task.task_id).await {
                Some(ControlSignal::Stop) => {
                    tlog.info(format!("Task {} stopped during port scan phase", task.task_id))
                        .await;
                    return Outcome::Stopped;
                }
                Some(ControlSignal::Pause) => {
                    tlog.info(format!("Task {} paused during port scan phase", task.task_id))
                        .await;
                    return self.pause(task, &completed, &assets, tlog).await;
                }
                None => {}
            }
            match self
                .portscan(task, &portscan_cfg, tlog, &mut cancel)
                .await
            {
                Ok(found) => assets.extend(found),
                Err(outcome) => return outcome,
            }
            completed.insert(Phase::Portscan.to_string());
        }

        match self.signal(&task.task_id).await {
            Some(ControlSignal::Stop) => {
                tlog.info(format!("Task {} stopped after port scan", task.task_id))
                    .await;
                return Outcome::Stopped;
            }
            Some(ControlSignal::Pause) => {
                tlog.info(format!(
                    "Task {} paused after port scan, saving state...",
                    task.task_id
                ))
                .await;
                return self.pause(task, &completed, &assets, tlog).await;
            }
            None => {}
        }

        // ---- phase: fingerprint
        let fingerprint_cfg = config.fingerprint.clone().unwrap_or_default();
        if fingerprint_cfg.enable
            && !assets.is_empty()
            && !completed.contains(&Phase::Fingerprint.to_string())
        {
            if let Err(outcome) = self
                .fingerprint(task, fingerprint_cfg.custom_engine, &mut assets, tlog, &mut cancel)
                .await
            {
                return outcome;
            }
            completed.insert(Phase::Fingerprint.to_string());
        }

        match self.signal(&task.task_id).await {
            Some(ControlSignal::Stop) => {
                tlog.info(format!("Task {} stopped after fingerprint scan", task.task_id))
                    .await;
                return Outcome::Stopped;
            }
            Some(ControlSignal::Pause) => {
                tlog.info(format!(
                    "Task {} paused after fingerprint scan, saving state...",
                    task.task_id
                ))
                .await;
                return self.pause(task, &completed, &assets, tlog).await;
            }
            None => {}
        }

        // ---- phase: pocscan
        let pocscan_cfg = config.pocscan.clone().unwrap_or_default();
        if pocscan_cfg.enable
            && !assets.is_empty()
            && !completed.contains(&Phase::Pocscan.to_string())
        {
            match self
                .pocscan(task, &pocscan_cfg, &assets, tlog, &mut cancel)
                .await
            {
                Ok(count) => vul_count = count,
                Err(outcome) => return outcome,
            }
            completed.insert(Phase::Pocscan.to_string());
        }

        let duration = start.elapsed().as_secs();
        let result = format!("资产:{} 漏洞:{} 耗时:{}s", assets.len(), vul_count, duration);
        self.update_status(&task.task_id, TaskStatus::Success, &result)
            .await;
        tlog.info(format!("Task {} completed: {}", task.task_id, result))
            .await;
        Outcome::Success
    }

    /// Two stage port scan: fast discovery, then nmap service detection
    /// per host with a fallback to the bare discovery result.
    async fn portscan(
        &self,
        task: &TaskInfo,
        cfg: &PortScanConfig,
        tlog: &TaskLogger,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<Vec<Asset>, Outcome> {
        let tool = if cfg.tool.is_empty() { "naabu" } else { &cfg.tool };
        let scanner = match tool {
            "masscan" => &self.scanners.masscan,
            _ => &self.scanners.naabu,
        };
        tlog.info(format!(
            "Phase 1: Running {} for fast port discovery on target: {}",
            scanner.name(),
            task_target(task)
        ))
        .await;

        let job = ScanJob {
            target: task_target(task),
            options: ScanOptions::Port(cfg.clone()),
            ..Default::default()
        };
        let discovered = match self.guarded(cancel, scanner.scan(&job)).await {
            Some(Ok(output)) => output.assets,
            Some(Err(e)) => {
                tlog.error(format!("{} error: {e}", scanner.name())).await;
                Vec::new()
            }
            None => {
                tlog.info(format!("Task {} stopped during port scan phase", task.task_id))
                    .await;
                return Err(Outcome::Stopped);
            }
        };

        let total = discovered.len();
        let open_ports = self
            .filter_by_port_threshold(discovered, cfg.port_threshold, tlog)
            .await;
        tlog.info(format!(
            "{} found {} open ports (filtered from {})",
            scanner.name(),
            open_ports.len(),
            total
        ))
        .await;

        let mut assets = Vec::new();
        if open_ports.is_empty() {
            tlog.info(format!("No open ports found by {}", scanner.name()))
                .await;
            return Ok(assets);
        }

        tlog.info(format!(
            "Phase 2: Running Nmap for service detection on {} open ports",
            open_ports.len()
        ))
        .await;
        let mut host_ports: HashMap<String, Vec<Asset>> = HashMap::new();
        for asset in open_ports {
            host_ports.entry(asset.host.clone()).or_default().push(asset);
        }

        for (host, mut discovered) in host_ports {
            if *cancel.borrow() {
                tlog.info(format!("Task {} stopped during service detection", task.task_id))
                    .await;
                return Err(Outcome::Stopped);
            }
            let ports = discovered
                .iter()
                .map(|a| a.port.to_string())
                .collect::<Vec<_>>()
                .join(",");
            tlog.info(format!("Running Nmap on {host} with ports: {ports}"))
                .await;
            let job = ScanJob {
                target: host.clone(),
                options: ScanOptions::Nmap(NmapOptions {
                    ports,
                    timeout: cfg.timeout,
                }),
                ..Default::default()
            };
            match self.guarded(cancel, self.scanners.nmap.scan(&job)).await {
                Some(Ok(output)) if !output.assets.is_empty() => {
                    for mut asset in output.assets {
                        asset.is_http = self.http_table.is_http(&asset.service, asset.port);
                        assets.push(asset);
                    }
                }
                Some(Ok(_)) => {
                    // no nmap results, keep what discovery knew
                    for asset in &mut discovered {
                        asset.is_http = self.http_table.is_http(&asset.service, asset.port);
                    }
                    assets.append(&mut discovered);
                }
                Some(Err(e)) => {
                    tlog.error(format!("Nmap error for {host}: {e}")).await;
                    for asset in &mut discovered {
                        asset.is_http = self.http_table.is_http(&asset.service, asset.port);
                    }
                    assets.append(&mut discovered);
                }
                None => {
                    tlog.info(format!("Task {} stopped during service detection", task.task_id))
                        .await;
                    return Err(Outcome::Stopped);
                }
            }
        }

        tlog.info(format!(
            "Port scan completed: {} assets with service info",
            assets.len()
        ))
        .await;
        if !assets.is_empty() {
            tlog.info("Saving port scan results immediately...").await;
            self.save_assets(task, &assets, tlog).await;
        }
        Ok(assets)
    }

    async fn fingerprint(
        &self,
        task: &TaskInfo,
        custom_engine: bool,
        assets: &mut [Asset],
        tlog: &TaskLogger,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<(), Outcome> {
        tlog.info(format!("Running fingerprint scan on {} assets", assets.len()))
            .await;

        // mappings may have been edited since startup
        self.load_http_mappings().await;

        let mut custom_rules = Vec::new();
        if custom_engine {
            match self.client.custom_fingerprints(true).await {
                Ok(resp) if resp.success => {
                    tlog.info(format!(
                        "Loaded {} custom fingerprints into fingerprint scanner",
                        resp.fingerprints.len()
                    ))
                    .await;
                    custom_rules = resp.fingerprints;
                }
                Ok(resp) => tlog.error(format!("custom fingerprints failed: {}", resp.message)).await,
                Err(e) => tlog.error(format!("custom fingerprints RPC failed: {e}")).await,
            }
        }

        let job = ScanJob {
            assets: assets.to_vec(),
            options: ScanOptions::Fingerprint(FingerprintOptions { custom_rules }),
            ..Default::default()
        };
        match self.guarded(cancel, self.scanners.fingerprint.scan(&job)).await {
            Some(Ok(output)) => {
                let by_authority: HashMap<String, Asset> = output
                    .assets
                    .into_iter()
                    .map(|a| (a.authority(), a))
                    .collect();
                for asset in assets.iter_mut() {
                    if let Some(probed) = by_authority.get(&asset.authority()) {
                        asset.service = probed.service.clone();
                        asset.title = probed.title.clone();
                        asset.app = probed.app.clone();
                        asset.http_status = probed.http_status.clone();
                        asset.http_header = probed.http_header.clone();
                        asset.http_body = probed.http_body.clone();
                        asset.server = probed.server.clone();
                        asset.icon_hash = probed.icon_hash.clone();
                        asset.screenshot = probed.screenshot.clone();
                        if probed.is_http {
                            asset.is_http = true;
                        }
                    }
                }
                tlog.info("Saving fingerprint results...").await;
                self.save_assets(task, assets, tlog).await;
                Ok(())
            }
            Some(Err(e)) => {
                tlog.error(format!("Fingerprint error: {e}")).await;
                Ok(())
            }
            None => {
                tlog.info(format!("Task {} stopped during fingerprint scan", task.task_id))
                    .await;
                Err(Outcome::Stopped)
            }
        }
    }

    /// Resolves templates, drives nuclei and streams findings through the
    /// bounded buffer. Returns the number of unique findings.
    async fn pocscan(
        &self,
        task: &TaskInfo,
        cfg: &PocScanConfig,
        assets: &[Asset],
        tlog: &TaskLogger,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<usize, Outcome> {
        tlog.info(format!("Running Nuclei POC scan on {} assets", assets.len()))
            .await;

        let mut auto_tags: Vec<String> = Vec::new();
        let templates = if !cfg.nuclei_template_ids.is_empty() || !cfg.custom_poc_ids.is_empty() {
            let fetched = match self
                .client
                .templates_by_ids(&GetTemplatesByIdsReq {
                    nuclei_template_ids: cfg.nuclei_template_ids.clone(),
                    custom_poc_ids: cfg.custom_poc_ids.clone(),
                })
                .await
            {
                Ok(resp) => resp.templates,
                Err(e) => {
                    tlog.error(format!("GetTemplatesByIds RPC failed: {e}")).await;
                    Vec::new()
                }
            };
            tlog.info(format!(
                "Fetched {} templates by IDs from catalog (nuclei: {}, custom: {})",
                fetched.len(),
                cfg.nuclei_template_ids.len(),
                cfg.custom_poc_ids.len()
            ))
            .await;
            fetched
        } else if cfg.auto_scan || cfg.automatic_scan {
            auto_tags = generate_auto_tags(assets, cfg);
            tlog.info(format!("Auto-scan generated tags: {auto_tags:?}")).await;
            if auto_tags.is_empty() {
                tlog.error("No template IDs or auto-scan tags provided, POC scan will be skipped")
                    .await;
                Vec::new()
            } else {
                let severities: Vec<String> = cfg
                    .severity
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect();
                let fetched = match self
                    .client
                    .templates_by_tags(&GetTemplatesByTagsReq {
                        tags: auto_tags.clone(),
                        severities,
                    })
                    .await
                {
                    Ok(resp) => resp.templates,
                    Err(e) => {
                        tlog.error(format!("GetTemplatesByTags RPC failed: {e}")).await;
                        Vec::new()
                    }
                };
                tlog.info(format!("Fetched {} templates by tags from catalog", fetched.len()))
                    .await;
                fetched
            }
        } else {
            tlog.error("No template IDs or auto-scan tags provided, POC scan will be skipped")
                .await;
            Vec::new()
        };

        if templates.is_empty() {
            tlog.info("No templates available, skipping POC scan").await;
            return Ok(0);
        }

        let (buffer, mut flush_rx) = VulBuffer::new(FLUSH_SIZE);
        let buffer = Arc::new(buffer);
        let (found_tx, mut found_rx) = mpsc::unbounded_channel::<Vulnerability>();

        // background flusher: size signal or the five second ticker,
        // whichever fires first; also narrates findings as they arrive
        let flusher = {
            let buffer = Arc::clone(&buffer);
            let client = Arc::clone(&self.client);
            let tlog = tlog.clone();
            let workspace_id = task.workspace_id.clone();
            let main_task_id = task.main_task_id.clone();
            tokio::spawn(async move {
                let mut ticker =
                    tokio::time::interval(Duration::from_secs(FLUSH_INTERVAL_SECS));
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                let mut found = 0usize;
                loop {
                    tokio::select! {
                        maybe = found_rx.recv() => match maybe {
                            Some(vul) => {
                                found += 1;
                                tlog.info(format!(
                                    "Found vulnerability #{found}: {} on {}",
                                    vul.poc_file, vul.url
                                ))
                                .await;
                            }
                            None => break,
                        },
                        _ = flush_rx.recv() => {
                            flush(&client, &workspace_id, &main_task_id, &buffer, &tlog).await;
                        }
                        _ = ticker.tick() => {
                            flush(&client, &workspace_id, &main_task_id, &buffer, &tlog).await;
                        }
                    }
                }
            })
        };

        let on_finding = {
            let buffer = Arc::clone(&buffer);
            move |vul: Vulnerability| {
                let _ = found_tx.send(vul.clone());
                buffer.add(vul);
            }
        };
        let options = NucleiOptions {
            severity: cfg.severity.clone(),
            tags: auto_tags,
            exclude_tags: cfg.exclude_tags.clone(),
            rate_limit: if cfg.rate_limit > 0 { cfg.rate_limit } else { 150 },
            concurrency: if cfg.concurrency > 0 { cfg.concurrency } else { 25 },
            timeout: 0,
            custom_templates: templates,
            custom_poc_only: cfg.custom_poc_only,
            on_finding: Some(Arc::new(on_finding)),
        };
        tlog.info(format!(
            "Nuclei options: Templates={}, Tags={:?}",
            options.custom_templates.len(),
            options.tags
        ))
        .await;

        let job = ScanJob {
            assets: assets.to_vec(),
            options: ScanOptions::Nuclei(options),
            ..Default::default()
        };
        let scanned = self.guarded(cancel, self.scanners.nuclei.scan(&job)).await;

        // whatever happened, push out what is buffered
        flusher.abort();
        flush(
            &self.client,
            &task.workspace_id,
            &task.main_task_id,
            &buffer,
            tlog,
        )
        .await;

        match scanned {
            Some(Ok(output)) => {
                let count = output.vulnerabilities.len();
                if count > 0 {
                    tlog.info(format!(
                        "POC scan completed: {count} vulnerabilities found and saved"
                    ))
                    .await;
                } else {
                    tlog.info("POC scan completed, no vulnerabilities found").await;
                }
                Ok(count)
            }
            Some(Err(e)) => {
                tlog.error(format!("POC scan error: {e}")).await;
                Ok(0)
            }
            None => {
                tlog.info(format!("Task {} stopped during POC scan", task.task_id))
                    .await;
                Err(Outcome::Stopped)
            }
        }
    }

    /// Runs a scanner future under the cancel watch; `None` means the
    /// task was cancelled and the future dropped (killing any child
    /// process).
    async fn guarded<T>(
        &self,
        cancel: &mut watch::Receiver<bool>,
        fut: impl std::future::Future<Output = T>,
    ) -> Option<T> {
        if *cancel.borrow() {
            return None;
        }
        tokio::select! {
            result = fut => Some(result),
            _ = cancel.changed() => None,
        }
    }

    fn spawn_watchdog(
        &self,
        task_id: String,
        cancel_tx: watch::Sender<bool>,
        tlog: TaskLogger,
    ) -> tokio::task::JoinHandle<()> {
        let bus = self.bus.clone();
        tokio::spawn(async move {
            let Some(bus) = bus else { return };
            let mut ticker = tokio::time::interval(Duration::from_secs(1));
            loop {
                ticker.tick().await;
                if let Ok(Some(ControlSignal::Stop)) = bus.signal(&task_id).await {
                    tlog.info(format!(
                        "Task {task_id} received stop signal, cancelling context"
                    ))
                    .await;
                    let _ = cancel_tx.send(true);
                    return;
                }
            }
        })
    }

    async fn pause(
        &self,
        task: &TaskInfo,
        completed: &HashSet<String>,
        assets: &[Asset],
        tlog: &TaskLogger,
    ) -> Outcome {
        let mut phases: Vec<String> = completed.iter().cloned().collect();
        phases.sort();
        let state = TaskState {
            completed_phases: phases.clone(),
            assets: assets.to_vec(),
        };
        let _ = self
            .client
            .update_task(&UpdateTaskReq {
                task_id: task.task_id.clone(),
                state: TaskStatus::Paused.to_string(),
                worker: self.worker_name.clone(),
                result: state.to_json(),
            })
            .await;
        tlog.info(format!(
            "Task {} progress saved: completedPhases={:?}, assets={}",
            task.task_id,
            phases,
            assets.len()
        ))
        .await;
        Outcome::Paused
    }

    async fn filter_by_port_threshold(
        &self,
        assets: Vec<Asset>,
        threshold: u32,
        tlog: &TaskLogger,
    ) -> Vec<Asset> {
        if threshold == 0 {
            return assets;
        }
        let mut host_port_count: HashMap<&str, u32> = HashMap::new();
        for asset in &assets {
            *host_port_count.entry(asset.host.as_str()).or_default() += 1;
        }
        let filtered_hosts: HashSet<String> = host_port_count
            .iter()
            .filter(|(_, count)| **count > threshold)
            .map(|(host, _)| host.to_string())
            .collect();
        for host in &filtered_hosts {
            tlog.info(format!(
                "Host {host} has {} open ports (threshold: {threshold}), filtered as potential honeypot/firewall",
                host_port_count[host.as_str()]
            ))
            .await;
        }
        if filtered_hosts.is_empty() {
            return assets;
        }
        assets
            .into_iter()
            .filter(|a| !filtered_hosts.contains(&a.host))
            .collect()
    }

    pub(crate) async fn signal(&self, task_id: &str) -> Option<ControlSignal> {
        match &self.bus {
            Some(bus) => bus.signal(task_id).await.ok().flatten(),
            None => None,
        }
    }

    pub(crate) async fn update_status(&self, task_id: &str, status: TaskStatus, result: &str) {
        if let Err(e) = self
            .client
            .update_task(&UpdateTaskReq {
                task_id: task_id.to_string(),
                state: status.to_string(),
                worker: self.worker_name.clone(),
                result: result.to_string(),
            })
            .await
        {
            self.logger
                .task(task_id)
                .error(format!("update task status failed: {e}"))
                .await;
        }
    }

    pub(crate) async fn save_assets(&self, task: &TaskInfo, assets: &[Asset], tlog: &TaskLogger) {
        if assets.is_empty() {
            return;
        }
        tlog.info(format!(
            "Saving {} assets to workspace: {}",
            assets.len(),
            task.workspace_id
        ))
        .await;
        match self
            .client
            .save_task_result(&SaveTaskResultReq {
                workspace_id: task.workspace_id.clone(),
                main_task_id: task.main_task_id.clone(),
                assets: assets.to_vec(),
            })
            .await
        {
            Ok(resp) => tlog.info(format!("Save asset result: {}", resp.message)).await,
            Err(e) => tlog.error(format!("save asset result failed: {e}")).await,
        }
    }

    pub async fn load_http_mappings(&self) {
        match self.client.http_service_mappings(true).await {
            Ok(resp) if resp.success && !resp.mappings.is_empty() => {
                self.http_table.load(&resp.mappings);
                self.logger
                    .info(format!(
                        "Loaded {} HTTP service mappings from catalog",
                        resp.mappings.len()
                    ))
                    .await;
            }
            Ok(_) => {
                self.logger
                    .info("No HTTP service mappings found, using default mappings")
                    .await
            }
            Err(e) => {
                self.logger
                    .error(format!(
                        "GetHttpServiceMappings RPC failed: {e}, using default mappings"
                    ))
                    .await
            }
        }
    }
}

async fn flush(
    client: &Arc<dyn TaskPlane>,
    workspace_id: &str,
    main_task_id: &str,
    buffer: &VulBuffer,
    tlog: &TaskLogger,
) {
    let vuls = buffer.drain();
    if vuls.is_empty() {
        return;
    }
    if let Err(e) = client
        .save_vul_result(&SaveVulResultReq {
            workspace_id: workspace_id.to_string(),
            main_task_id: main_task_id.to_string(),
            vuls,
        })
        .await
    {
        tlog.error(format!("save vul result failed: {e}")).await;
    }
}

fn task_target(task: &TaskInfo) -> String {
    TaskConfig::parse(&task.config)
        .map(|c| c.target)
        .unwrap_or_default()
}

/// Derives nuclei tags from the apps the fingerprint phase attached.
pub(crate) fn generate_auto_tags(assets: &[Asset], cfg: &PocScanConfig) -> Vec<String> {
    let mut tags = BTreeSet::new();
    for asset in assets {
        for app in &asset.app {
            let app_name = parse_app_name(app).to_lowercase();
            if cfg.auto_scan {
                for (mapped_app, mapped_tags) in &cfg.tag_mappings {
                    if mapped_app.to_lowercase() == app_name {
                        tags.extend(mapped_tags.iter().cloned());
                        break;
                    }
                }
            }
            if cfg.automatic_scan {
                if let Some(mapped_tags) = WAPPALYZER_NUCLEI_MAPPING.get(app_name.as_str()) {
                    tags.extend(mapped_tags.iter().map(|t| t.to_string()));
                }
            }
        }
    }
    tags.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use models::scanner::{Error as ScanError, Lambda, Scan, ScanOutput};
    use models::Severity;
    use redis_bus::MemBus;

    use super::*;
    use crate::client::testing::FakePlane;

    fn noop() -> Arc<dyn Scan + Send + Sync> {
        Arc::new(Lambda::named("noop").with_scan(|_| Ok(ScanOutput::default())))
    }

    fn lambda_scanners() -> Scanners {
        Scanners {
            naabu: noop(),
            masscan: noop(),
            nmap: noop(),
            fingerprint: noop(),
            nuclei: noop(),
        }
    }

    struct Harness {
        plane: Arc<FakePlane>,
        bus: Arc<MemBus>,
        scanners: Scanners,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                plane: Arc::new(FakePlane::new()),
                bus: Arc::new(MemBus::new()),
                scanners: lambda_scanners(),
            }
        }

        fn pipeline(&self) -> Pipeline {
            let bus: Arc<dyn Bus + Send + Sync> = Arc::clone(&self.bus) as Arc<dyn Bus + Send + Sync>;
            Pipeline {
                worker_name: "w-test".into(),
                client: Arc::clone(&self.plane) as Arc<dyn TaskPlane>,
                bus: Some(bus.clone()),
                logger: LogPublisher::new(Some(bus), "w-test"),
                scanners: self.scanners.clone(),
                http_table: Arc::new(HttpServiceTable::new()),
                task_timeout: Duration::from_secs(120),
            }
        }

        async fn task_log_contains(&self, task_id: &str, needle: &str) -> bool {
            self.bus
                .task_logs(task_id, 1000)
                .await
                .unwrap()
                .iter()
                .any(|r| r.message.contains(needle))
        }
    }

    fn task(config: &str) -> TaskInfo {
        TaskInfo {
            task_id: "t1".into(),
            main_task_id: "m1".into(),
            workspace_id: "ws".into(),
            task_name: "scan".into(),
            config: config.to_string(),
            priority: 1,
        }
    }

    fn discovery(assets: Vec<Asset>) -> Arc<dyn Scan + Send + Sync> {
        Arc::new(Lambda::named("naabu").with_scan(move |_| {
            Ok(ScanOutput {
                assets: assets.clone(),
                vulnerabilities: vec![],
            })
        }))
    }

    const PORT_ONLY: &str = r#"{"target":"127.0.0.1",
        "portscan":{"enable":true,"ports":"80","tool":"naabu"},
        "fingerprint":{"enable":false},
        "pocscan":{"enable":false}}"#;

    #[tokio::test]
    async fn minimal_happy_path() {
        let mut harness = Harness::new();
        harness.scanners.naabu = discovery(vec![Asset::open_port("127.0.0.1", 80)]);
        // nmap answers with service info
        harness.scanners.nmap = Arc::new(Lambda::named("nmap").with_scan(|job| {
            let mut asset = Asset::open_port(&job.target, 80);
            asset.service = "http".into();
            Ok(ScanOutput {
                assets: vec![asset],
                vulnerabilities: vec![],
            })
        }));
        let p = harness.pipeline();

        let outcome = p.execute(&task(PORT_ONLY)).await;
        assert_eq!(outcome, Outcome::Success);
        assert_eq!(harness.plane.states("t1"), vec!["STARTED", "SUCCESS"]);

        let state = harness.plane.state.lock().unwrap();
        let last = state.updates.last().unwrap();
        assert!(last.result.starts_with("资产:1 漏洞:0 耗时:"), "{}", last.result);
        assert_eq!(state.saved_assets.len(), 1);
        assert_eq!(state.saved_assets[0].assets[0].authority, "127.0.0.1:80");
        assert!(state.saved_assets[0].assets[0].is_http);
        drop(state);
        assert!(harness.task_log_contains("t1", "Phase 1").await);
        assert!(harness.task_log_contains("t1", "Task t1 completed").await);
    }

    #[tokio::test]
    async fn empty_target_fails_without_retry() {
        let harness = Harness::new();
        let p = harness.pipeline();
        let outcome = p.execute(&task(r#"{"target":""}"#)).await;
        assert_eq!(outcome, Outcome::Failure);
        assert_eq!(harness.plane.last_state("t1").as_deref(), Some("FAILURE"));
        let state = harness.plane.state.lock().unwrap();
        assert_eq!(state.updates.last().unwrap().result, "目标为空");
    }

    #[tokio::test]
    async fn unparseable_config_fails() {
        let harness = Harness::new();
        let p = harness.pipeline();
        let outcome = p.execute(&task("{not json")).await;
        assert_eq!(outcome, Outcome::Failure);
        let state = harness.plane.state.lock().unwrap();
        assert!(state.updates.last().unwrap().result.starts_with("配置解析失败"));
    }

    #[tokio::test]
    async fn honeypot_hosts_are_dropped_entirely() {
        let mut harness = Harness::new();
        let mut assets: Vec<Asset> = (1..=60).map(|p| Asset::open_port("10.0.0.9", p)).collect();
        assets.push(Asset::open_port("10.0.0.1", 80));
        harness.scanners.naabu = discovery(assets);
        // no nmap results, discovery assets fall through
        let config = r#"{"target":"10.0.0.0/24",
            "portscan":{"enable":true,"ports":"top100","portThreshold":50},
            "fingerprint":{"enable":false},"pocscan":{"enable":false}}"#;
        let p = harness.pipeline();

        let outcome = p.execute(&task(config)).await;
        assert_eq!(outcome, Outcome::Success);
        let state = harness.plane.state.lock().unwrap();
        let saved: Vec<_> = state
            .saved_assets
            .iter()
            .flat_map(|r| r.assets.iter())
            .collect();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].host, "10.0.0.1");
        drop(state);
        assert!(
            harness
                .task_log_contains("t1", "filtered as potential honeypot")
                .await
        );
    }

    #[tokio::test]
    async fn threshold_zero_never_filters() {
        let mut harness = Harness::new();
        let assets: Vec<Asset> = (1..=30).map(|p| Asset::open_port("10.0.0.9", p)).collect();
        harness.scanners.naabu = discovery(assets);
        let config = r#"{"target":"10.0.0.9",
            "portscan":{"enable":true,"ports":"top100","portThreshold":0},
            "fingerprint":{"enable":false},"pocscan":{"enable":false}}"#;
        let p = harness.pipeline();
        p.execute(&task(config)).await;
        let state = harness.plane.state.lock().unwrap();
        let saved: usize = state.saved_assets.iter().map(|r| r.assets.len()).sum();
        assert_eq!(saved, 30);
    }

    #[tokio::test]
    async fn stop_before_execution_returns_silently() {
        let harness = Harness::new();
        harness
            .bus
            .set_signal("t1", ControlSignal::Stop)
            .await
            .unwrap();
        let p = harness.pipeline();
        let outcome = p.execute(&task(PORT_ONLY)).await;
        assert_eq!(outcome, Outcome::Stopped);
        // the worker never writes a state; the plane already did
        assert!(harness.plane.state.lock().unwrap().updates.is_empty());
    }

    #[tokio::test]
    async fn pause_checkpoints_with_a_parseable_state() {
        let harness = Harness::new();
        harness
            .bus
            .set_signal("t1", ControlSignal::Pause)
            .await
            .unwrap();
        let p = harness.pipeline();
        let outcome = p.execute(&task(PORT_ONLY)).await;
        assert_eq!(outcome, Outcome::Paused);
        let state = harness.plane.state.lock().unwrap();
        let last = state.updates.last().unwrap();
        assert_eq!(last.state, "PAUSED");
        let checkpoint = TaskState::parse(&last.result).unwrap();
        assert!(checkpoint.completed_phases.is_empty());
        assert!(checkpoint.assets.is_empty());
    }

    #[tokio::test]
    async fn resume_does_not_rerun_completed_phases() {
        let mut harness = Harness::new();
        let naabu_called = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&naabu_called);
        harness.scanners.naabu = Arc::new(Lambda::named("naabu").with_scan(move |_| {
            flag.store(true, Ordering::SeqCst);
            Ok(ScanOutput::default())
        }));
        harness.scanners.fingerprint = Arc::new(Lambda::named("fingerprint").with_scan(|job| {
            let mut enriched = job.assets.clone();
            for asset in &mut enriched {
                asset.title = "probed".into();
                asset.is_http = true;
            }
            Ok(ScanOutput {
                assets: enriched,
                vulnerabilities: vec![],
            })
        }));

        let mut restored = Asset::open_port("127.0.0.1", 80);
        restored.service = "http".into();
        let state = TaskState {
            completed_phases: vec!["portscan".into()],
            assets: vec![restored],
        };
        let config = serde_json::json!({
            "target": "127.0.0.1",
            "portscan": {"enable": true, "ports": "80"},
            "fingerprint": {"enable": true},
            "pocscan": {"enable": false},
            "resumeState": state.to_json(),
        });
        let p = harness.pipeline();

        let outcome = p.execute(&task(&config.to_string())).await;
        assert_eq!(outcome, Outcome::Success);
        assert!(!naabu_called.load(Ordering::SeqCst), "portscan ran twice");
        assert!(!harness.task_log_contains("t1", "Phase 1").await);
        assert!(harness.task_log_contains("t1", "Resuming task from saved state").await);

        // the fingerprint enrichment was merged and uploaded
        let state = harness.plane.state.lock().unwrap();
        let merged = state
            .saved_assets
            .iter()
            .flat_map(|r| r.assets.iter())
            .find(|a| a.title == "probed");
        assert!(merged.is_some());
        assert!(state.updates.last().unwrap().result.starts_with("资产:1"));
    }

    /// A nuclei stand-in that yields until cancelled.
    struct HangingNuclei;

    #[async_trait]
    impl Scan for HangingNuclei {
        fn name(&self) -> &str {
            "nuclei"
        }

        async fn scan(&self, _job: &ScanJob) -> Result<ScanOutput, ScanError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(ScanOutput::default())
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn stop_during_pocscan_cancels_within_the_watchdog_tick() {
        let mut harness = Harness::new();
        harness.scanners.nuclei = Arc::new(HangingNuclei);
        harness
            .plane
            .state
            .lock()
            .unwrap()
            .templates_by_id
            .insert("n1".into(), "id: n1".into());

        let mut asset = Asset::open_port("127.0.0.1", 80);
        asset.is_http = true;
        let state = TaskState {
            completed_phases: vec!["portscan".into(), "fingerprint".into()],
            assets: vec![asset],
        };
        let config = serde_json::json!({
            "target": "127.0.0.1",
            "portscan": {"enable": true},
            "fingerprint": {"enable": true},
            "pocscan": {"enable": true, "useNuclei": true, "nucleiTemplateIds": ["n1"]},
            "resumeState": state.to_json(),
        });
        let p = harness.pipeline();
        let bus = Arc::clone(&harness.bus);

        // stop arrives while nuclei is running
        let stopper = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            bus.set_signal("t1", ControlSignal::Stop).await.unwrap();
        });
        let started = Instant::now();
        let outcome = p.execute(&task(&config.to_string())).await;
        stopper.await.unwrap();

        assert_eq!(outcome, Outcome::Stopped);
        // watchdog granularity is one second
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(!harness.task_log_contains("t1", "POC scan completed").await);
        // the worker never writes a terminal state on stop
        assert_eq!(harness.plane.last_state("t1").as_deref(), Some("STARTED"));
    }

    #[tokio::test]
    async fn pocscan_streams_findings_through_the_buffer() {
        let mut harness = Harness::new();
        harness.scanners.nuclei = Arc::new(Lambda::named("nuclei").with_scan(|job| {
            let ScanOptions::Nuclei(opts) = &job.options else {
                return Err(ScanError::Unexpected("wrong options".into()));
            };
            assert!(!opts.custom_templates.is_empty());
            let mut vuls = Vec::new();
            for i in 0..12 {
                let vul = Vulnerability {
                    host: "127.0.0.1".into(),
                    port: 80,
                    poc_file: format!("poc-{i}"),
                    url: format!("http://127.0.0.1:80/{i}"),
                    severity: Severity::High,
                    source: "nuclei".into(),
                    ..Default::default()
                };
                if let Some(on_finding) = &opts.on_finding {
                    on_finding(vul.clone());
                }
                vuls.push(vul);
            }
            Ok(ScanOutput {
                assets: vec![],
                vulnerabilities: vuls,
            })
        }));
        harness
            .plane
            .state
            .lock()
            .unwrap()
            .templates_by_id
            .insert("good".into(), "id: good".into());

        let mut asset = Asset::open_port("127.0.0.1", 80);
        asset.is_http = true;
        let state = TaskState {
            completed_phases: vec!["portscan".into(), "fingerprint".into()],
            assets: vec![asset],
        };
        // one valid and one garbage id: the scan still completes
        let config = serde_json::json!({
            "target": "127.0.0.1",
            "portscan": {"enable": true},
            "fingerprint": {"enable": true},
            "pocscan": {"enable": true, "useNuclei": true,
                        "customPocIds": ["good", "garbage"]},
            "resumeState": state.to_json(),
        });
        let p = harness.pipeline();
        let outcome = p.execute(&task(&config.to_string())).await;
        assert_eq!(outcome, Outcome::Success);

        let state = harness.plane.state.lock().unwrap();
        assert_eq!(state.saved_vuls.len(), 12);
        assert!(state.updates.last().unwrap().result.contains("漏洞:12"));
        drop(state);
        assert!(harness.task_log_contains("t1", "POC scan completed: 12").await);
    }

    #[tokio::test]
    async fn pocscan_without_templates_or_tags_is_skipped_with_a_warning() {
        let harness = Harness::new();
        let mut asset = Asset::open_port("127.0.0.1", 80);
        asset.is_http = true;
        let state = TaskState {
            completed_phases: vec!["portscan".into(), "fingerprint".into()],
            assets: vec![asset],
        };
        let config = serde_json::json!({
            "target": "127.0.0.1",
            "pocscan": {"enable": true, "useNuclei": true},
            "resumeState": state.to_json(),
        });
        let p = harness.pipeline();
        let outcome = p.execute(&task(&config.to_string())).await;
        assert_eq!(outcome, Outcome::Success);
        assert!(
            harness
                .task_log_contains("t1", "POC scan will be skipped")
                .await
        );
        assert!(harness.plane.state.lock().unwrap().saved_vuls.is_empty());
    }

    #[test]
    fn auto_tags_from_catalog_mappings() {
        let mut asset = Asset::open_port("h", 80);
        asset.app = vec!["Nginx:1.18.0[header]".into(), "Unknown".into()];
        let cfg = PocScanConfig {
            auto_scan: true,
            tag_mappings: [("nginx".to_string(), vec!["nginx".to_string(), "cve".to_string()])]
                .into_iter()
                .collect(),
            ..Default::default()
        };
        assert_eq!(generate_auto_tags(&[asset], &cfg), vec!["cve", "nginx"]);
    }

    #[test]
    fn auto_tags_from_builtin_wappalyzer_mapping() {
        let mut asset = Asset::open_port("h", 80);
        asset.app = vec!["WordPress:6.1".into()];
        let cfg = PocScanConfig {
            automatic_scan: true,
            ..Default::default()
        };
        let tags = generate_auto_tags(&[asset], &cfg);
        assert!(tags.contains(&"wordpress".to_string()));
        assert!(tags.contains(&"wp-plugin".to_string()));
    }

    #[test]
    fn auto_tags_empty_without_a_mode() {
        let mut asset = Asset::open_port("h", 80);
        asset.app = vec!["nginx".into()];
        assert!(generate_auto_tags(&[asset], &PocScanConfig::default()).is_empty());
    }

}
