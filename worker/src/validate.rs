// SPDX-FileCopyrightText: 2025 ScanOrch Authors
//
// SPDX-License-Identifier: GPL-2.0-or-later

//! POC validation tasks.
//!
//! A validation task drives one POC (or a tag selection) against a single
//! URL; the outcome lands on the bus under the task result key instead of
//! the vulnerability collection.

use std::sync::Arc;
use std::time::Instant;

use models::rpc::{GetPocByIdReq, GetTemplatesByTagsReq, PocValidationResultData};
use models::scanner::{NucleiOptions, ScanJob, ScanOptions};
use models::{PocValidateConfig, PocValidationResult, Severity, TaskInfo, TaskStatus};

use crate::logbus::TaskLogger;
use crate::pipeline::{Outcome, Pipeline};

pub async fn execute(
    p: &Pipeline,
    task: &TaskInfo,
    tlog: &TaskLogger,
    start: Instant,
) -> Outcome {
    let cfg = match serde_json::from_str::<PocValidateConfig>(&task.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            let msg = format!("配置解析失败: {e}");
            p.update_status(&task.task_id, TaskStatus::Failure, &msg).await;
            store_result(p, task, vec![], Some(msg)).await;
            return Outcome::Failure;
        }
    };
    tlog.info(format!(
        "Received POC validation task, target: {}",
        cfg.url
    ))
    .await;

    if cfg.url.is_empty() {
        tlog.error("POC validation failed: URL为空").await;
        p.update_status(&task.task_id, TaskStatus::Failure, "URL为空").await;
        store_result(p, task, vec![], Some("URL为空".to_string())).await;
        return Outcome::Failure;
    }

    // resolve the template set
    let mut poc_name = String::new();
    let mut poc_severity = Severity::Unknown;
    let mut poc_type = cfg.poc_type.clone();
    let templates = if !cfg.poc_id.is_empty() {
        tlog.info("Loading POC template...").await;
        match p
            .client
            .poc_by_id(&GetPocByIdReq {
                poc_id: cfg.poc_id.clone(),
                poc_type: cfg.poc_type.clone(),
            })
            .await
        {
            Ok(resp) if resp.success && !resp.content.is_empty() => {
                poc_name = resp.name;
                poc_severity = Severity::parse(&resp.severity);
                poc_type = resp.poc_type;
                tlog.info(format!("POC template loaded: {poc_name}")).await;
                vec![resp.content]
            }
            Ok(resp) => {
                let msg = format!("POC不存在: {}", resp.message);
                tlog.error(format!("POC validation failed: {msg}")).await;
                p.update_status(&task.task_id, TaskStatus::Failure, &msg).await;
                store_result(p, task, vec![], Some(msg)).await;
                return Outcome::Failure;
            }
            Err(e) => {
                let msg = format!("获取POC失败: {e}");
                tlog.error(format!("POC validation failed: {msg}")).await;
                p.update_status(&task.task_id, TaskStatus::Failure, &msg).await;
                store_result(p, task, vec![], Some(msg)).await;
                return Outcome::Failure;
            }
        }
    } else if !cfg.tags.is_empty() {
        match p
            .client
            .templates_by_tags(&GetTemplatesByTagsReq {
                tags: cfg.tags.clone(),
                severities: cfg.severities.clone(),
            })
            .await
        {
            Ok(resp) => resp.templates,
            Err(e) => {
                tlog.error(format!("GetTemplatesByTags RPC failed: {e}")).await;
                vec![]
            }
        }
    } else {
        vec![]
    };

    if templates.is_empty() {
        let msg = "未找到POC模板".to_string();
        tlog.error(format!("POC validation failed: {msg}")).await;
        p.update_status(&task.task_id, TaskStatus::Failure, &msg).await;
        store_result(p, task, vec![], Some(msg)).await;
        return Outcome::Failure;
    }

    tlog.info("Initializing nuclei engine...").await;
    let options = NucleiOptions {
        rate_limit: 50,
        concurrency: 10,
        timeout: if cfg.timeout > 0 { cfg.timeout } else { 30 },
        custom_templates: templates,
        custom_poc_only: true,
        ..Default::default()
    };
    tlog.info(format!("Scanning target: {}", cfg.url)).await;
    let job = ScanJob {
        targets: vec![cfg.url.clone()],
        options: ScanOptions::Nuclei(options),
        ..Default::default()
    };
    let scanned = p.scanners.nuclei.scan(&job).await;
    let duration = start.elapsed().as_secs_f64();

    let output = match scanned {
        Ok(output) => output,
        Err(e) => {
            let msg = format!("扫描失败: {e}");
            tlog.error(format!("POC validation failed: {e}")).await;
            p.update_status(&task.task_id, TaskStatus::Failure, &msg).await;
            store_result(p, task, vec![], Some(msg)).await;
            return Outcome::Failure;
        }
    };

    tlog.info(format!("Scan finished in {duration:.2}s")).await;
    let matched = !output.vulnerabilities.is_empty();
    let vul_count = output.vulnerabilities.len();

    let results = if matched {
        let mut results = Vec::with_capacity(vul_count);
        for vul in &output.vulnerabilities {
            tlog.info(format!("Vulnerability confirmed, matched URL: {}", vul.url))
                .await;
            results.push(PocValidationResult {
                poc_id: cfg.poc_id.clone(),
                poc_name: if poc_name.is_empty() {
                    vul.poc_file.clone()
                } else {
                    poc_name.clone()
                },
                template_id: cfg.poc_id.clone(),
                severity: if poc_severity == Severity::Unknown {
                    vul.severity
                } else {
                    poc_severity
                },
                matched: true,
                matched_url: vul.url.clone(),
                details: vul.result.clone(),
                output: vul.extra.clone(),
                poc_type: poc_type.clone(),
            });
        }
        results
    } else {
        tlog.info("No vulnerability found").await;
        vec![PocValidationResult {
            poc_id: cfg.poc_id.clone(),
            poc_name: if poc_name.is_empty() {
                cfg.poc_id.clone()
            } else {
                poc_name.clone()
            },
            severity: poc_severity,
            matched: false,
            matched_url: cfg.url.clone(),
            details: "未发现漏洞".to_string(),
            poc_type: poc_type.clone(),
            ..Default::default()
        }]
    };

    store_result(p, task, results, None).await;
    let summary = format!("验证完成: 匹配={matched}, 漏洞={vul_count}, 耗时={duration:.2}s");
    p.update_status(&task.task_id, TaskStatus::Success, &summary).await;
    Outcome::Success
}

/// Writes the outcome to the bus (24 h TTL) and mirrors the status onto
/// the task info mapping.
async fn store_result(
    p: &Pipeline,
    task: &TaskInfo,
    results: Vec<PocValidationResult>,
    error: Option<String>,
) {
    let Some(bus) = &p.bus else {
        p.logger
            .error("bus not available, cannot save POC validation result")
            .await;
        return;
    };
    let batch_id = serde_json::from_str::<PocValidateConfig>(&task.config)
        .map(|c| c.batch_id)
        .unwrap_or_default();
    let status = if error.is_some() { "FAILURE" } else { "SUCCESS" };
    let data = PocValidationResultData {
        task_id: task.task_id.clone(),
        batch_id,
        status: status.to_string(),
        results,
        error,
        update_time: models::now_string(),
    };
    match serde_json::to_string(&data) {
        Ok(raw) => {
            if let Err(e) = bus.set_task_result(&task.task_id, &raw).await {
                p.logger
                    .task(&task.task_id)
                    .error(format!("failed to save POC validation result: {e}"))
                    .await;
            }
        }
        Err(e) => {
            p.logger
                .task(&task.task_id)
                .error(format!("failed to marshal POC validation result: {e}"))
                .await;
            return;
        }
    }
    if let Ok(Some(mut info)) = bus.task_info(&task.task_id).await {
        info.status = Some(status.to_string());
        info.update_time = Some(models::now_string());
        let _ = bus.set_task_info(&task.task_id, &info).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use models::TaskConfig;

    #[test]
    fn validate_config_parses_from_a_task_payload() {
        let raw = r#"{"taskType":"poc_validate","target":"http://t","url":"http://t",
            "pocId":"c1","pocType":"custom","timeout":30,"batchId":"b1"}"#;
        let outer = TaskConfig::parse(raw).unwrap();
        assert_eq!(outer.task_type.as_deref(), Some("poc_validate"));
        let cfg: PocValidateConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(cfg.url, "http://t");
        assert_eq!(cfg.poc_id, "c1");
        assert_eq!(cfg.batch_id, "b1");
    }
}
