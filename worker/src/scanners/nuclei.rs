// SPDX-FileCopyrightText: 2025 ScanOrch Authors
//
// SPDX-License-Identifier: GPL-2.0-or-later

//! POC scanning through the nuclei engine.
//!
//! Templates arrive as YAML bodies from the catalog and are written to a
//! scratch directory for the run; findings stream back as JSONL and are
//! deduplicated on `(host, port, poc_file, url)` before the callback
//! fires.

use std::collections::HashSet;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use models::scanner::{Error, NucleiOptions, Scan, ScanJob, ScanOptions, ScanOutput};
use models::{Severity, Vulnerability};
use tokio::io::AsyncBufReadExt;
use tokio::process::Command;

const RESPONSE_CAP: usize = 8 * 1024;

#[derive(Debug, Default)]
pub struct NucleiScanner;

impl NucleiScanner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Scan for NucleiScanner {
    fn name(&self) -> &str {
        "nuclei"
    }

    async fn scan(&self, job: &ScanJob) -> Result<ScanOutput, Error> {
        let opts = match &job.options {
            ScanOptions::Nuclei(opts) => opts.clone(),
            _ => NucleiOptions::default(),
        };
        let targets = prepare_targets(job);
        if targets.is_empty() {
            tracing::info!("no targets for nuclei scan");
            return Ok(ScanOutput::default());
        }
        if opts.custom_templates.is_empty() {
            tracing::warn!("no templates provided, POC scan requires templates from the catalog");
            return Ok(ScanOutput::default());
        }

        let scratch = scratch_dir();
        tokio::fs::create_dir_all(&scratch).await?;
        let result = self.run(&scratch, &targets, &opts).await;
        if let Err(e) = tokio::fs::remove_dir_all(&scratch).await {
            tracing::debug!(%e, "scratch dir not removed");
        }
        result
    }
}

impl NucleiScanner {
    async fn run(
        &self,
        scratch: &PathBuf,
        targets: &[String],
        opts: &NucleiOptions,
    ) -> Result<ScanOutput, Error> {
        for (i, content) in opts.custom_templates.iter().enumerate() {
            let path = scratch.join(format!("custom-{i}.yaml"));
            tokio::fs::write(&path, content).await?;
        }
        let target_list = scratch.join("targets.txt");
        tokio::fs::write(&target_list, targets.join("\n")).await?;

        let mut cmd = Command::new("nuclei");
        cmd.arg("-list")
            .arg(&target_list)
            .arg("-t")
            .arg(scratch)
            .arg("-jsonl")
            .arg("-silent")
            .arg("-duc");
        if !opts.severity.is_empty() {
            cmd.arg("-severity").arg(&opts.severity);
        }
        if !opts.exclude_tags.is_empty() {
            cmd.arg("-exclude-tags").arg(opts.exclude_tags.join(","));
        }
        if opts.rate_limit > 0 {
            cmd.arg("-rate-limit").arg(opts.rate_limit.to_string());
        }
        if opts.concurrency > 0 {
            cmd.arg("-concurrency").arg(opts.concurrency.to_string());
        }
        if opts.timeout > 0 {
            cmd.arg("-timeout").arg(opts.timeout.to_string());
        }
        tracing::debug!(
            targets = targets.len(),
            templates = opts.custom_templates.len(),
            "running nuclei"
        );

        let mut child = cmd
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Spawn("no stdout handle".to_string()))?;
        let mut lines = tokio::io::BufReader::new(stdout).lines();

        let mut seen = HashSet::new();
        let mut vulnerabilities = Vec::new();
        while let Some(line) = lines
            .next_line()
            .await
            .map_err(|e| Error::Parse(e.to_string()))?
        {
            let Some(vul) = parse_event(&line) else {
                continue;
            };
            if !seen.insert(vul.dedup_key()) {
                continue;
            }
            if let Some(on_finding) = &opts.on_finding {
                on_finding(vul.clone());
            }
            vulnerabilities.push(vul);
        }
        let status = child.wait().await?;
        if !status.success() && vulnerabilities.is_empty() {
            tracing::debug!(%status, "nuclei exited non-zero without findings");
        }
        Ok(ScanOutput {
            assets: vec![],
            vulnerabilities,
        })
    }
}

fn scratch_dir() -> PathBuf {
    std::env::temp_dir().join(format!("scano-nuclei-{}", uuid::Uuid::new_v4()))
}

/// Builds target URLs from the assets of earlier phases; only HTTP
/// assets make it through.
pub(crate) fn prepare_targets(job: &ScanJob) -> Vec<String> {
    if !job.targets.is_empty() {
        return job.targets.clone();
    }
    let mut seen = HashSet::new();
    let mut targets = Vec::new();
    let mut skipped = 0;
    for asset in &job.assets {
        if !asset.is_http {
            skipped += 1;
            continue;
        }
        let scheme = if asset.service == "https" || matches!(asset.port, 443 | 8443) {
            "https"
        } else {
            "http"
        };
        let target = format!("{scheme}://{}:{}", asset.host, asset.port);
        if seen.insert(target.clone()) {
            targets.push(target);
        }
    }
    if skipped > 0 {
        tracing::info!(skipped, scanning = targets.len(), "skipped non-HTTP assets");
    }
    targets
}

/// Maps one JSONL result event to a vulnerability; unparseable lines are
/// dropped.
pub(crate) fn parse_event(line: &str) -> Option<Vulnerability> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let event: serde_json::Value = serde_json::from_str(line).ok()?;
    let template_id = event["template-id"].as_str()?.to_string();
    let matched = event["matched-at"]
        .as_str()
        .or_else(|| event["host"].as_str())?
        .to_string();
    let (host, port) = parse_host_port(&matched);

    let info = &event["info"];
    let mut result = info["name"].as_str().unwrap_or_default().to_string();
    if let Some(description) = info["description"].as_str() {
        result = format!("{result}\n{description}");
    }
    let extracted: Vec<String> = string_list(&event["extracted-results"]);
    if !extracted.is_empty() {
        result = format!("{result}\nExtracted: {}", extracted.join(", "));
    }

    let classification = &info["classification"];
    let (response, response_truncated) = match event["response"].as_str() {
        Some(r) if r.len() > RESPONSE_CAP => {
            let mut end = RESPONSE_CAP;
            while !r.is_char_boundary(end) {
                end -= 1;
            }
            (Some(r[..end].to_string()), true)
        }
        Some(r) => (Some(r.to_string()), false),
        None => (None, false),
    };

    Some(Vulnerability {
        authority: format!("{host}:{port}"),
        host,
        port,
        url: matched,
        poc_file: template_id,
        source: "nuclei".to_string(),
        severity: Severity::parse(info["severity"].as_str().unwrap_or_default()),
        result,
        extra: String::new(),
        task_id: String::new(),
        cvss_score: classification["cvss-score"].as_f64(),
        cve_id: string_list(&classification["cve-id"]).into_iter().next(),
        cwe_id: string_list(&classification["cwe-id"]).into_iter().next(),
        references: string_list(&info["reference"]),
        remediation: info["remediation"].as_str().map(str::to_string),
        matcher_name: event["matcher-name"].as_str().map(str::to_string),
        extracted_results: extracted,
        curl_command: event["curl-command"].as_str().map(str::to_string),
        request: event["request"].as_str().map(str::to_string),
        response,
        response_truncated,
        create_time: None,
        update_time: None,
    })
}

fn string_list(value: &serde_json::Value) -> Vec<String> {
    match value {
        serde_json::Value::String(s) => vec![s.clone()],
        serde_json::Value::Array(items) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => vec![],
    }
}

/// Splits a matched URL (or bare authority) into host and port.
pub(crate) fn parse_host_port(raw: &str) -> (String, u16) {
    let (scheme, rest) = match raw.split_once("://") {
        Some((scheme, rest)) => (scheme, rest),
        None => ("http", raw),
    };
    let authority = rest.split(['/', '?']).next().unwrap_or(rest);
    let default_port = if scheme == "https" { 443 } else { 80 };
    // v6 literals carry brackets, the port sits after the closing one
    if let Some(end) = authority.rfind(']') {
        let host = authority[..=end]
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();
        let port = authority[end + 1..]
            .strip_prefix(':')
            .and_then(|p| p.parse().ok())
            .unwrap_or(default_port);
        return (host, port);
    }
    match authority.rsplit_once(':') {
        Some((host, port)) => match port.parse() {
            Ok(port) => (host.to_string(), port),
            Err(_) => (authority.to_string(), default_port),
        },
        None => (authority.to_string(), default_port),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use models::scanner::ScanJob;
    use models::Asset;

    #[test]
    fn host_port_from_urls() {
        assert_eq!(parse_host_port("http://h:8080/x"), ("h".into(), 8080));
        assert_eq!(parse_host_port("https://h/x"), ("h".into(), 443));
        assert_eq!(parse_host_port("h:81"), ("h".into(), 81));
        assert_eq!(parse_host_port("h"), ("h".into(), 80));
        assert_eq!(parse_host_port("http://[::1]:8000/"), ("::1".into(), 8000));
    }

    #[test]
    fn only_http_assets_become_targets() {
        let mut a = Asset::open_port("10.0.0.1", 80);
        a.is_http = true;
        let mut b = Asset::open_port("10.0.0.1", 22);
        b.service = "ssh".into();
        let mut c = Asset::open_port("10.0.0.1", 8443);
        c.is_http = true;
        let job = ScanJob {
            assets: vec![a.clone(), b, c, a],
            ..Default::default()
        };
        let targets = prepare_targets(&job);
        assert_eq!(
            targets,
            vec!["http://10.0.0.1:80", "https://10.0.0.1:8443"]
        );
    }

    #[test]
    fn parses_a_result_event() {
        let line = r#"{"template-id":"nginx-version","info":{"name":"Nginx Version Detect",
            "description":"Leaks the version","severity":"info",
            "reference":["https://example.org/a"],
            "classification":{"cvss-score":5.3,"cve-id":["CVE-2020-0001"],"cwe-id":["CWE-200"]},
            "remediation":"upgrade"},
            "matcher-name":"version","extracted-results":["nginx/1.18.0"],
            "host":"http://10.0.0.1:80","matched-at":"http://10.0.0.1:80/status",
            "curl-command":"curl http://10.0.0.1:80/status",
            "request":"GET /status","response":"HTTP/1.1 200 OK"}"#;
        let vul = parse_event(line).unwrap();
        assert_eq!(vul.poc_file, "nginx-version");
        assert_eq!(vul.host, "10.0.0.1");
        assert_eq!(vul.port, 80);
        assert_eq!(vul.url, "http://10.0.0.1:80/status");
        assert_eq!(vul.severity, Severity::Info);
        assert_eq!(vul.cve_id.as_deref(), Some("CVE-2020-0001"));
        assert_eq!(vul.cvss_score, Some(5.3));
        assert_eq!(vul.matcher_name.as_deref(), Some("version"));
        assert_eq!(vul.extracted_results, vec!["nginx/1.18.0"]);
        assert!(vul.result.contains("Extracted: nginx/1.18.0"));
        assert!(!vul.response_truncated);
    }

    #[test]
    fn long_responses_are_truncated() {
        let body = "A".repeat(RESPONSE_CAP + 100);
        let line = format!(
            r#"{{"template-id":"t","matched-at":"http://h:80/","info":{{"severity":"low"}},"response":"{body}"}}"#
        );
        let vul = parse_event(&line).unwrap();
        assert!(vul.response_truncated);
        assert_eq!(vul.response.unwrap().len(), RESPONSE_CAP);
    }

    #[test]
    fn junk_lines_are_dropped() {
        assert!(parse_event("").is_none());
        assert!(parse_event("not json").is_none());
        assert!(parse_event(r#"{"no-template":true}"#).is_none());
    }
}
