// SPDX-FileCopyrightText: 2025 ScanOrch Authors
//
// SPDX-License-Identifier: GPL-2.0-or-later

use std::process::Stdio;

use async_trait::async_trait;
use models::scanner::{Error, Scan, ScanJob, ScanOptions, ScanOutput};
use models::{Asset, PortScanConfig};
use serde::Deserialize;
use tokio::process::Command;

/// Fast port discovery through the masscan binary (`-oJ -` output).
#[derive(Debug, Default)]
pub struct MasscanScanner;

impl MasscanScanner {
    pub fn new() -> Self {
        Self
    }
}

#[derive(Debug, Deserialize)]
struct MasscanEntry {
    ip: String,
    #[serde(default)]
    ports: Vec<MasscanPort>,
}

#[derive(Debug, Deserialize)]
struct MasscanPort {
    port: u16,
    #[serde(default)]
    status: String,
}

#[async_trait]
impl Scan for MasscanScanner {
    fn name(&self) -> &str {
        "masscan"
    }

    async fn scan(&self, job: &ScanJob) -> Result<ScanOutput, Error> {
        let opts = match &job.options {
            ScanOptions::Port(cfg) => cfg.clone(),
            _ => PortScanConfig::default(),
        };
        let mut targets = super::parse_targets(&job.target);
        targets.extend(job.targets.iter().cloned());
        if targets.is_empty() {
            return Ok(ScanOutput::default());
        }
        // masscan only takes explicit port lists
        let ports = match opts.ports.as_str() {
            "" | "top100" | "top1000" => "21,22,23,25,80,443,3306,3389,6379,8080".to_string(),
            ports => ports.to_string(),
        };

        let mut cmd = Command::new("masscan");
        cmd.arg("-p")
            .arg(&ports)
            .arg("--rate")
            .arg(opts.rate.max(1).to_string())
            .arg("-oJ")
            .arg("-")
            .args(&targets);
        tracing::debug!(targets = targets.len(), %ports, "running masscan");

        let output = cmd
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await?;
        if !output.status.success() && output.stdout.is_empty() {
            return Err(Error::Spawn(format!(
                "masscan exited with {}",
                output.status
            )));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(ScanOutput {
            assets: parse_output(&stdout),
            vulnerabilities: vec![],
        })
    }
}

/// `-oJ` output is a JSON array, but masscan historically emits trailing
/// commas and bare object lines, so fall back to line-wise parsing.
fn parse_output(stdout: &str) -> Vec<Asset> {
    if let Ok(entries) = serde_json::from_str::<Vec<MasscanEntry>>(stdout) {
        return entries_to_assets(entries);
    }
    let mut entries = Vec::new();
    for line in stdout.lines() {
        let line = line.trim().trim_end_matches(',');
        if !line.starts_with('{') {
            continue;
        }
        if let Ok(entry) = serde_json::from_str::<MasscanEntry>(line) {
            entries.push(entry);
        }
    }
    entries_to_assets(entries)
}

fn entries_to_assets(entries: Vec<MasscanEntry>) -> Vec<Asset> {
    let mut assets = Vec::new();
    for entry in entries {
        for port in entry.ports {
            if port.status.is_empty() || port.status == "open" {
                assets.push(Asset::open_port(&entry.ip, port.port));
            }
        }
    }
    assets
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_clean_array() {
        let out = r#"[
{"ip":"192.0.2.1","timestamp":"1","ports":[{"port":80,"proto":"tcp","status":"open"}]},
{"ip":"192.0.2.2","timestamp":"2","ports":[{"port":22,"proto":"tcp","status":"open"}]}
]"#;
        let assets = parse_output(out);
        assert_eq!(assets.len(), 2);
        assert_eq!(assets[0].authority, "192.0.2.1:80");
    }

    #[test]
    fn tolerates_trailing_commas_and_banner_lines() {
        let out = r#"[
{"ip":"192.0.2.1","ports":[{"port":80,"proto":"tcp","status":"open"}]},
{"ip":"192.0.2.1","ports":[{"port":443,"proto":"tcp","status":"open"}]},
]"#;
        let assets = parse_output(out);
        assert_eq!(assets.len(), 2);
    }

    #[test]
    fn closed_ports_are_dropped() {
        let out = r#"{"ip":"192.0.2.9","ports":[{"port":80,"status":"closed"}]}"#;
        assert!(parse_output(out).is_empty());
    }
}
