// SPDX-FileCopyrightText: 2025 ScanOrch Authors
//
// SPDX-License-Identifier: GPL-2.0-or-later

use std::process::Stdio;

use async_trait::async_trait;
use models::scanner::{Error, Scan, ScanJob, ScanOptions, ScanOutput};
use models::{Asset, PortScanConfig};
use tokio::process::Command;

/// Port discovery through the naabu binary (`-json` line output).
#[derive(Debug, Default)]
pub struct NaabuScanner;

impl NaabuScanner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Scan for NaabuScanner {
    fn name(&self) -> &str {
        "naabu"
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

        let mut cmd = Command::new("naabu");
        cmd.arg("-host")
            .arg(targets.join(","))
            .arg("-json")
            .arg("-silent")
            .arg("-rate")
            .arg(opts.rate.max(1).to_string());
        match opts.ports.as_str() {
            "top100" => {
                cmd.arg("-top-ports").arg("100");
            }
            "top1000" => {
                cmd.arg("-top-ports").arg("1000");
            }
            "" => {
                cmd.arg("-p").arg(PortScanConfig::default().ports);
            }
            ports => {
                cmd.arg("-p").arg(ports);
            }
        }
        if opts.timeout > 0 {
            cmd.arg("-timeout").arg((opts.timeout * 1000).to_string());
        }
        tracing::debug!(targets = targets.len(), ports = %opts.ports, "running naabu");

        let output = cmd
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await?;
        if !output.status.success() && output.stdout.is_empty() {
            return Err(Error::Spawn(format!(
                "naabu exited with {}",
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

/// One asset per `{host/ip, port}` line. The port field has changed shape
/// across naabu releases (a bare number or an object), both are accepted.
fn parse_output(stdout: &str) -> Vec<Asset> {
    let mut assets = Vec::new();
    for line in stdout.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Ok(value) = serde_json::from_str::<serde_json::Value>(line) else {
            continue;
        };
        let host = value["ip"]
            .as_str()
            .or_else(|| value["host"].as_str())
            .unwrap_or_default();
        if host.is_empty() {
            continue;
        }
        let port = value["port"]
            .as_u64()
            .or_else(|| value["port"]["Port"].as_u64());
        if let Some(port) = port.filter(|p| *p > 0 && *p <= u16::MAX as u64) {
            assets.push(Asset::open_port(host, port as u16));
        }
    }
    assets
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flat_port_lines() {
        let out = r#"{"host":"scanme.example","ip":"10.1.2.3","port":80,"protocol":"tcp"}
{"ip":"10.1.2.3","port":443}
garbage
{"ip":"10.1.2.4","port":0}"#;
        let assets = parse_output(out);
        assert_eq!(assets.len(), 2);
        assert_eq!(assets[0].authority, "10.1.2.3:80");
        assert_eq!(assets[1].authority, "10.1.2.3:443");
    }

    #[test]
    fn parses_structured_port_lines() {
        let out = r#"{"ip":"192.0.2.7","port":{"Port":8080,"Protocol":"tcp"}}"#;
        let assets = parse_output(out);
        assert_eq!(assets.len(), 1);
        assert_eq!(assets[0].port, 8080);
        assert_eq!(assets[0].category, models::Category::Ipv4);
    }
}
