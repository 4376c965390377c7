// SPDX-FileCopyrightText: 2025 ScanOrch Authors
//
// SPDX-License-Identifier: GPL-2.0-or-later

use std::process::Stdio;

use async_trait::async_trait;
use models::scanner::{Error, NmapOptions, Scan, ScanJob, ScanOptions, ScanOutput};
use models::Asset;
use serde::Deserialize;
use tokio::process::Command;

/// Service detection through nmap (`-sV -oX -`), run against the open
/// ports the discovery stage found on one host.
#[derive(Debug, Default)]
pub struct NmapScanner;

impl NmapScanner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Scan for NmapScanner {
    fn name(&self) -> &str {
        "nmap"
    }

    async fn scan(&self, job: &ScanJob) -> Result<ScanOutput, Error> {
        let opts = match &job.options {
            ScanOptions::Nmap(opts) => opts.clone(),
            _ => NmapOptions::default(),
        };
        if job.target.is_empty() {
            return Ok(ScanOutput::default());
        }

        let mut cmd = Command::new("nmap");
        cmd.arg("-sV").arg("-Pn").arg("-oX").arg("-");
        if !opts.ports.is_empty() {
            cmd.arg("-p").arg(&opts.ports);
        }
        if opts.timeout > 0 {
            cmd.arg("--host-timeout").arg(format!("{}s", opts.timeout));
        }
        cmd.arg(&job.target);
        tracing::debug!(target = %job.target, ports = %opts.ports, "running nmap");

        let output = cmd
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await?;
        if !output.status.success() && output.stdout.is_empty() {
            return Err(Error::Spawn(format!("nmap exited with {}", output.status)));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        let assets = parse_output(&stdout)?;
        Ok(ScanOutput {
            assets,
            vulnerabilities: vec![],
        })
    }
}

#[derive(Debug, Deserialize)]
struct NmapRun {
    #[serde(rename = "host", default)]
    hosts: Vec<XmlHost>,
}

#[derive(Debug, Deserialize)]
struct XmlHost {
    #[serde(rename = "address", default)]
    addresses: Vec<XmlAddress>,
    ports: Option<XmlPorts>,
}

#[derive(Debug, Deserialize)]
struct XmlAddress {
    #[serde(rename = "@addr")]
    addr: String,
    #[serde(rename = "@addrtype")]
    addrtype: String,
}

#[derive(Debug, Deserialize)]
struct XmlPorts {
    #[serde(rename = "port", default)]
    ports: Vec<XmlPort>,
}

#[derive(Debug, Deserialize)]
struct XmlPort {
    #[serde(rename = "@portid")]
    portid: u16,
    state: XmlState,
    service: Option<XmlService>,
}

#[derive(Debug, Deserialize)]
struct XmlState {
    #[serde(rename = "@state")]
    state: String,
}

#[derive(Debug, Deserialize, Default)]
struct XmlService {
    #[serde(rename = "@name", default)]
    name: String,
    #[serde(rename = "@product", default)]
    product: String,
    #[serde(rename = "@version", default)]
    version: String,
    #[serde(rename = "@extrainfo", default)]
    extrainfo: String,
}

fn parse_output(xml: &str) -> Result<Vec<Asset>, Error> {
    let run: NmapRun = quick_xml::de::from_str(xml).map_err(|e| Error::Parse(e.to_string()))?;
    let mut assets = Vec::new();
    for host in run.hosts {
        // prefer the IP address entry over a mac entry
        let Some(addr) = host
            .addresses
            .iter()
            .find(|a| a.addrtype.starts_with("ip"))
            .or_else(|| host.addresses.first())
        else {
            continue;
        };
        let Some(ports) = host.ports else { continue };
        for port in ports.ports {
            if port.state.state != "open" {
                continue;
            }
            let service = port.service.unwrap_or_default();
            let mut banner = service.product.clone();
            if !service.version.is_empty() {
                banner = format!("{banner} {}", service.version).trim().to_string();
            }
            if !service.extrainfo.is_empty() {
                banner = format!("{banner} ({})", service.extrainfo).trim().to_string();
            }
            let mut asset = Asset::open_port(&addr.addr, port.portid);
            asset.service = service.name;
            asset.server = service.product;
            asset.banner = banner;
            assets.push(asset);
        }
    }
    Ok(assets)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<nmaprun scanner="nmap" start="1">
  <host starttime="1" endtime="2">
    <status state="up" reason="user-set"/>
    <address addr="192.0.2.10" addrtype="ipv4"/>
    <ports>
      <port protocol="tcp" portid="22">
        <state state="open" reason="syn-ack" reason_ttl="0"/>
        <service name="ssh" product="OpenSSH" version="8.9p1" extrainfo="Ubuntu Linux" method="probed" conf="10"/>
      </port>
      <port protocol="tcp" portid="80">
        <state state="open" reason="syn-ack" reason_ttl="0"/>
        <service name="http" product="nginx" version="1.18.0" method="probed" conf="10"/>
      </port>
      <port protocol="tcp" portid="8443">
        <state state="filtered" reason="no-response" reason_ttl="0"/>
      </port>
    </ports>
  </host>
</nmaprun>"#;

    #[test]
    fn parses_open_ports_with_service_info() {
        let assets = parse_output(SAMPLE).unwrap();
        assert_eq!(assets.len(), 2);
        assert_eq!(assets[0].authority, "192.0.2.10:22");
        assert_eq!(assets[0].service, "ssh");
        assert_eq!(assets[0].banner, "OpenSSH 8.9p1 (Ubuntu Linux)");
        assert_eq!(assets[1].service, "http");
        assert_eq!(assets[1].server, "nginx");
    }

    #[test]
    fn ports_without_service_stay_bare() {
        let xml = r#"<nmaprun><host><address addr="::1" addrtype="ipv6"/><ports>
            <port protocol="tcp" portid="9000"><state state="open"/></port>
        </ports></host></nmaprun>"#;
        let assets = parse_output(xml).unwrap();
        assert_eq!(assets.len(), 1);
        assert_eq!(assets[0].service, "");
        assert_eq!(assets[0].category, models::Category::Ipv6);
    }

    #[test]
    fn garbage_is_a_parse_error() {
        assert!(matches!(parse_output("not xml"), Err(Error::Parse(_))));
    }
}
