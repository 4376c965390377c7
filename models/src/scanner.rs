// SPDX-FileCopyrightText: 2025 ScanOrch Authors
//
// SPDX-License-Identifier: GPL-2.0-or-later

//! The seam between the pipeline and the scanner processes.
//!
//! The worker owns orchestration (phase order, fallback, checkpointing);
//! a [`Scan`] implementation owns exactly one single shot invocation.

use std::sync::Arc;

use async_trait::async_trait;

use crate::{Asset, FingerprintRule, PortScanConfig, Vulnerability};

/// Options for the nmap service detection stage.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NmapOptions {
    /// Comma separated port list, already narrowed to open ports.
    pub ports: String,
    /// Per host timeout in seconds.
    pub timeout: u32,
}

/// Options for the fingerprint probe.
#[derive(Debug, Clone, Default)]
pub struct FingerprintOptions {
    /// Catalog rules merged with the builtin set before probing.
    pub custom_rules: Vec<FingerprintRule>,
}

/// Called once per unique finding while the engine is still running.
pub type OnFinding = Arc<dyn Fn(Vulnerability) + Send + Sync>;

/// Options for the nuclei engine invocation.
#[derive(Clone, Default)]
pub struct NucleiOptions {
    /// Comma separated severities forwarded as a template filter.
    pub severity: String,
    pub tags: Vec<String>,
    pub exclude_tags: Vec<String>,
    pub rate_limit: u32,
    pub concurrency: u32,
    pub timeout: u32,
    /// Template bodies fetched from the catalog, written to a scratch
    /// directory for the engine.
    pub custom_templates: Vec<String>,
    pub custom_poc_only: bool,
    pub on_finding: Option<OnFinding>,
}

impl std::fmt::Debug for NucleiOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NucleiOptions")
            .field("severity", &self.severity)
            .field("tags", &self.tags)
            .field("exclude_tags", &self.exclude_tags)
            .field("rate_limit", &self.rate_limit)
            .field("concurrency", &self.concurrency)
            .field("timeout", &self.timeout)
            .field("custom_templates", &self.custom_templates.len())
            .field("custom_poc_only", &self.custom_poc_only)
            .field("on_finding", &self.on_finding.is_some())
            .finish()
    }
}

/// Per scanner options, a tagged variant per stage.
#[derive(Debug, Clone, Default)]
pub enum ScanOptions {
    #[default]
    None,
    Port(PortScanConfig),
    Nmap(NmapOptions),
    Fingerprint(FingerprintOptions),
    Nuclei(NucleiOptions),
}

/// Input of one scanner invocation.
#[derive(Debug, Clone, Default)]
pub struct ScanJob {
    /// Free form target: IP, CIDR, domain or a comma separated list.
    pub target: String,
    /// Explicit target URLs, used instead of `target` when non empty.
    pub targets: Vec<String>,
    /// Assets from earlier phases, for the stages that enrich them.
    pub assets: Vec<Asset>,
    pub options: ScanOptions,
}

/// Output of one scanner invocation.
#[derive(Debug, Clone, Default)]
pub struct ScanOutput {
    pub assets: Vec<Asset>,
    pub vulnerabilities: Vec<Vulnerability>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    /// The scanner binary could not be spawned.
    Spawn(String),
    /// The scanner ran but its output could not be interpreted.
    Parse(String),
    /// Connection or I/O problem talking to a scan target.
    Connection(String),
    /// The surrounding task was cancelled.
    Cancelled,
    Unexpected(String),
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Spawn(x) => write!(f, "spawn failure: {x}"),
            Self::Parse(x) => write!(f, "unparseable scanner output: {x}"),
            Self::Connection(x) => write!(f, "connection issue: {x}"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Unexpected(x) => write!(f, "unexpected issue: {x}"),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Spawn(value.to_string())
    }
}

/// A single shot scanner.
#[async_trait]
pub trait Scan {
    fn name(&self) -> &str;

    /// Runs the scanner once. Implementations must return promptly when
    /// the future is dropped (cancellation) and must not panic on bad
    /// scanner output.
    async fn scan(&self, job: &ScanJob) -> Result<ScanOutput, Error>;
}

/// A scanner built from a callback, for tests.
///
/// The pipeline tests drive whole tasks without any scanner binaries by
/// substituting `Lambda` implementations per phase.
pub struct Lambda {
    name: String,
    #[allow(clippy::type_complexity)]
    scan: Box<dyn Fn(&ScanJob) -> Result<ScanOutput, Error> + Send + Sync + 'static>,
}

impl Default for Lambda {
    fn default() -> Self {
        Self {
            name: "lambda".to_string(),
            scan: Box::new(|_| Ok(ScanOutput::default())),
        }
    }
}

impl Lambda {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn with_scan<F>(mut self, f: F) -> Self
    where
        F: Fn(&ScanJob) -> Result<ScanOutput, Error> + Send + Sync + 'static,
    {
        self.scan = Box::new(f);
        self
    }
}

#[async_trait]
impl Scan for Lambda {
    fn name(&self) -> &str {
        &self.name
    }

    async fn scan(&self, job: &ScanJob) -> Result<ScanOutput, Error> {
        (self.scan)(job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lambda_dispatches_to_the_closure() {
        let scanner = Lambda::named("fake").with_scan(|job| {
            let mut out = ScanOutput::default();
            out.assets.push(Asset::open_port(&job.target, 80));
            Ok(out)
        });
        let job = ScanJob {
            target: "127.0.0.1".into(),
            ..Default::default()
        };
        let out = scanner.scan(&job).await.unwrap();
        assert_eq!(out.assets[0].authority, "127.0.0.1:80");
        assert_eq!(scanner.name(), "fake");
    }
}
