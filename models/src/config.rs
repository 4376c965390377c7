// SPDX-FileCopyrightText: 2025 ScanOrch Authors
//
// SPDX-License-Identifier: GPL-2.0-or-later

//! The resolved job payload a worker receives.
//!
//! The payload is JSON with one sub object per phase. Unknown top level
//! keys survive a round trip through `extra` so that newer control planes
//! can ship options an older worker simply ignores.

use std::collections::HashMap;
use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Execution phases of a task, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Portscan,
    Fingerprint,
    Pocscan,
}

impl Phase {
    pub const ALL: [Phase; 3] = [Phase::Portscan, Phase::Fingerprint, Phase::Pocscan];
}

impl Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Portscan => write!(f, "portscan"),
            Self::Fingerprint => write!(f, "fingerprint"),
            Self::Pocscan => write!(f, "pocscan"),
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortScanConfig {
    #[serde(default = "default_true")]
    pub enable: bool,
    /// Discovery tool, `naabu` (default) or `masscan`.
    #[serde(default)]
    pub tool: String,
    /// Port selection: a list like `80,443,8000-8100` or `top100`/`top1000`.
    #[serde(default)]
    pub ports: String,
    #[serde(default)]
    pub rate: u32,
    /// Per probe timeout in seconds.
    #[serde(default)]
    pub timeout: u32,
    /// Hosts exposing more than this many open ports are dropped entirely.
    /// Zero disables the filter.
    #[serde(default)]
    pub port_threshold: u32,
}

impl Default for PortScanConfig {
    fn default() -> Self {
        Self {
            enable: true,
            tool: String::new(),
            ports: "80,443,8080".to_string(),
            rate: 1000,
            timeout: 5,
            port_threshold: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FingerprintConfig {
    #[serde(default)]
    pub enable: bool,
    /// When set, enabled custom fingerprint rules are fetched from the
    /// catalog and merged with the builtin rule set before probing.
    #[serde(default)]
    pub custom_engine: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PocScanConfig {
    #[serde(default)]
    pub enable: bool,
    #[serde(default)]
    pub use_nuclei: bool,
    /// Comma separated severities used for template selection.
    #[serde(default)]
    pub severity: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nuclei_template_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub custom_poc_ids: Vec<String>,
    /// App name to nuclei tag list, injected when `auto_scan` is set.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub tag_mappings: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub auto_scan: bool,
    /// Like `auto_scan` but resolved through the builtin Wappalyzer
    /// mapping instead of the catalog.
    #[serde(default)]
    pub automatic_scan: bool,
    #[serde(default)]
    pub custom_poc_only: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude_tags: Vec<String>,
    #[serde(default)]
    pub rate_limit: u32,
    #[serde(default)]
    pub concurrency: u32,
}

/// The complete job payload.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskConfig {
    #[serde(default)]
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub portscan: Option<PortScanConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<FingerprintConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pocscan: Option<PocScanConfig>,
    /// Serialized [`crate::TaskState`], present when resuming.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_state: Option<String>,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl TaskConfig {
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Payload of a single POC validation task (`taskType: "poc_validate"`).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PocValidateConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub poc_id: String,
    #[serde(default)]
    pub poc_type: String,
    #[serde(default)]
    pub timeout: u32,
    #[serde(default)]
    pub batch_id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub severities: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_the_documented_example() {
        let raw = r#"{"target":"10.0.0.0/24",
 "portscan":{"enable":true,"tool":"naabu","ports":"top1000","rate":1000,
             "timeout":5,"portThreshold":50},
 "fingerprint":{"enable":true,"customEngine":true},
 "pocscan":{"enable":true,"useNuclei":true,"severity":"critical,high",
            "nucleiTemplateIds":["a"],"customPocIds":["b"],
            "tagMappings":{"nginx":["nginx"]},
            "autoScan":false,"automaticScan":false,"customPocOnly":false,
            "rateLimit":150,"concurrency":25},
 "resumeState":""}"#;
        let cfg = TaskConfig::parse(raw).unwrap();
        assert_eq!(cfg.target, "10.0.0.0/24");
        let ps = cfg.portscan.unwrap();
        assert_eq!(ps.port_threshold, 50);
        assert_eq!(ps.ports, "top1000");
        let poc = cfg.pocscan.unwrap();
        assert_eq!(poc.severity, "critical,high");
        assert_eq!(poc.tag_mappings["nginx"], vec!["nginx"]);
        assert_eq!(poc.rate_limit, 150);
    }

    #[test]
    fn unknown_keys_survive_round_trip() {
        let raw = r#"{"target":"t","futureOption":{"x":1}}"#;
        let cfg = TaskConfig::parse(raw).unwrap();
        assert!(cfg.extra.contains_key("futureOption"));
        let again = TaskConfig::parse(&cfg.to_json()).unwrap();
        assert_eq!(again.extra["futureOption"]["x"], 1);
    }

    #[test]
    fn phase_names_match_checkpoint_strings() {
        assert_eq!(Phase::Portscan.to_string(), "portscan");
        assert_eq!(Phase::ALL.len(), 3);
    }
}
