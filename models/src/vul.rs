// SPDX-FileCopyrightText: 2025 ScanOrch Authors
//
// SPDX-License-Identifier: GPL-2.0-or-later

use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Canonical severity set. Parsed case insensitively, stored lowercase,
/// anything unrecognized folds to `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Info,
    #[default]
    Unknown,
}

impl Severity {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "critical" => Self::Critical,
            "high" => Self::High,
            "medium" => Self::Medium,
            "low" => Self::Low,
            "info" => Self::Info,
            _ => Self::Unknown,
        }
    }

    /// Splits a comma separated severity list, dropping empty entries.
    pub fn parse_list(csv: &str) -> Vec<Self> {
        csv.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Self::parse)
            .collect()
    }
}

impl Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Critical => write!(f, "critical"),
            Self::High => write!(f, "high"),
            Self::Medium => write!(f, "medium"),
            Self::Low => write!(f, "low"),
            Self::Info => write!(f, "info"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// A confirmed finding produced by the POC phase.
///
/// The upsert key within a workspace is `(host, port, poc_file, url)`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vulnerability {
    pub authority: String,
    pub host: String,
    pub port: u16,
    pub url: String,
    pub poc_file: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub result: String,
    #[serde(default)]
    pub extra: String,
    #[serde(default)]
    pub task_id: String,

    // knowledge base enrichment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cvss_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cve_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwe_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,

    // evidence chain
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matcher_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extracted_results: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub curl_command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(default)]
    pub response_truncated: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_time: Option<DateTime<Utc>>,
}

impl Vulnerability {
    /// Deduplication key used by the POC phase and the sink alike.
    pub fn dedup_key(&self) -> String {
        format!("{}:{}:{}:{}", self.host, self.port, self.poc_file, self.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_is_case_insensitive_and_lowercased() {
        assert_eq!(Severity::parse("CRITICAL"), Severity::Critical);
        assert_eq!(Severity::parse(" High "), Severity::High);
        assert_eq!(Severity::parse("bogus"), Severity::Unknown);
        assert_eq!(Severity::Critical.to_string(), "critical");
        assert_eq!(
            serde_json::to_string(&Severity::High).unwrap(),
            "\"high\""
        );
    }

    #[test]
    fn severity_list_skips_empty_entries() {
        let list = Severity::parse_list("critical, high,,info");
        assert_eq!(
            list,
            vec![Severity::Critical, Severity::High, Severity::Info]
        );
    }

    #[test]
    fn dedup_key_is_the_four_tuple() {
        let v = Vulnerability {
            host: "h".into(),
            port: 80,
            poc_file: "cve-x".into(),
            url: "http://h:80/".into(),
            ..Default::default()
        };
        assert_eq!(v.dedup_key(), "h:80:cve-x:http://h:80/");
    }
}
