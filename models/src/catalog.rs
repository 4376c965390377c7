// SPDX-FileCopyrightText: 2025 ScanOrch Authors
//
// SPDX-License-Identifier: GPL-2.0-or-later

//! Catalog records: nuclei templates, custom POCs, fingerprint rules and
//! the two mapping tables. Ingestion of these records is out of scope; the
//! catalog store only serves what is already there.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Severity;

/// A nuclei template synced from a template feed.
///
/// `template_id` is the globally unique id taken from the YAML itself.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NucleiTemplate {
    pub id: String,
    pub template_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub category: String,
    /// YAML body served to workers by id.
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub enabled: bool,

    // knowledge base fields, enrich findings downstream
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cvss_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cve_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cwe_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
}

/// An operator supplied POC template.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomPoc {
    pub id: String,
    #[serde(default)]
    pub template_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub enabled: bool,
}

/// A fingerprint rule mapping HTTP response features to an application
/// name. `(name, rule)` is unique; the same app may carry several rules.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FingerprintRule {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub category: String,
    /// Header name to expected substring.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub cookies: HashMap<String, String>,
    /// Regex patterns matched against the body.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub html: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scripts: Vec<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub meta: HashMap<String, String>,
    /// Expression rule, e.g. `body="wp-content" && title="WordPress"`.
    #[serde(default)]
    pub rule: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub is_builtin: bool,
    #[serde(default)]
    pub enabled: bool,
}

/// App name to nuclei tag list, used for catalog driven auto scan.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagMapping {
    pub id: String,
    pub app_name: String,
    pub nuclei_tags: Vec<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_time: Option<DateTime<Utc>>,
}

/// Service name to is-HTTP flag, sourced from nmap service names.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpServiceMapping {
    pub service_name: String,
    pub is_http: bool,
    #[serde(default)]
    pub enabled: bool,
}

/// Outcome of validating one POC against one URL.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PocValidationResult {
    pub poc_id: String,
    pub poc_name: String,
    #[serde(default)]
    pub template_id: String,
    #[serde(default)]
    pub severity: Severity,
    pub matched: bool,
    #[serde(default)]
    pub matched_url: String,
    #[serde(default)]
    pub details: String,
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub poc_type: String,
}
