// SPDX-FileCopyrightText: 2025 ScanOrch Authors
//
// SPDX-License-Identifier: GPL-2.0-or-later

//! Request and response bodies of the task plane RPC.
//!
//! Workers never touch the primary store; these messages are the whole
//! surface between a worker and the control plane. Template bundles can be
//! large, the transport must accept bodies up to 100 MiB.

use serde::{Deserialize, Serialize};

use crate::{
    Asset, FingerprintRule, HttpServiceMapping, PocValidationResult, Vulnerability,
};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckTaskReq {
    pub worker_name: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckTaskResp {
    pub is_exist: bool,
    pub is_finished: bool,
    #[serde(default)]
    pub task_id: String,
    #[serde(default)]
    pub main_task_id: String,
    #[serde(default)]
    pub workspace_id: String,
    #[serde(default)]
    pub config: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTaskReq {
    pub task_id: String,
    /// Target state as its wire name, e.g. `STARTED` or `PAUSED`.
    pub state: String,
    #[serde(default)]
    pub worker: String,
    /// Result summary, or the serialized checkpoint when state is PAUSED.
    #[serde(default)]
    pub result: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenericResp {
    pub success: bool,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveTaskResultReq {
    pub workspace_id: String,
    pub main_task_id: String,
    pub assets: Vec<Asset>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveTaskResultResp {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub inserted: usize,
    #[serde(default)]
    pub updated: usize,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveVulResultReq {
    pub workspace_id: String,
    pub main_task_id: String,
    pub vuls: Vec<Vulnerability>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeepAliveReq {
    pub worker_name: String,
    pub cpu_load: f64,
    pub mem_used: f64,
    pub task_started_number: u32,
    pub task_executed_number: u32,
    #[serde(default)]
    pub is_daemon: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeepAliveResp {
    #[serde(default)]
    pub manual_stop_flag: bool,
    #[serde(default)]
    pub manual_reload_flag: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetTemplatesByTagsReq {
    pub tags: Vec<String>,
    #[serde(default)]
    pub severities: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetTemplatesByIdsReq {
    #[serde(default)]
    pub nuclei_template_ids: Vec<String>,
    #[serde(default)]
    pub custom_poc_ids: Vec<String>,
}

/// Shared reply of both template lookups: the YAML bodies, dereferenced.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplatesResp {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub count: usize,
    #[serde(default)]
    pub templates: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnabledOnlyReq {
    #[serde(default)]
    pub enabled_only: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetCustomFingerprintsResp {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub fingerprints: Vec<FingerprintRule>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetHttpServiceMappingsResp {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub mappings: Vec<HttpServiceMapping>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetPocByIdReq {
    pub poc_id: String,
    #[serde(default)]
    pub poc_type: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetPocByIdResp {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub severity: String,
    #[serde(default)]
    pub poc_type: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatePocReq {
    pub url: String,
    pub poc_id: String,
    #[serde(default)]
    pub poc_type: String,
    #[serde(default)]
    pub timeout: u32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatePocResp {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub task_id: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchValidatePocReq {
    pub url: String,
    pub poc_ids: Vec<String>,
    #[serde(default)]
    pub poc_type: String,
    #[serde(default)]
    pub timeout: u32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchValidatePocResp {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub batch_id: String,
    #[serde(default)]
    pub task_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetPocValidationResultReq {
    pub task_id: String,
}

/// Validation outcome as stored by the worker under the result key.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PocValidationResultData {
    #[serde(default)]
    pub task_id: String,
    #[serde(default)]
    pub batch_id: String,
    /// SUCCESS or FAILURE
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub results: Vec<PocValidationResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub update_time: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetPocValidationResultResp {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<PocValidationResultData>,
}
