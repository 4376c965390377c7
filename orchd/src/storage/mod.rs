// SPDX-FileCopyrightText: 2025 ScanOrch Authors
//
// SPDX-License-Identifier: GPL-2.0-or-later

//! Storage traits of the control plane.
//!
//! Workers never see this layer; everything they persist arrives through
//! the task plane RPC so that the control plane can enforce the upsert
//! keys and derived fields centrally.

pub mod inmemory;

use async_trait::async_trait;
use models::{
    Asset, CustomPoc, FingerprintRule, HttpServiceMapping, MainTask, NucleiTemplate, Severity,
    TagMapping, TaskProfile, TaskStatus, Vulnerability,
};

#[derive(Debug)]
pub enum Error {
    NotFound,
    Serialization,
    /// The requested change is not a permitted state transition.
    InvalidState(String),
    Storage(Box<dyn std::error::Error + Send + Sync>),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use Error::*;
        match self {
            NotFound => write!(f, "not found"),
            Serialization => write!(f, "serialization error"),
            InvalidState(e) => write!(f, "invalid state: {e}"),
            Storage(e) => write!(f, "storage error: {e}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<serde_json::Error> for Error {
    fn from(_: serde_json::Error) -> Self {
        Self::Serialization
    }
}

/// Partial update of a task record; `None` fields are left untouched.
#[derive(Debug, Default, Clone)]
pub struct TaskUpdate {
    pub status: Option<TaskStatus>,
    pub task_id: Option<String>,
    pub config: Option<String>,
    pub progress: Option<u8>,
    pub result: Option<String>,
    pub task_state: Option<String>,
    pub name: Option<String>,
    pub target: Option<String>,
    pub profile_id: Option<String>,
    pub profile_name: Option<String>,
}

#[async_trait]
/// Stores the persistent task records, partitioned by workspace.
pub trait TaskStorer {
    async fn insert_task(&self, workspace_id: &str, task: MainTask) -> Result<(), Error>;
    async fn find_task(&self, workspace_id: &str, id: &str) -> Result<MainTask, Error>;
    /// Resolves a task by its execution id, across workspaces. Used by the
    /// worker facing endpoints which only carry the `task_id`.
    async fn find_task_by_task_id(&self, task_id: &str) -> Result<(String, MainTask), Error>;
    async fn update_task(
        &self,
        workspace_id: &str,
        id: &str,
        update: TaskUpdate,
    ) -> Result<(), Error>;
    async fn list_tasks(&self, workspace_id: &str) -> Result<Vec<MainTask>, Error>;
    async fn remove_task(&self, workspace_id: &str, id: &str) -> Result<(), Error>;
    /// Workspace ids that currently hold task records.
    async fn workspaces(&self) -> Result<Vec<String>, Error>;
}

#[async_trait]
/// Stores the reusable configuration profiles.
pub trait ProfileStorer {
    async fn insert_profile(&self, profile: TaskProfile) -> Result<(), Error>;
    async fn find_profile(&self, id: &str) -> Result<TaskProfile, Error>;
    async fn list_profiles(&self) -> Result<Vec<TaskProfile>, Error>;
    async fn remove_profile(&self, id: &str) -> Result<(), Error>;
}

#[async_trait]
/// The aggregation sink: deduplicated per workspace asset and
/// vulnerability collections.
pub trait ResultSink {
    /// Upserts on `(authority, task_id)`. Returns `(inserted, updated)`.
    async fn save_assets(
        &self,
        workspace_id: &str,
        main_task_id: &str,
        assets: Vec<Asset>,
    ) -> Result<(usize, usize), Error>;
    /// Upserts on `(host, port, poc_file, url)`. Returns `(inserted, updated)`.
    async fn save_vuls(
        &self,
        workspace_id: &str,
        main_task_id: &str,
        vuls: Vec<Vulnerability>,
    ) -> Result<(usize, usize), Error>;
    async fn assets(&self, workspace_id: &str) -> Result<Vec<Asset>, Error>;
    async fn vuls(&self, workspace_id: &str) -> Result<Vec<Vulnerability>, Error>;
}

#[async_trait]
/// Read access to the catalog. Selection by id, severity and tag; only
/// enabled records are served to workers.
pub trait CatalogStore {
    async fn templates_by_severity(
        &self,
        severities: &[Severity],
    ) -> Result<Vec<NucleiTemplate>, Error>;
    async fn templates_by_tags(
        &self,
        tags: &[String],
        severities: &[Severity],
    ) -> Result<Vec<NucleiTemplate>, Error>;
    async fn templates_by_ids(&self, ids: &[String]) -> Result<Vec<NucleiTemplate>, Error>;
    async fn enabled_custom_pocs(&self) -> Result<Vec<CustomPoc>, Error>;
    async fn custom_pocs_by_ids(&self, ids: &[String]) -> Result<Vec<CustomPoc>, Error>;
    /// Looks up one POC by id; `poc_type` is `custom` or `nuclei`.
    async fn poc_by_id(&self, id: &str, poc_type: &str) -> Result<CustomPoc, Error>;
    async fn enabled_tag_mappings(&self) -> Result<Vec<TagMapping>, Error>;
    async fn fingerprints(&self, enabled_only: bool) -> Result<Vec<FingerprintRule>, Error>;
    async fn http_service_mappings(
        &self,
        enabled_only: bool,
    ) -> Result<Vec<HttpServiceMapping>, Error>;
}

#[async_trait]
/// Combines every storage concern of the control plane.
pub trait Storage: TaskStorer + ProfileStorer + ResultSink + CatalogStore {}

#[async_trait]
impl<T> Storage for T where T: TaskStorer + ProfileStorer + ResultSink + CatalogStore {}
