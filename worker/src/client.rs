// SPDX-FileCopyrightText: 2025 ScanOrch Authors
//
// SPDX-License-Identifier: GPL-2.0-or-later

//! The task plane client.
//!
//! The worker never talks to the primary store; this narrow surface is
//! everything it may call. Heartbeats use a short deadline so a hung
//! control plane cannot stall the loop.

use std::time::Duration;

use async_trait::async_trait;
use models::rpc::*;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Template bundles can be large; accept anything up to this bound.
pub const MAX_BODY_BYTES: u64 = 100 * 1024 * 1024;

const KEEPALIVE_DEADLINE: Duration = Duration::from_secs(10);

#[derive(Debug)]
pub enum ClientError {
    /// Connection refused, reset or timed out.
    Connection(String),
    /// The control plane answered with an unexpected status.
    Status(u16),
    /// The reply body could not be decoded.
    Decode(String),
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connection(e) => write!(f, "task plane unreachable: {e}"),
            Self::Status(code) => write!(f, "task plane answered {code}"),
            Self::Decode(e) => write!(f, "unable to decode reply: {e}"),
        }
    }
}

impl std::error::Error for ClientError {}

impl From<reqwest::Error> for ClientError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_decode() {
            Self::Decode(value.to_string())
        } else {
            Self::Connection(value.to_string())
        }
    }
}

/// Everything a worker may ask of the control plane.
#[async_trait]
pub trait TaskPlane: Send + Sync {
    async fn check_task(&self, req: &CheckTaskReq) -> Result<CheckTaskResp, ClientError>;
    async fn update_task(&self, req: &UpdateTaskReq) -> Result<GenericResp, ClientError>;
    async fn save_task_result(
        &self,
        req: &SaveTaskResultReq,
    ) -> Result<SaveTaskResultResp, ClientError>;
    async fn save_vul_result(&self, req: &SaveVulResultReq) -> Result<GenericResp, ClientError>;
    async fn keep_alive(&self, req: &KeepAliveReq) -> Result<KeepAliveResp, ClientError>;
    async fn templates_by_tags(
        &self,
        req: &GetTemplatesByTagsReq,
    ) -> Result<TemplatesResp, ClientError>;
    async fn templates_by_ids(
        &self,
        req: &GetTemplatesByIdsReq,
    ) -> Result<TemplatesResp, ClientError>;
    async fn custom_fingerprints(
        &self,
        enabled_only: bool,
    ) -> Result<GetCustomFingerprintsResp, ClientError>;
    async fn http_service_mappings(
        &self,
        enabled_only: bool,
    ) -> Result<GetHttpServiceMappingsResp, ClientError>;
    async fn poc_by_id(&self, req: &GetPocByIdReq) -> Result<GetPocByIdResp, ClientError>;
}

/// HTTP/JSON implementation against orchd.
pub struct HttpTaskPlane {
    base: String,
    http: reqwest::Client,
    heartbeat: reqwest::Client,
}

impl HttpTaskPlane {
    pub fn new(server_addr: &str, api_key: Option<&str>) -> Result<Self, ClientError> {
        let base = if server_addr.starts_with("http://") || server_addr.starts_with("https://") {
            server_addr.trim_end_matches('/').to_string()
        } else {
            format!("http://{server_addr}")
        };
        let mut headers = reqwest::header::HeaderMap::new();
        if let Some(key) = api_key {
            let value = reqwest::header::HeaderValue::from_str(key)
                .map_err(|e| ClientError::Decode(e.to_string()))?;
            headers.insert("x-api-key", value);
        }
        let http = reqwest::Client::builder()
            .default_headers(headers.clone())
            .build()?;
        let heartbeat = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(KEEPALIVE_DEADLINE)
            .build()?;
        Ok(Self {
            base,
            http,
            heartbeat,
        })
    }

    async fn post<Req, Resp>(
        &self,
        client: &reqwest::Client,
        path: &str,
        req: &Req,
    ) -> Result<Resp, ClientError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let resp = client
            .post(format!("{}{path}", self.base))
            .json(req)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(ClientError::Status(resp.status().as_u16()));
        }
        if resp.content_length().unwrap_or(0) > MAX_BODY_BYTES {
            return Err(ClientError::Decode("reply exceeds the 100 MiB bound".into()));
        }
        Ok(resp.json().await?)
    }
}

#[async_trait]
impl TaskPlane for HttpTaskPlane {
    async fn check_task(&self, req: &CheckTaskReq) -> Result<CheckTaskResp, ClientError> {
        self.post(&self.http, "/rpc/check-task", req).await
    }

    async fn update_task(&self, req: &UpdateTaskReq) -> Result<GenericResp, ClientError> {
        self.post(&self.http, "/rpc/update-task", req).await
    }

    async fn save_task_result(
        &self,
        req: &SaveTaskResultReq,
    ) -> Result<SaveTaskResultResp, ClientError> {
        self.post(&self.http, "/rpc/save-task-result", req).await
    }

    async fn save_vul_result(&self, req: &SaveVulResultReq) -> Result<GenericResp, ClientError> {
        self.post(&self.http, "/rpc/save-vul-result", req).await
    }

    async fn keep_alive(&self, req: &KeepAliveReq) -> Result<KeepAliveResp, ClientError> {
        self.post(&self.heartbeat, "/rpc/keepalive", req).await
    }

    async fn templates_by_tags(
        &self,
        req: &GetTemplatesByTagsReq,
    ) -> Result<TemplatesResp, ClientError> {
        self.post(&self.http, "/rpc/templates/by-tags", req).await
    }

    async fn templates_by_ids(
        &self,
        req: &GetTemplatesByIdsReq,
    ) -> Result<TemplatesResp, ClientError> {
        self.post(&self.http, "/rpc/templates/by-ids", req).await
    }

    async fn custom_fingerprints(
        &self,
        enabled_only: bool,
    ) -> Result<GetCustomFingerprintsResp, ClientError> {
        self.post(
            &self.http,
            "/rpc/fingerprints",
            &EnabledOnlyReq { enabled_only },
        )
        .await
    }

    async fn http_service_mappings(
        &self,
        enabled_only: bool,
    ) -> Result<GetHttpServiceMappingsResp, ClientError> {
        self.post(
            &self.http,
            "/rpc/http-services",
            &EnabledOnlyReq { enabled_only },
        )
        .await
    }

    async fn poc_by_id(&self, req: &GetPocByIdReq) -> Result<GetPocByIdResp, ClientError> {
        self.post(&self.http, "/rpc/poc", req).await
    }
}
