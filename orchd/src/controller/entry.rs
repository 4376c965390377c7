// SPDX-FileCopyrightText: 2025 ScanOrch Authors
//
// SPDX-License-Identifier: GPL-2.0-or-later

//! Defines the entry point for the controller.
//!
//! All known paths must be handled in the entrypoint function.

use std::convert::Infallible;
use std::fmt::Display;
use std::sync::Arc;

use hyper::{Body, Method, Request, Response};
use models::rpc::*;
use models::{TaskInfo, TaskInfoMapping, TaskStatus};
use redis_bus::Bus;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Context;
use crate::scheduling::{self, NewTask};
use crate::storage::Storage;

enum HealthOpts {
    Ready,
    Alive,
}

enum TaskAction {
    Start,
    Pause,
    Resume,
    Stop,
    Retry,
}

enum WorkerAction {
    Stop,
    Reload,
}

enum RpcPath {
    CheckTask,
    UpdateTask,
    SaveTaskResult,
    SaveVulResult,
    KeepAlive,
    TemplatesByTags,
    TemplatesByIds,
    Fingerprints,
    HttpServices,
    PocById,
    ValidatePoc,
    BatchValidatePoc,
    ValidationResult,
}

/// The supported paths of orchd.
enum KnownPaths {
    /// /rpc/...
    Rpc(RpcPath),
    /// /workspaces/{ws}/tasks[/{id}]
    Tasks(String, Option<String>),
    /// /workspaces/{ws}/tasks/{id}/{action}
    TaskAction(String, String, TaskAction),
    /// /workspaces/{ws}/assets
    Assets(String),
    /// /workspaces/{ws}/vuls
    Vuls(String),
    /// /profiles[/{id}]
    Profiles(Option<String>),
    /// /workers
    Workers,
    /// /workers/refresh
    WorkersRefresh,
    /// /workers/{name}/{action}
    WorkerAction(String, WorkerAction),
    /// /logs/workers
    WorkerLogs,
    /// /logs/tasks/{task_id}
    TaskLogs(String),
    /// /health
    Health(HealthOpts),
    /// Not supported
    Unknown,
}

impl KnownPaths {
    fn from_path(path: &str) -> Self {
        let mut parts = path.split('/').filter(|s| !s.is_empty());
        match parts.next() {
            Some("rpc") => {
                let rpc = match (parts.next(), parts.next(), parts.next()) {
                    (Some("check-task"), None, _) => RpcPath::CheckTask,
                    (Some("update-task"), None, _) => RpcPath::UpdateTask,
                    (Some("save-task-result"), None, _) => RpcPath::SaveTaskResult,
                    (Some("save-vul-result"), None, _) => RpcPath::SaveVulResult,
                    (Some("keepalive"), None, _) => RpcPath::KeepAlive,
                    (Some("templates"), Some("by-tags"), None) => RpcPath::TemplatesByTags,
                    (Some("templates"), Some("by-ids"), None) => RpcPath::TemplatesByIds,
                    (Some("fingerprints"), None, _) => RpcPath::Fingerprints,
                    (Some("http-services"), None, _) => RpcPath::HttpServices,
                    (Some("poc"), None, _) => RpcPath::PocById,
                    (Some("poc"), Some("validate"), None) => RpcPath::ValidatePoc,
                    (Some("poc"), Some("validate-batch"), None) => RpcPath::BatchValidatePoc,
                    (Some("poc"), Some("validation-result"), None) => RpcPath::ValidationResult,
                    _ => return KnownPaths::Unknown,
                };
                KnownPaths::Rpc(rpc)
            }
            Some("workspaces") => {
                let Some(ws) = parts.next() else {
                    return KnownPaths::Unknown;
                };
                match parts.next() {
                    Some("tasks") => match (parts.next(), parts.next()) {
                        (None, _) => KnownPaths::Tasks(ws.to_string(), None),
                        (Some(id), None) => KnownPaths::Tasks(ws.to_string(), Some(id.to_string())),
                        (Some(id), Some(action)) => {
                            let action = match action {
                                "start" => TaskAction::Start,
                                "pause" => TaskAction::Pause,
                                "resume" => TaskAction::Resume,
                                "stop" => TaskAction::Stop,
                                "retry" => TaskAction::Retry,
                                _ => return KnownPaths::Unknown,
                            };
                            KnownPaths::TaskAction(ws.to_string(), id.to_string(), action)
                        }
                    },
                    Some("assets") => KnownPaths::Assets(ws.to_string()),
                    Some("vuls") => KnownPaths::Vuls(ws.to_string()),
                    _ => KnownPaths::Unknown,
                }
            }
            Some("profiles") => match parts.next() {
                Some(id) => KnownPaths::Profiles(Some(id.to_string())),
                None => KnownPaths::Profiles(None),
            },
            Some("workers") => match (parts.next(), parts.next()) {
                (None, _) => KnownPaths::Workers,
                (Some("refresh"), None) => KnownPaths::WorkersRefresh,
                (Some(name), Some("stop")) => {
                    KnownPaths::WorkerAction(name.to_string(), WorkerAction::Stop)
                }
                (Some(name), Some("reload")) => {
                    KnownPaths::WorkerAction(name.to_string(), WorkerAction::Reload)
                }
                _ => KnownPaths::Unknown,
            },
            Some("logs") => match (parts.next(), parts.next()) {
                (Some("workers"), None) => KnownPaths::WorkerLogs,
                (Some("tasks"), Some(task_id)) => KnownPaths::TaskLogs(task_id.to_string()),
                _ => KnownPaths::Unknown,
            },
            Some("health") => match parts.next() {
                Some("ready") => KnownPaths::Health(HealthOpts::Ready),
                Some("alive") | None => KnownPaths::Health(HealthOpts::Alive),
                _ => KnownPaths::Unknown,
            },
            _ => {
                tracing::trace!(?path, "Unknown");
                KnownPaths::Unknown
            }
        }
    }
}

impl Display for KnownPaths {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KnownPaths::Rpc(_) => write!(f, "/rpc"),
            KnownPaths::Tasks(ws, Some(id)) => write!(f, "/workspaces/{ws}/tasks/{id}"),
            KnownPaths::Tasks(ws, None) => write!(f, "/workspaces/{ws}/tasks"),
            KnownPaths::TaskAction(ws, id, _) => write!(f, "/workspaces/{ws}/tasks/{id}/action"),
            KnownPaths::Assets(ws) => write!(f, "/workspaces/{ws}/assets"),
            KnownPaths::Vuls(ws) => write!(f, "/workspaces/{ws}/vuls"),
            KnownPaths::Profiles(Some(id)) => write!(f, "/profiles/{id}"),
            KnownPaths::Profiles(None) => write!(f, "/profiles"),
            KnownPaths::Workers => write!(f, "/workers"),
            KnownPaths::WorkersRefresh => write!(f, "/workers/refresh"),
            KnownPaths::WorkerAction(name, _) => write!(f, "/workers/{name}/action"),
            KnownPaths::WorkerLogs => write!(f, "/logs/workers"),
            KnownPaths::TaskLogs(id) => write!(f, "/logs/tasks/{id}"),
            KnownPaths::Health(_) => write!(f, "/health"),
            KnownPaths::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Task creation/update body of the operator endpoints.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskReq {
    name: String,
    target: String,
    profile_id: String,
    #[serde(default)]
    is_cron: bool,
    #[serde(default)]
    cron_rule: String,
}

impl From<TaskReq> for NewTask {
    fn from(value: TaskReq) -> Self {
        NewTask {
            name: value.name,
            target: value.target,
            profile_id: value.profile_id,
            is_cron: value.is_cron,
            cron_rule: value.cron_rule,
        }
    }
}

async fn json_body<T: DeserializeOwned>(req: Request<Body>) -> Result<T, String> {
    let bytes = hyper::body::to_bytes(req.into_body())
        .await
        .map_err(|e| format!("unable to read body: {e}"))?;
    serde_json::from_slice(&bytes).map_err(|e| format!("unable to parse body: {e}"))
}

fn query_count(req: &Request<Body>, default: usize) -> usize {
    req.uri()
        .query()
        .and_then(|q| {
            q.split('&')
                .find_map(|kv| kv.strip_prefix("count="))
                .and_then(|v| v.parse().ok())
        })
        .unwrap_or(default)
}

/// Handles a single request against the context.
pub async fn entrypoint<DB, B>(
    req: Request<Body>,
    ctx: Arc<Context<DB, B>>,
) -> Result<Response<Body>, Infallible>
where
    DB: Storage + Send + Sync + 'static,
    B: Bus + Send + Sync + 'static,
{
    use KnownPaths::*;
    let kp = KnownPaths::from_path(req.uri().path());
    // on head requests we just return an empty response without checking the api key
    if req.method() == Method::HEAD {
        return Ok(ctx.response.empty(hyper::StatusCode::OK));
    }
    if let Some(key) = ctx.api_key.as_ref() {
        if !matches!(kp, Health(_)) {
            match req.headers().get("x-api-key") {
                Some(v) if v == key => {}
                v => {
                    tracing::debug!("{} {} invalid key: {:?}", req.method(), kp, v);
                    return Ok(ctx.response.unauthorized());
                }
            }
        }
    }

    let method = req.method().clone();
    let resp = match (method, kp) {
        (Method::GET, Health(_)) => ctx.response.empty(hyper::StatusCode::OK),

        (Method::POST, Rpc(rpc)) => handle_rpc(req, &ctx, rpc).await,

        (Method::GET, Tasks(ws, None)) => match ctx.tasks.storage().list_tasks(&ws).await {
            Ok(tasks) => ctx.response.ok(&tasks),
            Err(e) => ctx.response.internal_server_error(&e),
        },
        (Method::POST, Tasks(ws, None)) => match json_body::<TaskReq>(req).await {
            Ok(body) => match ctx.tasks.create(&ws, body.into()).await {
                Ok(id) => ctx.response.created(&id),
                Err(e) => scheduling_error(&ctx, e),
            },
            Err(e) => ctx.response.bad_request(&e),
        },
        (Method::GET, Tasks(ws, Some(id))) => match ctx.tasks.storage().find_task(&ws, &id).await {
            Ok(task) => ctx.response.ok(&task),
            Err(crate::storage::Error::NotFound) => ctx.response.not_found("tasks", &id),
            Err(e) => ctx.response.internal_server_error(&e),
        },
        (Method::PUT, Tasks(ws, Some(id))) => match json_body::<TaskReq>(req).await {
            Ok(body) => match ctx.tasks.update(&ws, &id, body.into()).await {
                Ok(()) => ctx.response.no_content(),
                Err(e) => scheduling_error(&ctx, e),
            },
            Err(e) => ctx.response.bad_request(&e),
        },
        (Method::DELETE, Tasks(ws, Some(id))) => {
            match ctx.tasks.storage().remove_task(&ws, &id).await {
                Ok(()) => ctx.response.no_content(),
                Err(crate::storage::Error::NotFound) => ctx.response.not_found("tasks", &id),
                Err(e) => ctx.response.internal_server_error(&e),
            }
        }
        (Method::POST, TaskAction(ws, id, action)) => {
            let result = match action {
                self::TaskAction::Start => ctx.tasks.start(&ws, &id).await,
                self::TaskAction::Pause => ctx.tasks.pause(&ws, &id).await,
                self::TaskAction::Resume => ctx.tasks.resume(&ws, &id).await,
                self::TaskAction::Stop => ctx.tasks.stop(&ws, &id).await,
                self::TaskAction::Retry => ctx.tasks.retry(&ws, &id).await,
            };
            match result {
                Ok(()) => ctx.response.no_content(),
                Err(e) => scheduling_error(&ctx, e),
            }
        }

        (Method::GET, Assets(ws)) => match ctx.tasks.storage().assets(&ws).await {
            Ok(assets) => ctx.response.ok(&assets),
            Err(e) => ctx.response.internal_server_error(&e),
        },
        (Method::GET, Vuls(ws)) => match ctx.tasks.storage().vuls(&ws).await {
            Ok(vuls) => ctx.response.ok(&vuls),
            Err(e) => ctx.response.internal_server_error(&e),
        },

        (Method::GET, Profiles(None)) => match ctx.tasks.storage().list_profiles().await {
            Ok(profiles) => ctx.response.ok(&profiles),
            Err(e) => ctx.response.internal_server_error(&e),
        },
        (Method::POST, Profiles(None)) => match json_body::<models::TaskProfile>(req).await {
            Ok(mut profile) => {
                if profile.id.is_empty() {
                    profile.id = Uuid::new_v4().to_string();
                }
                let id = profile.id.clone();
                match ctx.tasks.storage().insert_profile(profile).await {
                    Ok(()) => ctx.response.created(&id),
                    Err(e) => ctx.response.internal_server_error(&e),
                }
            }
            Err(e) => ctx.response.bad_request(&e),
        },
        (Method::DELETE, Profiles(Some(id))) => {
            match ctx.tasks.storage().remove_profile(&id).await {
                Ok(()) => ctx.response.no_content(),
                Err(crate::storage::Error::NotFound) => ctx.response.not_found("profiles", &id),
                Err(e) => ctx.response.internal_server_error(&e),
            }
        }

        (Method::GET, Workers) => match ctx.tasks.bus().list_workers().await {
            Ok(workers) => ctx.response.ok(&workers),
            Err(e) => ctx.response.internal_server_error(&e),
        },
        (Method::POST, WorkersRefresh) => match ctx.tasks.bus().publish_query().await {
            Ok(()) => ctx.response.no_content(),
            Err(e) => ctx.response.internal_server_error(&e),
        },
        (Method::POST, WorkerAction(name, action)) => {
            match action {
                self::WorkerAction::Stop => ctx.tasks.flag_worker_stop(&name).await,
                self::WorkerAction::Reload => ctx.tasks.flag_worker_reload(&name).await,
            }
            ctx.response.no_content()
        }

        (Method::GET, WorkerLogs) => {
            let count = query_count(&req, 100);
            match ctx.tasks.bus().worker_logs(count).await {
                Ok(logs) => ctx.response.ok(&logs),
                Err(e) => ctx.response.internal_server_error(&e),
            }
        }
        (Method::GET, TaskLogs(task_id)) => {
            let count = query_count(&req, 100);
            match ctx.tasks.bus().task_logs(&task_id, count).await {
                Ok(logs) => ctx.response.ok(&logs),
                Err(e) => ctx.response.internal_server_error(&e),
            }
        }

        (method, kp) => {
            tracing::debug!(%method, %kp, "unhandled");
            ctx.response.not_found("path", req.uri().path())
        }
    };
    Ok(resp)
}

fn scheduling_error<DB, B>(ctx: &Context<DB, B>, e: scheduling::Error) -> Response<Body> {
    match e {
        scheduling::Error::NotFound => ctx.response.not_found("tasks", ""),
        scheduling::Error::InvalidState(msg) | scheduling::Error::InvalidInput(msg) => {
            ctx.response.bad_request(&msg)
        }
        e => ctx.response.internal_server_error(&e),
    }
}

async fn handle_rpc<DB, B>(
    req: Request<Body>,
    ctx: &Context<DB, B>,
    rpc: RpcPath,
) -> Response<Body>
where
    DB: Storage + Send + Sync + 'static,
    B: Bus + Send + Sync + 'static,
{
    match rpc {
        RpcPath::CheckTask => match json_body::<CheckTaskReq>(req).await {
            Ok(body) => match ctx.tasks.check_task(&body.worker_name).await {
                Ok(Some(info)) => ctx.response.ok(&CheckTaskResp {
                    is_exist: true,
                    is_finished: false,
                    task_id: info.task_id,
                    main_task_id: info.main_task_id,
                    workspace_id: info.workspace_id,
                    config: info.config,
                }),
                Ok(None) => ctx.response.ok(&CheckTaskResp {
                    is_exist: false,
                    is_finished: true,
                    ..Default::default()
                }),
                Err(e) => ctx.response.internal_server_error(&e),
            },
            Err(e) => ctx.response.bad_request(&e),
        },
        RpcPath::UpdateTask => match json_body::<UpdateTaskReq>(req).await {
            Ok(body) => {
                match ctx
                    .tasks
                    .update_from_worker(&body.task_id, &body.state, &body.worker, &body.result)
                    .await
                {
                    Ok(()) => ctx.response.ok(&GenericResp {
                        success: true,
                        message: "ok".to_string(),
                    }),
                    Err(scheduling::Error::NotFound) => {
                        ctx.response.not_found("tasks", &body.task_id)
                    }
                    Err(e) => ctx.response.internal_server_error(&e),
                }
            }
            Err(e) => ctx.response.bad_request(&e),
        },
        RpcPath::SaveTaskResult => match json_body::<SaveTaskResultReq>(req).await {
            Ok(body) => {
                match ctx
                    .tasks
                    .storage()
                    .save_assets(&body.workspace_id, &body.main_task_id, body.assets)
                    .await
                {
                    Ok((inserted, updated)) => ctx.response.ok(&SaveTaskResultResp {
                        success: true,
                        message: format!("inserted {inserted}, updated {updated}"),
                        inserted,
                        updated,
                    }),
                    Err(e) => ctx.response.internal_server_error(&e),
                }
            }
            Err(e) => ctx.response.bad_request(&e),
        },
        RpcPath::SaveVulResult => match json_body::<SaveVulResultReq>(req).await {
            Ok(body) => {
                match ctx
                    .tasks
                    .storage()
                    .save_vuls(&body.workspace_id, &body.main_task_id, body.vuls)
                    .await
                {
                    Ok((inserted, updated)) => ctx.response.ok(&GenericResp {
                        success: true,
                        message: format!("inserted {inserted}, updated {updated}"),
                    }),
                    Err(e) => ctx.response.internal_server_error(&e),
                }
            }
            Err(e) => ctx.response.bad_request(&e),
        },
        RpcPath::KeepAlive => match json_body::<KeepAliveReq>(req).await {
            Ok(body) => {
                let status = models::WorkerStatus {
                    worker_name: body.worker_name.clone(),
                    cpu_load: body.cpu_load,
                    mem_used: body.mem_used,
                    task_started_number: body.task_started_number,
                    task_executed_number: body.task_executed_number,
                    is_daemon: body.is_daemon,
                    update_time: models::now_string(),
                };
                match ctx.tasks.keepalive(&status).await {
                    Ok((stop, reload)) => ctx.response.ok(&KeepAliveResp {
                        manual_stop_flag: stop,
                        manual_reload_flag: reload,
                    }),
                    Err(e) => ctx.response.internal_server_error(&e),
                }
            }
            Err(e) => ctx.response.bad_request(&e),
        },
        RpcPath::TemplatesByTags => match json_body::<GetTemplatesByTagsReq>(req).await {
            Ok(body) => {
                let severities: Vec<_> = body
                    .severities
                    .iter()
                    .map(|s| models::Severity::parse(s))
                    .collect();
                match ctx
                    .tasks
                    .storage()
                    .templates_by_tags(&body.tags, &severities)
                    .await
                {
                    Ok(templates) => templates_resp(ctx, templates.into_iter().map(|t| t.content)),
                    Err(e) => ctx.response.internal_server_error(&e),
                }
            }
            Err(e) => ctx.response.bad_request(&e),
        },
        RpcPath::TemplatesByIds => match json_body::<GetTemplatesByIdsReq>(req).await {
            Ok(body) => {
                let storage = ctx.tasks.storage();
                let nuclei = storage.templates_by_ids(&body.nuclei_template_ids).await;
                let custom = storage.custom_pocs_by_ids(&body.custom_poc_ids).await;
                match (nuclei, custom) {
                    (Ok(nuclei), Ok(custom)) => {
                        let requested = body.nuclei_template_ids.len() + body.custom_poc_ids.len();
                        let found = nuclei.len() + custom.len();
                        if found < requested {
                            tracing::warn!(requested, found, "some template ids were not found");
                        }
                        templates_resp(
                            ctx,
                            nuclei
                                .into_iter()
                                .map(|t| t.content)
                                .chain(custom.into_iter().map(|p| p.content)),
                        )
                    }
                    (Err(e), _) | (_, Err(e)) => ctx.response.internal_server_error(&e),
                }
            }
            Err(e) => ctx.response.bad_request(&e),
        },
        RpcPath::Fingerprints => match json_body::<EnabledOnlyReq>(req).await {
            Ok(body) => match ctx.tasks.storage().fingerprints(body.enabled_only).await {
                Ok(fingerprints) => ctx.response.ok(&GetCustomFingerprintsResp {
                    success: true,
                    message: String::new(),
                    fingerprints,
                }),
                Err(e) => ctx.response.internal_server_error(&e),
            },
            Err(e) => ctx.response.bad_request(&e),
        },
        RpcPath::HttpServices => match json_body::<EnabledOnlyReq>(req).await {
            Ok(body) => {
                match ctx
                    .tasks
                    .storage()
                    .http_service_mappings(body.enabled_only)
                    .await
                {
                    Ok(mappings) => ctx.response.ok(&GetHttpServiceMappingsResp {
                        success: true,
                        message: String::new(),
                        mappings,
                    }),
                    Err(e) => ctx.response.internal_server_error(&e),
                }
            }
            Err(e) => ctx.response.bad_request(&e),
        },
        RpcPath::PocById => match json_body::<GetPocByIdReq>(req).await {
            Ok(body) => match ctx
                .tasks
                .storage()
                .poc_by_id(&body.poc_id, &body.poc_type)
                .await
            {
                Ok(poc) => ctx.response.ok(&GetPocByIdResp {
                    success: true,
                    message: String::new(),
                    name: poc.name,
                    severity: poc.severity.to_string(),
                    poc_type: if body.poc_type.is_empty() {
                        "custom".to_string()
                    } else {
                        body.poc_type
                    },
                    content: poc.content,
                }),
                Err(crate::storage::Error::NotFound) => ctx.response.ok(&GetPocByIdResp {
                    success: false,
                    message: format!("poc {} not found", body.poc_id),
                    ..Default::default()
                }),
                Err(e) => ctx.response.internal_server_error(&e),
            },
            Err(e) => ctx.response.bad_request(&e),
        },
        RpcPath::ValidatePoc => match json_body::<ValidatePocReq>(req).await {
            Ok(body) => match queue_validation(ctx, &body.url, &body.poc_id, &body.poc_type, body.timeout, "").await {
                Ok(task_id) => ctx.response.ok(&ValidatePocResp {
                    success: true,
                    message: String::new(),
                    task_id,
                }),
                Err(e) => ctx.response.internal_server_error(&e),
            },
            Err(e) => ctx.response.bad_request(&e),
        },
        RpcPath::BatchValidatePoc => match json_body::<BatchValidatePocReq>(req).await {
            Ok(body) => {
                let batch_id = Uuid::new_v4().to_string();
                let mut task_ids = Vec::with_capacity(body.poc_ids.len());
                for poc_id in &body.poc_ids {
                    match queue_validation(ctx, &body.url, poc_id, &body.poc_type, body.timeout, &batch_id).await {
                        Ok(task_id) => task_ids.push(task_id),
                        Err(e) => return ctx.response.internal_server_error(&e),
                    }
                }
                ctx.response.ok(&BatchValidatePocResp {
                    success: true,
                    message: String::new(),
                    batch_id,
                    task_ids,
                })
            }
            Err(e) => ctx.response.bad_request(&e),
        },
        RpcPath::ValidationResult => match json_body::<GetPocValidationResultReq>(req).await {
            Ok(body) => match ctx.tasks.bus().task_result(&body.task_id).await {
                Ok(Some(raw)) => match serde_json::from_str(&raw) {
                    Ok(result) => ctx.response.ok(&GetPocValidationResultResp {
                        success: true,
                        message: String::new(),
                        result: Some(result),
                    }),
                    Err(e) => ctx.response.internal_server_error(&e),
                },
                Ok(None) => ctx.response.ok(&GetPocValidationResultResp {
                    success: false,
                    message: "result not ready".to_string(),
                    result: None,
                }),
                Err(e) => ctx.response.internal_server_error(&e),
            },
            Err(e) => ctx.response.bad_request(&e),
        },
    }
}

fn templates_resp<DB, B>(
    ctx: &Context<DB, B>,
    contents: impl Iterator<Item = String>,
) -> Response<Body> {
    let templates: Vec<String> = contents.filter(|c| !c.is_empty()).collect();
    ctx.response.ok(&TemplatesResp {
        success: true,
        message: String::new(),
        count: templates.len(),
        templates,
    })
}

/// Queues an ephemeral POC validation task. The record lives only on the
/// bus; its outcome lands under the task result key.
async fn queue_validation<DB, B>(
    ctx: &Context<DB, B>,
    url: &str,
    poc_id: &str,
    poc_type: &str,
    timeout: u32,
    batch_id: &str,
) -> Result<String, redis_bus::BusError>
where
    B: Bus + Send + Sync,
{
    let task_id = Uuid::new_v4().to_string();
    let config = serde_json::json!({
        "taskType": "poc_validate",
        "target": url,
        "url": url,
        "pocId": poc_id,
        "pocType": poc_type,
        "timeout": timeout,
        "batchId": batch_id,
    });
    ctx.tasks
        .bus()
        .push_task(&TaskInfo {
            task_id: task_id.clone(),
            main_task_id: task_id.clone(),
            workspace_id: String::new(),
            task_name: "poc_validate".to_string(),
            config: config.to_string(),
            priority: 2,
        })
        .await?;
    ctx.tasks
        .bus()
        .set_task_info(
            &task_id,
            &TaskInfoMapping {
                workspace_id: String::new(),
                main_task_id: task_id.clone(),
                status: Some(TaskStatus::Pending.to_string()),
                update_time: Some(models::now_string()),
            },
        )
        .await?;
    Ok(task_id)
}
