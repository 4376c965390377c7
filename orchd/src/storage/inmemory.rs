// SPDX-FileCopyrightText: 2025 ScanOrch Authors
//
// SPDX-License-Identifier: GPL-2.0-or-later

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use models::{
    Asset, CustomPoc, FingerprintRule, HttpServiceMapping, MainTask, NucleiTemplate, Severity,
    TagMapping, TaskProfile, Vulnerability,
};

use super::{
    CatalogStore, Error, ProfileStorer, ResultSink, TaskStorer, TaskUpdate,
};

/// The default storage: everything behind `RwLock`ed maps.
///
/// A durable backend implements the same traits; nothing outside the
/// storage module knows the difference.
#[derive(Debug, Default)]
pub struct Storage {
    // workspace -> task id -> record
    tasks: RwLock<HashMap<String, HashMap<String, MainTask>>>,
    profiles: RwLock<HashMap<String, TaskProfile>>,
    // workspace -> (authority, task_id) -> asset
    assets: RwLock<HashMap<String, HashMap<(String, String), Asset>>>,
    // workspace -> (host, port, poc_file, url) -> vulnerability
    vuls: RwLock<HashMap<String, HashMap<(String, u16, String, String), Vulnerability>>>,
    templates: RwLock<Vec<NucleiTemplate>>,
    custom_pocs: RwLock<Vec<CustomPoc>>,
    fingerprints: RwLock<Vec<FingerprintRule>>,
    tag_mappings: RwLock<Vec<TagMapping>>,
    http_mappings: RwLock<Vec<HttpServiceMapping>>,
}

impl Storage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed_templates(&self, templates: Vec<NucleiTemplate>) {
        self.templates.write().await.extend(templates);
    }

    pub async fn seed_custom_pocs(&self, pocs: Vec<CustomPoc>) {
        self.custom_pocs.write().await.extend(pocs);
    }

    pub async fn seed_fingerprints(&self, rules: Vec<FingerprintRule>) {
        self.fingerprints.write().await.extend(rules);
    }

    pub async fn seed_tag_mappings(&self, mappings: Vec<TagMapping>) {
        self.tag_mappings.write().await.extend(mappings);
    }

    pub async fn seed_http_mappings(&self, mappings: Vec<HttpServiceMapping>) {
        self.http_mappings.write().await.extend(mappings);
    }
}

#[async_trait]
impl TaskStorer for Storage {
    async fn insert_task(&self, workspace_id: &str, mut task: MainTask) -> Result<(), Error> {
        let now = Utc::now();
        task.workspace_id = workspace_id.to_string();
        task.create_time = Some(now);
        task.update_time = Some(now);
        let mut tasks = self.tasks.write().await;
        tasks
            .entry(workspace_id.to_string())
            .or_default()
            .insert(task.id.clone(), task);
        Ok(())
    }

    async fn find_task(&self, workspace_id: &str, id: &str) -> Result<MainTask, Error> {
        let tasks = self.tasks.read().await;
        tasks
            .get(workspace_id)
            .and_then(|ws| ws.get(id))
            .cloned()
            .ok_or(Error::NotFound)
    }

    async fn find_task_by_task_id(&self, task_id: &str) -> Result<(String, MainTask), Error> {
        let tasks = self.tasks.read().await;
        for (ws, records) in tasks.iter() {
            if let Some(task) = records.values().find(|t| t.task_id == task_id) {
                return Ok((ws.clone(), task.clone()));
            }
        }
        Err(Error::NotFound)
    }

    async fn update_task(
        &self,
        workspace_id: &str,
        id: &str,
        update: TaskUpdate,
    ) -> Result<(), Error> {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(workspace_id)
            .and_then(|ws| ws.get_mut(id))
            .ok_or(Error::NotFound)?;
        if let Some(status) = update.status {
            task.status = status;
        }
        if let Some(task_id) = update.task_id {
            task.task_id = task_id;
        }
        if let Some(config) = update.config {
            task.config = config;
        }
        if let Some(progress) = update.progress {
            task.progress = progress;
        }
        if let Some(result) = update.result {
            task.result = result;
        }
        if let Some(state) = update.task_state {
            task.task_state = state;
        }
        if let Some(name) = update.name {
            task.name = name;
        }
        if let Some(target) = update.target {
            task.target = target;
        }
        if let Some(profile_id) = update.profile_id {
            task.profile_id = profile_id;
        }
        if let Some(profile_name) = update.profile_name {
            task.profile_name = profile_name;
        }
        task.update_time = Some(Utc::now());
        Ok(())
    }

    async fn list_tasks(&self, workspace_id: &str) -> Result<Vec<MainTask>, Error> {
        let tasks = self.tasks.read().await;
        let mut list: Vec<_> = tasks
            .get(workspace_id)
            .map(|ws| ws.values().cloned().collect())
            .unwrap_or_default();
        list.sort_by(|a: &MainTask, b: &MainTask| b.create_time.cmp(&a.create_time));
        Ok(list)
    }

    async fn remove_task(&self, workspace_id: &str, id: &str) -> Result<(), Error> {
        let mut tasks = self.tasks.write().await;
        tasks
            .get_mut(workspace_id)
            .and_then(|ws| ws.remove(id))
            .ok_or(Error::NotFound)?;
        Ok(())
    }

    async fn workspaces(&self) -> Result<Vec<String>, Error> {
        Ok(self.tasks.read().await.keys().cloned().collect())
    }
}

#[async_trait]
impl ProfileStorer for Storage {
    async fn insert_profile(&self, profile: TaskProfile) -> Result<(), Error> {
        self.profiles
            .write()
            .await
            .insert(profile.id.clone(), profile);
        Ok(())
    }

    async fn find_profile(&self, id: &str) -> Result<TaskProfile, Error> {
        self.profiles
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or(Error::NotFound)
    }

    async fn list_profiles(&self) -> Result<Vec<TaskProfile>, Error> {
        Ok(self.profiles.read().await.values().cloned().collect())
    }

    async fn remove_profile(&self, id: &str) -> Result<(), Error> {
        self.profiles
            .write()
            .await
            .remove(id)
            .ok_or(Error::NotFound)?;
        Ok(())
    }
}

#[async_trait]
impl ResultSink for Storage {
    async fn save_assets(
        &self,
        workspace_id: &str,
        main_task_id: &str,
        assets: Vec<Asset>,
    ) -> Result<(usize, usize), Error> {
        let now = Utc::now();
        let mut collections = self.assets.write().await;
        let collection = collections.entry(workspace_id.to_string()).or_default();
        let mut inserted = 0;
        let mut updated = 0;
        for mut asset in assets {
            asset.task_id = main_task_id.to_string();
            let key = (asset.authority(), main_task_id.to_string());
            match collection.get_mut(&key) {
                Some(existing) => {
                    let create_time = existing.create_time;
                    asset.create_time = create_time;
                    asset.update_time = Some(now);
                    asset.is_new = false;
                    asset.is_updated = true;
                    *existing = asset;
                    updated += 1;
                }
                None => {
                    asset.create_time = Some(now);
                    asset.update_time = Some(now);
                    asset.is_new = true;
                    collection.insert(key, asset);
                    inserted += 1;
                }
            }
        }
        Ok((inserted, updated))
    }

    async fn save_vuls(
        &self,
        workspace_id: &str,
        main_task_id: &str,
        vuls: Vec<Vulnerability>,
    ) -> Result<(usize, usize), Error> {
        let now = Utc::now();
        let mut collections = self.vuls.write().await;
        let collection = collections.entry(workspace_id.to_string()).or_default();
        let mut inserted = 0;
        let mut updated = 0;
        for mut vul in vuls {
            vul.task_id = main_task_id.to_string();
            let key = (
                vul.host.clone(),
                vul.port,
                vul.poc_file.clone(),
                vul.url.clone(),
            );
            match collection.get_mut(&key) {
                Some(existing) => {
                    vul.create_time = existing.create_time;
                    vul.update_time = Some(now);
                    *existing = vul;
                    updated += 1;
                }
                None => {
                    vul.create_time = Some(now);
                    vul.update_time = Some(now);
                    collection.insert(key, vul);
                    inserted += 1;
                }
            }
        }
        Ok((inserted, updated))
    }

    async fn assets(&self, workspace_id: &str) -> Result<Vec<Asset>, Error> {
        let collections = self.assets.read().await;
        Ok(collections
            .get(workspace_id)
            .map(|c| c.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn vuls(&self, workspace_id: &str) -> Result<Vec<Vulnerability>, Error> {
        let collections = self.vuls.read().await;
        Ok(collections
            .get(workspace_id)
            .map(|c| c.values().cloned().collect())
            .unwrap_or_default())
    }
}

fn severity_matches(severities: &[Severity], severity: Severity) -> bool {
    severities.is_empty() || severities.contains(&severity)
}

#[async_trait]
impl CatalogStore for Storage {
    async fn templates_by_severity(
        &self,
        severities: &[Severity],
    ) -> Result<Vec<NucleiTemplate>, Error> {
        let templates = self.templates.read().await;
        Ok(templates
            .iter()
            .filter(|t| t.enabled && severity_matches(severities, t.severity))
            .cloned()
            .collect())
    }

    async fn templates_by_tags(
        &self,
        tags: &[String],
        severities: &[Severity],
    ) -> Result<Vec<NucleiTemplate>, Error> {
        let templates = self.templates.read().await;
        Ok(templates
            .iter()
            .filter(|t| {
                t.enabled
                    && severity_matches(severities, t.severity)
                    && t.tags.iter().any(|tag| tags.contains(tag))
            })
            .cloned()
            .collect())
    }

    async fn templates_by_ids(&self, ids: &[String]) -> Result<Vec<NucleiTemplate>, Error> {
        let templates = self.templates.read().await;
        Ok(templates
            .iter()
            .filter(|t| ids.contains(&t.id) || ids.contains(&t.template_id))
            .cloned()
            .collect())
    }

    async fn enabled_custom_pocs(&self) -> Result<Vec<CustomPoc>, Error> {
        let pocs = self.custom_pocs.read().await;
        Ok(pocs.iter().filter(|p| p.enabled).cloned().collect())
    }

    async fn custom_pocs_by_ids(&self, ids: &[String]) -> Result<Vec<CustomPoc>, Error> {
        let pocs = self.custom_pocs.read().await;
        Ok(pocs.iter().filter(|p| ids.contains(&p.id)).cloned().collect())
    }

    async fn poc_by_id(&self, id: &str, poc_type: &str) -> Result<CustomPoc, Error> {
        if poc_type == "nuclei" {
            let templates = self.templates.read().await;
            return templates
                .iter()
                .find(|t| t.id == id || t.template_id == id)
                .map(|t| CustomPoc {
                    id: t.id.clone(),
                    template_id: t.template_id.clone(),
                    name: t.name.clone(),
                    severity: t.severity,
                    tags: t.tags.clone(),
                    author: t.author.clone(),
                    description: t.description.clone(),
                    content: t.content.clone(),
                    enabled: t.enabled,
                })
                .ok_or(Error::NotFound);
        }
        let pocs = self.custom_pocs.read().await;
        pocs.iter()
            .find(|p| p.id == id)
            .cloned()
            .ok_or(Error::NotFound)
    }

    async fn enabled_tag_mappings(&self) -> Result<Vec<TagMapping>, Error> {
        let mappings = self.tag_mappings.read().await;
        Ok(mappings.iter().filter(|m| m.enabled).cloned().collect())
    }

    async fn fingerprints(&self, enabled_only: bool) -> Result<Vec<FingerprintRule>, Error> {
        let rules = self.fingerprints.read().await;
        Ok(rules
            .iter()
            .filter(|r| !enabled_only || r.enabled)
            .cloned()
            .collect())
    }

    async fn http_service_mappings(
        &self,
        enabled_only: bool,
    ) -> Result<Vec<HttpServiceMapping>, Error> {
        let mappings = self.http_mappings.read().await;
        Ok(mappings
            .iter()
            .filter(|m| !enabled_only || m.enabled)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use models::TaskStatus;

    fn asset(host: &str, port: u16) -> Asset {
        Asset::open_port(host, port)
    }

    #[tokio::test]
    async fn asset_upsert_preserves_create_time() {
        let storage = Storage::new();
        let (inserted, updated) = storage
            .save_assets("ws", "m1", vec![asset("10.0.0.1", 80)])
            .await
            .unwrap();
        assert_eq!((inserted, updated), (1, 0));
        let first = storage.assets("ws").await.unwrap().remove(0);
        assert!(first.is_new);
        let created = first.create_time.unwrap();

        let mut second = asset("10.0.0.1", 80);
        second.title = "hello".into();
        let (inserted, updated) = storage.save_assets("ws", "m1", vec![second]).await.unwrap();
        assert_eq!((inserted, updated), (0, 1));
        let stored = storage.assets("ws").await.unwrap().remove(0);
        assert_eq!(stored.title, "hello");
        assert_eq!(stored.create_time.unwrap(), created);
        assert!(stored.update_time.unwrap() >= created);
        assert!(!stored.is_new);
        assert!(stored.is_updated);
    }

    #[tokio::test]
    async fn same_authority_under_other_task_is_a_new_row() {
        let storage = Storage::new();
        storage
            .save_assets("ws", "m1", vec![asset("10.0.0.1", 80)])
            .await
            .unwrap();
        let (inserted, _) = storage
            .save_assets("ws", "m2", vec![asset("10.0.0.1", 80)])
            .await
            .unwrap();
        assert_eq!(inserted, 1);
        assert_eq!(storage.assets("ws").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn vul_upsert_folds_the_four_tuple() {
        let storage = Storage::new();
        let vul = Vulnerability {
            host: "h".into(),
            port: 443,
            poc_file: "cve-1".into(),
            url: "https://h/".into(),
            severity: models::Severity::High,
            ..Default::default()
        };
        storage
            .save_vuls("ws", "m1", vec![vul.clone(), vul.clone()])
            .await
            .unwrap();
        let mut replay = vul.clone();
        replay.result = "second run".into();
        let (inserted, updated) = storage.save_vuls("ws", "m2", vec![replay]).await.unwrap();
        assert_eq!((inserted, updated), (0, 1));
        let stored = storage.vuls("ws").await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].result, "second run");
        assert_eq!(stored[0].task_id, "m2");
    }

    #[tokio::test]
    async fn workspaces_are_disjoint() {
        let storage = Storage::new();
        storage
            .save_assets("ws-a", "m", vec![asset("h", 80)])
            .await
            .unwrap();
        assert!(storage.assets("ws-b").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn task_crud_round_trip() {
        let storage = Storage::new();
        let task = MainTask {
            id: "id1".into(),
            task_id: "t1".into(),
            name: "scan".into(),
            status: TaskStatus::Created,
            ..Default::default()
        };
        storage.insert_task("ws", task).await.unwrap();
        let found = storage.find_task("ws", "id1").await.unwrap();
        assert_eq!(found.status, TaskStatus::Created);
        assert!(found.create_time.is_some());

        storage
            .update_task(
                "ws",
                "id1",
                TaskUpdate {
                    status: Some(TaskStatus::Pending),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let (ws, by_task_id) = storage.find_task_by_task_id("t1").await.unwrap();
        assert_eq!(ws, "ws");
        assert_eq!(by_task_id.status, TaskStatus::Pending);

        storage.remove_task("ws", "id1").await.unwrap();
        assert!(matches!(
            storage.find_task("ws", "id1").await,
            Err(Error::NotFound)
        ));
    }

    #[tokio::test]
    async fn catalog_filters_by_severity_and_tags() {
        let storage = Storage::new();
        storage
            .seed_templates(vec![
                NucleiTemplate {
                    id: "1".into(),
                    template_id: "cve-a".into(),
                    severity: models::Severity::Critical,
                    tags: vec!["nginx".into()],
                    enabled: true,
                    ..Default::default()
                },
                NucleiTemplate {
                    id: "2".into(),
                    template_id: "cve-b".into(),
                    severity: models::Severity::Low,
                    tags: vec!["nginx".into()],
                    enabled: true,
                    ..Default::default()
                },
                NucleiTemplate {
                    id: "3".into(),
                    template_id: "cve-c".into(),
                    severity: models::Severity::Critical,
                    tags: vec!["apache".into()],
                    enabled: false,
                    ..Default::default()
                },
            ])
            .await;

        let by_sev = storage
            .templates_by_severity(&[models::Severity::Critical])
            .await
            .unwrap();
        assert_eq!(by_sev.len(), 1);
        assert_eq!(by_sev[0].template_id, "cve-a");

        let by_tag = storage
            .templates_by_tags(&["nginx".to_string()], &[])
            .await
            .unwrap();
        assert_eq!(by_tag.len(), 2);

        // disabled templates are invisible even when addressed by tag
        let none = storage
            .templates_by_tags(&["apache".to_string()], &[])
            .await
            .unwrap();
        assert!(none.is_empty());
    }
}
