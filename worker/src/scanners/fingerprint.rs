// SPDX-FileCopyrightText: 2025 ScanOrch Authors
//
// SPDX-License-Identifier: GPL-2.0-or-later

//! HTTP fingerprinting.
//!
//! Probes each asset over http/https, captures the response features and
//! matches them against the builtin rule set plus whatever custom rules
//! the catalog contributed.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use models::scanner::{Error, FingerprintOptions, Scan, ScanJob, ScanOptions, ScanOutput};
use models::{Asset, FingerprintRule};
use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};

const BODY_CAP: usize = 64 * 1024;
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// In-process probe, no external binary involved.
pub struct FingerprintScanner {
    http: reqwest::Client,
}

impl FingerprintScanner {
    pub fn new() -> Self {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(PROBE_TIMEOUT)
            .redirect(reqwest::redirect::Policy::limited(3))
            .build()
            .expect("reqwest client");
        Self { http }
    }
}

impl Default for FingerprintScanner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Scan for FingerprintScanner {
    fn name(&self) -> &str {
        "fingerprint"
    }

    async fn scan(&self, job: &ScanJob) -> Result<ScanOutput, Error> {
        let custom_rules = match &job.options {
            ScanOptions::Fingerprint(FingerprintOptions { custom_rules }) => custom_rules.clone(),
            _ => vec![],
        };
        let mut enriched = Vec::with_capacity(job.assets.len());
        for asset in &job.assets {
            let mut asset = asset.clone();
            if let Some(probe) = self.probe(&asset).await {
                asset.service = probe.service.clone();
                asset.title = probe.title.clone();
                asset.http_status = probe.status.to_string();
                asset.http_header = probe.headers.clone();
                asset.http_body = probe.body.clone();
                asset.server = probe.server.clone();
                asset.icon_hash = probe.icon_hash.clone();
                asset.is_http = true;
                asset.app = match_apps(&probe, &custom_rules);
            }
            enriched.push(asset);
        }
        Ok(ScanOutput {
            assets: enriched,
            vulnerabilities: vec![],
        })
    }
}

pub(crate) struct Probe {
    pub service: String,
    pub status: u16,
    pub title: String,
    pub headers: String,
    pub body: String,
    pub server: String,
    pub icon_hash: String,
}

impl FingerprintScanner {
    async fn probe(&self, asset: &Asset) -> Option<Probe> {
        let https_first =
            asset.service == "https" || matches!(asset.port, 443 | 8443);
        let schemes = if https_first {
            ["https", "http"]
        } else {
            ["http", "https"]
        };
        for scheme in schemes {
            let url = format!("{scheme}://{}:{}", asset.host, asset.port);
            if let Some(mut probe) = self.fetch(&url).await {
                probe.service = scheme.to_string();
                probe.icon_hash = self.icon_hash(&url).await.unwrap_or_default();
                return Some(probe);
            }
        }
        None
    }

    async fn fetch(&self, url: &str) -> Option<Probe> {
        let resp = self.http.get(url).send().await.ok()?;
        let status = resp.status().as_u16();
        let server = resp
            .headers()
            .get("server")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let headers = resp
            .headers()
            .iter()
            .map(|(k, v)| format!("{}: {}", k, v.to_str().unwrap_or_default()))
            .collect::<Vec<_>>()
            .join("\n");
        let mut body = resp.text().await.unwrap_or_default();
        body.truncate(BODY_CAP);
        Some(Probe {
            service: String::new(),
            status,
            title: extract_title(&body),
            headers,
            body,
            server,
            icon_hash: String::new(),
        })
    }

    async fn icon_hash(&self, base: &str) -> Option<String> {
        let resp = self.http.get(format!("{base}/favicon.ico")).send().await.ok()?;
        if !resp.status().is_success() {
            return None;
        }
        let bytes = resp.bytes().await.ok()?;
        if bytes.is_empty() {
            return None;
        }
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        Some(format!("{:x}", hasher.finalize()))
    }
}

static TITLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("title regex"));

pub(crate) fn extract_title(body: &str) -> String {
    TITLE_RE
        .captures(body)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default()
}

/// Applies the builtin rules plus the custom ones; returns deduplicated
/// app names.
pub(crate) fn match_apps(probe: &Probe, custom: &[FingerprintRule]) -> Vec<String> {
    let mut apps = Vec::new();
    for rule in BUILTIN_RULES.iter().chain(custom.iter()) {
        if rule_matches(rule, probe) && !apps.contains(&rule.name) {
            apps.push(rule.name.clone());
        }
    }
    apps
}

fn rule_matches(rule: &FingerprintRule, probe: &Probe) -> bool {
    // header table: every entry must be present
    if !rule.headers.is_empty() {
        let haystack = probe.headers.to_lowercase();
        let all = rule.headers.iter().all(|(name, needle)| {
            let name = name.to_lowercase();
            haystack.lines().any(|line| {
                line.starts_with(&format!("{name}:"))
                    && line.contains(&needle.to_lowercase())
            })
        });
        if all {
            return true;
        }
    }
    // html regexes: any match wins
    for pattern in &rule.html {
        if let Ok(re) = Regex::new(&format!("(?i){pattern}")) {
            if re.is_match(&probe.body) {
                return true;
            }
        }
    }
    // expression rule
    if !rule.rule.is_empty() && eval_rule(&rule.rule, probe) {
        return true;
    }
    false
}

/// Evaluates `term && term || term ...` where a term is
/// `field="needle"` with field in body/title/header/server/status.
/// `||` binds looser than `&&`.
pub(crate) fn eval_rule(rule: &str, probe: &Probe) -> bool {
    rule.split("||").any(|clause| {
        let mut any_term = false;
        let all = clause.split("&&").all(|term| {
            match parse_term(term) {
                Some((field, needle)) => {
                    any_term = true;
                    let needle = needle.to_lowercase();
                    match field {
                        "body" => probe.body.to_lowercase().contains(&needle),
                        "title" => probe.title.to_lowercase().contains(&needle),
                        "header" => probe.headers.to_lowercase().contains(&needle),
                        "server" => probe.server.to_lowercase().contains(&needle),
                        "status" => probe.status.to_string() == needle,
                        _ => false,
                    }
                }
                None => false,
            }
        });
        any_term && all
    })
}

fn parse_term(term: &str) -> Option<(&str, &str)> {
    let (field, value) = term.trim().split_once('=')?;
    let value = value.trim().strip_prefix('"')?.strip_suffix('"')?;
    Some((field.trim(), value))
}

static BUILTIN_RULES: Lazy<Vec<FingerprintRule>> = Lazy::new(|| {
    let rule = |name: &str, rule: &str| FingerprintRule {
        id: String::new(),
        name: name.to_string(),
        rule: rule.to_string(),
        source: "builtin".to_string(),
        is_builtin: true,
        enabled: true,
        ..Default::default()
    };
    vec![
        rule("nginx", r#"server="nginx""#),
        rule("Apache", r#"server="apache""#),
        rule("IIS", r#"server="microsoft-iis""#),
        rule("Tomcat", r#"title="apache tomcat" || server="apache-coyote""#),
        rule("WordPress", r#"body="wp-content" || body="wp-includes""#),
        rule("Jenkins", r#"header="x-jenkins" || title="dashboard [jenkins]""#),
        rule("Grafana", r#"body="grafana" && title="grafana""#),
        rule("Kibana", r#"title="kibana""#),
        rule("phpMyAdmin", r#"body="phpmyadmin" || title="phpmyadmin""#),
        rule("GitLab", r#"title="gitlab" || header="x-gitlab-meta""#),
        rule("WebLogic", r#"body="weblogic" || title="oracle weblogic""#),
        rule("Confluence", r#"body="com.atlassian.confluence""#),
        rule("Jira", r#"body="jira.webresources""#),
        rule("Nacos", r#"title="nacos""#),
        rule("MinIO", r#"header="x-amz-request-id" && body="minio""#),
        rule("Zabbix", r#"title="zabbix""#),
        rule("Spring", r#"body="whitelabel error page""#),
        rule("ThinkPHP", r#"body="thinkphp" || header="x-powered-by: thinkphp""#),
    ]
});

#[cfg(test)]
mod tests {
    use super::*;

    fn probe(body: &str, title: &str, server: &str, headers: &str) -> Probe {
        Probe {
            service: "http".into(),
            status: 200,
            title: title.into(),
            headers: headers.into(),
            body: body.into(),
            server: server.into(),
            icon_hash: String::new(),
        }
    }

    #[test]
    fn title_extraction_is_case_insensitive_and_trimmed() {
        assert_eq!(
            extract_title("<html><TITLE> Hello World </TITLE></html>"),
            "Hello World"
        );
        assert_eq!(extract_title("<html>no title</html>"), "");
    }

    #[test]
    fn builtin_rules_identify_common_stacks() {
        let p = probe("<div>wp-content/themes</div>", "Blog", "nginx/1.18.0", "server: nginx/1.18.0");
        let apps = match_apps(&p, &[]);
        assert!(apps.contains(&"nginx".to_string()));
        assert!(apps.contains(&"WordPress".to_string()));
    }

    #[test]
    fn expression_rules_respect_and_or() {
        let p = probe("grafana loves you", "Grafana", "", "");
        assert!(eval_rule(r#"body="grafana" && title="grafana""#, &p));
        assert!(!eval_rule(r#"body="grafana" && title="kibana""#, &p));
        assert!(eval_rule(r#"title="kibana" || body="grafana""#, &p));
        assert!(!eval_rule("", &p));
        assert!(!eval_rule("garbage", &p));
    }

    #[test]
    fn custom_rules_extend_the_builtin_set() {
        let custom = FingerprintRule {
            name: "MyApp".into(),
            rule: r#"body="my-app-marker""#.into(),
            enabled: true,
            ..Default::default()
        };
        let p = probe("hello my-app-marker", "", "", "");
        let apps = match_apps(&p, &[custom]);
        assert_eq!(apps, vec!["MyApp"]);
    }

    #[test]
    fn header_table_rules_need_every_entry() {
        let mut rule = FingerprintRule {
            name: "Jenkins".into(),
            enabled: true,
            ..Default::default()
        };
        rule.headers.insert("X-Jenkins".into(), "2.".into());
        let p = probe("", "", "", "x-jenkins: 2.401.1\ncontent-type: text/html");
        assert!(rule_matches(&rule, &p));
        let p = probe("", "", "", "content-type: text/html");
        assert!(!rule_matches(&rule, &p));
    }
}
