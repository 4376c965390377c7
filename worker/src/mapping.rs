// SPDX-FileCopyrightText: 2025 ScanOrch Authors
//
// SPDX-License-Identifier: GPL-2.0-or-later

//! Builtin Wappalyzer-style app name to nuclei tag mapping, used when a
//! task runs in `automaticScan` mode. Catalog driven mappings
//! (`autoScan`) take a different path and do not consult this table.

use std::collections::HashMap;

use once_cell::sync::Lazy;

pub static WAPPALYZER_NUCLEI_MAPPING: Lazy<HashMap<&'static str, &'static [&'static str]>> =
    Lazy::new(|| {
        let entries: &[(&str, &[&str])] = &[
            ("nginx", &["nginx"]),
            ("apache", &["apache"]),
            ("apache http server", &["apache"]),
            ("apache tomcat", &["tomcat", "apache"]),
            ("tomcat", &["tomcat"]),
            ("iis", &["iis", "microsoft"]),
            ("microsoft iis", &["iis", "microsoft"]),
            ("wordpress", &["wordpress", "wp-plugin"]),
            ("drupal", &["drupal"]),
            ("joomla", &["joomla"]),
            ("jenkins", &["jenkins"]),
            ("gitlab", &["gitlab"]),
            ("grafana", &["grafana"]),
            ("kibana", &["kibana"]),
            ("elasticsearch", &["elasticsearch", "elastic"]),
            ("jboss", &["jboss"]),
            ("weblogic", &["weblogic", "oracle"]),
            ("oracle weblogic server", &["weblogic", "oracle"]),
            ("websphere", &["websphere", "ibm"]),
            ("spring", &["spring", "springboot"]),
            ("spring boot", &["springboot", "spring"]),
            ("thinkphp", &["thinkphp"]),
            ("laravel", &["laravel", "php"]),
            ("django", &["django"]),
            ("flask", &["flask"]),
            ("express", &["express", "nodejs"]),
            ("node.js", &["nodejs"]),
            ("php", &["php"]),
            ("phpmyadmin", &["phpmyadmin"]),
            ("mysql", &["mysql"]),
            ("postgresql", &["postgres"]),
            ("redis", &["redis"]),
            ("mongodb", &["mongodb", "mongo"]),
            ("docker", &["docker"]),
            ("kubernetes", &["kubernetes", "k8s"]),
            ("confluence", &["confluence", "atlassian"]),
            ("jira", &["jira", "atlassian"]),
            ("solr", &["solr", "apache"]),
            ("zabbix", &["zabbix"]),
            ("nacos", &["nacos"]),
            ("minio", &["minio"]),
            ("shiro", &["shiro"]),
            ("fastjson", &["fastjson"]),
            ("struts", &["struts", "apache"]),
            ("vmware", &["vmware"]),
            ("citrix", &["citrix"]),
            ("f5 bigip", &["bigip", "f5"]),
            ("openssh", &["ssh"]),
            ("vsftpd", &["ftp", "vsftpd"]),
        ];
        entries.iter().copied().collect()
    });

/// Strips a `[source]` suffix and a `:version` suffix from an app entry,
/// e.g. `nginx:1.18.0[favicon]` becomes `nginx`.
pub fn parse_app_name(app: &str) -> &str {
    let mut name = app;
    if let Some(idx) = name.find('[') {
        if idx > 0 {
            name = &name[..idx];
        }
    }
    if let Some(idx) = name.find(':') {
        if idx > 0 {
            name = &name[..idx];
        }
    }
    name.trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_version_and_source_suffixes() {
        assert_eq!(parse_app_name("nginx:1.18.0"), "nginx");
        assert_eq!(parse_app_name("WordPress[body]"), "WordPress");
        assert_eq!(parse_app_name("Tomcat:9.0[header]"), "Tomcat");
        assert_eq!(parse_app_name("plain"), "plain");
    }

    #[test]
    fn known_apps_resolve_to_tags() {
        assert_eq!(WAPPALYZER_NUCLEI_MAPPING["wordpress"], &["wordpress", "wp-plugin"]);
        assert!(WAPPALYZER_NUCLEI_MAPPING.get("unknown-app").is_none());
    }
}
