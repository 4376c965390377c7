// SPDX-FileCopyrightText: 2025 ScanOrch Authors
//
// SPDX-License-Identifier: GPL-2.0-or-later

use std::fmt::Display;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Address family of a scanned host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    #[default]
    Ipv4,
    Ipv6,
    Domain,
}

impl Category {
    /// Classifies a host string. Anything that is not a literal IP address
    /// counts as a domain.
    pub fn of(host: &str) -> Self {
        match host.parse::<IpAddr>() {
            Ok(IpAddr::V4(_)) => Self::Ipv4,
            Ok(IpAddr::V6(_)) => Self::Ipv6,
            Err(_) => Self::Domain,
        }
    }
}

impl Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ipv4 => write!(f, "ipv4"),
            Self::Ipv6 => write!(f, "ipv6"),
            Self::Domain => write!(f, "domain"),
        }
    }
}

/// A discovered service on a host, the unit the aggregation sink stores.
///
/// The upsert key within a workspace is `(authority, task_id)`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub authority: String,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub category: Category,
    #[serde(default)]
    pub service: String,
    #[serde(default)]
    pub server: String,
    #[serde(default)]
    pub banner: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub app: Vec<String>,
    #[serde(default)]
    pub http_status: String,
    #[serde(default)]
    pub http_header: String,
    #[serde(default)]
    pub http_body: String,
    #[serde(default)]
    pub cert: String,
    #[serde(default)]
    pub icon_hash: String,
    #[serde(default)]
    pub screenshot: String,
    #[serde(default)]
    pub is_http: bool,
    #[serde(default)]
    pub task_id: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub is_new: bool,
    #[serde(default)]
    pub is_updated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_time: Option<DateTime<Utc>>,
}

impl Asset {
    /// Creates a bare asset for an open port; everything else is filled in
    /// by later phases.
    pub fn open_port(host: &str, port: u16) -> Self {
        Self {
            authority: format!("{host}:{port}"),
            host: host.to_string(),
            port,
            category: Category::of(host),
            ..Default::default()
        }
    }

    /// `host:port`, the stable identity of this asset.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_classification() {
        assert_eq!(Category::of("10.0.0.1"), Category::Ipv4);
        assert_eq!(Category::of("::1"), Category::Ipv6);
        assert_eq!(Category::of("example.com"), Category::Domain);
    }

    #[test]
    fn authority_is_host_port() {
        let a = Asset::open_port("10.0.0.1", 8080);
        assert_eq!(a.authority, "10.0.0.1:8080");
        assert_eq!(a.authority, a.authority());
        assert_eq!(a.category, Category::Ipv4);
    }

    #[test]
    fn serializes_camel_case() {
        let a = Asset {
            is_http: true,
            http_status: "200".into(),
            ..Asset::open_port("h", 80)
        };
        let v = serde_json::to_value(&a).unwrap();
        assert_eq!(v["isHttp"], true);
        assert_eq!(v["httpStatus"], "200");
        assert!(v.get("createTime").is_none());
    }
}
