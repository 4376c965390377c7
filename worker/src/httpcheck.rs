// SPDX-FileCopyrightText: 2025 ScanOrch Authors
//
// SPDX-License-Identifier: GPL-2.0-or-later

//! Service-name to is-HTTP classification.
//!
//! The table is sourced from the catalog at startup and refreshed before
//! every fingerprint phase; only HTTP assets enter the POC phase.

use std::collections::HashMap;
use std::sync::RwLock;

use models::HttpServiceMapping;

#[derive(Debug, Default)]
pub struct HttpServiceTable {
    mappings: RwLock<HashMap<String, bool>>,
}

impl HttpServiceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the table with catalog rows.
    pub fn load(&self, mappings: &[HttpServiceMapping]) {
        let mut table = self.mappings.write().unwrap();
        table.clear();
        for mapping in mappings {
            table.insert(mapping.service_name.to_lowercase(), mapping.is_http);
        }
    }

    pub fn len(&self) -> usize {
        self.mappings.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Looks up a service name; `found` is false when the catalog has no
    /// row for it.
    pub fn lookup(&self, service_name: &str) -> (bool, bool) {
        match self
            .mappings
            .read()
            .unwrap()
            .get(&service_name.to_lowercase())
        {
            Some(is_http) => (*is_http, true),
            None => (false, false),
        }
    }

    /// The classifier used by the pipeline: catalog first, well known
    /// ports as a fallback.
    pub fn is_http(&self, service_name: &str, port: u16) -> bool {
        if !service_name.is_empty() {
            let (is_http, found) = self.lookup(service_name);
            if found {
                return is_http;
            }
            // nmap spells TLS wrapped services as `ssl/http`
            let bare = service_name.rsplit('/').next().unwrap_or(service_name);
            let (is_http, found) = self.lookup(bare);
            if found {
                return is_http;
            }
            if bare.eq_ignore_ascii_case("http") || bare.eq_ignore_ascii_case("https") {
                return true;
            }
        }
        matches!(port, 80 | 443 | 8080 | 8443)
    }
}
