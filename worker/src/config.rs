// SPDX-FileCopyrightText: 2025 ScanOrch Authors
//
// SPDX-License-Identifier: GPL-2.0-or-later

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerConfig {
    pub name: String,
    pub server_addr: String,
    pub redis_addr: String,
    pub redis_pass: String,
    pub concurrency: usize,
    /// Per task timeout in seconds.
    pub timeout: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            name: default_worker_name(),
            server_addr: "http://127.0.0.1:9000".to_string(),
            redis_addr: "127.0.0.1:6379".to_string(),
            redis_pass: String::new(),
            concurrency: 5,
            timeout: 3600,
        }
    }
}

impl WorkerConfig {
    /// Builds a redis url from the addr/password pair of the CLI flags.
    pub fn redis_url(&self) -> Option<String> {
        if self.redis_addr.is_empty() {
            return None;
        }
        if self.redis_pass.is_empty() {
            Some(format!("redis://{}", self.redis_addr))
        } else {
            Some(format!("redis://:{}@{}", self.redis_pass, self.redis_addr))
        }
    }
}

/// `<hostname>-<pid>`, the default worker identity.
pub fn default_worker_name() -> String {
    let host = sysinfo::System::host_name().unwrap_or_else(|| "worker".to_string());
    format!("{}-{}", host, std::process::id())
}
