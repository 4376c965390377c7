// SPDX-FileCopyrightText: 2025 ScanOrch Authors
//
// SPDX-License-Identifier: GPL-2.0-or-later

use std::fmt::Display;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Debug => write!(f, "DEBUG"),
            Self::Info => write!(f, "INFO"),
            Self::Warn => write!(f, "WARN"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

/// One line of the worker or per task log stream.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    /// `YYYY-MM-DD HH:MM:SS`
    pub timestamp: String,
    pub level: LogLevel,
    pub worker_name: String,
    #[serde(default)]
    pub task_id: String,
    pub message: String,
}

impl LogRecord {
    pub fn new(worker_name: &str, level: LogLevel, message: String) -> Self {
        Self {
            timestamp: crate::now_string(),
            level,
            worker_name: worker_name.to_string(),
            task_id: String::new(),
            message,
        }
    }

    pub fn for_task(worker_name: &str, task_id: &str, level: LogLevel, message: String) -> Self {
        Self {
            task_id: task_id.to_string(),
            ..Self::new(worker_name, level, message)
        }
    }
}
