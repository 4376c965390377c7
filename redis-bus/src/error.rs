// SPDX-FileCopyrightText: 2025 ScanOrch Authors
//
// SPDX-License-Identifier: GPL-2.0-or-later

use std::fmt::Display;

#[derive(Debug)]
pub enum BusError {
    /// The bus is unreachable or the connection dropped.
    Connection(String),
    /// A stored record could not be encoded or decoded.
    Serialization(String),
    Unexpected(String),
}

impl Display for BusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connection(e) => write!(f, "bus connection error: {e}"),
            Self::Serialization(e) => write!(f, "bus serialization error: {e}"),
            Self::Unexpected(e) => write!(f, "unexpected bus error: {e}"),
        }
    }
}

impl std::error::Error for BusError {}

impl From<redis::RedisError> for BusError {
    fn from(value: redis::RedisError) -> Self {
        if value.is_connection_refusal() || value.is_connection_dropped() || value.is_timeout() {
            Self::Connection(value.to_string())
        } else {
            Self::Unexpected(value.to_string())
        }
    }
}

impl From<serde_json::Error> for BusError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization(value.to_string())
    }
}
