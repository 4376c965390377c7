// SPDX-FileCopyrightText: 2025 ScanOrch Authors
//
// SPDX-License-Identifier: GPL-2.0-or-later

mod entry;

pub use entry::entrypoint;

use crate::{response, scheduling::TaskControl};

/// Context builder is used to build the context of the application.
#[derive(Debug, Default)]
pub struct ContextBuilder<DB, B> {
    storage: DB,
    bus: B,
    api_key: Option<String>,
    response: response::Response,
}

impl<DB, B> ContextBuilder<DB, B> {
    pub fn new(storage: DB, bus: B) -> Self {
        Self {
            storage,
            bus,
            api_key: None,
            response: response::Response::default(),
        }
    }

    /// Sets the api key. Requests must carry it as `x-api-key`.
    pub fn api_key(mut self, api_key: impl Into<Option<String>>) -> Self {
        self.api_key = api_key.into();
        if self.api_key.is_some() {
            self.response.add_authentication("x-api-key");
        }
        self
    }

    pub fn build(self) -> Context<DB, B> {
        Context {
            tasks: TaskControl::new(self.storage, self.bus),
            response: self.response,
            api_key: self.api_key,
        }
    }
}

/// The context of the application.
#[derive(Debug)]
pub struct Context<DB, B> {
    /// All task and storage operations must go through the control; it
    /// owns the transition table.
    pub tasks: TaskControl<DB, B>,
    /// Creates responses.
    pub response: response::Response,
    /// When none, no authentication is required.
    pub api_key: Option<String>,
}
