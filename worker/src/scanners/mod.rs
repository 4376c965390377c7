// SPDX-FileCopyrightText: 2025 ScanOrch Authors
//
// SPDX-License-Identifier: GPL-2.0-or-later

//! Scanner wrappers.
//!
//! Each wrapper owns exactly one single shot invocation of an external
//! tool (or, for the fingerprint probe, an in-process HTTP sweep); the
//! pipeline owns phase ordering, fallback and checkpointing.

mod fingerprint;
mod masscan;
mod naabu;
mod nmap;
mod nuclei;

pub use fingerprint::FingerprintScanner;
pub use masscan::MasscanScanner;
pub use naabu::NaabuScanner;
pub use nmap::NmapScanner;
pub use nuclei::NucleiScanner;

use std::sync::Arc;

use models::scanner::Scan;

/// The scanners a pipeline run dispatches to. Tests substitute
/// [`models::scanner::Lambda`] closures.
#[derive(Clone)]
pub struct Scanners {
    pub naabu: Arc<dyn Scan + Send + Sync>,
    pub masscan: Arc<dyn Scan + Send + Sync>,
    pub nmap: Arc<dyn Scan + Send + Sync>,
    pub fingerprint: Arc<dyn Scan + Send + Sync>,
    pub nuclei: Arc<dyn Scan + Send + Sync>,
}

impl Scanners {
    /// The production registry.
    pub fn new() -> Self {
        Self {
            naabu: Arc::new(NaabuScanner::new()),
            masscan: Arc::new(MasscanScanner::new()),
            nmap: Arc::new(NmapScanner::new()),
            fingerprint: Arc::new(FingerprintScanner::new()),
            nuclei: Arc::new(NucleiScanner::new()),
        }
    }
}

impl Default for Scanners {
    fn default() -> Self {
        Self::new()
    }
}

/// Splits a free form target into individual scan targets.
pub(crate) fn parse_targets(target: &str) -> Vec<String> {
    target
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn targets_split_on_commas() {
        assert_eq!(
            parse_targets("10.0.0.1, example.com ,,10.0.0.0/24"),
            vec!["10.0.0.1", "example.com", "10.0.0.0/24"]
        );
        assert!(parse_targets("").is_empty());
    }
}
