// SPDX-FileCopyrightText: 2025 ScanOrch Authors
//
// SPDX-License-Identifier: GPL-2.0-or-later

use std::sync::Mutex;

use models::Vulnerability;
use tokio::sync::mpsc;

/// Findings are batched before upload.
pub const FLUSH_SIZE: usize = 10;
/// A background ticker flushes at this cadence regardless of fill level.
pub const FLUSH_INTERVAL_SECS: u64 = 5;

/// Bounded in-memory buffer for findings.
///
/// Adding past the bound signals the flush channel; the channel has
/// capacity one and the send never blocks, so a burst of findings while a
/// flush is already pending costs nothing.
pub struct VulBuffer {
    vuls: Mutex<Vec<Vulnerability>>,
    max_size: usize,
    flush_tx: mpsc::Sender<()>,
}

impl VulBuffer {
    pub fn new(max_size: usize) -> (Self, mpsc::Receiver<()>) {
        let (flush_tx, flush_rx) = mpsc::channel(1);
        (
            Self {
                vuls: Mutex::new(Vec::with_capacity(max_size)),
                max_size,
                flush_tx,
            },
            flush_rx,
        )
    }

    /// Appends a finding; never blocks.
    pub fn add(&self, vul: Vulnerability) {
        let should_flush = {
            let mut vuls = self.vuls.lock().unwrap();
            vuls.push(vul);
            vuls.len() >= self.max_size
        };
        if should_flush {
            // already signalled is fine, the pending flush picks it up
            let _ = self.flush_tx.try_send(());
        }
    }

    /// Swaps the buffer for an empty one and returns the old content.
    pub fn drain(&self) -> Vec<Vulnerability> {
        std::mem::take(&mut *self.vuls.lock().unwrap())
    }

    pub fn len(&self) -> usize {
        self.vuls.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vul(n: usize) -> Vulnerability {
        Vulnerability {
            host: format!("h{n}"),
            port: 80,
            poc_file: "p".into(),
            url: format!("http://h{n}/"),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn signals_once_the_bound_is_reached() {
        let (buffer, mut rx) = VulBuffer::new(3);
        buffer.add(vul(1));
        buffer.add(vul(2));
        assert!(rx.try_recv().is_err());
        buffer.add(vul(3));
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn add_does_not_block_when_already_signalled() {
        let (buffer, mut rx) = VulBuffer::new(1);
        // every add over the bound tries to signal; the channel holds one
        for n in 0..25 {
            buffer.add(vul(n));
        }
        assert_eq!(buffer.len(), 25);
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn drain_swaps_atomically() {
        let (buffer, _rx) = VulBuffer::new(10);
        buffer.add(vul(1));
        buffer.add(vul(2));
        let drained = buffer.drain();
        assert_eq!(drained.len(), 2);
        assert!(buffer.is_empty());
        assert!(buffer.drain().is_empty());
    }
}
