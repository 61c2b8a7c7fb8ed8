// busbench - Bus Cycle Verification Harness
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Write-side accounting shared between a [`CappedWriter`] and whoever
/// reports on it after the writer has been buried inside a VCD encoder.
#[derive(Debug, Default)]
pub struct CapUsage {
    written: AtomicU64,
    dropped: AtomicBool,
}

impl CapUsage {
    pub fn written(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }

    /// True once any byte was discarded because of the cap.
    pub fn truncated(&self) -> bool {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Passes bytes through until `cap` is reached, then reports every later
/// write as successful without forwarding it, so a long run never fails
/// half-way through a waveform dump.
pub struct CappedWriter<W: Write> {
    inner: W,
    cap: u64,
    usage: Arc<CapUsage>,
}

impl<W: Write> CappedWriter<W> {
    pub fn new(inner: W, cap: u64) -> Self {
        Self {
            inner,
            cap,
            usage: Arc::new(CapUsage::default()),
        }
    }

    pub fn usage(&self) -> Arc<CapUsage> {
        Arc::clone(&self.usage)
    }
}

impl<W: Write> Write for CappedWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let room = self.cap.saturating_sub(self.usage.written());
        let take = usize::try_from(room).map_or(buf.len(), |room| room.min(buf.len()));
        if take < buf.len() {
            self.usage.dropped.store(true, Ordering::Relaxed);
        }
        if take == 0 {
            return Ok(buf.len());
        }

        let n = self.inner.write(&buf[..take])?;
        self.usage.written.fetch_add(n as u64, Ordering::Relaxed);
        // A short inner write is retried by write_all; only claim the tail
        // when it was cut off by the cap.
        Ok(if n == take && take < buf.len() { buf.len() } else { n })
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
