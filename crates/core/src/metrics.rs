// busbench - Bus Cycle Verification Harness
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::clock::{ClockDomain, ClockEdge};
use crate::harness::{TransactionResult, WaitTimeout};
use crate::signals::{SignalBus, SignalSchema};
use crate::vector::TestVector;
use crate::HarnessObserver;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

#[derive(Debug)]
pub struct RunMetrics {
    phase_edges: AtomicU64,
    oscillator_edges: AtomicU64,
    transactions: AtomicU64,
    mismatches: AtomicU64,
    wait_cycles: AtomicU64,
    timeouts: AtomicU64,
    start_time: Mutex<Instant>,
}

/// Plain copy of the counters for reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub phase_edges: u64,
    pub oscillator_edges: u64,
    pub transactions: u64,
    pub mismatches: u64,
    pub wait_cycles: u64,
    pub timeouts: u64,
}

impl Default for RunMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl RunMetrics {
    pub fn new() -> Self {
        Self {
            phase_edges: AtomicU64::new(0),
            oscillator_edges: AtomicU64::new(0),
            transactions: AtomicU64::new(0),
            mismatches: AtomicU64::new(0),
            wait_cycles: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
            start_time: Mutex::new(Instant::now()),
        }
    }

    pub fn reset(&self) {
        self.phase_edges.store(0, Ordering::SeqCst);
        self.oscillator_edges.store(0, Ordering::SeqCst);
        self.transactions.store(0, Ordering::SeqCst);
        self.mismatches.store(0, Ordering::SeqCst);
        self.wait_cycles.store(0, Ordering::SeqCst);
        self.timeouts.store(0, Ordering::SeqCst);
        if let Ok(mut start) = self.start_time.lock() {
            *start = Instant::now();
        }
    }

    pub fn get_phase_edges(&self) -> u64 {
        self.phase_edges.load(Ordering::SeqCst)
    }

    pub fn get_oscillator_edges(&self) -> u64 {
        self.oscillator_edges.load(Ordering::SeqCst)
    }

    pub fn get_steps(&self) -> u64 {
        self.get_phase_edges() + self.get_oscillator_edges()
    }

    pub fn get_transactions(&self) -> u64 {
        self.transactions.load(Ordering::SeqCst)
    }

    pub fn get_mismatches(&self) -> u64 {
        self.mismatches.load(Ordering::SeqCst)
    }

    pub fn get_wait_cycles(&self) -> u64 {
        self.wait_cycles.load(Ordering::SeqCst)
    }

    pub fn get_timeouts(&self) -> u64 {
        self.timeouts.load(Ordering::SeqCst)
    }

    /// Scheduler steps per wall-clock second since the last reset.
    pub fn get_steps_per_second(&self) -> f64 {
        let elapsed = self
            .start_time
            .lock()
            .map(|start| start.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        if elapsed > 0.0 {
            self.get_steps() as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            phase_edges: self.get_phase_edges(),
            oscillator_edges: self.get_oscillator_edges(),
            transactions: self.get_transactions(),
            mismatches: self.get_mismatches(),
            wait_cycles: self.get_wait_cycles(),
            timeouts: self.get_timeouts(),
        }
    }
}

impl HarnessObserver for RunMetrics {
    fn on_run_start(&self, _vector: &TestVector, _schema: &SignalSchema) {
        self.reset();
    }

    fn on_clock_edge(&self, edge: &ClockEdge, _signals: &dyn SignalBus) {
        match edge.domain {
            ClockDomain::Phase => self.phase_edges.fetch_add(1, Ordering::SeqCst),
            ClockDomain::Oscillator => self.oscillator_edges.fetch_add(1, Ordering::SeqCst),
        };
    }

    fn on_transaction(&self, result: &TransactionResult) {
        self.transactions.fetch_add(1, Ordering::SeqCst);
        self.wait_cycles
            .fetch_add(u64::from(result.wait_cycles), Ordering::SeqCst);
        if !result.passed {
            self.mismatches.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn on_timeout(&self, _timeout: &WaitTimeout) {
        self.timeouts.fetch_add(1, Ordering::SeqCst);
    }
}
