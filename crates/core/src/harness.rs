// busbench - Bus Cycle Verification Harness
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::clock::{ClockDomain, ClockScheduler};
use crate::config::HarnessConfig;
use crate::device::{DeviceModel, SpiBridge};
use crate::peripherals::spi_flash::SpiFlash;
use crate::sequencer::{Advance, BusSequencer, Completion, Edge, Outcome};
use crate::vector::{TestVector, Transaction, TransactionKind};
use crate::{HarnessError, HarnessObserver, HarnessResult};
use serde::Serialize;
use std::sync::Arc;

/// Verdict for one completed transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionResult {
    pub index: usize,
    pub label: String,
    pub kind: TransactionKind,
    pub address: u32,
    /// Byte a read expected or a write drove.
    pub expected: Option<u8>,
    /// Byte sampled at T3 of a read, `None` if the bus was not driven.
    pub observed: Option<u8>,
    pub passed: bool,
    pub bus_cycles: u32,
    pub wait_cycles: u32,
    /// Scheduler step on which T3 ended.
    pub step: u64,
}

impl TransactionResult {
    fn new(index: usize, txn: &Transaction, completion: &Completion, step: u64) -> Self {
        let (expected, observed, passed) = match completion.outcome {
            Outcome::Read { observed } => {
                (Some(txn.byte()), observed, observed == Some(txn.byte()))
            }
            Outcome::Write => (Some(txn.byte()), None, true),
            Outcome::Idle => (None, None, true),
        };
        Self {
            index,
            label: txn.label.clone(),
            kind: txn.kind,
            address: txn.address,
            expected,
            observed,
            passed,
            bus_cycles: completion.bus_cycles,
            wait_cycles: completion.wait_cycles,
            step,
        }
    }

    /// Human readable mismatch, `None` for passing transactions.
    pub fn failure_message(&self) -> Option<String> {
        if self.passed {
            return None;
        }
        let expected = self.expected.unwrap_or_default();
        Some(match self.observed {
            Some(observed) => format!("expected {:02x}, observed {:02x}", expected, observed),
            None => format!("expected {:02x}, data bus not driven", expected),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WaitTimeout {
    pub index: usize,
    pub label: String,
    pub address: u32,
    pub waited: u32,
    pub ceiling: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum StopReason {
    /// Every transaction in the vector ran.
    Completed,
    /// The wait line held the bus past the ceiling.
    WaitTimeout(WaitTimeout),
    /// The scheduler hit its step budget with transactions still pending.
    StepLimit { steps: u64, index: usize },
    Aborted { message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub name: String,
    pub results: Vec<TransactionResult>,
    pub stop: StopReason,
    pub steps: u64,
    pub elapsed_ns: f64,
    pub phase_cycles: u64,
}

impl RunReport {
    /// True when the run completed and every read matched.
    pub fn passed(&self) -> bool {
        self.stop == StopReason::Completed && self.results.iter().all(|r| r.passed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &TransactionResult> {
        self.results.iter().filter(|r| !r.passed)
    }
}

/// Drives one test vector through the device model.
///
/// Each step toggles one clock, lets the device settle, runs the bus
/// sequencer on phase clock edges and then lets the flash react. The flash
/// sees every step of both clock domains.
pub struct Harness<D: DeviceModel> {
    device: D,
    clock: ClockScheduler,
    sequencer: BusSequencer,
    flash: SpiFlash,
    vector: Arc<TestVector>,
    cursor: usize,
    phase_cycles: u64,
    max_steps: u64,
    observers: Vec<Arc<dyn HarnessObserver>>,
}

impl Harness<SpiBridge> {
    /// Harness around the reference SPI bridge device.
    pub fn with_bridge(config: &HarnessConfig, vector: Arc<TestVector>) -> Self {
        let device = SpiBridge::new(config.schema.clone(), config.bridge.clone());
        Self::new(device, config, vector)
    }
}

impl<D: DeviceModel> Harness<D> {
    pub fn new(device: D, config: &HarnessConfig, vector: Arc<TestVector>) -> Self {
        Self {
            device,
            clock: ClockScheduler::new(config.clocks),
            sequencer: BusSequencer::new(config.sequencer),
            flash: SpiFlash::new(config.flash),
            vector,
            cursor: 0,
            phase_cycles: 0,
            max_steps: config.max_steps,
            observers: Vec::new(),
        }
    }

    pub fn add_observer(&mut self, observer: Arc<dyn HarnessObserver>) {
        self.observers.push(observer);
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn flash(&self) -> &SpiFlash {
        &self.flash
    }

    pub fn sequencer(&self) -> &BusSequencer {
        &self.sequencer
    }

    pub fn clock(&self) -> &ClockScheduler {
        &self.clock
    }

    pub fn vector(&self) -> &TestVector {
        &self.vector
    }

    /// Index of the transaction currently on the bus.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn is_finished(&self) -> bool {
        self.cursor >= self.vector.len()
    }

    /// One scheduler step. Returns the transaction that completed on it.
    pub fn step(&mut self) -> HarnessResult<Option<TransactionResult>> {
        let edge = self.clock.step(&mut self.device);
        let mut completed = None;

        if edge.domain == ClockDomain::Phase {
            let bus_edge = Edge::from(edge.level);
            if bus_edge == Edge::Falling {
                self.phase_cycles += 1;
            }
            if let Some(txn) = self.vector.get(self.cursor) {
                let advance = self
                    .sequencer
                    .advance(bus_edge, self.cursor, txn, &mut self.device)?;
                if let Advance::Completed(completion) = advance {
                    let result = TransactionResult::new(self.cursor, txn, &completion, edge.step);
                    log_result(&result);
                    self.cursor += 1;
                    completed = Some(result);
                }
            }
        }

        self.flash.observe(&mut self.device);

        for observer in &self.observers {
            observer.on_clock_edge(&edge, &self.device);
        }

        Ok(completed)
    }

    /// Run until the vector is exhausted, the wait ceiling trips or the
    /// step budget runs out.
    pub fn run(&mut self) -> RunReport {
        for observer in &self.observers {
            observer.on_run_start(&self.vector, self.device.schema());
        }
        tracing::info!(
            "Running '{}' ({} transactions)",
            self.vector.name(),
            self.vector.len()
        );

        let mut results = Vec::with_capacity(self.vector.len());
        let stop = loop {
            if self.is_finished() {
                break StopReason::Completed;
            }
            if self.clock.steps() >= self.max_steps {
                tracing::warn!(
                    "Step limit of {} reached at transaction #{}",
                    self.max_steps,
                    self.cursor
                );
                break StopReason::StepLimit {
                    steps: self.clock.steps(),
                    index: self.cursor,
                };
            }

            match self.step() {
                Ok(Some(result)) => {
                    for observer in &self.observers {
                        observer.on_transaction(&result);
                    }
                    results.push(result);
                }
                Ok(None) => {}
                Err(HarnessError::WaitTimeout {
                    index,
                    label,
                    address,
                    waited,
                    ceiling,
                }) => {
                    let timeout = WaitTimeout {
                        index,
                        label,
                        address,
                        waited,
                        ceiling,
                    };
                    tracing::warn!(
                        "Timeout in '{}' at {:04x}: wait held for {} cycles",
                        timeout.label,
                        timeout.address,
                        timeout.waited
                    );
                    for observer in &self.observers {
                        observer.on_timeout(&timeout);
                    }
                    break StopReason::WaitTimeout(timeout);
                }
                Err(e) => {
                    tracing::error!("Run aborted: {}", e);
                    break StopReason::Aborted {
                        message: e.to_string(),
                    };
                }
            }
        };

        let report = RunReport {
            name: self.vector.name().to_string(),
            results,
            stop,
            steps: self.clock.steps(),
            elapsed_ns: self.clock.now_ns(),
            phase_cycles: self.phase_cycles,
        };
        tracing::info!(
            "Run '{}' finished after {} steps: {:?}, {} failure(s)",
            report.name,
            report.steps,
            report.stop,
            report.failures().count()
        );
        for observer in &self.observers {
            observer.on_run_end(&report);
        }
        report
    }
}

fn log_result(result: &TransactionResult) {
    match result.kind {
        TransactionKind::Read => match result.observed {
            Some(observed) => tracing::info!("IO read: {:04x} = {:02x}", result.address, observed),
            None => tracing::info!("IO read: {:04x} = (undriven)", result.address),
        },
        TransactionKind::Write => tracing::info!(
            "IO write: {:04x} = {:02x}",
            result.address,
            result.expected.unwrap_or_default()
        ),
        TransactionKind::IdleCycles => {
            tracing::debug!("idle: {} bus cycles", result.bus_cycles)
        }
    }
    if let Some(message) = result.failure_message() {
        tracing::warn!("Assertion failed in '{}': {}", result.label, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::IoMode;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl HarnessObserver for Recorder {
        fn on_run_start(&self, vector: &TestVector, _schema: &crate::SignalSchema) {
            self.events.lock().unwrap().push(format!("start {}", vector.name()));
        }
        fn on_transaction(&self, result: &TransactionResult) {
            self.events
                .lock()
                .unwrap()
                .push(format!("txn {} {}", result.index, result.passed));
        }
        fn on_timeout(&self, timeout: &WaitTimeout) {
            self.events.lock().unwrap().push(format!("timeout {}", timeout.index));
        }
        fn on_run_end(&self, _report: &RunReport) {
            self.events.lock().unwrap().push("end".to_string());
        }
    }

    fn vector(transactions: Vec<Transaction>) -> Arc<TestVector> {
        Arc::new(TestVector::new("unit", transactions, 16).unwrap())
    }

    #[test]
    fn test_ctrl_roundtrip_passes() {
        let config = HarnessConfig::default();
        let v = vector(vec![
            Transaction::write(0x100, 0x01, "select"),
            Transaction::read(0x100, 0x01, "readback"),
        ]);
        let mut harness = Harness::with_bridge(&config, v);
        let report = harness.run();
        assert!(report.passed(), "{:?}", report);
        assert_eq!(report.results.len(), 2);
        assert_eq!(report.results[1].observed, Some(0x01));
        assert!(harness.flash().state() != crate::peripherals::spi_flash::ShiftState::Idle);
    }

    #[test]
    fn test_mismatch_is_recorded_and_run_continues() {
        let config = HarnessConfig::default();
        let v = vector(vec![
            Transaction::read(0x100, 0x42, "wrong"),
            Transaction::write(0x100, 0x00, "after"),
        ]);
        let recorder = Arc::new(Recorder::default());
        let mut harness = Harness::with_bridge(&config, v);
        harness.add_observer(recorder.clone());
        let report = harness.run();

        assert_eq!(report.stop, StopReason::Completed);
        assert!(!report.passed());
        let failures: Vec<_> = report.failures().collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(
            failures[0].failure_message().as_deref(),
            Some("expected 42, observed 00")
        );
        assert_eq!(
            *recorder.events.lock().unwrap(),
            vec!["start unit", "txn 0 false", "txn 1 true", "end"]
        );
    }

    #[test]
    fn test_io_wait_states_past_ceiling_time_out() {
        let mut config = HarnessConfig::default();
        config.bridge.io_wait_states = 40;
        let v = vector(vec![
            Transaction::write(0x100, 0x01, "slow ctrl"),
            Transaction::read(0x100, 0x01, "never reached"),
        ]);
        let recorder = Arc::new(Recorder::default());
        let mut harness = Harness::with_bridge(&config, v);
        harness.add_observer(recorder.clone());
        let report = harness.run();

        match &report.stop {
            StopReason::WaitTimeout(t) => {
                assert_eq!(t.index, 0);
                assert_eq!(t.label, "slow ctrl");
                assert_eq!(t.address, 0x100);
                assert_eq!(t.ceiling, 20);
            }
            other => panic!("unexpected stop {:?}", other),
        }
        assert!(report.results.is_empty());
        assert!(recorder.events.lock().unwrap().contains(&"timeout 0".to_string()));
    }

    #[test]
    fn test_step_limit() {
        let config = HarnessConfig {
            max_steps: 10,
            ..Default::default()
        };
        let v = vector(vec![Transaction::idle(100, "long idle")]);
        let mut harness = Harness::with_bridge(&config, v);
        let report = harness.run();
        assert_eq!(report.stop, StopReason::StepLimit { steps: 10, index: 0 });
        assert_eq!(report.steps, 10);
    }

    #[test]
    fn test_phase_cycles_track_idle_length() {
        let config = HarnessConfig::default();
        let v = vector(vec![Transaction::idle(5, "idle")]);
        let mut harness = Harness::with_bridge(&config, v);
        let report = harness.run();
        assert!(report.passed());
        assert_eq!(report.results[0].bus_cycles, 20);
        assert_eq!(report.phase_cycles, 20);
    }

    #[test]
    fn test_builtin_read_id_single() {
        let config = HarnessConfig::default();
        let v = Arc::new(TestVector::read_id(&config.bridge, IoMode::Single));
        let mut harness = Harness::with_bridge(&config, v);
        let report = harness.run();
        assert!(report.passed(), "{:?}", report.failures().collect::<Vec<_>>());
        assert_eq!(harness.flash().command(), 0x90);
        assert_eq!(harness.flash().conflicts(), 0);
    }
}
