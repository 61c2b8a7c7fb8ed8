// busbench - Bus Cycle Verification Harness
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::signals::{DigitalLevel, Line, SignalBus};
use crate::vector::{Transaction, TransactionKind};
use crate::{HarnessError, HarnessResult};
use serde::{Deserialize, Serialize};

/// T-state of the current bus cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum BusCycle {
    #[default]
    T1,
    T2,
    Tw,
    T3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Rising,
    Falling,
}

impl From<DigitalLevel> for Edge {
    fn from(level: DigitalLevel) -> Self {
        match level {
            DigitalLevel::High => Edge::Rising,
            DigitalLevel::Low => Edge::Falling,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequencerConfig {
    /// TW cycles every transaction spends regardless of the wait line.
    pub min_wait_cycles: u32,
    /// TW cycles after which a stalled transaction aborts the run.
    pub max_wait_cycles: u32,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            min_wait_cycles: 1,
            max_wait_cycles: 20,
        }
    }
}

impl From<&busbench_config::BusSettings> for SequencerConfig {
    fn from(settings: &busbench_config::BusSettings) -> Self {
        Self {
            min_wait_cycles: settings.min_wait_cycles,
            max_wait_cycles: settings.max_wait_cycles,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Outcome {
    /// `observed` is `None` when the device left the data bus undriven.
    Read { observed: Option<u8> },
    Write,
    Idle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Completion {
    pub outcome: Outcome,
    /// Phase clock periods the transaction spanned.
    pub bus_cycles: u32,
    /// TW cycles in the final bus cycle.
    pub wait_cycles: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    InProgress,
    Completed(Completion),
}

/// Bus master state machine.
///
/// Consumes one phase clock edge at a time and drives the strobes for the
/// transaction it is given:
///
/// ```text
///        T1     T2     TW ... TW     T3
/// A   ==X=======================================
/// IORQ   \_______________________________/
/// RD     \_______________________________/      (read)
/// WR          \__________________________/      (write)
/// WAIT        ^ latch      ^ latch   (rising edges of T2 and TW)
/// ```
#[derive(Debug, Clone)]
pub struct BusSequencer {
    config: SequencerConfig,
    cycle: BusCycle,
    wait_latch: Option<bool>,
    waits: u32,
    bus_cycles: u32,
    idle_passes: u32,
}

impl BusSequencer {
    pub fn new(config: SequencerConfig) -> Self {
        Self {
            config: SequencerConfig {
                min_wait_cycles: config.min_wait_cycles.max(1),
                max_wait_cycles: config.max_wait_cycles,
            },
            cycle: BusCycle::T1,
            wait_latch: None,
            waits: 0,
            bus_cycles: 0,
            idle_passes: 0,
        }
    }

    pub fn config(&self) -> SequencerConfig {
        self.config
    }

    pub fn cycle(&self) -> BusCycle {
        self.cycle
    }

    /// TW cycles elapsed in the current bus cycle.
    pub fn waits(&self) -> u32 {
        self.waits
    }

    fn enter(&mut self, next: BusCycle) {
        tracing::debug!("bus: {:?} -> {:?}", self.cycle, next);
        self.cycle = next;
    }

    /// Consume one phase clock edge for the transaction at `index`.
    ///
    /// Fails only when the wait line holds the bus past the ceiling.
    pub fn advance(
        &mut self,
        edge: Edge,
        index: usize,
        txn: &Transaction,
        bus: &mut dyn SignalBus,
    ) -> HarnessResult<Advance> {
        let idle = txn.kind == TransactionKind::IdleCycles;

        match (self.cycle, edge) {
            (BusCycle::T1, Edge::Rising) => {
                self.wait_latch = None;
                if !idle {
                    bus.set_address(txn.address);
                }
            }
            (BusCycle::T1, Edge::Falling) => {
                self.bus_cycles += 1;
                match txn.kind {
                    TransactionKind::Read => {
                        bus.set_asserted(Line::Iorq, true);
                        bus.set_asserted(Line::Rd, true);
                    }
                    TransactionKind::Write => {
                        bus.set_asserted(Line::Iorq, true);
                        bus.set_data(txn.byte());
                    }
                    TransactionKind::IdleCycles => {}
                }
                self.enter(BusCycle::T2);
            }
            (BusCycle::T2, Edge::Rising) => {
                if txn.kind == TransactionKind::Write {
                    bus.set_asserted(Line::Wr, true);
                }
                self.wait_latch = Some(bus.is_asserted(Line::Wait));
            }
            (BusCycle::T2, Edge::Falling) => {
                self.bus_cycles += 1;
                self.waits = 1;
                self.enter(BusCycle::Tw);
            }
            (BusCycle::Tw, Edge::Rising) => {
                self.wait_latch = Some(bus.is_asserted(Line::Wait));
            }
            (BusCycle::Tw, Edge::Falling) => {
                self.bus_cycles += 1;
                let wait_requested = self.wait_latch.take().unwrap_or(false) && !idle;
                if wait_requested || self.waits < self.config.min_wait_cycles {
                    self.waits += 1;
                    if self.waits > self.config.max_wait_cycles {
                        tracing::warn!(
                            "bus: wait timeout at {:#06x} after {} wait cycles",
                            txn.address,
                            self.waits
                        );
                        return Err(HarnessError::WaitTimeout {
                            index,
                            label: txn.label.clone(),
                            address: txn.address,
                            waited: self.waits,
                            ceiling: self.config.max_wait_cycles,
                        });
                    }
                } else {
                    self.enter(BusCycle::T3);
                }
            }
            (BusCycle::T3, Edge::Rising) => {}
            (BusCycle::T3, Edge::Falling) => {
                self.bus_cycles += 1;
                let outcome = match txn.kind {
                    TransactionKind::Read => Outcome::Read {
                        observed: self.sample_data(bus),
                    },
                    TransactionKind::Write => Outcome::Write,
                    TransactionKind::IdleCycles => Outcome::Idle,
                };
                if !idle {
                    release_bus(bus);
                }
                self.enter(BusCycle::T1);

                if idle {
                    self.idle_passes += 1;
                    if self.idle_passes < txn.idle_passes() {
                        return Ok(Advance::InProgress);
                    }
                }

                let completion = Completion {
                    outcome,
                    bus_cycles: self.bus_cycles,
                    wait_cycles: self.waits,
                };
                self.bus_cycles = 0;
                self.idle_passes = 0;
                return Ok(Advance::Completed(completion));
            }
        }

        Ok(Advance::InProgress)
    }

    fn sample_data(&self, bus: &dyn SignalBus) -> Option<u8> {
        if bus.schema().has(Line::DataOutEnable) && !bus.is_asserted(Line::DataOutEnable) {
            None
        } else {
            Some(bus.data())
        }
    }
}

/// Release all strobes and pull the data bus high.
fn release_bus(bus: &mut dyn SignalBus) {
    for line in [Line::Iorq, Line::Mreq, Line::Rd, Line::Wr, Line::M1] {
        bus.set_asserted(line, false);
    }
    bus.set_data(0xFF);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::{SignalBank, SignalSchema};

    /// Feed full phase periods until the transaction completes, holding the
    /// wait line for the first `wait_for` TW latches.
    fn run_one(
        seq: &mut BusSequencer,
        bank: &mut SignalBank,
        txn: &Transaction,
        wait_for: u32,
    ) -> HarnessResult<Completion> {
        let mut latches = 0;
        for _ in 0..1000 {
            if seq.cycle() == BusCycle::Tw || seq.cycle() == BusCycle::T2 {
                bank.set_asserted(Line::Wait, latches < wait_for);
                if seq.cycle() == BusCycle::Tw {
                    latches += 1;
                }
            } else {
                bank.set_asserted(Line::Wait, false);
            }
            seq.advance(Edge::Rising, 0, txn, bank)?;
            if let Advance::Completed(c) = seq.advance(Edge::Falling, 0, txn, bank)? {
                return Ok(c);
            }
        }
        panic!("transaction never completed");
    }

    #[test]
    fn test_write_without_wait_takes_four_cycles() {
        let mut seq = BusSequencer::new(SequencerConfig::default());
        let mut bank = SignalBank::default();
        let c = run_one(&mut seq, &mut bank, &Transaction::write(0x104, 0x90, "w"), 0).unwrap();
        assert_eq!(c.outcome, Outcome::Write);
        assert_eq!(c.bus_cycles, 4);
        assert_eq!(c.wait_cycles, 1);
        assert!(!bank.is_asserted(Line::Iorq));
        assert!(!bank.is_asserted(Line::Wr));
        assert_eq!(bank.data(), 0xFF);
    }

    #[test]
    fn test_write_strobe_window() {
        let mut seq = BusSequencer::new(SequencerConfig::default());
        let mut bank = SignalBank::default();
        let txn = Transaction::write(0x100, 0x5A, "w");

        seq.advance(Edge::Rising, 0, &txn, &mut bank).unwrap();
        assert_eq!(bank.address(), 0x100);
        assert!(!bank.is_asserted(Line::Iorq));

        seq.advance(Edge::Falling, 0, &txn, &mut bank).unwrap();
        assert!(bank.is_asserted(Line::Iorq));
        assert_eq!(bank.data(), 0x5A);
        assert!(!bank.is_asserted(Line::Wr));
        assert!(!bank.is_asserted(Line::Rd));

        seq.advance(Edge::Rising, 0, &txn, &mut bank).unwrap();
        assert_eq!(seq.cycle(), BusCycle::T2);
        assert!(bank.is_asserted(Line::Wr));
    }

    #[test]
    fn test_read_samples_data_at_t3() {
        let mut seq = BusSequencer::new(SequencerConfig::default());
        let mut bank = SignalBank::default();
        let txn = Transaction::read(0x104, 0xEF, "r");

        seq.advance(Edge::Rising, 0, &txn, &mut bank).unwrap();
        seq.advance(Edge::Falling, 0, &txn, &mut bank).unwrap();
        assert!(bank.is_asserted(Line::Rd));
        assert!(bank.is_asserted(Line::Iorq));

        bank.set_data(0xEF);
        let c = run_one(&mut seq, &mut bank, &txn, 0).unwrap();
        assert_eq!(c.outcome, Outcome::Read { observed: Some(0xEF) });
        assert!(!bank.is_asserted(Line::Rd));
    }

    #[test]
    fn test_read_without_output_enable_is_undriven() {
        let mut seq = BusSequencer::new(SequencerConfig::default());
        let mut bank = SignalBank::new(SignalSchema::full(16));
        let c = run_one(&mut seq, &mut bank, &Transaction::read(0x104, 0xEF, "r"), 0).unwrap();
        assert_eq!(c.outcome, Outcome::Read { observed: None });
    }

    #[test]
    fn test_wait_extends_cycle() {
        let mut seq = BusSequencer::new(SequencerConfig::default());
        let mut bank = SignalBank::default();
        let c = run_one(&mut seq, &mut bank, &Transaction::write(0x104, 0, "w"), 3).unwrap();
        assert_eq!(c.wait_cycles, 4);
        assert_eq!(c.bus_cycles, 7);
    }

    #[test]
    fn test_min_wait_floor() {
        let mut seq = BusSequencer::new(SequencerConfig {
            min_wait_cycles: 3,
            max_wait_cycles: 20,
        });
        let mut bank = SignalBank::default();
        let c = run_one(&mut seq, &mut bank, &Transaction::read(0x10, 0, "r"), 0).unwrap();
        assert_eq!(c.wait_cycles, 3);
        assert_eq!(c.bus_cycles, 6);
    }

    #[test]
    fn test_wait_ceiling_aborts() {
        let mut seq = BusSequencer::new(SequencerConfig::default());
        let mut bank = SignalBank::default();
        let txn = Transaction::write(0x104, 0, "stuck");
        let err = run_one(&mut seq, &mut bank, &txn, u32::MAX).unwrap_err();
        match err {
            HarnessError::WaitTimeout {
                label,
                waited,
                ceiling,
                ..
            } => {
                assert_eq!(label, "stuck");
                assert_eq!(waited, 21);
                assert_eq!(ceiling, 20);
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_wait_just_below_ceiling_passes() {
        let mut seq = BusSequencer::new(SequencerConfig::default());
        let mut bank = SignalBank::default();
        let c = run_one(&mut seq, &mut bank, &Transaction::write(0x104, 0, "w"), 19).unwrap();
        assert_eq!(c.wait_cycles, 20);
    }

    #[test]
    fn test_idle_cycles_touch_no_strobes() {
        let mut seq = BusSequencer::new(SequencerConfig::default());
        let mut bank = SignalBank::default();
        bank.set_address(0x55);
        let txn = Transaction::idle(3, "settle");
        // Wait is ignored for idle cycles.
        let c = run_one(&mut seq, &mut bank, &txn, 5).unwrap();
        assert_eq!(c.outcome, Outcome::Idle);
        assert_eq!(c.bus_cycles, 12);
        assert_eq!(bank.address(), 0x55);
        assert!(!bank.is_asserted(Line::Iorq));
    }

    #[test]
    fn test_stale_wait_latch_cleared_at_t1() {
        let mut seq = BusSequencer::new(SequencerConfig::default());
        let mut bank = SignalBank::default();
        let txn = Transaction::write(0x104, 0, "w");
        run_one(&mut seq, &mut bank, &txn, 2).unwrap();
        // Second transaction with the wait line released completes at the floor.
        let c = run_one(&mut seq, &mut bank, &txn, 0).unwrap();
        assert_eq!(c.wait_cycles, 1);
    }
}
