// busbench - Bus Cycle Verification Harness
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

pub mod clock;
pub mod config;
pub mod device;
pub mod harness;
pub mod metrics;
pub mod peripherals;
pub mod sequencer;
pub mod signals;
pub mod vector;

pub use clock::{ClockConfig, ClockDomain, ClockEdge, ClockScheduler};
pub use config::HarnessConfig;
pub use device::{DeviceModel, SpiBridge};
pub use harness::{Harness, RunReport, StopReason, TransactionResult, WaitTimeout};
pub use sequencer::{Advance, BusCycle, BusSequencer, Completion, Edge, Outcome, SequencerConfig};
pub use signals::{DigitalLevel, Line, SignalBank, SignalBus, SignalSchema};
pub use vector::{IoMode, TestVector, Transaction, TransactionKind};

#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error(
        "Wait timeout in transaction #{index} ({label}) at {address:#06x}: \
         {waited} wait cycles exceed the ceiling of {ceiling}"
    )]
    WaitTimeout {
        index: usize,
        label: String,
        address: u32,
        waited: u32,
        ceiling: u32,
    },
    #[error("Invalid transaction #{index}: {reason}")]
    InvalidTransaction { index: usize, reason: String },
    #[error("Address {address:#x} does not fit a {width}-bit bus")]
    AddressOutOfRange { address: u32, width: u32 },
}

pub type HarnessResult<T> = Result<T, HarnessError>;

/// Trait for observing harness events in a modular way.
///
/// This is both the reporting sink and the waveform sink. Methods take
/// `&self`; implementations keep their own state behind atomics or locks.
pub trait HarnessObserver: std::fmt::Debug + Send + Sync {
    fn on_run_start(&self, _vector: &TestVector, _schema: &SignalSchema) {}
    /// Called after every scheduler step, once the sequencer and the flash
    /// have reacted to the edge.
    fn on_clock_edge(&self, _edge: &ClockEdge, _signals: &dyn SignalBus) {}
    fn on_transaction(&self, _result: &TransactionResult) {}
    fn on_timeout(&self, _timeout: &WaitTimeout) {}
    fn on_run_end(&self, _report: &RunReport) {}
}
