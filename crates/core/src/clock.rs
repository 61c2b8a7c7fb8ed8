// busbench - Bus Cycle Verification Harness
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::device::DeviceModel;
use crate::signals::{DigitalLevel, Line};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ClockDomain {
    /// Bus timing clock driving the T-state machine.
    Phase,
    /// Free-running oscillator used internally by the device.
    Oscillator,
}

impl ClockDomain {
    pub fn line(self) -> Line {
        match self {
            ClockDomain::Phase => Line::Phi,
            ClockDomain::Oscillator => Line::Osc,
        }
    }
}

/// Toggle rates in kHz: each tick flips the line once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockConfig {
    pub phase_khz: u64,
    pub oscillator_khz: u64,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            phase_khz: 18_432,
            oscillator_khz: 100_000,
        }
    }
}

impl From<&busbench_config::ClockSettings> for ClockConfig {
    fn from(settings: &busbench_config::ClockSettings) -> Self {
        Self {
            phase_khz: settings.phase_khz,
            oscillator_khz: settings.oscillator_khz,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClockEdge {
    pub domain: ClockDomain,
    pub level: DigitalLevel,
    /// Simulated time of the toggle in nanoseconds.
    pub time_ns: f64,
    /// Scheduler step that produced this edge, starting at 1.
    pub step: u64,
}

impl ClockEdge {
    pub fn is_rising(&self) -> bool {
        self.level == DigitalLevel::High
    }
}

/// Interleaves two periodic clock domains on a single timeline.
///
/// Each step advances to whichever domain toggles next. Tick instants are
/// compared by cross-multiplying integer tick counts with the rates, so the
/// schedule is exact and reproducible. The phase clock wins ties.
#[derive(Debug, Clone)]
pub struct ClockScheduler {
    config: ClockConfig,
    phase_ticks: u64,
    osc_ticks: u64,
    phase_level: DigitalLevel,
    osc_level: DigitalLevel,
    steps: u64,
    now_ns: f64,
}

impl ClockScheduler {
    pub fn new(config: ClockConfig) -> Self {
        Self {
            config: ClockConfig {
                phase_khz: config.phase_khz.max(1),
                oscillator_khz: config.oscillator_khz.max(1),
            },
            phase_ticks: 1,
            osc_ticks: 1,
            phase_level: DigitalLevel::Low,
            osc_level: DigitalLevel::Low,
            steps: 0,
            now_ns: 0.0,
        }
    }

    pub fn config(&self) -> ClockConfig {
        self.config
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn now_ns(&self) -> f64 {
        self.now_ns
    }

    pub fn level(&self, domain: ClockDomain) -> DigitalLevel {
        match domain {
            ClockDomain::Phase => self.phase_level,
            ClockDomain::Oscillator => self.osc_level,
        }
    }

    /// Domain whose next toggle comes first.
    pub fn next_domain(&self) -> ClockDomain {
        // phase_ticks / phase_khz <= osc_ticks / osc_khz
        let phase_at = u128::from(self.phase_ticks) * u128::from(self.config.oscillator_khz);
        let osc_at = u128::from(self.osc_ticks) * u128::from(self.config.phase_khz);
        if phase_at <= osc_at {
            ClockDomain::Phase
        } else {
            ClockDomain::Oscillator
        }
    }

    /// Advance to the next toggle, evaluating the device before and after it.
    pub fn step<D: DeviceModel + ?Sized>(&mut self, device: &mut D) -> ClockEdge {
        device.evaluate();

        let domain = self.next_domain();
        let (ticks, rate, level) = match domain {
            ClockDomain::Phase => (&mut self.phase_ticks, self.config.phase_khz, &mut self.phase_level),
            ClockDomain::Oscillator => (
                &mut self.osc_ticks,
                self.config.oscillator_khz,
                &mut self.osc_level,
            ),
        };
        self.now_ns = *ticks as f64 * 1_000_000.0 / rate as f64;
        *ticks += 1;
        *level = level.toggled();
        let new_level = *level;

        device.set_level(domain.line(), new_level);
        device.evaluate();

        self.steps += 1;
        tracing::trace!(
            "step {} @ {:.3}ns: {:?} -> {:?}",
            self.steps,
            self.now_ns,
            domain,
            new_level
        );

        ClockEdge {
            domain,
            level: new_level,
            time_ns: self.now_ns,
            step: self.steps,
        }
    }
}
