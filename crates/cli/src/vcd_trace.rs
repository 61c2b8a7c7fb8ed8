// busbench - Bus Cycle Verification Harness
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::capped_writer::{CapUsage, CappedWriter};
use busbench_core::{ClockEdge, HarnessObserver, Line, RunReport, SignalBus, SignalSchema};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::sync::{Arc, Mutex};
use vcd::{IdCode, TimescaleUnit, Value, Writer};

const BUS_LINES: [Line; 11] = [
    Line::Phi,
    Line::Osc,
    Line::Address,
    Line::Data,
    Line::Iorq,
    Line::Mreq,
    Line::Rd,
    Line::Wr,
    Line::M1,
    Line::Wait,
    Line::DataOutEnable,
];

const SPI_LINES: [Line; 6] = [
    Line::SpiSs,
    Line::SpiSck,
    Line::SpiSdo,
    Line::SpiSdi,
    Line::SpiSdoEnable,
    Line::SpiSdiEnable,
];

/// Waveform sink writing every present signal line to a VCD file.
pub struct VcdObserver {
    state: Mutex<VcdState>,
    wires: Vec<Wire>,
    usage: Arc<CapUsage>,
    max_bytes: u64,
}

struct Wire {
    line: Line,
    id: IdCode,
    width: u32,
}

struct VcdState {
    writer: Writer<CappedWriter<BufWriter<File>>>,
    current_time: Option<u64>,
    last: Vec<Option<u32>>,
}

impl VcdObserver {
    pub fn new(path: &Path, max_bytes: u64, schema: &SignalSchema) -> anyhow::Result<Self> {
        let file = File::create(path)?;
        let capped = CappedWriter::new(BufWriter::new(file), max_bytes);
        let usage = capped.usage();
        let mut writer = Writer::new(capped);

        // Header
        writer.timescale(1, TimescaleUnit::PS)?;
        writer.add_module("busbench")?;

        let mut wires = Vec::new();
        for (module, lines) in [("bus", &BUS_LINES[..]), ("spi", &SPI_LINES[..])] {
            writer.add_module(module)?;
            for &line in lines.iter().filter(|l| schema.has(**l)) {
                let width = line.width(schema);
                let id = writer.add_wire(width, line.name())?;
                wires.push(Wire { line, id, width });
            }
            writer.upscope()?;
        }

        writer.upscope()?; // busbench
        writer.enddefinitions()?;

        let count = wires.len();
        Ok(Self {
            state: Mutex::new(VcdState {
                writer,
                current_time: None,
                last: vec![None; count],
            }),
            wires,
            usage,
            max_bytes,
        })
    }
}

// Helper to convert u64 to Vec<Value> (MSB first)
fn u64_to_vec(val: u64, width: u32) -> Vec<Value> {
    (0..width)
        .rev()
        .map(|i| if (val >> i) & 1 == 1 { Value::V1 } else { Value::V0 })
        .collect()
}

impl core::fmt::Debug for VcdObserver {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "VcdObserver({} wires)", self.wires.len())
    }
}

impl HarnessObserver for VcdObserver {
    fn on_clock_edge(&self, edge: &ClockEdge, signals: &dyn SignalBus) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };

        let time = (edge.time_ns * 1000.0).round() as u64;
        if state.current_time.map_or(true, |t| time > t) {
            let _ = state.writer.timestamp(time);
            state.current_time = Some(time);
        }

        for (idx, wire) in self.wires.iter().enumerate() {
            let value = signals.read(wire.line);
            if state.last[idx] == Some(value) {
                continue;
            }
            state.last[idx] = Some(value);
            let _ = if wire.width == 1 {
                let bit = if value & 1 == 1 { Value::V1 } else { Value::V0 };
                state.writer.change_scalar(wire.id, bit)
            } else {
                state
                    .writer
                    .change_vector(wire.id, u64_to_vec(u64::from(value), wire.width))
            };
        }
    }

    fn on_run_end(&self, _report: &RunReport) {
        if self.usage.truncated() {
            tracing::warn!("VCD trace truncated at {} bytes", self.max_bytes);
        } else {
            tracing::info!("VCD trace: {} bytes", self.usage.written());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u64_to_vec_msb_first() {
        assert_eq!(
            u64_to_vec(0b1011, 4),
            vec![Value::V1, Value::V0, Value::V1, Value::V1]
        );
        assert_eq!(u64_to_vec(0xFF, 2), vec![Value::V1, Value::V1]);
    }
}
