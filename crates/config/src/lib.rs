// busbench - Bus Cycle Verification Harness
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const SCHEMA_VERSION: &str = "1.0";

/// Default schema version for YAML vector files
fn default_schema_version() -> String {
    SCHEMA_VERSION.to_string()
}

fn default_phase_khz() -> u64 {
    18_432
}

fn default_oscillator_khz() -> u64 {
    100_000
}

fn default_min_wait_cycles() -> u32 {
    1
}

fn default_max_wait_cycles() -> u32 {
    20
}

fn default_address_width() -> u8 {
    16
}

fn default_ctrl_port() -> u32 {
    0x100
}

fn default_data_port() -> u32 {
    0x104
}

fn default_sck_divider() -> u32 {
    1
}

fn default_max_steps() -> u64 {
    5_000_000
}

/// Toggle rates of the two clock domains, in kHz.
///
/// A rate of 18432 means the phase clock line flips 18.432 times per
/// microsecond, i.e. a 9.216 MHz bus clock with both halves observable.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ClockSettings {
    #[serde(default = "default_phase_khz")]
    pub phase_khz: u64,
    #[serde(default = "default_oscillator_khz")]
    pub oscillator_khz: u64,
}

impl Default for ClockSettings {
    fn default() -> Self {
        Self {
            phase_khz: default_phase_khz(),
            oscillator_khz: default_oscillator_khz(),
        }
    }
}

/// Optional bus lines. Lines that are not listed read as "not asserted".
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum OptionalLine {
    Mreq,
    M1,
    DataOutEnable,
    SpiOutputEnables,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct BusSettings {
    #[serde(default = "default_min_wait_cycles")]
    pub min_wait_cycles: u32,
    #[serde(default = "default_max_wait_cycles")]
    pub max_wait_cycles: u32,
    #[serde(default = "default_address_width")]
    pub address_width: u8,
    #[serde(default)]
    pub optional_lines: Vec<OptionalLine>,
}

impl Default for BusSettings {
    fn default() -> Self {
        Self {
            min_wait_cycles: default_min_wait_cycles(),
            max_wait_cycles: default_max_wait_cycles(),
            address_width: default_address_width(),
            optional_lines: Vec::new(),
        }
    }
}

/// Port layout and timing of the reference SPI bridge device.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct DeviceSettings {
    #[serde(default = "default_ctrl_port")]
    pub ctrl_port: u32,
    #[serde(default = "default_data_port")]
    pub data_port: u32,
    /// Oscillator rising edges per SPI clock half-period.
    #[serde(default = "default_sck_divider")]
    pub sck_divider: u32,
    /// Phase clock rising edges /WAIT stays asserted on control port accesses.
    #[serde(default)]
    pub io_wait_states: u32,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            ctrl_port: default_ctrl_port(),
            data_port: default_data_port(),
            sck_divider: default_sck_divider(),
            io_wait_states: 0,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RunLimits {
    #[serde(default = "default_max_steps")]
    pub max_steps: u64,
}

impl Default for RunLimits {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Read,
    Write,
    #[serde(alias = "idle")]
    IdleCycles,
}

/// One row of the test vector table.
///
/// `value` is the expected byte for reads, the driven byte for writes and
/// the number of bus cycles to wait for `idle_cycles`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct TransactionRow {
    pub kind: TransactionKind,
    #[serde(default)]
    pub address: u32,
    pub value: u32,
    #[serde(default)]
    pub label: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct VectorFile {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    pub name: String,
    #[serde(default)]
    pub clocks: ClockSettings,
    #[serde(default)]
    pub bus: BusSettings,
    #[serde(default)]
    pub device: DeviceSettings,
    #[serde(default)]
    pub limits: RunLimits,
    pub transactions: Vec<TransactionRow>,
}

impl VectorFile {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).context("Failed to parse vector file YAML")
    }

    pub fn validate(&self) -> Result<()> {
        if self.schema_version != SCHEMA_VERSION {
            anyhow::bail!(
                "Unsupported schema_version '{}'. Supported versions: '{}'",
                self.schema_version,
                SCHEMA_VERSION
            );
        }

        if self.clocks.phase_khz == 0 || self.clocks.oscillator_khz == 0 {
            anyhow::bail!("Clock rates 'phase_khz' and 'oscillator_khz' must be greater than zero");
        }

        if self.bus.min_wait_cycles == 0 {
            anyhow::bail!("Bus 'min_wait_cycles' must be at least 1");
        }

        if self.bus.max_wait_cycles < self.bus.min_wait_cycles {
            anyhow::bail!(
                "Bus 'max_wait_cycles' ({}) is below 'min_wait_cycles' ({})",
                self.bus.max_wait_cycles,
                self.bus.min_wait_cycles
            );
        }

        if !(1..=32).contains(&self.bus.address_width) {
            anyhow::bail!(
                "Bus 'address_width' must be within 1..=32, got {}",
                self.bus.address_width
            );
        }

        if self.device.sck_divider == 0 {
            anyhow::bail!("Device 'sck_divider' must be greater than zero");
        }

        if self.device.ctrl_port == self.device.data_port {
            anyhow::bail!(
                "Device 'ctrl_port' and 'data_port' must differ (both {:#x})",
                self.device.ctrl_port
            );
        }

        if self.limits.max_steps == 0 {
            anyhow::bail!("Limit 'max_steps' must be greater than zero");
        }

        if self.transactions.is_empty() {
            anyhow::bail!("Vector '{}' has no transactions", self.name);
        }

        let address_limit = address_limit(self.bus.address_width);
        for (idx, txn) in self.transactions.iter().enumerate() {
            match txn.kind {
                TransactionKind::Read | TransactionKind::Write => {
                    if txn.value > 0xFF {
                        anyhow::bail!(
                            "Transaction {} ('{}'): value {:#x} does not fit in a byte",
                            idx,
                            txn.label,
                            txn.value
                        );
                    }
                    if u64::from(txn.address) > address_limit {
                        anyhow::bail!(
                            "Transaction {} ('{}'): address {:#x} exceeds the {}-bit bus",
                            idx,
                            txn.label,
                            txn.address,
                            self.bus.address_width
                        );
                    }
                }
                TransactionKind::IdleCycles => {
                    if txn.value == 0 {
                        anyhow::bail!(
                            "Transaction {} ('{}'): idle_cycles needs a count of at least 1",
                            idx,
                            txn.label
                        );
                    }
                }
            }
        }

        Ok(())
    }
}

fn address_limit(width: u8) -> u64 {
    (1u64 << width) - 1
}

/// Load a vector file from YAML and validate it.
pub fn load_vector_file<P: AsRef<Path>>(path: P) -> Result<VectorFile> {
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read vector file at {:?}", path.as_ref()))?;
    let file = VectorFile::from_yaml(&contents)
        .with_context(|| format!("Invalid vector file {:?}", path.as_ref()))?;
    file.validate()?;
    tracing::debug!(
        "Loaded vector '{}' with {} transactions",
        file.name,
        file.transactions.len()
    );
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_vector() {
        let yaml = r#"
schema_version: "1.0"
name: "smoke"
transactions:
  - { kind: write, address: 0x100, value: 0x01, label: "select" }
  - { kind: read, address: 0x100, value: 0x01, label: "readback" }
  - { kind: idle_cycles, value: 3, label: "settle" }
"#;
        let file = VectorFile::from_yaml(yaml).unwrap();
        assert!(file.validate().is_ok());
        assert_eq!(file.transactions.len(), 3);
        assert_eq!(file.transactions[0].address, 0x100);
        assert_eq!(file.transactions[2].kind, TransactionKind::IdleCycles);
        assert_eq!(file.clocks, ClockSettings::default());
        assert_eq!(file.bus.max_wait_cycles, 20);
    }

    #[test]
    fn test_invalid_version() {
        let yaml = r#"
schema_version: "2.0"
name: "v2"
transactions:
  - { kind: read, address: 0, value: 0 }
"#;
        let file = VectorFile::from_yaml(yaml).unwrap();
        let err = file.validate().unwrap_err();
        assert!(err.to_string().contains("Unsupported schema_version"));
    }

    #[test]
    fn test_byte_overflow_rejected() {
        let yaml = r#"
name: "overflow"
transactions:
  - { kind: write, address: 0x104, value: 0x1FF, label: "too wide" }
"#;
        let file = VectorFile::from_yaml(yaml).unwrap();
        let err = file.validate().unwrap_err();
        assert!(err.to_string().contains("does not fit in a byte"));
    }

    #[test]
    fn test_address_wider_than_bus_rejected() {
        let yaml = r#"
name: "wide"
bus:
  address_width: 8
transactions:
  - { kind: read, address: 0x100, value: 0 }
"#;
        let file = VectorFile::from_yaml(yaml).unwrap();
        let err = file.validate().unwrap_err();
        assert!(err.to_string().contains("8-bit bus"));
    }

    #[test]
    fn test_zero_idle_rejected() {
        let yaml = r#"
name: "idle"
transactions:
  - { kind: idle_cycles, value: 0 }
"#;
        let file = VectorFile::from_yaml(yaml).unwrap();
        assert!(file.validate().is_err());
    }

    #[test]
    fn test_wait_ceiling_below_floor_rejected() {
        let yaml = r#"
name: "waits"
bus:
  min_wait_cycles: 4
  max_wait_cycles: 2
transactions:
  - { kind: read, address: 0, value: 0 }
"#;
        let file = VectorFile::from_yaml(yaml).unwrap();
        let err = file.validate().unwrap_err();
        assert!(err.to_string().contains("max_wait_cycles"));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let yaml = r#"
name: "typo"
transactions:
  - { kind: read, adress: 0x100, value: 0 }
"#;
        assert!(VectorFile::from_yaml(yaml).is_err());
    }
}
