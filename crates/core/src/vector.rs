// busbench - Bus Cycle Verification Harness
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::device::spi_bridge::Ctrl;
use crate::device::BridgeConfig;
use crate::peripherals::spi_flash::{FlashIdentity, CMD_READ_ID, CMD_READ_ID_DUAL};
use crate::{HarnessError, HarnessResult};
use busbench_config::VectorFile;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Read,
    Write,
    IdleCycles,
}

impl From<busbench_config::TransactionKind> for TransactionKind {
    fn from(kind: busbench_config::TransactionKind) -> Self {
        match kind {
            busbench_config::TransactionKind::Read => TransactionKind::Read,
            busbench_config::TransactionKind::Write => TransactionKind::Write,
            busbench_config::TransactionKind::IdleCycles => TransactionKind::IdleCycles,
        }
    }
}

/// One scripted bus operation.
///
/// `value` is the byte to write, the byte a read expects, or the number of
/// bus cycles an idle transaction consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transaction {
    pub kind: TransactionKind,
    pub address: u32,
    pub value: u32,
    pub label: String,
}

impl Transaction {
    pub fn read(address: u32, expected: u8, label: impl Into<String>) -> Self {
        Self {
            kind: TransactionKind::Read,
            address,
            value: u32::from(expected),
            label: label.into(),
        }
    }

    pub fn write(address: u32, value: u8, label: impl Into<String>) -> Self {
        Self {
            kind: TransactionKind::Write,
            address,
            value: u32::from(value),
            label: label.into(),
        }
    }

    pub fn idle(cycles: u32, label: impl Into<String>) -> Self {
        Self {
            kind: TransactionKind::IdleCycles,
            address: 0,
            value: cycles,
            label: label.into(),
        }
    }

    /// Low byte of `value`, the data byte for reads and writes.
    pub fn byte(&self) -> u8 {
        (self.value & 0xFF) as u8
    }

    /// Bus cycles an idle transaction spans. Never less than one.
    pub fn idle_passes(&self) -> u32 {
        self.value.max(1)
    }

    fn check(&self, index: usize, address_width: u32) -> HarnessResult<()> {
        match self.kind {
            TransactionKind::Read | TransactionKind::Write => {
                if self.value > 0xFF {
                    return Err(HarnessError::InvalidTransaction {
                        index,
                        reason: format!("value {:#x} does not fit in a byte", self.value),
                    });
                }
                if address_width < 32 && self.address >> address_width != 0 {
                    return Err(HarnessError::AddressOutOfRange {
                        address: self.address,
                        width: address_width,
                    });
                }
            }
            TransactionKind::IdleCycles => {
                if self.value == 0 {
                    return Err(HarnessError::InvalidTransaction {
                        index,
                        reason: "idle transaction needs at least one cycle".to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Which SPI transfer width the built-in read-ID vector exercises.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoMode {
    Single,
    Dual,
}

/// Immutable, ordered list of transactions for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestVector {
    name: String,
    transactions: Vec<Transaction>,
}

impl TestVector {
    /// Build a vector, rejecting transactions that cannot be driven on a
    /// bus of `address_width` bits.
    pub fn new(
        name: impl Into<String>,
        transactions: Vec<Transaction>,
        address_width: u32,
    ) -> HarnessResult<Self> {
        for (index, t) in transactions.iter().enumerate() {
            t.check(index, address_width)?;
        }
        Ok(Self {
            name: name.into(),
            transactions,
        })
    }

    pub fn from_vector_file(file: &VectorFile) -> HarnessResult<Self> {
        let transactions = file
            .transactions
            .iter()
            .enumerate()
            .map(|(index, row)| Transaction {
                kind: row.kind.into(),
                address: row.address,
                value: row.value,
                label: if row.label.is_empty() {
                    format!("#{}", index)
                } else {
                    row.label.clone()
                },
            })
            .collect();
        Self::new(
            file.name.clone(),
            transactions,
            u32::from(file.bus.address_width),
        )
    }

    /// Read-identification scenario against the reference bridge layout.
    ///
    /// The command byte always goes out on one line; the dual variant
    /// switches the bridge to dual transfers right after it.
    pub fn read_id(layout: &BridgeConfig, mode: IoMode) -> Self {
        let ctrl = layout.ctrl_port;
        let data = layout.data_port;
        let id = FlashIdentity::default();
        let select = Ctrl::SELECT.bits();

        let mut transactions = vec![
            Transaction::write(ctrl, select, "select flash"),
            Transaction::read(ctrl, select, "chip-select readback"),
        ];
        match mode {
            IoMode::Single => {
                transactions.push(Transaction::write(data, CMD_READ_ID, "read-id command"));
                transactions.push(Transaction::read(ctrl, select, "ctrl unchanged"));
            }
            IoMode::Dual => {
                let dual = (Ctrl::SELECT | Ctrl::DUAL).bits();
                transactions.push(Transaction::write(data, CMD_READ_ID_DUAL, "dual read-id command"));
                transactions.push(Transaction::write(ctrl, dual, "switch to dual I/O"));
                transactions.push(Transaction::read(ctrl, dual, "dual mode readback"));
            }
        }
        for n in 0..3 {
            transactions.push(Transaction::write(data, 0x00, format!("address byte {}", n)));
        }
        transactions.push(Transaction::write(data, 0xFF, "dummy byte"));
        transactions.push(Transaction::read(data, id.manufacturer, "manufacturer id"));
        transactions.push(Transaction::read(data, id.device, "device id"));

        let name = match mode {
            IoMode::Single => "read-id single",
            IoMode::Dual => "read-id dual",
        };
        Self {
            name: name.to_string(),
            transactions,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn get(&self, index: usize) -> Option<&Transaction> {
        self.transactions.get(index)
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_read_id_layout() {
        let v = TestVector::read_id(&BridgeConfig::default(), IoMode::Single);
        let ops: Vec<(TransactionKind, u32, u32)> = v
            .transactions()
            .iter()
            .map(|t| (t.kind, t.address, t.value))
            .collect();
        assert_eq!(
            ops,
            vec![
                (TransactionKind::Write, 0x100, 0x01),
                (TransactionKind::Read, 0x100, 0x01),
                (TransactionKind::Write, 0x104, 0x90),
                (TransactionKind::Read, 0x100, 0x01),
                (TransactionKind::Write, 0x104, 0x00),
                (TransactionKind::Write, 0x104, 0x00),
                (TransactionKind::Write, 0x104, 0x00),
                (TransactionKind::Write, 0x104, 0xFF),
                (TransactionKind::Read, 0x104, 0xEF),
                (TransactionKind::Read, 0x104, 0x15),
            ]
        );
    }

    #[test]
    fn test_dual_read_id_switches_after_command() {
        let v = TestVector::read_id(&BridgeConfig::default(), IoMode::Dual);
        assert_eq!(v.get(2).map(|t| t.value), Some(0x92));
        assert_eq!(v.get(3).map(|t| (t.address, t.value)), Some((0x100, 0x03)));
        assert_eq!(v.len(), 11);
    }

    #[test]
    fn test_rejects_wide_values() {
        let err = TestVector::new("bad", vec![Transaction {
            kind: TransactionKind::Write,
            address: 0x10,
            value: 0x1FF,
            label: "too wide".into(),
        }], 16)
        .unwrap_err();
        assert!(matches!(err, HarnessError::InvalidTransaction { index: 0, .. }));
    }

    #[test]
    fn test_rejects_address_outside_bus() {
        let err = TestVector::new("bad", vec![Transaction::read(0x1_0000, 0, "x")], 16).unwrap_err();
        assert!(matches!(
            err,
            HarnessError::AddressOutOfRange {
                address: 0x1_0000,
                width: 16
            }
        ));
        assert!(TestVector::new("ok", vec![Transaction::read(0xFF, 0, "x")], 8).is_ok());
    }

    #[test]
    fn test_rejects_zero_idle() {
        let err = TestVector::new("bad", vec![Transaction::idle(0, "nothing")], 16).unwrap_err();
        assert!(matches!(err, HarnessError::InvalidTransaction { .. }));
    }

    #[test]
    fn test_from_vector_file_fills_missing_labels() {
        let yaml = r#"
name: "file"
transactions:
  - { kind: write, address: 0x100, value: 1 }
  - { kind: idle_cycles, value: 3, label: "settle" }
"#;
        let file = VectorFile::from_yaml(yaml).unwrap();
        let v = TestVector::from_vector_file(&file).unwrap();
        assert_eq!(v.name(), "file");
        assert_eq!(v.transactions()[0].label, "#0");
        assert_eq!(v.transactions()[1].kind, TransactionKind::IdleCycles);
        assert_eq!(v.transactions()[1].idle_passes(), 3);
    }
}
