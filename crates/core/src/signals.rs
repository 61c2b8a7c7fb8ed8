// busbench - Bus Cycle Verification Harness
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use busbench_config::OptionalLine;
use std::collections::BTreeSet;

/// Represents a digital signal level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub enum DigitalLevel {
    #[default]
    Low,
    High,
}

impl DigitalLevel {
    pub fn bit(self) -> u32 {
        match self {
            DigitalLevel::High => 1,
            DigitalLevel::Low => 0,
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            DigitalLevel::High => DigitalLevel::Low,
            DigitalLevel::Low => DigitalLevel::High,
        }
    }
}

impl From<bool> for DigitalLevel {
    fn from(b: bool) -> Self {
        if b {
            DigitalLevel::High
        } else {
            DigitalLevel::Low
        }
    }
}

impl From<DigitalLevel> for bool {
    fn from(level: DigitalLevel) -> Self {
        match level {
            DigitalLevel::High => true,
            DigitalLevel::Low => false,
        }
    }
}

/// Every named line shared between the harness and the device model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
pub enum Line {
    Address,
    Data,
    Phi,
    Osc,
    Iorq,
    Mreq,
    Rd,
    Wr,
    M1,
    Wait,
    DataOutEnable,
    SpiSs,
    SpiSck,
    SpiSdo,
    SpiSdi,
    SpiSdoEnable,
    SpiSdiEnable,
}

impl Line {
    pub const COUNT: usize = 17;

    pub const ALL: [Line; Line::COUNT] = [
        Line::Address,
        Line::Data,
        Line::Phi,
        Line::Osc,
        Line::Iorq,
        Line::Mreq,
        Line::Rd,
        Line::Wr,
        Line::M1,
        Line::Wait,
        Line::DataOutEnable,
        Line::SpiSs,
        Line::SpiSck,
        Line::SpiSdo,
        Line::SpiSdi,
        Line::SpiSdoEnable,
        Line::SpiSdiEnable,
    ];

    fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Line::Address => "A",
            Line::Data => "D",
            Line::Phi => "PHI",
            Line::Osc => "CLK1",
            Line::Iorq => "IORQ",
            Line::Mreq => "MREQ",
            Line::Rd => "RD",
            Line::Wr => "WR",
            Line::M1 => "M1",
            Line::Wait => "WAIT",
            Line::DataOutEnable => "D_OE",
            Line::SpiSs => "SPI_SS",
            Line::SpiSck => "SPI_SCK",
            Line::SpiSdo => "SPI_SDO",
            Line::SpiSdi => "SPI_SDI",
            Line::SpiSdoEnable => "SPI_SDO_EN",
            Line::SpiSdiEnable => "SPI_SDI_EN",
        }
    }

    /// Strobes, wait request and chip-select are asserted low.
    pub fn active_low(self) -> bool {
        matches!(
            self,
            Line::Iorq | Line::Mreq | Line::Rd | Line::Wr | Line::M1 | Line::Wait | Line::SpiSs
        )
    }

    pub fn is_optional(self) -> bool {
        matches!(
            self,
            Line::Mreq | Line::M1 | Line::DataOutEnable | Line::SpiSdoEnable | Line::SpiSdiEnable
        )
    }

    /// Bit width of the line. The address width comes from the schema.
    pub fn width(self, schema: &SignalSchema) -> u32 {
        match self {
            Line::Address => schema.address_width,
            Line::Data => 8,
            _ => 1,
        }
    }

    fn mask(self, schema: &SignalSchema) -> u32 {
        let width = self.width(schema);
        if width >= 32 {
            u32::MAX
        } else {
            (1u32 << width) - 1
        }
    }

    /// Raw value of the line when nothing asserts it.
    pub fn inactive_value(self) -> u32 {
        u32::from(self.active_low())
    }

    /// Level after reset: strobes released, buses and SDI pulled high.
    fn reset_value(self, schema: &SignalSchema) -> u32 {
        match self {
            Line::Data => 0xFF,
            Line::Address => 0,
            Line::SpiSdi | Line::SpiSdo => 1,
            _ => self.inactive_value() & self.mask(schema),
        }
    }
}

/// Which optional lines exist on this particular bus variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalSchema {
    pub address_width: u32,
    optional: BTreeSet<Line>,
}

impl Default for SignalSchema {
    fn default() -> Self {
        Self {
            address_width: 16,
            optional: BTreeSet::new(),
        }
    }
}

impl SignalSchema {
    pub fn new(address_width: u32) -> Self {
        Self {
            address_width: address_width.clamp(1, 32),
            optional: BTreeSet::new(),
        }
    }

    pub fn with_line(mut self, line: Line) -> Self {
        if line.is_optional() {
            self.optional.insert(line);
        }
        self
    }

    /// Schema with every optional line present.
    pub fn full(address_width: u32) -> Self {
        Line::ALL
            .iter()
            .filter(|l| l.is_optional())
            .fold(Self::new(address_width), |schema, l| schema.with_line(*l))
    }

    pub fn has(&self, line: Line) -> bool {
        !line.is_optional() || self.optional.contains(&line)
    }

    pub fn from_settings(settings: &busbench_config::BusSettings) -> Self {
        let mut schema = Self::new(u32::from(settings.address_width));
        for line in &settings.optional_lines {
            schema = match line {
                OptionalLine::Mreq => schema.with_line(Line::Mreq),
                OptionalLine::M1 => schema.with_line(Line::M1),
                OptionalLine::DataOutEnable => schema.with_line(Line::DataOutEnable),
                OptionalLine::SpiOutputEnables => schema
                    .with_line(Line::SpiSdoEnable)
                    .with_line(Line::SpiSdiEnable),
            };
        }
        schema
    }
}

/// Typed access to the shared signal lines.
///
/// The sequencer and the flash emulator only ever see this trait, never a
/// concrete device model.
pub trait SignalBus {
    fn schema(&self) -> &SignalSchema;
    fn read(&self, line: Line) -> u32;
    fn write(&mut self, line: Line, value: u32);

    fn level(&self, line: Line) -> DigitalLevel {
        DigitalLevel::from(self.read(line) & 1 != 0)
    }

    fn set_level(&mut self, line: Line, level: DigitalLevel) {
        self.write(line, level.bit());
    }

    fn is_asserted(&self, line: Line) -> bool {
        bool::from(self.level(line)) != line.active_low()
    }

    fn set_asserted(&mut self, line: Line, asserted: bool) {
        self.write(line, u32::from(asserted != line.active_low()));
    }

    fn address(&self) -> u32 {
        self.read(Line::Address)
    }

    fn set_address(&mut self, address: u32) {
        self.write(Line::Address, address);
    }

    fn data(&self) -> u8 {
        (self.read(Line::Data) & 0xFF) as u8
    }

    fn set_data(&mut self, value: u8) {
        self.write(Line::Data, u32::from(value));
    }
}

/// Plain register bank backing a [`SignalBus`].
#[derive(Debug, Clone)]
pub struct SignalBank {
    schema: SignalSchema,
    values: [u32; Line::COUNT],
}

impl Default for SignalBank {
    fn default() -> Self {
        Self::new(SignalSchema::default())
    }
}

impl SignalBank {
    pub fn new(schema: SignalSchema) -> Self {
        let mut values = [0; Line::COUNT];
        for line in Line::ALL {
            values[line.index()] = line.reset_value(&schema);
        }
        Self { schema, values }
    }
}

impl SignalBus for SignalBank {
    fn schema(&self) -> &SignalSchema {
        &self.schema
    }

    fn read(&self, line: Line) -> u32 {
        if self.schema.has(line) {
            self.values[line.index()]
        } else {
            line.inactive_value()
        }
    }

    fn write(&mut self, line: Line, value: u32) {
        if self.schema.has(line) {
            self.values[line.index()] = value & line.mask(&self.schema);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digital_level() {
        assert_eq!(DigitalLevel::default(), DigitalLevel::Low);
        assert_eq!(DigitalLevel::Low.toggled(), DigitalLevel::High);
        let b: bool = DigitalLevel::High.into();
        assert!(b);
    }

    #[test]
    fn test_bank_resets_to_idle_levels() {
        let bank = SignalBank::default();
        assert!(!bank.is_asserted(Line::Iorq));
        assert!(!bank.is_asserted(Line::Rd));
        assert!(!bank.is_asserted(Line::Wr));
        assert!(!bank.is_asserted(Line::Wait));
        assert!(!bank.is_asserted(Line::SpiSs));
        assert_eq!(bank.data(), 0xFF);
        assert_eq!(bank.level(Line::SpiSdi), DigitalLevel::High);
        assert_eq!(bank.level(Line::SpiSck), DigitalLevel::Low);
    }

    #[test]
    fn test_active_low_assertion() {
        let mut bank = SignalBank::default();
        bank.set_asserted(Line::Iorq, true);
        assert_eq!(bank.read(Line::Iorq), 0);
        assert!(bank.is_asserted(Line::Iorq));
        bank.set_asserted(Line::Iorq, false);
        assert_eq!(bank.read(Line::Iorq), 1);
    }

    #[test]
    fn test_absent_optional_lines_read_deasserted() {
        let mut bank = SignalBank::default();
        bank.set_asserted(Line::DataOutEnable, true);
        bank.set_asserted(Line::Mreq, true);
        assert!(!bank.is_asserted(Line::DataOutEnable));
        assert!(!bank.is_asserted(Line::Mreq));

        let mut full = SignalBank::new(SignalSchema::full(16));
        full.set_asserted(Line::DataOutEnable, true);
        assert!(full.is_asserted(Line::DataOutEnable));
    }

    #[test]
    fn test_values_masked_to_width() {
        let mut bank = SignalBank::new(SignalSchema::new(12));
        bank.set_address(0x1_2345);
        assert_eq!(bank.address(), 0x345);
        bank.write(Line::Data, 0x1AB);
        assert_eq!(bank.data(), 0xAB);
        bank.write(Line::SpiSck, 3);
        assert_eq!(bank.read(Line::SpiSck), 1);
    }

    #[test]
    fn test_schema_from_settings() {
        let settings = busbench_config::BusSettings {
            optional_lines: vec![OptionalLine::SpiOutputEnables],
            ..Default::default()
        };
        let schema = SignalSchema::from_settings(&settings);
        assert!(schema.has(Line::SpiSdoEnable));
        assert!(schema.has(Line::SpiSdiEnable));
        assert!(!schema.has(Line::M1));
        assert!(schema.has(Line::Iorq));
    }
}
