// busbench - Bus Cycle Verification Harness
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::signals::{DigitalLevel, Line, SignalBus};
use serde::{Deserialize, Serialize};

/// Read Manufacturer/Device ID.
pub const CMD_READ_ID: u8 = 0x90;
/// Read Manufacturer/Device ID, dual I/O.
pub const CMD_READ_ID_DUAL: u8 = 0x92;

/// Number of bytes after the command byte before the manufacturer ID is sent:
/// three address bytes and one dummy byte.
const ID_BYTE_POSITION: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ShiftState {
    /// Just selected, clock phase not yet known.
    #[default]
    Idle,
    /// Waiting for SCK to rise.
    Shift,
    /// Waiting for SCK to fall.
    Latch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlashIdentity {
    pub manufacturer: u8,
    pub device: u8,
}

impl Default for FlashIdentity {
    fn default() -> Self {
        // Winbond, 16 Mbit
        Self {
            manufacturer: 0xEF,
            device: 0x15,
        }
    }
}

/// Pin-level model of a SPI NOR flash that answers the read-ID commands.
///
/// Watches chip-select and SCK on every scheduler step, independent of the
/// bus phase clock. Sampling happens on SCK rising edges and output bits
/// change on falling edges, in both SPI mode 0 and mode 3.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SpiFlash {
    identity: FlashIdentity,
    state: ShiftState,
    command: u8,
    address_counter: u32,
    transmit: u8,
    receive: u8,
    bit_count: u8,
    transmitting: bool,
    /// Output lines currently carry flash data.
    driving: bool,
    dual: bool,

    bytes_received: u64,
    conflicts: u64,
}

impl SpiFlash {
    pub fn new(identity: FlashIdentity) -> Self {
        Self {
            identity,
            ..Default::default()
        }
    }

    pub fn identity(&self) -> FlashIdentity {
        self.identity
    }

    pub fn state(&self) -> ShiftState {
        self.state
    }

    pub fn command(&self) -> u8 {
        self.command
    }

    pub fn address_counter(&self) -> u32 {
        self.address_counter
    }

    pub fn bit_count(&self) -> u8 {
        self.bit_count
    }

    pub fn is_dual(&self) -> bool {
        self.dual
    }

    pub fn is_transmitting(&self) -> bool {
        self.transmitting
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received
    }

    /// Steps on which the flash and the master drove the same data line.
    pub fn conflicts(&self) -> u64 {
        self.conflicts
    }

    fn bits_per_clock(&self) -> u8 {
        if self.dual {
            2
        } else {
            1
        }
    }

    /// React to the current line levels. Called once per scheduler step.
    pub fn observe(&mut self, bus: &mut dyn SignalBus) {
        if !bus.is_asserted(Line::SpiSs) {
            self.deselect(bus);
            return;
        }

        if self.line_conflict(bus) {
            self.conflicts += 1;
            tracing::warn!(
                "spi flash: data line driven by both ends (dual={}, command={:02x})",
                self.dual,
                self.command
            );
        }

        let sck = bus.level(Line::SpiSck);
        match self.state {
            ShiftState::Idle => {
                if sck == DigitalLevel::High {
                    // Mode 3: first output change comes on the falling edge.
                    self.state = ShiftState::Latch;
                } else {
                    // Mode 0: first bit must be valid before the first rising edge.
                    self.state = ShiftState::Shift;
                    self.drive(bus);
                }
            }
            ShiftState::Shift => {
                if sck == DigitalLevel::High {
                    self.capture(bus);
                    self.state = ShiftState::Latch;
                }
            }
            ShiftState::Latch => {
                if sck == DigitalLevel::Low {
                    self.drive(bus);
                    self.state = ShiftState::Shift;
                }
            }
        }
    }

    /// True when the flash is driving a data line whose master-side output
    /// enable is also asserted.
    pub fn line_conflict(&self, bus: &dyn SignalBus) -> bool {
        if !self.driving {
            return false;
        }
        bus.is_asserted(Line::SpiSdiEnable) || (self.dual && bus.is_asserted(Line::SpiSdoEnable))
    }

    fn deselect(&mut self, bus: &mut dyn SignalBus) {
        bus.write(Line::SpiSdi, 1);
        if self.driving && self.dual {
            bus.write(Line::SpiSdo, 1);
        }

        if self.state != ShiftState::Idle || self.command != 0 || self.bit_count != 0 {
            tracing::debug!(
                "spi flash: deselected (command={:02x}, address={}, bits={})",
                self.command,
                self.address_counter,
                self.bit_count
            );
        }

        *self = Self {
            identity: self.identity,
            bytes_received: self.bytes_received,
            conflicts: self.conflicts,
            ..Default::default()
        };
    }

    fn drive(&mut self, bus: &mut dyn SignalBus) {
        if self.transmitting {
            bus.write(Line::SpiSdi, u32::from((self.transmit >> 7) & 1));
            if self.dual {
                bus.write(Line::SpiSdo, u32::from((self.transmit >> 6) & 1));
            }
            self.driving = true;
        }
        self.transmit <<= self.bits_per_clock();
    }

    fn capture(&mut self, bus: &dyn SignalBus) {
        if !self.transmitting {
            let sdo = (bus.read(Line::SpiSdo) & 1) as u8;
            self.receive = (self.receive << 1) | sdo;
            if self.dual {
                let sdi = (bus.read(Line::SpiSdi) & 1) as u8;
                self.receive = (self.receive << 1) | sdi;
            }
        }

        self.bit_count += self.bits_per_clock();
        if self.bit_count >= 8 {
            self.bit_count = 0;
            self.execute();
        }
    }

    fn arm(&mut self, byte: u8) {
        self.transmit = byte;
        self.transmitting = true;
    }

    fn stop_transmit(&mut self) {
        self.transmit = 0;
        self.transmitting = false;
        self.driving = false;
    }

    /// Handle one completed byte-time.
    fn execute(&mut self) {
        self.bytes_received += 1;
        tracing::debug!(
            "spi flash: received {:02x} (command={:02x}, transmitting={}, address={})",
            self.receive,
            self.command,
            self.transmitting,
            self.address_counter
        );

        if self.command == 0 {
            match self.receive {
                CMD_READ_ID => {
                    self.command = CMD_READ_ID;
                    self.dual = false;
                }
                CMD_READ_ID_DUAL => {
                    self.command = CMD_READ_ID_DUAL;
                    self.dual = true;
                }
                other => {
                    tracing::warn!("spi flash: unsupported command {:02x}", other);
                    self.dual = false;
                }
            }
            self.stop_transmit();
            self.address_counter = 0;
            return;
        }

        match self.command {
            CMD_READ_ID | CMD_READ_ID_DUAL => {
                self.address_counter += 1;
                match self.address_counter {
                    ID_BYTE_POSITION => self.arm(self.identity.manufacturer),
                    n if n == ID_BYTE_POSITION + 1 => self.arm(self.identity.device),
                    _ => self.stop_transmit(),
                }
            }
            other => {
                tracing::warn!("spi flash: bogus active command {:02x}", other);
                self.stop_transmit();
            }
        }
    }
}
