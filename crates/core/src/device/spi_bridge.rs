// busbench - Bus Cycle Verification Harness
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use super::DeviceModel;
use crate::signals::{DigitalLevel, Line, SignalBank, SignalBus, SignalSchema};
use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Control port register.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Ctrl: u8 {
        /// Assert the flash chip-select.
        const SELECT = 0x01;
        /// Move data two bits per SPI clock.
        const DUAL = 0x02;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeConfig {
    pub ctrl_port: u32,
    pub data_port: u32,
    pub sck_divider: u32,
    pub io_wait_states: u32,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            ctrl_port: 0x100,
            data_port: 0x104,
            sck_divider: 1,
            io_wait_states: 0,
        }
    }
}

impl From<&busbench_config::DeviceSettings> for BridgeConfig {
    fn from(settings: &busbench_config::DeviceSettings) -> Self {
        Self {
            ctrl_port: settings.ctrl_port,
            data_port: settings.data_port,
            sck_divider: settings.sck_divider.max(1),
            io_wait_states: settings.io_wait_states,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Port {
    Ctrl,
    Data,
    Unmapped,
}

#[derive(Debug, Clone, Copy)]
struct Access {
    port: Port,
    write: bool,
    phi_rises: u32,
}

#[derive(Debug, Clone, Copy)]
struct Exchange {
    tx: u8,
    rx: u8,
    bits: u8,
    dual: bool,
    /// False when the master leaves the data lines to the flash.
    drive: bool,
}

/// Behavioural model of an I/O-mapped SPI master.
///
/// Stands in for the HDL device under test: a control port selects the
/// flash and the transfer width, a data port moves one byte per access.
/// Every data port access holds `/WAIT` until its SPI exchange (mode 0)
/// has finished, so reads return the byte clocked in during the access.
#[derive(Debug)]
pub struct SpiBridge {
    signals: SignalBank,
    config: BridgeConfig,
    ctrl: Ctrl,
    rx_byte: u8,
    access: Option<Access>,
    exchange: Option<Exchange>,
    last_phi: DigitalLevel,
    last_osc: DigitalLevel,
    divider_count: u32,
    exchanges: u32,
}

impl SpiBridge {
    pub fn new(schema: SignalSchema, config: BridgeConfig) -> Self {
        let mut bridge = Self {
            signals: SignalBank::new(schema),
            config: BridgeConfig {
                sck_divider: config.sck_divider.max(1),
                ..config
            },
            ctrl: Ctrl::empty(),
            rx_byte: 0xFF,
            access: None,
            exchange: None,
            last_phi: DigitalLevel::Low,
            last_osc: DigitalLevel::Low,
            divider_count: 0,
            exchanges: 0,
        };
        bridge.signals.set_level(Line::SpiSck, DigitalLevel::Low);
        bridge.drive_outputs();
        bridge
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn ctrl(&self) -> Ctrl {
        self.ctrl
    }

    /// Byte clocked in by the most recent exchange.
    pub fn received(&self) -> u8 {
        self.rx_byte
    }

    /// Number of completed SPI exchanges.
    pub fn exchanges(&self) -> u32 {
        self.exchanges
    }

    pub fn is_exchanging(&self) -> bool {
        self.exchange.is_some()
    }

    fn port_for(&self, address: u32) -> Port {
        if address == self.config.ctrl_port {
            Port::Ctrl
        } else if address == self.config.data_port {
            Port::Data
        } else {
            Port::Unmapped
        }
    }

    fn decode_access(&mut self) {
        let io_cycle =
            self.signals.is_asserted(Line::Iorq) && !self.signals.is_asserted(Line::Mreq);
        if !io_cycle {
            self.access = None;
            return;
        }

        let rd = self.signals.is_asserted(Line::Rd);
        let wr = self.signals.is_asserted(Line::Wr);
        if self.access.is_some() || !(rd || wr) {
            return;
        }

        let address = self.signals.address();
        let port = self.port_for(address);
        let value = self.signals.data();
        match (port, wr) {
            (Port::Ctrl, true) => {
                self.ctrl = Ctrl::from_bits_truncate(value);
                tracing::debug!("bridge: ctrl <- {:?}", self.ctrl);
            }
            (Port::Data, true) => self.start_exchange(value, true),
            (Port::Data, false) => {
                let drive = !self.ctrl.contains(Ctrl::DUAL);
                self.start_exchange(0xFF, drive);
            }
            (Port::Unmapped, _) => {
                tracing::debug!("bridge: ignoring access to unmapped port {:#x}", address);
            }
            (Port::Ctrl, false) => {}
        }

        self.access = Some(Access {
            port,
            write: wr,
            phi_rises: 0,
        });
    }

    fn start_exchange(&mut self, tx: u8, drive: bool) {
        if self.exchange.is_some() {
            tracing::warn!("bridge: exchange requested while one is in flight, dropped");
            return;
        }
        let mut exchange = Exchange {
            tx,
            rx: 0,
            bits: 0,
            dual: self.ctrl.contains(Ctrl::DUAL),
            drive,
        };
        self.divider_count = 0;
        self.shift_out(&mut exchange);
        self.exchange = Some(exchange);
    }

    fn shift_out(&mut self, exchange: &mut Exchange) {
        if !exchange.drive {
            self.release_data_lines();
            return;
        }
        self.signals.set_asserted(Line::SpiSdoEnable, true);
        self.signals
            .write(Line::SpiSdo, u32::from((exchange.tx >> 7) & 1));
        if exchange.dual {
            self.signals.set_asserted(Line::SpiSdiEnable, true);
            self.signals
                .write(Line::SpiSdi, u32::from((exchange.tx >> 6) & 1));
            exchange.tx <<= 2;
        } else {
            exchange.tx <<= 1;
        }
    }

    fn release_data_lines(&mut self) {
        self.signals.set_asserted(Line::SpiSdoEnable, false);
        self.signals.set_asserted(Line::SpiSdiEnable, false);
    }

    /// One oscillator rising edge worth of SPI master activity.
    fn clock_exchange(&mut self) {
        let Some(mut exchange) = self.exchange.take() else {
            return;
        };

        self.divider_count += 1;
        if self.divider_count < self.config.sck_divider {
            self.exchange = Some(exchange);
            return;
        }
        self.divider_count = 0;

        if self.signals.level(Line::SpiSck) == DigitalLevel::Low {
            self.signals.set_level(Line::SpiSck, DigitalLevel::High);
            let sdi = (self.signals.read(Line::SpiSdi) & 1) as u8;
            if exchange.dual {
                let sdo = (self.signals.read(Line::SpiSdo) & 1) as u8;
                exchange.rx = (exchange.rx << 2) | (sdi << 1) | sdo;
                exchange.bits += 2;
            } else {
                exchange.rx = (exchange.rx << 1) | sdi;
                exchange.bits += 1;
            }
            self.exchange = Some(exchange);
        } else {
            self.signals.set_level(Line::SpiSck, DigitalLevel::Low);
            if exchange.bits >= 8 {
                self.rx_byte = exchange.rx;
                self.exchanges += 1;
                self.release_data_lines();
                tracing::debug!("bridge: spi exchange complete, rx={:02x}", exchange.rx);
            } else {
                self.shift_out(&mut exchange);
                self.exchange = Some(exchange);
            }
        }
    }

    fn drive_outputs(&mut self) {
        let busy = match self.access {
            Some(Access {
                port: Port::Data, ..
            }) => self.exchange.is_some(),
            Some(Access {
                port: Port::Ctrl,
                phi_rises,
                ..
            }) => phi_rises < self.config.io_wait_states,
            _ => false,
        };
        self.signals.set_asserted(Line::Wait, busy);
        self.signals
            .set_asserted(Line::SpiSs, self.ctrl.contains(Ctrl::SELECT));

        match self.access {
            Some(access) if !access.write && !busy && access.port != Port::Unmapped => {
                let value = match access.port {
                    Port::Ctrl => self.ctrl.bits(),
                    _ => self.rx_byte,
                };
                self.signals.set_data(value);
                self.signals.set_asserted(Line::DataOutEnable, true);
            }
            _ => self.signals.set_asserted(Line::DataOutEnable, false),
        }
    }
}

impl SignalBus for SpiBridge {
    fn schema(&self) -> &SignalSchema {
        self.signals.schema()
    }

    fn read(&self, line: Line) -> u32 {
        self.signals.read(line)
    }

    fn write(&mut self, line: Line, value: u32) {
        self.signals.write(line, value);
    }
}

impl DeviceModel for SpiBridge {
    fn evaluate(&mut self) {
        let phi = self.signals.level(Line::Phi);
        let osc = self.signals.level(Line::Osc);
        let phi_rose = phi == DigitalLevel::High && self.last_phi == DigitalLevel::Low;
        let osc_rose = osc == DigitalLevel::High && self.last_osc == DigitalLevel::Low;
        self.last_phi = phi;
        self.last_osc = osc;

        self.decode_access();
        if phi_rose {
            if let Some(access) = self.access.as_mut() {
                access.phi_rises += 1;
            }
        }
        if osc_rose {
            self.clock_exchange();
        }
        self.drive_outputs();
    }
}
