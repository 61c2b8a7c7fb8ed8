// busbench - Bus Cycle Verification Harness
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Emulated parts hanging off the device's external pins.

pub mod spi_flash;

pub use spi_flash::{FlashIdentity, ShiftState, SpiFlash};
