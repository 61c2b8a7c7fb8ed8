// busbench - Bus Cycle Verification Harness
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

pub mod spi_bridge;

use crate::signals::SignalBus;

pub use spi_bridge::{BridgeConfig, SpiBridge};

/// The device under test, seen as a bank of lines plus a settle operation.
///
/// `evaluate` recomputes outputs from the current inputs. Calling it again
/// without changing any input must not change anything.
pub trait DeviceModel: SignalBus {
    fn evaluate(&mut self);
}
