// busbench - Bus Cycle Verification Harness
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::clock::ClockConfig;
use crate::device::BridgeConfig;
use crate::peripherals::spi_flash::FlashIdentity;
use crate::sequencer::SequencerConfig;
use crate::signals::SignalSchema;
use busbench_config::VectorFile;

/// Everything a run needs besides the vector itself.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub clocks: ClockConfig,
    pub sequencer: SequencerConfig,
    pub schema: SignalSchema,
    pub bridge: BridgeConfig,
    pub flash: FlashIdentity,
    /// Scheduler steps after which a run is abandoned.
    pub max_steps: u64,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            clocks: ClockConfig::default(),
            sequencer: SequencerConfig::default(),
            schema: SignalSchema::default(),
            bridge: BridgeConfig::default(),
            flash: FlashIdentity::default(),
            max_steps: 5_000_000,
        }
    }
}

impl From<&VectorFile> for HarnessConfig {
    fn from(file: &VectorFile) -> Self {
        Self {
            clocks: ClockConfig::from(&file.clocks),
            sequencer: SequencerConfig::from(&file.bus),
            schema: SignalSchema::from_settings(&file.bus),
            bridge: BridgeConfig::from(&file.device),
            flash: FlashIdentity::default(),
            max_steps: file.limits.max_steps,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::Line;

    #[test]
    fn test_defaults_match_file_defaults() {
        let file = VectorFile::from_yaml("name: x\ntransactions: []\n").unwrap();
        let from_file = HarnessConfig::from(&file);
        let default = HarnessConfig::default();
        assert_eq!(from_file.clocks, default.clocks);
        assert_eq!(from_file.sequencer, default.sequencer);
        assert_eq!(from_file.schema, default.schema);
        assert_eq!(from_file.bridge, default.bridge);
        assert_eq!(from_file.max_steps, default.max_steps);
    }

    #[test]
    fn test_optional_lines_carried_over() {
        let yaml = r#"
name: x
bus:
  min_wait_cycles: 2
  optional_lines: [data_out_enable]
transactions: []
"#;
        let file = VectorFile::from_yaml(yaml).unwrap();
        let config = HarnessConfig::from(&file);
        assert_eq!(config.sequencer.min_wait_cycles, 2);
        assert!(config.schema.has(Line::DataOutEnable));
        assert!(!config.schema.has(Line::M1));
    }
}
