// busbench - Bus Cycle Verification Harness
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use busbench_config::{load_vector_file, OptionalLine, TransactionKind, VectorFile};
use std::time::{SystemTime, UNIX_EPOCH};

fn write_temp_file(prefix: &str, contents: &str) -> std::path::PathBuf {
    let mut dir = std::env::temp_dir();
    dir.push("busbench-config-tests");
    let _ = std::fs::create_dir_all(&dir);

    let nonce = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let path = dir.join(format!("{}-{}.yaml", prefix, nonce));
    std::fs::write(&path, contents).expect("Failed to write temp file");
    path
}

#[test]
fn test_minimal_yaml_takes_defaults() {
    let yaml = r#"
name: "defaults"
transactions:
  - kind: read
    address: 0x100
    value: 0x0C
"#;
    let file = VectorFile::from_yaml(yaml).unwrap();
    assert_eq!(file.schema_version, "1.0");
    assert_eq!(file.clocks.phase_khz, 18_432);
    assert_eq!(file.clocks.oscillator_khz, 100_000);
    assert_eq!(file.bus.min_wait_cycles, 1);
    assert_eq!(file.bus.address_width, 16);
    assert!(file.bus.optional_lines.is_empty());
    assert_eq!(file.device.ctrl_port, 0x100);
    assert_eq!(file.device.data_port, 0x104);
    assert_eq!(file.transactions[0].label, "");
}

#[test]
fn test_full_yaml_parses() {
    let yaml = r#"
schema_version: "1.0"
name: "full"
clocks:
  phase_khz: 8000
  oscillator_khz: 50000
bus:
  min_wait_cycles: 2
  max_wait_cycles: 10
  address_width: 20
  optional_lines: [mreq, m1, data_out_enable, spi_output_enables]
device:
  ctrl_port: 0x200
  data_port: 0x201
  sck_divider: 2
  io_wait_states: 3
limits:
  max_steps: 1000
transactions:
  - { kind: write, address: 0x200, value: 0x01, label: "select" }
  - { kind: idle, value: 2, label: "alias" }
"#;
    let file = VectorFile::from_yaml(yaml).unwrap();
    file.validate().unwrap();
    assert_eq!(file.bus.optional_lines.len(), 4);
    assert!(file.bus.optional_lines.contains(&OptionalLine::DataOutEnable));
    assert_eq!(file.device.sck_divider, 2);
    assert_eq!(file.limits.max_steps, 1000);
    assert_eq!(file.transactions[1].kind, TransactionKind::IdleCycles);
}

#[test]
fn test_load_vector_file_validates() {
    let path = write_temp_file(
        "same-ports",
        r#"
name: "clash"
device:
  ctrl_port: 0x10
  data_port: 0x10
transactions:
  - { kind: read, address: 0x10, value: 0 }
"#,
    );
    let err = load_vector_file(&path).unwrap_err();
    assert!(format!("{:#}", err).contains("must differ"));
}

#[test]
fn test_load_missing_file_names_path() {
    let err = load_vector_file("/nonexistent/busbench/vector.yaml").unwrap_err();
    assert!(format!("{:#}", err).contains("vector.yaml"));
}

#[test]
fn test_empty_transactions_rejected() {
    let path = write_temp_file(
        "empty",
        r#"
name: "empty"
transactions: []
"#,
    );
    let err = load_vector_file(&path).unwrap_err();
    assert!(err.to_string().contains("no transactions"));
}
