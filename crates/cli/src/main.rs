// busbench - Bus Cycle Verification Harness
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

mod capped_writer;
mod vcd_trace;

use anyhow::Context;
use busbench_config::{load_vector_file, VectorFile};
use busbench_core::metrics::{MetricsSnapshot, RunMetrics};
use busbench_core::{
    Harness, HarnessConfig, IoMode, RunReport, StopReason, TestVector, TransactionKind,
    TransactionResult,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info};

const EXIT_PASS: u8 = 0;
const EXIT_ASSERT_FAIL: u8 = 1;
const EXIT_CONFIG_ERROR: u8 = 2;
const EXIT_RUNTIME_ERROR: u8 = 3;

const RESULT_SCHEMA_VERSION: &str = "1.0";

#[derive(Parser, Debug)]
#[command(author, version, about = "busbench bus cycle verification harness", long_about = None)]
struct Cli {
    /// Enable per-byte and per-state debug logging
    #[arg(short, long, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a test vector file (YAML).
    Run(RunArgs),

    /// Run one of the built-in read-identification vectors.
    Builtin(BuiltinArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Path to the vector file
    vector: PathBuf,

    #[command(flatten)]
    options: RunOptions,
}

#[derive(Args, Debug)]
struct BuiltinArgs {
    #[arg(value_enum)]
    scenario: Scenario,

    #[command(flatten)]
    options: RunOptions,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Scenario {
    ReadIdSingle,
    ReadIdDual,
}

#[derive(Args, Debug)]
struct RunOptions {
    /// Write a VCD waveform of every signal line
    #[arg(long)]
    vcd: Option<PathBuf>,

    /// Stop growing the VCD file past this many bytes
    #[arg(long, default_value_t = 64 * 1024 * 1024)]
    max_vcd_bytes: u64,

    /// Directory to write result.json and junit.xml
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Override the minimum number of TW cycles per transaction
    #[arg(long)]
    min_wait_cycles: Option<u32>,

    /// Override the scheduler step budget
    #[arg(long)]
    max_steps: Option<u64>,
}

#[derive(Debug, Serialize)]
struct RunResult {
    result_schema_version: String,
    status: String,
    vector: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<PathBuf>,
    vector_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_reason: Option<StopReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    steps_executed: u64,
    phase_cycles: u64,
    simulated_ns: f64,
    metrics: Option<MetricsSnapshot>,
    transactions: Vec<TransactionResult>,
}

/// A vector ready to run, with the digest of whatever it was built from.
struct Prepared {
    config: HarnessConfig,
    vector: TestVector,
    source: Option<PathBuf>,
    vector_hash: String,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize tracing with appropriate level based on --trace flag
    if cli.trace {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .init();
    }

    let (prepared, options) = match &cli.command {
        Commands::Run(args) => (prepare_file(&args.vector, &args.options), &args.options),
        Commands::Builtin(args) => (prepare_builtin(args.scenario, &args.options), &args.options),
    };

    match prepared {
        Ok(prepared) => execute(prepared, options),
        Err(e) => {
            error!("Configuration error: {:#}", e);
            let source = match &cli.command {
                Commands::Run(args) => Some(args.vector.clone()),
                Commands::Builtin(_) => None,
            };
            write_config_error_outputs(options, source, format!("{:#}", e));
            ExitCode::from(EXIT_CONFIG_ERROR)
        }
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn apply_overrides(file: &mut VectorFile, options: &RunOptions) -> anyhow::Result<()> {
    if let Some(min) = options.min_wait_cycles {
        file.bus.min_wait_cycles = min;
    }
    if let Some(max_steps) = options.max_steps {
        file.limits.max_steps = max_steps;
    }
    file.validate().context("Invalid command line override")
}

fn prepare_file(path: &Path, options: &RunOptions) -> anyhow::Result<Prepared> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read vector file at {:?}", path))?;
    let mut file = load_vector_file(path)?;
    apply_overrides(&mut file, options)?;

    let vector = TestVector::from_vector_file(&file)?;
    info!("Loaded vector '{}' from {:?}", vector.name(), path);
    Ok(Prepared {
        config: HarnessConfig::from(&file),
        vector,
        source: Some(path.to_path_buf()),
        vector_hash: sha256_hex(&bytes),
    })
}

fn prepare_builtin(scenario: Scenario, options: &RunOptions) -> anyhow::Result<Prepared> {
    let mut config = HarnessConfig::default();
    if let Some(min) = options.min_wait_cycles {
        if min == 0 || min > config.sequencer.max_wait_cycles {
            anyhow::bail!(
                "--min-wait-cycles must be within 1..={}",
                config.sequencer.max_wait_cycles
            );
        }
        config.sequencer.min_wait_cycles = min;
    }
    if let Some(max_steps) = options.max_steps {
        if max_steps == 0 {
            anyhow::bail!("--max-steps must be greater than zero");
        }
        config.max_steps = max_steps;
    }

    let mode = match scenario {
        Scenario::ReadIdSingle => IoMode::Single,
        Scenario::ReadIdDual => IoMode::Dual,
    };
    let vector = TestVector::read_id(&config.bridge, mode);
    let canonical = serde_json::to_vec(&vector).context("Failed to serialize built-in vector")?;
    Ok(Prepared {
        config,
        vector,
        source: None,
        vector_hash: sha256_hex(&canonical),
    })
}

fn execute(prepared: Prepared, options: &RunOptions) -> ExitCode {
    let Prepared {
        config,
        vector,
        source,
        vector_hash,
    } = prepared;

    let metrics = Arc::new(RunMetrics::new());
    let mut harness = Harness::with_bridge(&config, Arc::new(vector));
    harness.add_observer(metrics.clone());

    if let Some(vcd_path) = &options.vcd {
        match vcd_trace::VcdObserver::new(vcd_path, options.max_vcd_bytes, &config.schema) {
            Ok(observer) => {
                info!("Writing VCD trace to {:?}", vcd_path);
                harness.add_observer(Arc::new(observer));
            }
            Err(e) => {
                error!("Failed to create VCD file {:?}: {}", vcd_path, e);
                write_config_error_outputs(options, source, format!("{:#}", e));
                return ExitCode::from(EXIT_CONFIG_ERROR);
            }
        }
    }

    let start = Instant::now();
    let report = harness.run();
    let duration = start.elapsed();

    info!(
        "{} transactions, {} mismatches, {} steps ({:.0} steps/s)",
        report.results.len(),
        metrics.get_mismatches(),
        report.steps,
        metrics.get_steps_per_second()
    );

    let (status, code) = match &report.stop {
        StopReason::Completed if report.passed() => ("pass", EXIT_PASS),
        StopReason::Completed => ("fail", EXIT_ASSERT_FAIL),
        _ => ("error", EXIT_RUNTIME_ERROR),
    };
    match status {
        "pass" => info!("PASS: {}", report.name),
        _ => error!("{}: {} ({:?})", status.to_uppercase(), report.name, report.stop),
    }

    let result = RunResult {
        result_schema_version: RESULT_SCHEMA_VERSION.to_string(),
        status: status.to_string(),
        vector: report.name.clone(),
        source,
        vector_hash,
        stop_reason: Some(report.stop.clone()),
        message: stop_message(&report),
        steps_executed: report.steps,
        phase_cycles: report.phase_cycles,
        simulated_ns: report.elapsed_ns,
        metrics: Some(metrics.snapshot()),
        transactions: report.results.clone(),
    };
    write_outputs(options, &result, duration);

    // Drop observers so the VCD buffer is flushed before exit.
    drop(harness);
    ExitCode::from(code)
}

fn stop_message(report: &RunReport) -> Option<String> {
    match &report.stop {
        StopReason::Completed => None,
        StopReason::WaitTimeout(t) => Some(format!(
            "transaction #{} ({}) at {:#06x} held /WAIT for {} cycles (ceiling {})",
            t.index, t.label, t.address, t.waited, t.ceiling
        )),
        StopReason::StepLimit { steps, index } => Some(format!(
            "step limit of {} reached at transaction #{}",
            steps, index
        )),
        StopReason::Aborted { message } => Some(message.clone()),
    }
}

fn write_outputs(options: &RunOptions, result: &RunResult, duration: Duration) {
    let Some(output_dir) = &options.output_dir else {
        return;
    };
    if let Err(e) = std::fs::create_dir_all(output_dir) {
        error!("Failed to create output directory {:?}: {}", output_dir, e);
        return;
    }

    let result_path = output_dir.join("result.json");
    match std::fs::File::create(&result_path) {
        Ok(f) => {
            if let Err(e) = serde_json::to_writer_pretty(f, result) {
                error!("Failed to write result.json: {}", e);
            }
        }
        Err(e) => error!("Failed to create result.json: {}", e),
    }

    let junit_path = output_dir.join("junit.xml");
    if let Err(e) = write_junit_xml(&junit_path, result, duration) {
        error!("Failed to write junit.xml: {}", e);
    }
}

fn write_config_error_outputs(options: &RunOptions, source: Option<PathBuf>, message: String) {
    let result = RunResult {
        result_schema_version: RESULT_SCHEMA_VERSION.to_string(),
        status: "error".to_string(),
        vector: String::new(),
        vector_hash: source
            .as_ref()
            .and_then(|p| std::fs::read(p).ok())
            .map(|bytes| sha256_hex(&bytes))
            .unwrap_or_default(),
        source,
        stop_reason: None,
        message: Some(message),
        steps_executed: 0,
        phase_cycles: 0,
        simulated_ns: 0.0,
        metrics: None,
        transactions: Vec::new(),
    };
    write_outputs(options, &result, Duration::from_secs(0));
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

fn write_junit_xml(path: &Path, result: &RunResult, duration: Duration) -> std::io::Result<()> {
    let mut details = String::new();
    details.push_str(&format!(
        "result_schema_version={}\n",
        RESULT_SCHEMA_VERSION
    ));
    details.push_str(&format!("stop_reason={:?}\n", result.stop_reason));
    if let Some(msg) = &result.message {
        details.push_str(&format!("message={}\n", msg));
    }
    details.push_str(&format!("steps_executed={}\n", result.steps_executed));
    details.push_str(&format!("phase_cycles={}\n", result.phase_cycles));
    details.push_str(&format!("vector_hash={}\n", result.vector_hash));
    if let Some(source) = &result.source {
        details.push_str(&format!("vector={}\n", source.display()));
    }

    let time_secs = duration.as_secs_f64();
    let mut tests: u64 = 0;
    let mut failures: u64 = 0;
    let mut errors: u64 = 0;
    let mut testcases = String::new();

    // The "run" testcase carries configuration errors, timeouts and step limits.
    tests += 1;
    testcases.push_str(&format!(
        "  <testcase classname=\"busbench\" name=\"run\" time=\"{:.6}\">\n",
        time_secs
    ));
    if result.status == "error" {
        let err_type = match &result.stop_reason {
            None => "config error",
            Some(StopReason::WaitTimeout(_)) => "wait timeout",
            Some(StopReason::StepLimit { .. }) => "step limit",
            Some(_) => "runtime error",
        };
        errors += 1;
        testcases.push_str(&format!(
            "    <error message=\"{}\">{}</error>\n",
            xml_escape(err_type),
            xml_escape(&details)
        ));
    }
    testcases.push_str("  </testcase>\n");

    // One testcase per checked read so CI UIs show exactly which byte failed.
    for t in result
        .transactions
        .iter()
        .filter(|t| t.kind == TransactionKind::Read)
    {
        tests += 1;
        let name = format!("#{} {} @ {:04x}", t.index, t.label, t.address);
        testcases.push_str(&format!(
            "  <testcase classname=\"busbench\" name=\"{}\" time=\"0.000000\">\n",
            xml_escape(&name)
        ));
        if let Some(message) = t.failure_message() {
            failures += 1;
            testcases.push_str(&format!(
                "    <failure message=\"{}\">{}</failure>\n",
                xml_escape(&message),
                xml_escape(&format!("{}\n\n{}", name, details))
            ));
        }
        testcases.push_str("  </testcase>\n");
    }

    let mut xml = String::new();
    xml.push_str(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
    xml.push('\n');
    xml.push_str(&format!(
        r#"<testsuite name="{}" tests="{}" failures="{}" errors="{}" time="{:.6}">"#,
        xml_escape(if result.vector.is_empty() {
            "busbench"
        } else {
            result.vector.as_str()
        }),
        tests,
        failures,
        errors,
        time_secs
    ));
    xml.push('\n');
    xml.push_str("  <properties>\n");
    xml.push_str(&format!(
        "    <property name=\"result_schema_version\" value=\"{}\"/>\n",
        xml_escape(RESULT_SCHEMA_VERSION)
    ));
    xml.push_str(&format!(
        "    <property name=\"vector_hash\" value=\"{}\"/>\n",
        xml_escape(&result.vector_hash)
    ));
    xml.push_str("  </properties>\n");
    xml.push_str(&testcases);
    xml.push_str("</testsuite>\n");

    std::fs::write(path, xml)
}
