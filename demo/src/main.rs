//! Pre-Authorization Adjudication Engine: Demo CLI
//!
//! Runs the demo scenarios against the reference runtime, or adjudicates a
//! request read from a JSON file.
//!
//! Usage:
//!   cargo run -p demo -- run-all
//!   cargo run -p demo -- scenarios
//!   cargo run -p demo -- scenario knee-replacement
//!   cargo run -p demo -- adjudicate --file request.json --policy-start 2024-01-01
//!   cargo run -p demo -- --config my-rules.toml run-all

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use preauth_contracts::error::{PreauthError, PreauthResult};
use preauth_ref::{default_config, scenarios, Runtime};
use preauth_rules::EngineConfig;

// ── CLI definition ────────────────────────────────────────────────────────────

/// Layered pre-authorization adjudication demo.
///
/// Every request passes health-declaration screening, the rules engine,
/// policy retrieval and clinical reasoning (only when rules are uncertain),
/// four validators, and human-review routing.
#[derive(Parser)]
#[command(
    name = "demo",
    about = "Pre-authorization adjudication engine demo",
    long_about = "Runs pre-authorization demo scenarios showing health-declaration screening,\n\
                  rule short-circuits, policy-guided reasoning, validators, review routing,\n\
                  and decision-trace integrity."
)]
struct Cli {
    /// Engine configuration (TOML). Defaults to the bundled reference config.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run every demo scenario in sequence and print a summary.
    RunAll,
    /// List the demo scenarios.
    Scenarios,
    /// Run a single demo scenario by name.
    Scenario {
        name: String,
    },
    /// Adjudicate a clinical request from a JSON file.
    Adjudicate {
        #[arg(long)]
        file: PathBuf,
        /// Policy start date (YYYY-MM-DD). Defaults to the configured policy age.
        #[arg(long, value_parser = parse_policy_start)]
        policy_start: Option<NaiveDate>,
        /// Print the full result as JSON instead of the report.
        #[arg(long)]
        json: bool,
    },
}

fn parse_policy_start(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| format!("expected YYYY-MM-DD: {e}"))
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() {
    // Set RUST_LOG=debug for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Command::Scenarios => {
            list_scenarios();
            Ok(true)
        }
        Command::RunAll => {
            print_banner();
            build_runtime(cli.config.as_deref()).and_then(|rt| run_all(&rt))
        }
        Command::Scenario { name } => {
            print_banner();
            build_runtime(cli.config.as_deref()).and_then(|rt| run_one(&rt, &name))
        }
        Command::Adjudicate { file, policy_start, json } => build_runtime(cli.config.as_deref())
            .and_then(|rt| adjudicate_file(&rt, &file, policy_start, json)),
    };

    match result {
        Ok(true) => {}
        Ok(false) => {
            eprintln!("One or more scenarios did not reach their expected decision.");
            std::process::exit(2);
        }
        Err(e) => {
            eprintln!("Demo error: {}", e);
            std::process::exit(1);
        }
    }
}

// ── Runtime ───────────────────────────────────────────────────────────────────

fn build_runtime(config: Option<&Path>) -> PreauthResult<Runtime> {
    let config = match config {
        Some(path) => {
            info!(path = %path.display(), "loading engine configuration");
            EngineConfig::from_file(path)?
        }
        None => default_config()?,
    };
    Runtime::builder().config(config).seed_demo_records().build()
}

// ── Commands ──────────────────────────────────────────────────────────────────

fn list_scenarios() {
    println!("Available scenarios:");
    println!();
    for s in scenarios::catalog() {
        println!("  {:<20} {:<8} {}", s.name, s.expected.label(), s.summary);
    }
    println!();
}

fn run_all(rt: &Runtime) -> PreauthResult<bool> {
    let outcomes = scenarios::run_all(rt)?;
    let matched = outcomes.iter().filter(|o| o.matched()).count();
    println!("{matched}/{} scenarios reached their expected decision.", outcomes.len());
    Ok(matched == outcomes.len())
}

fn run_one(rt: &Runtime, name: &str) -> PreauthResult<bool> {
    let scenario = scenarios::find(name).ok_or_else(|| PreauthError::InvalidRequest {
        reason: format!("no scenario named '{name}' (try `demo scenarios`)"),
    })?;
    let outcome = scenarios::run(rt, &scenario)?;
    Ok(outcome.matched())
}

fn adjudicate_file(rt: &Runtime, file: &Path, policy_start: Option<NaiveDate>, json: bool) -> PreauthResult<bool> {
    let raw = std::fs::read_to_string(file).map_err(|e| PreauthError::InvalidRequest {
        reason: format!("cannot read {}: {e}", file.display()),
    })?;
    let result = rt.adjudicate_json(&raw, policy_start)?;

    if json {
        let rendered = serde_json::to_string_pretty(&result).map_err(|e| PreauthError::InvalidRequest {
            reason: format!("result could not be serialized: {e}"),
        })?;
        println!("{rendered}");
    } else {
        print_banner();
        scenarios::report::print_result(&result);
        if !rt.verify_trace(&result) {
            eprintln!("Decision trace failed verification.");
            return Ok(false);
        }
    }
    Ok(true)
}

// ── Banner ────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("Pre-Authorization Adjudication Engine");
    println!("Reference Demo");
    println!("=====================================");
    println!();
    println!("Adjudication layers per request:");
    println!("  [1] Health declaration: undeclared or pre-existing conditions stop the pipeline");
    println!("  [2] Rules engine: exclusions, coverage, limits; a decisive rule ends adjudication");
    println!("  [3] Policy retrieval + clinical reasoning, blended by policy relevance");
    println!("  [4] Validators: medical necessity, patient history, financial risk, fraud");
    println!("  [5] Human review routing + SHA-256 hash-chained decision trace");
    println!();
}
