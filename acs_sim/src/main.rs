//! Facility ACS Simulator CLI
//!
//! Run a facility scenario with repair crews, queue traffic and the event
//! clock, then print a summary.

use acs_core::{debug_from_env, FacilityConfig};
use acs_sim::{RunResult, ScenarioId, SimRunner};
use clap::Parser;
use std::time::Duration;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// Facility ACS simulation CLI
#[derive(Parser, Debug)]
#[command(name = "acs-sim")]
#[command(about = "Run facility control scenarios", long_about = None)]
struct Args {
    /// Master seed for strategy noise (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Scenario to run (battery, magnet_quench, all)
    #[arg(short = 'S', long, default_value = "battery")]
    scenario: String,

    /// Maximum facility time per run in seconds
    #[arg(short, long, default_value = "60")]
    duration: f64,

    /// Worker pool size
    #[arg(short, long, default_value = "64")]
    pool_size: usize,

    /// Number of power cells
    #[arg(short, long, default_value = "3")]
    cells: usize,

    /// Number of repair teams
    #[arg(short, long, default_value = "3")]
    teams: usize,

    /// Multiplier on subsystem wear
    #[arg(long, default_value = "1.0")]
    wear_scale: f64,

    /// Run on the wall clock instead of virtual time
    #[arg(long)]
    realtime: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,

    /// Expose scenario flags on the status report (also set by DEBUG)
    #[arg(long)]
    debug: bool,
}

fn main() {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", err);
    }

    if !args.json {
        info!("Facility ACS Simulator v0.1.0");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    let scenarios: Vec<ScenarioId> = if args.scenario == "all" {
        ScenarioId::all()
    } else {
        match args.scenario.parse() {
            Ok(id) => vec![id],
            Err(e) => {
                eprintln!("Error: {}", e);
                eprintln!("Available scenarios: battery, magnet_quench, all");
                std::process::exit(2);
            }
        }
    };

    let seed = if args.seed == 0 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(42)
    } else {
        args.seed
    };

    let config = FacilityConfig {
        seed,
        cells: FacilityConfig::numbered("cell-", args.cells),
        teams: FacilityConfig::numbered("T", args.teams),
        pool_size: args.pool_size,
        wear_scale: args.wear_scale,
        debug: args.debug || debug_from_env(),
        ..FacilityConfig::default()
    };
    let debug = config.debug;
    let duration = Duration::try_from_secs_f64(args.duration).unwrap_or_else(|_| {
        eprintln!("Error: invalid duration {}", args.duration);
        std::process::exit(2);
    });
    let runner = SimRunner::new(config).with_duration(duration);

    // Virtual time unless asked otherwise: the clock jumps whenever every
    // task is waiting.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .start_paused(!args.realtime)
        .build();
    let runtime = match runtime {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("Failed to start runtime: {}", err);
            std::process::exit(2);
        }
    };

    let mut results: Vec<RunResult> = Vec::new();
    for scenario in &scenarios {
        match runtime.block_on(runner.run(*scenario)) {
            Ok(result) => {
                if !args.json {
                    report(&result, debug);
                }
                results.push(result);
            }
            Err(err) => {
                error!("✗ {} could not run: {}", scenario.name(), err);
                std::process::exit(2);
            }
        }
    }

    let failed = results.iter().filter(|r| !r.passed).count();
    if args.json {
        let summary = serde_json::json!({
            "total": results.len(),
            "passed": results.len() - failed,
            "failed": failed,
            "results": results,
        });
        match serde_json::to_string_pretty(&summary) {
            Ok(text) => println!("{}", text),
            Err(err) => error!("Failed to encode summary: {}", err),
        }
    } else {
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        if failed == 0 {
            info!("✅ All {} scenario runs passed!", results.len());
        } else {
            error!("❌ {}/{} scenario runs failed!", failed, results.len());
        }
    }

    // Exit with proper code for CI
    if failed > 0 {
        std::process::exit(1);
    }
}

fn report(result: &RunResult, debug: bool) {
    if result.passed {
        info!(
            "✓ {} (seed={}) WON at t={:.1}s",
            result.scenario.name(),
            result.seed,
            result.final_time_secs
        );
    } else {
        error!(
            "✗ {} (seed={}) LOST: {}",
            result.scenario.name(),
            result.seed,
            result.failure_reason.as_deref().unwrap_or("unknown")
        );
    }
    info!(
        "  crews sent={} repairs={} malformed messages={} dropped tasks={}",
        result.metrics.dispatches,
        result.metrics.repairs,
        result.metrics.malformed_messages,
        result.metrics.pool_dropped
    );
    for cell in &result.cells {
        info!(
            "  {} on={} alarm={} durability={:.1}",
            cell.name, cell.is_on, cell.alarm, cell.durability
        );
    }
    if debug {
        info!("  is_end={} is_win={}", result.is_end, result.is_win);
    }
}
