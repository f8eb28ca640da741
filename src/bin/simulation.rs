//! Synthetic Boiler Traces
//!
//! Generates controller-like CSV logs for exercising the analyses without a
//! machine. Scenarios:
//! - `sessions`: idle machine hovering near brew temperature with random heat
//!   pulses (heat-session pipeline)
//! - `cooldown`: a hot machine left to cool for hours, optionally split by
//!   logging outages (thermal-loss pipeline)
//!
//! # Usage
//! ```bash
//! ./simulation --scenario sessions --minutes 60 --seed 7 --out sessions.csv
//! ./simulation --scenario cooldown --minutes 480 --period-ms 5000 --out cooldown.csv
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::info;

use gesha_analysis::ingest::{write_csv, write_csv_to};
use gesha_analysis::simulation::{generate_trace, BoilerParams, HeatPulse, TraceConfig};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Scenario {
    Sessions,
    Cooldown,
}

#[derive(Parser, Debug)]
#[command(name = "gesha-simulation")]
#[command(about = "Synthetic espresso boiler telemetry")]
#[command(version)]
struct Args {
    #[arg(long, value_enum, default_value_t = Scenario::Sessions)]
    scenario: Scenario,

    /// Trace length in minutes
    #[arg(short, long, default_value = "60", value_parser = clap::value_parser!(u32).range(1..=7 * 24 * 60))]
    minutes: u32,

    /// Sample period in ms
    #[arg(long, default_value = "100", value_parser = clap::value_parser!(i64).range(1..))]
    period_ms: i64,

    /// Random seed for reproducibility
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Number of logging outages spread evenly across the trace
    #[arg(long, default_value = "0")]
    outages: u32,

    /// Reported temperature noise (°C std-dev)
    #[arg(long, default_value = "0.02")]
    noise: f64,

    /// Output CSV (stdout when omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,
}

// ============================================================================
// Scenarios
// ============================================================================

fn trace_config(args: &Args) -> TraceConfig {
    let duration_ms = i64::from(args.minutes) * 60_000;
    let params = BoilerParams {
        noise_std_c: args.noise,
        ..BoilerParams::default()
    };

    let (initial_boiler_c, initial_grouphead_c, pulses) = match args.scenario {
        Scenario::Sessions => {
            // Roughly one pulse every 1-3 minutes keeps the boiler near 90 °C
            let expected = usize::try_from(duration_ms / 90_000).unwrap_or(0);
            let pulses = HeatPulse::random(args.seed, expected, (60_000, 150_000), (3_000, 15_000), (0.3, 1.0));
            (90.0, 80.0, pulses)
        }
        Scenario::Cooldown => (95.0, 85.0, Vec::new()),
    };

    // One 60 s outage in the middle of each equal slice
    let slices = i64::from(args.outages) + 1;
    let outages = (1..slices)
        .map(|k| {
            let at = duration_ms * k / slices;
            (at, at + 60_000)
        })
        .collect();

    TraceConfig {
        seed: args.seed,
        start_time: chrono::Utc::now().timestamp_millis(),
        period_ms: args.period_ms,
        duration_ms,
        initial_boiler_c,
        initial_grouphead_c,
        pulses,
        outages,
        params,
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = trace_config(&args);
    info!(
        scenario = ?args.scenario,
        minutes = args.minutes,
        period_ms = args.period_ms,
        pulses = config.pulses.len(),
        outages = config.outages.len(),
        seed = args.seed,
        "Generating trace"
    );

    let rows = generate_trace(&config)?;
    match &args.out {
        Some(path) => write_csv(path, &rows)?,
        None => write_csv_to(std::io::stdout().lock(), &rows).context("Failed to write CSV to stdout")?,
    }
    Ok(())
}
