//! gesha-analysis - Espresso Machine Telemetry Analysis
//!
//! Batch analyses over controller CSV logs.
//!
//! # Usage
//!
//! ```bash
//! # Heat sessions and their pruning summary
//! gesha-analysis sessions --input logs/*.csv --out sessions.csv
//!
//! # Thermal-loss models and a 90-step cool-down trajectory
//! gesha-analysis thermal-loss --input logs/*.csv --out trajectory.csv --model-out model.json
//!
//! # Replay a log through the live feed and wait for the boiler to reach 93 °C
//! gesha-analysis watch --input log.csv --sensor boiler --at-least 93
//!
//! # Thermofilter alignment and the extraction-temperature model
//! gesha-analysis extraction --input logs/*.csv --thermofilter aux/*.csv aux/*.json \
//!     --shots shots.csv --out extraction.csv --summary-out shots-summary.csv
//!
//! # Boiler response curves, one log per heat level
//! gesha-analysis heat-levels --input runs/heat-level-*.csv --out heat-levels.csv
//! ```
//!
//! # Environment Variables
//!
//! - `GESHA_CONFIG`: Path to the analysis TOML (default: ./gesha_analysis.toml)
//! - `RUST_LOG`: Logging level (default: info)

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use gesha_analysis::config::defaults::LONG_DECAY_MIN_DURATION_MS;
use gesha_analysis::config::{self, AnalysisConfig};
use gesha_analysis::ingest::{load_csv, load_csv_files, load_shots, load_thermofilter_files, write_csv};
use gesha_analysis::live::{pump, LiveFeed, ReplaySource, SensorKind, TempCondition};
use gesha_analysis::modeling::{
    extraction_dataset, extraction_shots, feature_row_dataset, fit_and_evaluate, fit_extraction_model,
    fit_heat_sum_model, heat_level_response, preheat_level, summarize_shots, train_candidates, CorrelationEngine,
    HeatLevelRun, LinearModel,
};
use gesha_analysis::pipeline::{
    analyze_sessions, correlation_search, group_training_rows, run_thermal_loss, session_groups,
    session_training_rows,
};
use gesha_analysis::segmentation::group_measurements;
use gesha_analysis::types::{CandidateReport, ExtractionShot, MeasurementSeries, Millis};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "gesha-analysis")]
#[command(about = "Espresso machine telemetry analysis")]
#[command(version)]
struct CliArgs {
    /// Analysis config TOML (overrides GESHA_CONFIG and ./gesha_analysis.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: SubCommand,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(clap::Args, Debug)]
struct InputArgs {
    /// Controller CSV logs, concatenated before de-duplication
    #[arg(short, long, required = true, num_args = 1..)]
    input: Vec<PathBuf>,

    /// Keep only rows logged with the machine switched on
    #[arg(long)]
    powered_only: bool,
}

#[derive(Subcommand, Debug)]
enum SubCommand {
    /// Extract heat sessions and write the session table
    Sessions {
        #[command(flatten)]
        input: InputArgs,
        /// Output CSV
        #[arg(short, long)]
        out: PathBuf,
        /// Write every detected session instead of the pruned set
        #[arg(long)]
        unfiltered: bool,
    },

    /// Write per-measurement feature rows and fit the step regression
    Features {
        #[command(flatten)]
        input: InputArgs,
        #[arg(short, long)]
        out: PathBuf,
        /// Rows around kept sessions only, instead of whole groups
        #[arg(long)]
        per_session: bool,
        /// Save the fitted step model as JSON
        #[arg(long)]
        model_out: Option<PathBuf>,
    },

    /// Train thermal-loss models and simulate a cool-down trajectory
    ThermalLoss {
        #[command(flatten)]
        input: InputArgs,
        /// Trajectory CSV
        #[arg(short, long)]
        out: PathBuf,
        /// Save the trained models as JSON
        #[arg(long)]
        model_out: Option<PathBuf>,
        /// Only train on cool-downs longer than 4 hours
        #[arg(long)]
        long_decay: bool,
    },

    /// Score thermal-loss models across resample periods
    Candidates {
        #[command(flatten)]
        input: InputArgs,
        #[arg(short, long)]
        out: PathBuf,
        /// Periods to try (default: from config)
        #[arg(long, num_args = 1..)]
        periods: Vec<String>,
    },

    /// Fit heater-on time needed for a temperature rise
    HeatSum {
        #[command(flatten)]
        input: InputArgs,
        #[arg(long)]
        model_out: Option<PathBuf>,
    },

    /// Grid search for the rolling window and look-ahead shift
    CorrelationSearch {
        #[command(flatten)]
        input: InputArgs,
        #[arg(short, long)]
        out: PathBuf,
        /// Also score these settle thresholds (ms)
        #[arg(long, num_args = 1..)]
        settle_thresholds: Vec<Millis>,
    },

    /// Replay a log through the live feed and wait for a temperature
    Watch {
        #[command(flatten)]
        input: InputArgs,
        #[arg(long, default_value = "boiler")]
        sensor: String,
        #[arg(long, conflicts_with = "at_most", required_unless_present = "at_most")]
        at_least: Option<f64>,
        #[arg(long)]
        at_most: Option<f64>,
        /// Delay between replayed rows (ms)
        #[arg(long, default_value = "0")]
        delay_ms: u64,
    },

    /// Align thermofilter readings with shots and fit the extraction temperature
    Extraction {
        #[command(flatten)]
        input: InputArgs,
        /// Thermofilter logs: headerless time,temp CSV or JSON
        #[arg(long, required = true, num_args = 1..)]
        thermofilter: Vec<PathBuf>,
        /// Shot table CSV with start_time and end_time columns
        #[arg(long)]
        shots: PathBuf,
        /// Shot start times to leave out
        #[arg(long, num_args = 1..)]
        exclude: Vec<Millis>,
        /// Joined per-shot rows
        #[arg(short, long)]
        out: PathBuf,
        /// Peak temperatures per shot
        #[arg(long)]
        summary_out: Option<PathBuf>,
        #[arg(long)]
        model_out: Option<PathBuf>,
        /// Score a saved model on the aligned shots instead of fitting one
        #[arg(long, conflicts_with = "model_out")]
        model_in: Option<PathBuf>,
    },

    /// Line up boiler step responses recorded at different heat levels
    HeatLevels {
        /// One controller log per run
        #[arg(short, long, required = true, num_args = 1..)]
        input: Vec<PathBuf>,
        /// Long-format response curves
        #[arg(short, long)]
        out: PathBuf,
        /// Peak and rise per run
        #[arg(long)]
        summary_out: Option<PathBuf>,
    },

    /// Print the preheat heat level for a setpoint and grouphead temperature
    PreheatLevel {
        #[arg(long)]
        target: f64,
        #[arg(long)]
        grouphead: f64,
    },

    /// Write the effective configuration as TOML
    InitConfig {
        #[arg(short, long, default_value = "gesha_analysis.toml")]
        out: PathBuf,
    },
}

// ============================================================================
// Output rows
// ============================================================================

/// Flat candidate row for CSV export.
#[derive(Debug, Serialize)]
struct CandidateRow {
    period: String,
    period_ms: Millis,
    boiler_r2: f64,
    boiler_mse: f64,
    grouphead_r2: f64,
    grouphead_mse: f64,
    samples: usize,
    skipped_groups: usize,
}

impl From<&CandidateReport> for CandidateRow {
    fn from(r: &CandidateReport) -> Self {
        Self {
            period: r.period.clone(),
            period_ms: r.period_ms,
            boiler_r2: r.boiler.r2,
            boiler_mse: r.boiler.mse,
            grouphead_r2: r.grouphead.r2,
            grouphead_mse: r.grouphead.mse,
            samples: r.boiler.sample_count,
            skipped_groups: r.skipped_groups,
        }
    }
}

/// One joined extraction row for CSV export.
#[derive(Debug, Serialize)]
struct ExtractionRow {
    start_time: Millis,
    time: Millis,
    boiler_temp_c: f64,
    grouphead_temp_c: f64,
    thermofilter_temp_c: Option<f64>,
    heat_level: f64,
}

fn extraction_rows(shots: &[ExtractionShot]) -> Vec<ExtractionRow> {
    shots
        .iter()
        .flat_map(|shot| {
            shot.rows.iter().map(move |m| ExtractionRow {
                start_time: shot.start_time,
                time: m.time,
                boiler_temp_c: m.boiler_temp_c,
                grouphead_temp_c: m.grouphead_temp_c,
                thermofilter_temp_c: m.thermofilter_temp_c,
                heat_level: m.heat_level,
            })
        })
        .collect()
}

// ============================================================================
// Commands
// ============================================================================

fn load_input(input: &InputArgs) -> Result<MeasurementSeries> {
    let series = load_csv_files(&input.input, input.powered_only).context("Failed to load input CSV")?;
    if series.is_empty() {
        bail!("No measurements loaded from {} file(s)", input.input.len());
    }
    Ok(series)
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    info!(path = %path.display(), "Wrote model artifact");
    Ok(())
}

fn run_sessions(cfg: &AnalysisConfig, input: &InputArgs, out: &Path, unfiltered: bool) -> Result<()> {
    let series = load_input(input)?;
    let analysis = analyze_sessions(&series, cfg)?;
    let f = &analysis.filtered;
    info!(
        start_lag = f.rejected_start_lag,
        stop_lag = f.rejected_stop_lag,
        temp_initial = f.rejected_temp_initial,
        saturated = f.rejected_saturated,
        "Session rejections"
    );
    let table = if unfiltered { &analysis.sessions } else { &f.kept };
    write_csv(out, table)?;
    Ok(())
}

fn run_features(
    cfg: &AnalysisConfig,
    input: &InputArgs,
    out: &Path,
    per_session: bool,
    model_out: Option<&Path>,
) -> Result<()> {
    let series = load_input(input)?;
    let rows = if per_session {
        let analysis = analyze_sessions(&series, cfg)?;
        session_training_rows(&analysis, cfg)
    } else {
        let (groups, _) = session_groups(&series, cfg)?;
        group_training_rows(&groups, cfg)
    };
    write_csv(out, &rows)?;

    let dataset = feature_row_dataset(&rows)?;
    let (model, score) = fit_and_evaluate(&dataset, cfg.prediction.holdout_fraction)?;
    info!(
        rows = rows.len(),
        r2 = score.r2,
        mse = score.mse,
        coefficients = ?model.coefficients,
        "Fitted step regression"
    );
    if let Some(path) = model_out {
        model.save(path)?;
    }
    Ok(())
}

fn run_thermal(
    cfg: &AnalysisConfig,
    input: &InputArgs,
    out: &Path,
    model_out: Option<&Path>,
    long_decay: bool,
) -> Result<()> {
    let series = load_input(input)?;
    let mut cfg = cfg.clone();
    if long_decay {
        cfg.grouping.min_duration_ms = Some(LONG_DECAY_MIN_DURATION_MS);
    }
    let start_time = chrono::Utc::now().timestamp_millis();
    let run = run_thermal_loss(&series, &cfg, start_time)?;

    if let Some(last) = run.trajectory.last() {
        info!(
            steps = run.trajectory.len() - 1,
            final_boiler_c = last.boiler_temp_c,
            final_grouphead_c = last.grouphead_temp_c,
            "Simulated cool-down"
        );
    }
    write_csv(out, &run.trajectory)?;
    if let Some(path) = model_out {
        write_json(path, &run.model)?;
    }
    Ok(())
}

fn run_candidates(cfg: &AnalysisConfig, input: &InputArgs, out: &Path, periods: &[String]) -> Result<()> {
    let series = load_input(input)?;
    let groups = group_measurements(&series, &cfg.grouping);
    let periods = if periods.is_empty() {
        cfg.resampling.candidate_periods.as_slice()
    } else {
        periods
    };

    let reports = train_candidates(&groups, periods, cfg.prediction.holdout_fraction);
    if reports.is_empty() {
        bail!("No candidate period produced a model");
    }
    for r in &reports {
        info!(
            period = %r.period,
            boiler_r2 = r.boiler.r2,
            grouphead_r2 = r.grouphead.r2,
            skipped = r.skipped_groups,
            "Candidate"
        );
    }
    let rows: Vec<CandidateRow> = reports.iter().map(CandidateRow::from).collect();
    write_csv(out, &rows)?;
    Ok(())
}

fn run_heat_sum(cfg: &AnalysisConfig, input: &InputArgs, model_out: Option<&Path>) -> Result<()> {
    let series = load_input(input)?;
    let analysis = analyze_sessions(&series, cfg)?;
    let (model, score) = fit_heat_sum_model(&analysis.filtered.kept, cfg.prediction.holdout_fraction)?;
    info!(
        sessions = analysis.filtered.kept.len(),
        r2 = score.r2,
        coefficients = ?model.coefficients,
        intercept = model.intercept,
        "Heat-sum model"
    );
    if let Some(path) = model_out {
        model.save(path)?;
    }
    Ok(())
}

fn run_correlation(cfg: &AnalysisConfig, input: &InputArgs, out: &Path, settle: &[Millis]) -> Result<()> {
    let series = load_input(input)?;
    let (groups, _) = session_groups(&series, cfg)?;
    let results = correlation_search(&groups, cfg);
    write_csv(out, &results)?;

    if !settle.is_empty() {
        let scores = CorrelationEngine::search_settle_threshold(&groups, settle, &cfg.sessions);
        for s in &scores {
            info!(
                settle_threshold_ms = s.settle_threshold_ms,
                r = s.r_value,
                sessions = s.session_count,
                "Settle threshold"
            );
        }
    }
    Ok(())
}

async fn run_watch(
    cfg: &AnalysisConfig,
    input: &InputArgs,
    sensor: &str,
    condition: TempCondition,
    delay: Duration,
    cancel: CancellationToken,
) -> Result<()> {
    let sensor: SensorKind = sensor.parse()?;
    let series = load_input(input)?;

    let feed = LiveFeed::spawn(cfg.live.history_capacity, cancel.clone());
    let sender = feed.sender();
    let mut source = ReplaySource::new(series.into_rows(), delay);
    let pump_cancel = cancel.clone();
    let mut pump_task = tokio::spawn(async move { pump(&mut source, &sender, &pump_cancel).await });

    let timeout = Duration::from_millis(cfg.live.wait_timeout_ms);
    let (waited, pumped) = {
        let wait = feed.wait_for_temp(sensor, condition, timeout, &cancel);
        tokio::pin!(wait);
        tokio::select! {
            outcome = &mut wait => (Some(outcome), None),
            pumped = &mut pump_task => (None, Some(pumped)),
        }
    };

    let pumped = match pumped {
        Some(p) => p,
        None => {
            cancel.cancel();
            pump_task.await
        }
    };
    match pumped {
        Ok(Ok(forwarded)) => info!(forwarded, "Replay finished"),
        Ok(Err(e)) => warn!(error = %e, "Replay ended with error"),
        Err(e) => warn!(error = %e, "Replay task failed"),
    }

    let reading = match waited {
        Some(outcome) => outcome.with_context(|| format!("{sensor} never satisfied {condition:?}"))?,
        // Replay ran dry first: the waiter only sees the latest value, so
        // search everything the feed buffered
        None => feed
            .history(sensor)
            .await?
            .into_iter()
            .find(|r| condition.is_met(r.value))
            .with_context(|| format!("{sensor} never satisfied {condition:?} in the replayed log"))?,
    };
    let snapshot = feed.snapshot();
    feed.shutdown().await;

    info!(
        sensor = %sensor,
        time = reading.time,
        value = reading.value,
        applied = snapshot.sequence,
        latest = ?snapshot.latest(sensor).map(|r| r.value),
        "Condition met"
    );
    println!("{}", reading.value);
    Ok(())
}

struct ExtractionArgs<'a> {
    thermofilter: &'a [PathBuf],
    shots: &'a Path,
    exclude: &'a [Millis],
    out: &'a Path,
    summary_out: Option<&'a Path>,
    model_out: Option<&'a Path>,
    model_in: Option<&'a Path>,
}

fn run_extraction(cfg: &AnalysisConfig, input: &InputArgs, args: &ExtractionArgs<'_>) -> Result<()> {
    let series = load_input(input)?;
    let readings = load_thermofilter_files(args.thermofilter).context("Failed to load thermofilter logs")?;
    let mut shots = load_shots(args.shots).context("Failed to load shot table")?;
    shots.retain(|s| !args.exclude.contains(&s.start_time));

    let aligned = extraction_shots(&series, &readings, &shots, &cfg.extraction)?;
    if aligned.is_empty() {
        bail!("No shot overlapped both thermofilter readings and telemetry");
    }
    write_csv(args.out, &extraction_rows(&aligned))?;

    let summary = summarize_shots(&aligned);
    for s in &summary {
        info!(
            start_time = s.start_time,
            grouphead_c = s.max_grouphead_temp_c,
            boiler_c = s.max_boiler_temp_c,
            thermofilter_c = s.max_thermofilter_temp_c,
            "Shot"
        );
    }
    if let Some(path) = args.summary_out {
        write_csv(path, &summary)?;
    }

    if let Some(path) = args.model_in {
        let model = LinearModel::load(path)?;
        let score = model.score(&extraction_dataset(&aligned)?)?;
        info!(
            path = %path.display(),
            r2 = score.r2,
            mse = score.mse,
            samples = score.sample_count,
            "Scored saved extraction model"
        );
        return Ok(());
    }

    let (model, score) = fit_extraction_model(&aligned, cfg.prediction.holdout_fraction)?;
    info!(
        r2 = score.r2,
        mse = score.mse,
        coefficients = ?model.coefficients,
        intercept = model.intercept,
        "Extraction temperature model"
    );
    if let Some(path) = args.model_out {
        model.save(path)?;
    }
    Ok(())
}

fn run_heat_levels(cfg: &AnalysisConfig, inputs: &[PathBuf], out: &Path, summary_out: Option<&Path>) -> Result<()> {
    let runs = inputs
        .iter()
        .map(|path| {
            load_csv(path)
                .map(HeatLevelRun::from_series)
                .with_context(|| format!("Failed to load {}", path.display()))
        })
        .collect::<Result<Vec<_>>>()?;

    let response = heat_level_response(&runs, &cfg.heat_levels)?;
    for s in &response.summaries {
        info!(
            heat_level = s.heat_level,
            rise_c = s.rise_c,
            peak_offset_s = s.peak_offset_s,
            "Heat-level run"
        );
    }
    write_csv(out, &response.points)?;
    if let Some(path) = summary_out {
        write_csv(path, &response.summaries)?;
    }
    Ok(())
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn init_logging(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init(),
        LogFormat::Json => tracing_subscriber::fmt().with_env_filter(filter).json().init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = CliArgs::parse();
    init_logging(args.log_format);

    let analysis_config = match &args.config {
        Some(path) => AnalysisConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => AnalysisConfig::load(),
    };
    config::init(analysis_config);
    let cfg = config::get();

    // Graceful shutdown via Ctrl+C
    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received Ctrl+C, shutting down");
        shutdown_token.cancel();
    });

    match &args.command {
        SubCommand::Sessions { input, out, unfiltered } => run_sessions(cfg, input, out, *unfiltered),
        SubCommand::Features {
            input,
            out,
            per_session,
            model_out,
        } => run_features(cfg, input, out, *per_session, model_out.as_deref()),
        SubCommand::ThermalLoss {
            input,
            out,
            model_out,
            long_decay,
        } => run_thermal(cfg, input, out, model_out.as_deref(), *long_decay),
        SubCommand::Candidates { input, out, periods } => run_candidates(cfg, input, out, periods),
        SubCommand::HeatSum { input, model_out } => run_heat_sum(cfg, input, model_out.as_deref()),
        SubCommand::CorrelationSearch {
            input,
            out,
            settle_thresholds,
        } => run_correlation(cfg, input, out, settle_thresholds),
        SubCommand::Watch {
            input,
            sensor,
            at_least,
            at_most,
            delay_ms,
        } => {
            let condition = match (at_least, at_most) {
                (Some(x), _) => TempCondition::AtLeast(*x),
                (None, Some(x)) => TempCondition::AtMost(*x),
                (None, None) => bail!("one of --at-least or --at-most is required"),
            };
            run_watch(
                cfg,
                input,
                sensor,
                condition,
                Duration::from_millis(*delay_ms),
                cancel_token,
            )
            .await
        }
        SubCommand::Extraction {
            input,
            thermofilter,
            shots,
            exclude,
            out,
            summary_out,
            model_out,
            model_in,
        } => run_extraction(
            cfg,
            input,
            &ExtractionArgs {
                thermofilter,
                shots,
                exclude,
                out,
                summary_out: summary_out.as_deref(),
                model_out: model_out.as_deref(),
                model_in: model_in.as_deref(),
            },
        ),
        SubCommand::HeatLevels {
            input,
            out,
            summary_out,
        } => run_heat_levels(cfg, input, out, summary_out.as_deref()),
        SubCommand::PreheatLevel { target, grouphead } => {
            let level = preheat_level(*target, *grouphead);
            info!(target_c = *target, grouphead_c = *grouphead, level, "Preheat level");
            println!("{level:.3}");
            Ok(())
        }
        SubCommand::InitConfig { out } => {
            cfg.save_to_file(out)?;
            Ok(())
        }
    }
}
