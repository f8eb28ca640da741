//! gesha-analysis: Espresso Machine Telemetry Analysis
//!
//! Offline analysis of boiler controller logs: contiguity grouping,
//! resampling, heat-session segmentation, lag and plateau features, linear
//! step models, and iterative trajectory prediction.
//!
//! ## Architecture
//!
//! - **Ingest**: CSV logs into an ordered, de-duplicated `MeasurementSeries`
//! - **Segmentation**: grouping, resampling, session bounds, session features
//! - **Modeling**: datasets, linfa regressions, correlation search, `predict_series`
//! - **Pipeline**: batch drivers for the heat-session and thermal-loss analyses
//! - **Live**: transport-independent core of the remote-control client
//! - **Simulation**: seeded synthetic boiler traces

pub mod config;
pub mod ingest;
pub mod live;
pub mod modeling;
pub mod pipeline;
pub mod segmentation;
pub mod simulation;
pub mod types;

// Re-export configuration
pub use config::AnalysisConfig;

// Re-export commonly used types
pub use types::{
    CandidateReport, FitScore, HeatSession, HeatSessionBounds, Measurement, MeasurementFeatureRow,
    MeasurementGroup, MeasurementSeries, Millis, PredictedPoint, ResampledSeries, StepOutput, ThermalState,
};

// Re-export error types
pub use ingest::IngestError;
pub use live::LiveError;
pub use modeling::ModelError;
pub use segmentation::SegmentationError;

// Re-export pipeline entry points
pub use modeling::{predict_series, StepModel};
pub use pipeline::{analyze_sessions, run_thermal_loss, SessionAnalysis, ThermalLossRun};
pub use segmentation::{group_measurements, heat_session_bounds, resample};
