//! Shared data structures for the telemetry analysis pipeline
//!
//! - Ingestion: Measurement, MeasurementSeries
//! - Grouping / resampling: MeasurementGroup, ResampledSeries
//! - Segmentation: HeatSessionBounds, HeatSession, MeasurementFeatureRow
//! - Prediction: ThermalState, StepOutput, PredictedPoint, CandidateReport
//! - Extraction: ShotWindow, ThermofilterReading, ExtractionShot, ExtractionSummary

mod measurement;
mod prediction;
mod session;
mod shot;

pub use measurement::*;
pub use prediction::*;
pub use session::*;
pub use shot::*;
