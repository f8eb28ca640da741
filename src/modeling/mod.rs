//! Regression and trajectory simulation
//!
//! ## Architecture
//!
//! ```text
//! ResampledSeries ──► dataset (X, y) ──► regression (linfa OLS) ──► LinearModel
//!                                                                      │
//!                  ThermalState ──► StepModel::step ◄────────────────┘
//!                        ▲                 │
//!                        └── predict_series┘
//! ```

pub mod correlation;
pub mod dataset;
pub mod extraction;
pub mod heat_level;
pub mod predictor;
pub mod regression;
pub mod training;

pub use correlation::{CorrelationCandidate, CorrelationEngine, SettleCandidate};
pub use dataset::{
    delta_dataset, feature_row_dataset, heat_sum_dataset, transition_dataset, Column, RegressionDataset, Target,
};
pub use extraction::{extraction_dataset, extraction_shots, fit_extraction_model, summarize_shots};
pub use heat_level::{
    heat_level_response, preheat_level, HeatLevelPoint, HeatLevelResponse, HeatLevelRun, HeatLevelSummary,
};
pub use predictor::{predict_series, JointDeltaModel, PerSensorModel, StepModel, TrainedStepModel};
pub use regression::{fit_and_evaluate, LinearModel};
pub use training::{fit_heat_sum_model, resample_groups, train_candidates, train_thermal_loss, ThermalLossModel};

use std::path::PathBuf;
use thiserror::Error;

use crate::segmentation::SegmentationError;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Model fit failed: {0}")]
    Fit(String),

    #[error("Model inference failed: {0}")]
    Inference(String),

    #[error("Non-finite prediction at step {step}")]
    NonFinite { step: usize },

    #[error("Dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("Insufficient samples: need {needed}, found {found}")]
    InsufficientSamples { needed: usize, found: usize },

    #[error("Model artifact error: {0}")]
    Artifact(#[from] serde_json::Error),

    #[error("Model I/O error ({}): {1}", .0.display())]
    Io(PathBuf, #[source] std::io::Error),

    #[error(transparent)]
    Segmentation(#[from] SegmentationError),
}
