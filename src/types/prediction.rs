//! Prediction types: ThermalState, StepOutput, PredictedPoint, TrainingReport

use serde::{Deserialize, Serialize};

use super::Millis;

/// Two-sensor thermal state fed back through the step models.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThermalState {
    pub boiler_temp_c: f64,
    pub grouphead_temp_c: f64,
}

impl ThermalState {
    pub fn new(boiler_temp_c: f64, grouphead_temp_c: f64) -> Self {
        Self {
            boiler_temp_c,
            grouphead_temp_c,
        }
    }

    pub fn as_features(&self) -> [f64; 2] {
        [self.boiler_temp_c, self.grouphead_temp_c]
    }

    pub fn is_finite(&self) -> bool {
        self.boiler_temp_c.is_finite() && self.grouphead_temp_c.is_finite()
    }
}

impl From<(f64, f64)> for ThermalState {
    fn from((boiler, grouphead): (f64, f64)) -> Self {
        Self::new(boiler, grouphead)
    }
}

/// What a step model returns for one transition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepOutput {
    /// The model predicts the next state directly
    NextState(ThermalState),
    /// The model predicts the change from the current state
    Delta(ThermalState),
}

impl StepOutput {
    /// Resolve the output against the current state.
    pub fn apply(self, current: ThermalState) -> ThermalState {
        match self {
            StepOutput::NextState(next) => next,
            StepOutput::Delta(delta) => ThermalState::new(
                current.boiler_temp_c + delta.boiler_temp_c,
                current.grouphead_temp_c + delta.grouphead_temp_c,
            ),
        }
    }
}

/// One row of a simulated trajectory.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictedPoint {
    pub time: Millis,
    pub boiler_temp_c: f64,
    pub grouphead_temp_c: f64,
}

impl PredictedPoint {
    pub fn state(&self) -> ThermalState {
        ThermalState::new(self.boiler_temp_c, self.grouphead_temp_c)
    }
}

/// Goodness of fit for one trained model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitScore {
    pub r2: f64,
    pub mse: f64,
    pub sample_count: usize,
}

/// Result of training the thermal-loss models at one resample period.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateReport {
    /// Period label as requested (e.g. "5m", "min")
    pub period: String,
    /// Period actually used after resolving `min`
    pub period_ms: Millis,
    pub boiler: FitScore,
    pub grouphead: FitScore,
    /// Groups skipped because resampling found a gap
    pub skipped_groups: usize,
}
