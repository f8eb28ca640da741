//! Iterative prediction stepping
//!
//! Step models only ever learn one transition. `predict_series` feeds each
//! prediction back in as the next input to reconstruct a full trajectory.

use serde::{Deserialize, Serialize};

use super::dataset::{delta_dataset, transition_dataset, Column, RegressionDataset, Target};
use super::regression::{fit_and_evaluate, LinearModel};
use super::ModelError;
use crate::types::{FitScore, Millis, PredictedPoint, ResampledSeries, StepOutput, ThermalState};

/// One-step transition model.
pub trait StepModel {
    fn step(&self, state: ThermalState) -> Result<StepOutput, ModelError>;
}

impl<F> StepModel for F
where
    F: Fn(ThermalState) -> Result<StepOutput, ModelError>,
{
    fn step(&self, state: ThermalState) -> Result<StepOutput, ModelError> {
        self(state)
    }
}

/// Simulate `count` steps from `initial`.
///
/// Returns `count + 1` points; the first is `initial` at `start_time`. Any
/// model error or non-finite state aborts the whole run.
pub fn predict_series<M>(
    model: &M,
    initial: ThermalState,
    start_time: Millis,
    time_increment: Millis,
    count: usize,
) -> Result<Vec<PredictedPoint>, ModelError>
where
    M: StepModel + ?Sized,
{
    if !initial.is_finite() {
        return Err(ModelError::NonFinite { step: 0 });
    }

    let mut points = Vec::with_capacity(count + 1);
    let mut state = initial;
    let mut time = start_time;
    points.push(point(time, state));

    for step in 1..=count {
        state = model.step(state)?.apply(state);
        if !state.is_finite() {
            return Err(ModelError::NonFinite { step });
        }
        time += time_increment;
        points.push(point(time, state));
    }

    Ok(points)
}

fn point(time: Millis, state: ThermalState) -> PredictedPoint {
    PredictedPoint {
        time,
        boiler_temp_c: state.boiler_temp_c,
        grouphead_temp_c: state.grouphead_temp_c,
    }
}

const STATE_COLUMNS: [Column; 2] = [Column::BoilerTempC, Column::GroupheadTempC];

// ============================================================================
// Per-sensor model
// ============================================================================

/// Two independent linear models over `[boiler, grouphead]`, one per sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerSensorModel {
    pub boiler: LinearModel,
    pub grouphead: LinearModel,
    /// Whether the models predict deltas or the next state directly
    #[serde(default)]
    pub target: Target,
}

/// Fit result with hold-out scores per sensor.
#[derive(Debug, Clone)]
pub struct TrainedStepModel<M> {
    pub model: M,
    pub boiler_score: FitScore,
    pub grouphead_score: FitScore,
}

impl PerSensorModel {
    pub fn train(
        groups: &[ResampledSeries],
        target: Target,
        holdout_fraction: f64,
    ) -> Result<TrainedStepModel<Self>, ModelError> {
        let dataset = |y_col: Column| -> Result<RegressionDataset, ModelError> {
            match target {
                Target::Delta => delta_dataset(groups, &STATE_COLUMNS, y_col),
                Target::NextState => transition_dataset(groups, &STATE_COLUMNS, y_col, target),
            }
        };
        let boiler_ds = dataset(Column::BoilerTempC)?;
        let grouphead_ds = dataset(Column::GroupheadTempC)?;
        let (boiler, boiler_score) = fit_and_evaluate(&boiler_ds, holdout_fraction)?;
        let (grouphead, grouphead_score) = fit_and_evaluate(&grouphead_ds, holdout_fraction)?;

        Ok(TrainedStepModel {
            model: Self {
                boiler,
                grouphead,
                target,
            },
            boiler_score,
            grouphead_score,
        })
    }
}

impl StepModel for PerSensorModel {
    fn step(&self, state: ThermalState) -> Result<StepOutput, ModelError> {
        let x = state.as_features();
        let out = ThermalState::new(self.boiler.predict_one(&x)?, self.grouphead.predict_one(&x)?);
        Ok(match self.target {
            Target::Delta => StepOutput::Delta(out),
            Target::NextState => StepOutput::NextState(out),
        })
    }
}

// ============================================================================
// Joint model
// ============================================================================

/// One multi-output linear model predicting both deltas.
///
/// Least squares decouples per output, so each row of `coefficients` is
/// fitted independently; the shared feature layout is what makes it joint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointDeltaModel {
    /// Output-major: `coefficients[output][feature]`
    pub coefficients: [[f64; 2]; 2],
    pub intercepts: [f64; 2],
}

impl JointDeltaModel {
    pub fn train(groups: &[ResampledSeries], holdout_fraction: f64) -> Result<TrainedStepModel<Self>, ModelError> {
        let trained = PerSensorModel::train(groups, Target::Delta, holdout_fraction)?;
        let model = Self::from_outputs(&trained.model.boiler, &trained.model.grouphead)?;
        Ok(TrainedStepModel {
            model,
            boiler_score: trained.boiler_score,
            grouphead_score: trained.grouphead_score,
        })
    }

    /// Stack two single-output models sharing `[boiler, grouphead]` features.
    pub fn from_outputs(boiler: &LinearModel, grouphead: &LinearModel) -> Result<Self, ModelError> {
        let row = |m: &LinearModel| -> Result<[f64; 2], ModelError> {
            match m.coefficients.as_slice() {
                [a, b] => Ok([*a, *b]),
                other => Err(ModelError::DimensionMismatch {
                    expected: 2,
                    found: other.len(),
                }),
            }
        };
        Ok(Self {
            coefficients: [row(boiler)?, row(grouphead)?],
            intercepts: [boiler.intercept, grouphead.intercept],
        })
    }
}

impl StepModel for JointDeltaModel {
    fn step(&self, state: ThermalState) -> Result<StepOutput, ModelError> {
        let x = state.as_features();
        let [d_boiler, d_grouphead] = [0, 1].map(|o| {
            self.intercepts[o] + self.coefficients[o][0] * x[0] + self.coefficients[o][1] * x[1]
        });
        Ok(StepOutput::Delta(ThermalState::new(d_boiler, d_grouphead)))
    }
}
