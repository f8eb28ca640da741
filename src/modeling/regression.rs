//! Linear regression collaborator
//!
//! Fitting is delegated to `linfa-linear` (ordinary least squares). The fitted
//! estimator is flattened into a serde-friendly [`LinearModel`] so training
//! and prediction can run in separate processes.

use std::path::Path;

use linfa::prelude::*;
use linfa_linear::LinearRegression;
use ndarray::Array1;
use serde::{Deserialize, Serialize};

use super::dataset::RegressionDataset;
use super::ModelError;
use crate::types::FitScore;

// ============================================================================
// LinearModel
// ============================================================================

/// `y = intercept + Σ coefficients[i] * x[i]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    pub feature_names: Vec<String>,
    pub target_name: String,
    pub coefficients: Vec<f64>,
    pub intercept: f64,
}

impl LinearModel {
    /// Ordinary least squares with intercept.
    pub fn fit(dataset: &RegressionDataset) -> Result<Self, ModelError> {
        let needed = dataset.n_features() + 1;
        if dataset.len() < needed {
            return Err(ModelError::InsufficientSamples {
                needed,
                found: dataset.len(),
            });
        }
        if dataset.records.iter().chain(dataset.targets.iter()).any(|v| !v.is_finite()) {
            return Err(ModelError::Fit(format!(
                "non-finite values in '{}' training data",
                dataset.target_name
            )));
        }

        let ds = Dataset::new(dataset.records.clone(), dataset.targets.clone());
        let fitted = LinearRegression::new()
            .fit(&ds)
            .map_err(|e| ModelError::Fit(e.to_string()))?;

        Ok(Self {
            feature_names: dataset.feature_names.clone(),
            target_name: dataset.target_name.clone(),
            coefficients: fitted.params().to_vec(),
            intercept: fitted.intercept(),
        })
    }

    /// Predict one sample. Fails on a feature-count mismatch.
    pub fn predict_one(&self, features: &[f64]) -> Result<f64, ModelError> {
        if features.len() != self.coefficients.len() {
            return Err(ModelError::DimensionMismatch {
                expected: self.coefficients.len(),
                found: features.len(),
            });
        }
        Ok(self.intercept
            + self
                .coefficients
                .iter()
                .zip(features)
                .map(|(c, x)| c * x)
                .sum::<f64>())
    }

    /// Predict every record of a dataset.
    pub fn predict(&self, dataset: &RegressionDataset) -> Result<Array1<f64>, ModelError> {
        dataset
            .records
            .rows()
            .into_iter()
            .map(|row| self.predict_one(&row.to_vec()))
            .collect::<Result<Vec<f64>, _>>()
            .map(Array1::from_vec)
    }

    /// R² and MSE against a dataset's targets.
    pub fn score(&self, dataset: &RegressionDataset) -> Result<FitScore, ModelError> {
        let predicted = self.predict(dataset)?;
        let r2 = predicted
            .r2(&dataset.targets)
            .map_err(|e| ModelError::Inference(e.to_string()))?;
        let mse = predicted
            .mean_squared_error(&dataset.targets)
            .map_err(|e| ModelError::Inference(e.to_string()))?;
        Ok(FitScore {
            r2,
            mse,
            sample_count: dataset.len(),
        })
    }

    pub fn to_json(&self) -> Result<String, ModelError> {
        serde_json::to_string_pretty(self).map_err(ModelError::Artifact)
    }

    pub fn from_json(json: &str) -> Result<Self, ModelError> {
        serde_json::from_str(json).map_err(ModelError::Artifact)
    }

    pub fn save(&self, path: &Path) -> Result<(), ModelError> {
        std::fs::write(path, self.to_json()?).map_err(|e| ModelError::Io(path.to_path_buf(), e))
    }

    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let json = std::fs::read_to_string(path).map_err(|e| ModelError::Io(path.to_path_buf(), e))?;
        Self::from_json(&json)
    }
}

/// Fit on the leading rows and score on the chronological hold-out.
///
/// With `holdout_fraction = 0`, or too few rows to hold any out, the model is
/// scored on its own training data.
pub fn fit_and_evaluate(
    dataset: &RegressionDataset,
    holdout_fraction: f64,
) -> Result<(LinearModel, FitScore), ModelError> {
    let (train, test) = dataset.split_holdout(holdout_fraction);
    let model = LinearModel::fit(&train)?;
    let score = if test.is_empty() {
        model.score(&train)?
    } else {
        model.score(&test)?
    };
    Ok((model, score))
}
