//! Correlation search
//!
//! Finds the rolling heat window `n` and look-ahead shift `m` under which the
//! heat delivered over the last `n` seconds best explains the boiler change
//! `m` seconds later. Pearson r with a Student-t p-value via statrs.
//!
//! Grid cells are independent pure computations, evaluated in parallel with
//! rayon.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, StudentsT};

use crate::config::SessionConfig;
use crate::segmentation::extract_heat_sessions;
use crate::types::{Millis, ResampledSeries};

/// One evaluated grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CorrelationCandidate {
    pub window_ms: Millis,
    pub shift_ms: Millis,
    pub r_value: f64,
    pub p_value: f64,
    pub sample_count: usize,
}

/// Settle threshold scored by how well heat sum tracks temperature rise.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SettleCandidate {
    pub settle_threshold_ms: Millis,
    pub r_value: f64,
    pub session_count: usize,
}

/// Correlation analysis engine with statistical significance testing
pub struct CorrelationEngine;

impl CorrelationEngine {
    /// Pearson correlation coefficient. 0.0 when either side is constant.
    ///
    /// Formula: r = Σ[(xi - x̄)(yi - ȳ)] / sqrt(Σ(xi - x̄)² × Σ(yi - ȳ)²)
    pub fn pearson(x: &[f64], y: &[f64]) -> f64 {
        let n = x.len().min(y.len());
        if n < 2 {
            return 0.0;
        }
        let mean_x = x[..n].iter().sum::<f64>() / n as f64;
        let mean_y = y[..n].iter().sum::<f64>() / n as f64;

        let (mut cov, mut var_x, mut var_y) = (0.0, 0.0, 0.0);
        for (a, b) in x[..n].iter().zip(&y[..n]) {
            let (dx, dy) = (a - mean_x, b - mean_y);
            cov += dx * dy;
            var_x += dx * dx;
            var_y += dy * dy;
        }

        let denominator = (var_x * var_y).sqrt();
        if denominator == 0.0 {
            0.0
        } else {
            cov / denominator
        }
    }

    /// Two-tailed p-value for r with n-2 degrees of freedom.
    ///
    /// Formula: t = r × sqrt(n-2) / sqrt(1-r²)
    pub fn p_value_for_r(r: f64, n: usize) -> f64 {
        if n < 3 {
            return 1.0;
        }
        if r.abs() >= 0.9999 {
            return 0.0;
        }

        let df = (n - 2) as f64;
        let t_stat = r * df.sqrt() / (1.0 - r * r).sqrt();

        match StudentsT::new(0.0, 1.0, df) {
            Ok(t_dist) => 2.0 * (1.0 - t_dist.cdf(t_stat.abs())),
            Err(_) => 1.0,
        }
    }

    /// Paired samples of (rolling heat sum over `window`, boiler change
    /// `shift` samples ahead). Only full windows count.
    pub fn heat_response_pairs(series: &ResampledSeries, window: usize, shift: usize) -> (Vec<f64>, Vec<f64>) {
        let rows = &series.rows;
        let window = window.max(1);
        let mut heat = Vec::new();
        let mut response = Vec::new();
        if rows.len() < window {
            return (heat, response);
        }

        let mut rolling: f64 = rows[..window - 1].iter().map(|m| m.heat_level).sum();
        for i in (window - 1)..rows.len() {
            rolling += rows[i].heat_level;
            if let Some(future) = rows.get(i + shift) {
                heat.push(rolling);
                response.push(future.boiler_temp_c - rows[i].boiler_temp_c);
            }
            rolling -= rows[i + 1 - window].heat_level;
        }
        (heat, response)
    }

    /// Evaluate one (window, shift) cell across every group.
    pub fn evaluate(groups: &[ResampledSeries], window_ms: Millis, shift_ms: Millis) -> CorrelationCandidate {
        let mut x = Vec::new();
        let mut y = Vec::new();
        for g in groups {
            let (heat, response) = Self::heat_response_pairs(g, g.samples_for(window_ms), g.samples_for(shift_ms));
            x.extend(heat);
            y.extend(response);
        }
        let r = Self::pearson(&x, &y);
        CorrelationCandidate {
            window_ms,
            shift_ms,
            r_value: r,
            p_value: Self::p_value_for_r(r, x.len()),
            sample_count: x.len(),
        }
    }

    /// Grid search over `(start, end, step)` ranges (end exclusive), sorted by
    /// correlation, strongest positive first.
    pub fn search(
        groups: &[ResampledSeries],
        window_range_ms: (Millis, Millis, Millis),
        shift_range_ms: (Millis, Millis, Millis),
    ) -> Vec<CorrelationCandidate> {
        let windows = grid(window_range_ms);
        let shifts = grid(shift_range_ms);
        let cells: Vec<(Millis, Millis)> = windows
            .iter()
            .flat_map(|&n| shifts.iter().map(move |&m| (n, m)))
            .collect();

        let mut scores: Vec<CorrelationCandidate> = cells
            .par_iter()
            .map(|&(n, m)| Self::evaluate(groups, n, m))
            .collect();

        scores.sort_by(|a, b| b.r_value.partial_cmp(&a.r_value).unwrap_or(std::cmp::Ordering::Equal));
        scores
    }

    /// Score settle thresholds by corr(heat_level_sum, temp_diff) of the
    /// resulting sessions, strongest first.
    pub fn search_settle_threshold(
        groups: &[ResampledSeries],
        thresholds_ms: &[Millis],
        sessions: &SessionConfig,
    ) -> Vec<SettleCandidate> {
        let mut scores: Vec<SettleCandidate> = thresholds_ms
            .par_iter()
            .map(|&threshold| {
                let config = SessionConfig {
                    settle_threshold_ms: threshold,
                    ..sessions.clone()
                };
                let found: Vec<_> = groups.iter().flat_map(|g| extract_heat_sessions(g, &config)).collect();
                let heat: Vec<f64> = found.iter().map(|s| s.heat_level_sum).collect();
                let diff: Vec<f64> = found.iter().map(|s| s.temp_diff).collect();
                SettleCandidate {
                    settle_threshold_ms: threshold,
                    r_value: Self::pearson(&heat, &diff),
                    session_count: found.len(),
                }
            })
            .collect();

        scores.sort_by(|a, b| b.r_value.partial_cmp(&a.r_value).unwrap_or(std::cmp::Ordering::Equal));
        scores
    }
}

fn grid((start, end, step): (Millis, Millis, Millis)) -> Vec<Millis> {
    if step <= 0 {
        return Vec::new();
    }
    std::iter::successors(Some(start), |v| Some(v + step))
        .take_while(|v| *v < end)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Measurement;

    #[test]
    fn test_pearson_perfect_and_constant() {
        let x = [1.0, 2.0, 3.0, 4.0];
        assert!((CorrelationEngine::pearson(&x, &[2.0, 4.0, 6.0, 8.0]) - 1.0).abs() < 1e-12);
        assert!((CorrelationEngine::pearson(&x, &[8.0, 6.0, 4.0, 2.0]) + 1.0).abs() < 1e-12);
        assert_eq!(CorrelationEngine::pearson(&x, &[5.0; 4]), 0.0);
    }

    #[test]
    fn test_p_value_behaviour() {
        assert_eq!(CorrelationEngine::p_value_for_r(0.5, 2), 1.0);
        assert!(CorrelationEngine::p_value_for_r(0.8, 100) < 0.001);
        assert!(CorrelationEngine::p_value_for_r(0.05, 30) > 0.5);
    }

    #[test]
    fn test_grid_is_end_exclusive() {
        assert_eq!(grid((1_000, 2_500, 500)), vec![1_000, 1_500, 2_000]);
        assert!(grid((1_000, 2_000, 0)).is_empty());
    }

    #[test]
    fn test_heat_response_pairs_use_full_windows() {
        let rows = (0..6)
            .map(|i| Measurement::new(i * 1_000, 80.0 + i as f64, 60.0, if i % 2 == 0 { 1.0 } else { 0.0 }))
            .collect();
        let s = ResampledSeries {
            group_id: 0,
            period_ms: 1_000,
            rows,
        };
        let (heat, response) = CorrelationEngine::heat_response_pairs(&s, 3, 2);
        // Windows end at 2, 3 (4 and 5 have no future row)
        assert_eq!(heat, vec![2.0, 1.0]);
        assert_eq!(response, vec![2.0, 2.0]);
    }

    #[test]
    fn test_search_finds_true_response_delay() {
        // Boiler change 5 samples ahead is driven by heat over the last 3
        let levels: Vec<f64> = (0..400).map(|i| if (i / 7) % 3 == 0 { 1.0 } else { 0.0 }).collect();
        let mut temps = vec![80.0; levels.len()];
        for i in 0..levels.len() {
            let drive: f64 = (i.saturating_sub(2)..=i).map(|j| levels[j]).sum();
            if i + 5 < temps.len() {
                temps[i + 5] = temps[i] + drive;
            }
        }
        let rows = levels
            .iter()
            .zip(&temps)
            .enumerate()
            .map(|(i, (&h, &t))| Measurement::new(i as Millis * 1_000, t, 60.0, h))
            .collect();
        let s = ResampledSeries {
            group_id: 0,
            period_ms: 1_000,
            rows,
        };

        let scores = CorrelationEngine::search(&[s], (1_000, 6_000, 1_000), (1_000, 9_000, 1_000));
        assert_eq!(scores.len(), 5 * 8);
        assert_eq!((scores[0].window_ms, scores[0].shift_ms), (3_000, 5_000));
        assert!(scores[0].r_value > 0.99);
        assert!(scores.windows(2).all(|w| w[0].r_value >= w[1].r_value));
    }
}
