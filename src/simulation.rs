//! Synthetic Boiler Traces
//!
//! Seeded simulator producing controller-like telemetry for tests and demos.
//!
//! ## Model
//!
//! - Heater commands reach the element after a fixed dead time
//! - The element's heat flux follows the delayed command with a first-order lag,
//!   so the boiler keeps rising for a while after heat-off
//! - The boiler loses heat to ambient (Newtonian) and exchanges heat with the
//!   grouphead, which in turn cools to ambient
//! - Gaussian noise is added to the reported temperatures only
//!
//! Integration is explicit Euler at the sample period.

use std::collections::VecDeque;

use rand::prelude::*;
use rand_distr::Normal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{Measurement, Millis};

#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("invalid simulation parameter: {0}")]
    InvalidParameter(String),
}

// ============================================================================
// Parameters
// ============================================================================

/// Physical constants of the simulated machine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoilerParams {
    pub ambient_c: f64,
    /// Time before a heater command affects the element (ms)
    pub dead_time_ms: Millis,
    /// Time constant of the element's heat flux (s)
    pub heater_time_constant_s: f64,
    /// Boiler heating rate at full flux (°C/s)
    pub heater_gain_c_per_s: f64,
    /// Boiler to ambient loss rate (1/s)
    pub boiler_loss_per_s: f64,
    /// Boiler to grouphead exchange rate (1/s)
    pub coupling_per_s: f64,
    /// Grouphead to ambient loss rate (1/s)
    pub grouphead_loss_per_s: f64,
    /// Std-dev of reported temperature noise (°C)
    pub noise_std_c: f64,
}

impl Default for BoilerParams {
    fn default() -> Self {
        Self {
            ambient_c: 22.0,
            dead_time_ms: 3_000,
            heater_time_constant_s: 15.0,
            heater_gain_c_per_s: 0.8,
            boiler_loss_per_s: 0.000_5,
            coupling_per_s: 0.002,
            grouphead_loss_per_s: 0.001,
            noise_std_c: 0.02,
        }
    }
}

impl BoilerParams {
    fn validate(&self) -> Result<(), SimulationError> {
        let rates = [
            ("heater_time_constant_s", self.heater_time_constant_s),
            ("heater_gain_c_per_s", self.heater_gain_c_per_s),
            ("boiler_loss_per_s", self.boiler_loss_per_s),
            ("coupling_per_s", self.coupling_per_s),
            ("grouphead_loss_per_s", self.grouphead_loss_per_s),
            ("noise_std_c", self.noise_std_c),
        ];
        for (name, value) in rates {
            if !value.is_finite() || value < 0.0 {
                return Err(SimulationError::InvalidParameter(format!(
                    "{name} must be finite and non-negative, got {value}"
                )));
            }
        }
        if self.heater_time_constant_s == 0.0 {
            return Err(SimulationError::InvalidParameter(
                "heater_time_constant_s must be positive".to_string(),
            ));
        }
        if self.dead_time_ms < 0 {
            return Err(SimulationError::InvalidParameter(format!(
                "dead_time_ms must be non-negative, got {}",
                self.dead_time_ms
            )));
        }
        Ok(())
    }
}

/// Heater on at `level` for `duration_ms`, starting `start_ms` into the trace.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeatPulse {
    pub start_ms: Millis,
    pub duration_ms: Millis,
    pub level: f64,
}

impl HeatPulse {
    pub fn contains(&self, offset_ms: Millis) -> bool {
        offset_ms >= self.start_ms && offset_ms < self.start_ms + self.duration_ms
    }

    /// `count` pulses of equal shape, `spacing_ms` apart.
    pub fn evenly_spaced(
        count: usize,
        first_start_ms: Millis,
        spacing_ms: Millis,
        duration_ms: Millis,
        level: f64,
    ) -> Vec<HeatPulse> {
        (0..count)
            .map(|i| HeatPulse {
                start_ms: first_start_ms + i as Millis * spacing_ms,
                duration_ms,
                level,
            })
            .collect()
    }

    /// Pulses with random idle gaps, durations, and levels drawn uniformly from
    /// the given ranges.
    pub fn random(
        seed: u64,
        count: usize,
        idle_ms: (Millis, Millis),
        duration_ms: (Millis, Millis),
        level: (f64, f64),
    ) -> Vec<HeatPulse> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut cursor = 0;
        let mut pulses = Vec::with_capacity(count);
        for _ in 0..count {
            cursor += draw_ms(&mut rng, idle_ms);
            let duration = draw_ms(&mut rng, duration_ms);
            let level = if level.0 < level.1 {
                rng.gen_range(level.0..=level.1)
            } else {
                level.0
            };
            pulses.push(HeatPulse {
                start_ms: cursor,
                duration_ms: duration,
                level: level.clamp(0.0, 1.0),
            });
            cursor += duration;
        }
        pulses
    }
}

fn draw_ms(rng: &mut StdRng, (lo, hi): (Millis, Millis)) -> Millis {
    if lo < hi {
        rng.gen_range(lo..=hi)
    } else {
        lo
    }
}

/// One trace to generate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceConfig {
    pub seed: u64,
    /// Timestamp of the first sample (ms since epoch)
    pub start_time: Millis,
    pub period_ms: Millis,
    pub duration_ms: Millis,
    pub initial_boiler_c: f64,
    pub initial_grouphead_c: f64,
    pub pulses: Vec<HeatPulse>,
    /// Logging outages `[start, end)` as offsets; the machine keeps evolving
    /// but no rows are emitted
    #[serde(default)]
    pub outages: Vec<(Millis, Millis)>,
    #[serde(default)]
    pub params: BoilerParams,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            start_time: 1_700_000_000_000,
            period_ms: 100,
            duration_ms: 10 * 60 * 1000,
            initial_boiler_c: 60.0,
            initial_grouphead_c: 50.0,
            pulses: Vec::new(),
            outages: Vec::new(),
            params: BoilerParams::default(),
        }
    }
}

// ============================================================================
// Simulator
// ============================================================================

pub struct BoilerSimulator {
    params: BoilerParams,
    rng: StdRng,
    noise: Normal<f64>,
    boiler_c: f64,
    grouphead_c: f64,
    heat_flux: f64,
    pending_levels: VecDeque<f64>,
}

impl BoilerSimulator {
    pub fn new(
        params: BoilerParams,
        period_ms: Millis,
        initial_boiler_c: f64,
        initial_grouphead_c: f64,
        seed: u64,
    ) -> Result<Self, SimulationError> {
        params.validate()?;
        if period_ms <= 0 {
            return Err(SimulationError::InvalidParameter(format!(
                "period_ms must be positive, got {period_ms}"
            )));
        }
        let noise = Normal::new(0.0, params.noise_std_c)
            .map_err(|e| SimulationError::InvalidParameter(e.to_string()))?;
        let delay_samples = usize::try_from(params.dead_time_ms / period_ms).unwrap_or(0);

        Ok(Self {
            params,
            rng: StdRng::seed_from_u64(seed),
            noise,
            boiler_c: initial_boiler_c,
            grouphead_c: initial_grouphead_c,
            heat_flux: 0.0,
            pending_levels: std::iter::repeat(0.0).take(delay_samples).collect(),
        })
    }

    /// True boiler and grouphead temperatures, without noise.
    pub fn state(&self) -> (f64, f64) {
        (self.boiler_c, self.grouphead_c)
    }

    /// Advance by `dt_s` with the heater commanded at `level`.
    pub fn step(&mut self, level: f64, dt_s: f64) {
        self.pending_levels.push_back(level.clamp(0.0, 1.0));
        let effective = self.pending_levels.pop_front().unwrap_or(0.0);

        let p = &self.params;
        self.heat_flux += dt_s * (effective - self.heat_flux) / p.heater_time_constant_s;

        let exchange = p.coupling_per_s * (self.boiler_c - self.grouphead_c);
        let boiler_rate = p.heater_gain_c_per_s * self.heat_flux
            - p.boiler_loss_per_s * (self.boiler_c - p.ambient_c)
            - exchange;
        let grouphead_rate = exchange - p.grouphead_loss_per_s * (self.grouphead_c - p.ambient_c);

        self.boiler_c += dt_s * boiler_rate;
        self.grouphead_c += dt_s * grouphead_rate;
    }

    /// Reported reading at `time` for a commanded `level`.
    pub fn observe(&mut self, time: Millis, level: f64) -> Measurement {
        let boiler = self.boiler_c + self.noise.sample(&mut self.rng);
        let grouphead = self.grouphead_c + self.noise.sample(&mut self.rng);
        let mut m = Measurement::new(time, boiler, grouphead, level);
        m.power = Some(true);
        m
    }
}

/// Generate a full trace.
pub fn generate_trace(config: &TraceConfig) -> Result<Vec<Measurement>, SimulationError> {
    if config.duration_ms < 0 {
        return Err(SimulationError::InvalidParameter(format!(
            "duration_ms must be non-negative, got {}",
            config.duration_ms
        )));
    }

    let mut sim = BoilerSimulator::new(
        config.params,
        config.period_ms,
        config.initial_boiler_c,
        config.initial_grouphead_c,
        config.seed,
    )?;
    let dt_s = config.period_ms as f64 / 1000.0;
    let samples = config.duration_ms / config.period_ms + 1;
    let mut rows = Vec::with_capacity(usize::try_from(samples).unwrap_or(0));

    for i in 0..samples {
        let offset = i * config.period_ms;
        let level = config
            .pulses
            .iter()
            .find(|p| p.contains(offset))
            .map_or(0.0, |p| p.level.clamp(0.0, 1.0));

        let logged = !config
            .outages
            .iter()
            .any(|&(start, end)| offset >= start && offset < end);
        if logged {
            rows.push(sim.observe(config.start_time + offset, level));
        }
        sim.step(level, dt_s);
    }

    tracing::debug!(
        rows = rows.len(),
        pulses = config.pulses.len(),
        seed = config.seed,
        "Generated synthetic trace"
    );
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet_params() -> BoilerParams {
        BoilerParams {
            noise_std_c: 0.0,
            ..BoilerParams::default()
        }
    }

    #[test]
    fn test_same_seed_same_trace() {
        let config = TraceConfig {
            duration_ms: 60_000,
            pulses: HeatPulse::evenly_spaced(1, 5_000, 0, 10_000, 1.0),
            ..TraceConfig::default()
        };
        let a = generate_trace(&config).unwrap();
        let b = generate_trace(&config).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 601);

        let c = generate_trace(&TraceConfig { seed: 7, ..config }).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_pulse_rises_after_dead_time_and_plateaus_after_heat_off() {
        let config = TraceConfig {
            duration_ms: 180_000,
            initial_boiler_c: 22.0,
            initial_grouphead_c: 22.0,
            pulses: vec![HeatPulse {
                start_ms: 10_000,
                duration_ms: 20_000,
                level: 1.0,
            }],
            params: quiet_params(),
            ..TraceConfig::default()
        };
        let rows = generate_trace(&config).unwrap();
        let temp_at = |offset_ms: i64| rows[(offset_ms / 100) as usize].boiler_temp_c;

        // Nothing happens inside the dead time
        assert!((temp_at(12_000) - 22.0).abs() < 1e-9);
        assert!(temp_at(20_000) > 22.5);

        // Still rising right after heat-off, peak some time later
        assert!(temp_at(35_000) > temp_at(30_000));
        let (peak_idx, _) = rows
            .iter()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |(bi, bv), (i, m)| {
                if m.boiler_temp_c > bv {
                    (i, m.boiler_temp_c)
                } else {
                    (bi, bv)
                }
            });
        assert!(peak_idx > 300, "plateau should come after heat-off");
        assert!(rows.last().unwrap().boiler_temp_c < rows[peak_idx].boiler_temp_c);
    }

    #[test]
    fn test_cooldown_approaches_ambient() {
        let config = TraceConfig {
            period_ms: 10_000,
            duration_ms: 4 * 60 * 60 * 1000,
            initial_boiler_c: 95.0,
            initial_grouphead_c: 85.0,
            params: quiet_params(),
            ..TraceConfig::default()
        };
        let rows = generate_trace(&config).unwrap();
        assert!(rows.windows(2).all(|w| w[1].boiler_temp_c <= w[0].boiler_temp_c));
        let last = rows.last().unwrap();
        assert!(last.boiler_temp_c < 40.0);
        assert!(last.boiler_temp_c > 22.0);
    }

    #[test]
    fn test_outages_drop_rows() {
        let config = TraceConfig {
            period_ms: 1_000,
            duration_ms: 60_000,
            outages: vec![(10_000, 30_000)],
            ..TraceConfig::default()
        };
        let rows = generate_trace(&config).unwrap();
        assert_eq!(rows.len(), 61 - 20);
        let gap = rows.windows(2).map(|w| w[1].time - w[0].time).max().unwrap();
        assert_eq!(gap, 21_000);
    }

    #[test]
    fn test_random_pulses_do_not_overlap() {
        let pulses = HeatPulse::random(3, 20, (5_000, 60_000), (1_000, 30_000), (0.2, 1.0));
        assert_eq!(pulses.len(), 20);
        for w in pulses.windows(2) {
            assert!(w[1].start_ms >= w[0].start_ms + w[0].duration_ms + 5_000);
        }
        assert!(pulses.iter().all(|p| (0.2..=1.0).contains(&p.level)));
    }

    #[test]
    fn test_invalid_params_rejected() {
        let params = BoilerParams {
            noise_std_c: -1.0,
            ..BoilerParams::default()
        };
        assert!(BoilerSimulator::new(params, 100, 20.0, 20.0, 1).is_err());
        assert!(BoilerSimulator::new(BoilerParams::default(), 0, 20.0, 20.0, 1).is_err());
    }
}
