//! Session pruning before training
//!
//! Rejects:
//! - Start lags outside the plausible heater response window
//! - Stop lags outside the plausible overshoot window
//! - Steam-mode sessions starting above boiling
//! - Saturated sessions: heated, barely moved, started near boiling

use crate::config::SessionFilterConfig;
use crate::types::HeatSession;

/// Why a session was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectionReason {
    StartLag,
    StopLag,
    TempInitial,
    Saturated,
}

impl std::fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            RejectionReason::StartLag => "start lag out of range",
            RejectionReason::StopLag => "stop lag out of range",
            RejectionReason::TempInitial => "initial temperature too high",
            RejectionReason::Saturated => "saturated near boiling",
        };
        f.write_str(label)
    }
}

/// Result of session filtering
#[derive(Debug, Clone, Default)]
pub struct SessionFilterResult {
    pub kept: Vec<HeatSession>,
    pub rejected_start_lag: usize,
    pub rejected_stop_lag: usize,
    pub rejected_temp_initial: usize,
    pub rejected_saturated: usize,
}

impl SessionFilterResult {
    pub fn rejected(&self) -> usize {
        self.rejected_start_lag + self.rejected_stop_lag + self.rejected_temp_initial + self.rejected_saturated
    }

    /// Most frequent rejection reason, if anything was rejected.
    pub fn primary_reason(&self) -> Option<RejectionReason> {
        [
            (self.rejected_start_lag, RejectionReason::StartLag),
            (self.rejected_stop_lag, RejectionReason::StopLag),
            (self.rejected_temp_initial, RejectionReason::TempInitial),
            (self.rejected_saturated, RejectionReason::Saturated),
        ]
        .into_iter()
        .filter(|(count, _)| *count > 0)
        .max_by_key(|(count, _)| *count)
        .map(|(_, reason)| reason)
    }
}

/// Session filter driven by `SessionFilterConfig`.
pub struct SessionFilter<'a> {
    config: &'a SessionFilterConfig,
}

impl<'a> SessionFilter<'a> {
    pub fn new(config: &'a SessionFilterConfig) -> Self {
        Self { config }
    }

    /// Check a single session, returning the first failed criterion.
    pub fn validate(&self, session: &HeatSession) -> Result<(), RejectionReason> {
        let c = self.config;
        if !within(session.start_lag, c.min_start_lag_s, c.max_start_lag_s) {
            return Err(RejectionReason::StartLag);
        }
        if !within(session.stop_lag, c.min_stop_lag_s, c.max_stop_lag_s) {
            return Err(RejectionReason::StopLag);
        }
        if c.max_temp_initial_c.is_some_and(|max| session.temp_initial > max) {
            return Err(RejectionReason::TempInitial);
        }
        if c.drop_saturated
            && session.heat_level_sum > 1.0
            && session.temp_diff < 1.0
            && session.temp_initial > 99.0
        {
            return Err(RejectionReason::Saturated);
        }
        Ok(())
    }

    pub fn apply(&self, sessions: Vec<HeatSession>) -> SessionFilterResult {
        let mut result = SessionFilterResult::default();
        for session in sessions {
            match self.validate(&session) {
                Ok(()) => result.kept.push(session),
                Err(RejectionReason::StartLag) => result.rejected_start_lag += 1,
                Err(RejectionReason::StopLag) => result.rejected_stop_lag += 1,
                Err(RejectionReason::TempInitial) => result.rejected_temp_initial += 1,
                Err(RejectionReason::Saturated) => result.rejected_saturated += 1,
            }
        }
        result
    }
}

fn within(value: f64, min: Option<f64>, max: Option<f64>) -> bool {
    min.map_or(true, |lo| value >= lo) && max.map_or(true, |hi| value <= hi)
}
