//! Heat-Session Boundary Detection
//!
//! A heat session is a run of nonzero heat levels, extended across short idle
//! gaps. The controller pulses the heater, so one warm-up usually shows as
//! several runs separated by a few idle samples; `threshold` decides how many
//! idle samples still belong to the same session.
//!
//! ## Boundary rule
//!
//! The idle gap is counted from the heat-off sample `e` (the first idle
//! sample after a run). When heat restarts at index `r`:
//! - `r - e <= threshold`: the runs merge into one session
//! - `r - e > threshold`: the pending session closes at `e`
//!
//! A pending session also closes on any idle sample with `idx - e >= threshold`,
//! so a scan never has to look ahead. A session still heating at the end of
//! the sequence closes at the last index.

use crate::types::HeatSessionBounds;

/// Scan heat levels once and return session bounds in order.
///
/// With `threshold = 0` every maximal nonzero run is its own session.
/// Raising the threshold only ever merges sessions.
pub fn heat_session_bounds(levels: &[f64], threshold: usize) -> Vec<HeatSessionBounds> {
    let mut bounds = Vec::new();
    let mut start: Option<usize> = None;
    let mut heat_off: Option<usize> = None;
    // Index -1 is treated as idle so a session can open at 0
    let mut was_heating = false;

    for (idx, &level) in levels.iter().enumerate() {
        let heating = level > 0.0;

        match (was_heating, heating) {
            (false, true) => {
                if let (Some(s), Some(e)) = (start, heat_off) {
                    if idx - e > threshold {
                        bounds.push(HeatSessionBounds::new(s, e));
                        start = Some(idx);
                    }
                } else if start.is_none() {
                    start = Some(idx);
                }
                heat_off = None;
            }
            (true, false) => heat_off = Some(idx),
            (false, false) => {
                if let (Some(s), Some(e)) = (start, heat_off) {
                    if idx - e >= threshold {
                        bounds.push(HeatSessionBounds::new(s, e));
                        start = None;
                        heat_off = None;
                    }
                }
            }
            (true, true) => {}
        }

        was_heating = heating;
    }

    if let Some(s) = start {
        let end = heat_off.unwrap_or(levels.len().saturating_sub(1));
        bounds.push(HeatSessionBounds::new(s, end));
    }

    bounds
}

/// Settle threshold expressed in grid samples.
pub fn threshold_samples(settle_threshold_ms: i64, period_ms: i64) -> usize {
    if period_ms <= 0 {
        return 0;
    }
    usize::try_from(settle_threshold_ms / period_ms).unwrap_or(0)
}
