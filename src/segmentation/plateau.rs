//! Plateau detection
//!
//! After heat-off the boiler keeps rising while the element's stored heat
//! reaches the water. The plateau is the peak of that overshoot.

use super::grouping::first_argmax;
use crate::types::HeatSessionBounds;

/// Index of the boiler peak after heat-off.
///
/// Searches `[end, end + lookahead_factor * (end - start))`, at least one
/// sample, clipped to the series. Ties resolve to the first maximum.
pub fn plateau_index(temps: &[f64], bounds: HeatSessionBounds, lookahead_factor: usize) -> usize {
    let end = bounds.end.min(temps.len().saturating_sub(1));
    let window = (lookahead_factor * bounds.len()).max(1);
    let hi = end.saturating_add(window).min(temps.len());

    temps
        .get(end..hi)
        .and_then(|slice| first_argmax(slice.iter().copied()))
        .map_or(end, |offset| end + offset)
}

/// Index of the running maximum once the temperature stalls.
///
/// Walks forward from `start` tracking the highest reading. When `threshold`
/// samples have passed without a new strict maximum, the maximum's index is
/// returned. If the series ends first, the last maximum wins.
pub fn max_temp_index(temps: &[f64], start: usize, threshold: usize) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;

    for (idx, &temp) in temps.iter().enumerate().skip(start) {
        match best {
            Some((_, max)) if temp > max => best = Some((idx, temp)),
            Some((max_idx, _)) if idx - max_idx > threshold => return Some(max_idx),
            Some(_) => {}
            None => best = Some((idx, temp)),
        }
    }

    best.map(|(idx, _)| idx)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stepped() -> Vec<f64> {
        let mut temps = vec![5.0; 6];
        temps.extend([6.0; 3]);
        temps.extend([7.0; 9]);
        temps
    }

    #[test]
    fn test_max_temp_index_keeps_climbing_with_patience() {
        assert_eq!(max_temp_index(&stepped(), 0, 5), Some(9));
    }

    #[test]
    fn test_max_temp_index_stalls_early_with_short_threshold() {
        assert_eq!(max_temp_index(&stepped(), 0, 2), Some(0));
    }

    #[test]
    fn test_max_temp_index_from_offset() {
        let temps = [5.0, 5.0, 5.0, 5.0, 6.0, 5.0, 6.0, 5.0, 5.0, 5.0, 5.0];
        assert_eq!(max_temp_index(&temps, 2, 2), Some(4));
        assert_eq!(max_temp_index(&temps, 20, 2), None);
    }

    #[test]
    fn test_plateau_searches_lookahead_window() {
        //            s         e              window [4, 10)
        let temps = [60.0, 61.0, 62.0, 63.0, 64.0, 66.0, 67.0, 66.0, 65.0, 64.0, 90.0];
        let bounds = HeatSessionBounds::new(2, 4);
        assert_eq!(plateau_index(&temps, bounds, 3), 6);
    }

    #[test]
    fn test_plateau_window_is_at_least_one_sample() {
        let temps = [60.0, 70.0, 80.0];
        assert_eq!(plateau_index(&temps, HeatSessionBounds::new(1, 1), 3), 1);
    }

    #[test]
    fn test_plateau_with_reversed_bounds_searches_one_sample() {
        let temps = [60.0, 61.0, 62.0, 63.0, 64.0, 65.0, 66.0];
        assert_eq!(plateau_index(&temps, HeatSessionBounds::new(5, 2), 3), 2);
    }

    #[test]
    fn test_plateau_window_clipped_to_series() {
        let temps = [60.0, 61.0, 62.0, 63.0, 64.0];
        assert_eq!(plateau_index(&temps, HeatSessionBounds::new(0, 3), 3), 4);
    }
}
