//! Fixed-grid resampling
//!
//! - `resample`: last observation per bucket, fails when any bucket between
//!   the first and last is empty. Used by the thermal-loss models.
//! - `upsample_forward_fill`: carries the latest observation onto every grid
//!   label. The controller only logs on change, so this reconstructs the
//!   held value for heat-session analysis.

use std::fmt;
use std::str::FromStr;

use super::grouping::largest_gap;
use super::SegmentationError;
use crate::types::{Measurement, MeasurementGroup, Millis, ResampledSeries};

// ============================================================================
// Period
// ============================================================================

/// Grid period, either fixed or derived from the data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResamplePeriod {
    Fixed(Millis),
    /// The group's largest sampling interval rounded up to whole seconds
    LargestGap,
}

impl ResamplePeriod {
    /// Resolve to milliseconds for a concrete set of rows.
    pub fn resolve(&self, group_id: usize, rows: &[Measurement]) -> Result<Millis, SegmentationError> {
        match *self {
            ResamplePeriod::Fixed(ms) => Ok(ms),
            ResamplePeriod::LargestGap => {
                let gap = largest_gap(rows).ok_or(SegmentationError::InsufficientRows {
                    group_id,
                    needed: 2,
                    found: rows.len(),
                })?;
                Ok(((gap + 999) / 1000).max(1) * 1000)
            }
        }
    }
}

impl FromStr for ResamplePeriod {
    type Err = SegmentationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("min") {
            return Ok(ResamplePeriod::LargestGap);
        }

        let split = trimmed
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(trimmed.len());
        let (digits, unit) = trimmed.split_at(split);
        let value: Millis = digits
            .parse()
            .map_err(|_| SegmentationError::InvalidPeriod(s.to_string()))?;

        let scale = match unit {
            "ms" => 1,
            "s" => 1_000,
            "m" => 60_000,
            "h" => 3_600_000,
            _ => return Err(SegmentationError::InvalidPeriod(s.to_string())),
        };

        match value.checked_mul(scale) {
            Some(ms) if ms > 0 => Ok(ResamplePeriod::Fixed(ms)),
            _ => Err(SegmentationError::InvalidPeriod(s.to_string())),
        }
    }
}

impl fmt::Display for ResamplePeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            ResamplePeriod::LargestGap => write!(f, "min"),
            ResamplePeriod::Fixed(ms) if ms % 3_600_000 == 0 => write!(f, "{}h", ms / 3_600_000),
            ResamplePeriod::Fixed(ms) if ms % 60_000 == 0 => write!(f, "{}m", ms / 60_000),
            ResamplePeriod::Fixed(ms) if ms % 1_000 == 0 => write!(f, "{}s", ms / 1_000),
            ResamplePeriod::Fixed(ms) => write!(f, "{ms}ms"),
        }
    }
}

fn grid_label(time: Millis, period_ms: Millis) -> Millis {
    time.div_euclid(period_ms) * period_ms
}

fn has_missing_channel(m: &Measurement) -> bool {
    !(m.boiler_temp_c.is_finite() && m.grouphead_temp_c.is_finite() && m.heat_level.is_finite())
}

// ============================================================================
// Resampling
// ============================================================================

/// Snap a group onto the period grid, keeping the last value of each bucket.
///
/// Row times become bucket labels. Already-aligned data comes back unchanged.
pub fn resample(group: &MeasurementGroup, period: &ResamplePeriod) -> Result<ResampledSeries, SegmentationError> {
    if group.is_empty() {
        return Err(SegmentationError::InsufficientRows {
            group_id: group.id,
            needed: 1,
            found: 0,
        });
    }
    let period_ms = period.resolve(group.id, &group.rows)?;

    let mut rows: Vec<Measurement> = Vec::new();
    for m in &group.rows {
        let label = grid_label(m.time, period_ms);
        match rows.last_mut() {
            Some(last) if last.time == label => *last = m.at(label),
            Some(last) if label != last.time + period_ms => {
                return Err(SegmentationError::DataQuality {
                    group_id: group.id,
                    detail: format!("no sample in bucket starting at {} ms", last.time + period_ms),
                });
            }
            _ => rows.push(m.at(label)),
        }
    }

    if let Some(bad) = rows.iter().find(|m| has_missing_channel(m)) {
        return Err(SegmentationError::DataQuality {
            group_id: group.id,
            detail: format!("non-finite reading in bucket starting at {} ms", bad.time),
        });
    }

    Ok(ResampledSeries {
        group_id: group.id,
        period_ms,
        rows,
    })
}

/// Forward-fill a group onto every grid label between its first and last
/// labels. Leading labels before the first observation are dropped.
pub fn upsample_forward_fill(
    group: &MeasurementGroup,
    period: &ResamplePeriod,
) -> Result<ResampledSeries, SegmentationError> {
    let (first, last) = match (group.rows.first(), group.rows.last()) {
        (Some(first), Some(last)) => (first.time, last.time),
        _ => {
            return Err(SegmentationError::InsufficientRows {
                group_id: group.id,
                needed: 1,
                found: 0,
            })
        }
    };
    let period_ms = period.resolve(group.id, &group.rows)?;

    let mut rows = Vec::with_capacity(usize::try_from((last - first) / period_ms + 1).unwrap_or(0));
    let mut cursor = 0;
    let mut held: Option<&Measurement> = None;
    let mut label = grid_label(first, period_ms);
    let end = grid_label(last, period_ms);

    while label <= end {
        while let Some(m) = group.rows.get(cursor).filter(|m| m.time <= label) {
            held = Some(m);
            cursor += 1;
        }
        if let Some(m) = held {
            rows.push(m.at(label));
        }
        label += period_ms;
    }

    Ok(ResampledSeries {
        group_id: group.id,
        period_ms,
        rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(points: &[(Millis, f64)]) -> MeasurementGroup {
        MeasurementGroup::new(
            3,
            points
                .iter()
                .map(|&(t, boiler)| Measurement::new(t, boiler, 70.0, 0.0))
                .collect(),
        )
    }

    #[test]
    fn test_parse_periods() {
        assert_eq!("100ms".parse::<ResamplePeriod>().unwrap(), ResamplePeriod::Fixed(100));
        assert_eq!("10s".parse::<ResamplePeriod>().unwrap(), ResamplePeriod::Fixed(10_000));
        assert_eq!("5m".parse::<ResamplePeriod>().unwrap(), ResamplePeriod::Fixed(300_000));
        assert_eq!("1h".parse::<ResamplePeriod>().unwrap(), ResamplePeriod::Fixed(3_600_000));
        assert_eq!("min".parse::<ResamplePeriod>().unwrap(), ResamplePeriod::LargestGap);
        assert!("0s".parse::<ResamplePeriod>().is_err());
        assert!("5 minutes".parse::<ResamplePeriod>().is_err());
        assert!("ms".parse::<ResamplePeriod>().is_err());
    }

    #[test]
    fn test_period_display_round_trips_labels() {
        for label in ["100ms", "10s", "5m", "1h", "min"] {
            let period: ResamplePeriod = label.parse().unwrap();
            assert_eq!(period.to_string(), label);
        }
    }

    #[test]
    fn test_largest_gap_rounds_up_to_seconds() {
        let g = group(&[(0, 90.0), (1_200, 89.0), (2_400, 88.0)]);
        assert_eq!(ResamplePeriod::LargestGap.resolve(g.id, &g.rows).unwrap(), 2_000);
        assert!(ResamplePeriod::LargestGap.resolve(0, &g.rows[..1]).is_err());
    }

    #[test]
    fn test_resample_keeps_last_value_per_bucket() {
        let g = group(&[(0, 90.0), (400, 89.0), (1_100, 88.0), (1_900, 87.0), (2_050, 86.0)]);
        let out = resample(&g, &ResamplePeriod::Fixed(1_000)).unwrap();
        assert_eq!(out.group_id, 3);
        assert_eq!(out.rows.iter().map(|m| m.time).collect::<Vec<_>>(), vec![0, 1_000, 2_000]);
        assert_eq!(out.boiler_temps(), vec![89.0, 87.0, 86.0]);
    }

    #[test]
    fn test_resample_fails_on_empty_bucket() {
        let g = group(&[(0, 90.0), (2_500, 88.0)]);
        match resample(&g, &ResamplePeriod::Fixed(1_000)) {
            Err(SegmentationError::DataQuality { group_id, .. }) => assert_eq!(group_id, 3),
            other => panic!("expected data quality error, got {other:?}"),
        }
    }

    #[test]
    fn test_resample_is_idempotent_on_aligned_data() {
        let g = group(&[(0, 90.0), (1_000, 89.0), (2_000, 88.0)]);
        let once = resample(&g, &ResamplePeriod::Fixed(1_000)).unwrap();
        let again = resample(&MeasurementGroup::new(3, once.rows.clone()), &ResamplePeriod::Fixed(1_000)).unwrap();
        assert_eq!(once, again);
        assert_eq!(once.rows, g.rows);
    }

    #[test]
    fn test_forward_fill_holds_last_observation() {
        let g = group(&[(50, 90.0), (100, 91.0), (350, 92.0)]);
        let out = upsample_forward_fill(&g, &ResamplePeriod::Fixed(100)).unwrap();
        // Label 0 precedes the first observation and is dropped
        assert_eq!(out.rows.iter().map(|m| m.time).collect::<Vec<_>>(), vec![100, 200, 300]);
        assert_eq!(out.boiler_temps(), vec![91.0, 91.0, 91.0]);
    }

    #[test]
    fn test_forward_fill_never_interpolates() {
        let g = group(&[(0, 80.0), (1_000, 90.0)]);
        let out = upsample_forward_fill(&g, &ResamplePeriod::Fixed(250)).unwrap();
        assert_eq!(out.boiler_temps(), vec![80.0, 80.0, 80.0, 80.0, 90.0]);
    }
}
