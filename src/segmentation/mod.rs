//! Telemetry segmentation
//!
//! raw series -> contiguity grouping -> resampling -> heat-session bounds ->
//! session features.
//!
//! Every stage is a pure function over borrowed input. Groups that cannot be
//! resampled surface a [`SegmentationError`]; batch drivers log and skip them.

pub mod features;
pub mod filter;
pub mod grouping;
pub mod heat_sessions;
pub mod plateau;
pub mod resample;

pub use features::{
    delta_series, extract_heat_sessions, measurement_feature_rows, session_feature_rows, start_lag_index,
    summarize_session,
};
pub use filter::{RejectionReason, SessionFilter, SessionFilterResult};
pub use grouping::{
    crop_to_peak, gap_stats, group_by_temperature_continuity, group_measurements, largest_gap, split_on_time_gaps,
    GapStats,
};
pub use heat_sessions::{heat_session_bounds, threshold_samples};
pub use plateau::{max_temp_index, plateau_index};
pub use resample::{resample, upsample_forward_fill, ResamplePeriod};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SegmentationError {
    /// A resampling bucket had no usable observation
    #[error("Data quality error in group {group_id}: {detail}")]
    DataQuality { group_id: usize, detail: String },

    #[error("Group {group_id} has {found} rows, need at least {needed}")]
    InsufficientRows {
        group_id: usize,
        needed: usize,
        found: usize,
    },

    #[error("Invalid resample period '{0}' (expected e.g. 100ms, 10s, 5m, 1h or min)")]
    InvalidPeriod(String),
}
