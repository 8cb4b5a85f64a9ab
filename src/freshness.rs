//! The "fetch with fallback, never regress to empty" policy.
//!
//! The same rule applies at every tier (server cold start, client refresh,
//! weekend hold): a candidate only replaces the current value when it is a
//! strictly non-empty success. Implemented once here and reused.

use std::fmt;

use chrono::{DateTime, Utc};

/// What a refresh attempt produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome<T> {
    /// Successful fetch with real content.
    Fresh(T),
    /// Successful fetch that came back empty; treated like a failure for
    /// merge purposes.
    Empty,
    /// Transport or decode failure.
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The candidate replaced the current value.
    Replaced,
    /// The current value was kept; the candidate was empty or failed.
    HeldExisting,
    /// Nothing to show: no current value and no usable candidate.
    NoData,
}

pub fn merge_if_better<T>(
    current: Option<T>,
    candidate: RefreshOutcome<T>,
) -> (Option<T>, MergeOutcome) {
    match candidate {
        RefreshOutcome::Fresh(value) => (Some(value), MergeOutcome::Replaced),
        RefreshOutcome::Empty | RefreshOutcome::Failed(_) => match current {
            Some(value) => (Some(value), MergeOutcome::HeldExisting),
            None => (None, MergeOutcome::NoData),
        },
    }
}

/// User-facing hint for how old the displayed data is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StalenessLabel {
    /// Fetched earlier the same UTC day; rendered as a clock time.
    UpdatedToday(String),
    /// Fetched on an earlier day; rendered as a dated timestamp.
    UpdatedEarlier(String),
    /// Weekend hold: the data is from the prior business day.
    PriorBusinessDay(String),
    /// No fetch has ever succeeded.
    Unknown,
}

impl fmt::Display for StalenessLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UpdatedToday(time) => write!(f, "updated {time}"),
            Self::UpdatedEarlier(stamp) => write!(f, "updated {stamp}"),
            Self::PriorBusinessDay(stamp) => write!(f, "prior business day ({stamp})"),
            Self::Unknown => write!(f, "no data yet"),
        }
    }
}

pub fn staleness_label(
    fetched_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    weekend_hold: bool,
) -> StalenessLabel {
    let Some(fetched_at) = fetched_at else {
        return StalenessLabel::Unknown;
    };

    if weekend_hold {
        return StalenessLabel::PriorBusinessDay(
            fetched_at.format("%Y-%m-%d %H:%M").to_string(),
        );
    }

    if fetched_at.date_naive() == now.date_naive() {
        StalenessLabel::UpdatedToday(fetched_at.format("%H:%M").to_string())
    } else {
        StalenessLabel::UpdatedEarlier(fetched_at.format("%Y-%m-%d %H:%M").to_string())
    }
}
