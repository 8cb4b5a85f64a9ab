//! Release-date projection for the tracked indicators.
//!
//! Rules implemented:
//! - FirstBusinessDay: first of month advanced past Sat/Sun
//! - FirstFridayOfMonth: first Friday on or after the 1st
//! - MidMonthBusinessDay: day 14 advanced past Sat/Sun
//! - EndOfMonthBusinessDay: day 26 advanced past Sat/Sun
//! - FomcMeetingDate: static table of known meeting end-dates
//!
//! Projection scans the current month plus the next two and keeps resolved
//! dates inside `[today - 7d, today + 21d]`. Output is deterministic for a
//! fixed `today`.

use std::collections::HashSet;

use chrono::{Datelike, Days, Months, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::indicators::{indicator_order, ReleaseRule, INDICATORS};
use crate::observations::ObservationMap;

const WINDOW_DAYS_PAST: u64 = 7;
const WINDOW_DAYS_FUTURE: u64 = 21;
const MONTHS_SCANNED: u32 = 3;

/// Known FOMC meeting end-dates (second day of each meeting).
const FOMC_MEETINGS: [(i32, u32, u32); 16] = [
    (2025, 1, 29),
    (2025, 3, 19),
    (2025, 5, 7),
    (2025, 6, 18),
    (2025, 7, 30),
    (2025, 9, 17),
    (2025, 10, 29),
    (2025, 12, 10),
    (2026, 1, 28),
    (2026, 3, 18),
    (2026, 4, 29),
    (2026, 6, 17),
    (2026, 7, 29),
    (2026, 9, 16),
    (2026, 10, 28),
    (2026, 12, 9),
];

const FOMC_FIRST_YEAR: i32 = 2025;
const FOMC_LAST_YEAR: i32 = 2026;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FomcLookup {
    /// A meeting ends in this month on the given date.
    Meeting(NaiveDate),
    /// The year is covered by the table but no meeting ends this month.
    NoMeeting,
    /// The year is outside the curated table; the schedule cannot say.
    OutsideTable,
}

pub fn fomc_meeting_for_month(year: i32, month: u32) -> FomcLookup {
    if !(FOMC_FIRST_YEAR..=FOMC_LAST_YEAR).contains(&year) {
        return FomcLookup::OutsideTable;
    }

    FOMC_MEETINGS
        .iter()
        .find(|(y, m, _)| *y == year && *m == month)
        .and_then(|(y, m, d)| NaiveDate::from_ymd_opt(*y, *m, *d))
        .map_or(FomcLookup::NoMeeting, FomcLookup::Meeting)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventInstance {
    pub indicator_id: &'static str,
    pub date: NaiveDate,
}

impl EventInstance {
    pub fn is_past_or_today(&self, today: NaiveDate) -> bool {
        self.date <= today
    }
}

/// Projector output: the resolved window plus an explicit flag for the case
/// where the FOMC table no longer covers a scanned month.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseSchedule {
    pub events: Vec<EventInstance>,
    pub fomc_window_uncovered: bool,
}

pub fn project_release_events(today: NaiveDate) -> ReleaseSchedule {
    let window_start = today
        .checked_sub_days(Days::new(WINDOW_DAYS_PAST))
        .unwrap_or(today);
    let window_end = today
        .checked_add_days(Days::new(WINDOW_DAYS_FUTURE))
        .unwrap_or(today);

    let mut events = Vec::new();
    let mut seen: HashSet<(NaiveDate, &'static str)> = HashSet::new();
    let mut fomc_window_uncovered = false;

    for month_offset in 0..MONTHS_SCANNED {
        let Some(first_of_month) = first_of_month_with_offset(today, month_offset) else {
            continue;
        };
        let year = first_of_month.year();
        let month = first_of_month.month();

        for def in &INDICATORS {
            let resolved = match def.release_rule {
                ReleaseRule::FirstBusinessDay => Some(next_business_day(first_of_month)),
                ReleaseRule::FirstFridayOfMonth => Some(first_weekday_of_month(
                    first_of_month,
                    Weekday::Fri,
                )),
                ReleaseRule::MidMonthBusinessDay => anchored_business_day(year, month, 14),
                ReleaseRule::EndOfMonthBusinessDay => anchored_business_day(year, month, 26),
                ReleaseRule::FomcMeetingDate => match fomc_meeting_for_month(year, month) {
                    FomcLookup::Meeting(date) => Some(date),
                    FomcLookup::NoMeeting => None,
                    FomcLookup::OutsideTable => {
                        if !fomc_window_uncovered {
                            warn!(
                                component = "release_schedule",
                                event = "fomc.table_exhausted",
                                year,
                                month
                            );
                        }
                        fomc_window_uncovered = true;
                        None
                    }
                },
            };

            let Some(date) = resolved else { continue };
            if date < window_start || date > window_end {
                continue;
            }
            if seen.insert((date, def.id)) {
                events.push(EventInstance {
                    indicator_id: def.id,
                    date,
                });
            }
        }
    }

    events.sort_by_key(|event| (event.date, indicator_order(event.indicator_id)));

    ReleaseSchedule {
        events,
        fomc_window_uncovered,
    }
}

fn first_of_month_with_offset(today: NaiveDate, month_offset: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(today.year(), today.month(), 1)?
        .checked_add_months(Months::new(month_offset))
}

fn anchored_business_day(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, day).map(next_business_day)
}

fn next_business_day(mut date: NaiveDate) -> NaiveDate {
    while matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
        date = date.succ_opt().unwrap_or(date);
    }
    date
}

fn first_weekday_of_month(first_of_month: NaiveDate, weekday: Weekday) -> NaiveDate {
    let gap = (weekday.num_days_from_sunday() + 7
        - first_of_month.weekday().num_days_from_sunday())
        % 7;
    first_of_month
        .checked_add_days(Days::new(u64::from(gap)))
        .unwrap_or(first_of_month)
}

pub fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// An event joined with its latest observation pair, ready for presentation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedEvent {
    pub indicator_id: String,
    pub date: NaiveDate,
    pub actual: Option<f64>,
    pub prior: Option<f64>,
}

/// Point-in-time disclosure: an actual may only be shown once the release
/// date has arrived. The release day itself counts as released.
pub fn actual_is_disclosable(event_date: NaiveDate, today: NaiveDate) -> bool {
    event_date <= today
}

/// Joins projected events with the observation map, masking any actual whose
/// release date is still in the future. Priors are always carried: they are
/// last period's already-released figure.
pub fn enrich_events(
    events: &[EventInstance],
    observations: &ObservationMap,
    today: NaiveDate,
) -> Vec<EnrichedEvent> {
    events
        .iter()
        .map(|event| {
            let pair = observations.get(event.indicator_id);
            let actual = if actual_is_disclosable(event.date, today) {
                pair.and_then(|pair| pair.actual)
            } else {
                None
            };

            EnrichedEvent {
                indicator_id: event.indicator_id.to_string(),
                date: event.date,
                actual,
                prior: pair.and_then(|pair| pair.prior),
            }
        })
        .collect()
}
