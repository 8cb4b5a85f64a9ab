//! Static definitions for the tracked macro indicators.
//!
//! The set is fixed at compile time: twelve high-impact FRED series, each with
//! a display unit, a better-direction hint, and the calendar rule its release
//! date is projected from.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReleaseRule {
    FirstBusinessDay,
    FirstFridayOfMonth,
    MidMonthBusinessDay,
    EndOfMonthBusinessDay,
    FomcMeetingDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DisplayUnit {
    Percent,
    Thousands,
    Index,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndicatorDefinition {
    pub id: &'static str,
    pub label: &'static str,
    pub unit: DisplayUnit,
    /// `None` means direction is not meaningful (policy rates).
    pub higher_is_better: Option<bool>,
    pub release_rule: ReleaseRule,
}

pub const INDICATORS: [IndicatorDefinition; 12] = [
    IndicatorDefinition {
        id: "CPIAUCSL",
        label: "CPI",
        unit: DisplayUnit::Percent,
        higher_is_better: Some(false),
        release_rule: ReleaseRule::MidMonthBusinessDay,
    },
    IndicatorDefinition {
        id: "CPILFESL",
        label: "Core CPI",
        unit: DisplayUnit::Percent,
        higher_is_better: Some(false),
        release_rule: ReleaseRule::MidMonthBusinessDay,
    },
    IndicatorDefinition {
        id: "PPIACO",
        label: "PPI",
        unit: DisplayUnit::Percent,
        higher_is_better: Some(false),
        release_rule: ReleaseRule::MidMonthBusinessDay,
    },
    IndicatorDefinition {
        id: "PCEPI",
        label: "PCE",
        unit: DisplayUnit::Percent,
        higher_is_better: Some(false),
        release_rule: ReleaseRule::EndOfMonthBusinessDay,
    },
    IndicatorDefinition {
        id: "PCEPILFE",
        label: "Core PCE",
        unit: DisplayUnit::Percent,
        higher_is_better: Some(false),
        release_rule: ReleaseRule::EndOfMonthBusinessDay,
    },
    IndicatorDefinition {
        id: "PAYEMS",
        label: "Non-Farm Payrolls",
        unit: DisplayUnit::Thousands,
        higher_is_better: Some(true),
        release_rule: ReleaseRule::FirstFridayOfMonth,
    },
    IndicatorDefinition {
        id: "UNRATE",
        label: "Unemployment Rate",
        unit: DisplayUnit::Percent,
        higher_is_better: Some(false),
        release_rule: ReleaseRule::FirstFridayOfMonth,
    },
    IndicatorDefinition {
        id: "GDP",
        label: "GDP",
        unit: DisplayUnit::Percent,
        higher_is_better: Some(true),
        release_rule: ReleaseRule::EndOfMonthBusinessDay,
    },
    IndicatorDefinition {
        id: "RSAFS",
        label: "Retail Sales",
        unit: DisplayUnit::Percent,
        higher_is_better: Some(true),
        release_rule: ReleaseRule::MidMonthBusinessDay,
    },
    IndicatorDefinition {
        id: "MANEMP",
        label: "ISM Manufacturing",
        unit: DisplayUnit::Index,
        higher_is_better: Some(true),
        release_rule: ReleaseRule::FirstBusinessDay,
    },
    IndicatorDefinition {
        id: "UMCSENT",
        label: "Consumer Confidence",
        unit: DisplayUnit::Index,
        higher_is_better: Some(true),
        release_rule: ReleaseRule::MidMonthBusinessDay,
    },
    IndicatorDefinition {
        id: "FEDFUNDS",
        label: "Federal Funds Rate",
        unit: DisplayUnit::Percent,
        higher_is_better: None,
        release_rule: ReleaseRule::FomcMeetingDate,
    },
];

pub fn indicator_by_id(id: &str) -> Option<&'static IndicatorDefinition> {
    INDICATORS.iter().find(|def| def.id == id)
}

/// Position of an indicator in the static table, used as the stable
/// secondary sort key for same-day events.
pub fn indicator_order(id: &str) -> usize {
    INDICATORS
        .iter()
        .position(|def| def.id == id)
        .unwrap_or(INDICATORS.len())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Improved,
    Worsened,
    NotComparable,
}

/// Direction of an actual-versus-prior move, honoring the indicator's
/// better-direction hint. Drives the positive/negative highlighting.
pub fn compare_to_prior(def: &IndicatorDefinition, actual: f64, prior: f64) -> Comparison {
    match def.higher_is_better {
        Some(true) => {
            if actual > prior {
                Comparison::Improved
            } else {
                Comparison::Worsened
            }
        }
        Some(false) => {
            if actual < prior {
                Comparison::Improved
            } else {
                Comparison::Worsened
            }
        }
        None => Comparison::NotComparable,
    }
}

pub fn format_value(value: Option<f64>, unit: DisplayUnit) -> String {
    let Some(value) = value else {
        return "\u{2014}".to_string();
    };
    match unit {
        DisplayUnit::Percent => format!("{value:.2}%"),
        DisplayUnit::Thousands => format!("{:.1}K", value / 1000.0),
        DisplayUnit::Index => format!("{value:.2}"),
    }
}
