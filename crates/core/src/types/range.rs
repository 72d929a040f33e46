//! Reporting windows for the dashboard.
//!
//! A window is a half-open interval of calendar dates `[start, end)` split
//! into fixed buckets. Time series are always rendered over the full bucket
//! list so days without orders show up as zeroes instead of gaps.

use chrono::{Datelike, Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};

/// Bucket granularity for a time series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    Day,
    Month,
}

impl Bucket {
    /// Unit name accepted by Postgres `date_trunc`.
    #[must_use]
    pub const fn date_trunc_unit(&self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Month => "month",
        }
    }

    /// Truncate a date to the start of its bucket.
    #[must_use]
    pub fn truncate(&self, date: NaiveDate) -> NaiveDate {
        match self {
            Self::Day => date,
            Self::Month => date.with_day(1).unwrap_or(date),
        }
    }

    /// Start of the following bucket.
    #[must_use]
    pub fn next(&self, date: NaiveDate) -> NaiveDate {
        match self {
            Self::Day => date.checked_add_days(Days::new(1)),
            Self::Month => date.checked_add_months(Months::new(1)),
        }
        .unwrap_or(NaiveDate::MAX)
    }
}

/// Dashboard reporting window, selected with `?range=`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum DashboardRange {
    #[serde(rename = "7d")]
    Last7Days,
    #[default]
    #[serde(rename = "30d")]
    Last30Days,
    #[serde(rename = "90d")]
    Last90Days,
    #[serde(rename = "12m")]
    Last12Months,
}

impl DashboardRange {
    /// All ranges, in selector order.
    pub const ALL: [Self; 4] = [
        Self::Last7Days,
        Self::Last30Days,
        Self::Last90Days,
        Self::Last12Months,
    ];

    /// Query-string value.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Last7Days => "7d",
            Self::Last30Days => "30d",
            Self::Last90Days => "90d",
            Self::Last12Months => "12m",
        }
    }

    /// Selector label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Last7Days => "Last 7 days",
            Self::Last30Days => "Last 30 days",
            Self::Last90Days => "Last 90 days",
            Self::Last12Months => "Last 12 months",
        }
    }

    /// Parse a query-string value, falling back to the default window.
    #[must_use]
    pub fn from_param(param: Option<&str>) -> Self {
        Self::ALL
            .into_iter()
            .find(|r| Some(r.as_str()) == param)
            .unwrap_or_default()
    }

    /// Bucket granularity.
    #[must_use]
    pub const fn bucket(&self) -> Bucket {
        match self {
            Self::Last12Months => Bucket::Month,
            _ => Bucket::Day,
        }
    }

    /// Current window `[start, end)` for a given "today".
    #[must_use]
    pub fn bounds(&self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        let end = today.checked_add_days(Days::new(1)).unwrap_or(today);
        let start = match self {
            Self::Last7Days => today.checked_sub_days(Days::new(6)),
            Self::Last30Days => today.checked_sub_days(Days::new(29)),
            Self::Last90Days => today.checked_sub_days(Days::new(89)),
            Self::Last12Months => Bucket::Month
                .truncate(today)
                .checked_sub_months(Months::new(11)),
        }
        .unwrap_or(NaiveDate::MIN);

        match self {
            Self::Last12Months => (start, Bucket::Month.next(Bucket::Month.truncate(today))),
            _ => (start, end),
        }
    }

    /// The window of equal length immediately before [`Self::bounds`].
    #[must_use]
    pub fn previous_bounds(&self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        let (start, end) = self.bounds(today);
        let prev_start = match self {
            Self::Last12Months => start.checked_sub_months(Months::new(12)),
            _ => {
                let days = u64::try_from((end - start).num_days()).unwrap_or(0);
                start.checked_sub_days(Days::new(days))
            }
        }
        .unwrap_or(NaiveDate::MIN);
        (prev_start, start)
    }

    /// Every bucket start in the current window, ascending.
    #[must_use]
    pub fn buckets(&self, today: NaiveDate) -> Vec<NaiveDate> {
        let bucket = self.bucket();
        let (start, end) = self.bounds(today);
        let mut out = Vec::new();
        let mut cursor = bucket.truncate(start);
        while cursor < end {
            out.push(cursor);
            cursor = bucket.next(cursor);
        }
        out
    }
}
