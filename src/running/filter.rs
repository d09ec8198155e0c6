use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::time::months_before;

use super::session::{Feeling, RunningSession};

/// How far back the date range reaches by default.
const DEFAULT_RANGE_MONTHS: u32 = 3;

/// Metrics that can be bounded by a [RangeFilter].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricField {
    Distance,
    Duration,
    Pace,
    Elevation,
    /// Average heart rate of the session.
    HeartRate,
}

impl MetricField {
    pub const ALL: [MetricField; 5] = [
        MetricField::Distance,
        MetricField::Duration,
        MetricField::Pace,
        MetricField::Elevation,
        MetricField::HeartRate,
    ];

    pub fn value(self, session: &RunningSession) -> Option<f64> {
        let metrics = &session.metrics;
        match self {
            MetricField::Distance => metrics.distance,
            MetricField::Duration => metrics.duration,
            MetricField::Pace => metrics.pace,
            MetricField::Elevation => metrics.elevation_gain,
            MetricField::HeartRate => metrics.avg_heart_rate,
        }
    }
}

/// Inclusive bounds on a metric. `None` leaves that side open.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RangeFilter {
    pub enabled: bool,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl RangeFilter {
    pub fn between(min: Option<f64>, max: Option<f64>) -> Self {
        Self {
            enabled: true,
            min,
            max,
        }
    }

    /// Sessions without the metric never match an enabled range.
    fn matches(&self, value: Option<f64>) -> bool {
        if !self.enabled {
            return true;
        }
        let Some(value) = value else {
            return false;
        };
        self.min.map_or(true, |min| value >= min) && self.max.map_or(true, |max| value <= max)
    }
}

/// Both ends are exclusive: a session dated exactly on `start_date` or `end_date` is left out.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRangeFilter {
    pub enabled: bool,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

impl DateRangeFilter {
    fn matches(&self, date: DateTime<Utc>) -> bool {
        !self.enabled || (date > self.start_date && date < self.end_date)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeelingFilter {
    pub enabled: bool,
    pub values: BTreeSet<Feeling>,
}

impl FeelingFilter {
    fn matches(&self, feeling: Feeling) -> bool {
        !self.enabled || self.values.contains(&feeling)
    }
}

/// Every sub-filter is applied independently and a session has to pass all enabled ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterOptions {
    pub date_range: DateRangeFilter,
    pub distance: RangeFilter,
    pub duration: RangeFilter,
    pub pace: RangeFilter,
    pub elevation: RangeFilter,
    pub heart_rate: RangeFilter,
    pub feeling: FeelingFilter,
}

impl FilterOptions {
    /// Nothing enabled. The date range is prepared to cover the last three months before `now`
    /// and the feeling filter has every value selected, so enabling either one without touching
    /// anything else keeps the current view.
    pub fn default_at(now: DateTime<Utc>) -> Self {
        Self {
            date_range: DateRangeFilter {
                enabled: false,
                start_date: months_before(now, DEFAULT_RANGE_MONTHS),
                end_date: now,
            },
            distance: RangeFilter::default(),
            duration: RangeFilter::default(),
            pace: RangeFilter::default(),
            elevation: RangeFilter::default(),
            heart_rate: RangeFilter::default(),
            feeling: FeelingFilter {
                enabled: false,
                values: Feeling::ALL.into_iter().collect(),
            },
        }
    }

    pub fn range(&self, field: MetricField) -> &RangeFilter {
        match field {
            MetricField::Distance => &self.distance,
            MetricField::Duration => &self.duration,
            MetricField::Pace => &self.pace,
            MetricField::Elevation => &self.elevation,
            MetricField::HeartRate => &self.heart_rate,
        }
    }

    pub fn range_mut(&mut self, field: MetricField) -> &mut RangeFilter {
        match field {
            MetricField::Distance => &mut self.distance,
            MetricField::Duration => &mut self.duration,
            MetricField::Pace => &mut self.pace,
            MetricField::Elevation => &mut self.elevation,
            MetricField::HeartRate => &mut self.heart_rate,
        }
    }

    pub fn matches(&self, session: &RunningSession) -> bool {
        self.date_range.matches(session.date)
            && self.feeling.matches(session.feeling)
            && MetricField::ALL
                .into_iter()
                .all(|field| self.range(field).matches(field.value(session)))
    }
}

/// Sessions passing `options`, most recent first. Sessions on the same date keep their original
/// order.
pub fn apply_filters(sessions: &[RunningSession], options: &FilterOptions) -> Vec<RunningSession> {
    let mut filtered = sessions
        .iter()
        .filter(|session| options.matches(session))
        .cloned()
        .collect::<Vec<_>>();
    filtered.sort_by(|a, b| b.date.cmp(&a.date));
    filtered
}
