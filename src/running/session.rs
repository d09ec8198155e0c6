use std::fmt::Display;

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::settings::Language;

/// How the session felt. Older data used two other vocabularies for the same four levels, both
/// are still accepted when reading.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ValueEnum,
)]
pub enum Feeling {
    #[serde(alias = "great")]
    Excellent,
    #[serde(alias = "good", alias = "Bien")]
    Good,
    #[serde(alias = "average", alias = "Moyen")]
    Average,
    #[serde(alias = "bad", alias = "Difficile")]
    Difficult,
}

impl Feeling {
    pub const ALL: [Feeling; 4] = [
        Feeling::Excellent,
        Feeling::Good,
        Feeling::Average,
        Feeling::Difficult,
    ];

    /// Name shown to the user.
    pub fn label(self, language: Language) -> &'static str {
        match (language, self) {
            (Language::En, Feeling::Excellent) => "Excellent",
            (Language::En, Feeling::Good) => "Good",
            (Language::En, Feeling::Average) => "Average",
            (Language::En, Feeling::Difficult) => "Difficult",
            (Language::Fr, Feeling::Excellent) => "Excellent",
            (Language::Fr, Feeling::Good) => "Bien",
            (Language::Fr, Feeling::Average) => "Moyen",
            (Language::Fr, Feeling::Difficult) => "Difficile",
        }
    }
}

impl Display for Feeling {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label(Language::En))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    #[default]
    Run,
    Rest,
}

/// Numbers recorded for a run. Every field is optional since people log what their watch gave
/// them.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetrics {
    /// Kilometers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
    /// Minutes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    /// Minutes per kilometer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pace: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calories: Option<f64>,
    /// Meters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elevation_gain: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_heart_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_heart_rate: Option<f64>,
}

impl SessionMetrics {
    pub fn is_empty(&self) -> bool {
        self.values().iter().all(|(_, v)| v.is_none())
    }

    /// Fills in the pace from distance and duration when it wasn't given, rounded to
    /// hundredths.
    pub fn with_derived_pace(mut self) -> Self {
        if let (None, Some(distance), Some(duration)) = (self.pace, self.distance, self.duration) {
            if distance > 0. {
                self.pace = Some((duration / distance * 100.).round() / 100.);
            }
        }
        self
    }

    fn values(&self) -> [(&'static str, Option<f64>); 7] {
        [
            ("distance", self.distance),
            ("duration", self.duration),
            ("pace", self.pace),
            ("calories", self.calories),
            ("elevation gain", self.elevation_gain),
            ("average heart rate", self.avg_heart_rate),
            ("max heart rate", self.max_heart_rate),
        ]
    }
}

/// One journal entry: a run or a rest day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunningSession {
    pub id: String,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub kind: SessionKind,
    pub feeling: Feeling,
    #[serde(default)]
    pub description: String,
    #[serde(flatten)]
    pub metrics: SessionMetrics,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum SessionError {
    #[error("Rest days can't carry performance metrics")]
    MetricsOnRestDay,

    #[error("Invalid {field}: {value}")]
    InvalidMetric { field: &'static str, value: f64 },

    #[error("No session with id {0}")]
    NotFound(String),

    #[error("A session with id {0} already exists")]
    DuplicateId(String),
}

impl RunningSession {
    pub fn new_run(
        date: DateTime<Utc>,
        feeling: Feeling,
        description: impl Into<String>,
        metrics: SessionMetrics,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            date,
            kind: SessionKind::Run,
            feeling,
            description: description.into(),
            metrics,
        }
    }

    pub fn new_rest(date: DateTime<Utc>, feeling: Feeling, description: impl Into<String>) -> Self {
        Self {
            kind: SessionKind::Rest,
            ..Self::new_run(date, feeling, description, SessionMetrics::default())
        }
    }

    pub fn is_rest(&self) -> bool {
        self.kind == SessionKind::Rest
    }

    /// Rest days have no numbers, runs have no negative or non-finite ones.
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.is_rest() && !self.metrics.is_empty() {
            return Err(SessionError::MetricsOnRestDay);
        }
        for (field, value) in self.metrics.values() {
            if let Some(value) = value {
                if !value.is_finite() || value < 0. {
                    return Err(SessionError::InvalidMetric { field, value });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    use crate::settings::Language;

    use super::{Feeling, RunningSession, SessionError, SessionKind, SessionMetrics};

    #[test]
    fn test_legacy_feelings_are_accepted() {
        let feelings: Vec<Feeling> =
            serde_json::from_value(json!(["great", "Bien", "Moyen", "bad", "Difficult"])).unwrap();
        assert_eq!(
            feelings,
            vec![
                Feeling::Excellent,
                Feeling::Good,
                Feeling::Average,
                Feeling::Difficult,
                Feeling::Difficult
            ]
        );
        assert_eq!(serde_json::to_value(Feeling::Good).unwrap(), json!("Good"));
        assert_eq!(Feeling::Average.label(Language::Fr), "Moyen");
    }

    #[test]
    fn test_session_json_layout() {
        let stored = json!({
            "id": "1705305600000",
            "date": "2024-01-15T08:00:00.000Z",
            "feeling": "Excellent",
            "description": "Tempo",
            "distance": 10.0,
            "avgHeartRate": 151
        });
        let session: RunningSession = serde_json::from_value(stored).unwrap();

        assert_eq!(session.kind, SessionKind::Run);
        assert_eq!(session.date, Utc.with_ymd_and_hms(2024, 1, 15, 8, 0, 0).unwrap());
        assert_eq!(session.metrics.distance, Some(10.0));
        assert_eq!(session.metrics.avg_heart_rate, Some(151.0));
        assert_eq!(session.metrics.pace, None);

        let back = serde_json::to_value(&session).unwrap();
        assert_eq!(back["avgHeartRate"], json!(151.0));
        assert!(back.get("pace").is_none());
    }

    #[test]
    fn test_derived_pace() {
        let metrics = SessionMetrics {
            distance: Some(5.2),
            duration: Some(30.),
            ..Default::default()
        }
        .with_derived_pace();
        assert_eq!(metrics.pace, Some(5.77));

        let given = SessionMetrics {
            distance: Some(10.),
            duration: Some(50.),
            pace: Some(4.9),
            ..Default::default()
        }
        .with_derived_pace();
        assert_eq!(given.pace, Some(4.9));
    }

    #[test]
    fn test_validation() {
        let date = Utc.with_ymd_and_hms(2024, 3, 1, 7, 0, 0).unwrap();
        assert_eq!(
            RunningSession::new_rest(date, Feeling::Good, "").validate(),
            Ok(())
        );

        let mut rest = RunningSession::new_rest(date, Feeling::Good, "");
        rest.metrics.distance = Some(3.);
        assert_eq!(rest.validate(), Err(SessionError::MetricsOnRestDay));

        let run = RunningSession::new_run(
            date,
            Feeling::Average,
            "",
            SessionMetrics {
                pace: Some(-1.),
                ..Default::default()
            },
        );
        assert_eq!(
            run.validate(),
            Err(SessionError::InvalidMetric {
                field: "pace",
                value: -1.
            })
        );
    }
}
