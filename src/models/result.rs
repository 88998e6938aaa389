use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use super::{Condition, Ratings, SchemaVersion};

/// Questionnaire answers as submitted, before the session fills in identity,
/// condition, measured duration and timestamp.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResultPayload {
    pub estimated_time_sec: u32,
    pub ratings: Ratings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
}

/// Measurement collected after one condition. Never mutated once built; a
/// resubmission for the same condition produces a new record that replaces it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConditionResult {
    pub participant_id: String,
    pub condition: Condition,
    pub real_duration_sec: u32,
    pub estimated_time_sec: u32,
    #[serde(default)]
    pub schema: SchemaVersion,
    pub ratings: Ratings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ConditionResult {
    pub fn new(
        participant_id: String,
        condition: Condition,
        real_duration_sec: u32,
        schema: SchemaVersion,
        payload: ResultPayload,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            participant_id,
            condition,
            real_duration_sec,
            estimated_time_sec: payload.estimated_time_sec,
            schema,
            ratings: payload.ratings,
            feedback: payload.feedback,
            timestamp,
        }
    }

    /// Estimated minus real duration; positive means overestimation.
    pub fn temporal_bias(&self) -> i64 {
        i64::from(self.estimated_time_sec) - i64::from(self.real_duration_sec)
    }

    /// Bias relative to the real duration, in percent. Zero when the real
    /// duration is zero.
    pub fn temporal_bias_percent(&self) -> f64 {
        if self.real_duration_sec == 0 {
            return 0.0;
        }
        self.temporal_bias() as f64 / f64::from(self.real_duration_sec) * 100.0
    }

    pub fn rating(&self, id: &str) -> Option<u8> {
        self.ratings.get(id).copied()
    }

    /// ISO-8601 with millisecond precision, e.g. `2025-03-01T10:15:00.000Z`.
    pub fn timestamp_iso(&self) -> String {
        self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

/// Aggregates shown on the results screen.
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResultSummary {
    pub mean_error_sec: f64,
    pub mean_actual_duration_sec: f64,
}

pub fn summarize(results: &[ConditionResult]) -> ResultSummary {
    if results.is_empty() {
        return ResultSummary {
            mean_error_sec: 0.0,
            mean_actual_duration_sec: 0.0,
        };
    }
    let count = results.len() as f64;
    let total_error: i64 = results.iter().map(ConditionResult::temporal_bias).sum();
    let total_actual: u64 = results
        .iter()
        .map(|result| u64::from(result.real_duration_sec))
        .sum();
    ResultSummary {
        mean_error_sec: total_error as f64 / count,
        mean_actual_duration_sec: total_actual as f64 / count,
    }
}
