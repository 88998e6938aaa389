use chrono::{Local, SecondsFormat};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::models::{condition::order_code, round2, Condition, ConditionResult};
use crate::session::SessionState;

use super::csv::dedup_results;

/// One spreadsheet row per recorded condition. Optional participant fields are
/// sent as empty strings so every row carries the same columns.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MirrorRow {
    pub participant_id: String,
    pub participant_name: String,
    pub consent_signed_at: String,
    pub participant_number: u64,
    pub order_number: String,
    /// e.g. `V-A-T`
    pub condition_order: String,
    pub age: String,
    pub short_videos_frequency: String,
    pub audio_frequency: String,
    pub text_frequency: String,
    pub caffeine_consumed: String,
    pub caffeine_time_ago: String,
    pub alertness: String,
    pub condition: Condition,
    pub condition_position: usize,
    pub real_duration_sec: u32,
    pub estimated_time_sec: u32,
    pub temporal_bias: i64,
    pub temporal_bias_percent: f64,
    /// Item ratings followed by group means and the overall mean.
    #[serde(flatten)]
    pub scores: Map<String, Value>,
    pub feedback: String,
    pub timestamp: String,
    pub date: String,
    pub time: String,
}

/// One row per distinct (condition, timestamp) result. Scores follow the
/// schema each result was collected with.
pub fn build_rows(state: &SessionState, include_participant_name: bool) -> Vec<MirrorRow> {
    let demographics = state.demographics.clone().unwrap_or_default();
    let condition_order = order_code(&state.condition_order);

    dedup_results(&state.results)
        .into_iter()
        .map(|result| MirrorRow {
            participant_id: state.participant_id.clone(),
            participant_name: if include_participant_name {
                state.participant_name.clone()
            } else {
                String::new()
            },
            consent_signed_at: state
                .consent_signed_at
                .map(|at| at.to_rfc3339_opts(SecondsFormat::Millis, true))
                .unwrap_or_default(),
            participant_number: state.participant_number.unwrap_or(0),
            order_number: state
                .order_number
                .map(|number| number.to_string())
                .unwrap_or_default(),
            condition_order: condition_order.clone(),
            age: demographics.age.map(|age| age.to_string()).unwrap_or_default(),
            short_videos_frequency: demographics
                .short_videos_frequency
                .map(|f| f.as_str().to_string())
                .unwrap_or_default(),
            audio_frequency: demographics
                .audio_frequency
                .map(|f| f.as_str().to_string())
                .unwrap_or_default(),
            text_frequency: demographics
                .text_frequency
                .map(|f| f.as_str().to_string())
                .unwrap_or_default(),
            caffeine_consumed: demographics.caffeine_label().to_string(),
            caffeine_time_ago: demographics
                .caffeine_time_ago
                .map(|t| t.as_str().to_string())
                .unwrap_or_default(),
            alertness: demographics
                .alertness
                .map(|a| a.to_string())
                .unwrap_or_default(),
            condition: result.condition,
            condition_position: state
                .condition_order
                .iter()
                .position(|condition| *condition == result.condition)
                .map_or(0, |index| index + 1),
            real_duration_sec: result.real_duration_sec,
            estimated_time_sec: result.estimated_time_sec,
            temporal_bias: result.temporal_bias(),
            temporal_bias_percent: round2(result.temporal_bias_percent()),
            scores: scores(result),
            feedback: result.feedback.clone().unwrap_or_default(),
            timestamp: result.timestamp_iso(),
            date: result.timestamp.format("%Y-%m-%d").to_string(),
            time: result
                .timestamp
                .with_timezone(&Local)
                .format("%H:%M:%S")
                .to_string(),
        })
        .collect()
}

fn scores(result: &ConditionResult) -> Map<String, Value> {
    let schema = result.schema.schema();
    let mut scores = Map::new();
    for item in schema.items {
        if let Some(value) = result.rating(item.id) {
            scores.insert(item.id.to_string(), Value::from(value));
        }
    }
    for group in schema.groups() {
        if let Some(mean) = schema.group_mean(group, &result.ratings) {
            scores.insert(format!("{group}Mean"), Value::from(round2(mean)));
        }
    }
    if let Some(overall) = schema.overall_mean(&result.ratings) {
        scores.insert("overallEngagement".into(), Value::from(round2(overall)));
    }
    scores
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DemographicData, Ratings, ResultPayload, SchemaVersion};
    use crate::order::ComputedOrder;
    use crate::session::StartSession;
    use chrono::{TimeZone, Utc};

    fn session() -> SessionState {
        let mut state = SessionState::new();
        state
            .begin(
                StartSession {
                    participant_id: "PT-ROWS01".into(),
                    participant_name: "Ada Lovelace".into(),
                    consent_signed_at: Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap(),
                    consent_signature: None,
                },
                ComputedOrder {
                    order: vec![Condition::Audio, Condition::Text, Condition::Video],
                    order_number: Some(4),
                    counter: Some(10),
                },
                SchemaVersion::ImmersionEngagementV1,
                Utc.with_ymd_and_hms(2025, 3, 1, 9, 1, 0).unwrap(),
            )
            .unwrap();

        let mut ratings: Ratings = SchemaVersion::ImmersionEngagementV1
            .schema()
            .items
            .iter()
            .map(|item| (item.id.to_string(), 4))
            .collect();
        ratings.insert("immersion1".into(), 1);
        state
            .record(
                ResultPayload {
                    estimated_time_sec: 135,
                    ratings,
                    feedback: None,
                },
                180,
                Utc.with_ymd_and_hms(2025, 3, 1, 9, 5, 0).unwrap(),
            )
            .unwrap();
        state.set_demographics(DemographicData {
            age: Some(31),
            caffeine_consumed: Some(false),
            ..DemographicData::default()
        });
        state
    }

    #[test]
    fn row_carries_order_and_derived_metrics() {
        let rows = build_rows(&session(), false);
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.condition_order, "A-T-V");
        assert_eq!(row.condition, Condition::Audio);
        assert_eq!(row.condition_position, 1);
        assert_eq!(row.order_number, "4");
        assert_eq!(row.participant_number, 10);
        assert_eq!(row.temporal_bias, -45);
        assert_eq!(row.temporal_bias_percent, -25.0);
        assert_eq!(row.participant_name, "");
        assert_eq!(row.age, "31");
        assert_eq!(row.caffeine_consumed, "No");
        assert_eq!(row.date, "2025-03-01");
        assert_eq!(row.scores["immersionMean"], Value::from(3.4));
        assert_eq!(row.scores["engagementMean"], Value::from(4.0));
        assert_eq!(row.scores["overallEngagement"], Value::from(3.7));
    }

    #[test]
    fn serialized_row_is_flat_camel_case() {
        let rows = build_rows(&session(), true);
        let json = serde_json::to_value(&rows[0]).unwrap();
        assert_eq!(json["participantName"], "Ada Lovelace");
        assert_eq!(json["immersion1"], 1);
        assert_eq!(json["familiarity"], 4);
        assert_eq!(json["conditionPosition"], 1);
        assert!(json.get("scores").is_none());
    }

    #[test]
    fn duplicate_results_give_one_row() {
        let mut state = session();
        let duplicate = state.results[0].clone();
        state.results.push(duplicate);
        let mut later = state.results[0].clone();
        later.timestamp = later.timestamp + chrono::Duration::minutes(3);
        later.estimated_time_sec = 190;
        state.results.push(later);

        let rows = build_rows(&state, false);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].estimated_time_sec, 135);
        assert_eq!(rows[1].estimated_time_sec, 190);
        assert!(rows.iter().all(|row| row.condition == Condition::Audio));
    }
}
