use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::condition::is_complete_permutation;
use crate::models::{Condition, ConditionResult, DemographicData, ResultPayload, SchemaVersion};
use crate::order::ComputedOrder;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SessionPhase {
    Idle,
    Active,
    Complete,
}

/// Everything the consent step hands over when a participant begins.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StartSession {
    pub participant_id: String,
    pub participant_name: String,
    pub consent_signed_at: DateTime<Utc>,
    /// Opaque consent artifact, e.g. a signature image data URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consent_signature: Option<String>,
}

/// Why a transition was not applied. These are guard failures, not errors;
/// the state is left untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    MissingParticipantId,
    NoActiveSession,
    NoPendingTrial,
    InvalidPayload(String),
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rejection::MissingParticipantId => f.write_str("participant id is required"),
            Rejection::NoActiveSession => f.write_str("no active session"),
            Rejection::NoPendingTrial => f.write_str("all conditions already recorded"),
            Rejection::InvalidPayload(reason) => write!(f, "invalid questionnaire payload: {reason}"),
        }
    }
}

/// Persisted session aggregate. Serialized as-is under the session key.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionState {
    pub participant_id: String,
    pub participant_name: String,
    pub consent_given: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consent_signed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consent_signature: Option<String>,
    pub condition_order: Vec<Condition>,
    /// Latin-square order number (1-6).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_number: Option<u8>,
    /// Counter value assigned at start, Latin-square only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub participant_number: Option<u64>,
    pub current_index: usize,
    /// Questionnaire version fixed when the session began. Every result is
    /// validated against it, whatever the configuration says later.
    pub schema: SchemaVersion,
    pub results: Vec<ConditionResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// Elapsed seconds measured for the trial about to be recorded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_duration_sec: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub demographics: Option<DemographicData>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        !self.participant_id.is_empty() && !self.condition_order.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        !self.condition_order.is_empty() && self.results.len() == self.condition_order.len()
    }

    pub fn phase(&self) -> SessionPhase {
        if !self.is_active() {
            SessionPhase::Idle
        } else if self.is_complete() {
            SessionPhase::Complete
        } else {
            SessionPhase::Active
        }
    }

    pub fn current_condition(&self) -> Option<Condition> {
        self.condition_order.get(self.current_index).copied()
    }

    pub fn condition_at(&self, index: usize) -> Option<Condition> {
        self.condition_order.get(index).copied()
    }

    pub fn result_for(&self, condition: Condition) -> Option<&ConditionResult> {
        self.results.iter().find(|result| result.condition == condition)
    }

    /// Replaces whatever was there with a fresh session at position 0.
    pub fn begin(
        &mut self,
        request: StartSession,
        computed: ComputedOrder,
        schema: SchemaVersion,
        now: DateTime<Utc>,
    ) -> Result<(), Rejection> {
        if request.participant_id.trim().is_empty() {
            return Err(Rejection::MissingParticipantId);
        }

        *self = Self {
            participant_id: request.participant_id,
            participant_name: request.participant_name,
            consent_given: true,
            consent_signed_at: Some(request.consent_signed_at),
            consent_signature: request.consent_signature,
            condition_order: computed.order,
            order_number: computed.order_number,
            participant_number: computed.counter,
            current_index: 0,
            schema,
            results: Vec::new(),
            started_at: Some(now),
            pending_duration_sec: None,
            demographics: None,
        };
        Ok(())
    }

    pub fn set_pending_duration(&mut self, seconds: u32) {
        self.pending_duration_sec = Some(seconds);
    }

    /// Real duration for `condition`: the pending measurement for the
    /// self-paced condition when one was taken, the fixed media length
    /// otherwise. A zero measurement counts as "not taken".
    pub fn resolve_duration(&self, condition: Condition, media_duration_sec: u32) -> u32 {
        match self.pending_duration_sec {
            Some(measured) if condition.is_self_paced() && measured > 0 => measured,
            _ => media_duration_sec,
        }
    }

    /// Builds the record for the current condition, replaces any earlier record
    /// for that condition, advances and clears the pending duration.
    pub fn record(
        &mut self,
        payload: ResultPayload,
        media_duration_sec: u32,
        now: DateTime<Utc>,
    ) -> Result<ConditionResult, Rejection> {
        if !self.is_active() {
            return Err(Rejection::NoActiveSession);
        }
        let condition = self.current_condition().ok_or(Rejection::NoPendingTrial)?;

        self.schema
            .schema()
            .validate(&payload.ratings)
            .map_err(|err| Rejection::InvalidPayload(err.to_string()))?;

        let result = ConditionResult::new(
            self.participant_id.clone(),
            condition,
            self.resolve_duration(condition, media_duration_sec),
            self.schema,
            payload,
            now,
        );

        self.results.retain(|existing| existing.condition != condition);
        self.results.push(result.clone());
        self.current_index = (self.current_index + 1).min(self.condition_order.len());
        self.pending_duration_sec = None;

        Ok(result)
    }

    pub fn set_demographics(&mut self, data: DemographicData) {
        self.demographics = Some(data);
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Repairs a record read back from storage. An order that is not a full
    /// permutation cannot be resumed and yields an idle state. Otherwise the
    /// index is clamped, only the latest result per condition is kept, and
    /// the schema follows the results when a record predates the field.
    pub fn normalized(mut self) -> Self {
        if !self.condition_order.is_empty() && !is_complete_permutation(&self.condition_order) {
            return Self::default();
        }

        let mut seen = HashSet::new();
        let mut latest: Vec<ConditionResult> = self
            .results
            .into_iter()
            .rev()
            .filter(|result| {
                self.condition_order.contains(&result.condition) && seen.insert(result.condition)
            })
            .collect();
        latest.reverse();
        self.results = latest;

        if let Some(first) = self.results.first() {
            self.schema = first.schema;
        }

        let len = self.condition_order.len();
        if self.current_index > len {
            self.current_index = len;
        }
        if self.current_index < self.results.len() {
            self.current_index = self.results.len();
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Ratings, LikertSchema};
    use crate::order::LATIN_SQUARE_ORDERS;
    use chrono::TimeZone;

    const MEDIA_SECS: u32 = 180;

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 10, minute, 0).unwrap()
    }

    fn ratings(schema: &LikertSchema, value: u8) -> Ratings {
        schema
            .items
            .iter()
            .map(|item| (item.id.to_string(), value))
            .collect()
    }

    fn payload(estimated: u32) -> ResultPayload {
        ResultPayload {
            estimated_time_sec: estimated,
            ratings: ratings(SchemaVersion::ImmersionEngagementV1.schema(), 3),
            feedback: None,
        }
    }

    fn started(order_slot: usize) -> SessionState {
        let mut state = SessionState::new();
        state
            .begin(
                StartSession {
                    participant_id: "PT-ABC123".into(),
                    participant_name: "Ada Lovelace".into(),
                    consent_signed_at: at(0),
                    consent_signature: None,
                },
                ComputedOrder {
                    order: LATIN_SQUARE_ORDERS[order_slot].to_vec(),
                    order_number: Some(order_slot as u8 + 1),
                    counter: Some(order_slot as u64 + 1),
                },
                SchemaVersion::ImmersionEngagementV1,
                at(1),
            )
            .unwrap();
        state
    }

    fn record(state: &mut SessionState, estimated: u32, minute: u32) -> Result<ConditionResult, Rejection> {
        state.record(payload(estimated), MEDIA_SECS, at(minute))
    }

    #[test]
    fn fresh_state_is_idle() {
        let state = SessionState::new();
        assert_eq!(state.phase(), SessionPhase::Idle);
        assert!(!state.is_complete());
        assert_eq!(state.current_condition(), None);
    }

    #[test]
    fn begin_requires_participant_id() {
        let mut state = SessionState::new();
        let rejected = state.begin(
            StartSession {
                participant_id: "  ".into(),
                participant_name: String::new(),
                consent_signed_at: at(0),
                consent_signature: None,
            },
            ComputedOrder {
                order: Condition::ALL.to_vec(),
                order_number: None,
                counter: None,
            },
            SchemaVersion::ImmersionEngagementV1,
            at(0),
        );
        assert_eq!(rejected, Err(Rejection::MissingParticipantId));
        assert_eq!(state, SessionState::new());
    }

    #[test]
    fn begin_sets_active_state() {
        let state = started(3);
        assert_eq!(state.phase(), SessionPhase::Active);
        assert!(state.consent_given);
        assert_eq!(state.order_number, Some(4));
        assert_eq!(state.current_condition(), Some(Condition::Audio));
        assert_eq!(state.condition_at(2), Some(Condition::Video));
        assert_eq!(state.condition_at(3), None);
    }

    #[test]
    fn three_records_complete_the_session() {
        let mut state = started(0);
        for (minute, estimated) in [(2, 200), (3, 150), (4, 170)] {
            record(&mut state, estimated, minute).unwrap();
        }
        assert!(state.is_complete());
        assert_eq!(state.phase(), SessionPhase::Complete);
        assert_eq!(state.current_index, 3);
        assert_eq!(state.current_condition(), None);
        assert_eq!(record(&mut state, 1, 5), Err(Rejection::NoPendingTrial));
        assert_eq!(state.results.len(), 3);
    }

    #[test]
    fn resubmitting_a_condition_keeps_only_the_latest() {
        let mut state = started(0);
        record(&mut state, 100, 2).unwrap();
        // Step back onto the same condition, as a retried submission would.
        state.current_index = 0;
        let second = record(&mut state, 250, 3).unwrap();

        let videos: Vec<_> = state
            .results
            .iter()
            .filter(|result| result.condition == Condition::Video)
            .collect();
        assert_eq!(videos.len(), 1);
        assert_eq!(videos[0], &second);
        assert_eq!(videos[0].estimated_time_sec, 250);
        assert_eq!(state.current_index, 1);
    }

    #[test]
    fn text_uses_pending_duration_once() {
        // Order 5: text, video, audio.
        let mut state = started(4);
        state.set_pending_duration(95);
        state.set_pending_duration(97);
        let text = record(&mut state, 120, 2).unwrap();
        assert_eq!(text.condition, Condition::Text);
        assert_eq!(text.real_duration_sec, 97);
        assert_eq!(state.pending_duration_sec, None);

        let video = record(&mut state, 120, 3).unwrap();
        assert_eq!(video.real_duration_sec, MEDIA_SECS);
    }

    #[test]
    fn media_ignores_pending_duration() {
        let mut state = started(0);
        state.set_pending_duration(12);
        let video = record(&mut state, 120, 2).unwrap();
        assert_eq!(video.real_duration_sec, MEDIA_SECS);
        assert_eq!(state.pending_duration_sec, None);
    }

    #[test]
    fn text_without_measurement_falls_back_to_media_duration() {
        let mut state = started(4);
        state.set_pending_duration(0);
        let text = record(&mut state, 120, 2).unwrap();
        assert_eq!(text.real_duration_sec, MEDIA_SECS);
    }

    #[test]
    fn invalid_payload_leaves_state_untouched() {
        let mut state = started(0);
        let before = state.clone();
        let mut bad = payload(100);
        bad.ratings.insert("confidence".into(), 9);
        let rejected = state.record(bad, MEDIA_SECS, at(2));
        assert!(matches!(rejected, Err(Rejection::InvalidPayload(_))));
        assert_eq!(state, before);
    }

    #[test]
    fn recording_without_session_is_rejected() {
        let mut state = SessionState::new();
        assert_eq!(record(&mut state, 100, 2), Err(Rejection::NoActiveSession));
        assert!(state.results.is_empty());
    }

    #[test]
    fn restart_overwrites_progress() {
        let mut state = started(0);
        record(&mut state, 100, 2).unwrap();
        state.set_demographics(DemographicData::default());

        state
            .begin(
                StartSession {
                    participant_id: "PT-NEW999".into(),
                    participant_name: String::new(),
                    consent_signed_at: at(5),
                    consent_signature: Some("data:image/png;base64,AAAA".into()),
                },
                ComputedOrder {
                    order: LATIN_SQUARE_ORDERS[1].to_vec(),
                    order_number: Some(2),
                    counter: Some(2),
                },
                SchemaVersion::ExperienceV2,
                at(6),
            )
            .unwrap();

        assert_eq!(state.participant_id, "PT-NEW999");
        assert!(state.results.is_empty());
        assert_eq!(state.current_index, 0);
        assert_eq!(state.demographics, None);
        assert_eq!(state.started_at, Some(at(6)));
        assert_eq!(state.schema, SchemaVersion::ExperienceV2);
    }

    #[test]
    fn record_validates_against_session_schema() {
        let mut state = started(0);
        let experience = ResultPayload {
            estimated_time_sec: 100,
            ratings: ratings(SchemaVersion::ExperienceV2.schema(), 6),
            feedback: None,
        };
        assert!(matches!(
            state.record(experience, MEDIA_SECS, at(2)),
            Err(Rejection::InvalidPayload(_))
        ));
        let video = record(&mut state, 100, 3).unwrap();
        assert_eq!(video.schema, SchemaVersion::ImmersionEngagementV1);
    }

    #[test]
    fn reset_returns_to_idle() {
        let mut state = started(0);
        record(&mut state, 100, 2).unwrap();
        state.reset();
        assert_eq!(state.phase(), SessionPhase::Idle);
        assert!(state.results.is_empty());
        assert!(state.condition_order.is_empty());
        assert!(!state.is_complete());
    }

    #[test]
    fn normalized_clamps_index() {
        let mut state = started(0);
        state.current_index = 9;
        assert_eq!(state.normalized().current_index, 3);
    }

    #[test]
    fn normalized_drops_sessions_without_a_full_order() {
        let mut state = started(0);
        record(&mut state, 100, 2).unwrap();
        state.condition_order = vec![Condition::Video, Condition::Video, Condition::Text];
        let restored = state.normalized();
        assert_eq!(restored, SessionState::new());
        assert_eq!(restored.phase(), SessionPhase::Idle);
    }

    #[test]
    fn normalized_keeps_latest_result_per_condition() {
        let mut state = started(0);
        record(&mut state, 100, 2).unwrap();
        let mut stale = state.results[0].clone();
        stale.estimated_time_sec = 55;
        state.results.insert(0, stale);

        let restored = state.normalized();
        assert_eq!(restored.results.len(), 1);
        assert_eq!(restored.results[0].estimated_time_sec, 100);
        assert_eq!(restored.current_index, 1);
        assert_eq!(restored.phase(), SessionPhase::Active);
    }

    #[test]
    fn normalized_takes_schema_from_results() {
        let mut state = started(0);
        record(&mut state, 100, 2).unwrap();
        let mut json = serde_json::to_value(&state).unwrap();
        json.as_object_mut().unwrap().remove("schema");
        json["results"][0]["schema"] = serde_json::json!("experience-v2");

        let restored: SessionState = serde_json::from_value(json).unwrap();
        assert_eq!(restored.schema, SchemaVersion::ImmersionEngagementV1);
        assert_eq!(restored.normalized().schema, SchemaVersion::ExperienceV2);
    }

    #[test]
    fn json_round_trip_preserves_state() {
        let mut state = started(2);
        state.set_pending_duration(40);
        record(&mut state, 111, 2).unwrap();
        let json = serde_json::to_string(&state).unwrap();
        assert!(json.contains("\"conditionOrder\":[\"audio\",\"video\",\"text\"]"));
        let restored: SessionState = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, state);
    }
}
