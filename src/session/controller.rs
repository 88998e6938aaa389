use std::sync::Arc;

use chrono::Utc;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::models::{Condition, ConditionResult, DemographicData, ResultPayload, SchemaVersion};
use crate::order::{compute_order, OrderMode};
use crate::storage::{
    clear_key, read_json, write_json, KeyValueStore, PARTICIPANT_COUNTER_KEY, SESSION_STATE_KEY,
};
use crate::trial::TrialOutcome;

use super::{SessionPhase, SessionState, StartSession};

pub const DEFAULT_MEDIA_DURATION_SECS: u32 = 180;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    pub order_mode: OrderMode,
    /// Length of the fixed-duration media conditions.
    pub media_duration_secs: u32,
    pub schema: SchemaVersion,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            order_mode: OrderMode::LatinSquare,
            media_duration_secs: DEFAULT_MEDIA_DURATION_SECS,
            schema: SchemaVersion::default(),
        }
    }
}

/// Owns the live session and keeps the store in step with it. Every mutating
/// call persists before returning; construction rehydrates whatever the last
/// process left behind.
#[derive(Clone)]
pub struct SessionController {
    state: Arc<Mutex<SessionState>>,
    store: Arc<dyn KeyValueStore>,
    config: SessionConfig,
}

impl SessionController {
    pub async fn hydrate(store: Arc<dyn KeyValueStore>, config: SessionConfig) -> Self {
        let state = match read_json::<SessionState>(store.as_ref(), SESSION_STATE_KEY).await {
            Some(stored) => {
                let was_active = stored.is_active();
                let stored = stored.normalized();
                if was_active && !stored.is_active() {
                    warn!("Stored session has an unusable condition order; starting idle");
                } else if stored.is_active() {
                    info!(
                        "Resuming session for {} at condition {}/{}",
                        stored.participant_id,
                        stored.current_index + 1,
                        stored.condition_order.len()
                    );
                }
                stored
            }
            None => SessionState::new(),
        };

        Self {
            state: Arc::new(Mutex::new(state)),
            store,
            config,
        }
    }

    pub fn config(&self) -> SessionConfig {
        self.config
    }

    pub async fn snapshot(&self) -> SessionState {
        self.state.lock().await.clone()
    }

    /// Schema results are recorded against: the session's own once one has
    /// begun, the configured one before that.
    pub async fn active_schema(&self) -> SchemaVersion {
        let state = self.state.lock().await;
        if state.is_active() {
            state.schema
        } else {
            self.config.schema
        }
    }

    pub async fn phase(&self) -> SessionPhase {
        self.state.lock().await.phase()
    }

    pub async fn is_complete(&self) -> bool {
        self.state.lock().await.is_complete()
    }

    pub async fn current_condition(&self) -> Option<Condition> {
        self.state.lock().await.current_condition()
    }

    pub async fn condition_at(&self, index: usize) -> Option<Condition> {
        self.state.lock().await.condition_at(index)
    }

    /// Last counter value written by a Latin-square start; 0 if none.
    pub async fn participant_counter(&self) -> u64 {
        read_json::<u64>(self.store.as_ref(), PARTICIPANT_COUNTER_KEY)
            .await
            .unwrap_or(0)
    }

    /// Starts a new session, overwriting any session in progress. Returns the
    /// new state, or `None` when the request was rejected.
    pub async fn start(&self, request: StartSession) -> Option<SessionState> {
        let mut state = self.state.lock().await;

        if request.participant_id.trim().is_empty() {
            warn!("Ignoring session start without a participant id");
            return None;
        }

        if state.is_active() {
            warn!(
                "Starting {} replaces unfinished session {} ({} of {} recorded)",
                request.participant_id,
                state.participant_id,
                state.results.len(),
                state.condition_order.len()
            );
        }

        let counter_state = match self.config.order_mode {
            OrderMode::LatinSquare => self.participant_counter().await,
            OrderMode::Random => 0,
        };
        let computed = compute_order(self.config.order_mode, counter_state, &mut rand::thread_rng());

        if let Some(counter) = computed.counter {
            if !write_json(self.store.as_ref(), PARTICIPANT_COUNTER_KEY, &counter).await {
                warn!("Participant counter {counter} was not persisted; the next start may reuse order slot");
            }
        }

        if let Err(rejection) = state.begin(request, computed, self.config.schema, Utc::now()) {
            warn!("Session start rejected: {rejection}");
            return None;
        }

        info!(
            "Started session {} with order {:?} ({} mode{})",
            state.participant_id,
            state.condition_order,
            self.config.order_mode,
            state
                .order_number
                .map(|number| format!(", order #{number}"))
                .unwrap_or_default()
        );

        self.persist(&state).await;
        Some(state.clone())
    }

    pub async fn set_pending_duration(&self, seconds: u32) {
        let mut state = self.state.lock().await;
        state.set_pending_duration(seconds);
        debug!("Pending duration set to {seconds}s");
        self.persist(&state).await;
    }

    /// Records the questionnaire for the current condition. Returns the stored
    /// record, or `None` if there was no trial to record against or the
    /// payload did not fit the schema.
    pub async fn record_result(&self, payload: ResultPayload) -> Option<ConditionResult> {
        let mut state = self.state.lock().await;
        match state.record(payload, self.config.media_duration_secs, Utc::now()) {
            Ok(result) => {
                info!(
                    "Recorded {} for {}: estimated {}s, real {}s",
                    result.condition,
                    result.participant_id,
                    result.estimated_time_sec,
                    result.real_duration_sec
                );
                self.persist(&state).await;
                Some(result)
            }
            Err(rejection) => {
                warn!("Result not recorded: {rejection}");
                None
            }
        }
    }

    /// Applies a finished trial: a self-paced trial for the current condition
    /// leaves its measured time as the pending duration.
    pub async fn complete_trial(&self, outcome: &TrialOutcome) {
        let mut state = self.state.lock().await;
        if state.current_condition() != Some(outcome.condition) {
            warn!(
                "Ignoring {} trial outcome; current condition is {:?}",
                outcome.condition,
                state.current_condition()
            );
            return;
        }
        if let Some(seconds) = outcome.pending_duration_sec {
            state.set_pending_duration(seconds);
            self.persist(&state).await;
        }
    }

    pub async fn set_demographics(&self, data: DemographicData) {
        let mut state = self.state.lock().await;
        let issues = data.validate();
        if !issues.is_empty() {
            debug!(
                "Demographics stored with unanswered fields: {:?}",
                issues.iter().map(|issue| issue.field()).collect::<Vec<_>>()
            );
        }
        state.set_demographics(data);
        self.persist(&state).await;
    }

    /// Back to idle. The participant counter survives a reset.
    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        state.reset();
        clear_key(self.store.as_ref(), SESSION_STATE_KEY).await;
        info!("Session reset");
    }

    async fn persist(&self, state: &SessionState) {
        if !write_json(self.store.as_ref(), SESSION_STATE_KEY, state).await {
            warn!("Session state kept in memory only");
        }
    }
}
