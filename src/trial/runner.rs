use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};
use std::time::Duration;

use log::{debug, info};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

use crate::models::Condition;

use super::{CompletionTrigger, TrialOutcome};

/// Starts trials. Media trials get a fallback timer for the configured
/// duration; the self-paced text trial runs until the participant continues.
#[derive(Debug, Clone, Copy)]
pub struct TrialRunner {
    media_duration: Duration,
}

impl TrialRunner {
    pub fn new(media_duration_secs: u32) -> Self {
        Self {
            media_duration: Duration::from_secs(u64::from(media_duration_secs)),
        }
    }

    pub fn media_duration(&self) -> Duration {
        self.media_duration
    }

    /// Must be called from within a tokio runtime.
    pub fn start(&self, condition: Condition) -> TrialHandle {
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let shared = Arc::new(TrialShared {
            condition,
            started: Instant::now(),
            completed: AtomicBool::new(false),
            cancel_token: CancellationToken::new(),
            outcome_tx: Mutex::new(Some(outcome_tx)),
        });

        let timer = if condition.is_self_paced() {
            None
        } else {
            let shared = shared.clone();
            let duration = self.media_duration;
            Some(tokio::spawn(async move {
                tokio::select! {
                    _ = shared.cancel_token.cancelled() => {}
                    _ = time::sleep(duration) => {
                        shared.finish(CompletionTrigger::FallbackTimeout);
                    }
                }
            }))
        };

        info!("Trial started for {condition}");

        TrialHandle {
            shared,
            outcome_rx,
            timer,
        }
    }
}

struct TrialShared {
    condition: Condition,
    started: Instant,
    completed: AtomicBool,
    cancel_token: CancellationToken,
    outcome_tx: Mutex<Option<oneshot::Sender<TrialOutcome>>>,
}

impl TrialShared {
    fn finish(&self, trigger: CompletionTrigger) -> Option<TrialOutcome> {
        if !trigger.applies_to(self.condition) {
            debug!("Ignoring {trigger} for {} trial", self.condition);
            return None;
        }

        if self
            .completed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Trial for {} already completed; {trigger} ignored", self.condition);
            return None;
        }

        self.cancel_token.cancel();

        let elapsed_sec = round_secs(self.started.elapsed());
        let outcome = TrialOutcome {
            condition: self.condition,
            trigger,
            elapsed_sec,
            pending_duration_sec: trigger.pending_duration(elapsed_sec),
        };

        if let Some(tx) = self.take_sender() {
            let _ = tx.send(outcome.clone());
        }

        info!(
            "Trial for {} completed by {trigger} after {elapsed_sec}s",
            self.condition
        );
        Some(outcome)
    }

    fn abort(&self) {
        self.completed.store(true, Ordering::Release);
        self.cancel_token.cancel();
        // Dropping the sender wakes any waiter with no outcome.
        drop(self.take_sender());
    }

    fn take_sender(&self) -> Option<oneshot::Sender<TrialOutcome>> {
        match self.outcome_tx.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }
}

fn round_secs(elapsed: Duration) -> u32 {
    let secs = (elapsed.as_millis() + 500) / 1000;
    u32::try_from(secs).unwrap_or(u32::MAX)
}

/// A running trial. Completion fires at most once across every trigger,
/// including the fallback timer.
pub struct TrialHandle {
    shared: Arc<TrialShared>,
    outcome_rx: oneshot::Receiver<TrialOutcome>,
    timer: Option<JoinHandle<()>>,
}

impl TrialHandle {
    pub fn condition(&self) -> Condition {
        self.shared.condition
    }

    pub fn is_completed(&self) -> bool {
        self.shared.completed.load(Ordering::Acquire)
    }

    /// Returns the outcome if this call was the one that completed the trial.
    pub fn complete(&self, trigger: CompletionTrigger) -> Option<TrialOutcome> {
        self.shared.finish(trigger)
    }

    /// A cloneable handle for completing the trial from another task.
    pub fn completer(&self) -> TrialCompleter {
        TrialCompleter {
            shared: self.shared.clone(),
        }
    }

    /// Waits for whichever trigger wins. `None` if the trial was aborted.
    pub async fn wait(&mut self) -> Option<TrialOutcome> {
        let outcome = (&mut self.outcome_rx).await.ok();
        if let Some(timer) = self.timer.take() {
            let _ = timer.await;
        }
        outcome
    }

    /// Abandons the trial without an outcome. Later triggers are ignored.
    pub fn abort(&self) {
        self.shared.abort();
    }
}

impl Drop for TrialHandle {
    fn drop(&mut self) {
        self.shared.cancel_token.cancel();
    }
}

#[derive(Clone)]
pub struct TrialCompleter {
    shared: Arc<TrialShared>,
}

impl TrialCompleter {
    pub fn complete(&self, trigger: CompletionTrigger) -> Option<TrialOutcome> {
        self.shared.finish(trigger)
    }
}
