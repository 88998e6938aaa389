use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Error};
use serde::{Deserialize, Serialize};

use crate::models::Condition;

/// What ended a trial.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CompletionTrigger {
    /// The player reported the end of the media.
    MediaEnded,
    /// The fixed media duration ran out.
    FallbackTimeout,
    Skipped,
    /// The participant finished reading.
    TextContinue,
}

impl CompletionTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompletionTrigger::MediaEnded => "media_ended",
            CompletionTrigger::FallbackTimeout => "fallback_timeout",
            CompletionTrigger::Skipped => "skipped",
            CompletionTrigger::TextContinue => "text_continue",
        }
    }

    /// Text only ends through the participant; media never does.
    pub fn applies_to(&self, condition: Condition) -> bool {
        match self {
            CompletionTrigger::TextContinue => condition.is_self_paced(),
            _ => !condition.is_self_paced(),
        }
    }

    /// Duration to stage for the questionnaire. A skipped media trial stages 0,
    /// which later resolves to the fixed media duration.
    pub fn pending_duration(&self, elapsed_sec: u32) -> Option<u32> {
        match self {
            CompletionTrigger::TextContinue => Some(elapsed_sec),
            CompletionTrigger::Skipped => Some(0),
            CompletionTrigger::MediaEnded | CompletionTrigger::FallbackTimeout => None,
        }
    }
}

impl fmt::Display for CompletionTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompletionTrigger {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "media_ended" | "ended" => Ok(CompletionTrigger::MediaEnded),
            "fallback_timeout" | "timeout" => Ok(CompletionTrigger::FallbackTimeout),
            "skipped" | "skip" => Ok(CompletionTrigger::Skipped),
            "text_continue" | "continue" => Ok(CompletionTrigger::TextContinue),
            other => Err(anyhow!("unknown completion trigger '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TrialOutcome {
    pub condition: Condition,
    pub trigger: CompletionTrigger,
    /// Wall time from trial start to completion, rounded to whole seconds.
    pub elapsed_sec: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_duration_sec: Option<u32>,
}
