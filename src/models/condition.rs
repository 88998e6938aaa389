use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Error};
use serde::{Deserialize, Serialize};

/// One of the three media modalities a participant is exposed to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub enum Condition {
    Video,
    Audio,
    Text,
}

impl Condition {
    pub const ALL: [Condition; 3] = [Condition::Video, Condition::Audio, Condition::Text];

    pub fn as_str(&self) -> &'static str {
        match self {
            Condition::Video => "video",
            Condition::Audio => "audio",
            Condition::Text => "text",
        }
    }

    /// Single-letter code used in condition-order strings such as `V-A-T`.
    pub fn short_code(&self) -> char {
        match self {
            Condition::Video => 'V',
            Condition::Audio => 'A',
            Condition::Text => 'T',
        }
    }

    /// Text is read at the participant's own pace; video and audio run for a
    /// fixed configured duration.
    pub fn is_self_paced(&self) -> bool {
        matches!(self, Condition::Text)
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Condition {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "video" | "v" => Ok(Condition::Video),
            "audio" | "a" => Ok(Condition::Audio),
            "text" | "t" => Ok(Condition::Text),
            other => Err(anyhow!("unknown condition '{other}'")),
        }
    }
}

/// Renders an order as `V-A-T`.
pub fn order_code(order: &[Condition]) -> String {
    order
        .iter()
        .map(|condition| condition.short_code().to_string())
        .collect::<Vec<_>>()
        .join("-")
}

/// True when `order` contains every condition exactly once.
pub fn is_complete_permutation(order: &[Condition]) -> bool {
    order.len() == Condition::ALL.len()
        && Condition::ALL
            .iter()
            .all(|condition| order.iter().filter(|c| *c == condition).count() == 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_names_and_codes() {
        assert_eq!("Video".parse::<Condition>().unwrap(), Condition::Video);
        assert_eq!("t".parse::<Condition>().unwrap(), Condition::Text);
        assert!("podcast".parse::<Condition>().is_err());
    }

    #[test]
    fn serializes_lowercase() {
        let json = serde_json::to_string(&Condition::Audio).unwrap();
        assert_eq!(json, "\"audio\"");
    }

    #[test]
    fn permutation_check_rejects_duplicates() {
        assert!(is_complete_permutation(&[
            Condition::Text,
            Condition::Video,
            Condition::Audio
        ]));
        assert!(!is_complete_permutation(&[
            Condition::Text,
            Condition::Text,
            Condition::Audio
        ]));
        assert!(!is_complete_permutation(&[Condition::Text, Condition::Audio]));
    }

    #[test]
    fn order_code_joins_short_codes() {
        assert_eq!(
            order_code(&[Condition::Audio, Condition::Text, Condition::Video]),
            "A-T-V"
        );
    }
}
