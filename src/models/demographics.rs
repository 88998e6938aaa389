use std::str::FromStr;

use anyhow::{anyhow, Error};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MediaFrequency {
    VeryRarely,
    Rarely,
    Sometimes,
    Often,
    VeryOften,
}

impl MediaFrequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaFrequency::VeryRarely => "very_rarely",
            MediaFrequency::Rarely => "rarely",
            MediaFrequency::Sometimes => "sometimes",
            MediaFrequency::Often => "often",
            MediaFrequency::VeryOften => "very_often",
        }
    }
}

impl FromStr for MediaFrequency {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "very_rarely" => Ok(MediaFrequency::VeryRarely),
            "rarely" => Ok(MediaFrequency::Rarely),
            "sometimes" => Ok(MediaFrequency::Sometimes),
            "often" => Ok(MediaFrequency::Often),
            "very_often" => Ok(MediaFrequency::VeryOften),
            other => Err(anyhow!("unknown media frequency '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CaffeineTime {
    #[serde(rename = "less_than_1_hour")]
    LessThanOneHour,
    #[serde(rename = "1_to_3_hours")]
    OneToThreeHours,
    #[serde(rename = "more_than_3_hours")]
    MoreThanThreeHours,
}

impl CaffeineTime {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaffeineTime::LessThanOneHour => "less_than_1_hour",
            CaffeineTime::OneToThreeHours => "1_to_3_hours",
            CaffeineTime::MoreThanThreeHours => "more_than_3_hours",
        }
    }
}

impl FromStr for CaffeineTime {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "less_than_1_hour" => Ok(CaffeineTime::LessThanOneHour),
            "1_to_3_hours" => Ok(CaffeineTime::OneToThreeHours),
            "more_than_3_hours" => Ok(CaffeineTime::MoreThanThreeHours),
            other => Err(anyhow!("unknown caffeine time '{other}'")),
        }
    }
}

/// Answers from the one-off demographic questionnaire.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DemographicData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_videos_frequency: Option<MediaFrequency>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_frequency: Option<MediaFrequency>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_frequency: Option<MediaFrequency>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caffeine_consumed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caffeine_time_ago: Option<CaffeineTime>,
    /// 1 (very tired) to 5 (very alert).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alertness: Option<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemographicIssue {
    AgeRequired,
    MediaUsageRequired(&'static str),
    CaffeineRequired,
    CaffeineTimeRequired,
    AlertnessRequired,
}

impl DemographicIssue {
    pub fn field(&self) -> &'static str {
        match self {
            DemographicIssue::AgeRequired => "age",
            DemographicIssue::MediaUsageRequired(field) => field,
            DemographicIssue::CaffeineRequired => "caffeineConsumed",
            DemographicIssue::CaffeineTimeRequired => "caffeineTimeAgo",
            DemographicIssue::AlertnessRequired => "alertness",
        }
    }
}

impl DemographicData {
    /// Fields the questionnaire would flag before accepting the form. The time
    /// since caffeine is only required when caffeine was consumed.
    pub fn validate(&self) -> Vec<DemographicIssue> {
        let mut issues = Vec::new();
        if !matches!(self.age, Some(age) if age > 0) {
            issues.push(DemographicIssue::AgeRequired);
        }
        if self.short_videos_frequency.is_none() {
            issues.push(DemographicIssue::MediaUsageRequired("shortVideosFrequency"));
        }
        if self.audio_frequency.is_none() {
            issues.push(DemographicIssue::MediaUsageRequired("audioFrequency"));
        }
        if self.text_frequency.is_none() {
            issues.push(DemographicIssue::MediaUsageRequired("textFrequency"));
        }
        match self.caffeine_consumed {
            None => issues.push(DemographicIssue::CaffeineRequired),
            Some(true) if self.caffeine_time_ago.is_none() => {
                issues.push(DemographicIssue::CaffeineTimeRequired)
            }
            _ => {}
        }
        if !matches!(self.alertness, Some(1..=5)) {
            issues.push(DemographicIssue::AlertnessRequired);
        }
        issues
    }

    pub fn is_complete(&self) -> bool {
        self.validate().is_empty()
    }

    /// `Yes`/`No` as exported; empty when unanswered.
    pub fn caffeine_label(&self) -> &'static str {
        match self.caffeine_consumed {
            Some(true) => "Yes",
            Some(false) => "No",
            None => "",
        }
    }
}
