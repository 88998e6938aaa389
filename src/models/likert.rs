//! Versioned Likert questionnaire schemas.
//!
//! Historical versions of the post-condition questionnaire used different item
//! sets and scale ranges. A result carries the version it was collected with so
//! that the CSV layer can lay out the right columns for it.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, bail, Error, Result};
use serde::{Deserialize, Serialize};

/// Ratings keyed by item id.
pub type Ratings = BTreeMap<String, u8>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SchemaVersion {
    ImmersionEngagementV1,
    ExperienceV2,
}

impl Default for SchemaVersion {
    fn default() -> Self {
        SchemaVersion::ImmersionEngagementV1
    }
}

impl SchemaVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaVersion::ImmersionEngagementV1 => "immersion-engagement-v1",
            SchemaVersion::ExperienceV2 => "experience-v2",
        }
    }

    pub fn schema(&self) -> &'static LikertSchema {
        match self {
            SchemaVersion::ImmersionEngagementV1 => &IMMERSION_ENGAGEMENT_V1,
            SchemaVersion::ExperienceV2 => &EXPERIENCE_V2,
        }
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SchemaVersion {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "immersion-engagement-v1" | "v1" => Ok(SchemaVersion::ImmersionEngagementV1),
            "experience-v2" | "v2" => Ok(SchemaVersion::ExperienceV2),
            other => Err(anyhow!("unknown likert schema '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LikertItem {
    pub id: &'static str,
    /// Composite group this item contributes to, if any.
    pub group: Option<&'static str>,
}

const fn item(id: &'static str) -> LikertItem {
    LikertItem { id, group: None }
}

const fn grouped(id: &'static str, group: &'static str) -> LikertItem {
    LikertItem {
        id,
        group: Some(group),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaColumn {
    Item(&'static str),
    GroupMean(&'static str),
}

impl SchemaColumn {
    pub fn header(&self) -> String {
        match self {
            SchemaColumn::Item(id) => (*id).to_string(),
            SchemaColumn::GroupMean(group) => format!("{group}Mean"),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct LikertSchema {
    pub version: SchemaVersion,
    /// Inclusive scale bounds.
    pub min: u8,
    pub max: u8,
    pub items: &'static [LikertItem],
}

pub static IMMERSION_ENGAGEMENT_V1: LikertSchema = LikertSchema {
    version: SchemaVersion::ImmersionEngagementV1,
    min: 1,
    max: 5,
    items: &[
        item("confidence"),
        grouped("immersion1", "immersion"),
        grouped("immersion2", "immersion"),
        grouped("immersion3", "immersion"),
        grouped("immersion4", "immersion"),
        grouped("immersion5", "immersion"),
        grouped("engagement1", "engagement"),
        grouped("engagement2", "engagement"),
        grouped("engagement3", "engagement"),
        grouped("engagement4", "engagement"),
        grouped("engagement5", "engagement"),
        item("familiarity"),
    ],
};

pub static EXPERIENCE_V2: LikertSchema = LikertSchema {
    version: SchemaVersion::ExperienceV2,
    min: 1,
    max: 7,
    items: &[
        item("confidence"),
        item("absorption"),
        item("enjoyment"),
        item("attention"),
        item("effort"),
        item("lostTrackOfTime"),
        item("mindWandering"),
        item("arousal"),
        item("familiarity"),
    ],
};

impl LikertSchema {
    pub fn contains(&self, id: &str) -> bool {
        self.items.iter().any(|item| item.id == id)
    }

    /// Composite groups in order of first appearance.
    pub fn groups(&self) -> Vec<&'static str> {
        let mut groups: Vec<&'static str> = Vec::new();
        for group in self.items.iter().filter_map(|item| item.group) {
            if !groups.contains(&group) {
                groups.push(group);
            }
        }
        groups
    }

    /// Export columns: items in schema order, each group's mean right after the
    /// group's last item.
    pub fn columns(&self) -> Vec<SchemaColumn> {
        let mut columns = Vec::with_capacity(self.items.len() + 2);
        for (index, current) in self.items.iter().enumerate() {
            columns.push(SchemaColumn::Item(current.id));
            if let Some(group) = current.group {
                let next_group = self.items.get(index + 1).and_then(|next| next.group);
                if next_group != Some(group) {
                    columns.push(SchemaColumn::GroupMean(group));
                }
            }
        }
        columns
    }

    /// Arithmetic mean of a group's items. `None` if any item is missing.
    pub fn group_mean(&self, group: &str, ratings: &Ratings) -> Option<f64> {
        let values = self
            .items
            .iter()
            .filter(|item| item.group == Some(group))
            .map(|item| ratings.get(item.id).copied())
            .collect::<Option<Vec<u8>>>()?;
        if values.is_empty() {
            return None;
        }
        let total: u32 = values.iter().map(|v| u32::from(*v)).sum();
        Some(f64::from(total) / values.len() as f64)
    }

    /// Mean of all group means, if the schema defines at least one group.
    pub fn overall_mean(&self, ratings: &Ratings) -> Option<f64> {
        let means = self
            .groups()
            .into_iter()
            .map(|group| self.group_mean(group, ratings))
            .collect::<Option<Vec<f64>>>()?;
        if means.is_empty() {
            return None;
        }
        Some(means.iter().sum::<f64>() / means.len() as f64)
    }

    /// Every item present, every value within the scale, nothing extra.
    pub fn validate(&self, ratings: &Ratings) -> Result<()> {
        let missing: Vec<&str> = self
            .items
            .iter()
            .filter(|item| !ratings.contains_key(item.id))
            .map(|item| item.id)
            .collect();
        if !missing.is_empty() {
            bail!(
                "{} ratings missing: {}",
                self.version,
                missing.join(", ")
            );
        }

        if let Some(unknown) = ratings.keys().find(|key| !self.contains(key)) {
            bail!("{} has no item '{unknown}'", self.version);
        }

        if let Some((id, value)) = ratings
            .iter()
            .find(|(_, value)| **value < self.min || **value > self.max)
        {
            bail!(
                "rating {id}={value} outside {}..={} scale",
                self.min,
                self.max
            );
        }

        Ok(())
    }
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_v1(value: u8) -> Ratings {
        IMMERSION_ENGAGEMENT_V1
            .items
            .iter()
            .map(|item| (item.id.to_string(), value))
            .collect()
    }

    #[test]
    fn v1_columns_place_means_after_each_group() {
        let headers: Vec<String> = IMMERSION_ENGAGEMENT_V1
            .columns()
            .iter()
            .map(SchemaColumn::header)
            .collect();
        assert_eq!(headers[0], "confidence");
        assert_eq!(headers[6], "immersionMean");
        assert_eq!(headers[12], "engagementMean");
        assert_eq!(headers.last().map(String::as_str), Some("familiarity"));
        assert_eq!(headers.len(), 14);
    }

    #[test]
    fn v2_has_no_composites() {
        assert!(EXPERIENCE_V2.groups().is_empty());
        assert_eq!(EXPERIENCE_V2.columns().len(), EXPERIENCE_V2.items.len());
    }

    #[test]
    fn group_mean_averages_items() {
        let mut ratings = full_v1(3);
        ratings.insert("immersion1".into(), 5);
        ratings.insert("immersion2".into(), 4);
        let mean = IMMERSION_ENGAGEMENT_V1
            .group_mean("immersion", &ratings)
            .unwrap();
        assert!((mean - 3.6).abs() < 1e-9);
        assert_eq!(round2(2.0 / 3.0), 0.67);
    }

    #[test]
    fn validation_checks_range_and_completeness() {
        assert!(IMMERSION_ENGAGEMENT_V1.validate(&full_v1(5)).is_ok());

        let mut out_of_range = full_v1(2);
        out_of_range.insert("familiarity".into(), 6);
        assert!(IMMERSION_ENGAGEMENT_V1.validate(&out_of_range).is_err());

        let mut missing = full_v1(2);
        missing.remove("engagement3");
        let err = IMMERSION_ENGAGEMENT_V1.validate(&missing).unwrap_err();
        assert!(err.to_string().contains("engagement3"));

        let mut extra = full_v1(2);
        extra.insert("arousal".into(), 2);
        assert!(IMMERSION_ENGAGEMENT_V1.validate(&extra).is_err());
    }

    #[test]
    fn seven_point_scale_accepts_seven() {
        let ratings: Ratings = EXPERIENCE_V2
            .items
            .iter()
            .map(|item| (item.id.to_string(), 7))
            .collect();
        assert!(EXPERIENCE_V2.validate(&ratings).is_ok());
        assert!(IMMERSION_ENGAGEMENT_V1.validate(&full_v1(7)).is_err());
    }
}
