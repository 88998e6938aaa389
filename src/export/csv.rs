//! Deterministic CSV projection of a participant's results.

use std::collections::HashSet;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::models::{round2, ConditionResult, DemographicData, SchemaColumn};

const BASE_HEADERS: [&str; 5] = [
    "participantId",
    "condition",
    "realDurationSec",
    "estimatedTimeSec",
    "temporalBias",
];

const DEMOGRAPHIC_HEADERS: [&str; 7] = [
    "age",
    "shortVideosFrequency",
    "audioFrequency",
    "textFrequency",
    "caffeineConsumed",
    "caffeineTimeAgo",
    "alertness",
];

/// Per-participant values repeated on every row. A `None` field drops its
/// column entirely.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParticipantMeta {
    /// Only set when name export is enabled.
    pub participant_name: Option<String>,
    pub consent_signed_at: Option<DateTime<Utc>>,
    pub order_number: Option<u8>,
}

impl ParticipantMeta {
    fn headers(&self) -> Vec<&'static str> {
        let mut headers = Vec::new();
        if self.participant_name.is_some() {
            headers.push("participantName");
        }
        if self.consent_signed_at.is_some() {
            headers.push("consentSignedAt");
        }
        if self.order_number.is_some() {
            headers.push("orderNumber");
        }
        headers
    }

    fn values(&self) -> Vec<String> {
        let mut values = Vec::new();
        if let Some(name) = &self.participant_name {
            values.push(name.clone());
        }
        if let Some(signed_at) = self.consent_signed_at {
            values.push(signed_at.to_rfc3339_opts(SecondsFormat::Millis, true));
        }
        if let Some(number) = self.order_number {
            values.push(number.to_string());
        }
        values
    }
}

/// Drops repeated (condition, timestamp) pairs, keeping the first.
pub fn dedup_results(results: &[ConditionResult]) -> Vec<&ConditionResult> {
    let mut seen = HashSet::new();
    results
        .iter()
        .filter(|result| seen.insert((result.condition, result.timestamp)))
        .collect()
}

/// Questionnaire columns for every schema the results were collected with,
/// in order of first appearance. Items shared between versions appear once.
pub fn schema_columns(results: &[&ConditionResult]) -> Vec<SchemaColumn> {
    let mut versions = Vec::new();
    for result in results {
        if !versions.contains(&result.schema) {
            versions.push(result.schema);
        }
    }

    let mut columns: Vec<SchemaColumn> = Vec::new();
    for version in versions {
        for column in version.schema().columns() {
            if !columns.contains(&column) {
                columns.push(column);
            }
        }
    }
    columns
}

pub fn csv_headers(
    results: &[&ConditionResult],
    meta: &ParticipantMeta,
    include_demographics: bool,
) -> Vec<String> {
    let mut headers: Vec<String> = BASE_HEADERS.iter().map(|h| h.to_string()).collect();
    headers.extend(schema_columns(results).iter().map(SchemaColumn::header));
    if results.iter().any(|result| result.feedback.is_some()) {
        headers.push("feedback".into());
    }
    headers.push("timestamp".into());
    headers.extend(meta.headers().into_iter().map(String::from));
    if include_demographics {
        headers.extend(DEMOGRAPHIC_HEADERS.iter().map(|h| h.to_string()));
    }
    headers
}

/// Header line plus one row per distinct result, joined with `\n`. No
/// results means an empty string.
pub fn to_csv(
    results: &[ConditionResult],
    meta: &ParticipantMeta,
    demographics: Option<&DemographicData>,
) -> String {
    let rows = dedup_results(results);
    if rows.is_empty() {
        return String::new();
    }

    let include_feedback = rows.iter().any(|result| result.feedback.is_some());
    let columns = schema_columns(&rows);
    let meta_values = meta.values();
    let demographic_values = demographics.map(demographic_fields);

    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(join_line(&csv_headers(&rows, meta, demographics.is_some())));

    for result in rows {
        let mut fields = vec![
            result.participant_id.clone(),
            result.condition.to_string(),
            result.real_duration_sec.to_string(),
            result.estimated_time_sec.to_string(),
            result.temporal_bias().to_string(),
        ];

        for column in &columns {
            fields.push(match column {
                SchemaColumn::Item(id) => result
                    .rating(id)
                    .map(|value| value.to_string())
                    .unwrap_or_default(),
                SchemaColumn::GroupMean(group) => result
                    .schema
                    .schema()
                    .group_mean(group, &result.ratings)
                    .map(|mean| round2(mean).to_string())
                    .unwrap_or_default(),
            });
        }

        if include_feedback {
            fields.push(result.feedback.clone().unwrap_or_default());
        }
        fields.push(result.timestamp_iso());
        fields.extend(meta_values.iter().cloned());
        if let Some(values) = &demographic_values {
            fields.extend(values.iter().cloned());
        }

        lines.push(join_line(&fields));
    }

    lines.join("\n")
}

fn demographic_fields(data: &DemographicData) -> Vec<String> {
    vec![
        data.age.map(|age| age.to_string()).unwrap_or_default(),
        data.short_videos_frequency
            .map(|f| f.as_str().to_string())
            .unwrap_or_default(),
        data.audio_frequency
            .map(|f| f.as_str().to_string())
            .unwrap_or_default(),
        data.text_frequency
            .map(|f| f.as_str().to_string())
            .unwrap_or_default(),
        data.caffeine_label().to_string(),
        data.caffeine_time_ago
            .map(|t| t.as_str().to_string())
            .unwrap_or_default(),
        data.alertness.map(|a| a.to_string()).unwrap_or_default(),
    ]
}

fn join_line<S: AsRef<str>>(fields: &[S]) -> String {
    fields
        .iter()
        .map(|field| escape_field(field.as_ref()))
        .collect::<Vec<_>>()
        .join(",")
}

/// Quotes a field containing a comma, quote or newline and doubles its quotes.
pub fn escape_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Splits one CSV line into fields, undoing [`escape_field`]. Does not handle
/// quoted newlines; split on lines only when no field contains one.
pub fn parse_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    current.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            }
            '"' if current.is_empty() => in_quotes = true,
            ',' if !in_quotes => fields.push(std::mem::take(&mut current)),
            _ => current.push(ch),
        }
    }
    fields.push(current);
    fields
}
