//! Session export: a local CSV file plus best-effort remote mirrors.

pub mod csv;
pub mod rows;
pub mod sinks;

use chrono::NaiveDate;
use serde::Serialize;

use crate::session::SessionState;

pub use csv::{escape_field, parse_csv_line, schema_columns, to_csv, ParticipantMeta};
pub use rows::{build_rows, MirrorRow};
pub use sinks::{
    export_session, spawn_mirrors, CsvFileSink, ExportSink, GitHubContentsSink, GitHubTarget,
    SheetsWebhookSink,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportOptions {
    pub include_participant_name: bool,
}

/// Everything the sinks need, computed once per export.
#[derive(Debug, Clone, Serialize)]
pub struct SessionExport {
    pub filename: String,
    pub csv: String,
    pub rows: Vec<MirrorRow>,
}

impl SessionExport {
    pub fn from_state(state: &SessionState, options: ExportOptions, date: NaiveDate) -> Self {
        let meta = ParticipantMeta {
            participant_name: options
                .include_participant_name
                .then(|| state.participant_name.clone())
                .filter(|name| !name.is_empty()),
            consent_signed_at: state.consent_signed_at,
            order_number: state.order_number,
        };

        Self {
            filename: export_filename(&state.participant_id, date),
            csv: to_csv(&state.results, &meta, state.demographics.as_ref()),
            rows: build_rows(state, options.include_participant_name),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.csv.is_empty()
    }
}

/// `time-perception-<participantId>-<YYYY-MM-DD>.csv`, with `unknown` standing
/// in for a missing id.
pub fn export_filename(participant_id: &str, date: NaiveDate) -> String {
    let id = if participant_id.trim().is_empty() {
        "unknown"
    } else {
        participant_id.trim()
    };
    format!("time-perception-{id}-{}.csv", date.format("%Y-%m-%d"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filename_uses_id_and_date() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        assert_eq!(
            export_filename("PT-ABC123", date),
            "time-perception-PT-ABC123-2025-03-01.csv"
        );
        assert_eq!(export_filename("", date), "time-perception-unknown-2025-03-01.csv");
    }

    #[test]
    fn idle_session_exports_nothing() {
        let export = SessionExport::from_state(
            &SessionState::new(),
            ExportOptions {
                include_participant_name: true,
            },
            NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
        );
        assert!(export.is_empty());
        assert!(export.rows.is_empty());
        assert_eq!(export.filename, "time-perception-unknown-2025-03-01.csv");
    }
}
