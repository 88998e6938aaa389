//! Terminal and JSON rendering of command results.

use std::fmt::Write as _;

use anyhow::Result;
use serde::Serialize;

use crate::models::{condition::order_code, result::summarize, Condition};
use crate::order::OrderMode;
use crate::session::{SessionPhase, SessionState};

/// Prints `value` as one JSON document, or the text rendering otherwise.
pub fn emit<T, F>(json: bool, value: &T, render: F) -> Result<()>
where
    T: Serialize + ?Sized,
    F: FnOnce(&T) -> String,
{
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{}", render(value));
    }
    Ok(())
}

fn phase_label(phase: SessionPhase) -> &'static str {
    match phase {
        SessionPhase::Idle => "idle",
        SessionPhase::Active => "in progress",
        SessionPhase::Complete => "complete",
    }
}

pub fn render_status(state: &SessionState) -> String {
    let phase = state.phase();
    if phase == SessionPhase::Idle {
        return "No active session.".to_string();
    }

    let mut out = String::new();
    let _ = writeln!(out, "Participant  {}", state.participant_id);
    let _ = writeln!(out, "Status       {}", phase_label(phase));
    let _ = write!(out, "Order        {}", order_code(&state.condition_order));
    if let Some(number) = state.order_number {
        let _ = write!(out, " (order #{number})");
    }
    out.push('\n');
    let _ = writeln!(out, "Schema       {}", state.schema);

    for (index, condition) in state.condition_order.iter().enumerate() {
        let marker = match state.result_for(*condition) {
            Some(result) => format!(
                "estimated {}s of {}s ({:+}s)",
                result.estimated_time_sec,
                result.real_duration_sec,
                result.temporal_bias()
            ),
            None if index == state.current_index => "next".to_string(),
            None => "pending".to_string(),
        };
        let _ = writeln!(out, "  {}. {:<6} {marker}", index + 1, condition.as_str());
    }

    if let Some(seconds) = state.pending_duration_sec {
        let _ = writeln!(out, "Staged duration {seconds}s");
    }
    if state.demographics.is_some() {
        let _ = writeln!(out, "Demographics recorded");
    }
    if phase == SessionPhase::Complete {
        let summary = summarize(&state.results);
        let _ = writeln!(
            out,
            "Mean error {:+.1}s over a mean actual duration of {:.1}s",
            summary.mean_error_sec, summary.mean_actual_duration_sec
        );
    }
    out.trim_end().to_string()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderListing {
    pub mode: OrderMode,
    pub counter: u64,
    pub next_order_number: Option<u8>,
    pub orders: Vec<OrderEntry>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderEntry {
    pub number: u8,
    pub order: Vec<Condition>,
    pub code: String,
}

pub fn render_orders(listing: &OrderListing) -> String {
    let mut out = String::new();
    for entry in &listing.orders {
        let next = if listing.next_order_number == Some(entry.number) {
            "  <- next"
        } else {
            ""
        };
        let _ = writeln!(out, "{}. {}{next}", entry.number, entry.code);
    }
    let _ = write!(
        out,
        "Mode {}, {} participant(s) assigned so far",
        listing.mode, listing.counter
    );
    out
}
