//! Command dispatch.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use chrono::{Local, Utc};
use log::warn;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::export::{
    export_session, CsvFileSink, ExportSink, GitHubContentsSink, SessionExport, SheetsWebhookSink,
};
use crate::identity::{generate_participant_id_with, DEFAULT_LENGTH};
use crate::models::{
    condition::order_code, CaffeineTime, DemographicData, MediaFrequency, Ratings, ResultPayload,
};
use crate::order::{all_orders, order_number, OrderMode};
use crate::session::StartSession;
use crate::settings::StudySettings;
use crate::trial::{CompletionTrigger, TrialOutcome, TrialRunner};

use super::args::{Command, SettingsAction};
use super::bootstrap::CliContext;
use super::output::{emit, render_orders, render_status, OrderEntry, OrderListing};

pub async fn execute(ctx: &CliContext, command: &Command) -> Result<()> {
    match command {
        Command::Start {
            participant_id,
            name,
            signature,
        } => start(ctx, participant_id.clone(), name.clone(), signature.clone()).await,
        Command::Status => {
            let state = ctx.sessions.snapshot().await;
            emit(ctx.json, &state, render_status)
        }
        Command::Trial { skip } => trial(ctx, *skip).await,
        Command::Pending { seconds } => {
            ctx.sessions.set_pending_duration(*seconds).await;
            emit(ctx.json, seconds, |s| format!("Staged {s}s for the next result."))
        }
        Command::Record {
            estimate,
            ratings,
            fill,
            feedback,
        } => record(ctx, *estimate, ratings, *fill, feedback.clone()).await,
        Command::Demographics {
            age,
            short_videos,
            audio,
            text,
            caffeine,
            caffeine_time,
            alertness,
        } => {
            demographics(
                ctx,
                DemographicsInput {
                    age: *age,
                    short_videos: *short_videos,
                    audio: *audio,
                    text: *text,
                    caffeine: *caffeine,
                    caffeine_time: *caffeine_time,
                    alertness: *alertness,
                },
            )
            .await
        }
        Command::Export {
            out_dir,
            no_mirrors,
        } => export(ctx, out_dir.clone(), *no_mirrors).await,
        Command::Reset => {
            ctx.sessions.reset().await;
            emit(ctx.json, &true, |_| "Session reset.".to_string())
        }
        Command::Orders => orders(ctx).await,
        Command::NewId { prefix } => {
            let prefix = prefix.as_deref().unwrap_or(&ctx.settings.id_prefix);
            let id = generate_participant_id_with(&mut rand::thread_rng(), prefix, DEFAULT_LENGTH);
            emit(ctx.json, &id, String::clone)
        }
        Command::Settings { action } => settings(ctx, action.as_ref()),
    }
}

async fn start(
    ctx: &CliContext,
    participant_id: Option<String>,
    name: String,
    signature: Option<String>,
) -> Result<()> {
    let participant_id = participant_id.unwrap_or_else(|| {
        generate_participant_id_with(
            &mut rand::thread_rng(),
            &ctx.settings.id_prefix,
            DEFAULT_LENGTH,
        )
    });

    let state = ctx
        .sessions
        .start(StartSession {
            participant_id,
            participant_name: name,
            consent_signed_at: Utc::now(),
            consent_signature: signature,
        })
        .await
        .ok_or_else(|| anyhow!("session not started"))?;

    emit(ctx.json, &state, |state| {
        format!(
            "Started {} with order {}.",
            state.participant_id,
            order_code(&state.condition_order)
        )
    })
}

enum Waited {
    Finished(Option<TrialOutcome>),
    Input(std::io::Result<Option<String>>),
}

async fn trial(ctx: &CliContext, skip: bool) -> Result<()> {
    let condition = ctx
        .sessions
        .current_condition()
        .await
        .ok_or_else(|| anyhow!("no trial to run; start a session first"))?;
    if skip && condition.is_self_paced() {
        bail!("the {condition} trial cannot be skipped");
    }

    let runner = TrialRunner::new(ctx.sessions.config().media_duration_secs);
    if condition.is_self_paced() {
        ctx.sessions.set_pending_duration(0).await;
    }
    let mut handle = runner.start(condition);

    let outcome = if skip {
        handle.complete(CompletionTrigger::Skipped);
        handle.wait().await
    } else {
        if !ctx.json {
            if condition.is_self_paced() {
                eprintln!("Reading {condition}. Press Enter when finished.");
            } else {
                eprintln!(
                    "Playing {condition} for {}s. Press Enter to skip, or type 'ended' if playback finished.",
                    runner.media_duration().as_secs()
                );
            }
        }

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let waited = tokio::select! {
            outcome = handle.wait() => Waited::Finished(outcome),
            line = lines.next_line() => Waited::Input(line),
        };

        match waited {
            Waited::Finished(outcome) => outcome,
            Waited::Input(line) => {
                let trigger = if condition.is_self_paced() {
                    CompletionTrigger::TextContinue
                } else {
                    match line {
                        Ok(Some(text)) if text.trim().eq_ignore_ascii_case("ended") => {
                            CompletionTrigger::MediaEnded
                        }
                        _ => CompletionTrigger::Skipped,
                    }
                };
                handle.complete(trigger);
                handle.wait().await
            }
        }
    };

    let outcome = outcome.ok_or_else(|| anyhow!("trial ended without an outcome"))?;
    ctx.sessions.complete_trial(&outcome).await;

    emit(ctx.json, &outcome, |outcome| {
        format!(
            "{} trial finished ({}) after {}s. Record the questionnaire next.",
            outcome.condition, outcome.trigger, outcome.elapsed_sec
        )
    })
}

async fn record(
    ctx: &CliContext,
    estimate: u32,
    ratings: &[(String, u8)],
    fill: Option<u8>,
    feedback: Option<String>,
) -> Result<()> {
    let mut collected: Ratings = ratings.iter().cloned().collect();
    if let Some(value) = fill {
        for item in ctx.sessions.active_schema().await.schema().items {
            collected.entry(item.id.to_string()).or_insert(value);
        }
    }

    let payload = ResultPayload {
        estimated_time_sec: estimate,
        ratings: collected,
        feedback: feedback.filter(|text| !text.trim().is_empty()),
    };

    let result = ctx
        .sessions
        .record_result(payload)
        .await
        .ok_or_else(|| anyhow!("result not recorded"))?;
    let complete = ctx.sessions.is_complete().await;

    emit(ctx.json, &result, |result| {
        let mut text = format!(
            "Recorded {}: estimated {}s, actual {}s ({:+}s).",
            result.condition,
            result.estimated_time_sec,
            result.real_duration_sec,
            result.temporal_bias()
        );
        if complete {
            text.push_str(" All conditions recorded; run `export` next.");
        }
        text
    })
}

struct DemographicsInput {
    age: Option<u32>,
    short_videos: Option<MediaFrequency>,
    audio: Option<MediaFrequency>,
    text: Option<MediaFrequency>,
    caffeine: Option<bool>,
    caffeine_time: Option<CaffeineTime>,
    alertness: Option<u8>,
}

async fn demographics(ctx: &CliContext, input: DemographicsInput) -> Result<()> {
    let mut data: DemographicData = ctx
        .sessions
        .snapshot()
        .await
        .demographics
        .unwrap_or_default();

    data.age = input.age.or(data.age);
    data.short_videos_frequency = input.short_videos.or(data.short_videos_frequency);
    data.audio_frequency = input.audio.or(data.audio_frequency);
    data.text_frequency = input.text.or(data.text_frequency);
    data.caffeine_consumed = input.caffeine.or(data.caffeine_consumed);
    data.caffeine_time_ago = input.caffeine_time.or(data.caffeine_time_ago);
    if data.caffeine_consumed == Some(false) {
        data.caffeine_time_ago = None;
    }
    data.alertness = input.alertness.or(data.alertness);

    ctx.sessions.set_demographics(data.clone()).await;

    emit(ctx.json, &data, |data| {
        let missing: Vec<&str> = data.validate().iter().map(|issue| issue.field()).collect();
        if missing.is_empty() {
            "Demographics saved.".to_string()
        } else {
            format!("Demographics saved; still missing: {}", missing.join(", "))
        }
    })
}

fn build_mirrors(settings: &StudySettings) -> Vec<Arc<dyn ExportSink>> {
    let mut mirrors: Vec<Arc<dyn ExportSink>> = Vec::new();

    if let Some(url) = &settings.export.sheets_webhook_url {
        match SheetsWebhookSink::new(url.clone()) {
            Ok(sink) => mirrors.push(Arc::new(sink)),
            Err(err) => warn!("Skipping Google Sheets mirror: {err:#}"),
        }
    }

    if let Some(target) = settings.export.github.target() {
        match GitHubContentsSink::new(target) {
            Ok(sink) => mirrors.push(Arc::new(sink)),
            Err(err) => warn!("Skipping GitHub mirror: {err:#}"),
        }
    }

    mirrors
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExportReport {
    path: PathBuf,
    rows: usize,
    mirrors_succeeded: usize,
    mirrors_failed: usize,
}

async fn export(ctx: &CliContext, out_dir: Option<PathBuf>, no_mirrors: bool) -> Result<()> {
    let state = ctx.sessions.snapshot().await;
    if state.is_active() && !state.is_complete() {
        warn!(
            "Exporting {} of {} conditions for {}",
            state.results.len(),
            state.condition_order.len(),
            state.participant_id
        );
    }

    let export = SessionExport::from_state(
        &state,
        ctx.settings.export_options(),
        Local::now().date_naive(),
    );
    if export.is_empty() {
        bail!("no results to export");
    }
    let rows = export.rows.len();

    let mirrors = if no_mirrors {
        Vec::new()
    } else {
        build_mirrors(&ctx.settings)
    };
    let local = CsvFileSink::new(out_dir.unwrap_or_else(|| ctx.export_dir()));
    let (path, handles) = export_session(&local, mirrors, export).await?;

    let mut succeeded = 0;
    let mut failed = 0;
    for handle in handles {
        match handle.await {
            Ok(true) => succeeded += 1,
            Ok(false) => failed += 1,
            Err(err) => {
                warn!("Mirror task panicked: {err}");
                failed += 1;
            }
        }
    }

    let report = ExportReport {
        path,
        rows,
        mirrors_succeeded: succeeded,
        mirrors_failed: failed,
    };
    emit(ctx.json, &report, |report| {
        let mut text = format!("Wrote {} rows to {}", report.rows, report.path.display());
        if report.mirrors_succeeded + report.mirrors_failed > 0 {
            text.push_str(&format!(
                " ({} mirror(s) ok, {} failed)",
                report.mirrors_succeeded, report.mirrors_failed
            ));
        }
        text
    })
}

async fn orders(ctx: &CliContext) -> Result<()> {
    let mode = ctx.sessions.config().order_mode;
    let counter = ctx.sessions.participant_counter().await;

    let listing = OrderListing {
        mode,
        counter,
        next_order_number: match mode {
            OrderMode::LatinSquare => Some(order_number(counter + 1)),
            OrderMode::Random => None,
        },
        orders: all_orders()
            .iter()
            .enumerate()
            .map(|(index, order)| OrderEntry {
                number: (index + 1) as u8,
                order: order.to_vec(),
                code: order_code(order),
            })
            .collect(),
    };
    emit(ctx.json, &listing, render_orders)
}

fn settings(ctx: &CliContext, action: Option<&SettingsAction>) -> Result<()> {
    match action {
        None | Some(SettingsAction::Show) => emit(ctx.json, &ctx.settings, |settings| {
            serde_json::to_string_pretty(settings).unwrap_or_default()
        }),
        Some(SettingsAction::Set { key, value }) => {
            ctx.settings_store
                .update(|settings| settings.set_field(key, value))?;
            emit(ctx.json, &ctx.settings_store.stored(), |_| {
                format!("Set {key} = {value}")
            })
        }
    }
}
