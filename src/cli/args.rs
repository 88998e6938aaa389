//! Command-line arguments.

use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};

use crate::models::{CaffeineTime, MediaFrequency};

/// Runs a media time-perception study session from the terminal.
#[derive(Parser, Debug, Clone)]
#[command(name = "media-time")]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Directory holding the database, settings and exports
    #[arg(long, global = true, env = "MTP_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Show debug logging
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Record consent and start a session
    Start {
        /// Participant code; generated when omitted
        #[arg(long)]
        participant_id: Option<String>,
        /// Full name given on the consent form
        #[arg(long)]
        name: String,
        /// Opaque consent artifact, e.g. a signature data URL
        #[arg(long)]
        signature: Option<String>,
    },
    /// Show the current session
    Status,
    /// Run the trial for the current condition
    Trial {
        /// Skip a media trial immediately
        #[arg(long)]
        skip: bool,
    },
    /// Stage the measured duration for the next result
    Pending { seconds: u32 },
    /// Record the questionnaire for the current condition
    Record {
        /// Estimated duration in seconds
        #[arg(long)]
        estimate: u32,
        /// Item rating as `item=value`; repeatable
        #[arg(long = "rating", value_parser = parse_rating)]
        ratings: Vec<(String, u8)>,
        /// Give every item not listed with --rating this value
        #[arg(long)]
        fill: Option<u8>,
        #[arg(long)]
        feedback: Option<String>,
    },
    /// Store demographic answers
    Demographics {
        #[arg(long)]
        age: Option<u32>,
        #[arg(long, value_parser = parse_frequency)]
        short_videos: Option<MediaFrequency>,
        #[arg(long, value_parser = parse_frequency)]
        audio: Option<MediaFrequency>,
        #[arg(long, value_parser = parse_frequency)]
        text: Option<MediaFrequency>,
        /// Whether caffeine was consumed today
        #[arg(long)]
        caffeine: Option<bool>,
        #[arg(long, value_parser = parse_caffeine_time)]
        caffeine_time: Option<CaffeineTime>,
        /// Current alertness, 1-5
        #[arg(long)]
        alertness: Option<u8>,
    },
    /// Write the CSV and start configured mirrors
    Export {
        /// Directory for the CSV file
        #[arg(long)]
        out_dir: Option<PathBuf>,
        /// Only write the local file
        #[arg(long)]
        no_mirrors: bool,
    },
    /// Discard the current session
    Reset,
    /// List the counterbalanced condition orders
    Orders,
    /// Generate a participant code
    NewId {
        #[arg(long)]
        prefix: Option<String>,
    },
    /// Show or change study settings
    Settings {
        #[command(subcommand)]
        action: Option<SettingsAction>,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum SettingsAction {
    /// Print effective settings
    Show,
    /// Persist one setting, e.g. `order_mode random`
    Set { key: String, value: String },
}

fn parse_rating(raw: &str) -> Result<(String, u8)> {
    let (id, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("expected item=value, got '{raw}'"))?;
    let value = value
        .trim()
        .parse::<u8>()
        .map_err(|_| anyhow!("rating for '{id}' must be a small integer"))?;
    Ok((id.trim().to_string(), value))
}

fn parse_frequency(raw: &str) -> Result<MediaFrequency> {
    raw.parse()
}

fn parse_caffeine_time(raw: &str) -> Result<CaffeineTime> {
    raw.parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_valid() {
        let command = Args::command();
        command.clone().debug_assert();
        let data_dir = command
            .get_arguments()
            .find(|arg| arg.get_id() == "data_dir")
            .unwrap();
        assert_eq!(data_dir.get_env(), Some(std::ffi::OsStr::new("MTP_DATA_DIR")));
    }

    #[test]
    fn global_flags_after_subcommand() {
        let args = Args::parse_from(["media-time", "status", "--json", "--data-dir", "/tmp/mt"]);
        assert!(args.json);
        assert_eq!(args.data_dir, Some(PathBuf::from("/tmp/mt")));
        assert!(matches!(args.command, Command::Status));
    }

    #[test]
    fn record_collects_ratings() {
        let args = Args::parse_from([
            "media-time",
            "record",
            "--estimate",
            "150",
            "--rating",
            "confidence=4",
            "--rating",
            "familiarity = 2",
            "--fill",
            "3",
        ]);
        match args.command {
            Command::Record {
                estimate,
                ratings,
                fill,
                feedback,
            } => {
                assert_eq!(estimate, 150);
                assert_eq!(
                    ratings,
                    vec![("confidence".to_string(), 4), ("familiarity".to_string(), 2)]
                );
                assert_eq!(fill, Some(3));
                assert_eq!(feedback, None);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn rejects_malformed_rating() {
        assert!(Args::try_parse_from(["media-time", "record", "--estimate", "1", "--rating", "x"])
            .is_err());
    }

    #[test]
    fn demographics_parse_enums() {
        let args = Args::parse_from([
            "media-time",
            "demographics",
            "--short-videos",
            "very_often",
            "--caffeine",
            "true",
            "--caffeine-time",
            "1_to_3_hours",
        ]);
        match args.command {
            Command::Demographics {
                short_videos,
                caffeine,
                caffeine_time,
                ..
            } => {
                assert_eq!(short_videos, Some(MediaFrequency::VeryOften));
                assert_eq!(caffeine, Some(true));
                assert_eq!(caffeine_time, Some(CaffeineTime::OneToThreeHours));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
