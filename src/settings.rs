use anyhow::{anyhow, bail, Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, sync::RwLock};

use crate::export::{ExportOptions, GitHubTarget};
use crate::identity::DEFAULT_PREFIX;
use crate::models::SchemaVersion;
use crate::order::OrderMode;
use crate::session::{SessionConfig, DEFAULT_MEDIA_DURATION_SECS};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GitHubSettings {
    pub enabled: bool,
    /// `owner/name`
    pub repo: Option<String>,
    pub branch: String,
    pub path: String,
    /// Only ever read from the environment.
    #[serde(skip)]
    pub token: Option<String>,
}

impl Default for GitHubSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            repo: None,
            branch: "main".into(),
            path: "data".into(),
            token: None,
        }
    }
}

impl GitHubSettings {
    /// Upload target when enabled and fully configured.
    pub fn target(&self) -> Option<GitHubTarget> {
        if !self.enabled {
            return None;
        }
        match (&self.token, &self.repo) {
            (Some(token), Some(repo)) if !token.is_empty() && !repo.is_empty() => {
                Some(GitHubTarget {
                    token: token.clone(),
                    repo: repo.clone(),
                    branch: self.branch.clone(),
                    path: self.path.clone(),
                })
            }
            _ => {
                warn!("GitHub upload enabled but GITHUB_TOKEN or GITHUB_REPO is missing");
                None
            }
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExportSettings {
    /// Defaults to `<data dir>/exports`.
    pub output_dir: Option<PathBuf>,
    pub include_participant_name: bool,
    pub sheets_webhook_url: Option<String>,
    pub github: GitHubSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StudySettings {
    pub order_mode: OrderMode,
    pub media_duration_secs: u32,
    pub likert_schema: SchemaVersion,
    pub id_prefix: String,
    pub export: ExportSettings,
}

impl Default for StudySettings {
    fn default() -> Self {
        Self {
            order_mode: OrderMode::LatinSquare,
            media_duration_secs: DEFAULT_MEDIA_DURATION_SECS,
            likert_schema: SchemaVersion::default(),
            id_prefix: DEFAULT_PREFIX.into(),
            export: ExportSettings::default(),
        }
    }
}

impl StudySettings {
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            order_mode: self.order_mode,
            media_duration_secs: if self.media_duration_secs == 0 {
                DEFAULT_MEDIA_DURATION_SECS
            } else {
                self.media_duration_secs
            },
            schema: self.likert_schema,
        }
    }

    pub fn export_options(&self) -> ExportOptions {
        ExportOptions {
            include_participant_name: self.export.include_participant_name,
        }
    }

    /// Applies environment overrides. Unparsable values are logged and
    /// skipped.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(value) = get("MTP_ORDER_MODE") {
            match value.parse() {
                Ok(mode) => self.order_mode = mode,
                Err(err) => warn!("Ignoring MTP_ORDER_MODE: {err}"),
            }
        }
        if let Some(value) = get("MTP_MEDIA_DURATION_SECS") {
            match value.parse::<u32>() {
                Ok(secs) if secs > 0 => self.media_duration_secs = secs,
                _ => warn!("Ignoring MTP_MEDIA_DURATION_SECS={value}: expected a positive integer"),
            }
        }
        if let Some(value) = get("MTP_LIKERT_SCHEMA") {
            match value.parse() {
                Ok(schema) => self.likert_schema = schema,
                Err(err) => warn!("Ignoring MTP_LIKERT_SCHEMA: {err}"),
            }
        }
        if let Some(value) = get("MTP_EXPORT_PARTICIPANT_NAME") {
            self.export.include_participant_name = env_flag(&value);
        }
        if let Some(url) = get("MTP_GOOGLE_SHEETS_WEB_APP_URL") {
            self.export.sheets_webhook_url = Some(url);
        }

        let github = &mut self.export.github;
        if let Some(value) = get("MTP_GITHUB_UPLOAD_ENABLED") {
            github.enabled = env_flag(&value);
        }
        if let Some(token) = get("GITHUB_TOKEN") {
            github.token = Some(token);
        }
        if let Some(repo) = get("GITHUB_REPO") {
            github.repo = Some(repo);
        }
        if let Some(branch) = get("GITHUB_BRANCH") {
            github.branch = branch;
        }
        if let Some(path) = get("GITHUB_CSV_PATH") {
            github.path = path;
        }
    }

    /// Sets one persisted field from its dotted name, e.g. `export.github.repo`.
    pub fn set_field(&mut self, key: &str, value: &str) -> Result<()> {
        let optional = |value: &str| {
            let value = value.trim();
            (!value.is_empty()).then(|| value.to_string())
        };

        match key {
            "order_mode" => self.order_mode = value.parse()?,
            "media_duration_secs" => {
                let secs: u32 = value
                    .parse()
                    .with_context(|| format!("invalid duration '{value}'"))?;
                if secs == 0 {
                    bail!("media_duration_secs must be positive");
                }
                self.media_duration_secs = secs;
            }
            "likert_schema" => self.likert_schema = value.parse()?,
            "id_prefix" => self.id_prefix = value.trim().to_string(),
            "export.output_dir" => self.export.output_dir = optional(value).map(PathBuf::from),
            "export.include_participant_name" => {
                self.export.include_participant_name = parse_bool(value)?
            }
            "export.sheets_webhook_url" => self.export.sheets_webhook_url = optional(value),
            "export.github.enabled" => self.export.github.enabled = parse_bool(value)?,
            "export.github.repo" => self.export.github.repo = optional(value),
            "export.github.branch" => self.export.github.branch = value.trim().to_string(),
            "export.github.path" => self.export.github.path = value.trim().to_string(),
            other => bail!("unknown setting '{other}'"),
        }
        Ok(())
    }
}

pub fn env_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(anyhow!("expected true or false, got '{other}'")),
    }
}

/// Study settings persisted as pretty JSON next to the database.
pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<StudySettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!("Using default settings; {} is unreadable: {err}", path.display());
                StudySettings::default()
            })
        } else {
            StudySettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    /// Settings as stored on disk, without environment overrides.
    pub fn stored(&self) -> StudySettings {
        match self.data.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Stored settings with the process environment applied on top.
    pub fn effective(&self) -> StudySettings {
        let mut settings = self.stored();
        settings.apply_env_overrides(|key| std::env::var(key).ok());
        settings
    }

    pub fn update<F>(&self, apply: F) -> Result<StudySettings>
    where
        F: FnOnce(&mut StudySettings) -> Result<()>,
    {
        let mut guard = self
            .data
            .write()
            .map_err(|_| anyhow!("settings lock poisoned"))?;
        let mut next = guard.clone();
        apply(&mut next)?;
        self.persist(&next)?;
        *guard = next.clone();
        Ok(next)
    }

    fn persist(&self, data: &StudySettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_study_protocol() {
        let settings = StudySettings::default();
        assert_eq!(settings.order_mode, OrderMode::LatinSquare);
        assert_eq!(settings.session_config().media_duration_secs, 180);
        assert!(!settings.export.include_participant_name);
        assert_eq!(settings.export.github.branch, "main");
        assert_eq!(settings.export.github.path, "data");
    }

    #[test]
    fn env_overrides_apply() {
        let mut settings = StudySettings::default();
        settings.apply_env_overrides(env(&[
            ("MTP_ORDER_MODE", "random"),
            ("MTP_MEDIA_DURATION_SECS", "90"),
            ("MTP_LIKERT_SCHEMA", "experience-v2"),
            ("MTP_EXPORT_PARTICIPANT_NAME", "true"),
            ("MTP_GOOGLE_SHEETS_WEB_APP_URL", "https://script.example/exec"),
            ("MTP_GITHUB_UPLOAD_ENABLED", "1"),
            ("GITHUB_TOKEN", "ghp_test"),
            ("GITHUB_REPO", "lab/study-data"),
            ("GITHUB_CSV_PATH", "exports"),
        ]));

        assert_eq!(settings.order_mode, OrderMode::Random);
        assert_eq!(settings.media_duration_secs, 90);
        assert_eq!(settings.likert_schema, SchemaVersion::ExperienceV2);
        assert!(settings.export.include_participant_name);
        assert_eq!(
            settings.export.sheets_webhook_url.as_deref(),
            Some("https://script.example/exec")
        );
        let target = settings.export.github.target().unwrap();
        assert_eq!(target.repo, "lab/study-data");
        assert_eq!(target.branch, "main");
        assert_eq!(target.path, "exports");
    }

    #[test]
    fn bad_env_values_are_ignored() {
        let mut settings = StudySettings::default();
        settings.apply_env_overrides(env(&[
            ("MTP_ORDER_MODE", "alphabetical"),
            ("MTP_MEDIA_DURATION_SECS", "0"),
            ("MTP_LIKERT_SCHEMA", ""),
        ]));
        assert_eq!(settings, StudySettings::default());
    }

    #[test]
    fn github_target_requires_token_and_repo() {
        let mut github = GitHubSettings {
            enabled: true,
            repo: Some("lab/study-data".into()),
            ..GitHubSettings::default()
        };
        assert!(github.target().is_none());
        github.token = Some("ghp_test".into());
        assert!(github.target().is_some());
        github.enabled = false;
        assert!(github.target().is_none());
    }

    #[test]
    fn store_persists_updates_without_token() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let store = SettingsStore::new(path.clone()).unwrap();
        assert_eq!(store.stored(), StudySettings::default());

        store
            .update(|settings| {
                settings.set_field("order_mode", "random")?;
                settings.set_field("export.github.repo", "lab/study-data")?;
                settings.export.github.token = Some("secret".into());
                Ok(())
            })
            .unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("\"random\""));
        assert!(!written.contains("secret"));

        let reopened = SettingsStore::new(path).unwrap().stored();
        assert_eq!(reopened.order_mode, OrderMode::Random);
        assert_eq!(reopened.export.github.repo.as_deref(), Some("lab/study-data"));
        assert_eq!(reopened.export.github.token, None);
    }

    #[test]
    fn rejected_update_leaves_store_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let store = SettingsStore::new(path.clone()).unwrap();
        assert!(store
            .update(|settings| settings.set_field("media_duration_secs", "0"))
            .is_err());
        assert!(store.update(|settings| settings.set_field("colour", "blue")).is_err());
        assert!(!path.exists());
        assert_eq!(store.stored(), StudySettings::default());
    }

    #[test]
    fn unreadable_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();
        let store = SettingsStore::new(path).unwrap();
        assert_eq!(store.stored(), StudySettings::default());
    }
}
