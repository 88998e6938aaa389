use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use log::{info, warn};
use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::task::JoinHandle;

use super::{MirrorRow, SessionExport};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const GITHUB_API_BASE: &str = "https://api.github.com";
const USER_AGENT: &str = concat!("media-time/", env!("CARGO_PKG_VERSION"));

#[async_trait]
pub trait ExportSink: Send + Sync {
    fn name(&self) -> &'static str;
    async fn deliver(&self, export: &SessionExport) -> Result<()>;
}

fn http_client() -> Result<Client> {
    let builder = Client::builder().timeout(HTTP_TIMEOUT).user_agent(USER_AGENT);
    #[cfg(test)]
    let builder = builder.no_proxy();
    builder.build().context("failed to build HTTP client")
}

/// Writes the CSV into a directory. This is the export of record.
#[derive(Debug, Clone)]
pub struct CsvFileSink {
    dir: PathBuf,
}

impl CsvFileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn write(&self, export: &SessionExport) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("failed to create export directory {}", self.dir.display()))?;
        let path = self.dir.join(&export.filename);
        tokio::fs::write(&path, export.csv.as_bytes())
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(path)
    }
}

#[async_trait]
impl ExportSink for CsvFileSink {
    fn name(&self) -> &'static str {
        "csv-file"
    }

    async fn deliver(&self, export: &SessionExport) -> Result<()> {
        self.write(export).await.map(|_| ())
    }
}

#[derive(Serialize)]
struct SheetsPayload<'a> {
    data: &'a [MirrorRow],
}

/// Posts mirror rows to a spreadsheet web-app endpoint.
pub struct SheetsWebhookSink {
    client: Client,
    url: String,
}

impl SheetsWebhookSink {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            url: url.into(),
        })
    }
}

#[async_trait]
impl ExportSink for SheetsWebhookSink {
    fn name(&self) -> &'static str {
        "google-sheets"
    }

    async fn deliver(&self, export: &SessionExport) -> Result<()> {
        self.client
            .post(&self.url)
            .json(&SheetsPayload { data: &export.rows })
            .send()
            .await
            .context("sheets webhook request failed")?
            .error_for_status()
            .context("sheets webhook rejected rows")?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitHubTarget {
    pub token: String,
    /// `owner/name`
    pub repo: String,
    pub branch: String,
    /// Directory inside the repository, without surrounding slashes.
    pub path: String,
}

#[derive(Deserialize)]
struct ContentsEntry {
    sha: String,
}

/// Creates or updates the CSV through the repository contents API.
pub struct GitHubContentsSink {
    client: Client,
    target: GitHubTarget,
    api_base: String,
}

impl GitHubContentsSink {
    pub fn new(target: GitHubTarget) -> Result<Self> {
        if target.token.is_empty() {
            bail!("GitHub token not configured");
        }
        if target.repo.is_empty() {
            bail!("GitHub repository not configured");
        }
        Ok(Self {
            client: http_client()?,
            target,
            api_base: GITHUB_API_BASE.to_string(),
        })
    }

    /// Points the sink at another API host, e.g. a GitHub Enterprise server.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    fn contents_url(&self, filename: &str) -> String {
        let dir = self.target.path.trim_matches('/');
        let file_path = if dir.is_empty() {
            filename.to_string()
        } else {
            format!("{dir}/{filename}")
        };
        format!(
            "{}/repos/{}/contents/{file_path}",
            self.api_base.trim_end_matches('/'),
            self.target.repo
        )
    }

    async fn existing_sha(&self, url: &str) -> Result<Option<String>> {
        let response = self
            .client
            .get(url)
            .query(&[("ref", self.target.branch.as_str())])
            .header(header::AUTHORIZATION, format!("token {}", self.target.token))
            .header(header::ACCEPT, "application/vnd.github.v3+json")
            .send()
            .await
            .context("GitHub contents lookup failed")?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let entry: ContentsEntry = response
            .error_for_status()
            .context("GitHub contents lookup rejected")?
            .json()
            .await
            .context("unexpected GitHub contents response")?;
        Ok(Some(entry.sha))
    }
}

pub(crate) fn upload_body(
    export: &SessionExport,
    branch: &str,
    sha: Option<&str>,
) -> serde_json::Value {
    let mut body = json!({
        "message": format!("Add CSV data: {}", export.filename),
        "content": BASE64_STANDARD.encode(export.csv.as_bytes()),
        "branch": branch,
    });
    if let Some(sha) = sha {
        body["sha"] = json!(sha);
    }
    body
}

#[async_trait]
impl ExportSink for GitHubContentsSink {
    fn name(&self) -> &'static str {
        "github"
    }

    async fn deliver(&self, export: &SessionExport) -> Result<()> {
        let url = self.contents_url(&export.filename);
        let sha = match self.existing_sha(&url).await {
            Ok(sha) => sha,
            Err(err) => {
                warn!("Could not look up existing {}: {err:#}", export.filename);
                None
            }
        };

        let response = self
            .client
            .put(&url)
            .header(header::AUTHORIZATION, format!("token {}", self.target.token))
            .header(header::ACCEPT, "application/vnd.github.v3+json")
            .json(&upload_body(export, &self.target.branch, sha.as_deref()))
            .send()
            .await
            .context("GitHub upload request failed")?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            bail!("GitHub upload returned {status}: {detail}");
        }
        Ok(())
    }
}

/// Runs each mirror on its own task. Failures are logged and reported through
/// the handle's `false`; nothing propagates to the caller.
pub fn spawn_mirrors(
    sinks: Vec<Arc<dyn ExportSink>>,
    export: Arc<SessionExport>,
) -> Vec<JoinHandle<bool>> {
    sinks
        .into_iter()
        .map(|sink| {
            let export = export.clone();
            tokio::spawn(async move {
                match sink.deliver(&export).await {
                    Ok(()) => {
                        info!("Mirrored {} to {}", export.filename, sink.name());
                        true
                    }
                    Err(err) => {
                        warn!("Mirror {} failed for {}: {err:#}", sink.name(), export.filename);
                        false
                    }
                }
            })
        })
        .collect()
}

/// Writes the local CSV, then starts the mirrors. The local write does not
/// wait on or depend on any mirror.
pub async fn export_session(
    local: &CsvFileSink,
    mirrors: Vec<Arc<dyn ExportSink>>,
    export: SessionExport,
) -> Result<(PathBuf, Vec<JoinHandle<bool>>)> {
    let path = local.write(&export).await?;
    info!("Exported {} results to {}", export.rows.len(), path.display());
    let handles = spawn_mirrors(mirrors, Arc::new(export));
    Ok((path, handles))
}
