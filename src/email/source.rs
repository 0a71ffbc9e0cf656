//! Email sources: where `Email` records come from before analysis.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::email::{Email, parse_raw};
use crate::error::IngestError;

/// Supplies emails to the analysis pipeline.
#[async_trait]
pub trait EmailSource: Send + Sync {
    /// Source name for logs.
    fn name(&self) -> &str;

    /// Fetch the next batch of emails.
    async fn fetch(&self) -> Result<Vec<Email>, IngestError>;
}

/// Reads emails from files on disk.
///
/// - `.eml` → parsed as a raw RFC 822 message
/// - `.json` → a single `Email` object or an array of them
pub struct FileSource {
    paths: Vec<PathBuf>,
}

impl FileSource {
    pub fn new(paths: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }

    async fn load(path: &Path) -> Result<Vec<Email>, IngestError> {
        let bytes = tokio::fs::read(path).await.map_err(|e| IngestError::Read {
            path: path.display().to_string(),
            source: e,
        })?;

        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "eml" => Ok(vec![parse_raw(stem, &bytes)?]),
            "json" => load_json(&stem, &bytes),
            other => Err(IngestError::UnsupportedFormat(format!(
                "{} (extension '{other}')",
                path.display()
            ))),
        }
    }
}

#[async_trait]
impl EmailSource for FileSource {
    fn name(&self) -> &str {
        "files"
    }

    async fn fetch(&self) -> Result<Vec<Email>, IngestError> {
        let mut emails = Vec::new();
        for path in &self.paths {
            let loaded = Self::load(path).await?;
            debug!(path = %path.display(), count = loaded.len(), "Loaded emails");
            emails.extend(loaded);
        }
        Ok(emails)
    }
}

/// Parse a JSON document holding one email or a list of emails.
///
/// Records without an id get `<stem>` or `<stem>-<index>`.
fn load_json(stem: &str, bytes: &[u8]) -> Result<Vec<Email>, IngestError> {
    let value: serde_json::Value = serde_json::from_slice(bytes)?;
    let single = !value.is_array();
    let emails: Vec<Email> = if single {
        vec![serde_json::from_value(value)?]
    } else {
        serde_json::from_value(value)?
    };

    Ok(emails
        .into_iter()
        .enumerate()
        .map(|(i, mut email)| {
            if email.id.is_empty() {
                email.id = if single {
                    stem.to_string()
                } else {
                    format!("{stem}-{i}")
                };
            }
            email.with_extracted_links()
        })
        .collect())
}

/// Drop records missing any of `from`, `subject`, `date` or `body`.
///
/// Skipped records are logged and never reach the orchestrator.
pub fn retain_complete(emails: Vec<Email>) -> Vec<Email> {
    emails
        .into_iter()
        .filter(|email| {
            let missing = email.missing_fields();
            if !missing.is_empty() {
                warn!(
                    id = %email.id,
                    missing = ?missing,
                    "Skipping email due to missing fields"
                );
            }
            missing.is_empty()
        })
        .collect()
}
