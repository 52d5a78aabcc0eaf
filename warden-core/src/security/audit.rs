//! Append-only audit trail
//!
//! One [`AuditEntry`] is written per permission check and per execution,
//! including failures. Sinks are injected; the runtime never constructs a
//! persistence backend on its own.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};

use super::classifier::PermissionLevel;
use crate::error::Result;

/// Default length of input/output summaries
pub const DEFAULT_SUMMARY_CHARS: usize = 256;

/// What an entry records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    PermissionCheck,
    Execution,
}

/// Immutable audit record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub tool_id: String,
    pub tool_name: String,
    pub context_id: String,
    pub kind: AuditKind,
    pub permission: PermissionLevel,
    pub success: bool,
    pub input_summary: String,
    /// Truncated SHA-256 of the serialized input
    pub input_digest: String,
    pub output_summary: Option<String>,
    pub error: Option<String>,
    pub duration_ms: u64,
    pub flagged: bool,
    pub flag_reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl AuditEntry {
    /// Start an entry; flagging is derived when the entry is finished
    pub fn new(
        kind: AuditKind,
        tool_id: impl Into<String>,
        tool_name: impl Into<String>,
        context_id: impl Into<String>,
        permission: PermissionLevel,
        input: &Value,
        summary_chars: usize,
    ) -> Self {
        Self {
            tool_id: tool_id.into(),
            tool_name: tool_name.into(),
            context_id: context_id.into(),
            kind,
            permission,
            success: false,
            input_summary: summarize(input, summary_chars),
            input_digest: digest(input),
            output_summary: None,
            error: None,
            duration_ms: 0,
            flagged: false,
            flag_reason: None,
            timestamp: Utc::now(),
        }
    }

    pub fn succeeded(mut self, output: Option<&Value>, summary_chars: usize) -> Self {
        self.success = true;
        self.output_summary = output.map(|v| summarize(v, summary_chars));
        self.finish()
    }

    pub fn failed(mut self, error: impl Into<String>) -> Self {
        self.success = false;
        self.error = Some(error.into());
        self.finish()
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    /// Force a flag with a specific reason (e.g. a paid bypass)
    pub fn with_flag(mut self, reason: impl Into<String>) -> Self {
        self.flagged = true;
        self.flag_reason = Some(reason.into());
        self
    }

    fn finish(mut self) -> Self {
        if self.flagged {
            return self;
        }
        if !self.success {
            self.flagged = true;
            self.flag_reason = Some(match &self.error {
                Some(error) => format!("failure: {}", error),
                None => "failure".to_string(),
            });
        } else if self.permission == PermissionLevel::Restricted {
            self.flagged = true;
            self.flag_reason = Some("restricted permission".to_string());
        }
        self
    }
}

/// Compact string rendering of a JSON value, cut at `max_chars`
pub fn summarize(value: &Value, max_chars: usize) -> String {
    let rendered = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    if rendered.chars().count() <= max_chars {
        return rendered;
    }
    let mut cut: String = rendered.chars().take(max_chars).collect();
    cut.push_str("...");
    cut
}

/// First 16 hex chars of the SHA-256 of the serialized value
pub fn digest(value: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.to_string().as_bytes());
    let hash = format!("{:x}", hasher.finalize());
    hash[..16].to_string()
}

/// Destination for audit entries
///
/// Appends must be safe for concurrent writers.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Append one entry
    async fn record(&self, entry: AuditEntry) -> Result<()>;
}

/// In-memory audit log
#[derive(Debug, Default)]
pub struct InMemoryAuditLog {
    entries: RwLock<Vec<AuditEntry>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// All entries in append order
    pub async fn entries(&self) -> Vec<AuditEntry> {
        self.entries.read().await.clone()
    }

    pub async fn flagged(&self) -> Vec<AuditEntry> {
        self.entries
            .read()
            .await
            .iter()
            .filter(|e| e.flagged)
            .cloned()
            .collect()
    }

    pub async fn for_tool(&self, tool_id: &str) -> Vec<AuditEntry> {
        self.entries
            .read()
            .await
            .iter()
            .filter(|e| e.tool_id == tool_id)
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditLog {
    async fn record(&self, entry: AuditEntry) -> Result<()> {
        self.entries.write().await.push(entry);
        Ok(())
    }
}

/// Audit log persisted as JSON lines
pub struct JsonlAuditLog {
    path: PathBuf,
    file: Mutex<tokio::fs::File>,
}

impl JsonlAuditLog {
    /// Open (or create) the log in append mode
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every entry back from a log file
    pub async fn read_all(path: impl AsRef<Path>) -> Result<Vec<AuditEntry>> {
        let contents = tokio::fs::read_to_string(path).await?;
        contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(Into::into))
            .collect()
    }
}

impl std::fmt::Debug for JsonlAuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonlAuditLog")
            .field("path", &self.path)
            .finish()
    }
}

#[async_trait]
impl AuditSink for JsonlAuditLog {
    async fn record(&self, entry: AuditEntry) -> Result<()> {
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');

        let mut file = self.file.lock().await;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}
