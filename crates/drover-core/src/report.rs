//! Session call records and report rendering
//!
//! While enabled, a session accumulates an append-only, time-ordered list
//! of call records. Teardown renders the accumulator to JSON and Markdown
//! and hands both to the injected artifact sink; this module defines the
//! data, not the file-system mechanics.

use crate::error::{DroverError, DroverResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::debug;

/// One dispatched call, as observed at the dispatcher boundary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallRecord {
    /// Tool name
    pub tool: String,
    /// When the call started
    pub timestamp: DateTime<Utc>,
    /// Wall-clock duration in milliseconds
    pub duration_ms: u64,
    /// Whether the handler succeeded
    pub success: bool,
    /// Error message on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Path of the captured failure artifact, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<PathBuf>,
}

/// Summary statistics over a report's call list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total_calls: usize,
    pub failed_calls: usize,
    pub total_duration_ms: u64,
}

/// Per-session report accumulator. Exists only while reporting is enabled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub calls: Vec<CallRecord>,
}

impl SessionReport {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            started_at: Utc::now(),
            calls: Vec::new(),
        }
    }

    /// Append a record. Records arrive in dispatch order.
    pub fn record(&mut self, record: CallRecord) {
        self.calls.push(record);
    }

    pub fn summary(&self) -> ReportSummary {
        ReportSummary {
            total_calls: self.calls.len(),
            failed_calls: self.calls.iter().filter(|c| !c.success).count(),
            total_duration_ms: self.calls.iter().map(|c| c.duration_ms).sum(),
        }
    }

    /// Render the report as pretty-printed JSON
    pub fn render_json(&self) -> DroverResult<String> {
        #[derive(Serialize)]
        struct Rendered<'a> {
            session_id: &'a str,
            started_at: &'a DateTime<Utc>,
            summary: ReportSummary,
            calls: &'a [CallRecord],
        }

        let rendered = Rendered {
            session_id: &self.session_id,
            started_at: &self.started_at,
            summary: self.summary(),
            calls: &self.calls,
        };
        Ok(serde_json::to_string_pretty(&rendered)?)
    }

    /// Render the report as human-readable Markdown
    pub fn render_markdown(&self) -> String {
        let summary = self.summary();
        let mut out = String::new();

        let _ = writeln!(out, "# Session report: {}\n", self.session_id);
        let _ = writeln!(
            out,
            "- started: {}\n- calls: {}\n- failed: {}\n- total duration: {}ms\n",
            self.started_at.to_rfc3339(),
            summary.total_calls,
            summary.failed_calls,
            summary.total_duration_ms
        );

        let _ = writeln!(out, "## Calls\n");
        let _ = writeln!(out, "| tool | duration (ms) | outcome |");
        let _ = writeln!(out, "|------|---------------|---------|");
        for call in &self.calls {
            let _ = writeln!(
                out,
                "| {} | {} | {} |",
                call.tool,
                call.duration_ms,
                if call.success { "ok" } else { "failed" }
            );
        }

        let failures: Vec<&CallRecord> = self.calls.iter().filter(|c| !c.success).collect();
        if !failures.is_empty() {
            let _ = writeln!(out, "\n## Failures\n");
            for call in failures {
                let _ = writeln!(
                    out,
                    "- `{}` at {}: {}",
                    call.tool,
                    call.timestamp.to_rfc3339(),
                    call.error.as_deref().unwrap_or("unknown error")
                );
                if let Some(artifact) = &call.artifact {
                    let _ = writeln!(out, "  - artifact: {}", artifact.display());
                }
            }
        }

        out
    }
}

/// Writes named files into a session's output directory.
///
/// Injected at startup; the runtime never touches the file system directly.
#[async_trait]
pub trait ArtifactSink: Send + Sync {
    /// Write `contents` as `name` under the session's output directory and
    /// return the resulting path.
    async fn write(&self, session_id: &str, name: &str, contents: &[u8])
    -> DroverResult<PathBuf>;

    /// Flush anything buffered for the session. Default is a no-op.
    async fn flush(&self, _session_id: &str) -> DroverResult<()> {
        Ok(())
    }
}

/// File-system sink: one directory per session under a base output dir
#[derive(Debug, Clone)]
pub struct FsArtifactSink {
    base_dir: PathBuf,
}

impl FsArtifactSink {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl ArtifactSink for FsArtifactSink {
    async fn write(
        &self,
        session_id: &str,
        name: &str,
        contents: &[u8],
    ) -> DroverResult<PathBuf> {
        let dir = self.base_dir.join(session_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| DroverError::Io(format!("creating {}: {e}", dir.display())))?;

        let path = dir.join(name);
        tokio::fs::write(&path, contents)
            .await
            .map_err(|e| DroverError::Io(format!("writing {}: {e}", path.display())))?;

        debug!(path = %path.display(), bytes = contents.len(), "wrote artifact");
        Ok(path)
    }
}
