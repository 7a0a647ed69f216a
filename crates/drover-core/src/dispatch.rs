//! Call dispatcher: routes incoming calls to handlers
//!
//! Every handler error is caught here and rendered into the call envelope;
//! nothing propagates as an unhandled fault past this boundary.

use crate::config::SessionConfig;
use crate::handler::{CallContext, Services, ToolCall};
use crate::registry::CapabilityRegistry;
use crate::report::CallRecord;
use crate::store::SessionStore;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

/// The full session-close operation; its success triggers session deletion
pub const TERMINAL_TOOL: &str = "session_close";

/// Deadline for the best-effort failure capture
const CAPTURE_DEADLINE: Duration = Duration::from_secs(2);

/// One block of result content
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: "text".to_string(),
            text: text.into(),
        }
    }
}

/// Structured result returned to the protocol layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallResult {
    pub content: Vec<ContentBlock>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

impl CallResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::text(text)],
            is_error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::text(message)],
            is_error: Some(true),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.is_error.unwrap_or(false)
    }
}

/// Routes `(tool, args)` calls to handlers on behalf of sessions
pub struct Dispatcher {
    store: Arc<SessionStore>,
    registry: Arc<CapabilityRegistry>,
    services: Arc<Services>,
    session_config: SessionConfig,
}

impl Dispatcher {
    pub fn new(
        store: Arc<SessionStore>,
        registry: Arc<CapabilityRegistry>,
        services: Arc<Services>,
        session_config: SessionConfig,
    ) -> Self {
        Self {
            store,
            registry,
            services,
            session_config,
        }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    /// Dispatch one call for the given session identity.
    ///
    /// Creates the session on first use, resolves the handler, executes it
    /// with timing + logging, feeds the recorder and report accumulator,
    /// and converts any error into an `is_error` result.
    #[instrument(skip(self, call), fields(session = %session_id, tool = %call.name))]
    pub async fn dispatch(&self, session_id: &str, call: ToolCall) -> CallResult {
        let session = self.store.get_or_create(session_id, &self.session_config).await;

        let (result, close_session) = {
            let mut session = session.lock().await;
            session.touch();

            let handler = match self.registry.get_handler(&call.name) {
                Some(handler) => handler,
                None => {
                    let error = crate::error::DroverError::UnknownTool(call.name.clone());
                    warn!(%error, "rejected call");
                    return CallResult::error(error.to_string());
                }
            };
            session.recorder.capture(&call.name, &call.arguments);

            let timestamp = Utc::now();
            let started = Instant::now();
            let outcome = {
                let mut cx = CallContext {
                    session: &mut *session,
                    registry: &self.registry,
                    services: &self.services,
                };
                handler.execute(&mut cx, &call).await
            };
            let duration = started.elapsed();

            let artifact = match &outcome {
                Ok(_) => {
                    debug!(duration_ms = duration.as_millis() as u64, "call succeeded");
                    None
                }
                Err(error) => {
                    warn!(duration_ms = duration.as_millis() as u64, %error, "call failed");
                    self.capture_failure(&session, &call.name).await
                }
            };

            if let Some(report) = session.report.as_mut() {
                report.record(CallRecord {
                    tool: call.name.clone(),
                    timestamp,
                    duration_ms: duration.as_millis() as u64,
                    success: outcome.is_ok(),
                    error: outcome.as_ref().err().map(|e| e.to_string()),
                    artifact,
                });
            }

            let close_session = outcome.is_ok() && call.name == TERMINAL_TOOL;
            let result = match outcome {
                Ok(output) => CallResult::text(output.text),
                Err(error) => CallResult::error(error.to_string()),
            };
            (result, close_session)
        };

        if close_session {
            // the one place dispatch and lifecycle intersect
            if let Err(failure) = self.store.delete(session_id).await {
                warn!(%failure, "session close teardown reported failures");
                return CallResult::error(format!("session closed, but {failure}"));
            }
        }

        result
    }

    /// Best-effort failure artifact: ask a connected driver for a state
    /// capture and write it through the sink. Never fails the original call.
    async fn capture_failure(
        &self,
        session: &crate::session::Session,
        tool: &str,
    ) -> Option<PathBuf> {
        if !session.is_connected() {
            return None;
        }

        let capture = session
            .driver_call_once("capture", json!({}), CAPTURE_DEADLINE)
            .await
            .ok()?;

        let name = format!("failure-{}-{}.json", tool, Utc::now().timestamp_millis());
        match self
            .services
            .artifacts
            .write(&session.id, &name, capture.to_string().as_bytes())
            .await
        {
            Ok(path) => Some(path),
            Err(error) => {
                debug!(%error, "failure capture could not be written");
                None
            }
        }
    }
}
