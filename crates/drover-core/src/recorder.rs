//! Action recording and replay
//!
//! The recorder buffers dispatched tool calls (name + arguments only) into
//! a sequence tied to the session. Replay resolves every step against the
//! live registry and runs it with the recorded arguments against the
//! current session: handles embedded in recorded arguments must still
//! resolve at play time, so a stale reference fails that step normally.

use crate::error::{DroverError, DroverResult};
use crate::handler::{CallContext, ToolCall};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Tool-name prefix the recorder never captures (its own controls)
const RECORD_TOOL_PREFIX: &str = "record_";

/// One captured call: name and arguments, never results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedAction {
    pub tool: String,
    pub arguments: HashMap<String, serde_json::Value>,
}

/// An ordered, replayable list of recorded actions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionSequence {
    pub id: String,
    pub name: String,
    pub recorded_at: DateTime<Utc>,
    pub actions: Vec<RecordedAction>,
}

impl ActionSequence {
    fn new(name: Option<String>) -> Self {
        let id = Uuid::new_v4().simple().to_string();
        Self {
            name: name.unwrap_or_else(|| format!("sequence-{id}")),
            id,
            recorded_at: Utc::now(),
            actions: Vec::new(),
        }
    }
}

/// Per-session recorder with its saved sequences
#[derive(Debug, Default)]
pub struct Recorder {
    active: Option<ActionSequence>,
    saved: HashMap<String, ActionSequence>,
}

impl Recorder {
    /// Begin buffering subsequently dispatched calls
    pub fn start(&mut self, name: Option<String>) -> DroverResult<()> {
        if self.active.is_some() {
            return Err(DroverError::invalid_arguments(
                "a recording is already in progress; stop it first",
            ));
        }
        let sequence = ActionSequence::new(name);
        info!(sequence = %sequence.name, "recording started");
        self.active = Some(sequence);
        Ok(())
    }

    pub fn is_recording(&self) -> bool {
        self.active.is_some()
    }

    /// Capture one dispatched call into the active sequence, if any.
    /// Recorder-control tools are never captured.
    pub fn capture(&mut self, tool: &str, arguments: &HashMap<String, serde_json::Value>) {
        if tool.starts_with(RECORD_TOOL_PREFIX) {
            return;
        }
        if let Some(sequence) = self.active.as_mut() {
            sequence.actions.push(RecordedAction {
                tool: tool.to_string(),
                arguments: arguments.clone(),
            });
        }
    }

    /// End buffering. With `save`, the sequence is stored under its
    /// generated id and returned; otherwise it is discarded.
    pub fn stop(&mut self, save: bool) -> DroverResult<Option<ActionSequence>> {
        let sequence = self
            .active
            .take()
            .ok_or_else(|| DroverError::invalid_arguments("no recording in progress"))?;

        if !save {
            debug!(sequence = %sequence.name, steps = sequence.actions.len(), "recording discarded");
            return Ok(None);
        }

        info!(
            id = %sequence.id,
            sequence = %sequence.name,
            steps = sequence.actions.len(),
            "recording saved"
        );
        self.saved.insert(sequence.id.clone(), sequence.clone());
        Ok(Some(sequence))
    }

    /// Look up a saved sequence by id
    pub fn get(&self, id: &str) -> Option<&ActionSequence> {
        self.saved.get(id)
    }
}

/// Outcome of one replayed step
#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    pub index: usize,
    pub tool: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Replay a sequence against the current session.
///
/// Each step's tool is resolved against the live registry at play time.
/// With `continue_on_error` unset, the first failure aborts the replay and
/// later steps are never attempted.
pub async fn replay_sequence(
    cx: &mut CallContext<'_>,
    sequence: &ActionSequence,
    continue_on_error: bool,
) -> Vec<StepOutcome> {
    let mut outcomes = Vec::with_capacity(sequence.actions.len());

    for (index, action) in sequence.actions.iter().enumerate() {
        let result = match cx.registry.get_handler(&action.tool) {
            Some(handler) => {
                let call = ToolCall::new(action.tool.clone(), action.arguments.clone());
                handler.execute(cx, &call).await.map(|_| ())
            }
            None => Err(DroverError::UnknownTool(action.tool.clone())),
        };

        let outcome = match result {
            Ok(()) => StepOutcome {
                index,
                tool: action.tool.clone(),
                success: true,
                error: None,
            },
            Err(error) => {
                warn!(step = index, tool = %action.tool, %error, "replay step failed");
                StepOutcome {
                    index,
                    tool: action.tool.clone(),
                    success: false,
                    error: Some(error.to_string()),
                }
            }
        };

        let failed = !outcome.success;
        outcomes.push(outcome);
        if failed && !continue_on_error {
            break;
        }
    }

    outcomes
}
