//! Recording tools: capture call sequences and replay them by id

use async_trait::async_trait;
use drover_core::DroverError;
use drover_core::error::DroverResult;
use drover_core::handler::{CallContext, ToolCall, ToolHandler, ToolOutput, ToolParameter, ToolSchema};
use drover_core::recorder::replay_sequence;
use drover_core::registry::Capability;
use serde_json::json;
use std::sync::Arc;

/// The record capability descriptor
pub fn capability() -> Capability {
    Capability::new("record", "Record call sequences and replay them")
        .with_tool(Arc::new(RecordStartTool))
        .with_tool(Arc::new(RecordStopTool))
        .with_tool(Arc::new(RecordReplayTool))
}

/// Begin buffering subsequent tool calls
pub struct RecordStartTool;

#[async_trait]
impl ToolHandler for RecordStartTool {
    fn name(&self) -> &str {
        "record_start"
    }

    fn description(&self) -> &str {
        "Start recording subsequent tool calls into a sequence"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            "record_start",
            "Start recording subsequent tool calls into a sequence",
            vec![ToolParameter::string("name", "Sequence name").optional()],
        )
    }

    async fn execute(
        &self,
        cx: &mut CallContext<'_>,
        call: &ToolCall,
    ) -> DroverResult<ToolOutput> {
        cx.session.recorder.start(call.get_string("name"))?;
        Ok(ToolOutput::text("recording started"))
    }
}

/// Stop buffering; optionally save the sequence
pub struct RecordStopTool;

#[async_trait]
impl ToolHandler for RecordStopTool {
    fn name(&self) -> &str {
        "record_stop"
    }

    fn description(&self) -> &str {
        "Stop recording; with save=true the sequence is kept for replay"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            "record_stop",
            "Stop recording; with save=true the sequence is kept for replay",
            vec![ToolParameter::boolean("save", "Keep the sequence for replay").optional()],
        )
    }

    async fn execute(
        &self,
        cx: &mut CallContext<'_>,
        call: &ToolCall,
    ) -> DroverResult<ToolOutput> {
        let save = call.get_bool("save").unwrap_or(true);
        match cx.session.recorder.stop(save)? {
            Some(sequence) => Ok(ToolOutput::text(
                json!({
                    "id": sequence.id,
                    "name": sequence.name,
                    "steps": sequence.actions.len(),
                })
                .to_string(),
            )),
            None => Ok(ToolOutput::text("recording discarded")),
        }
    }
}

/// Replay a saved sequence against the current session
pub struct RecordReplayTool;

#[async_trait]
impl ToolHandler for RecordReplayTool {
    fn name(&self) -> &str {
        "record_replay"
    }

    fn description(&self) -> &str {
        "Replay a saved sequence step by step against the current session"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            "record_replay",
            "Replay a saved sequence step by step against the current session",
            vec![
                ToolParameter::string("sequence_id", "Id returned by record_stop"),
                ToolParameter::boolean("continue_on_error", "Keep going past failed steps")
                    .optional(),
            ],
        )
    }

    async fn execute(
        &self,
        cx: &mut CallContext<'_>,
        call: &ToolCall,
    ) -> DroverResult<ToolOutput> {
        let sequence_id = call.require_string("sequence_id")?;
        let continue_on_error = call.get_bool("continue_on_error").unwrap_or(false);

        let sequence = cx
            .session
            .recorder
            .get(&sequence_id)
            .cloned()
            .ok_or_else(|| {
                DroverError::invalid_arguments(format!("unknown sequence '{sequence_id}'"))
            })?;

        let outcomes = replay_sequence(cx, &sequence, continue_on_error).await;
        let failed = outcomes.iter().filter(|o| !o.success).count();

        Ok(ToolOutput::text(
            json!({
                "sequence": sequence_id,
                "total_steps": sequence.actions.len(),
                "attempted": outcomes.len(),
                "failed": failed,
                "steps": outcomes,
            })
            .to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::TestHarness;

    fn record_three_step_sequence(harness: &mut TestHarness) -> (String, String) {
        let mut cx = harness.context();

        // a handle that will be stale by replay time
        let handle = cx.session.refs.put("element", json!({"id": 1}));

        cx.session.recorder.start(Some("flow".into())).unwrap();
        cx.session.recorder.capture(
            "page_navigate",
            &TestHarness::call("page_navigate", &[("target", json!("home"))]).arguments,
        );
        cx.session.recorder.capture(
            "input_tap",
            &TestHarness::call("input_tap", &[("target", json!(handle.clone()))]).arguments,
        );
        cx.session.recorder.capture(
            "page_navigate",
            &TestHarness::call("page_navigate", &[("target", json!("settings"))]).arguments,
        );
        let sequence = cx.session.recorder.stop(true).unwrap().unwrap();

        // invalidate the recorded handle
        cx.session.refs.clear();
        (sequence.id, handle)
    }

    #[tokio::test]
    async fn stop_reports_the_saved_sequence_id() {
        let mut harness = TestHarness::connected();
        let mut cx = harness.context();

        RecordStartTool
            .execute(
                &mut cx,
                &TestHarness::call("record_start", &[("name", json!("demo"))]),
            )
            .await
            .unwrap();
        cx.session.recorder.capture(
            "page_navigate",
            &TestHarness::call("page_navigate", &[("target", json!("home"))]).arguments,
        );

        let output = RecordStopTool
            .execute(&mut cx, &TestHarness::call("record_stop", &[]))
            .await
            .unwrap();

        let parsed: serde_json::Value = serde_json::from_str(&output.text).unwrap();
        assert_eq!(parsed["name"], json!("demo"));
        assert_eq!(parsed["steps"], json!(1));
        assert!(cx.session.recorder.get(parsed["id"].as_str().unwrap()).is_some());
    }

    #[tokio::test]
    async fn replay_aborts_at_the_first_failure_by_default() {
        let mut harness = TestHarness::with_catalog_connected();
        let (sequence_id, _) = record_three_step_sequence(&mut harness);
        let mut cx = harness.context();

        let output = RecordReplayTool
            .execute(
                &mut cx,
                &TestHarness::call("record_replay", &[("sequence_id", json!(sequence_id))]),
            )
            .await
            .unwrap();

        let parsed: serde_json::Value = serde_json::from_str(&output.text).unwrap();
        assert_eq!(parsed["total_steps"], json!(3));
        // step 2's handle no longer resolves; step 3 is never attempted
        assert_eq!(parsed["attempted"], json!(2));
        assert_eq!(parsed["failed"], json!(1));
        assert_eq!(parsed["steps"][1]["success"], json!(false));
        assert!(
            parsed["steps"][1]["error"]
                .as_str()
                .unwrap()
                .contains("Reference not found")
        );
    }

    #[tokio::test]
    async fn replay_with_continue_on_error_attempts_every_step() {
        let mut harness = TestHarness::with_catalog_connected();
        let (sequence_id, _) = record_three_step_sequence(&mut harness);
        let mut cx = harness.context();

        let output = RecordReplayTool
            .execute(
                &mut cx,
                &TestHarness::call(
                    "record_replay",
                    &[
                        ("sequence_id", json!(sequence_id)),
                        ("continue_on_error", json!(true)),
                    ],
                ),
            )
            .await
            .unwrap();

        let parsed: serde_json::Value = serde_json::from_str(&output.text).unwrap();
        assert_eq!(parsed["attempted"], json!(3));
        assert_eq!(parsed["failed"], json!(1));
        assert_eq!(parsed["steps"][0]["success"], json!(true));
        assert_eq!(parsed["steps"][1]["success"], json!(false));
        assert_eq!(parsed["steps"][2]["success"], json!(true));
    }

    #[tokio::test]
    async fn replaying_an_unknown_sequence_is_rejected() {
        let mut harness = TestHarness::with_catalog_connected();
        let mut cx = harness.context();

        let result = RecordReplayTool
            .execute(
                &mut cx,
                &TestHarness::call("record_replay", &[("sequence_id", json!("nope"))]),
            )
            .await;
        assert!(matches!(result, Err(DroverError::InvalidArguments(_))));
    }
}
