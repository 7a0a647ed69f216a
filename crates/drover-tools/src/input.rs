//! Input tools: taps and text entry against handles or raw selectors

use async_trait::async_trait;
use drover_core::error::DroverResult;
use drover_core::handler::{CallContext, ToolCall, ToolHandler, ToolOutput, ToolParameter, ToolSchema};
use drover_core::refs::ReferenceCache;
use drover_core::registry::Capability;
use drover_core::session::Session;
use serde_json::{Value, json};
use std::sync::Arc;

/// The input capability descriptor
pub fn capability() -> Capability {
    Capability::new("input", "Pointer and keyboard input")
        .with_tool(Arc::new(InputTapTool))
        .with_tool(Arc::new(InputTextTool))
}

/// Driver params for a target that is either a cached handle or a selector.
///
/// Handles resolve against the session's reference cache; a stale handle is
/// a reference-not-found error, not a driver failure.
fn target_params(session: &Session, target: &str) -> DroverResult<Value> {
    if ReferenceCache::is_handle(target) {
        let cached = session.refs.resolve(target)?;
        Ok(json!({ "element": cached.value }))
    } else {
        Ok(json!({ "selector": target }))
    }
}

/// Tap an element
pub struct InputTapTool;

#[async_trait]
impl ToolHandler for InputTapTool {
    fn name(&self) -> &str {
        "input_tap"
    }

    fn description(&self) -> &str {
        "Tap an element, addressed by cached handle or raw selector"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            "input_tap",
            "Tap an element, addressed by cached handle or raw selector",
            vec![ToolParameter::string("target", "Element handle or selector")],
        )
    }

    async fn execute(
        &self,
        cx: &mut CallContext<'_>,
        call: &ToolCall,
    ) -> DroverResult<ToolOutput> {
        let target = call.require_string("target")?;
        let params = target_params(cx.session, &target)?;
        cx.session.driver_call("tap", params).await?;
        Ok(ToolOutput::text(format!("tapped '{target}'")))
    }
}

/// Type text, optionally into a specific element
pub struct InputTextTool;

#[async_trait]
impl ToolHandler for InputTextTool {
    fn name(&self) -> &str {
        "input_text"
    }

    fn description(&self) -> &str {
        "Type text, optionally into a target element"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            "input_text",
            "Type text, optionally into a target element",
            vec![
                ToolParameter::string("text", "Text to type"),
                ToolParameter::string("target", "Element handle or selector").optional(),
            ],
        )
    }

    async fn execute(
        &self,
        cx: &mut CallContext<'_>,
        call: &ToolCall,
    ) -> DroverResult<ToolOutput> {
        let text = call.require_string("text")?;
        let mut params = json!({ "text": text });

        if let Some(target) = call.get_string("target") {
            let target_value = target_params(cx.session, &target)?;
            if let (Some(params_map), Some(target_map)) =
                (params.as_object_mut(), target_value.as_object())
            {
                for (key, value) in target_map {
                    params_map.insert(key.clone(), value.clone());
                }
            }
        }

        cx.session.driver_call("type", params).await?;
        Ok(ToolOutput::text(format!("typed {} character(s)", text.chars().count())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::TestHarness;
    use drover_core::DroverError;

    #[tokio::test]
    async fn tap_by_selector_passes_it_through() {
        let mut harness = TestHarness::connected();
        let mut cx = harness.context();

        InputTapTool
            .execute(
                &mut cx,
                &TestHarness::call("input_tap", &[("target", json!("#submit"))]),
            )
            .await
            .unwrap();

        let calls = harness.driver_calls();
        assert_eq!(calls[0].0, "tap");
        assert_eq!(calls[0].1["selector"], json!("#submit"));
    }

    #[tokio::test]
    async fn tap_by_handle_sends_the_cached_element() {
        let mut harness = TestHarness::connected();
        let mut cx = harness.context();
        let handle = cx.session.refs.put("element", json!({"id": 42}));

        InputTapTool
            .execute(
                &mut cx,
                &TestHarness::call("input_tap", &[("target", json!(handle))]),
            )
            .await
            .unwrap();

        let calls = harness.driver_calls();
        assert_eq!(calls[0].1["element"], json!({"id": 42}));
    }

    #[tokio::test]
    async fn tap_with_a_stale_handle_is_reference_not_found() {
        let mut harness = TestHarness::connected();
        let mut cx = harness.context();
        let handle = cx.session.refs.put("element", json!({}));
        cx.session.refs.clear();

        let result = InputTapTool
            .execute(
                &mut cx,
                &TestHarness::call("input_tap", &[("target", json!(handle))]),
            )
            .await;
        assert!(matches!(result, Err(DroverError::ReferenceNotFound(_))));
        assert!(harness.driver_calls().is_empty());
    }

    #[tokio::test]
    async fn text_merges_target_params() {
        let mut harness = TestHarness::connected();
        let mut cx = harness.context();

        InputTextTool
            .execute(
                &mut cx,
                &TestHarness::call(
                    "input_text",
                    &[("text", json!("hello")), ("target", json!("#field"))],
                ),
            )
            .await
            .unwrap();

        let calls = harness.driver_calls();
        assert_eq!(calls[0].0, "type");
        assert_eq!(calls[0].1["text"], json!("hello"));
        assert_eq!(calls[0].1["selector"], json!("#field"));
    }
}
