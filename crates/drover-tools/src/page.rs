//! Page tools: navigation and element queries

use async_trait::async_trait;
use drover_core::error::DroverResult;
use drover_core::handler::{CallContext, ToolCall, ToolHandler, ToolOutput, ToolParameter, ToolSchema};
use drover_core::registry::Capability;
use drover_core::DroverError;
use serde_json::json;
use std::sync::Arc;

/// The page capability descriptor
pub fn capability() -> Capability {
    Capability::new("page", "Page navigation and element queries")
        .with_tool(Arc::new(PageNavigateTool))
        .with_tool(Arc::new(PageBackTool))
        .with_tool(Arc::new(PageQueryTool))
}

/// Navigate to a target and push it onto the session's page stack
pub struct PageNavigateTool;

#[async_trait]
impl ToolHandler for PageNavigateTool {
    fn name(&self) -> &str {
        "page_navigate"
    }

    fn description(&self) -> &str {
        "Navigate the driven application to a target page or screen"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            "page_navigate",
            "Navigate the driven application to a target page or screen",
            vec![ToolParameter::string("target", "Page, screen, or URL to open")],
        )
    }

    async fn execute(
        &self,
        cx: &mut CallContext<'_>,
        call: &ToolCall,
    ) -> DroverResult<ToolOutput> {
        let target = call.require_string("target")?;
        cx.session
            .driver_call("navigate", json!({ "target": target }))
            .await?;
        cx.session.page_stack.push(json!(target));
        Ok(ToolOutput::text(format!("navigated to '{target}'")))
    }
}

/// Pop the page stack and navigate back
pub struct PageBackTool;

#[async_trait]
impl ToolHandler for PageBackTool {
    fn name(&self) -> &str {
        "page_back"
    }

    fn description(&self) -> &str {
        "Navigate back to the previous page"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new("page_back", "Navigate back to the previous page", vec![])
    }

    async fn execute(
        &self,
        cx: &mut CallContext<'_>,
        _call: &ToolCall,
    ) -> DroverResult<ToolOutput> {
        if cx.session.page_stack.is_empty() {
            return Err(DroverError::invalid_arguments("page stack is empty"));
        }
        cx.session.driver_call("back", json!({})).await?;
        let left = cx.session.page_stack.pop();
        Ok(ToolOutput::text(format!(
            "went back from {}",
            left.unwrap_or_default()
        )))
    }
}

/// Query an element; optionally cache it and return an opaque handle
pub struct PageQueryTool;

#[async_trait]
impl ToolHandler for PageQueryTool {
    fn name(&self) -> &str {
        "page_query"
    }

    fn description(&self) -> &str {
        "Query an element by selector; with save=true, cache it and return a handle"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            "page_query",
            "Query an element by selector; with save=true, cache it and return a handle",
            vec![
                ToolParameter::string("selector", "Element selector"),
                ToolParameter::boolean("save", "Cache the element and return a handle").optional(),
            ],
        )
    }

    async fn execute(
        &self,
        cx: &mut CallContext<'_>,
        call: &ToolCall,
    ) -> DroverResult<ToolOutput> {
        let selector = call.require_string("selector")?;
        let save = call.get_bool("save").unwrap_or(false);

        let element = cx
            .session
            .driver_call("query", json!({ "selector": selector }))
            .await?;

        if save {
            let handle = cx.session.refs.put("element", element.clone());
            Ok(ToolOutput::text(
                json!({ "handle": handle, "element": element }).to_string(),
            ))
        } else {
            Ok(ToolOutput::text(element.to_string()))
        }
    }
}
