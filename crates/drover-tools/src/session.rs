//! Session lifecycle tools: connect, launch, disconnect, report, close

use async_trait::async_trait;
use drover_core::driver::AppProcess;
use drover_core::error::DroverResult;
use drover_core::handler::{CallContext, ToolCall, ToolHandler, ToolOutput, ToolParameter, ToolSchema};
use drover_core::registry::Capability;
use drover_core::report::SessionReport;
use drover_core::timeout::with_deadline;
use drover_core::{DroverError, TERMINAL_TOOL};
use std::sync::Arc;
use tracing::info;

/// The session capability descriptor
pub fn capability() -> Capability {
    Capability::new("session", "Session lifecycle: connect, launch, report, close")
        .with_tool(Arc::new(SessionConnectTool))
        .with_tool(Arc::new(SessionLaunchTool))
        .with_tool(Arc::new(SessionDisconnectTool))
        .with_tool(Arc::new(SessionReportTool))
        .with_tool(Arc::new(SessionCloseTool))
}

/// Attach a driver connection to the session
pub struct SessionConnectTool;

#[async_trait]
impl ToolHandler for SessionConnectTool {
    fn name(&self) -> &str {
        "session_connect"
    }

    fn description(&self) -> &str {
        "Connect the session to the automation driver"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            "session_connect",
            "Connect the session to the automation driver",
            vec![ToolParameter::string("endpoint", "Driver endpoint").optional()],
        )
    }

    async fn execute(
        &self,
        cx: &mut CallContext<'_>,
        call: &ToolCall,
    ) -> DroverResult<ToolOutput> {
        if cx.session.is_connected() {
            return Err(DroverError::invalid_arguments(
                "session is already connected; disconnect first",
            ));
        }

        let endpoint = call
            .get_string("endpoint")
            .unwrap_or_else(|| "local".to_string());
        let driver = with_deadline(
            "session_connect",
            cx.session.config.call_timeout,
            cx.services.connector.connect(&endpoint),
        )
        .await?;

        cx.session.attach_driver(driver);
        info!(session = %cx.session.id, endpoint, "driver connected");
        Ok(ToolOutput::text(format!("connected to '{endpoint}'")))
    }
}

/// Launch an application and connect the driver to it
pub struct SessionLaunchTool;

#[async_trait]
impl ToolHandler for SessionLaunchTool {
    fn name(&self) -> &str {
        "session_launch"
    }

    fn description(&self) -> &str {
        "Launch an application under automation and connect to it"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            "session_launch",
            "Launch an application under automation and connect to it",
            vec![
                ToolParameter::string("command", "Application command to launch"),
                ToolParameter::array("args", "Command arguments").optional(),
                ToolParameter::string("endpoint", "Driver endpoint").optional(),
            ],
        )
    }

    async fn execute(
        &self,
        cx: &mut CallContext<'_>,
        call: &ToolCall,
    ) -> DroverResult<ToolOutput> {
        if cx.session.is_connected() {
            return Err(DroverError::invalid_arguments(
                "session is already connected; disconnect first",
            ));
        }

        let command = call.require_string("command")?;
        let args: Vec<String> = call.get_argument("args").unwrap_or_default();
        let endpoint = call
            .get_string("endpoint")
            .unwrap_or_else(|| "local".to_string());

        let app = AppProcess::launch(&command, &args)?;
        let driver = with_deadline(
            "session_launch",
            cx.session.config.call_timeout,
            cx.services.connector.connect(&endpoint),
        )
        .await?;

        cx.session.app = Some(app);
        cx.session.attach_driver(driver);
        info!(session = %cx.session.id, command, "application launched and connected");
        Ok(ToolOutput::text(format!(
            "launched '{command}' and connected to '{endpoint}'"
        )))
    }
}

/// Drop the driver connection but keep the session
pub struct SessionDisconnectTool;

#[async_trait]
impl ToolHandler for SessionDisconnectTool {
    fn name(&self) -> &str {
        "session_disconnect"
    }

    fn description(&self) -> &str {
        "Disconnect the driver; the session and its recordings survive"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            "session_disconnect",
            "Disconnect the driver; the session and its recordings survive",
            vec![],
        )
    }

    async fn execute(
        &self,
        cx: &mut CallContext<'_>,
        _call: &ToolCall,
    ) -> DroverResult<ToolOutput> {
        cx.session.disconnect_driver().await?;
        Ok(ToolOutput::text("disconnected; cached references invalidated"))
    }
}

/// Toggle the session's report accumulator
pub struct SessionReportTool;

#[async_trait]
impl ToolHandler for SessionReportTool {
    fn name(&self) -> &str {
        "session_report"
    }

    fn description(&self) -> &str {
        "Enable or disable call-record accumulation for this session"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            "session_report",
            "Enable or disable call-record accumulation for this session",
            vec![ToolParameter::boolean("enabled", "Whether to accumulate call records")],
        )
    }

    async fn execute(
        &self,
        cx: &mut CallContext<'_>,
        call: &ToolCall,
    ) -> DroverResult<ToolOutput> {
        let enabled = call
            .get_bool("enabled")
            .ok_or_else(|| DroverError::invalid_arguments("missing 'enabled' argument"))?;

        if enabled {
            if cx.session.report.is_none() {
                cx.session.report = Some(SessionReport::new(cx.session.id.clone()));
            }
            Ok(ToolOutput::text("report accumulation enabled"))
        } else {
            cx.session.report = None;
            Ok(ToolOutput::text("report accumulation disabled; records dropped"))
        }
    }
}

/// Terminal tool: the dispatcher deletes the session after this succeeds
pub struct SessionCloseTool;

#[async_trait]
impl ToolHandler for SessionCloseTool {
    fn name(&self) -> &str {
        TERMINAL_TOOL
    }

    fn description(&self) -> &str {
        "Close the session and tear down all of its resources"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            TERMINAL_TOOL,
            "Close the session and tear down all of its resources",
            vec![],
        )
    }

    async fn execute(
        &self,
        cx: &mut CallContext<'_>,
        _call: &ToolCall,
    ) -> DroverResult<ToolOutput> {
        info!(session = %cx.session.id, "session close requested");
        Ok(ToolOutput::text("session closed"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::TestHarness;
    use serde_json::json;

    #[tokio::test]
    async fn connect_attaches_a_driver_once() {
        let mut harness = TestHarness::new();
        let mut cx = harness.context();

        let output = SessionConnectTool
            .execute(&mut cx, &TestHarness::call("session_connect", &[]))
            .await
            .unwrap();
        assert!(output.text.contains("connected"));
        assert!(cx.session.is_connected());

        let again = SessionConnectTool
            .execute(&mut cx, &TestHarness::call("session_connect", &[]))
            .await;
        assert!(matches!(again, Err(DroverError::InvalidArguments(_))));
    }

    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let mut harness = TestHarness::new();
        let mut cx = harness.context();

        SessionConnectTool
            .execute(&mut cx, &TestHarness::call("session_connect", &[]))
            .await
            .unwrap();
        SessionDisconnectTool
            .execute(&mut cx, &TestHarness::call("session_disconnect", &[]))
            .await
            .unwrap();
        assert!(!cx.session.is_connected());

        SessionDisconnectTool
            .execute(&mut cx, &TestHarness::call("session_disconnect", &[]))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn report_toggle_creates_and_drops_the_accumulator() {
        let mut harness = TestHarness::new();
        let mut cx = harness.context();

        SessionReportTool
            .execute(
                &mut cx,
                &TestHarness::call("session_report", &[("enabled", json!(true))]),
            )
            .await
            .unwrap();
        assert!(cx.session.report.is_some());

        SessionReportTool
            .execute(
                &mut cx,
                &TestHarness::call("session_report", &[("enabled", json!(false))]),
            )
            .await
            .unwrap();
        assert!(cx.session.report.is_none());
    }
}
