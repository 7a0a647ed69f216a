//! Per-client session state and teardown
//!
//! A session is created lazily on first reference to an identity and owns
//! its driver handle, reference cache, page stack, recorder, and optional
//! report accumulator exclusively. Destruction always runs the same fixed
//! teardown sequence, whether triggered explicitly or by the TTL sweep.

use crate::config::SessionConfig;
use crate::driver::{AppProcess, AutomationDriver};
use crate::error::{DroverError, DroverResult, StepFailure, TeardownFailure, TeardownStep};
use crate::recorder::Recorder;
use crate::refs::ReferenceCache;
use crate::report::{ArtifactSink, SessionReport};
use crate::retry::{is_transient, with_retry};
use crate::timeout::with_deadline;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

/// Opaque stable identity supplied by the transport layer
pub type SessionId = String;

/// How long a launched application gets to exit before force-kill
const APP_TERMINATE_GRACE: Duration = Duration::from_secs(3);

/// State owned by one logical connection
pub struct Session {
    pub id: SessionId,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    /// Opaque handle -> live object cache, scoped to this session
    pub refs: ReferenceCache,
    /// Ordered page/context stack; opaque to the runtime
    pub page_stack: Vec<Value>,
    pub config: SessionConfig,
    /// Present only while reporting is enabled
    pub report: Option<SessionReport>,
    pub recorder: Recorder,
    /// Launched application, owned separately from the driver connection
    pub app: Option<AppProcess>,
    driver: Option<Box<dyn AutomationDriver>>,
}

impl Session {
    pub fn new(id: impl Into<SessionId>, config: SessionConfig) -> Self {
        let id = id.into();
        let now = Utc::now();
        debug!(session = %id, "created session");
        Self {
            id,
            created_at: now,
            last_activity: now,
            refs: ReferenceCache::new(),
            page_stack: Vec::new(),
            config,
            report: None,
            recorder: Recorder::default(),
            app: None,
            driver: None,
        }
    }

    /// Refresh the last-activity timestamp
    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }

    pub fn is_connected(&self) -> bool {
        self.driver.is_some()
    }

    /// The driver handle, or a typed "not connected" error naming `operation`
    pub fn driver(&self, operation: &str) -> DroverResult<&dyn AutomationDriver> {
        self.driver
            .as_deref()
            .ok_or_else(|| DroverError::not_connected(operation))
    }

    /// Attach a freshly connected driver. Replacing a live one is a caller
    /// bug; the old handle is dropped without disconnect.
    pub fn attach_driver(&mut self, driver: Box<dyn AutomationDriver>) {
        self.driver = Some(driver);
    }

    /// Drop the driver connection but keep the session alive.
    ///
    /// Handles only mean something relative to a connected context, so the
    /// reference cache is invalidated here too.
    pub async fn disconnect_driver(&mut self) -> DroverResult<()> {
        let mut driver = match self.driver.take() {
            Some(driver) => driver,
            None => return Ok(()),
        };
        self.refs.clear();
        driver.disconnect().await
    }

    /// Issue a driver command wrapped in the session's retry policy, with
    /// the deadline guard applied per attempt. Worst case wall time is
    /// `attempts x call_timeout`.
    pub async fn driver_call(&self, method: &str, params: Value) -> DroverResult<Value> {
        let driver = self.driver(method)?;
        let deadline = self.config.call_timeout;
        with_retry(&self.config.retry, is_transient, |_, _, _| {}, || {
            with_deadline(method, deadline, driver.call(method, params.clone()))
        })
        .await
    }

    /// Single driver command under a caller-chosen deadline, no retries.
    /// Used for best-effort work like failure capture.
    pub async fn driver_call_once(
        &self,
        method: &str,
        params: Value,
        deadline: Duration,
    ) -> DroverResult<Value> {
        let driver = self.driver(method)?;
        with_deadline(method, deadline, driver.call(method, params)).await
    }

    /// Run the fixed teardown sequence. Every step attempts to run
    /// regardless of earlier failures; failures are collected and returned
    /// as one aggregate.
    ///
    /// 1. finalize and persist the report, 2. flush the artifact sink,
    /// 3. disconnect the driver, 4. terminate the launched application,
    /// 5. clear the reference cache.
    pub async fn teardown(&mut self, artifacts: &dyn ArtifactSink) -> Result<(), TeardownFailure> {
        let mut failures = Vec::new();

        if let Some(report) = self.report.take() {
            if let Err(error) = self.persist_report(&report, artifacts).await {
                failures.push(StepFailure {
                    step: TeardownStep::Report,
                    message: error.to_string(),
                });
            }
        }

        if let Err(error) = artifacts.flush(&self.id).await {
            failures.push(StepFailure {
                step: TeardownStep::LogFlush,
                message: error.to_string(),
            });
        }

        if let Some(mut driver) = self.driver.take() {
            if let Err(error) = driver.disconnect().await {
                failures.push(StepFailure {
                    step: TeardownStep::Disconnect,
                    message: error.to_string(),
                });
            }
        }

        if let Some(mut app) = self.app.take() {
            if let Err(error) = app.terminate(APP_TERMINATE_GRACE).await {
                failures.push(StepFailure {
                    step: TeardownStep::Terminate,
                    message: error.to_string(),
                });
            }
        }

        self.refs.clear();

        if failures.is_empty() {
            info!(session = %self.id, "session torn down");
            Ok(())
        } else {
            Err(TeardownFailure { steps: failures })
        }
    }

    async fn persist_report(
        &self,
        report: &SessionReport,
        artifacts: &dyn ArtifactSink,
    ) -> DroverResult<()> {
        let json = report.render_json()?;
        artifacts.write(&self.id, "report.json", json.as_bytes()).await?;
        artifacts
            .write(&self.id, "report.md", report.render_markdown().as_bytes())
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::StubDriver;
    use crate::report::FsArtifactSink;
    use serde_json::json;

    fn session(id: &str) -> Session {
        let mut config = SessionConfig::default();
        config.retry.base_delay = Duration::from_millis(1);
        Session::new(id, config)
    }

    #[tokio::test]
    async fn driver_calls_without_a_connection_are_rejected() {
        let s = session("s1");
        match s.driver_call("query", json!({})).await {
            Err(DroverError::NotConnected(message)) => {
                assert!(message.contains("query"));
            }
            other => panic!("expected NotConnected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn driver_call_retries_transient_failures() {
        let mut s = session("s1");
        let driver = StubDriver::with_responses(vec![
            Err(DroverError::driver("connection reset by peer")),
            Ok(json!({"ok": true})),
        ]);
        s.attach_driver(Box::new(driver));

        let result = s.driver_call("query", json!({"selector": "#a"})).await;
        assert_eq!(result.unwrap(), json!({"ok": true}));
    }

    #[tokio::test]
    async fn disconnect_clears_the_reference_cache_but_keeps_the_session() {
        let mut s = session("s1");
        s.attach_driver(Box::new(StubDriver::new()));
        let handle = s.refs.put("element", json!({"id": 1}));

        s.disconnect_driver().await.unwrap();

        assert!(!s.is_connected());
        assert!(s.refs.resolve(&handle).is_err());
        // disconnect again is a no-op
        s.disconnect_driver().await.unwrap();
    }

    #[tokio::test]
    async fn teardown_runs_every_step_even_when_disconnect_fails() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FsArtifactSink::new(dir.path());

        let mut s = session("s1");
        s.attach_driver(Box::new(StubDriver::failing_disconnect()));
        s.report = Some(SessionReport::new("s1"));
        s.refs.put("element", json!({}));

        let failure = s.teardown(&sink).await.unwrap_err();

        // step 3 failed, but 1 and 5 still ran
        assert_eq!(failure.steps.len(), 1);
        assert_eq!(failure.steps[0].step, TeardownStep::Disconnect);
        assert!(dir.path().join("s1/report.json").exists());
        assert!(dir.path().join("s1/report.md").exists());
        assert!(s.refs.is_empty());
        assert!(!s.is_connected());
    }

    #[tokio::test]
    async fn clean_teardown_reports_no_failures() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FsArtifactSink::new(dir.path());

        let mut s = session("s2");
        s.attach_driver(Box::new(StubDriver::new()));
        s.teardown(&sink).await.unwrap();
    }
}
