//! Automation driver boundary
//!
//! The vendor transport is an external collaborator: the runtime only needs
//! "issue a named method with JSON params, get JSON back". [`StubDriver`]
//! backs tests and the default connector; a real deployment plugs its own
//! [`DriverConnector`] in at startup.

use crate::error::{DroverError, DroverResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, warn};

/// A live connection to the application-automation driver.
///
/// Owned exclusively by one session. Every call is a suspension point and
/// must be wrapped by the deadline guard (and usually the retry policy).
#[async_trait]
pub trait AutomationDriver: Send + Sync {
    /// Issue a driver command
    async fn call(&self, method: &str, params: Value) -> DroverResult<Value>;

    /// Tear the connection down. Called at most once.
    async fn disconnect(&mut self) -> DroverResult<()>;
}

/// Establishes driver connections for the `session` capability.
#[async_trait]
pub trait DriverConnector: Send + Sync {
    async fn connect(&self, endpoint: &str) -> DroverResult<Box<dyn AutomationDriver>>;
}

/// Scriptable in-process driver.
///
/// Responses are consumed front-to-back; once the script is exhausted every
/// call echoes its method and params. `fail_disconnect` makes `disconnect`
/// error, for exercising best-effort teardown.
#[derive(Debug, Default)]
pub struct StubDriver {
    responses: Mutex<VecDeque<DroverResult<Value>>>,
    calls: Mutex<Vec<(String, Value)>>,
    fail_disconnect: bool,
}

impl StubDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a scripted response for the next unanswered call
    pub fn push_response(&self, response: DroverResult<Value>) {
        self.responses.lock().push_back(response);
    }

    pub fn with_responses(responses: Vec<DroverResult<Value>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            ..Self::default()
        }
    }

    /// A stub whose `disconnect` fails, for teardown tests
    pub fn failing_disconnect() -> Self {
        Self {
            fail_disconnect: true,
            ..Self::default()
        }
    }

    /// Every `(method, params)` pair seen so far
    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl AutomationDriver for StubDriver {
    async fn call(&self, method: &str, params: Value) -> DroverResult<Value> {
        self.calls.lock().push((method.to_string(), params.clone()));
        match self.responses.lock().pop_front() {
            Some(response) => response,
            None => Ok(json!({ "method": method, "params": params })),
        }
    }

    async fn disconnect(&mut self) -> DroverResult<()> {
        if self.fail_disconnect {
            return Err(DroverError::driver("connection reset during disconnect"));
        }
        debug!("stub driver disconnected");
        Ok(())
    }
}

/// Connector producing fresh [`StubDriver`]s. The binary's default until a
/// vendor transport is wired in.
#[derive(Debug, Default)]
pub struct StubConnector;

#[async_trait]
impl DriverConnector for StubConnector {
    async fn connect(&self, endpoint: &str) -> DroverResult<Box<dyn AutomationDriver>> {
        debug!(endpoint, "connecting stub driver");
        Ok(Box::new(StubDriver::new()))
    }
}

/// A launched application under automation, owned separately from the
/// driver connection so teardown can terminate it even when the driver is
/// already gone.
#[derive(Debug)]
pub struct AppProcess {
    child: tokio::process::Child,
    command: String,
}

impl AppProcess {
    /// Spawn the application process
    pub fn launch(command: &str, args: &[String]) -> DroverResult<Self> {
        let child = tokio::process::Command::new(command)
            .args(args)
            .spawn()
            .map_err(|e| DroverError::driver(format!("failed to launch '{command}': {e}")))?;
        debug!(command, pid = child.id(), "launched application process");
        Ok(Self {
            child,
            command: command.to_string(),
        })
    }

    /// Ask the process to exit, wait up to `grace`, then force-kill.
    ///
    /// On Unix the polite signal is SIGTERM; elsewhere we go straight to the
    /// kill fallback since no portable equivalent exists.
    pub async fn terminate(&mut self, grace: Duration) -> DroverResult<()> {
        #[cfg(unix)]
        if let Some(pid) = self.child.id() {
            use nix::sys::signal::{Signal, kill};
            use nix::unistd::Pid;
            if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                debug!(command = %self.command, error = %e, "SIGTERM failed, will force kill");
            }
        }

        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => {
                debug!(command = %self.command, %status, "application exited");
                Ok(())
            }
            Ok(Err(e)) => Err(DroverError::Io(e.to_string())),
            Err(_) => {
                warn!(command = %self.command, "no exit within {grace:?}, force killing");
                self.child
                    .start_kill()
                    .map_err(|e| DroverError::Io(e.to_string()))?;
                self.child
                    .wait()
                    .await
                    .map_err(|e| DroverError::Io(e.to_string()))?;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stub_consumes_scripted_responses_then_echoes() {
        let driver = StubDriver::with_responses(vec![Ok(json!({"found": true}))]);

        let first = driver.call("query", json!({"selector": "#a"})).await.unwrap();
        assert_eq!(first, json!({"found": true}));

        let second = driver.call("tap", json!({"x": 1})).await.unwrap();
        assert_eq!(second["method"], "tap");

        assert_eq!(driver.calls().len(), 2);
    }

    #[tokio::test]
    async fn failing_disconnect_reports_a_driver_error() {
        let mut driver = StubDriver::failing_disconnect();
        assert!(matches!(
            driver.disconnect().await,
            Err(DroverError::Driver(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn terminate_waits_for_a_cooperative_process() {
        let mut app = AppProcess::launch("sleep", &["30".to_string()]).unwrap();
        app.terminate(Duration::from_secs(2)).await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn terminate_force_kills_a_stubborn_process() {
        // `sh -c 'trap ...'` ignores SIGTERM, forcing the SIGKILL path
        let mut app = AppProcess::launch(
            "sh",
            &["-c".to_string(), "trap '' TERM; sleep 30".to_string()],
        )
        .unwrap();
        app.terminate(Duration::from_millis(300)).await.unwrap();
    }
}
