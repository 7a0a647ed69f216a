//! Drover core library
//!
//! The session & capability runtime: a catalog of invocable operations
//! grouped by capability, per-client sessions with opaque reference caching
//! and automatic expiry, deadline/retry wrapping around every driver call,
//! structured call records with failure artifacts, and record/replay of
//! call sequences.

pub mod config;
pub mod dispatch;
pub mod driver;
pub mod error;
pub mod handler;
pub mod recorder;
pub mod refs;
pub mod registry;
pub mod report;
pub mod retry;
pub mod session;
pub mod store;
pub mod timeout;

// Re-export commonly used types
pub use config::{RuntimeConfig, SessionConfig};
pub use dispatch::{CallResult, ContentBlock, Dispatcher, TERMINAL_TOOL};
pub use driver::{AppProcess, AutomationDriver, DriverConnector, StubConnector, StubDriver};
pub use error::{DroverError, DroverResult, TeardownFailure, TeardownStep};
pub use handler::{CallContext, Services, ToolCall, ToolHandler, ToolOutput, ToolParameter, ToolSchema};
pub use recorder::{ActionSequence, RecordedAction, Recorder, StepOutcome, replay_sequence};
pub use refs::{CachedRef, ReferenceCache};
pub use registry::{Capability, CapabilityRegistry, ToolDescriptor, ValidationReport};
pub use report::{ArtifactSink, CallRecord, FsArtifactSink, SessionReport};
pub use retry::{RetryOptions, is_transient, with_default_retry, with_retry};
pub use session::{Session, SessionId};
pub use store::{SessionMetrics, SessionStore};
pub use timeout::with_deadline;
