//! Session-scoped reference cache
//!
//! Maps opaque generated handles to live driver-side objects. Handles only
//! mean something relative to a connected driver, so the cache is cleared
//! wholesale on disconnect and during teardown.

use crate::error::{DroverError, DroverResult};
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

/// Scheme prefix that distinguishes a handle from a raw selector or path
pub const HANDLE_PREFIX: &str = "ref://";

/// A cached driver-side object with its capability/kind tag
#[derive(Debug, Clone, PartialEq)]
pub struct CachedRef {
    /// Kind tag, e.g. "element"
    pub kind: String,
    /// The live object payload as the driver returned it
    pub value: Value,
}

/// Per-session cache of opaque handles. Never shared across sessions.
#[derive(Debug, Default)]
pub struct ReferenceCache {
    entries: HashMap<String, CachedRef>,
}

impl ReferenceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a string is a generated handle rather than a raw selector
    pub fn is_handle(candidate: &str) -> bool {
        candidate.starts_with(HANDLE_PREFIX)
    }

    /// Cache an object and return its generated handle.
    ///
    /// Handles are random, so they cannot be guessed across sessions and do
    /// not collide within a session's lifetime.
    pub fn put(&mut self, kind: &str, value: Value) -> String {
        let handle = format!("{}{}/{}", HANDLE_PREFIX, kind, Uuid::new_v4().simple());
        self.entries.insert(
            handle.clone(),
            CachedRef {
                kind: kind.to_string(),
                value,
            },
        );
        handle
    }

    /// Resolve a handle to its cached object.
    ///
    /// An unknown or already-cleared handle is a typed error, distinct from
    /// a driver failure.
    pub fn resolve(&self, handle: &str) -> DroverResult<&CachedRef> {
        self.entries
            .get(handle)
            .ok_or_else(|| DroverError::ReferenceNotFound(handle.to_string()))
    }

    /// Drop every cached reference. Idempotent.
    pub fn clear(&mut self) {
        if !self.entries.is_empty() {
            debug!(count = self.entries.len(), "clearing reference cache");
        }
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
