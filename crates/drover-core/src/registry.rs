//! Capability registry: the catalog of invocable operations
//!
//! Capabilities group tools; tool names are globally unique. Registering a
//! duplicate name is a programming error and panics at startup rather than
//! surfacing at call time.

use crate::handler::{ToolHandler, ToolSchema};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Aggregate alias expanding to every registered capability
pub const CORE_CAPABILITY: &str = "core";

/// A named, immutable group of tool handlers
pub struct Capability {
    pub name: String,
    pub description: String,
    pub tools: Vec<Arc<dyn ToolHandler>>,
}

impl Capability {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            tools: Vec::new(),
        }
    }

    pub fn with_tool(mut self, tool: Arc<dyn ToolHandler>) -> Self {
        self.tools.push(tool);
        self
    }
}

/// Advertised description of one tool
#[derive(Debug, Clone, Serialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub capability: String,
    pub schema: ToolSchema,
}

/// Result of the post-registration sanity pass
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

struct CapabilityEntry {
    name: String,
    tool_names: Vec<String>,
}

/// Catalog of named operations grouped into capabilities.
///
/// Built once at startup by the capability loader, immutable afterwards.
#[derive(Default)]
pub struct CapabilityRegistry {
    handlers: HashMap<String, Arc<dyn ToolHandler>>,
    owners: HashMap<String, String>,
    capabilities: Vec<CapabilityEntry>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a capability and all of its tools.
    ///
    /// # Panics
    ///
    /// Panics if any tool name is already registered. Duplicate names are a
    /// configuration error, never a runtime condition to recover from.
    pub fn register(&mut self, capability: Capability) {
        let mut tool_names = Vec::with_capacity(capability.tools.len());

        for tool in capability.tools {
            let name = tool.name().to_string();
            if let Some(owner) = self.owners.get(&name) {
                panic!(
                    "duplicate tool name '{}': registered by both '{}' and '{}'",
                    name, owner, capability.name
                );
            }
            self.owners.insert(name.clone(), capability.name.clone());
            self.handlers.insert(name.clone(), tool);
            tool_names.push(name);
        }

        self.capabilities.push(CapabilityEntry {
            name: capability.name,
            tool_names,
        });
    }

    /// Look up the handler for a tool name
    pub fn get_handler(&self, tool_name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.handlers.get(tool_name).cloned()
    }

    /// Descriptors for the tools of the requested capabilities.
    ///
    /// `core` is sugar for all registered capabilities; unknown names yield
    /// nothing here (the loader already warned about them).
    pub fn tools_for_capabilities(&self, names: &[String]) -> Vec<ToolDescriptor> {
        let all = names.iter().any(|n| n == CORE_CAPABILITY);
        self.capabilities
            .iter()
            .filter(|entry| all || names.iter().any(|n| *n == entry.name))
            .flat_map(|entry| {
                entry.tool_names.iter().filter_map(|tool_name| {
                    self.handlers.get(tool_name).map(|handler| ToolDescriptor {
                        name: handler.name().to_string(),
                        description: handler.description().to_string(),
                        capability: entry.name.clone(),
                        schema: handler.schema(),
                    })
                })
            })
            .collect()
    }

    /// All registered tool descriptors
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools_for_capabilities(&[CORE_CAPABILITY.to_string()])
    }

    /// Post-registration sanity pass. Run once at startup; an invalid
    /// report must prevent the server from serving any calls.
    pub fn validate(&self) -> ValidationReport {
        let mut report = ValidationReport::default();

        for entry in &self.capabilities {
            if entry.tool_names.is_empty() {
                report
                    .errors
                    .push(format!("capability '{}' has no tools", entry.name));
            }
        }

        for (name, handler) in &self.handlers {
            if name.is_empty() {
                report.errors.push("tool with empty name".to_string());
            }
            if handler.description().is_empty() {
                report.errors.push(format!("tool '{name}' has no description"));
            }
            let schema = handler.schema();
            if !schema.parameters.is_object() {
                report
                    .errors
                    .push(format!("tool '{name}' schema is not an object"));
            }
        }

        report
    }

    pub fn tool_count(&self) -> usize {
        self.handlers.len()
    }

    pub fn capability_names(&self) -> Vec<String> {
        self.capabilities.iter().map(|c| c.name.clone()).collect()
    }
}
