//! Capability and tool implementations for Drover
//!
//! Each module contributes one capability descriptor; the catalog below is
//! the closed set the loader resolves requested names against.

pub mod input;
pub mod page;
pub mod record;
pub mod session;

// Re-export tools
pub use input::{InputTapTool, InputTextTool};
pub use page::{PageBackTool, PageNavigateTool, PageQueryTool};
pub use record::{RecordReplayTool, RecordStartTool, RecordStopTool};
pub use session::{
    SessionCloseTool, SessionConnectTool, SessionDisconnectTool, SessionLaunchTool,
    SessionReportTool,
};

use drover_core::registry::{CORE_CAPABILITY, Capability, CapabilityRegistry};
use std::collections::HashSet;
use tracing::warn;

type CapabilityFactory = fn() -> Capability;

/// Built-in capabilities, in registration order
const CATALOG: &[(&str, CapabilityFactory)] = &[
    ("session", session::capability),
    ("page", page::capability),
    ("input", input::capability),
    ("record", record::capability),
];

/// Names of every built-in capability
pub fn capability_names() -> Vec<&'static str> {
    CATALOG.iter().map(|(name, _)| *name).collect()
}

/// Resolve the requested capability names and register each against the
/// registry.
///
/// `core` expands to the full catalog (depth 1, no nested aliases).
/// Unknown names are logged and skipped so a partial capability set still
/// starts up; duplicate tool names, by contrast, are fatal in the registry.
pub fn load_capabilities(registry: &mut CapabilityRegistry, names: &[String]) {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut resolved: Vec<CapabilityFactory> = Vec::new();

    for name in names {
        if name == CORE_CAPABILITY {
            for (catalog_name, factory) in CATALOG {
                if seen.insert(*catalog_name) {
                    resolved.push(*factory);
                }
            }
        } else if let Some((catalog_name, factory)) =
            CATALOG.iter().find(|(catalog_name, _)| catalog_name == name)
        {
            if seen.insert(*catalog_name) {
                resolved.push(*factory);
            }
        } else {
            warn!(capability = %name, "unknown capability requested, skipping");
        }
    }

    for factory in resolved {
        registry.register(factory());
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_expands_to_the_full_catalog() {
        let mut registry = CapabilityRegistry::new();
        load_capabilities(&mut registry, &["core".to_string()]);

        let mut names = registry.capability_names();
        names.sort();
        assert_eq!(names, vec!["input", "page", "record", "session"]);
        assert!(registry.validate().is_valid());
    }

    #[test]
    fn unknown_capabilities_are_skipped_not_fatal() {
        let mut registry = CapabilityRegistry::new();
        load_capabilities(
            &mut registry,
            &["page".to_string(), "telepathy".to_string()],
        );

        assert_eq!(registry.capability_names(), vec!["page"]);
        assert!(registry.get_handler("page_query").is_some());
    }

    #[test]
    fn core_plus_explicit_names_do_not_double_register() {
        let mut registry = CapabilityRegistry::new();
        // would panic on duplicate tool names if expansion double-registered
        load_capabilities(
            &mut registry,
            &["core".to_string(), "page".to_string(), "page".to_string()],
        );
        assert_eq!(registry.capability_names().len(), 4);
    }
}
