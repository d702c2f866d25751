// Tool Definition domain model.

use serde::{Deserialize, Serialize};

use super::ids::ToolName;

/// Coarse grouping used by `resources/list` category groupings and by the
/// rendered tool prompt. Kept open via `Custom` so tool definitions loaded
/// from the bundled definitions file can introduce categories the core
/// doesn't know about by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCategory {
    Fetch,
    Notify,
    Transform,
    Storage,
    Custom(String),
}

impl std::fmt::Display for ToolCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolCategory::Fetch => write!(f, "fetch"),
            ToolCategory::Notify => write!(f, "notify"),
            ToolCategory::Transform => write!(f, "transform"),
            ToolCategory::Storage => write!(f, "storage"),
            ToolCategory::Custom(name) => write!(f, "{}", name),
        }
    }
}

/// A named capability with an input schema, bound to a handler at runtime.
///
/// Definitions are loaded once at process start; the binding table that
/// pairs a definition with its handler is process-local
/// and lives in [`crate::engine::registry::ToolRegistry`], not here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: ToolName,
    pub version: String,
    pub description: String,
    pub category: ToolCategory,
    /// Whether this tool is included in the Tool-Discovery RPC `tools/list`
    /// response and callable via `tools/call`.
    pub externally_exposable: bool,
    /// JSON Schema describing valid input parameter maps.
    pub input_schema: serde_json::Value,
    /// Informational only — not enforced at invocation time.
    #[serde(default)]
    pub output_schema: serde_json::Value,
}

impl ToolDefinition {
    pub fn new(
        name: impl Into<ToolName>,
        version: impl Into<String>,
        description: impl Into<String>,
        category: ToolCategory,
        externally_exposable: bool,
        input_schema: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            description: description.into(),
            category,
            externally_exposable,
            input_schema,
            output_schema: serde_json::Value::Null,
        }
    }

    /// An "unversioned" definition with an empty schema, adopted when a
    /// handler is bound without a matching definition in the bundled file,
    /// so old automations referencing it keep running.
    pub fn unversioned(name: impl Into<ToolName>) -> Self {
        Self::new(
            name,
            "0.0.0-unversioned",
            "Unversioned tool (handler bound without a registry definition)",
            ToolCategory::Custom("unversioned".to_string()),
            false,
            serde_json::json!({ "type": "object" }),
        )
    }
}
