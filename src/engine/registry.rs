// Tool Registry — the single source of truth for executable step types
// and their input schemas.
//
// Written only during startup linking, thereafter read-mostly; handler
// binding is kept behind a trait object so the concrete integration never
// leaks into this module.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;

use crate::engine::context::StepContext;
use crate::models::{ToolCategory, ToolDefinition, ToolName};
use crate::Result;

/// The error a handler can fail with. Kept as a plain string plus an
/// optional HTTP-style status code so the Retry Policy can classify it
/// without parsing free text when structure is available.
#[derive(Debug, Clone)]
pub struct HandlerError {
    pub message: String,
    pub status_code: Option<u16>,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status_code: None,
        }
    }

    pub fn with_status(message: impl Into<String>, status_code: u16) -> Self {
        Self {
            message: message.into(),
            status_code: Some(status_code),
        }
    }
}

impl std::fmt::Display for HandlerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status_code {
            Some(code) => write!(f, "{} (status {})", self.message, code),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for HandlerError {}

pub type HandlerOutcome = std::result::Result<serde_json::Value, HandlerError>;

/// A handler is a callable that consumes a parameter map plus an
/// execution context and yields a structured output or a failure.
/// Implemented as a type-safe trait rather than open inheritance or
/// runtime class tricks.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn call(&self, params: serde_json::Value, context: &StepContext) -> HandlerOutcome;
}

/// Adapter so a plain async closure can be used as a [`Handler`] without
/// a dedicated struct — convenient for built-in/test handlers.
#[async_trait]
impl<F, Fut> Handler for F
where
    F: Fn(serde_json::Value, StepContext) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = HandlerOutcome> + Send,
{
    async fn call(&self, params: serde_json::Value, context: &StepContext) -> HandlerOutcome {
        (self)(params, context.clone()).await
    }
}

struct RegistryEntry {
    definition: ToolDefinition,
    handler: Option<Arc<dyn Handler>>,
}

/// Holds tool definitions and binds each to a handler.
///
/// Invariant: every `lookup` on a name known to have been `define`d
/// returns the same definition for the lifetime of the process. A handler
/// bound twice keeps the latest binding. An unknown name returns a `nil`
/// handler but does not error.
pub struct ToolRegistry {
    entries: RwLock<HashMap<ToolName, RegistryEntry>>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Register a tool definition. If a definition with the same name
    /// already exists, it is replaced but any bound handler is preserved.
    pub async fn define(&self, definition: ToolDefinition) {
        let mut entries = self.entries.write().await;
        let handler = entries.remove(&definition.name).and_then(|e| e.handler);
        entries.insert(
            definition.name.clone(),
            RegistryEntry { definition, handler },
        );
    }

    /// Bind a handler to a tool name. If no definition exists for that
    /// name, one is adopted as "unversioned" so that old automations
    /// referencing it keep running.
    pub async fn bind(&self, name: impl Into<ToolName>, handler: Arc<dyn Handler>) {
        let name = name.into();
        let mut entries = self.entries.write().await;
        match entries.get_mut(&name) {
            Some(entry) => entry.handler = Some(handler),
            None => {
                warn!(tool = %name, "handler bound without a matching definition; adopting unversioned definition");
                entries.insert(
                    name.clone(),
                    RegistryEntry {
                        definition: ToolDefinition::unversioned(name),
                        handler: Some(handler),
                    },
                );
            }
        }
    }

    /// Look up a tool by name. Returns `None` if the name was never
    /// defined; returns `Some((definition, None))` if defined but no
    /// handler has been bound yet.
    pub async fn lookup(&self, name: &str) -> Option<(ToolDefinition, Option<Arc<dyn Handler>>)> {
        let entries = self.entries.read().await;
        entries
            .get(&ToolName::new(name))
            .map(|e| (e.definition.clone(), e.handler.clone()))
    }

    pub async fn list(&self) -> Vec<ToolDefinition> {
        let entries = self.entries.read().await;
        entries.values().map(|e| e.definition.clone()).collect()
    }

    pub async fn list_exposable(&self) -> Vec<ToolDefinition> {
        self.list()
            .await
            .into_iter()
            .filter(|d| d.externally_exposable)
            .collect()
    }

    /// Human-readable enumeration of tools and parameters, for an AI
    /// planner reading the RPC `initialize` handshake.
    pub async fn render_prompt(&self) -> String {
        let mut tools = self.list_exposable().await;
        tools.sort_by(|a, b| a.name.as_str().cmp(b.name.as_str()));

        let mut out = String::new();
        out.push_str("Available tools:\n\n");
        for tool in &tools {
            out.push_str(&format!("- {} ({})\n", tool.name, tool.category));
            out.push_str(&format!("  {}\n", tool.description));
            if let Some(props) = tool.input_schema.get("properties").and_then(|v| v.as_object()) {
                let required: Vec<&str> = tool
                    .input_schema
                    .get("required")
                    .and_then(|v| v.as_array())
                    .map(|a| a.iter().filter_map(|v| v.as_str()).collect())
                    .unwrap_or_default();
                for (param, schema) in props {
                    let kind = schema.get("type").and_then(|v| v.as_str()).unwrap_or("any");
                    let marker = if required.contains(&param.as_str()) {
                        "required"
                    } else {
                        "optional"
                    };
                    out.push_str(&format!("    - {} ({}, {})\n", param, kind, marker));
                }
            }
            out.push('\n');
        }
        out
    }

    /// Validate a parameter map against a tool's JSON Schema.
    pub async fn validate_params(&self, name: &str, params: &serde_json::Value) -> Result<()> {
        let Some((definition, _)) = self.lookup(name).await else {
            return Ok(());
        };
        let validator = jsonschema::JSONSchema::compile(&definition.input_schema)
            .map_err(|e| crate::CoreError::Internal(format!("invalid schema for {}: {}", name, e)))?;
        if let Err(errors) = validator.validate(params) {
            let messages: Vec<String> = errors.map(|e| e.to_string()).collect();
            return Err(crate::CoreError::Validation(format!(
                "parameters for {} failed schema validation: {}",
                name,
                messages.join("; ")
            )));
        }
        Ok(())
    }

    /// Suggest a similar registered name for an unknown tool, using
    /// Levenshtein edit distance with a threshold of 3.
    pub async fn suggest_similar(&self, unknown: &str) -> Option<String> {
        const THRESHOLD: usize = 3;
        let names = self.list().await;
        names
            .iter()
            .map(|d| (d.name.as_str().to_string(), edit_distance(unknown, d.name.as_str())))
            .filter(|(_, dist)| *dist <= THRESHOLD)
            .min_by_key(|(_, dist)| *dist)
            .map(|(name, _)| name)
    }

    #[cfg(test)]
    pub async fn category_counts(&self) -> HashMap<String, usize> {
        let mut counts = HashMap::new();
        for def in self.list().await {
            *counts.entry(def.category.to_string()).or_insert(0) += 1;
        }
        counts
    }
}

/// Classic Wagner–Fischer edit distance, used for "did you mean" tool
/// suggestions.
fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (n, m) = (a.len(), b.len());
    let mut dp = vec![vec![0usize; m + 1]; n + 1];
    for i in 0..=n {
        dp[i][0] = i;
    }
    for j in 0..=m {
        dp[0][j] = j;
    }
    for i in 1..=n {
        for j in 1..=m {
            let cost = if a[i - 1] == b[j - 1] { 0 } else { 1 };
            dp[i][j] = (dp[i - 1][j] + 1)
                .min(dp[i][j - 1] + 1)
                .min(dp[i - 1][j - 1] + cost);
        }
    }
    dp[n][m]
}

/// Loads tool definitions from a bundled definitions file. Emits a
/// warning for each definition without a handler — the actual
/// handler linking happens via [`ToolRegistry::bind`] from the
/// integrations layer, which this function doesn't know about.
pub async fn load_definitions(registry: &ToolRegistry, definitions: Vec<ToolDefinition>) {
    for def in definitions {
        registry.define(def).await;
    }
}

/// Call after all handlers have been bound, to warn about definitions
/// that never received one.
pub async fn warn_unbound(registry: &ToolRegistry) {
    let entries = registry.entries.read().await;
    for (name, entry) in entries.iter() {
        if entry.handler.is_none() {
            warn!(tool = %name, "tool definition has no bound handler");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": { "symbol": { "type": "string" } },
            "required": ["symbol"]
        })
    }

    #[tokio::test]
    async fn unknown_lookup_returns_none_not_error() {
        let registry = ToolRegistry::new();
        assert!(registry.lookup("nope").await.is_none());
    }

    #[tokio::test]
    async fn rebinding_keeps_latest_handler() {
        let registry = ToolRegistry::new();
        registry
            .define(ToolDefinition::new(
                "fetch_stock_price",
                "1.0.0",
                "fetch a quote",
                ToolCategory::Fetch,
                true,
                schema(),
            ))
            .await;

        registry
            .bind(
                "fetch_stock_price",
                Arc::new(|_p: serde_json::Value, _c: StepContext| async move {
                    Ok(serde_json::json!({ "price": "1" }))
                }),
            )
            .await;
        registry
            .bind(
                "fetch_stock_price",
                Arc::new(|_p: serde_json::Value, _c: StepContext| async move {
                    Ok(serde_json::json!({ "price": "2" }))
                }),
            )
            .await;

        let (_, handler) = registry.lookup("fetch_stock_price").await.unwrap();
        let out = handler
            .unwrap()
            .call(serde_json::Value::Null, &StepContext::empty_for_test())
            .await
            .unwrap();
        assert_eq!(out["price"], "2");
    }

    #[tokio::test]
    async fn unbound_handler_adopts_unversioned_definition() {
        let registry = ToolRegistry::new();
        registry
            .bind(
                "mystery_tool",
                Arc::new(|_p: serde_json::Value, _c: StepContext| async move { Ok(serde_json::Value::Null) }),
            )
            .await;
        let (def, handler) = registry.lookup("mystery_tool").await.unwrap();
        assert!(handler.is_some());
        assert_eq!(def.version, "0.0.0-unversioned");
    }

    #[tokio::test]
    async fn suggests_similar_name_within_threshold() {
        let registry = ToolRegistry::new();
        registry
            .define(ToolDefinition::new(
                "fetch_stock_price",
                "1.0.0",
                "d",
                ToolCategory::Fetch,
                true,
                schema(),
            ))
            .await;
        let suggestion = registry.suggest_similar("fetch_stonk_price").await;
        assert_eq!(suggestion.as_deref(), Some("fetch_stock_price"));
    }

    #[tokio::test]
    async fn validates_params_against_schema() {
        let registry = ToolRegistry::new();
        registry
            .define(ToolDefinition::new(
                "fetch_stock_price",
                "1.0.0",
                "d",
                ToolCategory::Fetch,
                true,
                schema(),
            ))
            .await;
        assert!(registry
            .validate_params("fetch_stock_price", &serde_json::json!({}))
            .await
            .is_err());
        assert!(registry
            .validate_params("fetch_stock_price", &serde_json::json!({"symbol": "AAPL"}))
            .await
            .is_ok());
    }
}
