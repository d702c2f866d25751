// Newtype identifiers shared across the domain model.
//
// Keeping these as distinct types (rather than passing bare `String`/`Uuid`
// around) means the compiler catches an automation id accidentally passed
// where an execution id is expected.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifies an Automation. Automations are created by an external
/// CRUD layer, so the id is an opaque string rather than a UUID we mint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AutomationId(String);

impl AutomationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AutomationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for AutomationId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for AutomationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Identifies one Execution. Scheduled/webhook/RSS executions get a random
/// UUID; RPC single-step executions get the `rpc_<timestamp>_<random>`
/// form, so this wraps a plain String rather than a Uuid.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecutionId(String);

impl ExecutionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Mint a fresh execution id for a trigger-initiated run.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Mint an `rpc_<timestamp>_<random>` id for a `tools/call` single-step
    /// execution.
    pub fn generate_rpc(now_unix_millis: i64) -> Self {
        let suffix: u32 = rand::random();
        Self(format!("rpc_{}_{:08x}", now_unix_millis, suffix))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ExecutionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Identifies a tool in the registry. Tool names are unique and stable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ToolName(String);

impl ToolName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ToolName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ToolName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
