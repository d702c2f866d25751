// Automation and Step domain models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::ids::AutomationId;
use super::trigger::Trigger;

/// Lifecycle status of an Automation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutomationStatus {
    Draft,
    Active,
    Paused,
}

/// One unit of work inside an automation, naming a registered tool.
///
/// Steps are immutable within an automation version: editing a step
/// produces a new automation version at the (external) CRUD layer, not a
/// mutation here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    /// The tool type this step invokes; must resolve in the Tool Registry.
    #[serde(rename = "type")]
    pub tool_type: String,
    /// Parameter mapping. String values may contain `{{path}}` references
    /// resolved against the execution context before the handler runs.
    #[serde(flatten)]
    pub params: HashMap<String, serde_json::Value>,
    /// Optional alias the step's output is additionally stored under.
    #[serde(rename = "outputAs", default, skip_serializing_if = "Option::is_none")]
    pub output_as: Option<String>,
}

impl Step {
    pub fn new(tool_type: impl Into<String>) -> Self {
        Self {
            tool_type: tool_type.into(),
            params: HashMap::new(),
            output_as: None,
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    pub fn with_output_as(mut self, alias: impl Into<String>) -> Self {
        self.output_as = Some(alias.into());
        self
    }
}

/// A user-owned definition of (trigger, steps).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Automation {
    pub id: AutomationId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub trigger: Trigger,
    /// Non-empty ordered sequence of steps.
    pub steps: Vec<Step>,
    pub status: AutomationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Auxiliary state bound by specific triggers (e.g. a provisioned
    /// spreadsheet id). Opaque to the executor; only the handler that set
    /// it interprets the contents.
    #[serde(default)]
    pub aux_state: HashMap<String, serde_json::Value>,
}

impl Automation {
    pub fn new(id: impl Into<AutomationId>, name: impl Into<String>, trigger: Trigger, steps: Vec<Step>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            trigger,
            steps,
            status: AutomationStatus::Draft,
            created_at: now,
            updated_at: now,
            aux_state: HashMap::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == AutomationStatus::Active
    }
}
