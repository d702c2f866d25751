// Workflow Automation — Execution Core
//
// A multi-tenant workflow automation backend turns a stored automation
// definition (trigger + ordered steps) into a running, observable,
// fault-tolerant workflow. This crate is the execution core: the Tool
// Registry, the Workflow Executor, the Trigger Layer (scheduler, RSS
// poller, webhook intake), the Execution Log, and a Tool-Discovery RPC
// facade over the same executor path.
//
// Authentication, automation CRUD, the front-end, and the concrete
// side-effecting integrations are external collaborators. The core only
// ever sees a handler: a callable that consumes a parameter map plus an
// execution context and yields a structured output or a failure.

pub mod config;
pub mod engine;
pub mod handlers;
pub mod models;
pub mod rpc;
pub mod server;
pub mod trigger;

pub use models::{
    Automation, AutomationId, AutomationStatus, Execution, ExecutionId, ExecutionStatus, Step,
    StepResult, ToolDefinition, ToolName, Trigger as TriggerSpec, UserIdentity,
};

pub use engine::context::ExecutionContext;
pub use engine::executor::WorkflowExecutor;
pub use engine::registry::{Handler, HandlerOutcome, ToolRegistry};
pub use engine::retry::RetryPolicy;

use thiserror::Error;

/// Crate-wide error type for control-plane and infrastructure failures.
///
/// Step-level failures inside a running execution never surface as this
/// type — they're captured by [`engine::executor::StepFailure`] and folded
/// into the execution record instead; triggers never see step errors.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        CoreError::Internal(err.to_string())
    }
}

/// Shorthand for `std::result::Result<T, CoreError>`.
pub type Result<T> = std::result::Result<T, CoreError>;
