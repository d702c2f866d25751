//! The execution core: Tool Registry, Variable Resolver, Context Memory,
//! Retry Policy, Execution Logger, durable storage, and the Workflow
//! Executor that wires them together.

pub mod context;
pub mod executor;
pub mod logger;
pub mod nats_storage;
pub mod registry;
pub mod resolver;
pub mod retry;
pub mod sanitize;
pub mod storage;
pub mod tokens;

pub use context::ExecutionContext;
pub use executor::{StepFailure, WorkflowExecutor};
pub use registry::{Handler, HandlerError, HandlerOutcome, ToolRegistry};
pub use retry::RetryPolicy;
pub use storage::{InMemoryStorage, Storage};
