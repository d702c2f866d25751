// Core domain models, reimplemented as explicit Rust types.

pub mod automation;
pub mod execution;
pub mod ids;
pub mod rss;
pub mod tool;
pub mod trigger;
pub mod user;

pub use automation::{Automation, AutomationStatus, Step};
pub use execution::{Execution, ExecutionStatus, StateLog, StateTransition, StepResult};
pub use ids::{AutomationId, ExecutionId, ToolName};
pub use rss::{RssPollState, DEFAULT_SEEN_SET_CAP};
pub use tool::{ToolCategory, ToolDefinition};
pub use trigger::{Interval, IntervalUnit, TimeOfDay, Trigger};
pub use user::UserIdentity;
