//! Trigger Layer: the Scheduler (interval/daily cron jobs), the RSS
//! Poller, and Webhook Intake. Each producer's only output is a call into
//! the [`crate::engine::WorkflowExecutor`].

pub mod rss_poller;
pub mod scheduler;
pub mod webhook;

pub use rss_poller::RssPoller;
pub use scheduler::Scheduler;
pub use webhook::WebhookState;
