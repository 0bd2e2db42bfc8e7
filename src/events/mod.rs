//! # Metrics Events
//!
//! Advisory notifications (threshold breaches, baseline changes, fresh job
//! metrics) broadcast to any number of in-process subscribers. A slow or
//! absent subscriber never affects the recording path.

pub mod publisher;
pub mod types;

pub use publisher::{EventPublisher, PublishedEvent};
pub use types::{percentage_over, MetricsEvent};
