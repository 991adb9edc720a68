//! Run Monitoring Module
//!
//! # Components
//!
//! - [`ExecutionTimeline`]: Step start/end timing for traced flow runs

pub mod timeline;

pub use timeline::{EventType, ExecutionTimeline, TimelineEvent};
