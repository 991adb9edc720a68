//! Step Execution Module
//!
//! Step lifecycles, retry, batch variants, and the flows that drive them.
//!
//! # Architecture
//!
//! - [`step`]: Synchronous step lifecycle and the [`Runnable`] trait
//! - [`batch`]: Sequential batch steps
//! - [`flow`]: Synchronous graph traversal
//! - [`async_step`], [`parallel`], [`async_flow`]: Async counterparts,
//!   including the concurrent parallel batch
//! - [`retry`]: Bounded retry combinator shared by all of the above

pub mod async_flow;
pub mod async_step;
pub mod batch;
pub mod flow;
pub mod parallel;
pub mod retry;
pub mod step;

pub use async_flow::{AsyncFlow, AsyncFlowBuilder};
pub use async_step::{AsyncNode, AsyncRunnable, AsyncStep};
pub use batch::{BatchNode, BatchStep};
pub use flow::{Flow, FlowBuilder};
pub use parallel::{AsyncBatchNode, AsyncBatchStep, ParallelBatchNode};
pub use retry::{retry_async, retry_blocking, RetryExhausted, RetryPolicy};
pub use step::{Execution, FnStep, Node, Runnable, Step};
