//! Asynchronous Batch Steps
//!
//! [`AsyncBatchNode`] awaits its items one after another.
//! [`ParallelBatchNode`] starts every item at once (or up to a configured
//! cap) and joins them before `post`.
//!
//! # Parallel failure policy
//!
//! Fail-fast: the first item that exhausts its retries without a
//! recovering fallback ends the step with that item's error, as soon as it
//! fails, regardless of its position in the batch or of the concurrency
//! cap. Items still in flight are dropped, which cancels them at their next
//! suspension point; items not yet started never start. `post` does not run.
//!
//! Results are collected in completion order and slotted back by index, so
//! outputs always follow input order.
//! Items run concurrently on the calling task, so they only overlap while
//! suspended. Item execution sees no shared store; writes happen in `post`
//! after the join.

use std::time::Duration;

use async_trait::async_trait;
use futures::{stream, StreamExt};
use log::debug;

use crate::error::{FlowError, Result, StepError};
use crate::workflow::{Action, SharedStore};

use super::async_step::{execute_with_retry_async, AsyncRunnable};
use super::retry::RetryPolicy;

/// An async step whose execute phase runs once per prepared item.
#[async_trait]
pub trait AsyncBatchStep: Send + Sync {
    type Item: Send + Sync;
    type Output: Send + Sync;

    async fn prepare(&self, store: &SharedStore) -> std::result::Result<Vec<Self::Item>, StepError>;

    async fn execute(&self, item: &Self::Item) -> std::result::Result<Self::Output, StepError>;

    async fn execute_attempt(&self, item: &Self::Item, attempt: u32) -> std::result::Result<Self::Output, StepError> {
        let _ = attempt;
        self.execute(item).await
    }

    async fn fallback(&self, item: &Self::Item, error: StepError) -> std::result::Result<Self::Output, StepError> {
        let _ = item;
        Err(error)
    }

    async fn post(
        &self,
        store: &mut SharedStore,
        items: &[Self::Item],
        outputs: &[Self::Output],
    ) -> std::result::Result<Option<Action>, StepError> {
        let _ = (store, items, outputs);
        Ok(None)
    }
}

/// Runs one item under the retry policy, tagging failures with its index.
async fn execute_item<S: AsyncBatchStep>(
    name: &str,
    retry: &RetryPolicy,
    step: &S,
    index: usize,
    item: &S::Item,
) -> Result<S::Output> {
    execute_with_retry_async(
        name,
        retry,
        item,
        |item, attempt| step.execute_attempt(item, attempt),
        |item, err| step.fallback(item, err),
    )
    .await
    .map(|executed| executed.output)
    .map_err(|(source, attempts)| FlowError::BatchItem {
        step: name.to_string(),
        index,
        attempts,
        source,
    })
}

async fn prepare_items<S: AsyncBatchStep>(name: &str, step: &S, store: &SharedStore) -> Result<Vec<S::Item>> {
    step.prepare(store).await.map_err(|source| FlowError::Prepare {
        step: name.to_string(),
        source,
    })
}

async fn post_outputs<S: AsyncBatchStep>(
    name: &str,
    step: &S,
    store: &mut SharedStore,
    items: &[S::Item],
    outputs: &[S::Output],
) -> Result<Option<Action>> {
    step.post(store, items, outputs).await.map_err(|source| FlowError::Post {
        step: name.to_string(),
        source,
    })
}

/// Sequential async batch: items are awaited in input order.
pub struct AsyncBatchNode<S> {
    name: String,
    step: S,
    retry: RetryPolicy,
}

impl<S: AsyncBatchStep> AsyncBatchNode<S> {
    pub fn new(name: impl Into<String>, step: S) -> Self {
        Self {
            name: name.into(),
            step,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.retry = RetryPolicy::new(max_attempts, self.retry.wait);
        self
    }

    pub fn with_retry_wait(mut self, wait: Duration) -> Self {
        self.retry.wait = wait;
        self
    }

    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = RetryPolicy::new(policy.max_attempts, policy.wait);
        self
    }

    pub fn step(&self) -> &S {
        &self.step
    }
}

#[async_trait]
impl<S: AsyncBatchStep> AsyncRunnable for AsyncBatchNode<S> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, store: &mut SharedStore) -> Result<Option<Action>> {
        let items = prepare_items(&self.name, &self.step, store).await?;
        debug!("Batch step '{}' processing {} item(s)", self.name, items.len());

        let mut outputs = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            outputs.push(execute_item(&self.name, &self.retry, &self.step, index, item).await?);
        }

        post_outputs(&self.name, &self.step, store, &items, &outputs).await
    }
}

/// Concurrent async batch: items run together and are joined before `post`.
pub struct ParallelBatchNode<S> {
    name: String,
    step: S,
    retry: RetryPolicy,
    max_concurrency: Option<usize>,
}

impl<S: AsyncBatchStep> ParallelBatchNode<S> {
    /// Creates a node with unbounded concurrency.
    pub fn new(name: impl Into<String>, step: S) -> Self {
        Self {
            name: name.into(),
            step,
            retry: RetryPolicy::default(),
            max_concurrency: None,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.retry = RetryPolicy::new(max_attempts, self.retry.wait);
        self
    }

    pub fn with_retry_wait(mut self, wait: Duration) -> Self {
        self.retry.wait = wait;
        self
    }

    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = RetryPolicy::new(policy.max_attempts, policy.wait);
        self
    }

    /// Caps how many items are in flight at once. `None` or `Some(0)`
    /// leaves concurrency unbounded.
    pub fn with_max_concurrency(mut self, limit: Option<usize>) -> Self {
        self.max_concurrency = limit.filter(|n| *n > 0);
        self
    }

    pub fn max_concurrency(&self) -> Option<usize> {
        self.max_concurrency
    }

    pub fn step(&self) -> &S {
        &self.step
    }

    async fn execute_all(&self, items: &[S::Item]) -> Result<Vec<S::Output>> {
        let pending: Vec<_> = items
            .iter()
            .enumerate()
            .map(|(index, item)| async move {
                execute_item(&self.name, &self.retry, &self.step, index, item)
                    .await
                    .map(|output| (index, output))
            })
            .collect();

        let limit = self.max_concurrency.unwrap_or(items.len()).max(1);
        let mut completed = stream::iter(pending).buffer_unordered(limit);
        let mut slots: Vec<Option<S::Output>> = std::iter::repeat_with(|| None).take(items.len()).collect();

        // Returning early drops `completed` and every item still in flight
        while let Some(result) = completed.next().await {
            let (index, output) = result?;
            slots[index] = Some(output);
        }

        Ok(slots.into_iter().flatten().collect())
    }
}

#[async_trait]
impl<S: AsyncBatchStep> AsyncRunnable for ParallelBatchNode<S> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, store: &mut SharedStore) -> Result<Option<Action>> {
        let items = prepare_items(&self.name, &self.step, store).await?;
        debug!(
            "Parallel batch step '{}' launching {} item(s) (limit: {:?})",
            self.name,
            items.len(),
            self.max_concurrency
        );

        let outputs = self.execute_all(&items).await?;

        post_outputs(&self.name, &self.step, store, &items, &outputs).await
    }
}
