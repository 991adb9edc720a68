//! Asynchronous Step Lifecycle
//!
//! The same prepare/execute/post contract as [`Step`](super::Step), with
//! each phase as a suspension point so model calls or network requests can
//! be awaited. Retry waits use `tokio::time::sleep` instead of blocking.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;

use crate::error::{FlowError, Result, StepError};
use crate::workflow::{Action, SharedStore};

use super::retry::{retry_async, RetryPolicy};
use super::step::Executed;

/// Async counterpart of [`Runnable`](super::Runnable).
#[async_trait]
pub trait AsyncRunnable: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, store: &mut SharedStore) -> Result<Option<Action>>;
}

/// A unit of work whose phases are awaited.
#[async_trait]
pub trait AsyncStep: Send + Sync {
    type Prep: Send + Sync;
    type Output: Send + Sync;

    async fn prepare(&self, store: &SharedStore) -> std::result::Result<Self::Prep, StepError>;

    async fn execute(&self, prep: &Self::Prep) -> std::result::Result<Self::Output, StepError>;

    /// Zero-based attempt-aware entry point; defaults to `execute`.
    async fn execute_attempt(&self, prep: &Self::Prep, attempt: u32) -> std::result::Result<Self::Output, StepError> {
        let _ = attempt;
        self.execute(prep).await
    }

    async fn fallback(&self, prep: &Self::Prep, error: StepError) -> std::result::Result<Self::Output, StepError> {
        let _ = prep;
        Err(error)
    }

    async fn post(
        &self,
        store: &mut SharedStore,
        prep: &Self::Prep,
        output: &Self::Output,
    ) -> std::result::Result<Option<Action>, StepError> {
        let _ = (store, prep, output);
        Ok(None)
    }
}

/// Awaiting version of the execute-with-retry-then-fallback sequence.
pub(crate) async fn execute_with_retry_async<'a, P, O, E, EFut, F, FFut>(
    name: &str,
    policy: &RetryPolicy,
    prep: &'a P,
    execute: E,
    fallback: F,
) -> std::result::Result<Executed<O>, (StepError, u32)>
where
    E: Fn(&'a P, u32) -> EFut,
    EFut: Future<Output = std::result::Result<O, StepError>>,
    F: FnOnce(&'a P, StepError) -> FFut,
    FFut: Future<Output = std::result::Result<O, StepError>>,
{
    match retry_async(policy, |attempt| execute(prep, attempt)).await {
        Ok((output, attempts)) => Ok(Executed {
            output,
            attempts,
            recovered: false,
        }),
        Err(exhausted) => {
            debug!(
                "Step '{}' exhausted {} attempt(s), trying fallback",
                name, exhausted.attempts
            );
            match fallback(prep, exhausted.error).await {
                Ok(output) => Ok(Executed {
                    output,
                    attempts: exhausted.attempts,
                    recovered: true,
                }),
                Err(err) => Err((err, exhausted.attempts)),
            }
        }
    }
}

/// A named async step with its retry configuration.
pub struct AsyncNode<S> {
    name: String,
    step: S,
    retry: RetryPolicy,
}

impl<S: AsyncStep> AsyncNode<S> {
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
impl<S: AsyncStep> AsyncRunnable for AsyncNode<S> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, store: &mut SharedStore) -> Result<Option<Action>> {
        debug!("Running async step '{}'", self.name);

        let prepared = self.step.prepare(store).await.map_err(|source| FlowError::Prepare {
            step: self.name.clone(),
            source,
        })?;

        let executed = execute_with_retry_async(
            &self.name,
            &self.retry,
            &prepared,
            |prep, attempt| self.step.execute_attempt(prep, attempt),
            |prep, err| self.step.fallback(prep, err),
        )
        .await
        .map_err(|(source, attempts)| FlowError::Execution {
            step: self.name.clone(),
            attempts,
            source,
        })?;

        self.step
            .post(store, &prepared, &executed.output)
            .await
            .map_err(|source| FlowError::Post {
                step: self.name.clone(),
                source,
            })
    }
}
