//! Step Lifecycle
//!
//! A step runs in three phases:
//! 1. `prepare` reads what it needs from the shared store
//! 2. `execute` does the work on the prepared input, retried per the
//!    node's [`RetryPolicy`], with `fallback` as the last resort
//! 3. `post` writes results back to the store and picks the next action
//!
//! `execute` never sees the store, so a failed attempt can be repeated
//! without observing partially written shared state.

use serde_json::Value;

use log::debug;

use crate::error::{FlowError, Result, StepError};
use crate::workflow::{Action, SharedStore};

use super::retry::{retry_blocking, RetryPolicy};

/// Anything that can run over a shared store and report an action.
///
/// Implemented by single steps, batch steps, and whole flows, which is
/// what lets a flow be used as a node of another flow.
pub trait Runnable: Send + Sync {
    fn name(&self) -> &str;

    fn run(&self, store: &mut SharedStore) -> Result<Option<Action>>;
}

/// A unit of work with a prepare/execute/post lifecycle.
///
/// # Example
///
/// ```
/// use stepgraph::execution::{Node, Runnable, Step};
/// use stepgraph::workflow::{Action, SharedStore};
/// use stepgraph::StepError;
///
/// struct Review;
///
/// impl Step for Review {
///     type Prep = i64;
///     type Output = &'static str;
///
///     fn prepare(&self, store: &SharedStore) -> Result<i64, StepError> {
///         Ok(store.get_or("score", 0))
///     }
///
///     fn execute(&self, score: &i64) -> Result<&'static str, StepError> {
///         Ok(if *score >= 60 { "approve" } else { "reject" })
///     }
///
///     fn post(&self, store: &mut SharedStore, _: &i64, decision: &&'static str) -> Result<Option<Action>, StepError> {
///         store.set("decision", decision)?;
///         Ok(Some(Action::from(*decision)))
///     }
/// }
///
/// let mut store = SharedStore::new();
/// store.set("score", &80).unwrap();
/// let action = Node::new("review", Review).run(&mut store).unwrap();
/// assert_eq!(action, Some(Action::from("approve")));
/// ```
pub trait Step: Send + Sync {
    type Prep;
    type Output;

    fn prepare(&self, store: &SharedStore) -> std::result::Result<Self::Prep, StepError>;

    fn execute(&self, prep: &Self::Prep) -> std::result::Result<Self::Output, StepError>;

    /// Attempt-aware entry point used by the engine. `attempt` is zero-based
    /// and below the node's `max_attempts`. Defaults to [`execute`](Self::execute).
    fn execute_attempt(&self, prep: &Self::Prep, attempt: u32) -> std::result::Result<Self::Output, StepError> {
        let _ = attempt;
        self.execute(prep)
    }

    /// Called once when every attempt of `execute` failed. The default
    /// re-raises the error.
    fn fallback(&self, prep: &Self::Prep, error: StepError) -> std::result::Result<Self::Output, StepError> {
        let _ = prep;
        Err(error)
    }

    fn post(
        &self,
        store: &mut SharedStore,
        prep: &Self::Prep,
        output: &Self::Output,
    ) -> std::result::Result<Option<Action>, StepError> {
        let _ = (store, prep, output);
        Ok(None)
    }
}

/// Record of one step invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Execution<P, O> {
    pub prepared: P,
    pub output: O,
    pub action: Option<Action>,
    /// Execute attempts made, including the failed ones
    pub attempts: u32,
    /// True when the output came from `fallback`
    pub recovered: bool,
}

/// Result of the execute phase before `post` runs.
pub(crate) struct Executed<O> {
    pub output: O,
    pub attempts: u32,
    pub recovered: bool,
}

/// Runs `execute` under `policy`, then `fallback` once if all attempts fail.
///
/// On an unrecovered failure, returns the fallback's error and the number
/// of attempts made.
pub(crate) fn execute_with_retry<P, O>(
    name: &str,
    policy: &RetryPolicy,
    prep: &P,
    execute: impl Fn(&P, u32) -> std::result::Result<O, StepError>,
    fallback: impl FnOnce(&P, StepError) -> std::result::Result<O, StepError>,
) -> std::result::Result<Executed<O>, (StepError, u32)> {
    match retry_blocking(policy, |attempt| execute(prep, attempt)) {
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
            match fallback(prep, exhausted.error) {
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

/// A named step with its retry configuration.
pub struct Node<S> {
    name: String,
    step: S,
    retry: RetryPolicy,
}

impl<S: Step> Node<S> {
    /// Creates a node that attempts `execute` once.
    pub fn new(name: impl Into<String>, step: S) -> Self {
        Self {
            name: name.into(),
            step,
            retry: RetryPolicy::default(),
        }
    }

    /// Sets the total number of execute attempts (at least 1).
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.retry = RetryPolicy::new(max_attempts, self.retry.wait);
        self
    }

    /// Sets the pause between failed attempts.
    pub fn with_retry_wait(mut self, wait: std::time::Duration) -> Self {
        self.retry.wait = wait;
        self
    }

    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = RetryPolicy::new(policy.max_attempts, policy.wait);
        self
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn step(&self) -> &S {
        &self.step
    }

    /// Runs the full lifecycle and returns everything it produced.
    pub fn run_detailed(&self, store: &mut SharedStore) -> Result<Execution<S::Prep, S::Output>> {
        debug!("Running step '{}'", self.name);

        let prepared = self.step.prepare(store).map_err(|source| FlowError::Prepare {
            step: self.name.clone(),
            source,
        })?;

        let executed = execute_with_retry(
            &self.name,
            &self.retry,
            &prepared,
            |prep, attempt| self.step.execute_attempt(prep, attempt),
            |prep, err| self.step.fallback(prep, err),
        )
        .map_err(|(source, attempts)| FlowError::Execution {
            step: self.name.clone(),
            attempts,
            source,
        })?;

        let action = self
            .step
            .post(store, &prepared, &executed.output)
            .map_err(|source| FlowError::Post {
                step: self.name.clone(),
                source,
            })?;

        Ok(Execution {
            prepared,
            output: executed.output,
            action,
            attempts: executed.attempts,
            recovered: executed.recovered,
        })
    }
}

impl<S: Step> Runnable for Node<S> {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, store: &mut SharedStore) -> Result<Option<Action>> {
        self.run_detailed(store).map(|execution| execution.action)
    }
}

type PrepareFn = Box<dyn Fn(&SharedStore) -> std::result::Result<Value, StepError> + Send + Sync>;
type ExecuteFn = Box<dyn Fn(&Value) -> std::result::Result<Value, StepError> + Send + Sync>;
type FallbackFn = Box<dyn Fn(&Value, StepError) -> std::result::Result<Value, StepError> + Send + Sync>;
type PostFn =
    Box<dyn Fn(&mut SharedStore, &Value, &Value) -> std::result::Result<Option<Action>, StepError> + Send + Sync>;

/// A step assembled from closures over JSON values.
///
/// Handy for small pipelines where a dedicated type would be overkill.
/// Without a prepare closure the prepared input is `null`; without a post
/// closure the step returns no action.
pub struct FnStep {
    prepare: Option<PrepareFn>,
    execute: ExecuteFn,
    fallback: Option<FallbackFn>,
    post: Option<PostFn>,
}

impl FnStep {
    pub fn new<F>(execute: F) -> Self
    where
        F: Fn(&Value) -> std::result::Result<Value, StepError> + Send + Sync + 'static,
    {
        Self {
            prepare: None,
            execute: Box::new(execute),
            fallback: None,
            post: None,
        }
    }

    pub fn with_prepare<F>(mut self, prepare: F) -> Self
    where
        F: Fn(&SharedStore) -> std::result::Result<Value, StepError> + Send + Sync + 'static,
    {
        self.prepare = Some(Box::new(prepare));
        self
    }

    pub fn with_fallback<F>(mut self, fallback: F) -> Self
    where
        F: Fn(&Value, StepError) -> std::result::Result<Value, StepError> + Send + Sync + 'static,
    {
        self.fallback = Some(Box::new(fallback));
        self
    }

    pub fn with_post<F>(mut self, post: F) -> Self
    where
        F: Fn(&mut SharedStore, &Value, &Value) -> std::result::Result<Option<Action>, StepError>
            + Send
            + Sync
            + 'static,
    {
        self.post = Some(Box::new(post));
        self
    }
}

impl Step for FnStep {
    type Prep = Value;
    type Output = Value;

    fn prepare(&self, store: &SharedStore) -> std::result::Result<Value, StepError> {
        match &self.prepare {
            Some(prepare) => prepare(store),
            None => Ok(Value::Null),
        }
    }

    fn execute(&self, prep: &Value) -> std::result::Result<Value, StepError> {
        (self.execute)(prep)
    }

    fn fallback(&self, prep: &Value, error: StepError) -> std::result::Result<Value, StepError> {
        match &self.fallback {
            Some(fallback) => fallback(prep, error),
            None => Err(error),
        }
    }

    fn post(
        &self,
        store: &mut SharedStore,
        prep: &Value,
        output: &Value,
    ) -> std::result::Result<Option<Action>, StepError> {
        match &self.post {
            Some(post) => post(store, prep, output),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    /// Fails the first `failures` attempts, then echoes its input.
    struct Flaky {
        failures: u32,
        calls: Arc<AtomicU32>,
        fallback: Option<&'static str>,
    }

    impl Step for Flaky {
        type Prep = String;
        type Output = String;

        fn prepare(&self, store: &SharedStore) -> std::result::Result<String, StepError> {
            Ok(store.get("prompt")?)
        }

        fn execute(&self, prompt: &String) -> std::result::Result<String, StepError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(format!("connection reset on call {}", call).into())
            } else {
                Ok(format!("answer to {}", prompt))
            }
        }

        fn fallback(&self, prep: &String, error: StepError) -> std::result::Result<String, StepError> {
            match self.fallback {
                Some(text) => Ok(format!("{} ({})", text, prep)),
                None => Err(error),
            }
        }

        fn post(
            &self,
            store: &mut SharedStore,
            _prep: &String,
            output: &String,
        ) -> std::result::Result<Option<Action>, StepError> {
            store.set("result", output)?;
            Ok(None)
        }
    }

    fn flaky(failures: u32, fallback: Option<&'static str>) -> (Flaky, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        let step = Flaky {
            failures,
            calls: Arc::clone(&calls),
            fallback,
        };
        (step, calls)
    }

    fn store_with_prompt() -> SharedStore {
        let mut store = SharedStore::new();
        store.set("prompt", "hello").unwrap();
        store
    }

    #[test]
    fn test_lifecycle_writes_result() {
        let (step, calls) = flaky(0, None);
        let node = Node::new("api", step);
        let mut store = store_with_prompt();

        let execution = node.run_detailed(&mut store).unwrap();

        assert_eq!(execution.prepared, "hello");
        assert_eq!(execution.output, "answer to hello");
        assert_eq!(execution.attempts, 1);
        assert!(!execution.recovered);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.get::<String>("result").unwrap(), "answer to hello");
    }

    #[test]
    fn test_retries_until_success() {
        let (step, calls) = flaky(2, None);
        let node = Node::new("api", step).with_max_attempts(3);
        let mut store = store_with_prompt();

        let execution = node.run_detailed(&mut store).unwrap();

        assert_eq!(execution.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_exhausted_without_fallback_propagates() {
        let (step, calls) = flaky(u32::MAX, None);
        let node = Node::new("api", step).with_max_attempts(4);
        let mut store = store_with_prompt();

        let err = node.run(&mut store).unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert!(matches!(err, FlowError::Execution { attempts: 4, ref step, .. } if step == "api"));
        assert!(!store.contains_key("result"));
    }

    #[test]
    fn test_fallback_recovers_and_post_runs() {
        let (step, calls) = flaky(u32::MAX, Some("cached"));
        let node = Node::new("api", step).with_max_attempts(5);
        let mut store = store_with_prompt();

        let execution = node.run_detailed(&mut store).unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert!(execution.recovered);
        assert_eq!(execution.output, "cached (hello)");
        assert_eq!(store.get::<String>("result").unwrap(), "cached (hello)");
    }

    #[test]
    fn test_retry_wait_applied() {
        let (step, _) = flaky(2, None);
        let node = Node::new("api", step)
            .with_max_attempts(3)
            .with_retry_wait(Duration::from_millis(25));
        let mut store = store_with_prompt();

        let start = Instant::now();
        node.run(&mut store).unwrap();
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_prepare_error_skips_execute() {
        let (step, calls) = flaky(0, None);
        let node = Node::new("api", step);
        let mut store = SharedStore::new();

        let err = node.run(&mut store).unwrap_err();

        assert!(matches!(err, FlowError::Prepare { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_with_retry_policy() {
        let (step, _) = flaky(0, None);
        let node = Node::new("api", step).with_retry(RetryPolicy::new(0, Duration::ZERO));
        assert_eq!(node.retry_policy().max_attempts, 1);
    }

    #[test]
    fn test_fn_step() {
        let node = Node::new(
            "double",
            FnStep::new(|n| Ok(json!(n.as_i64().unwrap_or(0) * 2)))
                .with_prepare(|store| Ok(store.get_value("n").cloned().unwrap_or(json!(0))))
                .with_post(|store, _, out| {
                    store.insert_value("doubled", out.clone());
                    Ok(Some(Action::from("done")))
                }),
        );
        let mut store = SharedStore::new();
        store.set("n", &21).unwrap();

        let action = node.run(&mut store).unwrap();

        assert_eq!(action, Some(Action::from("done")));
        assert_eq!(store.get::<i64>("doubled").unwrap(), 42);
        assert_eq!(node.name(), "double");
    }

    #[test]
    fn test_fn_step_fallback() {
        let node = Node::new(
            "fallible",
            FnStep::new(|_| Err("boom".into())).with_fallback(|_, _| Ok(json!("safe"))),
        )
        .with_max_attempts(2);

        let execution = node.run_detailed(&mut SharedStore::new()).unwrap();
        assert_eq!(execution.output, json!("safe"));
        assert_eq!(execution.attempts, 2);
    }

    /// Succeeds only on a given zero-based attempt and logs every attempt seen.
    struct SucceedsOn {
        attempt: u32,
        seen: std::sync::Mutex<Vec<u32>>,
    }

    impl Step for SucceedsOn {
        type Prep = ();
        type Output = u32;

        fn prepare(&self, _store: &SharedStore) -> std::result::Result<(), StepError> {
            Ok(())
        }

        fn execute(&self, _prep: &()) -> std::result::Result<u32, StepError> {
            Err("attempt index required".into())
        }

        fn execute_attempt(&self, _prep: &(), attempt: u32) -> std::result::Result<u32, StepError> {
            self.seen.lock().unwrap().push(attempt);
            if attempt == self.attempt {
                Ok(attempt)
            } else {
                Err(format!("attempt {} failed", attempt).into())
            }
        }
    }

    #[test]
    fn test_execute_sees_attempt_index() {
        let node = Node::new(
            "counted",
            SucceedsOn {
                attempt: 2,
                seen: std::sync::Mutex::new(Vec::new()),
            },
        )
        .with_max_attempts(4);

        let first = node.run_detailed(&mut SharedStore::new()).unwrap();
        assert_eq!(first.output, 2);
        assert_eq!(first.attempts, 3);

        // The counter restarts with each invocation
        node.run(&mut SharedStore::new()).unwrap();
        assert_eq!(*node.step().seen.lock().unwrap(), vec![0, 1, 2, 0, 1, 2]);
    }
}
