//! Sequential Batch Steps
//!
//! A batch step prepares a list of items and executes once per item, in
//! order, each item getting the node's full retry and fallback treatment.
//! `post` receives the outputs in the same order as the items.

use log::debug;

use crate::error::{FlowError, Result, StepError};
use crate::workflow::{Action, SharedStore};

use super::retry::RetryPolicy;
use super::step::{execute_with_retry, Runnable};

/// A step whose execute phase runs once per prepared item.
pub trait BatchStep: Send + Sync {
    type Item;
    type Output;

    fn prepare(&self, store: &SharedStore) -> std::result::Result<Vec<Self::Item>, StepError>;

    fn execute(&self, item: &Self::Item) -> std::result::Result<Self::Output, StepError>;

    /// Per-item attempt hook; `attempt` restarts at 0 for every item.
    fn execute_attempt(&self, item: &Self::Item, attempt: u32) -> std::result::Result<Self::Output, StepError> {
        let _ = attempt;
        self.execute(item)
    }

    fn fallback(&self, item: &Self::Item, error: StepError) -> std::result::Result<Self::Output, StepError> {
        let _ = item;
        Err(error)
    }

    fn post(
        &self,
        store: &mut SharedStore,
        items: &[Self::Item],
        outputs: &[Self::Output],
    ) -> std::result::Result<Option<Action>, StepError> {
        let _ = (store, items, outputs);
        Ok(None)
    }
}

/// A named batch step with its per-item retry configuration.
pub struct BatchNode<S> {
    name: String,
    step: S,
    retry: RetryPolicy,
}

impl<S: BatchStep> BatchNode<S> {
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

    pub fn with_retry_wait(mut self, wait: std::time::Duration) -> Self {
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

    /// Executes every item in order and returns the outputs.
    ///
    /// Stops at the first item that neither succeeds nor is recovered by
    /// its fallback.
    fn execute_all(&self, items: &[S::Item]) -> Result<Vec<S::Output>> {
        let mut outputs = Vec::with_capacity(items.len());

        for (index, item) in items.iter().enumerate() {
            let executed = execute_with_retry(
                &self.name,
                &self.retry,
                item,
                |item, attempt| self.step.execute_attempt(item, attempt),
                |item, err| self.step.fallback(item, err),
            )
            .map_err(|(source, attempts)| FlowError::BatchItem {
                step: self.name.clone(),
                index,
                attempts,
                source,
            })?;

            outputs.push(executed.output);
        }

        Ok(outputs)
    }
}

impl<S: BatchStep> Runnable for BatchNode<S> {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, store: &mut SharedStore) -> Result<Option<Action>> {
        let items = self.step.prepare(store).map_err(|source| FlowError::Prepare {
            step: self.name.clone(),
            source,
        })?;

        debug!("Batch step '{}' processing {} item(s)", self.name, items.len());
        let outputs = self.execute_all(&items)?;

        self.step
            .post(store, &items, &outputs)
            .map_err(|source| FlowError::Post {
                step: self.name.clone(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Upper-cases each text; fails on texts listed in `broken`.
    struct Translate {
        seen: Mutex<Vec<String>>,
        broken: Vec<&'static str>,
        recover: bool,
    }

    impl Translate {
        fn new(broken: Vec<&'static str>, recover: bool) -> Self {
            Self {
                seen: Mutex::new(Vec::new()),
                broken,
                recover,
            }
        }
    }

    impl BatchStep for Translate {
        type Item = String;
        type Output = String;

        fn prepare(&self, store: &SharedStore) -> std::result::Result<Vec<String>, StepError> {
            Ok(store.get_or("texts", Vec::new()))
        }

        fn execute(&self, text: &String) -> std::result::Result<String, StepError> {
            self.seen.lock().unwrap().push(text.clone());
            if self.broken.iter().any(|b| b == text) {
                return Err(format!("cannot translate '{}'", text).into());
            }
            Ok(text.to_uppercase())
        }

        fn fallback(&self, text: &String, error: StepError) -> std::result::Result<String, StepError> {
            if self.recover {
                Ok(format!("?{}", text))
            } else {
                Err(error)
            }
        }

        fn post(
            &self,
            store: &mut SharedStore,
            _items: &[String],
            outputs: &[String],
        ) -> std::result::Result<Option<Action>, StepError> {
            store.set("translations", outputs)?;
            Ok(None)
        }
    }

    fn store_with(texts: &[&str]) -> SharedStore {
        let mut store = SharedStore::new();
        store.set("texts", texts).unwrap();
        store
    }

    #[test]
    fn test_outputs_follow_input_order() {
        let node = BatchNode::new("translate", Translate::new(vec![], false));
        let mut store = store_with(&["a", "b", "c", "d"]);

        node.run(&mut store).unwrap();

        assert_eq!(
            store.get::<Vec<String>>("translations").unwrap(),
            vec!["A", "B", "C", "D"]
        );
        assert_eq!(*node.step().seen.lock().unwrap(), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_empty_batch_still_posts() {
        let node = BatchNode::new("translate", Translate::new(vec![], false));
        let mut store = SharedStore::new();

        node.run(&mut store).unwrap();

        assert_eq!(store.get::<Vec<String>>("translations").unwrap(), Vec::<String>::new());
        assert!(node.step().seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_each_item_retried_independently() {
        let node = BatchNode::new("translate", Translate::new(vec!["b"], true)).with_max_attempts(3);
        let mut store = store_with(&["a", "b", "c"]);

        node.run(&mut store).unwrap();

        // "b" is attempted three times, the others once
        assert_eq!(node.step().seen.lock().unwrap().len(), 5);
        assert_eq!(
            store.get::<Vec<String>>("translations").unwrap(),
            vec!["A", "?b", "C"]
        );
    }

    #[test]
    fn test_unrecovered_item_aborts_batch() {
        let node = BatchNode::new("translate", Translate::new(vec!["b"], false)).with_max_attempts(2);
        let mut store = store_with(&["a", "b", "c"]);

        let err = node.run(&mut store).unwrap_err();

        assert!(matches!(err, FlowError::BatchItem { index: 1, attempts: 2, .. }));
        // "c" never runs and post never writes
        assert_eq!(*node.step().seen.lock().unwrap(), vec!["a", "b", "b"]);
        assert!(!store.contains_key("translations"));
    }
}
