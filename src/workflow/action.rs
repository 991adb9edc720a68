//! Action Keys
//!
//! An action is the tag a step returns from `post` to pick its outgoing
//! edge. The reserved [`Action::DEFAULT`] key is used for unconditional
//! edges and is what a missing or empty action resolves to.

use std::borrow::{Borrow, Cow};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Tag selecting the next transition out of a step.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Action(Cow<'static, str>);

impl Action {
    /// Key of the unconditional edge.
    pub const DEFAULT: Action = Action(Cow::Borrowed("default"));

    /// Creates an action from any string; static keys are borrowed, not copied.
    pub fn new(key: impl Into<Cow<'static, str>>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true for the default key or an empty key.
    pub fn is_default(&self) -> bool {
        self.0.is_empty() || self.0 == Self::DEFAULT.0
    }

    /// Maps `None` and empty actions to [`Action::DEFAULT`].
    pub fn resolve(action: Option<&Action>) -> Action {
        match action {
            Some(a) if !a.is_default() => a.clone(),
            _ => Self::DEFAULT,
        }
    }
}

impl Default for Action {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Copies the key. Use [`Action::new`] with a `&'static str` to borrow it.
impl From<&str> for Action {
    fn from(key: &str) -> Self {
        Self(Cow::Owned(key.to_string()))
    }
}

impl From<String> for Action {
    fn from(key: String) -> Self {
        Self(Cow::Owned(key))
    }
}

impl Borrow<str> for Action {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for Action {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for Action {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_key() {
        assert_eq!(Action::DEFAULT, "default");
        assert!(Action::DEFAULT.is_default());
        assert_eq!(Action::default(), Action::DEFAULT);
    }

    #[test]
    fn test_empty_action_is_default() {
        assert!(Action::from("").is_default());
        assert!(!Action::from("retry").is_default());
    }

    #[test]
    fn test_resolve() {
        assert_eq!(Action::resolve(None), Action::DEFAULT);
        assert_eq!(Action::resolve(Some(&Action::from(""))), Action::DEFAULT);
        assert_eq!(Action::resolve(Some(&Action::from("accept"))), "accept");
    }

    #[test]
    fn test_owned_and_borrowed_compare_equal() {
        assert_eq!(Action::from("search".to_string()), Action::from("search"));
        assert_eq!(Action::new("x").to_string(), "x");
    }

    #[test]
    fn test_from_runtime_str() {
        let decision = String::from("approve");
        let action = Action::from(decision.as_str());
        drop(decision);

        assert_eq!(action, "approve");
        assert!(matches!(Action::new("static").0, Cow::Borrowed(_)));
    }
}
