//! Composable unary transforms ("filters").
//!
//! A [`Transform`] is a chain of named steps applied left to right. The empty
//! chain is the identity: composing with it returns the other operand
//! unchanged, so inert steps never accumulate.

use crate::error::TransformError;
use crate::value::Value;
use indexmap::IndexMap;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

/// Trait for transformation functions.
///
/// Implemented for every `Fn(T) -> Result<T, TransformError>` closure, so most
/// transforms are registered as plain closures.
pub trait TransformFn<T>: Send + Sync {
    /// Apply the transformation.
    fn apply(&self, value: T) -> Result<T, TransformError>;
}

impl<T, F> TransformFn<T> for F
where
    F: Fn(T) -> Result<T, TransformError> + Send + Sync,
{
    fn apply(&self, value: T) -> Result<T, TransformError> {
        self(value)
    }
}

/// Values that transforms can operate on.
///
/// The text conversions let generic transforms (regex substitution, lookup
/// adapters) work on both identifiers and column values.
pub trait Filterable: Clone + fmt::Debug + Send + Sync + 'static {
    /// Textual form, `None` for absent values.
    fn to_text(&self) -> Option<String>;

    fn from_text(text: String) -> Self;
}

impl Filterable for String {
    fn to_text(&self) -> Option<String> {
        Some(self.clone())
    }

    fn from_text(text: String) -> Self {
        text
    }
}

impl Filterable for Value {
    fn to_text(&self) -> Option<String> {
        match self {
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }

    fn from_text(text: String) -> Self {
        Value::Text(text)
    }
}

/// Read-only keyed lookup that can be adapted into a transform.
pub trait Lookup<T>: Send + Sync {
    fn get(&self, key: &str) -> Option<T>;
}

impl<T: Clone + Send + Sync> Lookup<T> for HashMap<String, T> {
    fn get(&self, key: &str) -> Option<T> {
        HashMap::get(self, key).cloned()
    }
}

impl<T: Clone + Send + Sync> Lookup<T> for BTreeMap<String, T> {
    fn get(&self, key: &str) -> Option<T> {
        BTreeMap::get(self, key).cloned()
    }
}

impl<T: Clone + Send + Sync> Lookup<T> for IndexMap<String, T> {
    fn get(&self, key: &str) -> Option<T> {
        IndexMap::get(self, key).cloned()
    }
}

struct Step<T> {
    name: Arc<str>,
    func: Arc<dyn TransformFn<T>>,
    requires_secret: bool,
}

impl<T> Clone for Step<T> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            func: Arc::clone(&self.func),
            requires_secret: self.requires_secret,
        }
    }
}

/// An immutable chain of transformation steps.
pub struct Transform<T> {
    steps: Vec<Step<T>>,
}

impl<T> Clone for Transform<T> {
    fn clone(&self) -> Self {
        Self {
            steps: self.steps.clone(),
        }
    }
}

impl<T> Default for Transform<T> {
    fn default() -> Self {
        Self::identity()
    }
}

impl<T> Transform<T> {
    /// The neutral element of composition.
    pub fn identity() -> Self {
        Self { steps: Vec::new() }
    }

    /// Single-step transform.
    ///
    /// # Example
    ///
    /// ```
    /// use relmodel::transform::Transform;
    ///
    /// let upper = Transform::new("uppercase", |s: String| Ok(s.to_uppercase()));
    /// assert_eq!(upper.apply("abc".to_string()).unwrap(), "ABC");
    /// ```
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(T) -> Result<T, TransformError> + Send + Sync + 'static,
        T: 'static,
    {
        Self::from_arc(name, Arc::new(func))
    }

    /// Single-step transform over a shared function.
    pub fn from_arc(name: impl Into<String>, func: Arc<dyn TransformFn<T>>) -> Self
    where
        T: 'static,
    {
        let name: String = name.into();
        Self {
            steps: vec![Step {
                name: Arc::from(name),
                func,
                requires_secret: false,
            }],
        }
    }

    /// Flag every step of this transform as needing a cryptographic secret.
    pub fn requiring_secret(mut self) -> Self {
        for step in &mut self.steps {
            step.requires_secret = true;
        }
        self
    }

    pub fn is_identity(&self) -> bool {
        self.steps.is_empty()
    }

    /// Whether any step needs a cryptographic secret.
    pub fn requires_secret(&self) -> bool {
        self.steps.iter().any(|s| s.requires_secret)
    }

    /// Step names, in application order.
    pub fn names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name.as_ref()).collect()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Compose: the result applies `self`, then `next`.
    pub fn then(&self, next: &Transform<T>) -> Transform<T> {
        if self.is_identity() {
            return next.clone();
        }
        if next.is_identity() {
            return self.clone();
        }
        let mut steps = Vec::with_capacity(self.steps.len() + next.steps.len());
        steps.extend(self.steps.iter().cloned());
        steps.extend(next.steps.iter().cloned());
        Transform { steps }
    }

    /// Apply every step in order, stopping at the first error.
    pub fn apply(&self, value: T) -> Result<T, TransformError> {
        self.steps
            .iter()
            .try_fold(value, |acc, step| step.func.apply(acc))
    }
}

impl<T: Filterable> Transform<T> {
    /// Adapt a keyed lookup: the value's text is looked up, misses and absent
    /// values pass through unchanged.
    pub fn from_lookup(name: impl Into<String>, lookup: Arc<dyn Lookup<T>>) -> Self {
        Transform::new(name, move |value: T| {
            Ok(match value.to_text() {
                Some(key) => lookup.get(&key).unwrap_or(value),
                None => value,
            })
        })
    }
}

impl<T> fmt::Debug for Transform<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_identity() {
            return f.write_str("Transform(identity)");
        }
        f.debug_tuple("Transform").field(&self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn suffix(tag: &'static str) -> Transform<String> {
        Transform::new(tag, move |s: String| Ok(format!("{}{}", s, tag)))
    }

    #[test]
    fn test_composition_is_left_to_right() {
        let chain = suffix("a").then(&suffix("b"));
        assert_eq!(chain.apply("x".to_string()).unwrap(), "xab");
        assert_eq!(chain.names(), vec!["a", "b"]);
    }

    #[test]
    fn test_identity_is_never_materialized() {
        let id = Transform::<String>::identity();
        let chain = id.then(&suffix("a")).then(&id);
        assert_eq!(chain.len(), 1);
        assert!(id.then(&id).is_identity());
        assert_eq!(id.apply("same".to_string()).unwrap(), "same");
    }

    #[test]
    fn test_errors_stop_the_chain() {
        let fail = Transform::new("fail", |_: String| {
            Err(TransformError::Validation("nope".to_string()))
        });
        let chain = fail.then(&suffix("never"));
        assert_eq!(
            chain.apply("x".to_string()),
            Err(TransformError::Validation("nope".to_string()))
        );
    }

    #[test]
    fn test_secret_capability_propagates() {
        let secret = suffix("s").requiring_secret();
        assert!(secret.requires_secret());
        assert!(suffix("a").then(&secret).requires_secret());
        assert!(!suffix("a").requires_secret());
    }

    #[test]
    fn test_lookup_adapter() {
        let mut map = HashMap::new();
        map.insert("fr".to_string(), "France".to_string());
        let t = Transform::from_lookup("countries", Arc::new(map));
        assert_eq!(t.apply("fr".to_string()).unwrap(), "France");
        assert_eq!(t.apply("de".to_string()).unwrap(), "de");
    }
}
