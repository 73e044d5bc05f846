//! Method declarations and the method normalizer.
//!
//! A model declares methods either with an async handler (remote operations)
//! or as bare markers (UI-only actions that dispatch directly, with no task
//! behind them). Mixins contribute their own method sets; normalization
//! flattens everything into one ordered, de-duplicated-by-name sequence with
//! model-declared names taking precedence over mixin-contributed ones.

use crate::error::MethodError;
use serde_json::Value;
use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Boxed future returned by a method handler.
///
/// Explicit `Pin<Box<dyn Future>>` keeps handler types dyn-compatible.
pub type MethodFuture = Pin<Box<dyn Future<Output = Result<Value, MethodError>> + Send>>;

/// A callable method implementation.
pub type MethodFn = Arc<dyn Fn(Value) -> MethodFuture + Send + Sync>;

/// One named method of a model.
#[derive(Clone)]
pub struct MethodSpec {
    name: String,
    handler: Option<MethodFn>,
}

impl MethodSpec {
    /// Declare an asynchronous method backed by a handler.
    pub fn handler<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, MethodError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            handler: Some(Arc::new(move |params| Box::pin(f(params)))),
        }
    }

    /// Declare an asynchronous method from an already-boxed handler.
    #[must_use]
    pub fn from_fn(name: impl Into<String>, f: MethodFn) -> Self {
        Self {
            name: name.into(),
            handler: Some(f),
        }
    }

    /// Declare a bare marker method with no handler.
    ///
    /// Dispatching a marker writes a plain action directly; no task runs and
    /// no lifecycle tracking happens beyond the direct result cache.
    #[must_use]
    pub fn marker(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handler: None,
        }
    }

    /// The method's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The handler, if the method is asynchronous.
    #[must_use]
    pub fn handler_fn(&self) -> Option<&MethodFn> {
        self.handler.as_ref()
    }

    /// Whether a task should be generated for this method.
    #[must_use]
    pub const fn is_async(&self) -> bool {
        self.handler.is_some()
    }
}

impl std::fmt::Debug for MethodSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodSpec")
            .field("name", &self.name)
            .field("async", &self.is_async())
            .finish()
    }
}

/// Flatten declared and mixin-contributed methods into one canonical sequence.
///
/// Ordering: model-declared methods first (in declaration order), then mixin
/// methods in mixin-registration order. De-duplication by name: the first
/// declared entry wins among declarations; among mixins the later mixin wins
/// (it overwrites earlier contributions); any model-declared name shadows a
/// mixin-contributed one entirely.
#[must_use]
pub fn normalize_methods(declared: &[MethodSpec], contributed: Vec<MethodSpec>) -> Vec<MethodSpec> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut methods = Vec::with_capacity(declared.len() + contributed.len());

    for method in declared {
        if seen.insert(method.name().to_owned()) {
            methods.push(method.clone());
        }
    }

    // Later mixins overwrite earlier ones, so walk contributions in reverse
    // and keep the first occurrence of each name.
    let mut from_mixins: Vec<MethodSpec> = Vec::new();
    let mut mixin_seen: HashSet<String> = HashSet::new();
    for method in contributed.into_iter().rev() {
        if seen.contains(method.name()) || !mixin_seen.insert(method.name().to_owned()) {
            continue;
        }
        from_mixins.push(method);
    }
    from_mixins.reverse();
    methods.extend(from_mixins);

    methods
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use serde_json::json;

    fn named(name: &str) -> MethodSpec {
        MethodSpec::handler(name, |_params| async { Ok(json!(null)) })
    }

    #[test]
    fn declared_methods_shadow_mixin_methods() {
        let declared = vec![named("find"), MethodSpec::marker("logout")];
        let contributed = vec![named("find"), named("create")];

        let all = normalize_methods(&declared, contributed);
        let names: Vec<&str> = all.iter().map(MethodSpec::name).collect();
        assert_eq!(names, vec!["find", "logout", "create"]);
        // "find" is the declared one, not the mixin's.
        assert!(all[0].is_async());
    }

    #[test]
    fn later_mixin_wins_on_collision() {
        let first = MethodSpec::handler("create", |_p| async { Ok(json!("first")) });
        let second = MethodSpec::handler("create", |_p| async { Ok(json!("second")) });

        let all = normalize_methods(&[], vec![first, second]);
        assert_eq!(all.len(), 1);
        let handler = all[0].handler_fn().unwrap();
        let result = futures::executor::block_on(handler(json!({})));
        assert_eq!(result.unwrap(), json!("second"));
    }

    #[test]
    fn markers_are_preserved_but_not_async() {
        let all = normalize_methods(&[MethodSpec::marker("logout")], vec![]);
        assert_eq!(all.len(), 1);
        assert!(!all[0].is_async());
        assert!(all[0].handler_fn().is_none());
    }

    #[test]
    fn duplicate_declarations_keep_first() {
        let declared = vec![
            MethodSpec::handler("find", |_p| async { Ok(json!("a")) }),
            MethodSpec::handler("find", |_p| async { Ok(json!("b")) }),
        ];
        let all = normalize_methods(&declared, vec![]);
        assert_eq!(all.len(), 1);
    }
}
