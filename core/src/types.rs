//! Deterministic action-type derivation.
//!
//! Every (model, method) pair maps to a triplet of globally unique action-type
//! strings: the intent type plus its `_SUCCESS` and `_ERROR` terminals. The
//! derivation is a pure function of its inputs, so two processes (or two test
//! runs) always agree on the vocabulary.

use std::collections::BTreeMap;

/// Process-wide namespace prefix for every derived action type.
///
/// Read-only configuration: all models in a process share it, which keeps
/// types from colliding with actions of the host application.
pub const TYPE_PREFIX: &str = "@@saga-models/";

/// The three action types derived for one model method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodTypes {
    /// Type dispatched to request execution of the method.
    pub intent: String,
    /// Terminal type carrying the method's result.
    pub success: String,
    /// Terminal type carrying the method's rejection reason.
    pub error: String,
}

/// Fold an identifier into `UPPER_SNAKE_CASE`.
///
/// Handles `camelCase`, `snake_case`, `kebab-case`, and space-separated
/// names identically: `findById`, `find_by_id`, and `find-by-id` all fold to
/// `FIND_BY_ID`.
#[must_use]
pub fn upper_snake(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;

    for ch in name.chars() {
        if ch.is_alphanumeric() {
            if ch.is_uppercase() && prev_lower {
                out.push('_');
            }
            prev_lower = ch.is_lowercase() || ch.is_numeric();
            for upper in ch.to_uppercase() {
                out.push(upper);
            }
        } else {
            // Separator run collapses into a single underscore.
            if !out.ends_with('_') && !out.is_empty() {
                out.push('_');
            }
            prev_lower = false;
        }
    }

    while out.ends_with('_') {
        out.pop();
    }

    out
}

/// Derive the action-type triplet for a (model, method) pair.
///
/// Stable and injective over distinct pairs, as long as names do not collide
/// after case folding (`findById` and `find_by_id` fold identically).
#[must_use]
pub fn method_types(model_name: &str, method_name: &str) -> MethodTypes {
    let intent = format!(
        "{TYPE_PREFIX}{}/{}",
        upper_snake(model_name),
        upper_snake(method_name)
    );
    let success = format!("{intent}_SUCCESS");
    let error = format!("{intent}_ERROR");

    MethodTypes {
        intent,
        success,
        error,
    }
}

/// Build the action-type constant map for a model.
///
/// Keys are `NAME`, `NAME_SUCCESS`, and `NAME_ERROR` in upper snake case,
/// values are the derived type strings. Mixins contribute their own maps
/// through [`crate::mixin::Mixin::action_types`].
#[must_use]
pub fn action_types<'a, I>(model_name: &str, method_names: I) -> BTreeMap<String, String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut map = BTreeMap::new();
    for name in method_names {
        let folded = upper_snake(name);
        let types = method_types(model_name, name);
        map.insert(folded.clone(), types.intent);
        map.insert(format!("{folded}_SUCCESS"), types.success);
        map.insert(format!("{folded}_ERROR"), types.error);
    }
    map
}
