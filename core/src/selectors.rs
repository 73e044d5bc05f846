//! Selector construction.
//!
//! Selectors are pure projections from a model's state tree to a view value.
//! Defaults read the method cache; custom model selectors fully replace the
//! defaults when declared; mixin-contributed selectors layer on top of both,
//! with later-registered mixins winning on name collision.

use crate::action::Params;
use crate::methods::MethodSpec;
use crate::reducer::{ModelState, StateSlice, MODEL_SLICE};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A pure read accessor over a model's full state tree.
///
/// Called with the same `params` used to invoke the method; the model binds
/// it to the live store state at call time.
pub type Selector = Arc<dyn Fn(&ModelState, &Params) -> Value + Send + Sync>;

/// Sentinel returned when no cache entry exists for the queried params.
///
/// The optimistic "treat unseen as in-flight" policy: a caller that never
/// dispatches observes this sentinel forever.
fn in_flight_sentinel() -> Value {
    json!({ "result": null, "requesting": true, "requested": false })
}

/// Build the default selector for one method.
fn method_selector(method: &MethodSpec) -> Selector {
    let name = method.name().to_owned();
    let is_async = method.is_async();

    Arc::new(move |state: &ModelState, params: &Params| {
        let entry = match state.get(MODEL_SLICE) {
            Some(StateSlice::Methods(cache)) => cache.entry(&name, params),
            _ => None,
        };

        match entry {
            Some(entry) if is_async => serde_json::to_value(entry).unwrap_or(Value::Null),
            // Markers cache a direct result; expose it raw.
            Some(entry) => entry.result.clone().unwrap_or(Value::Null),
            None if is_async => in_flight_sentinel(),
            None => Value::Null,
        }
    })
}

/// Default selectors: one per normalized method, keyed by method name.
#[must_use]
pub fn default_selectors(methods: &[MethodSpec]) -> Vec<(String, Selector)> {
    methods
        .iter()
        .map(|method| (method.name().to_owned(), method_selector(method)))
        .collect()
}

/// Compose the final selector map for a model.
///
/// `custom` replaces the defaults entirely when non-empty (the model author
/// has taken over reading); `from_mixins` is applied last in registration
/// order so later mixins override earlier ones and the model layer alike.
#[must_use]
pub fn build_selectors(
    methods: &[MethodSpec],
    custom: &[(String, Selector)],
    from_mixins: Vec<(String, Selector)>,
) -> BTreeMap<String, Selector> {
    let mut selectors: BTreeMap<String, Selector> = BTreeMap::new();

    if custom.is_empty() {
        for (name, selector) in default_selectors(methods) {
            selectors.insert(name, selector);
        }
    } else {
        for (name, selector) in custom {
            selectors.insert(name.clone(), Arc::clone(selector));
        }
    }

    for (name, selector) in from_mixins {
        selectors.insert(name, selector);
    }

    selectors
}
