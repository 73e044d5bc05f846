//! The request-lifecycle result cache and reducer composition.
//!
//! Every model owns a state tree composed of named slices: the `model` slice
//! holds the per-method result cache, each mixin contributes a slice under
//! its own name, and custom user reducers own `Custom` slices. The composed
//! [`ModelReducer`] routes every dispatched action to every slice, and the
//! [`StoreReducer`] folds the model reducers of a composition into one
//! store-level reducer keyed by model name.
//!
//! The result cache keys entries by structural equality of `params` inside an
//! ordered sequence. Lookup is a linear scan; per-method history is bounded
//! by the distinct parameter combinations actually invoked, so the scan stays
//! small in practice.

use crate::action::{Action, Params};
use crate::crud::reducer::CrudState;
use crate::methods::MethodSpec;
use crate::types::method_types;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

/// Reserved slice name for the default per-method result cache.
pub const MODEL_SLICE: &str = "model";

/// Lifecycle entry for one distinct `params` value of one method.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MethodEntry {
    /// The cache key: the caller's argument value.
    pub params: Params,
    /// Most recent successful result, preserved across later errors.
    pub result: Option<Value>,
    /// Most recent rejection reason, cleared by a later success.
    pub error: Option<Value>,
    /// A fetch for exactly these params is in flight.
    pub requesting: bool,
    /// At least one attempt has completed, success or error.
    pub requested: bool,
}

impl MethodEntry {
    fn in_flight(params: Params) -> Self {
        Self {
            params,
            result: None,
            error: None,
            requesting: true,
            requested: false,
        }
    }
}

/// Per-method result cache: method name → ordered entry sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct MethodCacheState(pub BTreeMap<String, Vec<MethodEntry>>);

impl MethodCacheState {
    /// Entries recorded for a method, empty if none yet.
    #[must_use]
    pub fn entries(&self, method: &str) -> &[MethodEntry] {
        self.0.get(method).map_or(&[], Vec::as_slice)
    }

    /// Locate the entry for an exact `params` value by structural equality.
    #[must_use]
    pub fn entry(&self, method: &str, params: &Params) -> Option<&MethodEntry> {
        self.entries(method).iter().find(|e| &e.params == params)
    }
}

/// One named slice of a model's state tree.
///
/// The tagged representation keeps slice ownership explicit: mixins and
/// custom reducers only ever touch their own variant.
#[derive(Debug, Clone, PartialEq)]
pub enum StateSlice {
    /// Default per-method result cache.
    Methods(MethodCacheState),
    /// Normalized by-id + collections cache owned by the CRUD mixin.
    Crud(CrudState),
    /// Opaque state owned by a user-declared reducer.
    Custom(Value),
}

/// A model's full state tree: slice name → slice.
pub type ModelState = BTreeMap<String, StateSlice>;

/// The composed store state: model name → model state tree.
pub type StoreState = BTreeMap<String, ModelState>;

/// A reducer owning one named slice of a model's state tree.
///
/// Reducers are pure synchronous functions invoked by the host store on every
/// dispatched action; they must never suspend or perform I/O.
pub trait SliceReducer: Send + Sync {
    /// The slice value before any action has been dispatched.
    fn initial(&self) -> StateSlice;

    /// Apply one action to the slice.
    fn reduce(&self, slice: &mut StateSlice, action: &Action);
}

/// How an action type feeds the method cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Intent,
    Success,
    Error,
    /// Marker methods write their payload as the entry result directly.
    Direct,
}

/// Default reducer tracking request lifecycle per method, per distinct params.
pub struct MethodCacheReducer {
    /// action type → (method name, phase)
    routes: HashMap<String, (String, Phase)>,
    method_names: Vec<String>,
}

impl MethodCacheReducer {
    /// Build the cache reducer for a model's declared methods.
    ///
    /// Methods named in `overridden` keep their cache list out of this
    /// reducer entirely: their three action types route to the user-declared
    /// reducer instead.
    #[must_use]
    pub fn new(model_name: &str, methods: &[MethodSpec], overridden: &HashSet<String>) -> Self {
        let mut routes = HashMap::new();
        let mut method_names = Vec::new();

        for method in methods {
            if overridden.contains(method.name()) {
                continue;
            }
            method_names.push(method.name().to_owned());
            let types = method_types(model_name, method.name());
            if method.is_async() {
                routes.insert(types.intent, (method.name().to_owned(), Phase::Intent));
                routes.insert(types.success, (method.name().to_owned(), Phase::Success));
                routes.insert(types.error, (method.name().to_owned(), Phase::Error));
            } else {
                routes.insert(types.intent, (method.name().to_owned(), Phase::Direct));
            }
        }

        Self {
            routes,
            method_names,
        }
    }

    fn reduce_cache(&self, cache: &mut MethodCacheState, action: &Action) {
        let Some((method, phase)) = self.routes.get(&action.kind) else {
            return;
        };

        let entries = cache.0.entry(method.clone()).or_default();
        let index = entries.iter().position(|e| e.params == action.meta.params);

        match (phase, index) {
            (Phase::Intent, None) => {
                entries.push(MethodEntry::in_flight(action.meta.params.clone()));
            },
            (Phase::Intent, Some(i)) => {
                // Stale-while-revalidate: prior result/error stay readable.
                entries[i].requesting = true;
            },
            (Phase::Success | Phase::Error | Phase::Direct, index) => {
                let i = index.unwrap_or_else(|| {
                    // Terminal arrived without its intent entry; create one
                    // so the outcome is still observable.
                    entries.push(MethodEntry::in_flight(action.meta.params.clone()));
                    entries.len() - 1
                });
                let entry = &mut entries[i];
                entry.requesting = false;
                entry.requested = true;
                if *phase == Phase::Error {
                    entry.error = action.payload.clone();
                } else {
                    entry.result = action.payload.clone();
                    entry.error = None;
                }
            },
        }
    }
}

impl SliceReducer for MethodCacheReducer {
    fn initial(&self) -> StateSlice {
        let mut cache = MethodCacheState::default();
        for name in &self.method_names {
            cache.0.insert(name.clone(), Vec::new());
        }
        StateSlice::Methods(cache)
    }

    fn reduce(&self, slice: &mut StateSlice, action: &Action) {
        if let StateSlice::Methods(cache) = slice {
            self.reduce_cache(cache, action);
        }
    }
}

/// A user-declared reducer over an opaque `Custom` slice.
pub type CustomReducerFn = Arc<dyn Fn(&mut Value, &Action) + Send + Sync>;

/// Wraps a user reducer, optionally scoping it to one method's action types.
pub struct CustomSliceReducer {
    initial: Value,
    reduce: CustomReducerFn,
    /// When set, only these three action types are routed in.
    only_types: Option<[String; 3]>,
}

impl CustomSliceReducer {
    /// A reducer receiving every action dispatched through the model's store.
    #[must_use]
    pub fn standalone(initial: Value, reduce: CustomReducerFn) -> Self {
        Self {
            initial,
            reduce,
            only_types: None,
        }
    }

    /// A reducer replacing the default cache for exactly one method.
    #[must_use]
    pub fn for_method(model_name: &str, method_name: &str, initial: Value, reduce: CustomReducerFn) -> Self {
        let types = method_types(model_name, method_name);
        Self {
            initial,
            reduce,
            only_types: Some([types.intent, types.success, types.error]),
        }
    }
}

impl SliceReducer for CustomSliceReducer {
    fn initial(&self) -> StateSlice {
        StateSlice::Custom(self.initial.clone())
    }

    fn reduce(&self, slice: &mut StateSlice, action: &Action) {
        if let Some(types) = &self.only_types {
            if !types.contains(&action.kind) {
                return;
            }
        }
        if let StateSlice::Custom(value) = slice {
            (self.reduce)(value, action);
        }
    }
}

/// The composed reducer for one model: an ordered set of named slices.
#[derive(Clone)]
pub struct ModelReducer {
    slices: Arc<Vec<(String, Box<dyn SliceReducer>)>>,
}

impl ModelReducer {
    /// Combine named slice reducers into one model reducer.
    #[must_use]
    pub fn combine(slices: Vec<(String, Box<dyn SliceReducer>)>) -> Self {
        Self {
            slices: Arc::new(slices),
        }
    }

    /// The model state tree before any dispatch.
    #[must_use]
    pub fn initial(&self) -> ModelState {
        self.slices
            .iter()
            .map(|(name, reducer)| (name.clone(), reducer.initial()))
            .collect()
    }

    /// Apply one action to every slice.
    pub fn reduce(&self, state: &mut ModelState, action: &Action) {
        for (name, reducer) in self.slices.iter() {
            if let Some(slice) = state.get_mut(name) {
                reducer.reduce(slice, action);
            }
        }
    }
}

impl std::fmt::Debug for ModelReducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.slices.iter().map(|(n, _)| n.as_str()).collect();
        f.debug_struct("ModelReducer").field("slices", &names).finish()
    }
}

/// The store-level reducer: model name → model reducer.
///
/// This is the reducer-combination surface the host store consumes; reducers
/// are called synchronously per dispatch in registration order.
#[derive(Clone, Default)]
pub struct StoreReducer {
    models: BTreeMap<String, ModelReducer>,
}

impl StoreReducer {
    /// Combine model reducers keyed by model name.
    #[must_use]
    pub fn combine(models: BTreeMap<String, ModelReducer>) -> Self {
        Self { models }
    }

    /// The store state before any dispatch.
    #[must_use]
    pub fn initial(&self) -> StoreState {
        self.models
            .iter()
            .map(|(name, reducer)| (name.clone(), reducer.initial()))
            .collect()
    }

    /// Apply one action to every model's state tree.
    pub fn reduce(&self, state: &mut StoreState, action: &Action) {
        for (name, reducer) in &self.models {
            if let Some(model_state) = state.get_mut(name) {
                reducer.reduce(model_state, action);
            }
        }
    }
}

impl std::fmt::Debug for StoreReducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.models.keys().map(String::as_str).collect();
        f.debug_struct("StoreReducer").field("models", &names).finish()
    }
}
