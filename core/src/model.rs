//! Model assembly and composition.
//!
//! A [`ModelConfig`] declares a model: its name, methods, reducer and
//! selector overrides, and mixins. [`Model::assemble`] resolves the
//! declaration into a runnable surface: derived action types, a combined
//! slice reducer, one saga per asynchronous method, and a selector table.
//! [`Models::compose`] does the same for a set of models sharing a store,
//! producing the store-level reducer and the flat saga list to spawn.

use crate::action::{Action, Completion, Params, TerminalTypes};
use crate::environment::{Clock, SystemClock};
use crate::error::{CallError, ModelError};
use crate::methods::{MethodSpec, normalize_methods};
use crate::mixin::Mixin;
use crate::reducer::{
    CustomReducerFn, CustomSliceReducer, MODEL_SLICE, MethodCacheReducer, ModelReducer, ModelState,
    SliceReducer, StoreReducer,
};
use crate::sagas::{Saga, create_sagas};
use crate::selectors::{Selector, build_selectors};
use crate::store::StoreHandle;
use crate::types::{MethodTypes, action_types, method_types};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};

/// A named reducer declared on the model itself.
enum DeclaredReducer {
    /// Replaces the default cache transitions for one method.
    ForMethod {
        method: String,
        initial: Value,
        reduce: CustomReducerFn,
    },
    /// An additional named slice fed every action.
    Slice {
        name: String,
        initial: Value,
        reduce: CustomReducerFn,
    },
}

/// Declarative description of one model.
pub struct ModelConfig {
    name: String,
    plural_name: String,
    methods: Vec<MethodSpec>,
    reducers: Vec<DeclaredReducer>,
    selectors: Vec<(String, Selector)>,
    mixins: Vec<Arc<dyn Mixin>>,
    clock: Arc<dyn Clock>,
}

impl ModelConfig {
    /// Start a model declaration. The plural name defaults to `{name}s`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let plural_name = format!("{name}s");
        Self {
            name,
            plural_name,
            methods: Vec::new(),
            reducers: Vec::new(),
            selectors: Vec::new(),
            mixins: Vec::new(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Override the plural name used for resource paths.
    #[must_use]
    pub fn plural_name(mut self, plural: impl Into<String>) -> Self {
        self.plural_name = plural.into();
        self
    }

    /// Declare an asynchronous method from a closure.
    #[must_use]
    pub fn method<F, Fut>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Params) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, crate::error::MethodError>> + Send + 'static,
    {
        self.methods.push(MethodSpec::handler(name, f));
        self
    }

    /// Declare a synchronous marker method (dispatch only, no task).
    #[must_use]
    pub fn marker(mut self, name: impl Into<String>) -> Self {
        self.methods.push(MethodSpec::marker(name));
        self
    }

    /// Declare a batch of prebuilt methods, e.g. from [`crate::api::endpoints`].
    #[must_use]
    pub fn methods(mut self, specs: Vec<MethodSpec>) -> Self {
        self.methods.extend(specs);
        self
    }

    /// Replace the default cache reducer for one method.
    ///
    /// The method's lifecycle actions are routed to `reduce` over a dedicated
    /// slice named after the method, and the shared cache ignores them. The
    /// default selector for the method keeps reading the (now inert) cache,
    /// so an override usually comes with a custom selector.
    #[must_use]
    pub fn reducer_for<F>(mut self, method: impl Into<String>, initial: Value, reduce: F) -> Self
    where
        F: Fn(&mut Value, &Action) + Send + Sync + 'static,
    {
        self.reducers.push(DeclaredReducer::ForMethod {
            method: method.into(),
            initial,
            reduce: Arc::new(reduce),
        });
        self
    }

    /// Add a named state slice fed every dispatched action.
    #[must_use]
    pub fn reducer<F>(mut self, slice: impl Into<String>, initial: Value, reduce: F) -> Self
    where
        F: Fn(&mut Value, &Action) + Send + Sync + 'static,
    {
        self.reducers.push(DeclaredReducer::Slice {
            name: slice.into(),
            initial,
            reduce: Arc::new(reduce),
        });
        self
    }

    /// Declare a custom selector. Declaring any replaces all defaults.
    #[must_use]
    pub fn selector<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&ModelState, &Params) -> Value + Send + Sync + 'static,
    {
        self.selectors.push((name.into(), Arc::new(f)));
        self
    }

    /// Include a mixin. Order matters: later mixins win selector collisions.
    #[must_use]
    pub fn mixin(mut self, mixin: Arc<dyn Mixin>) -> Self {
        self.mixins.push(mixin);
        self
    }

    /// Replace the clock stamping terminal actions.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The model's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The plural resource name, for path-based method builders.
    #[must_use]
    pub fn plural(&self) -> &str {
        &self.plural_name
    }
}

/// An assembled model bound (lazily) to a store.
pub struct Model {
    name: String,
    methods: Vec<MethodSpec>,
    types_by_method: BTreeMap<String, MethodTypes>,
    action_types: BTreeMap<String, String>,
    reducer: ModelReducer,
    sagas: Vec<Arc<Saga>>,
    selectors: BTreeMap<String, Selector>,
    store: RwLock<Option<Arc<dyn StoreHandle>>>,
}

impl Model {
    /// Resolve a declaration into a runnable model.
    #[must_use]
    pub fn assemble(config: ModelConfig) -> Arc<Self> {
        let ModelConfig {
            name,
            plural_name,
            methods: declared,
            reducers,
            selectors: custom_selectors,
            mixins,
            clock,
        } = config;

        // Mixin capability resolution needs the config shape back; rebuild a
        // view carrying only what mixins read.
        let view = ModelConfig {
            name: name.clone(),
            plural_name,
            methods: Vec::new(),
            reducers: Vec::new(),
            selectors: Vec::new(),
            mixins: Vec::new(),
            clock: Arc::clone(&clock),
        };

        let mut contributed = Vec::new();
        for mixin in &mixins {
            contributed.extend(mixin.methods(&view));
        }
        let methods = normalize_methods(&declared, contributed);
        let known: HashSet<&str> = methods.iter().map(MethodSpec::name).collect();

        let mut overridden: HashSet<String> = HashSet::new();
        for entry in &reducers {
            if let DeclaredReducer::ForMethod { method, .. } = entry {
                if known.contains(method.as_str()) {
                    overridden.insert(method.clone());
                } else {
                    tracing::warn!(
                        model = %name,
                        method = %method,
                        "reducer override names no declared method, ignoring"
                    );
                }
            }
        }

        let mut slices: Vec<(String, Box<dyn SliceReducer>)> = Vec::new();
        slices.push((
            MODEL_SLICE.to_owned(),
            Box::new(MethodCacheReducer::new(&name, &methods, &overridden)),
        ));
        for entry in reducers {
            match entry {
                DeclaredReducer::ForMethod { method, initial, reduce } => {
                    if overridden.contains(&method) {
                        slices.push((
                            method.clone(),
                            Box::new(CustomSliceReducer::for_method(&name, &method, initial, reduce)),
                        ));
                    }
                },
                DeclaredReducer::Slice { name: slice, initial, reduce } => {
                    slices.push((slice, Box::new(CustomSliceReducer::standalone(initial, reduce))));
                },
            }
        }
        for mixin in &mixins {
            if let Some(reducer) = mixin.reducer(&view) {
                slices.push((mixin.name().to_owned(), reducer));
            }
        }
        let reducer = ModelReducer::combine(slices);

        let mut mixin_selectors = Vec::new();
        for mixin in &mixins {
            mixin_selectors.extend(mixin.selectors(&view));
        }
        let selectors = build_selectors(&methods, &custom_selectors, mixin_selectors);

        let mut types = action_types(&name, methods.iter().map(MethodSpec::name));
        for mixin in &mixins {
            types.extend(mixin.action_types(&view));
        }

        let types_by_method = methods
            .iter()
            .map(|method| (method.name().to_owned(), method_types(&name, method.name())))
            .collect();

        let sagas = create_sagas(&name, &methods, &clock);

        Arc::new(Self {
            name,
            methods,
            types_by_method,
            action_types: types,
            reducer,
            sagas,
            selectors,
            store: RwLock::new(None),
        })
    }

    /// The model's name, also its key in the store state.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The derived action-type constants, `NAME` / `NAME_SUCCESS` /
    /// `NAME_ERROR` per method, plus mixin contributions.
    #[must_use]
    pub fn action_types(&self) -> &BTreeMap<String, String> {
        &self.action_types
    }

    /// The combined reducer over this model's state tree.
    #[must_use]
    pub fn reducer(&self) -> ModelReducer {
        self.reducer.clone()
    }

    /// Sagas to spawn against the bound store, one per async method.
    #[must_use]
    pub fn sagas(&self) -> &[Arc<Saga>] {
        &self.sagas
    }

    /// Bind the model to its host store. Idempotent; last binding wins.
    pub fn set_store(&self, store: Arc<dyn StoreHandle>) {
        let mut slot = self.store.write().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(store);
    }

    fn bound_store(&self) -> Option<Arc<dyn StoreHandle>> {
        self.store
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn method(&self, name: &str) -> Option<&MethodSpec> {
        self.methods.iter().find(|m| m.name() == name)
    }

    /// Invoke a method by name.
    ///
    /// For an asynchronous method this dispatches the intent and resolves
    /// when its saga settles the call: `Ok` with the success payload, or
    /// [`CallError::Rejected`] with the rejection reason that was also
    /// recorded in the cache. A marker method dispatches synchronously and
    /// resolves immediately with `Null`.
    ///
    /// # Errors
    ///
    /// [`CallError::StoreNotBound`] before [`Model::set_store`];
    /// [`CallError::UnknownMethod`] for names outside the model's vocabulary;
    /// [`CallError::TaskTerminated`] when the saga faulted before settling.
    pub async fn call(&self, method: &str, params: Params) -> Result<Value, CallError> {
        let store = self.bound_store().ok_or(CallError::StoreNotBound)?;
        let spec = self
            .method(method)
            .ok_or_else(|| CallError::UnknownMethod(method.to_owned()))?;
        let types = self
            .types_by_method
            .get(method)
            .ok_or_else(|| CallError::UnknownMethod(method.to_owned()))?;

        if !spec.is_async() {
            store.dispatch(Action::plain(types.intent.clone(), params));
            return Ok(Value::Null);
        }

        let (completion, settled) = Completion::channel();
        store.dispatch(Action::intent(
            types.intent.clone(),
            params,
            TerminalTypes {
                success: types.success.clone(),
                error: types.error.clone(),
            },
            completion,
        ));

        match settled.await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(reason)) => Err(CallError::Rejected(reason)),
            Err(_closed) => Err(CallError::TaskTerminated),
        }
    }

    /// Read a view of this model's state through a named selector.
    ///
    /// # Errors
    ///
    /// [`ModelError::StoreNotBound`] before binding,
    /// [`ModelError::UnknownSelector`] for unregistered names, and
    /// [`ModelError::MissingState`] when the store's reducer does not carry
    /// this model.
    pub fn select(&self, selector: &str, params: &Params) -> Result<Value, ModelError> {
        let store = self.bound_store().ok_or(ModelError::StoreNotBound)?;
        let selector = self
            .selectors
            .get(selector)
            .ok_or_else(|| ModelError::UnknownSelector(selector.to_owned()))?;

        let state = store.state();
        let model_state = state
            .get(&self.name)
            .ok_or_else(|| ModelError::MissingState(self.name.clone()))?;

        Ok(selector(model_state, params))
    }
}

/// A set of models composed over one store.
pub struct Models {
    models: BTreeMap<String, Arc<Model>>,
    reducer: StoreReducer,
}

impl Models {
    /// Compose models from their declarations.
    ///
    /// `shared` mixins are prepended to every model's own mixin list, so a
    /// model's explicitly declared mixins (and its own methods) take
    /// precedence over shared contributions.
    #[must_use]
    pub fn compose(configs: Vec<ModelConfig>, shared: &[Arc<dyn Mixin>]) -> Self {
        let mut models = BTreeMap::new();
        let mut reducers = BTreeMap::new();

        for mut config in configs {
            let mut mixins: Vec<Arc<dyn Mixin>> = shared.to_vec();
            mixins.append(&mut config.mixins);
            config.mixins = mixins;

            let model = Model::assemble(config);
            reducers.insert(model.name().to_owned(), model.reducer());
            models.insert(model.name().to_owned(), model);
        }

        Self {
            models,
            reducer: StoreReducer::combine(reducers),
        }
    }

    /// Look up one composed model.
    #[must_use]
    pub fn model(&self, name: &str) -> Option<&Arc<Model>> {
        self.models.get(name)
    }

    /// The store-level reducer covering every composed model.
    #[must_use]
    pub fn reducer(&self) -> StoreReducer {
        self.reducer.clone()
    }

    /// Every saga across all models, flattened for spawning.
    #[must_use]
    pub fn sagas(&self) -> Vec<Arc<Saga>> {
        self.models
            .values()
            .flat_map(|model| model.sagas().iter().cloned())
            .collect()
    }

    /// Bind every composed model to the store.
    pub fn set_store(&self, store: &Arc<dyn StoreHandle>) {
        for model in self.models.values() {
            model.set_store(Arc::clone(store));
        }
    }
}
