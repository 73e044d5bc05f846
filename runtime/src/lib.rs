//! # Saga Models Runtime
//!
//! The store runtime hosting composed models: it owns the state tree, runs
//! the composed reducer synchronously on every dispatch, broadcasts each
//! dispatched action to subscribed sagas, and spawns the saga watchers.
//!
//! ## Dispatch ordering
//!
//! `dispatch` applies the action to the reducer under a write lock before
//! broadcasting, so any subscriber reacting to an action always observes a
//! state that already includes it. Sagas therefore see the in-flight cache
//! entry for an intent before they start executing the method.
//!
//! ## Example
//!
//! ```ignore
//! use saga_models_core::{ModelConfig, Models};
//! use saga_models_runtime::Store;
//!
//! let models = Models::compose(vec![config], &[]);
//! let store = Store::new(models.reducer());
//! let _watchers = saga_models_runtime::bind(&models, &store);
//!
//! let session = models.model("session").unwrap();
//! let token = session.call("login", serde_json::json!({"email": "a@x.com"})).await?;
//! ```

use saga_models_core::action::Action;
use saga_models_core::model::Models;
use saga_models_core::reducer::{StoreReducer, StoreState};
use saga_models_core::sagas::Saga;
use saga_models_core::store::StoreHandle;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Default action broadcast capacity.
///
/// Sagas lag (and drop intents, with a warning) when more than this many
/// actions are dispatched between two polls of a subscriber; increase with
/// [`Store::with_broadcast_capacity`] for bursty workloads.
pub const DEFAULT_BROADCAST_CAPACITY: usize = 64;

/// The store: a state tree, its composed reducer, and an action broadcast.
pub struct Store {
    state: RwLock<StoreState>,
    reducer: StoreReducer,
    action_tx: broadcast::Sender<Action>,
}

impl Store {
    /// Create a store whose initial state is the reducer's.
    #[must_use]
    pub fn new(reducer: StoreReducer) -> Arc<Self> {
        Self::with_broadcast_capacity(reducer, DEFAULT_BROADCAST_CAPACITY)
    }

    /// Create a store with a custom action broadcast capacity.
    #[must_use]
    pub fn with_broadcast_capacity(reducer: StoreReducer, capacity: usize) -> Arc<Self> {
        let (action_tx, _) = broadcast::channel(capacity);
        Arc::new(Self {
            state: RwLock::new(reducer.initial()),
            reducer,
            action_tx,
        })
    }

    /// Read through the current state without cloning the whole tree.
    pub fn with_state<T>(&self, read: impl FnOnce(&StoreState) -> T) -> T {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        read(&state)
    }
}

impl StoreHandle for Store {
    fn dispatch(&self, action: Action) {
        let started = Instant::now();
        {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            self.reducer.reduce(&mut state, &action);
        }

        tracing::debug!(kind = %action.kind, error = action.error, "action dispatched");
        metrics::counter!("store.actions.dispatched").increment(1);
        metrics::histogram!("store.reduce.duration_seconds").record(started.elapsed().as_secs_f64());

        // No receivers is fine: dispatching is valid before any saga runs.
        let _ = self.action_tx.send(action);
    }

    fn state(&self) -> StoreState {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn subscribe(&self) -> broadcast::Receiver<Action> {
        self.action_tx.subscribe()
    }
}

/// Spawn every saga against the store, returning their watcher handles.
///
/// Each saga subscribes before this returns, so intents dispatched after
/// `run_sagas` are never missed; the watchers run until the store is dropped
/// or a saga faults.
pub fn run_sagas(store: &Arc<Store>, sagas: Vec<Arc<Saga>>) -> Vec<JoinHandle<()>> {
    sagas
        .into_iter()
        .map(|saga| {
            let rx = store.action_tx.subscribe();
            let store: Arc<dyn StoreHandle> = Arc::clone(store) as Arc<dyn StoreHandle>;
            tokio::spawn(saga.run(store, rx))
        })
        .collect()
}

/// Bind composed models to a store and spawn their sagas.
pub fn bind(models: &Models, store: &Arc<Store>) -> Vec<JoinHandle<()>> {
    let handle: Arc<dyn StoreHandle> = Arc::clone(store) as Arc<dyn StoreHandle>;
    models.set_store(&handle);
    run_sagas(store, models.sagas())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use saga_models_core::action::{Completion, TerminalTypes};
    use saga_models_core::model::ModelConfig;
    use saga_models_core::reducer::{MODEL_SLICE, StateSlice};
    use serde_json::json;

    fn store_for(config: ModelConfig) -> (Models, Arc<Store>) {
        let models = Models::compose(vec![config], &[]);
        let store = Store::new(models.reducer());
        (models, store)
    }

    #[test]
    fn dispatch_is_visible_before_returning() {
        let config = ModelConfig::new("session").method("login", |_p| async { Ok(json!(null)) });
        let (_models, store) = store_for(config);

        let (completion, _rx) = Completion::channel();
        store.dispatch(Action::intent(
            "@@saga-models/SESSION/LOGIN",
            json!({"email": "a@x.com"}),
            TerminalTypes {
                success: "@@saga-models/SESSION/LOGIN_SUCCESS".into(),
                error: "@@saga-models/SESSION/LOGIN_ERROR".into(),
            },
            completion,
        ));

        store.with_state(|state| {
            let slice = state["session"].get(MODEL_SLICE).unwrap();
            match slice {
                StateSlice::Methods(cache) => {
                    let entry = cache.entry("login", &json!({"email": "a@x.com"})).unwrap();
                    assert!(entry.requesting);
                    assert!(!entry.requested);
                },
                other => panic!("unexpected slice: {other:?}"),
            }
        });
    }

    #[tokio::test]
    async fn subscribers_receive_dispatched_actions() {
        let config = ModelConfig::new("session").marker("logout");
        let (_models, store) = store_for(config);

        let mut rx = store.subscribe();
        store.dispatch(Action::plain("@@saga-models/SESSION/LOGOUT", json!({})));

        let received = rx.recv().await.unwrap();
        assert_eq!(received.kind, "@@saga-models/SESSION/LOGOUT");
    }

    #[test]
    fn initial_state_covers_every_model() {
        let configs = vec![
            ModelConfig::new("session").marker("logout"),
            ModelConfig::new("user").method("find", |_p| async { Ok(json!([])) }),
        ];
        let models = Models::compose(configs, &[]);
        let store = Store::new(models.reducer());

        store.with_state(|state| {
            assert!(state.contains_key("session"));
            assert!(state.contains_key("user"));
        });
    }
}
