//! The task factory: one background saga per asynchronous method.
//!
//! A saga subscribes to its method's intent type and, for every occurrence,
//! invokes the underlying method and emits exactly one terminal action,
//! settling the intent's completion handle exactly once. Intents fan out:
//! each occurrence runs in its own spawned invocation, so concurrent calls
//! never queue behind each other and no de-duplication happens here (callers
//! wanting coalescing check `requesting` through a selector first).

use crate::action::Action;
use crate::environment::Clock;
use crate::error::MethodError;
use crate::methods::{MethodFn, MethodSpec};
use crate::store::StoreHandle;
use crate::types::method_types;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinSet;

/// A background task translating one method's intents into terminal actions.
pub struct Saga {
    model_name: String,
    method_name: String,
    intent_type: String,
    method: MethodFn,
    clock: Arc<dyn Clock>,
}

impl Saga {
    /// The intent type this saga watches.
    #[must_use]
    pub fn intent_type(&self) -> &str {
        &self.intent_type
    }

    /// The method this saga executes.
    #[must_use]
    pub fn method_name(&self) -> &str {
        &self.method_name
    }

    /// Watch the store for intents until the store closes or a fault occurs.
    ///
    /// `rx` must be subscribed before the first intent is dispatched, which
    /// is why the runner obtains it synchronously rather than in here. Each
    /// matching action is handled in its own spawned invocation. A
    /// [`MethodError::Fault`] from any invocation is a programming error and
    /// terminates the watcher; domain rejections are converted into error
    /// actions and never do.
    pub async fn run(
        self: Arc<Self>,
        store: Arc<dyn StoreHandle>,
        mut rx: broadcast::Receiver<Action>,
    ) {
        let mut invocations: JoinSet<Result<(), MethodError>> = JoinSet::new();

        loop {
            tokio::select! {
                received = rx.recv() => match received {
                    Ok(action) if action.kind == self.intent_type => {
                        let saga = Arc::clone(&self);
                        let store = Arc::clone(&store);
                        invocations.spawn(async move { saga.handle(&*store, action).await });
                    },
                    Ok(_) => {},
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(
                            model = %self.model_name,
                            method = %self.method_name,
                            skipped,
                            "saga subscription lagged, intents were dropped"
                        );
                    },
                    Err(RecvError::Closed) => break,
                },
                Some(finished) = invocations.join_next() => {
                    match finished {
                        Ok(Ok(())) => {},
                        Ok(Err(error)) => {
                            tracing::error!(
                                model = %self.model_name,
                                method = %self.method_name,
                                %error,
                                "saga terminating on fault"
                            );
                            break;
                        },
                        Err(join_error) => {
                            tracing::error!(
                                model = %self.model_name,
                                method = %self.method_name,
                                %join_error,
                                "saga invocation panicked, terminating watcher"
                            );
                            break;
                        },
                    }
                },
            }
        }
    }

    /// Handle one intent occurrence: invoke, dispatch terminal, settle.
    async fn handle(&self, store: &dyn StoreHandle, action: Action) -> Result<(), MethodError> {
        let Some(types) = action.meta.types.clone() else {
            tracing::warn!(
                model = %self.model_name,
                method = %self.method_name,
                "intent action missing terminal types, ignoring"
            );
            return Ok(());
        };
        let params = action.meta.params.clone();
        let completion = action.meta.completion.clone();

        tracing::debug!(
            model = %self.model_name,
            method = %self.method_name,
            "saga handling intent"
        );

        match (self.method)(params.clone()).await {
            Ok(result) => {
                store.dispatch(Action::success(
                    types.success,
                    result.clone(),
                    params,
                    self.clock.now(),
                ));
                if let Some(completion) = completion {
                    completion.resolve(result);
                }
                Ok(())
            },
            Err(MethodError::Rejected(reason)) => {
                store.dispatch(Action::failure(
                    types.error,
                    reason.clone(),
                    params,
                    self.clock.now(),
                ));
                if let Some(completion) = completion {
                    completion.reject(reason);
                }
                Ok(())
            },
            Err(fault @ MethodError::Fault(_)) => {
                // No terminal action and no settlement: the caller observes a
                // closed channel, distinguishing faults from domain errors.
                if let Some(completion) = completion {
                    completion.abandon();
                }
                Err(fault)
            },
        }
    }
}

/// Build one saga per asynchronous method of a model.
#[must_use]
pub fn create_sagas(
    model_name: &str,
    methods: &[MethodSpec],
    clock: &Arc<dyn Clock>,
) -> Vec<Arc<Saga>> {
    methods
        .iter()
        .filter_map(|method| {
            let handler = method.handler_fn()?;
            Some(Arc::new(Saga {
                model_name: model_name.to_owned(),
                method_name: method.name().to_owned(),
                intent_type: method_types(model_name, method.name()).intent,
                method: Arc::clone(handler),
                clock: Arc::clone(clock),
            }))
        })
        .collect()
}
