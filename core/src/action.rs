//! Dispatched actions and the one-shot completion handle.
//!
//! An intent action carries the caller's `params`, the terminal types the
//! saga should emit, and a [`Completion`] handle that settles the caller's
//! pending call exactly once. Terminal actions carry the payload plus the
//! originating `params` so reducers can locate the matching cache entry.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

/// Opaque caller-supplied argument value.
///
/// Used both to invoke a method and as its cache key; cache lookups compare
/// params by structural equality.
pub type Params = Value;

/// The terminal types a saga dispatches for one intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalTypes {
    /// Type of the success action.
    pub success: String,
    /// Type of the error action.
    pub error: String,
}

/// One-shot result channel bridging a dispatched intent back to its caller.
///
/// The handle is clonable (actions are broadcast to every subscriber), but
/// settlement consumes the inner sender, so at most one `resolve` or `reject`
/// ever lands regardless of how many clones observe the action.
#[derive(Clone, Default)]
pub struct Completion {
    sender: Arc<Mutex<Option<oneshot::Sender<Result<Value, Value>>>>>,
}

impl Completion {
    /// Create a completion handle and the receiver the caller awaits.
    #[must_use]
    pub fn channel() -> (Self, oneshot::Receiver<Result<Value, Value>>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                sender: Arc::new(Mutex::new(Some(tx))),
            },
            rx,
        )
    }

    /// Settle the pending call with a result. Returns false if already settled.
    pub fn resolve(&self, result: Value) -> bool {
        self.settle(Ok(result))
    }

    /// Settle the pending call with a rejection. Returns false if already settled.
    pub fn reject(&self, reason: Value) -> bool {
        self.settle(Err(reason))
    }

    /// Drop the pending call without settling it.
    ///
    /// Closes the caller's receiver across every clone of this handle,
    /// including ones still buffered in action channels. The caller observes
    /// the closed channel, which is how faults stay distinguishable from
    /// domain rejections.
    pub fn abandon(&self) {
        drop(
            self.sender
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .take(),
        );
    }

    fn settle(&self, outcome: Result<Value, Value>) -> bool {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        match sender {
            Some(tx) => {
                // A dropped receiver means the caller went away; the terminal
                // action still reached the reducer, so this is not an error.
                let _ = tx.send(outcome);
                true
            },
            None => false,
        }
    }
}

impl std::fmt::Debug for Completion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let settled = self
            .sender
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .is_none();
        f.debug_struct("Completion").field("settled", &settled).finish()
    }
}

/// Metadata attached to every dispatched action.
#[derive(Debug, Clone, Default)]
pub struct Meta {
    /// The caller's argument value, also the cache key.
    pub params: Params,
    /// Terminal types for this intent; absent on terminal and plain actions.
    pub types: Option<TerminalTypes>,
    /// Completion handle for this intent; absent on terminal and plain actions.
    pub completion: Option<Completion>,
    /// When the underlying fetch settled; stamped on terminal actions only.
    pub fetch_time: Option<DateTime<Utc>>,
}

/// An action flowing through the store.
#[derive(Debug, Clone)]
pub struct Action {
    /// The derived action-type string.
    pub kind: String,
    /// Result or rejection payload; absent on intents.
    pub payload: Option<Value>,
    /// Marks the payload as a failure; absence means success.
    pub error: bool,
    /// Intent/terminal metadata.
    pub meta: Meta,
}

impl Action {
    /// Build an intent action for an asynchronous method call.
    #[must_use]
    pub fn intent(
        kind: impl Into<String>,
        params: Params,
        types: TerminalTypes,
        completion: Completion,
    ) -> Self {
        Self {
            kind: kind.into(),
            payload: None,
            error: false,
            meta: Meta {
                params,
                types: Some(types),
                completion: Some(completion),
                fetch_time: None,
            },
        }
    }

    /// Build a success terminal action.
    #[must_use]
    pub fn success(
        kind: impl Into<String>,
        payload: Value,
        params: Params,
        fetch_time: DateTime<Utc>,
    ) -> Self {
        Self {
            kind: kind.into(),
            payload: Some(payload),
            error: false,
            meta: Meta {
                params,
                types: None,
                completion: None,
                fetch_time: Some(fetch_time),
            },
        }
    }

    /// Build an error terminal action.
    #[must_use]
    pub fn failure(
        kind: impl Into<String>,
        reason: Value,
        params: Params,
        fetch_time: DateTime<Utc>,
    ) -> Self {
        Self {
            kind: kind.into(),
            payload: Some(reason),
            error: true,
            meta: Meta {
                params,
                types: None,
                completion: None,
                fetch_time: Some(fetch_time),
            },
        }
    }

    /// Build a plain action for a marker method (no saga involved).
    #[must_use]
    pub fn plain(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            payload: Some(payload.clone()),
            error: false,
            meta: Meta {
                params: payload,
                types: None,
                completion: None,
                fetch_time: None,
            },
        }
    }
}
