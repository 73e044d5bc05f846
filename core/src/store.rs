//! The store boundary the model layer dispatches through.

use crate::action::Action;
use crate::reducer::StoreState;
use tokio::sync::broadcast;

/// Handle to the host store.
///
/// The contract the model layer relies on: `dispatch` applies the action to
/// every registered reducer synchronously before returning, `state` reflects
/// every completed dispatch, and `subscribe` delivers every subsequently
/// dispatched action to the receiver at least once.
pub trait StoreHandle: Send + Sync {
    /// Dispatch an action; reducers run before this returns.
    fn dispatch(&self, action: Action);

    /// Snapshot of the current store state.
    fn state(&self) -> StoreState;

    /// Subscribe to every action dispatched after this call.
    fn subscribe(&self) -> broadcast::Receiver<Action>;
}
