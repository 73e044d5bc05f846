//! Convention layer for saga-driven stores.
//!
//! Declaring a model with a name and a set of asynchronous methods yields,
//! by convention rather than by hand: deterministic action types for each
//! method's request lifecycle, a reducer caching results per params, a
//! background saga per method that emits exactly one terminal action and
//! settles the caller's future, and default selectors over the cache. The
//! CRUD mixin layers a normalized by-id entity cache with query collections
//! and staleness invalidation on top.
//!
//! # Quick start
//!
//! ```ignore
//! let config = ModelConfig::new("session")
//!     .method("login", |params| async move { /* ... */ Ok(params) })
//!     .marker("logout");
//! let models = Models::compose(vec![config], &[]);
//! // Hand `models.reducer()` and `models.sagas()` to a store runtime,
//! // then bind with `models.set_store(..)` and call:
//! // model.call("login", json!({"email": "..."}) ).await?;
//! ```

pub mod action;
pub mod api;
pub mod crud;
pub mod environment;
pub mod error;
pub mod methods;
pub mod mixin;
pub mod model;
pub mod reducer;
pub mod sagas;
pub mod selectors;
pub mod store;
pub mod types;

pub use action::{Action, Completion, Meta, Params, TerminalTypes};
pub use api::{Endpoint, Fetch, FetchRequest, Verb, endpoints};
pub use crud::{CrudState, crud};
pub use environment::{Clock, SystemClock};
pub use error::{CallError, MethodError, ModelError};
pub use methods::{MethodFn, MethodFuture, MethodSpec};
pub use mixin::Mixin;
pub use model::{Model, ModelConfig, Models};
pub use reducer::{
    MODEL_SLICE, MethodCacheState, MethodEntry, ModelReducer, ModelState, SliceReducer, StateSlice,
    StoreReducer, StoreState,
};
pub use sagas::Saga;
pub use selectors::Selector;
pub use store::StoreHandle;
pub use types::{MethodTypes, TYPE_PREFIX, action_types, method_types, upper_snake};
