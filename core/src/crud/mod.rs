//! CRUD mixin: five conventional remote methods backed by a normalized cache.
//!
//! Including this mixin gives a model `create`, `update_by_id`,
//! `delete_by_id`, `find`, and `find_by_id` methods wired to a REST-shaped
//! transport, a state slice holding entities by id plus per-query
//! collections, and `find`/`find_by_id` selectors over that slice. Mutations
//! invalidate every cached collection, so list consumers can detect
//! staleness without re-fetching eagerly.

pub mod reducer;
pub mod selectors;

use crate::api::{Endpoint, Fetch, Verb, endpoints};
use crate::methods::MethodSpec;
use crate::mixin::Mixin;
use crate::model::ModelConfig;
use crate::reducer::SliceReducer;
use crate::selectors::Selector;
use crate::types::{MethodTypes, action_types, method_types};
use std::collections::BTreeMap;
use std::sync::Arc;

pub use reducer::{Collection, CrudReducer, CrudState, RecordEntry};
pub use selectors::{find_by_id_selector, find_selector};

/// Name of the mixin and of its state slice within a model's state.
pub const MIXIN_NAME: &str = "crud";

/// The five method names the mixin contributes, in route order.
pub const METHOD_NAMES: [&str; 5] = ["create", "update_by_id", "delete_by_id", "find", "find_by_id"];

/// Derived action types for one model's CRUD methods.
#[derive(Debug, Clone)]
pub struct CrudTypes {
    /// Types of the `create` lifecycle.
    pub create: MethodTypes,
    /// Types of the `update_by_id` lifecycle.
    pub update_by_id: MethodTypes,
    /// Types of the `delete_by_id` lifecycle.
    pub delete_by_id: MethodTypes,
    /// Types of the `find` lifecycle.
    pub find: MethodTypes,
    /// Types of the `find_by_id` lifecycle.
    pub find_by_id: MethodTypes,
}

impl CrudTypes {
    /// Derive the full CRUD type set for a model name.
    #[must_use]
    pub fn for_model(model_name: &str) -> Self {
        Self {
            create: method_types(model_name, "create"),
            update_by_id: method_types(model_name, "update_by_id"),
            delete_by_id: method_types(model_name, "delete_by_id"),
            find: method_types(model_name, "find"),
            find_by_id: method_types(model_name, "find_by_id"),
        }
    }
}

/// The CRUD mixin. Holds the transport used by the contributed methods.
pub struct CrudMixin {
    fetch: Arc<dyn Fetch>,
}

/// Build a CRUD mixin over the given transport.
#[must_use]
pub fn crud(fetch: Arc<dyn Fetch>) -> Arc<dyn Mixin> {
    Arc::new(CrudMixin { fetch })
}

impl CrudMixin {
    fn declared_endpoints() -> Vec<Endpoint> {
        vec![
            Endpoint::new("create", Verb::Post, "/"),
            Endpoint::new("update_by_id", Verb::Put, "/:id"),
            Endpoint::new("delete_by_id", Verb::Delete, "/:id"),
            Endpoint::new("find", Verb::Get, "/"),
            Endpoint::new("find_by_id", Verb::Get, "/:id"),
        ]
    }
}

impl Mixin for CrudMixin {
    fn name(&self) -> &str {
        MIXIN_NAME
    }

    fn methods(&self, model: &ModelConfig) -> Vec<MethodSpec> {
        let base = format!("/{}", model.plural());
        endpoints(Arc::clone(&self.fetch), base, Self::declared_endpoints())
    }

    fn reducer(&self, model: &ModelConfig) -> Option<Box<dyn SliceReducer>> {
        Some(Box::new(CrudReducer::new(CrudTypes::for_model(model.name()))))
    }

    fn selectors(&self, _model: &ModelConfig) -> Vec<(String, Selector)> {
        selectors::crud_selectors()
    }

    fn action_types(&self, model: &ModelConfig) -> BTreeMap<String, String> {
        action_types(model.name(), METHOD_NAMES.iter().copied())
    }
}
