//! The mixin capability interface.

use crate::methods::MethodSpec;
use crate::model::ModelConfig;
use crate::reducer::SliceReducer;
use crate::selectors::Selector;
use std::collections::BTreeMap;

/// A reusable bundle of behavior injected into every model that includes it.
///
/// Each capability is optional and defaults to contributing nothing; a mixin
/// implements only the ones it carries. All contributions are resolved at
/// model-assembly time against the model's configuration (name, base path).
pub trait Mixin: Send + Sync {
    /// The mixin's name, also the name of its state slice.
    fn name(&self) -> &str;

    /// Methods this mixin contributes. Model-declared names shadow these.
    fn methods(&self, model: &ModelConfig) -> Vec<MethodSpec> {
        let _ = model;
        Vec::new()
    }

    /// A reducer owning the mixin's state slice.
    fn reducer(&self, model: &ModelConfig) -> Option<Box<dyn SliceReducer>> {
        let _ = model;
        None
    }

    /// Selectors layered on top of the model's own; later mixins win.
    fn selectors(&self, model: &ModelConfig) -> Vec<(String, Selector)> {
        let _ = model;
        Vec::new()
    }

    /// Action-type constants this mixin contributes to the model's tree.
    fn action_types(&self, model: &ModelConfig) -> BTreeMap<String, String> {
        let _ = model;
        BTreeMap::new()
    }
}
