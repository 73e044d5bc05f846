//! Error types for the model layer.

use serde_json::Value;
use thiserror::Error;

/// Failure of an underlying asynchronous method.
///
/// The task layer only converts [`MethodError::Rejected`] into an error
/// action; a [`MethodError::Fault`] is a programming error and terminates the
/// watching task instead of being recorded as domain data.
#[derive(Debug, Clone, Error)]
pub enum MethodError {
    /// Domain rejection: the remote operation answered with an error value.
    #[error("method rejected: {0}")]
    Rejected(Value),

    /// Unexpected fault that must not be swallowed as a domain error.
    #[error("method fault: {0}")]
    Fault(String),
}

impl MethodError {
    /// Convenience constructor for a domain rejection.
    #[must_use]
    pub fn rejected(reason: impl Into<Value>) -> Self {
        Self::Rejected(reason.into())
    }

    /// Convenience constructor for a programming fault.
    #[must_use]
    pub fn fault(message: impl Into<String>) -> Self {
        Self::Fault(message.into())
    }
}

/// Errors surfaced to a caller invoking a model method.
#[derive(Debug, Error)]
pub enum CallError {
    /// `set_store` has not been invoked yet; dispatching is a precondition
    /// violation, not a recoverable runtime state.
    #[error("model is not bound to a store")]
    StoreNotBound,

    /// The method name is not part of this model's vocabulary.
    #[error("unknown method `{0}`")]
    UnknownMethod(String),

    /// The method rejected; the reason is also cached as the entry's `error`.
    #[error("call rejected: {0}")]
    Rejected(Value),

    /// The watching task terminated (fault) before settling the call.
    #[error("method task terminated before settling the call")]
    TaskTerminated,
}

/// Errors surfaced when reading model state through selectors.
#[derive(Debug, Error)]
pub enum ModelError {
    /// `set_store` has not been invoked yet.
    #[error("model is not bound to a store")]
    StoreNotBound,

    /// No selector registered under this name.
    #[error("unknown selector `{0}`")]
    UnknownSelector(String),

    /// The bound store holds no state slice for this model.
    #[error("no state registered for model `{0}`")]
    MissingState(String),
}
