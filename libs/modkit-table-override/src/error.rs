use std::time::Duration;

/// Errors raised while entering an override scope or building a query
/// against an overridden model.
#[derive(thiserror::Error, Debug)]
pub enum OverrideError {
    /// The same scope instance was entered again before its guard was dropped.
    #[error("override scope for '{model}' is already entered")]
    AlreadyEntered { model: String },

    /// A concrete (already mapped) model was handed to `ReplaceTable`.
    #[error("model '{model}' is concrete; only abstract models can be derived")]
    ConcreteModel { model: String },

    /// An abstract model cannot be queried directly.
    #[error("model '{model}' is abstract and not mapped to a table")]
    AbstractModel { model: String },

    /// A scope was constructed without any (model, table) pair.
    #[error("override scope needs at least one model")]
    EmptyScope,

    /// The override table name is syntactically unusable.
    #[error("invalid table name for '{model}': {reason}")]
    InvalidTableName { model: String, reason: &'static str },

    /// The per-model lock could not be taken within the configured timeout.
    #[error("timed out after {waited:?} waiting for the table lock of '{model}'")]
    LockTimeout { model: String, waited: Duration },

    /// The calling thread's table slot is already destroyed (thread teardown).
    #[error("thread-local table slot for '{model}' is no longer available")]
    SlotUnavailable { model: String },

    /// A query filter names a field the model does not declare.
    #[error("model '{model}' has no field '{field}'")]
    UnknownField { model: String, field: String },

    #[error("invalid table override configuration: {0}")]
    Config(#[from] Box<figment::Error>),
}

impl From<figment::Error> for OverrideError {
    fn from(err: figment::Error) -> Self {
        Self::Config(Box::new(err))
    }
}
