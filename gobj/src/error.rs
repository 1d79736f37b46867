//! Error types for the gobj runtime
//!
//! Failures fall in four groups:
//! - parameter errors (empty or malformed names, invalid values)
//! - lookup errors (class, object, service, attribute, state, event not found)
//! - operational errors (lifecycle transitions refused by the current flags)
//! - internal errors (broken invariants)
//!
//! Every failure is logged where it is detected and then returned.

use crate::config::ConfigError;
use crate::identity::IdentityError;
use crate::persistence::PersistenceError;
use crate::types::GobjId;
use thiserror::Error;

/// Top-level runtime error
#[derive(Debug, Error)]
pub enum GobjError {
    /// Class registration errors
    #[error("gclass error: {0}")]
    Gclass(#[from] GclassError),

    /// Attribute schema and coercion errors
    #[error("sdata error: {0}")]
    Sdata(#[from] SdataError),

    /// Persistence collaborator errors
    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Identity errors
    #[error("identity error: {0}")]
    Identity(#[from] IdentityError),

    /// Invalid parameter
    #[error("parameter error: {0}")]
    Parameter(String),

    /// Class not registered
    #[error("gclass {0} not found")]
    ClassNotFound(String),

    /// Handle does not resolve to a live object
    #[error("gobj {0} not found")]
    GobjNotFound(GobjId),

    /// Service not registered
    #[error("service {0} not found")]
    ServiceNotFound(String),

    /// Attribute absent from the object and its bottom chain
    #[error("{gobj}: attribute {attr} not found")]
    AttrNotFound { gobj: String, attr: String },

    /// State unknown to the class
    #[error("{gobj}: state {state} not found")]
    StateNotFound { gobj: String, state: String },

    /// No action for the event in the current state
    #[error("{gobj}: event {event} not defined in state {state}")]
    EventNotDefined {
        gobj: String,
        event: String,
        state: String,
    },

    /// Object is being destroyed or already destroyed
    #[error("{0}: gobj destroying")]
    Destroying(String),

    /// Lifecycle transition refused
    #[error("{gobj}: {msg}")]
    Operational { gobj: String, msg: String },

    /// Required attributes without value
    #[error("{gobj}: required attributes missing: {}", attrs.join(", "))]
    RequiredAttrs { gobj: String, attrs: Vec<String> },

    /// Invariant violation
    #[error("internal error: {0}")]
    Internal(String),
}

impl GobjError {
    pub(crate) fn operational(gobj: impl Into<String>, msg: impl Into<String>) -> Self {
        GobjError::Operational {
            gobj: gobj.into(),
            msg: msg.into(),
        }
    }
}

/// Class registration errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GclassError {
    /// Empty name or name with reserved characters
    #[error("invalid gclass name: {0:?}")]
    InvalidName(String),

    /// Name already registered
    #[error("gclass {0} already registered")]
    AlreadyRegistered(String),

    /// Class still has live instances
    #[error("gclass {name} has {instances} live instances")]
    HasInstances { name: String, instances: usize },

    /// State already present
    #[error("{gclass}: state {state} already exists")]
    DuplicateState { gclass: String, state: String },

    /// State unknown
    #[error("{gclass}: state {state} not found")]
    StateNotFound { gclass: String, state: String },

    /// Event already bound in the state
    #[error("{gclass}: event {event} already bound in state {state}")]
    DuplicateEvent {
        gclass: String,
        state: String,
        event: String,
    },

    /// Action entry moves to a state the class does not declare
    #[error("{gclass}: state {state}, event {event}: next state {next_state} not found")]
    UnknownNextState {
        gclass: String,
        state: String,
        event: String,
        next_state: String,
    },

    /// Class declares no states
    #[error("{0}: gclass without states")]
    NoStates(String),
}

/// Attribute schema and coercion errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SdataError {
    /// No descriptor with that name
    #[error("attribute {0} not found")]
    UnknownAttr(String),

    /// Value could not be coerced to the declared type
    #[error("attribute {attr} must be {expected}, got {got}")]
    TypeMismatch {
        attr: String,
        expected: &'static str,
        got: String,
    },

    /// String could not be parsed to the declared structure
    #[error("attribute {attr}: cannot parse {value:?} as {expected}")]
    Unparsable {
        attr: String,
        expected: &'static str,
        value: String,
    },
}

/// Result type using GobjError
pub type Result<T> = std::result::Result<T, GobjError>;
