//! Error types for Tether.
//!
//! The hierarchy follows the failure taxonomy of the runtime:
//!
//! - [`RegistryError`] - wiring mistakes (duplicate or empty registrations,
//!   unregistered handlers). These are programmer errors; the non-`try_`
//!   entry points panic with them.
//! - [`BindError`] - untrusted input rejected by the binder. Validation
//!   variants reject the whole request, [`BindError::Field`] reports the
//!   first per-field coercion failure.
//! - [`FieldError`] - a single field could not be resolved or coerced.
//! - [`ActionError`] - a handler failed or panicked.
//! - [`HubError`] - a transport-level failure on one connection.
//! - [`TetherError`] - top-level error wrapping all of the above.

use thiserror::Error;

/// A boxed error type for dynamic error handling.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Top-level error type for all Tether operations.
#[derive(Error, Debug)]
pub enum TetherError {
    /// A registration or resolution error.
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// The request body was rejected or could not be bound.
    #[error("bind error: {0}")]
    Bind(#[from] BindError),

    /// A handler failed.
    #[error("action error: {0}")]
    Action(#[from] ActionError),

    /// A connection-level failure.
    #[error("hub error: {0}")]
    Hub(#[from] HubError),

    /// A custom error occurred.
    #[error(transparent)]
    Custom(BoxError),
}

/// Errors raised while registering or resolving handlers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The path was empty after normalisation.
    #[error("handler path is empty")]
    EmptyPath,

    /// The handler identity was empty.
    #[error("handler identity is empty")]
    EmptyIdentity,

    /// A closure was registered without an explicit identity.
    #[error("anonymous handler `{0}` needs an explicit name")]
    AnonymousHandler(String),

    /// The path is already claimed by another handler.
    #[error("path `{path}` is already registered to `{owner}`")]
    PathTaken {
        /// The contested path.
        path: String,
        /// Identity of the handler currently owning the path.
        owner: String,
    },

    /// A chain must end with a handler.
    #[error("handler chain for `{0}` is empty")]
    EmptyChain(String),

    /// No handler with this identity was registered.
    #[error("handler `{0}` is not registered")]
    NotRegistered(String),
}

/// Errors produced by the input binder.
#[derive(Error, Debug)]
pub enum BindError {
    /// The body exceeded the configured size.
    #[error("request body of {size} bytes exceeds the {limit} byte limit")]
    BodyTooLarge {
        /// Actual size in bytes.
        size: usize,
        /// Configured ceiling.
        limit: usize,
    },

    /// More fields than allowed.
    #[error("{count} fields exceed the limit of {limit}")]
    TooManyFields {
        /// Number of fields received.
        count: usize,
        /// Configured ceiling.
        limit: usize,
    },

    /// A field had an empty name.
    #[error("field name is empty")]
    EmptyFieldName,

    /// A field name exceeded the configured length.
    #[error("field name of {len} bytes exceeds the {limit} byte limit")]
    FieldNameTooLong {
        /// Name length in bytes.
        len: usize,
        /// Configured ceiling.
        limit: usize,
    },

    /// A field name contained a character outside `[A-Za-z0-9._\[\]]`.
    #[error("field name `{0}` contains invalid characters")]
    InvalidFieldName(String),

    /// A field value exceeded the ceiling for its type category.
    #[error("value of field `{name}` is {len} bytes, limit is {limit}")]
    ValueTooLong {
        /// Field name.
        name: String,
        /// Value length in bytes.
        len: usize,
        /// Ceiling for the declared type category.
        limit: usize,
    },

    /// The body could not be decoded at all.
    #[error("malformed request body: {0}")]
    Malformed(String),

    /// A single field failed to bind. Other fields were still applied.
    #[error("field `{name}`: {source}")]
    Field {
        /// Wire name of the failing field.
        name: String,
        /// Underlying cause.
        #[source]
        source: FieldError,
    },
}

impl BindError {
    /// Whether this error rejected the request before any field was applied.
    pub fn is_validation(&self) -> bool {
        !matches!(self, BindError::Field { .. })
    }
}

/// Errors for a single field: resolution or coercion.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FieldError {
    /// The wire type tag is not one of the known tags.
    #[error("unknown type tag `{0}`")]
    UnknownTag(String),

    /// The value could not be parsed for its tag.
    #[error("cannot parse `{value}` as {tag}")]
    Parse {
        /// The declared wire tag.
        tag: &'static str,
        /// The offending value.
        value: String,
    },

    /// The value parsed but does not fit the declared or target width.
    #[error("value `{value}` is out of range for {ty}")]
    OutOfRange {
        /// Target type name.
        ty: &'static str,
        /// The offending value.
        value: String,
    },

    /// The value kind cannot be converted into the target type.
    #[error("cannot assign {found} to {expected}")]
    TypeMismatch {
        /// Target type name.
        expected: &'static str,
        /// Kind of value that was supplied.
        found: &'static str,
    },

    /// The path does not name a settable field.
    #[error("unknown field `{0}`")]
    UnknownField(String),

    /// The path crosses an unset optional record or a missing element.
    #[error("`{0}` would require allocating a nested value")]
    NeedsAllocation(String),
}

/// Errors returned from action dispatch.
#[derive(Error, Debug)]
pub enum ActionError {
    /// No handler is bound to the requested path.
    #[error("no handler registered at `{0}`")]
    NotFound(String),

    /// The handler returned an error.
    #[error("handler failed: {0}")]
    Handler(#[source] BoxError),

    /// The handler panicked; the payload message is captured.
    #[error("handler panicked: {0}")]
    Panic(String),
}

/// Errors on a single hub connection.
#[derive(Error, Debug)]
pub enum HubError {
    /// Writing a frame failed.
    #[error("send failed: {0}")]
    Send(#[source] BoxError),

    /// The connection is no longer open.
    #[error("connection {0} is closed")]
    ConnectionClosed(u64),

    /// A frame could not be serialised.
    #[error("frame encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

impl From<BoxError> for TetherError {
    fn from(err: BoxError) -> Self {
        TetherError::Custom(err)
    }
}

impl From<BoxError> for ActionError {
    fn from(err: BoxError) -> Self {
        ActionError::Handler(err)
    }
}
