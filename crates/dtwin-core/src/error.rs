//! Error types for the Digital Twin client
//!
//! Every public operation returns one of these codes. Asynchronous
//! completions hand the same type to application callbacks, so the enum is
//! cheap to clone and compare.

use thiserror::Error;

/// Result type alias for Digital Twin operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the Digital Twin client
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A parameter was missing, malformed or out of range
    #[error("invalid argument")]
    InvalidArg,

    /// An allocation failed (only ever reported by a transport)
    #[error("out of memory")]
    OutOfMemory,

    /// A registration is already in flight on this client
    #[error("registration pending")]
    RegistrationPending,

    /// The interface (or client) has already been registered
    #[error("interface already registered")]
    InterfaceAlreadyRegistered,

    /// The interface has not completed registration yet
    #[error("interface not registered")]
    InterfaceNotRegistered,

    /// The interface has been unregistered and can no longer be used
    #[error("interface unregistering")]
    InterfaceUnregistering,

    /// No interface handles the requested command
    #[error("command not present")]
    CommandNotPresent,

    /// The owning client is being destroyed
    #[error("client shutting down")]
    ShuttingDown,

    /// The transport gave up waiting for an acknowledgement
    #[error("timeout")]
    Timeout,

    /// The transport handle was destroyed before the operation completed
    #[error("handle destroyed")]
    HandleDestroyed,

    /// The service rejected the operation
    #[error("access denied")]
    AccessDenied,

    /// The callback slot has already been filled
    #[error("callback already registered")]
    CallbackAlreadyRegistered,

    /// Two interfaces in one registration share a component name
    #[error("duplicate components")]
    DuplicateComponents,

    /// Any other failure
    #[error("generic error")]
    Generic,

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether this error comes from racing a lifecycle transition
    ///
    /// These are expected during teardown or re-registration and are
    /// logged as warnings rather than failures.
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            Self::ShuttingDown
                | Self::InterfaceNotRegistered
                | Self::InterfaceUnregistering
                | Self::HandleDestroyed
        )
    }
}
