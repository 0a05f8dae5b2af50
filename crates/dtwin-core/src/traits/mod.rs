//! Core traits for the Digital Twin client
//!
//! This module defines the capabilities the client core consumes from its
//! environment. Both are injected at construction time.
//!
//! - [`TransportBinding`]: Send messages and receive twin/command callbacks
//! - [`ConcurrencyBinding`]: Locks and sleeping, real or no-op

pub mod concurrency;
pub mod transport;

pub use concurrency::{BindingGuard, BindingLock, ConcurrencyBinding};
pub use transport::{
    MethodHandler, MethodResponse, ReportedStateCompletion, SendCompletion, SendConfirmation,
    TelemetryMessage, TransportBinding, TransportFactory, TwinUpdateHandler, TwinUpdateState,
};
