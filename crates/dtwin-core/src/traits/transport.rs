// # Transport Binding Trait
//
// Defines the interface to the always-connected transport client the core
// sits on top of.
//
// ## Purpose
//
// The transport binding abstracts over:
// - Device handles vs module handles
// - Thread-safe transports (callbacks on a dispatcher thread) vs
//   cooperative transports (callbacks only from inside `do_work`)
//
// Connection management, retries and socket I/O all live behind this trait.
// The core only ever sees a boolean outcome for each call plus an
// asynchronous status delivered later through the supplied completion.
//
// ## Implementations
//
// - `dtwin-loopback`: in-process hub for tests and demos
// - Future: MQTT bindings

use crate::config::TransportConfig;
use crate::error::Result;
use std::sync::Arc;

/// Outcome of a telemetry send, as reported by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendConfirmation {
    /// The service acknowledged the message
    Ok,
    /// The transport was destroyed before the message was acknowledged
    BecauseDestroy,
    /// The message timed out waiting for acknowledgement
    MessageTimeout,
    /// Any other transport failure
    Error,
}

/// Whether a twin callback carries the whole document or a patch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TwinUpdateState {
    /// Full document with `desired` and `reported` sections
    Complete,
    /// Patch of the desired section only
    Partial,
}

/// Response the core hands back to the transport for a command invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodResponse {
    /// HTTP-like status code
    pub status: i32,
    /// JSON response body
    pub payload: Vec<u8>,
}

/// A telemetry-like message with its out-of-band properties
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TelemetryMessage {
    /// Message body (JSON)
    pub body: Vec<u8>,
    /// Application properties, in insertion order
    pub properties: Vec<(String, String)>,
    /// Content type system property
    pub content_type: Option<String>,
}

impl TelemetryMessage {
    /// Create a message with the given body and no properties
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self {
            body: body.into(),
            properties: Vec::new(),
            content_type: None,
        }
    }

    /// Add an application property
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.push((key.into(), value.into()));
        self
    }

    /// Set the content type system property
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Look up an application property by key
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Body as UTF-8 text, if it is valid UTF-8
    pub fn body_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }
}

/// Completion for [`TransportBinding::send_event`]
pub type SendCompletion = Box<dyn FnOnce(SendConfirmation) + Send>;

/// Completion for [`TransportBinding::send_reported_state`], given the service status code
pub type ReportedStateCompletion = Box<dyn FnOnce(i32) + Send>;

/// Handler for twin documents and patches
pub type TwinUpdateHandler = Arc<dyn Fn(TwinUpdateState, &[u8]) + Send + Sync>;

/// Handler for command (direct method) invocations
pub type MethodHandler = Arc<dyn Fn(&str, &[u8]) -> MethodResponse + Send + Sync>;

/// Trait for transport bindings
///
/// # Thread Safety
///
/// Thread-safe transports may invoke completions and handlers from any
/// thread. Cooperative transports must only invoke them from inside
/// [`TransportBinding::do_work`].
///
/// # Contract
///
/// - A call that returns `Err` must drop its completion without invoking it.
/// - A call that returns `Ok` must invoke its completion at most once, and
///   never from inside the call itself.
/// - Handlers must not be invoked from inside `set_twin_callback` or
///   `set_method_callback`.
/// - After [`TransportBinding::destroy`] returns no completion or handler
///   may run. Undelivered reported-state completions may simply be dropped.
pub trait TransportBinding: Send + Sync {
    /// Send a telemetry-like message
    fn send_event(&self, message: TelemetryMessage, on_complete: SendCompletion) -> Result<()>;

    /// Install the handler for twin documents and patches
    fn set_twin_callback(&self, handler: TwinUpdateHandler) -> Result<()>;

    /// Send a reported-state update
    fn send_reported_state(&self, payload: &[u8], on_complete: ReportedStateCompletion)
    -> Result<()>;

    /// Install the handler for command invocations
    fn set_method_callback(&self, handler: MethodHandler) -> Result<()>;

    /// Drive pending work (cooperative transports only)
    fn do_work(&self);

    /// Tear down the transport
    ///
    /// Must block until no completion or handler is running.
    fn destroy(&self);

    /// Turn on automatic URL encoding/decoding of message properties
    ///
    /// Transports that cannot carry Digital Twin traffic return an error here.
    fn enable_url_encoding(&self) -> Result<()> {
        Ok(())
    }
}

/// Factory trait for creating transport bindings from configuration
///
/// Factories are registered with [`crate::TransportRegistry`].
pub trait TransportFactory: Send + Sync {
    /// Create a new transport binding instance
    fn create(&self, config: &TransportConfig) -> Result<Box<dyn TransportBinding>>;
}
