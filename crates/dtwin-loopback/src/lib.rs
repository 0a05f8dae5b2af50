// # Loopback Transport
//
// This crate provides an in-process transport binding for the Digital Twin
// client.
//
// ## Purpose
//
// The loopback transport is for:
// - Tests that need a transport with full control over acknowledgements
// - Demos and the sample daemon, without a service to connect to
//
// It performs no I/O. Whatever the device sends is recorded on a
// [`LoopbackHub`], and the hub is also where twin documents and command
// invocations are injected.
//
// ## Delivery modes
//
// - `threaded`: acknowledgements and injections run on tokio tasks, after
//   the configured acknowledgement latency
// - `cooperative`: everything is queued until `do_work` is called

pub mod hub;

pub use hub::{DEFAULT_REPORTED_STATUS, LoopbackHub, Outbound};

use dtwin_core::config::{LoopbackMode, TransportConfig};
use dtwin_core::traits::{
    MethodHandler, ReportedStateCompletion, SendCompletion, TelemetryMessage, TransportBinding,
    TransportFactory, TwinUpdateHandler,
};
use dtwin_core::{Error, Result, TransportRegistry};
use hub::Dispatch;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, info};

/// Transport binding attached to a [`LoopbackHub`]
pub struct LoopbackTransport {
    hub: LoopbackHub,
    mode: LoopbackMode,
}

impl LoopbackTransport {
    /// Attach a new transport to `hub`
    ///
    /// Threaded mode must be created from inside a tokio runtime. A hub
    /// serves one transport.
    pub fn new(hub: &LoopbackHub, mode: LoopbackMode, ack_latency: Duration) -> Result<Self> {
        let runtime = match mode {
            LoopbackMode::Threaded => Some(Handle::try_current().map_err(|_| {
                Error::config("Threaded loopback transport must be created inside a tokio runtime")
            })?),
            LoopbackMode::Cooperative => None,
        };

        hub.inner.attach(Dispatch {
            mode,
            runtime,
            ack_latency,
        })?;

        info!(
            "Loopback transport created (mode={:?}, ack_latency={:?})",
            mode, ack_latency
        );
        Ok(Self {
            hub: hub.clone(),
            mode,
        })
    }

    /// The hub this transport talks to
    pub fn hub(&self) -> &LoopbackHub {
        &self.hub
    }
}

impl TransportBinding for LoopbackTransport {
    fn send_event(&self, message: TelemetryMessage, on_complete: SendCompletion) -> Result<()> {
        self.hub.inner.send_event(message, on_complete)
    }

    fn set_twin_callback(&self, handler: TwinUpdateHandler) -> Result<()> {
        self.hub.inner.set_twin_handler(handler)
    }

    fn send_reported_state(
        &self,
        payload: &[u8],
        on_complete: ReportedStateCompletion,
    ) -> Result<()> {
        self.hub.inner.send_reported_state(payload, on_complete)
    }

    fn set_method_callback(&self, handler: MethodHandler) -> Result<()> {
        self.hub.inner.set_method_handler(handler)
    }

    fn do_work(&self) {
        match self.mode {
            LoopbackMode::Cooperative => self.hub.inner.drain(),
            LoopbackMode::Threaded => debug!("do_work has nothing to do in threaded mode"),
        }
    }

    fn destroy(&self) {
        self.hub.inner.destroy();
    }

    fn enable_url_encoding(&self) -> Result<()> {
        self.hub.inner.enable_url_encoding();
        Ok(())
    }
}

/// Factory for creating loopback transports on one hub
pub struct LoopbackFactory {
    hub: LoopbackHub,
}

impl LoopbackFactory {
    pub fn new(hub: LoopbackHub) -> Self {
        Self { hub }
    }
}

impl TransportFactory for LoopbackFactory {
    fn create(&self, config: &TransportConfig) -> Result<Box<dyn TransportBinding>> {
        match config {
            TransportConfig::Loopback {
                mode,
                ack_latency_ms,
            } => Ok(Box::new(LoopbackTransport::new(
                &self.hub,
                *mode,
                Duration::from_millis(*ack_latency_ms),
            )?)),
            _ => Err(Error::config("Invalid config for loopback transport")),
        }
    }
}

/// Register the loopback transport with a registry
///
/// Returns the hub that transports created through the registry attach to.
pub fn register(registry: &TransportRegistry) -> LoopbackHub {
    let hub = LoopbackHub::new();
    registry.register_factory("loopback", Box::new(LoopbackFactory::new(hub.clone())));
    hub
}
