//! Device identity handles

use super::{open, open_with_events};
use crate::binding::{CooperativeBinding, ThreadSafeBinding};
use crate::client::{ClientCore, ClientEvent};
use crate::config::ClientConfig;
use crate::error::Result;
use crate::interface::{CompletionCallback, InterfaceClient};
use crate::traits::TransportBinding;
use tokio::sync::mpsc;

/// Digital Twin client over a thread-safe device transport
///
/// Callbacks arrive on the transport's own threads. Dropping the handle
/// destroys it.
#[derive(Debug)]
pub struct DeviceClient {
    core: ClientCore,
}

impl DeviceClient {
    /// Take ownership of `transport` and build a client on it
    ///
    /// The caller must not use the transport again, even on failure.
    pub fn create_from_transport(
        transport: Box<dyn TransportBinding>,
        config: ClientConfig,
    ) -> Result<Self> {
        let core = open(transport, Box::new(ThreadSafeBinding::new()), config)?;
        Ok(Self { core })
    }

    /// Like [`DeviceClient::create_from_transport`], also returning lifecycle events
    pub fn create_with_events(
        transport: Box<dyn TransportBinding>,
        config: ClientConfig,
    ) -> Result<(Self, mpsc::Receiver<ClientEvent>)> {
        let (core, events) =
            open_with_events(transport, Box::new(ThreadSafeBinding::new()), config)?;
        Ok((Self { core }, events))
    }

    /// See [`ClientCore::register_interfaces`]
    pub fn register_interfaces(
        &self,
        capability_model_id: &str,
        interfaces: &[InterfaceClient],
        on_complete: Option<CompletionCallback>,
    ) -> Result<()> {
        self.core
            .register_interfaces(capability_model_id, interfaces, on_complete)
    }

    /// The underlying client core
    pub fn core(&self) -> &ClientCore {
        &self.core
    }

    /// Destroy the client; see [`ClientCore::destroy`]
    pub fn destroy(self) {
        self.core.destroy();
    }
}

/// Digital Twin client over a cooperative device transport
///
/// Nothing happens until [`DeviceClientLl::do_work`] is called. Every
/// callback runs from inside it, on the caller's thread.
#[derive(Debug)]
pub struct DeviceClientLl {
    core: ClientCore,
}

impl DeviceClientLl {
    /// Take ownership of `transport` and build a client on it
    pub fn create_from_transport(
        transport: Box<dyn TransportBinding>,
        config: ClientConfig,
    ) -> Result<Self> {
        let core = open(transport, Box::new(CooperativeBinding::new()), config)?;
        Ok(Self { core })
    }

    /// Like [`DeviceClientLl::create_from_transport`], also returning lifecycle events
    pub fn create_with_events(
        transport: Box<dyn TransportBinding>,
        config: ClientConfig,
    ) -> Result<(Self, mpsc::Receiver<ClientEvent>)> {
        let (core, events) =
            open_with_events(transport, Box::new(CooperativeBinding::new()), config)?;
        Ok((Self { core }, events))
    }

    /// See [`ClientCore::register_interfaces`]
    pub fn register_interfaces(
        &self,
        capability_model_id: &str,
        interfaces: &[InterfaceClient],
        on_complete: Option<CompletionCallback>,
    ) -> Result<()> {
        self.core
            .register_interfaces(capability_model_id, interfaces, on_complete)
    }

    /// Let the transport send, receive and deliver callbacks
    pub fn do_work(&self) {
        self.core.do_work();
    }

    /// The underlying client core
    pub fn core(&self) -> &ClientCore {
        &self.core
    }

    /// Destroy the client; see [`ClientCore::destroy`]
    pub fn destroy(self) {
        self.core.destroy();
    }
}
