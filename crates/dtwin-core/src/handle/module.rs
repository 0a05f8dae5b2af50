//! Module identity handles
//!
//! Same behavior as the device handles. A module transport addresses one
//! module of a device, so twin documents and commands are scoped to it.

use super::{open, open_with_events};
use crate::binding::{CooperativeBinding, ThreadSafeBinding};
use crate::client::{ClientCore, ClientEvent};
use crate::config::ClientConfig;
use crate::error::Result;
use crate::interface::{CompletionCallback, InterfaceClient};
use crate::traits::TransportBinding;
use tokio::sync::mpsc;

/// Digital Twin client over a thread-safe module transport
#[derive(Debug)]
pub struct ModuleClient {
    core: ClientCore,
}

impl ModuleClient {
    /// Take ownership of `transport` and build a client on it
    pub fn create_from_transport(
        transport: Box<dyn TransportBinding>,
        config: ClientConfig,
    ) -> Result<Self> {
        let core = open(transport, Box::new(ThreadSafeBinding::new()), config)?;
        Ok(Self { core })
    }

    /// Like [`ModuleClient::create_from_transport`], also returning lifecycle events
    pub fn create_with_events(
        transport: Box<dyn TransportBinding>,
        config: ClientConfig,
    ) -> Result<(Self, mpsc::Receiver<ClientEvent>)> {
        let (core, events) =
            open_with_events(transport, Box::new(ThreadSafeBinding::new()), config)?;
        Ok((Self { core }, events))
    }

    pub fn register_interfaces(
        &self,
        capability_model_id: &str,
        interfaces: &[InterfaceClient],
        on_complete: Option<CompletionCallback>,
    ) -> Result<()> {
        self.core
            .register_interfaces(capability_model_id, interfaces, on_complete)
    }

    pub fn core(&self) -> &ClientCore {
        &self.core
    }

    pub fn destroy(self) {
        self.core.destroy();
    }
}

/// Digital Twin client over a cooperative module transport
#[derive(Debug)]
pub struct ModuleClientLl {
    core: ClientCore,
}

impl ModuleClientLl {
    /// Take ownership of `transport` and build a client on it
    pub fn create_from_transport(
        transport: Box<dyn TransportBinding>,
        config: ClientConfig,
    ) -> Result<Self> {
        let core = open(transport, Box::new(CooperativeBinding::new()), config)?;
        Ok(Self { core })
    }

    /// Like [`ModuleClientLl::create_from_transport`], also returning lifecycle events
    pub fn create_with_events(
        transport: Box<dyn TransportBinding>,
        config: ClientConfig,
    ) -> Result<(Self, mpsc::Receiver<ClientEvent>)> {
        let (core, events) =
            open_with_events(transport, Box::new(CooperativeBinding::new()), config)?;
        Ok((Self { core }, events))
    }

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

    pub fn core(&self) -> &ClientCore {
        &self.core
    }

    pub fn destroy(self) {
        self.core.destroy();
    }
}
