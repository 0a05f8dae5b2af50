//! Plugin-based transport registry
//!
//! The registry lets transport bindings be registered by name at runtime,
//! so applications pick one from configuration instead of hard-coding it.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use dtwin_core::registry::TransportRegistry;
//! use dtwin_core::config::TransportConfig;
//!
//! let registry = TransportRegistry::new();
//! dtwin_loopback::register(&registry);
//!
//! let transport = registry.create_transport(&TransportConfig::default())?;
//! ```
//!
//! ## Registration
//!
//! Transport crates expose a `register` function:
//!
//! ```rust,ignore
//! pub fn register(registry: &TransportRegistry) {
//!     registry.register_factory("loopback", Box::new(LoopbackFactory));
//! }
//! ```

use crate::config::TransportConfig;
use crate::error::{Error, Result};
use crate::traits::{TransportBinding, TransportFactory};
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;

/// Registry of transport factories keyed by type name
///
/// ## Thread Safety
///
/// Interior mutability through an `RwLock`: concurrent lookups, exclusive
/// registration.
#[derive(Default)]
pub struct TransportRegistry {
    factories: RwLock<HashMap<String, Box<dyn TransportFactory>>>,
}

impl TransportRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a transport factory, replacing any previous one of that name
    ///
    /// # Parameters
    ///
    /// - `name`: Transport type name (e.g., "loopback")
    /// - `factory`: Factory creating bindings of that type
    pub fn register_factory(&self, name: impl Into<String>, factory: Box<dyn TransportFactory>) {
        let name = name.into();
        debug!("Registering transport factory {}", name);
        self.factories.write().insert(name, factory);
    }

    /// Create a transport binding from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn TransportBinding>)`: The created binding
    /// - `Err(Error)`: Invalid configuration, unknown type, or factory failure
    pub fn create_transport(&self, config: &TransportConfig) -> Result<Box<dyn TransportBinding>> {
        config.validate()?;

        let transport_type = config.factory_name();
        let factories = self.factories.read();
        let factory = factories.get(transport_type).ok_or_else(|| {
            Error::config(format!("Unknown transport type: {}", transport_type))
        })?;

        factory.create(config)
    }

    /// List registered transport type names
    pub fn list_transports(&self) -> Vec<String> {
        self.factories.read().keys().cloned().collect()
    }

    /// Check whether a transport type is registered
    pub fn has_transport(&self, name: &str) -> bool {
        self.factories.read().contains_key(name)
    }
}

impl std::fmt::Debug for TransportRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportRegistry")
            .field("transports", &self.list_transports())
            .finish()
    }
}
