// # Device and Module Handles
//
// Thin wrappers that pick a concurrency binding and prepare the transport
// before handing both to a [`ClientCore`].
//
// | Handle            | Binding              | Progress             |
// |-------------------|----------------------|----------------------|
// | `DeviceClient`    | `ThreadSafeBinding`  | transport threads    |
// | `DeviceClientLl`  | `CooperativeBinding` | caller's `do_work`   |
// | `ModuleClient`    | `ThreadSafeBinding`  | transport threads    |
// | `ModuleClientLl`  | `CooperativeBinding` | caller's `do_work`   |
//
// The `Ll` handles must be driven from one thread: every callback runs
// from inside `do_work`.

pub mod device;
pub mod module;

pub use device::{DeviceClient, DeviceClientLl};
pub use module::{ModuleClient, ModuleClientLl};

use crate::client::{ClientCore, ClientEvent};
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::traits::{ConcurrencyBinding, TransportBinding};
use tokio::sync::mpsc;
use tracing::error;

/// Ask the transport to URL encode/decode message properties
fn prepare_transport(transport: &dyn TransportBinding) -> Result<()> {
    transport.enable_url_encoding().map_err(|e| {
        error!(
            "Failure setting URL encoding/decoding on transport: {}. Only MQTT style transports are supported",
            e
        );
        Error::Generic
    })
}

pub(crate) fn open(
    transport: Box<dyn TransportBinding>,
    binding: Box<dyn ConcurrencyBinding>,
    config: ClientConfig,
) -> Result<ClientCore> {
    if let Err(e) = prepare_transport(transport.as_ref()) {
        transport.destroy();
        return Err(e);
    }
    ClientCore::new(transport, binding, config)
}

pub(crate) fn open_with_events(
    transport: Box<dyn TransportBinding>,
    binding: Box<dyn ConcurrencyBinding>,
    config: ClientConfig,
) -> Result<(ClientCore, mpsc::Receiver<ClientEvent>)> {
    if let Err(e) = prepare_transport(transport.as_ref()) {
        transport.destroy();
        return Err(e);
    }
    ClientCore::with_events(transport, binding, config)
}
