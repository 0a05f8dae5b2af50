// # dtwin-core
//
// Core library for the device-side Digital Twin protocol client.
//
// ## Architecture Overview
//
// The client exposes application-defined interfaces (components) to a twin
// service on top of an always-connected transport:
// - **TransportBinding**: Trait for the transport the core sends through
// - **ConcurrencyBinding**: Trait for locks and sleeping, real or no-op
// - **ClientCore**: Registration state and the funnel for every transport
//   callback
// - **InterfaceClient**: One component with its telemetry, properties and
//   commands
// - **ModelDefinitionClient**: Built-in interface serving definition documents
// - **TransportRegistry**: Plugin-based registry for transport bindings
//
// ## Design Principles
//
// 1. **Injected capabilities**: Transport and concurrency come in as trait
//    objects, so device/module and threaded/cooperative variants share one core
// 2. **Callback discipline**: No application callback runs under a core lock
// 3. **Deterministic teardown**: Destroy returns only when no callback is
//    running and none can start
// 4. **Library-First**: The sample daemon is a thin wrapper over this crate

pub mod binding;
pub mod client;
pub mod config;
pub mod error;
pub mod handle;
pub mod interface;
mod interface_list;
pub mod model_definition;
pub mod registry;
pub mod traits;

// Re-export core types for convenience
pub use binding::{CooperativeBinding, ThreadSafeBinding};
pub use client::{ClientCore, ClientEvent, Lifecycle, RegistrationStatus};
pub use config::{ClientConfig, LoopbackMode, SdkInfo, TransportConfig};
pub use error::{Error, Result};
pub use handle::{DeviceClient, DeviceClientLl, ModuleClient, ModuleClientLl};
pub use interface::{
    ASYNC_STATUS_CODE_PENDING, AsyncCommandUpdate, CommandRequest, CommandResponse,
    CompletionCallback, InterfaceClient, InterfaceState, PropertyResponse, PropertyUpdate,
    STRUCT_VERSION_1,
};
pub use model_definition::ModelDefinitionClient;
pub use registry::TransportRegistry;
pub use traits::{ConcurrencyBinding, TransportBinding, TransportFactory};
