//! Model definition interface
//!
//! Serves interface definition documents to the service on request. The
//! application publishes a document per interface id, registers
//! [`ModelDefinitionClient::interface`] alongside its own interfaces, and
//! the service fetches documents with the `getModelDefinition` command.

use crate::error::{Error, Result};
use crate::interface::envelope;
use crate::interface::{CommandRequest, CommandResponse, InterfaceClient};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};

/// Interface id of the model definition interface
pub const MODEL_DEFINITION_INTERFACE_ID: &str = "urn:azureiot:ModelDiscovery:ModelDefinition:1";

/// Component name of the model definition interface
pub const MODEL_DEFINITION_INTERFACE_NAME: &str = "urn_azureiot_ModelDiscovery_ModelDefinition";

/// The one command this interface answers
pub const GET_MODEL_DEFINITION_COMMAND: &str = "getModelDefinition";

const STATUS_SUCCESS: i32 = 200;
const STATUS_NOT_FOUND: i32 = 404;
const STATUS_NOT_IMPLEMENTED: i32 = 501;
const NOT_IMPLEMENTED_BODY: &str = "\"Requested command not implemented on this interface\"";

type Definitions = Arc<RwLock<HashMap<String, String>>>;

/// Publishes interface definition documents over a dedicated interface
#[derive(Debug, Clone)]
pub struct ModelDefinitionClient {
    interface: InterfaceClient,
    definitions: Definitions,
}

impl ModelDefinitionClient {
    /// Create the client and its interface, ready to register
    pub fn new() -> Result<Self> {
        let definitions: Definitions = Arc::new(RwLock::new(HashMap::new()));

        let interface = InterfaceClient::new(
            MODEL_DEFINITION_INTERFACE_ID,
            MODEL_DEFINITION_INTERFACE_NAME,
            Some(Box::new(|status: Result<()>| match status {
                Ok(()) => info!("Model definition interface registered"),
                Err(Error::InterfaceUnregistering) => {
                    info!("Model definition interface unregistering")
                }
                Err(e) => error!("Model definition interface registration failed: {}", e),
            })),
        )?;

        let lookup = definitions.clone();
        interface.set_command_callback(move |request| handle_command(&lookup, request))?;

        Ok(Self {
            interface,
            definitions,
        })
    }

    /// The interface to pass to `register_interfaces`
    pub fn interface(&self) -> &InterfaceClient {
        &self.interface
    }

    /// Publish (or replace) the definition document for `interface_id`
    pub fn publish(&self, interface_id: &str, document: impl Into<String>) -> Result<()> {
        if interface_id.is_empty() {
            error!("Model definition interface id cannot be empty");
            return Err(Error::InvalidArg);
        }
        self.definitions
            .write()
            .insert(interface_id.to_string(), document.into());
        Ok(())
    }

    /// Read a definition document from `path` and publish it
    ///
    /// The document must be valid JSON.
    pub fn publish_from_file(&self, interface_id: &str, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let document = std::fs::read_to_string(path).map_err(|e| {
            error!("Cannot read model definition {}: {}", path.display(), e);
            Error::config(format!("Cannot read {}: {}", path.display(), e))
        })?;
        envelope::parse_json(&document)?;

        info!(
            "Publishing model definition for {} from {}",
            interface_id,
            path.display()
        );
        self.publish(interface_id, document)
    }

    /// The published document for `interface_id`, if any
    pub fn get_data(&self, interface_id: &str) -> Option<String> {
        self.definitions.read().get(interface_id).cloned()
    }

    /// Destroy the underlying interface
    pub fn destroy(self) {
        self.interface.destroy();
    }
}

fn handle_command(definitions: &Definitions, request: &CommandRequest) -> CommandResponse {
    if request.command_name != GET_MODEL_DEFINITION_COMMAND {
        error!(
            "Command {} is not associated with the model definition interface",
            request.command_name
        );
        return CommandResponse::new(STATUS_NOT_IMPLEMENTED, NOT_IMPLEMENTED_BODY);
    }

    info!("Model definition requested for {}", request.request_data);
    let document = serde_json::from_str::<String>(&request.request_data)
        .ok()
        .and_then(|interface_id| definitions.read().get(&interface_id).cloned());

    match document {
        Some(document) => CommandResponse::new(STATUS_SUCCESS, document),
        None => {
            error!("No model definition for {}", request.request_data);
            CommandResponse::empty(STATUS_NOT_FOUND)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::{InterfaceState, STRUCT_VERSION_1};
    use std::io::Write;

    fn request(command_name: &str, request_data: &str) -> CommandRequest {
        CommandRequest {
            version: STRUCT_VERSION_1,
            command_name: command_name.to_string(),
            request_data: request_data.to_string(),
            request_id: "1".to_string(),
        }
    }

    #[test]
    fn interface_is_ready_to_register() {
        let client = ModelDefinitionClient::new().unwrap();
        assert_eq!(client.interface().interface_id(), MODEL_DEFINITION_INTERFACE_ID);
        assert_eq!(
            client.interface().component_name(),
            MODEL_DEFINITION_INTERFACE_NAME
        );
        assert_eq!(client.interface().state(), InterfaceState::Created);
    }

    #[test]
    fn publish_overwrites() {
        let client = ModelDefinitionClient::new().unwrap();
        client.publish("urn:contoso:A:1", "{\"v\":1}").unwrap();
        client.publish("urn:contoso:A:1", "{\"v\":2}").unwrap();
        assert_eq!(
            client.get_data("urn:contoso:A:1").as_deref(),
            Some("{\"v\":2}")
        );
        assert_eq!(client.get_data("urn:contoso:B:1"), None);
        assert_eq!(client.publish("", "{}"), Err(Error::InvalidArg));
    }

    #[test]
    fn lookup_hit_and_miss() {
        let client = ModelDefinitionClient::new().unwrap();
        client.publish("urn:contoso:A:1", "{\"@id\":\"a\"}").unwrap();

        let hit = handle_command(
            &client.definitions,
            &request(GET_MODEL_DEFINITION_COMMAND, "\"urn:contoso:A:1\""),
        );
        assert_eq!(hit.status, 200);
        assert_eq!(hit.payload.as_deref(), Some("{\"@id\":\"a\"}"));

        let miss = handle_command(
            &client.definitions,
            &request(GET_MODEL_DEFINITION_COMMAND, "\"urn:contoso:B:1\""),
        );
        assert_eq!(miss.status, 404);
        assert_eq!(miss.payload, None);

        let not_a_string = handle_command(
            &client.definitions,
            &request(GET_MODEL_DEFINITION_COMMAND, "42"),
        );
        assert_eq!(not_a_string.status, 404);
    }

    #[test]
    fn other_commands_are_not_implemented() {
        let client = ModelDefinitionClient::new().unwrap();
        let response = handle_command(&client.definitions, &request("reboot", "null"));
        assert_eq!(response.status, 501);
        assert_eq!(response.payload.as_deref(), Some(NOT_IMPLEMENTED_BODY));
    }

    #[test]
    fn publish_from_file_requires_json() {
        let client = ModelDefinitionClient::new().unwrap();

        let mut good = tempfile::NamedTempFile::new().unwrap();
        write!(good, r#"{{"@id": "urn:contoso:A:1", "contents": []}}"#).unwrap();
        client.publish_from_file("urn:contoso:A:1", good.path()).unwrap();
        assert!(client.get_data("urn:contoso:A:1").is_some());

        let mut bad = tempfile::NamedTempFile::new().unwrap();
        write!(bad, "not json").unwrap();
        assert_eq!(
            client.publish_from_file("urn:contoso:B:1", bad.path()),
            Err(Error::InvalidArg)
        );
        assert_eq!(client.get_data("urn:contoso:B:1"), None);
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let client = ModelDefinitionClient::new().unwrap();
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            client.publish_from_file("urn:contoso:A:1", dir.path().join("absent.json")),
            Err(Error::Config(_))
        ));
    }
}
