//! Wire envelopes for the Digital Twin protocol
//!
//! Builders and parsers for every JSON document and message the client puts
//! on, or takes off, the transport. Key order in the produced documents is
//! insertion order (`serde_json` is built with `preserve_order`).

use super::{AsyncCommandUpdate, PropertyResponse};
use crate::config::SdkInfo;
use crate::error::{Error, Result};
use crate::traits::TelemetryMessage;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::error;

/// Prefix of every interface key in twin documents and command names
pub const INTERFACE_PREFIX: &str = "$iotin:";

/// Separates the interface key from the command name in a method name
pub const COMMAND_SEPARATOR: char = '*';

/// Key of the server-assigned version in desired properties
pub const VERSION_KEY: &str = "$version";

/// Message property carrying the interface id
pub const INTERFACE_ID_PROPERTY: &str = "$.ifid";

/// Message property carrying the component name
pub const INTERFACE_NAME_PROPERTY: &str = "$.ifname";

/// Message property carrying the telemetry schema
pub const MESSAGE_SCHEMA_PROPERTY: &str = "$.schema";

/// Content type of every message body
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Message property carrying an async command's request id
pub const REQUEST_ID_PROPERTY: &str = "iothub-command-request-id";

/// Message property carrying an async command's status code
pub const STATUS_CODE_PROPERTY: &str = "iothub-command-statuscode";

/// Message property carrying an async command's name
pub const COMMAND_NAME_PROPERTY: &str = "iothub-command-name";

/// Telemetry schema of async command updates
pub const ASYNC_RESULT_SCHEMA: &str = "asyncResult";

/// Telemetry schema of the registration announcement
pub const MODEL_INFORMATION_SCHEMA: &str = "modelInformation";

/// Interface id of the built-in model discovery interface
pub const MODEL_DISCOVERY_INTERFACE_ID: &str = "urn:azureiot:ModelDiscovery:ModelInformation:1";

/// Component name of the built-in model discovery interface
pub const MODEL_DISCOVERY_INTERFACE_NAME: &str = "urn_azureiot_ModelDiscovery_ModelInformation";

/// Interface id of the built-in SDK information interface
pub const SDK_INFORMATION_INTERFACE_ID: &str = "urn:azureiot:Client:SDKInformation:1";

/// Component name of the built-in SDK information interface
pub const SDK_INFORMATION_INTERFACE_NAME: &str = "urn_azureiot_Client_SDKInformation";

/// Twin/command key for a component: `$iotin:<component>`
pub fn interface_key(component_name: &str) -> String {
    format!("{}{}", INTERFACE_PREFIX, component_name)
}

/// Method name prefix matched by a component: `$iotin:<component>*`
pub fn command_prefix(component_name: &str) -> String {
    format!("{}{}{}", INTERFACE_PREFIX, component_name, COMMAND_SEPARATOR)
}

/// Parse caller-supplied JSON text
pub fn parse_json(data: &str) -> Result<Value> {
    serde_json::from_str(data).map_err(|e| {
        error!("Payload is not valid JSON: {}", e);
        Error::InvalidArg
    })
}

fn to_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| {
        error!("Cannot serialize envelope: {}", e);
        Error::Generic
    })
}

/// Telemetry body: `{"<name>": <data>}`
pub fn telemetry_body(telemetry_name: &str, data: Value) -> Result<Vec<u8>> {
    let mut body = Map::new();
    body.insert(telemetry_name.to_string(), data);
    to_bytes(&body)
}

/// Wrap a body in a telemetry message with the Digital Twin headers
///
/// `interface_id` is only set for the registration announcement.
pub fn telemetry_message(
    interface_id: Option<&str>,
    component_name: &str,
    schema: &str,
    body: Vec<u8>,
) -> TelemetryMessage {
    let mut message = TelemetryMessage::new(body);
    if let Some(id) = interface_id {
        message = message.with_property(INTERFACE_ID_PROPERTY, id);
    }
    message
        .with_property(INTERFACE_NAME_PROPERTY, component_name)
        .with_property(MESSAGE_SCHEMA_PROPERTY, schema)
        .with_content_type(JSON_CONTENT_TYPE)
}

/// Async command update: `{"asyncResult": <data>}` plus the command headers
pub fn async_command_message(
    component_name: &str,
    update: &AsyncCommandUpdate,
    data: Value,
) -> Result<TelemetryMessage> {
    let body = telemetry_body(ASYNC_RESULT_SCHEMA, data)?;
    Ok(
        telemetry_message(None, component_name, ASYNC_RESULT_SCHEMA, body)
            .with_property(STATUS_CODE_PROPERTY, update.status_code.to_string())
            .with_property(REQUEST_ID_PROPERTY, update.request_id.as_str())
            .with_property(COMMAND_NAME_PROPERTY, update.command_name.as_str()),
    )
}

/// Reported property, with or without a response descriptor
///
/// Without: `{"$iotin:<c>": {"<p>": {"value": <v>}}}`.
/// With: `{"$iotin:<c>": {"<p>": {"value": <v>, "sc": <sc>, "sd": "<sd>", "sv": <sv>}}}`.
pub fn reported_property(
    component_name: &str,
    property_name: &str,
    value: Value,
    response: Option<&PropertyResponse>,
) -> Result<Vec<u8>> {
    let mut property = Map::new();
    property.insert("value".to_string(), value);
    if let Some(response) = response {
        property.insert("sc".to_string(), Value::from(response.status_code));
        property.insert(
            "sd".to_string(),
            Value::from(response.status_description.as_str()),
        );
        property.insert("sv".to_string(), Value::from(response.response_version));
    }

    let mut interface = Map::new();
    interface.insert(property_name.to_string(), Value::Object(property));

    let mut root = Map::new();
    root.insert(interface_key(component_name), Value::Object(interface));
    to_bytes(&root)
}

/// SDK information reported after registration
pub fn sdk_info_report(info: &SdkInfo) -> Result<Vec<u8>> {
    let field = |v: &str| {
        let mut m = Map::new();
        m.insert("value".to_string(), Value::from(v));
        Value::Object(m)
    };

    let mut properties = Map::new();
    properties.insert("language".to_string(), field(&info.language));
    properties.insert("version".to_string(), field(&info.version));
    properties.insert("vendor".to_string(), field(&info.vendor));

    let mut root = Map::new();
    root.insert(
        interface_key(SDK_INFORMATION_INTERFACE_NAME),
        Value::Object(properties),
    );
    to_bytes(&root)
}

#[derive(Serialize)]
struct RegistrationBody<'a> {
    #[serde(rename = "modelInformation")]
    model_information: ModelInformation<'a>,
}

#[derive(Serialize)]
struct ModelInformation<'a> {
    #[serde(rename = "capabilityModelId")]
    capability_model_id: &'a str,
    interfaces: Map<String, Value>,
}

/// Registration announcement body
///
/// Lists the two built-in interfaces first, then `entries` in order.
pub fn registration_body<'a>(
    capability_model_id: &str,
    entries: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> Result<Vec<u8>> {
    let mut interfaces = Map::new();
    interfaces.insert(
        MODEL_DISCOVERY_INTERFACE_NAME.to_string(),
        Value::from(MODEL_DISCOVERY_INTERFACE_ID),
    );
    interfaces.insert(
        SDK_INFORMATION_INTERFACE_NAME.to_string(),
        Value::from(SDK_INFORMATION_INTERFACE_ID),
    );
    for (component_name, interface_id) in entries {
        interfaces.insert(component_name.to_string(), Value::from(interface_id));
    }

    to_bytes(&RegistrationBody {
        model_information: ModelInformation {
            capability_model_id,
            interfaces,
        },
    })
}

/// Registration announcement message, sent as model discovery telemetry
pub fn registration_message(body: Vec<u8>) -> TelemetryMessage {
    telemetry_message(
        Some(MODEL_DISCOVERY_INTERFACE_ID),
        MODEL_DISCOVERY_INTERFACE_NAME,
        MODEL_INFORMATION_SCHEMA,
        body,
    )
}

/// A parsed `{"commandRequest": {"requestId": ..., "value": ...}}` envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandEnvelope {
    /// Server generated correlation id
    pub request_id: String,
    /// The `value` member, re-serialized as JSON text
    pub value: String,
}

/// Parse a command request envelope
///
/// An explicit `"value": null` is a valid payload. A missing `value` or a
/// non-string `requestId` is not.
pub fn parse_command_request(payload: &[u8]) -> Result<CommandEnvelope> {
    let root: Value = serde_json::from_slice(payload).map_err(|e| {
        error!("Command payload is not valid JSON: {}", e);
        Error::Generic
    })?;

    let request = root.get("commandRequest").ok_or_else(|| {
        error!("Command payload has no commandRequest");
        Error::Generic
    })?;

    let request_id = request
        .get("requestId")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            error!("Command payload has no commandRequest.requestId string");
            Error::Generic
        })?;

    let value = request.get("value").ok_or_else(|| {
        error!("Command payload has no commandRequest.value");
        Error::Generic
    })?;

    Ok(CommandEnvelope {
        request_id: request_id.to_string(),
        value: value.to_string(),
    })
}

/// Desired (and, for full documents, reported) sections of a twin
#[derive(Debug)]
pub struct TwinSections<'a> {
    /// Desired properties; the whole document for a patch
    pub desired: &'a Map<String, Value>,
    /// Reported properties; only present in full documents
    pub reported: Option<&'a Map<String, Value>>,
}

impl<'a> TwinSections<'a> {
    /// Split a twin document into its sections
    pub fn split(root: &'a Value, full_snapshot: bool) -> Result<Self> {
        if full_snapshot {
            let desired = root
                .get("desired")
                .and_then(Value::as_object)
                .ok_or_else(|| {
                    error!("Full twin has no desired object");
                    Error::Generic
                })?;
            let reported = root
                .get("reported")
                .and_then(Value::as_object)
                .ok_or_else(|| {
                    error!("Full twin has no reported object");
                    Error::Generic
                })?;
            Ok(Self {
                desired,
                reported: Some(reported),
            })
        } else {
            let desired = root.as_object().ok_or_else(|| {
                error!("Twin patch is not a JSON object");
                Error::Generic
            })?;
            Ok(Self {
                desired,
                reported: None,
            })
        }
    }

    /// Server-assigned `$version` of the desired section (0 when absent)
    pub fn desired_version(&self) -> i64 {
        self.desired
            .get(VERSION_KEY)
            .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
            .unwrap_or(0)
    }
}
