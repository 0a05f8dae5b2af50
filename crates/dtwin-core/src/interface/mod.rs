//! Interface clients
//!
//! An [`InterfaceClient`] is one component exposed to the twin service. It
//! is created on its own, handed to a client's `register_interfaces`, and
//! from then on receives property updates and commands addressed to its
//! component name.
//!
//! ## State machine
//!
//! ```text
//! Created ──bind──► Bound ──ack Ok──► Registered
//!                     │                   │
//!                     └──────unbind───────┴──► Unbound
//!
//! any ──destroy──► PendingDestroy (terminal)
//! ```
//!
//! ## Ownership
//!
//! The handle is a cheap `Arc` clone. The application and (while bound) the
//! owning client each hold one; the interface is freed when both let go.

pub mod envelope;
pub mod naming;

use crate::binding::Section;
use crate::client::CoreShared;
use crate::error::{Error, Result};
use crate::traits::{BindingGuard, BindingLock, ConcurrencyBinding};
use envelope::TwinSections;
use parking_lot::Mutex;
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, OnceLock, Weak};
use tracing::{debug, error, info, warn};

/// Version of every versioned structure exchanged with the application
pub const STRUCT_VERSION_1: u32 = 1;

/// Status a command callback returns when it will finish through
/// [`InterfaceClient::update_async_command_status`]
pub const ASYNC_STATUS_CODE_PENDING: i32 = 202;

/// Lifecycle of an interface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterfaceState {
    /// Created, not yet handed to a client
    Created,
    /// Bound to a client, registration in progress or failed
    Bound,
    /// Registered with the service
    Registered,
    /// Released by its client; unusable
    Unbound,
    /// Destroyed by the application; terminal
    PendingDestroy,
}

impl InterfaceState {
    /// Whether the state machine allows moving from `self` to `next`
    pub fn can_transition_to(self, next: InterfaceState) -> bool {
        use InterfaceState::*;
        match next {
            Bound => self == Created,
            Registered => self == Bound,
            Unbound => matches!(self, Bound | Registered),
            PendingDestroy => true,
            Created => false,
        }
    }

    /// Whether twin updates and commands are still delivered
    fn accepts_callbacks(self) -> bool {
        matches!(self, InterfaceState::Bound | InterfaceState::Registered)
    }

    /// Error a send fails with in this state, if any
    fn send_error(self) -> Option<Error> {
        match self {
            InterfaceState::Registered => None,
            InterfaceState::Created | InterfaceState::Bound => Some(Error::InterfaceNotRegistered),
            InterfaceState::Unbound | InterfaceState::PendingDestroy => {
                Some(Error::InterfaceUnregistering)
            }
        }
    }
}

/// A desired property change delivered to the application
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyUpdate {
    /// Structure version, always [`STRUCT_VERSION_1`]
    pub version: u32,
    /// Property name within the interface
    pub property_name: String,
    /// Last reported value as JSON text (full twin snapshots only)
    pub reported: Option<String>,
    /// Desired value as JSON text
    pub desired: String,
    /// Server-assigned `$version` of the desired document
    pub desired_version: i64,
}

/// Response descriptor attached to a reported property
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyResponse {
    /// Structure version, must be [`STRUCT_VERSION_1`]
    pub version: u32,
    /// Desired version this report answers
    pub response_version: i64,
    /// HTTP-like status code
    pub status_code: i32,
    /// Human readable status
    pub status_description: String,
}

/// A command invocation delivered to the application
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequest {
    /// Structure version, always [`STRUCT_VERSION_1`]
    pub version: u32,
    /// Command name without the interface prefix
    pub command_name: String,
    /// Request payload as JSON text
    pub request_data: String,
    /// Server correlation id
    pub request_id: String,
}

/// What the application answers a command with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResponse {
    /// HTTP-like status code
    pub status: i32,
    /// JSON response body; `None` is sent as `null`
    pub payload: Option<String>,
}

impl CommandResponse {
    /// Response with a body
    pub fn new(status: i32, payload: impl Into<String>) -> Self {
        Self {
            status,
            payload: Some(payload.into()),
        }
    }

    /// Response without a body
    pub fn empty(status: i32) -> Self {
        Self {
            status,
            payload: None,
        }
    }
}

/// Progress report for a long-running command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsyncCommandUpdate {
    /// Structure version, must be [`STRUCT_VERSION_1`]
    pub version: u32,
    /// Command being reported on
    pub command_name: String,
    /// Request id from the original [`CommandRequest`]
    pub request_id: String,
    /// Status payload as JSON text
    pub property_data: String,
    /// HTTP-like status code
    pub status_code: i32,
}

/// Outcome of offering a command to one interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// The interface ran the command
    Processed {
        /// Status the callback returned
        status: i32,
        /// Response body, `null` when the callback gave none
        payload: String,
    },
    /// The command is not addressed to this interface
    NotApplicable,
    /// The command was addressed here but could not be run
    Error,
}

/// Completion of an asynchronous send
pub type CompletionCallback = Box<dyn FnOnce(Result<()>) + Send>;

/// Notified when registration finishes or the interface is unregistered
pub type InterfaceRegisteredCallback = Box<dyn Fn(Result<()>) + Send + Sync>;

/// Receives desired property changes
pub type PropertyUpdatedCallback = Box<dyn Fn(&PropertyUpdate) + Send + Sync>;

/// Executes commands
pub type CommandCallback = Box<dyn Fn(&CommandRequest) -> CommandResponse + Send + Sync>;

struct Slot {
    state: InterfaceState,
    core: Weak<CoreShared>,
}

struct InterfaceInner {
    interface_id: String,
    component_name: String,
    on_registered: Option<InterfaceRegisteredCallback>,
    property_callback: OnceLock<PropertyUpdatedCallback>,
    command_callback: OnceLock<CommandCallback>,
    // Set once, at bind.
    lock: OnceLock<Box<dyn BindingLock>>,
    slot: Mutex<Slot>,
}

impl InterfaceInner {
    fn enter(&self) -> Result<Section<'_, Slot>> {
        let binding = match self.lock.get() {
            Some(lock) => Some(BindingGuard::acquire(lock.as_ref())?),
            None => None,
        };
        Ok(Section::new(self.slot.lock(), binding))
    }

    /// Enter, falling back to the bare state lock if the binding lock fails
    fn enter_for_teardown(&self) -> Section<'_, Slot> {
        match self.enter() {
            Ok(section) => section,
            Err(e) => {
                error!(component = %self.component_name, "Cannot lock interface: {}", e);
                Section::new(self.slot.lock(), None)
            }
        }
    }

    fn set_state(&self, slot: &mut Slot, next: InterfaceState) {
        info!(
            component = %self.component_name,
            "Interface state {:?} -> {:?}", slot.state, next
        );
        slot.state = next;
    }
}

/// Handle to one Digital Twin interface
#[derive(Clone)]
pub struct InterfaceClient {
    inner: Arc<InterfaceInner>,
}

impl InterfaceClient {
    /// Create an interface
    ///
    /// `interface_id` must follow the `urn:` grammar and `component_name`
    /// the component grammar (see [`naming`]). `on_registered` is told the
    /// outcome of registration and, later, that the interface was
    /// unregistered.
    pub fn new(
        interface_id: &str,
        component_name: &str,
        on_registered: Option<InterfaceRegisteredCallback>,
    ) -> Result<Self> {
        naming::validate_name(interface_id, true)?;
        naming::validate_name(component_name, false)?;

        Ok(Self {
            inner: Arc::new(InterfaceInner {
                interface_id: interface_id.to_string(),
                component_name: component_name.to_string(),
                on_registered,
                property_callback: OnceLock::new(),
                command_callback: OnceLock::new(),
                lock: OnceLock::new(),
                slot: Mutex::new(Slot {
                    state: InterfaceState::Created,
                    core: Weak::new(),
                }),
            }),
        })
    }

    /// Interface id (`urn:...`)
    pub fn interface_id(&self) -> &str {
        &self.inner.interface_id
    }

    /// Component name, the wire key of this interface
    pub fn component_name(&self) -> &str {
        &self.inner.component_name
    }

    /// Current lifecycle state
    pub fn state(&self) -> InterfaceState {
        self.inner.slot.lock().state
    }

    /// Install the property update callback
    ///
    /// Only once, and only before the interface is registered.
    pub fn set_property_updated_callback<F>(&self, callback: F) -> Result<()>
    where
        F: Fn(&PropertyUpdate) + Send + Sync + 'static,
    {
        self.install_callback(&self.inner.property_callback, Box::new(callback))
    }

    /// Install the command callback
    ///
    /// Only once, and only before the interface is registered.
    pub fn set_command_callback<F>(&self, callback: F) -> Result<()>
    where
        F: Fn(&CommandRequest) -> CommandResponse + Send + Sync + 'static,
    {
        self.install_callback(&self.inner.command_callback, Box::new(callback))
    }

    fn install_callback<T>(&self, cell: &OnceLock<T>, callback: T) -> Result<()> {
        let slot = self.inner.enter()?;

        if cell.get().is_some() {
            error!(component = %self.component_name(), "Callback already registered");
            return Err(Error::CallbackAlreadyRegistered);
        }

        if slot.state != InterfaceState::Created {
            error!(
                component = %self.component_name(),
                "Callbacks can only be set before registration (state {:?})", slot.state
            );
            return Err(Error::InterfaceAlreadyRegistered);
        }

        cell.set(callback)
            .map_err(|_| Error::CallbackAlreadyRegistered)
    }

    /// Send telemetry `{"<telemetry_name>": <data>}`
    ///
    /// `data` is JSON text. `on_complete` receives the transport's verdict.
    pub fn send_telemetry(
        &self,
        telemetry_name: &str,
        data: &str,
        on_complete: Option<CompletionCallback>,
    ) -> Result<()> {
        if telemetry_name.is_empty() {
            error!("Telemetry name cannot be empty");
            return Err(Error::InvalidArg);
        }
        let value = envelope::parse_json(data)?;

        let core = self.ensure_registered()?;

        let body = envelope::telemetry_body(telemetry_name, value)?;
        let message =
            envelope::telemetry_message(None, self.component_name(), telemetry_name, body);
        core.send_telemetry(self, message, on_complete)
    }

    /// Report a property value, optionally answering a desired update
    ///
    /// `data` is JSON text.
    pub fn report_property(
        &self,
        property_name: &str,
        data: &str,
        response: Option<&PropertyResponse>,
        on_complete: Option<CompletionCallback>,
    ) -> Result<()> {
        if property_name.is_empty() {
            error!("Property name cannot be empty");
            return Err(Error::InvalidArg);
        }
        if let Some(response) = response {
            if response.version != STRUCT_VERSION_1 {
                error!(
                    "PropertyResponse version {} is not supported",
                    response.version
                );
                return Err(Error::InvalidArg);
            }
        }
        let value = envelope::parse_json(data)?;

        let core = self.ensure_registered()?;

        let payload =
            envelope::reported_property(self.component_name(), property_name, value, response)?;
        core.report_property_status(self, payload, on_complete)
    }

    /// Report progress of a command that answered [`ASYNC_STATUS_CODE_PENDING`]
    pub fn update_async_command_status(&self, update: &AsyncCommandUpdate) -> Result<()> {
        if update.version != STRUCT_VERSION_1
            || update.command_name.is_empty()
            || update.request_id.is_empty()
        {
            error!("AsyncCommandUpdate is missing required fields");
            return Err(Error::InvalidArg);
        }
        let value = envelope::parse_json(&update.property_data)?;

        let core = self.ensure_registered()?;

        let message = envelope::async_command_message(self.component_name(), update, value)?;
        core.send_telemetry(self, message, None)
    }

    /// Destroy the interface
    ///
    /// Moves to `PendingDestroy`: no further sends are accepted and no
    /// further callbacks are delivered. The owning client, if any, releases
    /// its reference when it unbinds.
    pub fn destroy(&self) {
        let mut slot = self.inner.enter_for_teardown();
        let was_bound = slot.state.accepts_callbacks();
        self.inner.set_state(&mut slot, InterfaceState::PendingDestroy);
        if was_bound {
            debug!(
                component = %self.component_name(),
                "Interface destroyed while bound; client releases it on unbind"
            );
        }
    }

    /// Whether two handles refer to the same interface
    pub fn same_as(&self, other: &InterfaceClient) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn ensure_registered(&self) -> Result<Arc<CoreShared>> {
        let slot = self.inner.enter()?;
        if let Some(e) = slot.state.send_error() {
            warn!(
                component = %self.component_name(),
                "Interface is in state {:?}, cannot process request", slot.state
            );
            return Err(e);
        }
        slot.core.upgrade().ok_or_else(|| {
            warn!(component = %self.component_name(), "Owning client is gone");
            Error::ShuttingDown
        })
    }

    pub(crate) fn bind_to_core(
        &self,
        core: Weak<CoreShared>,
        binding: &dyn ConcurrencyBinding,
    ) -> Result<()> {
        let lock = binding.create_lock()?;
        let mut slot = self.inner.enter()?;

        if !slot.state.can_transition_to(InterfaceState::Bound) {
            error!(
                component = %self.component_name(),
                "Cannot bind interface in state {:?}", slot.state
            );
            return Err(Error::Generic);
        }

        if self.inner.lock.set(lock).is_err() {
            error!(component = %self.component_name(), "Interface already has a lock");
            return Err(Error::Generic);
        }

        slot.core = core;
        self.inner.set_state(&mut slot, InterfaceState::Bound);
        Ok(())
    }

    /// Release the owning client; no callback is delivered after this returns
    pub(crate) fn unbind_from_core(&self) {
        {
            let mut slot = self.inner.enter_for_teardown();
            if slot.state == InterfaceState::PendingDestroy {
                slot.core = Weak::new();
                debug!(component = %self.component_name(), "Released destroyed interface");
                return;
            }
        }

        if let Some(callback) = &self.inner.on_registered {
            callback(Err(Error::InterfaceUnregistering));
        }

        let mut slot = self.inner.enter_for_teardown();
        if slot.state.can_transition_to(InterfaceState::Unbound) {
            self.inner.set_state(&mut slot, InterfaceState::Unbound);
        }
        slot.core = Weak::new();
    }

    pub(crate) fn registration_complete(&self, status: Result<()>) {
        let notify = match self.inner.enter() {
            Ok(mut slot) => {
                if slot.state.can_transition_to(InterfaceState::Registered) {
                    if status.is_ok() {
                        self.inner.set_state(&mut slot, InterfaceState::Registered);
                    }
                    true
                } else {
                    warn!(
                        component = %self.component_name(),
                        "Ignoring registration result in state {:?}", slot.state
                    );
                    false
                }
            }
            Err(e) => {
                error!(component = %self.component_name(), "Cannot lock interface: {}", e);
                false
            }
        };

        if notify {
            if let Some(callback) = &self.inner.on_registered {
                callback(status);
            }
        }
    }

    fn accepts_callbacks(&self) -> bool {
        match self.inner.enter() {
            Ok(slot) => slot.state.accepts_callbacks(),
            Err(e) => {
                error!(component = %self.component_name(), "Cannot lock interface: {}", e);
                false
            }
        }
    }

    /// Deliver this interface's desired properties from a twin document
    pub(crate) fn process_twin_update(&self, twin: &TwinSections<'_>) -> Result<()> {
        let Some(callback) = self.inner.property_callback.get() else {
            debug!(
                component = %self.component_name(),
                "No property callback, skipping twin update"
            );
            return Ok(());
        };

        if !self.accepts_callbacks() {
            debug!(component = %self.component_name(), "Interface no longer accepts twin updates");
            return Ok(());
        }

        let key = envelope::interface_key(self.component_name());
        let desired = twin.desired.get(&key).and_then(Value::as_object);
        let reported = twin
            .reported
            .and_then(|r| r.get(&key))
            .and_then(Value::as_object);

        let Some(desired) = desired else {
            return Ok(());
        };
        let desired_version = twin.desired_version();

        for (property_name, property) in desired {
            let Some(value) = property.get("value") else {
                warn!(
                    component = %self.component_name(),
                    "Desired property {} has no value", property_name
                );
                continue;
            };

            let update = PropertyUpdate {
                version: STRUCT_VERSION_1,
                property_name: property_name.clone(),
                reported: reported
                    .and_then(|r| r.get(property_name))
                    .and_then(|p| p.get("value"))
                    .map(Value::to_string),
                desired: value.to_string(),
                desired_version,
            };

            debug!(
                component = %self.component_name(),
                "Invoking property callback for {}", property_name
            );
            callback(&update);
        }

        Ok(())
    }

    /// Offer a command invocation to this interface
    pub(crate) fn invoke_command_if_supported(
        &self,
        method_name: &str,
        payload: &[u8],
    ) -> CommandOutcome {
        let prefix = envelope::command_prefix(self.component_name());
        let Some(command_name) = method_name.strip_prefix(prefix.as_str()) else {
            return CommandOutcome::NotApplicable;
        };

        let Some(callback) = self.inner.command_callback.get() else {
            error!(
                component = %self.component_name(),
                "Interface has no command callback for {}", command_name
            );
            return CommandOutcome::NotApplicable;
        };

        if !self.accepts_callbacks() {
            debug!(component = %self.component_name(), "Interface no longer accepts commands");
            return CommandOutcome::NotApplicable;
        }

        let request = match envelope::parse_command_request(payload) {
            Ok(request) => request,
            Err(_) => return CommandOutcome::Error,
        };

        let request = CommandRequest {
            version: STRUCT_VERSION_1,
            command_name: command_name.to_string(),
            request_data: request.value,
            request_id: request.request_id,
        };

        info!(
            component = %self.component_name(),
            "Invoking command callback for {}", command_name
        );
        let response = callback(&request);

        CommandOutcome::Processed {
            status: response.status,
            payload: response.payload.unwrap_or_else(|| "null".to_string()),
        }
    }

    pub(crate) fn on_send_complete(
        &self,
        status: Result<()>,
        on_complete: Option<CompletionCallback>,
    ) {
        if let Some(callback) = on_complete {
            debug!(
                component = %self.component_name(),
                "Invoking send completion with {:?}", status
            );
            callback(status);
        }
    }
}

impl fmt::Debug for InterfaceClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterfaceClient")
            .field("interface_id", &self.inner.interface_id)
            .field("component_name", &self.inner.component_name)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::ThreadSafeBinding;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn sensor() -> InterfaceClient {
        InterfaceClient::new("urn:contoso:Sensor:1", "sensor", None).unwrap()
    }

    fn bound_sensor() -> InterfaceClient {
        let interface = sensor();
        interface
            .bind_to_core(Weak::new(), &ThreadSafeBinding::new())
            .unwrap();
        interface
    }

    #[test]
    fn legal_transitions() {
        use InterfaceState::*;
        assert!(Created.can_transition_to(Bound));
        assert!(Bound.can_transition_to(Registered));
        assert!(Bound.can_transition_to(Unbound));
        assert!(Registered.can_transition_to(Unbound));
        assert!(Unbound.can_transition_to(PendingDestroy));

        assert!(!Created.can_transition_to(Registered));
        assert!(!Registered.can_transition_to(Bound));
        assert!(!Unbound.can_transition_to(Bound));
        assert!(!PendingDestroy.can_transition_to(Created));
    }

    #[test]
    fn invalid_names_are_rejected() {
        assert_eq!(
            InterfaceClient::new("contoso:Sensor:1", "sensor", None).unwrap_err(),
            Error::InvalidArg
        );
        assert_eq!(
            InterfaceClient::new("urn:contoso:Sensor:1", "sen sor", None).unwrap_err(),
            Error::InvalidArg
        );
    }

    #[test]
    fn callbacks_set_once_before_registration() {
        let interface = sensor();
        interface.set_property_updated_callback(|_| {}).unwrap();
        assert_eq!(
            interface.set_property_updated_callback(|_| {}),
            Err(Error::CallbackAlreadyRegistered)
        );

        let interface = bound_sensor();
        assert_eq!(
            interface.set_command_callback(|_| CommandResponse::empty(200)),
            Err(Error::InterfaceAlreadyRegistered)
        );
    }

    #[test]
    fn bind_only_from_created() {
        let interface = bound_sensor();
        assert_eq!(interface.state(), InterfaceState::Bound);
        assert_eq!(
            interface.bind_to_core(Weak::new(), &ThreadSafeBinding::new()),
            Err(Error::Generic)
        );
    }

    #[test]
    fn sends_fail_by_state() {
        let interface = sensor();
        assert_eq!(
            interface.send_telemetry("t", "1", None),
            Err(Error::InterfaceNotRegistered)
        );

        interface.destroy();
        assert_eq!(
            interface.report_property("p", "1", None, None),
            Err(Error::InterfaceUnregistering)
        );
    }

    #[test]
    fn arguments_are_checked_before_state() {
        let interface = sensor();
        assert_eq!(
            interface.send_telemetry("t", "{not json", None),
            Err(Error::InvalidArg)
        );
        let response = PropertyResponse {
            version: 2,
            response_version: 1,
            status_code: 200,
            status_description: "ok".to_string(),
        };
        assert_eq!(
            interface.report_property("p", "1", Some(&response), None),
            Err(Error::InvalidArg)
        );
    }

    #[test]
    fn registration_failure_notifies_but_stays_bound() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let interface = InterfaceClient::new(
            "urn:contoso:Sensor:1",
            "sensor",
            Some(Box::new(move |status| {
                assert_eq!(status, Err(Error::Generic));
                seen.fetch_add(1, Ordering::SeqCst);
            })),
        )
        .unwrap();
        interface
            .bind_to_core(Weak::new(), &ThreadSafeBinding::new())
            .unwrap();

        interface.registration_complete(Err(Error::Generic));

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(interface.state(), InterfaceState::Bound);
    }

    #[test]
    fn unbind_notifies_unregistering() {
        let statuses = Arc::new(Mutex::new(Vec::new()));
        let seen = statuses.clone();
        let interface = InterfaceClient::new(
            "urn:contoso:Sensor:1",
            "sensor",
            Some(Box::new(move |status| seen.lock().push(status))),
        )
        .unwrap();
        interface
            .bind_to_core(Weak::new(), &ThreadSafeBinding::new())
            .unwrap();
        interface.registration_complete(Ok(()));
        interface.unbind_from_core();

        assert_eq!(
            *statuses.lock(),
            vec![Ok(()), Err(Error::InterfaceUnregistering)]
        );
        assert_eq!(interface.state(), InterfaceState::Unbound);
    }

    #[test]
    fn destroyed_interface_is_released_silently() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let interface = InterfaceClient::new(
            "urn:contoso:Sensor:1",
            "sensor",
            Some(Box::new(move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
            })),
        )
        .unwrap();
        interface
            .bind_to_core(Weak::new(), &ThreadSafeBinding::new())
            .unwrap();
        interface.destroy();
        interface.unbind_from_core();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(interface.state(), InterfaceState::PendingDestroy);
    }

    #[test]
    fn full_twin_delivers_desired_with_reported() {
        let updates = Arc::new(Mutex::new(Vec::new()));
        let seen = updates.clone();
        let interface = sensor();
        interface
            .set_property_updated_callback(move |u| seen.lock().push(u.clone()))
            .unwrap();
        interface
            .bind_to_core(Weak::new(), &ThreadSafeBinding::new())
            .unwrap();

        let twin = json!({
            "desired": {
                "$version": 5,
                "$iotin:sensor": {
                    "brightness": {"value": 42},
                    "name": {"value": "lamp"}
                },
                "$iotin:other": {"x": {"value": 1}}
            },
            "reported": {
                "$iotin:sensor": {
                    "brightness": {"value": 10},
                    "only_reported": {"value": true}
                }
            }
        });
        let sections = TwinSections::split(&twin, true).unwrap();
        interface.process_twin_update(&sections).unwrap();

        let updates = updates.lock();
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].property_name, "brightness");
        assert_eq!(updates[0].desired, "42");
        assert_eq!(updates[0].reported.as_deref(), Some("10"));
        assert_eq!(updates[0].desired_version, 5);
        assert_eq!(updates[1].property_name, "name");
        assert_eq!(updates[1].desired, r#""lamp""#);
        assert_eq!(updates[1].reported, None);
    }

    #[test]
    fn command_routing() {
        let interface = sensor();
        interface
            .set_command_callback(|request| {
                if request.command_name == "blink" {
                    CommandResponse::new(200, request.request_data.clone())
                } else {
                    CommandResponse::empty(200)
                }
            })
            .unwrap();
        interface
            .bind_to_core(Weak::new(), &ThreadSafeBinding::new())
            .unwrap();

        let payload = br#"{"commandRequest":{"requestId":"1","value":{"times":3}}}"#;
        assert_eq!(
            interface.invoke_command_if_supported("$iotin:sensor*blink", payload),
            CommandOutcome::Processed {
                status: 200,
                payload: r#"{"times":3}"#.to_string()
            }
        );
        assert_eq!(
            interface.invoke_command_if_supported("$iotin:sensor*reset", payload),
            CommandOutcome::Processed {
                status: 200,
                payload: "null".to_string()
            }
        );
        assert_eq!(
            interface.invoke_command_if_supported("$iotin:sensor2*blink", payload),
            CommandOutcome::NotApplicable
        );
        assert_eq!(
            interface.invoke_command_if_supported("$iotin:sensor*blink", b"{}"),
            CommandOutcome::Error
        );
    }
}
