//! Client core
//!
//! [`ClientCore`] owns the transport, the concurrency binding and the bound
//! interfaces. Every transport callback funnels through it before reaching
//! an interface.
//!
//! ## Callback discipline
//!
//! Each transport-originated callback opens a [`CallbackScope`]: under the
//! core lock it fails fast when the core is shutting down, otherwise it
//! counts itself as in flight. The scope's drop takes the lock again and
//! uncounts. Destroy flips the core to shutting down and then waits for the
//! count to reach zero, so once it returns no callback is running and none
//! can start.
//!
//! Application callbacks never run while the core lock is held. Fan-out
//! works on a snapshot of the interface list.

use crate::binding::{Guarded, Section};
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::interface::envelope::{self, MODEL_DISCOVERY_INTERFACE_NAME, SDK_INFORMATION_INTERFACE_NAME};
use crate::interface::naming;
use crate::interface::{CommandOutcome, CompletionCallback, InterfaceClient};
use crate::interface_list::InterfaceList;
use crate::traits::{
    ConcurrencyBinding, MethodHandler, MethodResponse, SendConfirmation, TelemetryMessage,
    TransportBinding, TwinUpdateHandler, TwinUpdateState,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Status answered for a command no interface handles
pub const COMMAND_NOT_IMPLEMENTED_STATUS: i32 = 501;

/// Status answered for a command that could not be run
pub const COMMAND_INTERNAL_ERROR_STATUS: i32 = 500;

const METHOD_NOT_PRESENT_BODY: &str = "\"Method not present\"";
const INTERNAL_ERROR_BODY: &str = "\"Internal error\"";

/// Reported-state status the service uses for a malformed document
const BAD_REQUEST_STATUS: i32 = 400;

/// Whether the core accepts work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Accepting requests and callbacks
    Running,
    /// Being destroyed; everything fails fast
    ShuttingDown,
}

/// Where the one-shot registration stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationStatus {
    /// Nothing registered; a failed registration returns here
    Idle,
    /// Announcement sent, waiting for the acknowledgement
    Registering,
    /// Registered with the service
    Registered,
}

/// Lifecycle events emitted on the optional event channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// A registration announcement was sent
    RegistrationStarted { interface_count: usize },
    /// The registration acknowledgement was processed
    RegistrationCompleted { status: Result<()> },
    /// An interface was released by the client
    InterfaceUnbound { component: String },
    /// A send was refused before reaching the transport
    SendRejected { reason: Error },
    /// Destroy began
    ShutdownStarted,
    /// Destroy finished
    ShutdownCompleted { drained_reports: usize },
}

struct PendingReport {
    interface: InterfaceClient,
    on_complete: Option<CompletionCallback>,
}

struct CoreState {
    lifecycle: Lifecycle,
    registration: RegistrationStatus,
    active_callbacks: usize,
    pending_reports: HashMap<u64, PendingReport>,
    next_report_id: u64,
    method_callback_installed: bool,
    twin_callback_installed: bool,
    on_registered: Option<CompletionCallback>,
    interfaces: InterfaceList,
}

pub(crate) struct CoreShared {
    transport: Box<dyn TransportBinding>,
    binding: Box<dyn ConcurrencyBinding>,
    config: ClientConfig,
    state: Guarded<CoreState>,
    events: Option<mpsc::Sender<ClientEvent>>,
    self_ref: Weak<CoreShared>,
}

/// Marks one transport callback as in flight until dropped
struct CallbackScope<'a> {
    core: &'a CoreShared,
}

impl Drop for CallbackScope<'_> {
    fn drop(&mut self) {
        let mut state = self.core.enter_for_teardown();
        state.active_callbacks = state.active_callbacks.saturating_sub(1);
    }
}

/// Map a telemetry confirmation to the status handed to the application
pub fn confirmation_status(confirmation: SendConfirmation) -> Result<()> {
    match confirmation {
        SendConfirmation::Ok => Ok(()),
        SendConfirmation::BecauseDestroy => Err(Error::HandleDestroyed),
        SendConfirmation::MessageTimeout => Err(Error::Timeout),
        SendConfirmation::Error => Err(Error::Generic),
    }
}

/// Map a reported-state status code to the status handed to the application
pub fn reported_status(status_code: i32) -> Result<()> {
    if status_code < 300 {
        Ok(())
    } else {
        Err(Error::Generic)
    }
}

/// Wire response for a command no interface processed
fn command_error_response(outcome: &CommandOutcome) -> MethodResponse {
    match outcome {
        CommandOutcome::NotApplicable => MethodResponse {
            status: COMMAND_NOT_IMPLEMENTED_STATUS,
            payload: METHOD_NOT_PRESENT_BODY.as_bytes().to_vec(),
        },
        _ => MethodResponse {
            status: COMMAND_INTERNAL_ERROR_STATUS,
            payload: INTERNAL_ERROR_BODY.as_bytes().to_vec(),
        },
    }
}

impl CoreShared {
    fn enter_for_teardown(&self) -> Section<'_, CoreState> {
        match self.state.enter() {
            Ok(section) => section,
            Err(e) => {
                error!("Unable to obtain client lock: {}", e);
                self.state.enter_unbound()
            }
        }
    }

    fn emit(&self, event: ClientEvent) {
        let Some(events) = &self.events else {
            return;
        };
        match events.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!("Event channel full, dropping {:?}", event);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("Event receiver dropped");
            }
        }
    }

    fn begin_callback(&self) -> Result<CallbackScope<'_>> {
        let mut state = self.state.enter()?;
        if state.lifecycle == Lifecycle::ShuttingDown {
            warn!("Client is being destroyed, skipping callback processing");
            return Err(Error::ShuttingDown);
        }
        state.active_callbacks += 1;
        Ok(CallbackScope { core: self })
    }

    fn interfaces(&self) -> Result<InterfaceList> {
        Ok(self.state.enter()?.interfaces.clone())
    }

    pub(crate) fn send_telemetry(
        &self,
        interface: &InterfaceClient,
        message: TelemetryMessage,
        on_complete: Option<CompletionCallback>,
    ) -> Result<()> {
        let state = self.state.enter()?;
        if state.lifecycle == Lifecycle::ShuttingDown {
            warn!("Client is shutting down, refusing telemetry");
            self.emit(ClientEvent::SendRejected {
                reason: Error::ShuttingDown,
            });
            return Err(Error::ShuttingDown);
        }

        let core = self.self_ref.clone();
        let interface = interface.clone();
        self.transport
            .send_event(
                message,
                Box::new(move |confirmation| match core.upgrade() {
                    Some(core) => core.on_telemetry_complete(&interface, confirmation, on_complete),
                    None => debug!("Client gone, dropping telemetry completion"),
                }),
            )
            .map_err(|e| {
                error!("Transport refused telemetry: {}", e);
                Error::Generic
            })
    }

    pub(crate) fn report_property_status(
        &self,
        interface: &InterfaceClient,
        payload: Vec<u8>,
        on_complete: Option<CompletionCallback>,
    ) -> Result<()> {
        if payload.is_empty() {
            error!("Reported property payload cannot be empty");
            return Err(Error::InvalidArg);
        }

        let mut state = self.state.enter()?;
        if state.lifecycle == Lifecycle::ShuttingDown {
            warn!("Client is shutting down, refusing reported property");
            self.emit(ClientEvent::SendRejected {
                reason: Error::ShuttingDown,
            });
            return Err(Error::ShuttingDown);
        }

        let id = state.next_report_id;
        state.next_report_id += 1;
        state.pending_reports.insert(
            id,
            PendingReport {
                interface: interface.clone(),
                on_complete,
            },
        );

        let core = self.self_ref.clone();
        let sent = self.transport.send_reported_state(
            &payload,
            Box::new(move |status_code| match core.upgrade() {
                Some(core) => core.on_reported_complete(id, status_code),
                None => debug!("Client gone, dropping reported property completion"),
            }),
        );

        if let Err(e) = sent {
            let rejected = state.pending_reports.remove(&id);
            drop(state);
            drop(rejected);
            error!("Transport refused reported property: {}", e);
            return Err(Error::Generic);
        }
        Ok(())
    }

    fn on_telemetry_complete(
        &self,
        interface: &InterfaceClient,
        confirmation: SendConfirmation,
        on_complete: Option<CompletionCallback>,
    ) {
        debug!("Processing telemetry completion {:?}", confirmation);
        let Ok(_scope) = self.begin_callback() else {
            return;
        };

        match self.interfaces() {
            Ok(interfaces) => {
                let _ = interfaces.process_telemetry_complete(
                    interface,
                    confirmation_status(confirmation),
                    on_complete,
                );
            }
            Err(e) => error!("Cannot read interfaces: {}", e),
        }
    }

    fn on_reported_complete(&self, id: u64, status_code: i32) {
        debug!("Processing reported state completion, status={}", status_code);
        if status_code == BAD_REQUEST_STATUS {
            error!("Reported property failed with a {} status code", status_code);
            error!("This typically but not always means the JSON the application sent was invalid");
        }

        let Ok(_scope) = self.begin_callback() else {
            return;
        };

        let (pending, interfaces) = match self.state.enter() {
            Ok(mut state) => (state.pending_reports.remove(&id), state.interfaces.clone()),
            Err(e) => {
                error!("Cannot read interfaces: {}", e);
                return;
            }
        };

        let Some(pending) = pending else {
            debug!("Reported property {} already released", id);
            return;
        };

        let _ = interfaces.process_reported_complete(
            &pending.interface,
            reported_status(status_code),
            pending.on_complete,
        );
    }

    fn on_twin_update(&self, update_state: TwinUpdateState, payload: &[u8]) {
        debug!(
            "Twin callback, state={:?}, size={}",
            update_state,
            payload.len()
        );
        let Ok(_scope) = self.begin_callback() else {
            return;
        };

        let full_snapshot = update_state == TwinUpdateState::Complete;
        match self.interfaces() {
            Ok(interfaces) => {
                if let Err(e) = interfaces.process_twin(full_snapshot, payload) {
                    error!("Cannot process twin update: {}", e);
                }
            }
            Err(e) => error!("Cannot read interfaces: {}", e),
        }
    }

    fn on_method(&self, method_name: &str, payload: &[u8]) -> MethodResponse {
        info!("Processing command {}", method_name);
        let Ok(_scope) = self.begin_callback() else {
            return command_error_response(&CommandOutcome::Error);
        };

        let outcome = match self.interfaces() {
            Ok(interfaces) => interfaces.invoke_command(method_name, payload),
            Err(e) => {
                error!("Cannot read interfaces: {}", e);
                CommandOutcome::Error
            }
        };

        match outcome {
            CommandOutcome::Processed { status, payload } => MethodResponse {
                status,
                payload: payload.into_bytes(),
            },
            other => {
                error!(
                    "Command {} is not handled by any registered interface",
                    method_name
                );
                command_error_response(&other)
            }
        }
    }

    /// Install the command and twin handlers, each at most once per client
    fn install_callbacks(&self, state: &mut CoreState) -> Result<()> {
        if !state.method_callback_installed {
            let core = self.self_ref.clone();
            let handler: MethodHandler =
                Arc::new(move |method_name: &str, payload: &[u8]| match core.upgrade() {
                    Some(core) => core.on_method(method_name, payload),
                    None => command_error_response(&CommandOutcome::Error),
                });
            self.transport.set_method_callback(handler).map_err(|e| {
                error!("Cannot bind to command callbacks: {}", e);
                Error::Generic
            })?;
            state.method_callback_installed = true;
        }

        if !state.twin_callback_installed {
            let core = self.self_ref.clone();
            let handler: TwinUpdateHandler =
                Arc::new(move |update_state: TwinUpdateState, payload: &[u8]| {
                    if let Some(core) = core.upgrade() {
                        core.on_twin_update(update_state, payload);
                    }
                });
            self.transport.set_twin_callback(handler).map_err(|e| {
                error!("Cannot bind to twin callbacks: {}", e);
                Error::Generic
            })?;
            state.twin_callback_installed = true;
        }

        Ok(())
    }

    /// Best effort; the outcome is only logged
    fn send_sdk_info(&self) {
        let payload = match envelope::sdk_info_report(&self.config.sdk_info) {
            Ok(payload) => payload,
            Err(e) => {
                error!("Cannot build SDK information: {}", e);
                return;
            }
        };

        info!(
            "Sending reported state for sdkInfo={}",
            String::from_utf8_lossy(&payload)
        );
        let sent = self.transport.send_reported_state(
            &payload,
            Box::new(|status_code| debug!("SDK information reported, status={}", status_code)),
        );
        if let Err(e) = sent {
            warn!("Cannot report SDK information: {}", e);
        }
    }

    fn on_registration_ack(&self, confirmation: SendConfirmation) {
        info!("Processing registration acknowledgement {:?}", confirmation);
        let Ok(_scope) = self.begin_callback() else {
            return;
        };

        let mut status = if confirmation == SendConfirmation::Ok {
            Ok(())
        } else {
            Err(Error::Generic)
        };

        let (interfaces, on_registered) = {
            let mut state = self.enter_for_teardown();
            if status.is_ok() {
                info!("Interfaces registered, binding command and twin callbacks");
                status = self.install_callbacks(&mut state);
                if status.is_ok() && self.config.report_sdk_info {
                    self.send_sdk_info();
                }
            }

            state.registration = if status.is_ok() {
                RegistrationStatus::Registered
            } else {
                RegistrationStatus::Idle
            };
            (state.interfaces.clone(), state.on_registered.take())
        };

        interfaces.registration_complete(status.clone());
        if let Some(callback) = on_registered {
            callback(status.clone());
        }
        self.emit(ClientEvent::RegistrationCompleted { status });
    }

    fn register_interfaces(
        &self,
        capability_model_id: &str,
        interfaces: &[InterfaceClient],
        on_complete: Option<CompletionCallback>,
    ) -> Result<()> {
        naming::validate_name(capability_model_id, true).map_err(|e| {
            error!("Invalid capability model id {}", capability_model_id);
            e
        })?;
        check_unique(interfaces)?;

        let current = {
            let mut state = self.state.enter()?;
            if state.lifecycle == Lifecycle::ShuttingDown {
                return Err(Error::ShuttingDown);
            }
            match state.registration {
                RegistrationStatus::Registering => {
                    error!("Cannot register while a registration is pending");
                    return Err(Error::RegistrationPending);
                }
                RegistrationStatus::Registered => {
                    error!("Cannot register because interfaces are already registered");
                    return Err(Error::InterfaceAlreadyRegistered);
                }
                RegistrationStatus::Idle => {}
            }
            state.registration = RegistrationStatus::Registering;
            state.interfaces.clone()
        };

        let bound = match InterfaceList::bind_interfaces(
            interfaces,
            &current,
            &self.self_ref,
            self.binding.as_ref(),
        ) {
            Ok(bound) => bound,
            Err(e) => {
                self.enter_for_teardown().registration = RegistrationStatus::Idle;
                return Err(e);
            }
        };
        let mut newly_bound = bound.not_in(&current);

        let message = match bound.registration_message(capability_model_id) {
            Ok(message) => message,
            Err(e) => {
                self.enter_for_teardown().registration = RegistrationStatus::Idle;
                newly_bound.unbind_interfaces();
                return Err(e);
            }
        };

        let interface_count = bound.len();
        let sent = {
            let mut state = self.enter_for_teardown();
            state.interfaces = bound.clone();
            state.on_registered = on_complete;

            let core = self.self_ref.clone();
            let sent = self.transport.send_event(
                message,
                Box::new(move |confirmation| {
                    if let Some(core) = core.upgrade() {
                        core.on_registration_ack(confirmation);
                    }
                }),
            );

            if sent.is_err() {
                state.interfaces = current.clone();
                state.registration = RegistrationStatus::Idle;
                state.on_registered = None;
            }
            sent
        };

        if let Err(e) = sent {
            error!("Cannot send registration announcement: {}", e);
            self.release(&mut newly_bound);
            return Err(Error::Generic);
        }

        info!("Queued registration of {} interfaces", interface_count);
        self.release(&mut current.not_in(&bound));
        self.emit(ClientEvent::RegistrationStarted { interface_count });
        Ok(())
    }

    fn release(&self, interfaces: &mut InterfaceList) {
        for component in interfaces.component_names() {
            self.emit(ClientEvent::InterfaceUnbound { component });
        }
        interfaces.unbind_interfaces();
    }

    fn shutdown(&self) {
        let mut interfaces = {
            let mut state = self.enter_for_teardown();
            if state.lifecycle == Lifecycle::ShuttingDown {
                return;
            }
            state.lifecycle = Lifecycle::ShuttingDown;
            self.emit(ClientEvent::ShutdownStarted);

            while state.active_callbacks > 0 {
                drop(state);
                self.binding.sleep(self.config.callback_poll_interval());
                state = self.enter_for_teardown();
            }

            std::mem::take(&mut state.interfaces)
        };

        self.release(&mut interfaces);

        // No transport callback can run once this returns.
        self.transport.destroy();

        let drained = std::mem::take(&mut self.enter_for_teardown().pending_reports);
        let drained_reports = drained.len();
        drop(drained);

        info!(
            "Client destroyed, dropped {} pending reported properties",
            drained_reports
        );
        self.emit(ClientEvent::ShutdownCompleted { drained_reports });
    }
}

/// Reject handle or component name repeats, including the built-in names
fn check_unique(interfaces: &[InterfaceClient]) -> Result<()> {
    let mut names: HashSet<&str> = HashSet::new();
    names.insert(MODEL_DISCOVERY_INTERFACE_NAME);
    names.insert(SDK_INFORMATION_INTERFACE_NAME);

    for (index, interface) in interfaces.iter().enumerate() {
        if interfaces[..index].iter().any(|i| i.same_as(interface)) {
            error!(
                component = %interface.component_name(),
                "Interface handle passed more than once"
            );
            return Err(Error::DuplicateComponents);
        }
        if !names.insert(interface.component_name()) {
            error!(
                component = %interface.component_name(),
                "Component name used more than once"
            );
            return Err(Error::DuplicateComponents);
        }
    }
    Ok(())
}

/// The orchestrating Digital Twin client
///
/// Dropping the core destroys it: see [`ClientCore::destroy`].
pub struct ClientCore {
    shared: Arc<CoreShared>,
}

impl ClientCore {
    /// Create a client core that owns `transport` and `binding`
    ///
    /// On failure the transport is destroyed before returning.
    pub fn new(
        transport: Box<dyn TransportBinding>,
        binding: Box<dyn ConcurrencyBinding>,
        config: ClientConfig,
    ) -> Result<Self> {
        Self::build(transport, binding, config, None)
    }

    /// Like [`ClientCore::new`], also returning the lifecycle event receiver
    pub fn with_events(
        transport: Box<dyn TransportBinding>,
        binding: Box<dyn ConcurrencyBinding>,
        config: ClientConfig,
    ) -> Result<(Self, mpsc::Receiver<ClientEvent>)> {
        let (tx, rx) = mpsc::channel(config.event_channel_capacity.max(1));
        let core = Self::build(transport, binding, config, Some(tx))?;
        Ok((core, rx))
    }

    fn build(
        transport: Box<dyn TransportBinding>,
        binding: Box<dyn ConcurrencyBinding>,
        config: ClientConfig,
        events: Option<mpsc::Sender<ClientEvent>>,
    ) -> Result<Self> {
        if let Err(e) = config.validate() {
            transport.destroy();
            return Err(e);
        }

        let lock = match binding.create_lock() {
            Ok(lock) => lock,
            Err(e) => {
                error!("Failed initializing client lock: {}", e);
                transport.destroy();
                return Err(e);
            }
        };

        let shared = Arc::new_cyclic(|self_ref| CoreShared {
            transport,
            binding,
            config,
            state: Guarded::new(
                lock,
                CoreState {
                    lifecycle: Lifecycle::Running,
                    registration: RegistrationStatus::Idle,
                    active_callbacks: 0,
                    pending_reports: HashMap::new(),
                    next_report_id: 0,
                    method_callback_installed: false,
                    twin_callback_installed: false,
                    on_registered: None,
                    interfaces: InterfaceList::new(),
                },
            ),
            events,
            self_ref: self_ref.clone(),
        });

        debug!("Client core created");
        Ok(Self { shared })
    }

    /// Bind `interfaces` and announce them under `capability_model_id`
    ///
    /// Registration is one-shot: once it succeeds, further calls fail with
    /// [`Error::InterfaceAlreadyRegistered`]. A failed acknowledgement
    /// returns the client to idle so the call can be retried. `on_complete`
    /// receives the acknowledgement status after every interface has been
    /// told.
    pub fn register_interfaces(
        &self,
        capability_model_id: &str,
        interfaces: &[InterfaceClient],
        on_complete: Option<CompletionCallback>,
    ) -> Result<()> {
        self.shared
            .register_interfaces(capability_model_id, interfaces, on_complete)
    }

    /// Drive a cooperative transport
    pub fn do_work(&self) {
        self.shared.transport.do_work();
    }

    /// Current registration status
    pub fn registration_status(&self) -> RegistrationStatus {
        self.shared.enter_for_teardown().registration
    }

    /// Current lifecycle state
    pub fn lifecycle(&self) -> Lifecycle {
        self.shared.enter_for_teardown().lifecycle
    }

    /// Number of reported properties waiting for their completion
    pub fn pending_reports(&self) -> usize {
        self.shared.enter_for_teardown().pending_reports.len()
    }

    /// Destroy the client
    ///
    /// Blocks until no transport callback is running, unbinds every
    /// interface, destroys the transport and drops undelivered reported
    /// property completions without invoking them. Must not be called from
    /// inside a callback of this client.
    pub fn destroy(self) {
        drop(self);
    }
}

impl Drop for ClientCore {
    fn drop(&mut self) {
        self.shared.shutdown();
    }
}

impl std::fmt::Debug for ClientCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCore").finish_non_exhaustive()
    }
}
