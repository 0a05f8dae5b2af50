//! Test doubles and common utilities for architecture contract tests
//!
//! This module provides a stub transport that records everything the core
//! hands it and lets the test decide when, and how, each asynchronous
//! completion and callback fires.

#![allow(dead_code)]

use dtwin_core::config::ClientConfig;
use dtwin_core::error::{Error, Result};
use dtwin_core::interface::{CommandResponse, InterfaceClient, PropertyUpdate};
use dtwin_core::traits::{
    MethodHandler, MethodResponse, ReportedStateCompletion, SendCompletion, SendConfirmation,
    TelemetryMessage, TransportBinding, TwinUpdateHandler, TwinUpdateState,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

type Deferred = Box<dyn FnOnce(&StubTransport) + Send>;

#[derive(Default)]
struct StubState {
    messages: Vec<TelemetryMessage>,
    reported: Vec<Vec<u8>>,
    send_completions: VecDeque<SendCompletion>,
    reported_completions: VecDeque<ReportedStateCompletion>,
    twin_handler: Option<TwinUpdateHandler>,
    method_handler: Option<MethodHandler>,
    deferred: VecDeque<Deferred>,
}

/// A transport that never completes anything on its own
///
/// Clones share all state, so a test keeps one handle while the core owns
/// another.
#[derive(Clone, Default)]
pub struct StubTransport {
    /// Call counter for send_event()
    send_event_count: Arc<AtomicUsize>,
    /// Call counter for send_reported_state()
    reported_count: Arc<AtomicUsize>,
    /// Call counter for set_twin_callback()
    twin_install_count: Arc<AtomicUsize>,
    /// Call counter for set_method_callback()
    method_install_count: Arc<AtomicUsize>,
    /// Call counter for do_work()
    do_work_count: Arc<AtomicUsize>,
    /// Call counter for destroy()
    destroy_count: Arc<AtomicUsize>,
    fail_send_event: Arc<AtomicBool>,
    fail_reported: Arc<AtomicBool>,
    fail_twin_install: Arc<AtomicBool>,
    fail_url_encoding: Arc<AtomicBool>,
    state: Arc<Mutex<StubState>>,
}

impl StubTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a StubTransport that shares counters with an existing one
    pub fn sharing_counters_with(other: &Self) -> Self {
        other.clone()
    }

    /// A boxed handle for the core, sharing state with `self`
    pub fn boxed(&self) -> Box<dyn TransportBinding> {
        Box::new(Self::sharing_counters_with(self))
    }

    pub fn send_event_count(&self) -> usize {
        self.send_event_count.load(Ordering::SeqCst)
    }

    pub fn reported_count(&self) -> usize {
        self.reported_count.load(Ordering::SeqCst)
    }

    pub fn twin_install_count(&self) -> usize {
        self.twin_install_count.load(Ordering::SeqCst)
    }

    pub fn method_install_count(&self) -> usize {
        self.method_install_count.load(Ordering::SeqCst)
    }

    pub fn do_work_count(&self) -> usize {
        self.do_work_count.load(Ordering::SeqCst)
    }

    pub fn destroy_count(&self) -> usize {
        self.destroy_count.load(Ordering::SeqCst)
    }

    pub fn fail_send_event(&self, fail: bool) {
        self.fail_send_event.store(fail, Ordering::SeqCst);
    }

    pub fn fail_reported(&self, fail: bool) {
        self.fail_reported.store(fail, Ordering::SeqCst);
    }

    pub fn fail_twin_install(&self, fail: bool) {
        self.fail_twin_install.store(fail, Ordering::SeqCst);
    }

    pub fn fail_url_encoding(&self, fail: bool) {
        self.fail_url_encoding.store(fail, Ordering::SeqCst);
    }

    /// Messages passed to send_event(), in order
    pub fn messages(&self) -> Vec<TelemetryMessage> {
        self.state.lock().messages.clone()
    }

    /// Payloads passed to send_reported_state(), as text
    pub fn reported(&self) -> Vec<String> {
        self.state
            .lock()
            .reported
            .iter()
            .map(|r| String::from_utf8_lossy(r).into_owned())
            .collect()
    }

    pub fn pending_sends(&self) -> usize {
        self.state.lock().send_completions.len()
    }

    pub fn pending_reports(&self) -> usize {
        self.state.lock().reported_completions.len()
    }

    /// Fire the oldest outstanding send_event() completion
    pub fn complete_next_send(&self, confirmation: SendConfirmation) -> bool {
        let completion = self.state.lock().send_completions.pop_front();
        match completion {
            Some(completion) => {
                completion(confirmation);
                true
            }
            None => false,
        }
    }

    /// Fire the oldest outstanding send_reported_state() completion
    pub fn complete_next_report(&self, status_code: i32) -> bool {
        let completion = self.state.lock().reported_completions.pop_front();
        match completion {
            Some(completion) => {
                completion(status_code);
                true
            }
            None => false,
        }
    }

    /// Acknowledge the registration announcement (the first outstanding send)
    pub fn ack_registration(&self, confirmation: SendConfirmation) {
        assert!(
            self.complete_next_send(confirmation),
            "no registration announcement outstanding"
        );
    }

    /// Push a twin document through the installed handler
    pub fn deliver_twin(&self, update_state: TwinUpdateState, payload: &str) -> bool {
        let handler = self.state.lock().twin_handler.clone();
        match handler {
            Some(handler) => {
                handler(update_state, payload.as_bytes());
                true
            }
            None => false,
        }
    }

    /// Invoke a command through the installed handler
    pub fn invoke_method(&self, method_name: &str, payload: &str) -> Option<MethodResponse> {
        let handler = self.state.lock().method_handler.clone();
        handler.map(|handler| handler(method_name, payload.as_bytes()))
    }

    /// Run `work` on the next do_work() call
    pub fn defer(&self, work: impl FnOnce(&StubTransport) + Send + 'static) {
        self.state.lock().deferred.push_back(Box::new(work));
    }
}

impl TransportBinding for StubTransport {
    fn send_event(&self, message: TelemetryMessage, on_complete: SendCompletion) -> Result<()> {
        self.send_event_count.fetch_add(1, Ordering::SeqCst);
        if self.fail_send_event.load(Ordering::SeqCst) {
            return Err(Error::Generic);
        }
        let mut state = self.state.lock();
        state.messages.push(message);
        state.send_completions.push_back(on_complete);
        Ok(())
    }

    fn set_twin_callback(&self, handler: TwinUpdateHandler) -> Result<()> {
        self.twin_install_count.fetch_add(1, Ordering::SeqCst);
        if self.fail_twin_install.load(Ordering::SeqCst) {
            return Err(Error::Generic);
        }
        self.state.lock().twin_handler = Some(handler);
        Ok(())
    }

    fn send_reported_state(
        &self,
        payload: &[u8],
        on_complete: ReportedStateCompletion,
    ) -> Result<()> {
        self.reported_count.fetch_add(1, Ordering::SeqCst);
        if self.fail_reported.load(Ordering::SeqCst) {
            return Err(Error::Generic);
        }
        let mut state = self.state.lock();
        state.reported.push(payload.to_vec());
        state.reported_completions.push_back(on_complete);
        Ok(())
    }

    fn set_method_callback(&self, handler: MethodHandler) -> Result<()> {
        self.method_install_count.fetch_add(1, Ordering::SeqCst);
        self.state.lock().method_handler = Some(handler);
        Ok(())
    }

    fn do_work(&self) {
        self.do_work_count.fetch_add(1, Ordering::SeqCst);
        let deferred: Vec<Deferred> = self.state.lock().deferred.drain(..).collect();
        for work in deferred {
            work(self);
        }
    }

    fn destroy(&self) {
        self.destroy_count.fetch_add(1, Ordering::SeqCst);
    }

    fn enable_url_encoding(&self) -> Result<()> {
        if self.fail_url_encoding.load(Ordering::SeqCst) {
            return Err(Error::Generic);
        }
        Ok(())
    }
}

/// Registration statuses seen by one interface
#[derive(Clone, Default)]
pub struct StatusLog {
    statuses: Arc<Mutex<Vec<Result<()>>>>,
}

impl StatusLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn statuses(&self) -> Vec<Result<()>> {
        self.statuses.lock().clone()
    }

    /// A completion that records into this log
    pub fn completion(&self) -> Box<dyn FnOnce(Result<()>) + Send> {
        let statuses = self.statuses.clone();
        Box::new(move |status| statuses.lock().push(status))
    }
}

/// Create an interface `urn:contoso:<Name>:1` whose registration callback
/// records into the returned log
pub fn interface(component_name: &str) -> (InterfaceClient, StatusLog) {
    let log = StatusLog::new();
    let statuses = log.statuses.clone();
    let interface = InterfaceClient::new(
        &format!("urn:contoso:{}:1", component_name),
        component_name,
        Some(Box::new(move |status| statuses.lock().push(status))),
    )
    .expect("valid interface names");
    (interface, log)
}

/// Create an interface whose property updates are recorded
pub fn interface_with_properties(
    component_name: &str,
) -> (InterfaceClient, Arc<Mutex<Vec<PropertyUpdate>>>) {
    let (interface, _) = interface(component_name);
    let updates = Arc::new(Mutex::new(Vec::new()));
    let seen = updates.clone();
    interface
        .set_property_updated_callback(move |update| seen.lock().push(update.clone()))
        .expect("property callback installs");
    (interface, updates)
}

/// Create an interface answering every command with `status` and `body`
pub fn interface_with_commands(
    component_name: &str,
    status: i32,
    body: Option<&'static str>,
) -> (InterfaceClient, Arc<AtomicUsize>) {
    let (interface, _) = interface(component_name);
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = calls.clone();
    interface
        .set_command_callback(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
            match body {
                Some(body) => CommandResponse::new(status, body),
                None => CommandResponse::empty(status),
            }
        })
        .expect("command callback installs");
    (interface, calls)
}

/// Minimal configuration: no SDK information report, fast destroy polling
pub fn minimal_config() -> ClientConfig {
    ClientConfig {
        callback_poll_interval_ms: 1,
        report_sdk_info: false,
        ..ClientConfig::default()
    }
}

pub const CAPABILITY_MODEL_ID: &str = "urn:contoso:SampleDevice:1";

/// Command invocation envelope
pub fn command_payload(request_id: &str, value: &str) -> String {
    format!(
        r#"{{"commandRequest":{{"requestId":"{}","value":{}}}}}"#,
        request_id, value
    )
}
