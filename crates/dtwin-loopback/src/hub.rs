//! The service side of a loopback connection
//!
//! A [`LoopbackHub`] stands in for the twin service. It records what the
//! device sends, decides how sends are acknowledged, and pushes twin
//! documents and command invocations back down.

use dtwin_core::config::LoopbackMode;
use dtwin_core::traits::{
    MethodHandler, MethodResponse, ReportedStateCompletion, SendCompletion, SendConfirmation,
    TelemetryMessage, TwinUpdateHandler, TwinUpdateState,
};
use dtwin_core::{Error, Result};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, warn};

/// Status the hub answers reported-state updates with by default
pub const DEFAULT_REPORTED_STATUS: i32 = 204;

/// Something the device sent to the hub
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// A telemetry-like message
    Telemetry(TelemetryMessage),
    /// A reported-state document
    ReportedState(Vec<u8>),
}

pub(crate) enum Work {
    Telemetry {
        completion: SendCompletion,
        confirmation: SendConfirmation,
    },
    Reported {
        completion: ReportedStateCompletion,
        status: i32,
    },
    Twin {
        update_state: TwinUpdateState,
        payload: Vec<u8>,
    },
    Method {
        method_name: String,
        payload: Vec<u8>,
        reply: oneshot::Sender<MethodResponse>,
    },
}

#[derive(Clone)]
pub(crate) struct Dispatch {
    pub(crate) mode: LoopbackMode,
    pub(crate) runtime: Option<Handle>,
    pub(crate) ack_latency: Duration,
}

struct HubState {
    dispatch: Option<Dispatch>,
    destroyed: bool,
    in_flight: usize,
    queue: VecDeque<Work>,
    telemetry: Vec<TelemetryMessage>,
    reported: Vec<Vec<u8>>,
    twin_handler: Option<TwinUpdateHandler>,
    method_handler: Option<MethodHandler>,
    confirmation: SendConfirmation,
    reported_status: i32,
    reject_sends: bool,
    url_encoding: bool,
    subscribers: Vec<mpsc::UnboundedSender<Outbound>>,
}

pub(crate) struct HubInner {
    state: Mutex<HubState>,
    idle: Condvar,
}

/// In-process stand-in for the twin service
///
/// Cloning gives another handle to the same hub.
#[derive(Clone)]
pub struct LoopbackHub {
    pub(crate) inner: Arc<HubInner>,
}

impl Default for LoopbackHub {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackHub {
    /// Create a hub with no transport attached
    pub fn new() -> Self {
        Self {
            inner: Arc::new(HubInner {
                state: Mutex::new(HubState {
                    dispatch: None,
                    destroyed: false,
                    in_flight: 0,
                    queue: VecDeque::new(),
                    telemetry: Vec::new(),
                    reported: Vec::new(),
                    twin_handler: None,
                    method_handler: None,
                    confirmation: SendConfirmation::Ok,
                    reported_status: DEFAULT_REPORTED_STATUS,
                    reject_sends: false,
                    url_encoding: false,
                    subscribers: Vec::new(),
                }),
                idle: Condvar::new(),
            }),
        }
    }

    /// Telemetry messages received so far, in order
    pub fn telemetry(&self) -> Vec<TelemetryMessage> {
        self.inner.state.lock().telemetry.clone()
    }

    /// Reported-state documents received so far, in order
    pub fn reported_states(&self) -> Vec<Vec<u8>> {
        self.inner.state.lock().reported.clone()
    }

    /// Stream of everything the device sends from now on
    pub fn subscribe(&self) -> UnboundedReceiverStream<Outbound> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.state.lock().subscribers.push(tx);
        UnboundedReceiverStream::new(rx)
    }

    /// Confirmation handed to subsequent telemetry sends
    pub fn set_telemetry_confirmation(&self, confirmation: SendConfirmation) {
        self.inner.state.lock().confirmation = confirmation;
    }

    /// Status code handed to subsequent reported-state sends
    pub fn set_reported_status(&self, status: i32) {
        self.inner.state.lock().reported_status = status;
    }

    /// Make subsequent sends fail synchronously
    pub fn set_reject_sends(&self, reject: bool) {
        self.inner.state.lock().reject_sends = reject;
    }

    /// Push a twin document (`Complete`) or desired patch (`Partial`)
    pub fn inject_twin(&self, update_state: TwinUpdateState, payload: impl Into<Vec<u8>>) -> Result<()> {
        self.inner.schedule(
            Work::Twin {
                update_state,
                payload: payload.into(),
            },
            Duration::ZERO,
        )
    }

    /// Invoke a command on the device
    ///
    /// The receiver resolves with the device's response. It is closed
    /// without a value if the device never installed a command handler.
    pub fn invoke_method(
        &self,
        method_name: &str,
        payload: impl Into<Vec<u8>>,
    ) -> Result<oneshot::Receiver<MethodResponse>> {
        let (reply, response) = oneshot::channel();
        self.inner.schedule(
            Work::Method {
                method_name: method_name.to_string(),
                payload: payload.into(),
                reply,
            },
            Duration::ZERO,
        )?;
        Ok(response)
    }

    pub fn has_twin_handler(&self) -> bool {
        self.inner.state.lock().twin_handler.is_some()
    }

    pub fn has_method_handler(&self) -> bool {
        self.inner.state.lock().method_handler.is_some()
    }

    pub fn url_encoding_enabled(&self) -> bool {
        self.inner.state.lock().url_encoding
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.state.lock().destroyed
    }

    /// Callbacks waiting for the next `do_work` (cooperative mode)
    pub fn queued(&self) -> usize {
        self.inner.state.lock().queue.len()
    }
}

impl HubInner {
    pub(crate) fn attach(&self, dispatch: Dispatch) -> Result<()> {
        let mut state = self.state.lock();
        if state.dispatch.is_some() {
            return Err(Error::config("Loopback hub already has a transport"));
        }
        state.dispatch = Some(dispatch);
        Ok(())
    }

    fn check_open(state: &HubState) -> Result<()> {
        if state.destroyed {
            warn!("Loopback transport is destroyed");
            return Err(Error::Generic);
        }
        if state.reject_sends {
            debug!("Loopback hub rejecting send");
            return Err(Error::Generic);
        }
        Ok(())
    }

    fn publish(state: &mut HubState, outbound: Outbound) {
        state
            .subscribers
            .retain(|subscriber| subscriber.send(outbound.clone()).is_ok());
    }

    pub(crate) fn send_event(
        self: &Arc<Self>,
        message: TelemetryMessage,
        completion: SendCompletion,
    ) -> Result<()> {
        let (confirmation, delay) = {
            let mut state = self.state.lock();
            Self::check_open(&state)?;
            state.telemetry.push(message.clone());
            Self::publish(&mut state, Outbound::Telemetry(message));
            let delay = state
                .dispatch
                .as_ref()
                .map_or(Duration::ZERO, |d| d.ack_latency);
            (state.confirmation, delay)
        };

        self.schedule(
            Work::Telemetry {
                completion,
                confirmation,
            },
            delay,
        )
    }

    pub(crate) fn send_reported_state(
        self: &Arc<Self>,
        payload: &[u8],
        completion: ReportedStateCompletion,
    ) -> Result<()> {
        let (status, delay) = {
            let mut state = self.state.lock();
            Self::check_open(&state)?;
            state.reported.push(payload.to_vec());
            Self::publish(&mut state, Outbound::ReportedState(payload.to_vec()));
            let delay = state
                .dispatch
                .as_ref()
                .map_or(Duration::ZERO, |d| d.ack_latency);
            (state.reported_status, delay)
        };

        self.schedule(Work::Reported { completion, status }, delay)
    }

    pub(crate) fn set_twin_handler(&self, handler: TwinUpdateHandler) -> Result<()> {
        let mut state = self.state.lock();
        if state.destroyed {
            return Err(Error::Generic);
        }
        state.twin_handler = Some(handler);
        Ok(())
    }

    pub(crate) fn set_method_handler(&self, handler: MethodHandler) -> Result<()> {
        let mut state = self.state.lock();
        if state.destroyed {
            return Err(Error::Generic);
        }
        state.method_handler = Some(handler);
        Ok(())
    }

    pub(crate) fn enable_url_encoding(&self) {
        self.state.lock().url_encoding = true;
    }

    /// Hand `work` to the attached transport's delivery mode
    fn schedule(self: &Arc<Self>, work: Work, delay: Duration) -> Result<()> {
        let dispatch = {
            let mut state = self.state.lock();
            if state.destroyed {
                return Err(Error::Generic);
            }
            let Some(dispatch) = state.dispatch.clone() else {
                warn!("No transport attached to loopback hub");
                return Err(Error::Generic);
            };
            if dispatch.mode == LoopbackMode::Cooperative {
                state.queue.push_back(work);
                return Ok(());
            }
            dispatch
        };

        let Some(runtime) = dispatch.runtime else {
            return Err(Error::config("Threaded loopback transport has no runtime"));
        };

        let hub = self.clone();
        runtime.spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            hub.run(work);
        });
        Ok(())
    }

    /// Run everything queued so far (cooperative mode)
    pub(crate) fn drain(&self) {
        let batch: Vec<Work> = self.state.lock().queue.drain(..).collect();
        for work in batch {
            self.run(work);
        }
    }

    fn run(&self, work: Work) {
        let (twin_handler, method_handler) = {
            let mut state = self.state.lock();
            if state.destroyed {
                debug!("Loopback transport destroyed, dropping callback");
                return;
            }
            state.in_flight += 1;
            (state.twin_handler.clone(), state.method_handler.clone())
        };

        match work {
            Work::Telemetry {
                completion,
                confirmation,
            } => completion(confirmation),
            Work::Reported { completion, status } => completion(status),
            Work::Twin {
                update_state,
                payload,
            } => match twin_handler {
                Some(handler) => handler(update_state, &payload),
                None => debug!("No twin handler installed, dropping twin update"),
            },
            Work::Method {
                method_name,
                payload,
                reply,
            } => match method_handler {
                Some(handler) => {
                    let _ = reply.send(handler(&method_name, &payload));
                }
                None => debug!("No method handler installed, dropping {}", method_name),
            },
        }

        let mut state = self.state.lock();
        state.in_flight -= 1;
        if state.in_flight == 0 {
            self.idle.notify_all();
        }
    }

    /// Stop all delivery and wait for running callbacks to return
    pub(crate) fn destroy(&self) {
        let dropped = {
            let mut state = self.state.lock();
            state.destroyed = true;
            while state.in_flight > 0 {
                self.idle.wait(&mut state);
            }
            state.twin_handler = None;
            state.method_handler = None;
            std::mem::take(&mut state.queue)
        };
        debug!(
            "Loopback transport destroyed, {} queued callbacks dropped",
            dropped.len()
        );
    }
}
