//! The set of interfaces bound to one client
//!
//! Membership is the ground truth for whether a late completion still has
//! somewhere to go. The client keeps the list inside its locked state and
//! fans events out over a cloned snapshot, so no application callback ever
//! runs while the client lock is held.

use crate::client::CoreShared;
use crate::error::{Error, Result};
use crate::interface::envelope::{self, TwinSections};
use crate::interface::{CommandOutcome, CompletionCallback, InterfaceClient};
use crate::traits::{ConcurrencyBinding, TelemetryMessage};
use std::sync::Weak;
use tracing::{debug, error, warn};

/// Ordered list of bound interfaces, in registration order
#[derive(Clone, Default)]
pub(crate) struct InterfaceList {
    interfaces: Vec<InterfaceClient>,
}

impl InterfaceList {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn len(&self) -> usize {
        self.interfaces.len()
    }

    pub(crate) fn contains(&self, interface: &InterfaceClient) -> bool {
        self.interfaces.iter().any(|i| i.same_as(interface))
    }

    pub(crate) fn component_names(&self) -> Vec<String> {
        self.interfaces
            .iter()
            .map(|i| i.component_name().to_string())
            .collect()
    }

    /// Bind `interfaces` in order and return them as a new list
    ///
    /// Members of `current` are already bound to this client and are carried
    /// over as they are. If any bind fails, every interface bound by this
    /// call is unbound again before the error is returned.
    pub(crate) fn bind_interfaces(
        interfaces: &[InterfaceClient],
        current: &InterfaceList,
        core: &Weak<CoreShared>,
        binding: &dyn ConcurrencyBinding,
    ) -> Result<InterfaceList> {
        let mut bound = InterfaceList::new();
        let mut newly_bound = InterfaceList::new();

        for (index, interface) in interfaces.iter().enumerate() {
            if current.contains(interface) {
                bound.interfaces.push(interface.clone());
                continue;
            }

            if let Err(e) = interface.bind_to_core(core.clone(), binding) {
                error!(
                    component = %interface.component_name(),
                    "Cannot bind interface {} of the registration: {}", index, e
                );
                newly_bound.unbind_interfaces();
                return Err(e);
            }

            bound.interfaces.push(interface.clone());
            newly_bound.interfaces.push(interface.clone());
        }

        Ok(bound)
    }

    /// Unbind every member and clear the list
    pub(crate) fn unbind_interfaces(&mut self) {
        for interface in self.interfaces.drain(..) {
            interface.unbind_from_core();
        }
    }

    /// Members of `self` that are not in `other`
    pub(crate) fn not_in(&self, other: &InterfaceList) -> InterfaceList {
        InterfaceList {
            interfaces: self
                .interfaces
                .iter()
                .filter(|i| !other.contains(i))
                .cloned()
                .collect(),
        }
    }

    pub(crate) fn registration_complete(&self, status: Result<()>) {
        for interface in &self.interfaces {
            interface.registration_complete(status.clone());
        }
    }

    /// Offer a command to each member until one claims it
    pub(crate) fn invoke_command(&self, method_name: &str, payload: &[u8]) -> CommandOutcome {
        for interface in &self.interfaces {
            match interface.invoke_command_if_supported(method_name, payload) {
                CommandOutcome::NotApplicable => continue,
                outcome => return outcome,
            }
        }
        CommandOutcome::NotApplicable
    }

    /// Deliver a twin document or patch to every member
    pub(crate) fn process_twin(&self, full_snapshot: bool, payload: &[u8]) -> Result<()> {
        let root: serde_json::Value = serde_json::from_slice(payload).map_err(|e| {
            error!("Twin payload is not valid JSON: {}", e);
            Error::Generic
        })?;
        let sections = TwinSections::split(&root, full_snapshot)?;

        for interface in &self.interfaces {
            if let Err(e) = interface.process_twin_update(&sections) {
                warn!(
                    component = %interface.component_name(),
                    "Twin update failed: {}", e
                );
            }
        }
        Ok(())
    }

    pub(crate) fn process_telemetry_complete(
        &self,
        interface: &InterfaceClient,
        status: Result<()>,
        on_complete: Option<CompletionCallback>,
    ) -> Result<()> {
        if !self.contains(interface) {
            warn!(
                component = %interface.component_name(),
                "Interface is no longer registered; swallowing telemetry completion"
            );
            return Err(Error::Generic);
        }
        interface.on_send_complete(status, on_complete);
        Ok(())
    }

    pub(crate) fn process_reported_complete(
        &self,
        interface: &InterfaceClient,
        status: Result<()>,
        on_complete: Option<CompletionCallback>,
    ) -> Result<()> {
        if !self.contains(interface) {
            warn!(
                component = %interface.component_name(),
                "Interface is no longer registered; swallowing reported property completion"
            );
            return Err(Error::Generic);
        }
        interface.on_send_complete(status, on_complete);
        Ok(())
    }

    /// Body of the registration announcement
    pub(crate) fn registration_envelope(&self, capability_model_id: &str) -> Result<Vec<u8>> {
        envelope::registration_body(
            capability_model_id,
            self.interfaces
                .iter()
                .map(|i| (i.component_name(), i.interface_id())),
        )
    }

    pub(crate) fn registration_message(
        &self,
        capability_model_id: &str,
    ) -> Result<TelemetryMessage> {
        let body = self.registration_envelope(capability_model_id)?;
        debug!(
            "Registration announcement for {} interfaces: {}",
            self.len(),
            String::from_utf8_lossy(&body)
        );
        Ok(envelope::registration_message(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::ThreadSafeBinding;
    use crate::interface::{CommandResponse, InterfaceState};
    use crate::traits::{BindingLock, ConcurrencyBinding};
    use std::time::Duration;

    fn interface(name: &str) -> InterfaceClient {
        InterfaceClient::new(&format!("urn:contoso:{}:1", name), name, None).unwrap()
    }

    /// Hands out `ok` locks, then fails
    struct LimitedBinding {
        ok: parking_lot::Mutex<usize>,
    }

    impl ConcurrencyBinding for LimitedBinding {
        fn create_lock(&self) -> Result<Box<dyn BindingLock>> {
            let mut ok = self.ok.lock();
            if *ok == 0 {
                return Err(Error::OutOfMemory);
            }
            *ok -= 1;
            ThreadSafeBinding::new().create_lock()
        }

        fn sleep(&self, _duration: Duration) {}
    }

    #[test]
    fn bind_failure_rolls_back() {
        let interfaces = [interface("a"), interface("b"), interface("c")];
        let binding = LimitedBinding {
            ok: parking_lot::Mutex::new(2),
        };

        let result =
            InterfaceList::bind_interfaces(&interfaces, &InterfaceList::new(), &Weak::new(), &binding);

        assert_eq!(result.err(), Some(Error::OutOfMemory));
        assert_eq!(interfaces[0].state(), InterfaceState::Unbound);
        assert_eq!(interfaces[1].state(), InterfaceState::Unbound);
        assert_eq!(interfaces[2].state(), InterfaceState::Created);
    }

    #[test]
    fn current_members_are_carried_over() {
        let binding = ThreadSafeBinding::new();
        let a = interface("a");
        let current =
            InterfaceList::bind_interfaces(&[a.clone()], &InterfaceList::new(), &Weak::new(), &binding)
                .unwrap();

        let b = interface("b");
        let next =
            InterfaceList::bind_interfaces(&[a.clone(), b.clone()], &current, &Weak::new(), &binding)
                .unwrap();

        assert_eq!(next.len(), 2);
        assert_eq!(a.state(), InterfaceState::Bound);
        assert_eq!(b.state(), InterfaceState::Bound);
        assert_eq!(current.not_in(&next).len(), 0);
        assert_eq!(next.not_in(&current).len(), 1);
    }

    #[test]
    fn completion_for_non_member_is_swallowed() {
        let list = InterfaceList::new();
        let stranger = interface("x");
        let result = list.process_telemetry_complete(
            &stranger,
            Ok(()),
            Some(Box::new(|_| panic!("must not be delivered"))),
        );
        assert_eq!(result, Err(Error::Generic));
    }

    #[test]
    fn command_fan_out_stops_at_first_claim() {
        let binding = ThreadSafeBinding::new();
        let a = interface("a");
        let b = interface("b");
        b.set_command_callback(|_| CommandResponse::new(201, "1"))
            .unwrap();
        let list =
            InterfaceList::bind_interfaces(&[a, b], &InterfaceList::new(), &Weak::new(), &binding)
                .unwrap();

        let payload = br#"{"commandRequest":{"requestId":"1","value":null}}"#;
        assert_eq!(
            list.invoke_command("$iotin:b*go", payload),
            CommandOutcome::Processed {
                status: 201,
                payload: "1".to_string()
            }
        );
        assert_eq!(
            list.invoke_command("$iotin:c*go", payload),
            CommandOutcome::NotApplicable
        );
    }

    #[test]
    fn malformed_twin_is_an_error() {
        let list = InterfaceList::new();
        assert_eq!(list.process_twin(true, b"{}"), Err(Error::Generic));
        assert_eq!(list.process_twin(false, b"nope"), Err(Error::Generic));
        assert!(list.process_twin(false, b"{}").is_ok());
    }
}
