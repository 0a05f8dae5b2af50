//! Architectural Contract Test: Interface Sends
//!
//! This test verifies what an interface puts on the transport and what its
//! completion callbacks are told.
//!
//! Constraints verified:
//! - Sends before registration, or after unregistration, never reach the
//!   transport
//! - Telemetry, reported properties and async command updates carry the
//!   exact wire envelopes
//! - Transport confirmations map to application statuses
//! - Completions for interfaces no longer bound are swallowed
//! - A refused send drops its completion and reports a generic failure
//!
//! If this test fails, someone has broken the send path of an interface.

mod common;

use common::*;
use dtwin_core::traits::SendConfirmation;
use dtwin_core::{
    AsyncCommandUpdate, ClientCore, Error, InterfaceClient, PropertyResponse, STRUCT_VERSION_1,
    ThreadSafeBinding,
};

fn registered(transport: &StubTransport, interfaces: &[InterfaceClient]) -> ClientCore {
    let core = ClientCore::new(
        transport.boxed(),
        Box::new(ThreadSafeBinding::new()),
        minimal_config(),
    )
    .unwrap();
    core.register_interfaces(CAPABILITY_MODEL_ID, interfaces, None)
        .unwrap();
    transport.ack_registration(SendConfirmation::Ok);
    core
}

#[test]
fn sends_before_registration_are_refused_locally() {
    let transport = StubTransport::new();
    let core = ClientCore::new(
        transport.boxed(),
        Box::new(ThreadSafeBinding::new()),
        minimal_config(),
    )
    .unwrap();
    let (a, _) = interface("a");
    core.register_interfaces(CAPABILITY_MODEL_ID, &[a.clone()], None)
        .unwrap();

    assert_eq!(
        a.send_telemetry("temp", "21", None),
        Err(Error::InterfaceNotRegistered)
    );
    assert_eq!(
        a.report_property("state", "true", None, None),
        Err(Error::InterfaceNotRegistered)
    );
    assert_eq!(transport.send_event_count(), 1);
    assert_eq!(transport.reported_count(), 0);
}

#[test]
fn telemetry_envelope_and_status() {
    let transport = StubTransport::new();
    let (a, _) = interface("a");
    let _core = registered(&transport, &[a.clone()]);
    let done = StatusLog::new();

    a.send_telemetry("temp", "21.5", Some(done.completion()))
        .unwrap();

    let message = transport.messages().pop().unwrap();
    assert_eq!(message.body_str(), Some(r#"{"temp":21.5}"#));
    assert_eq!(message.property("$.ifname"), Some("a"));
    assert_eq!(message.property("$.schema"), Some("temp"));
    assert_eq!(message.property("$.ifid"), None);
    assert_eq!(message.content_type.as_deref(), Some("application/json"));
    assert!(done.statuses().is_empty());

    transport.complete_next_send(SendConfirmation::Ok);
    assert_eq!(done.statuses(), vec![Ok(())]);
}

#[test]
fn telemetry_confirmations_map_to_statuses() {
    let transport = StubTransport::new();
    let (a, _) = interface("a");
    let _core = registered(&transport, &[a.clone()]);
    let done = StatusLog::new();

    for confirmation in [
        SendConfirmation::BecauseDestroy,
        SendConfirmation::MessageTimeout,
        SendConfirmation::Error,
    ] {
        a.send_telemetry("t", "1", Some(done.completion())).unwrap();
        transport.complete_next_send(confirmation);
    }

    assert_eq!(
        done.statuses(),
        vec![
            Err(Error::HandleDestroyed),
            Err(Error::Timeout),
            Err(Error::Generic)
        ]
    );
}

#[test]
fn reported_property_envelopes_and_statuses() {
    let transport = StubTransport::new();
    let (a, _) = interface("a");
    let core = registered(&transport, &[a.clone()]);
    let done = StatusLog::new();

    a.report_property("state", "true", None, Some(done.completion()))
        .unwrap();
    let response = PropertyResponse {
        version: STRUCT_VERSION_1,
        response_version: 7,
        status_code: 200,
        status_description: "applied".to_string(),
    };
    a.report_property("level", "3", Some(&response), Some(done.completion()))
        .unwrap();

    assert_eq!(
        transport.reported(),
        vec![
            r#"{"$iotin:a":{"state":{"value":true}}}"#.to_string(),
            r#"{"$iotin:a":{"level":{"value":3,"sc":200,"sd":"applied","sv":7}}}"#.to_string(),
        ]
    );
    assert_eq!(core.pending_reports(), 2);

    transport.complete_next_report(204);
    transport.complete_next_report(400);

    assert_eq!(done.statuses(), vec![Ok(()), Err(Error::Generic)]);
    assert_eq!(core.pending_reports(), 0);
}

#[test]
fn refused_sends_drop_their_completion() {
    let transport = StubTransport::new();
    let (a, _) = interface("a");
    let core = registered(&transport, &[a.clone()]);
    let done = StatusLog::new();

    transport.fail_send_event(true);
    transport.fail_reported(true);

    assert_eq!(
        a.send_telemetry("t", "1", Some(done.completion())),
        Err(Error::Generic)
    );
    assert_eq!(
        a.report_property("p", "1", None, Some(done.completion())),
        Err(Error::Generic)
    );
    assert!(done.statuses().is_empty());
    assert_eq!(core.pending_reports(), 0);
}

#[test]
fn invalid_arguments_are_refused() {
    let transport = StubTransport::new();
    let (a, _) = interface("a");
    let _core = registered(&transport, &[a.clone()]);

    assert_eq!(a.send_telemetry("", "1", None), Err(Error::InvalidArg));
    assert_eq!(a.send_telemetry("t", "{oops", None), Err(Error::InvalidArg));
    assert_eq!(a.report_property("", "1", None, None), Err(Error::InvalidArg));
    assert_eq!(
        a.update_async_command_status(&AsyncCommandUpdate {
            version: STRUCT_VERSION_1,
            command_name: String::new(),
            request_id: "r".to_string(),
            property_data: "1".to_string(),
            status_code: 200,
        }),
        Err(Error::InvalidArg)
    );
    assert_eq!(transport.send_event_count(), 1);
}

#[test]
fn async_command_update_envelope() {
    let transport = StubTransport::new();
    let (a, _) = interface("a");
    let _core = registered(&transport, &[a.clone()]);

    a.update_async_command_status(&AsyncCommandUpdate {
        version: STRUCT_VERSION_1,
        command_name: "reboot".to_string(),
        request_id: "req-9".to_string(),
        property_data: r#"{"progress":50}"#.to_string(),
        status_code: 202,
    })
    .unwrap();

    let message = transport.messages().pop().unwrap();
    assert_eq!(message.body_str(), Some(r#"{"asyncResult":{"progress":50}}"#));
    assert_eq!(message.property("$.ifname"), Some("a"));
    assert_eq!(message.property("$.schema"), Some("asyncResult"));
    assert_eq!(message.property("iothub-command-statuscode"), Some("202"));
    assert_eq!(message.property("iothub-command-request-id"), Some("req-9"));
    assert_eq!(message.property("iothub-command-name"), Some("reboot"));

    // No completion was requested; acknowledging it is harmless.
    assert!(transport.complete_next_send(SendConfirmation::Ok));
}

#[test]
fn destroyed_interface_refuses_sends_and_swallows_late_completions() {
    let transport = StubTransport::new();
    let (a, _) = interface("a");
    let (b, _) = interface("b");
    let core = registered(&transport, &[a.clone(), b.clone()]);
    let done = StatusLog::new();

    a.send_telemetry("t", "1", Some(done.completion())).unwrap();
    a.destroy();

    assert_eq!(
        a.send_telemetry("t", "2", None),
        Err(Error::InterfaceUnregistering)
    );

    // Still a member of the client, so the outstanding completion arrives.
    transport.complete_next_send(SendConfirmation::Ok);
    assert_eq!(done.statuses(), vec![Ok(())]);

    b.report_property("p", "1", None, Some(done.completion()))
        .unwrap();
    drop(core);

    // The client is gone; the transport was destroyed and the pending
    // report was dropped without running.
    assert_eq!(transport.destroy_count(), 1);
    transport.complete_next_report(200);
    assert_eq!(done.statuses(), vec![Ok(())]);
    assert_eq!(
        b.send_telemetry("t", "1", None),
        Err(Error::InterfaceUnregistering)
    );
}
