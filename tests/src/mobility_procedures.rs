//! Mobility and session management integration tests
//!
//! Registers a terminal through a full attach, then exercises routing
//! area update, service request, P-TMSI reallocation, GMM information,
//! detach in both directions and PDP context handling.

use std::net::Ipv4Addr;

use integration_tests::test_fixtures::{
    activate_pdp, attach_request, deactivate_pdp, decode_downlink, detach_request, rau_request,
    service_request,
};
use integration_tests::{core_config, init_test_logging, MockCore, ScriptedTerminal, TEST_IMSI};
use pscore_common::{CoreConfig, MobileIdentity};
use pscore_gmm::{GmmState, NetworkProcedure, ProcedureError, Session};
use pscore_l3::{
    identity_from_value, sm_cause, DecodeError, GmmMessageType, Message, MessageId, SmMessageType,
};

fn gmm(t: GmmMessageType) -> MessageId {
    MessageId::gmm(t)
}

fn sm(t: SmMessageType) -> MessageId {
    MessageId::sm(t)
}

/// Feeds the terminal's answers to every downlink PDU from index `from`
/// on back into the session until it has nothing more to say.
fn converse(core: &MockCore, session: &mut Session, terminal: &ScriptedTerminal, from: usize) {
    let mut answered = from;
    loop {
        let sent = core.transport.sent_to(session.id());
        let Some(pdu) = sent.get(answered) else {
            break;
        };
        answered += 1;
        if let Some(answer) = terminal.respond(pdu).expect("downlink decodes") {
            session.handle_uplink(&answer).expect("uplink accepted");
        }
    }
}

fn sent_count(core: &MockCore, session: &Session) -> usize {
    core.transport.sent_to(session.id()).len()
}

fn registered(config: CoreConfig, n: u32) -> (MockCore, Session, ScriptedTerminal) {
    init_test_logging();
    let (core, _scheduler) = MockCore::recording(config).unwrap();
    let mut session = core.session(n);
    let terminal = ScriptedTerminal::new(TEST_IMSI);
    session
        .handle_uplink(&attach_request(&MobileIdentity::Imsi(TEST_IMSI.into())))
        .unwrap();
    converse(&core, &mut session, &terminal, 0);
    assert!(session.ue().is_registered());
    assert!(session.stack().is_empty());
    (core, session, terminal)
}

fn last_downlink(core: &MockCore) -> Message {
    decode_downlink(&core.transport.last().expect("downlink sent")).expect("downlink decodes")
}

fn pdp_address(msg: &Message) -> Option<Ipv4Addr> {
    let address = msg.get("PDPAddr")?.field("Address")?.as_bytes()?;
    let octets: [u8; 4] = address.as_ref().try_into().ok()?;
    Some(Ipv4Addr::from(octets))
}

#[test]
fn test_routing_area_update_reauthenticates_and_reallocates() {
    let (core, mut session, terminal) = registered(core_config(), 1);
    let before = session.ue().ptmsi;
    let from = sent_count(&core, &session);

    session.handle_uplink(&rau_request()).unwrap();
    assert_eq!(last_downlink(&core).id, gmm(GmmMessageType::AuthenticationCipheringRequest));
    assert_eq!(session.stack().len(), 2);

    converse(&core, &mut session, &terminal, from);
    let ids = core.downlink_ids(session.id());
    assert_eq!(
        &ids[from..],
        &[
            gmm(GmmMessageType::AuthenticationCipheringRequest),
            gmm(GmmMessageType::RoutingAreaUpdateAccept),
        ]
    );
    assert!(session.stack().is_empty());
    assert_ne!(session.ue().ptmsi, before);
    assert!(session.ue().pending_ptmsi.is_none());
    assert_eq!(core.policy.allocated_count(), 1);
}

#[test]
fn test_routing_area_update_without_context_is_rejected() {
    init_test_logging();
    let (core, _scheduler) = MockCore::recording(core_config()).unwrap();
    let mut session = core.session(2);

    session.handle_uplink(&rau_request()).unwrap();
    let reject = last_downlink(&core);
    assert_eq!(reject.id, gmm(GmmMessageType::RoutingAreaUpdateReject));
    assert_eq!(reject.uint("GMMCause"), Some(10));
    assert_eq!(session.ue().gmm_state, GmmState::Deregistered);
    assert!(session.stack().is_empty());
}

#[test]
fn test_service_request() {
    let (core, mut session, _terminal) = registered(core_config(), 3);
    let ptmsi = session.ue().ptmsi.unwrap();

    session.handle_uplink(&service_request(ptmsi)).unwrap();
    assert_eq!(last_downlink(&core).id, gmm(GmmMessageType::ServiceAccept));
    assert!(session.stack().is_empty());
}

#[test]
fn test_service_request_when_detached() {
    init_test_logging();
    let (core, _scheduler) = MockCore::recording(core_config()).unwrap();
    let mut session = core.session(4);

    session.handle_uplink(&service_request(0xC000_0001)).unwrap();
    let reject = last_downlink(&core);
    assert_eq!(reject.id, gmm(GmmMessageType::ServiceReject));
    assert_eq!(reject.uint("GMMCause"), Some(10));
}

#[test]
fn test_network_ptmsi_reallocation() {
    let (core, mut session, terminal) = registered(core_config(), 5);
    let before = session.ue().ptmsi;
    let from = sent_count(&core, &session);

    session.start_procedure(NetworkProcedure::PtmsiReallocation).unwrap();
    let command = last_downlink(&core);
    assert_eq!(command.id, gmm(GmmMessageType::PtmsiReallocationCommand));
    let allocated = match command.get("AllocPTMSI").map(identity_from_value) {
        Some(Ok(MobileIdentity::Tmsi(ptmsi))) => ptmsi,
        other => panic!("command without P-TMSI: {other:?}"),
    };
    assert_eq!(session.ue().ptmsi, before);

    converse(&core, &mut session, &terminal, from);
    assert_eq!(session.ue().ptmsi, Some(allocated));
    assert!(session.stack().is_empty());
}

#[test]
fn test_gmm_information_carries_network_name() {
    let mut config = core_config();
    config.gmm.network_name = Some("pscore".into());
    let (core, mut session, _terminal) = registered(config, 6);

    session.start_procedure(NetworkProcedure::Information).unwrap();
    let info = last_downlink(&core);
    assert_eq!(info.id, gmm(GmmMessageType::GmmInformation));
    assert!(info.has("FullNetName"));
    assert!(session.stack().is_empty());
}

#[test]
fn test_gmm_information_without_name_sends_nothing() {
    let (core, mut session, _terminal) = registered(core_config(), 7);
    let count = core.transport.count();

    session.start_procedure(NetworkProcedure::Information).unwrap();
    assert_eq!(core.transport.count(), count);
    assert!(session.stack().is_empty());
}

#[test]
fn test_pdp_activation_and_deactivation() {
    let (core, mut session, _terminal) = registered(core_config(), 8);

    session.handle_uplink(&activate_pdp(0, "internet")).unwrap();
    let accept = last_downlink(&core);
    assert_eq!(accept.id, sm(SmMessageType::ActivatePdpContextAccept));
    assert_eq!(accept.transaction_id(), (true, 0));
    assert_eq!(pdp_address(&accept), Some(Ipv4Addr::new(10, 45, 0, 2)));
    let context = session.ue().pdp.get(&0).cloned().unwrap();
    assert_eq!(context.apn.as_deref(), Some("internet"));
    assert_eq!(context.nsapi, 5);

    session.handle_uplink(&activate_pdp(1, "ims.mnc001.mcc001")).unwrap();
    assert_eq!(pdp_address(&last_downlink(&core)), Some(Ipv4Addr::new(10, 45, 0, 3)));
    assert_eq!(session.ue().pdp.len(), 2);

    session.handle_uplink(&deactivate_pdp(0)).unwrap();
    let accept = last_downlink(&core);
    assert_eq!(accept.id, sm(SmMessageType::DeactivatePdpContextAccept));
    assert_eq!(accept.transaction_id(), (true, 0));
    assert_eq!(session.ue().pdp.len(), 1);

    // The released address is handed out again
    session.handle_uplink(&activate_pdp(2, "internet")).unwrap();
    assert_eq!(pdp_address(&last_downlink(&core)), Some(Ipv4Addr::new(10, 45, 0, 2)));
}

#[test]
fn test_pdp_activation_requires_attach() {
    init_test_logging();
    let (core, _scheduler) = MockCore::recording(core_config()).unwrap();
    let mut session = core.session(9);

    session.handle_uplink(&activate_pdp(0, "internet")).unwrap();
    let reject = last_downlink(&core);
    assert_eq!(reject.id, sm(SmMessageType::ActivatePdpContextReject));
    assert_eq!(
        reject.uint("SMCause"),
        Some(u64::from(sm_cause::ACTIVATION_REJECTED_UNSPECIFIED))
    );
    assert!(session.ue().pdp.is_empty());
}

#[test]
fn test_detach_releases_pdp_addresses() {
    let (core, mut session, terminal) = registered(core_config(), 10);
    session.handle_uplink(&activate_pdp(0, "internet")).unwrap();
    assert_eq!(session.ue().pdp.len(), 1);

    session.handle_uplink(&detach_request(false)).unwrap();
    assert_eq!(last_downlink(&core).id, gmm(GmmMessageType::DetachAccept));
    assert!(!session.ue().is_registered());
    assert!(session.ue().pdp.is_empty());

    // Re-attach and get the first pool address back
    let from = sent_count(&core, &session);
    session
        .handle_uplink(&attach_request(&MobileIdentity::Imsi(TEST_IMSI.into())))
        .unwrap();
    converse(&core, &mut session, &terminal, from);
    assert!(session.ue().is_registered());
    session.handle_uplink(&activate_pdp(0, "internet")).unwrap();
    assert_eq!(pdp_address(&last_downlink(&core)), Some(Ipv4Addr::new(10, 45, 0, 2)));
}

#[test]
fn test_power_off_detach_is_silent() {
    let (core, mut session, _terminal) = registered(core_config(), 11);
    let count = core.transport.count();

    session.handle_uplink(&detach_request(true)).unwrap();
    assert_eq!(core.transport.count(), count);
    assert!(!session.ue().is_registered());
}

#[test]
fn test_network_detach() {
    let (core, mut session, terminal) = registered(core_config(), 12);
    let from = sent_count(&core, &session);

    session
        .start_procedure(NetworkProcedure::Detach {
            detach_type: 1,
            cause: Some(7),
        })
        .unwrap();
    let request = last_downlink(&core);
    assert_eq!(request.id, gmm(GmmMessageType::DetachRequest));
    assert_eq!(request.uint("DetachType"), Some(1));
    assert_eq!(request.uint("GMMCause"), Some(7));
    assert!(session.ue().is_registered());

    converse(&core, &mut session, &terminal, from);
    assert!(!session.ue().is_registered());
    assert!(session.stack().is_empty());
}

#[test]
fn test_unknown_message_type_answered_with_status() {
    init_test_logging();
    let (core, _scheduler) = MockCore::recording(core_config()).unwrap();
    let mut session = core.session(13);

    let result = session.handle_uplink(&[0x08, 0x7F]);
    assert!(matches!(
        result,
        Err(ProcedureError::Decode(DecodeError::UnknownMessage { .. }))
    ));
    let status = last_downlink(&core);
    assert_eq!(status.id, gmm(GmmMessageType::GmmStatus));
    assert_eq!(status.uint("GMMCause"), Some(97));
}

#[test]
fn test_message_out_of_state_answered_with_status() {
    init_test_logging();
    let (core, _scheduler) = MockCore::recording(core_config()).unwrap();
    let mut session = core.session(14);

    let complete = integration_tests::test_fixtures::attach_complete();
    assert!(matches!(
        session.handle_uplink(&complete),
        Err(ProcedureError::UnexpectedMessage { .. })
    ));
    let status = last_downlink(&core);
    assert_eq!(status.id, gmm(GmmMessageType::GmmStatus));
    assert_eq!(status.uint("GMMCause"), Some(98));

    // SM messages are answered with SM status on the same transaction
    let stray = [0x3A, u8::from(SmMessageType::DeactivatePdpContextAccept)];
    assert!(session.handle_uplink(&stray).is_err());
    let status = last_downlink(&core);
    assert_eq!(status.id, sm(SmMessageType::SmStatus));
    assert_eq!(status.transaction_id(), (true, 3));
    assert_eq!(status.uint("SMCause"), Some(98));
}
