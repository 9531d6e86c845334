//! Attach scenario integration tests
//!
//! Drives complete attach exchanges through a session with mock
//! collaborators: identification, authentication, timer expiry,
//! authentication mismatch, preemption and abort.

use integration_tests::test_fixtures::{
    activate_pdp, attach_complete, attach_request, auth_failure, auth_response, decode_downlink,
    detach_request, identity_response,
};
use integration_tests::{core_config, expected_response, init_test_logging, MockCore, ScriptedAuc, TEST_IMSI};
use pscore_common::config::{TIMER_T3350, TIMER_T3360, TIMER_T3370};
use pscore_common::MobileIdentity;
use pscore_gmm::{NetworkProcedure, ProcedureError, ProcedureKind};
use pscore_l3::{
    gmm_cause, identity_from_value, DecodeError, GmmMessageType, MessageId, SmMessageType,
};
use std::sync::Arc;

fn gmm(t: GmmMessageType) -> MessageId {
    MessageId::gmm(t)
}

fn last_rand(core: &MockCore) -> Vec<u8> {
    let pdu = core.transport.last().expect("downlink sent");
    let msg = decode_downlink(&pdu).expect("downlink decodes");
    assert_eq!(msg.id, gmm(GmmMessageType::AuthenticationCipheringRequest));
    msg.bytes("RAND").expect("RAND present").to_vec()
}

/// Terminal attaches with a P-TMSI the core does not know: identification,
/// authentication, accept with a new P-TMSI, complete.
#[test]
fn test_attach_with_unknown_identity() {
    init_test_logging();
    let (core, scheduler) = MockCore::recording(core_config()).unwrap();
    let mut session = core.session(1);

    session
        .handle_uplink(&attach_request(&MobileIdentity::Tmsi(0xC123_4567)))
        .unwrap();
    assert_eq!(core.downlink_ids(session.id()), vec![gmm(GmmMessageType::IdentityRequest)]);
    assert!(scheduler.armed_key(TIMER_T3370).is_some());
    assert_eq!(session.stack().len(), 2);

    session
        .handle_uplink(&identity_response(&MobileIdentity::Imsi(TEST_IMSI.into())))
        .unwrap();
    assert_eq!(session.ue().imsi.as_deref(), Some(TEST_IMSI));
    assert!(scheduler.armed_key(TIMER_T3370).is_none());
    assert!(scheduler.armed_key(TIMER_T3360).is_some());

    let rand = last_rand(&core);
    session
        .handle_uplink(&auth_response(1, &expected_response(&rand)))
        .unwrap();
    let accept = decode_downlink(&core.transport.last().unwrap()).unwrap();
    assert_eq!(accept.id, gmm(GmmMessageType::AttachAccept));
    let allocated = match accept.get("AllocPTMSI").map(identity_from_value) {
        Some(Ok(MobileIdentity::Tmsi(ptmsi))) => ptmsi,
        other => panic!("attach accept without P-TMSI: {other:?}"),
    };
    assert!(scheduler.armed_key(TIMER_T3350).is_some());

    session.handle_uplink(&attach_complete()).unwrap();
    assert!(session.ue().is_registered());
    assert_eq!(session.ue().ptmsi, Some(allocated));
    assert!(session.stack().is_empty());
    assert!(session.stack().preempted_by().is_none());
    assert!(scheduler.armed().is_empty());
    assert_eq!(
        core.downlink_ids(session.id()),
        vec![
            gmm(GmmMessageType::IdentityRequest),
            gmm(GmmMessageType::AuthenticationCipheringRequest),
            gmm(GmmMessageType::AttachAccept),
        ]
    );
}

/// The authentication timer expires: authentication aborts, the attach
/// aborts with it and the stack is free again.
#[test]
fn test_authentication_timeout_unwinds_attach() {
    init_test_logging();
    let (core, scheduler) = MockCore::recording(core_config()).unwrap();
    let mut session = core.session(2);

    session
        .handle_uplink(&attach_request(&MobileIdentity::Imsi(TEST_IMSI.into())))
        .unwrap();
    assert!(session.stack().preempted_by().is_some());
    let key = scheduler.armed_key(TIMER_T3360).unwrap();

    session.on_timer_expiry(key).unwrap();
    assert!(session.stack().is_empty());
    assert!(session.stack().preempted_by().is_none());
    assert!(!session.ue().is_registered());
    assert_eq!(core.transport.count(), 1);

    // The stack accepts new work
    session.start_procedure(NetworkProcedure::Information).unwrap();
    assert!(session.stack().is_empty());
}

/// A wrong RES is answered with a reject and the attach goes no further.
#[test]
fn test_authentication_mismatch_rejects() {
    init_test_logging();
    let (core, _scheduler) = MockCore::recording(core_config()).unwrap();
    let mut session = core.session(3);

    session
        .handle_uplink(&attach_request(&MobileIdentity::Imsi(TEST_IMSI.into())))
        .unwrap();
    session.handle_uplink(&auth_response(1, &[0, 0, 0, 0])).unwrap();

    assert_eq!(
        core.downlink_ids(session.id()),
        vec![
            gmm(GmmMessageType::AuthenticationCipheringRequest),
            gmm(GmmMessageType::AuthenticationCipheringReject),
        ]
    );
    assert!(session.stack().is_empty());
    assert!(!session.ue().security.is_established());
}

/// Aborting twice removes the procedures once.
#[test]
fn test_abort_is_idempotent() {
    init_test_logging();
    let (core, scheduler) = MockCore::recording(core_config()).unwrap();
    let mut session = core.session(4);

    session
        .handle_uplink(&attach_request(&MobileIdentity::Imsi(TEST_IMSI.into())))
        .unwrap();
    let attach = session.stack().ids()[0];
    assert_eq!(session.abort(attach), 2);
    assert_eq!(session.abort(attach), 0);
    assert!(session.stack().is_empty());
    assert!(session.stack().preempted_by().is_none());
    assert!(scheduler.armed().is_empty());
    assert_eq!(core.transport.count(), 1);
}

/// While an attach owns the stack, network procedures are refused and
/// uplink procedures wait until it finishes.
#[test]
fn test_preemption_defers_other_procedures() {
    init_test_logging();
    let (core, _scheduler) = MockCore::recording(core_config()).unwrap();
    let mut session = core.session(5);

    session
        .handle_uplink(&attach_request(&MobileIdentity::Imsi(TEST_IMSI.into())))
        .unwrap();
    let attach = session.stack().ids()[0];
    assert_eq!(session.stack().preempted_by(), Some(attach));

    match session.start_procedure(NetworkProcedure::Information) {
        Err(ProcedureError::StackBusy { owner }) => assert_eq!(owner, attach),
        other => panic!("expected StackBusy, got {other:?}"),
    }

    session.handle_uplink(&activate_pdp(0, "internet")).unwrap();
    assert_eq!(session.stack().deferred_len(), 1);
    assert_eq!(session.stack().len(), 2);

    let rand = last_rand(&core);
    session
        .handle_uplink(&auth_response(1, &expected_response(&rand)))
        .unwrap();
    assert_eq!(session.stack().deferred_len(), 1);
    session.handle_uplink(&attach_complete()).unwrap();

    assert_eq!(session.stack().deferred_len(), 0);
    assert!(session.stack().is_empty());
    assert_eq!(
        core.downlink_ids(session.id()).last(),
        Some(&MessageId::sm(SmMessageType::ActivatePdpContextAccept))
    );
    assert_eq!(session.ue().pdp.len(), 1);

    session.start_procedure(NetworkProcedure::Information).unwrap();
}

/// Retransmissions resend the same PDU before the procedure gives up, and
/// expiries of superseded timers are ignored.
#[test]
fn test_timer_retransmission() {
    init_test_logging();
    let mut config = core_config();
    config.gmm.max_retransmissions = 2;
    let (core, scheduler) = MockCore::recording(config).unwrap();
    let mut session = core.session(6);

    session
        .handle_uplink(&attach_request(&MobileIdentity::Imsi(TEST_IMSI.into())))
        .unwrap();
    let request = core.transport.last().unwrap();
    let first = scheduler.armed_key(TIMER_T3360).unwrap();

    session.on_timer_expiry(first).unwrap();
    assert_eq!(core.transport.count(), 2);
    assert_eq!(core.transport.last().unwrap(), request);
    let second = scheduler.armed_key(TIMER_T3360).unwrap();
    assert_ne!(first.generation, second.generation);

    // Stale expiry
    session.on_timer_expiry(first).unwrap();
    assert_eq!(core.transport.count(), 2);

    session.on_timer_expiry(second).unwrap();
    assert_eq!(core.transport.count(), 3);
    let third = scheduler.armed_key(TIMER_T3360).unwrap();

    session.on_timer_expiry(third).unwrap();
    assert_eq!(core.transport.count(), 3);
    assert!(session.stack().is_empty());
}

/// A response arriving after retransmission completes the exchange.
#[test]
fn test_response_after_retransmission() {
    init_test_logging();
    let mut config = core_config();
    config.gmm.max_retransmissions = 1;
    let (core, scheduler) = MockCore::recording(config).unwrap();
    let mut session = core.session(7);

    session
        .handle_uplink(&attach_request(&MobileIdentity::Imsi(TEST_IMSI.into())))
        .unwrap();
    let rand = last_rand(&core);
    session
        .on_timer_expiry(scheduler.armed_key(TIMER_T3360).unwrap())
        .unwrap();
    session
        .handle_uplink(&auth_response(1, &expected_response(&rand)))
        .unwrap();
    assert_eq!(
        decode_downlink(&core.transport.last().unwrap()).unwrap().id,
        gmm(GmmMessageType::AttachAccept)
    );
}

/// A synch failure the AuC cannot resolve ends the attach silently.
#[test]
fn test_refused_resynchronisation_stops_attach() {
    init_test_logging();
    let scheduler = Arc::new(integration_tests::RecordingScheduler::new());
    let core = MockCore::new(core_config(), ScriptedAuc::refusing_resync(), scheduler).unwrap();
    let mut session = core.session(8);

    session
        .handle_uplink(&attach_request(&MobileIdentity::Imsi(TEST_IMSI.into())))
        .unwrap();
    session
        .handle_uplink(&auth_failure(gmm_cause::SYNCH_FAILURE, Some(&[0x11; 14])))
        .unwrap();
    assert_eq!(core.auc.resync_count(), 1);
    assert!(session.stack().is_empty());
    assert_eq!(core.transport.count(), 1);
}

/// A resolved synch failure leads to a second challenge and an accept.
#[test]
fn test_resynchronisation_rechallenges() {
    init_test_logging();
    let (core, _scheduler) = MockCore::recording(core_config()).unwrap();
    let mut session = core.session(9);

    session
        .handle_uplink(&attach_request(&MobileIdentity::Imsi(TEST_IMSI.into())))
        .unwrap();
    let first = last_rand(&core);
    session
        .handle_uplink(&auth_failure(gmm_cause::SYNCH_FAILURE, Some(&[0x11; 14])))
        .unwrap();
    let second = last_rand(&core);
    assert_ne!(first, second);

    session
        .handle_uplink(&auth_response(2, &expected_response(&second)))
        .unwrap();
    assert_eq!(
        decode_downlink(&core.transport.last().unwrap()).unwrap().id,
        gmm(GmmMessageType::AttachAccept)
    );
}

/// A detach request arriving mid-attach ends the attach.
#[test]
fn test_detach_during_attach() {
    init_test_logging();
    let (core, scheduler) = MockCore::recording(core_config()).unwrap();
    let mut session = core.session(10);

    session
        .handle_uplink(&attach_request(&MobileIdentity::Imsi(TEST_IMSI.into())))
        .unwrap();
    session.handle_uplink(&detach_request(false)).unwrap();

    assert!(session.stack().is_empty());
    assert!(scheduler.armed().is_empty());
    assert_eq!(
        core.downlink_ids(session.id()).last(),
        Some(&gmm(GmmMessageType::DetachAccept))
    );
}

/// Denied subscribers get the configured reject cause.
#[test]
fn test_unknown_subscriber_rejected() {
    init_test_logging();
    let mut config = core_config();
    config.subscribers[0].imsi = "001019999999999".into();
    let (core, _scheduler) = MockCore::recording(config).unwrap();
    let mut session = core.session(11);

    session
        .handle_uplink(&attach_request(&MobileIdentity::Imsi(TEST_IMSI.into())))
        .unwrap();
    let reject = decode_downlink(&core.transport.last().unwrap()).unwrap();
    assert_eq!(reject.id, gmm(GmmMessageType::AttachReject));
    assert_eq!(reject.uint("GMMCause"), Some(7));
    assert!(reject.has("T3302"));
    assert!(session.stack().is_empty());
}

/// Security mode control and IMEISV identification run in the chain when
/// configured.
#[test]
fn test_attach_with_full_security_chain() {
    init_test_logging();
    let mut config = core_config();
    config.gmm.smc_required = true;
    config.gmm.imeisv_request = true;
    let (core, _scheduler) = MockCore::recording(config).unwrap();
    let mut session = core.session(12);

    session
        .handle_uplink(&attach_request(&MobileIdentity::Imsi(TEST_IMSI.into())))
        .unwrap();
    let rand = last_rand(&core);
    session
        .handle_uplink(&auth_response(1, &expected_response(&rand)))
        .unwrap();
    assert_eq!(
        session.stack().get(session.stack().top().unwrap()).map(|p| p.kind()),
        Some(ProcedureKind::SecurityModeControl)
    );

    session.on_security_mode_result(true).unwrap();
    assert!(session.ue().security.activated);
    let request = decode_downlink(&core.transport.last().unwrap()).unwrap();
    assert_eq!(request.id, gmm(GmmMessageType::IdentityRequest));
    assert_eq!(request.uint("IDType"), Some(3));

    session
        .handle_uplink(&identity_response(&MobileIdentity::Imeisv(
            integration_tests::TEST_IMEISV.into(),
        )))
        .unwrap();
    assert_eq!(session.ue().imeisv.as_deref(), Some(integration_tests::TEST_IMEISV));
    assert_eq!(
        decode_downlink(&core.transport.last().unwrap()).unwrap().id,
        gmm(GmmMessageType::AttachAccept)
    );
}

/// An authentication response without its mandatory IEs aborts
/// authentication with GMM Status 96, and the attach goes with it.
#[test]
fn test_undecodable_response_unwinds_attach() {
    init_test_logging();
    let (core, scheduler) = MockCore::recording(core_config()).unwrap();
    let mut session = core.session(40);

    session
        .handle_uplink(&attach_request(&MobileIdentity::Imsi(TEST_IMSI.into())))
        .unwrap();
    assert_eq!(session.stack().len(), 2);

    let err = session.handle_uplink(&[0x08, 0x13]).unwrap_err();
    assert_eq!(
        err,
        ProcedureError::Decode(DecodeError::MissingMandatoryIe(vec!["ACRef".into()]))
    );
    assert_eq!(
        core.transport.last().unwrap().as_ref(),
        &[0x08, 0x20, gmm_cause::INVALID_MANDATORY_INFORMATION]
    );
    assert_eq!(
        core.downlink_ids(session.id()),
        vec![
            gmm(GmmMessageType::AuthenticationCipheringRequest),
            gmm(GmmMessageType::GmmStatus),
        ]
    );
    assert!(session.stack().is_empty());
    assert!(session.stack().preempted_by().is_none());
    assert!(scheduler.armed().is_empty());
    assert!(!session.ue().is_registered());

    // The terminal can start over
    session
        .handle_uplink(&attach_request(&MobileIdentity::Imsi(TEST_IMSI.into())))
        .unwrap();
    assert_eq!(session.stack().len(), 2);
}

/// A response cut inside an IE is a truncation and is answered the same way.
#[test]
fn test_truncated_response_unwinds_attach() {
    init_test_logging();
    let (core, _scheduler) = MockCore::recording(core_config()).unwrap();
    let mut session = core.session(41);

    session
        .handle_uplink(&attach_request(&MobileIdentity::Imsi(TEST_IMSI.into())))
        .unwrap();
    // RES tagged but one octet of four present
    let err = session.handle_uplink(&[0x08, 0x13, 0x01, 0x22, 0xAA]).unwrap_err();
    assert!(matches!(
        err,
        ProcedureError::Decode(DecodeError::TruncatedInput { .. })
    ));
    assert_eq!(
        core.transport.last().unwrap().as_ref(),
        &[0x08, 0x20, gmm_cause::INVALID_MANDATORY_INFORMATION]
    );
    assert!(session.stack().is_empty());
    assert!(session.stack().preempted_by().is_none());
}

/// An attach request missing its mandatory IEs is rejected with cause 96
/// and never reaches the stack.
#[test]
fn test_undecodable_attach_request_rejected() {
    init_test_logging();
    let (core, scheduler) = MockCore::recording(core_config()).unwrap();
    let mut session = core.session(42);

    let err = session.handle_uplink(&[0x08, 0x01]).unwrap_err();
    match err {
        ProcedureError::Decode(DecodeError::MissingMandatoryIe(names)) => {
            assert_eq!(names.first().map(String::as_str), Some("MSNetworkCap"));
            assert!(names.iter().any(|n| n == "MobileId"));
        }
        other => panic!("expected missing IEs, got {other:?}"),
    }
    assert_eq!(
        core.transport.last().unwrap().as_ref(),
        &[0x08, 0x04, gmm_cause::INVALID_MANDATORY_INFORMATION]
    );
    assert!(session.stack().is_empty());
    assert!(session.stack().preempted_by().is_none());
    assert!(scheduler.armed().is_empty());
    assert_eq!(core.policy.allocated_count(), 0);
}
