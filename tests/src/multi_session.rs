//! Multi-session integration tests
//!
//! Sessions share one core environment and run on independent tasks.
//! Timer tests run on a paused clock with the tokio-backed scheduler.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use integration_tests::test_fixtures::{attach_request, auth_response, decode_downlink};
use integration_tests::{
    core_config, expected_response, init_test_logging, test_imsi, wait_for_condition, MockCore,
    ScriptedAuc, ScriptedTerminal, TestResult, TokioScheduler, DEFAULT_POLL_INTERVAL,
    DEFAULT_TEST_TIMEOUT, TEST_IMSI,
};
use pscore_common::MobileIdentity;
use pscore_gmm::{Session, SessionId};
use pscore_l3::{GmmMessageType, MessageId};
use tokio::time::timeout;

const SESSION_COUNT: u32 = 16;

/// Runs one terminal through attach on its own task, answering the
/// downlink as it arrives.
async fn attach_terminal(core: Arc<MockCore>, n: u32) -> TestResult<Session> {
    let mut session = core.session(n);
    let mut downlink = core.transport.route(session.id());
    let terminal = ScriptedTerminal::new(test_imsi(n));

    let identity = MobileIdentity::Imsi(terminal.imsi.clone());
    session.handle_uplink(&attach_request(&identity))?;
    while !(session.ue().is_registered() && session.stack().is_empty()) {
        let pdu = timeout(DEFAULT_TEST_TIMEOUT, downlink.recv())
            .await?
            .ok_or("downlink closed")?;
        if let Some(answer) = terminal.respond(&pdu)? {
            session.handle_uplink(&answer)?;
        }
        tokio::task::yield_now().await;
    }
    Ok(session)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_attaches() -> TestResult {
    init_test_logging();
    let (core, _scheduler) = MockCore::recording(core_config())?;
    let core = Arc::new(core);

    let handles: Vec<_> = (1..=SESSION_COUNT)
        .map(|n| tokio::spawn(attach_terminal(core.clone(), n)))
        .collect();

    let mut ptmsis = HashSet::new();
    for handle in handles {
        let session = handle.await??;
        let ue = session.ue();
        assert_eq!(ue.imsi.as_deref(), Some(test_imsi(session.id().0).as_str()));
        let ptmsi = ue.ptmsi.ok_or("no P-TMSI after attach")?;
        assert!(ptmsis.insert(ptmsi), "P-TMSI {ptmsi:08x} assigned twice");
    }
    assert_eq!(ptmsis.len(), SESSION_COUNT as usize);
    assert_eq!(core.policy.allocated_count(), SESSION_COUNT as usize);

    for n in 1..=SESSION_COUNT {
        let ids: Vec<_> = core
            .downlink(SessionId(n))?
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(
            ids,
            vec![
                MessageId::gmm(GmmMessageType::AuthenticationCipheringRequest),
                MessageId::gmm(GmmMessageType::AttachAccept),
            ]
        );
    }
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_timer_expiry_aborts_attach() -> TestResult {
    init_test_logging();
    let (scheduler, mut expired) = TokioScheduler::new();
    let core = MockCore::new(core_config(), ScriptedAuc::new(), Arc::new(scheduler))?;
    let mut session = core.session(1);

    session.handle_uplink(&attach_request(&MobileIdentity::Imsi(TEST_IMSI.into())))?;
    assert_eq!(session.stack().len(), 2);

    let key = expired.recv().await.ok_or("scheduler dropped")?;
    assert_eq!(key.session, session.id());
    session.on_timer_expiry(key)?;

    assert!(session.stack().is_empty());
    assert!(session.stack().preempted_by().is_none());
    assert!(!session.ue().is_registered());
    assert_eq!(core.transport.count(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_completion_cancels_timers() -> TestResult {
    init_test_logging();
    let (scheduler, mut expired) = TokioScheduler::new();
    let core = MockCore::new(core_config(), ScriptedAuc::new(), Arc::new(scheduler))?;
    let mut session = core.session(2);

    session.handle_uplink(&attach_request(&MobileIdentity::Imsi(TEST_IMSI.into())))?;
    let challenge = decode_downlink(&core.transport.last().ok_or("no challenge")?)?;
    let rand = challenge.bytes("RAND").ok_or("no RAND")?.to_vec();
    session.handle_uplink(&auth_response(1, &expected_response(&rand)))?;
    session.handle_uplink(&integration_tests::test_fixtures::attach_complete())?;
    assert!(session.ue().is_registered());

    // Nothing fires once the procedures are done
    assert!(timeout(Duration::from_secs(60), expired.recv()).await.is_err());
    Ok(())
}

#[tokio::test]
async fn test_sessions_share_address_pool() -> TestResult {
    init_test_logging();
    let (core, _scheduler) = MockCore::recording(core_config())?;
    let core = Arc::new(core);

    let first = tokio::spawn(attach_terminal(core.clone(), 21));
    let second = tokio::spawn(attach_terminal(core.clone(), 22));
    let mut sessions = vec![first.await??, second.await??];

    for session in &mut sessions {
        session.handle_uplink(&integration_tests::test_fixtures::activate_pdp(0, "internet"))?;
    }
    wait_for_condition(
        || {
            let core = core.clone();
            async move { core.env.addresses.in_use() == 2 }
        },
        DEFAULT_TEST_TIMEOUT,
        DEFAULT_POLL_INTERVAL,
    )
    .await?;

    let addresses: HashSet<_> = sessions
        .iter()
        .filter_map(|s| s.ue().pdp.get(&0).map(|p| p.address))
        .collect();
    assert_eq!(addresses.len(), 2);
    Ok(())
}
