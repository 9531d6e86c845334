//! Mock collaborators for scenario tests
//!
//! Provides the pieces a running core plugs into the procedures: a
//! recording transport, a scripted AuC, recording and tokio-backed
//! schedulers, and a scripted terminal that answers downlink messages.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use bytes::Bytes;
use pscore_common::{CoreConfig, MobileIdentity};
use pscore_gmm::{
    AccessSecurity, AuthParams, AuthVector, AuthVectorProvider, Collaborators, CoreEnv,
    DirectoryPolicy, Scheduler, Session, SessionId, TimerKey, Transport, VectorKind,
};
use pscore_l3::{DescriptorError, GmmMessageType, Message, MessageId};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::test_fixtures::{
    attach_complete, auth_response, decode_downlink, detach_accept, identity_response,
    ptmsi_reallocation_complete, rau_complete, TEST_IMEISV,
};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Mock core errors
#[derive(Debug, Error)]
pub enum MockCoreError {
    #[error("Catalogue error: {0}")]
    Catalogue(#[from] DescriptorError),
    #[error("Downlink decode failed: {0}")]
    Decode(#[from] pscore_l3::DecodeError),
}

// ============================================================================
// Transport
// ============================================================================

/// Transport recording every downlink PDU, optionally forwarding it to a
/// per-session channel.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<(SessionId, Bytes)>>,
    routes: Mutex<HashMap<SessionId, mpsc::UnboundedSender<Bytes>>>,
}

impl RecordingTransport {
    /// Creates a transport with no routes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Forwards the downlink of `session` to a channel.
    pub fn route(&self, session: SessionId) -> mpsc::UnboundedReceiver<Bytes> {
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.routes).insert(session, tx);
        rx
    }

    /// PDUs sent to `session`, oldest first.
    pub fn sent_to(&self, session: SessionId) -> Vec<Bytes> {
        lock(&self.sent)
            .iter()
            .filter(|(s, _)| *s == session)
            .map(|(_, pdu)| pdu.clone())
            .collect()
    }

    /// Last PDU sent to any session.
    pub fn last(&self) -> Option<Bytes> {
        lock(&self.sent).last().map(|(_, pdu)| pdu.clone())
    }

    /// Number of PDUs sent.
    pub fn count(&self) -> usize {
        lock(&self.sent).len()
    }
}

impl Transport for RecordingTransport {
    fn send(&self, session: SessionId, pdu: Bytes) {
        if let Some(tx) = lock(&self.routes).get(&session) {
            let _ = tx.send(pdu.clone());
        }
        lock(&self.sent).push((session, pdu));
    }
}

// ============================================================================
// Authentication centre
// ============================================================================

/// Response a terminal computes for a challenge.
pub fn expected_response(rand: &[u8]) -> [u8; 4] {
    let mut res = [0u8; 4];
    for (i, octet) in rand.iter().enumerate() {
        res[i % 4] ^= octet.rotate_left(i as u32 % 8);
    }
    res
}

/// AuC deriving vectors from a per-subscriber counter.
#[derive(Debug, Default)]
pub struct ScriptedAuc {
    counters: Mutex<HashMap<String, u8>>,
    resyncs: Mutex<u32>,
    refuse_resync: bool,
}

impl ScriptedAuc {
    /// Creates an AuC that accepts resynchronisation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an AuC that refuses resynchronisation.
    pub fn refusing_resync() -> Self {
        Self {
            refuse_resync: true,
            ..Self::default()
        }
    }

    /// Number of resynchronisation requests seen.
    pub fn resync_count(&self) -> u32 {
        *lock(&self.resyncs)
    }
}

impl AuthVectorProvider for ScriptedAuc {
    fn make_vector(&self, imsi: &str, params: &AuthParams) -> Option<AuthVector> {
        let mut counters = lock(&self.counters);
        let counter = counters.entry(imsi.to_string()).or_default();
        *counter = counter.wrapping_add(1);

        let mut rand = [0u8; 16];
        for (i, digit) in imsi.bytes().enumerate() {
            rand[i % 16] ^= digit;
        }
        rand[15] = *counter;
        let xres = expected_response(&rand);
        Some(AuthVector {
            kind: if params.umts { VectorKind::Umts } else { VectorKind::Gsm },
            rand,
            xres: Bytes::copy_from_slice(&xres),
            autn: params.umts.then(|| Bytes::from(vec![0x5Au8; 16])),
        })
    }

    fn resynchronize(&self, imsi: &str, _rand: &[u8; 16], auts: &[u8]) -> bool {
        *lock(&self.resyncs) += 1;
        debug!(imsi, auts = auts.len(), "AuC resynchronisation");
        !self.refuse_resync
    }
}

/// Access network that accepts every security mode command.
#[derive(Debug, Default)]
pub struct AcceptingAccess;

impl AccessSecurity for AcceptingAccess {
    fn security_mode_command(&self, _session: SessionId, _cksn: u8, _kind: VectorKind) -> bool {
        true
    }
}

// ============================================================================
// Schedulers
// ============================================================================

/// Scheduler that only records what is armed.
#[derive(Debug, Default)]
pub struct RecordingScheduler {
    armed: Mutex<Vec<(TimerKey, &'static str, Duration)>>,
}

impl RecordingScheduler {
    /// Creates an empty scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Timers currently armed, oldest first.
    pub fn armed(&self) -> Vec<(TimerKey, &'static str)> {
        lock(&self.armed).iter().map(|(k, n, _)| (*k, *n)).collect()
    }

    /// Most recently armed timer with the given name.
    pub fn armed_key(&self, name: &str) -> Option<TimerKey> {
        lock(&self.armed)
            .iter()
            .rev()
            .find(|(_, n, _)| *n == name)
            .map(|(k, _, _)| *k)
    }
}

impl Scheduler for RecordingScheduler {
    fn start_timer(&self, key: TimerKey, name: &'static str, duration: Duration) {
        lock(&self.armed).push((key, name, duration));
    }

    fn cancel_timer(&self, key: TimerKey) {
        lock(&self.armed).retain(|(k, _, _)| *k != key);
    }
}

/// Scheduler arming tokio sleeps that report expiries on a channel.
#[derive(Debug)]
pub struct TokioScheduler {
    expired: mpsc::UnboundedSender<TimerKey>,
    tasks: Mutex<HashMap<TimerKey, JoinHandle<()>>>,
}

impl TokioScheduler {
    /// Creates the scheduler and the receiving end of its expiries.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TimerKey>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let scheduler = Self {
            expired: tx,
            tasks: Mutex::new(HashMap::new()),
        };
        (scheduler, rx)
    }
}

impl Scheduler for TokioScheduler {
    fn start_timer(&self, key: TimerKey, name: &'static str, duration: Duration) {
        let tx = self.expired.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            debug!(timer = name, "Timer fired");
            let _ = tx.send(key);
        });
        lock(&self.tasks).insert(key, handle);
    }

    fn cancel_timer(&self, key: TimerKey) {
        if let Some(handle) = lock(&self.tasks).remove(&key) {
            handle.abort();
        }
    }
}

// ============================================================================
// Core
// ============================================================================

/// A core environment wired to mock collaborators.
pub struct MockCore {
    pub env: Arc<CoreEnv>,
    pub transport: Arc<RecordingTransport>,
    pub auc: Arc<ScriptedAuc>,
    pub policy: Arc<DirectoryPolicy>,
}

impl MockCore {
    /// Builds a core with the given scheduler.
    pub fn new(
        config: CoreConfig,
        auc: ScriptedAuc,
        scheduler: Arc<dyn Scheduler>,
    ) -> Result<Self, MockCoreError> {
        let transport = Arc::new(RecordingTransport::new());
        let auc = Arc::new(auc);
        let policy = Arc::new(DirectoryPolicy::new(&config.subscribers));
        let collaborators = Collaborators {
            policy: policy.clone(),
            auc: auc.clone(),
            transport: transport.clone(),
            scheduler,
            access_security: Arc::new(AcceptingAccess),
        };
        let env = Arc::new(CoreEnv::new(config, collaborators)?);
        Ok(Self {
            env,
            transport,
            auc,
            policy,
        })
    }

    /// Builds a core with a recording scheduler, returned alongside.
    pub fn recording(config: CoreConfig) -> Result<(Self, Arc<RecordingScheduler>), MockCoreError> {
        let scheduler = Arc::new(RecordingScheduler::new());
        let core = Self::new(config, ScriptedAuc::new(), scheduler.clone())?;
        Ok((core, scheduler))
    }

    /// Creates a session for terminal `n`.
    pub fn session(&self, n: u32) -> Session {
        Session::new(SessionId(n), self.env.clone())
    }

    /// Downlink messages sent to a session, decoded.
    pub fn downlink(&self, session: SessionId) -> Result<Vec<Message>, MockCoreError> {
        self.transport
            .sent_to(session)
            .iter()
            .map(|pdu| decode_downlink(pdu).map_err(MockCoreError::from))
            .collect()
    }

    /// Message ids sent to a session.
    pub fn downlink_ids(&self, session: SessionId) -> Vec<MessageId> {
        self.downlink(session)
            .map(|msgs| msgs.into_iter().map(|m| m.id).collect())
            .unwrap_or_default()
    }
}

// ============================================================================
// Terminal
// ============================================================================

/// A terminal answering the network the way a well-behaved MS does.
#[derive(Debug, Clone)]
pub struct ScriptedTerminal {
    pub imsi: String,
}

impl ScriptedTerminal {
    /// Creates a terminal with the given IMSI.
    pub fn new(imsi: impl Into<String>) -> Self {
        Self { imsi: imsi.into() }
    }

    /// Uplink answer to a downlink PDU, if the message calls for one.
    pub fn respond(&self, pdu: &[u8]) -> Result<Option<Vec<u8>>, MockCoreError> {
        let msg = decode_downlink(pdu)?;
        let Ok(t) = GmmMessageType::try_from(msg.id.msg_type) else {
            return Ok(None);
        };
        if msg.id.is_sm() {
            return Ok(None);
        }
        let answer = match t {
            GmmMessageType::IdentityRequest => {
                let identity = match msg.uint("IDType") {
                    Some(3) => MobileIdentity::Imeisv(TEST_IMEISV.into()),
                    _ => MobileIdentity::Imsi(self.imsi.clone()),
                };
                Some(identity_response(&identity))
            }
            GmmMessageType::AuthenticationCipheringRequest => {
                let rand = msg.bytes("RAND").map(|b| b.to_vec()).unwrap_or_default();
                let ac_ref = msg.uint("ACRef").unwrap_or_default() as u8;
                Some(auth_response(ac_ref, &expected_response(&rand)))
            }
            GmmMessageType::AttachAccept => Some(attach_complete()),
            GmmMessageType::RoutingAreaUpdateAccept if msg.has("AllocPTMSI") => Some(rau_complete()),
            GmmMessageType::PtmsiReallocationCommand => Some(ptmsi_reallocation_complete()),
            GmmMessageType::DetachRequest => Some(detach_accept()),
            _ => None,
        };
        Ok(answer)
    }
}
