//! In-memory collaborators for unit tests.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use bytes::Bytes;
use pscore_common::{CoreConfig, Direction, MobileIdentity, SubscriberEntry};
use pscore_l3::{Catalogue, Message};

use crate::context::SessionId;
use crate::env::{Collaborators, CoreEnv};
use crate::provider::{
    AccessSecurity, AuthParams, AuthVector, AuthVectorProvider, DirectoryPolicy, Scheduler,
    SubscriberPolicy, SubscriberProfile, TimerKey, Transport, VectorKind,
};
use crate::session::Session;

/// Challenge handed out by the mock AuC.
pub const RAND: [u8; 16] = [
    0x10, 0x11, 0x12, 0x13, 0x14, 0x15, 0x16, 0x17, 0x18, 0x19, 0x1A, 0x1B, 0x1C, 0x1D, 0x1E, 0x1F,
];
/// Expected response of every mock vector.
pub const XRES: [u8; 4] = [0xDE, 0xAD, 0xBE, 0xEF];
const AUTN: [u8; 16] = [0xA5; 16];

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(g) => g,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Encodes an uplink message with the GPRS catalogue.
pub fn encode_uplink(msg: Message) -> Vec<u8> {
    Catalogue::gprs()
        .unwrap()
        .encode(Direction::Uplink, &msg)
        .unwrap()
        .to_vec()
}

#[derive(Debug, Default)]
pub struct MockTransport {
    sent: Mutex<Vec<Bytes>>,
}

impl MockTransport {
    pub fn count(&self) -> usize {
        lock(&self.sent).len()
    }

    pub fn last(&self) -> Option<Bytes> {
        lock(&self.sent).last().cloned()
    }
}

impl Transport for MockTransport {
    fn send(&self, _session: SessionId, pdu: Bytes) {
        lock(&self.sent).push(pdu);
    }
}

#[derive(Debug, Default)]
pub struct MockScheduler {
    active: Mutex<VecDeque<(TimerKey, &'static str)>>,
    last: Mutex<Option<TimerKey>>,
}

impl MockScheduler {
    pub fn active_names(&self) -> Vec<&'static str> {
        lock(&self.active).iter().map(|(_, name)| *name).collect()
    }

    pub fn last_key(&self) -> Option<TimerKey> {
        *lock(&self.last)
    }
}

impl Scheduler for MockScheduler {
    fn start_timer(&self, key: TimerKey, name: &'static str, _duration: Duration) {
        lock(&self.active).push_back((key, name));
        *lock(&self.last) = Some(key);
    }

    fn cancel_timer(&self, key: TimerKey) {
        lock(&self.active).retain(|(k, _)| *k != key);
    }
}

#[derive(Debug, Default)]
pub struct MockAuc {
    resyncs: Mutex<usize>,
}

impl MockAuc {
    pub fn resync_count(&self) -> usize {
        *lock(&self.resyncs)
    }
}

impl AuthVectorProvider for MockAuc {
    fn make_vector(&self, _imsi: &str, params: &AuthParams) -> Option<AuthVector> {
        let kind = if params.umts { VectorKind::Umts } else { VectorKind::Gsm };
        Some(AuthVector {
            kind,
            rand: RAND,
            xres: Bytes::from_static(&XRES),
            autn: params.umts.then(|| Bytes::from_static(&AUTN)),
        })
    }

    fn resynchronize(&self, _imsi: &str, _rand: &[u8; 16], _auts: &[u8]) -> bool {
        *lock(&self.resyncs) += 1;
        true
    }
}

/// Directory policy admitting every IMSI except the denied ones.
#[derive(Debug)]
pub struct MockPolicy {
    directory: DirectoryPolicy,
    denied: Mutex<HashSet<String>>,
}

impl MockPolicy {
    fn new() -> Self {
        let wildcard = SubscriberEntry {
            imsi: "*".into(),
            usim: false,
            msisdn: None,
            address: None,
        };
        Self {
            directory: DirectoryPolicy::new(&[wildcard]),
            denied: Mutex::new(HashSet::new()),
        }
    }

    pub fn deny(&self, imsi: &str) {
        lock(&self.denied).insert(imsi.to_string());
    }

    pub fn profile(&self, imsi: &str, usim: bool) -> Option<SubscriberProfile> {
        self.resolve_config(&MobileIdentity::Imsi(imsi.into()))
            .map(|p| SubscriberProfile { usim, ..p })
    }

    pub fn allocated_count(&self) -> usize {
        self.directory.allocated_count()
    }
}

impl SubscriberPolicy for MockPolicy {
    fn is_identity_allowed(&self, identity: &MobileIdentity) -> bool {
        let denied = identity
            .digits()
            .is_some_and(|d| lock(&self.denied).contains(d));
        !denied && self.directory.is_identity_allowed(identity)
    }

    fn resolve_config(&self, identity: &MobileIdentity) -> Option<SubscriberProfile> {
        self.directory.resolve_config(identity)
    }

    fn allocate_temporary_identity(&self) -> u32 {
        self.directory.allocate_temporary_identity()
    }

    fn release_temporary_identity(&self, ptmsi: u32) {
        self.directory.release_temporary_identity(ptmsi)
    }
}

#[derive(Debug)]
pub struct MockAccess {
    accept: AtomicBool,
    commands: Mutex<usize>,
}

impl MockAccess {
    pub fn commands(&self) -> usize {
        *lock(&self.commands)
    }

    pub fn set_accept(&self, accept: bool) {
        self.accept.store(accept, Ordering::SeqCst);
    }
}

impl AccessSecurity for MockAccess {
    fn security_mode_command(&self, _session: SessionId, _cksn: u8, _kind: VectorKind) -> bool {
        *lock(&self.commands) += 1;
        self.accept.load(Ordering::SeqCst)
    }
}

/// A core environment wired to mock collaborators.
pub struct MockEnv {
    pub env: Arc<CoreEnv>,
    pub transport: Arc<MockTransport>,
    pub scheduler: Arc<MockScheduler>,
    pub auc: Arc<MockAuc>,
    pub policy: Arc<MockPolicy>,
    pub access: Arc<MockAccess>,
}

impl MockEnv {
    pub fn new() -> Self {
        Self::with_config(CoreConfig::default())
    }

    pub fn with_config(config: CoreConfig) -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("debug")
            .with_test_writer()
            .try_init();
        let transport = Arc::new(MockTransport::default());
        let scheduler = Arc::new(MockScheduler::default());
        let auc = Arc::new(MockAuc::default());
        let policy = Arc::new(MockPolicy::new());
        let access = Arc::new(MockAccess {
            accept: AtomicBool::new(true),
            commands: Mutex::new(0),
        });
        let collaborators = Collaborators {
            policy: policy.clone(),
            auc: auc.clone(),
            transport: transport.clone(),
            scheduler: scheduler.clone(),
            access_security: access.clone(),
        };
        let env = Arc::new(CoreEnv::new(config, collaborators).unwrap());
        Self {
            env,
            transport,
            scheduler,
            auc,
            policy,
            access,
        }
    }

    pub fn session(&self, id: u32) -> Session {
        Session::new(SessionId(id), self.env.clone())
    }
}
