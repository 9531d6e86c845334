//! Collaborator interfaces
//!
//! The procedures never own transport, subscriber data, authentication
//! vectors or timers. They reach them through these traits, injected once
//! per core and shared by every session.

use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;
use std::sync::Mutex;
use std::time::Duration;

use bytes::Bytes;
use pscore_common::config::DEFAULT_SUPERVISION_SECS;
use pscore_common::{GmmConfig, MobileIdentity, SubscriberEntry};
use rand::Rng;
use tracing::debug;

use crate::context::SessionId;
use crate::procedure::ProcId;

/// Downlink PDU sink.
pub trait Transport: Send + Sync {
    /// Hands a fully encoded layer-3 message to the transport.
    fn send(&self, session: SessionId, pdu: Bytes);
}

/// Subscription data resolved for an identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriberProfile {
    /// IMSI digits
    pub imsi: String,
    /// Subscriber holds a USIM
    pub usim: bool,
    /// MSISDN, informational
    pub msisdn: Option<String>,
    /// Static PDP address
    pub address: Option<Ipv4Addr>,
}

/// Subscriber and temporary identity policy.
pub trait SubscriberPolicy: Send + Sync {
    /// Returns true if the identity may use GPRS services.
    fn is_identity_allowed(&self, identity: &MobileIdentity) -> bool;

    /// Returns the subscription data of an identity.
    fn resolve_config(&self, identity: &MobileIdentity) -> Option<SubscriberProfile>;

    /// Allocates a P-TMSI not currently in use.
    fn allocate_temporary_identity(&self) -> u32;

    /// Returns a P-TMSI to the free set.
    fn release_temporary_identity(&self, _ptmsi: u32) {}
}

/// Generation of the authentication vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorKind {
    /// GSM triplet: RAND, SRES, Kc
    Gsm,
    /// UMTS quintuplet: RAND, XRES, CK, IK, AUTN
    Umts,
}

/// Authentication vector as seen by the procedures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthVector {
    /// Vector generation
    pub kind: VectorKind,
    /// Challenge
    pub rand: [u8; 16],
    /// Expected response (SRES or XRES)
    pub xres: Bytes,
    /// Network authentication token, UMTS only
    pub autn: Option<Bytes>,
}

/// Parameters of a vector request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthParams {
    /// Request a UMTS vector
    pub umts: bool,
}

/// Authentication centre.
pub trait AuthVectorProvider: Send + Sync {
    /// Produces a fresh vector for the subscriber.
    fn make_vector(&self, imsi: &str, params: &AuthParams) -> Option<AuthVector>;

    /// Resynchronises the sequence number from an AUTS token.
    fn resynchronize(&self, imsi: &str, rand: &[u8; 16], auts: &[u8]) -> bool;
}

/// Radio-level security activation (RANAP or RRC security mode command).
pub trait AccessSecurity: Send + Sync {
    /// Requests security activation with the given key set. The result is
    /// reported later through the session.
    fn security_mode_command(&self, session: SessionId, cksn: u8, kind: VectorKind) -> bool;
}

/// Identifies one arming of a procedure timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerKey {
    /// Owning session
    pub session: SessionId,
    /// Procedure that armed the timer
    pub proc: ProcId,
    /// Arming generation, stale expiries carry an older value
    pub generation: u64,
}

/// Deadline scheduler run by the surrounding layer.
pub trait Scheduler: Send + Sync {
    /// Arms a timer; expiry is reported through `Session::on_timer_expiry`.
    fn start_timer(&self, key: TimerKey, name: &'static str, duration: Duration);

    /// Cancels a timer. Cancelling an unknown key is a no-op.
    fn cancel_timer(&self, key: TimerKey);
}

/// Named timer lookup.
pub trait TimerConfig {
    /// Returns the configured duration of a named timer.
    fn get_timer_value(&self, name: &str) -> Option<Duration>;

    /// Duration of a named timer, falling back to the default supervision
    /// time for names without a configured value.
    fn timer_or_default(&self, name: &str) -> Duration {
        self.get_timer_value(name)
            .unwrap_or(Duration::from_secs(DEFAULT_SUPERVISION_SECS))
    }
}

impl TimerConfig for GmmConfig {
    fn get_timer_value(&self, name: &str) -> Option<Duration> {
        self.timer(name)
    }
}

/// In-memory subscriber policy backed by the configured directory.
///
/// An entry with IMSI `"*"` admits every subscriber. P-TMSIs are drawn at
/// random with the two high bits set, as TS 23.003 reserves for the PS
/// domain.
#[derive(Debug)]
pub struct DirectoryPolicy {
    entries: HashMap<String, SubscriberEntry>,
    wildcard: Option<SubscriberEntry>,
    allocated: Mutex<HashSet<u32>>,
}

impl DirectoryPolicy {
    /// Builds the policy from directory entries.
    pub fn new(subscribers: &[SubscriberEntry]) -> Self {
        let mut entries = HashMap::new();
        let mut wildcard = None;
        for entry in subscribers {
            if entry.imsi == "*" {
                wildcard = Some(entry.clone());
            } else {
                entries.insert(entry.imsi.clone(), entry.clone());
            }
        }
        Self {
            entries,
            wildcard,
            allocated: Mutex::new(HashSet::new()),
        }
    }

    fn lookup(&self, identity: &MobileIdentity) -> Option<&SubscriberEntry> {
        match identity {
            MobileIdentity::Imsi(imsi) => self.entries.get(imsi).or(self.wildcard.as_ref()),
            _ => None,
        }
    }

    /// Number of P-TMSIs handed out and not released.
    pub fn allocated_count(&self) -> usize {
        match self.allocated.lock() {
            Ok(set) => set.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}

impl SubscriberPolicy for DirectoryPolicy {
    fn is_identity_allowed(&self, identity: &MobileIdentity) -> bool {
        self.lookup(identity).is_some()
    }

    fn resolve_config(&self, identity: &MobileIdentity) -> Option<SubscriberProfile> {
        let entry = self.lookup(identity)?;
        Some(SubscriberProfile {
            imsi: identity.digits().unwrap_or_default().to_string(),
            usim: entry.usim,
            msisdn: entry.msisdn.clone(),
            address: entry.address,
        })
    }

    fn allocate_temporary_identity(&self) -> u32 {
        let mut set = match self.allocated.lock() {
            Ok(set) => set,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut rng = rand::thread_rng();
        loop {
            let ptmsi = rng.gen::<u32>() | 0xC000_0000;
            // All ones marks a deleted P-TMSI
            if ptmsi != u32::MAX && set.insert(ptmsi) {
                debug!(ptmsi = %format!("{ptmsi:08x}"), "P-TMSI allocated");
                return ptmsi;
            }
        }
    }

    fn release_temporary_identity(&self, ptmsi: u32) {
        let mut set = match self.allocated.lock() {
            Ok(set) => set,
            Err(poisoned) => poisoned.into_inner(),
        };
        set.remove(&ptmsi);
    }
}
