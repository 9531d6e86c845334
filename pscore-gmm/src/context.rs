//! Per-terminal context
//!
//! The session owns one [`UeContext`]. Procedures read and update it
//! through the procedure context for the duration of a call and never keep
//! a reference to it.

use std::collections::BTreeMap;
use std::fmt;
use std::net::Ipv4Addr;

use bytes::Bytes;
use pscore_common::{IdentityType, MobileIdentity, Rai};

use crate::provider::{AuthVector, SubscriberProfile};

/// Identifies a terminal session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u32);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ue-{}", self.0)
    }
}

/// GMM state of the terminal, network side (TS 24.008 Section 4.1.3.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GmmState {
    /// No GMM context
    #[default]
    Deregistered,
    /// Attach accepted, waiting for completion
    CommonProcedureInitiated,
    /// GMM context established
    Registered,
}

impl fmt::Display for GmmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GmmState::Deregistered => write!(f, "GMM-DEREGISTERED"),
            GmmState::CommonProcedureInitiated => write!(f, "GMM-COMMON-PROCEDURE-INITIATED"),
            GmmState::Registered => write!(f, "GMM-REGISTERED"),
        }
    }
}

/// Ciphering key sequence number meaning "no key available".
pub const CKSN_NONE: u8 = 7;

/// Security context established by authentication.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecurityContext {
    /// Key set of the last successful authentication
    pub cksn: Option<u8>,
    /// Vector the key set was derived from
    pub vector: Option<AuthVector>,
    /// Security mode control completed on the radio side
    pub activated: bool,
    last_cksn: Option<u8>,
}

impl SecurityContext {
    /// Returns the next key set sequence number, cycling through 0..=6.
    pub fn next_cksn(&mut self) -> u8 {
        let next = match self.last_cksn {
            Some(c) if c < 6 => c + 1,
            _ => 0,
        };
        self.last_cksn = Some(next);
        next
    }

    /// Returns true once authentication succeeded.
    pub fn is_established(&self) -> bool {
        self.cksn.is_some() && self.vector.is_some()
    }

    /// Drops the key set.
    pub fn clear(&mut self) {
        self.cksn = None;
        self.vector = None;
        self.activated = false;
    }
}

/// One active PDP context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdpContext {
    /// Transaction identifier value chosen by the terminal
    pub ti: u8,
    /// Network service access point identifier
    pub nsapi: u8,
    /// LLC service access point identifier
    pub llc_sapi: u8,
    /// Allocated address
    pub address: Ipv4Addr,
    /// Access point name labels joined by dots
    pub apn: Option<String>,
    /// Negotiated QoS octets
    pub qos: Bytes,
}

/// Everything the network knows about one terminal.
#[derive(Debug, Clone, Default)]
pub struct UeContext {
    /// Subscriber identity
    pub imsi: Option<String>,
    /// Equipment identity
    pub imei: Option<String>,
    /// Equipment identity with software version
    pub imeisv: Option<String>,
    /// Current P-TMSI
    pub ptmsi: Option<u32>,
    /// P-TMSI sent to the terminal and not yet acknowledged
    pub pending_ptmsi: Option<u32>,
    /// Subscription data
    pub profile: Option<SubscriberProfile>,
    /// GMM state
    pub gmm_state: GmmState,
    /// Security context
    pub security: SecurityContext,
    /// Last routing area reported by the terminal
    pub rai: Option<Rai>,
    /// MS network capability octets
    pub ms_network_cap: Option<Bytes>,
    /// MS radio access capability octets
    pub ms_ra_cap: Option<Bytes>,
    /// DRX parameter octets
    pub drx: Option<Bytes>,
    /// Emergency attach in progress
    pub emergency: bool,
    /// PDP contexts by transaction identifier
    pub pdp: BTreeMap<u8, PdpContext>,
}

impl UeContext {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores an identity reported by the terminal.
    ///
    /// A TMSI is stored only when it matches the current P-TMSI; an
    /// unrelated TMSI cannot be resolved without the IMSI.
    pub fn set_identity(&mut self, identity: &MobileIdentity) {
        match identity {
            MobileIdentity::Imsi(d) => self.imsi = Some(d.clone()),
            MobileIdentity::Imei(d) => self.imei = Some(d.clone()),
            MobileIdentity::Imeisv(d) => self.imeisv = Some(d.clone()),
            MobileIdentity::Tmsi(_) | MobileIdentity::NoIdentity | MobileIdentity::Tmgi { .. } => {}
        }
    }

    /// Returns the stored identity of the given type.
    pub fn identity(&self, kind: IdentityType) -> Option<MobileIdentity> {
        match kind {
            IdentityType::Imsi => self.imsi.clone().map(MobileIdentity::Imsi),
            IdentityType::Imei => self.imei.clone().map(MobileIdentity::Imei),
            IdentityType::Imeisv => self.imeisv.clone().map(MobileIdentity::Imeisv),
            IdentityType::Tmsi => self.ptmsi.map(MobileIdentity::Tmsi),
            IdentityType::NoIdentity | IdentityType::Tmgi => None,
        }
    }

    /// Returns true if the terminal is GMM-registered.
    pub fn is_registered(&self) -> bool {
        self.gmm_state == GmmState::Registered
    }

    /// Confirms the pending P-TMSI.
    ///
    /// Returns the previous P-TMSI, which the caller releases.
    pub fn confirm_ptmsi(&mut self) -> Option<u32> {
        match self.pending_ptmsi.take() {
            Some(new) => self.ptmsi.replace(new).filter(|old| *old != new),
            None => None,
        }
    }

    /// Clears the GMM context after a detach or reject.
    ///
    /// Returns the PDP contexts that were active.
    pub fn detach(&mut self) -> Vec<PdpContext> {
        self.gmm_state = GmmState::Deregistered;
        self.security.clear();
        self.emergency = false;
        std::mem::take(&mut self.pdp).into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cksn_rotation() {
        let mut sec = SecurityContext::default();
        let seq: Vec<u8> = (0..9).map(|_| sec.next_cksn()).collect();
        assert_eq!(seq, vec![0, 1, 2, 3, 4, 5, 6, 0, 1]);
    }

    #[test]
    fn test_identity_storage() {
        let mut ue = UeContext::new();
        ue.set_identity(&MobileIdentity::Imsi("001010000000001".into()));
        ue.set_identity(&MobileIdentity::Tmsi(5));
        assert_eq!(
            ue.identity(IdentityType::Imsi),
            Some(MobileIdentity::Imsi("001010000000001".into()))
        );
        assert_eq!(ue.identity(IdentityType::Tmsi), None);
        ue.ptmsi = Some(5);
        assert_eq!(ue.identity(IdentityType::Tmsi), Some(MobileIdentity::Tmsi(5)));
    }

    #[test]
    fn test_confirm_ptmsi() {
        let mut ue = UeContext::new();
        ue.pending_ptmsi = Some(0xC000_0001);
        assert_eq!(ue.confirm_ptmsi(), None);
        assert_eq!(ue.ptmsi, Some(0xC000_0001));
        ue.pending_ptmsi = Some(0xC000_0002);
        assert_eq!(ue.confirm_ptmsi(), Some(0xC000_0001));
        assert_eq!(ue.confirm_ptmsi(), None);
    }

    #[test]
    fn test_detach_clears_context() {
        let mut ue = UeContext::new();
        ue.gmm_state = GmmState::Registered;
        ue.security.cksn = Some(1);
        ue.pdp.insert(
            0,
            PdpContext {
                ti: 0,
                nsapi: 5,
                llc_sapi: 3,
                address: Ipv4Addr::new(10, 45, 0, 2),
                apn: None,
                qos: Bytes::new(),
            },
        );
        let released = ue.detach();
        assert_eq!(released.len(), 1);
        assert!(!ue.is_registered());
        assert_eq!(ue.security.cksn, None);
        assert!(ue.pdp.is_empty());
    }
}
