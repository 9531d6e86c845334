//! Packet-switched core types: PLMN, RAI and mobile identities.

use std::fmt;

use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};

/// Public Land Mobile Network identifier.
///
/// `long_mnc` tells whether the MNC carries 3 digits (true) or 2 (false).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Plmn {
    /// Mobile Country Code (0-999)
    pub mcc: u16,
    /// Mobile Network Code (0-999)
    pub mnc: u16,
    /// True if MNC is 3 digits
    #[serde(default)]
    pub long_mnc: bool,
}

impl Plmn {
    /// Creates a new PLMN.
    pub const fn new(mcc: u16, mnc: u16, long_mnc: bool) -> Self {
        Self { mcc, mnc, long_mnc }
    }

    /// Parses a 5 or 6 digit string (MCC followed by MNC).
    pub fn from_digits(digits: &str) -> Option<Self> {
        if !(5..=6).contains(&digits.len()) || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let mcc = digits[..3].parse().ok()?;
        let mnc = digits[3..].parse().ok()?;
        Some(Self::new(mcc, mnc, digits.len() == 6))
    }

    /// Encodes the PLMN into the 3-octet layout of TS 24.008 10.5.1.3.
    ///
    /// - Octet 1: MCC digit 2 (high nibble) | MCC digit 1 (low nibble)
    /// - Octet 2: MNC digit 3 or 0xF (high nibble) | MCC digit 3 (low nibble)
    /// - Octet 3: MNC digit 2 (high nibble) | MNC digit 1 (low nibble)
    pub fn encode(&self) -> [u8; 3] {
        let mcc1 = ((self.mcc / 100) % 10) as u8;
        let mcc2 = ((self.mcc / 10) % 10) as u8;
        let mcc3 = (self.mcc % 10) as u8;

        let (mnc1, mnc2, mnc3) = if self.long_mnc {
            (
                ((self.mnc / 100) % 10) as u8,
                ((self.mnc / 10) % 10) as u8,
                (self.mnc % 10) as u8,
            )
        } else {
            (((self.mnc / 10) % 10) as u8, (self.mnc % 10) as u8, 0x0F)
        };

        [(mcc2 << 4) | mcc1, (mnc3 << 4) | mcc3, (mnc2 << 4) | mnc1]
    }

    /// Decodes the 3-octet layout.
    pub fn decode(bytes: [u8; 3]) -> Self {
        let mcc1 = u16::from(bytes[0] & 0x0F);
        let mcc2 = u16::from(bytes[0] >> 4);
        let mcc3 = u16::from(bytes[1] & 0x0F);
        let mnc3 = bytes[1] >> 4;
        let mnc1 = u16::from(bytes[2] & 0x0F);
        let mnc2 = u16::from(bytes[2] >> 4);

        let mcc = 100 * mcc1 + 10 * mcc2 + mcc3;
        if mnc3 == 0x0F {
            Self::new(mcc, 10 * mnc1 + mnc2, false)
        } else {
            Self::new(mcc, 100 * mnc1 + 10 * mnc2 + u16::from(mnc3), true)
        }
    }
}

impl fmt::Debug for Plmn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Plmn({self})")
    }
}

impl fmt::Display for Plmn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.long_mnc {
            write!(f, "{:03}{:03}", self.mcc, self.mnc)
        } else {
            write!(f, "{:03}{:02}", self.mcc, self.mnc)
        }
    }
}

impl Default for Plmn {
    fn default() -> Self {
        Self::new(1, 1, false)
    }
}

/// Routing Area Identification (TS 24.008 10.5.5.15).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rai {
    /// Serving PLMN
    pub plmn: Plmn,
    /// Location Area Code
    pub lac: u16,
    /// Routing Area Code
    pub rac: u8,
}

impl Rai {
    /// Creates a new RAI.
    pub const fn new(plmn: Plmn, lac: u16, rac: u8) -> Self {
        Self { plmn, lac, rac }
    }

    /// Encodes the 6-octet value part.
    pub fn encode(&self) -> [u8; 6] {
        let plmn = self.plmn.encode();
        let lac = self.lac.to_be_bytes();
        [plmn[0], plmn[1], plmn[2], lac[0], lac[1], self.rac]
    }

    /// Decodes the 6-octet value part.
    pub fn decode(bytes: [u8; 6]) -> Self {
        Self {
            plmn: Plmn::decode([bytes[0], bytes[1], bytes[2]]),
            lac: u16::from_be_bytes([bytes[3], bytes[4]]),
            rac: bytes[5],
        }
    }
}

impl fmt::Display for Rai {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:04x}-{:02x}", self.plmn, self.lac, self.rac)
    }
}

/// Type of identity (TS 24.008 10.5.1.4 / 10.5.5.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum IdentityType {
    /// No identity
    NoIdentity = 0,
    /// International Mobile Subscriber Identity
    Imsi = 1,
    /// International Mobile Equipment Identity
    Imei = 2,
    /// IMEI with software version
    Imeisv = 3,
    /// TMSI or P-TMSI
    Tmsi = 4,
    /// Temporary Mobile Group Identity
    Tmgi = 5,
}

impl fmt::Display for IdentityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IdentityType::NoIdentity => "none",
            IdentityType::Imsi => "IMSI",
            IdentityType::Imei => "IMEI",
            IdentityType::Imeisv => "IMEISV",
            IdentityType::Tmsi => "TMSI",
            IdentityType::Tmgi => "TMGI",
        };
        write!(f, "{s}")
    }
}

/// A decoded mobile identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MobileIdentity {
    /// Identity absent
    NoIdentity,
    /// IMSI digits
    Imsi(String),
    /// IMEI digits
    Imei(String),
    /// IMEISV digits
    Imeisv(String),
    /// TMSI or P-TMSI
    Tmsi(u32),
    /// MBMS group identity
    Tmgi {
        /// MBMS service ID (24 bits)
        service_id: u32,
        /// PLMN of the service, when signalled
        plmn: Option<Plmn>,
        /// MBMS session identity, when signalled
        session_id: Option<u8>,
    },
}

impl MobileIdentity {
    /// Returns the identity type code.
    pub fn identity_type(&self) -> IdentityType {
        match self {
            MobileIdentity::NoIdentity => IdentityType::NoIdentity,
            MobileIdentity::Imsi(_) => IdentityType::Imsi,
            MobileIdentity::Imei(_) => IdentityType::Imei,
            MobileIdentity::Imeisv(_) => IdentityType::Imeisv,
            MobileIdentity::Tmsi(_) => IdentityType::Tmsi,
            MobileIdentity::Tmgi { .. } => IdentityType::Tmgi,
        }
    }

    /// Returns the digit string for IMSI, IMEI and IMEISV identities.
    pub fn digits(&self) -> Option<&str> {
        match self {
            MobileIdentity::Imsi(d) | MobileIdentity::Imei(d) | MobileIdentity::Imeisv(d) => {
                Some(d)
            }
            _ => None,
        }
    }
}

impl fmt::Display for MobileIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MobileIdentity::NoIdentity => write!(f, "no-identity"),
            MobileIdentity::Imsi(d) => write!(f, "imsi-{d}"),
            MobileIdentity::Imei(d) => write!(f, "imei-{d}"),
            MobileIdentity::Imeisv(d) => write!(f, "imeisv-{d}"),
            MobileIdentity::Tmsi(t) => write!(f, "tmsi-{t:08x}"),
            MobileIdentity::Tmgi { service_id, .. } => write!(f, "tmgi-{service_id:06x}"),
        }
    }
}
