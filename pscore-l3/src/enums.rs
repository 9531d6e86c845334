//! Layer-3 protocol enumerations
//!
//! Based on 3GPP TS 24.007 and TS 24.008

use std::fmt;

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Protocol Discriminator
/// 3GPP TS 24.007 Section 11.2.3.1.1
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum ProtocolDiscriminator {
    /// GPRS mobility management messages
    Gmm = 0x08,
    /// GPRS session management messages
    Sm = 0x0A,
}

/// GMM Message Type
/// 3GPP TS 24.008 Section 10.4, Table 10.4
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum GmmMessageType {
    // Attach messages
    AttachRequest = 0x01,
    AttachAccept = 0x02,
    AttachComplete = 0x03,
    AttachReject = 0x04,

    // Detach messages (same codes in both directions)
    DetachRequest = 0x05,
    DetachAccept = 0x06,

    // Routing area update messages
    RoutingAreaUpdateRequest = 0x08,
    RoutingAreaUpdateAccept = 0x09,
    RoutingAreaUpdateComplete = 0x0A,
    RoutingAreaUpdateReject = 0x0B,

    // Service messages
    ServiceRequest = 0x0C,
    ServiceAccept = 0x0D,
    ServiceReject = 0x0E,

    // Common procedures
    PtmsiReallocationCommand = 0x10,
    PtmsiReallocationComplete = 0x11,
    AuthenticationCipheringRequest = 0x12,
    AuthenticationCipheringResponse = 0x13,
    AuthenticationCipheringReject = 0x14,
    AuthenticationCipheringFailure = 0x1C,
    IdentityRequest = 0x15,
    IdentityResponse = 0x16,

    // Status and information
    GmmStatus = 0x20,
    GmmInformation = 0x21,
}

/// SM Message Type
/// 3GPP TS 24.008 Section 10.4, Table 10.4a
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum SmMessageType {
    ActivatePdpContextRequest = 0x41,
    ActivatePdpContextAccept = 0x42,
    ActivatePdpContextReject = 0x43,
    DeactivatePdpContextRequest = 0x46,
    DeactivatePdpContextAccept = 0x47,
    SmStatus = 0x55,
}

/// Attach type
/// 3GPP TS 24.008 Section 10.5.5.2
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum AttachType {
    Gprs = 1,
    GprsWhileImsiAttached = 2,
    CombinedGprsImsi = 3,
    Emergency = 4,
}

impl fmt::Display for AttachType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AttachType::Gprs => "GPRS",
            AttachType::GprsWhileImsiAttached => "GPRS-while-IMSI-attached",
            AttachType::CombinedGprsImsi => "combined-GPRS/IMSI",
            AttachType::Emergency => "emergency",
        };
        write!(f, "{name}")
    }
}

/// Update type of a routing area update
/// 3GPP TS 24.008 Section 10.5.5.18
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum UpdateType {
    RaUpdating = 0,
    CombinedRaLaUpdating = 1,
    CombinedRaLaUpdatingWithImsiAttach = 2,
    PeriodicUpdating = 3,
}

/// GMM cause values
/// 3GPP TS 24.008 Section 10.5.5.14
pub mod gmm_cause {
    pub const IMSI_UNKNOWN_IN_HLR: u8 = 2;
    pub const ILLEGAL_MS: u8 = 3;
    pub const GPRS_SERVICES_NOT_ALLOWED: u8 = 7;
    pub const GPRS_AND_NON_GPRS_SERVICES_NOT_ALLOWED: u8 = 8;
    pub const MS_IDENTITY_CANNOT_BE_DERIVED: u8 = 9;
    pub const IMPLICITLY_DETACHED: u8 = 10;
    pub const MAC_FAILURE: u8 = 20;
    pub const SYNCH_FAILURE: u8 = 21;
    pub const GSM_AUTHENTICATION_UNACCEPTABLE: u8 = 23;
    pub const SEMANTICALLY_INCORRECT_MESSAGE: u8 = 95;
    pub const INVALID_MANDATORY_INFORMATION: u8 = 96;
    pub const MESSAGE_TYPE_NON_EXISTENT: u8 = 97;
    pub const MESSAGE_NOT_COMPATIBLE_WITH_STATE: u8 = 98;
    pub const PROTOCOL_ERROR_UNSPECIFIED: u8 = 111;
}

/// SM cause values
/// 3GPP TS 24.008 Section 10.5.6.6
pub mod sm_cause {
    pub const INSUFFICIENT_RESOURCES: u8 = 26;
    pub const ACTIVATION_REJECTED_UNSPECIFIED: u8 = 31;
    pub const REGULAR_DEACTIVATION: u8 = 36;
    pub const INVALID_MANDATORY_INFORMATION: u8 = 96;
    pub const MESSAGE_TYPE_NON_EXISTENT: u8 = 97;
    pub const MESSAGE_NOT_COMPATIBLE_WITH_STATE: u8 = 98;
    pub const PROTOCOL_ERROR_UNSPECIFIED: u8 = 111;
}

/// Labels for GMM cause values, used when rendering messages.
pub const GMM_CAUSE_LABELS: &[(u64, &str)] = &[
    (2, "IMSI unknown in HLR"),
    (3, "Illegal MS"),
    (7, "GPRS services not allowed"),
    (8, "GPRS services and non-GPRS services not allowed"),
    (9, "MS identity cannot be derived by the network"),
    (10, "Implicitly detached"),
    (20, "MAC failure"),
    (21, "Synch failure"),
    (23, "GSM authentication unacceptable"),
    (95, "Semantically incorrect message"),
    (96, "Invalid mandatory information"),
    (97, "Message type non-existent or not implemented"),
    (98, "Message type not compatible with the protocol state"),
    (111, "Protocol error, unspecified"),
];

/// Labels for SM cause values.
pub const SM_CAUSE_LABELS: &[(u64, &str)] = &[
    (26, "Insufficient resources"),
    (31, "Activation rejected, unspecified"),
    (36, "Regular deactivation"),
    (96, "Invalid mandatory information"),
    (97, "Message type non-existent or not implemented"),
    (98, "Message type not compatible with the protocol state"),
    (111, "Protocol error, unspecified"),
];

/// Labels for the mobile identity type field.
pub const IDENTITY_TYPE_LABELS: &[(u64, &str)] = &[
    (0, "No identity"),
    (1, "IMSI"),
    (2, "IMEI"),
    (3, "IMEISV"),
    (4, "TMSI/P-TMSI"),
    (5, "TMGI"),
];

/// Labels for the attach type field.
pub const ATTACH_TYPE_LABELS: &[(u64, &str)] = &[
    (1, "GPRS attach"),
    (2, "Not used"),
    (3, "Combined GPRS/IMSI attach"),
    (4, "Emergency attach"),
];
