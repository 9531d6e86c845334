//! Reusable IE descriptors of TS 24.008 Section 10.5.

use crate::desc::{BufSize, Count, IeDesc};
use crate::enums::{ATTACH_TYPE_LABELS, GMM_CAUSE_LABELS, SM_CAUSE_LABELS};

const TIMER_UNIT_LABELS: &[(u64, &str)] = &[
    (0, "2 seconds"),
    (1, "1 minute"),
    (2, "decihours"),
    (7, "deactivated"),
];

const UPDATE_TYPE_LABELS: &[(u64, &str)] = &[
    (0, "RA updating"),
    (1, "combined RA/LA updating"),
    (2, "combined RA/LA updating with IMSI attach"),
    (3, "periodic updating"),
];

const DETACH_TYPE_LABELS: &[(u64, &str)] = &[
    (1, "GPRS detach / re-attach required"),
    (2, "IMSI detach / re-attach not required"),
    (3, "combined GPRS/IMSI detach"),
];

/// GPRS timer (10.5.7.3): 3-bit unit, 5-bit value.
pub fn gprs_timer(name: &'static str) -> IeDesc {
    IeDesc::envelope(
        name,
        vec![
            IeDesc::uint("Unit", 3).with_dict(TIMER_UNIT_LABELS),
            IeDesc::uint("Value", 5),
        ],
    )
}

/// GMM cause (10.5.5.14).
pub fn gmm_cause(name: &'static str) -> IeDesc {
    IeDesc::uint(name, 8).with_dict(GMM_CAUSE_LABELS)
}

/// SM cause (10.5.6.6).
pub fn sm_cause(name: &'static str) -> IeDesc {
    IeDesc::uint(name, 8).with_dict(SM_CAUSE_LABELS)
}

/// Attach type (10.5.5.2) with the follow-on request bit.
pub fn attach_type() -> [IeDesc; 2] {
    [
        IeDesc::uint("FollowOnReq", 1),
        IeDesc::uint("AttachType", 3).with_dict(ATTACH_TYPE_LABELS),
    ]
}

/// Update type (10.5.5.18) with the follow-on request bit.
pub fn update_type() -> [IeDesc; 2] {
    [
        IeDesc::uint("FollowOnReq", 1),
        IeDesc::uint("UpdateType", 3).with_dict(UPDATE_TYPE_LABELS),
    ]
}

/// Detach type (10.5.5.5) as sent by the MS, with the power-off bit.
pub fn detach_type_uplink() -> [IeDesc; 2] {
    [
        IeDesc::uint("PowerOff", 1),
        IeDesc::uint("DetachType", 3).with_dict(DETACH_TYPE_LABELS),
    ]
}

/// Detach type (10.5.5.5) as sent by the network.
pub fn detach_type_downlink() -> [IeDesc; 2] {
    [
        IeDesc::spare("spare", 1),
        IeDesc::uint("DetachType", 3).with_dict(DETACH_TYPE_LABELS),
    ]
}

/// Routing area identification (10.5.5.15), carried as its 6 octets.
pub fn rai(name: &'static str) -> IeDesc {
    IeDesc::bytes(name, BufSize::Octets(6))
}

/// P-TMSI signature (10.5.5.8).
pub fn ptmsi_signature(name: &'static str) -> IeDesc {
    IeDesc::bytes(name, BufSize::Octets(3))
}

/// CSN.1-coded capabilities kept opaque (MS network capability, MS radio
/// access capability, classmarks).
pub fn opaque(name: &'static str) -> IeDesc {
    IeDesc::bytes(name, BufSize::Rest)
}

/// Network name (10.5.3.5a).
pub fn network_name(name: &'static str) -> IeDesc {
    IeDesc::envelope(
        name,
        vec![
            IeDesc::uint("Ext", 1).with_default(1),
            IeDesc::uint("Coding", 3).with_dict(&[(0, "GSM 7-bit"), (1, "UCS2")]),
            IeDesc::uint("AddCI", 1).with_default(0),
            IeDesc::uint("SpareBits", 3).with_default(0),
            IeDesc::bytes("Text", BufSize::Rest),
        ],
    )
}

/// PDP address (10.5.6.4).
pub fn pdp_address(name: &'static str) -> IeDesc {
    IeDesc::envelope(
        name,
        vec![
            IeDesc::spare("spare", 4),
            IeDesc::uint("TypeOrg", 4).with_dict(&[(0, "ETSI"), (1, "IETF")]),
            IeDesc::uint("TypeNum", 8).with_dict(&[(0x21, "IPv4"), (0x57, "IPv6"), (0x8D, "IPv4v6")]),
            IeDesc::bytes("Address", BufSize::Rest).optional(),
        ],
    )
}

/// Access point name (10.5.6.1): length-prefixed labels.
pub fn apn(name: &'static str) -> IeDesc {
    IeDesc::sequence(
        name,
        IeDesc::bytes("Label", BufSize::Rest).lv(),
        Count::Rest,
    )
}

/// Half-octet value with a spare high bit (ciphering algorithm, IMEISV
/// request, identity type 2, force to standby).
pub fn spare_and_value(spare: &'static str, name: &'static str) -> [IeDesc; 2] {
    [IeDesc::spare(spare, 1), IeDesc::uint(name, 3)]
}

/// Local time zone (10.5.3.8) and universal time (10.5.3.9) kept raw.
pub fn time_zone(name: &'static str) -> IeDesc {
    IeDesc::uint(name, 8)
}
