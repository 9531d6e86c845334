//! GMM message layouts (TS 24.008 Section 9.4).
//!
//! Two type 1 IEs sharing an octet are listed high nibble first, which is
//! the reverse of their order in the 24.008 message tables.

use crate::desc::{BufSize, IeDesc};
use crate::enums::GmmMessageType as T;
use crate::identity::mobile_identity;
use crate::message::{MessageDesc, MessageId};

use super::ies::*;

fn msg(name: &'static str, t: T, ies: Vec<IeDesc>) -> MessageDesc {
    MessageDesc::new(name, MessageId::gmm(t), ies)
}

fn with_pair(mut ies: Vec<IeDesc>, pair: [IeDesc; 2]) -> Vec<IeDesc> {
    ies.extend(pair);
    ies
}

/// Messages sent by the MS.
pub fn uplink() -> Vec<MessageDesc> {
    vec![
        msg(
            "AttachRequest",
            T::AttachRequest,
            [
                vec![opaque("MSNetworkCap").lv(), IeDesc::uint("CKSN", 4)],
                attach_type().to_vec(),
                vec![
                    IeDesc::bytes("DRXParam", BufSize::Octets(2)),
                    mobile_identity("MobileId").lv(),
                    rai("OldRAI"),
                    opaque("MSRACap").lv(),
                    ptmsi_signature("OldPTMSISign").tv(0x19),
                    gprs_timer("ReqREADYTimer").tv(0x17),
                    IeDesc::uint("TMSIStatus", 4).tv1(0x9),
                    opaque("PSLCSCap").tlv(0x33),
                    opaque("MSCm2").tlv(0x11),
                    opaque("MSCm3").tlv(0x20),
                    opaque("SuppCodecs").tlv(0x40),
                    opaque("UENetCap").tlv(0x58),
                    mobile_identity("AddMobileId").tlv(0x1A),
                    rai("AddOldRAI").lv().tv(0x1B),
                    opaque("VoiceDomPref").tlv(0x5D),
                    IeDesc::uint("DeviceProp", 4).tv1(0xD),
                    IeDesc::uint("PTMSIType", 4).tv1(0xE),
                    IeDesc::uint("MSNetFeatSupp", 4).tv1(0xC),
                    IeDesc::bytes("OldLAI", BufSize::Octets(5)).tv(0x10),
                    IeDesc::uint("AddUpdateType", 4).tv1(0xF),
                ],
            ]
            .concat(),
        ),
        msg(
            "AttachComplete",
            T::AttachComplete,
            vec![
                opaque("InterRATHOInfo").tlv(0x27),
                opaque("EUTRANInterRATHOInfo").tlv(0x2B),
            ],
        ),
        msg(
            "DetachRequest",
            T::DetachRequest,
            with_pair(vec![IeDesc::spare("spareHalf", 4)], detach_type_uplink())
                .into_iter()
                .chain([
                    mobile_identity("PTMSI").tlv(0x18),
                    ptmsi_signature("PTMSISign").lv().tv(0x19),
                ])
                .collect(),
        ),
        msg("DetachAccept", T::DetachAccept, vec![]),
        msg(
            "RoutingAreaUpdateRequest",
            T::RoutingAreaUpdateRequest,
            [
                vec![IeDesc::uint("CKSN", 4)],
                update_type().to_vec(),
                vec![
                    rai("OldRAI"),
                    opaque("MSRACap").lv(),
                    ptmsi_signature("OldPTMSISign").tv(0x19),
                    gprs_timer("ReqREADYTimer").tv(0x17),
                    IeDesc::bytes("DRXParam", BufSize::Octets(2)).tv(0x27),
                    IeDesc::uint("TMSIStatus", 4).tv1(0x9),
                    mobile_identity("PTMSI").tlv(0x18),
                    opaque("MSNetworkCap").tlv(0x31),
                    IeDesc::bytes("PDPCtxtStat", BufSize::Octets(2)).tlv(0x32),
                    opaque("PSLCSCap").tlv(0x33),
                    opaque("UENetCap").tlv(0x58),
                    mobile_identity("AddMobileId").tlv(0x1A),
                    rai("AddOldRAI").lv().tv(0x1B),
                    opaque("MSCm2").tlv(0x11),
                    opaque("MSCm3").tlv(0x20),
                    opaque("SuppCodecs").tlv(0x40),
                    opaque("VoiceDomPref").tlv(0x5D),
                    IeDesc::uint("PTMSIType", 4).tv1(0xE),
                    IeDesc::uint("DeviceProp", 4).tv1(0xD),
                    IeDesc::uint("MSNetFeatSupp", 4).tv1(0xC),
                    IeDesc::bytes("OldLAI", BufSize::Octets(5)).tv(0x10),
                    IeDesc::uint("AddUpdateType", 4).tv1(0xF),
                ],
            ]
            .concat(),
        ),
        msg(
            "RoutingAreaUpdateComplete",
            T::RoutingAreaUpdateComplete,
            vec![
                opaque("RecvNPDUNumList").tlv(0x26),
                opaque("InterRATHOInfo").tlv(0x27),
                opaque("EUTRANInterRATHOInfo").tlv(0x2B),
            ],
        ),
        msg(
            "ServiceRequest",
            T::ServiceRequest,
            [
                spare_and_value("spare", "ServiceType").to_vec(),
                vec![
                    IeDesc::uint("CKSN", 4),
                    mobile_identity("PTMSI").lv(),
                    IeDesc::bytes("PDPCtxtStat", BufSize::Octets(2)).tlv(0x32),
                    opaque("MBMSCtxtStat").tlv(0x35),
                    IeDesc::bytes("ULDataStat", BufSize::Octets(2)).tlv(0x36),
                    IeDesc::uint("DeviceProp", 4).tv1(0xD),
                ],
            ]
            .concat(),
        ),
        msg("PtmsiReallocationComplete", T::PtmsiReallocationComplete, vec![]),
        msg(
            "AuthenticationCipheringResponse",
            T::AuthenticationCipheringResponse,
            vec![
                IeDesc::spare("spare", 4),
                IeDesc::uint("ACRef", 4),
                IeDesc::bytes("RES", BufSize::Octets(4)).tv(0x22),
                mobile_identity("IMEISV").tlv(0x23),
                opaque("RESExt").tlv(0x29),
            ],
        ),
        msg(
            "AuthenticationCipheringFailure",
            T::AuthenticationCipheringFailure,
            vec![gmm_cause("GMMCause"), opaque("AUTS").tlv(0x30)],
        ),
        msg(
            "IdentityResponse",
            T::IdentityResponse,
            vec![mobile_identity("MobileId").lv()],
        ),
        msg("GmmStatus", T::GmmStatus, vec![gmm_cause("GMMCause")]),
    ]
}

/// Messages sent by the network.
pub fn downlink() -> Vec<MessageDesc> {
    vec![
        msg(
            "AttachAccept",
            T::AttachAccept,
            vec![
                IeDesc::uint("ForceStdby", 4),
                IeDesc::uint("AttachResult", 4),
                gprs_timer("PeriodicRAUpdateTimer"),
                IeDesc::uint("RadioPrioTOM8", 4),
                IeDesc::uint("RadioPrioSMS", 4),
                rai("RAI"),
                ptmsi_signature("PTMSISign").tv(0x19),
                gprs_timer("NegoREADYTimer").tv(0x17),
                mobile_identity("AllocPTMSI").tlv(0x18),
                mobile_identity("MSIdentity").tlv(0x23),
                gmm_cause("GMMCause").tv(0x25),
                gprs_timer("T3302").tlv(0x2A),
                IeDesc::tag_only("CellNotif", 0x8C),
                opaque("EquivPLMNs").tlv(0x4A),
                IeDesc::uint("NetFeatSupp", 4).tv1(0xB),
                opaque("EmergNumList").tlv(0x34),
                IeDesc::uint("ReqMSInfo", 4).tv1(0xA),
                gprs_timer("T3319").tlv(0x37),
                gprs_timer("T3323").tlv(0x38),
            ],
        ),
        msg(
            "AttachReject",
            T::AttachReject,
            vec![
                gmm_cause("GMMCause"),
                gprs_timer("T3302").tlv(0x2A),
                gprs_timer("T3346").tlv(0x3A),
            ],
        ),
        msg(
            "DetachRequest",
            T::DetachRequest,
            with_pair(vec![IeDesc::uint("ForceStdby", 4)], detach_type_downlink())
                .into_iter()
                .chain([gmm_cause("GMMCause").tv(0x25)])
                .collect(),
        ),
        msg(
            "DetachAccept",
            T::DetachAccept,
            vec![IeDesc::spare("spareHalf", 4), IeDesc::uint("ForceStdby", 4)],
        ),
        msg(
            "RoutingAreaUpdateAccept",
            T::RoutingAreaUpdateAccept,
            vec![
                IeDesc::uint("UpdateResult", 4),
                IeDesc::uint("ForceStdby", 4),
                gprs_timer("PeriodicRAUpdateTimer"),
                rai("RAI"),
                ptmsi_signature("PTMSISign").tv(0x19),
                mobile_identity("AllocPTMSI").tlv(0x18),
                mobile_identity("MSIdentity").tlv(0x23),
                opaque("RecvNPDUNumList").tlv(0x26),
                gprs_timer("NegoREADYTimer").tv(0x17),
                gmm_cause("GMMCause").tv(0x25),
                gprs_timer("T3302").tlv(0x2A),
                IeDesc::tag_only("CellNotif", 0x8C),
                opaque("EquivPLMNs").tlv(0x4A),
                IeDesc::bytes("PDPCtxtStat", BufSize::Octets(2)).tlv(0x32),
                IeDesc::uint("NetFeatSupp", 4).tv1(0xB),
                opaque("EmergNumList").tlv(0x34),
                gprs_timer("T3319").tlv(0x37),
                gprs_timer("T3323").tlv(0x38),
            ],
        ),
        msg(
            "RoutingAreaUpdateReject",
            T::RoutingAreaUpdateReject,
            vec![
                gmm_cause("GMMCause"),
                IeDesc::spare("spareHalf", 4),
                IeDesc::uint("ForceStdby", 4),
                gprs_timer("T3302").tlv(0x2A),
                gprs_timer("T3346").tlv(0x3A),
            ],
        ),
        msg(
            "ServiceAccept",
            T::ServiceAccept,
            vec![
                IeDesc::bytes("PDPCtxtStat", BufSize::Octets(2)).tlv(0x32),
                opaque("MBMSCtxtStat").tlv(0x35),
            ],
        ),
        msg(
            "ServiceReject",
            T::ServiceReject,
            vec![gmm_cause("GMMCause"), gprs_timer("T3346").tlv(0x37)],
        ),
        msg(
            "PtmsiReallocationCommand",
            T::PtmsiReallocationCommand,
            vec![
                mobile_identity("AllocPTMSI").lv(),
                rai("RAI"),
                IeDesc::spare("spareHalf", 4),
                IeDesc::uint("ForceStdby", 4),
                ptmsi_signature("PTMSISign").tv(0x19),
            ],
        ),
        msg(
            "AuthenticationCipheringRequest",
            T::AuthenticationCipheringRequest,
            [
                spare_and_value("spare", "IMEISVRequest").to_vec(),
                spare_and_value("spare2", "CiphAlgo").to_vec(),
                vec![
                    IeDesc::uint("ACRef", 4),
                    IeDesc::uint("ForceStdby", 4),
                    IeDesc::bytes("RAND", BufSize::Octets(16)).tv(0x21),
                    IeDesc::uint("CKSN", 4).tv1(0x8),
                    opaque("AUTN").tlv(0x28),
                    opaque("ReplayedMSNetCap").tlv(0x42),
                    IeDesc::uint("IntegAlgo", 4).tv1(0x9),
                ],
            ]
            .concat(),
        ),
        msg("AuthenticationCipheringReject", T::AuthenticationCipheringReject, vec![]),
        msg(
            "IdentityRequest",
            T::IdentityRequest,
            [
                vec![IeDesc::uint("ForceStdby", 4)],
                spare_and_value("spare", "IDType").to_vec(),
            ]
            .concat(),
        ),
        msg(
            "GmmInformation",
            T::GmmInformation,
            vec![
                network_name("FullNetName").tlv(0x43),
                network_name("ShortNetName").tlv(0x45),
                time_zone("LocalTimeZone").tv(0x46),
                IeDesc::bytes("UnivTimeAndTZ", BufSize::Octets(7)).tv(0x47),
                opaque("LSAIdentity").tlv(0x48),
                IeDesc::uint("DaylightSaving", 8).tlv(0x49),
            ],
        ),
        msg("GmmStatus", T::GmmStatus, vec![gmm_cause("GMMCause")]),
    ]
}
