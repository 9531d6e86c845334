//! SM message layouts (TS 24.008 Section 9.5).

use crate::desc::{BufSize, IeDesc};
use crate::enums::SmMessageType as T;
use crate::message::{MessageDesc, MessageId};

use super::ies::*;

fn msg(name: &'static str, t: T, ies: Vec<IeDesc>) -> MessageDesc {
    MessageDesc::new(name, MessageId::sm(t), ies)
}

/// Messages sent by the MS.
pub fn uplink() -> Vec<MessageDesc> {
    vec![
        msg(
            "ActivatePdpContextRequest",
            T::ActivatePdpContextRequest,
            vec![
                IeDesc::spare("spare", 4),
                IeDesc::uint("NSAPI", 4),
                IeDesc::spare("spare2", 4),
                IeDesc::uint("LLCSAPI", 4),
                opaque("QoS").lv(),
                pdp_address("PDPAddr").lv(),
                apn("APN").tlv(0x28),
                opaque("ProtConfig").tlv(0x27),
                IeDesc::uint("RequestType", 4).tv1(0xA),
            ],
        ),
        msg(
            "DeactivatePdpContextRequest",
            T::DeactivatePdpContextRequest,
            deactivate_request(),
        ),
        msg(
            "DeactivatePdpContextAccept",
            T::DeactivatePdpContextAccept,
            vec![opaque("ProtConfig").tlv(0x27)],
        ),
        msg("SmStatus", T::SmStatus, vec![sm_cause("SMCause")]),
    ]
}

/// Messages sent by the network.
pub fn downlink() -> Vec<MessageDesc> {
    vec![
        msg(
            "ActivatePdpContextAccept",
            T::ActivatePdpContextAccept,
            vec![
                IeDesc::spare("spare", 4),
                IeDesc::uint("LLCSAPI", 4),
                opaque("QoS").lv(),
                IeDesc::spare("spare2", 4),
                IeDesc::uint("RadioPriority", 4),
                pdp_address("PDPAddr").tlv(0x2B),
                opaque("ProtConfig").tlv(0x27),
                IeDesc::bytes("PacketFlowId", BufSize::Octets(1)).tlv(0x34),
                sm_cause("SMCause").tlv(0x39),
            ],
        ),
        msg(
            "ActivatePdpContextReject",
            T::ActivatePdpContextReject,
            vec![sm_cause("SMCause"), opaque("ProtConfig").tlv(0x27)],
        ),
        msg(
            "DeactivatePdpContextRequest",
            T::DeactivatePdpContextRequest,
            deactivate_request(),
        ),
        msg(
            "DeactivatePdpContextAccept",
            T::DeactivatePdpContextAccept,
            vec![opaque("ProtConfig").tlv(0x27)],
        ),
        msg("SmStatus", T::SmStatus, vec![sm_cause("SMCause")]),
    ]
}

fn deactivate_request() -> Vec<IeDesc> {
    vec![
        sm_cause("SMCause"),
        IeDesc::uint("TearDown", 4).tv1(0x9),
        opaque("ProtConfig").tlv(0x27),
    ]
}
