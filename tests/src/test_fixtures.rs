//! Test fixtures and message builders
//!
//! Provides a core configuration for the scenarios and encoders for the
//! uplink messages a terminal sends.

use pscore_common::{CoreConfig, Direction, MobileIdentity, SubscriberEntry};
use pscore_l3::{
    identity_value, AttachType, Catalogue, DecodeResult, GmmMessageType, Message, MessageId,
    SmMessageType, Value,
};

/// IMSI used by single-terminal scenarios
pub const TEST_IMSI: &str = "001010123456789";

/// IMEISV reported by the test terminal
pub const TEST_IMEISV: &str = "3534900698733201";

/// Routing area the test terminal claims to come from
pub const TEST_OLD_RAI: [u8; 6] = [0x00, 0xF1, 0x10, 0x00, 0x01, 0x01];

/// Returns the IMSI of test terminal `n`.
pub fn test_imsi(n: u32) -> String {
    format!("00101{:010}", n)
}

/// Core configuration admitting every subscriber with 2G authentication.
pub fn core_config() -> CoreConfig {
    let mut config = CoreConfig::default();
    config.subscribers = vec![SubscriberEntry {
        imsi: "*".into(),
        usim: false,
        msisdn: None,
        address: None,
    }];
    config
}

fn catalogue() -> Catalogue {
    Catalogue::gprs().expect("GPRS catalogue")
}

/// Encodes an uplink message.
pub fn encode_uplink(msg: &Message) -> Vec<u8> {
    catalogue()
        .encode(Direction::Uplink, msg)
        .expect("uplink message encodes")
        .to_vec()
}

/// Decodes a downlink message.
pub fn decode_downlink(pdu: &[u8]) -> DecodeResult<Message> {
    catalogue().decode(Direction::Downlink, pdu)
}

fn gmm(t: GmmMessageType) -> Message {
    Message::new(MessageId::gmm(t))
}

/// Attach Request with the given identity.
pub fn attach_request(identity: &MobileIdentity) -> Vec<u8> {
    attach_request_of_type(identity, AttachType::Gprs)
}

/// Attach Request with the given identity and attach type.
pub fn attach_request_of_type(identity: &MobileIdentity, attach_type: AttachType) -> Vec<u8> {
    encode_uplink(
        &gmm(GmmMessageType::AttachRequest)
            .with("MSNetworkCap", vec![0xE5u8, 0xE0])
            .with("CKSN", 7u8)
            .with("FollowOnReq", 0u8)
            .with("AttachType", u8::from(attach_type))
            .with("DRXParam", vec![0x00u8, 0x00])
            .with("MobileId", identity_value(identity))
            .with("OldRAI", TEST_OLD_RAI.to_vec())
            .with("MSRACap", vec![0x13u8, 0x92, 0x34, 0x10]),
    )
}

/// Attach Complete.
pub fn attach_complete() -> Vec<u8> {
    encode_uplink(&gmm(GmmMessageType::AttachComplete))
}

/// Identity Response.
pub fn identity_response(identity: &MobileIdentity) -> Vec<u8> {
    encode_uplink(&gmm(GmmMessageType::IdentityResponse).with("MobileId", identity_value(identity)))
}

/// Authentication and Ciphering Response carrying `res`.
pub fn auth_response(ac_ref: u8, res: &[u8]) -> Vec<u8> {
    encode_uplink(
        &gmm(GmmMessageType::AuthenticationCipheringResponse)
            .with("ACRef", ac_ref)
            .with("RES", res.to_vec()),
    )
}

/// Authentication and Ciphering Failure.
pub fn auth_failure(cause: u8, auts: Option<&[u8]>) -> Vec<u8> {
    let mut msg = gmm(GmmMessageType::AuthenticationCipheringFailure).with("GMMCause", cause);
    if let Some(auts) = auts {
        msg.fields.insert("AUTS", auts.to_vec());
    }
    encode_uplink(&msg)
}

/// Routing Area Update Request (normal RA updating).
pub fn rau_request() -> Vec<u8> {
    encode_uplink(
        &gmm(GmmMessageType::RoutingAreaUpdateRequest)
            .with("CKSN", 0u8)
            .with("FollowOnReq", 0u8)
            .with("UpdateType", 0u8)
            .with("OldRAI", TEST_OLD_RAI.to_vec())
            .with("MSRACap", vec![0x13u8, 0x92, 0x34, 0x10]),
    )
}

/// Routing Area Update Complete.
pub fn rau_complete() -> Vec<u8> {
    encode_uplink(&gmm(GmmMessageType::RoutingAreaUpdateComplete))
}

/// Service Request (service type data).
pub fn service_request(ptmsi: u32) -> Vec<u8> {
    encode_uplink(
        &gmm(GmmMessageType::ServiceRequest)
            .with("ServiceType", 1u8)
            .with("CKSN", 0u8)
            .with("PTMSI", identity_value(&MobileIdentity::Tmsi(ptmsi))),
    )
}

/// P-TMSI Reallocation Complete.
pub fn ptmsi_reallocation_complete() -> Vec<u8> {
    encode_uplink(&gmm(GmmMessageType::PtmsiReallocationComplete))
}

/// Detach Request (GPRS detach).
pub fn detach_request(power_off: bool) -> Vec<u8> {
    encode_uplink(
        &gmm(GmmMessageType::DetachRequest)
            .with("PowerOff", u8::from(power_off))
            .with("DetachType", 1u8),
    )
}

/// Detach Accept answering a network detach.
pub fn detach_accept() -> Vec<u8> {
    encode_uplink(&gmm(GmmMessageType::DetachAccept))
}

/// Activate PDP Context Request for an IPv4 dynamic address.
pub fn activate_pdp(ti: u8, apn: &str) -> Vec<u8> {
    let labels = apn
        .split('.')
        .map(|label| Value::bytes(label.as_bytes().to_vec()))
        .collect();
    let address = Value::Envelope(
        pscore_l3::Fields::new()
            .with("TypeOrg", 1u8)
            .with("TypeNum", 0x21u8),
    );
    encode_uplink(
        &Message::new(MessageId::sm(SmMessageType::ActivatePdpContextRequest))
            .with_header(ti)
            .with("NSAPI", 5 + ti)
            .with("LLCSAPI", 3u8)
            .with("QoS", vec![0x0Bu8, 0x92, 0x1F])
            .with("PDPAddr", address)
            .with("APN", Value::Sequence(labels)),
    )
}

/// Deactivate PDP Context Request.
pub fn deactivate_pdp(ti: u8) -> Vec<u8> {
    encode_uplink(
        &Message::new(MessageId::sm(SmMessageType::DeactivatePdpContextRequest))
            .with_header(ti)
            .with("SMCause", 36u8),
    )
}
