//! Mobile identity IE (TS 24.008 Section 10.5.1.4).
//!
//! ```text
//!   8   7   6   5   4   3   2   1
//! +---------------+---+-----------+
//! | Identity      |O/E| Type of   |  octet 3
//! | digit 1       |   | identity  |
//! +---------------+---+-----------+
//! | Identity digit p+1 | digit p  |  octet 4..
//! +-------------------------------+
//! ```
//!
//! The 3-bit type selects the variant and stays part of each variant's
//! octet 3, so the choice peeks at it instead of consuming it.

use bytes::Bytes;
use pscore_common::{IdentityType, MobileIdentity, Plmn};
use thiserror::Error;

use crate::bcd::{decode_bcd, encode_bcd};
use crate::desc::{BufSize, ChoiceDesc, IeDesc, Selector};
use crate::enums::IDENTITY_TYPE_LABELS;
use crate::value::{Fields, Value};

/// Conversion errors between identity values and [`MobileIdentity`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    /// Value does not have the shape of a mobile identity
    #[error("Malformed mobile identity: {0}")]
    Malformed(String),

    /// Identity type code without a known layout
    #[error("Unsupported identity type {0}")]
    Unsupported(u64),
}

fn type_field() -> IeDesc {
    IeDesc::uint("Type", 3).with_dict(IDENTITY_TYPE_LABELS)
}

fn digits_variant(name: &'static str) -> IeDesc {
    IeDesc::envelope(
        name,
        vec![
            IeDesc::uint("Digit1", 4),
            IeDesc::uint("Odd", 1),
            type_field(),
            IeDesc::bcd("Digits", BufSize::Rest),
        ],
    )
}

/// Builds the mobile identity descriptor with the given field name.
///
/// Framing (LV, TLV) is added by the caller.
pub fn mobile_identity(name: &'static str) -> IeDesc {
    let choice = ChoiceDesc::new(Selector::Peek {
        offset: 5,
        width: 3,
        field: "Type",
    })
    .variant(
        0,
        IeDesc::envelope(
            "NoIdentity",
            vec![
                IeDesc::spare("spare", 5),
                type_field(),
                IeDesc::bytes("Fill", BufSize::Rest).optional(),
            ],
        ),
    )
    .variant(1, digits_variant("IMSI"))
    .variant(2, digits_variant("IMEI"))
    .variant(3, digits_variant("IMEISV"))
    .variant(
        4,
        IeDesc::envelope(
            "TMSI",
            vec![
                IeDesc::uint("Filler", 4).with_default(0xF),
                IeDesc::uint("Odd", 1).with_default(0),
                type_field(),
                IeDesc::uint("TMSI", 32),
            ],
        ),
    )
    .variant(
        5,
        IeDesc::envelope(
            "TMGI",
            vec![
                IeDesc::spare("spare", 2),
                IeDesc::uint("MBMSSessInd", 1),
                IeDesc::uint("MCCMNCInd", 1),
                IeDesc::uint("Odd", 1).with_default(0),
                type_field(),
                IeDesc::uint("MBMSServiceId", 24),
                IeDesc::bytes("PLMN", BufSize::Octets(3)).when(|f| f.uint("MCCMNCInd") == Some(1)),
                IeDesc::uint("MBMSSessionId", 8).when(|f| f.uint("MBMSSessInd") == Some(1)),
            ],
        ),
    )
    .extensible();
    IeDesc::choice(name, choice)
}

/// Converts an identity into the value of a [`mobile_identity`] IE.
pub fn identity_value(identity: &MobileIdentity) -> Value {
    let key = u64::from(u8::from(identity.identity_type()));
    let fields = match identity {
        MobileIdentity::NoIdentity => Fields::new().with("Type", key),
        MobileIdentity::Imsi(d) | MobileIdentity::Imei(d) | MobileIdentity::Imeisv(d) => {
            let mut chars = d.chars();
            let first = chars.next().and_then(|c| c.to_digit(10)).unwrap_or(0xF);
            Fields::new()
                .with("Digit1", u64::from(first))
                .with("Odd", u64::from(d.len() % 2 == 1))
                .with("Type", key)
                .with("Digits", Value::Bcd(chars.collect()))
        }
        MobileIdentity::Tmsi(tmsi) => Fields::new()
            .with("Type", key)
            .with("TMSI", u64::from(*tmsi)),
        MobileIdentity::Tmgi {
            service_id,
            plmn,
            session_id,
        } => {
            let mut f = Fields::new()
                .with("MBMSSessInd", u64::from(session_id.is_some()))
                .with("MCCMNCInd", u64::from(plmn.is_some()))
                .with("Type", key)
                .with("MBMSServiceId", u64::from(*service_id));
            if let Some(p) = plmn {
                f.insert("PLMN", Value::bytes(p.encode().to_vec()));
            }
            if let Some(s) = session_id {
                f.insert("MBMSSessionId", u64::from(*s));
            }
            f
        }
    };
    Value::choice(key, Value::Envelope(fields))
}

fn field<'a>(fields: &'a Fields, name: &str) -> Result<&'a Value, IdentityError> {
    fields
        .get(name)
        .ok_or_else(|| IdentityError::Malformed(format!("missing {name}")))
}

fn uint(fields: &Fields, name: &str) -> Result<u64, IdentityError> {
    field(fields, name)?
        .as_uint()
        .ok_or_else(|| IdentityError::Malformed(format!("{name} is not an integer")))
}

/// Converts a decoded [`mobile_identity`] value, or its flattened
/// `{Type, Ident}` form, into a [`MobileIdentity`].
pub fn identity_from_value(value: &Value) -> Result<MobileIdentity, IdentityError> {
    let (key, fields) = match value {
        Value::Choice { key, value } => match &**value {
            Value::Envelope(f) => (*key, f),
            Value::Unknown { .. } => return Err(IdentityError::Unsupported(*key)),
            other => {
                return Err(IdentityError::Malformed(format!(
                    "{} inside identity choice",
                    other.kind_name()
                )))
            }
        },
        Value::Envelope(f) if f.contains("Ident") => return flat_identity(f),
        other => {
            return Err(IdentityError::Malformed(format!(
                "expected choice, got {}",
                other.kind_name()
            )))
        }
    };
    let kind = u8::try_from(key)
        .ok()
        .and_then(|k| IdentityType::try_from(k).ok())
        .ok_or(IdentityError::Unsupported(key))?;
    match kind {
        IdentityType::NoIdentity => Ok(MobileIdentity::NoIdentity),
        IdentityType::Imsi | IdentityType::Imei | IdentityType::Imeisv => {
            let first = uint(fields, "Digit1")?;
            let rest = field(fields, "Digits")?;
            let rest = match rest {
                Value::Bcd(s) => s.clone(),
                Value::Bytes(b) => {
                    decode_bcd(b).map_err(|e| IdentityError::Malformed(e.to_string()))?
                }
                _ => return Err(IdentityError::Malformed("Digits is not BCD".into())),
            };
            let digit = char::from_digit(first as u32, 10)
                .ok_or_else(|| IdentityError::Malformed(format!("first digit {first:#x}")))?;
            let digits = format!("{digit}{rest}");
            Ok(match kind {
                IdentityType::Imsi => MobileIdentity::Imsi(digits),
                IdentityType::Imei => MobileIdentity::Imei(digits),
                _ => MobileIdentity::Imeisv(digits),
            })
        }
        IdentityType::Tmsi => {
            let tmsi = uint(fields, "TMSI")?;
            u32::try_from(tmsi)
                .map(MobileIdentity::Tmsi)
                .map_err(|_| IdentityError::Malformed(format!("TMSI {tmsi:#x} wider than 32 bits")))
        }
        IdentityType::Tmgi => {
            let service_id = uint(fields, "MBMSServiceId")? as u32;
            let plmn = match fields.get("PLMN").and_then(Value::as_bytes) {
                Some(b) => {
                    let octets: [u8; 3] = b
                        .as_ref()
                        .try_into()
                        .map_err(|_| IdentityError::Malformed("PLMN length".into()))?;
                    Some(Plmn::decode(octets))
                }
                None => None,
            };
            let session_id = fields.uint("MBMSSessionId").map(|s| s as u8);
            Ok(MobileIdentity::Tmgi {
                service_id,
                plmn,
                session_id,
            })
        }
    }
}

fn flat_identity(fields: &Fields) -> Result<MobileIdentity, IdentityError> {
    let kind = uint(fields, "Type")?;
    let ident = field(fields, "Ident")?;
    match (kind, ident) {
        (0, _) => Ok(MobileIdentity::NoIdentity),
        (1, Value::Bcd(d)) => Ok(MobileIdentity::Imsi(d.clone())),
        (2, Value::Bcd(d)) => Ok(MobileIdentity::Imei(d.clone())),
        (3, Value::Bcd(d)) => Ok(MobileIdentity::Imeisv(d.clone())),
        (4, Value::Uint(t)) => u32::try_from(*t)
            .map(MobileIdentity::Tmsi)
            .map_err(|_| IdentityError::Malformed(format!("TMSI {t:#x} wider than 32 bits"))),
        (k @ 1..=4, other) => Err(IdentityError::Malformed(format!(
            "type {k} with {} identity",
            other.kind_name()
        ))),
        (k, _) => Err(IdentityError::Unsupported(k)),
    }
}

/// Packs identity digits the way the IE carries them: first digit and
/// parity in octet 3, the rest as BCD.
///
/// Returns the raw value part for callers that handle identities as
/// opaque octets.
pub fn pack_digits(kind: IdentityType, digits: &str) -> Option<Bytes> {
    let mut chars = digits.chars();
    let first = chars.next()?.to_digit(10)? as u8;
    let odd = u8::from(digits.len() % 2 == 1);
    let mut out = vec![(first << 4) | (odd << 3) | u8::from(kind)];
    out.extend(encode_bcd(chars.as_str()).ok()?);
    Some(Bytes::from(out))
}
