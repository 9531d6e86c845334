//! Per-field decode transforms and encode overrides.
//!
//! A transform is registered for a `(message, field)` pair. Decode
//! transforms run after a message has been decoded; encode overrides run
//! before it is encoded and take priority over the value supplied by the
//! caller. Both are plain functions of the field's own value.

use std::collections::HashMap;

use pscore_common::{MobileIdentity, Plmn};
use thiserror::Error;

use crate::error::{DecodeError, EncodeError};
use crate::identity::{identity_from_value, identity_value};
use crate::message::{Message, MessageId};
use crate::value::{Fields, Value};

/// Failure of a transform function.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct TransformError(pub String);

/// Maps a decoded value to its presentation form.
pub type DecodeTransform = fn(Value) -> Result<Value, TransformError>;

/// Value forced onto a field at encode time.
#[derive(Debug, Clone)]
pub enum EncodeOverride {
    /// Fixed value
    Static(Value),
    /// Value computed from the caller-supplied one, if any
    Computed(fn(Option<&Value>) -> Result<Value, TransformError>),
}

/// Registry of transforms keyed by message and field.
#[derive(Debug, Clone, Default)]
pub struct Transforms {
    decode: HashMap<(MessageId, &'static str), DecodeTransform>,
    encode: HashMap<(MessageId, &'static str), EncodeOverride>,
}

impl Transforms {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a decode transform.
    pub fn with_decode(mut self, id: MessageId, field: &'static str, f: DecodeTransform) -> Self {
        self.decode.insert((id, field), f);
        self
    }

    /// Registers an encode override.
    pub fn with_encode(mut self, id: MessageId, field: &'static str, o: EncodeOverride) -> Self {
        self.encode.insert((id, field), o);
        self
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.decode.is_empty() && self.encode.is_empty()
    }

    /// Applies the decode transforms of a message in place.
    pub fn apply_decode(&self, msg: &mut Message) -> Result<(), DecodeError> {
        for ((id, field), f) in &self.decode {
            if *id != msg.id {
                continue;
            }
            if let Some(slot) = msg.fields.get_mut(field) {
                let value = std::mem::replace(slot, Value::Null);
                *slot = f(value).map_err(|e| DecodeError::Transform {
                    ie: field.to_string(),
                    reason: e.0,
                })?;
            }
        }
        Ok(())
    }

    /// Returns a copy of the message with encode overrides applied.
    ///
    /// Overridden fields keep their position; new ones are appended, which
    /// does not affect encoding since the encoder follows descriptor order.
    pub fn apply_encode(&self, msg: &Message) -> Result<Message, EncodeError> {
        let mut out = msg.clone();
        for ((id, field), o) in &self.encode {
            if *id != msg.id {
                continue;
            }
            let value = match o {
                EncodeOverride::Static(v) => v.clone(),
                EncodeOverride::Computed(f) => {
                    f(msg.fields.get(field)).map_err(|e| EncodeError::Transform {
                        ie: field.to_string(),
                        reason: e.0,
                    })?
                }
            };
            out.fields.insert(*field, value);
        }
        Ok(out)
    }
}

// ============================================================================
// Standard transforms
// ============================================================================

/// Mobile identity choice to a flat `{Type, Ident}` envelope.
///
/// `Ident` holds the digit string for IMSI/IMEI/IMEISV and the integer for
/// TMSI. Identities without a flat form (TMGI, unknown types) pass through.
pub fn flatten_identity(value: Value) -> Result<Value, TransformError> {
    let identity = identity_from_value(&value).map_err(|e| TransformError(e.to_string()))?;
    let ident = match &identity {
        MobileIdentity::Imsi(d) | MobileIdentity::Imei(d) | MobileIdentity::Imeisv(d) => {
            Value::Bcd(d.clone())
        }
        MobileIdentity::Tmsi(t) => Value::Uint(u64::from(*t)),
        MobileIdentity::NoIdentity => Value::Null,
        MobileIdentity::Tmgi { .. } => return Ok(value),
    };
    Ok(Value::Envelope(
        Fields::new()
            .with("Type", u64::from(u8::from(identity.identity_type())))
            .with("Ident", ident),
    ))
}

/// Flat `{Type, Ident}` envelope back to the mobile identity choice.
pub fn expand_identity(value: Option<&Value>) -> Result<Value, TransformError> {
    let value = value.ok_or_else(|| TransformError("identity not supplied".into()))?;
    let identity = identity_from_value(value).map_err(|e| TransformError(e.to_string()))?;
    Ok(identity_value(&identity))
}

/// PLMN octets to an MCC/MNC digit string.
pub fn plmn_to_digits(value: Value) -> Result<Value, TransformError> {
    let octets: [u8; 3] = value
        .as_bytes()
        .and_then(|b| b.as_ref().try_into().ok())
        .ok_or_else(|| TransformError(format!("PLMN needs 3 octets, got {value}")))?;
    let plmn = Plmn::decode(octets);
    Ok(Value::Bcd(plmn.to_string()))
}

/// MCC/MNC digit string back to PLMN octets.
pub fn digits_to_plmn(value: Option<&Value>) -> Result<Value, TransformError> {
    match value {
        Some(Value::Bcd(digits)) => Plmn::from_digits(digits)
            .map(|p| Value::bytes(p.encode().to_vec()))
            .ok_or_else(|| TransformError(format!("invalid PLMN digits {digits}"))),
        Some(Value::Bytes(b)) if b.len() == 3 => Ok(Value::Bytes(b.clone())),
        other => Err(TransformError(format!("cannot encode PLMN from {other:?}"))),
    }
}
