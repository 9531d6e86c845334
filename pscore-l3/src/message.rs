//! Message descriptors and whole-message encode/decode.
//!
//! # Layout (TS 24.007 Section 11.2)
//! ```text
//! +-------------------------+-------------------------+
//! | Skip indicator / TI (4) | Protocol discriminator  |
//! |                         |          (4)            |
//! +-------------------------+-------------------------+
//! |                Message type (8)                   |
//! +---------------------------------------------------+
//! |   Imperative part: untagged IEs in fixed order    |
//! +---------------------------------------------------+
//! |  Non-imperative part: tagged IEs, any order       |
//! +---------------------------------------------------+
//! ```
//!
//! Tagged IEs are matched by tag rather than by position. The first
//! occurrence of a tag wins; later duplicates and unknown tags are kept in
//! [`Message::unknown`] as their complete wire octets and re-emitted
//! verbatim on encode.

use std::collections::HashSet;
use std::fmt;

use bytes::Bytes;
use pscore_common::{BitReader, BitWriter};
use tracing::{debug, trace};

use crate::codec::{decode_ie, encode_fields};
use crate::desc::{validate_children, IeDesc, Tag};
use crate::enums::{GmmMessageType, ProtocolDiscriminator, SmMessageType};
use crate::error::{DecodeError, DecodeResult, DescriptorError, EncodeError, EncodeResult};
use crate::value::{Fields, Value};

/// Key of a message descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageId {
    /// Protocol discriminator
    pub pd: u8,
    /// Message type
    pub msg_type: u8,
}

impl MessageId {
    /// Creates a message id.
    pub const fn new(pd: u8, msg_type: u8) -> Self {
        Self { pd, msg_type }
    }

    /// GMM message id.
    pub fn gmm(msg_type: GmmMessageType) -> Self {
        Self::new(ProtocolDiscriminator::Gmm.into(), msg_type.into())
    }

    /// SM message id.
    pub fn sm(msg_type: SmMessageType) -> Self {
        Self::new(ProtocolDiscriminator::Sm.into(), msg_type.into())
    }

    /// Returns true for SM messages, which carry a transaction identifier.
    pub fn is_sm(&self) -> bool {
        self.pd == u8::from(ProtocolDiscriminator::Sm)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match ProtocolDiscriminator::try_from(self.pd) {
            Ok(ProtocolDiscriminator::Gmm) => match GmmMessageType::try_from(self.msg_type) {
                Ok(t) => write!(f, "{t:?}"),
                Err(_) => write!(f, "GMM({:#04x})", self.msg_type),
            },
            Ok(ProtocolDiscriminator::Sm) => match SmMessageType::try_from(self.msg_type) {
                Ok(t) => write!(f, "{t:?}"),
                Err(_) => write!(f, "SM({:#04x})", self.msg_type),
            },
            Err(_) => write!(f, "PD{}({:#04x})", self.pd, self.msg_type),
        }
    }
}

/// Ordered IE list of one message type.
#[derive(Debug, Clone)]
pub struct MessageDesc {
    /// Message name
    pub name: &'static str,
    /// Header key
    pub id: MessageId,
    /// IEs in wire order: untagged imperative IEs first, then tagged IEs
    pub ies: Vec<IeDesc>,
    /// Unknown or duplicate tagged IEs are captured instead of rejected
    pub extensible: bool,
}

impl MessageDesc {
    /// Creates an extensible message descriptor.
    pub fn new(name: &'static str, id: MessageId, ies: Vec<IeDesc>) -> Self {
        Self {
            name,
            id,
            ies,
            extensible: true,
        }
    }

    /// Rejects unknown tagged IEs instead of capturing them.
    pub fn closed(mut self) -> Self {
        self.extensible = false;
        self
    }

    /// Looks up an IE by name.
    pub fn ie(&self, name: &str) -> Option<&IeDesc> {
        self.ies.iter().find(|d| d.name == name)
    }

    /// Checks descriptor invariants.
    pub fn validate(&self) -> Result<(), DescriptorError> {
        validate_children(self.name, &self.ies)?;
        let first_tagged = self.ies.iter().position(|d| d.tag.is_some());
        if let Some(pos) = first_tagged {
            if let Some(late) = self.ies[pos..].iter().find(|d| d.tag.is_none()) {
                return Err(DescriptorError::Invalid {
                    ie: late.name.to_string(),
                    reason: format!("untagged IE after the non-imperative part of {}", self.name),
                });
            }
        }
        Ok(())
    }

    fn find_tagged(&self, iei: u8) -> Option<&IeDesc> {
        let tagged = || self.ies.iter().filter(|d| d.tag.is_some());
        tagged()
            .find(|d| d.tag == Some(Tag::octet(iei)))
            .or_else(|| {
                // Type 1 IEIs occupy the high nibble only
                if iei & 0x80 != 0 {
                    tagged().find(|d| d.tag == Some(Tag::half(iei >> 4)))
                } else {
                    None
                }
            })
    }

    /// Encodes a message.
    ///
    /// Fields that the descriptor does not declare are rejected.
    pub fn encode(&self, msg: &Message) -> EncodeResult<Bytes> {
        if msg.id != self.id {
            return Err(EncodeError::UnknownMessage {
                pd: msg.id.pd,
                msg_type: msg.id.msg_type,
            });
        }
        if let Some((field, _)) = msg.fields.iter().find(|(n, _)| self.ie(n).is_none()) {
            return Err(EncodeError::UnknownField {
                message: self.name.to_string(),
                field: field.to_string(),
            });
        }
        let mut w = BitWriter::with_capacity(32);
        let header_err = |e| EncodeError::at("Header", e);
        w.write_bits(u64::from(msg.header), 4).map_err(header_err)?;
        w.write_bits(u64::from(self.id.pd), 4).map_err(header_err)?;
        w.write_bits(u64::from(self.id.msg_type), 8).map_err(header_err)?;

        encode_fields(self.name, &self.ies, &msg.fields, &mut w)?;

        for ie in &msg.unknown {
            match ie {
                Value::Unknown { raw, .. } => w.write_bytes(raw),
                _ => {
                    return Err(EncodeError::TypeMismatch {
                        ie: "Unknown".into(),
                        expected: "unknown",
                    })
                }
            }
        }
        w.pad_to_octet();
        let bytes = w.into_bytes();
        debug!(message = self.name, len = bytes.len(), "encoded");
        Ok(bytes)
    }

    /// Decodes a message whose header matches this descriptor.
    pub fn decode(&self, data: &[u8]) -> DecodeResult<Message> {
        let r = BitReader::new(data);
        let header_err = |e| DecodeError::at("Header", e);
        let header = r.read_bits(4).map_err(header_err)? as u8;
        let pd = r.read_bits(4).map_err(header_err)? as u8;
        let msg_type = r.read_bits(8).map_err(header_err)? as u8;
        if MessageId::new(pd, msg_type) != self.id {
            return Err(DecodeError::malformed(
                "Header",
                format!("PD {pd} type {msg_type:#04x} does not match {}", self.name),
            ));
        }

        let mut fields = Fields::new();
        let mut unknown = Vec::new();
        let mut missing = Vec::new();

        // Imperative part
        for ie in self.ies.iter().take_while(|d| d.tag.is_none()) {
            if !ie.presence.holds(&fields) {
                continue;
            }
            // A message ending on an IE boundary lacks the remaining IEs;
            // a cut inside an IE stays a truncation
            if r.is_empty() {
                if ie.presence.is_mandatory() && ie.default_value().is_none() {
                    missing.push(ie.name.to_string());
                }
                continue;
            }
            let value = decode_ie(ie, &r, &fields)?;
            fields.insert(ie.name, value);
        }

        // Non-imperative part
        let mut seen = HashSet::new();
        while !r.is_empty() {
            let iei = r
                .peek_bits(0, 8)
                .map_err(|e| DecodeError::at("IEI", e))? as u8;
            match self.find_tagged(iei) {
                Some(ie) if seen.insert(ie.name) => {
                    let value = decode_ie(ie, &r, &fields)?;
                    fields.insert(ie.name, value);
                }
                Some(ie) if self.extensible => {
                    // Later occurrence of a known IE: measure it with its
                    // descriptor, keep the octets
                    let probe = r.clone();
                    decode_ie(ie, &probe, &fields)?;
                    let consumed = probe.position() - r.position();
                    let raw = r
                        .read_bits_as_bytes(consumed)
                        .map_err(|e| DecodeError::at(ie.name, e))?;
                    trace!(message = self.name, iei, "duplicate IE captured");
                    unknown.push(Value::Unknown {
                        tag: u64::from(iei),
                        raw: Bytes::from(raw),
                    });
                }
                None if self.extensible => {
                    trace!(message = self.name, iei, "unknown IE captured");
                    unknown.push(capture_unknown(&r, iei)?);
                }
                _ => {
                    return Err(DecodeError::malformed(
                        "IEI",
                        format!("unexpected IEI {iei:#04x} in {}", self.name),
                    ));
                }
            }
        }

        for ie in self.ies.iter().filter(|d| d.tag.is_some()) {
            if ie.presence.is_mandatory() && !fields.contains(ie.name) {
                missing.push(ie.name.to_string());
            }
        }
        if !missing.is_empty() {
            return Err(DecodeError::MissingMandatoryIe(missing));
        }
        debug!(message = self.name, ies = fields.len(), unknown = unknown.len(), "decoded");
        Ok(Message {
            id: self.id,
            header,
            fields,
            unknown,
        })
    }
}

/// Reads one IE without a descriptor: a single octet for IEIs with the
/// high bit set (types 1 and 2), TLV otherwise. The captured octets include
/// the IEI and length.
fn capture_unknown(r: &BitReader<'_>, iei: u8) -> DecodeResult<Value> {
    let at = |e| DecodeError::at("Unknown", e);
    let octets = if iei & 0x80 != 0 {
        1
    } else {
        2 + r.peek_bits(8, 8).map_err(at)? as usize
    };
    let raw = r.read_bytes(octets).map_err(at)?;
    Ok(Value::Unknown {
        tag: u64::from(iei),
        raw: Bytes::from(raw),
    })
}

/// Reads the header octets of a message.
///
/// Returns the high nibble (skip indicator or transaction identifier) and
/// the message id.
pub fn peek_header(data: &[u8]) -> DecodeResult<(u8, MessageId)> {
    match data {
        [first, msg_type, ..] => Ok((first >> 4, MessageId::new(first & 0x0F, *msg_type))),
        _ => Err(DecodeError::TruncatedInput {
            ie: "Header".into(),
            requested: 16,
            remaining: data.len() * 8,
        }),
    }
}

/// A decoded message, or one about to be encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Header key
    pub id: MessageId,
    /// High nibble of the first octet: skip indicator (GMM) or transaction
    /// identifier (SM)
    pub header: u8,
    /// Decoded IEs by name
    pub fields: Fields,
    /// Tagged IEs without a descriptor (or repeated), as wire octets
    pub unknown: Vec<Value>,
}

impl Message {
    /// Creates an empty message.
    pub fn new(id: MessageId) -> Self {
        Self {
            id,
            header: 0,
            fields: Fields::new(),
            unknown: Vec::new(),
        }
    }

    /// Builder-style field insert.
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(name, value);
        self
    }

    /// Sets the header nibble.
    pub fn with_header(mut self, header: u8) -> Self {
        self.header = header;
        self
    }

    /// Returns a field.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Returns an integer field.
    pub fn uint(&self, name: &str) -> Option<u64> {
        self.fields.uint(name)
    }

    /// Returns a byte buffer field.
    pub fn bytes(&self, name: &str) -> Option<&Bytes> {
        self.fields.get(name).and_then(Value::as_bytes)
    }

    /// Returns true if the field is present.
    pub fn has(&self, name: &str) -> bool {
        self.fields.contains(name)
    }

    /// Transaction identifier of an SM message: flag and value.
    pub fn transaction_id(&self) -> (bool, u8) {
        (self.header & 0x8 != 0, self.header & 0x7)
    }
}
