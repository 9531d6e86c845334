//! Codec error types

use pscore_common::BitError;
use thiserror::Error;

/// Errors raised while decoding untrusted octets.
///
/// Decoding never panics; every structural problem surfaces as one of
/// these variants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Fewer bits available than a field declares
    #[error("Truncated input in {ie}: needed {requested} bits, {remaining} remaining")]
    TruncatedInput {
        /// IE being decoded
        ie: String,
        /// Bits the field needed
        requested: usize,
        /// Bits left before the bound
        remaining: usize,
    },

    /// Content violates a structural rule of its descriptor
    #[error("Malformed IE {ie}: {reason}")]
    MalformedIe {
        /// IE being decoded
        ie: String,
        /// What was wrong
        reason: String,
    },

    /// Decoding finished but required IEs are absent
    #[error("Missing mandatory IE(s): {}", .0.join(", "))]
    MissingMandatoryIe(Vec<String>),

    /// No descriptor for this protocol discriminator and message type
    #[error("Unknown message: PD {pd}, type {msg_type}")]
    UnknownMessage {
        /// Protocol discriminator
        pd: u8,
        /// Message type
        msg_type: u8,
    },

    /// A decode transform rejected the decoded value
    #[error("Transform failed for {ie}: {reason}")]
    Transform {
        /// Field the transform is registered for
        ie: String,
        /// Transform failure
        reason: String,
    },
}

impl DecodeError {
    /// Wraps a bit cursor error with the name of the IE being decoded.
    pub fn at(ie: &str, err: BitError) -> Self {
        match err {
            BitError::Truncated {
                requested,
                remaining,
            } => DecodeError::TruncatedInput {
                ie: ie.to_string(),
                requested,
                remaining,
            },
            other => DecodeError::MalformedIe {
                ie: ie.to_string(),
                reason: other.to_string(),
            },
        }
    }

    /// Builds a `MalformedIe` error.
    pub fn malformed(ie: &str, reason: impl Into<String>) -> Self {
        DecodeError::MalformedIe {
            ie: ie.to_string(),
            reason: reason.into(),
        }
    }
}

/// Errors raised while encoding a value tree.
///
/// These indicate a value that does not fit its descriptor, a contract
/// violation on the caller's side rather than bad input from a peer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    /// Integer wider than the declared field
    #[error("Value {value} overflows {width}-bit field {ie}")]
    ValueOverflow {
        /// Field name
        ie: String,
        /// Offending value
        value: i128,
        /// Declared width
        width: usize,
    },

    /// Choice value selects no declared variant
    #[error("Unknown variant {key} for choice {ie}")]
    UnknownVariant {
        /// Choice name
        ie: String,
        /// Requested discriminant
        key: u64,
    },

    /// Value kind does not match the descriptor kind
    #[error("Type mismatch for {ie}: expected {expected}")]
    TypeMismatch {
        /// Field name
        ie: String,
        /// Expected value kind
        expected: &'static str,
    },

    /// Mandatory field absent from the value tree
    #[error("Missing value for mandatory field {ie}")]
    MissingField {
        /// Field name
        ie: String,
    },

    /// Field not declared by the message descriptor
    #[error("Field {field} is not part of message {message}")]
    UnknownField {
        /// Message name
        message: String,
        /// Undeclared field
        field: String,
    },

    /// Encoded content does not fit the length prefix
    #[error("Length {length} of {ie} exceeds maximum {max}")]
    LengthOverflow {
        /// Field name
        ie: String,
        /// Encoded length
        length: usize,
        /// Maximum the prefix can express
        max: usize,
    },

    /// Element count differs from a fixed-size declaration
    #[error("{ie} expects {expected} elements, got {actual}")]
    CountMismatch {
        /// Field name
        ie: String,
        /// Declared count
        expected: usize,
        /// Supplied count
        actual: usize,
    },

    /// No descriptor for this protocol discriminator and message type
    #[error("Unknown message: PD {pd}, type {msg_type}")]
    UnknownMessage {
        /// Protocol discriminator
        pd: u8,
        /// Message type
        msg_type: u8,
    },

    /// An encode override failed
    #[error("Transform failed for {ie}: {reason}")]
    Transform {
        /// Field the override is registered for
        ie: String,
        /// Override failure
        reason: String,
    },
}

impl EncodeError {
    /// Wraps a bit cursor error with the name of the IE being encoded.
    pub fn at(ie: &str, err: BitError) -> Self {
        match err {
            BitError::Overflow { value, width } => EncodeError::ValueOverflow {
                ie: ie.to_string(),
                value: i128::from(value),
                width,
            },
            BitError::InvalidWidth(width) => EncodeError::ValueOverflow {
                ie: ie.to_string(),
                value: 0,
                width,
            },
            BitError::Truncated {
                requested,
                remaining,
            } => EncodeError::LengthOverflow {
                ie: ie.to_string(),
                length: requested,
                max: remaining,
            },
        }
    }
}

/// Errors in a descriptor tree, detected when a catalogue is built.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DescriptorError {
    /// Two children of one envelope share a name
    #[error("Duplicate field {name} in {parent}")]
    DuplicateName {
        /// Envelope or message name
        parent: String,
        /// Repeated name
        name: String,
    },

    /// Two tagged IEs of one set share a tag
    #[error("Duplicate tag {tag:#x} in {parent}")]
    DuplicateTag {
        /// Envelope or message name
        parent: String,
        /// Repeated tag
        tag: u16,
    },

    /// Two variants of one choice share a discriminant
    #[error("Duplicate variant {key} in choice {parent}")]
    DuplicateVariant {
        /// Choice name
        parent: String,
        /// Repeated discriminant
        key: u64,
    },

    /// Two descriptors registered for the same message
    #[error("Duplicate message descriptor {0}")]
    DuplicateMessage(String),

    /// Structural rule broken by a descriptor
    #[error("Invalid descriptor {ie}: {reason}")]
    Invalid {
        /// Descriptor name
        ie: String,
        /// Broken rule
        reason: String,
    },
}

/// Result type for decoding.
pub type DecodeResult<T> = Result<T, DecodeError>;

/// Result type for encoding.
pub type EncodeResult<T> = Result<T, EncodeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bit_error_mapping() {
        let err = DecodeError::at(
            "CKSN",
            BitError::Truncated {
                requested: 4,
                remaining: 0,
            },
        );
        assert_eq!(
            err,
            DecodeError::TruncatedInput {
                ie: "CKSN".into(),
                requested: 4,
                remaining: 0
            }
        );

        let err = EncodeError::at("CKSN", BitError::Overflow { value: 16, width: 4 });
        assert!(matches!(err, EncodeError::ValueOverflow { value: 16, width: 4, .. }));
    }

    #[test]
    fn test_missing_mandatory_display() {
        let err = DecodeError::MissingMandatoryIe(vec!["RAND".into(), "CKSN".into()]);
        assert_eq!(err.to_string(), "Missing mandatory IE(s): RAND, CKSN");
    }
}
