//! TS 24.008 layer-3 message codec
//!
//! Encodes and decodes GPRS Mobility Management (GMM) and Session
//! Management (SM) messages from declarative descriptors.
//!
//! # Overview
//!
//! Each message type is described by a [`MessageDesc`]: an ordered list of
//! [`IeDesc`] values stating widths, framing (TS 24.007 IE types 1 to 6),
//! presence conditions and value dictionaries. One generic codec walks the
//! descriptors in both directions, producing and consuming [`Value`] trees.
//!
//! The [`Catalogue`] holds the descriptors of every supported message, one
//! table per direction.
//!
//! # Example
//!
//! ```rust
//! use pscore_common::Direction;
//! use pscore_l3::{Catalogue, GmmMessageType, Message, MessageId};
//!
//! let catalogue = Catalogue::gprs().unwrap();
//! let request = Message::new(MessageId::gmm(GmmMessageType::IdentityRequest))
//!     .with("ForceStdby", 0u64)
//!     .with("spare", 0u64)
//!     .with("IDType", 1u64);
//!
//! let bytes = catalogue.encode(Direction::Downlink, &request).unwrap();
//! assert_eq!(bytes.as_ref(), &[0x08, 0x15, 0x01]);
//!
//! let decoded = catalogue.decode(Direction::Downlink, &bytes).unwrap();
//! assert_eq!(decoded.uint("IDType"), Some(1));
//! ```

pub mod bcd;
pub mod catalogue;
pub mod codec;
pub mod desc;
pub mod enums;
pub mod error;
pub mod identity;
pub mod message;
pub mod render;
pub mod transform;
pub mod value;


// Re-export commonly used types
pub use catalogue::Catalogue;
pub use desc::{BufSize, ChoiceDesc, Count, IeDesc, IeKind, LengthRule, LengthUnit, Presence, Selector, Tag};
pub use enums::{
    gmm_cause, sm_cause, AttachType, GmmMessageType, ProtocolDiscriminator, SmMessageType, UpdateType,
};
pub use error::{DecodeError, DecodeResult, DescriptorError, EncodeError, EncodeResult};
pub use identity::{identity_from_value, identity_value, mobile_identity, IdentityError};
pub use message::{peek_header, Message, MessageDesc, MessageId};
pub use render::{render_message, render_value};
pub use transform::{DecodeTransform, EncodeOverride, TransformError, Transforms};
pub use value::{Fields, Value};
