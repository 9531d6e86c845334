//! Common types and utilities for pscore
//!
//! This crate provides the pieces shared by the codec and procedure crates:
//! - Bit-level cursors used by the layer-3 codec
//! - PLMN, routing area and mobile identity types
//! - Error types
//! - Logging setup
//! - YAML configuration

pub mod bit_buffer;
pub mod config;
pub mod error;
pub mod logging;
pub mod types;

pub use bit_buffer::{BitError, BitReader, BitResult, BitWriter};
pub use config::{CoreConfig, GmmConfig, SmConfig, SubscriberEntry};
pub use error::Error;
pub use logging::{init_logging, init_logging_with_filter, log_l3_message, Direction, LogLevel};
pub use types::{IdentityType, MobileIdentity, Plmn, Rai};
