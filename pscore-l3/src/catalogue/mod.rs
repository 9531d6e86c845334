//! Message catalogue
//!
//! Immutable registry of message descriptors, one table per direction
//! because a few message types (detach request and accept) have different
//! layouts uplink and downlink. Built once at startup and shared by
//! reference afterwards.

pub mod gmm;
pub mod ies;
pub mod sm;

use std::collections::HashMap;

use bytes::Bytes;
use pscore_common::Direction;
use tracing::debug;

use crate::error::{DecodeError, DecodeResult, DescriptorError, EncodeError, EncodeResult};
use crate::message::{peek_header, Message, MessageDesc, MessageId};

/// Message descriptors keyed by direction and message id.
#[derive(Debug, Clone, Default)]
pub struct Catalogue {
    uplink: HashMap<MessageId, MessageDesc>,
    downlink: HashMap<MessageId, MessageDesc>,
}

impl Catalogue {
    /// Creates an empty catalogue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the GMM and SM catalogue of TS 24.008.
    ///
    /// # Errors
    /// Returns the first descriptor that breaks a structural invariant.
    pub fn gprs() -> Result<Self, DescriptorError> {
        let mut catalogue = Self::new();
        for desc in gmm::uplink().into_iter().chain(sm::uplink()) {
            catalogue.insert(Direction::Uplink, desc)?;
        }
        for desc in gmm::downlink().into_iter().chain(sm::downlink()) {
            catalogue.insert(Direction::Downlink, desc)?;
        }
        debug!(
            uplink = catalogue.uplink.len(),
            downlink = catalogue.downlink.len(),
            "GPRS catalogue built"
        );
        Ok(catalogue)
    }

    /// Validates and registers a descriptor.
    pub fn insert(&mut self, direction: Direction, desc: MessageDesc) -> Result<(), DescriptorError> {
        desc.validate()?;
        let table = self.table_mut(direction);
        if table.contains_key(&desc.id) {
            return Err(DescriptorError::DuplicateMessage(desc.name.to_string()));
        }
        table.insert(desc.id, desc);
        Ok(())
    }

    fn table(&self, direction: Direction) -> &HashMap<MessageId, MessageDesc> {
        match direction {
            Direction::Uplink => &self.uplink,
            Direction::Downlink => &self.downlink,
        }
    }

    fn table_mut(&mut self, direction: Direction) -> &mut HashMap<MessageId, MessageDesc> {
        match direction {
            Direction::Uplink => &mut self.uplink,
            Direction::Downlink => &mut self.downlink,
        }
    }

    /// Looks up a descriptor.
    pub fn get(&self, direction: Direction, id: MessageId) -> Option<&MessageDesc> {
        self.table(direction).get(&id)
    }

    /// Returns true if a descriptor exists for the message in either direction.
    pub fn knows(&self, id: MessageId) -> bool {
        self.uplink.contains_key(&id) || self.downlink.contains_key(&id)
    }

    /// Number of descriptors in one direction.
    pub fn len(&self, direction: Direction) -> usize {
        self.table(direction).len()
    }

    /// Returns true if no descriptor is registered.
    pub fn is_empty(&self) -> bool {
        self.uplink.is_empty() && self.downlink.is_empty()
    }

    /// Decodes a message, selecting the descriptor from its header.
    pub fn decode(&self, direction: Direction, data: &[u8]) -> DecodeResult<Message> {
        let (_, id) = peek_header(data)?;
        let desc = self.get(direction, id).ok_or(DecodeError::UnknownMessage {
            pd: id.pd,
            msg_type: id.msg_type,
        })?;
        desc.decode(data)
    }

    /// Encodes a message with the descriptor of its id.
    pub fn encode(&self, direction: Direction, msg: &Message) -> EncodeResult<Bytes> {
        let desc = self
            .get(direction, msg.id)
            .ok_or(EncodeError::UnknownMessage {
                pd: msg.id.pd,
                msg_type: msg.id.msg_type,
            })?;
        desc.encode(msg)
    }
}
