//! Procedure stack
//!
//! Procedures of one session form a stack: a nested procedure sits above
//! its parent and the top of the stack sees inbound messages first. While
//! a preempting procedure runs, it owns the stack and new
//! terminal-initiated procedures are deferred until it finishes.

use std::collections::{HashMap, VecDeque};

use bytes::Bytes;
use tracing::trace;

use crate::error::{ProcResult, ProcedureError};
use crate::procedure::{ProcId, Procedure};

#[derive(Debug)]
struct Slot {
    /// `None` while the session is calling into the procedure
    proc: Option<Box<dyn Procedure>>,
    parent: Option<ProcId>,
}

/// Ordered set of running procedures.
#[derive(Debug, Default)]
pub struct ProcedureStack {
    order: Vec<ProcId>,
    slots: HashMap<ProcId, Slot>,
    preempt_owner: Option<ProcId>,
    next_id: u32,
    next_generation: u64,
    deferred: VecDeque<Bytes>,
}

impl ProcedureStack {
    /// Creates an empty stack.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes a procedure and returns its handle.
    pub fn push(&mut self, proc: Box<dyn Procedure>, parent: Option<ProcId>) -> ProcId {
        self.next_id += 1;
        let id = ProcId(self.next_id);
        trace!(%id, kind = %proc.kind(), ?parent, "push");
        self.order.push(id);
        self.slots.insert(
            id,
            Slot {
                proc: Some(proc),
                parent,
            },
        );
        id
    }

    /// Takes a procedure out of its slot for the duration of a call.
    pub(crate) fn take(&mut self, id: ProcId) -> Option<Box<dyn Procedure>> {
        self.slots.get_mut(&id).and_then(|s| s.proc.take())
    }

    /// Puts a procedure back. Dropped if the slot was removed meanwhile.
    pub(crate) fn restore(&mut self, id: ProcId, proc: Box<dyn Procedure>) {
        if let Some(slot) = self.slots.get_mut(&id) {
            slot.proc = Some(proc);
        }
    }

    /// Returns a procedure.
    pub fn get(&self, id: ProcId) -> Option<&dyn Procedure> {
        self.slots.get(&id).and_then(|s| s.proc.as_deref())
    }

    /// Returns a procedure, mutable.
    pub fn get_mut(&mut self, id: ProcId) -> Option<&mut Box<dyn Procedure>> {
        self.slots.get_mut(&id).and_then(|s| s.proc.as_mut())
    }

    /// Procedure on top of the stack.
    pub fn top(&self) -> Option<ProcId> {
        self.order.last().copied()
    }

    /// Parent of a procedure.
    pub fn parent(&self, id: ProcId) -> Option<ProcId> {
        self.slots.get(&id).and_then(|s| s.parent)
    }

    /// Returns true if the procedure is on the stack.
    pub fn contains(&self, id: ProcId) -> bool {
        self.slots.contains_key(&id)
    }

    /// Number of procedures on the stack.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns true if no procedure runs.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Handles from bottom to top.
    pub fn ids(&self) -> &[ProcId] {
        &self.order
    }

    /// Gives a procedure exclusive ownership of the stack.
    pub fn preempt(&mut self, id: ProcId) -> ProcResult<()> {
        match self.preempt_owner {
            Some(owner) if owner != id => Err(ProcedureError::StackBusy { owner }),
            _ => {
                self.preempt_owner = Some(id);
                Ok(())
            }
        }
    }

    /// Procedure owning the stack, if any.
    pub fn preempted_by(&self) -> Option<ProcId> {
        self.preempt_owner
    }

    /// Removes a procedure and everything pushed above it.
    ///
    /// Returns the removed procedures, topmost first. Removing an unknown
    /// handle returns an empty list.
    pub fn remove_from(&mut self, id: ProcId) -> Vec<(ProcId, Option<Box<dyn Procedure>>)> {
        let Some(pos) = self.order.iter().position(|p| *p == id) else {
            return Vec::new();
        };
        let removed: Vec<ProcId> = self.order.drain(pos..).rev().collect();
        removed
            .into_iter()
            .map(|rid| {
                if self.preempt_owner == Some(rid) {
                    self.preempt_owner = None;
                }
                let proc = self.slots.remove(&rid).and_then(|s| s.proc);
                trace!(id = %rid, "removed");
                (rid, proc)
            })
            .collect()
    }

    /// Queues an initiating message that arrived while the stack was
    /// preempted.
    pub fn defer(&mut self, pdu: Bytes) {
        self.deferred.push_back(pdu);
    }

    /// Drains the deferred messages.
    pub fn take_deferred(&mut self) -> Vec<Bytes> {
        self.deferred.drain(..).collect()
    }

    /// Number of deferred messages.
    pub fn deferred_len(&self) -> usize {
        self.deferred.len()
    }

    /// Returns a fresh timer generation.
    pub fn next_generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }
}
