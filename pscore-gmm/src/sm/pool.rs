//! Dynamic PDP address pool

use std::collections::BTreeSet;
use std::net::Ipv4Addr;
use std::sync::Mutex;

use tracing::debug;

/// IPv4 addresses handed out to PDP contexts, shared by all sessions.
#[derive(Debug)]
pub struct AddressPool {
    start: u32,
    size: u32,
    used: Mutex<BTreeSet<u32>>,
}

impl AddressPool {
    /// Creates a pool of `size` consecutive addresses starting at `start`.
    pub fn new(start: Ipv4Addr, size: u32) -> Self {
        Self {
            start: u32::from(start),
            size,
            used: Mutex::new(BTreeSet::new()),
        }
    }

    fn used(&self) -> std::sync::MutexGuard<'_, BTreeSet<u32>> {
        match self.used.lock() {
            Ok(set) => set,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Takes the lowest free address. Returns `None` when exhausted.
    pub fn allocate(&self) -> Option<Ipv4Addr> {
        let mut used = self.used();
        let offset = (0..self.size).find(|o| !used.contains(o))?;
        used.insert(offset);
        let address = Ipv4Addr::from(self.start.wrapping_add(offset));
        debug!(%address, "PDP address allocated");
        Some(address)
    }

    fn offset(&self, address: Ipv4Addr) -> Option<u32> {
        let offset = u32::from(address).wrapping_sub(self.start);
        (offset < self.size).then_some(offset)
    }

    /// Marks a statically assigned address as used. Addresses outside the
    /// pool are always available; returns false when the address is inside
    /// the pool and already taken.
    pub fn reserve(&self, address: Ipv4Addr) -> bool {
        match self.offset(address) {
            Some(offset) => {
                let fresh = self.used().insert(offset);
                if fresh {
                    debug!(%address, "Static PDP address reserved");
                }
                fresh
            }
            None => true,
        }
    }

    /// Returns an address to the pool. Addresses outside the pool are
    /// ignored, so static addresses can be released unconditionally.
    pub fn release(&self, address: Ipv4Addr) {
        if let Some(offset) = self.offset(address) {
            self.used().remove(&offset);
        }
    }

    /// Number of addresses in use.
    pub fn in_use(&self) -> usize {
        self.used().len()
    }
}
