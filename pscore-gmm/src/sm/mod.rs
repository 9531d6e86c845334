//! Session management procedures (network side)
//!
//! 3GPP TS 24.008 Section 6.1

pub mod pool;

mod pdp;

pub use pdp::{PdpActivation, PdpDeactivation};
pub use pool::AddressPool;
