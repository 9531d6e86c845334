//! GPRS mobility management procedures (network side)
//!
//! 3GPP TS 24.008 Section 4.7
//!
//! Terminal-initiated procedures (attach, routing area update, service
//! request, detach) are created by the dispatcher from their initiating
//! message. The common procedures (authentication, identification,
//! security mode control, P-TMSI reallocation) run nested under them or on
//! their own through [`Session::start_procedure`](crate::Session::start_procedure).

pub mod common;

mod attach;
mod auth;
mod detach;
mod identification;
mod information;
mod ptmsi;
mod rau;
mod service;
mod smc;

pub use attach::Attach;
pub use auth::Authentication;
pub use detach::{DetachNetwork, DetachUe};
pub use identification::Identification;
pub use information::Information;
pub use ptmsi::PtmsiReallocation;
pub use rau::RoutingAreaUpdate;
pub use service::ServiceRequest;
pub use smc::SecurityModeControl;
