//! pscore-gmm - Network-side GPRS mobility and session management
//!
//! Implements the core network half of the TS 24.008 GMM and SM signaling
//! procedures for 2G/3G packet-switched access:
//!
//! - Attach, routing area update, service request, detach
//! - Authentication and ciphering, identification, security mode control,
//!   P-TMSI reallocation, GMM information
//! - PDP context activation and deactivation
//!
//! # Architecture
//!
//! ```text
//!            uplink PDU                           timer expiry
//!                │                                     │
//!  ┌─────────────▼─────────────────────────────────────▼──────────┐
//!  │ Session (one per terminal)                                   │
//!  │  ┌────────────┐   ┌──────────────────┐   ┌────────────────┐  │
//!  │  │ Dispatcher │──▶│ ProcedureStack   │──▶│ UeContext      │  │
//!  │  └────────────┘   │  Attach          │   └────────────────┘  │
//!  │                   │   └ Authentication│                      │
//!  │                   └──────────────────┘                       │
//!  └───────┬───────────────────┬──────────────────┬───────────────┘
//!          │                   │                  │
//!          ▼                   ▼                  ▼
//!      Transport           Scheduler      Policy / AuC / access security
//! ```
//!
//! Procedures never perform I/O. They return [`Action`]s (send a message,
//! arm a timer, nest a child procedure) and the [`Session`] carries them
//! out against the collaborators bundled in the shared [`CoreEnv`].

pub mod context;
pub mod dispatcher;
pub mod env;
pub mod error;
pub mod gmm;
pub mod procedure;
pub mod provider;
pub mod session;
pub mod sm;
pub mod stack;
pub mod timer;

#[cfg(test)]
mod mocks;

pub use context::{GmmState, PdpContext, SecurityContext, SessionId, UeContext};
pub use env::{Collaborators, CoreEnv};
pub use error::{ProcResult, ProcedureError};
pub use procedure::{
    Action, Outcome, ProcBase, ProcCtx, ProcId, ProcState, Procedure, ProcedureKind,
    ProcedureResult, ProtocolViolation, TraceEntry,
};
pub use provider::{
    AccessSecurity, AuthParams, AuthVector, AuthVectorProvider, DirectoryPolicy, Scheduler,
    SubscriberPolicy, SubscriberProfile, TimerConfig, TimerKey, Transport, VectorKind,
};
pub use session::{NetworkProcedure, Session};
pub use sm::AddressPool;
pub use stack::ProcedureStack;
