//! GPRS detach
//!
//! 3GPP TS 24.008 Section 4.7.4
//!
//! # Terminal-initiated
//!
//! ```text
//! MS                                     Network
//!  |  DETACH REQUEST (type, power off)    |
//!  |------------------------------------->|  other procedures aborted
//!  |  DETACH ACCEPT                       |  (not sent on power off)
//!  |<-------------------------------------|
//! ```
//!
//! # Network-initiated
//!
//! ```text
//! Network                                MS
//!  |  DETACH REQUEST (type, [cause])      |
//!  |------------------------------------->|  T3322
//!  |  DETACH ACCEPT                       |
//!  |<-------------------------------------|
//! ```

use pscore_common::config::TIMER_T3322;
use pscore_l3::{GmmMessageType, Message, MessageId};
use tracing::info;

use crate::error::{ProcResult, ProcedureError};
use crate::gmm::common::{deregister, gmm};
use crate::procedure::{Action, ProcBase, ProcCtx, Procedure, ProcedureKind};

/// Detach type: IMSI detach (circuit-switched services only).
const DETACH_TYPE_IMSI: u8 = 2;

// ============================================================================
// Terminal-initiated detach
// ============================================================================

/// Network side of a detach requested by the terminal.
#[derive(Debug)]
pub struct DetachUe {
    base: ProcBase,
    power_off: bool,
}

impl DetachUe {
    /// Creates the procedure; the request is delivered through
    /// [`Procedure::process`].
    pub fn new() -> Self {
        Self {
            base: ProcBase::new(ProcedureKind::DetachUe),
            power_off: false,
        }
    }

    /// Returns true if the terminal is switching off.
    pub fn power_off(&self) -> bool {
        self.power_off
    }
}

impl Default for DetachUe {
    fn default() -> Self {
        Self::new()
    }
}

impl Procedure for DetachUe {
    fn base(&self) -> &ProcBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ProcBase {
        &mut self.base
    }

    fn expects(&self, _id: MessageId) -> bool {
        false
    }

    fn process(&mut self, ctx: &mut ProcCtx<'_>, msg: &Message) -> ProcResult<Vec<Action>> {
        if msg.id != MessageId::gmm(GmmMessageType::DetachRequest) {
            return Err(ProcedureError::unexpected(msg.id.to_string(), "detach"));
        }
        self.power_off = msg.uint("PowerOff") == Some(1);
        let detach_type = msg.uint("DetachType").unwrap_or_default() as u8;

        if detach_type != DETACH_TYPE_IMSI {
            deregister(ctx);
        }
        self.base.complete();
        info!(session = %ctx.session, detach_type, power_off = self.power_off, "Detached by terminal");

        if self.power_off {
            return Ok(Vec::new());
        }
        let accept = gmm(GmmMessageType::DetachAccept).with("ForceStdby", ctx.gmm().force_standby);
        Ok(vec![Action::Send(accept)])
    }
}

// ============================================================================
// Network-initiated detach
// ============================================================================

/// Detach ordered by the network.
#[derive(Debug)]
pub struct DetachNetwork {
    base: ProcBase,
    detach_type: u8,
    cause: Option<u8>,
}

impl DetachNetwork {
    /// Creates the procedure with the downlink detach type and optional
    /// GMM cause.
    pub fn new(detach_type: u8, cause: Option<u8>) -> Self {
        Self {
            base: ProcBase::new(ProcedureKind::DetachNetwork),
            detach_type,
            cause,
        }
    }
}

impl Procedure for DetachNetwork {
    fn base(&self) -> &ProcBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ProcBase {
        &mut self.base
    }

    fn expects(&self, id: MessageId) -> bool {
        id == MessageId::gmm(GmmMessageType::DetachAccept)
    }

    fn output(&mut self, ctx: &mut ProcCtx<'_>) -> ProcResult<Vec<Action>> {
        let mut request = gmm(GmmMessageType::DetachRequest)
            .with("ForceStdby", ctx.gmm().force_standby)
            .with("DetachType", self.detach_type);
        if let Some(cause) = self.cause {
            request.fields.insert("GMMCause", cause);
        }
        Ok(vec![Action::Send(request), Action::StartTimer(TIMER_T3322)])
    }

    fn process(&mut self, ctx: &mut ProcCtx<'_>, _msg: &Message) -> ProcResult<Vec<Action>> {
        deregister(ctx);
        self.base.complete();
        info!(session = %ctx.session, cause = ?self.cause, "Detached by network");
        Ok(Vec::new())
    }
}
