//! Identification (network side)
//!
//! 3GPP TS 24.008 Section 4.7.8

use pscore_common::config::TIMER_T3370;
use pscore_common::IdentityType;
use pscore_l3::{identity_from_value, GmmMessageType, Message, MessageId};
use tracing::{debug, info};

use crate::error::{ProcResult, ProcedureError};
use crate::gmm::common::gmm;
use crate::procedure::{Action, ProcBase, ProcCtx, Procedure, ProcedureKind};

/// Requests one identity from the terminal.
#[derive(Debug)]
pub struct Identification {
    base: ProcBase,
    requested: IdentityType,
}

impl Identification {
    /// Creates the procedure for the given identity type.
    pub fn new(requested: IdentityType) -> Self {
        Self {
            base: ProcBase::new(ProcedureKind::Identification),
            requested,
        }
    }

    /// Identity type requested.
    pub fn requested(&self) -> IdentityType {
        self.requested
    }
}

impl Procedure for Identification {
    fn base(&self) -> &ProcBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ProcBase {
        &mut self.base
    }

    fn expects(&self, id: MessageId) -> bool {
        id == MessageId::gmm(GmmMessageType::IdentityResponse)
    }

    fn output(&mut self, ctx: &mut ProcCtx<'_>) -> ProcResult<Vec<Action>> {
        debug!(session = %ctx.session, requested = %self.requested, "Identity request");
        let request = gmm(GmmMessageType::IdentityRequest)
            .with("ForceStdby", ctx.gmm().force_standby)
            .with("IDType", u8::from(self.requested));
        Ok(vec![Action::Send(request), Action::StartTimer(TIMER_T3370)])
    }

    fn process(&mut self, ctx: &mut ProcCtx<'_>, msg: &Message) -> ProcResult<Vec<Action>> {
        let value = msg
            .get("MobileId")
            .ok_or_else(|| ProcedureError::ProtocolViolation("identity response without identity".into()))?;
        let identity = identity_from_value(value)
            .map_err(|e| ProcedureError::ProtocolViolation(e.to_string()))?;

        let got = identity.identity_type();
        if got != self.requested {
            ctx.violation(
                ProcedureKind::Identification,
                format!("requested {} identity, got {}", self.requested, got),
            );
            self.base.fail(None);
            return Ok(Vec::new());
        }

        ctx.ue.set_identity(&identity);
        self.base.complete();
        info!(session = %ctx.session, identity = %got, "Identity received");
        Ok(Vec::new())
    }
}
