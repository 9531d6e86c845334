//! Security mode control
//!
//! The radio-level security mode command belongs to the access network.
//! This procedure hands the current key set to the injected
//! [`AccessSecurity`](crate::provider::AccessSecurity) and completes when
//! the session layer reports the result.

use pscore_l3::{Message, MessageId};
use tracing::{info, warn};

use crate::error::{ProcResult, ProcedureError};
use crate::procedure::{Action, ProcBase, ProcCtx, Procedure, ProcedureKind};

/// Activates security with the established key set.
#[derive(Debug)]
pub struct SecurityModeControl {
    base: ProcBase,
}

impl SecurityModeControl {
    /// Creates the procedure.
    pub fn new() -> Self {
        Self {
            base: ProcBase::new(ProcedureKind::SecurityModeControl),
        }
    }
}

impl Default for SecurityModeControl {
    fn default() -> Self {
        Self::new()
    }
}

impl Procedure for SecurityModeControl {
    fn base(&self) -> &ProcBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ProcBase {
        &mut self.base
    }

    fn expects(&self, _id: MessageId) -> bool {
        false
    }

    fn output(&mut self, ctx: &mut ProcCtx<'_>) -> ProcResult<Vec<Action>> {
        let security = &ctx.ue.security;
        let (Some(cksn), Some(vector)) = (security.cksn, security.vector.as_ref()) else {
            warn!(session = %ctx.session, "Security mode control without key set");
            self.base.fail(None);
            return Ok(Vec::new());
        };
        if ctx.env.access_security.security_mode_command(ctx.session, cksn, vector.kind) {
            self.base.await_peer();
        } else {
            warn!(session = %ctx.session, "Security mode command refused");
            self.base.fail(None);
        }
        Ok(Vec::new())
    }

    fn process(&mut self, _ctx: &mut ProcCtx<'_>, msg: &Message) -> ProcResult<Vec<Action>> {
        Err(ProcedureError::unexpected(msg.id.to_string(), "security mode control"))
    }

    fn on_security_result(
        &mut self,
        ctx: &mut ProcCtx<'_>,
        accepted: bool,
    ) -> ProcResult<Vec<Action>> {
        if accepted {
            ctx.ue.security.activated = true;
            self.base.complete();
            info!(session = %ctx.session, "Security activated");
        } else {
            warn!(session = %ctx.session, "Security mode rejected by the access network");
            self.base.fail(None);
        }
        Ok(Vec::new())
    }
}
