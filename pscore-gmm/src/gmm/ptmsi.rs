//! P-TMSI reallocation (network side)
//!
//! 3GPP TS 24.008 Section 4.7.6
//!
//! Attach and routing area update embed the reallocation in their accept;
//! this procedure runs it on its own.

use pscore_common::config::TIMER_T3350;
use pscore_l3::{GmmMessageType, Message, MessageId};
use tracing::info;

use crate::error::ProcResult;
use crate::gmm::common::{confirm_ptmsi, gmm, ptmsi_value, rai_value, reallocate_ptmsi};
use crate::procedure::{Action, ProcBase, ProcCtx, Procedure, ProcedureKind};

/// Assigns a new P-TMSI.
#[derive(Debug)]
pub struct PtmsiReallocation {
    base: ProcBase,
}

impl PtmsiReallocation {
    /// Creates the procedure.
    pub fn new() -> Self {
        Self {
            base: ProcBase::new(ProcedureKind::PtmsiReallocation),
        }
    }
}

impl Default for PtmsiReallocation {
    fn default() -> Self {
        Self::new()
    }
}

impl Procedure for PtmsiReallocation {
    fn base(&self) -> &ProcBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ProcBase {
        &mut self.base
    }

    fn expects(&self, id: MessageId) -> bool {
        id == MessageId::gmm(GmmMessageType::PtmsiReallocationComplete)
    }

    fn output(&mut self, ctx: &mut ProcCtx<'_>) -> ProcResult<Vec<Action>> {
        let ptmsi = reallocate_ptmsi(ctx);
        let rai = ctx.ue.rai.unwrap_or_else(|| ctx.gmm().rai());
        let command = gmm(GmmMessageType::PtmsiReallocationCommand)
            .with("AllocPTMSI", ptmsi_value(ptmsi))
            .with("RAI", rai_value(&rai))
            .with("ForceStdby", ctx.gmm().force_standby);
        Ok(vec![Action::Send(command), Action::StartTimer(TIMER_T3350)])
    }

    fn process(&mut self, ctx: &mut ProcCtx<'_>, _msg: &Message) -> ProcResult<Vec<Action>> {
        confirm_ptmsi(ctx);
        self.base.complete();
        info!(session = %ctx.session, ptmsi = ?ctx.ue.ptmsi.map(|p| format!("{p:08x}")), "P-TMSI reallocated");
        Ok(Vec::new())
    }
}
