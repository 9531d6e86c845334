//! Routing area update (network side)
//!
//! 3GPP TS 24.008 Section 4.7.5
//!
//! The terminal must hold a GMM context; otherwise the update is rejected
//! with cause 10 (implicitly detached) and the terminal re-attaches. The
//! accept advertises the periodic update timer and may carry a new P-TMSI,
//! in which case the update waits for Routing Area Update Complete.

use pscore_common::config::TIMER_T3350;
use pscore_common::Rai;
use pscore_l3::{gmm_cause, GmmMessageType, Message, MessageId, UpdateType};
use tracing::{debug, info};

use crate::context::GmmState;
use crate::error::{ProcResult, ProcedureError};
use crate::gmm::common::{
    chain_verdict, confirm_ptmsi, deregister, gmm, periodic_rau_timer, ptmsi_value, rai_value,
    rau_reject, reallocate_ptmsi, ChainVerdict, SecurityChain,
};
use crate::procedure::{Action, ProcBase, ProcCtx, Procedure, ProcedureKind, ProcedureResult};

/// Update result: RA updated.
const UPDATE_RESULT_RA: u8 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Start,
    Securing,
    AwaitingComplete,
}

/// Network side of the routing area update procedure.
#[derive(Debug)]
pub struct RoutingAreaUpdate {
    base: ProcBase,
    phase: Phase,
    update_type: Option<UpdateType>,
    chain: SecurityChain,
}

impl RoutingAreaUpdate {
    /// Creates the procedure; the request is delivered through
    /// [`Procedure::process`].
    pub fn new() -> Self {
        Self {
            base: ProcBase::new(ProcedureKind::RoutingAreaUpdate),
            phase: Phase::Start,
            update_type: None,
            chain: SecurityChain::default(),
        }
    }

    /// Update type requested by the terminal.
    pub fn update_type(&self) -> Option<UpdateType> {
        self.update_type
    }

    fn on_request(&mut self, ctx: &mut ProcCtx<'_>, msg: &Message) -> ProcResult<Vec<Action>> {
        self.update_type = msg
            .uint("UpdateType")
            .and_then(|t| UpdateType::try_from(t as u8).ok());
        debug!(session = %ctx.session, update_type = ?self.update_type, "Routing area update request");

        if !ctx.ue.is_registered() || ctx.ue.imsi.is_none() {
            let cause = gmm_cause::IMPLICITLY_DETACHED;
            info!(session = %ctx.session, cause, "Routing area update rejected");
            deregister(ctx);
            self.base.fail(Some(cause));
            return Ok(vec![Action::Send(rau_reject(cause, ctx.gmm().force_standby))]);
        }

        let ue = &mut *ctx.ue;
        ue.rai = msg
            .bytes("OldRAI")
            .and_then(|b| <[u8; 6]>::try_from(b.as_ref()).ok())
            .map(Rai::decode);
        if let Some(cap) = msg.bytes("MSRACap") {
            ue.ms_ra_cap = Some(cap.clone());
        }
        if let Some(cap) = msg.bytes("MSNetworkCap") {
            ue.ms_network_cap = Some(cap.clone());
        }
        if let Some(drx) = msg.bytes("DRXParam") {
            ue.drx = Some(drx.clone());
        }

        self.chain = SecurityChain::new(ctx, ctx.gmm().auth_on_rau, false);
        self.phase = Phase::Securing;
        self.advance(ctx)
    }

    fn advance(&mut self, ctx: &mut ProcCtx<'_>) -> ProcResult<Vec<Action>> {
        match self.chain.next(ctx.ue) {
            Some(child) => Ok(vec![Action::Nest(child)]),
            None => self.accept(ctx),
        }
    }

    fn accept(&mut self, ctx: &mut ProcCtx<'_>) -> ProcResult<Vec<Action>> {
        let rai = ctx.gmm().rai();
        let mut accept = gmm(GmmMessageType::RoutingAreaUpdateAccept)
            .with("UpdateResult", UPDATE_RESULT_RA)
            .with("ForceStdby", ctx.gmm().force_standby)
            .with("PeriodicRAUpdateTimer", periodic_rau_timer(ctx))
            .with("RAI", rai_value(&rai));
        ctx.ue.rai = Some(rai);

        if ctx.gmm().ptmsi_realloc_on_rau {
            let ptmsi = reallocate_ptmsi(ctx);
            accept.fields.insert("AllocPTMSI", ptmsi_value(ptmsi));
            self.phase = Phase::AwaitingComplete;
            info!(session = %ctx.session, ptmsi = %format!("{ptmsi:08x}"), "Routing area update accepted");
            return Ok(vec![Action::Send(accept), Action::StartTimer(TIMER_T3350)]);
        }

        self.base.complete();
        info!(session = %ctx.session, "Routing area update accepted");
        Ok(vec![Action::Send(accept)])
    }
}

impl Default for RoutingAreaUpdate {
    fn default() -> Self {
        Self::new()
    }
}

impl Procedure for RoutingAreaUpdate {
    fn base(&self) -> &ProcBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ProcBase {
        &mut self.base
    }

    fn expects(&self, id: MessageId) -> bool {
        self.phase == Phase::AwaitingComplete
            && id == MessageId::gmm(GmmMessageType::RoutingAreaUpdateComplete)
    }

    fn process(&mut self, ctx: &mut ProcCtx<'_>, msg: &Message) -> ProcResult<Vec<Action>> {
        match (self.phase, GmmMessageType::try_from(msg.id.msg_type)) {
            (Phase::Start, Ok(GmmMessageType::RoutingAreaUpdateRequest)) => self.on_request(ctx, msg),
            (Phase::AwaitingComplete, Ok(GmmMessageType::RoutingAreaUpdateComplete)) => {
                confirm_ptmsi(ctx);
                ctx.ue.gmm_state = GmmState::Registered;
                self.base.complete();
                info!(session = %ctx.session, "Routing area update complete");
                Ok(Vec::new())
            }
            _ => Err(ProcedureError::unexpected(
                msg.id.to_string(),
                format!("routing area update in {:?}", self.phase),
            )),
        }
    }

    fn postprocess(
        &mut self,
        ctx: &mut ProcCtx<'_>,
        child: &ProcedureResult,
    ) -> ProcResult<Vec<Action>> {
        match chain_verdict(ProcedureKind::RoutingAreaUpdate, child)? {
            ChainVerdict::Abort => {
                self.base.abort();
                Ok(Vec::new())
            }
            ChainVerdict::Continue => self.advance(ctx),
        }
    }

    fn reject(&self, cause: u8, _header: u8) -> Option<Message> {
        Some(rau_reject(cause, 0))
    }
}
