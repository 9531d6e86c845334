//! GPRS attach (network side)
//!
//! 3GPP TS 24.008 Section 4.7.3
//!
//! # Flow
//!
//! ```text
//! MS                                  Network
//!  |  ATTACH REQUEST                    |
//!  |---------------------------------->|
//!  |        [Identification (IMSI)]    |  if the identity is not an IMSI
//!  |        [Authentication]           |  if configured
//!  |        [Security mode control]    |  if configured
//!  |        [Identification (IMEISV)]  |  if configured
//!  |  ATTACH ACCEPT (new P-TMSI)        |
//!  |<----------------------------------|  T3350
//!  |  ATTACH COMPLETE                   |
//!  |---------------------------------->|
//! ```

use pscore_common::config::TIMER_T3350;
use pscore_common::{IdentityType, MobileIdentity, Rai};
use pscore_l3::{gmm_cause, identity_from_value, AttachType, GmmMessageType, Message, MessageId};
use tracing::{debug, info, warn};

use crate::context::GmmState;
use crate::error::{ProcResult, ProcedureError};
use crate::gmm::common::{
    attach_reject, chain_verdict, confirm_ptmsi, gmm, periodic_rau_timer, ptmsi_value, rai_value,
    reallocate_ptmsi, t3302, ChainVerdict, SecurityChain,
};
use crate::gmm::Identification;
use crate::procedure::{Action, ProcBase, ProcCtx, Procedure, ProcedureKind, ProcedureResult};
use crate::timer::gprs_timer;

/// Attach result: GPRS only.
const ATTACH_RESULT_GPRS: u8 = 1;

/// Radio priority for SMS: lowest.
const RADIO_PRIORITY_SMS: u8 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Start,
    Identifying,
    Securing,
    AwaitingComplete,
}

/// Network side of the GPRS attach procedure.
#[derive(Debug)]
pub struct Attach {
    base: ProcBase,
    phase: Phase,
    attach_type: Option<AttachType>,
    chain: SecurityChain,
}

impl Attach {
    /// Creates the procedure; the Attach Request is delivered through
    /// [`Procedure::process`].
    pub fn new() -> Self {
        Self {
            base: ProcBase::new(ProcedureKind::Attach),
            phase: Phase::Start,
            attach_type: None,
            chain: SecurityChain::default(),
        }
    }

    /// Attach type requested by the terminal.
    pub fn attach_type(&self) -> Option<AttachType> {
        self.attach_type
    }

    fn refuse(&mut self, ctx: &mut ProcCtx<'_>, cause: u8) -> ProcResult<Vec<Action>> {
        info!(session = %ctx.session, cause, "Attach rejected");
        ctx.ue.gmm_state = GmmState::Deregistered;
        self.base.fail(Some(cause));
        Ok(vec![Action::Send(attach_reject(cause, Some(t3302(ctx))))])
    }

    fn on_request(&mut self, ctx: &mut ProcCtx<'_>, msg: &Message) -> ProcResult<Vec<Action>> {
        let attach_type = msg
            .uint("AttachType")
            .and_then(|t| AttachType::try_from(t as u8).ok());
        self.attach_type = attach_type;
        debug!(session = %ctx.session, attach_type = ?attach_type, "Attach request");

        let emergency = attach_type == Some(AttachType::Emergency);
        if emergency {
            if let Some(cause) = ctx.gmm().emergency_reject_cause {
                return self.refuse(ctx, cause);
            }
        }

        let ue = &mut *ctx.ue;
        ue.emergency = emergency;
        ue.ms_network_cap = msg.bytes("MSNetworkCap").cloned();
        ue.ms_ra_cap = msg.bytes("MSRACap").cloned();
        ue.drx = msg.bytes("DRXParam").cloned();
        ue.rai = msg
            .bytes("OldRAI")
            .and_then(|b| <[u8; 6]>::try_from(b.as_ref()).ok())
            .map(Rai::decode);

        let identity = match msg.get("MobileId").map(identity_from_value) {
            Some(Ok(identity)) => identity,
            Some(Err(e)) => {
                warn!(session = %ctx.session, error = %e, "Unusable identity in attach request");
                return self.refuse(ctx, gmm_cause::INVALID_MANDATORY_INFORMATION);
            }
            None => return self.refuse(ctx, gmm_cause::INVALID_MANDATORY_INFORMATION),
        };
        match &identity {
            MobileIdentity::Tmsi(tmsi) if ctx.ue.ptmsi == Some(*tmsi) => {
                debug!(session = %ctx.session, "Attach with the current P-TMSI");
            }
            MobileIdentity::Tmsi(_) => {
                // Foreign P-TMSI: the IMSI on record, if any, is not this one
                ctx.ue.imsi = None;
            }
            other => ctx.ue.set_identity(other),
        }

        if ctx.ue.imsi.is_none() && !(emergency && ctx.ue.imei.is_some()) {
            self.phase = Phase::Identifying;
            return Ok(vec![Action::Nest(Box::new(Identification::new(IdentityType::Imsi)))]);
        }
        self.check_subscriber(ctx)
    }

    fn check_subscriber(&mut self, ctx: &mut ProcCtx<'_>) -> ProcResult<Vec<Action>> {
        let Some(imsi) = ctx.ue.imsi.clone() else {
            if ctx.ue.emergency {
                // Emergency attach identified by IMEI runs without security
                self.phase = Phase::Securing;
                return self.accept(ctx);
            }
            return self.refuse(ctx, gmm_cause::INVALID_MANDATORY_INFORMATION);
        };
        let identity = MobileIdentity::Imsi(imsi);
        if !ctx.env.policy.is_identity_allowed(&identity) {
            let cause = ctx.gmm().imsi_reject_cause;
            return self.refuse(ctx, cause);
        }
        ctx.ue.profile = ctx.env.policy.resolve_config(&identity);
        self.chain = SecurityChain::new(ctx, ctx.gmm().auth_on_attach, true);
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
        let gmm_config = ctx.gmm();
        let rai = gmm_config.rai();
        let mut accept = gmm(GmmMessageType::AttachAccept)
            .with("ForceStdby", gmm_config.force_standby)
            .with("AttachResult", ATTACH_RESULT_GPRS)
            .with("PeriodicRAUpdateTimer", periodic_rau_timer(ctx))
            .with("RadioPrioTOM8", ctx.env.config.sm.radio_priority)
            .with("RadioPrioSMS", RADIO_PRIORITY_SMS)
            .with("RAI", rai_value(&rai))
            .with("T3302", gprs_timer(t3302(ctx)));
        ctx.ue.rai = Some(rai);

        if ctx.gmm().ptmsi_realloc_on_attach || ctx.ue.ptmsi.is_none() {
            let ptmsi = reallocate_ptmsi(ctx);
            accept.fields.insert("AllocPTMSI", ptmsi_value(ptmsi));
            ctx.ue.gmm_state = GmmState::CommonProcedureInitiated;
            self.phase = Phase::AwaitingComplete;
            info!(session = %ctx.session, ptmsi = %format!("{ptmsi:08x}"), "Attach accepted");
            return Ok(vec![Action::Send(accept), Action::StartTimer(TIMER_T3350)]);
        }

        ctx.ue.gmm_state = GmmState::Registered;
        self.base.complete();
        info!(session = %ctx.session, "Attach accepted, GMM-REGISTERED");
        Ok(vec![Action::Send(accept)])
    }
}

impl Default for Attach {
    fn default() -> Self {
        Self::new()
    }
}

impl Procedure for Attach {
    fn base(&self) -> &ProcBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ProcBase {
        &mut self.base
    }

    fn expects(&self, id: MessageId) -> bool {
        self.phase == Phase::AwaitingComplete && id == MessageId::gmm(GmmMessageType::AttachComplete)
    }

    fn process(&mut self, ctx: &mut ProcCtx<'_>, msg: &Message) -> ProcResult<Vec<Action>> {
        match (self.phase, GmmMessageType::try_from(msg.id.msg_type)) {
            (Phase::Start, Ok(GmmMessageType::AttachRequest)) => self.on_request(ctx, msg),
            (Phase::AwaitingComplete, Ok(GmmMessageType::AttachComplete)) => {
                confirm_ptmsi(ctx);
                ctx.ue.gmm_state = GmmState::Registered;
                self.base.complete();
                info!(session = %ctx.session, "Attach complete, GMM-REGISTERED");
                Ok(Vec::new())
            }
            _ => Err(ProcedureError::unexpected(
                msg.id.to_string(),
                format!("attach in {:?}", self.phase),
            )),
        }
    }

    fn postprocess(
        &mut self,
        ctx: &mut ProcCtx<'_>,
        child: &ProcedureResult,
    ) -> ProcResult<Vec<Action>> {
        match chain_verdict(ProcedureKind::Attach, child)? {
            ChainVerdict::Abort => {
                debug!(session = %ctx.session, child = %child.kind, outcome = ?child.outcome, "Attach stops");
                self.base.abort();
                Ok(Vec::new())
            }
            ChainVerdict::Continue if self.phase == Phase::Identifying => self.check_subscriber(ctx),
            ChainVerdict::Continue => self.advance(ctx),
        }
    }

    fn reject(&self, cause: u8, _header: u8) -> Option<Message> {
        Some(attach_reject(cause, None))
    }
}
