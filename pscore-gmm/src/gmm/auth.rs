//! Authentication and ciphering (network side)
//!
//! 3GPP TS 24.008 Section 4.7.7
//!
//! # Flow
//!
//! ```text
//! Network                                MS
//!  |  AUTHENTICATION AND CIPHERING REQUEST |  RAND, CKSN, [AUTN]
//!  |------------------------------------->|  T3360
//!  |  AUTHENTICATION AND CIPHERING RESPONSE|  RES, [RES ext]
//!  |<-------------------------------------|
//! ```
//!
//! A response whose RES differs from the expected one is answered with
//! Authentication and Ciphering Reject. A failure with cause 21 (synch
//! failure) carrying AUTS resynchronises the AuC and challenges once more.

use bytes::{BufMut, BytesMut};
use pscore_common::config::TIMER_T3360;
use pscore_l3::{gmm_cause, identity_from_value, GmmMessageType, Message, MessageId, Value};
use tracing::{debug, info, warn};

use crate::context::CKSN_NONE;
use crate::error::{ProcResult, ProcedureError};
use crate::gmm::common::gmm;
use crate::procedure::{Action, ProcBase, ProcCtx, Procedure, ProcedureKind};
use crate::provider::{AuthParams, AuthVector, VectorKind};

/// Ciphering algorithm: ciphering not used.
const CIPH_ALGO_NONE: u8 = 0;

/// Network side of the authentication and ciphering procedure.
#[derive(Debug)]
pub struct Authentication {
    base: ProcBase,
    vector: Option<AuthVector>,
    cksn: u8,
    ac_ref: u8,
    resynchronised: bool,
}

impl Authentication {
    /// Creates the procedure.
    pub fn new() -> Self {
        Self {
            base: ProcBase::new(ProcedureKind::Authentication),
            vector: None,
            cksn: CKSN_NONE,
            ac_ref: 0,
            resynchronised: false,
        }
    }

    /// Key set sequence number of the current challenge.
    pub fn cksn(&self) -> u8 {
        self.cksn
    }

    fn challenge(&mut self, ctx: &mut ProcCtx<'_>, imsi: &str) -> ProcResult<Vec<Action>> {
        let umts = ctx.ue.profile.as_ref().is_some_and(|p| p.usim);
        let vector = ctx
            .env
            .auc
            .make_vector(imsi, &AuthParams { umts })
            .ok_or_else(|| ProcedureError::Provider(format!("no authentication vector for {imsi}")))?;

        self.cksn = ctx.ue.security.next_cksn();
        self.ac_ref = (self.ac_ref + 1) & 0x0F;

        let mut request = gmm(GmmMessageType::AuthenticationCipheringRequest)
            .with("IMEISVRequest", 0u8)
            .with("CiphAlgo", CIPH_ALGO_NONE)
            .with("ACRef", self.ac_ref)
            .with("ForceStdby", ctx.gmm().force_standby)
            .with("RAND", Value::bytes(vector.rand.to_vec()))
            .with("CKSN", self.cksn);
        if let (VectorKind::Umts, Some(autn)) = (vector.kind, &vector.autn) {
            request.fields.insert("AUTN", Value::Bytes(autn.clone()));
        }
        debug!(session = %ctx.session, cksn = self.cksn, kind = ?vector.kind, "Authentication challenge");
        self.vector = Some(vector);
        Ok(vec![Action::Send(request), Action::StartTimer(TIMER_T3360)])
    }

    fn on_response(&mut self, ctx: &mut ProcCtx<'_>, msg: &Message) -> ProcResult<Vec<Action>> {
        let Some(vector) = self.vector.take() else {
            return Err(ProcedureError::unexpected(
                "AuthenticationCipheringResponse",
                "no challenge outstanding",
            ));
        };
        if msg.uint("ACRef") != Some(u64::from(self.ac_ref)) {
            debug!(session = %ctx.session, "A&C reference number differs from the request");
        }

        let mut res = BytesMut::new();
        if let Some(r) = msg.bytes("RES") {
            res.put_slice(r);
        }
        if let Some(ext) = msg.bytes("RESExt") {
            res.put_slice(ext);
        }

        if res.as_ref() != vector.xres.as_ref() {
            warn!(session = %ctx.session, "Authentication response mismatch");
            ctx.ue.security.clear();
            self.base.fail(None);
            return Ok(vec![Action::Send(gmm(GmmMessageType::AuthenticationCipheringReject))]);
        }

        if let Some(Ok(imeisv)) = msg.get("IMEISV").map(identity_from_value) {
            ctx.ue.set_identity(&imeisv);
        }
        let security = &mut ctx.ue.security;
        security.cksn = Some(self.cksn);
        security.vector = Some(vector);
        security.activated = false;
        self.base.complete();
        info!(session = %ctx.session, cksn = self.cksn, "Authenticated");
        Ok(Vec::new())
    }

    fn on_failure(&mut self, ctx: &mut ProcCtx<'_>, msg: &Message) -> ProcResult<Vec<Action>> {
        let cause = msg.uint("GMMCause").map(|c| c as u8);
        let imsi = ctx.ue.imsi.clone().unwrap_or_default();

        if cause == Some(gmm_cause::SYNCH_FAILURE) && !self.resynchronised {
            if let (Some(auts), Some(vector)) = (msg.bytes("AUTS"), self.vector.as_ref()) {
                self.resynchronised = true;
                if ctx.env.auc.resynchronize(&imsi, &vector.rand, auts) {
                    info!(session = %ctx.session, "Sequence number resynchronised, new challenge");
                    return self.challenge(ctx, &imsi);
                }
                warn!(session = %ctx.session, "Resynchronisation refused by the AuC");
            }
        }

        warn!(session = %ctx.session, cause = ?cause, "Authentication failure");
        self.vector = None;
        ctx.ue.security.clear();
        self.base.fail(cause);
        Ok(Vec::new())
    }
}

impl Default for Authentication {
    fn default() -> Self {
        Self::new()
    }
}

impl Procedure for Authentication {
    fn base(&self) -> &ProcBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ProcBase {
        &mut self.base
    }

    fn expects(&self, id: MessageId) -> bool {
        self.vector.is_some()
            && (id == MessageId::gmm(GmmMessageType::AuthenticationCipheringResponse)
                || id == MessageId::gmm(GmmMessageType::AuthenticationCipheringFailure))
    }

    fn output(&mut self, ctx: &mut ProcCtx<'_>) -> ProcResult<Vec<Action>> {
        let Some(imsi) = ctx.ue.imsi.clone() else {
            warn!(session = %ctx.session, "Authentication without IMSI");
            self.base.fail(None);
            return Ok(Vec::new());
        };
        self.challenge(ctx, &imsi)
    }

    fn process(&mut self, ctx: &mut ProcCtx<'_>, msg: &Message) -> ProcResult<Vec<Action>> {
        match GmmMessageType::try_from(msg.id.msg_type) {
            Ok(GmmMessageType::AuthenticationCipheringResponse) => self.on_response(ctx, msg),
            Ok(GmmMessageType::AuthenticationCipheringFailure) => self.on_failure(ctx, msg),
            _ => Err(ProcedureError::unexpected(msg.id.to_string(), "authentication")),
        }
    }
}
