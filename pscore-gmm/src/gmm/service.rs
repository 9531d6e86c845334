//! Service request (network side)
//!
//! 3GPP TS 24.008 Section 4.7.13

use pscore_l3::{gmm_cause, GmmMessageType, Message, MessageId};
use tracing::info;

use crate::error::{ProcResult, ProcedureError};
use crate::gmm::common::{chain_verdict, gmm, service_reject, ChainVerdict, SecurityChain};
use crate::procedure::{Action, ProcBase, ProcCtx, Procedure, ProcedureKind, ProcedureResult};

/// Network side of the service request procedure.
#[derive(Debug)]
pub struct ServiceRequest {
    base: ProcBase,
    service_type: Option<u8>,
    chain: SecurityChain,
}

impl ServiceRequest {
    /// Creates the procedure.
    pub fn new() -> Self {
        Self {
            base: ProcBase::new(ProcedureKind::ServiceRequest),
            service_type: None,
            chain: SecurityChain::default(),
        }
    }

    /// Service type requested (0 signalling, 1 data, 2 paging response).
    pub fn service_type(&self) -> Option<u8> {
        self.service_type
    }

    fn advance(&mut self, ctx: &mut ProcCtx<'_>) -> ProcResult<Vec<Action>> {
        if let Some(child) = self.chain.next(ctx.ue) {
            return Ok(vec![Action::Nest(child)]);
        }
        self.base.complete();
        info!(session = %ctx.session, service_type = ?self.service_type, "Service accepted");
        Ok(vec![Action::Send(gmm(GmmMessageType::ServiceAccept))])
    }
}

impl Default for ServiceRequest {
    fn default() -> Self {
        Self::new()
    }
}

impl Procedure for ServiceRequest {
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
        if msg.id != MessageId::gmm(GmmMessageType::ServiceRequest) {
            return Err(ProcedureError::unexpected(msg.id.to_string(), "service request"));
        }
        self.service_type = msg.uint("ServiceType").map(|t| t as u8);

        if !ctx.ue.is_registered() {
            let cause = gmm_cause::IMPLICITLY_DETACHED;
            info!(session = %ctx.session, cause, "Service rejected");
            self.base.fail(Some(cause));
            return Ok(vec![Action::Send(service_reject(cause))]);
        }

        self.chain = SecurityChain::new(ctx, ctx.gmm().auth_on_service, false);
        self.advance(ctx)
    }

    fn postprocess(
        &mut self,
        ctx: &mut ProcCtx<'_>,
        child: &ProcedureResult,
    ) -> ProcResult<Vec<Action>> {
        match chain_verdict(ProcedureKind::ServiceRequest, child)? {
            ChainVerdict::Abort => {
                self.base.abort();
                Ok(Vec::new())
            }
            ChainVerdict::Continue => self.advance(ctx),
        }
    }

    fn reject(&self, cause: u8, _header: u8) -> Option<Message> {
        Some(service_reject(cause))
    }
}
