//! Message builders and the common-procedure chain shared by attach,
//! routing area update and service request.

use std::collections::VecDeque;
use std::time::Duration;

use pscore_common::config::{TIMER_T3302, TIMER_T3312};
use pscore_common::{IdentityType, MobileIdentity, Rai};
use pscore_l3::{identity_value, GmmMessageType, Message, MessageId, Value};

use crate::context::UeContext;
use crate::error::{ProcResult, ProcedureError};
use crate::gmm::{Authentication, Identification, SecurityModeControl};
use crate::procedure::{Outcome, ProcCtx, Procedure, ProcedureKind, ProcedureResult};
use crate::timer::gprs_timer;

/// Downlink GMM message with no IEs set.
pub fn gmm(t: GmmMessageType) -> Message {
    Message::new(MessageId::gmm(t))
}

/// Routing area identification IE value.
pub fn rai_value(rai: &Rai) -> Value {
    Value::bytes(rai.encode().to_vec())
}

/// Mobile identity IE value carrying a P-TMSI.
pub fn ptmsi_value(ptmsi: u32) -> Value {
    identity_value(&MobileIdentity::Tmsi(ptmsi))
}

/// GPRS timer IE value of a configured timer.
pub fn timer_value(ctx: &ProcCtx<'_>, name: &str) -> Value {
    gprs_timer(ctx.timer(name))
}

/// Attach Reject with the retry timer.
pub fn attach_reject(cause: u8, t3302: Option<Duration>) -> Message {
    let msg = gmm(GmmMessageType::AttachReject).with("GMMCause", cause);
    match t3302 {
        Some(t) => msg.with("T3302", gprs_timer(t)),
        None => msg,
    }
}

/// Routing Area Update Reject.
pub fn rau_reject(cause: u8, force_standby: u8) -> Message {
    gmm(GmmMessageType::RoutingAreaUpdateReject)
        .with("GMMCause", cause)
        .with("ForceStdby", force_standby)
}

/// Service Reject.
pub fn service_reject(cause: u8) -> Message {
    gmm(GmmMessageType::ServiceReject).with("GMMCause", cause)
}

/// Periodic RA update timer advertised in accepts.
pub fn periodic_rau_timer(ctx: &ProcCtx<'_>) -> Value {
    timer_value(ctx, TIMER_T3312)
}

/// Retry timer advertised in attach accepts and rejects.
pub fn t3302(ctx: &ProcCtx<'_>) -> Duration {
    ctx.timer(TIMER_T3302)
}

/// Allocates a P-TMSI and records it as pending confirmation.
pub fn reallocate_ptmsi(ctx: &mut ProcCtx<'_>) -> u32 {
    let ptmsi = ctx.env.policy.allocate_temporary_identity();
    if let Some(stale) = ctx.ue.pending_ptmsi.replace(ptmsi) {
        ctx.env.policy.release_temporary_identity(stale);
    }
    ptmsi
}

/// Confirms the pending P-TMSI and releases the previous one.
pub fn confirm_ptmsi(ctx: &mut ProcCtx<'_>) {
    if let Some(old) = ctx.ue.confirm_ptmsi() {
        ctx.env.policy.release_temporary_identity(old);
    }
}

/// Clears the GMM context and returns the PDP addresses to the pool.
pub fn deregister(ctx: &mut ProcCtx<'_>) {
    for pdp in ctx.ue.detach() {
        ctx.env.addresses.release(pdp.address);
    }
}

// ============================================================================
// Common procedure chain
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChainStep {
    Authentication,
    SecurityModeControl,
    ImeisvIdentification,
}

/// Common procedures run before a registration accept:
/// authentication, security mode control, IMEISV identification.
///
/// Each step is chosen from configuration when the chain is built and
/// re-checked against the terminal context when it is reached.
#[derive(Debug, Default)]
pub struct SecurityChain {
    steps: VecDeque<ChainStep>,
}

impl SecurityChain {
    /// Builds the chain.
    ///
    /// # Arguments
    /// * `authenticate` - Run authentication
    /// * `with_imeisv` - Request the IMEISV when it is not known
    pub fn new(ctx: &ProcCtx<'_>, authenticate: bool, with_imeisv: bool) -> Self {
        let gmm = ctx.gmm();
        let mut steps = VecDeque::new();
        if authenticate {
            steps.push_back(ChainStep::Authentication);
        }
        if gmm.smc_required {
            steps.push_back(ChainStep::SecurityModeControl);
        }
        if with_imeisv && gmm.imeisv_request {
            steps.push_back(ChainStep::ImeisvIdentification);
        }
        Self { steps }
    }

    /// Next procedure to nest, or `None` when the chain is done.
    pub fn next(&mut self, ue: &UeContext) -> Option<Box<dyn Procedure>> {
        while let Some(step) = self.steps.pop_front() {
            match step {
                ChainStep::Authentication => return Some(Box::new(Authentication::new())),
                ChainStep::SecurityModeControl if ue.security.is_established() => {
                    return Some(Box::new(SecurityModeControl::new()))
                }
                ChainStep::ImeisvIdentification if ue.imeisv.is_none() => {
                    return Some(Box::new(Identification::new(IdentityType::Imeisv)))
                }
                ChainStep::SecurityModeControl | ChainStep::ImeisvIdentification => {}
            }
        }
        None
    }
}

/// How a registration procedure continues after a chained child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainVerdict {
    /// Run the next step
    Continue,
    /// Stop without answering the terminal
    Abort,
}

/// Judges the result of a chained child.
///
/// A failed authentication has already been answered with a reject, and a
/// failed security mode command leaves no usable key set, so both stop the
/// parent. A failed IMEISV identification only loses information.
pub fn chain_verdict(parent: ProcedureKind, child: &ProcedureResult) -> ProcResult<ChainVerdict> {
    if child.outcome == Outcome::Aborted {
        return Ok(ChainVerdict::Abort);
    }
    match child.kind {
        ProcedureKind::Identification => Ok(ChainVerdict::Continue),
        ProcedureKind::Authentication | ProcedureKind::SecurityModeControl => {
            Ok(if child.outcome.is_success() {
                ChainVerdict::Continue
            } else {
                ChainVerdict::Abort
            })
        }
        ProcedureKind::Attach
        | ProcedureKind::RoutingAreaUpdate
        | ProcedureKind::ServiceRequest
        | ProcedureKind::DetachUe
        | ProcedureKind::DetachNetwork
        | ProcedureKind::PtmsiReallocation
        | ProcedureKind::Information
        | ProcedureKind::PdpActivation
        | ProcedureKind::PdpDeactivation => Err(ProcedureError::unexpected(
            child.kind.name(),
            format!("{parent} does not nest {}", child.kind),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::procedure::ProcId;

    fn result(kind: ProcedureKind, outcome: Outcome) -> ProcedureResult {
        ProcedureResult {
            id: ProcId(2),
            kind,
            outcome,
        }
    }

    #[test]
    fn test_chain_verdicts() {
        let parent = ProcedureKind::Attach;
        assert_eq!(
            chain_verdict(parent, &result(ProcedureKind::Authentication, Outcome::Success)),
            Ok(ChainVerdict::Continue)
        );
        assert_eq!(
            chain_verdict(parent, &result(ProcedureKind::Authentication, Outcome::Failure(None))),
            Ok(ChainVerdict::Abort)
        );
        assert_eq!(
            chain_verdict(parent, &result(ProcedureKind::Identification, Outcome::Failure(None))),
            Ok(ChainVerdict::Continue)
        );
        assert_eq!(
            chain_verdict(parent, &result(ProcedureKind::Identification, Outcome::Aborted)),
            Ok(ChainVerdict::Abort)
        );
        assert!(chain_verdict(parent, &result(ProcedureKind::PdpActivation, Outcome::Success)).is_err());
    }

    #[test]
    fn test_reject_builders() {
        let reject = rau_reject(10, 1);
        assert_eq!(reject.uint("GMMCause"), Some(10));
        assert_eq!(reject.uint("ForceStdby"), Some(1));
        assert!(!attach_reject(7, None).has("T3302"));
        assert!(attach_reject(7, Some(Duration::from_secs(720))).has("T3302"));
    }
}
