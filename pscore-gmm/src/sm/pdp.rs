//! PDP context activation and deactivation (network side)
//!
//! 3GPP TS 24.008 Section 6.1.3
//!
//! Both procedures are requested by the terminal and answered at once.
//! Downlink SM messages echo the transaction identifier of the request
//! with the TI flag inverted.

use std::net::Ipv4Addr;

use bytes::Bytes;
use pscore_l3::{sm_cause, Fields, Message, MessageId, SmMessageType, Value};
use tracing::{debug, info, warn};

use crate::context::PdpContext;
use crate::error::{ProcResult, ProcedureError};
use crate::procedure::{Action, ProcBase, ProcCtx, Procedure, ProcedureKind};

/// PDP type organisation: IETF.
const PDP_TYPE_ORG_IETF: u8 = 1;
/// PDP type number: IPv4.
const PDP_TYPE_IPV4: u8 = 0x21;
/// Tear down indicator set: deactivate every context of the terminal.
const TEAR_DOWN: u64 = 1;

/// Downlink header for a reply to `request`.
fn reply_header(request: &Message) -> u8 {
    request.header ^ 0x8
}

fn activation_reject(cause: u8, header: u8) -> Message {
    Message::new(MessageId::sm(SmMessageType::ActivatePdpContextReject))
        .with_header(header ^ 0x8)
        .with("SMCause", cause)
}

fn pdp_address(address: Ipv4Addr) -> Value {
    Value::Envelope(
        Fields::new()
            .with("TypeOrg", PDP_TYPE_ORG_IETF)
            .with("TypeNum", PDP_TYPE_IPV4)
            .with("Address", address.octets().to_vec()),
    )
}

fn apn_name(value: &Value) -> Option<String> {
    let labels = value.as_sequence()?;
    let name = labels
        .iter()
        .filter_map(Value::as_bytes)
        .map(|label| String::from_utf8_lossy(label).into_owned())
        .collect::<Vec<_>>()
        .join(".");
    Some(name)
}

// ============================================================================
// Activation
// ============================================================================

/// Network side of PDP context activation.
#[derive(Debug)]
pub struct PdpActivation {
    base: ProcBase,
}

impl PdpActivation {
    /// Creates the procedure; the request is delivered through
    /// [`Procedure::process`].
    pub fn new() -> Self {
        Self {
            base: ProcBase::new(ProcedureKind::PdpActivation),
        }
    }

    fn refuse(&mut self, cause: u8, request: &Message) -> ProcResult<Vec<Action>> {
        self.base.fail(Some(cause));
        Ok(vec![Action::Send(activation_reject(cause, request.header))])
    }

    fn accept(pdp: &PdpContext, radio_priority: u8, header: u8) -> Message {
        Message::new(MessageId::sm(SmMessageType::ActivatePdpContextAccept))
            .with_header(header)
            .with("LLCSAPI", pdp.llc_sapi)
            .with("QoS", Value::Bytes(pdp.qos.clone()))
            .with("RadioPriority", radio_priority)
            .with("PDPAddr", pdp_address(pdp.address))
    }
}

impl Default for PdpActivation {
    fn default() -> Self {
        Self::new()
    }
}

impl Procedure for PdpActivation {
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
        if msg.id != MessageId::sm(SmMessageType::ActivatePdpContextRequest) {
            return Err(ProcedureError::unexpected(msg.id.to_string(), "PDP context activation"));
        }
        let (_, ti) = msg.transaction_id();
        let radio_priority = ctx.env.config.sm.radio_priority;

        if !ctx.ue.is_registered() {
            warn!(session = %ctx.session, ti, "PDP activation while not attached");
            return self.refuse(sm_cause::ACTIVATION_REJECTED_UNSPECIFIED, msg);
        }

        // A repeated request for an active context gets the same answer.
        if let Some(existing) = ctx.ue.pdp.get(&ti) {
            debug!(session = %ctx.session, ti, "PDP context already active");
            let accept = Self::accept(existing, radio_priority, reply_header(msg));
            self.base.complete();
            return Ok(vec![Action::Send(accept)]);
        }

        let address = match ctx.ue.profile.as_ref().and_then(|p| p.address) {
            Some(fixed) => ctx.env.addresses.reserve(fixed).then_some(fixed),
            None => ctx.env.addresses.allocate(),
        };
        let Some(address) = address else {
            warn!(session = %ctx.session, ti, "No PDP address available");
            return self.refuse(sm_cause::INSUFFICIENT_RESOURCES, msg);
        };

        let configured = &ctx.env.config.sm.qos;
        let qos = if configured.is_empty() {
            msg.bytes("QoS").cloned().unwrap_or_default()
        } else {
            Bytes::copy_from_slice(configured)
        };
        let pdp = PdpContext {
            ti,
            nsapi: msg.uint("NSAPI").unwrap_or_default() as u8,
            llc_sapi: msg.uint("LLCSAPI").unwrap_or_default() as u8,
            address,
            apn: msg.get("APN").and_then(apn_name),
            qos,
        };
        let accept = Self::accept(&pdp, radio_priority, reply_header(msg));
        info!(
            session = %ctx.session,
            ti,
            nsapi = pdp.nsapi,
            %address,
            apn = pdp.apn.as_deref().unwrap_or("-"),
            "PDP context activated"
        );
        ctx.ue.pdp.insert(ti, pdp);
        self.base.complete();
        Ok(vec![Action::Send(accept)])
    }

    fn reject(&self, cause: u8, header: u8) -> Option<Message> {
        Some(activation_reject(cause, header))
    }
}

// ============================================================================
// Deactivation
// ============================================================================

/// Network side of terminal-requested PDP context deactivation.
#[derive(Debug)]
pub struct PdpDeactivation {
    base: ProcBase,
}

impl PdpDeactivation {
    /// Creates the procedure; the request is delivered through
    /// [`Procedure::process`].
    pub fn new() -> Self {
        Self {
            base: ProcBase::new(ProcedureKind::PdpDeactivation),
        }
    }
}

impl Default for PdpDeactivation {
    fn default() -> Self {
        Self::new()
    }
}

impl Procedure for PdpDeactivation {
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
        if msg.id != MessageId::sm(SmMessageType::DeactivatePdpContextRequest) {
            return Err(ProcedureError::unexpected(msg.id.to_string(), "PDP context deactivation"));
        }
        let (_, ti) = msg.transaction_id();
        let released: Vec<PdpContext> = if msg.uint("TearDown") == Some(TEAR_DOWN) {
            std::mem::take(&mut ctx.ue.pdp).into_values().collect()
        } else {
            ctx.ue.pdp.remove(&ti).into_iter().collect()
        };
        for pdp in &released {
            ctx.env.addresses.release(pdp.address);
        }
        info!(
            session = %ctx.session,
            ti,
            released = released.len(),
            cause = ?msg.uint("SMCause"),
            "PDP context deactivated"
        );

        let accept = Message::new(MessageId::sm(SmMessageType::DeactivatePdpContextAccept))
            .with_header(reply_header(msg));
        self.base.complete();
        Ok(vec![Action::Send(accept)])
    }
}
