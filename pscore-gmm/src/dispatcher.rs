//! Uplink dispatcher
//!
//! Routes one uplink PDU to a procedure:
//!
//! 1. A message type the catalogue does not know is answered with a
//!    status message, cause 97.
//! 2. A message the top of the stack expects is delivered to it.
//! 3. A message that starts a terminal-initiated procedure instantiates
//!    and pushes that procedure, or is deferred while the stack is
//!    preempted.
//! 4. Anything else is answered with a status message, cause 98, and
//!    reported as unexpected.

use bytes::Bytes;
use pscore_common::{log_l3_message, Direction};
use pscore_l3::{
    gmm_cause, peek_header, sm_cause, DecodeError, GmmMessageType, Message, MessageId,
    ProtocolDiscriminator, SmMessageType,
};
use tracing::{debug, info, warn};

use crate::error::{ProcResult, ProcedureError};
use crate::gmm::{Attach, DetachUe, RoutingAreaUpdate, ServiceRequest};
use crate::procedure::{ProcId, Procedure, ProcedureKind};
use crate::session::{Session, Step};
use crate::sm::{PdpActivation, PdpDeactivation};

/// Terminal-initiated procedure started by an uplink message.
pub fn initiating_kind(id: MessageId) -> Option<ProcedureKind> {
    if id.is_sm() {
        return match SmMessageType::try_from(id.msg_type).ok()? {
            SmMessageType::ActivatePdpContextRequest => Some(ProcedureKind::PdpActivation),
            SmMessageType::DeactivatePdpContextRequest => Some(ProcedureKind::PdpDeactivation),
            _ => None,
        };
    }
    if id.pd != u8::from(ProtocolDiscriminator::Gmm) {
        return None;
    }
    match GmmMessageType::try_from(id.msg_type).ok()? {
        GmmMessageType::AttachRequest => Some(ProcedureKind::Attach),
        GmmMessageType::DetachRequest => Some(ProcedureKind::DetachUe),
        GmmMessageType::RoutingAreaUpdateRequest => Some(ProcedureKind::RoutingAreaUpdate),
        GmmMessageType::ServiceRequest => Some(ProcedureKind::ServiceRequest),
        _ => None,
    }
}

fn instantiate(kind: ProcedureKind) -> Option<Box<dyn Procedure>> {
    let proc: Box<dyn Procedure> = match kind {
        ProcedureKind::Attach => Box::new(Attach::new()),
        ProcedureKind::RoutingAreaUpdate => Box::new(RoutingAreaUpdate::new()),
        ProcedureKind::ServiceRequest => Box::new(ServiceRequest::new()),
        ProcedureKind::DetachUe => Box::new(DetachUe::new()),
        ProcedureKind::PdpActivation => Box::new(PdpActivation::new()),
        ProcedureKind::PdpDeactivation => Box::new(PdpDeactivation::new()),
        ProcedureKind::DetachNetwork
        | ProcedureKind::Authentication
        | ProcedureKind::Identification
        | ProcedureKind::SecurityModeControl
        | ProcedureKind::PtmsiReallocation
        | ProcedureKind::Information => return None,
    };
    Some(proc)
}

fn is_status(id: MessageId) -> bool {
    id == MessageId::gmm(GmmMessageType::GmmStatus) || id == MessageId::sm(SmMessageType::SmStatus)
}

impl Session {
    pub(crate) fn dispatch(&mut self, pdu: &[u8]) -> ProcResult<()> {
        let (header, id) = peek_header(pdu)?;
        let Some(name) = self.env.catalogue.get(Direction::Uplink, id).map(|d| d.name) else {
            warn!(session = %self.id, message = %id, "Unknown message type");
            self.send_status(id, header, gmm_cause::MESSAGE_TYPE_NON_EXISTENT)?;
            return Err(DecodeError::UnknownMessage {
                pd: id.pd,
                msg_type: id.msg_type,
            }
            .into());
        };
        log_l3_message(self.id, Direction::Uplink, name, pdu);

        if let Some(top) = self.stack.top() {
            if self.stack.get(top).is_some_and(|p| p.expects(id)) {
                return self.deliver(top, header, pdu);
            }
        }

        if let Some(kind) = initiating_kind(id) {
            return self.initiate(kind, header, pdu);
        }

        if is_status(id) {
            match self.decode(pdu) {
                Ok(msg) => warn!(
                    session = %self.id,
                    cause = ?msg.uint("GMMCause").or(msg.uint("SMCause")),
                    "Status received from terminal"
                ),
                Err(e) => warn!(session = %self.id, error = %e, "Malformed status received"),
            }
            return Ok(());
        }

        let context = match self.stack.top().and_then(|t| self.stack.get(t)) {
            Some(p) => format!("{} is {}", p.kind(), p.base().state()),
            None => "no procedure running".to_string(),
        };
        warn!(session = %self.id, message = %id, %context, "Message not compatible with state");
        self.send_status(id, header, gmm_cause::MESSAGE_NOT_COMPATIBLE_WITH_STATE)?;
        Err(ProcedureError::unexpected(name, context))
    }

    /// Delivers an expected message to a running procedure.
    fn deliver(&mut self, id: ProcId, header: u8, pdu: &[u8]) -> ProcResult<()> {
        let msg = match self.decode(pdu) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(session = %self.id, proc = %id, error = %e, "Undecodable message aborts procedure");
                let reject = self
                    .stack
                    .get(id)
                    .and_then(|p| p.reject(gmm_cause::INVALID_MANDATORY_INFORMATION, header));
                self.send_reject_or_status(reject, pdu, header)?;
                if let Some(p) = self.stack.get_mut(id) {
                    p.base_mut().abort();
                }
                self.settle(id)?;
                return Err(e.into());
            }
        };
        self.disarm_on_stack(id);
        self.drive(id, Step::Process(msg))
    }

    /// Starts a terminal-initiated procedure.
    fn initiate(&mut self, kind: ProcedureKind, header: u8, pdu: &[u8]) -> ProcResult<()> {
        if kind == ProcedureKind::DetachUe {
            let aborted = self.abort_all();
            if aborted > 0 {
                debug!(session = %self.id, aborted, "Detach clears the procedure stack");
            }
        }
        if let Some(owner) = self.stack.preempted_by() {
            debug!(session = %self.id, %owner, %kind, "Stack preempted, deferring");
            self.stack.defer(Bytes::copy_from_slice(pdu));
            return Ok(());
        }
        let Some(proc) = instantiate(kind) else {
            return Err(ProcedureError::unexpected(kind.name(), "not terminal-initiated"));
        };
        let msg = match self.decode(pdu) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(session = %self.id, %kind, error = %e, "Undecodable initiating message");
                let reject = proc.reject(gmm_cause::INVALID_MANDATORY_INFORMATION, header);
                self.send_reject_or_status(reject, pdu, header)?;
                return Err(e.into());
            }
        };
        let id = self.stack.push(proc, None);
        if kind.preempts() {
            self.stack.preempt(id)?;
        }
        info!(session = %self.id, proc = %id, %kind, "Procedure started");
        self.drive(id, Step::Process(msg))
    }

    fn decode(&self, pdu: &[u8]) -> Result<Message, DecodeError> {
        let mut msg = self.env.catalogue.decode(Direction::Uplink, pdu)?;
        self.env.transforms.apply_decode(&mut msg)?;
        Ok(msg)
    }

    fn send_reject_or_status(&mut self, reject: Option<Message>, pdu: &[u8], header: u8) -> ProcResult<()> {
        match reject {
            Some(reject) => self.transmit(None, reject),
            None => match peek_header(pdu) {
                Ok((_, id)) => self.send_status(id, header, gmm_cause::INVALID_MANDATORY_INFORMATION),
                Err(_) => Ok(()),
            },
        }
    }

    /// Answers an offending message with GMM or SM status.
    fn send_status(&mut self, offending: MessageId, header: u8, cause: u8) -> ProcResult<()> {
        let status = if offending.is_sm() {
            Message::new(MessageId::sm(SmMessageType::SmStatus))
                .with_header(header ^ 0x8)
                .with("SMCause", sm_cause_of(cause))
        } else if offending.pd == u8::from(ProtocolDiscriminator::Gmm) {
            Message::new(MessageId::gmm(GmmMessageType::GmmStatus)).with("GMMCause", cause)
        } else {
            return Ok(());
        };
        self.transmit(None, status)
    }
}

fn sm_cause_of(gmm: u8) -> u8 {
    match gmm {
        gmm_cause::INVALID_MANDATORY_INFORMATION => sm_cause::INVALID_MANDATORY_INFORMATION,
        gmm_cause::MESSAGE_TYPE_NON_EXISTENT => sm_cause::MESSAGE_TYPE_NON_EXISTENT,
        gmm_cause::MESSAGE_NOT_COMPATIBLE_WITH_STATE => sm_cause::MESSAGE_NOT_COMPATIBLE_WITH_STATE,
        _ => sm_cause::PROTOCOL_ERROR_UNSPECIFIED,
    }
}
