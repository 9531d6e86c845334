//! Procedure base
//!
//! A procedure is one bounded signaling exchange. Its lifecycle is
//!
//! ```text
//! CREATED -> AWAITING_PEER (zero or more times) -> COMPLETED | ABORTED
//! ```
//!
//! Procedures never touch the transport, the scheduler or the stack. Each
//! call returns a list of [`Action`]s that the session carries out: send a
//! message, arm the supervision timer, or push a nested procedure whose
//! result comes back through [`Procedure::postprocess`].

use std::fmt;
use std::time::{Duration, Instant};

use pscore_common::{Direction, GmmConfig};
use pscore_l3::{Message, MessageId};

use crate::context::{SessionId, UeContext};
use crate::env::CoreEnv;
use crate::error::{ProcResult, ProcedureError};
use crate::provider::TimerConfig;
use crate::timer::ArmedTimer;

/// Handle of a procedure instance within its session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcId(pub u32);

impl fmt::Display for ProcId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "proc#{}", self.0)
    }
}

/// Closed set of procedure types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcedureKind {
    /// GPRS attach (terminal-initiated)
    Attach,
    /// Routing area update (terminal-initiated)
    RoutingAreaUpdate,
    /// Service request (terminal-initiated)
    ServiceRequest,
    /// Detach requested by the terminal
    DetachUe,
    /// Detach requested by the network
    DetachNetwork,
    /// Authentication and ciphering
    Authentication,
    /// Identification
    Identification,
    /// Radio-level security activation
    SecurityModeControl,
    /// P-TMSI reallocation
    PtmsiReallocation,
    /// GMM information
    Information,
    /// PDP context activation (terminal-initiated)
    PdpActivation,
    /// PDP context deactivation (terminal-initiated)
    PdpDeactivation,
}

impl ProcedureKind {
    /// Procedure name used in logs.
    pub fn name(self) -> &'static str {
        match self {
            ProcedureKind::Attach => "Attach",
            ProcedureKind::RoutingAreaUpdate => "RoutingAreaUpdate",
            ProcedureKind::ServiceRequest => "ServiceRequest",
            ProcedureKind::DetachUe => "DetachUe",
            ProcedureKind::DetachNetwork => "DetachNetwork",
            ProcedureKind::Authentication => "Authentication",
            ProcedureKind::Identification => "Identification",
            ProcedureKind::SecurityModeControl => "SecurityModeControl",
            ProcedureKind::PtmsiReallocation => "PtmsiReallocation",
            ProcedureKind::Information => "Information",
            ProcedureKind::PdpActivation => "PdpActivation",
            ProcedureKind::PdpDeactivation => "PdpDeactivation",
        }
    }

    /// Returns true for procedures that take exclusive ownership of the
    /// stack while they run.
    pub fn preempts(self) -> bool {
        matches!(
            self,
            ProcedureKind::Attach
                | ProcedureKind::RoutingAreaUpdate
                | ProcedureKind::ServiceRequest
                | ProcedureKind::DetachUe
        )
    }

    /// Returns true for procedures started by the network.
    pub fn is_network_initiated(self) -> bool {
        matches!(
            self,
            ProcedureKind::DetachNetwork
                | ProcedureKind::Authentication
                | ProcedureKind::Identification
                | ProcedureKind::SecurityModeControl
                | ProcedureKind::PtmsiReallocation
                | ProcedureKind::Information
        )
    }
}

impl fmt::Display for ProcedureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Lifecycle state of a procedure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcState {
    /// Instantiated, nothing exchanged yet
    #[default]
    Created,
    /// Waiting for the peer or for a nested procedure
    AwaitingPeer,
    /// Finished, successfully or not
    Completed,
    /// Removed before finishing
    Aborted,
}

impl ProcState {
    /// Returns true for `Completed` and `Aborted`.
    pub fn is_terminal(self) -> bool {
        matches!(self, ProcState::Completed | ProcState::Aborted)
    }
}

impl fmt::Display for ProcState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcState::Created => write!(f, "CREATED"),
            ProcState::AwaitingPeer => write!(f, "AWAITING_PEER"),
            ProcState::Completed => write!(f, "COMPLETED"),
            ProcState::Aborted => write!(f, "ABORTED"),
        }
    }
}

/// How a procedure ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Exchange finished as intended
    Success,
    /// Exchange finished with a reject or failure, with its cause if any
    Failure(Option<u8>),
    /// Procedure was removed before finishing
    Aborted,
}

impl Outcome {
    /// Returns true for `Success`.
    pub fn is_success(self) -> bool {
        self == Outcome::Success
    }
}

/// Result handed to the parent of a finished procedure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcedureResult {
    /// Finished procedure
    pub id: ProcId,
    /// Its type
    pub kind: ProcedureKind,
    /// How it ended
    pub outcome: Outcome,
}

/// One message exchanged by a procedure.
#[derive(Debug, Clone)]
pub struct TraceEntry {
    /// Link direction
    pub direction: Direction,
    /// Message exchanged
    pub message: MessageId,
    /// When it was exchanged
    pub at: Instant,
}

/// Protocol violation surfaced to the session layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolViolation {
    /// Session it occurred in
    pub session: SessionId,
    /// Procedure that detected it
    pub procedure: ProcedureKind,
    /// Description
    pub detail: String,
}

/// Effect requested by a procedure.
#[derive(Debug)]
pub enum Action {
    /// Encode and send a downlink message
    Send(Message),
    /// Arm the named supervision timer; the messages sent in the same
    /// step are retransmitted on expiry
    StartTimer(&'static str),
    /// Push a nested procedure and run its output
    Nest(Box<dyn Procedure>),
}

/// State shared by every procedure.
#[derive(Debug)]
pub struct ProcBase {
    kind: ProcedureKind,
    state: ProcState,
    outcome: Option<Outcome>,
    trace: Vec<TraceEntry>,
    pub(crate) timer: Option<ArmedTimer>,
    pub(crate) sent: Vec<Message>,
}

impl ProcBase {
    /// Creates the base of a new procedure.
    pub fn new(kind: ProcedureKind) -> Self {
        Self {
            kind,
            state: ProcState::Created,
            outcome: None,
            trace: Vec::new(),
            timer: None,
            sent: Vec::new(),
        }
    }

    /// Procedure type.
    pub fn kind(&self) -> ProcedureKind {
        self.kind
    }

    /// Current state.
    pub fn state(&self) -> ProcState {
        self.state
    }

    /// Outcome, once terminal.
    pub fn outcome(&self) -> Option<Outcome> {
        self.outcome
    }

    /// Returns true once completed or aborted.
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Messages exchanged so far.
    pub fn trace(&self) -> &[TraceEntry] {
        &self.trace
    }

    /// Name of the armed timer, if any.
    pub fn armed_timer(&self) -> Option<&'static str> {
        self.timer.as_ref().map(|t| t.name)
    }

    /// Enters `AWAITING_PEER` unless already terminal.
    pub fn await_peer(&mut self) {
        if !self.is_terminal() {
            self.state = ProcState::AwaitingPeer;
        }
    }

    /// Finishes successfully.
    pub fn complete(&mut self) {
        self.finish(ProcState::Completed, Outcome::Success);
    }

    /// Finishes with a failure cause.
    pub fn fail(&mut self, cause: Option<u8>) {
        self.finish(ProcState::Completed, Outcome::Failure(cause));
    }

    /// Marks the procedure aborted. Has no effect once terminal.
    pub fn abort(&mut self) {
        self.finish(ProcState::Aborted, Outcome::Aborted);
    }

    fn finish(&mut self, state: ProcState, outcome: Outcome) {
        if !self.is_terminal() {
            self.state = state;
            self.outcome = Some(outcome);
        }
    }

    pub(crate) fn record(&mut self, direction: Direction, message: MessageId) {
        self.trace.push(TraceEntry {
            direction,
            message,
            at: Instant::now(),
        });
    }

    /// Builds the result reported to the parent.
    pub fn result(&self, id: ProcId) -> ProcedureResult {
        ProcedureResult {
            id,
            kind: self.kind,
            outcome: self.outcome.unwrap_or(Outcome::Aborted),
        }
    }
}

/// What a procedure may touch during one call.
pub struct ProcCtx<'a> {
    /// Shared collaborators and configuration
    pub env: &'a CoreEnv,
    /// Terminal context
    pub ue: &'a mut UeContext,
    /// Session the call belongs to
    pub session: SessionId,
    violations: &'a mut Vec<ProtocolViolation>,
}

impl<'a> ProcCtx<'a> {
    /// Creates a call context.
    pub fn new(
        env: &'a CoreEnv,
        ue: &'a mut UeContext,
        session: SessionId,
        violations: &'a mut Vec<ProtocolViolation>,
    ) -> Self {
        Self {
            env,
            ue,
            session,
            violations,
        }
    }

    /// Mobility management configuration.
    pub fn gmm(&self) -> &GmmConfig {
        &self.env.config.gmm
    }

    /// Configured value of a named timer.
    pub fn timer(&self, name: &str) -> Duration {
        self.gmm().timer_or_default(name)
    }

    /// Records a protocol violation for the session layer.
    pub fn violation(&mut self, procedure: ProcedureKind, detail: impl Into<String>) {
        let detail = detail.into();
        tracing::warn!(session = %self.session, procedure = %procedure, "{}", detail);
        self.violations.push(ProtocolViolation {
            session: self.session,
            procedure,
            detail,
        });
    }
}

/// One procedure state machine.
pub trait Procedure: fmt::Debug + Send {
    /// Shared state.
    fn base(&self) -> &ProcBase;

    /// Shared state, mutable.
    fn base_mut(&mut self) -> &mut ProcBase;

    /// Procedure type.
    fn kind(&self) -> ProcedureKind {
        self.base().kind()
    }

    /// Returns true if the procedure consumes this uplink message in its
    /// current state.
    fn expects(&self, id: MessageId) -> bool;

    /// Produces the first message(s) of a network-initiated exchange.
    fn output(&mut self, _ctx: &mut ProcCtx<'_>) -> ProcResult<Vec<Action>> {
        Ok(Vec::new())
    }

    /// Consumes one expected uplink message.
    fn process(&mut self, ctx: &mut ProcCtx<'_>, msg: &Message) -> ProcResult<Vec<Action>>;

    /// Resumes after a nested procedure finished.
    fn postprocess(
        &mut self,
        _ctx: &mut ProcCtx<'_>,
        child: &ProcedureResult,
    ) -> ProcResult<Vec<Action>> {
        Err(ProcedureError::unexpected(
            child.kind.name(),
            format!("{} runs no nested procedures", self.kind()),
        ))
    }

    /// Receives the outcome of a radio-level security mode command.
    fn on_security_result(
        &mut self,
        _ctx: &mut ProcCtx<'_>,
        _accepted: bool,
    ) -> ProcResult<Vec<Action>> {
        Err(ProcedureError::unexpected(
            "SecurityModeResult",
            format!("{} issued no security mode command", self.kind()),
        ))
    }

    /// Reject message sent when a message for this procedure cannot be
    /// decoded. `header` is the high nibble of the offending message.
    fn reject(&self, _cause: u8, _header: u8) -> Option<Message> {
        None
    }
}
