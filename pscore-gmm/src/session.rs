//! Per-terminal session
//!
//! A [`Session`] owns the terminal context and the procedure stack. It is
//! the only place that touches the collaborators: procedures return
//! [`Action`]s and the session encodes and sends messages, arms timers and
//! pushes nested procedures on their behalf.
//!
//! # Event flow
//!
//! ```text
//! handle_uplink ──> dispatcher ──> drive(Process) ──> apply(actions) ──> settle
//! on_timer_expiry ──> resend | abort ──> settle ──> drive(parent, Postprocess)
//! ```

use std::sync::Arc;

use pscore_common::{log_l3_message, Direction, IdentityType};
use pscore_l3::Message;
use tracing::{debug, info, warn};

use crate::context::{SessionId, UeContext};
use crate::env::CoreEnv;
use crate::error::{ProcResult, ProcedureError};
use crate::gmm::{
    Authentication, DetachNetwork, Identification, Information, PtmsiReallocation,
    SecurityModeControl,
};
use crate::procedure::{
    Action, ProcCtx, ProcId, Procedure, ProcedureKind, ProcedureResult, ProtocolViolation,
};
use crate::provider::{TimerConfig, TimerKey};
use crate::stack::ProcedureStack;
use crate::timer::ArmedTimer;

/// Network-initiated procedures the session layer can start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkProcedure {
    /// Request an identity of the given type
    Identification(IdentityType),
    /// Challenge the terminal with a fresh vector
    Authentication,
    /// Activate security on the radio side
    SecurityModeControl,
    /// Assign a new P-TMSI
    PtmsiReallocation,
    /// Detach the terminal
    Detach {
        /// Detach type (1: re-attach required, 2: re-attach not required)
        detach_type: u8,
        /// GMM cause, if any
        cause: Option<u8>,
    },
    /// Send the network name
    Information,
}

impl NetworkProcedure {
    fn instantiate(self) -> Box<dyn Procedure> {
        match self {
            NetworkProcedure::Identification(kind) => Box::new(Identification::new(kind)),
            NetworkProcedure::Authentication => Box::new(Authentication::new()),
            NetworkProcedure::SecurityModeControl => Box::new(SecurityModeControl::new()),
            NetworkProcedure::PtmsiReallocation => Box::new(PtmsiReallocation::new()),
            NetworkProcedure::Detach { detach_type, cause } => {
                Box::new(DetachNetwork::new(detach_type, cause))
            }
            NetworkProcedure::Information => Box::new(Information::new()),
        }
    }
}

/// Input handed to a procedure.
#[derive(Debug)]
pub(crate) enum Step {
    Output,
    Process(Message),
    Postprocess(ProcedureResult),
    SecurityResult(bool),
}

/// Signaling state of one terminal.
#[derive(Debug)]
pub struct Session {
    pub(crate) id: SessionId,
    pub(crate) env: Arc<CoreEnv>,
    pub(crate) ue: UeContext,
    pub(crate) stack: ProcedureStack,
    pub(crate) violations: Vec<ProtocolViolation>,
}

impl Session {
    /// Creates a session with an empty context.
    pub fn new(id: SessionId, env: Arc<CoreEnv>) -> Self {
        debug!(session = %id, "Session created");
        Self {
            id,
            env,
            ue: UeContext::new(),
            stack: ProcedureStack::new(),
            violations: Vec::new(),
        }
    }

    /// Session identifier.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Shared environment.
    pub fn env(&self) -> &Arc<CoreEnv> {
        &self.env
    }

    /// Terminal context.
    pub fn ue(&self) -> &UeContext {
        &self.ue
    }

    /// Terminal context, mutable.
    pub fn ue_mut(&mut self) -> &mut UeContext {
        &mut self.ue
    }

    /// Running procedures.
    pub fn stack(&self) -> &ProcedureStack {
        &self.stack
    }

    /// Drains the protocol violations recorded so far.
    pub fn take_violations(&mut self) -> Vec<ProtocolViolation> {
        std::mem::take(&mut self.violations)
    }

    /// Handles one uplink layer-3 message.
    pub fn handle_uplink(&mut self, pdu: &[u8]) -> ProcResult<()> {
        self.dispatch(pdu)
    }

    /// Starts a network-initiated procedure.
    ///
    /// Refused with [`ProcedureError::StackBusy`] while a preempting
    /// procedure owns the stack.
    pub fn start_procedure(&mut self, procedure: NetworkProcedure) -> ProcResult<ProcId> {
        if let Some(owner) = self.stack.preempted_by() {
            return Err(ProcedureError::StackBusy { owner });
        }
        let id = self.stack.push(procedure.instantiate(), None);
        info!(session = %self.id, proc = %id, kind = ?self.kind_of(id), "Procedure started");
        self.drive(id, Step::Output)?;
        Ok(id)
    }

    /// Reports the result of a security mode command to the procedure that
    /// issued it.
    pub fn on_security_mode_result(&mut self, accepted: bool) -> ProcResult<()> {
        let id = self
            .stack
            .ids()
            .iter()
            .rev()
            .copied()
            .find(|id| {
                self.stack.get(*id).is_some_and(|p| {
                    p.kind() == ProcedureKind::SecurityModeControl && !p.base().is_terminal()
                })
            })
            .ok_or_else(|| {
                ProcedureError::unexpected("SecurityModeResult", "no security mode control running")
            })?;
        self.drive(id, Step::SecurityResult(accepted))
    }

    /// Handles the expiry of a procedure timer.
    ///
    /// Expiries of timers that were cancelled or re-armed since are
    /// ignored. Otherwise the procedure's last messages are resent while
    /// retransmissions remain, and the procedure is aborted after that,
    /// which its parent sees as an aborted child.
    pub fn on_timer_expiry(&mut self, key: TimerKey) -> ProcResult<()> {
        let timer = match self.stack.get_mut(key.proc) {
            Some(p) => match p.base_mut().timer.take() {
                Some(t) if t.generation == key.generation => t,
                other => {
                    p.base_mut().timer = other;
                    debug!(session = %self.id, proc = %key.proc, "Stale timer expiry ignored");
                    return Ok(());
                }
            },
            None => {
                debug!(session = %self.id, proc = %key.proc, "Timer expiry for finished procedure");
                return Ok(());
            }
        };

        if timer.expiry_count < self.env.gmm().max_retransmissions {
            info!(
                session = %self.id,
                proc = %key.proc,
                timer = timer.name,
                attempt = timer.expiry_count + 1,
                "Timer expired, retransmitting"
            );
            for msg in &timer.resend {
                self.transmit(Some(key.proc), msg.clone())?;
            }
            let generation = self.stack.next_generation();
            let rearmed = ArmedTimer {
                generation,
                expiry_count: timer.expiry_count + 1,
                ..timer
            };
            self.arm(key.proc, rearmed);
            return Ok(());
        }

        warn!(session = %self.id, proc = %key.proc, timer = timer.name, "Timer expired, aborting");
        if let Some(p) = self.stack.get_mut(key.proc) {
            p.base_mut().abort();
        }
        self.settle(key.proc)
    }

    /// Aborts a procedure and every procedure stacked above it.
    ///
    /// The parent is not notified. Returns the number of procedures
    /// removed, which is zero when the procedure is no longer on the stack.
    pub fn abort(&mut self, id: ProcId) -> usize {
        let removed = self.stack.remove_from(id);
        let count = removed.len();
        for (rid, proc) in removed {
            if let Some(mut proc) = proc {
                proc.base_mut().abort();
                self.disarm(rid, proc.as_mut());
                info!(session = %self.id, proc = %rid, kind = %proc.kind(), "Procedure aborted");
            }
        }
        if count > 0 {
            self.replay_deferred();
        }
        count
    }

    /// Aborts everything on the stack and drops deferred messages.
    pub(crate) fn abort_all(&mut self) -> usize {
        let dropped = self.stack.take_deferred().len();
        if dropped > 0 {
            debug!(session = %self.id, dropped, "Deferred messages dropped");
        }
        match self.stack.ids().first().copied() {
            Some(bottom) => self.abort(bottom),
            None => 0,
        }
    }

    fn kind_of(&self, id: ProcId) -> Option<ProcedureKind> {
        self.stack.get(id).map(|p| p.kind())
    }

    // ========================================================================
    // Procedure driving
    // ========================================================================

    /// Calls into a procedure, carries out the actions it returns and
    /// settles it if it finished.
    pub(crate) fn drive(&mut self, id: ProcId, step: Step) -> ProcResult<()> {
        let mut proc = self
            .stack
            .take(id)
            .ok_or(ProcedureError::NoSuchProcedure(id))?;
        proc.base_mut().sent.clear();
        if let Step::Process(msg) = &step {
            proc.base_mut().record(Direction::Uplink, msg.id);
        }

        let env = Arc::clone(&self.env);
        let result = {
            let mut ctx = ProcCtx::new(&env, &mut self.ue, self.id, &mut self.violations);
            match step {
                Step::Output => proc.output(&mut ctx),
                Step::Process(msg) => proc.process(&mut ctx, &msg),
                Step::Postprocess(child) => proc.postprocess(&mut ctx, &child),
                Step::SecurityResult(accepted) => proc.on_security_result(&mut ctx, accepted),
            }
        };
        self.stack.restore(id, proc);

        match result {
            Ok(actions) => {
                self.apply(id, actions)?;
                self.settle(id)
            }
            Err(e) => {
                warn!(session = %self.id, proc = %id, error = %e, "Procedure failed");
                if let Some(p) = self.stack.get_mut(id) {
                    p.base_mut().abort();
                }
                if let Err(settle) = self.settle(id) {
                    warn!(session = %self.id, error = %settle, "Parent failed after child error");
                }
                Err(e)
            }
        }
    }

    fn apply(&mut self, id: ProcId, actions: Vec<Action>) -> ProcResult<()> {
        for action in actions {
            if !self.stack.contains(id) {
                debug!(session = %self.id, proc = %id, "Procedure gone, dropping remaining actions");
                break;
            }
            match action {
                Action::Send(msg) => self.transmit(Some(id), msg)?,
                Action::StartTimer(name) => {
                    let duration = self.env.gmm().timer_or_default(name);
                    let resend = match self.stack.get_mut(id) {
                        Some(p) => std::mem::take(&mut p.base_mut().sent),
                        None => Vec::new(),
                    };
                    let timer = ArmedTimer {
                        name,
                        generation: self.stack.next_generation(),
                        duration,
                        resend,
                        expiry_count: 0,
                    };
                    self.arm(id, timer);
                }
                Action::Nest(child) => {
                    if let Some(p) = self.stack.get_mut(id) {
                        p.base_mut().await_peer();
                    }
                    let kind = child.kind();
                    let child_id = self.stack.push(child, Some(id));
                    debug!(session = %self.id, parent = %id, proc = %child_id, %kind, "Nested procedure");
                    self.drive(child_id, Step::Output)?;
                }
            }
        }
        Ok(())
    }

    /// Arms a timer, replacing any timer the procedure already holds.
    fn arm(&mut self, id: ProcId, timer: ArmedTimer) {
        let Some(p) = self.stack.get_mut(id) else {
            return;
        };
        let key = TimerKey {
            session: self.id,
            proc: id,
            generation: timer.generation,
        };
        let (name, duration) = (timer.name, timer.duration);
        let previous = p.base_mut().timer.replace(timer);
        p.base_mut().await_peer();
        if let Some(prev) = previous {
            self.env.scheduler.cancel_timer(TimerKey {
                session: self.id,
                proc: id,
                generation: prev.generation,
            });
        }
        debug!(session = %self.id, proc = %id, timer = name, ?duration, "Timer armed");
        self.env.scheduler.start_timer(key, name, duration);
    }

    /// Cancels the timer a procedure holds.
    pub(crate) fn disarm(&self, id: ProcId, proc: &mut dyn Procedure) {
        if let Some(timer) = proc.base_mut().timer.take() {
            self.env.scheduler.cancel_timer(TimerKey {
                session: self.id,
                proc: id,
                generation: timer.generation,
            });
        }
    }

    /// Cancels the timer of a procedure on the stack.
    pub(crate) fn disarm_on_stack(&mut self, id: ProcId) {
        if let Some(mut proc) = self.stack.take(id) {
            self.disarm(id, proc.as_mut());
            self.stack.restore(id, proc);
        }
    }

    /// Removes a finished procedure and resumes its parent.
    pub(crate) fn settle(&mut self, id: ProcId) -> ProcResult<()> {
        let Some(proc) = self.stack.get(id) else {
            return Ok(());
        };
        if !proc.base().is_terminal() {
            return Ok(());
        }
        let result = proc.base().result(id);
        let parent = self.stack.parent(id);

        for (rid, removed) in self.stack.remove_from(id) {
            if let Some(mut removed) = removed {
                removed.base_mut().abort();
                self.disarm(rid, removed.as_mut());
            }
        }
        info!(
            session = %self.id,
            proc = %id,
            kind = %result.kind,
            outcome = ?result.outcome,
            "Procedure finished"
        );

        match parent {
            Some(parent) if self.stack.contains(parent) => {
                self.drive(parent, Step::Postprocess(result))
            }
            _ => {
                self.replay_deferred();
                Ok(())
            }
        }
    }

    /// Replays initiating messages deferred while the stack was preempted.
    fn replay_deferred(&mut self) {
        if self.stack.preempted_by().is_some() {
            return;
        }
        for pdu in self.stack.take_deferred() {
            debug!(session = %self.id, len = pdu.len(), "Replaying deferred message");
            if let Err(e) = self.dispatch(&pdu) {
                warn!(session = %self.id, error = %e, "Deferred message failed");
            }
        }
    }

    // ========================================================================
    // Downlink
    // ========================================================================

    /// Encodes and sends a downlink message, recording it on the owning
    /// procedure.
    pub(crate) fn transmit(&mut self, owner: Option<ProcId>, msg: Message) -> ProcResult<()> {
        let wire = self.env.transforms.apply_encode(&msg)?;
        let pdu = self.env.catalogue.encode(Direction::Downlink, &wire)?;
        let name = self
            .env
            .catalogue
            .get(Direction::Downlink, msg.id)
            .map_or("?", |d| d.name);
        log_l3_message(self.id, Direction::Downlink, name, &pdu);
        self.env.transport.send(self.id, pdu);
        if let Some(p) = owner.and_then(|id| self.stack.get_mut(id)) {
            let base = p.base_mut();
            base.record(Direction::Downlink, msg.id);
            base.sent.push(msg);
        }
        Ok(())
    }
}
