//! GMM information
//!
//! 3GPP TS 24.008 Section 4.7.12
//!
//! Sends the configured network name to the terminal. There is no
//! response, so the procedure completes as soon as the message is out.

use pscore_l3::{Fields, GmmMessageType, Message, MessageId, Value};
use tracing::debug;

use crate::error::{ProcResult, ProcedureError};
use crate::gmm::common::gmm;
use crate::procedure::{Action, ProcBase, ProcCtx, Procedure, ProcedureKind};

/// Network name coding scheme: UCS2.
const CODING_UCS2: u8 = 1;

/// Network name as a UCS2 text envelope.
fn network_name(name: &str) -> Value {
    let text: Vec<u8> = name.encode_utf16().flat_map(u16::to_be_bytes).collect();
    Value::Envelope(Fields::new().with("Coding", CODING_UCS2).with("Text", text))
}

/// Network-initiated GMM information.
#[derive(Debug)]
pub struct Information {
    base: ProcBase,
}

impl Information {
    /// Creates the procedure.
    pub fn new() -> Self {
        Self {
            base: ProcBase::new(ProcedureKind::Information),
        }
    }
}

impl Default for Information {
    fn default() -> Self {
        Self::new()
    }
}

impl Procedure for Information {
    fn base(&self) -> &ProcBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ProcBase {
        &mut self.base
    }

    fn expects(&self, _id: MessageId) -> bool {
        false
    }

    fn output(&mut self, ctx: &mut ProcCtx<'_>) -> ProcResult<Vec<Action>> {
        self.base.complete();
        let Some(name) = ctx.gmm().network_name.as_deref() else {
            debug!(session = %ctx.session, "No network name configured");
            return Ok(Vec::new());
        };
        let info = gmm(GmmMessageType::GmmInformation).with("FullNetName", network_name(name));
        Ok(vec![Action::Send(info)])
    }

    fn process(&mut self, _ctx: &mut ProcCtx<'_>, msg: &Message) -> ProcResult<Vec<Action>> {
        Err(ProcedureError::unexpected(msg.id.to_string(), "GMM information"))
    }
}
