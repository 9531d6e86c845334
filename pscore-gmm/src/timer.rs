//! Procedure timers
//!
//! Timers are logical deadlines. A procedure asks for a named timer, the
//! session arms it through the injected scheduler with a fresh generation,
//! and an expiry is honoured only if its generation is still armed.
//!
//! # GPRS timer IE (TS 24.008 Section 10.5.7.3)
//!
//! ```text
//!   8   7   6   5   4   3   2   1
//! +-----------+-------------------+
//! |   Unit    |   Timer value     |
//! +-----------+-------------------+
//! ```
//! Unit 0 counts 2 seconds, unit 1 one minute, unit 2 decihours, unit 7
//! marks the timer deactivated.

use std::time::Duration;

use pscore_l3::{Fields, Message, Value};

/// Unit field: multiples of 2 seconds
pub const UNIT_2_SEC: u64 = 0;
/// Unit field: multiples of 1 minute
pub const UNIT_1_MIN: u64 = 1;
/// Unit field: multiples of decihours
pub const UNIT_DECIHOUR: u64 = 2;
/// Unit field: timer deactivated
pub const UNIT_DEACTIVATED: u64 = 7;

/// Largest value of the 5-bit timer field.
const MAX_VALUE: u64 = 31;

/// Encodes a duration as a GPRS timer value, rounding up to the unit.
///
/// Durations beyond 31 decihours, and zero, deactivate the timer.
pub fn gprs_timer(duration: Duration) -> Value {
    let secs = duration.as_secs();
    let (unit, value) = if secs == 0 {
        (UNIT_DEACTIVATED, 0)
    } else if secs <= 2 * MAX_VALUE {
        (UNIT_2_SEC, secs.div_ceil(2))
    } else if secs <= 60 * MAX_VALUE {
        (UNIT_1_MIN, secs.div_ceil(60))
    } else if secs <= 360 * MAX_VALUE {
        (UNIT_DECIHOUR, secs.div_ceil(360))
    } else {
        (UNIT_DEACTIVATED, 0)
    };
    Value::Envelope(Fields::new().with("Unit", unit).with("Value", value))
}

/// Decodes a GPRS timer value. Returns `None` for a deactivated timer.
pub fn gprs_timer_duration(value: &Value) -> Option<Duration> {
    let unit = value.field("Unit")?.as_uint()?;
    let count = value.field("Value")?.as_uint()?;
    let secs = match unit {
        UNIT_2_SEC => 2 * count,
        UNIT_1_MIN => 60 * count,
        UNIT_DECIHOUR => 360 * count,
        _ => return None,
    };
    Some(Duration::from_secs(secs))
}

/// A timer armed on behalf of a procedure.
#[derive(Debug, Clone)]
pub struct ArmedTimer {
    /// Timer name, e.g. `T3360`
    pub name: &'static str,
    /// Arming generation
    pub generation: u64,
    /// Duration it was armed with
    pub duration: Duration,
    /// Messages resent on expiry
    pub resend: Vec<Message>,
    /// Expiries already answered with a retransmission
    pub expiry_count: u32,
}
