//! Human-readable rendering of decoded values.
//!
//! Values are printed with their descriptor so enumerated codes show the
//! label from the IE's value dictionary, e.g. `GMMCause: 7 (GPRS services
//! not allowed)`. Used for debug logging only.

use std::fmt::{self, Write};

use crate::desc::{IeDesc, IeKind};
use crate::message::{Message, MessageDesc};
use crate::value::Value;

/// Renders one value with its descriptor.
pub fn render_value(desc: &IeDesc, value: &Value) -> String {
    let mut out = String::new();
    // Writing to a String cannot fail
    let _ = write_value(&mut out, desc, value);
    out
}

/// Renders a whole message: name, header nibble, IEs and captured unknown IEs.
pub fn render_message(desc: &MessageDesc, msg: &Message) -> String {
    let mut out = String::new();
    let _ = write_message(&mut out, desc, msg);
    out
}

fn write_message(out: &mut String, desc: &MessageDesc, msg: &Message) -> fmt::Result {
    write!(out, "{}", desc.name)?;
    if msg.header != 0 {
        write!(out, " [{:#x}]", msg.header)?;
    }
    write!(out, " {{")?;
    let mut first = true;
    for (name, value) in msg.fields.iter() {
        if !first {
            write!(out, ",")?;
        }
        first = false;
        write!(out, " {name}: ")?;
        match desc.ie(name) {
            Some(ie) => write_value(out, ie, value)?,
            None => write!(out, "{value}")?,
        }
    }
    for unknown in &msg.unknown {
        if !first {
            write!(out, ",")?;
        }
        first = false;
        write!(out, " {unknown}")?;
    }
    write!(out, " }}")
}

fn write_value(out: &mut String, desc: &IeDesc, value: &Value) -> fmt::Result {
    match (&desc.kind, value) {
        (IeKind::Uint { .. }, Value::Uint(code)) => match desc.label(*code) {
            Some(label) => write!(out, "{code} ({label})"),
            None => write!(out, "{code}"),
        },
        (IeKind::Envelope(children), Value::Envelope(fields)) => {
            write!(out, "{{")?;
            for (i, (name, v)) in fields.iter().enumerate() {
                if i > 0 {
                    write!(out, ", ")?;
                }
                write!(out, "{name}: ")?;
                match children.iter().find(|c| c.name == name) {
                    Some(child) => write_value(out, child, v)?,
                    None => write!(out, "{v}")?,
                }
            }
            write!(out, "}}")
        }
        (IeKind::Choice(choice), Value::Choice { key, value }) => match choice.find(*key) {
            Some(variant) => {
                write!(out, "{} ", variant.desc.name)?;
                write_value(out, &variant.desc, value)
            }
            None => write!(out, "{value}"),
        },
        (IeKind::Sequence { element, .. } | IeKind::Array { element, .. }, Value::Sequence(items)) => {
            write!(out, "[")?;
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    write!(out, ", ")?;
                }
                write_value(out, element, item)?;
            }
            write!(out, "]")
        }
        _ => write!(out, "{value}"),
    }
}
