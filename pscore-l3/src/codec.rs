//! Descriptor-driven encode/decode engine.
//!
//! This module is the only place where value trees meet raw bits. It
//! walks an [`IeDesc`] tree depth-first and either emits the bits of a
//! [`Value`] into a [`BitWriter`] or rebuilds a `Value` from a
//! [`BitReader`].
//!
//! Length prefixes are produced by encoding the sub-tree into a scratch
//! writer first and measuring it; on decode the sub-tree is read through a
//! sub-reader bounded to exactly the declared length, and any bits it
//! leaves unconsumed are an error unless the descriptor allows padding.

use std::borrow::Cow;
use std::collections::HashMap;

use bytes::Bytes;
use pscore_common::{BitReader, BitWriter};
use tracing::trace;

use crate::bcd::{decode_bcd, encode_bcd};
use crate::desc::{BufSize, ChoiceDesc, Count, IeDesc, IeKind, LengthRule, LengthUnit, Presence, Selector};
use crate::error::{DecodeError, DecodeResult, EncodeError, EncodeResult};
use crate::value::{Fields, Value};

// ============================================================================
// Encoding
// ============================================================================

/// Encodes one IE, including its tag and length framing.
///
/// # Arguments
/// * `desc` - Descriptor of the IE
/// * `value` - Value to encode
/// * `w` - Destination writer
pub fn encode_ie(desc: &IeDesc, value: &Value, w: &mut BitWriter) -> EncodeResult<()> {
    trace!(ie = desc.name, "encode");
    if let Some(tag) = desc.tag {
        w.write_bits(u64::from(tag.value), tag.bits as usize)
            .map_err(|e| EncodeError::at(desc.name, e))?;
    }
    match desc.length {
        LengthRule::Implicit => encode_kind(desc, value, w),
        LengthRule::Prefix { width, unit } => {
            let (scratch, length) = encode_measured(desc, value, unit)?;
            let max = max_for_width(width);
            if length > max {
                return Err(EncodeError::LengthOverflow {
                    ie: desc.name.to_string(),
                    length,
                    max,
                });
            }
            w.write_bits(length as u64, width as usize)
                .map_err(|e| EncodeError::at(desc.name, e))?;
            w.append(&scratch);
            Ok(())
        }
        LengthRule::Sibling { unit, .. } => {
            let (scratch, _) = encode_measured(desc, value, unit)?;
            w.append(&scratch);
            Ok(())
        }
    }
}

fn max_for_width(width: u8) -> usize {
    if width >= 64 {
        usize::MAX
    } else {
        ((1u64 << width) - 1) as usize
    }
}

/// Encodes the value part into a scratch writer and returns it with its
/// length in the given unit. Octet-counted content is zero-padded.
fn encode_measured(desc: &IeDesc, value: &Value, unit: LengthUnit) -> EncodeResult<(BitWriter, usize)> {
    let mut scratch = BitWriter::new();
    encode_kind(desc, value, &mut scratch)?;
    let length = match unit {
        LengthUnit::Octets => {
            scratch.pad_to_octet();
            scratch.byte_len()
        }
        LengthUnit::Bits => scratch.bit_len(),
    };
    Ok((scratch, length))
}

fn mismatch(desc: &IeDesc) -> EncodeError {
    EncodeError::TypeMismatch {
        ie: desc.name.to_string(),
        expected: desc.kind.label(),
    }
}

fn encode_kind(desc: &IeDesc, value: &Value, w: &mut BitWriter) -> EncodeResult<()> {
    let at = |e| EncodeError::at(desc.name, e);
    match (&desc.kind, value) {
        (IeKind::Uint { bits, .. }, Value::Uint(v)) => w.write_bits(*v, *bits as usize).map_err(at),
        (IeKind::Uint { bits: 1, .. }, Value::Bool(b)) => {
            w.write_bit(*b);
            Ok(())
        }
        (IeKind::Int { bits }, Value::Int(v)) => {
            let width = *bits as u32;
            let min = -(1i128 << (width - 1));
            let max = (1i128 << (width - 1)) - 1;
            let wide = i128::from(*v);
            if wide < min || wide > max {
                return Err(EncodeError::ValueOverflow {
                    ie: desc.name.to_string(),
                    value: wide,
                    width: width as usize,
                });
            }
            let mask = if width == 64 { u64::MAX } else { (1u64 << width) - 1 };
            w.write_bits((*v as u64) & mask, width as usize).map_err(at)
        }
        (IeKind::Flag, Value::Bool(b)) => {
            w.write_bit(*b);
            Ok(())
        }
        (IeKind::Flag, Value::Uint(v)) if *v <= 1 => {
            w.write_bit(*v == 1);
            Ok(())
        }
        (IeKind::Null, Value::Null) => Ok(()),
        (IeKind::Bytes(size), Value::Bytes(data)) => encode_buffer(desc, *size, data, w),
        (IeKind::Bcd(size), Value::Bcd(digits)) => {
            let packed = encode_bcd(digits).map_err(|e| EncodeError::Transform {
                ie: desc.name.to_string(),
                reason: e.to_string(),
            })?;
            match size {
                BufSize::Octets(n) if packed.len() > *n => Err(EncodeError::LengthOverflow {
                    ie: desc.name.to_string(),
                    length: packed.len(),
                    max: *n,
                }),
                BufSize::Octets(n) => {
                    w.write_bytes(&packed);
                    for _ in packed.len()..*n {
                        w.write_bytes(&[0xFF]);
                    }
                    Ok(())
                }
                BufSize::Bits(n) => encode_buffer(desc, BufSize::Bits(*n), &packed, w),
                BufSize::Rest => {
                    w.write_bytes(&packed);
                    Ok(())
                }
            }
        }
        (IeKind::Envelope(children), Value::Envelope(fields)) => {
            encode_fields(desc.name, children, fields, w)
        }
        (IeKind::Choice(choice), Value::Choice { key, value }) => {
            encode_choice(desc, choice, *key, value, w)
        }
        (IeKind::Sequence { element, count }, Value::Sequence(items)) => {
            if let Count::Prefix { width } = count {
                w.write_bits(items.len() as u64, *width as usize).map_err(at)?;
            }
            items.iter().try_for_each(|item| encode_ie(element, item, w))
        }
        (IeKind::Array { element, count }, Value::Sequence(items)) => {
            if items.len() != *count {
                return Err(EncodeError::CountMismatch {
                    ie: desc.name.to_string(),
                    expected: *count,
                    actual: items.len(),
                });
            }
            items.iter().try_for_each(|item| encode_ie(element, item, w))
        }
        _ => Err(mismatch(desc)),
    }
}

fn encode_buffer(desc: &IeDesc, size: BufSize, data: &[u8], w: &mut BitWriter) -> EncodeResult<()> {
    match size {
        BufSize::Octets(n) => {
            if data.len() != n {
                return Err(EncodeError::CountMismatch {
                    ie: desc.name.to_string(),
                    expected: n,
                    actual: data.len(),
                });
            }
            w.write_bytes(data);
            Ok(())
        }
        BufSize::Bits(n) => {
            if data.len() != n.div_ceil(8) {
                return Err(EncodeError::CountMismatch {
                    ie: desc.name.to_string(),
                    expected: n.div_ceil(8),
                    actual: data.len(),
                });
            }
            w.write_bits_from_bytes(data, n)
                .map_err(|e| EncodeError::at(desc.name, e))
        }
        BufSize::Rest => {
            w.write_bytes(data);
            Ok(())
        }
    }
}

fn encode_choice(desc: &IeDesc, choice: &ChoiceDesc, key: u64, value: &Value, w: &mut BitWriter) -> EncodeResult<()> {
    let leading = |w: &mut BitWriter| -> EncodeResult<()> {
        if let Selector::Leading { width } = choice.selector {
            w.write_bits(key, width as usize)
                .map_err(|e| EncodeError::at(desc.name, e))?;
        }
        Ok(())
    };
    match (choice.find(key), value) {
        (Some(variant), _) => {
            leading(w)?;
            match (choice.selector, value) {
                // The discriminant lives inside the variant and always
                // matches the selected key.
                (Selector::Peek { field, .. }, Value::Envelope(fields)) => {
                    let mut fields = fields.clone();
                    fields.insert(field, Value::Uint(key));
                    encode_ie(&variant.desc, &Value::Envelope(fields), w)
                }
                (Selector::Peek { .. }, _) => Err(mismatch(&variant.desc)),
                _ => encode_ie(&variant.desc, value, w),
            }
        }
        (None, Value::Unknown { raw, .. }) if choice.extensible => {
            leading(w)?;
            w.write_bytes(raw);
            Ok(())
        }
        (None, _) => Err(EncodeError::UnknownVariant {
            ie: desc.name.to_string(),
            key,
        }),
    }
}

/// Values derived from other fields while encoding an envelope: lengths
/// and counts referenced by siblings, and sibling choice discriminants.
fn computed_fields(children: &[IeDesc], fields: &Fields) -> EncodeResult<HashMap<&'static str, u64>> {
    let mut computed = HashMap::new();
    for child in children {
        let Some(value) = fields.get(child.name) else {
            continue;
        };
        if !child.presence.holds(fields) {
            continue;
        }
        if let LengthRule::Sibling { field, unit } = child.length {
            let (_, length) = encode_measured(child, value, unit)?;
            computed.insert(field, length as u64);
        }
        match (&child.kind, value) {
            (
                IeKind::Sequence {
                    count: Count::Sibling(field),
                    ..
                },
                Value::Sequence(items),
            ) => {
                computed.insert(*field, items.len() as u64);
            }
            (IeKind::Choice(choice), Value::Choice { key, .. }) => {
                if let Selector::Sibling(field) = choice.selector {
                    computed.insert(field, *key);
                }
            }
            _ => {}
        }
    }
    Ok(computed)
}

/// Encodes an ordered list of IEs from a field map.
///
/// Fields whose presence predicate is false are skipped. Omitted optional
/// fields are skipped; omitted integer fields with a default use it; any
/// other omission is `MissingField`.
pub fn encode_fields(parent: &str, children: &[IeDesc], fields: &Fields, w: &mut BitWriter) -> EncodeResult<()> {
    let computed = computed_fields(children, fields)?;
    for child in children {
        if !child.presence.holds(fields) {
            trace!(ie = child.name, "skipped by presence predicate");
            continue;
        }
        let value = match (computed.get(child.name), fields.get(child.name)) {
            (Some(v), _) => Cow::Owned(Value::Uint(*v)),
            (None, Some(v)) => Cow::Borrowed(v),
            (None, None) => match (child.default_value(), child.presence) {
                (Some(d), _) => Cow::Owned(Value::Uint(d)),
                (None, Presence::Optional) => continue,
                (None, _) => {
                    return Err(EncodeError::MissingField {
                        ie: format!("{parent}.{}", child.name),
                    })
                }
            },
        };
        encode_ie(child, &value, w)?;
    }
    Ok(())
}

// ============================================================================
// Decoding
// ============================================================================

/// Decodes one IE, including its tag and length framing.
///
/// # Arguments
/// * `desc` - Descriptor of the IE
/// * `r` - Source reader, advanced past the IE
/// * `siblings` - Fields decoded so far in the enclosing envelope
pub fn decode_ie(desc: &IeDesc, r: &BitReader<'_>, siblings: &Fields) -> DecodeResult<Value> {
    trace!(ie = desc.name, position = r.position(), "decode");
    let at = |e| DecodeError::at(desc.name, e);
    if let Some(tag) = desc.tag {
        let found = r.read_bits(tag.bits as usize).map_err(at)?;
        if found != u64::from(tag.value) {
            return Err(DecodeError::malformed(
                desc.name,
                format!("expected tag {:#x}, found {found:#x}", tag.value),
            ));
        }
    }
    match desc.length {
        LengthRule::Implicit => decode_kind(desc, r, siblings),
        LengthRule::Prefix { width, unit } => {
            let length = r.read_bits(width as usize).map_err(at)?;
            decode_bounded(desc, r, siblings, unit.to_bits(length), unit)
        }
        LengthRule::Sibling { field, unit } => {
            let length = siblings.uint(field).ok_or_else(|| {
                DecodeError::malformed(desc.name, format!("length field {field} not decoded"))
            })?;
            decode_bounded(desc, r, siblings, unit.to_bits(length), unit)
        }
    }
}

fn decode_bounded(desc: &IeDesc, r: &BitReader<'_>, siblings: &Fields, bits: usize, unit: LengthUnit) -> DecodeResult<Value> {
    let sub = r
        .sub_reader(bits)
        .map_err(|e| DecodeError::at(desc.name, e))?;
    let value = decode_kind(desc, &sub, siblings)?;
    let left = sub.remaining_bits();
    if left == 0 || desc.padding {
        return Ok(value);
    }
    // Octet-counted content that ends mid-octet is padded to the boundary
    let pad = (8 - sub.position() % 8) % 8;
    if unit == LengthUnit::Octets && left == pad {
        return Ok(value);
    }
    Err(DecodeError::malformed(
        desc.name,
        format!("{left} bits left unconsumed within declared length"),
    ))
}

fn decode_kind(desc: &IeDesc, r: &BitReader<'_>, siblings: &Fields) -> DecodeResult<Value> {
    let at = |e| DecodeError::at(desc.name, e);
    match &desc.kind {
        IeKind::Uint { bits, .. } => Ok(Value::Uint(r.read_bits(*bits as usize).map_err(at)?)),
        IeKind::Int { bits } => {
            let width = *bits as u32;
            let raw = r.read_bits(width as usize).map_err(at)?;
            let shift = 64 - width;
            Ok(Value::Int(((raw << shift) as i64) >> shift))
        }
        IeKind::Flag => Ok(Value::Bool(r.read_bit().map_err(at)?)),
        IeKind::Null => Ok(Value::Null),
        IeKind::Bytes(size) => Ok(Value::Bytes(decode_buffer(desc, *size, r)?)),
        IeKind::Bcd(size) => {
            let packed = decode_buffer(desc, *size, r)?;
            decode_bcd(&packed)
                .map(Value::Bcd)
                .map_err(|e| DecodeError::malformed(desc.name, e.to_string()))
        }
        IeKind::Envelope(children) => Ok(Value::Envelope(decode_fields(desc.name, children, r)?)),
        IeKind::Choice(choice) => decode_choice(desc, choice, r, siblings),
        IeKind::Sequence { element, count } => {
            let mut items = Vec::new();
            match count {
                Count::Rest => {
                    while !r.is_empty() {
                        items.push(decode_element(desc.name, element, r)?);
                    }
                }
                Count::Prefix { width } => {
                    let n = r.read_bits(*width as usize).map_err(at)?;
                    for _ in 0..n {
                        items.push(decode_element(desc.name, element, r)?);
                    }
                }
                Count::Sibling(field) => {
                    let n = siblings.uint(field).ok_or_else(|| {
                        DecodeError::malformed(desc.name, format!("count field {field} not decoded"))
                    })?;
                    for _ in 0..n {
                        items.push(decode_element(desc.name, element, r)?);
                    }
                }
            }
            Ok(Value::Sequence(items))
        }
        IeKind::Array { element, count } => {
            let items = (0..*count)
                .map(|_| decode_ie(element, r, &Fields::new()))
                .collect::<DecodeResult<Vec<_>>>()?;
            Ok(Value::Sequence(items))
        }
    }
}

/// Decodes one element of a counted sequence. An element that reads no
/// bits would repeat forever on a large count.
fn decode_element(sequence: &str, element: &IeDesc, r: &BitReader<'_>) -> DecodeResult<Value> {
    let before = r.remaining_bits();
    let value = decode_ie(element, r, &Fields::new())?;
    if r.remaining_bits() == before {
        return Err(DecodeError::malformed(sequence, "element consumed no bits"));
    }
    Ok(value)
}

fn decode_buffer(desc: &IeDesc, size: BufSize, r: &BitReader<'_>) -> DecodeResult<Bytes> {
    let at = |e| DecodeError::at(desc.name, e);
    let data = match size {
        BufSize::Octets(n) => r.read_bytes(n).map_err(at)?,
        BufSize::Bits(n) => r.read_bits_as_bytes(n).map_err(at)?,
        BufSize::Rest => r.read_bytes(r.remaining_bits() / 8).map_err(at)?,
    };
    Ok(Bytes::from(data))
}

fn decode_choice(desc: &IeDesc, choice: &ChoiceDesc, r: &BitReader<'_>, siblings: &Fields) -> DecodeResult<Value> {
    let at = |e| DecodeError::at(desc.name, e);
    let key = match choice.selector {
        Selector::Leading { width } => r.read_bits(width as usize).map_err(at)?,
        Selector::Peek { offset, width, .. } => r
            .peek_bits(offset as usize, width as usize)
            .map_err(at)?,
        Selector::Sibling(field) => siblings.uint(field).ok_or_else(|| {
            DecodeError::malformed(desc.name, format!("discriminant {field} not decoded"))
        })?,
    };
    match choice.find(key) {
        Some(variant) => {
            let value = decode_ie(&variant.desc, r, siblings)?;
            Ok(Value::choice(key, value))
        }
        None if choice.extensible => {
            trace!(ie = desc.name, key, "unknown variant captured");
            let raw = r.read_bytes(r.remaining_bits() / 8).map_err(at)?;
            Ok(Value::choice(
                key,
                Value::Unknown {
                    tag: key,
                    raw: Bytes::from(raw),
                },
            ))
        }
        None => Err(DecodeError::malformed(
            desc.name,
            format!("unknown discriminant {key} for closed choice"),
        )),
    }
}

/// Decodes an ordered list of IEs into a field map.
///
/// Optional fields are skipped when the bound is exhausted or, for tagged
/// fields, when the next tag does not match. A mandatory tagged field
/// whose tag is not found is reported through `MissingMandatoryIe` once
/// the whole list has been traversed.
pub fn decode_fields(parent: &str, children: &[IeDesc], r: &BitReader<'_>) -> DecodeResult<Fields> {
    let mut fields = Fields::new();
    let mut missing = Vec::new();
    for child in children {
        if !child.presence.holds(&fields) {
            continue;
        }
        if let Some(tag) = child.tag {
            let matches = r
                .peek_bits(0, tag.bits as usize)
                .map(|t| t == u64::from(tag.value))
                .unwrap_or(false);
            if !matches {
                if child.presence.is_mandatory() {
                    missing.push(child.name.to_string());
                }
                continue;
            }
        } else if matches!(child.presence, Presence::Optional) && r.is_empty() {
            continue;
        }
        let value = decode_ie(child, r, &fields)?;
        fields.insert(child.name, value);
    }
    if !missing.is_empty() {
        trace!(ie = parent, ?missing, "mandatory fields missing");
        return Err(DecodeError::MissingMandatoryIe(missing));
    }
    Ok(fields)
}
