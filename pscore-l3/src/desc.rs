//! Declarative IE descriptors.
//!
//! An [`IeDesc`] describes one information element: its kind (integer,
//! buffer, BCD string, envelope, choice, sequence, array), its framing
//! (optional tag, length rule) and when it is present. Descriptors are
//! plain data; the codec engine in [`crate::codec`] interprets them.
//!
//! The builder methods map onto the TS 24.007 IE formats:
//!
//! | Format | Builder |
//! |---|---|
//! | Type 1 V (half octet) | `IeDesc::uint(name, 4)` |
//! | Type 1 TV | `.tv1(iei)` on a 4-bit IE |
//! | Type 2 T | `IeDesc::tag_only(name, iei)` |
//! | Type 3 V / TV | fixed-size kind, `.tv(iei)` |
//! | Type 4 LV / TLV | `.lv()` / `.tlv(iei)` |
//! | Type 6 LV-E / TLV-E | `.lve()` / `.tlve(iei)` |

use std::collections::HashSet;

use crate::error::DescriptorError;
use crate::value::Fields;

/// Presence predicate evaluated against the sibling fields seen so far.
pub type Predicate = fn(&Fields) -> bool;

/// Code to label table for enumerated fields.
pub type ValueDict = &'static [(u64, &'static str)];

/// A tag preceding a framed IE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tag {
    /// Tag value
    pub value: u16,
    /// Tag width in bits (4, 8 or 16)
    pub bits: u8,
}

impl Tag {
    /// A 4-bit tag, as used by type 1 TV IEs.
    pub const fn half(value: u8) -> Self {
        Self {
            value: value as u16,
            bits: 4,
        }
    }

    /// A full-octet tag.
    pub const fn octet(value: u8) -> Self {
        Self {
            value: value as u16,
            bits: 8,
        }
    }

    /// A 16-bit tag, as used by protocol IE containers.
    pub const fn wide(value: u16) -> Self {
        Self { value, bits: 16 }
    }
}

/// Granularity of a length field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthUnit {
    /// Length counts octets; content is padded to an octet boundary
    Octets,
    /// Length counts bits
    Bits,
}

impl LengthUnit {
    /// Converts a length field value into a bit count.
    pub fn to_bits(self, length: u64) -> usize {
        match self {
            LengthUnit::Octets => length as usize * 8,
            LengthUnit::Bits => length as usize,
        }
    }
}

/// How the extent of an IE's value is determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthRule {
    /// Extent follows from the kind (fixed width, or the rest of the bound)
    Implicit,
    /// A length field of `width` bits precedes the value
    Prefix {
        /// Width of the length field
        width: u8,
        /// Unit of the length field
        unit: LengthUnit,
    },
    /// The length is carried by an earlier sibling integer field
    Sibling {
        /// Name of the sibling holding the length
        field: &'static str,
        /// Unit of the sibling value
        unit: LengthUnit,
    },
}

/// When an IE is present.
#[derive(Debug, Clone, Copy)]
pub enum Presence {
    /// Always present; absence is an error
    Mandatory,
    /// May be absent; tagged optional IEs are recognised by their tag
    Optional,
    /// Present exactly when the predicate holds over earlier siblings
    When(Predicate),
}

impl Presence {
    /// Evaluates the presence rule against sibling fields.
    pub fn holds(&self, siblings: &Fields) -> bool {
        match self {
            Presence::Mandatory | Presence::Optional => true,
            Presence::When(pred) => pred(siblings),
        }
    }

    /// Returns true for mandatory IEs.
    pub fn is_mandatory(&self) -> bool {
        matches!(self, Presence::Mandatory)
    }
}

/// Size of a buffer or BCD field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufSize {
    /// Fixed number of octets
    Octets(usize),
    /// Fixed number of bits, left-aligned in the value
    Bits(usize),
    /// Everything up to the enclosing bound
    Rest,
}

/// Element count of a repeated sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Count {
    /// Elements repeat until the enclosing bound is exhausted
    Rest,
    /// A count field of `width` bits precedes the elements
    Prefix {
        /// Width of the count field
        width: u8,
    },
    /// The count is carried by an earlier sibling integer field
    Sibling(&'static str),
}

/// How a choice finds its discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selector {
    /// A leading field of `width` bits, consumed before the variant
    Leading {
        /// Width of the discriminant
        width: u8,
    },
    /// Bits inside the variant, peeked without consuming; the variant
    /// envelope holds them as `field`
    Peek {
        /// Offset from the current position, in bits
        offset: u8,
        /// Width of the discriminant
        width: u8,
        /// Field of the variant envelope carrying the discriminant
        field: &'static str,
    },
    /// An earlier sibling integer field
    Sibling(&'static str),
}

/// One alternative of a choice.
#[derive(Debug, Clone)]
pub struct Variant {
    /// Discriminant selecting this variant
    pub key: u64,
    /// Descriptor of the variant body; its name names the variant
    pub desc: IeDesc,
}

/// A tag-selected alternative.
#[derive(Debug, Clone)]
pub struct ChoiceDesc {
    /// Where the discriminant comes from
    pub selector: Selector,
    /// Declared variants
    pub variants: Vec<Variant>,
    /// Unknown discriminants are captured rather than rejected
    pub extensible: bool,
}

impl ChoiceDesc {
    /// Creates a closed choice.
    pub fn new(selector: Selector) -> Self {
        Self {
            selector,
            variants: Vec::new(),
            extensible: false,
        }
    }

    /// Adds a variant.
    pub fn variant(mut self, key: u64, desc: IeDesc) -> Self {
        self.variants.push(Variant { key, desc });
        self
    }

    /// Marks the choice as extensible.
    pub fn extensible(mut self) -> Self {
        self.extensible = true;
        self
    }

    /// Looks up a variant by discriminant.
    pub fn find(&self, key: u64) -> Option<&Variant> {
        self.variants.iter().find(|v| v.key == key)
    }

    /// Looks up a variant by name.
    pub fn find_by_name(&self, name: &str) -> Option<&Variant> {
        self.variants.iter().find(|v| v.desc.name == name)
    }
}

/// Kind of an IE.
#[derive(Debug, Clone)]
pub enum IeKind {
    /// Unsigned integer of a fixed bit width
    Uint {
        /// Width in bits (1-64)
        bits: u8,
        /// Value used when the caller omits the field
        default: Option<u64>,
    },
    /// Two's complement integer of a fixed bit width
    Int {
        /// Width in bits (2-64)
        bits: u8,
    },
    /// Single bit
    Flag,
    /// No value bits, presence only
    Null,
    /// Octet or bit buffer
    Bytes(BufSize),
    /// BCD digit string, low nibble first, `0xF` filler
    Bcd(BufSize),
    /// Ordered sub-fields
    Envelope(Vec<IeDesc>),
    /// One of several variants
    Choice(Box<ChoiceDesc>),
    /// Homogeneous repeated elements
    Sequence {
        /// Element descriptor
        element: Box<IeDesc>,
        /// How many elements
        count: Count,
    },
    /// Homogeneous elements of a fixed count
    Array {
        /// Element descriptor
        element: Box<IeDesc>,
        /// Number of elements
        count: usize,
    },
}

impl IeKind {
    /// Short name of the kind, used in error messages.
    pub fn label(&self) -> &'static str {
        match self {
            IeKind::Uint { .. } => "uint",
            IeKind::Int { .. } => "int",
            IeKind::Flag => "flag",
            IeKind::Null => "null",
            IeKind::Bytes(_) => "bytes",
            IeKind::Bcd(_) => "bcd",
            IeKind::Envelope(_) => "envelope",
            IeKind::Choice(_) => "choice",
            IeKind::Sequence { .. } => "sequence",
            IeKind::Array { .. } => "sequence",
        }
    }
}

/// Declarative description of one information element.
#[derive(Debug, Clone)]
pub struct IeDesc {
    /// Semantic name, unique within its parent
    pub name: &'static str,
    /// Value kind
    pub kind: IeKind,
    /// Tag for TV/TLV framing
    pub tag: Option<Tag>,
    /// Length encoding
    pub length: LengthRule,
    /// Presence rule
    pub presence: Presence,
    /// Labels for enumerated values, used for display only
    pub dict: Option<ValueDict>,
    /// Unconsumed bits inside a declared length are tolerated
    pub padding: bool,
}

impl IeDesc {
    /// Creates a mandatory, untagged, implicitly sized descriptor.
    pub fn new(name: &'static str, kind: IeKind) -> Self {
        Self {
            name,
            kind,
            tag: None,
            length: LengthRule::Implicit,
            presence: Presence::Mandatory,
            dict: None,
            padding: false,
        }
    }

    /// Unsigned integer field.
    pub fn uint(name: &'static str, bits: u8) -> Self {
        Self::new(name, IeKind::Uint { bits, default: None })
    }

    /// Spare bits, encoded as zero when omitted.
    pub fn spare(name: &'static str, bits: u8) -> Self {
        Self::new(
            name,
            IeKind::Uint {
                bits,
                default: Some(0),
            },
        )
    }

    /// Signed integer field.
    pub fn int(name: &'static str, bits: u8) -> Self {
        Self::new(name, IeKind::Int { bits })
    }

    /// Single-bit flag.
    pub fn flag(name: &'static str) -> Self {
        Self::new(name, IeKind::Flag)
    }

    /// Octet or bit buffer.
    pub fn bytes(name: &'static str, size: BufSize) -> Self {
        Self::new(name, IeKind::Bytes(size))
    }

    /// BCD digit string.
    pub fn bcd(name: &'static str, size: BufSize) -> Self {
        Self::new(name, IeKind::Bcd(size))
    }

    /// Envelope of ordered sub-fields.
    pub fn envelope(name: &'static str, children: Vec<IeDesc>) -> Self {
        Self::new(name, IeKind::Envelope(children))
    }

    /// Choice between variants.
    pub fn choice(name: &'static str, choice: ChoiceDesc) -> Self {
        Self::new(name, IeKind::Choice(Box::new(choice)))
    }

    /// Repeated sequence.
    pub fn sequence(name: &'static str, element: IeDesc, count: Count) -> Self {
        Self::new(
            name,
            IeKind::Sequence {
                element: Box::new(element),
                count,
            },
        )
    }

    /// Fixed-count array.
    pub fn array(name: &'static str, element: IeDesc, count: usize) -> Self {
        Self::new(
            name,
            IeKind::Array {
                element: Box::new(element),
                count,
            },
        )
    }

    /// Type 2 IE: an optional octet tag with no value.
    pub fn tag_only(name: &'static str, iei: u8) -> Self {
        Self::new(name, IeKind::Null).tagged(Tag::octet(iei)).optional()
    }

    /// Sets the tag.
    pub fn tagged(mut self, tag: Tag) -> Self {
        self.tag = Some(tag);
        self
    }

    /// Type 1 TV: 4-bit tag in front of a 4-bit value, optional.
    pub fn tv1(self, iei: u8) -> Self {
        self.tagged(Tag::half(iei)).optional()
    }

    /// Type 3 TV: octet tag in front of a fixed-size value, optional.
    pub fn tv(self, iei: u8) -> Self {
        self.tagged(Tag::octet(iei)).optional()
    }

    /// Type 4 LV: one-octet length prefix.
    pub fn lv(self) -> Self {
        self.with_length(LengthRule::Prefix {
            width: 8,
            unit: LengthUnit::Octets,
        })
    }

    /// Type 4 TLV, optional.
    pub fn tlv(self, iei: u8) -> Self {
        self.lv().tv(iei)
    }

    /// Type 6 LV-E: two-octet length prefix.
    pub fn lve(self) -> Self {
        self.with_length(LengthRule::Prefix {
            width: 16,
            unit: LengthUnit::Octets,
        })
    }

    /// Type 6 TLV-E, optional.
    pub fn tlve(self, iei: u8) -> Self {
        self.lve().tv(iei)
    }

    /// Sets the length rule.
    pub fn with_length(mut self, length: LengthRule) -> Self {
        self.length = length;
        self
    }

    /// Marks the IE optional.
    pub fn optional(mut self) -> Self {
        self.presence = Presence::Optional;
        self
    }

    /// Marks the IE mandatory.
    pub fn mandatory(mut self) -> Self {
        self.presence = Presence::Mandatory;
        self
    }

    /// Makes presence depend on earlier siblings.
    pub fn when(mut self, pred: Predicate) -> Self {
        self.presence = Presence::When(pred);
        self
    }

    /// Attaches a value dictionary.
    pub fn with_dict(mut self, dict: ValueDict) -> Self {
        self.dict = Some(dict);
        self
    }

    /// Sets the value used when an integer field is omitted.
    pub fn with_default(mut self, value: u64) -> Self {
        if let IeKind::Uint { default, .. } = &mut self.kind {
            *default = Some(value);
        }
        self
    }

    /// Tolerates unconsumed bits inside the declared length.
    pub fn with_padding(mut self) -> Self {
        self.padding = true;
        self
    }

    /// Returns the label for a code, if a dictionary is attached.
    pub fn label(&self, code: u64) -> Option<&'static str> {
        self.dict
            .and_then(|d| d.iter().find(|(c, _)| *c == code).map(|(_, l)| *l))
    }

    /// Returns the default of an integer field.
    pub fn default_value(&self) -> Option<u64> {
        match self.kind {
            IeKind::Uint { default, .. } => default,
            _ => None,
        }
    }

    /// Checks structural invariants of the descriptor tree.
    ///
    /// Child names are unique, tags are unique within an envelope, choice
    /// discriminants are unique, widths are in range and sibling
    /// references point at earlier integer fields.
    pub fn validate(&self) -> Result<(), DescriptorError> {
        if let Some(tag) = self.tag {
            if !matches!(tag.bits, 4 | 8 | 16) || u32::from(tag.value) >> tag.bits != 0 {
                return Err(self.invalid(format!("tag {:#x} of {} bits", tag.value, tag.bits)));
            }
        }
        if let LengthRule::Prefix { width, .. } = self.length {
            if width == 0 || width > 32 {
                return Err(self.invalid(format!("length prefix of {width} bits")));
            }
        }
        match &self.kind {
            IeKind::Uint { bits, default } => {
                if *bits == 0 || *bits > 64 {
                    return Err(self.invalid(format!("{bits}-bit integer")));
                }
                if let Some(d) = default {
                    if *bits < 64 && d >> bits != 0 {
                        return Err(self.invalid(format!("default {d} wider than {bits} bits")));
                    }
                }
            }
            IeKind::Int { bits } if *bits < 2 || *bits > 64 => {
                return Err(self.invalid(format!("{bits}-bit signed integer")));
            }
            IeKind::Envelope(children) => validate_children(self.name, children)?,
            IeKind::Choice(choice) => {
                let mut keys = HashSet::new();
                for v in &choice.variants {
                    if !keys.insert(v.key) {
                        return Err(DescriptorError::DuplicateVariant {
                            parent: self.name.to_string(),
                            key: v.key,
                        });
                    }
                    if let Selector::Peek { field, .. } = choice.selector {
                        let ok = matches!(&v.desc.kind, IeKind::Envelope(c) if c.iter().any(|d| d.name == field));
                        if !ok {
                            return Err(self.invalid(format!(
                                "variant {} does not carry discriminant {field}",
                                v.desc.name
                            )));
                        }
                    }
                    v.desc.validate()?;
                }
            }
            IeKind::Sequence { element, .. } | IeKind::Array { element, .. } => {
                element.validate()?
            }
            _ => {}
        }
        Ok(())
    }

    fn invalid(&self, reason: String) -> DescriptorError {
        DescriptorError::Invalid {
            ie: self.name.to_string(),
            reason,
        }
    }
}

/// Validates the children of an envelope or message.
pub(crate) fn validate_children(parent: &str, children: &[IeDesc]) -> Result<(), DescriptorError> {
    let mut names = HashSet::new();
    let mut tags = HashSet::new();
    for (i, child) in children.iter().enumerate() {
        if !names.insert(child.name) {
            return Err(DescriptorError::DuplicateName {
                parent: parent.to_string(),
                name: child.name.to_string(),
            });
        }
        if let Some(tag) = child.tag {
            if !tags.insert(tag) {
                return Err(DescriptorError::DuplicateTag {
                    parent: parent.to_string(),
                    tag: tag.value,
                });
            }
        }
        let earlier = &children[..i];
        let refs = sibling_refs(child);
        for field in refs {
            let ok = earlier
                .iter()
                .any(|d| d.name == field && matches!(d.kind, IeKind::Uint { .. }));
            if !ok {
                return Err(DescriptorError::Invalid {
                    ie: child.name.to_string(),
                    reason: format!("refers to {field}, which is not an earlier integer sibling"),
                });
            }
        }
        child.validate()?;
    }
    Ok(())
}

/// Names of siblings a descriptor reads its length, count or discriminant from.
pub(crate) fn sibling_refs(desc: &IeDesc) -> Vec<&'static str> {
    let mut refs = Vec::new();
    if let LengthRule::Sibling { field, .. } = desc.length {
        refs.push(field);
    }
    match &desc.kind {
        IeKind::Sequence {
            count: Count::Sibling(field),
            ..
        } => refs.push(field),
        IeKind::Choice(c) => {
            if let Selector::Sibling(field) = c.selector {
                refs.push(field);
            }
        }
        _ => {}
    }
    refs
}
