//! Decoded value tree
//!
//! A successful decode materializes a `DecodedValue` that mirrors the
//! shape of the type descriptor it was decoded against: primitives at the
//! leaves, sequences and choices at the branches. The tree owns all of
//! its bytes; the engine keeps no references into caller buffers once a
//! decode returns.

use bytes::Bytes;

/// A decoded ASN.1 value
///
/// The variants mirror the descriptor kinds: `Primitive` for leaf types,
/// `Sequence` for SEQUENCE (and SET-shaped) values, `Choice` for the
/// selected alternative of a CHOICE, `SequenceOf` for SEQUENCE OF /
/// SET OF repetitions, and `Raw` for values captured verbatim (ANY
/// members and preserved extension fields).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedValue {
    Primitive(PrimitiveValue),
    Sequence(SequenceValue),
    Choice {
        alternative: &'static str,
        value: Box<DecodedValue>,
    },
    SequenceOf(Vec<DecodedValue>),
    /// A complete TLV kept verbatim, including its tag and length octets.
    Raw(Bytes),
}

impl DecodedValue {
    /// Get the primitive value if this is a leaf
    pub fn as_primitive(&self) -> Option<&PrimitiveValue> {
        match self {
            DecodedValue::Primitive(p) => Some(p),
            _ => None,
        }
    }

    /// Get the sequence value if this is a SEQUENCE
    pub fn as_sequence(&self) -> Option<&SequenceValue> {
        match self {
            DecodedValue::Sequence(s) => Some(s),
            _ => None,
        }
    }

    /// Get the elements if this is a SEQUENCE OF / SET OF
    pub fn as_sequence_of(&self) -> Option<&[DecodedValue]> {
        match self {
            DecodedValue::SequenceOf(items) => Some(items),
            _ => None,
        }
    }

    /// Get the decoded integer if this is an INTEGER leaf
    pub fn as_integer(&self) -> Option<&Int> {
        match self {
            DecodedValue::Primitive(PrimitiveValue::Integer(i)) => Some(i),
            _ => None,
        }
    }

    /// Get the text if this is a character string leaf
    pub fn as_str(&self) -> Option<&str> {
        match self {
            DecodedValue::Primitive(PrimitiveValue::CharacterString(s)) => Some(s),
            _ => None,
        }
    }
}

/// A decoded primitive (leaf) value
///
/// Character string variants are collapsed into one: the charset is a
/// property of the descriptor, the value carries the validated text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrimitiveValue {
    Boolean(bool),
    Integer(Int),
    BitString(BitString),
    OctetString(Bytes),
    Null,
    ObjectIdentifier(Oid),
    CharacterString(String),
    /// Validated GeneralizedTime text, e.g. `20260823120000Z`
    GeneralizedTime(String),
}

/// Arbitrary-precision ASN.1 INTEGER
///
/// Stored as the minimal big-endian two's-complement byte sequence, which
/// is exactly the canonical DER content encoding. Equality on `Int` is
/// therefore equality of the canonical form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Int {
    bytes: Bytes,
}

impl Int {
    /// Build from canonical two's-complement big-endian bytes
    ///
    /// The caller must supply a minimal encoding (no redundant
    /// sign-extension octets); the decoder enforces this before
    /// constructing an `Int`.
    pub fn from_be_bytes(bytes: Bytes) -> Self {
        Self { bytes }
    }

    /// Build from a native integer, producing the minimal encoding
    pub fn from_i64(value: i64) -> Self {
        let be = value.to_be_bytes();
        let mut start = 0;
        // Strip redundant sign-extension octets, keep at least one byte
        while start < be.len() - 1 {
            let redundant = (be[start] == 0x00 && be[start + 1] & 0x80 == 0)
                || (be[start] == 0xFF && be[start + 1] & 0x80 != 0);
            if !redundant {
                break;
            }
            start += 1;
        }
        Self {
            bytes: Bytes::copy_from_slice(&be[start..]),
        }
    }

    /// Canonical two's-complement big-endian content bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// True if the value is negative
    pub fn is_negative(&self) -> bool {
        self.bytes.first().is_some_and(|b| b & 0x80 != 0)
    }

    /// Convert to i64 if the value fits
    pub fn as_i64(&self) -> Option<i64> {
        if self.bytes.is_empty() || self.bytes.len() > 8 {
            return None;
        }
        let mut value = 0i64;
        for &byte in self.bytes.iter() {
            value = (value << 8) | (byte as i64);
        }
        if self.is_negative() {
            let shift = 64 - self.bytes.len() * 8;
            value = (value << shift) >> shift;
        }
        Some(value)
    }
}

impl From<i64> for Int {
    fn from(value: i64) -> Self {
        Int::from_i64(value)
    }
}

/// Decoded BIT STRING
///
/// Tracks the number of unused trailing bits in the final octet (0-7)
/// alongside the packed bit data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitString {
    unused_bits: u8,
    data: Bytes,
}

impl BitString {
    /// Create a bit string from packed bytes and an unused-bit count
    ///
    /// # Panics
    /// Panics if `unused_bits > 7`, or if `unused_bits != 0` for empty
    /// data. Wire-side validation happens in the decoder; this
    /// constructor is for caller-built values.
    pub fn new(data: Bytes, unused_bits: u8) -> Self {
        assert!(unused_bits <= 7, "unused bits must be 0-7");
        assert!(
            !data.is_empty() || unused_bits == 0,
            "empty bit string must have 0 unused bits"
        );
        Self { unused_bits, data }
    }

    /// Number of unused bits in the final octet
    pub fn unused_bits(&self) -> u8 {
        self.unused_bits
    }

    /// Packed bit data
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Total number of bits
    pub fn bit_len(&self) -> usize {
        if self.data.is_empty() {
            0
        } else {
            self.data.len() * 8 - self.unused_bits as usize
        }
    }
}

/// Decoded OBJECT IDENTIFIER as a list of arcs
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Oid {
    arcs: Vec<u32>,
}

impl Oid {
    /// Create an OID from its arcs
    ///
    /// At least two arcs are required; the first must be 0, 1 or 2 and,
    /// under roots 0 and 1, the second must be below 40. That is what the
    /// packed first-octet encoding can represent.
    pub fn new(arcs: Vec<u32>) -> Option<Self> {
        if arcs.len() < 2 || arcs[0] > 2 || (arcs[0] < 2 && arcs[1] >= 40) {
            return None;
        }
        Some(Self { arcs })
    }

    /// The arcs of this OID
    pub fn arcs(&self) -> &[u32] {
        &self.arcs
    }
}

impl std::fmt::Display for Oid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, arc) in self.arcs.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "{arc}")?;
        }
        Ok(())
    }
}

/// Decoded SEQUENCE value
///
/// Members appear in descriptor order; an absent OPTIONAL member is
/// recorded explicitly as `None`. Unknown trailing TLVs accepted inside
/// an extensible SEQUENCE are kept verbatim in `extensions` so they can
/// be re-encoded byte-for-byte.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SequenceValue {
    pub members: Vec<(&'static str, Option<DecodedValue>)>,
    pub extensions: Vec<Bytes>,
}

impl SequenceValue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a member value in descriptor order
    pub fn push(&mut self, name: &'static str, value: Option<DecodedValue>) {
        self.members.push((name, value));
    }

    /// Look up a present member by name
    pub fn member(&self, name: &str) -> Option<&DecodedValue> {
        self.members
            .iter()
            .find(|(n, _)| *n == name)
            .and_then(|(_, v)| v.as_ref())
    }
}
