//! BER identifier and length octets (Tag, Length)

use crate::error::{Asn1Error, Asn1Result};

/// Defensive cap on long-form length octets (4 octets = lengths < 4 GiB)
const MAX_LENGTH_OCTETS: usize = 4;

/// BER tag class
///
/// ASN.1 defines four tag classes:
/// - **Universal**: standard ASN.1 types (INTEGER, OCTET STRING, etc.)
/// - **Application**: application-wide types
/// - **Context-specific**: member tags inside SEQUENCE/CHOICE
/// - **Private**: implementation-specific types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagClass {
    /// Universal class (00)
    Universal = 0,
    /// Application class (01)
    Application = 1,
    /// Context-specific class (10)
    ContextSpecific = 2,
    /// Private class (11)
    Private = 3,
}

impl TagClass {
    /// Get tag class from bits 8-7 of the identifier octet
    fn from_bits(byte: u8) -> Self {
        match (byte >> 6) & 0x03 {
            0 => TagClass::Universal,
            1 => TagClass::Application,
            2 => TagClass::ContextSpecific,
            _ => TagClass::Private,
        }
    }

    /// Convert tag class to identifier octet bits
    fn to_bits(self) -> u8 {
        (self as u8) << 6
    }
}

impl std::fmt::Display for TagClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TagClass::Universal => "UNIVERSAL",
            TagClass::Application => "APPLICATION",
            TagClass::ContextSpecific => "CONTEXT",
            TagClass::Private => "PRIVATE",
        };
        f.write_str(s)
    }
}

/// BER tag
///
/// Identity for dispatch purposes is the (class, number) pair; the
/// constructed flag is carried alongside and validated against the
/// descriptor kind rather than matched.
///
/// # Encoding Format
///
/// Short form (tag number 0-30):
/// ```text
/// Bits: 8 7 6 5 4 3 2 1
///       C C P T T T T T
/// ```
///
/// Extended form (tag number > 30): first octet has all five tag bits
/// set, followed by base-128 continuation octets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tag {
    class: TagClass,
    constructed: bool,
    number: u32,
}

impl Tag {
    /// Create a new tag
    pub const fn new(class: TagClass, constructed: bool, number: u32) -> Self {
        Self {
            class,
            constructed,
            number,
        }
    }

    /// Create a Universal class tag
    pub const fn universal(constructed: bool, number: u32) -> Self {
        Self::new(TagClass::Universal, constructed, number)
    }

    /// Create an Application class tag
    pub const fn application(constructed: bool, number: u32) -> Self {
        Self::new(TagClass::Application, constructed, number)
    }

    /// Create a Context-specific class tag
    pub const fn context_specific(constructed: bool, number: u32) -> Self {
        Self::new(TagClass::ContextSpecific, constructed, number)
    }

    /// Create a Private class tag
    pub const fn private(constructed: bool, number: u32) -> Self {
        Self::new(TagClass::Private, constructed, number)
    }

    /// Get tag class
    pub fn class(&self) -> TagClass {
        self.class
    }

    /// Check if tag is constructed
    pub fn is_constructed(&self) -> bool {
        self.constructed
    }

    /// Get tag number
    pub fn number(&self) -> u32 {
        self.number
    }

    /// Tag identity match: class and number, ignoring the constructed flag
    ///
    /// # Why Ignore the Constructed Flag?
    /// Descriptor tag tables declare the type's identity; whether the
    /// encoding is primitive or constructed is a property of the kind
    /// and is validated separately by the dispatcher.
    pub fn matches(&self, other: Tag) -> bool {
        self.class == other.class && self.number == other.number
    }

    /// Decode identifier octets from the front of `data`
    ///
    /// # Returns
    /// Returns `Ok((tag, bytes_consumed))` on success.
    ///
    /// # Error Handling
    /// Returns `Truncated` if the buffer ends mid-tag, `Malformed` if an
    /// extended tag number overflows 32 bits or is not minimally encoded.
    pub fn decode(data: &[u8]) -> Asn1Result<(Self, usize)> {
        let first = *data.first().ok_or(Asn1Error::Truncated)?;
        let class = TagClass::from_bits(first);
        let constructed = (first & 0x20) != 0;
        let tag_bits = first & 0x1F;

        if tag_bits < 31 {
            return Ok((Self::new(class, constructed, tag_bits as u32), 1));
        }

        // Extended form: base-128 continuation octets
        let mut number = 0u32;
        let mut pos = 1;
        loop {
            let byte = *data.get(pos).ok_or(Asn1Error::Truncated)?;
            if pos == 1 && byte == 0x80 {
                return Err(Asn1Error::Malformed(
                    "non-minimal extended tag number".to_string(),
                ));
            }
            number = number
                .checked_mul(128)
                .and_then(|n| n.checked_add((byte & 0x7F) as u32))
                .ok_or_else(|| Asn1Error::Malformed("tag number overflow".to_string()))?;
            pos += 1;
            if byte & 0x80 == 0 {
                break;
            }
        }
        Ok((Self::new(class, constructed, number), pos))
    }

    /// Encode identifier octets, appending to `out`
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        let class_bits = self.class.to_bits();
        let constructed_bit = if self.constructed { 0x20 } else { 0x00 };

        if self.number <= 30 {
            out.push(class_bits | constructed_bit | self.number as u8);
            return;
        }

        out.push(class_bits | constructed_bit | 0x1F);
        let mut groups = [0u8; 5];
        let mut count = 0;
        let mut remaining = self.number;
        while remaining > 0 || count == 0 {
            groups[count] = (remaining & 0x7F) as u8;
            remaining >>= 7;
            count += 1;
        }
        for i in (0..count).rev() {
            let continuation = if i > 0 { 0x80 } else { 0x00 };
            out.push(groups[i] | continuation);
        }
    }
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{} {}]", self.class, self.number)
    }
}

/// BER length octets
///
/// Decoding accepts short form, long form and the indefinite form; the
/// encoding side emits only definite lengths with minimal octets, as DER
/// requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Length {
    /// Definite content length in bytes
    Definite(usize),
    /// Content runs until an end-of-contents marker (`00 00`)
    Indefinite,
}

impl Length {
    /// Decode length octets from the front of `data`
    ///
    /// # Error Handling
    /// Returns `Truncated` if the buffer ends mid-length, `Malformed` if
    /// the long form declares more than 4 length octets (defensive cap
    /// against absurd lengths from hostile input).
    pub fn decode(data: &[u8]) -> Asn1Result<(Self, usize)> {
        let first = *data.first().ok_or(Asn1Error::Truncated)?;

        if first & 0x80 == 0 {
            return Ok((Length::Definite(first as usize), 1));
        }
        let num_octets = (first & 0x7F) as usize;
        if num_octets == 0 {
            return Ok((Length::Indefinite, 1));
        }
        if num_octets > MAX_LENGTH_OCTETS {
            return Err(Asn1Error::Malformed(format!(
                "length encoding too large: {num_octets} octets (max {MAX_LENGTH_OCTETS})"
            )));
        }
        if data.len() < 1 + num_octets {
            return Err(Asn1Error::Truncated);
        }
        let mut length = 0usize;
        for &byte in &data[1..=num_octets] {
            length = (length << 8) | byte as usize;
        }
        Ok((Length::Definite(length), 1 + num_octets))
    }

    /// Encode a definite length with minimal octets, appending to `out`
    pub fn encode_definite(length: usize, out: &mut Vec<u8>) {
        if length < 128 {
            out.push(length as u8);
            return;
        }
        let mut num_octets = 0;
        let mut temp = length;
        while temp > 0 {
            num_octets += 1;
            temp >>= 8;
        }
        out.push(0x80 | num_octets as u8);
        for i in (0..num_octets).rev() {
            out.push(((length >> (i * 8)) & 0xFF) as u8);
        }
    }

    /// Content length for the definite form
    pub fn definite(&self) -> Option<usize> {
        match self {
            Length::Definite(n) => Some(*n),
            Length::Indefinite => None,
        }
    }
}
