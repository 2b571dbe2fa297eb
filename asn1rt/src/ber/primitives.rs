//! Primitive (leaf) type codecs
//!
//! Each codec operates on the content octets of an already-framed TLV:
//! the dispatcher strips tag and length, then hands the exact content
//! slice here. Decoding validates canonical form where DER demands it
//! (minimal integers, sane unused-bit counts, restricted alphabets);
//! encoding produces the content octets only, with framing added by the
//! caller.

use bytes::Bytes;

use crate::ber::types::Tag;
use crate::error::{Asn1Error, Asn1Result};
use asn1rt_core::value::{BitString, Int, Oid, PrimitiveValue};

/// The closed set of primitive kinds the engine understands
///
/// Character string variants are decoded uniformly into text; the kind
/// determines which alphabet is enforced and which universal tag applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    Boolean,
    Integer,
    BitString,
    OctetString,
    Null,
    ObjectIdentifier,
    Utf8String,
    NumericString,
    PrintableString,
    Ia5String,
    VisibleString,
    GeneralizedTime,
}

impl PrimitiveKind {
    /// The universal tag this kind carries when not overridden
    pub const fn universal_tag(self) -> Tag {
        let number = match self {
            PrimitiveKind::Boolean => 1,
            PrimitiveKind::Integer => 2,
            PrimitiveKind::BitString => 3,
            PrimitiveKind::OctetString => 4,
            PrimitiveKind::Null => 5,
            PrimitiveKind::ObjectIdentifier => 6,
            PrimitiveKind::Utf8String => 12,
            PrimitiveKind::NumericString => 18,
            PrimitiveKind::PrintableString => 19,
            PrimitiveKind::Ia5String => 22,
            PrimitiveKind::GeneralizedTime => 24,
            PrimitiveKind::VisibleString => 26,
        };
        Tag::universal(false, number)
    }

    /// ASN.1 name of the kind, for error messages
    pub fn name(self) -> &'static str {
        match self {
            PrimitiveKind::Boolean => "BOOLEAN",
            PrimitiveKind::Integer => "INTEGER",
            PrimitiveKind::BitString => "BIT STRING",
            PrimitiveKind::OctetString => "OCTET STRING",
            PrimitiveKind::Null => "NULL",
            PrimitiveKind::ObjectIdentifier => "OBJECT IDENTIFIER",
            PrimitiveKind::Utf8String => "UTF8String",
            PrimitiveKind::NumericString => "NumericString",
            PrimitiveKind::PrintableString => "PrintableString",
            PrimitiveKind::Ia5String => "IA5String",
            PrimitiveKind::VisibleString => "VisibleString",
            PrimitiveKind::GeneralizedTime => "GeneralizedTime",
        }
    }
}

/// Decode the content octets of a primitive TLV
pub fn decode_content(kind: PrimitiveKind, content: &[u8]) -> Asn1Result<PrimitiveValue> {
    match kind {
        PrimitiveKind::Boolean => decode_boolean(content),
        PrimitiveKind::Integer => decode_integer(content),
        PrimitiveKind::BitString => decode_bit_string(content),
        PrimitiveKind::OctetString => Ok(PrimitiveValue::OctetString(Bytes::copy_from_slice(
            content,
        ))),
        PrimitiveKind::Null => decode_null(content),
        PrimitiveKind::ObjectIdentifier => decode_object_identifier(content),
        PrimitiveKind::GeneralizedTime => decode_generalized_time(content),
        PrimitiveKind::Utf8String
        | PrimitiveKind::NumericString
        | PrimitiveKind::PrintableString
        | PrimitiveKind::Ia5String
        | PrimitiveKind::VisibleString => decode_character_string(kind, content),
    }
}

/// Encode a primitive value as content octets, appending to `out`
///
/// # Error Handling
/// Fails with `Malformed` when the value variant does not match the
/// descriptor kind (e.g. a BOOLEAN value offered to an INTEGER member).
pub fn encode_content(
    kind: PrimitiveKind,
    value: &PrimitiveValue,
    out: &mut Vec<u8>,
) -> Asn1Result<()> {
    match (kind, value) {
        (PrimitiveKind::Boolean, PrimitiveValue::Boolean(b)) => {
            out.push(if *b { 0xFF } else { 0x00 });
            Ok(())
        }
        (PrimitiveKind::Integer, PrimitiveValue::Integer(i)) => {
            out.extend_from_slice(i.as_bytes());
            Ok(())
        }
        (PrimitiveKind::BitString, PrimitiveValue::BitString(bs)) => {
            out.push(bs.unused_bits());
            out.extend_from_slice(bs.data());
            Ok(())
        }
        (PrimitiveKind::OctetString, PrimitiveValue::OctetString(b)) => {
            out.extend_from_slice(b);
            Ok(())
        }
        (PrimitiveKind::Null, PrimitiveValue::Null) => Ok(()),
        (PrimitiveKind::ObjectIdentifier, PrimitiveValue::ObjectIdentifier(oid)) => {
            encode_oid_content(oid, out)
        }
        (PrimitiveKind::GeneralizedTime, PrimitiveValue::GeneralizedTime(s)) => {
            validate_generalized_time(s.as_bytes())?;
            out.extend_from_slice(s.as_bytes());
            Ok(())
        }
        (
            PrimitiveKind::Utf8String
            | PrimitiveKind::NumericString
            | PrimitiveKind::PrintableString
            | PrimitiveKind::Ia5String
            | PrimitiveKind::VisibleString,
            PrimitiveValue::CharacterString(s),
        ) => {
            validate_alphabet(kind, s.as_bytes())?;
            out.extend_from_slice(s.as_bytes());
            Ok(())
        }
        _ => Err(Asn1Error::Malformed(format!(
            "value does not match primitive kind {}",
            kind.name()
        ))),
    }
}

fn decode_boolean(content: &[u8]) -> Asn1Result<PrimitiveValue> {
    if content.len() != 1 {
        return Err(Asn1Error::Malformed(format!(
            "BOOLEAN content must be 1 byte, got {}",
            content.len()
        )));
    }
    // BER accepts any non-zero octet as TRUE; DER encode always emits FF
    Ok(PrimitiveValue::Boolean(content[0] != 0))
}

fn decode_integer(content: &[u8]) -> Asn1Result<PrimitiveValue> {
    if content.is_empty() {
        return Err(Asn1Error::Malformed("empty INTEGER content".to_string()));
    }
    if content.len() > 1 {
        let redundant = (content[0] == 0x00 && content[1] & 0x80 == 0)
            || (content[0] == 0xFF && content[1] & 0x80 != 0);
        if redundant {
            return Err(Asn1Error::Malformed(
                "non-minimal INTEGER encoding".to_string(),
            ));
        }
    }
    Ok(PrimitiveValue::Integer(Int::from_be_bytes(
        Bytes::copy_from_slice(content),
    )))
}

fn decode_bit_string(content: &[u8]) -> Asn1Result<PrimitiveValue> {
    let unused = *content.first().ok_or_else(|| {
        Asn1Error::Malformed("BIT STRING content missing unused-bits octet".to_string())
    })?;
    if unused > 7 {
        return Err(Asn1Error::Malformed(format!(
            "invalid unused-bits count {unused} (must be 0-7)"
        )));
    }
    if content.len() == 1 && unused != 0 {
        return Err(Asn1Error::Malformed(
            "empty BIT STRING with non-zero unused-bits count".to_string(),
        ));
    }
    Ok(PrimitiveValue::BitString(BitString::new(
        Bytes::copy_from_slice(&content[1..]),
        unused,
    )))
}

fn decode_null(content: &[u8]) -> Asn1Result<PrimitiveValue> {
    if !content.is_empty() {
        return Err(Asn1Error::Malformed(format!(
            "NULL content must be empty, got {} bytes",
            content.len()
        )));
    }
    Ok(PrimitiveValue::Null)
}

fn decode_object_identifier(content: &[u8]) -> Asn1Result<PrimitiveValue> {
    if content.is_empty() {
        return Err(Asn1Error::Malformed("empty OBJECT IDENTIFIER".to_string()));
    }

    // Decode the raw base-128 arc values first; the leading arc packs the
    // first two identifier components
    let mut raw = Vec::new();
    let mut pos = 0;
    while pos < content.len() {
        if content[pos] == 0x80 {
            return Err(Asn1Error::Malformed(
                "non-minimal OID arc encoding".to_string(),
            ));
        }
        let mut arc = 0u32;
        loop {
            let byte = content[pos];
            arc = arc
                .checked_mul(128)
                .and_then(|a| a.checked_add((byte & 0x7F) as u32))
                .ok_or_else(|| Asn1Error::Malformed("OID arc overflow".to_string()))?;
            pos += 1;
            if byte & 0x80 == 0 {
                break;
            }
            if pos >= content.len() {
                return Err(Asn1Error::Malformed(
                    "OID arc with dangling continuation bit".to_string(),
                ));
            }
        }
        raw.push(arc);
    }

    let packed = raw[0];
    let mut arcs = if packed < 40 {
        vec![0, packed]
    } else if packed < 80 {
        vec![1, packed - 40]
    } else {
        vec![2, packed - 80]
    };
    arcs.extend_from_slice(&raw[1..]);

    let oid = Oid::new(arcs).ok_or_else(|| Asn1Error::Malformed("invalid OID arcs".to_string()))?;
    Ok(PrimitiveValue::ObjectIdentifier(oid))
}

fn encode_oid_content(oid: &Oid, out: &mut Vec<u8>) -> Asn1Result<()> {
    let arcs = oid.arcs();
    // Oid construction already guarantees at least two arcs and a
    // packable leading pair
    let packed = arcs[0]
        .checked_mul(40)
        .and_then(|n| n.checked_add(arcs[1]))
        .ok_or_else(|| Asn1Error::Malformed("OID leading arcs too large".to_string()))?;
    push_base128(packed, out);
    for &arc in &arcs[2..] {
        push_base128(arc, out);
    }
    Ok(())
}

fn push_base128(value: u32, out: &mut Vec<u8>) {
    let mut groups = [0u8; 5];
    let mut count = 0;
    let mut remaining = value;
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

fn decode_character_string(kind: PrimitiveKind, content: &[u8]) -> Asn1Result<PrimitiveValue> {
    validate_alphabet(kind, content)?;
    let text = String::from_utf8(content.to_vec())
        .map_err(|_| Asn1Error::Malformed(format!("invalid UTF-8 in {}", kind.name())))?;
    Ok(PrimitiveValue::CharacterString(text))
}

/// Validate string content against the alphabet its kind declares
///
/// This is a structural validity check per X.680, not a semantic
/// constraint: a NumericString containing a letter is malformed input,
/// on the same footing as a bad length octet.
fn validate_alphabet(kind: PrimitiveKind, content: &[u8]) -> Asn1Result<()> {
    let valid = |b: u8| match kind {
        PrimitiveKind::NumericString => b.is_ascii_digit() || b == b' ',
        PrimitiveKind::PrintableString => {
            b.is_ascii_alphanumeric() || b" '()+,-./:=?".contains(&b)
        }
        PrimitiveKind::Ia5String => b <= 0x7F,
        PrimitiveKind::VisibleString => (0x20..=0x7E).contains(&b),
        // UTF-8 validity is checked as a whole, not per byte
        _ => true,
    };
    if let Some(bad) = content.iter().find(|&&b| !valid(b)) {
        return Err(Asn1Error::Malformed(format!(
            "invalid character 0x{bad:02X} in {}",
            kind.name()
        )));
    }
    if kind == PrimitiveKind::Utf8String && std::str::from_utf8(content).is_err() {
        return Err(Asn1Error::Malformed("invalid UTF-8 content".to_string()));
    }
    Ok(())
}

fn decode_generalized_time(content: &[u8]) -> Asn1Result<PrimitiveValue> {
    validate_generalized_time(content)?;
    // Validation guarantees pure ASCII
    let text = String::from_utf8(content.to_vec())
        .map_err(|_| Asn1Error::Malformed("invalid GeneralizedTime".to_string()))?;
    Ok(PrimitiveValue::GeneralizedTime(text))
}

/// Validate the DER shape of GeneralizedTime: `YYYYMMDDHHMMSS[.f+]Z`
fn validate_generalized_time(content: &[u8]) -> Asn1Result<()> {
    let malformed = || Asn1Error::Malformed("invalid GeneralizedTime encoding".to_string());
    if content.len() < 15 || *content.last().unwrap_or(&0) != b'Z' {
        return Err(malformed());
    }
    let body = &content[..content.len() - 1];
    if !body[..14].iter().all(u8::is_ascii_digit) {
        return Err(malformed());
    }
    if body.len() > 14 {
        let fraction = &body[14..];
        if fraction[0] != b'.' || fraction.len() < 2 || !fraction[1..].iter().all(u8::is_ascii_digit)
        {
            return Err(malformed());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(content: &[u8]) -> Asn1Result<PrimitiveValue> {
        decode_content(PrimitiveKind::Integer, content)
    }

    #[test]
    fn test_integer_minimal_accepted() {
        // 00 80 is the minimal encoding of +128
        let v = int(&[0x00, 0x80]).unwrap();
        assert_eq!(
            v,
            PrimitiveValue::Integer(Int::from_i64(128)),
        );
        // 80 alone is -128
        let v = int(&[0x80]).unwrap();
        assert_eq!(v, PrimitiveValue::Integer(Int::from_i64(-128)));
    }

    #[test]
    fn test_integer_non_minimal_rejected() {
        assert!(matches!(int(&[0x00, 0x00, 0x80]), Err(Asn1Error::Malformed(_))));
        assert!(matches!(int(&[0x00, 0x7F]), Err(Asn1Error::Malformed(_))));
        assert!(matches!(int(&[0xFF, 0x80]), Err(Asn1Error::Malformed(_))));
        assert!(matches!(int(&[]), Err(Asn1Error::Malformed(_))));
    }

    #[test]
    fn test_bit_string_unused_bits() {
        let v = decode_content(PrimitiveKind::BitString, &[0x03, 0b1010_1000]).unwrap();
        let PrimitiveValue::BitString(bs) = v else {
            panic!("expected bit string")
        };
        assert_eq!(bs.bit_len(), 5);
        assert_eq!(bs.unused_bits(), 3);
    }

    #[test]
    fn test_bit_string_rejections() {
        // Content length 0: missing unused-bits octet
        assert!(matches!(
            decode_content(PrimitiveKind::BitString, &[]),
            Err(Asn1Error::Malformed(_))
        ));
        // Empty data with non-zero unused bits
        assert!(matches!(
            decode_content(PrimitiveKind::BitString, &[0x04]),
            Err(Asn1Error::Malformed(_))
        ));
        // Unused-bits octet >= 8
        assert!(matches!(
            decode_content(PrimitiveKind::BitString, &[0x08, 0xFF]),
            Err(Asn1Error::Malformed(_))
        ));
    }

    #[test]
    fn test_oid_roundtrip() {
        let oid = Oid::new(vec![1, 2, 840, 113549]).unwrap();
        let mut content = Vec::new();
        encode_content(
            PrimitiveKind::ObjectIdentifier,
            &PrimitiveValue::ObjectIdentifier(oid.clone()),
            &mut content,
        )
        .unwrap();
        assert_eq!(content, [0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D]);
        let v = decode_content(PrimitiveKind::ObjectIdentifier, &content).unwrap();
        assert_eq!(v, PrimitiveValue::ObjectIdentifier(oid));
    }

    #[test]
    fn test_oid_joint_iso_root() {
        // 2.999 packs as 80 + 999 = 1079, a multi-octet leading arc
        let oid = Oid::new(vec![2, 999]).unwrap();
        let mut content = Vec::new();
        encode_content(
            PrimitiveKind::ObjectIdentifier,
            &PrimitiveValue::ObjectIdentifier(oid.clone()),
            &mut content,
        )
        .unwrap();
        let v = decode_content(PrimitiveKind::ObjectIdentifier, &content).unwrap();
        assert_eq!(v, PrimitiveValue::ObjectIdentifier(oid));
    }

    #[test]
    fn test_oid_malformed() {
        // Dangling continuation bit
        assert!(matches!(
            decode_content(PrimitiveKind::ObjectIdentifier, &[0x2A, 0x86]),
            Err(Asn1Error::Malformed(_))
        ));
        // Non-minimal arc (leading 0x80 octet)
        assert!(matches!(
            decode_content(PrimitiveKind::ObjectIdentifier, &[0x2A, 0x80, 0x01]),
            Err(Asn1Error::Malformed(_))
        ));
    }

    #[test]
    fn test_numeric_string_alphabet() {
        let v = decode_content(PrimitiveKind::NumericString, b"123 456").unwrap();
        assert_eq!(v, PrimitiveValue::CharacterString("123 456".to_string()));
        assert!(matches!(
            decode_content(PrimitiveKind::NumericString, b"12a"),
            Err(Asn1Error::Malformed(_))
        ));
    }

    #[test]
    fn test_printable_string_alphabet() {
        assert!(decode_content(PrimitiveKind::PrintableString, b"Example CA-1").is_ok());
        assert!(matches!(
            decode_content(PrimitiveKind::PrintableString, b"no@sign"),
            Err(Asn1Error::Malformed(_))
        ));
    }

    #[test]
    fn test_ia5_string_alphabet() {
        assert!(decode_content(PrimitiveKind::Ia5String, b"host.example.com").is_ok());
        assert!(matches!(
            decode_content(PrimitiveKind::Ia5String, &[0x80]),
            Err(Asn1Error::Malformed(_))
        ));
    }

    #[test]
    fn test_generalized_time() {
        assert!(decode_content(PrimitiveKind::GeneralizedTime, b"20260823120000Z").is_ok());
        assert!(decode_content(PrimitiveKind::GeneralizedTime, b"20260823120000.5Z").is_ok());
        assert!(matches!(
            decode_content(PrimitiveKind::GeneralizedTime, b"20260823120000"),
            Err(Asn1Error::Malformed(_))
        ));
        assert!(matches!(
            decode_content(PrimitiveKind::GeneralizedTime, b"2026082312000Z"),
            Err(Asn1Error::Malformed(_))
        ));
    }

    #[test]
    fn test_boolean() {
        assert_eq!(
            decode_content(PrimitiveKind::Boolean, &[0x01]).unwrap(),
            PrimitiveValue::Boolean(true)
        );
        assert_eq!(
            decode_content(PrimitiveKind::Boolean, &[0x00]).unwrap(),
            PrimitiveValue::Boolean(false)
        );
        assert!(matches!(
            decode_content(PrimitiveKind::Boolean, &[]),
            Err(Asn1Error::Malformed(_))
        ));
        let mut out = Vec::new();
        encode_content(PrimitiveKind::Boolean, &PrimitiveValue::Boolean(true), &mut out).unwrap();
        assert_eq!(out, [0xFF]);
    }

    #[test]
    fn test_kind_mismatch_on_encode() {
        let mut out = Vec::new();
        assert!(matches!(
            encode_content(PrimitiveKind::Integer, &PrimitiveValue::Boolean(true), &mut out),
            Err(Asn1Error::Malformed(_))
        ));
    }
}
