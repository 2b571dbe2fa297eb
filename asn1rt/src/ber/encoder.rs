//! Descriptor-driven DER encoder
//!
//! Encoding is the strict counterpart of decoding: where the decoder
//! tolerates BER freedoms, the encoder always emits canonical DER.
//! Definite minimal-octet lengths, minimal INTEGER content, `FF` for
//! TRUE, SET OF elements sorted by their encoded byte strings, and
//! DEFAULT members omitted when their value equals the default.
//!
//! Output is built bottom-up into in-memory buffers; content length is
//! known before a header is written, so no length back-patching is
//! needed. Preserved extension TLVs and ANY values are emitted verbatim,
//! which makes decode-then-encode reproduce foreign extensions
//! byte-for-byte.

use log::trace;

use crate::ber::types::{Length, Tag};
use crate::constraint;
use crate::descriptor::{
    kind_default_tag, Kind, Member, Optionality, Registry, TagMode, TagOverride, TypeDescriptor,
};
use crate::error::{Asn1Error, Asn1Result};
use asn1rt_core::value::DecodedValue;

/// Descriptor-driven DER encoder
///
/// Stateless apart from the registry reference; safe to share across
/// threads.
pub struct Encoder<'a> {
    registry: &'a Registry,
}

impl<'a> Encoder<'a> {
    pub fn new(registry: &'a Registry) -> Self {
        Self { registry }
    }

    /// Encode `value` as canonical DER
    ///
    /// # Error Handling
    /// Constraints are checked before any bytes are produced; a value
    /// that violates its descriptor's constraints is rejected with
    /// `ConstraintViolation`. A value whose shape does not match the
    /// descriptor is rejected as `Malformed`.
    pub fn encode(
        &self,
        td: &'static TypeDescriptor,
        value: &DecodedValue,
    ) -> Asn1Result<Vec<u8>> {
        constraint::check(self.registry, td, value)?;
        let mut out = Vec::new();
        self.encode_value(td, None, value, &mut out)?;
        Ok(out)
    }

    /// Encode with an output size bound
    ///
    /// # Error Handling
    /// Returns `CapacityExceeded` when the encoding is larger than
    /// `capacity`; the error carries the size that would have been
    /// needed.
    pub fn encode_with_capacity(
        &self,
        td: &'static TypeDescriptor,
        value: &DecodedValue,
        capacity: usize,
    ) -> Asn1Result<Vec<u8>> {
        let out = self.encode(td, value)?;
        if out.len() > capacity {
            return Err(Asn1Error::CapacityExceeded {
                needed: out.len(),
                capacity,
            });
        }
        Ok(out)
    }

    fn encode_value(
        &self,
        td: &'static TypeDescriptor,
        ovr: Option<TagOverride>,
        value: &DecodedValue,
        out: &mut Vec<u8>,
    ) -> Asn1Result<()> {
        if let Some(o) = ovr {
            if o.mode == TagMode::Explicit {
                // EXPLICIT wraps the complete bare TLV
                let mut inner = Vec::new();
                self.encode_value(td, None, value, &mut inner)?;
                let tag = Tag::new(o.tag.class(), true, o.tag.number());
                emit_tlv(tag, &inner, out);
                return Ok(());
            }
        }

        // Verbatim TLVs (ANY values, preserved extensions) pass through
        if let DecodedValue::Raw(bytes) = value {
            out.extend_from_slice(bytes);
            return Ok(());
        }

        let (actual, own_tags) = self.registry.resolve_structural(td)?;
        let implicit = ovr.map(|o| o.tag);

        if matches!(actual.kind, Kind::Any) {
            return Err(Asn1Error::Malformed(format!(
                "{}: ANY value must carry a raw TLV",
                actual.name
            )));
        }

        // An untagged CHOICE contributes no header of its own
        if let Kind::Choice { alternatives } = &actual.kind {
            if implicit.is_none() && own_tags.is_empty() {
                let (alt, inner) = select_alternative(actual, alternatives, value)?;
                let alt_td = self.registry.resolve(alt.ty)?;
                return self.encode_value(alt_td, alt.tag, inner, out);
            }
        }

        let constructed = !matches!(actual.kind, Kind::Primitive(_));
        let base = match implicit {
            Some(t) => t,
            None => own_tags
                .first()
                .copied()
                .or_else(|| kind_default_tag(&actual.kind))
                .ok_or_else(|| {
                    Asn1Error::Malformed(format!("{} has no encodable tag", actual.name))
                })?,
        };
        let tag = Tag::new(base.class(), constructed, base.number());

        let mut content = Vec::new();
        match &actual.kind {
            Kind::Primitive(kind) => {
                let Some(pv) = value.as_primitive() else {
                    return Err(shape_error(actual.name, value));
                };
                crate::ber::primitives::encode_content(*kind, pv, &mut content)?;
            }
            Kind::Sequence { members, .. } => {
                let Some(sv) = value.as_sequence() else {
                    return Err(shape_error(actual.name, value));
                };
                for m in members.iter() {
                    let present = sv
                        .members
                        .iter()
                        .find(|(n, _)| *n == m.name)
                        .and_then(|(_, v)| v.as_ref());
                    match (present, &m.optionality) {
                        (None, Optionality::Required) => {
                            return Err(Asn1Error::Malformed(format!(
                                "{}: missing value for mandatory member '{}'",
                                actual.name, m.name
                            )));
                        }
                        (None, _) => {}
                        (Some(v), Optionality::Default(default)) => {
                            // DER omits a member equal to its DEFAULT
                            let member_td = self.registry.resolve(m.ty)?;
                            let mut bare = Vec::new();
                            self.encode_value(member_td, None, v, &mut bare)?;
                            if bare == *default {
                                trace!(
                                    "{}: omitting default-valued member '{}'",
                                    actual.name,
                                    m.name
                                );
                                continue;
                            }
                            self.encode_value(member_td, m.tag, v, &mut content)?;
                        }
                        (Some(v), _) => {
                            let member_td = self.registry.resolve(m.ty)?;
                            self.encode_value(member_td, m.tag, v, &mut content)?;
                        }
                    }
                }
                for ext in &sv.extensions {
                    content.extend_from_slice(ext);
                }
            }
            Kind::SequenceOf { element, sorted } => {
                let Some(items) = value.as_sequence_of() else {
                    return Err(shape_error(actual.name, value));
                };
                let element_td = self.registry.resolve(*element)?;
                let mut encoded: Vec<Vec<u8>> = Vec::with_capacity(items.len());
                for item in items {
                    let mut buf = Vec::new();
                    self.encode_value(element_td, None, item, &mut buf)?;
                    encoded.push(buf);
                }
                if *sorted {
                    // SET OF: ascending order of encoded octet strings
                    encoded.sort_unstable();
                }
                for e in encoded {
                    content.extend_from_slice(&e);
                }
            }
            Kind::Choice { alternatives } => {
                // Tagged CHOICE: the outer tag wraps the alternative
                let (alt, inner) = select_alternative(actual, alternatives, value)?;
                let alt_td = self.registry.resolve(alt.ty)?;
                self.encode_value(alt_td, alt.tag, inner, &mut content)?;
            }
            Kind::Alias { .. } | Kind::Any => {
                return Err(Asn1Error::Malformed(format!(
                    "internal encoder error: unresolved kind for {}",
                    actual.name
                )));
            }
        }

        emit_tlv(tag, &content, out);
        Ok(())
    }
}

fn select_alternative<'v>(
    td: &TypeDescriptor,
    alternatives: &'static [Member],
    value: &'v DecodedValue,
) -> Asn1Result<(&'static Member, &'v DecodedValue)> {
    let DecodedValue::Choice { alternative, value } = value else {
        return Err(shape_error(td.name, value));
    };
    let Some(alt) = alternatives.iter().find(|m| m.name == *alternative) else {
        return Err(Asn1Error::Malformed(format!(
            "{}: unknown alternative '{alternative}'",
            td.name
        )));
    };
    Ok((alt, value))
}

fn shape_error(type_name: &str, value: &DecodedValue) -> Asn1Error {
    let shape = match value {
        DecodedValue::Primitive(_) => "a primitive",
        DecodedValue::Sequence(_) => "a sequence",
        DecodedValue::Choice { .. } => "a choice",
        DecodedValue::SequenceOf(_) => "a repetition",
        DecodedValue::Raw(_) => "a raw TLV",
    };
    Asn1Error::Malformed(format!("{type_name}: value shape mismatch, got {shape}"))
}

fn emit_tlv(tag: Tag, content: &[u8], out: &mut Vec<u8>) {
    tag.encode_into(out);
    Length::encode_definite(content.len(), out);
    out.extend_from_slice(content);
}
