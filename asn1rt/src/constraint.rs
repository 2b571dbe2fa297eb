//! Constraint engine
//!
//! Constraints are semantic checks attached to descriptors, evaluated
//! against a fully materialized `DecodedValue` after structural decode
//! (or before encode). A constraint failure never implies structural
//! invalidity: it is reported as `Asn1Error::ConstraintViolation`, a
//! channel distinct from parse errors, so diagnostic tooling can keep
//! the decoded value and inspect it anyway.
//!
//! Evaluation order is innermost-first: members are checked before their
//! containing structure, so the first reported failure is the most
//! specific one.

use asn1rt_core::value::{DecodedValue, PrimitiveValue};

use crate::descriptor::{Kind, Registry, TypeDescriptor};
use crate::error::{Asn1Error, Asn1Result};

/// A semantic predicate attached to a descriptor
#[derive(Debug, Clone, Copy)]
pub enum Constraint {
    /// Bound on element count (SEQUENCE OF / SET OF), character count
    /// (strings), byte length (OCTET STRING) or bit length (BIT STRING)
    SizeRange { min: usize, max: Option<usize> },
    /// Inclusive bound on an INTEGER value
    ValueRange { min: i64, max: i64 },
    /// Arbitrary predicate with a fixed failure message
    Custom {
        predicate: fn(&DecodedValue) -> bool,
        message: &'static str,
    },
}

/// Check `value` against every constraint reachable through `td`,
/// innermost-first
pub fn check(
    registry: &Registry,
    td: &'static TypeDescriptor,
    value: &DecodedValue,
) -> Asn1Result<()> {
    // Collect the alias chain so alias-level constraints run after their
    // target's (outermost last)
    let mut chain = vec![td];
    let mut current = td;
    while let Kind::Alias { target } = &current.kind {
        current = registry.resolve(*target)?;
        chain.push(current);
    }

    // Members before their container
    match (&current.kind, value) {
        (Kind::Sequence { members, .. }, DecodedValue::Sequence(sv)) => {
            for (m, (_, mv)) in members.iter().zip(sv.members.iter()) {
                if let Some(v) = mv {
                    check(registry, registry.resolve(m.ty)?, v)?;
                }
            }
        }
        (Kind::Choice { alternatives }, DecodedValue::Choice { alternative, value }) => {
            if let Some(m) = alternatives.iter().find(|m| m.name == *alternative) {
                check(registry, registry.resolve(m.ty)?, value)?;
            }
        }
        (Kind::SequenceOf { element, .. }, DecodedValue::SequenceOf(items)) => {
            let elem_td = registry.resolve(*element)?;
            for item in items {
                check(registry, elem_td, item)?;
            }
        }
        _ => {}
    }

    for td in chain.iter().rev() {
        if let Some(constraint) = &td.constraint {
            evaluate(constraint, td.name, value)?;
        }
    }
    Ok(())
}

fn evaluate(
    constraint: &Constraint,
    type_name: &'static str,
    value: &DecodedValue,
) -> Asn1Result<()> {
    match constraint {
        Constraint::SizeRange { min, max } => {
            let Some(size) = size_of(value) else {
                return Err(violation(type_name, "size constraint not applicable".into()));
            };
            let max_ok = max.is_none_or(|m| size <= m);
            if size < *min || !max_ok {
                let upper = max.map_or("MAX".to_string(), |m| m.to_string());
                return Err(violation(
                    type_name,
                    format!("size {size} outside permitted range {min}..{upper}"),
                ));
            }
            Ok(())
        }
        Constraint::ValueRange { min, max } => {
            let within = value
                .as_integer()
                .and_then(|i| i.as_i64())
                .is_some_and(|v| v >= *min && v <= *max);
            if !within {
                return Err(violation(
                    type_name,
                    format!("value outside permitted range {min}..{max}"),
                ));
            }
            Ok(())
        }
        Constraint::Custom { predicate, message } => {
            if !predicate(value) {
                return Err(violation(type_name, (*message).to_string()));
            }
            Ok(())
        }
    }
}

fn violation(type_name: &'static str, message: String) -> Asn1Error {
    Asn1Error::ConstraintViolation { type_name, message }
}

/// Size of a value in the units its kind implies, if sizing applies
fn size_of(value: &DecodedValue) -> Option<usize> {
    match value {
        DecodedValue::SequenceOf(items) => Some(items.len()),
        DecodedValue::Primitive(PrimitiveValue::OctetString(b)) => Some(b.len()),
        DecodedValue::Primitive(PrimitiveValue::BitString(bs)) => Some(bs.bit_len()),
        DecodedValue::Primitive(PrimitiveValue::CharacterString(s)) => Some(s.chars().count()),
        DecodedValue::Raw(b) => Some(b.len()),
        _ => None,
    }
}
