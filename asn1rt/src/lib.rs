//! Type-descriptor-driven ASN.1 BER/DER codec runtime
//!
//! This crate is the generic engine that per-type descriptor tables plug
//! into: given a `TypeDescriptor` and a byte stream, it decodes BER
//! (Basic Encoding Rules) input into a `DecodedValue` tree and encodes
//! such trees back to canonical DER (Distinguished Encoding Rules).
//!
//! The engine handles:
//! - SEQUENCE with OPTIONAL / DEFAULT members and extension points
//! - CHOICE dispatch (first matching alternative wins)
//! - SEQUENCE OF / SET OF repetitions, definite and indefinite length
//! - Primitive leaf types with alphabet and minimality validation
//! - IMPLICIT and EXPLICIT member tagging
//! - Resumable decoding over input delivered in arbitrary fragments
//! - Constraint checking as a separate, post-structural pass
//!
//! Descriptors are static configuration: immutable, `'static`, shared
//! freely across threads. All per-decode state lives in a `ParseContext`
//! owned by exactly one decode operation.

pub mod error;
pub mod ber;
pub mod descriptor;
pub mod builtins;
pub mod constraint;
pub mod pkix;

pub use error::{Asn1Error, Asn1Result};
pub use ber::types::{Length, Tag, TagClass};
pub use ber::decoder::{DecodeOptions, DecodeStep, Decoder, ExtensionPolicy, ParseContext};
pub use ber::encoder::Encoder;
pub use ber::primitives::PrimitiveKind;
pub use constraint::Constraint;
pub use descriptor::{
    Kind, Member, Optionality, Registry, TagMode, TagOverride, TypeDescriptor, TypeRef,
};

pub use asn1rt_core::value::{BitString, DecodedValue, Int, Oid, PrimitiveValue, SequenceValue};
