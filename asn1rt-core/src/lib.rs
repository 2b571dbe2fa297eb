//! Core datatypes for the asn1rt ASN.1 codec runtime
//!
//! This crate holds the pieces shared between the codec engine and its
//! callers: the error taxonomy and the `DecodedValue` tree that decode
//! operations produce and encode operations consume.
//!
//! It deliberately contains no codec logic; the engine itself lives in
//! the `asn1rt` crate.

pub mod error;
pub mod value;

pub use error::{Asn1Error, Asn1Result};
pub use value::{BitString, DecodedValue, Int, Oid, PrimitiveValue, SequenceValue};
