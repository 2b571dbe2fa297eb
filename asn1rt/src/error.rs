//! Error types for ASN.1 codec operations
//!
//! Re-exported from `asn1rt-core` so codec modules and callers share one
//! error surface.

pub use asn1rt_core::error::{Asn1Error, Asn1Result};
