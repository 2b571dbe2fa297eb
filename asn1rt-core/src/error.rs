use thiserror::Error;

/// Main error type for ASN.1 codec operations
///
/// The taxonomy separates recoverable truncation (more input may arrive),
/// fatal syntax errors, dispatch failures, semantic constraint violations
/// and encode-side capacity problems. Dispatch uses `TagMismatch` as an
/// ordinary return value to drive CHOICE selection and SEQUENCE
/// optional-skip decisions; it reaches the caller only when no fallback
/// applies.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Asn1Error {
    /// More input is needed. A resumable decode can continue once further
    /// bytes are fed; a one-shot decode surfaces this as a hard error.
    #[error("Truncated input: more bytes required")]
    Truncated,

    /// The encoding violates BER rules (bad tag, bad length, non-minimal
    /// integer, invalid character, ...). Fatal for this decode attempt.
    #[error("Malformed encoding: {0}")]
    Malformed(String),

    /// No descriptor alternative or member matched the tag found on the
    /// wire.
    #[error("Tag mismatch: expected {expected}, found {found}")]
    TagMismatch { expected: String, found: String },

    /// The value is structurally valid but violates a constraint attached
    /// to its descriptor. Reported on a distinct channel from parse
    /// errors so diagnostic callers can still obtain the decoded value.
    #[error("Constraint violation on {type_name}: {message}")]
    ConstraintViolation {
        type_name: &'static str,
        message: String,
    },

    /// Encoded output would exceed the caller-provided capacity.
    #[error("Capacity exceeded: need {needed} bytes, capacity {capacity}")]
    CapacityExceeded { needed: usize, capacity: usize },
}

/// Result type alias for ASN.1 codec operations
pub type Asn1Result<T> = Result<T, Asn1Error>;
