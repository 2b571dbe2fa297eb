//! BER decoder and DER encoder
//!
//! Every ASN.1 value on the wire is a TLV (Tag-Length-Value) triplet:
//!
//! ```text
//! [Tag] [Length] [Value]
//! ```
//!
//! ## Tag Encoding
//!
//! The tag identifies the type of the data:
//! - **Class** (2 bits): Universal (00), Application (01), Context-specific (10), Private (11)
//! - **Constructed/Primitive** (1 bit): 0 = Primitive, 1 = Constructed
//! - **Tag Number** (5-31 bits): 0-30 in one octet, larger numbers in
//!   base-128 continuation octets
//!
//! ## Length Encoding
//!
//! - **Short form** (1 byte): lengths 0-127
//! - **Long form**: first octet `0x80 | n`, then `n` big-endian octets
//! - **Indefinite form** (`0x80`): content runs until an end-of-contents
//!   marker (`00 00`); only legal under a constructed tag, and only on
//!   the decode side
//!
//! ## Decode vs. encode discipline
//!
//! Decoding accepts BER: indefinite lengths, non-minimal length octets
//! and BOOLEAN values other than `FF` are tolerated. Encoding always
//! emits DER: definite minimal-octet lengths, minimal integers, sorted
//! SET OF elements, omitted default-equal members. Non-minimal INTEGER
//! content and invalid characters in restricted strings are rejected on
//! decode as well, since DER consumers rely on canonical comparison.

pub mod types;
pub mod primitives;
pub mod decoder;
pub mod encoder;

pub use types::{Length, Tag, TagClass};
pub use primitives::PrimitiveKind;
pub use decoder::{DecodeOptions, DecodeStep, Decoder, ExtensionPolicy, ParseContext};
pub use encoder::Encoder;
