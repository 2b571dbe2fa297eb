//! Built-in descriptors for the universal primitive types
//!
//! Descriptor tables reference these instead of re-declaring the
//! universal tags at every use site.

use crate::ber::primitives::PrimitiveKind;
use crate::ber::types::Tag;
use crate::descriptor::{Kind, TypeDescriptor};

macro_rules! primitive_descriptor {
    ($ident:ident, $name:literal, $kind:ident, $tag:literal) => {
        pub static $ident: TypeDescriptor = TypeDescriptor {
            name: $name,
            tags: &[Tag::universal(false, $tag)],
            kind: Kind::Primitive(PrimitiveKind::$kind),
            constraint: None,
        };
    };
}

primitive_descriptor!(BOOLEAN, "BOOLEAN", Boolean, 1);
primitive_descriptor!(INTEGER, "INTEGER", Integer, 2);
primitive_descriptor!(BIT_STRING, "BIT STRING", BitString, 3);
primitive_descriptor!(OCTET_STRING, "OCTET STRING", OctetString, 4);
primitive_descriptor!(NULL, "NULL", Null, 5);
primitive_descriptor!(OBJECT_IDENTIFIER, "OBJECT IDENTIFIER", ObjectIdentifier, 6);
primitive_descriptor!(UTF8_STRING, "UTF8String", Utf8String, 12);
primitive_descriptor!(NUMERIC_STRING, "NumericString", NumericString, 18);
primitive_descriptor!(PRINTABLE_STRING, "PrintableString", PrintableString, 19);
primitive_descriptor!(IA5_STRING, "IA5String", Ia5String, 22);
primitive_descriptor!(GENERALIZED_TIME, "GeneralizedTime", GeneralizedTime, 24);
primitive_descriptor!(VISIBLE_STRING, "VisibleString", VisibleString, 26);

/// ANY: one arbitrary TLV captured verbatim
pub static ANY: TypeDescriptor = TypeDescriptor {
    name: "ANY",
    tags: &[],
    kind: Kind::Any,
    constraint: None,
};
