//! PKIX descriptor tables
//!
//! Static descriptors for a set of certificate-extension types from the
//! PKIX profile (RFC 5280 and friends): GeneralName, NameConstraints,
//! CertificatePolicies, AuthorityInfoAccess, PrivateKeyUsagePeriod and a
//! handful of named aliases. They serve both as the shipped vocabulary
//! for these extensions and as the reference example of how descriptor
//! tables for any other ASN.1 module are written against the engine.
//!
//! `GeneralName` is referenced by name (`TypeRef::Named`) from the types
//! that use it, resolved late through the registry returned by
//! [`registry`].

use crate::ber::types::Tag;
use crate::builtins;
use crate::constraint::Constraint;
use crate::descriptor::{Kind, Member, Registry, TagOverride, TypeDescriptor, TypeRef};
use crate::error::Asn1Result;
use asn1rt_core::value::DecodedValue;

/// GeneralName ::= CHOICE { ... }
///
/// The subset of alternatives with IMPLICIT primitive encodings:
/// rfc822Name, dNSName, uniformResourceIdentifier, iPAddress and
/// registeredID. The CHOICE itself is untagged; each alternative carries
/// its context-specific number from the PKIX module.
pub static GENERAL_NAME: TypeDescriptor = TypeDescriptor {
    name: "GeneralName",
    tags: &[],
    kind: Kind::Choice {
        alternatives: &[
            Member::required("rfc822Name", TypeRef::Static(&builtins::IA5_STRING))
                .tagged(TagOverride::implicit(Tag::context_specific(false, 1))),
            Member::required("dNSName", TypeRef::Static(&builtins::IA5_STRING))
                .tagged(TagOverride::implicit(Tag::context_specific(false, 2))),
            Member::required(
                "uniformResourceIdentifier",
                TypeRef::Static(&builtins::IA5_STRING),
            )
            .tagged(TagOverride::implicit(Tag::context_specific(false, 6))),
            Member::required("iPAddress", TypeRef::Static(&builtins::OCTET_STRING))
                .tagged(TagOverride::implicit(Tag::context_specific(false, 7))),
            Member::required("registeredID", TypeRef::Static(&builtins::OBJECT_IDENTIFIER))
                .tagged(TagOverride::implicit(Tag::context_specific(false, 8))),
        ],
    },
    constraint: None,
};

/// GeneralSubtree ::= SEQUENCE { base, minimum DEFAULT 0, maximum OPTIONAL }
pub static GENERAL_SUBTREE: TypeDescriptor = TypeDescriptor {
    name: "GeneralSubtree",
    tags: &[Tag::universal(true, 16)],
    kind: Kind::Sequence {
        members: &[
            Member::required("base", TypeRef::Named("GeneralName")),
            Member::defaulted(
                "minimum",
                TypeRef::Static(&builtins::INTEGER),
                &[0x02, 0x01, 0x00],
            )
            .tagged(TagOverride::implicit(Tag::context_specific(false, 0))),
            Member::optional("maximum", TypeRef::Static(&builtins::INTEGER))
                .tagged(TagOverride::implicit(Tag::context_specific(false, 1))),
        ],
        extensible: false,
    },
    constraint: None,
};

/// GeneralSubtrees ::= SEQUENCE SIZE (1..MAX) OF GeneralSubtree
pub static GENERAL_SUBTREES: TypeDescriptor = TypeDescriptor {
    name: "GeneralSubtrees",
    tags: &[Tag::universal(true, 16)],
    kind: Kind::SequenceOf {
        element: TypeRef::Static(&GENERAL_SUBTREE),
        sorted: false,
    },
    constraint: Some(Constraint::SizeRange { min: 1, max: None }),
};

/// NameConstraints ::= SEQUENCE { permittedSubtrees [0] OPTIONAL,
/// excludedSubtrees [1] OPTIONAL }
pub static NAME_CONSTRAINTS: TypeDescriptor = TypeDescriptor {
    name: "NameConstraints",
    tags: &[Tag::universal(true, 16)],
    kind: Kind::Sequence {
        members: &[
            Member::optional("permittedSubtrees", TypeRef::Static(&GENERAL_SUBTREES))
                .tagged(TagOverride::implicit(Tag::context_specific(true, 0))),
            Member::optional("excludedSubtrees", TypeRef::Static(&GENERAL_SUBTREES))
                .tagged(TagOverride::implicit(Tag::context_specific(true, 1))),
        ],
        extensible: false,
    },
    constraint: None,
};

/// CertPolicyId ::= OBJECT IDENTIFIER
pub static CERT_POLICY_ID: TypeDescriptor = TypeDescriptor {
    name: "CertPolicyId",
    tags: &[],
    kind: Kind::Alias {
        target: TypeRef::Static(&builtins::OBJECT_IDENTIFIER),
    },
    constraint: None,
};

/// PolicyQualifierInfo ::= SEQUENCE { policyQualifierId, qualifier ANY }
///
/// The qualifier is an open type keyed by the id; it is captured
/// verbatim and re-encoded byte-for-byte.
pub static POLICY_QUALIFIER_INFO: TypeDescriptor = TypeDescriptor {
    name: "PolicyQualifierInfo",
    tags: &[Tag::universal(true, 16)],
    kind: Kind::Sequence {
        members: &[
            Member::required(
                "policyQualifierId",
                TypeRef::Static(&builtins::OBJECT_IDENTIFIER),
            ),
            Member::required("qualifier", TypeRef::Static(&builtins::ANY)),
        ],
        extensible: false,
    },
    constraint: None,
};

/// SEQUENCE SIZE (1..MAX) OF PolicyQualifierInfo
pub static POLICY_QUALIFIERS: TypeDescriptor = TypeDescriptor {
    name: "PolicyQualifiers",
    tags: &[Tag::universal(true, 16)],
    kind: Kind::SequenceOf {
        element: TypeRef::Static(&POLICY_QUALIFIER_INFO),
        sorted: false,
    },
    constraint: Some(Constraint::SizeRange { min: 1, max: None }),
};

/// PolicyInformation ::= SEQUENCE { policyIdentifier, policyQualifiers OPTIONAL }
pub static POLICY_INFORMATION: TypeDescriptor = TypeDescriptor {
    name: "PolicyInformation",
    tags: &[Tag::universal(true, 16)],
    kind: Kind::Sequence {
        members: &[
            Member::required("policyIdentifier", TypeRef::Static(&CERT_POLICY_ID)),
            Member::optional("policyQualifiers", TypeRef::Static(&POLICY_QUALIFIERS)),
        ],
        extensible: false,
    },
    constraint: None,
};

/// CertificatePolicies ::= SEQUENCE SIZE (1..MAX) OF PolicyInformation
pub static CERTIFICATE_POLICIES: TypeDescriptor = TypeDescriptor {
    name: "CertificatePolicies",
    tags: &[Tag::universal(true, 16)],
    kind: Kind::SequenceOf {
        element: TypeRef::Static(&POLICY_INFORMATION),
        sorted: false,
    },
    constraint: Some(Constraint::SizeRange { min: 1, max: None }),
};

/// AccessDescription ::= SEQUENCE { accessMethod, accessLocation }
pub static ACCESS_DESCRIPTION: TypeDescriptor = TypeDescriptor {
    name: "AccessDescription",
    tags: &[Tag::universal(true, 16)],
    kind: Kind::Sequence {
        members: &[
            Member::required("accessMethod", TypeRef::Static(&builtins::OBJECT_IDENTIFIER)),
            Member::required("accessLocation", TypeRef::Named("GeneralName")),
        ],
        extensible: false,
    },
    constraint: None,
};

/// AuthorityInfoAccessSyntax ::= SEQUENCE SIZE (1..MAX) OF AccessDescription
pub static AUTHORITY_INFO_ACCESS: TypeDescriptor = TypeDescriptor {
    name: "AuthorityInfoAccessSyntax",
    tags: &[Tag::universal(true, 16)],
    kind: Kind::SequenceOf {
        element: TypeRef::Static(&ACCESS_DESCRIPTION),
        sorted: false,
    },
    constraint: Some(Constraint::SizeRange { min: 1, max: None }),
};

/// CertificateSerialNumber ::= INTEGER
pub static CERTIFICATE_SERIAL_NUMBER: TypeDescriptor = TypeDescriptor {
    name: "CertificateSerialNumber",
    tags: &[],
    kind: Kind::Alias {
        target: TypeRef::Static(&builtins::INTEGER),
    },
    constraint: None,
};

/// UniqueIdentifier ::= BIT STRING
pub static UNIQUE_IDENTIFIER: TypeDescriptor = TypeDescriptor {
    name: "UniqueIdentifier",
    tags: &[],
    kind: Kind::Alias {
        target: TypeRef::Static(&builtins::BIT_STRING),
    },
    constraint: None,
};

/// DomainComponent ::= IA5String
pub static DOMAIN_COMPONENT: TypeDescriptor = TypeDescriptor {
    name: "DomainComponent",
    tags: &[],
    kind: Kind::Alias {
        target: TypeRef::Static(&builtins::IA5_STRING),
    },
    constraint: None,
};

/// X121Address ::= NumericString (SIZE (1..ub-x121-address-length))
pub static X121_ADDRESS: TypeDescriptor = TypeDescriptor {
    name: "X121Address",
    tags: &[],
    kind: Kind::Alias {
        target: TypeRef::Static(&builtins::NUMERIC_STRING),
    },
    constraint: Some(Constraint::SizeRange {
        min: 1,
        max: Some(16),
    }),
};

/// TerminalIdentifier ::= PrintableString (SIZE (1..ub-terminal-id-length))
pub static TERMINAL_IDENTIFIER: TypeDescriptor = TypeDescriptor {
    name: "TerminalIdentifier",
    tags: &[],
    kind: Kind::Alias {
        target: TypeRef::Static(&builtins::PRINTABLE_STRING),
    },
    constraint: Some(Constraint::SizeRange {
        min: 1,
        max: Some(24),
    }),
};

/// PrivateDomainName ::= CHOICE { numeric NumericString, printable PrintableString }
///
/// Untagged CHOICE whose alternatives are told apart by their universal
/// string tags.
pub static PRIVATE_DOMAIN_NAME: TypeDescriptor = TypeDescriptor {
    name: "PrivateDomainName",
    tags: &[],
    kind: Kind::Choice {
        alternatives: &[
            Member::required("numeric", TypeRef::Static(&builtins::NUMERIC_STRING)),
            Member::required("printable", TypeRef::Static(&builtins::PRINTABLE_STRING)),
        ],
    },
    constraint: None,
};

fn has_usage_bound(value: &DecodedValue) -> bool {
    value
        .as_sequence()
        .is_some_and(|sv| sv.member("notBefore").is_some() || sv.member("notAfter").is_some())
}

/// PrivateKeyUsagePeriod ::= SEQUENCE { notBefore [0] OPTIONAL,
/// notAfter [1] OPTIONAL }
///
/// Both members are optional on the wire, but an empty period carries no
/// information; the profile requires at least one bound.
pub static PRIVATE_KEY_USAGE_PERIOD: TypeDescriptor = TypeDescriptor {
    name: "PrivateKeyUsagePeriod",
    tags: &[Tag::universal(true, 16)],
    kind: Kind::Sequence {
        members: &[
            Member::optional("notBefore", TypeRef::Static(&builtins::GENERALIZED_TIME))
                .tagged(TagOverride::implicit(Tag::context_specific(false, 0))),
            Member::optional("notAfter", TypeRef::Static(&builtins::GENERALIZED_TIME))
                .tagged(TagOverride::implicit(Tag::context_specific(false, 1))),
        ],
        extensible: false,
    },
    constraint: Some(Constraint::Custom {
        predicate: has_usage_bound,
        message: "at least one of notBefore/notAfter must be present",
    }),
};

/// Build a registry holding the universal builtins and every PKIX
/// descriptor in this module, verified for dangling references
pub fn registry() -> Asn1Result<Registry> {
    let mut reg = Registry::new();
    for td in [
        &builtins::BOOLEAN,
        &builtins::INTEGER,
        &builtins::BIT_STRING,
        &builtins::OCTET_STRING,
        &builtins::NULL,
        &builtins::OBJECT_IDENTIFIER,
        &builtins::UTF8_STRING,
        &builtins::NUMERIC_STRING,
        &builtins::PRINTABLE_STRING,
        &builtins::IA5_STRING,
        &builtins::GENERALIZED_TIME,
        &builtins::VISIBLE_STRING,
        &builtins::ANY,
        &GENERAL_NAME,
        &GENERAL_SUBTREE,
        &GENERAL_SUBTREES,
        &NAME_CONSTRAINTS,
        &CERT_POLICY_ID,
        &POLICY_QUALIFIER_INFO,
        &POLICY_QUALIFIERS,
        &POLICY_INFORMATION,
        &CERTIFICATE_POLICIES,
        &ACCESS_DESCRIPTION,
        &AUTHORITY_INFO_ACCESS,
        &CERTIFICATE_SERIAL_NUMBER,
        &UNIQUE_IDENTIFIER,
        &DOMAIN_COMPONENT,
        &PRIVATE_DOMAIN_NAME,
        &X121_ADDRESS,
        &TERMINAL_IDENTIFIER,
        &PRIVATE_KEY_USAGE_PERIOD,
    ] {
        reg.register(td)?;
    }
    reg.verify()?;
    Ok(reg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ber::decoder::{DecodeStep, Decoder};
    use crate::ber::encoder::Encoder;
    use crate::error::Asn1Error;
    use asn1rt_core::value::{Int, PrimitiveValue};

    // NameConstraints { permittedSubtrees: [ { base: dNSName "example.com" } ] }
    const NAME_CONSTRAINTS_DER: [u8; 19] = [
        0x30, 0x11, // NameConstraints
        0xA0, 0x0F, // permittedSubtrees [0]
        0x30, 0x0D, // GeneralSubtree
        0x82, 0x0B, b'e', b'x', b'a', b'm', b'p', b'l', b'e', b'.', b'c', b'o', b'm',
    ];

    fn int_value(v: i64) -> DecodedValue {
        DecodedValue::Primitive(PrimitiveValue::Integer(Int::from_i64(v)))
    }

    #[test]
    fn test_registry_builds_and_verifies() {
        let reg = registry().unwrap();
        assert!(reg.get("GeneralName").is_some());
        assert!(reg.get("NameConstraints").is_some());
    }

    #[test]
    fn test_name_constraints_decode() {
        let reg = registry().unwrap();
        let value = Decoder::new(&reg)
            .decode(&NAME_CONSTRAINTS, &NAME_CONSTRAINTS_DER)
            .unwrap();
        let nc = value.as_sequence().unwrap();
        assert!(nc.member("excludedSubtrees").is_none());

        let subtrees = nc
            .member("permittedSubtrees")
            .and_then(|v| v.as_sequence_of())
            .unwrap();
        assert_eq!(subtrees.len(), 1);
        let subtree = subtrees[0].as_sequence().unwrap();
        let DecodedValue::Choice { alternative, value } = subtree.member("base").unwrap() else {
            panic!("expected GeneralName choice")
        };
        assert_eq!(*alternative, "dNSName");
        assert_eq!(value.as_str(), Some("example.com"));
        // Absent DEFAULT 0 minimum is materialized
        assert_eq!(subtree.member("minimum"), Some(&int_value(0)));
        assert!(subtree.member("maximum").is_none());
    }

    #[test]
    fn test_name_constraints_roundtrip() {
        let reg = registry().unwrap();
        let value = Decoder::new(&reg)
            .decode(&NAME_CONSTRAINTS, &NAME_CONSTRAINTS_DER)
            .unwrap();
        // minimum was materialized to its default, so the re-encode
        // omits it again
        let encoded = Encoder::new(&reg).encode(&NAME_CONSTRAINTS, &value).unwrap();
        assert_eq!(encoded, NAME_CONSTRAINTS_DER);
    }

    #[test]
    fn test_name_constraints_resumable_at_every_split() {
        let reg = registry().unwrap();
        let decoder = Decoder::new(&reg);
        let whole = decoder
            .decode(&NAME_CONSTRAINTS, &NAME_CONSTRAINTS_DER)
            .unwrap();
        for split in 0..=NAME_CONSTRAINTS_DER.len() {
            let mut ctx = decoder.begin(&NAME_CONSTRAINTS);
            let step = decoder
                .feed(&mut ctx, &NAME_CONSTRAINTS_DER[..split])
                .unwrap();
            let value = match step {
                DecodeStep::Complete { value, .. } => value,
                DecodeStep::Pending => match decoder
                    .feed(&mut ctx, &NAME_CONSTRAINTS_DER[split..])
                    .unwrap()
                {
                    DecodeStep::Complete { value, .. } => value,
                    DecodeStep::Pending => panic!("still pending at split {split}"),
                },
            };
            assert_eq!(value, whole, "split at {split}");
        }
    }

    #[test]
    fn test_empty_subtrees_is_constraint_violation() {
        // Structurally valid, semantically empty permittedSubtrees
        let input = [0x30, 0x02, 0xA0, 0x00];
        let reg = registry().unwrap();
        let err = Decoder::new(&reg)
            .decode(&NAME_CONSTRAINTS, &input)
            .unwrap_err();
        assert!(matches!(
            err,
            Asn1Error::ConstraintViolation {
                type_name: "GeneralSubtrees",
                ..
            }
        ));
    }

    #[test]
    fn test_policy_information_with_any_qualifier() {
        // policyIdentifier 1.2.3, one qualifier: id-qt-cps with an
        // IA5String CPS URI
        let input = [
            0x30, 0x1B, // PolicyInformation
            0x06, 0x02, 0x2A, 0x03, // 1.2.3
            0x30, 0x15, // policyQualifiers
            0x30, 0x13, // PolicyQualifierInfo
            0x06, 0x08, 0x2B, 0x06, 0x01, 0x05, 0x05, 0x07, 0x02, 0x01, // 1.3.6.1.5.5.7.2.1
            0x16, 0x07, b'h', b't', b't', b'p', b':', b'/', b'/', // qualifier (ANY)
        ];
        let reg = registry().unwrap();
        let value = Decoder::new(&reg)
            .decode(&POLICY_INFORMATION, &input)
            .unwrap();
        let pi = value.as_sequence().unwrap();
        let quals = pi
            .member("policyQualifiers")
            .and_then(|v| v.as_sequence_of())
            .unwrap();
        let qi = quals[0].as_sequence().unwrap();
        let DecodedValue::Raw(raw) = qi.member("qualifier").unwrap() else {
            panic!("expected verbatim qualifier")
        };
        assert_eq!(&raw[..], &input[20..]);

        let encoded = Encoder::new(&reg).encode(&POLICY_INFORMATION, &value).unwrap();
        assert_eq!(encoded, input);
    }

    #[test]
    fn test_empty_policy_qualifiers_distinct_from_malformed() {
        let reg = registry().unwrap();
        let decoder = Decoder::new(&reg);

        // Present but empty: a constraint violation, not a parse error
        let empty = [0x30, 0x06, 0x06, 0x02, 0x2A, 0x03, 0x30, 0x00];
        assert!(matches!(
            decoder.decode(&POLICY_INFORMATION, &empty),
            Err(Asn1Error::ConstraintViolation {
                type_name: "PolicyQualifiers",
                ..
            })
        ));

        // An INTEGER where a PolicyQualifierInfo must start: malformed
        let wrong = [
            0x30, 0x09, 0x06, 0x02, 0x2A, 0x03, 0x30, 0x03, 0x02, 0x01, 0x00,
        ];
        assert!(matches!(
            decoder.decode(&POLICY_INFORMATION, &wrong),
            Err(Asn1Error::Malformed(_))
        ));
    }

    #[test]
    fn test_authority_info_access_with_named_general_name() {
        // One AccessDescription: id-ad-ocsp, URI "http://x"
        let input = [
            0x30, 0x16, // AuthorityInfoAccessSyntax
            0x30, 0x14, // AccessDescription
            0x06, 0x08, 0x2B, 0x06, 0x01, 0x05, 0x05, 0x07, 0x30, 0x01, // 1.3.6.1.5.5.7.48.1
            0x86, 0x08, b'h', b't', b't', b'p', b':', b'/', b'/', b'x',
        ];
        let reg = registry().unwrap();
        let value = Decoder::new(&reg)
            .decode(&AUTHORITY_INFO_ACCESS, &input)
            .unwrap();
        let ads = value.as_sequence_of().unwrap();
        let ad = ads[0].as_sequence().unwrap();
        let DecodedValue::Choice { alternative, value } = ad.member("accessLocation").unwrap()
        else {
            panic!("expected GeneralName choice")
        };
        assert_eq!(*alternative, "uniformResourceIdentifier");
        assert_eq!(value.as_str(), Some("http://x"));
    }

    #[test]
    fn test_x121_address_size_constraint() {
        let reg = registry().unwrap();
        let decoder = Decoder::new(&reg);

        let ok = [
            0x12, 0x10, b'1', b'2', b'3', b'4', b'5', b'6', b'7', b'8', b'9', b'0', b'1', b'2',
            b'3', b'4', b'5', b'6',
        ];
        assert!(decoder.decode(&X121_ADDRESS, &ok).is_ok());

        let too_long = [
            0x12, 0x11, b'1', b'2', b'3', b'4', b'5', b'6', b'7', b'8', b'9', b'0', b'1', b'2',
            b'3', b'4', b'5', b'6', b'7',
        ];
        assert!(matches!(
            decoder.decode(&X121_ADDRESS, &too_long),
            Err(Asn1Error::ConstraintViolation {
                type_name: "X121Address",
                ..
            })
        ));
    }

    #[test]
    fn test_private_domain_name_alternatives() {
        let reg = registry().unwrap();
        assert!(reg.get("PrivateDomainName").is_some());
        let decoder = Decoder::new(&reg);
        let encoder = Encoder::new(&reg);

        // NumericString tag selects `numeric`
        let numeric = [0x12, 0x04, b'4', b'0', b'0', b'4'];
        let value = decoder.decode(&PRIVATE_DOMAIN_NAME, &numeric).unwrap();
        let DecodedValue::Choice { alternative, value: inner } = &value else {
            panic!("expected choice")
        };
        assert_eq!(*alternative, "numeric");
        assert_eq!(inner.as_str(), Some("4004"));
        assert_eq!(
            encoder.encode(&PRIVATE_DOMAIN_NAME, &value).unwrap(),
            numeric
        );

        // PrintableString tag selects `printable`
        let printable = [0x13, 0x04, b'A', b'c', b'm', b'e'];
        let value = decoder.decode(&PRIVATE_DOMAIN_NAME, &printable).unwrap();
        let DecodedValue::Choice { alternative, .. } = &value else {
            panic!("expected choice")
        };
        assert_eq!(*alternative, "printable");
        assert_eq!(
            encoder.encode(&PRIVATE_DOMAIN_NAME, &value).unwrap(),
            printable
        );

        // Any other tag matches neither alternative
        let wrong = [0x16, 0x01, b'x'];
        assert!(matches!(
            decoder.decode(&PRIVATE_DOMAIN_NAME, &wrong),
            Err(Asn1Error::TagMismatch { .. })
        ));
    }

    #[test]
    fn test_private_key_usage_period_needs_a_bound() {
        let reg = registry().unwrap();
        let decoder = Decoder::new(&reg);

        let empty = [0x30, 0x00];
        let err = decoder
            .decode(&PRIVATE_KEY_USAGE_PERIOD, &empty)
            .unwrap_err();
        assert!(matches!(
            err,
            Asn1Error::ConstraintViolation {
                type_name: "PrivateKeyUsagePeriod",
                ..
            }
        ));

        let with_not_before = [
            0x30, 0x11, 0x80, 0x0F, b'2', b'0', b'2', b'6', b'0', b'1', b'0', b'1', b'0', b'0',
            b'0', b'0', b'0', b'0', b'Z',
        ];
        let value = decoder
            .decode(&PRIVATE_KEY_USAGE_PERIOD, &with_not_before)
            .unwrap();
        let period = value.as_sequence().unwrap();
        assert_eq!(
            period.member("notBefore"),
            Some(&DecodedValue::Primitive(PrimitiveValue::GeneralizedTime(
                "20260101000000Z".to_string()
            )))
        );
    }
}
