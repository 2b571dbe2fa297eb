//! Type descriptors
//!
//! A `TypeDescriptor` is the static, declarative description of one
//! ASN.1 type: its accepted outer tags, its structural kind (primitive,
//! SEQUENCE, CHOICE, SEQUENCE OF / SET OF, alias or ANY) and an optional
//! constraint. Descriptors are `'static` configuration data, typically
//! produced by an external schema-compilation step, and are shared
//! read-only across any number of concurrent decode operations.
//!
//! Descriptors reference each other either directly (`TypeRef::Static`)
//! or by name (`TypeRef::Named`). Named references are late-bound
//! through a `Registry`, which is what makes recursive and mutually
//! referential types expressible without infinite-size static data.

use std::collections::{HashMap, HashSet};

use crate::ber::primitives::PrimitiveKind;
use crate::ber::types::Tag;
use crate::constraint::Constraint;
use crate::error::{Asn1Error, Asn1Result};

/// Whether a tag override replaces or wraps the underlying tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagMode {
    /// The override replaces the type's own tag; the content encoding is
    /// unchanged
    Implicit,
    /// The override wraps the complete TLV of the underlying type
    Explicit,
}

/// A member or alternative tag override
#[derive(Debug, Clone, Copy)]
pub struct TagOverride {
    pub tag: Tag,
    pub mode: TagMode,
}

impl TagOverride {
    pub const fn implicit(tag: Tag) -> Self {
        Self {
            tag,
            mode: TagMode::Implicit,
        }
    }

    pub const fn explicit(tag: Tag) -> Self {
        Self {
            tag,
            mode: TagMode::Explicit,
        }
    }
}

/// Presence rules for a SEQUENCE member
#[derive(Debug, Clone, Copy)]
pub enum Optionality {
    Required,
    Optional,
    /// OPTIONAL with a DEFAULT value
    ///
    /// The bytes are the complete DER TLV of the default, encoded as the
    /// member's underlying type without any tag override. An absent
    /// member decodes to this value; an encode omits a member whose bare
    /// encoding equals it.
    Default(&'static [u8]),
}

/// Reference to another descriptor
#[derive(Debug, Clone, Copy)]
pub enum TypeRef {
    Static(&'static TypeDescriptor),
    /// Late-bound lookup through the registry, for recursive types
    Named(&'static str),
}

/// One member of a SEQUENCE, or one alternative of a CHOICE
#[derive(Debug)]
pub struct Member {
    pub name: &'static str,
    pub ty: TypeRef,
    pub tag: Option<TagOverride>,
    pub optionality: Optionality,
}

impl Member {
    pub const fn required(name: &'static str, ty: TypeRef) -> Self {
        Self {
            name,
            ty,
            tag: None,
            optionality: Optionality::Required,
        }
    }

    pub const fn optional(name: &'static str, ty: TypeRef) -> Self {
        Self {
            name,
            ty,
            tag: None,
            optionality: Optionality::Optional,
        }
    }

    pub const fn defaulted(name: &'static str, ty: TypeRef, default: &'static [u8]) -> Self {
        Self {
            name,
            ty,
            tag: None,
            optionality: Optionality::Default(default),
        }
    }

    /// Attach a tag override (builder style, usable in statics)
    pub const fn tagged(mut self, tag: TagOverride) -> Self {
        self.tag = Some(tag);
        self
    }

    /// True unless the member is OPTIONAL or has a DEFAULT
    pub fn is_required(&self) -> bool {
        matches!(self.optionality, Optionality::Required)
    }
}

/// The closed set of structural kinds
#[derive(Debug)]
pub enum Kind {
    Primitive(PrimitiveKind),
    Sequence {
        members: &'static [Member],
        /// Accept and skip (or capture) unknown trailing members
        extensible: bool,
    },
    Choice {
        alternatives: &'static [Member],
    },
    SequenceOf {
        element: TypeRef,
        /// SET OF: element encodings are sorted ascending in DER output
        sorted: bool,
    },
    /// A renamed type (e.g. `CertificateSerialNumber ::= INTEGER`);
    /// delegates to its target, substituting its own tags if it has any
    Alias { target: TypeRef },
    /// One arbitrary TLV captured verbatim (ASN.1 ANY)
    Any,
}

/// Static description of one ASN.1 type
///
/// `tags` is the ordered accepted tag set; the first entry is the
/// canonical tag used on encode. An empty set means the type is
/// transparent at the tag level (untagged CHOICE, ANY) or inherits the
/// tags of an alias target.
#[derive(Debug)]
pub struct TypeDescriptor {
    pub name: &'static str,
    pub tags: &'static [Tag],
    pub kind: Kind,
    pub constraint: Option<Constraint>,
}

/// Process-wide descriptor table
///
/// Built once at startup, then read-only: `Registry` resolves
/// `TypeRef::Named` references and never changes during decoding, so it
/// can be shared across threads without locking.
#[derive(Debug, Default)]
pub struct Registry {
    types: HashMap<&'static str, &'static TypeDescriptor>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a descriptor under its own name
    ///
    /// # Error Handling
    /// Fails if another descriptor is already registered under the same
    /// name.
    pub fn register(&mut self, td: &'static TypeDescriptor) -> Asn1Result<()> {
        if self.types.insert(td.name, td).is_some() {
            return Err(Asn1Error::Malformed(format!(
                "duplicate type registration '{}'",
                td.name
            )));
        }
        Ok(())
    }

    /// Look up a descriptor by name
    pub fn get(&self, name: &str) -> Option<&'static TypeDescriptor> {
        self.types.get(name).copied()
    }

    /// Resolve a type reference
    pub fn resolve(&self, r: TypeRef) -> Asn1Result<&'static TypeDescriptor> {
        match r {
            TypeRef::Static(td) => Ok(td),
            TypeRef::Named(name) => self.get(name).ok_or_else(|| {
                Asn1Error::Malformed(format!("unresolved type reference '{name}'"))
            }),
        }
    }

    /// Follow an alias chain to the structural descriptor
    ///
    /// Returns the first non-alias descriptor together with the
    /// outermost non-empty accepted tag set along the chain (an alias
    /// with its own tags shadows its target's).
    pub(crate) fn resolve_structural(
        &self,
        td: &'static TypeDescriptor,
    ) -> Asn1Result<(&'static TypeDescriptor, &'static [Tag])> {
        let mut current = td;
        let mut tags = td.tags;
        let mut depth = 0;
        while let Kind::Alias { target } = &current.kind {
            current = self.resolve(*target)?;
            if tags.is_empty() {
                tags = current.tags;
            }
            depth += 1;
            if depth > 32 {
                return Err(Asn1Error::Malformed(format!(
                    "alias chain too deep starting at '{}'",
                    td.name
                )));
            }
        }
        Ok((current, tags))
    }

    /// Verify that every reference reachable from the registered
    /// descriptors resolves
    ///
    /// Run once after registration; afterwards `resolve` cannot fail for
    /// descriptors decoded through this registry.
    pub fn verify(&self) -> Asn1Result<()> {
        let mut seen: HashSet<usize> = HashSet::new();
        let mut stack: Vec<&'static TypeDescriptor> = self.types.values().copied().collect();
        while let Some(td) = stack.pop() {
            if !seen.insert(td as *const TypeDescriptor as usize) {
                continue;
            }
            let mut visit = |r: TypeRef| -> Asn1Result<()> {
                stack.push(self.resolve(r)?);
                Ok(())
            };
            match &td.kind {
                Kind::Sequence { members, .. } | Kind::Choice {
                    alternatives: members,
                } => {
                    for m in members.iter() {
                        visit(m.ty)?;
                    }
                }
                Kind::SequenceOf { element, .. } => visit(*element)?,
                Kind::Alias { target } => visit(*target)?,
                Kind::Primitive(_) | Kind::Any => {}
            }
        }
        Ok(())
    }
}

/// Default outer tag implied by a structural kind, if any
pub(crate) fn kind_default_tag(kind: &Kind) -> Option<Tag> {
    match kind {
        Kind::Primitive(k) => Some(k.universal_tag()),
        Kind::Sequence { .. } => Some(Tag::universal(true, 16)),
        Kind::SequenceOf { sorted: false, .. } => Some(Tag::universal(true, 16)),
        Kind::SequenceOf { sorted: true, .. } => Some(Tag::universal(true, 17)),
        Kind::Choice { .. } | Kind::Alias { .. } | Kind::Any => None,
    }
}
