//! Descriptor-driven BER decoder
//!
//! The decoder walks a `TypeDescriptor` against a byte stream, dispatching
//! on the structural kind at every level: SEQUENCE members in declared
//! order with optional-skip, CHOICE alternatives by first tag match,
//! SEQUENCE OF / SET OF repetition until the enclosing length (or
//! end-of-contents marker) is exhausted, primitives through the leaf
//! codecs.
//!
//! # Resumability
//!
//! Input may arrive in arbitrary fragments. The `ParseContext` keeps a
//! stack of in-progress structural frames plus the not-yet-consumed tail
//! of the input; when the buffer runs dry mid-structure, `feed` returns
//! `DecodeStep::Pending` and the caller re-invokes it with more bytes.
//! Bytes are only consumed once the unit they belong to (a header, a
//! whole primitive TLV) is fully available, so a suspended decode never
//! needs to rewind. Completed nested values are never re-parsed; at most
//! the current incomplete header or primitive body is re-examined on
//! resume.
//!
//! No partial result is observable: the caller sees a `DecodedValue`
//! only when the whole top-level decode succeeds. Dropping a pending
//! context is the only teardown.
//!
//! # Error discipline
//!
//! Tag mismatches drive control flow (optional-skip, CHOICE selection)
//! as ordinary return values; they surface to the caller only when no
//! fallback applies. Constraint checking runs after structural
//! completion and reports on its own error channel.

use bytes::{Buf, Bytes, BytesMut};
use log::{debug, trace};

use crate::ber::primitives;
use crate::ber::types::{Length, Tag, TagClass};
use crate::constraint;
use crate::descriptor::{
    kind_default_tag, Kind, Member, Optionality, Registry, TagMode, TagOverride, TypeDescriptor,
};
use crate::error::{Asn1Error, Asn1Result};
use asn1rt_core::value::{DecodedValue, SequenceValue};

/// What to do with unknown trailing members of an extensible SEQUENCE
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtensionPolicy {
    /// Keep the raw TLVs so re-encoding reproduces them byte-for-byte
    Preserve,
    /// Skip and discard them
    Drop,
}

/// Per-decoder knobs
#[derive(Debug, Clone, Copy)]
pub struct DecodeOptions {
    pub extension_policy: ExtensionPolicy,
    /// Defensive bound on structural nesting
    pub max_depth: usize,
    /// Run the constraint engine after structural completion
    pub check_constraints: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            extension_policy: ExtensionPolicy::Preserve,
            max_depth: 32,
            check_constraints: true,
        }
    }
}

/// Outcome of one `feed` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeStep {
    /// The top-level value is complete; `consumed` counts every byte of
    /// it, trailing input (if any) stays buffered in the context
    Complete {
        value: DecodedValue,
        consumed: usize,
    },
    /// More input is needed; feed further bytes to continue
    Pending,
}

/// Resumable per-decode state
///
/// Owned by exactly one decode operation and never shared; all engine
/// state that survives a suspension lives here.
#[derive(Debug)]
pub struct ParseContext {
    root: &'static TypeDescriptor,
    buf: BytesMut,
    consumed: usize,
    frames: Vec<Frame>,
    finished: bool,
}

impl ParseContext {
    fn new(root: &'static TypeDescriptor) -> Self {
        Self {
            root,
            buf: BytesMut::new(),
            consumed: 0,
            frames: Vec::new(),
            finished: false,
        }
    }

    /// Total bytes consumed by the decode so far
    pub fn consumed(&self) -> usize {
        self.consumed
    }

    /// Bytes fed but not consumed (after completion: trailing input)
    pub fn buffered(&self) -> &[u8] {
        &self.buf
    }

    fn consume(&mut self, n: usize) {
        self.buf.advance(n);
        self.consumed += n;
    }

    fn take(&mut self, n: usize) -> Bytes {
        self.consumed += n;
        self.buf.split_to(n).freeze()
    }
}

/// Content bound of a structural frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bound {
    /// Absolute stream offset where the content ends
    Definite(usize),
    /// Content runs until an end-of-contents marker
    Indefinite,
    /// No header of its own (transparent CHOICE); the child defines the
    /// extent
    Inherited,
}

#[derive(Debug)]
struct Frame {
    end: Bound,
    /// Nearest enclosing definite end, for bounds enforcement
    limit: Option<usize>,
    kind: FrameKind,
}

#[derive(Debug)]
enum FrameKind {
    Sequence {
        td: &'static TypeDescriptor,
        members: &'static [Member],
        extensible: bool,
        index: usize,
        /// Member index awaiting a child frame's value
        pending: Option<usize>,
        values: Vec<Option<DecodedValue>>,
        extensions: Vec<Bytes>,
    },
    SequenceOf {
        td: &'static TypeDescriptor,
        element: crate::descriptor::TypeRef,
        items: Vec<DecodedValue>,
    },
    Choice {
        td: &'static TypeDescriptor,
        alternatives: &'static [Member],
        chosen: Option<&'static str>,
        inner: Option<DecodedValue>,
        /// True when the CHOICE consumed a wrapping header of its own
        tagged: bool,
    },
    Explicit {
        td: &'static TypeDescriptor,
        inner: Option<DecodedValue>,
    },
}

/// Result of opening one value at the current input position
enum Opened {
    Pending,
    Done(DecodedValue),
    Push(Frame),
}

/// One step of the frame machine
enum StepResult {
    Pending,
    Progress,
    Push(Frame),
    Complete(DecodedValue),
}

/// Descriptor-driven BER decoder
///
/// Holds only shared immutable state (registry and options); every
/// `decode`/`feed` call threads its own `ParseContext`, so one decoder
/// serves any number of concurrent decode operations.
pub struct Decoder<'a> {
    registry: &'a Registry,
    options: DecodeOptions,
}

impl<'a> Decoder<'a> {
    /// Create a decoder with default options
    pub fn new(registry: &'a Registry) -> Self {
        Self::with_options(registry, DecodeOptions::default())
    }

    pub fn with_options(registry: &'a Registry, options: DecodeOptions) -> Self {
        Self { registry, options }
    }

    /// Begin a resumable decode of one value of type `root`
    pub fn begin(&self, root: &'static TypeDescriptor) -> ParseContext {
        ParseContext::new(root)
    }

    /// Feed more input to a resumable decode
    ///
    /// # Returns
    /// `DecodeStep::Complete` once the top-level value is fully decoded,
    /// `DecodeStep::Pending` when more bytes are needed.
    ///
    /// # Error Handling
    /// Any error is fatal for this decode attempt; the context cannot be
    /// fed again afterwards.
    pub fn feed(&self, ctx: &mut ParseContext, chunk: &[u8]) -> Asn1Result<DecodeStep> {
        if ctx.finished {
            return Err(Asn1Error::Malformed(
                "parse context already completed".to_string(),
            ));
        }
        ctx.buf.extend_from_slice(chunk);
        let result = self.run(ctx);
        match &result {
            Ok(DecodeStep::Pending) => {}
            Ok(DecodeStep::Complete { .. }) | Err(_) => ctx.finished = true,
        }
        if self.options.check_constraints {
            if let Ok(DecodeStep::Complete { value, .. }) = &result {
                constraint::check(self.registry, ctx.root, value)?;
            }
        }
        result
    }

    /// One-shot decode of a complete in-memory buffer
    ///
    /// Trailing bytes after the outermost value are not an error; they
    /// are simply not consumed.
    pub fn decode(
        &self,
        td: &'static TypeDescriptor,
        input: &[u8],
    ) -> Asn1Result<DecodedValue> {
        let mut ctx = self.begin(td);
        match self.feed(&mut ctx, input)? {
            DecodeStep::Complete { value, .. } => Ok(value),
            DecodeStep::Pending => Err(Asn1Error::Truncated),
        }
    }

    fn run(&self, ctx: &mut ParseContext) -> Asn1Result<DecodeStep> {
        loop {
            let Some(mut frame) = ctx.frames.pop() else {
                // Open the root value
                let root = ctx.root;
                match self.open_value(ctx, root, None, None)? {
                    Opened::Done(value) => {
                        return Ok(DecodeStep::Complete {
                            value,
                            consumed: ctx.consumed,
                        });
                    }
                    Opened::Push(frame) => {
                        ctx.frames.push(frame);
                        continue;
                    }
                    Opened::Pending => return Ok(DecodeStep::Pending),
                }
            };
            match self.step_frame(ctx, &mut frame)? {
                StepResult::Pending => {
                    ctx.frames.push(frame);
                    return Ok(DecodeStep::Pending);
                }
                StepResult::Progress => ctx.frames.push(frame),
                StepResult::Push(child) => {
                    ctx.frames.push(frame);
                    ctx.frames.push(child);
                }
                StepResult::Complete(value) => {
                    if ctx.frames.is_empty() {
                        return Ok(DecodeStep::Complete {
                            value,
                            consumed: ctx.consumed,
                        });
                    }
                    self.deliver(ctx, value)?;
                }
            }
        }
    }

    /// Hand a completed child value to the frame that opened it
    fn deliver(&self, ctx: &mut ParseContext, value: DecodedValue) -> Asn1Result<()> {
        let Some(frame) = ctx.frames.last_mut() else {
            return Err(internal("no frame to deliver to"));
        };
        match &mut frame.kind {
            FrameKind::Sequence {
                pending, values, ..
            } => {
                let Some(j) = pending.take() else {
                    return Err(internal("sequence frame has no pending member"));
                };
                values[j] = Some(value);
            }
            FrameKind::SequenceOf { items, .. } => items.push(value),
            FrameKind::Choice { inner, .. } | FrameKind::Explicit { inner, .. } => {
                *inner = Some(value);
            }
        }
        Ok(())
    }

    fn step_frame(&self, ctx: &mut ParseContext, frame: &mut Frame) -> Asn1Result<StepResult> {
        match frame.kind {
            FrameKind::Sequence { .. } => self.step_sequence(ctx, frame),
            FrameKind::SequenceOf { .. } => self.step_sequence_of(ctx, frame),
            FrameKind::Choice { .. } => self.step_choice(ctx, frame),
            FrameKind::Explicit { .. } => self.step_explicit(ctx, frame),
        }
    }

    fn step_sequence(&self, ctx: &mut ParseContext, frame: &mut Frame) -> Asn1Result<StepResult> {
        let end = frame.end;
        let limit = frame.limit;
        let FrameKind::Sequence {
            td,
            members,
            extensible,
            index,
            pending,
            values,
            extensions,
        } = &mut frame.kind
        else {
            return Err(internal("expected sequence frame"));
        };
        let td = *td;
        let members = *members;
        let extensible = *extensible;
        debug_assert!(pending.is_none(), "stepped with child in flight");

        if *index < members.len() {
            match self.at_end(ctx, end, limit)? {
                None => return Ok(StepResult::Pending),
                Some(true) => {
                    // Content exhausted: remaining members must be absent
                    for k in *index..members.len() {
                        values[k] = self.absent_member(td.name, &members[k])?;
                    }
                    *index = members.len();
                    return Ok(StepResult::Progress);
                }
                Some(false) => {}
            }
            let Some((tag, length, _)) = self.peek_header(ctx)? else {
                return Ok(StepResult::Pending);
            };
            if is_eoc(tag, length) {
                return Err(Asn1Error::Malformed(format!(
                    "unexpected end-of-contents in {}",
                    td.name
                )));
            }

            // First member the tag can start; intervening members are
            // skippable only if optional
            let mut matched = None;
            for k in *index..members.len() {
                if self.member_accepts(tag, &members[k], 0)? {
                    matched = Some(k);
                    break;
                }
                if members[k].is_required() {
                    return Err(Asn1Error::Malformed(format!(
                        "{}: missing mandatory member '{}'",
                        td.name, members[k].name
                    )));
                }
            }
            let Some(j) = matched else {
                // Nothing matches and no required member remains; the
                // tail handler deals with this tag
                for k in *index..members.len() {
                    values[k] = self.absent_member(td.name, &members[k])?;
                }
                *index = members.len();
                return Ok(StepResult::Progress);
            };
            for k in *index..j {
                trace!("{}: optional member '{}' absent", td.name, members[k].name);
                values[k] = self.absent_member(td.name, &members[k])?;
            }

            let member = &members[j];
            let member_td = self.registry.resolve(member.ty)?;
            match self.open_value(ctx, member_td, member.tag, limit)? {
                Opened::Done(v) => {
                    values[j] = Some(v);
                    *index = j + 1;
                    Ok(StepResult::Progress)
                }
                Opened::Push(child) => {
                    *pending = Some(j);
                    *index = j + 1;
                    Ok(StepResult::Push(child))
                }
                Opened::Pending => Ok(StepResult::Pending),
            }
        } else {
            // All declared members handled; deal with the tail
            match self.at_end(ctx, end, limit)? {
                None => Ok(StepResult::Pending),
                Some(true) => {
                    if end == Bound::Indefinite {
                        ctx.consume(2);
                    }
                    let members_out = members
                        .iter()
                        .zip(values.drain(..))
                        .map(|(m, v)| (m.name, v))
                        .collect();
                    Ok(StepResult::Complete(DecodedValue::Sequence(
                        SequenceValue {
                            members: members_out,
                            extensions: std::mem::take(extensions),
                        },
                    )))
                }
                Some(false) => {
                    if !extensible {
                        return Err(Asn1Error::Malformed(format!(
                            "unexpected trailing data in {}",
                            td.name
                        )));
                    }
                    match self.take_tlv(ctx, limit)? {
                        None => Ok(StepResult::Pending),
                        Some(tlv) => {
                            debug!(
                                "{}: unknown extension element ({} bytes)",
                                td.name,
                                tlv.len()
                            );
                            if self.options.extension_policy == ExtensionPolicy::Preserve {
                                extensions.push(tlv);
                            }
                            Ok(StepResult::Progress)
                        }
                    }
                }
            }
        }
    }

    fn step_sequence_of(
        &self,
        ctx: &mut ParseContext,
        frame: &mut Frame,
    ) -> Asn1Result<StepResult> {
        let end = frame.end;
        let limit = frame.limit;
        let FrameKind::SequenceOf { td, element, items } = &mut frame.kind else {
            return Err(internal("expected sequence-of frame"));
        };
        let td = *td;
        let element = *element;

        match self.at_end(ctx, end, limit)? {
            None => return Ok(StepResult::Pending),
            Some(true) => {
                if end == Bound::Indefinite {
                    ctx.consume(2);
                }
                return Ok(StepResult::Complete(DecodedValue::SequenceOf(
                    std::mem::take(items),
                )));
            }
            Some(false) => {}
        }

        let element_td = self.registry.resolve(element)?;
        let Some((tag, length, _)) = self.peek_header(ctx)? else {
            return Ok(StepResult::Pending);
        };
        if is_eoc(tag, length) {
            return Err(Asn1Error::Malformed(format!(
                "unexpected end-of-contents in {}",
                td.name
            )));
        }
        if !self.type_accepts(tag, element_td, 0)? {
            return Err(Asn1Error::Malformed(format!(
                "malformed repetition in {}: tag {} does not start {}",
                td.name, tag, element_td.name
            )));
        }
        match self.open_value(ctx, element_td, None, limit)? {
            Opened::Done(v) => {
                items.push(v);
                Ok(StepResult::Progress)
            }
            Opened::Push(child) => Ok(StepResult::Push(child)),
            Opened::Pending => Ok(StepResult::Pending),
        }
    }

    fn step_choice(&self, ctx: &mut ParseContext, frame: &mut Frame) -> Asn1Result<StepResult> {
        let end = frame.end;
        let limit = frame.limit;
        let FrameKind::Choice {
            td,
            alternatives,
            chosen,
            inner,
            tagged,
        } = &mut frame.kind
        else {
            return Err(internal("expected choice frame"));
        };
        let td = *td;
        let alternatives = *alternatives;
        let tagged = *tagged;

        if inner.is_some() {
            // Alternative decoded; for a tagged CHOICE the wrapper must
            // be exactly exhausted
            if tagged {
                match self.at_end(ctx, end, limit)? {
                    None => return Ok(StepResult::Pending),
                    Some(true) => {
                        if end == Bound::Indefinite {
                            ctx.consume(2);
                        }
                    }
                    Some(false) => {
                        return Err(Asn1Error::Malformed(format!(
                            "trailing data inside {}",
                            td.name
                        )));
                    }
                }
            }
            let Some(alternative) = *chosen else {
                return Err(internal("choice value without selected alternative"));
            };
            let Some(value) = inner.take() else {
                return Err(internal("choice inner value missing"));
            };
            return Ok(StepResult::Complete(DecodedValue::Choice {
                alternative,
                value: Box::new(value),
            }));
        }

        if tagged {
            match self.at_end(ctx, end, limit)? {
                None => return Ok(StepResult::Pending),
                Some(true) => {
                    return Err(Asn1Error::Malformed(format!(
                        "{}: empty CHOICE content",
                        td.name
                    )));
                }
                Some(false) => {}
            }
        }
        let Some((tag, length, _)) = self.peek_header(ctx)? else {
            return Ok(StepResult::Pending);
        };
        if is_eoc(tag, length) {
            return Err(Asn1Error::Malformed(format!(
                "unexpected end-of-contents in {}",
                td.name
            )));
        }

        // First matching alternative wins, in declaration order
        let mut selected = None;
        for alt in alternatives.iter() {
            if self.member_accepts(tag, alt, 0)? {
                selected = Some(alt);
                break;
            }
        }
        let Some(alt) = selected else {
            return Err(Asn1Error::TagMismatch {
                expected: format!("an alternative of {}", td.name),
                found: tag.to_string(),
            });
        };
        trace!("{}: selected alternative '{}'", td.name, alt.name);
        let alt_td = self.registry.resolve(alt.ty)?;
        match self.open_value(ctx, alt_td, alt.tag, limit)? {
            Opened::Done(v) => {
                *chosen = Some(alt.name);
                *inner = Some(v);
                Ok(StepResult::Progress)
            }
            Opened::Push(child) => {
                *chosen = Some(alt.name);
                Ok(StepResult::Push(child))
            }
            Opened::Pending => Ok(StepResult::Pending),
        }
    }

    fn step_explicit(&self, ctx: &mut ParseContext, frame: &mut Frame) -> Asn1Result<StepResult> {
        let end = frame.end;
        let limit = frame.limit;
        let FrameKind::Explicit { td, inner } = &mut frame.kind else {
            return Err(internal("expected explicit frame"));
        };
        let td = *td;

        if inner.is_none() {
            return match self.open_value(ctx, td, None, limit)? {
                Opened::Done(v) => {
                    *inner = Some(v);
                    Ok(StepResult::Progress)
                }
                Opened::Push(child) => Ok(StepResult::Push(child)),
                Opened::Pending => Ok(StepResult::Pending),
            };
        }
        match self.at_end(ctx, end, limit)? {
            None => Ok(StepResult::Pending),
            Some(true) => {
                if end == Bound::Indefinite {
                    ctx.consume(2);
                }
                let Some(value) = inner.take() else {
                    return Err(internal("explicit inner value missing"));
                };
                Ok(StepResult::Complete(value))
            }
            Some(false) => Err(Asn1Error::Malformed(format!(
                "trailing data inside explicit tag of {}",
                td.name
            ))),
        }
    }

    /// Open one value of type `td` at the current position
    ///
    /// Consumes bytes only when the decision is final: a primitive is
    /// consumed whole once fully buffered, a constructed header is
    /// consumed when its frame is pushed. Returning `Pending` leaves the
    /// context untouched, which is what makes resumption a plain re-call.
    fn open_value(
        &self,
        ctx: &mut ParseContext,
        td: &'static TypeDescriptor,
        ovr: Option<TagOverride>,
        limit: Option<usize>,
    ) -> Asn1Result<Opened> {
        if ctx.frames.len() >= self.options.max_depth {
            return Err(Asn1Error::Malformed(format!(
                "nesting deeper than {} levels",
                self.options.max_depth
            )));
        }

        if let Some(o) = ovr {
            if o.mode == TagMode::Explicit {
                let Some((tag, length, header_len)) = self.peek_header(ctx)? else {
                    return Ok(Opened::Pending);
                };
                if !tag.matches(o.tag) {
                    return Err(Asn1Error::TagMismatch {
                        expected: o.tag.to_string(),
                        found: tag.to_string(),
                    });
                }
                if !tag.is_constructed() {
                    return Err(Asn1Error::Malformed(format!(
                        "EXPLICIT tag {tag} must be constructed"
                    )));
                }
                let (end, child_limit) = self.begin_constructed(ctx, length, header_len, limit)?;
                return Ok(Opened::Push(Frame {
                    end,
                    limit: child_limit,
                    kind: FrameKind::Explicit { td, inner: None },
                }));
            }
        }

        let (actual, own_tags) = self.registry.resolve_structural(td)?;
        let implicit = ovr.map(|o| o.tag);

        if let Kind::Any = actual.kind {
            return match self.take_tlv(ctx, limit)? {
                Some(bytes) => Ok(Opened::Done(DecodedValue::Raw(bytes))),
                None => Ok(Opened::Pending),
            };
        }

        // An untagged CHOICE is transparent at the tag level
        if let Kind::Choice { alternatives } = &actual.kind {
            if implicit.is_none() && own_tags.is_empty() {
                return Ok(Opened::Push(Frame {
                    end: Bound::Inherited,
                    limit,
                    kind: FrameKind::Choice {
                        td: actual,
                        alternatives,
                        chosen: None,
                        inner: None,
                        tagged: false,
                    },
                }));
            }
        }

        let Some((tag, length, header_len)) = self.peek_header(ctx)? else {
            return Ok(Opened::Pending);
        };
        let accepted = match implicit {
            Some(t) => tag.matches(t),
            None if !own_tags.is_empty() => own_tags.iter().any(|t| tag.matches(*t)),
            None => kind_default_tag(&actual.kind).is_some_and(|t| tag.matches(t)),
        };
        if !accepted {
            return Err(Asn1Error::TagMismatch {
                expected: format!("tag of {}", actual.name),
                found: tag.to_string(),
            });
        }

        match &actual.kind {
            Kind::Primitive(kind) => {
                if tag.is_constructed() {
                    return Err(Asn1Error::Malformed(format!(
                        "constructed encoding of {} is not supported",
                        actual.name
                    )));
                }
                let Length::Definite(content_len) = length else {
                    return Err(Asn1Error::Malformed(format!(
                        "indefinite length on primitive {}",
                        actual.name
                    )));
                };
                let total = header_len + content_len;
                self.check_limit(ctx, total, limit)?;
                if ctx.buf.len() < total {
                    return Ok(Opened::Pending);
                }
                ctx.consume(header_len);
                let content = ctx.take(content_len);
                let value = primitives::decode_content(*kind, &content)?;
                Ok(Opened::Done(DecodedValue::Primitive(value)))
            }
            Kind::Sequence {
                members,
                extensible,
            } => {
                self.require_constructed(tag, actual.name)?;
                let (end, child_limit) = self.begin_constructed(ctx, length, header_len, limit)?;
                Ok(Opened::Push(Frame {
                    end,
                    limit: child_limit,
                    kind: FrameKind::Sequence {
                        td: actual,
                        members,
                        extensible: *extensible,
                        index: 0,
                        pending: None,
                        values: (0..members.len()).map(|_| None).collect(),
                        extensions: Vec::new(),
                    },
                }))
            }
            Kind::SequenceOf { element, .. } => {
                self.require_constructed(tag, actual.name)?;
                let (end, child_limit) = self.begin_constructed(ctx, length, header_len, limit)?;
                Ok(Opened::Push(Frame {
                    end,
                    limit: child_limit,
                    kind: FrameKind::SequenceOf {
                        td: actual,
                        element: *element,
                        items: Vec::new(),
                    },
                }))
            }
            Kind::Choice { alternatives } => {
                // Tagged CHOICE: the tag wraps the selected alternative
                self.require_constructed(tag, actual.name)?;
                let (end, child_limit) = self.begin_constructed(ctx, length, header_len, limit)?;
                Ok(Opened::Push(Frame {
                    end,
                    limit: child_limit,
                    kind: FrameKind::Choice {
                        td: actual,
                        alternatives,
                        chosen: None,
                        inner: None,
                        tagged: true,
                    },
                }))
            }
            Kind::Alias { .. } | Kind::Any => Err(internal("unresolved kind after resolution")),
        }
    }

    fn require_constructed(&self, tag: Tag, name: &str) -> Asn1Result<()> {
        if !tag.is_constructed() {
            return Err(Asn1Error::Malformed(format!(
                "{name} must use constructed encoding"
            )));
        }
        Ok(())
    }

    /// Consume a constructed header and compute the frame bounds
    fn begin_constructed(
        &self,
        ctx: &mut ParseContext,
        length: Length,
        header_len: usize,
        limit: Option<usize>,
    ) -> Asn1Result<(Bound, Option<usize>)> {
        match length {
            Length::Definite(n) => {
                self.check_limit(ctx, header_len + n, limit)?;
                ctx.consume(header_len);
                let end = ctx.consumed + n;
                Ok((Bound::Definite(end), Some(end)))
            }
            Length::Indefinite => {
                self.check_limit(ctx, header_len, limit)?;
                ctx.consume(header_len);
                Ok((Bound::Indefinite, limit))
            }
        }
    }

    fn check_limit(&self, ctx: &ParseContext, total: usize, limit: Option<usize>) -> Asn1Result<()> {
        if let Some(l) = limit {
            if ctx.consumed + total > l {
                return Err(Asn1Error::Malformed(
                    "element extends beyond its enclosing length".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Has the frame's content been exhausted?
    ///
    /// `None` means more bytes are needed to tell (indefinite form with
    /// a partially buffered end-of-contents marker).
    fn at_end(
        &self,
        ctx: &ParseContext,
        end: Bound,
        limit: Option<usize>,
    ) -> Asn1Result<Option<bool>> {
        match end {
            Bound::Definite(e) => Ok(Some(ctx.consumed >= e)),
            Bound::Inherited => Ok(Some(false)),
            Bound::Indefinite => {
                let Some(&first) = ctx.buf.first() else {
                    return Ok(None);
                };
                if first != 0x00 {
                    return Ok(Some(false));
                }
                if let Some(l) = limit {
                    if ctx.consumed + 2 > l {
                        return Err(Asn1Error::Malformed(
                            "end-of-contents exceeds enclosing length".to_string(),
                        ));
                    }
                }
                let Some(&second) = ctx.buf.get(1) else {
                    return Ok(None);
                };
                if second != 0x00 {
                    return Err(Asn1Error::Malformed(
                        "invalid end-of-contents marker".to_string(),
                    ));
                }
                Ok(Some(true))
            }
        }
    }

    /// Decode tag and length octets without consuming anything
    fn peek_header(&self, ctx: &ParseContext) -> Asn1Result<Option<(Tag, Length, usize)>> {
        let (tag, tag_len) = match Tag::decode(&ctx.buf) {
            Ok(t) => t,
            Err(Asn1Error::Truncated) => return Ok(None),
            Err(e) => return Err(e),
        };
        match Length::decode(&ctx.buf[tag_len..]) {
            Ok((length, len_len)) => Ok(Some((tag, length, tag_len + len_len))),
            Err(Asn1Error::Truncated) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Consume one complete TLV verbatim once it is fully buffered
    fn take_tlv(&self, ctx: &mut ParseContext, limit: Option<usize>) -> Asn1Result<Option<Bytes>> {
        let Some(total) = self.measure_tlv(&ctx.buf, 0, 0)? else {
            return Ok(None);
        };
        self.check_limit(ctx, total, limit)?;
        if ctx.buf.len() < total {
            return Ok(None);
        }
        Ok(Some(ctx.take(total)))
    }

    /// Total size of the TLV starting at `offset`, scanning nested
    /// indefinite forms for their end-of-contents markers
    fn measure_tlv(&self, buf: &[u8], offset: usize, depth: usize) -> Asn1Result<Option<usize>> {
        if depth >= self.options.max_depth {
            return Err(Asn1Error::Malformed(format!(
                "nesting deeper than {} levels",
                self.options.max_depth
            )));
        }
        let data = &buf[offset.min(buf.len())..];
        let (tag, tag_len) = match Tag::decode(data) {
            Ok(t) => t,
            Err(Asn1Error::Truncated) => return Ok(None),
            Err(e) => return Err(e),
        };
        let (length, len_len) = match Length::decode(&data[tag_len..]) {
            Ok(l) => l,
            Err(Asn1Error::Truncated) => return Ok(None),
            Err(e) => return Err(e),
        };
        let header = tag_len + len_len;
        match length {
            Length::Definite(n) => Ok(Some(header + n)),
            Length::Indefinite => {
                if !tag.is_constructed() {
                    return Err(Asn1Error::Malformed(
                        "indefinite length on a primitive tag".to_string(),
                    ));
                }
                let mut cursor = offset + header;
                loop {
                    let Some(&first) = buf.get(cursor) else {
                        return Ok(None);
                    };
                    if first == 0x00 {
                        let Some(&second) = buf.get(cursor + 1) else {
                            return Ok(None);
                        };
                        if second != 0x00 {
                            return Err(Asn1Error::Malformed(
                                "invalid end-of-contents marker".to_string(),
                            ));
                        }
                        return Ok(Some(cursor + 2 - offset));
                    }
                    match self.measure_tlv(buf, cursor, depth + 1)? {
                        Some(n) => cursor += n,
                        None => return Ok(None),
                    }
                }
            }
        }
    }

    /// Can `tag` start a value of this member?
    fn member_accepts(&self, tag: Tag, member: &Member, depth: usize) -> Asn1Result<bool> {
        if let Some(o) = member.tag {
            return Ok(tag.matches(o.tag));
        }
        let td = self.registry.resolve(member.ty)?;
        self.type_accepts(tag, td, depth)
    }

    /// Can `tag` start a value of this type?
    ///
    /// For untagged CHOICE the accepted set is the union over the
    /// alternatives, computed recursively; ANY accepts every tag.
    fn type_accepts(&self, tag: Tag, td: &'static TypeDescriptor, depth: usize) -> Asn1Result<bool> {
        if depth > 16 {
            return Err(Asn1Error::Malformed(format!(
                "tag resolution too deep at {}",
                td.name
            )));
        }
        let (actual, tags) = self.registry.resolve_structural(td)?;
        if !tags.is_empty() {
            return Ok(tags.iter().any(|t| tag.matches(*t)));
        }
        match &actual.kind {
            Kind::Any => Ok(true),
            Kind::Choice { alternatives } => {
                for alt in alternatives.iter() {
                    if self.member_accepts(tag, alt, depth + 1)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            kind => Ok(kind_default_tag(kind).is_some_and(|t| tag.matches(t))),
        }
    }

    fn absent_member(
        &self,
        sequence: &'static str,
        member: &Member,
    ) -> Asn1Result<Option<DecodedValue>> {
        match member.optionality {
            Optionality::Required => Err(Asn1Error::Malformed(format!(
                "{sequence}: missing mandatory member '{}'",
                member.name
            ))),
            Optionality::Optional => Ok(None),
            Optionality::Default(bytes) => Ok(Some(self.decode_default(member, bytes)?)),
        }
    }

    /// Materialize a DEFAULT value from its stored bare DER encoding
    fn decode_default(&self, member: &Member, bytes: &'static [u8]) -> Asn1Result<DecodedValue> {
        let td = self.registry.resolve(member.ty)?;
        let sub = Decoder::with_options(
            self.registry,
            DecodeOptions {
                check_constraints: false,
                ..self.options
            },
        );
        sub.decode(td, bytes).map_err(|e| {
            Asn1Error::Malformed(format!(
                "invalid DEFAULT encoding for member '{}': {e}",
                member.name
            ))
        })
    }
}

fn is_eoc(tag: Tag, length: Length) -> bool {
    tag.class() == TagClass::Universal
        && !tag.is_constructed()
        && tag.number() == 0
        && length == Length::Definite(0)
}

fn internal(message: &str) -> Asn1Error {
    Asn1Error::Malformed(format!("internal decoder error: {message}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins;
    use crate::descriptor::TypeRef;
    use asn1rt_core::value::{Int, PrimitiveValue};

    // SEQUENCE { a INTEGER, b [0] IMPLICIT INTEGER OPTIONAL, c OCTET STRING }
    static REC: TypeDescriptor = TypeDescriptor {
        name: "Rec",
        tags: &[Tag::universal(true, 16)],
        kind: Kind::Sequence {
            members: &[
                Member::required("a", TypeRef::Static(&builtins::INTEGER)),
                Member::optional("b", TypeRef::Static(&builtins::INTEGER))
                    .tagged(TagOverride::implicit(Tag::context_specific(false, 0))),
                Member::required("c", TypeRef::Static(&builtins::OCTET_STRING)),
            ],
            extensible: false,
        },
        constraint: None,
    };

    // CHOICE { num INTEGER, text IA5String }
    static NUM_OR_TEXT: TypeDescriptor = TypeDescriptor {
        name: "NumOrText",
        tags: &[],
        kind: Kind::Choice {
            alternatives: &[
                Member::required("num", TypeRef::Static(&builtins::INTEGER)),
                Member::required("text", TypeRef::Static(&builtins::IA5_STRING)),
            ],
        },
        constraint: None,
    };

    fn int_value(v: i64) -> DecodedValue {
        DecodedValue::Primitive(PrimitiveValue::Integer(Int::from_i64(v)))
    }

    fn decode_one(td: &'static TypeDescriptor, input: &[u8]) -> Asn1Result<DecodedValue> {
        let reg = Registry::new();
        Decoder::new(&reg).decode(td, input)
    }

    #[test]
    fn test_sequence_all_members_present() {
        // SEQUENCE { a = 5, b = 7, c = "hi" }
        let input = [
            0x30, 0x0A, 0x02, 0x01, 0x05, 0x80, 0x01, 0x07, 0x04, 0x02, b'h', b'i',
        ];
        let value = decode_one(&REC, &input).unwrap();
        let sv = value.as_sequence().unwrap();
        assert_eq!(sv.member("a"), Some(&int_value(5)));
        assert_eq!(sv.member("b"), Some(&int_value(7)));
        assert!(sv.member("c").is_some());
    }

    #[test]
    fn test_sequence_optional_skip() {
        // a and c present, b absent: must decode with b = None
        let input = [0x30, 0x07, 0x02, 0x01, 0x05, 0x04, 0x02, b'h', b'i'];
        let value = decode_one(&REC, &input).unwrap();
        let sv = value.as_sequence().unwrap();
        assert_eq!(sv.member("a"), Some(&int_value(5)));
        assert_eq!(sv.members[1], ("b", None));
        assert!(sv.member("c").is_some());
    }

    #[test]
    fn test_sequence_missing_mandatory() {
        // Only a present; required c missing
        let input = [0x30, 0x03, 0x02, 0x01, 0x05];
        let err = decode_one(&REC, &input).unwrap_err();
        let Asn1Error::Malformed(msg) = err else {
            panic!("expected malformed, got {err:?}")
        };
        assert!(msg.contains("'c'"), "unexpected message: {msg}");
    }

    #[test]
    fn test_sequence_trailing_garbage_rejected() {
        // Well-formed members plus an unknown trailing element in a
        // non-extensible SEQUENCE
        let input = [
            0x30, 0x0A, 0x02, 0x01, 0x05, 0x04, 0x02, b'h', b'i', 0x81, 0x01, 0x00,
        ];
        assert!(matches!(
            decode_one(&REC, &input),
            Err(Asn1Error::Malformed(_))
        ));
    }

    #[test]
    fn test_trailing_bytes_after_root_are_callers_concern() {
        let input = [
            0x30, 0x07, 0x02, 0x01, 0x05, 0x04, 0x02, b'h', b'i', // Rec
            0xDE, 0xAD, // unrelated trailing bytes
        ];
        let reg = Registry::new();
        let decoder = Decoder::new(&reg);
        let mut ctx = decoder.begin(&REC);
        let step = decoder.feed(&mut ctx, &input).unwrap();
        let DecodeStep::Complete { consumed, .. } = step else {
            panic!("expected completion")
        };
        assert_eq!(consumed, 9);
        assert_eq!(ctx.buffered(), &[0xDE, 0xAD]);
    }

    #[test]
    fn test_choice_dispatch_and_exclusivity() {
        let value = decode_one(&NUM_OR_TEXT, &[0x02, 0x01, 0x2A]).unwrap();
        let DecodedValue::Choice { alternative, value } = value else {
            panic!("expected choice")
        };
        assert_eq!(alternative, "num");
        assert_eq!(*value, int_value(42));

        let value = decode_one(&NUM_OR_TEXT, &[0x16, 0x02, b'o', b'k']).unwrap();
        let DecodedValue::Choice { alternative, .. } = value else {
            panic!("expected choice")
        };
        assert_eq!(alternative, "text");
    }

    #[test]
    fn test_choice_no_matching_alternative() {
        // BOOLEAN tag matches neither alternative
        let err = decode_one(&NUM_OR_TEXT, &[0x01, 0x01, 0xFF]).unwrap_err();
        assert!(matches!(err, Asn1Error::TagMismatch { .. }));
    }

    #[test]
    fn test_resumable_split_at_every_offset() {
        let input = [
            0x30, 0x0A, 0x02, 0x01, 0x05, 0x80, 0x01, 0x07, 0x04, 0x02, b'h', b'i',
        ];
        let reg = Registry::new();
        let decoder = Decoder::new(&reg);
        let whole = decoder.decode(&REC, &input).unwrap();

        for split in 0..=input.len() {
            let mut ctx = decoder.begin(&REC);
            let first = decoder.feed(&mut ctx, &input[..split]).unwrap();
            let value = match first {
                DecodeStep::Complete { value, .. } => value,
                DecodeStep::Pending => {
                    match decoder.feed(&mut ctx, &input[split..]).unwrap() {
                        DecodeStep::Complete { value, .. } => value,
                        DecodeStep::Pending => panic!("still pending at split {split}"),
                    }
                }
            };
            assert_eq!(value, whole, "split at {split}");
        }
    }

    #[test]
    fn test_resumable_byte_at_a_time() {
        let input = [0x30, 0x07, 0x02, 0x01, 0x05, 0x04, 0x02, b'h', b'i'];
        let reg = Registry::new();
        let decoder = Decoder::new(&reg);
        let mut ctx = decoder.begin(&REC);
        let mut done = None;
        for (i, byte) in input.iter().enumerate() {
            match decoder.feed(&mut ctx, std::slice::from_ref(byte)).unwrap() {
                DecodeStep::Complete { value, .. } => {
                    assert_eq!(i, input.len() - 1);
                    done = Some(value);
                }
                DecodeStep::Pending => assert!(i < input.len() - 1),
            }
        }
        assert_eq!(done.unwrap(), decoder.decode(&REC, &input).unwrap());
    }

    #[test]
    fn test_indefinite_length_sequence() {
        // Same Rec content under an indefinite-length wrapper
        let input = [
            0x30, 0x80, 0x02, 0x01, 0x05, 0x04, 0x02, b'h', b'i', 0x00, 0x00,
        ];
        let value = decode_one(&REC, &input).unwrap();
        let sv = value.as_sequence().unwrap();
        assert_eq!(sv.member("a"), Some(&int_value(5)));
        assert_eq!(sv.members[1], ("b", None));
    }

    #[test]
    fn test_indefinite_requires_constructed() {
        // Indefinite length on a primitive INTEGER
        let err = decode_one(&builtins::INTEGER, &[0x02, 0x80, 0x00, 0x00]).unwrap_err();
        assert!(matches!(err, Asn1Error::Malformed(_)));
    }

    #[test]
    fn test_nested_indefinite_extension_skip() {
        static OPEN_REC: TypeDescriptor = TypeDescriptor {
            name: "OpenRec",
            tags: &[Tag::universal(true, 16)],
            kind: Kind::Sequence {
                members: &[Member::required("a", TypeRef::Static(&builtins::INTEGER))],
                extensible: true,
            },
            constraint: None,
        };
        // Unknown [1] extension with nested indefinite lengths
        let input = [
            0x30, 0x80, // SEQUENCE, indefinite
            0x02, 0x01, 0x05, // a = 5
            0xA1, 0x80, 0xA2, 0x80, 0x00, 0x00, 0x00, 0x00, // [1] { [2] {} }
            0x00, 0x00, // end of SEQUENCE
        ];
        let value = decode_one(&OPEN_REC, &input).unwrap();
        let sv = value.as_sequence().unwrap();
        assert_eq!(sv.extensions.len(), 1);
        assert_eq!(&sv.extensions[0][..], &input[5..13]);
    }

    #[test]
    fn test_extension_policy_drop() {
        static OPEN_REC: TypeDescriptor = TypeDescriptor {
            name: "OpenRec2",
            tags: &[Tag::universal(true, 16)],
            kind: Kind::Sequence {
                members: &[Member::required("a", TypeRef::Static(&builtins::INTEGER))],
                extensible: true,
            },
            constraint: None,
        };
        let input = [0x30, 0x06, 0x02, 0x01, 0x05, 0x81, 0x01, 0x00];
        let reg = Registry::new();
        let decoder = Decoder::with_options(
            &reg,
            DecodeOptions {
                extension_policy: ExtensionPolicy::Drop,
                ..DecodeOptions::default()
            },
        );
        let value = decoder.decode(&OPEN_REC, &input).unwrap();
        assert!(value.as_sequence().unwrap().extensions.is_empty());
    }

    #[test]
    fn test_explicit_tag_wrapping() {
        static WRAPPED: TypeDescriptor = TypeDescriptor {
            name: "Wrapped",
            tags: &[Tag::universal(true, 16)],
            kind: Kind::Sequence {
                members: &[Member::required("v", TypeRef::Static(&builtins::INTEGER))
                    .tagged(TagOverride::explicit(Tag::context_specific(true, 3)))],
                extensible: false,
            },
            constraint: None,
        };
        let input = [0x30, 0x05, 0xA3, 0x03, 0x02, 0x01, 0x2A];
        let value = decode_one(&WRAPPED, &input).unwrap();
        assert_eq!(value.as_sequence().unwrap().member("v"), Some(&int_value(42)));

        // Extra bytes inside the explicit wrapper are malformed
        let bad = [0x30, 0x08, 0xA3, 0x06, 0x02, 0x01, 0x2A, 0x02, 0x01, 0x00];
        assert!(matches!(
            decode_one(&WRAPPED, &bad),
            Err(Asn1Error::Malformed(_))
        ));
    }

    #[test]
    fn test_default_member_materialized() {
        static DEFAULTED: TypeDescriptor = TypeDescriptor {
            name: "Defaulted",
            tags: &[Tag::universal(true, 16)],
            kind: Kind::Sequence {
                members: &[
                    Member::required("a", TypeRef::Static(&builtins::INTEGER)),
                    Member::defaulted("min", TypeRef::Static(&builtins::INTEGER), &[0x02, 0x01, 0x00])
                        .tagged(TagOverride::implicit(Tag::context_specific(false, 0))),
                ],
                extensible: false,
            },
            constraint: None,
        };
        let input = [0x30, 0x03, 0x02, 0x01, 0x05];
        let value = decode_one(&DEFAULTED, &input).unwrap();
        assert_eq!(
            value.as_sequence().unwrap().member("min"),
            Some(&int_value(0))
        );
    }

    #[test]
    fn test_sequence_of_elements() {
        static INTS: TypeDescriptor = TypeDescriptor {
            name: "Ints",
            tags: &[Tag::universal(true, 16)],
            kind: Kind::SequenceOf {
                element: TypeRef::Static(&builtins::INTEGER),
                sorted: false,
            },
            constraint: None,
        };
        let input = [0x30, 0x06, 0x02, 0x01, 0x01, 0x02, 0x01, 0x02];
        let value = decode_one(&INTS, &input).unwrap();
        assert_eq!(
            value,
            DecodedValue::SequenceOf(vec![int_value(1), int_value(2)])
        );

        // Empty repetition is structurally valid
        let value = decode_one(&INTS, &[0x30, 0x00]).unwrap();
        assert_eq!(value, DecodedValue::SequenceOf(vec![]));
    }

    #[test]
    fn test_sequence_of_malformed_repetition() {
        static INTS: TypeDescriptor = TypeDescriptor {
            name: "Ints2",
            tags: &[Tag::universal(true, 16)],
            kind: Kind::SequenceOf {
                element: TypeRef::Static(&builtins::INTEGER),
                sorted: false,
            },
            constraint: None,
        };
        // Second element has an OCTET STRING tag
        let input = [0x30, 0x06, 0x02, 0x01, 0x01, 0x04, 0x01, 0x00];
        let err = decode_one(&INTS, &input).unwrap_err();
        let Asn1Error::Malformed(msg) = err else {
            panic!("expected malformed")
        };
        assert!(msg.contains("repetition"), "unexpected message: {msg}");
    }

    #[test]
    fn test_element_overrunning_enclosing_length() {
        // Inner INTEGER claims 4 content bytes but the SEQUENCE ends
        // after 3
        let input = [0x30, 0x03, 0x02, 0x04, 0x00, 0x00, 0x00, 0x00];
        assert!(matches!(
            decode_one(&REC, &input),
            Err(Asn1Error::Malformed(_))
        ));
    }

    #[test]
    fn test_depth_limit() {
        static DEEP: TypeDescriptor = TypeDescriptor {
            name: "Deep",
            tags: &[Tag::universal(true, 16)],
            kind: Kind::SequenceOf {
                element: TypeRef::Named("Deep"),
                sorted: false,
            },
            constraint: None,
        };
        let mut reg = Registry::new();
        reg.register(&DEEP).unwrap();
        let decoder = Decoder::with_options(
            &reg,
            DecodeOptions {
                max_depth: 4,
                ..DecodeOptions::default()
            },
        );
        // 6 nested SEQUENCEs
        let mut input = vec![0x30, 0x00];
        for _ in 0..5 {
            let mut outer = vec![0x30, input.len() as u8];
            outer.extend_from_slice(&input);
            input = outer;
        }
        assert!(matches!(
            decoder.decode(&DEEP, &input),
            Err(Asn1Error::Malformed(_))
        ));
    }

    #[test]
    fn test_context_rejects_feed_after_completion() {
        let reg = Registry::new();
        let decoder = Decoder::new(&reg);
        let mut ctx = decoder.begin(&builtins::INTEGER);
        let step = decoder.feed(&mut ctx, &[0x02, 0x01, 0x2A]).unwrap();
        assert!(matches!(step, DecodeStep::Complete { .. }));
        assert!(decoder.feed(&mut ctx, &[0x00]).is_err());
    }
}
