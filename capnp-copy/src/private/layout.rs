// Copyright (c) 2013-2015 Sandstorm Development Group, Inc. and contributors
// Licensed under the MIT License:
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in
// all copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN
// THE SOFTWARE.

//! Wire geometry: pointer words, section sizes, list encodings, and the
//! read/write helpers that turn pointer words into layouts and back.

use log::trace;

use crate::private::arena::{BuilderArena, ReaderArena, SegmentId};
use crate::private::units::*;
use crate::{Error, ErrorKind, MessageSize, Result};

pub use self::ElementSize::{
    Bit, Byte, EightBytes, FourBytes, InlineComposite, Pointer as PointerElement, TwoBytes, Void,
};

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ElementSize {
    Void = 0,
    Bit = 1,
    Byte = 2,
    TwoBytes = 3,
    FourBytes = 4,
    EightBytes = 5,
    Pointer = 6,
    InlineComposite = 7,
}

impl ElementSize {
    fn from(val: u8) -> Self {
        match val & 7 {
            0 => Self::Void,
            1 => Self::Bit,
            2 => Self::Byte,
            3 => Self::TwoBytes,
            4 => Self::FourBytes,
            5 => Self::EightBytes,
            6 => Self::Pointer,
            7 => Self::InlineComposite,
            _ => unreachable!("illegal element size: {val}"),
        }
    }
}

pub fn data_bits_per_element(size: ElementSize) -> BitCount32 {
    match size {
        Void => 0,
        Bit => 1,
        Byte => 8,
        TwoBytes => 16,
        FourBytes => 32,
        EightBytes => 64,
        PointerElement => 0,
        InlineComposite => 0,
    }
}

pub fn pointers_per_element(size: ElementSize) -> WirePointerCount32 {
    match size {
        PointerElement => 1,
        _ => 0,
    }
}

/// Section sizes of a struct, both in bytes. A struct with one pointer field has
/// `pointers: 8`.
///
/// The same type describes the shape of a source struct and the fixed shape a
/// destination is constrained to when the two differ.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StructSize {
    pub data: ByteCount32,
    pub pointers: ByteCount32,
}

impl StructSize {
    /// Largest section, in words, that the packed form can describe.
    pub const MAX_SECTION_WORDS: WordCount32 = (1 << 16) - 1;

    #[inline]
    pub fn data_words(&self) -> WordCount32 {
        round_bytes_up_to_words(self.data)
    }

    #[inline]
    pub fn pointer_count(&self) -> WirePointerCount32 {
        round_bytes_up_to_words(self.pointers)
    }

    #[inline]
    pub fn total_words(&self) -> WordCount32 {
        self.data_words() + self.pointer_count() * WORDS_PER_POINTER as WordCount32
    }

    #[inline]
    pub fn total_bytes(&self) -> ByteCount {
        self.data as ByteCount + self.pointers as ByteCount
    }

    /// Rounds both sections up to a whole number of words. Only meaningful for an
    /// encodable size.
    pub fn word_aligned(self) -> Self {
        Self {
            data: self.data_words() * BYTES_PER_WORD as u32,
            pointers: self.pointer_count() * BYTES_PER_POINTER as u32,
        }
    }

    /// Packs the sizes into the upper half of a struct pointer or composite list tag:
    /// `(pointers << 13) | (data >> 3)`. For word-aligned sizes this is the pointer
    /// count in the upper 16 bits and the data word count in the lower 16.
    #[inline]
    pub fn to_upper32bits(self) -> u32 {
        (self.pointers << 13) | (self.data >> 3)
    }

    #[inline]
    pub fn from_upper32bits(upper32bits: u32) -> Self {
        Self {
            data: (upper32bits & Self::MAX_SECTION_WORDS) * BYTES_PER_WORD as u32,
            pointers: (upper32bits >> 16) * BYTES_PER_POINTER as u32,
        }
    }

    pub fn check_encodable(self) -> Result<()> {
        for words in [self.data_words(), self.pointer_count()] {
            if words > Self::MAX_SECTION_WORDS {
                return Err(Error::from_kind(ErrorKind::StructSizeTooLarge(words)));
            }
        }
        Ok(())
    }
}

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WirePointerKind {
    Struct = 0,
    List = 1,
    Far = 2,
    Other = 3,
}

impl WirePointerKind {
    fn from(val: u8) -> Self {
        match val & 3 {
            0 => Self::Struct,
            1 => Self::List,
            2 => Self::Far,
            3 => Self::Other,
            _ => unreachable!("illegal pointer kind: {val}"),
        }
    }
}

/// One pointer word, split into its little-endian halves.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WirePointer {
    offset_and_kind: u32,
    upper32bits: u32,
}

impl WirePointer {
    pub const fn new(offset_and_kind: u32, upper32bits: u32) -> Self {
        Self {
            offset_and_kind,
            upper32bits,
        }
    }

    #[inline]
    pub fn from_bytes(bytes: [u8; 8]) -> Self {
        Self {
            offset_and_kind: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            upper32bits: u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
        }
    }

    #[inline]
    pub fn to_bytes(self) -> [u8; 8] {
        let lo = self.offset_and_kind.to_le_bytes();
        let hi = self.upper32bits.to_le_bytes();
        [lo[0], lo[1], lo[2], lo[3], hi[0], hi[1], hi[2], hi[3]]
    }

    #[inline]
    pub fn offset_and_kind(&self) -> u32 {
        self.offset_and_kind
    }

    #[inline]
    pub fn upper32bits(&self) -> u32 {
        self.upper32bits
    }

    #[inline]
    pub fn kind(&self) -> WirePointerKind {
        WirePointerKind::from(self.offset_and_kind as u8)
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        self.offset_and_kind == 0 && self.upper32bits == 0
    }

    /// Signed distance, in words, from the end of this pointer to its target.
    #[inline]
    pub fn target_offset_in_words(&self) -> i32 {
        (self.offset_and_kind as i32) >> 2
    }

    /// Points a pointer stored at byte `reff` at byte `target` of the same segment.
    #[inline]
    pub fn set_kind_and_target(&mut self, kind: WirePointerKind, reff: ByteCount, target: ByteCount) {
        let words = (target as isize - reff as isize) / BYTES_PER_WORD as isize - 1;
        self.offset_and_kind = ((words as i32) << 2) as u32 | (kind as u32);
    }

    #[inline]
    pub fn set_kind_and_target_for_empty_struct(&mut self) {
        //# This pointer points at an empty struct. Assuming the
        //# WirePointer itself is in-bounds, we can set the target to
        //# point either at the WirePointer itself or immediately after
        //# it. The latter would cause the WirePointer to be "null"
        //# (since for an empty struct the upper 32 bits are going to
        //# be zero). So we set an offset of -1, as if the struct were
        //# allocated immediately before this pointer, to distinguish
        //# it from null.
        self.offset_and_kind = 0xfffffffc;
    }

    #[inline]
    pub fn inline_composite_list_element_count(&self) -> ElementCount32 {
        self.offset_and_kind >> 2
    }

    #[inline]
    pub fn set_kind_and_inline_composite_list_element_count(
        &mut self,
        kind: WirePointerKind,
        element_count: ElementCount32,
    ) {
        self.offset_and_kind = (element_count << 2) | (kind as u32)
    }

    #[inline]
    pub fn far_position_in_segment(&self) -> WordCount32 {
        self.offset_and_kind >> 3
    }

    #[inline]
    pub fn is_double_far(&self) -> bool {
        ((self.offset_and_kind >> 2) & 1) != 0
    }

    #[inline]
    pub fn set_far(&mut self, is_double_far: bool, pos: WordCount32) {
        self.offset_and_kind =
            (pos << 3) | ((is_double_far as u32) << 2) | WirePointerKind::Far as u32;
    }

    #[inline]
    pub fn far_segment_id(&self) -> SegmentId {
        self.upper32bits as SegmentId
    }

    #[inline]
    pub fn set_far_segment_id(&mut self, si: SegmentId) {
        self.upper32bits = si
    }

    #[inline]
    pub fn set_cap(&mut self, index: u32) {
        self.offset_and_kind = WirePointerKind::Other as u32;
        self.upper32bits = index;
    }

    #[inline]
    pub fn struct_size(&self) -> StructSize {
        StructSize::from_upper32bits(self.upper32bits)
    }

    #[inline]
    pub fn set_struct_size(&mut self, size: StructSize) {
        self.upper32bits = size.to_upper32bits()
    }

    #[inline]
    pub fn list_element_size(&self) -> ElementSize {
        ElementSize::from(self.upper32bits as u8)
    }

    #[inline]
    pub fn list_element_count(&self) -> ElementCount32 {
        self.upper32bits >> 3
    }

    #[inline]
    pub fn list_inline_composite_word_count(&self) -> WordCount32 {
        self.list_element_count()
    }

    #[inline]
    pub fn set_list_size_and_count(&mut self, es: ElementSize, ec: ElementCount32) {
        debug_assert!(ec < (1 << 29), "Lists are limited to 2**29 elements");
        self.upper32bits = (ec << 3) | (es as u32);
    }

    #[inline]
    pub fn set_list_inline_composite(&mut self, wc: WordCount32) {
        debug_assert!(
            wc < (1 << 29),
            "Inline composite lists are limited to 2**29 words"
        );
        self.upper32bits = (wc << 3) | (InlineComposite as u32);
    }
}

/// A word-aligned byte position inside one segment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Location {
    pub segment_id: SegmentId,
    pub offset: ByteCount,
}

impl Location {
    pub const fn new(segment_id: SegmentId, offset: ByteCount) -> Self {
        Self { segment_id, offset }
    }

    #[inline]
    pub fn offset_by(self, bytes: ByteCount) -> Self {
        Self {
            segment_id: self.segment_id,
            offset: self.offset + bytes,
        }
    }
}

/// Where a struct's sections live in the source message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StructLayout {
    pub segment_id: SegmentId,
    pub data_section: ByteCount,
    pub pointers_section: ByteCount,
    pub end: ByteCount,
    pub size: StructSize,
}

impl StructLayout {
    pub fn new(segment_id: SegmentId, start: ByteCount, size: StructSize) -> Self {
        let pointers_section = start + size.data as ByteCount;
        Self {
            segment_id,
            data_section: start,
            pointers_section,
            end: pointers_section + size.pointers as ByteCount,
            size,
        }
    }

    /// The pointer section, one location per slot.
    pub fn pointer_slots(&self) -> impl Iterator<Item = Location> {
        let segment_id = self.segment_id;
        (self.pointers_section..self.end)
            .step_by(BYTES_PER_POINTER)
            .map(move |offset| Location::new(segment_id, offset))
    }
}

/// Element encoding of a list. Composite lists carry the shape shared by
/// all of their elements.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ListEncoding {
    Void,
    Bit,
    Byte,
    TwoBytes,
    FourBytes,
    EightBytes,
    Pointer,
    InlineComposite(StructSize),
}

impl ListEncoding {
    pub fn element_size(&self) -> ElementSize {
        match self {
            Self::Void => Void,
            Self::Bit => Bit,
            Self::Byte => Byte,
            Self::TwoBytes => TwoBytes,
            Self::FourBytes => FourBytes,
            Self::EightBytes => EightBytes,
            Self::Pointer => PointerElement,
            Self::InlineComposite(_) => InlineComposite,
        }
    }

    /// Encoding of a list whose element size is stored in the list pointer.
    /// Composite element shapes live in the list's tag word instead.
    fn from_element_size(size: ElementSize) -> Option<Self> {
        match size {
            Void => Some(Self::Void),
            Bit => Some(Self::Bit),
            Byte => Some(Self::Byte),
            TwoBytes => Some(Self::TwoBytes),
            FourBytes => Some(Self::FourBytes),
            EightBytes => Some(Self::EightBytes),
            PointerElement => Some(Self::Pointer),
            InlineComposite => None,
        }
    }

    fn step_in_bits(&self) -> BitCount64 {
        match self {
            Self::InlineComposite(size) => size.total_words() as u64 * BITS_PER_WORD as u64,
            encoding => {
                let size = encoding.element_size();
                data_bits_per_element(size) as u64
                    + pointers_per_element(size) as u64 * BITS_PER_POINTER as u64
            }
        }
    }
}

/// Where a list's elements live in the source message.
///
/// For composite lists `begin` is the first element, one word past the tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ListLayout {
    pub segment_id: SegmentId,
    pub begin: ByteCount,
    pub length: ElementCount32,
    pub encoding: ListEncoding,
}

impl ListLayout {
    /// Number of bytes a copy of the elements must move.
    ///
    /// Bit lists are word aligned. Every other encoding is exactly
    /// `length` times the element width; a composite list's tag is not included.
    pub fn body_bytes(&self) -> ByteCount {
        match self.encoding {
            ListEncoding::Bit => self.word_count() as ByteCount * BYTES_PER_WORD,
            encoding => (self.length as u64 * encoding.step_in_bits() / BITS_PER_BYTE as u64)
                as ByteCount,
        }
    }

    /// Words occupied by the elements, tag excluded.
    pub fn word_count(&self) -> WordCount32 {
        round_bits_up_to_words(self.length as u64 * self.encoding.step_in_bits())
    }

    /// Layout of element `index` of a composite list with elements of `size`.
    pub fn inline_composite_element(&self, size: StructSize, index: ElementCount32) -> StructLayout {
        StructLayout::new(
            self.segment_id,
            self.begin + index as ByteCount * size.total_bytes(),
            size,
        )
    }
}

/// A non-null pointer after far pointers have been followed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pointer {
    Struct(StructLayout),
    List(ListLayout),

    /// The upper half of a capability pointer.
    Other(u32),
}

//
// Reading
//

fn read_wire_pointer(arena: &dyn ReaderArena, location: Location) -> Result<WirePointer> {
    let segment = arena.get_segment(location.segment_id)?;
    match segment.get(location.offset..location.offset + BYTES_PER_POINTER) {
        Some(bytes) => {
            let mut word = [0; 8];
            word.copy_from_slice(bytes);
            Ok(WirePointer::from_bytes(word))
        }
        None => Err(Error::from_kind(
            ErrorKind::MessageContainsOutOfBoundsPointer,
        )),
    }
}

fn target_from_segment(
    arena: &dyn ReaderArena,
    segment_id: SegmentId,
    reff: ByteCount,
    pointer: WirePointer,
) -> Result<ByteCount> {
    let segment_len = arena.get_segment(segment_id)?.len() as i64;
    let target = reff as i64
        + BYTES_PER_WORD as i64
        + i64::from(pointer.target_offset_in_words()) * BYTES_PER_WORD as i64;
    if target < 0 || target > segment_len {
        Err(Error::from_kind(
            ErrorKind::MessageContainsOutOfBoundsPointer,
        ))
    } else {
        Ok(target as ByteCount)
    }
}

pub fn is_null(arena: &dyn ReaderArena, reff: Location) -> Result<bool> {
    Ok(read_wire_pointer(arena, reff)?.is_null())
}

/// If the pointer at `reff` is a far pointer, follows it. Returns the location of the
/// pointed-to object together with the pointer that describes it: `pointer` itself when
/// there was no indirection, otherwise a landing pad or the tag after a double-far pad.
pub fn follow_fars(
    arena: &dyn ReaderArena,
    reff: Location,
    pointer: WirePointer,
) -> Result<(Location, WirePointer)> {
    match pointer.kind() {
        WirePointerKind::Far => {}
        // Capabilities have no target.
        WirePointerKind::Other => return Ok((reff, pointer)),
        WirePointerKind::Struct | WirePointerKind::List => {
            let target = target_from_segment(arena, reff.segment_id, reff.offset, pointer)?;
            return Ok((Location::new(reff.segment_id, target), pointer));
        }
    }

    let segment_id = pointer.far_segment_id();
    let pad = Location::new(
        segment_id,
        pointer.far_position_in_segment() as ByteCount * BYTES_PER_WORD,
    );
    let pad_words: WordCount = if pointer.is_double_far() { 2 } else { 1 };
    arena.contains_interval(segment_id, pad.offset, pad_words)?;

    let landing_pad = read_wire_pointer(arena, pad)?;
    if !pointer.is_double_far() {
        if landing_pad.kind() == WirePointerKind::Far {
            return Err(Error::from_kind(ErrorKind::MalformedDoubleFarPointer));
        }
        let target = target_from_segment(arena, segment_id, pad.offset, landing_pad)?;
        Ok((Location::new(segment_id, target), landing_pad))
    } else {
        //# Landing pad is another far pointer. It is followed by a
        //# tag describing the pointed-to object.
        if landing_pad.kind() != WirePointerKind::Far || landing_pad.is_double_far() {
            return Err(Error::from_kind(ErrorKind::MalformedDoubleFarPointer));
        }
        let tag = read_wire_pointer(arena, pad.offset_by(BYTES_PER_POINTER))?;
        let object = Location::new(
            landing_pad.far_segment_id(),
            landing_pad.far_position_in_segment() as ByteCount * BYTES_PER_WORD,
        );
        Ok((object, tag))
    }
}

fn check_nesting(arena: &dyn ReaderArena, level: u32) -> Result<()> {
    if i64::from(level) > i64::from(arena.nesting_limit()) {
        Err(Error::from_kind(ErrorKind::MessageIsTooDeeplyNested))
    } else {
        Ok(())
    }
}

/// Decodes the non-null pointer at `reff`, found `level` pointers below the root.
///
/// Far pointers are followed, the target is bounds checked and charged against the
/// arena's traversal limit, and `level` is held against the arena's nesting limit.
pub fn read_pointer(arena: &dyn ReaderArena, reff: Location, level: u32) -> Result<Pointer> {
    let pointer = read_wire_pointer(arena, reff)?;
    let (object, tag) = follow_fars(arena, reff, pointer)?;

    match tag.kind() {
        WirePointerKind::Struct => {
            check_nesting(arena, level)?;
            let size = tag.struct_size();
            arena.contains_interval(
                object.segment_id,
                object.offset,
                size.total_words() as WordCount,
            )?;
            Ok(Pointer::Struct(StructLayout::new(
                object.segment_id,
                object.offset,
                size,
            )))
        }
        WirePointerKind::List => {
            check_nesting(arena, level)?;
            match ListEncoding::from_element_size(tag.list_element_size()) {
                None => {
                    let word_count = tag.list_inline_composite_word_count();
                    arena.contains_interval(
                        object.segment_id,
                        object.offset,
                        word_count as WordCount + POINTER_SIZE_IN_WORDS,
                    )?;

                    let element_tag = read_wire_pointer(arena, object)?;
                    if element_tag.kind() != WirePointerKind::Struct {
                        return Err(Error::from_kind(
                            ErrorKind::InlineCompositeListsOfNonStructTypeAreNotSupported,
                        ));
                    }

                    let element_count = element_tag.inline_composite_list_element_count();
                    let size = element_tag.struct_size();
                    let words_per_element = size.total_words();
                    if u64::from(words_per_element) * u64::from(element_count)
                        > u64::from(word_count)
                    {
                        return Err(Error::from_kind(
                            ErrorKind::InlineCompositeListsElementsOverrunItsWordCount,
                        ));
                    }

                    if words_per_element == 0 {
                        // Watch out for lists of zero-sized structs, which can claim to be
                        // arbitrarily large without having sent actual data.
                        arena.amplified_read(u64::from(element_count))?;
                    }

                    Ok(Pointer::List(ListLayout {
                        segment_id: object.segment_id,
                        begin: object.offset + BYTES_PER_POINTER,
                        length: element_count,
                        encoding: ListEncoding::InlineComposite(size),
                    }))
                }
                Some(encoding) => {
                    let layout = ListLayout {
                        segment_id: object.segment_id,
                        begin: object.offset,
                        length: tag.list_element_count(),
                        encoding,
                    };
                    arena.contains_interval(
                        object.segment_id,
                        object.offset,
                        layout.word_count() as WordCount,
                    )?;

                    if encoding == ListEncoding::Void {
                        // Watch out for lists of void, which can claim to be arbitrarily large
                        // without having sent actual data.
                        arena.amplified_read(u64::from(layout.length))?;
                    }
                    Ok(Pointer::List(layout))
                }
            }
        }
        WirePointerKind::Far => Err(Error::from_kind(ErrorKind::MalformedDoubleFarPointer)),
        WirePointerKind::Other => Ok(Pointer::Other(tag.upper32bits())),
    }
}

/// Words and capabilities that a copy of the object behind `reff` occupies.
pub fn total_size(arena: &dyn ReaderArena, reff: Location, level: u32) -> Result<MessageSize> {
    let mut result = MessageSize {
        word_count: 0,
        cap_count: 0,
    };

    if is_null(arena, reff)? {
        return Ok(result);
    }

    match read_pointer(arena, reff, level)? {
        Pointer::Struct(layout) => {
            result.word_count += u64::from(layout.size.total_words());
            for slot in layout.pointer_slots() {
                result.plus_eq(total_size(arena, slot, level + 1)?);
            }
        }
        Pointer::List(layout) => match layout.encoding {
            ListEncoding::InlineComposite(size) => {
                result.word_count +=
                    u64::from(layout.word_count()) + POINTER_SIZE_IN_WORDS as u64;
                if size.pointers > 0 {
                    for index in 0..layout.length {
                        let element = layout.inline_composite_element(size, index);
                        for slot in element.pointer_slots() {
                            result.plus_eq(total_size(arena, slot, level + 1)?);
                        }
                    }
                }
            }
            ListEncoding::Pointer => {
                result.word_count += u64::from(layout.word_count());
                for index in 0..layout.length as ByteCount {
                    let slot = Location::new(
                        layout.segment_id,
                        layout.begin + index * BYTES_PER_POINTER,
                    );
                    result.plus_eq(total_size(arena, slot, level + 1)?);
                }
            }
            _ => {
                result.word_count += u64::from(layout.word_count());
            }
        },
        Pointer::Other(_) => {
            result.cap_count += 1;
        }
    }
    Ok(result)
}

//
// Writing
//

/// Allocates `amount` words for an object of `kind` and points the (fresh) pointer slot
/// at `reff` to it, storing `upper32bits` in whichever pointer describes the object.
/// Returns the location of the object.
///
/// When the slot's segment is full, the object goes to another segment behind a far
/// pointer and a landing pad.
pub fn allocate(
    arena: &mut dyn BuilderArena,
    reff: Location,
    amount: WordCount32,
    kind: WirePointerKind,
    upper32bits: u32,
) -> Result<Location> {
    if amount == 0 && kind == WirePointerKind::Struct {
        let mut pointer = WirePointer::new(0, upper32bits);
        pointer.set_kind_and_target_for_empty_struct();
        arena.write(&pointer.to_bytes(), reff);
        return Ok(reff);
    }

    match arena.allocate(reff.segment_id, amount) {
        Some(idx) => {
            let target = Location::new(reff.segment_id, idx as ByteCount * BYTES_PER_WORD);
            let mut pointer = WirePointer::new(0, upper32bits);
            pointer.set_kind_and_target(kind, reff.offset, target.offset);
            arena.write(&pointer.to_bytes(), reff);
            Ok(target)
        }
        None => {
            //# Need to allocate in a different segment. We'll need to
            //# allocate an extra pointer worth of space to act as
            //# the landing pad for a far pointer.
            let amount_plus_ref = amount + POINTER_SIZE_IN_WORDS as u32;
            let (segment_id, word_idx) = arena.allocate_anywhere(amount_plus_ref)?;
            trace!(
                "{amount} words did not fit in segment {}; placed in segment {segment_id} behind a far pointer",
                reff.segment_id
            );

            //# Set up the original pointer to be a far pointer to
            //# the new segment.
            let mut far = WirePointer::default();
            far.set_far(false, word_idx);
            far.set_far_segment_id(segment_id);
            arena.write(&far.to_bytes(), reff);

            //# Initialize the landing pad to indicate that the
            //# data immediately follows the pad.
            let pad = Location::new(segment_id, word_idx as ByteCount * BYTES_PER_WORD);
            let target = pad.offset_by(BYTES_PER_POINTER);
            let mut landing_pad = WirePointer::new(0, upper32bits);
            landing_pad.set_kind_and_target(kind, pad.offset, target.offset);
            arena.write(&landing_pad.to_bytes(), pad);
            Ok(target)
        }
    }
}

/// Allocates a struct of `size` for the pointer slot at `reff`.
pub fn init_struct_pointer(
    arena: &mut dyn BuilderArena,
    reff: Location,
    size: StructSize,
) -> Result<Location> {
    size.check_encodable()?;
    allocate(
        arena,
        reff,
        size.total_words(),
        WirePointerKind::Struct,
        size.to_upper32bits(),
    )
}

/// Allocates room for a list shaped like `layout` for the pointer slot at `reff`.
/// For composite lists the returned location is that of the tag word.
pub fn init_list_pointer(
    arena: &mut dyn BuilderArena,
    reff: Location,
    layout: &ListLayout,
) -> Result<Location> {
    let word_count = layout.word_count();
    let mut pointer = WirePointer::default();
    match layout.encoding {
        ListEncoding::InlineComposite(_) => {
            pointer.set_list_inline_composite(word_count);
            allocate(
                arena,
                reff,
                word_count + POINTER_SIZE_IN_WORDS as u32,
                WirePointerKind::List,
                pointer.upper32bits(),
            )
        }
        encoding => {
            pointer.set_list_size_and_count(encoding.element_size(), layout.length);
            allocate(
                arena,
                reff,
                word_count,
                WirePointerKind::List,
                pointer.upper32bits(),
            )
        }
    }
}
