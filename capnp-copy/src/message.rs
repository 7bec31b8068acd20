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

//! Untyped root containers for reading a message and for building a copy of one.

use alloc::vec::Vec;

use log::debug;

use crate::private::arena::{BuilderArena, BuilderArenaImpl, ReaderArena, ReaderArenaImpl};
use crate::private::copy;
use crate::private::layout::{self, Location, Pointer, StructSize};
use crate::private::units::BYTES_PER_WORD;
use crate::{Error, ErrorKind, MessageSize, OutputSegments, Result, Word};

/// Options controlling how data is read.
#[derive(Clone, Copy, Debug)]
pub struct ReaderOptions {
    /// Limits how many total words of data are allowed to be traversed. Every struct and list
    /// body reached while copying or sizing a message counts against this limit, so a message in
    /// which many pointers share a target cannot be amplified into an arbitrarily large copy.
    /// Once the traversal limit is reached, an error will be reported.
    pub traversal_limit_in_words: u64,

    /// Limits how many pointers deep below the root the structure of a message may go.
    ///
    /// Copying is recursive, so an attacker could otherwise cause a stack overflow by sending a
    /// very deeply nested (or even cyclic) message, without the message even being very large.
    pub nesting_limit: i32,
}

pub const DEFAULT_READER_OPTIONS: ReaderOptions = ReaderOptions {
    traversal_limit_in_words: 8 * 1024 * 1024,
    nesting_limit: 64,
};

impl Default for ReaderOptions {
    fn default() -> Self {
        DEFAULT_READER_OPTIONS
    }
}

impl ReaderOptions {
    pub fn new() -> Self {
        DEFAULT_READER_OPTIONS
    }

    pub fn nesting_limit(&mut self, value: i32) -> &mut Self {
        self.nesting_limit = value;
        self
    }

    pub fn traversal_limit_in_words(&mut self, value: u64) -> &mut Self {
        self.traversal_limit_in_words = value;
        self
    }
}

/// An object that manages the buffers underlying a message reader.
pub trait ReaderSegments {
    /// Gets the segment with index `idx`. Returns `None` if `idx` is out of range.
    ///
    /// Trailing bytes that do not make up a whole word are ignored.
    fn get_segment(&self, idx: u32) -> Option<&[u8]>;

    /// Gets the number of segments.
    fn len(&self) -> usize {
        for i in 0.. {
            if self.get_segment(i as u32).is_none() {
                return i;
            }
        }
        unreachable!()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<S> ReaderSegments for &S
where
    S: ReaderSegments + ?Sized,
{
    fn get_segment(&self, idx: u32) -> Option<&[u8]> {
        (**self).get_segment(idx)
    }

    fn len(&self) -> usize {
        (**self).len()
    }
}

/// An array of segments.
pub struct SegmentArray<'a> {
    segments: &'a [&'a [u8]],
}

impl<'a> SegmentArray<'a> {
    pub fn new(segments: &'a [&'a [u8]]) -> SegmentArray<'a> {
        SegmentArray { segments }
    }
}

impl<'b> ReaderSegments for SegmentArray<'b> {
    fn get_segment(&self, id: u32) -> Option<&[u8]> {
        self.segments.get(id as usize).copied()
    }

    fn len(&self) -> usize {
        self.segments.len()
    }
}

impl<'b> ReaderSegments for [&'b [u8]] {
    fn get_segment(&self, id: u32) -> Option<&[u8]> {
        self.get(id as usize).copied()
    }

    fn len(&self) -> usize {
        self.len()
    }
}

const ROOT: Location = Location::new(0, 0);

/// A container used to read a message.
pub struct Reader<S>
where
    S: ReaderSegments,
{
    arena: ReaderArenaImpl<S>,
}

impl<S> Reader<S>
where
    S: ReaderSegments,
{
    pub fn new(segments: S, options: ReaderOptions) -> Self {
        Self {
            arena: ReaderArenaImpl::new(segments, options),
        }
    }

    pub fn into_segments(self) -> S {
        self.arena.into_segments()
    }

    /// Gets the number of segments.
    pub fn segment_count(&self) -> usize {
        self.arena.len()
    }

    /// Words and capabilities a copy of this message's root occupies, root pointer excluded.
    pub fn total_size(&self) -> Result<MessageSize> {
        layout::total_size(&self.arena, ROOT, 0)
    }

    /// Copies the message into a single segment with no far pointers and no unreachable
    /// space, and returns the words of that segment, root pointer first.
    pub fn repack(&self) -> Result<Vec<Word>> {
        let size = self.total_size()?;
        let words = size.word_count + 1;
        if words > u64::from(MAX_SEGMENT_WORDS) {
            return Err(Error::from_kind(ErrorKind::SegmentSizeTooLarge(
                words.min(u64::from(u32::MAX)) as u32,
            )));
        }
        debug!(
            "repacking {} source segments into {words} words",
            self.segment_count()
        );
        let allocator = HeapAllocator::new()
            .first_segment_words(words as u32)
            .allocation_strategy(AllocationStrategy::FixedSize);
        let mut message = Builder::new(allocator);
        message.set_root_copy(self)?;

        let output = message.get_segments_for_output();
        assert_eq!(output.len(), 1);
        let mut result = Word::allocate_zeroed_vec(output[0].len() / BYTES_PER_WORD);
        Word::words_to_bytes_mut(&mut result).copy_from_slice(output[0]);
        Ok(result)
    }

    pub(crate) fn arena(&self) -> &dyn ReaderArena {
        &self.arena
    }
}

/// An object that allocates memory for a message as it is being built.
pub trait Allocator {
    /// Allocates zeroed memory for a new segment of at least `minimum_size` words.
    fn allocate_segment(&mut self, minimum_size: u32) -> Result<Vec<Word>>;
}

/// A container used to build a message.
pub struct Builder<A>
where
    A: Allocator,
{
    arena: BuilderArenaImpl<A>,
}

impl<A> Builder<A>
where
    A: Allocator,
{
    pub fn new(allocator: A) -> Self {
        Self {
            arena: BuilderArenaImpl::new(allocator),
        }
    }

    fn get_root_location(&mut self) -> Result<Location> {
        if self.arena.is_empty() {
            self.arena.allocate_segment(1)?;
            if self.arena.allocate(0, 1).is_none() {
                return Err(Error::failed("allocate root pointer".into()));
            }
        }
        Ok(ROOT)
    }

    /// Sets the root to a deep copy of the root of `source`. Every struct keeps its size.
    pub fn set_root_copy<S>(&mut self, source: &Reader<S>) -> Result<()>
    where
        S: ReaderSegments,
    {
        let root = self.get_root_location()?;
        debug!(
            "copying root of a {}-segment message",
            source.segment_count()
        );
        copy::copy_pointer(source.arena(), ROOT, 0, &mut self.arena, root)
    }

    /// Sets the root to a deep copy of the struct at the root of `source`, resized to `size`.
    ///
    /// Data and pointer sections that are larger in `size` than in the source are zero-filled
    /// past the end of the source; sections that are smaller are truncated. Structs below the
    /// root keep their sizes. A null root stays null. Both sections of `size` are in bytes and
    /// are rounded up to whole words.
    pub fn set_root_struct_copy<S>(&mut self, source: &Reader<S>, size: StructSize) -> Result<()>
    where
        S: ReaderSegments,
    {
        let root = self.get_root_location()?;
        let arena = source.arena();
        if layout::is_null(arena, ROOT)? {
            self.arena.zero(root, BYTES_PER_WORD);
            return Ok(());
        }

        let Pointer::Struct(source_layout) = layout::read_pointer(arena, ROOT, 0)? else {
            return Err(Error::from_kind(
                ErrorKind::MessageContainsNonStructPointerWhereStructPointerWasExpected,
            ));
        };
        size.check_encodable()?;
        let fixed = size.word_aligned();
        debug!(
            "copying root struct of {:?} into {:?}",
            source_layout.size, fixed
        );
        let object = layout::init_struct_pointer(&mut self.arena, root, fixed)?;
        copy::copy_fixed_width_struct(arena, &source_layout, 0, &mut self.arena, object, fixed)
    }

    pub fn get_segments_for_output(&self) -> OutputSegments {
        self.arena.get_segments_for_output()
    }

    pub fn into_reader(self) -> Reader<Builder<A>> {
        Reader::new(
            self,
            ReaderOptions {
                traversal_limit_in_words: u64::MAX,
                nesting_limit: i32::MAX,
            },
        )
    }

    /// Retrieves the underlying `Allocator`, deallocating all currently-allocated
    /// segments.
    pub fn into_allocator(self) -> A {
        self.arena.into_allocator()
    }
}

impl<A> ReaderSegments for Builder<A>
where
    A: Allocator,
{
    fn get_segment(&self, id: u32) -> Option<&[u8]> {
        self.arena.get_segment(id).ok()
    }

    fn len(&self) -> usize {
        self.arena.len()
    }
}

/// Standard segment allocator. Allocates each segment as a `Vec<Word>`.
#[derive(Debug)]
pub struct HeapAllocator {
    // Minimum number of words in the next allocation.
    next_size: u32,

    // How to update next_size after an allocation.
    allocation_strategy: AllocationStrategy,

    // Maximum number of words to allocate.
    max_segment_words: u32,
}

#[derive(Clone, Copy, Debug)]
pub enum AllocationStrategy {
    /// Allocates the same number of words for each segment, to the extent possible.
    /// This strategy is primarily useful for testing cross-segment pointers.
    FixedSize,

    /// Increases segment size by a multiplicative factor for each subsequent segment.
    GrowHeuristically,
}

pub const SUGGESTED_FIRST_SEGMENT_WORDS: u32 = 1024;
pub const MAX_SEGMENT_WORDS: u32 = 1 << 29;
pub const SUGGESTED_ALLOCATION_STRATEGY: AllocationStrategy = AllocationStrategy::GrowHeuristically;

impl Default for HeapAllocator {
    fn default() -> Self {
        Self {
            next_size: SUGGESTED_FIRST_SEGMENT_WORDS,
            allocation_strategy: SUGGESTED_ALLOCATION_STRATEGY,
            max_segment_words: MAX_SEGMENT_WORDS,
        }
    }
}

impl HeapAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the size of the initial segment in words, where 1 word = 8 bytes.
    pub fn first_segment_words(mut self, value: u32) -> Self {
        assert!(value <= self.max_segment_words);
        self.next_size = value;
        self
    }

    /// Sets the allocation strategy for segments after the first one.
    pub fn allocation_strategy(mut self, value: AllocationStrategy) -> Self {
        self.allocation_strategy = value;
        self
    }

    /// Sets the maximum number of words allowed in a single allocation.
    pub fn max_segment_words(mut self, value: u32) -> Self {
        assert!(self.next_size <= value);
        self.max_segment_words = value;
        self
    }
}

impl Allocator for HeapAllocator {
    fn allocate_segment(&mut self, minimum_size: u32) -> Result<Vec<Word>> {
        if minimum_size > self.max_segment_words {
            return Err(Error::from_kind(ErrorKind::SegmentSizeTooLarge(
                minimum_size,
            )));
        }
        let size = core::cmp::max(minimum_size, self.next_size);
        if let AllocationStrategy::GrowHeuristically = self.allocation_strategy {
            if size < self.max_segment_words - self.next_size {
                self.next_size += size;
            } else {
                self.next_size = self.max_segment_words;
            }
        }
        Ok(Word::allocate_zeroed_vec(size as usize))
    }
}

impl Builder<HeapAllocator> {
    /// Constructs a new `message::Builder<HeapAllocator>` whose first segment has length
    /// `SUGGESTED_FIRST_SEGMENT_WORDS`.
    pub fn new_default() -> Self {
        Self::new(HeapAllocator::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heap_allocator_grows() {
        let mut allocator = HeapAllocator::new().first_segment_words(4);
        assert_eq!(allocator.allocate_segment(1).unwrap().len(), 4);
        assert_eq!(allocator.allocate_segment(1).unwrap().len(), 8);
        assert_eq!(allocator.allocate_segment(20).unwrap().len(), 20);
        assert_eq!(allocator.allocate_segment(1).unwrap().len(), 36);
    }

    #[test]
    fn heap_allocator_fixed_size() {
        let mut allocator = HeapAllocator::new()
            .first_segment_words(4)
            .allocation_strategy(AllocationStrategy::FixedSize);
        assert_eq!(allocator.allocate_segment(1).unwrap().len(), 4);
        assert_eq!(allocator.allocate_segment(1).unwrap().len(), 4);
        assert_eq!(allocator.allocate_segment(9).unwrap().len(), 9);
    }

    #[test]
    fn heap_allocator_max_segment_words() {
        let mut allocator = HeapAllocator::new()
            .first_segment_words(4)
            .max_segment_words(6);
        assert_eq!(
            allocator.allocate_segment(7).unwrap_err().kind,
            ErrorKind::SegmentSizeTooLarge(7)
        );
        assert_eq!(allocator.allocate_segment(1).unwrap().len(), 4);
        assert_eq!(allocator.allocate_segment(1).unwrap().len(), 6);
    }

    #[test]
    fn allocator_is_returned_with_its_growth_state() {
        let segment = [
            crate::word(0x00, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00),
            crate::word(0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11),
            crate::word(0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22),
        ];
        let segments = [Word::words_to_bytes(&segment)];
        let reader = Reader::new(SegmentArray::new(&segments), ReaderOptions::new());

        let mut builder = Builder::new(HeapAllocator::new().first_segment_words(4));
        builder.set_root_copy(&reader).unwrap();
        assert_eq!(builder.get_segments_for_output()[0], segments[0]);

        let mut allocator = builder.into_allocator();
        assert_eq!(allocator.allocate_segment(1).unwrap().len(), 8);
    }

    #[test]
    fn empty_builder_has_no_segments() {
        let builder = Builder::new_default();
        assert_eq!(builder.get_segments_for_output().len(), 0);
        let reader = builder.into_reader();
        assert_eq!(
            reader.total_size().unwrap_err().kind,
            ErrorKind::InvalidSegmentId(0)
        );
    }
}
