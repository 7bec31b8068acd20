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

use alloc::vec::Vec;

use log::trace;

use crate::message::{Allocator, ReaderOptions, ReaderSegments};
use crate::private::layout::Location;
use crate::private::read_limiter::ReadLimiter;
use crate::private::units::*;
use crate::{Error, ErrorKind, OutputSegments, Result, Word};

pub type SegmentId = u32;

/// Read access to the segments of a message, as seen by the copy engine.
pub trait ReaderArena {
    /// Returns the bytes of segment `id`, truncated to a whole number of words.
    fn get_segment(&self, id: SegmentId) -> Result<&[u8]>;

    /// Checks that `size_in_words` words starting at byte `start` lie inside the segment,
    /// and charges them against the traversal limit.
    fn contains_interval(
        &self,
        segment_id: SegmentId,
        start: ByteCount,
        size_in_words: WordCount,
    ) -> Result<()>;

    fn amplified_read(&self, virtual_amount: u64) -> Result<()>;

    fn nesting_limit(&self) -> i32;
}

fn check_interval(segment: &[u8], start: ByteCount, size_in_words: WordCount) -> Result<()> {
    let end = size_in_words
        .checked_mul(BYTES_PER_WORD)
        .and_then(|size| start.checked_add(size));
    match end {
        Some(end) if end <= segment.len() => Ok(()),
        _ => Err(Error::from_kind(
            ErrorKind::MessageContainsOutOfBoundsPointer,
        )),
    }
}

pub struct ReaderArenaImpl<S> {
    segments: S,
    read_limiter: ReadLimiter,
    nesting_limit: i32,
}

impl<S> ReaderArenaImpl<S>
where
    S: ReaderSegments,
{
    pub fn new(segments: S, options: ReaderOptions) -> Self {
        let limiter = ReadLimiter::new(options.traversal_limit_in_words);
        Self {
            segments,
            read_limiter: limiter,
            nesting_limit: options.nesting_limit,
        }
    }

    pub fn into_segments(self) -> S {
        self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<S> ReaderArena for ReaderArenaImpl<S>
where
    S: ReaderSegments,
{
    fn get_segment(&self, id: SegmentId) -> Result<&[u8]> {
        match self.segments.get_segment(id) {
            Some(seg) => Ok(&seg[..seg.len() / BYTES_PER_WORD * BYTES_PER_WORD]),
            None => Err(Error::from_kind(ErrorKind::InvalidSegmentId(id))),
        }
    }

    fn contains_interval(
        &self,
        segment_id: SegmentId,
        start: ByteCount,
        size_in_words: WordCount,
    ) -> Result<()> {
        check_interval(self.get_segment(segment_id)?, start, size_in_words)?;
        self.read_limiter.can_read(size_in_words)
    }

    fn amplified_read(&self, virtual_amount: u64) -> Result<()> {
        self.read_limiter.can_read(virtual_amount as usize)
    }

    fn nesting_limit(&self) -> i32 {
        self.nesting_limit
    }
}

/// Write access to the segments of a message under construction.
///
/// The copy engine only ever calls `write` and `zero`; allocation is driven by the
/// pointer helpers in `layout`.
pub trait BuilderArena {
    /// Claims `amount` words at the end of segment `segment_id`, returning the index of the
    /// first one, or `None` if the segment does not have room.
    fn allocate(&mut self, segment_id: SegmentId, amount: WordCount32) -> Option<u32>;

    /// Claims `amount` words in any segment, allocating a new one if needed.
    fn allocate_anywhere(&mut self, amount: WordCount32) -> Result<(SegmentId, u32)>;

    fn get_segment_mut(&mut self, id: SegmentId) -> &mut [u8];

    /// Copies `source` byte for byte to `target`.
    fn write(&mut self, source: &[u8], target: Location) {
        let segment = self.get_segment_mut(target.segment_id);
        segment[target.offset..target.offset + source.len()].copy_from_slice(source);
    }

    /// Zeroes `length` bytes starting at `target`.
    fn zero(&mut self, target: Location, length: ByteCount) {
        let segment = self.get_segment_mut(target.segment_id);
        segment[target.offset..target.offset + length].fill(0);
    }
}

/// A memory segment used in building a message.
struct BuilderSegment {
    words: Vec<Word>,

    /// Number of words already used in the segment.
    allocated: u32,
}

pub struct BuilderArenaImpl<A>
where
    A: Allocator,
{
    allocator: A,
    segments: Vec<BuilderSegment>,
}

impl<A> BuilderArenaImpl<A>
where
    A: Allocator,
{
    pub fn new(allocator: A) -> Self {
        Self {
            allocator,
            segments: Vec::new(),
        }
    }

    /// Allocates a new segment with capacity for at least `minimum_size` words.
    pub fn allocate_segment(&mut self, minimum_size: WordCount32) -> Result<()> {
        let words = self.allocator.allocate_segment(minimum_size)?;
        trace!(
            "allocated segment {} with room for {} words",
            self.segments.len(),
            words.len()
        );
        self.segments.push(BuilderSegment {
            words,
            allocated: 0,
        });
        Ok(())
    }

    pub fn get_segments_for_output(&self) -> OutputSegments {
        if self.segments.len() == 1 {
            OutputSegments::SingleSegment([self.allocated_bytes(0)])
        } else {
            OutputSegments::MultiSegment(
                (0..self.segments.len() as u32)
                    .map(|id| self.allocated_bytes(id))
                    .collect(),
            )
        }
    }

    fn allocated_bytes(&self, id: SegmentId) -> &[u8] {
        let seg = &self.segments[id as usize];
        &Word::words_to_bytes(&seg.words)[..seg.allocated as usize * BYTES_PER_WORD]
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Retrieves the underlying `Allocator`, dropping all currently-allocated segments.
    pub fn into_allocator(self) -> A {
        self.allocator
    }
}

impl<A> ReaderArena for BuilderArenaImpl<A>
where
    A: Allocator,
{
    fn get_segment(&self, id: SegmentId) -> Result<&[u8]> {
        if (id as usize) < self.segments.len() {
            Ok(self.allocated_bytes(id))
        } else {
            Err(Error::from_kind(ErrorKind::InvalidSegmentId(id)))
        }
    }

    fn contains_interval(
        &self,
        segment_id: SegmentId,
        start: ByteCount,
        size_in_words: WordCount,
    ) -> Result<()> {
        check_interval(self.get_segment(segment_id)?, start, size_in_words)
    }

    fn amplified_read(&self, _virtual_amount: u64) -> Result<()> {
        Ok(())
    }

    fn nesting_limit(&self) -> i32 {
        0x7fffffff
    }
}

impl<A> BuilderArena for BuilderArenaImpl<A>
where
    A: Allocator,
{
    fn allocate(&mut self, segment_id: SegmentId, amount: WordCount32) -> Option<u32> {
        let seg = &mut self.segments[segment_id as usize];
        let capacity = seg.words.len() as u32;
        if amount > capacity - seg.allocated {
            None
        } else {
            let result = seg.allocated;
            seg.allocated += amount;
            Some(result)
        }
    }

    fn allocate_anywhere(&mut self, amount: WordCount32) -> Result<(SegmentId, u32)> {
        // first try the existing segments, then try allocating a new segment.
        let allocated_len = self.segments.len() as u32;
        for segment_id in 0..allocated_len {
            if let Some(idx) = self.allocate(segment_id, amount) {
                return Ok((segment_id, idx));
            }
        }

        // Need to allocate a new segment.
        self.allocate_segment(amount)?;
        match self.allocate(allocated_len, amount) {
            Some(idx) => Ok((allocated_len, idx)),
            None => Err(Error::from_kind(ErrorKind::SegmentSizeTooLarge(amount))),
        }
    }

    fn get_segment_mut(&mut self, id: SegmentId) -> &mut [u8] {
        Word::words_to_bytes_mut(&mut self.segments[id as usize].words)
    }
}
