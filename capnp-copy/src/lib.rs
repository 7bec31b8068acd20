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

//! # capnp-copy
//!
//! Deep structural copying of messages in the Cap'n Proto
//! [encoding](https://capnproto.org/encoding.html) from one arena into another.
//!
//! A copy needs nothing but word geometry: pointer tags, section sizes and list
//! element encodings. No schema is consulted. Besides plain repacking, a struct
//! can be copied into a destination of a different size, which zero-fills
//! sections that grew and drops sections that shrank. This is how a message
//! written against one version of a schema is materialized under another.
//!
//! ```
//! use capnp_copy::{message, word, StructSize};
//!
//! let segment: &[capnp_copy::Word] = &[
//!     // struct pointer: one data word, no pointers
//!     word(0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00),
//!     word(0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08),
//! ];
//! let segments = &[capnp_copy::Word::words_to_bytes(segment)];
//! let reader = message::Reader::new(message::SegmentArray::new(segments), Default::default());
//!
//! let mut builder = message::Builder::new_default();
//! builder
//!     .set_root_struct_copy(&reader, StructSize { data: 16, pointers: 8 })
//!     .unwrap();
//! let output = builder.get_segments_for_output();
//! assert_eq!(output[0].len(), 32);
//! ```

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

use alloc::string::{String, ToString};
use alloc::vec::Vec;

pub mod message;

#[doc(hidden)]
pub mod private;

pub use crate::private::layout::StructSize;

/// Eight bytes of memory with opaque interior.
///
/// This type is used to ensure that the data of a message is properly aligned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(C, align(8))]
pub struct Word {
    raw_content: [u8; 8],
}

/// Constructs a word with the given bytes.
#[allow(clippy::too_many_arguments)]
pub const fn word(b0: u8, b1: u8, b2: u8, b3: u8, b4: u8, b5: u8, b6: u8, b7: u8) -> Word {
    Word {
        raw_content: [b0, b1, b2, b3, b4, b5, b6, b7],
    }
}

impl Word {
    /// Allocates a vec of `length` words, all set to zero.
    pub fn allocate_zeroed_vec(length: usize) -> Vec<Self> {
        alloc::vec![word(0, 0, 0, 0, 0, 0, 0, 0); length]
    }

    pub fn words_to_bytes(words: &[Self]) -> &[u8] {
        unsafe { core::slice::from_raw_parts(words.as_ptr() as *const u8, words.len() * 8) }
    }

    pub fn words_to_bytes_mut(words: &mut [Self]) -> &mut [u8] {
        unsafe { core::slice::from_raw_parts_mut(words.as_mut_ptr() as *mut u8, words.len() * 8) }
    }
}

#[cfg(test)]
impl quickcheck::Arbitrary for Word {
    fn arbitrary(g: &mut quickcheck::Gen) -> Self {
        crate::word(
            quickcheck::Arbitrary::arbitrary(g),
            quickcheck::Arbitrary::arbitrary(g),
            quickcheck::Arbitrary::arbitrary(g),
            quickcheck::Arbitrary::arbitrary(g),
            quickcheck::Arbitrary::arbitrary(g),
            quickcheck::Arbitrary::arbitrary(g),
            quickcheck::Arbitrary::arbitrary(g),
            quickcheck::Arbitrary::arbitrary(g),
        )
    }
}

/// Size of a message, as reported by `message::Reader::total_size()`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MessageSize {
    pub word_count: u64,

    /// Size of the capability table.
    pub cap_count: u32,
}

impl MessageSize {
    pub fn plus_eq(&mut self, other: Self) {
        self.word_count += other.word_count;
        self.cap_count += other.cap_count;
    }
}

/// Because messages are lazily validated, the return type of any method that reads a pointer
/// must be wrapped in a Result.
pub type Result<T> = ::core::result::Result<T, Error>;

/// Describes an arbitrary error that prevented an operation from completing.
#[derive(Debug, Clone)]
pub struct Error {
    /// The general kind of the error. Code that decides how to respond to an error
    /// should read only this field in making its decision.
    pub kind: ErrorKind,

    /// Extra context about error
    pub extra: String,
}

/// The general nature of an error. The purpose of this enum is not to describe the error itself,
/// but rather to describe how the client might want to respond to the error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Something went wrong
    Failed,

    /// Invalid segment id: {0}
    InvalidSegmentId(u32),

    /// Message contains out-of-bounds pointer
    MessageContainsOutOfBoundsPointer,

    /// Message is too deeply nested.
    MessageIsTooDeeplyNested,

    /// Read limit exceeded
    ReadLimitExceeded,

    /// Malformed double-far pointer.
    MalformedDoubleFarPointer,

    /// InlineComposite list with non-STRUCT elements not supported.
    InlineCompositeListsOfNonStructTypeAreNotSupported,

    /// InlineComposite list's elements overrun its word count.
    InlineCompositeListsElementsOverrunItsWordCount,

    /// Message contains non-struct pointer where struct pointer was expected.
    MessageContainsNonStructPointerWhereStructPointerWasExpected,

    /// Struct is too large to describe in a pointer: a section of {0} words
    StructSizeTooLarge(u32),

    /// Requested a segment of {0} words, more than the allocator allows
    SegmentSizeTooLarge(u32),
}

impl Error {
    /// Writes to the `extra` field. Does not change the kind.
    pub fn failed(description: String) -> Self {
        Self {
            extra: description,
            kind: ErrorKind::Failed,
        }
    }

    pub fn from_kind(kind: ErrorKind) -> Self {
        Self {
            extra: String::new(),
            kind,
        }
    }
}

impl core::fmt::Display for ErrorKind {
    fn fmt(&self, fmt: &mut core::fmt::Formatter) -> core::result::Result<(), core::fmt::Error> {
        match self {
            Self::Failed => write!(fmt, "Failed"),
            Self::InvalidSegmentId(id) => write!(fmt, "Invalid segment id: {id}"),
            Self::MessageContainsOutOfBoundsPointer => {
                write!(fmt, "Message contains out-of-bounds pointer")
            }
            Self::MessageIsTooDeeplyNested => write!(fmt, "Message is too deeply nested."),
            Self::ReadLimitExceeded => write!(fmt, "Read limit exceeded"),
            Self::MalformedDoubleFarPointer => write!(fmt, "Malformed double-far pointer."),
            Self::InlineCompositeListsOfNonStructTypeAreNotSupported => write!(
                fmt,
                "InlineComposite list with non-STRUCT elements not supported."
            ),
            Self::InlineCompositeListsElementsOverrunItsWordCount => write!(
                fmt,
                "InlineComposite list's elements overrun its word count."
            ),
            Self::MessageContainsNonStructPointerWhereStructPointerWasExpected => write!(
                fmt,
                "Message contains non-struct pointer where struct pointer was expected."
            ),
            Self::StructSizeTooLarge(words) => write!(
                fmt,
                "Struct is too large to describe in a pointer: a section of {words} words"
            ),
            Self::SegmentSizeTooLarge(words) => write!(
                fmt,
                "Requested a segment of {words} words, more than the allocator allows"
            ),
        }
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, fmt: &mut core::fmt::Formatter) -> core::result::Result<(), core::fmt::Error> {
        if self.extra.is_empty() {
            write!(fmt, "{}", self.kind)
        } else {
            write!(fmt, "{}: {}", self.kind, self.extra)
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Self::from_kind(kind)
    }
}

impl From<Error> for String {
    fn from(err: Error) -> Self {
        err.to_string()
    }
}

/// Segments of a message that has been built, in the order they should be written.
pub enum OutputSegments<'a> {
    SingleSegment([&'a [u8]; 1]),
    MultiSegment(Vec<&'a [u8]>),
}

impl<'a> core::ops::Deref for OutputSegments<'a> {
    type Target = [&'a [u8]];
    fn deref(&self) -> &[&'a [u8]] {
        match self {
            OutputSegments::SingleSegment(s) => s,
            OutputSegments::MultiSegment(v) => v,
        }
    }
}
