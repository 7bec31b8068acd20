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

use capnp_copy::message;
use capnp_copy::{word, ErrorKind, Word};

fn total_size(segments: &[&[u8]]) -> capnp_copy::Result<capnp_copy::MessageSize> {
    let segment_array = message::SegmentArray::new(segments);
    let message = message::Reader::new(segment_array, Default::default());
    message.total_size()
}

#[test]
pub fn total_size_out_of_bounds() {
    let segment: &[Word] = &[
        // Struct pointer, no data, one pointer
        word(0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00),
        // Struct pointer far past the end of the segment
        word(0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00),
    ];

    assert_eq!(
        total_size(&[Word::words_to_bytes(segment)])
            .unwrap_err()
            .kind,
        ErrorKind::MessageContainsOutOfBoundsPointer
    );
}

#[test]
pub fn total_size_counts_tags_and_capabilities() {
    let segment: &[Word] = &[
        // Struct pointer, no data, two pointers
        word(0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x02, 0x00),
        // Capability 4
        word(0x03, 0x00, 0x00, 0x00, 0x04, 0x00, 0x00, 0x00),
        // Composite list immediately following, two words
        word(0x01, 0x00, 0x00, 0x00, 0x17, 0x00, 0x00, 0x00),
        // Tag word, two elements with one data word each
        word(0x08, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00),
        word(0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00),
        word(0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00),
    ];

    let size = total_size(&[Word::words_to_bytes(segment)]).unwrap();
    assert_eq!(size.word_count, 2 + 3);
    assert_eq!(size.cap_count, 1);
}

#[test]
pub fn total_size_of_null_root_is_zero() {
    let segment: &[Word] = &[word(0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00)];

    let size = total_size(&[Word::words_to_bytes(segment)]).unwrap();
    assert_eq!(size, capnp_copy::MessageSize::default());
}

#[test]
pub fn total_size_of_empty_segment() {
    let empty: &[u8] = &[];
    assert_eq!(
        total_size(&[empty]).unwrap_err().kind,
        ErrorKind::MessageContainsOutOfBoundsPointer
    );
}
