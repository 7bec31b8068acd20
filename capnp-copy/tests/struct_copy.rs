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

use capnp_copy::message::{self, AllocationStrategy, HeapAllocator};
use capnp_copy::{word, ErrorKind, StructSize, Word};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn copy_root_struct(segment: &[Word], size: StructSize) -> capnp_copy::Result<Vec<u8>> {
    let segments = &[Word::words_to_bytes(segment)];
    let segment_array = message::SegmentArray::new(segments);
    let reader = message::Reader::new(segment_array, Default::default());

    let mut builder = message::Builder::new_default();
    builder.set_root_struct_copy(&reader, size)?;
    let output = builder.get_segments_for_output();
    assert_eq!(output.len(), 1);
    Ok(output[0].to_vec())
}

#[test]
fn upgrade_zero_fills_new_sections() {
    init_logging();
    let segment: &[Word] = &[
        // Struct pointer, one data word
        word(0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00),
        word(0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11),
    ];

    let copied = copy_root_struct(
        segment,
        StructSize {
            data: 16,
            pointers: 8,
        },
    )
    .unwrap();
    let expected: &[Word] = &[
        // Struct pointer, two data words, one pointer
        word(0x00, 0x00, 0x00, 0x00, 0x02, 0x00, 0x01, 0x00),
        word(0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11),
        word(0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00),
        word(0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00),
    ];
    assert_eq!(&copied[..], Word::words_to_bytes(expected));
}

#[test]
fn downgrade_drops_trailing_sections() {
    init_logging();
    let segment: &[Word] = &[
        // Struct pointer, two data words, two pointers
        word(0x00, 0x00, 0x00, 0x00, 0x02, 0x00, 0x02, 0x00),
        word(0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11),
        word(0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22),
        // Struct pointers, each one word ahead, one data word
        word(0x04, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00),
        word(0x04, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00),
        word(0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa),
        word(0xbb, 0xbb, 0xbb, 0xbb, 0xbb, 0xbb, 0xbb, 0xbb),
    ];

    let copied = copy_root_struct(
        segment,
        StructSize {
            data: 8,
            pointers: 8,
        },
    )
    .unwrap();
    let expected: &[Word] = &[
        // Struct pointer, one data word, one pointer
        word(0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x01, 0x00),
        word(0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11),
        word(0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00),
        word(0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa),
    ];
    assert_eq!(&copied[..], Word::words_to_bytes(expected));
}

#[test]
fn data_size_is_rounded_up_to_words() {
    init_logging();
    let segment: &[Word] = &[
        word(0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00),
        word(0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11),
    ];

    let copied = copy_root_struct(
        segment,
        StructSize {
            data: 9,
            pointers: 0,
        },
    )
    .unwrap();
    let expected: &[Word] = &[
        word(0x00, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00),
        word(0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11),
        word(0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00),
    ];
    assert_eq!(&copied[..], Word::words_to_bytes(expected));
}

#[test]
fn empty_destination_struct() {
    init_logging();
    let segment: &[Word] = &[
        word(0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00),
        word(0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11),
    ];

    let copied = copy_root_struct(segment, StructSize::default()).unwrap();
    assert_eq!(&copied[..], &[0xfc, 0xff, 0xff, 0xff, 0, 0, 0, 0]);
}

#[test]
fn null_root_stays_null() {
    init_logging();
    let segment: &[Word] = &[word(0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00)];

    let copied = copy_root_struct(
        segment,
        StructSize {
            data: 8,
            pointers: 8,
        },
    )
    .unwrap();
    assert_eq!(&copied[..], &[0; 8]);
}

#[test]
fn list_root_is_rejected() {
    init_logging();
    let segment: &[Word] = &[
        // Byte list of three elements
        word(0x01, 0x00, 0x00, 0x00, 0x1a, 0x00, 0x00, 0x00),
        word(0x61, 0x62, 0x63, 0x00, 0x00, 0x00, 0x00, 0x00),
    ];

    let err = copy_root_struct(segment, StructSize::default()).unwrap_err();
    assert_eq!(
        err.kind,
        ErrorKind::MessageContainsNonStructPointerWhereStructPointerWasExpected
    );
    let message: String = err.into();
    assert_eq!(
        message,
        "Message contains non-struct pointer where struct pointer was expected."
    );
}

#[test]
fn oversized_destination_is_rejected() {
    init_logging();
    let segment: &[Word] = &[
        word(0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00),
        word(0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11),
    ];

    // The largest encodable size does not fit the first segment and lands in a second one.
    let segments = &[Word::words_to_bytes(segment)];
    let reader = message::Reader::new(message::SegmentArray::new(segments), Default::default());
    let mut builder = message::Builder::new_default();
    let size = StructSize {
        data: 8 * 65535,
        pointers: 8 * 65535,
    };
    builder.set_root_struct_copy(&reader, size).unwrap();
    assert_eq!(
        builder.into_reader().total_size().unwrap().word_count,
        2 * 65535
    );

    let size = StructSize {
        data: 8 * 65536,
        pointers: 0,
    };
    assert_eq!(
        copy_root_struct(segment, size).unwrap_err().kind,
        ErrorKind::StructSizeTooLarge(65536)
    );

    let size = StructSize {
        data: 8,
        pointers: 8 * 65536,
    };
    assert_eq!(
        copy_root_struct(segment, size).unwrap_err().kind,
        ErrorKind::StructSizeTooLarge(65536)
    );
}

#[test]
fn data_size_near_u32_max_is_rejected() {
    init_logging();
    let segment: &[Word] = &[
        word(0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00),
        word(0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11),
    ];

    for data in [u32::MAX - 6, u32::MAX] {
        let size = StructSize { data, pointers: 0 };
        assert_eq!(
            copy_root_struct(segment, size).unwrap_err().kind,
            ErrorKind::StructSizeTooLarge(1 << 29)
        );
    }
    let size = StructSize {
        data: 0,
        pointers: u32::MAX,
    };
    assert_eq!(
        copy_root_struct(segment, size).unwrap_err().kind,
        ErrorKind::StructSizeTooLarge(1 << 29)
    );
}

#[test]
fn pointer_section_is_rounded_up_to_words() {
    init_logging();
    let segment: &[Word] = &[
        word(0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00),
        word(0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11),
    ];

    let copied = copy_root_struct(
        segment,
        StructSize {
            data: 8,
            pointers: 9,
        },
    )
    .unwrap();
    let expected: &[Word] = &[
        // Struct pointer, one data word, two pointers
        word(0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x02, 0x00),
        word(0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11),
        word(0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00),
        word(0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00),
    ];
    assert_eq!(&copied[..], Word::words_to_bytes(expected));
}

#[test]
fn copy_spills_into_new_segment() {
    init_logging();
    let segment: &[Word] = &[
        // Struct pointer, two data words
        word(0x00, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00),
        word(0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11),
        word(0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22),
    ];
    let segments = &[Word::words_to_bytes(segment)];
    let reader = message::Reader::new(message::SegmentArray::new(segments), Default::default());

    // Two-word segments leave no room for the struct beside the root pointer.
    let allocator = HeapAllocator::new()
        .first_segment_words(2)
        .allocation_strategy(AllocationStrategy::FixedSize);
    let mut builder = message::Builder::new(allocator);
    builder.set_root_copy(&reader).unwrap();

    {
        let output = builder.get_segments_for_output();
        assert_eq!(output.len(), 2);
        let segment0: &[Word] = &[
            // Far pointer to word 0 of segment 1
            word(0x02, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00),
        ];
        let segment1: &[Word] = &[
            // Landing pad
            word(0x00, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00),
            word(0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11),
            word(0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22),
        ];
        assert_eq!(output[0], Word::words_to_bytes(segment0));
        assert_eq!(output[1], Word::words_to_bytes(segment1));
    }

    let repacked = builder.into_reader().repack().unwrap();
    assert_eq!(&repacked[..], segment);
}

#[test]
fn copy_of_a_copy_keeps_its_size() {
    init_logging();
    let segment: &[Word] = &[
        word(0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00),
        word(0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11),
    ];
    let segments = &[Word::words_to_bytes(segment)];
    let reader = message::Reader::new(message::SegmentArray::new(segments), Default::default());

    let mut upgraded = message::Builder::new_default();
    upgraded
        .set_root_struct_copy(
            &reader,
            StructSize {
                data: 24,
                pointers: 16,
            },
        )
        .unwrap();
    let upgraded = upgraded.into_reader();
    let size = upgraded.total_size().unwrap();
    assert_eq!(size.word_count, 5);
    assert_eq!(size.cap_count, 0);

    let mut copied = message::Builder::new_default();
    copied.set_root_copy(&upgraded).unwrap();
    assert_eq!(
        copied.get_segments_for_output()[0],
        upgraded.into_segments().get_segments_for_output()[0]
    );
}
