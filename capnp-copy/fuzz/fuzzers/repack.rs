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

#![no_main]

use capnp_copy::{message, Word};
use libfuzzer_sys::fuzz_target;

fn try_go(data: &[u8]) -> capnp_copy::Result<()> {
    let mut words = Word::allocate_zeroed_vec(data.len() / 8);
    let len = words.len() * 8;
    Word::words_to_bytes_mut(&mut words).copy_from_slice(&data[..len]);

    let segments = &[Word::words_to_bytes(&words)];
    let segment_array = message::SegmentArray::new(segments);
    let message = message::Reader::new(segment_array, Default::default());
    let repacked = message.repack()?;

    let segments = &[Word::words_to_bytes(&repacked)];
    let segment_array = message::SegmentArray::new(segments);
    let repacked_message = message::Reader::new(segment_array, Default::default());
    assert_eq!(repacked_message.total_size()?.word_count + 1, repacked.len() as u64);

    let repacked2 = repacked_message.repack()?;
    assert_eq!(repacked, repacked2);
    Ok(())
}

fuzz_target!(|data: &[u8]| {
    let _ = try_go(data);
});
