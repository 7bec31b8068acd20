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

//! Deep copies of pointed-to objects from a reader arena into a builder arena.
//!
//! `copy_pointer` is the entry point for one pointer slot. It recurses through
//! `copy_struct` and `copy_nonbool_list` into every pointer slot below it,
//! adding one to `level` per slot. `level` is only passed along; the reading
//! arena decides what depth is too deep.
//!
//! Everything here moves bytes. Decoding pointer words, following far pointers,
//! and allocating destination objects belong to the helpers in `layout`.

use crate::private::arena::{BuilderArena, ReaderArena};
use crate::private::layout::{
    self, ListEncoding, ListLayout, Location, Pointer, StructLayout, StructSize, WirePointer,
    WirePointerKind,
};
use crate::private::units::*;
use crate::Result;

/// Builds the tag word that precedes the elements of a composite list.
///
/// The tag is derived from metadata alone: `length << 2` in the lower half, which
/// leaves the struct kind bits at zero, and the packed element size in the upper half.
pub fn list_tag(length: ElementCount32, size: StructSize) -> WirePointer {
    let mut tag = WirePointer::default();
    tag.set_kind_and_inline_composite_list_element_count(WirePointerKind::Struct, length);
    tag.set_struct_size(size);
    tag
}

pub fn write_list_tag(
    target_arena: &mut dyn BuilderArena,
    target: Location,
    length: ElementCount32,
    size: StructSize,
) {
    target_arena.write(&list_tag(length, size).to_bytes(), target);
}

/// Copies the object behind the pointer at `source` into `target_arena`, and points the
/// pointer slot at `target` to the copy. A null source yields a null target.
pub fn copy_pointer(
    arena: &dyn ReaderArena,
    source: Location,
    level: u32,
    target_arena: &mut dyn BuilderArena,
    target: Location,
) -> Result<()> {
    if layout::is_null(arena, source)? {
        target_arena.zero(target, BYTES_PER_POINTER);
        return Ok(());
    }

    match layout::read_pointer(arena, source, level)? {
        Pointer::Struct(layout) => {
            let object = layout::init_struct_pointer(target_arena, target, layout.size)?;
            copy_struct(arena, &layout, level, target_arena, object)
        }
        Pointer::List(layout) => {
            let object = layout::init_list_pointer(target_arena, target, &layout)?;
            if layout.encoding == ListEncoding::Bit {
                copy_bool_list(arena, &layout, target_arena, object, layout.body_bytes())
            } else {
                copy_nonbool_list(
                    arena,
                    &layout,
                    level,
                    target_arena,
                    object,
                    layout.body_bytes(),
                )
            }
        }
        Pointer::Other(upper32bits) => {
            // Far pointers have been followed by now, so this is a capability. Its index
            // is carried over as is.
            let mut pointer = WirePointer::default();
            pointer.set_cap(upper32bits);
            target_arena.write(&pointer.to_bytes(), target);
            Ok(())
        }
    }
}

/// Copies a struct into `object`, which has room for a struct of the same size.
pub fn copy_struct(
    arena: &dyn ReaderArena,
    layout: &StructLayout,
    level: u32,
    target_arena: &mut dyn BuilderArena,
    object: Location,
) -> Result<()> {
    let segment = arena.get_segment(layout.segment_id)?;
    target_arena.write(&segment[layout.data_section..layout.pointers_section], object);

    let mut target = object.offset_by(layout.size.data as ByteCount);
    for source in layout.pointer_slots() {
        copy_pointer(arena, source, level + 1, target_arena, target)?;
        target = target.offset_by(BYTES_PER_POINTER);
    }
    Ok(())
}

/// Copies a struct into `object`, which has room for a struct of size `fixed`.
///
/// The data section and the pointer section are fitted independently: a section that
/// is smaller in the source is copied whole and the rest of the destination section is
/// zeroed, while a section that is larger in the source is cut off at the size `fixed` gives.
pub fn copy_fixed_width_struct(
    arena: &dyn ReaderArena,
    layout: &StructLayout,
    level: u32,
    target_arena: &mut dyn BuilderArena,
    object: Location,
    fixed: StructSize,
) -> Result<()> {
    let segment = arena.get_segment(layout.segment_id)?;
    let data = layout.data_section;

    if layout.size.data < fixed.data {
        target_arena.write(&segment[data..layout.pointers_section], object);
        target_arena.zero(
            object.offset_by(layout.size.data as ByteCount),
            (fixed.data - layout.size.data) as ByteCount,
        );
    } else {
        target_arena.write(&segment[data..data + fixed.data as ByteCount], object);
    }

    let mut target = object.offset_by(fixed.data as ByteCount);
    if layout.size.pointers < fixed.pointers {
        for source in layout.pointer_slots() {
            copy_pointer(arena, source, level + 1, target_arena, target)?;
            target = target.offset_by(BYTES_PER_POINTER);
        }
        target_arena.zero(
            target,
            (fixed.pointers - layout.size.pointers) as ByteCount,
        );
    } else {
        for source in layout.pointer_slots().take(fixed.pointer_count() as usize) {
            copy_pointer(arena, source, level + 1, target_arena, target)?;
            target = target.offset_by(BYTES_PER_POINTER);
        }
    }
    Ok(())
}

/// Copies the `bytes` word-aligned bytes of a bit list verbatim.
pub fn copy_bool_list(
    arena: &dyn ReaderArena,
    layout: &ListLayout,
    target_arena: &mut dyn BuilderArena,
    object: Location,
    bytes: ByteCount,
) -> Result<()> {
    let segment = arena.get_segment(layout.segment_id)?;
    target_arena.write(&segment[layout.begin..layout.begin + bytes], object);
    Ok(())
}

/// Copies the `bytes` bytes of list elements into `object`.
///
/// For a composite list `bytes` excludes the tag. The destination tag at `object` is
/// rebuilt from the layout and the elements follow it.
pub fn copy_nonbool_list(
    arena: &dyn ReaderArena,
    layout: &ListLayout,
    level: u32,
    target_arena: &mut dyn BuilderArena,
    object: Location,
    bytes: ByteCount,
) -> Result<()> {
    match layout.encoding {
        ListEncoding::InlineComposite(size) => {
            write_list_tag(target_arena, object, layout.length, size);

            let width = size.total_bytes();
            if width == 0 {
                return Ok(());
            }
            let elements = object.offset_by(BYTES_PER_POINTER);
            for position in (0..bytes).step_by(width) {
                let element = StructLayout::new(layout.segment_id, layout.begin + position, size);
                // Elements are inline, so they stay at this list's level.
                copy_struct(
                    arena,
                    &element,
                    level,
                    target_arena,
                    elements.offset_by(position),
                )?;
            }
            Ok(())
        }
        ListEncoding::Pointer => {
            for position in (0..bytes).step_by(BYTES_PER_POINTER) {
                copy_pointer(
                    arena,
                    Location::new(layout.segment_id, layout.begin + position),
                    level + 1,
                    target_arena,
                    object.offset_by(position),
                )?;
            }
            Ok(())
        }
        ListEncoding::Void
        | ListEncoding::Bit
        | ListEncoding::Byte
        | ListEncoding::TwoBytes
        | ListEncoding::FourBytes
        | ListEncoding::EightBytes => {
            let segment = arena.get_segment(layout.segment_id)?;
            target_arena.write(&segment[layout.begin..layout.begin + bytes], object);
            Ok(())
        }
    }
}
