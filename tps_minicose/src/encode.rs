/***************************************************************************************************
 * Copyright (c) 2022-2023, Qualcomm Innovation Center, Inc. All rights reserved.
 *
 * Permission is hereby granted, free of charge, to any person obtaining a copy of this software
 * and associated documentation files (the “Software”), to deal in the Software without
 * restriction, including without limitation the rights to use, copy, modify, merge, publish,
 * distribute, sublicense, and/or sell copies of the Software, and to permit persons to whom the
 * Software is furnished to do so, subject to the following conditions:
 *
 * The above copyright notice and this permission notice (including the next
 * paragraph) shall be included in all copies or substantial portions of the
 * Software.
 *
 * THE SOFTWARE IS PROVIDED “AS IS”, WITHOUT WARRANTY OF ANY KIND, EXPRESS OR IMPLIED, INCLUDING
 * BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY, FITNESS FOR A PARTICULAR PURPOSE AND
 * NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM,
 * DAMAGES OR OTHER LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
 * OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE SOFTWARE.
 **************************************************************************************************/
/***************************************************************************************************
 * COSE CBOR Writer
 *
 * A serializer for the CBOR subset COSE messages use: definite-length integers, byte and text
 * strings, arrays, maps, tags and null. Writes happen on a caller-provided byte buffer, or on no
 * buffer at all, in which case only the encoded size is tracked. The size-only mode is how every
 * encode path answers "how big an output buffer do I need" without a second implementation.
 **************************************************************************************************/
use crate::constants::*;
use crate::error::{CoseError, Result};

#[cfg(feature = "trace")]
use func_trace::trace;

#[cfg(feature = "trace")]
func_trace::init_depth_var!();

/// A `(start, len)` range identifying bytes already written to an [`EncodeBuffer`].
///
/// Spans stay valid across later writes because the writer is append-only apart from the
/// bstr-wrap fix-up, which returns the corrected span.
#[derive(Debug, Default, Copy, Clone, PartialEq)]
pub struct Span {
    pub(crate) start: usize,
    pub(crate) len: usize,
}

impl Span {
    /// Length in bytes of the spanned region.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Return `true` if the span covers no bytes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Context for a byte-string wrap opened with [`EncodeBuffer::bstr_wrap_start`].
///
/// Holds the position of the reserved length header so that the wrap can be fixed up once the
/// content size is known.
#[derive(Debug, Copy, Clone)]
pub struct WrapContext {
    head_index: usize,
    content_start: usize,
}

/// CBOR output buffer.
///
/// Constructed over a mutable byte slice, or with [`EncodeBuffer::size_only`] over no storage at
/// all. In the latter case every write succeeds and only advances the byte count, which
/// [`EncodeBuffer::len`] then reports as the required output size.
#[derive(Debug)]
pub struct EncodeBuffer<'buf> {
    bytes: Option<&'buf mut [u8]>,
    index: usize,
}

impl<'buf> EncodeBuffer<'buf> {
    /// Construct an instance of `EncodeBuffer` over a caller buffer.
    ///
    /// The buffer is cleared on each instantiation of `EncodeBuffer`. This allows the same
    /// underlying mutable buffer to be re-used.
    #[inline]
    pub fn new(b: &'buf mut [u8]) -> EncodeBuffer<'buf> {
        b.fill(0);
        EncodeBuffer {
            bytes: Some(b),
            index: 0,
        }
    }

    /// Construct a size-calculation instance with no backing storage.
    #[inline]
    pub fn size_only() -> EncodeBuffer<'static> {
        EncodeBuffer {
            bytes: None,
            index: 0,
        }
    }

    /// Return `true` when this buffer only counts bytes.
    #[inline]
    pub fn is_size_only(&self) -> bool {
        self.bytes.is_none()
    }

    /// Number of bytes written (or counted) so far.
    #[inline]
    pub fn len(&self) -> usize {
        self.index
    }

    /// Return `true` if nothing has been written.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.index == 0
    }

    /// Return a slice containing the encoded output. Empty in size-only mode.
    pub fn encoded(&self) -> Result<&[u8]> {
        match &self.bytes {
            Some(b) => Ok(&b[0..self.index]),
            None => Ok(&[]),
        }
    }

    /// Read back a previously written region. Empty in size-only mode or if the span is
    /// inconsistent with what has been written.
    pub fn written(&self, span: Span) -> &[u8] {
        match &self.bytes {
            Some(b) if span.start + span.len <= self.index => &b[span.start..span.start + span.len],
            _ => &[],
        }
    }

    /// Mutable view of a previously written region, used for in-place AEAD operations.
    /// Empty in size-only mode.
    pub fn written_mut(&mut self, span: Span) -> &mut [u8] {
        let index = self.index;
        match &mut self.bytes {
            Some(b) if span.start + span.len <= index => &mut b[span.start..span.start + span.len],
            _ => &mut [],
        }
    }

    /***********************************************************************************************
     * Item writers
     **********************************************************************************************/

    /// Encode an unsigned integer as Major Type 0, preferred serialization.
    #[inline]
    #[cfg_attr(feature = "trace", trace)]
    pub fn uint(&mut self, v: u64) -> Result<()> {
        self.head(MT_UINT, v)
    }

    /// Encode a signed integer as Major Type 0 or 1, preferred serialization.
    #[cfg_attr(feature = "trace", trace)]
    pub fn int(&mut self, v: i64) -> Result<()> {
        if v < 0 {
            self.head(MT_NINT, (-1 - v) as u64)
        } else {
            self.head(MT_UINT, v as u64)
        }
    }

    /// Encode a byte string.
    #[cfg_attr(feature = "trace", trace)]
    pub fn bstr(&mut self, bytes: &[u8]) -> Result<()> {
        let extra = self.encode_unsigned(bytes.len() as u64)?;
        self.set_mt(MT_BSTR);
        self.write_slice_at_offset(1 + extra, bytes)?;
        self.advance(1 + extra + bytes.len())
    }

    /// Encode a zero-filled byte string of `len` bytes. Used for signature placeholders in
    /// size-only mode and for items whose content is produced in place afterwards.
    #[cfg_attr(feature = "trace", trace)]
    pub fn bstr_pad(&mut self, len: usize) -> Result<Span> {
        let extra = self.encode_unsigned(len as u64)?;
        self.set_mt(MT_BSTR);
        self.fill_at_offset(1 + extra, len)?;
        let start = self.index + 1 + extra;
        self.advance(1 + extra + len)?;
        Ok(Span { start, len })
    }

    /// Encode a text string.
    #[cfg_attr(feature = "trace", trace)]
    pub fn tstr(&mut self, s: &str) -> Result<()> {
        let extra = self.encode_unsigned(s.len() as u64)?;
        self.set_mt(MT_TSTR);
        self.write_slice_at_offset(1 + extra, s.as_bytes())?;
        self.advance(1 + extra + s.len())
    }

    /// Encode the null simple value.
    pub fn null(&mut self) -> Result<()> {
        self.write_byte_at_offset(0, MT_SIMPLE | SIMPLE_NULL)?;
        self.advance(1)
    }

    /// Encode an array header for `n` items. The items themselves follow.
    #[inline]
    pub fn array(&mut self, n: usize) -> Result<()> {
        self.head(MT_ARRAY, n as u64)
    }

    /// Encode a map header for `n_pairs` key/value pairs. The pairs themselves follow.
    #[inline]
    pub fn map(&mut self, n_pairs: usize) -> Result<()> {
        self.head(MT_MAP, n_pairs as u64)
    }

    /// Tag the next CBOR item. If there is no following item, the CBOR will be mal-formed.
    #[inline]
    pub fn tag(&mut self, tag: u64) -> Result<()> {
        self.head(MT_TAG, tag)
    }

    /// Insert pre-encoded CBOR verbatim.
    #[cfg_attr(feature = "trace", trace)]
    pub fn raw(&mut self, encoded: &[u8]) -> Result<()> {
        self.write_slice_at_offset(0, encoded)?;
        self.advance(encoded.len())
    }

    /***********************************************************************************************
     * Byte-string wrapping
     *
     * The protected header bucket and a streamed payload are emitted as a bstr whose length is
     * unknown until the content has been written. A single header byte is reserved up front; if
     * the content turns out to need a longer length encoding, the content is moved up to make
     * room. This is a consequence of not knowing sizes a-priori.
     **********************************************************************************************/

    /// Open a byte-string wrap around content that will be written next.
    pub fn bstr_wrap_start(&mut self) -> Result<WrapContext> {
        let head_index = self.index;
        self.advance(1)?;
        Ok(WrapContext {
            head_index,
            content_start: head_index + 1,
        })
    }

    /// Close a byte-string wrap, fixing up the length header. Returns the span of the wrapped
    /// content (not including the bstr header).
    pub fn bstr_wrap_finalize(&mut self, ctx: WrapContext) -> Result<Span> {
        let content_len = self.index - ctx.content_start;
        let extra = match content_len {
            0..=23 => 0,
            24..=0xff => 1,
            0x100..=0xffff => 2,
            0x1_0000..=0xffff_ffff => 4,
            _ => 8,
        };

        if extra > 0 {
            self.move_up(ctx.content_start, ctx.content_start + extra, content_len)?;
        }
        let end = ctx.content_start + extra + content_len;

        // Go back and write the bstr header now that the length is known.
        self.index = ctx.head_index;
        let _ = self.encode_unsigned(content_len as u64)?;
        self.set_mt(MT_BSTR);
        self.index = end;

        Ok(Span {
            start: ctx.content_start + extra,
            len: content_len,
        })
    }

    /***********************************************************************************************
     * Private helpers
     **********************************************************************************************/

    /// Write an item header: Major Type plus unsigned argument, preferred serialization.
    fn head(&mut self, mt: u8, v: u64) -> Result<()> {
        let extra = self.encode_unsigned(v)?;
        self.set_mt(mt);
        self.advance(1 + extra)
    }

    /// Encode an unsigned argument at the current index, leaving the Major Type bits clear.
    /// Returns the number of payload bytes following the MT/AI byte. Does not advance.
    fn encode_unsigned(&mut self, v: u64) -> Result<usize> {
        let vs = v.to_be_bytes();
        if v < 24 {
            self.write_byte_at_offset(0, vs[7])?;
            Ok(0)
        } else if v <= u8::MAX as u64 {
            self.write_byte_at_offset(0, PAYLOAD_ONE_BYTE)?;
            self.write_byte_at_offset(1, vs[7])?;
            Ok(1)
        } else if v <= u16::MAX as u64 {
            self.write_byte_at_offset(0, PAYLOAD_TWO_BYTES)?;
            self.write_slice_at_offset(1, &vs[6..=7])?;
            Ok(2)
        } else if v <= u32::MAX as u64 {
            self.write_byte_at_offset(0, PAYLOAD_FOUR_BYTES)?;
            self.write_slice_at_offset(1, &vs[4..=7])?;
            Ok(4)
        } else {
            self.write_byte_at_offset(0, PAYLOAD_EIGHT_BYTES)?;
            self.write_slice_at_offset(1, &vs[0..=7])?;
            Ok(8)
        }
    }

    /// Set the Major Type. Assumes that `index` is at the `MT/AI` byte.
    #[inline]
    fn set_mt(&mut self, mt: u8) {
        let index = self.index;
        if let Some(b) = &mut self.bytes {
            if index < b.len() {
                b[index] |= mt;
            }
        }
    }

    #[inline]
    fn advance(&mut self, len: usize) -> Result<()> {
        self.index += len;
        Ok(())
    }

    /// Write a byte at an `offset` from the current `index`. Counting-only when sizing.
    fn write_byte_at_offset(&mut self, offset: usize, val: u8) -> Result<()> {
        match &mut self.bytes {
            Some(b) => {
                let at = self.index + offset;
                if at < b.len() {
                    b[at] = val;
                    Ok(())
                } else {
                    Err(CoseError::BufferTooSmall)
                }
            }
            None => Ok(()),
        }
    }

    /// Write a slice at an `offset` from the current `index`. Counting-only when sizing.
    fn write_slice_at_offset(&mut self, offset: usize, src: &[u8]) -> Result<()> {
        match &mut self.bytes {
            Some(b) => {
                let at = self.index + offset;
                if at + src.len() <= b.len() {
                    b[at..at + src.len()].copy_from_slice(src);
                    Ok(())
                } else {
                    Err(CoseError::BufferTooSmall)
                }
            }
            None => Ok(()),
        }
    }

    /// Zero-fill `len` bytes at an `offset` from the current `index`.
    fn fill_at_offset(&mut self, offset: usize, len: usize) -> Result<()> {
        match &mut self.bytes {
            Some(b) => {
                let at = self.index + offset;
                if at + len <= b.len() {
                    b[at..at + len].fill(0);
                    Ok(())
                } else {
                    Err(CoseError::BufferTooSmall)
                }
            }
            None => Ok(()),
        }
    }

    /// Move `len` bytes from `src_index` up to `dst_index`, where `src_index` < `dst_index`.
    fn move_up(&mut self, src_index: usize, dst_index: usize, len: usize) -> Result<()> {
        match &mut self.bytes {
            Some(b) => {
                if dst_index + len <= b.len() {
                    for i in (0..len).rev() {
                        b[dst_index + i] = b[src_index + i];
                    }
                    Ok(())
                } else {
                    Err(CoseError::BufferTooSmall)
                }
            }
            None => Ok(()),
        }
    }
}

/// Encode a single item header into `out`, returning the number of bytes used. This is how the
/// incremental TBS builder feeds structure framing into a hash without a full buffer.
pub(crate) fn head_bytes(mt: u8, v: u64, out: &mut [u8; 9]) -> usize {
    let vs = v.to_be_bytes();
    if v < 24 {
        out[0] = mt | vs[7];
        1
    } else if v <= u8::MAX as u64 {
        out[0] = mt | PAYLOAD_ONE_BYTE;
        out[1] = vs[7];
        2
    } else if v <= u16::MAX as u64 {
        out[0] = mt | PAYLOAD_TWO_BYTES;
        out[1..3].copy_from_slice(&vs[6..=7]);
        3
    } else if v <= u32::MAX as u64 {
        out[0] = mt | PAYLOAD_FOUR_BYTES;
        out[1..5].copy_from_slice(&vs[4..=7]);
        5
    } else {
        out[0] = mt | PAYLOAD_EIGHT_BYTES;
        out[1..9].copy_from_slice(&vs[0..=7]);
        9
    }
}
