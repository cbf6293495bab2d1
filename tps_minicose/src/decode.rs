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
 * COSE CBOR Reader
 *
 * A pull-style deserializer for the CBOR subset COSE messages use. The reader keeps an explicit
 * cursor which can be saved and restored, which is what lets the engines re-try recipient
 * plugins against the same encoded item. All decoded byte and text strings borrow from the input
 * buffer. Indefinite-length items are rejected everywhere.
 **************************************************************************************************/
use crate::constants::*;
use crate::error::{CoseError, Result};

use std::str::from_utf8;

#[cfg(feature = "trace")]
use func_trace::trace;

#[cfg(feature = "trace")]
func_trace::init_depth_var!();

/// The broad classification of the next item in a [`DecodeBuffer`], used to dispatch header
/// parameter values by type.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum ItemKind {
    /// Positive integer (Major Type 0).
    UInt,
    /// Negative integer (Major Type 1).
    NInt,
    /// Byte string.
    Bstr,
    /// UTF-8 text string.
    Tstr,
    /// Array.
    Array,
    /// Map.
    Map,
    /// Tagged item.
    Tag,
    /// Simple value, including false/true/null/undefined.
    Simple,
    /// Half, single or double precision float.
    Float,
}

/// CBOR input cursor over a borrowed byte slice.
#[derive(Debug, Copy, Clone)]
pub struct DecodeBuffer<'buf> {
    bytes: &'buf [u8],
    index: usize,
}

impl<'buf> DecodeBuffer<'buf> {
    /// Construct a reader over `init`. The cursor starts at the first byte.
    #[inline]
    pub fn new(init: &'buf [u8]) -> DecodeBuffer<'buf> {
        DecodeBuffer {
            bytes: init,
            index: 0,
        }
    }

    /// Save the cursor so a later [`DecodeBuffer::reset`] can re-read from here.
    #[inline]
    pub fn mark(&self) -> usize {
        self.index
    }

    /// Restore a cursor previously obtained from [`DecodeBuffer::mark`].
    #[inline]
    pub fn reset(&mut self, mark: usize) {
        self.index = mark;
    }

    /// Number of bytes between the cursor and the end of input.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.index.min(self.bytes.len())
    }

    /// Return `true` once the whole input has been consumed.
    #[inline]
    pub fn at_end(&self) -> bool {
        self.remaining() == 0
    }

    /// Classify the next item without consuming it.
    pub fn kind(&self) -> Result<ItemKind> {
        let b = *self.bytes.get(self.index).ok_or(CoseError::EndOfBuffer)?;
        Ok(match b & MT_MASK {
            MT_UINT => ItemKind::UInt,
            MT_NINT => ItemKind::NInt,
            MT_BSTR => ItemKind::Bstr,
            MT_TSTR => ItemKind::Tstr,
            MT_ARRAY => ItemKind::Array,
            MT_MAP => ItemKind::Map,
            MT_TAG => ItemKind::Tag,
            _ => match b & AI_MASK {
                25..=27 => ItemKind::Float,
                _ => ItemKind::Simple,
            },
        })
    }

    /// Read a positive integer item.
    #[cfg_attr(feature = "trace", trace)]
    pub fn uint(&mut self) -> Result<u64> {
        let (mt, v) = self.head()?;
        if mt == MT_UINT {
            Ok(v)
        } else {
            Err(CoseError::ExpectedType("uint"))
        }
    }

    /// Read a positive or negative integer item as an `i64`.
    #[cfg_attr(feature = "trace", trace)]
    pub fn int(&mut self) -> Result<i64> {
        let (mt, v) = self.head()?;
        match mt {
            MT_UINT if v <= i64::MAX as u64 => Ok(v as i64),
            MT_NINT if v <= i64::MAX as u64 => Ok(-1 - (v as i64)),
            MT_UINT | MT_NINT => Err(CoseError::OutOfRange),
            _ => Err(CoseError::ExpectedType("int")),
        }
    }

    /// Read a byte string item. The returned slice borrows from the input.
    #[cfg_attr(feature = "trace", trace)]
    pub fn bstr(&mut self) -> Result<&'buf [u8]> {
        let (mt, len) = self.head()?;
        if mt != MT_BSTR {
            return Err(CoseError::ExpectedType("bstr"));
        }
        self.read_extent(len as usize)
    }

    /// Read a text string item. The returned slice borrows from the input.
    #[cfg_attr(feature = "trace", trace)]
    pub fn tstr(&mut self) -> Result<&'buf str> {
        let (mt, len) = self.head()?;
        if mt != MT_TSTR {
            return Err(CoseError::ExpectedType("tstr"));
        }
        from_utf8(self.read_extent(len as usize)?).map_err(|_| CoseError::UTF8Error)
    }

    /// Read the null simple value.
    pub fn null(&mut self) -> Result<()> {
        let b = *self.bytes.get(self.index).ok_or(CoseError::EndOfBuffer)?;
        if b == MT_SIMPLE | SIMPLE_NULL {
            self.index += 1;
            Ok(())
        } else {
            Err(CoseError::ExpectedType("null"))
        }
    }

    /// Read either a byte string or a null placeholder (detached content slot).
    pub fn bstr_or_null(&mut self) -> Result<Option<&'buf [u8]>> {
        match self.kind()? {
            ItemKind::Bstr => Ok(Some(self.bstr()?)),
            _ => {
                self.null()?;
                Ok(None)
            }
        }
    }

    /// Read an array header, returning the element count.
    #[cfg_attr(feature = "trace", trace)]
    pub fn array(&mut self) -> Result<usize> {
        let (mt, n) = self.head()?;
        if mt == MT_ARRAY {
            Ok(n as usize)
        } else {
            Err(CoseError::ExpectedType("array"))
        }
    }

    /// Read a map header, returning the pair count.
    #[cfg_attr(feature = "trace", trace)]
    pub fn map(&mut self) -> Result<usize> {
        let (mt, n) = self.head()?;
        if mt == MT_MAP {
            Ok(n as usize)
        } else {
            Err(CoseError::ExpectedType("map"))
        }
    }

    /// Consume a tag header if the next item carries one.
    pub fn opt_tag(&mut self) -> Result<Option<u64>> {
        if self.at_end() {
            return Err(CoseError::EndOfBuffer);
        }
        if self.kind()? == ItemKind::Tag {
            let (_, v) = self.head()?;
            Ok(Some(v))
        } else {
            Ok(None)
        }
    }

    /// Skip one complete item, including any nested content.
    #[cfg_attr(feature = "trace", trace)]
    pub fn skip(&mut self) -> Result<()> {
        let (mt, v) = self.head()?;
        match mt {
            MT_UINT | MT_NINT | MT_TAG => {
                if mt == MT_TAG {
                    self.skip()?;
                }
                Ok(())
            }
            MT_BSTR | MT_TSTR => {
                let _ = self.read_extent(v as usize)?;
                Ok(())
            }
            MT_ARRAY => self.skip_items(v as usize),
            MT_MAP => self.skip_items((v as usize) * 2),
            _ => {
                // Simple value or float; the argument bytes were consumed by head()
                Ok(())
            }
        }
    }

    /// Consume one complete item and return its raw encoded bytes.
    pub fn item_slice(&mut self) -> Result<&'buf [u8]> {
        let start = self.index;
        self.skip()?;
        Ok(&self.bytes[start..self.index])
    }

    /***********************************************************************************************
     * Private helpers
     **********************************************************************************************/

    /// Try to skip over N items, leaving the cursor at the start of the N+1 th item.
    fn skip_items(&mut self, n_items: usize) -> Result<()> {
        for _i in 0..n_items {
            self.skip()?;
        }
        Ok(())
    }

    /// Parse an item header. Returns the Major Type bits and the unsigned argument. For simple
    /// values and floats the argument is the AI payload; the float payload bytes are consumed.
    fn head(&mut self) -> Result<(u8, u64)> {
        let b = *self.bytes.get(self.index).ok_or(CoseError::EndOfBuffer)?;
        let mt = b & MT_MASK;
        let ai = b & AI_MASK;

        if ai == PAYLOAD_INDEFINITE {
            return match mt {
                MT_BSTR | MT_TSTR | MT_ARRAY | MT_MAP => Err(CoseError::IndefiniteLength),
                _ => Err(CoseError::MalformedEncoding),
            };
        }

        // Floats carry their payload in the argument bytes; skip over them.
        if mt == MT_SIMPLE && (25..=27).contains(&ai) {
            let extra = 1usize << (ai - 24);
            if self.index + 1 + extra > self.bytes.len() {
                return Err(CoseError::EndOfBuffer);
            }
            self.index += 1 + extra;
            return Ok((mt, ai as u64));
        }

        let (consumed, v) = match ai {
            0..=PAYLOAD_AI_BITS => (1, ai as u64),
            PAYLOAD_ONE_BYTE => (2, *self.bytes.get(self.index + 1).ok_or(CoseError::EndOfBuffer)? as u64),
            PAYLOAD_TWO_BYTES => (3, self.be_bytes(2)?),
            PAYLOAD_FOUR_BYTES => (5, self.be_bytes(4)?),
            PAYLOAD_EIGHT_BYTES => (9, self.be_bytes(8)?),
            _ => return Err(CoseError::MalformedEncoding),
        };
        self.index += consumed;
        Ok((mt, v))
    }

    /// Read `n` big-endian payload bytes following the MT/AI byte.
    fn be_bytes(&self, n: usize) -> Result<u64> {
        let start = self.index + 1;
        if start + n > self.bytes.len() {
            return Err(CoseError::EndOfBuffer);
        }
        let mut v: u64 = 0;
        for byte in &self.bytes[start..start + n] {
            v = (v << 8) | (*byte as u64);
        }
        Ok(v)
    }

    /// Return a slice of `length` bytes at the cursor, advancing past it.
    fn read_extent(&mut self, length: usize) -> Result<&'buf [u8]> {
        if self.index + length <= self.bytes.len() {
            let out = &self.bytes[self.index..self.index + length];
            self.index += length;
            Ok(out)
        } else {
            Err(CoseError::EndOfBuffer)
        }
    }
}
