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
 * CBOR reader test cases
 **************************************************************************************************/
extern crate tps_minicose;

use tps_minicose::decoder::{DecodeBuffer, ItemKind};
use tps_minicose::error::{CoseError, Result};

#[test]
fn reads_scalar_items() -> Result<()> {
    let input: &[u8] = &[0x18, 0x18, 0x26, 0x43, 0x01, 0x02, 0x03, 0x63, 0x61, 0x62, 0x63];
    let mut dec = DecodeBuffer::new(input);
    assert_eq!(dec.uint()?, 24);
    assert_eq!(dec.int()?, -7);
    assert_eq!(dec.bstr()?, &[1, 2, 3]);
    assert_eq!(dec.tstr()?, "abc");
    assert!(dec.at_end());
    Ok(())
}

#[test]
fn kind_classifies_without_consuming() -> Result<()> {
    let input: &[u8] = &[0xa1, 0x01, 0x26];
    let dec = DecodeBuffer::new(input);
    assert_eq!(dec.kind()?, ItemKind::Map);
    Ok(())
}

#[test]
fn mark_and_reset_rewind_the_cursor() -> Result<()> {
    let input: &[u8] = &[0x82, 0x01, 0x02];
    let mut dec = DecodeBuffer::new(input);
    assert_eq!(dec.array()?, 2);
    let m = dec.mark();
    assert_eq!(dec.uint()?, 1);
    dec.reset(m);
    assert_eq!(dec.uint()?, 1);
    assert_eq!(dec.uint()?, 2);
    Ok(())
}

#[test]
fn indefinite_lengths_are_rejected() {
    let mut dec = DecodeBuffer::new(&[0x9f, 0x01, 0xff]);
    assert_eq!(dec.array(), Err(CoseError::IndefiniteLength));
    let mut dec = DecodeBuffer::new(&[0x5f, 0x41, 0x00, 0xff]);
    assert_eq!(dec.bstr(), Err(CoseError::IndefiniteLength));
}

#[test]
fn truncated_input_is_end_of_buffer() {
    let mut dec = DecodeBuffer::new(&[0x43, 0x01, 0x02]);
    assert_eq!(dec.bstr(), Err(CoseError::EndOfBuffer));
    let mut dec = DecodeBuffer::new(&[0x19, 0x03]);
    assert_eq!(dec.uint(), Err(CoseError::EndOfBuffer));
}

#[test]
fn skip_handles_nesting() -> Result<()> {
    // {1: [1, 2], 2: h'00'} followed by 0x07
    let input: &[u8] = &[0xa2, 0x01, 0x82, 0x01, 0x02, 0x02, 0x41, 0x00, 0x07];
    let mut dec = DecodeBuffer::new(input);
    dec.skip()?;
    assert_eq!(dec.uint()?, 7);
    Ok(())
}

#[test]
fn item_slice_returns_raw_encoding() -> Result<()> {
    let input: &[u8] = &[0x82, 0x01, 0x02, 0x07];
    let mut dec = DecodeBuffer::new(input);
    assert_eq!(dec.item_slice()?, &[0x82, 0x01, 0x02]);
    assert_eq!(dec.uint()?, 7);
    Ok(())
}

#[test]
fn bstr_or_null_handles_detached_slot() -> Result<()> {
    let mut dec = DecodeBuffer::new(&[0xf6, 0x41, 0x07]);
    assert_eq!(dec.bstr_or_null()?, None);
    assert_eq!(dec.bstr_or_null()?, Some(&[0x07u8][..]));
    Ok(())
}

#[test]
fn opt_tag_only_consumes_tags() -> Result<()> {
    let mut dec = DecodeBuffer::new(&[0xd2, 0x41, 0x07]);
    assert_eq!(dec.opt_tag()?, Some(18));
    assert_eq!(dec.opt_tag()?, None);
    assert_eq!(dec.bstr()?, &[0x07]);
    Ok(())
}

#[test]
fn invalid_utf8_tstr_rejected() {
    let mut dec = DecodeBuffer::new(&[0x62, 0xff, 0xfe]);
    assert_eq!(dec.tstr(), Err(CoseError::UTF8Error));
}
