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
 * CBOR writer test cases
 *
 * Preferred-serialization cases from RFC 8949 Table 6, plus the byte-string wrap fix-ups and
 * the size-only mode the COSE engines rely on.
 **************************************************************************************************/
extern crate tps_minicose;

use tps_minicose::encoder::EncodeBuffer;
use tps_minicose::error::Result;

#[test]
fn rfc8949_preferred_serialization() -> Result<()> {
    let mut bytes = [0u8; 32];

    for (val, expect) in [
        (0u64, &[0x00u8][..]),
        (1, &[0x01]),
        (10, &[0x0a]),
        (23, &[0x17]),
        (24, &[0x18, 0x18]),
        (25, &[0x18, 0x19]),
        (100, &[0x18, 0x64]),
        (1000, &[0x19, 0x03, 0xe8]),
        (1000000, &[0x1a, 0x00, 0x0f, 0x42, 0x40]),
        (1000000000000, &[0x1b, 0x00, 0x00, 0x00, 0xe8, 0xd4, 0xa5, 0x10, 0x00]),
    ]
    .iter()
    {
        let mut buf = EncodeBuffer::new(&mut bytes);
        buf.uint(*val)?;
        assert_eq!(buf.encoded()?, *expect);
    }

    for (val, expect) in [
        (-1i64, &[0x20u8][..]),
        (-7, &[0x26]),
        (-10, &[0x29]),
        (-100, &[0x38, 0x63]),
        (-1000, &[0x39, 0x03, 0xe7]),
    ]
    .iter()
    {
        let mut buf = EncodeBuffer::new(&mut bytes);
        buf.int(*val)?;
        assert_eq!(buf.encoded()?, *expect);
    }
    Ok(())
}

#[test]
fn strings_arrays_maps_tags() -> Result<()> {
    let mut bytes = [0u8; 64];
    let mut buf = EncodeBuffer::new(&mut bytes);
    buf.tag(18)?;
    buf.array(4)?;
    buf.bstr(&[0xa1, 0x01, 0x26])?;
    buf.map(1)?;
    buf.int(4)?;
    buf.bstr(b"11")?;
    buf.tstr("IETF")?;
    buf.null()?;
    assert_eq!(
        buf.encoded()?,
        &[
            0xd2, 0x84, 0x43, 0xa1, 0x01, 0x26, 0xa1, 0x04, 0x42, 0x31, 0x31, 0x64, 0x49, 0x45,
            0x54, 0x46, 0xf6
        ][..]
    );
    Ok(())
}

#[test]
fn size_only_matches_real_encode() -> Result<()> {
    fn fill(buf: &mut EncodeBuffer) -> Result<()> {
        buf.array(4)?;
        buf.bstr(&[0xa1, 0x01, 0x26])?;
        buf.map(0)?;
        buf.tstr("hello")?;
        buf.int(-99)
    }
    let mut bytes = [0u8; 64];
    let mut real = EncodeBuffer::new(&mut bytes);
    let mut size = EncodeBuffer::size_only();
    fill(&mut real)?;
    fill(&mut size)?;
    assert_eq!(real.len(), size.len());
    assert!(size.is_size_only());
    assert!(size.encoded()?.is_empty());
    Ok(())
}

#[test]
fn bstr_wrap_fixup_moves_long_content() -> Result<()> {
    let mut bytes = [0u8; 64];
    let mut buf = EncodeBuffer::new(&mut bytes);
    let ctx = buf.bstr_wrap_start()?;
    let content = [0xabu8; 30];
    buf.raw(&content)?;
    let span = buf.bstr_wrap_finalize(ctx)?;
    assert_eq!(span.len(), 30);
    let encoded = buf.encoded()?;
    assert_eq!(encoded[0], 0x58);
    assert_eq!(encoded[1], 30);
    assert_eq!(&encoded[2..32], &content[..]);
    Ok(())
}

#[test]
fn wrap_of_empty_content_is_zero_length_bstr() -> Result<()> {
    let mut bytes = [0u8; 8];
    let mut buf = EncodeBuffer::new(&mut bytes);
    let ctx = buf.bstr_wrap_start()?;
    let span = buf.bstr_wrap_finalize(ctx)?;
    assert!(span.is_empty());
    assert_eq!(buf.encoded()?, &[0x40]);
    Ok(())
}

#[test]
fn written_reads_back_spans() -> Result<()> {
    let mut bytes = [0u8; 32];
    let mut buf = EncodeBuffer::new(&mut bytes);
    let ctx = buf.bstr_wrap_start()?;
    buf.raw(&[0xa1, 0x01, 0x26])?;
    let span = buf.bstr_wrap_finalize(ctx)?;
    buf.uint(7)?;
    assert_eq!(buf.written(span), &[0xa1, 0x01, 0x26]);
    Ok(())
}
