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
 * Header parameter subsystem test cases
 *
 * Bucket round trips, the critical-parameter rules and the invariants the encoder and decoder
 * enforce: critical implies protected, alg is protected and never critical, duplicate labels
 * and iv/partial_iv coexistence are rejected.
 **************************************************************************************************/
extern crate tps_minicose;

use tps_minicose::decoder::DecodeBuffer;
use tps_minicose::encoder::EncodeBuffer;
use tps_minicose::error::{CoseError, Result};
use tps_minicose::headers::{
    decode_headers, encode_headers, ParamPool, SpecialDecode, SpecialEncode, NO_NEXT,
};
use tps_minicose::types::{
    Algorithm, Location, Param, ParamValue, SpecialValue, HDR_ALG, HDR_KID, HDR_PARTIAL_IV,
};

#[test]
fn encode_decode_preserves_semantics() -> Result<()> {
    let params = [
        Param::alg(Algorithm::ES256),
        Param::kid(b"11"),
        Param::tstr(3, "application/cbor").protected(),
    ];

    let mut bytes = [0u8; 256];
    let mut buf = EncodeBuffer::new(&mut bytes);
    encode_headers(&mut buf, &params, None)?;
    let n = buf.len();

    let mut pool = ParamPool::new();
    let mut dec = DecodeBuffer::new(&bytes[..n]);
    let decoded = decode_headers(&mut dec, Location::BODY, &mut pool, None)?;

    let list = pool.list(decoded.head);
    assert_eq!(list.alg(), Algorithm::ES256);
    assert_eq!(list.kid(), Some(&b"11"[..]));
    assert_eq!(list.content_type_tstr(), Some("application/cbor"));
    assert!(list.find(3).unwrap().in_protected);
    assert!(!list.find(HDR_KID).unwrap().in_protected);
    Ok(())
}

#[test]
fn critical_params_round_trip_through_special_callback() -> Result<()> {
    struct TakeIt;
    impl SpecialDecode for TakeIt {
        fn decode<'b>(
            &mut self,
            label: i64,
            _critical: bool,
            dec: &mut DecodeBuffer<'b>,
        ) -> Result<Option<SpecialValue<'b>>> {
            if label == 70 {
                let raw = dec.item_slice()?;
                Ok(Some(SpecialValue { raw, word: 0 }))
            } else {
                Ok(None)
            }
        }
    }

    let params = [
        Param::alg(Algorithm::ES256),
        Param::int(70, -9).critical(),
    ];
    let mut bytes = [0u8; 256];
    let mut buf = EncodeBuffer::new(&mut bytes);
    encode_headers(&mut buf, &params, None)?;
    let n = buf.len();

    // Without a consumer for label 70 the critical parameter is a hard failure
    let mut pool = ParamPool::new();
    let mut dec = DecodeBuffer::new(&bytes[..n]);
    assert_eq!(
        decode_headers(&mut dec, Location::BODY, &mut pool, None),
        Err(CoseError::UnknownCriticalParameter(70))
    );

    // With one, the value comes back as a special node with the critical mark set
    let mut pool = ParamPool::new();
    let mut dec = DecodeBuffer::new(&bytes[..n]);
    let mut cb = TakeIt;
    let decoded = decode_headers(&mut dec, Location::BODY, &mut pool, Some(&mut cb))?;
    let special = pool.list(decoded.head).find(70).unwrap();
    assert!(special.critical);
    assert!(special.in_protected);
    Ok(())
}

#[test]
fn critical_unprotected_rejected_at_encode() {
    let mut p = Param::int(70, 1);
    p.critical = true;
    p.in_protected = false;
    let mut bytes = [0u8; 64];
    let mut buf = EncodeBuffer::new(&mut bytes);
    assert_eq!(
        encode_headers(&mut buf, &[p], None),
        Err(CoseError::CriticalNotProtected)
    );
}

#[test]
fn crit_listing_unprotected_label_rejected_at_decode() {
    // protected << {2: [70]} >>, unprotected {70: 1}: the critical label has no protected node
    let input: &[u8] = &[0x45, 0xa1, 0x02, 0x81, 0x18, 0x46, 0xa1, 0x18, 0x46, 0x01];
    let mut pool = ParamPool::new();
    let mut dec = DecodeBuffer::new(input);
    assert_eq!(
        decode_headers(&mut dec, Location::BODY, &mut pool, None),
        Err(CoseError::CriticalNotProtected)
    );
}

#[test]
fn alg_must_be_protected_and_uncritical() {
    let mut bytes = [0u8; 64];
    let mut p = Param::int(HDR_ALG, -7);
    p.in_protected = false;
    let mut buf = EncodeBuffer::new(&mut bytes);
    assert_eq!(
        encode_headers(&mut buf, &[p], None),
        Err(CoseError::WrongBucket(HDR_ALG))
    );

    let mut buf = EncodeBuffer::new(&mut bytes);
    assert_eq!(
        encode_headers(&mut buf, &[Param::int(HDR_ALG, -7).critical()], None),
        Err(CoseError::WrongBucket(HDR_ALG))
    );
}

#[test]
fn duplicate_labels_rejected_at_encode() {
    let mut bytes = [0u8; 64];
    let params = [Param::kid(b"a"), Param::kid(b"b")];
    let mut buf = EncodeBuffer::new(&mut bytes);
    assert_eq!(
        encode_headers(&mut buf, &params, None),
        Err(CoseError::DuplicateLabel(HDR_KID))
    );
}

#[test]
fn decode_rejects_label_in_both_buckets() {
    // protected << {4: h'31'} >>, unprotected {4: h'32'}
    let input: &[u8] = &[
        0x44, 0xa1, 0x04, 0x41, 0x31, // << {4: h'31'} >>
        0xa1, 0x04, 0x41, 0x32, // {4: h'32'}
    ];
    let mut pool = ParamPool::new();
    let mut dec = DecodeBuffer::new(input);
    assert_eq!(
        decode_headers(&mut dec, Location::BODY, &mut pool, None),
        Err(CoseError::DuplicateLabel(HDR_KID))
    );
}

#[test]
fn iv_and_partial_iv_conflict() {
    let mut bytes = [0u8; 64];
    let params = [
        Param::iv(b"123456789012"),
        Param::bstr(HDR_PARTIAL_IV, b"1"),
    ];
    let mut buf = EncodeBuffer::new(&mut bytes);
    assert_eq!(
        encode_headers(&mut buf, &params, None),
        Err(CoseError::IvPartialIvConflict)
    );

    // Same conflict on the decode side, both in the unprotected bucket
    let input: &[u8] = &[0x40, 0xa2, 0x05, 0x41, 0x31, 0x06, 0x41, 0x32];
    let mut pool = ParamPool::new();
    let mut dec = DecodeBuffer::new(input);
    assert_eq!(
        decode_headers(&mut dec, Location::BODY, &mut pool, None),
        Err(CoseError::IvPartialIvConflict)
    );
}

#[test]
fn empty_buckets_round_trip() -> Result<()> {
    let mut bytes = [0u8; 16];
    let mut buf = EncodeBuffer::new(&mut bytes);
    let span = encode_headers(&mut buf, &[], None)?;
    assert!(span.is_empty());
    let n = buf.len();
    // zero-length bstr then empty map
    assert_eq!(&bytes[..n], &[0x40, 0xa0]);

    let mut pool = ParamPool::new();
    let mut dec = DecodeBuffer::new(&bytes[..n]);
    let decoded = decode_headers(&mut dec, Location::BODY, &mut pool, None)?;
    assert_eq!(decoded.head, NO_NEXT);
    assert!(decoded.protected.is_empty());
    Ok(())
}

#[test]
fn crit_must_not_be_empty_or_overfull() {
    // protected << {2: []} >>, unprotected {}
    let input: &[u8] = &[0x43, 0xa1, 0x02, 0x80, 0xa0];
    let mut pool = ParamPool::new();
    let mut dec = DecodeBuffer::new(input);
    assert_eq!(
        decode_headers(&mut dec, Location::BODY, &mut pool, None),
        Err(CoseError::CritListEmpty)
    );

    // protected << {2: [70, 71, 72, 73, 74]} >> exceeds MAX_CRITICAL_PARAMS
    let input: &[u8] = &[
        0x4d, 0xa1, 0x02, 0x85, 0x18, 0x46, 0x18, 0x47, 0x18, 0x48, 0x18, 0x49, 0x18, 0x4a, 0xa0,
    ];
    let mut pool = ParamPool::new();
    let mut dec = DecodeBuffer::new(input);
    assert_eq!(
        decode_headers(&mut dec, Location::BODY, &mut pool, None),
        Err(CoseError::CritListOverfull)
    );
}

#[test]
fn unknown_noncritical_nonscalar_is_dropped() -> Result<()> {
    // protected h'', unprotected {-70: [1, 2]}
    let input: &[u8] = &[0x40, 0xa1, 0x38, 0x45, 0x82, 0x01, 0x02];
    let mut pool = ParamPool::new();
    let mut dec = DecodeBuffer::new(input);
    let decoded = decode_headers(&mut dec, Location::BODY, &mut pool, None)?;
    assert!(pool.list(decoded.head).find(-70).is_none());
    Ok(())
}

#[test]
fn special_parameters_round_trip_via_callbacks() -> Result<()> {
    // A non-scalar parameter (label -70, value [1, 2]) emitted and consumed by callbacks.
    struct ArrayParam;
    impl SpecialEncode for ArrayParam {
        fn encode(&self, param: &Param<'_>, buf: &mut EncodeBuffer<'_>) -> Result<()> {
            buf.int(param.label)?;
            buf.array(2)?;
            buf.uint(1)?;
            buf.uint(2)
        }
    }
    impl SpecialDecode for ArrayParam {
        fn decode<'b>(
            &mut self,
            label: i64,
            _critical: bool,
            dec: &mut DecodeBuffer<'b>,
        ) -> Result<Option<SpecialValue<'b>>> {
            if label == -70 {
                let raw = dec.item_slice()?;
                Ok(Some(SpecialValue { raw, word: 2 }))
            } else {
                Ok(None)
            }
        }
    }

    let special = Param {
        value: ParamValue::Special(SpecialValue { raw: &[], word: 0 }),
        ..Param::int(-70, 0)
    };
    let params = [Param::alg(Algorithm::ES256), special];

    let mut bytes = [0u8; 128];
    let mut buf = EncodeBuffer::new(&mut bytes);
    let cb = ArrayParam;
    encode_headers(&mut buf, &params, Some(&cb))?;
    let n = buf.len();

    let mut pool = ParamPool::new();
    let mut dec = DecodeBuffer::new(&bytes[..n]);
    let mut cb = ArrayParam;
    let decoded = decode_headers(&mut dec, Location::BODY, &mut pool, Some(&mut cb))?;
    match pool.list(decoded.head).find(-70).map(|p| &p.value) {
        Some(ParamValue::Special(v)) => {
            assert_eq!(v.raw, &[0x82, 0x01, 0x02]);
            assert_eq!(v.word, 2);
        }
        other => panic!("special parameter not captured: {:?}", other),
    }
    Ok(())
}

#[test]
fn protected_bytes_are_exactly_the_encoded_map() -> Result<()> {
    let params = [Param::alg(Algorithm::ES256)];
    let mut bytes = [0u8; 64];
    let mut buf = EncodeBuffer::new(&mut bytes);
    let span = encode_headers(&mut buf, &params, None)?;
    assert_eq!(buf.written(span), &[0xa1, 0x01, 0x26]);
    Ok(())
}
