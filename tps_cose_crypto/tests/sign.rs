/***************************************************************************************************
 * Copyright (c) 2022-2023 Jeremy O'Donoghue. All rights reserved.
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
 * Sign1 / Sign end-to-end tests
 *
 * Keys for kid '11' from https://github.com/cose-wg/Examples/blob/master/KeySet.txt.
 **************************************************************************************************/
extern crate tps_cose_crypto;
extern crate tps_minicose;

use tps_cose_crypto::RustCrypto;
use tps_minicose::encoder::EncodeBuffer;
use tps_minicose::error::{CoseError, Result};
use tps_minicose::headers::ParamPool;
use tps_minicose::signing::{
    CoseSigner, CoseVerifier, FinishStatus, RestartableSigner, SignDecode, SignEncode,
};
use tps_minicose::types::{Algorithm, KeyHandle, MessageType, Options, Param};

// kid '11' public key in uncompressed form per SEC1, v2.0
const KID_11_PUB: [u8; 65] = [
    0x4, // x
    0xba, 0xc5, 0xb1, 0x1c, 0xad, 0x8f, 0x99, 0xf9, 0xc7, 0x2b, 0x05, 0xcf, 0x4b, 0x9e, 0x26, 0xd2,
    0x44, 0xdc, 0x18, 0x9f, 0x74, 0x52, 0x28, 0x25, 0x5a, 0x21, 0x9a, 0x86, 0xd6, 0xa0, 0x9e, 0xff,
    // y
    0x20, 0x13, 0x8b, 0xf8, 0x2d, 0xc1, 0xb6, 0xd5, 0x62, 0xbe, 0x0f, 0xa5, 0x4a, 0xb7, 0x80, 0x4a,
    0x3a, 0x64, 0xb6, 0xd7, 0x2c, 0xcf, 0xed, 0x6b, 0x6f, 0xb6, 0xed, 0x28, 0xbb, 0xfc, 0x11, 0x7e,
];
// kid '11' private key
const KID_11_PRIV: [u8; 32] = [
    0x57, 0xc9, 0x20, 0x77, 0x66, 0x41, 0x46, 0xe8, 0x76, 0x76, 0x0c, 0x95, 0x20, 0xd0, 0x54, 0xaa,
    0x93, 0xc3, 0xaf, 0xb0, 0x4e, 0x30, 0x67, 0x05, 0xdb, 0x60, 0x90, 0x30, 0x85, 0x07, 0xb4, 0xd3,
];

// {"msg": "hi"}
const PAYLOAD: &[u8] = &[0xa1, 0x63, 0x6d, 0x73, 0x67, 0x62, 0x68, 0x69];

fn sign1_message(adapter: &RustCrypto, buf: &mut EncodeBuffer) -> Result<()> {
    let mut signer =
        CoseSigner::new(adapter, Algorithm::ES256, KeyHandle::Bytes(&KID_11_PRIV))?
            .with_kid(b"11");
    let mut ctx = SignEncode::new(Options::new(MessageType::Sign1))?;
    ctx.add_signer(&mut signer)?;
    ctx.start(buf)?;
    match ctx.finish(b"", Some(PAYLOAD), None, buf)? {
        FinishStatus::Complete => Ok(()),
        FinishStatus::Pending => Err(CoseError::InvalidState),
    }
}

#[test]
fn sign1_es256_round_trip() -> Result<()> {
    let adapter = RustCrypto::new();
    let mut bytes = [0u8; 512];
    let mut buf = EncodeBuffer::new(&mut bytes);
    sign1_message(&adapter, &mut buf)?;
    let n = buf.len();

    let verifier = CoseVerifier::new(&adapter, KeyHandle::Bytes(&KID_11_PUB));
    let mut ctx = SignDecode::new(Options::new(MessageType::Sign1))?;
    ctx.add_verifier(&verifier)?;

    let mut pool = ParamPool::new();
    let decoded = ctx.decode(&bytes[..n], None, b"", None, &mut pool, None)?;

    assert_eq!(decoded.payload, Some(PAYLOAD));
    assert_eq!(decoded.n_signatures, 1);
    let params = pool.list(decoded.params);
    assert_eq!(params.alg(), Algorithm::ES256);
    assert_eq!(params.kid(), Some(&[0x31u8, 0x31][..]));
    Ok(())
}

#[test]
fn sign1_wrong_key_fails() -> Result<()> {
    let adapter = RustCrypto::new();
    let mut bytes = [0u8; 512];
    let mut buf = EncodeBuffer::new(&mut bytes);
    sign1_message(&adapter, &mut buf)?;
    let n = buf.len();

    // A different valid P-256 key must yield a signature mismatch
    let mut other_priv = [0u8; 66];
    let mut other_pub = [0u8; 133];
    use tps_minicose::adapter::CryptoAdapter;
    let (_, pub_len) =
        adapter.ecdh_generate(tps_minicose::adapter::EllipticCurve::P256, &mut other_priv, &mut other_pub)?;

    let verifier = CoseVerifier::new(&adapter, KeyHandle::Bytes(&other_pub[..pub_len]));
    let mut ctx = SignDecode::new(Options::new(MessageType::Sign1))?;
    ctx.add_verifier(&verifier)?;
    let mut pool = ParamPool::new();
    let r = ctx.decode(&bytes[..n], None, b"", None, &mut pool, None);
    assert_eq!(r.err(), Some(CoseError::SignatureVerify));
    Ok(())
}

#[test]
fn sign1_corrupt_byte_fails() -> Result<()> {
    let adapter = RustCrypto::new();
    let mut bytes = [0u8; 512];
    let mut buf = EncodeBuffer::new(&mut bytes);
    sign1_message(&adapter, &mut buf)?;
    let n = buf.len();

    // The message ends with the signature bytes
    bytes[n - 1] ^= 0x01;

    let verifier = CoseVerifier::new(&adapter, KeyHandle::Bytes(&KID_11_PUB));
    let mut ctx = SignDecode::new(Options::new(MessageType::Sign1))?;
    ctx.add_verifier(&verifier)?;
    let mut pool = ParamPool::new();
    let r = ctx.decode(&bytes[..n], None, b"", None, &mut pool, None);
    assert_eq!(r.err(), Some(CoseError::SignatureVerify));
    Ok(())
}

#[test]
fn sign1_size_only_matches_real_size() -> Result<()> {
    let adapter = RustCrypto::new();

    let mut sizing = EncodeBuffer::size_only();
    sign1_message(&adapter, &mut sizing)?;

    let mut bytes = [0u8; 512];
    let mut buf = EncodeBuffer::new(&mut bytes);
    sign1_message(&adapter, &mut buf)?;

    assert_eq!(sizing.len(), buf.len());
    Ok(())
}

#[test]
fn sign1_detached_with_aad() -> Result<()> {
    let adapter = RustCrypto::new();
    let payload: &[u8] = &[0x01, 0x02, 0x03, 0x04];

    let mut signer =
        CoseSigner::new(&adapter, Algorithm::ES256, KeyHandle::Bytes(&KID_11_PRIV))?
            .with_kid(b"11");
    let mut ctx = SignEncode::new(Options::new(MessageType::Sign1).detached())?;
    ctx.add_signer(&mut signer)?;
    let mut bytes = [0u8; 512];
    let mut buf = EncodeBuffer::new(&mut bytes);
    ctx.start(&mut buf)?;
    ctx.finish(b"context-42", Some(payload), None, &mut buf)?;
    let n = buf.len();

    let verifier = CoseVerifier::new(&adapter, KeyHandle::Bytes(&KID_11_PUB));
    let mut dec = SignDecode::new(Options::new(MessageType::Sign1).detached())?;
    dec.add_verifier(&verifier)?;

    let mut pool = ParamPool::new();
    let decoded = dec.decode(&bytes[..n], Some(payload), b"context-42", None, &mut pool, None)?;
    assert_eq!(decoded.payload, None);

    // Same payload, different AAD: signature mismatch
    let mut pool = ParamPool::new();
    let r = dec.decode(&bytes[..n], Some(payload), b"context-43", None, &mut pool, None);
    assert_eq!(r.err(), Some(CoseError::SignatureVerify));
    Ok(())
}

fn two_signer_message(
    adapter: &RustCrypto,
    key2_priv: &[u8],
    buf: &mut EncodeBuffer,
) -> Result<()> {
    let mut signer1 =
        CoseSigner::new(adapter, Algorithm::ES256, KeyHandle::Bytes(&KID_11_PRIV))?
            .with_kid(b"11");
    let mut signer2 =
        CoseSigner::new(adapter, Algorithm::ES256, KeyHandle::Bytes(key2_priv))?.with_kid(b"22");
    let mut ctx = SignEncode::new(Options::new(MessageType::Sign))?;
    ctx.add_signer(&mut signer1)?;
    ctx.add_signer(&mut signer2)?;
    ctx.start(buf)?;
    ctx.finish(b"", Some(PAYLOAD), None, buf)?;
    Ok(())
}

#[test]
fn sign_two_signers_any_and_all_modes() -> Result<()> {
    use tps_minicose::adapter::{CryptoAdapter, EllipticCurve};
    let adapter = RustCrypto::new();

    let mut key2_priv = [0u8; 66];
    let mut key2_pub = [0u8; 133];
    let (priv_len, pub_len) =
        adapter.ecdh_generate(EllipticCurve::P256, &mut key2_priv, &mut key2_pub)?;

    let mut bytes = [0u8; 1024];
    let mut buf = EncodeBuffer::new(&mut bytes);
    two_signer_message(&adapter, &key2_priv[..priv_len], &mut buf)?;
    let n = buf.len();

    let v1 = CoseVerifier::new(&adapter, KeyHandle::Bytes(&KID_11_PUB)).with_kid(b"11");
    let v2 =
        CoseVerifier::new(&adapter, KeyHandle::Bytes(&key2_pub[..pub_len])).with_kid(b"22");

    // Both valid: any-succeed and verify-all both pass
    for opts in [
        Options::new(MessageType::Sign),
        Options::new(MessageType::Sign).verify_all_signatures(),
    ]
    .iter()
    {
        let mut ctx = SignDecode::new(*opts)?;
        ctx.add_verifier(&v1)?;
        ctx.add_verifier(&v2)?;
        let mut pool = ParamPool::new();
        let decoded = ctx.decode(&bytes[..n], None, b"", None, &mut pool, None)?;
        assert_eq!(decoded.n_signatures, 2);
    }

    // Corrupt the second signature (last byte of the message)
    bytes[n - 1] ^= 0x01;

    // Any-succeed: the first signature still verifies
    let mut ctx = SignDecode::new(Options::new(MessageType::Sign))?;
    ctx.add_verifier(&v1)?;
    ctx.add_verifier(&v2)?;
    let mut pool = ParamPool::new();
    assert!(ctx.decode(&bytes[..n], None, b"", None, &mut pool, None).is_ok());

    // Verify-all: the corrupted signature is fatal
    let mut ctx = SignDecode::new(Options::new(MessageType::Sign).verify_all_signatures())?;
    ctx.add_verifier(&v1)?;
    ctx.add_verifier(&v2)?;
    let mut pool = ParamPool::new();
    let r = ctx.decode(&bytes[..n], None, b"", None, &mut pool, None);
    assert_eq!(r.err(), Some(CoseError::SignatureVerify));
    Ok(())
}

#[test]
fn unknown_critical_parameter_fails_decode() -> Result<()> {
    let adapter = RustCrypto::new();

    let mut signer =
        CoseSigner::new(&adapter, Algorithm::ES256, KeyHandle::Bytes(&KID_11_PRIV))?;
    let mut ctx = SignEncode::new(Options::new(MessageType::Sign1))?;
    ctx.add_signer(&mut signer)?;
    ctx.add_header(Param::int(42, 0).critical())?;
    let mut bytes = [0u8; 512];
    let mut buf = EncodeBuffer::new(&mut bytes);
    ctx.start(&mut buf)?;
    ctx.finish(b"", Some(PAYLOAD), None, &mut buf)?;
    let n = buf.len();

    let verifier = CoseVerifier::new(&adapter, KeyHandle::Bytes(&KID_11_PUB));
    let mut dec = SignDecode::new(Options::new(MessageType::Sign1))?;
    dec.add_verifier(&verifier)?;
    let mut pool = ParamPool::new();
    let r = dec.decode(&bytes[..n], None, b"", None, &mut pool, None);
    assert_eq!(r.err(), Some(CoseError::UnknownCriticalParameter(42)));
    Ok(())
}

#[test]
fn sign1_eddsa_uses_aux_buffer() -> Result<()> {
    let adapter = RustCrypto::new();
    let seed = [0x42u8; 32];
    let public = ed25519_dalek::SigningKey::from_bytes(&seed)
        .verifying_key()
        .to_bytes();

    let mut signer = CoseSigner::new(&adapter, Algorithm::EDDSA, KeyHandle::Bytes(&seed))?
        .with_kid(b"ed-1");
    let mut ctx = SignEncode::new(Options::new(MessageType::Sign1))?;
    ctx.add_signer(&mut signer)?;
    let mut bytes = [0u8; 512];
    let mut buf = EncodeBuffer::new(&mut bytes);
    ctx.start(&mut buf)?;

    // No aux buffer: the engine reports the size it needs
    let mut probe = SignEncode::new(Options::new(MessageType::Sign1))?;
    let mut probe_signer =
        CoseSigner::new(&adapter, Algorithm::EDDSA, KeyHandle::Bytes(&seed))?;
    probe.add_signer(&mut probe_signer)?;
    let mut probe_bytes = [0u8; 512];
    let mut probe_buf = EncodeBuffer::new(&mut probe_bytes);
    probe.start(&mut probe_buf)?;
    let required = match probe.finish(b"", Some(PAYLOAD), None, &mut probe_buf) {
        Err(CoseError::AuxBufferTooSmall(required)) => required,
        other => panic!("expected AuxBufferTooSmall, got {:?}", other),
    };
    assert!(required > 0);

    let mut aux = [0u8; 256];
    ctx.finish(b"", Some(PAYLOAD), Some(&mut aux), &mut buf)?;
    let n = buf.len();

    let verifier = CoseVerifier::new(&adapter, KeyHandle::Bytes(&public));
    let mut dec = SignDecode::new(Options::new(MessageType::Sign1))?;
    dec.add_verifier(&verifier)?;
    let mut pool = ParamPool::new();
    let mut aux = [0u8; 256];
    let decoded = dec.decode(&bytes[..n], None, b"", Some(&mut aux), &mut pool, None)?;
    assert_eq!(decoded.payload, Some(PAYLOAD));
    Ok(())
}

#[test]
fn restartable_signer_completes_after_pending_rounds() -> Result<()> {
    let adapter = RustCrypto::new().with_restart_rounds(2);

    let mut signer =
        RestartableSigner::new(&adapter, Algorithm::ES256, KeyHandle::Bytes(&KID_11_PRIV))?
            .with_kid(b"11");
    let mut ctx = SignEncode::new(Options::new(MessageType::Sign1))?;
    ctx.add_signer(&mut signer)?;
    let mut bytes = [0u8; 512];
    let mut buf = EncodeBuffer::new(&mut bytes);
    ctx.start(&mut buf)?;

    let mut rounds = 0;
    loop {
        match ctx.finish(b"", Some(PAYLOAD), None, &mut buf)? {
            FinishStatus::Complete => break,
            FinishStatus::Pending => rounds += 1,
        }
        assert!(rounds < 10);
    }
    assert_eq!(rounds, 2);
    let n = buf.len();

    let verify_adapter = RustCrypto::new();
    let verifier = CoseVerifier::new(&verify_adapter, KeyHandle::Bytes(&KID_11_PUB));
    let mut dec = SignDecode::new(Options::new(MessageType::Sign1))?;
    dec.add_verifier(&verifier)?;
    let mut pool = ParamPool::new();
    let decoded = dec.decode(&bytes[..n], None, b"", None, &mut pool, None)?;
    assert_eq!(decoded.payload, Some(PAYLOAD));
    Ok(())
}

#[test]
fn decode_only_runs_no_crypto() -> Result<()> {
    let adapter = RustCrypto::new();
    let mut bytes = [0u8; 512];
    let mut buf = EncodeBuffer::new(&mut bytes);
    sign1_message(&adapter, &mut buf)?;
    let n = buf.len();

    // No verifiers registered at all: decode-only still succeeds and returns the headers
    let ctx = SignDecode::new(Options::new(MessageType::Sign1).decode_only())?;
    let mut pool = ParamPool::new();
    let decoded = ctx.decode(&bytes[..n], None, b"", None, &mut pool, None)?;
    assert_eq!(decoded.payload, Some(PAYLOAD));
    assert_eq!(pool.list(decoded.params).alg(), Algorithm::ES256);
    Ok(())
}

#[test]
fn tag_policy_round_trip() -> Result<()> {
    let adapter = RustCrypto::new();

    // Encode without a tag, then decode with tag_prohibited and an asserted type
    let mut signer =
        CoseSigner::new(&adapter, Algorithm::ES256, KeyHandle::Bytes(&KID_11_PRIV))?;
    let mut ctx = SignEncode::new(Options::new(MessageType::Sign1).tag_prohibited())?;
    ctx.add_signer(&mut signer)?;
    let mut bytes = [0u8; 512];
    let mut buf = EncodeBuffer::new(&mut bytes);
    ctx.start(&mut buf)?;
    ctx.finish(b"", Some(PAYLOAD), None, &mut buf)?;
    let n = buf.len();

    let verifier = CoseVerifier::new(&adapter, KeyHandle::Bytes(&KID_11_PUB));
    let mut dec = SignDecode::new(Options::new(MessageType::Sign1).tag_prohibited())?;
    dec.add_verifier(&verifier)?;
    let mut pool = ParamPool::new();
    assert!(dec.decode(&bytes[..n], None, b"", None, &mut pool, None).is_ok());

    // The untagged message must fail a tag_required decode
    let mut dec = SignDecode::new(Options::new(MessageType::Sign1).tag_required())?;
    dec.add_verifier(&verifier)?;
    let mut pool = ParamPool::new();
    let r = dec.decode(&bytes[..n], None, b"", None, &mut pool, None);
    assert_eq!(r.err(), Some(CoseError::TagRequired));
    Ok(())
}
