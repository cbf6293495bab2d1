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
 * Trivial Sign1
 *
 * An example of using tps_minicose to encode, sign, decode and verify a COSE_Sign1 structure,
 * following the message from RFC 9052 Appendix C.2.1 (the signature itself is randomized, as
 * the underlying ECDSA crate generates its own nonce).
 **************************************************************************************************/
extern crate tps_cose_crypto;
extern crate tps_minicose;

use tps_cose_crypto::RustCrypto;
use tps_minicose::encoder::EncodeBuffer;
use tps_minicose::error::CoseError;
use tps_minicose::headers::ParamPool;
use tps_minicose::signing::{CoseSigner, CoseVerifier, SignDecode, SignEncode};
use tps_minicose::types::{Algorithm, KeyHandle, MessageType, Options};

// Keys for kid '11' from https://github.com/cose-wg/Examples/blob/master/KeySet.txt,
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

fn main() -> Result<(), CoseError> {
    let adapter = RustCrypto::new();
    let payload = b"This is the content.";

    // Run the encode path once against a size-only buffer to learn the output size.
    let mut signer =
        CoseSigner::new(&adapter, Algorithm::ES256, KeyHandle::Bytes(&KID_11_PRIV))?
            .with_kid(b"11");
    let mut ctx = SignEncode::new(Options::new(MessageType::Sign1))?;
    ctx.add_signer(&mut signer)?;
    let mut sizing = EncodeBuffer::size_only();
    ctx.start(&mut sizing)?;
    ctx.finish(b"", Some(payload), None, &mut sizing)?;
    println!("COSE_Sign1 needs {} bytes", sizing.len());

    // Now for real.
    let mut signer =
        CoseSigner::new(&adapter, Algorithm::ES256, KeyHandle::Bytes(&KID_11_PRIV))?
            .with_kid(b"11");
    let mut ctx = SignEncode::new(Options::new(MessageType::Sign1))?;
    ctx.add_signer(&mut signer)?;
    let mut bytes = vec![0u8; sizing.len()];
    let mut buf = EncodeBuffer::new(&mut bytes);
    ctx.start(&mut buf)?;
    ctx.finish(b"", Some(payload), None, &mut buf)?;

    print!("Output ");
    for byte in buf.encoded()? {
        print!("{:02x}", byte);
    }
    println!();
    let n = buf.len();

    // Verify it again.
    let verifier = CoseVerifier::new(&adapter, KeyHandle::Bytes(&KID_11_PUB));
    let mut dec = SignDecode::new(Options::new(MessageType::Sign1))?;
    dec.add_verifier(&verifier)?;
    let mut pool = ParamPool::new();
    let decoded = dec.decode(&bytes[..n], None, b"", None, &mut pool, None)?;

    println!(
        "Verification succeeded: alg {:?}, kid {:?}, message content {:?}",
        pool.list(decoded.params).alg(),
        pool.list(decoded.params).kid(),
        decoded.payload.map(String::from_utf8_lossy),
    );
    Ok(())
}
