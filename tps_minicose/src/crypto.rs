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
 * Crypto adaptation contract
 *
 * The typed interface the core consumes from external cryptography. The core never implements a
 * primitive itself: hashing, signing, MAC, AEAD, key wrap, key agreement, key derivation and
 * randomness all arrive through an implementation of `CryptoAdapter`. Errors the adapter reports
 * map into the core's taxonomy.
 **************************************************************************************************/
use crate::algorithm::Algorithm;
use crate::error::Result;
use crate::keys::KeyHandle;

/// Elliptic curves the key agreement flows use.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum EllipticCurve {
    /// NIST P-256 (COSE crv 1).
    P256,
    /// NIST P-384 (COSE crv 2).
    P384,
    /// NIST P-521 (COSE crv 3).
    P521,
    /// X25519 (COSE crv 4).
    X25519,
}

impl EllipticCurve {
    /// The COSE `crv` registry value.
    pub fn crv(self) -> u64 {
        match self {
            EllipticCurve::P256 => 1,
            EllipticCurve::P384 => 2,
            EllipticCurve::P521 => 3,
            EllipticCurve::X25519 => 4,
        }
    }

    /// Map a COSE `crv` registry value back to a curve.
    pub fn from_crv(crv: u64) -> Option<EllipticCurve> {
        match crv {
            1 => Some(EllipticCurve::P256),
            2 => Some(EllipticCurve::P384),
            3 => Some(EllipticCurve::P521),
            4 => Some(EllipticCurve::X25519),
            _ => None,
        }
    }

    /// Size of one field element / coordinate in bytes.
    pub fn coordinate_size(self) -> usize {
        match self {
            EllipticCurve::P256 => 32,
            EllipticCurve::P384 => 48,
            EllipticCurve::P521 => 66,
            EllipticCurve::X25519 => 32,
        }
    }

    /// Size of an encoded public key: SEC1 uncompressed for the NIST curves, raw u-coordinate
    /// for X25519.
    pub fn public_key_size(self) -> usize {
        match self {
            EllipticCurve::X25519 => 32,
            c => 1 + 2 * c.coordinate_size(),
        }
    }
}

/// An in-progress hash or HMAC computation.
pub trait Hasher {
    /// Feed `data` into the computation.
    fn update(&mut self, data: &[u8]);

    /// Finish, writing the digest or tag into `out` and returning its size.
    fn finish(self, out: &mut [u8]) -> Result<usize>;
}

/// Everything the COSE core requires from external cryptography.
///
/// The adapter owns algorithm/key policy: the core passes opaque [`KeyHandle`]s straight
/// through. All operations are synchronous from the core's viewpoint.
pub trait CryptoAdapter {
    /// Incremental hash type.
    type Hash: Hasher;
    /// Incremental HMAC type.
    type Hmac: Hasher;

    /// Start the hash implied by a signature algorithm id.
    fn hash_start(&self, alg: Algorithm) -> Result<Self::Hash>;

    /// Start an HMAC computation for a MAC algorithm id.
    fn hmac_start(&self, alg: Algorithm, key: &KeyHandle<'_>) -> Result<Self::Hmac>;

    /// Sign a to-be-signed digest. Returns the signature size.
    fn sign(
        &self,
        alg: Algorithm,
        key: &KeyHandle<'_>,
        tbs_hash: &[u8],
        sig_out: &mut [u8],
    ) -> Result<usize>;

    /// Verify a signature over a to-be-signed digest.
    fn verify(
        &self,
        alg: Algorithm,
        key: &KeyHandle<'_>,
        tbs_hash: &[u8],
        signature: &[u8],
    ) -> Result<()>;

    /// Sign a full to-be-signed structure with EdDSA, which cannot work from a digest.
    fn sign_eddsa(&self, key: &KeyHandle<'_>, tbs: &[u8], sig_out: &mut [u8]) -> Result<usize>;

    /// Verify an EdDSA signature over a full to-be-signed structure.
    fn verify_eddsa(&self, key: &KeyHandle<'_>, tbs: &[u8], signature: &[u8]) -> Result<()>;

    /// Signature size for an algorithm/key pair, for size-only encoding. The default answers
    /// from the algorithm table, which suffices for everything but RSA.
    fn sig_size(&self, alg: Algorithm, _key: &KeyHandle<'_>) -> Result<usize> {
        alg.signature_size()
    }

    /// AEAD seal in place: `buf[..pt_len]` holds the plaintext on entry and the ciphertext plus
    /// tag on exit. Returns the total ciphertext length.
    fn aead_seal(
        &self,
        alg: Algorithm,
        key: &KeyHandle<'_>,
        iv: &[u8],
        aad: &[u8],
        buf: &mut [u8],
        pt_len: usize,
    ) -> Result<usize>;

    /// AEAD open in place: `buf[..ct_len]` holds ciphertext plus tag on entry and the plaintext
    /// on exit. Returns the plaintext length.
    fn aead_open(
        &self,
        alg: Algorithm,
        key: &KeyHandle<'_>,
        iv: &[u8],
        aad: &[u8],
        buf: &mut [u8],
        ct_len: usize,
    ) -> Result<usize>;

    /// AES key wrap (RFC 3394). Returns the wrapped size (`key.len() + 8`).
    fn kw_wrap(
        &self,
        alg: Algorithm,
        kek: &KeyHandle<'_>,
        key: &[u8],
        out: &mut [u8],
    ) -> Result<usize>;

    /// AES key unwrap (RFC 3394). Returns the unwrapped size.
    fn kw_unwrap(
        &self,
        alg: Algorithm,
        kek: &KeyHandle<'_>,
        wrapped: &[u8],
        out: &mut [u8],
    ) -> Result<usize>;

    /// Raw ECDH: write the shared secret Z and return its size.
    fn ecdh(
        &self,
        curve: EllipticCurve,
        own_private: &KeyHandle<'_>,
        peer_public: &KeyHandle<'_>,
        z_out: &mut [u8],
    ) -> Result<usize>;

    /// Generate an ephemeral key pair, writing the private scalar and the encoded public key.
    /// Returns both sizes.
    fn ecdh_generate(
        &self,
        curve: EllipticCurve,
        private_out: &mut [u8],
        public_out: &mut [u8],
    ) -> Result<(usize, usize)>;

    /// HKDF extract-and-expand with the hash implied by `alg`.
    fn hkdf(
        &self,
        alg: Algorithm,
        salt: &[u8],
        ikm: &[u8],
        info: &[u8],
        okm: &mut [u8],
    ) -> Result<()>;

    /// HPKE base-mode single-shot seal (RFC 9180). Writes the encapsulated key and the
    /// ciphertext, returning both sizes.
    fn hpke_seal(
        &self,
        alg: Algorithm,
        peer_public: &KeyHandle<'_>,
        info: &[u8],
        aad: &[u8],
        plaintext: &[u8],
        enc_out: &mut [u8],
        ct_out: &mut [u8],
    ) -> Result<(usize, usize)>;

    /// HPKE base-mode single-shot open (RFC 9180). Returns the plaintext size.
    fn hpke_open(
        &self,
        alg: Algorithm,
        own_private: &KeyHandle<'_>,
        enc: &[u8],
        info: &[u8],
        aad: &[u8],
        ciphertext: &[u8],
        pt_out: &mut [u8],
    ) -> Result<usize>;

    /// Fill `out` with cryptographically strong random bytes.
    fn random(&self, out: &mut [u8]) -> Result<()>;

    /// Count of key objects the adapter currently holds. Test harnesses use this to detect
    /// leaks; adapters without tracked allocations report zero.
    fn key_alloc_leak_check(&self) -> usize {
        0
    }
}

/// Progress of a restartable signing operation.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum SignStatus {
    /// The signature is complete; holds its size.
    Done(usize),
    /// The operation needs more `resume` calls.
    Pending,
}

/// Optional capability for long-running hardware signers.
///
/// `sign_restart` is called once with `first = true` to start the operation and then repeatedly
/// with `first = false` until it reports [`SignStatus::Done`]. Between calls the context is
/// owned solely by the caller.
pub trait RestartableSign {
    /// Start or continue a signing operation over `tbs_hash`.
    fn sign_restart(
        &self,
        first: bool,
        alg: Algorithm,
        key: &KeyHandle<'_>,
        tbs_hash: &[u8],
        sig_out: &mut [u8],
    ) -> Result<SignStatus>;
}

/// Constant-time-ish comparison for MAC tags and other fixed secrets.
pub(crate) fn tags_match(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
