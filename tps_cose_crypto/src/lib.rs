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
 * RustCrypto adapter for tps_minicose
 *
 * Implements the tps_minicose crypto adaptation contract over the RustCrypto crates: SHA-2
 * hashing, P-256 ECDSA over a prehash, Ed25519, HMAC, AES-GCM, AES key wrap, P-256 ECDH, HKDF
 * and OS randomness. Key handles carry raw bytes: secret scalars and seeds for private keys,
 * SEC1 uncompressed points and raw public bytes for public keys, plain bytes for symmetric
 * keys. Integer key handles are not supported by this adapter.
 *
 * The adapter also implements the restartable-signing capability; `with_restart_rounds`
 * simulates a hardware signer that needs a number of resume calls before completing.
 **************************************************************************************************/
use std::cell::Cell;
use std::convert::{TryFrom, TryInto};

use aes_gcm::aead::consts::U16;
use aes_gcm::aead::{AeadCore, AeadInPlace};
use aes_gcm::{AesGcm, KeyInit, Nonce, Tag};
use hmac::{Hmac, Mac};
use p256::ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use rand_core::{OsRng, RngCore};
use sha2::{Digest, Sha256, Sha384, Sha512};

use tps_minicose::adapter::{CryptoAdapter, EllipticCurve, Hasher, RestartableSign, SignStatus};
use tps_minicose::error::{CoseError, Result};
use tps_minicose::types::{Algorithm, KeyHandle};

mod hpke;

type Aes128Gcm = AesGcm<aes::Aes128, aes_gcm::aead::consts::U12>;
type Aes192Gcm = AesGcm<aes::Aes192, aes_gcm::aead::consts::U12>;
type Aes256Gcm = AesGcm<aes::Aes256, aes_gcm::aead::consts::U12>;

/// Crypto adapter backed by the RustCrypto crates.
pub struct RustCrypto {
    restart_rounds: Cell<u32>,
    tracked_keys: Cell<usize>,
}

impl RustCrypto {
    /// Construct the adapter.
    pub fn new() -> Self {
        RustCrypto {
            restart_rounds: Cell::new(0),
            tracked_keys: Cell::new(0),
        }
    }

    /// Make the restartable-signing path report `rounds` pending states before completing,
    /// simulating a slow hardware signer.
    pub fn with_restart_rounds(self, rounds: u32) -> Self {
        self.restart_rounds.set(rounds);
        self
    }
}

impl Default for RustCrypto {
    fn default() -> Self {
        RustCrypto::new()
    }
}

/// An in-progress SHA-2 computation.
pub enum Sha2Hash {
    /// SHA-256 state.
    Sha256(Sha256),
    /// SHA-384 state.
    Sha384(Sha384),
    /// SHA-512 state.
    Sha512(Sha512),
}

impl Hasher for Sha2Hash {
    fn update(&mut self, data: &[u8]) {
        match self {
            Sha2Hash::Sha256(h) => h.update(data),
            Sha2Hash::Sha384(h) => h.update(data),
            Sha2Hash::Sha512(h) => h.update(data),
        }
    }

    fn finish(self, out: &mut [u8]) -> Result<usize> {
        let n = match self {
            Sha2Hash::Sha256(h) => copy_digest(&h.finalize(), out)?,
            Sha2Hash::Sha384(h) => copy_digest(&h.finalize(), out)?,
            Sha2Hash::Sha512(h) => copy_digest(&h.finalize(), out)?,
        };
        Ok(n)
    }
}

/// An in-progress HMAC-SHA-2 computation.
pub enum Sha2Hmac {
    /// HMAC-SHA-256 state.
    Sha256(Hmac<Sha256>),
    /// HMAC-SHA-384 state.
    Sha384(Hmac<Sha384>),
    /// HMAC-SHA-512 state.
    Sha512(Hmac<Sha512>),
}

impl Hasher for Sha2Hmac {
    fn update(&mut self, data: &[u8]) {
        match self {
            Sha2Hmac::Sha256(h) => h.update(data),
            Sha2Hmac::Sha384(h) => h.update(data),
            Sha2Hmac::Sha512(h) => h.update(data),
        }
    }

    fn finish(self, out: &mut [u8]) -> Result<usize> {
        let n = match self {
            Sha2Hmac::Sha256(h) => copy_digest(&h.finalize().into_bytes(), out)?,
            Sha2Hmac::Sha384(h) => copy_digest(&h.finalize().into_bytes(), out)?,
            Sha2Hmac::Sha512(h) => copy_digest(&h.finalize().into_bytes(), out)?,
        };
        Ok(n)
    }
}

fn copy_digest(digest: &[u8], out: &mut [u8]) -> Result<usize> {
    if out.len() < digest.len() {
        return Err(CoseError::BufferTooSmall);
    }
    out[..digest.len()].copy_from_slice(digest);
    Ok(digest.len())
}

fn p256_signing_key(key: &KeyHandle<'_>) -> Result<SigningKey> {
    SigningKey::from_slice(key.bytes()?).map_err(|_| CoseError::KeyImportFailed)
}

fn p256_verifying_key(key: &KeyHandle<'_>) -> Result<VerifyingKey> {
    VerifyingKey::from_sec1_bytes(key.bytes()?).map_err(|_| CoseError::KeyImportFailed)
}

fn ed25519_signing_key(key: &KeyHandle<'_>) -> Result<ed25519_dalek::SigningKey> {
    let bytes: [u8; 32] = key
        .bytes()?
        .try_into()
        .map_err(|_| CoseError::KeyImportFailed)?;
    Ok(ed25519_dalek::SigningKey::from_bytes(&bytes))
}

fn seal_in_place<C: AeadInPlace>(
    cipher: &C,
    iv: &[u8],
    aad: &[u8],
    buf: &mut [u8],
    pt_len: usize,
) -> Result<usize> {
    let nonce = Nonce::from_slice(iv);
    let tag = cipher
        .encrypt_in_place_detached(nonce, aad, &mut buf[..pt_len])
        .map_err(|_| CoseError::CryptoFailed)?;
    let ct_len = pt_len + tag.len();
    if buf.len() < ct_len {
        return Err(CoseError::BufferTooSmall);
    }
    buf[pt_len..ct_len].copy_from_slice(&tag);
    Ok(ct_len)
}

fn open_in_place<C: AeadInPlace + AeadCore<TagSize = U16>>(
    cipher: &C,
    iv: &[u8],
    aad: &[u8],
    buf: &mut [u8],
    ct_len: usize,
) -> Result<usize> {
    if ct_len < 16 || buf.len() < ct_len {
        return Err(CoseError::AuthenticationFailed);
    }
    let pt_len = ct_len - 16;
    let nonce = Nonce::from_slice(iv);
    let tag = Tag::<U16>::clone_from_slice(&buf[pt_len..ct_len]);
    cipher
        .decrypt_in_place_detached(nonce, aad, &mut buf[..pt_len], &tag)
        .map_err(|_| CoseError::AuthenticationFailed)?;
    Ok(pt_len)
}

fn kw_cipher_wrap(alg: Algorithm, kek: &[u8], key: &[u8], out: &mut [u8]) -> Result<usize> {
    let wrapped_len = key.len() + 8;
    if out.len() < wrapped_len {
        return Err(CoseError::BufferTooSmall);
    }
    let r = match alg {
        Algorithm::A128KW => aes_kw::KekAes128::try_from(kek)
            .map_err(|_| CoseError::KeyImportFailed)?
            .wrap(key, &mut out[..wrapped_len]),
        Algorithm::A192KW => aes_kw::KekAes192::try_from(kek)
            .map_err(|_| CoseError::KeyImportFailed)?
            .wrap(key, &mut out[..wrapped_len]),
        Algorithm::A256KW => aes_kw::KekAes256::try_from(kek)
            .map_err(|_| CoseError::KeyImportFailed)?
            .wrap(key, &mut out[..wrapped_len]),
        _ => return Err(CoseError::UnsupportedAlgorithm(alg.0)),
    };
    r.map_err(|_| CoseError::CryptoFailed)?;
    Ok(wrapped_len)
}

fn kw_cipher_unwrap(alg: Algorithm, kek: &[u8], wrapped: &[u8], out: &mut [u8]) -> Result<usize> {
    if wrapped.len() < 16 {
        return Err(CoseError::KeyUnwrapFailed);
    }
    let key_len = wrapped.len() - 8;
    if out.len() < key_len {
        return Err(CoseError::BufferTooSmall);
    }
    let r = match alg {
        Algorithm::A128KW => aes_kw::KekAes128::try_from(kek)
            .map_err(|_| CoseError::KeyImportFailed)?
            .unwrap(wrapped, &mut out[..key_len]),
        Algorithm::A192KW => aes_kw::KekAes192::try_from(kek)
            .map_err(|_| CoseError::KeyImportFailed)?
            .unwrap(wrapped, &mut out[..key_len]),
        Algorithm::A256KW => aes_kw::KekAes256::try_from(kek)
            .map_err(|_| CoseError::KeyImportFailed)?
            .unwrap(wrapped, &mut out[..key_len]),
        _ => return Err(CoseError::UnsupportedAlgorithm(alg.0)),
    };
    r.map_err(|_| CoseError::KeyUnwrapFailed)?;
    Ok(key_len)
}

impl CryptoAdapter for RustCrypto {
    type Hash = Sha2Hash;
    type Hmac = Sha2Hmac;

    fn hash_start(&self, alg: Algorithm) -> Result<Sha2Hash> {
        match alg {
            Algorithm::ES256 | Algorithm::PS256 => Ok(Sha2Hash::Sha256(Sha256::new())),
            Algorithm::ES384 | Algorithm::PS384 => Ok(Sha2Hash::Sha384(Sha384::new())),
            Algorithm::ES512 | Algorithm::PS512 => Ok(Sha2Hash::Sha512(Sha512::new())),
            _ => Err(CoseError::UnsupportedAlgorithm(alg.0)),
        }
    }

    fn hmac_start(&self, alg: Algorithm, key: &KeyHandle<'_>) -> Result<Sha2Hmac> {
        let key = key.bytes()?;
        match alg {
            Algorithm::HMAC_256 => <Hmac<Sha256> as Mac>::new_from_slice(key)
                .map(Sha2Hmac::Sha256)
                .map_err(|_| CoseError::KeyImportFailed),
            Algorithm::HMAC_384 => <Hmac<Sha384> as Mac>::new_from_slice(key)
                .map(Sha2Hmac::Sha384)
                .map_err(|_| CoseError::KeyImportFailed),
            Algorithm::HMAC_512 => <Hmac<Sha512> as Mac>::new_from_slice(key)
                .map(Sha2Hmac::Sha512)
                .map_err(|_| CoseError::KeyImportFailed),
            _ => Err(CoseError::UnsupportedAlgorithm(alg.0)),
        }
    }

    fn sign(
        &self,
        alg: Algorithm,
        key: &KeyHandle<'_>,
        tbs_hash: &[u8],
        sig_out: &mut [u8],
    ) -> Result<usize> {
        match alg {
            Algorithm::ES256 => {
                let sk = p256_signing_key(key)?;
                let sig: Signature = sk
                    .sign_prehash(tbs_hash)
                    .map_err(|_| CoseError::CryptoFailed)?;
                let bytes = sig.to_bytes();
                if sig_out.len() < bytes.len() {
                    return Err(CoseError::BufferTooSmall);
                }
                sig_out[..bytes.len()].copy_from_slice(&bytes);
                Ok(bytes.len())
            }
            _ => Err(CoseError::UnsupportedAlgorithm(alg.0)),
        }
    }

    fn verify(
        &self,
        alg: Algorithm,
        key: &KeyHandle<'_>,
        tbs_hash: &[u8],
        signature: &[u8],
    ) -> Result<()> {
        match alg {
            Algorithm::ES256 => {
                let vk = p256_verifying_key(key)?;
                let sig =
                    Signature::from_slice(signature).map_err(|_| CoseError::SignatureVerify)?;
                vk.verify_prehash(tbs_hash, &sig)
                    .map_err(|_| CoseError::SignatureVerify)
            }
            _ => Err(CoseError::UnsupportedAlgorithm(alg.0)),
        }
    }

    fn sign_eddsa(&self, key: &KeyHandle<'_>, tbs: &[u8], sig_out: &mut [u8]) -> Result<usize> {
        use ed25519_dalek::Signer;
        let sk = ed25519_signing_key(key)?;
        let sig = sk.sign(tbs);
        let bytes = sig.to_bytes();
        if sig_out.len() < bytes.len() {
            return Err(CoseError::BufferTooSmall);
        }
        sig_out[..bytes.len()].copy_from_slice(&bytes);
        Ok(bytes.len())
    }

    fn verify_eddsa(&self, key: &KeyHandle<'_>, tbs: &[u8], signature: &[u8]) -> Result<()> {
        use ed25519_dalek::Verifier;
        let bytes: [u8; 32] = key
            .bytes()?
            .try_into()
            .map_err(|_| CoseError::KeyImportFailed)?;
        let vk = ed25519_dalek::VerifyingKey::from_bytes(&bytes)
            .map_err(|_| CoseError::KeyImportFailed)?;
        let sig_bytes: [u8; 64] = signature
            .try_into()
            .map_err(|_| CoseError::SignatureVerify)?;
        let sig = ed25519_dalek::Signature::from_bytes(&sig_bytes);
        vk.verify(tbs, &sig).map_err(|_| CoseError::SignatureVerify)
    }

    fn aead_seal(
        &self,
        alg: Algorithm,
        key: &KeyHandle<'_>,
        iv: &[u8],
        aad: &[u8],
        buf: &mut [u8],
        pt_len: usize,
    ) -> Result<usize> {
        let key = key.bytes()?;
        match alg {
            Algorithm::A128GCM => {
                let c = Aes128Gcm::new_from_slice(key).map_err(|_| CoseError::KeyImportFailed)?;
                seal_in_place(&c, iv, aad, buf, pt_len)
            }
            Algorithm::A192GCM => {
                let c = Aes192Gcm::new_from_slice(key).map_err(|_| CoseError::KeyImportFailed)?;
                seal_in_place(&c, iv, aad, buf, pt_len)
            }
            Algorithm::A256GCM => {
                let c = Aes256Gcm::new_from_slice(key).map_err(|_| CoseError::KeyImportFailed)?;
                seal_in_place(&c, iv, aad, buf, pt_len)
            }
            _ => Err(CoseError::UnsupportedAlgorithm(alg.0)),
        }
    }

    fn aead_open(
        &self,
        alg: Algorithm,
        key: &KeyHandle<'_>,
        iv: &[u8],
        aad: &[u8],
        buf: &mut [u8],
        ct_len: usize,
    ) -> Result<usize> {
        let key = key.bytes()?;
        match alg {
            Algorithm::A128GCM => {
                let c = Aes128Gcm::new_from_slice(key).map_err(|_| CoseError::KeyImportFailed)?;
                open_in_place(&c, iv, aad, buf, ct_len)
            }
            Algorithm::A192GCM => {
                let c = Aes192Gcm::new_from_slice(key).map_err(|_| CoseError::KeyImportFailed)?;
                open_in_place(&c, iv, aad, buf, ct_len)
            }
            Algorithm::A256GCM => {
                let c = Aes256Gcm::new_from_slice(key).map_err(|_| CoseError::KeyImportFailed)?;
                open_in_place(&c, iv, aad, buf, ct_len)
            }
            _ => Err(CoseError::UnsupportedAlgorithm(alg.0)),
        }
    }

    fn kw_wrap(
        &self,
        alg: Algorithm,
        kek: &KeyHandle<'_>,
        key: &[u8],
        out: &mut [u8],
    ) -> Result<usize> {
        kw_cipher_wrap(alg, kek.bytes()?, key, out)
    }

    fn kw_unwrap(
        &self,
        alg: Algorithm,
        kek: &KeyHandle<'_>,
        wrapped: &[u8],
        out: &mut [u8],
    ) -> Result<usize> {
        kw_cipher_unwrap(alg, kek.bytes()?, wrapped, out)
    }

    fn ecdh(
        &self,
        curve: EllipticCurve,
        own_private: &KeyHandle<'_>,
        peer_public: &KeyHandle<'_>,
        z_out: &mut [u8],
    ) -> Result<usize> {
        if curve != EllipticCurve::P256 {
            return Err(CoseError::UnsupportedAlgorithm(curve.crv() as i64));
        }
        let sk = p256::SecretKey::from_slice(own_private.bytes()?)
            .map_err(|_| CoseError::KeyImportFailed)?;
        let pk = p256::PublicKey::from_sec1_bytes(peer_public.bytes()?)
            .map_err(|_| CoseError::KeyImportFailed)?;
        let shared = p256::ecdh::diffie_hellman(sk.to_nonzero_scalar(), pk.as_affine());
        let z = shared.raw_secret_bytes();
        if z_out.len() < z.len() {
            return Err(CoseError::BufferTooSmall);
        }
        z_out[..z.len()].copy_from_slice(z);
        Ok(z.len())
    }

    fn ecdh_generate(
        &self,
        curve: EllipticCurve,
        private_out: &mut [u8],
        public_out: &mut [u8],
    ) -> Result<(usize, usize)> {
        if curve != EllipticCurve::P256 {
            return Err(CoseError::UnsupportedAlgorithm(curve.crv() as i64));
        }
        let sk = p256::SecretKey::random(&mut OsRng);
        let scalar = sk.to_bytes();
        let point = sk.public_key().to_encoded_point(false);
        let public = point.as_bytes();
        if private_out.len() < scalar.len() || public_out.len() < public.len() {
            return Err(CoseError::BufferTooSmall);
        }
        private_out[..scalar.len()].copy_from_slice(&scalar);
        public_out[..public.len()].copy_from_slice(public);
        Ok((scalar.len(), public.len()))
    }

    fn hkdf(
        &self,
        alg: Algorithm,
        salt: &[u8],
        ikm: &[u8],
        info: &[u8],
        okm: &mut [u8],
    ) -> Result<()> {
        if alg.hash_size()? != 32 {
            return Err(CoseError::UnsupportedAlgorithm(alg.0));
        }
        let salt = if salt.is_empty() { None } else { Some(salt) };
        hkdf::Hkdf::<Sha256>::new(salt, ikm)
            .expand(info, okm)
            .map_err(|_| CoseError::CryptoFailed)
    }

    fn hpke_seal(
        &self,
        alg: Algorithm,
        peer_public: &KeyHandle<'_>,
        info: &[u8],
        aad: &[u8],
        plaintext: &[u8],
        enc_out: &mut [u8],
        ct_out: &mut [u8],
    ) -> Result<(usize, usize)> {
        if alg != Algorithm::HPKE_BASE_P256_SHA256_AES128GCM {
            return Err(CoseError::UnsupportedAlgorithm(alg.0));
        }
        hpke::seal(peer_public.bytes()?, info, aad, plaintext, enc_out, ct_out)
    }

    fn hpke_open(
        &self,
        alg: Algorithm,
        own_private: &KeyHandle<'_>,
        enc: &[u8],
        info: &[u8],
        aad: &[u8],
        ciphertext: &[u8],
        pt_out: &mut [u8],
    ) -> Result<usize> {
        if alg != Algorithm::HPKE_BASE_P256_SHA256_AES128GCM {
            return Err(CoseError::UnsupportedAlgorithm(alg.0));
        }
        hpke::open(own_private.bytes()?, enc, info, aad, ciphertext, pt_out)
    }

    fn random(&self, out: &mut [u8]) -> Result<()> {
        OsRng.fill_bytes(out);
        Ok(())
    }

    fn key_alloc_leak_check(&self) -> usize {
        self.tracked_keys.get()
    }
}

impl RestartableSign for RustCrypto {
    fn sign_restart(
        &self,
        _first: bool,
        alg: Algorithm,
        key: &KeyHandle<'_>,
        tbs_hash: &[u8],
        sig_out: &mut [u8],
    ) -> Result<SignStatus> {
        // The pending counter stands in for the round trips a hardware signer would need.
        if self.restart_rounds.get() > 0 {
            self.restart_rounds.set(self.restart_rounds.get() - 1);
            return Ok(SignStatus::Pending);
        }
        let n = self.sign(alg, key, tbs_hash, sig_out)?;
        Ok(SignStatus::Done(n))
    }
}
