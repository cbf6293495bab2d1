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
 * COSE Algorithm Identifiers
 *
 * Identifiers from the IANA COSE Algorithms registry, with the derived properties the engines
 * need: digest sizes, signature sizes, key lengths and AEAD nonce/tag sizes. The id 0 is
 * reserved in the registry and doubles as the NONE sentinel here.
 **************************************************************************************************/
use crate::error::{CoseError, Result};

/// A signed integer from the IANA COSE Algorithms registry.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Algorithm(pub i64);

impl Algorithm {
    /// Sentinel: no algorithm. Id 0 is reserved by the registry.
    pub const NONE: Algorithm = Algorithm(0);

    /// ECDSA w/ SHA-256.
    pub const ES256: Algorithm = Algorithm(-7);
    /// ECDSA w/ SHA-384.
    pub const ES384: Algorithm = Algorithm(-35);
    /// ECDSA w/ SHA-512.
    pub const ES512: Algorithm = Algorithm(-36);
    /// EdDSA (pure; requires the full to-be-signed structure, not a digest).
    pub const EDDSA: Algorithm = Algorithm(-8);
    /// RSASSA-PSS w/ SHA-256.
    pub const PS256: Algorithm = Algorithm(-37);
    /// RSASSA-PSS w/ SHA-384.
    pub const PS384: Algorithm = Algorithm(-38);
    /// RSASSA-PSS w/ SHA-512.
    pub const PS512: Algorithm = Algorithm(-39);

    /// HMAC w/ SHA-256, 256-bit tag.
    pub const HMAC_256: Algorithm = Algorithm(5);
    /// HMAC w/ SHA-384, 384-bit tag.
    pub const HMAC_384: Algorithm = Algorithm(6);
    /// HMAC w/ SHA-512, 512-bit tag.
    pub const HMAC_512: Algorithm = Algorithm(7);

    /// AES-GCM, 128-bit key.
    pub const A128GCM: Algorithm = Algorithm(1);
    /// AES-GCM, 192-bit key.
    pub const A192GCM: Algorithm = Algorithm(2);
    /// AES-GCM, 256-bit key.
    pub const A256GCM: Algorithm = Algorithm(3);

    /// Direct use of a shared CEK.
    pub const DIRECT: Algorithm = Algorithm(-6);
    /// AES Key Wrap, 128-bit KEK.
    pub const A128KW: Algorithm = Algorithm(-3);
    /// AES Key Wrap, 192-bit KEK.
    pub const A192KW: Algorithm = Algorithm(-4);
    /// AES Key Wrap, 256-bit KEK.
    pub const A256KW: Algorithm = Algorithm(-5);

    /// ECDH-ES + HKDF-SHA-256, derived key used directly as the CEK.
    pub const ECDH_ES_HKDF_256: Algorithm = Algorithm(-25);
    /// ECDH-ES + HKDF-SHA-256 + AES-128 key wrap.
    pub const ECDH_ES_A128KW: Algorithm = Algorithm(-29);
    /// ECDH-ES + HKDF-SHA-256 + AES-192 key wrap.
    pub const ECDH_ES_A192KW: Algorithm = Algorithm(-30);
    /// ECDH-ES + HKDF-SHA-256 + AES-256 key wrap.
    pub const ECDH_ES_A256KW: Algorithm = Algorithm(-31);

    /// HPKE base mode, DHKEM(P-256, HKDF-SHA256), HKDF-SHA256, AES-128-GCM
    /// (draft-ietf-cose-hpke).
    pub const HPKE_BASE_P256_SHA256_AES128GCM: Algorithm = Algorithm(35);

    /// Return `true` for the NONE sentinel.
    #[inline]
    pub fn is_none(self) -> bool {
        self == Algorithm::NONE
    }

    /// Return `true` for the signature algorithms this core routes to signers.
    pub fn is_signature(self) -> bool {
        matches!(
            self,
            Algorithm::ES256
                | Algorithm::ES384
                | Algorithm::ES512
                | Algorithm::EDDSA
                | Algorithm::PS256
                | Algorithm::PS384
                | Algorithm::PS512
        )
    }

    /// Return `true` for the MAC algorithms.
    pub fn is_mac(self) -> bool {
        matches!(
            self,
            Algorithm::HMAC_256 | Algorithm::HMAC_384 | Algorithm::HMAC_512
        )
    }

    /// Return `true` for the AEAD content encryption algorithms.
    pub fn is_aead(self) -> bool {
        matches!(
            self,
            Algorithm::A128GCM | Algorithm::A192GCM | Algorithm::A256GCM
        )
    }

    /// Return `true` for the AES key wrap algorithms.
    pub fn is_key_wrap(self) -> bool {
        matches!(
            self,
            Algorithm::A128KW | Algorithm::A192KW | Algorithm::A256KW
        )
    }

    /// Return `true` for the ECDH-ES key agreement algorithms.
    pub fn is_ecdh(self) -> bool {
        matches!(
            self,
            Algorithm::ECDH_ES_HKDF_256
                | Algorithm::ECDH_ES_A128KW
                | Algorithm::ECDH_ES_A192KW
                | Algorithm::ECDH_ES_A256KW
        )
    }

    /// Return `true` for the HPKE algorithms.
    pub fn is_hpke(self) -> bool {
        self == Algorithm::HPKE_BASE_P256_SHA256_AES128GCM
    }

    /// Digest size in bytes for the hash this algorithm implies.
    pub fn hash_size(self) -> Result<usize> {
        match self {
            Algorithm::ES256 | Algorithm::PS256 | Algorithm::HMAC_256 => Ok(32),
            Algorithm::ES384 | Algorithm::PS384 | Algorithm::HMAC_384 => Ok(48),
            Algorithm::ES512 | Algorithm::PS512 | Algorithm::HMAC_512 => Ok(64),
            Algorithm::ECDH_ES_HKDF_256
            | Algorithm::ECDH_ES_A128KW
            | Algorithm::ECDH_ES_A192KW
            | Algorithm::ECDH_ES_A256KW => Ok(32),
            _ => Err(CoseError::UnsupportedAlgorithm(self.0)),
        }
    }

    /// Signature size in bytes, where the algorithm (not the key) determines it. RSA-PSS sizes
    /// are key-dependent and answered by the adapter's `sig_size` instead.
    pub fn signature_size(self) -> Result<usize> {
        match self {
            Algorithm::ES256 => Ok(64),
            Algorithm::ES384 => Ok(96),
            Algorithm::ES512 => Ok(132),
            Algorithm::EDDSA => Ok(64),
            _ => Err(CoseError::UnsupportedAlgorithm(self.0)),
        }
    }

    /// Symmetric key length in bytes for AEAD, key wrap and HMAC algorithms. For the combined
    /// ECDH algorithms this is the length of the derived KEK.
    pub fn key_length(self) -> Result<usize> {
        match self {
            Algorithm::A128GCM | Algorithm::A128KW | Algorithm::ECDH_ES_A128KW => Ok(16),
            Algorithm::A192GCM | Algorithm::A192KW | Algorithm::ECDH_ES_A192KW => Ok(24),
            Algorithm::A256GCM | Algorithm::A256KW | Algorithm::ECDH_ES_A256KW => Ok(32),
            Algorithm::HMAC_256 => Ok(32),
            Algorithm::HMAC_384 => Ok(48),
            Algorithm::HMAC_512 => Ok(64),
            _ => Err(CoseError::UnsupportedAlgorithm(self.0)),
        }
    }

    /// AEAD nonce length in bytes.
    pub fn nonce_size(self) -> Result<usize> {
        if self.is_aead() {
            Ok(12)
        } else {
            Err(CoseError::UnsupportedAlgorithm(self.0))
        }
    }

    /// AEAD authentication tag length in bytes.
    pub fn tag_size(self) -> Result<usize> {
        if self.is_aead() {
            Ok(16)
        } else {
            Err(CoseError::UnsupportedAlgorithm(self.0))
        }
    }

    /// The key wrap stage of a combined ECDH-ES algorithm, if it has one.
    pub fn kw_stage(self) -> Option<Algorithm> {
        match self {
            Algorithm::ECDH_ES_A128KW => Some(Algorithm::A128KW),
            Algorithm::ECDH_ES_A192KW => Some(Algorithm::A192KW),
            Algorithm::ECDH_ES_A256KW => Some(Algorithm::A256KW),
            _ => None,
        }
    }
}

impl From<i64> for Algorithm {
    #[inline(always)]
    fn from(v: i64) -> Self {
        Algorithm(v)
    }
}
