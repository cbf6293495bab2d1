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
 * Recipient subsystem
 *
 * Content Encryption Key distribution: each recipient plugin writes or consumes one
 * COSE_Recipient structure. Concrete flows: direct (shared CEK), AES key wrap under a
 * pre-shared KEK, ECDH-ES with HKDF and AES key wrap (self-contained or composed with a nested
 * key wrap recipient, depth 2), and HPKE base-mode single-shot. Includes the COSE_Key
 * encode/decode for ephemeral EC2 keys and the canonical COSE_KDF_Context builder.
 **************************************************************************************************/
use crate::algorithm::Algorithm;
use crate::constants::*;
use crate::crypto::{CryptoAdapter, EllipticCurve};
use crate::decode::DecodeBuffer;
use crate::encode::EncodeBuffer;
use crate::error::{CoseError, Result};
use crate::keys::KeyHandle;
use crate::params::{
    decode_headers, Location, ParamPool, ParamValue, SpecialDecode, SpecialValue,
};

/// Writes one COSE_Recipient conveying `cek` for one party.
pub trait RecipientEncoder {
    /// Write a full COSE_Recipient array (headers, encrypted CEK or empty, optional nested
    /// recipients) onto `buf`. In size-only mode `cek` is a dummy of the correct length and no
    /// crypto runs.
    fn build(&mut self, cek: &[u8], ce_alg: Algorithm, buf: &mut EncodeBuffer<'_>) -> Result<()>;

    /// Nested composition: protect `cek` under an externally derived KEK instead of this
    /// recipient's own key material. Only key wrap recipients support this.
    fn build_with_kek(
        &mut self,
        _kek: &[u8],
        _cek: &[u8],
        _ce_alg: Algorithm,
        _buf: &mut EncodeBuffer<'_>,
    ) -> Result<()> {
        Err(CoseError::Declined)
    }

    /// The algorithm an externally derived KEK will be used with, for KDF context construction
    /// in nested composition.
    fn kek_algorithm(&self) -> Option<Algorithm> {
        None
    }
}

/// Consumes one COSE_Recipient and recovers the CEK.
pub trait RecipientDecoder {
    /// Enter the recipient array at the cursor, decode its headers into `pool`, run the inverse
    /// of the encoder flow and write the CEK into `cek_out`, returning its size. Soft errors
    /// ([`CoseError::is_soft`]) make the engine restore the cursor and try the next plugin.
    fn unwrap_cek<'b>(
        &self,
        location: Location,
        ce_alg: Algorithm,
        dec: &mut DecodeBuffer<'b>,
        pool: &mut ParamPool<'b>,
        cek_out: &mut [u8],
    ) -> Result<usize>;

    /// Nested composition: recover the CEK using an externally derived KEK.
    fn unwrap_cek_with_kek<'b>(
        &self,
        _kek: &[u8],
        _location: Location,
        _ce_alg: Algorithm,
        _dec: &mut DecodeBuffer<'b>,
        _pool: &mut ParamPool<'b>,
        _cek_out: &mut [u8],
    ) -> Result<usize> {
        Err(CoseError::Declined)
    }

    /// See [`RecipientEncoder::kek_algorithm`].
    fn kek_algorithm(&self) -> Option<Algorithm> {
        None
    }
}

/***************************************************************************************************
 * COSE_Key helpers (EC2 ephemeral keys)
 **************************************************************************************************/

/// Write an EC2 COSE_Key map for an SEC1 uncompressed public key.
fn encode_ec2_key(
    buf: &mut EncodeBuffer<'_>,
    curve: EllipticCurve,
    public: &[u8],
) -> Result<()> {
    let coord = curve.coordinate_size();
    buf.map(4)?;
    buf.int(KEY_KTY)?;
    buf.uint(KTY_EC2)?;
    buf.int(KEY_CRV)?;
    buf.uint(curve.crv())?;
    buf.int(KEY_X)?;
    if public.len() == 1 + 2 * coord {
        buf.bstr(&public[1..1 + coord])?;
    } else {
        buf.bstr_pad(coord).map(|_| ())?;
    }
    buf.int(KEY_Y)?;
    if public.len() == 1 + 2 * coord {
        buf.bstr(&public[1 + coord..])?;
    } else {
        buf.bstr_pad(coord).map(|_| ())?;
    }
    Ok(())
}

/// Decode an EC2 COSE_Key map, returning `(crv, x, y)`.
fn decode_ec2_key(raw: &[u8]) -> Result<(u64, &[u8], &[u8])> {
    let mut d = DecodeBuffer::new(raw);
    let pairs = d.map()?;
    let mut kty = 0u64;
    let mut crv = 0u64;
    let mut x: &[u8] = &[];
    let mut y: &[u8] = &[];
    for _ in 0..pairs {
        match d.int()? {
            KEY_KTY => kty = d.uint()?,
            KEY_CRV => crv = d.uint()?,
            KEY_X => x = d.bstr()?,
            KEY_Y => y = d.bstr()?,
            _ => d.skip()?,
        }
    }
    if kty != KTY_EC2 || x.is_empty() || y.is_empty() {
        return Err(CoseError::KeyImportFailed);
    }
    Ok((crv, x, y))
}

// Captures the ephemeral-key header (a COSE_Key map) during recipient header decode, since it
// is the one non-scalar parameter the flows below must read back.
struct EphemeralCatcher;

impl SpecialDecode for EphemeralCatcher {
    fn decode<'b>(
        &mut self,
        label: i64,
        _critical: bool,
        dec: &mut DecodeBuffer<'b>,
    ) -> Result<Option<SpecialValue<'b>>> {
        if label == HDR_EPHEMERAL_KEY {
            Ok(Some(SpecialValue {
                raw: dec.item_slice()?,
                word: 0,
            }))
        } else {
            Ok(None)
        }
    }
}

/// Serialize the protected bucket of a recipient holding only `alg`, into `scratch`.
/// Returns the encoded map content.
fn recipient_protected<'x>(scratch: &'x mut [u8], alg: Algorithm) -> Result<&'x [u8]> {
    let mut buf = EncodeBuffer::new(scratch);
    buf.map(1)?;
    buf.int(HDR_ALG)?;
    buf.int(alg.0)?;
    let n = buf.len();
    Ok(&scratch[..n])
}

/***************************************************************************************************
 * Direct recipient
 **************************************************************************************************/

/// The CEK is shared out of band: the recipient structure only carries the `direct` algorithm
/// and an optional kid, with empty protected headers and an empty encrypted-key field.
pub struct DirectRecipient<'k> {
    cek: KeyHandle<'k>,
    kid: Option<&'k [u8]>,
}

impl<'k> DirectRecipient<'k> {
    /// Construct over the out-of-band CEK.
    pub fn new(cek: KeyHandle<'k>) -> Self {
        DirectRecipient { cek, kid: None }
    }

    /// Attach a kid hint.
    pub fn with_kid(mut self, kid: &'k [u8]) -> Self {
        self.kid = Some(kid);
        self
    }
}

impl<'k> RecipientEncoder for DirectRecipient<'k> {
    fn build(&mut self, _cek: &[u8], _ce_alg: Algorithm, buf: &mut EncodeBuffer<'_>) -> Result<()> {
        buf.array(3)?;
        // Direct recipients must carry nothing protected (RFC 9052 8.5.1), so alg sits in the
        // unprotected bucket here.
        buf.bstr(&[])?;
        buf.map(1 + self.kid.map_or(0, |_| 1))?;
        buf.int(HDR_ALG)?;
        buf.int(Algorithm::DIRECT.0)?;
        if let Some(kid) = self.kid {
            buf.int(HDR_KID)?;
            buf.bstr(kid)?;
        }
        buf.bstr(&[])
    }
}

impl<'k> RecipientDecoder for DirectRecipient<'k> {
    fn unwrap_cek<'b>(
        &self,
        location: Location,
        ce_alg: Algorithm,
        dec: &mut DecodeBuffer<'b>,
        pool: &mut ParamPool<'b>,
        cek_out: &mut [u8],
    ) -> Result<usize> {
        if dec.array()? != 3 {
            return Err(CoseError::WrongArrayLength);
        }
        let hdrs = decode_headers(dec, location, pool, None)?;
        let list = pool.list(hdrs.head);
        if list.alg() != Algorithm::DIRECT {
            return Err(CoseError::Declined);
        }
        if !hdrs.protected.is_empty() {
            return Err(CoseError::MalformedEncoding);
        }
        if let Some(want) = self.kid {
            match list.kid() {
                Some(got) if got == want => {}
                _ => return Err(CoseError::UnmatchedKid),
            }
        }
        if !dec.bstr()?.is_empty() {
            return Err(CoseError::MalformedEncoding);
        }

        let cek = self.cek.bytes()?;
        if cek.len() != ce_alg.key_length()? {
            return Err(CoseError::WrongKeyType);
        }
        if cek_out.len() < cek.len() {
            return Err(CoseError::BufferTooSmall);
        }
        cek_out[..cek.len()].copy_from_slice(cek);
        Ok(cek.len())
    }
}

/***************************************************************************************************
 * AES key wrap recipient
 **************************************************************************************************/

/// Wraps the CEK under a pre-shared KEK with AES-KW. The algorithm is the only protected
/// parameter; AES-KW does not authenticate headers, so nothing else may be integrity-bound.
pub struct KeyWrapRecipient<'k, A: CryptoAdapter> {
    adapter: &'k A,
    alg: Algorithm,
    kek: KeyHandle<'k>,
    kid: Option<&'k [u8]>,
}

impl<'k, A: CryptoAdapter> KeyWrapRecipient<'k, A> {
    /// Construct for one of the A128KW/A192KW/A256KW algorithms.
    pub fn new(adapter: &'k A, alg: Algorithm, kek: KeyHandle<'k>) -> Result<Self> {
        if !alg.is_key_wrap() {
            return Err(CoseError::UnsupportedAlgorithm(alg.0));
        }
        Ok(KeyWrapRecipient {
            adapter,
            alg,
            kek,
            kid: None,
        })
    }

    /// Attach a kid hint.
    pub fn with_kid(mut self, kid: &'k [u8]) -> Self {
        self.kid = Some(kid);
        self
    }

    fn build_inner(
        &mut self,
        kek: &KeyHandle<'_>,
        cek: &[u8],
        buf: &mut EncodeBuffer<'_>,
    ) -> Result<()> {
        buf.array(3)?;
        let mut scratch = [0u8; 16];
        buf.bstr(recipient_protected(&mut scratch, self.alg)?)?;
        buf.map(self.kid.map_or(0, |_| 1))?;
        if let Some(kid) = self.kid {
            buf.int(HDR_KID)?;
            buf.bstr(kid)?;
        }

        let wrapped_len = cek.len() + 8;
        if buf.is_size_only() {
            buf.bstr_pad(wrapped_len)?;
            return Ok(());
        }
        let mut wrapped = [0u8; MAX_WRAPPED_CEK_SIZE];
        let n = self.adapter.kw_wrap(self.alg, kek, cek, &mut wrapped)?;
        buf.bstr(&wrapped[..n])
    }

    fn unwrap_inner<'b>(
        &self,
        kek: &KeyHandle<'_>,
        location: Location,
        ce_alg: Algorithm,
        dec: &mut DecodeBuffer<'b>,
        pool: &mut ParamPool<'b>,
        cek_out: &mut [u8],
    ) -> Result<usize> {
        if dec.array()? != 3 {
            return Err(CoseError::WrongArrayLength);
        }
        let hdrs = decode_headers(dec, location, pool, None)?;
        let list = pool.list(hdrs.head);
        if list.alg() != self.alg {
            return Err(CoseError::Declined);
        }
        if let Some(want) = self.kid {
            match list.kid() {
                Some(got) if got == want => {}
                _ => return Err(CoseError::UnmatchedKid),
            }
        }
        let wrapped = dec.bstr()?;

        let n = self
            .adapter
            .kw_unwrap(self.alg, kek, wrapped, cek_out)
            .map_err(|_| CoseError::KeyUnwrapFailed)?;
        if n != ce_alg.key_length()? {
            return Err(CoseError::KeyUnwrapFailed);
        }
        Ok(n)
    }
}

impl<'k, A: CryptoAdapter> RecipientEncoder for KeyWrapRecipient<'k, A> {
    fn build(&mut self, cek: &[u8], _ce_alg: Algorithm, buf: &mut EncodeBuffer<'_>) -> Result<()> {
        let kek = self.kek;
        self.build_inner(&kek, cek, buf)
    }

    fn build_with_kek(
        &mut self,
        kek: &[u8],
        cek: &[u8],
        _ce_alg: Algorithm,
        buf: &mut EncodeBuffer<'_>,
    ) -> Result<()> {
        self.build_inner(&KeyHandle::Bytes(kek), cek, buf)
    }

    fn kek_algorithm(&self) -> Option<Algorithm> {
        Some(self.alg)
    }
}

impl<'k, A: CryptoAdapter> RecipientDecoder for KeyWrapRecipient<'k, A> {
    fn unwrap_cek<'b>(
        &self,
        location: Location,
        ce_alg: Algorithm,
        dec: &mut DecodeBuffer<'b>,
        pool: &mut ParamPool<'b>,
        cek_out: &mut [u8],
    ) -> Result<usize> {
        self.unwrap_inner(&self.kek, location, ce_alg, dec, pool, cek_out)
    }

    fn unwrap_cek_with_kek<'b>(
        &self,
        kek: &[u8],
        location: Location,
        ce_alg: Algorithm,
        dec: &mut DecodeBuffer<'b>,
        pool: &mut ParamPool<'b>,
        cek_out: &mut [u8],
    ) -> Result<usize> {
        self.unwrap_inner(&KeyHandle::Bytes(kek), location, ce_alg, dec, pool, cek_out)
    }

    fn kek_algorithm(&self) -> Option<Algorithm> {
        Some(self.alg)
    }
}

/***************************************************************************************************
 * ECDH-ES recipient
 **************************************************************************************************/

/// ECDH-ES key agreement: an ephemeral key pair is generated, ECDH with the recipient's static
/// public key yields Z, HKDF over the canonical COSE_KDF_Context derives a KEK, and AES-KW
/// wraps the CEK. A random salt of the KDF hash length is always included.
///
/// With one of the combined `ECDH-ES + AxxxKW` algorithms the recipient is self-contained.
/// With plain `ECDH-ES + HKDF-256` it must be composed with a nested key wrap recipient, which
/// receives the derived key as its KEK.
pub struct EcdhEsRecipient<'k, A: CryptoAdapter> {
    adapter: &'k A,
    alg: Algorithm,
    curve: EllipticCurve,
    peer_public: KeyHandle<'k>,
    own_private: KeyHandle<'k>,
    kid: Option<&'k [u8]>,
    party_u: Option<&'k [u8]>,
    party_v: Option<&'k [u8]>,
    kdf_buf: Option<&'k mut [u8]>,
    nested_enc: Option<&'k mut dyn RecipientEncoder>,
    nested_dec: Option<&'k dyn RecipientDecoder>,
}

impl<'k, A: CryptoAdapter> EcdhEsRecipient<'k, A> {
    fn base(adapter: &'k A, alg: Algorithm, curve: EllipticCurve) -> Result<Self> {
        if !alg.is_ecdh() {
            return Err(CoseError::UnsupportedAlgorithm(alg.0));
        }
        Ok(EcdhEsRecipient {
            adapter,
            alg,
            curve,
            peer_public: KeyHandle::None,
            own_private: KeyHandle::None,
            kid: None,
            party_u: None,
            party_v: None,
            kdf_buf: None,
            nested_enc: None,
            nested_dec: None,
        })
    }

    /// Encode-side constructor over the recipient's static public key (SEC1 uncompressed).
    pub fn for_encrypt(
        adapter: &'k A,
        alg: Algorithm,
        curve: EllipticCurve,
        peer_public: KeyHandle<'k>,
    ) -> Result<Self> {
        let mut r = Self::base(adapter, alg, curve)?;
        r.peer_public = peer_public;
        Ok(r)
    }

    /// Decode-side constructor over the recipient's static private key.
    pub fn for_decrypt(
        adapter: &'k A,
        alg: Algorithm,
        curve: EllipticCurve,
        own_private: KeyHandle<'k>,
    ) -> Result<Self> {
        let mut r = Self::base(adapter, alg, curve)?;
        r.own_private = own_private;
        Ok(r)
    }

    /// Attach a kid hint.
    pub fn with_kid(mut self, kid: &'k [u8]) -> Self {
        self.kid = Some(kid);
        self
    }

    /// PartyU/PartyV identities for the KDF context.
    pub fn with_party_info(mut self, party_u: Option<&'k [u8]>, party_v: Option<&'k [u8]>) -> Self {
        self.party_u = party_u;
        self.party_v = party_v;
        self
    }

    /// Replace the default 200-byte KDF context buffer, for long party identities.
    pub fn with_kdf_buffer(mut self, buf: &'k mut [u8]) -> Self {
        self.kdf_buf = Some(buf);
        self
    }

    /// Compose with a nested recipient which will protect the CEK under the derived key.
    /// Requires the plain `ECDH-ES + HKDF-256` algorithm.
    pub fn with_nested_encoder(mut self, inner: &'k mut dyn RecipientEncoder) -> Result<Self> {
        if self.alg.kw_stage().is_some() {
            return Err(CoseError::UnsupportedAlgorithm(self.alg.0));
        }
        self.nested_enc = Some(inner);
        Ok(self)
    }

    /// Decode-side counterpart of [`EcdhEsRecipient::with_nested_encoder`].
    pub fn with_nested_decoder(mut self, inner: &'k dyn RecipientDecoder) -> Result<Self> {
        if self.alg.kw_stage().is_some() {
            return Err(CoseError::UnsupportedAlgorithm(self.alg.0));
        }
        self.nested_dec = Some(inner);
        Ok(self)
    }

    /// The algorithm the derived key feeds: the built-in wrap stage, or the nested
    /// recipient's KEK algorithm.
    fn derived_key_algorithm(&self) -> Result<Algorithm> {
        if let Some(kw) = self.alg.kw_stage() {
            return Ok(kw);
        }
        self.nested_enc
            .as_ref()
            .and_then(|n| n.kek_algorithm())
            .or_else(|| self.nested_dec.as_ref().and_then(|n| n.kek_algorithm()))
            .ok_or(CoseError::UnsupportedAlgorithm(self.alg.0))
    }

    /// Serialize the COSE_KDF_Context (RFC 9053 5.2) and derive the KEK from Z.
    fn derive_kek(
        &mut self,
        kek_alg: Algorithm,
        protected: &[u8],
        salt: &[u8],
        z: &[u8],
        kek_out: &mut [u8],
    ) -> Result<()> {
        let party_u = self.party_u;
        let party_v = self.party_v;
        let mut local = [0u8; KDF_CONTEXT_DEFAULT_SIZE];
        let scratch: &mut [u8] = match &mut self.kdf_buf {
            Some(b) => &mut b[..],
            None => &mut local[..],
        };
        let mut ctx = EncodeBuffer::new(scratch);

        let party = |ctx: &mut EncodeBuffer<'_>, ident: Option<&[u8]>| -> Result<()> {
            ctx.array(3)?;
            match ident {
                Some(b) => ctx.bstr(b)?,
                None => ctx.null()?,
            }
            ctx.null()?;
            ctx.null()
        };

        let r = (|| -> Result<usize> {
            ctx.array(4)?;
            ctx.int(kek_alg.0)?;
            party(&mut ctx, party_u)?;
            party(&mut ctx, party_v)?;
            ctx.array(2)?;
            ctx.uint((kek_alg.key_length()? * 8) as u64)?;
            ctx.bstr(protected)?;
            Ok(ctx.len())
        })();
        let n = r.map_err(|e| match e {
            CoseError::BufferTooSmall => CoseError::KdfContextTooSmall,
            other => other,
        })?;

        let info: &[u8] = match &self.kdf_buf {
            Some(b) => &b[..n],
            None => &local[..n],
        };
        self.adapter.hkdf(self.alg, salt, z, info, kek_out)
    }
}

impl<'k, A: CryptoAdapter> RecipientEncoder for EcdhEsRecipient<'k, A> {
    fn build(&mut self, cek: &[u8], ce_alg: Algorithm, buf: &mut EncodeBuffer<'_>) -> Result<()> {
        let kek_alg = self.derived_key_algorithm()?;
        let kek_len = kek_alg.key_length()?;
        let nested = self.alg.kw_stage().is_none();
        let hash_len = self.alg.hash_size()?;

        let mut prot_scratch = [0u8; 16];
        let protected = recipient_protected(&mut prot_scratch, self.alg)?;

        let mut public = [0u8; MAX_EC_POINT_SIZE];
        let mut salt = [0u8; MAX_HASH_SIZE];
        let mut kek = [0u8; MAX_CEK_SIZE];
        let public_len = self.curve.public_key_size();

        if !buf.is_size_only() {
            let mut private = [0u8; MAX_EC_SCALAR_SIZE];
            let (priv_len, pub_len) =
                self.adapter
                    .ecdh_generate(self.curve, &mut private, &mut public)?;
            if pub_len != public_len {
                return Err(CoseError::KeyImportFailed);
            }
            let mut z = [0u8; MAX_EC_SCALAR_SIZE];
            let z_len = self.adapter.ecdh(
                self.curve,
                &KeyHandle::Bytes(&private[..priv_len]),
                &self.peer_public,
                &mut z,
            )?;
            self.adapter.random(&mut salt[..hash_len])?;
            self.derive_kek(kek_alg, protected, &salt[..hash_len], &z[..z_len], &mut kek[..kek_len])?;
        }

        buf.array(if nested { 4 } else { 3 })?;
        buf.bstr(protected)?;

        // unprotected: ephemeral key, salt, optional kid
        buf.map(2 + self.kid.map_or(0, |_| 1))?;
        buf.int(HDR_EPHEMERAL_KEY)?;
        if buf.is_size_only() {
            // dummy of the right shape; only lengths matter
            encode_ec2_key(buf, self.curve, &[])?;
        } else {
            encode_ec2_key(buf, self.curve, &public[..public_len])?;
        }
        buf.int(HDR_SALT)?;
        if buf.is_size_only() {
            buf.bstr_pad(hash_len)?;
        } else {
            buf.bstr(&salt[..hash_len])?;
        }
        if let Some(kid) = self.kid {
            buf.int(HDR_KID)?;
            buf.bstr(kid)?;
        }

        if nested {
            // Empty encrypted-key field, then the nested recipient under the derived KEK.
            buf.bstr(&[])?;
            buf.array(1)?;
            match &mut self.nested_enc {
                Some(inner) => inner.build_with_kek(&kek[..kek_len], cek, ce_alg, buf),
                None => Err(CoseError::UnsupportedAlgorithm(self.alg.0)),
            }
        } else {
            let wrapped_len = cek.len() + 8;
            if buf.is_size_only() {
                buf.bstr_pad(wrapped_len)?;
                return Ok(());
            }
            let mut wrapped = [0u8; MAX_WRAPPED_CEK_SIZE];
            let n = self.adapter.kw_wrap(
                kek_alg,
                &KeyHandle::Bytes(&kek[..kek_len]),
                cek,
                &mut wrapped,
            )?;
            buf.bstr(&wrapped[..n])
        }
    }
}

impl<'k, A: CryptoAdapter> RecipientDecoder for EcdhEsRecipient<'k, A> {
    fn unwrap_cek<'b>(
        &self,
        location: Location,
        ce_alg: Algorithm,
        dec: &mut DecodeBuffer<'b>,
        pool: &mut ParamPool<'b>,
        cek_out: &mut [u8],
    ) -> Result<usize> {
        let n_elements = dec.array()?;
        let nested = self.alg.kw_stage().is_none();
        let expect = if nested { 4 } else { 3 };
        if n_elements != expect {
            return Err(CoseError::Declined);
        }
        if nested && location.nesting >= 2 {
            return Err(CoseError::NestingTooDeep);
        }

        let mut catcher = EphemeralCatcher;
        let hdrs = decode_headers(dec, location, pool, Some(&mut catcher))?;
        let list = pool.list(hdrs.head);
        if list.alg() != self.alg {
            return Err(CoseError::Declined);
        }
        if let Some(want) = self.kid {
            match list.kid() {
                Some(got) if got == want => {}
                _ => return Err(CoseError::UnmatchedKid),
            }
        }

        // Ephemeral sender key, captured as a special value during header decode.
        let ephemeral = match list.find(HDR_EPHEMERAL_KEY).map(|p| &p.value) {
            Some(ParamValue::Special(s)) => s.raw,
            _ => return Err(CoseError::KeyImportFailed),
        };
        let (crv, x, y) = decode_ec2_key(ephemeral)?;
        if crv != self.curve.crv() {
            return Err(CoseError::Declined);
        }
        let coord = self.curve.coordinate_size();
        if x.len() != coord || y.len() != coord {
            return Err(CoseError::KeyImportFailed);
        }
        let salt = match list.find(HDR_SALT).map(|p| &p.value) {
            Some(ParamValue::Bstr(b)) => *b,
            _ => &[],
        };

        let mut public = [0u8; MAX_EC_POINT_SIZE];
        public[0] = 0x04;
        public[1..1 + coord].copy_from_slice(x);
        public[1 + coord..1 + 2 * coord].copy_from_slice(y);

        let mut z = [0u8; MAX_EC_SCALAR_SIZE];
        let z_len = self.adapter.ecdh(
            self.curve,
            &self.own_private,
            &KeyHandle::Bytes(&public[..1 + 2 * coord]),
            &mut z,
        )?;

        let kek_alg = if nested {
            self.nested_dec
                .as_ref()
                .and_then(|n| n.kek_algorithm())
                .ok_or(CoseError::UnsupportedAlgorithm(self.alg.0))?
        } else {
            self.alg.kw_stage().ok_or(CoseError::UnsupportedAlgorithm(self.alg.0))?
        };
        let kek_len = kek_alg.key_length()?;
        let mut kek = [0u8; MAX_CEK_SIZE];

        // derive_kek needs &mut self for the caller-supplied KDF buffer; clone the borrow-free
        // parts instead and run the context build on the stack here.
        let mut local = [0u8; KDF_CONTEXT_DEFAULT_SIZE];
        let mut ctx = EncodeBuffer::new(&mut local);
        let party = |ctx: &mut EncodeBuffer<'_>, ident: Option<&[u8]>| -> Result<()> {
            ctx.array(3)?;
            match ident {
                Some(b) => ctx.bstr(b)?,
                None => ctx.null()?,
            }
            ctx.null()?;
            ctx.null()
        };
        let r = (|| -> Result<usize> {
            ctx.array(4)?;
            ctx.int(kek_alg.0)?;
            party(&mut ctx, self.party_u)?;
            party(&mut ctx, self.party_v)?;
            ctx.array(2)?;
            ctx.uint((kek_len * 8) as u64)?;
            ctx.bstr(hdrs.protected)?;
            Ok(ctx.len())
        })();
        let n = r.map_err(|e| match e {
            CoseError::BufferTooSmall => CoseError::KdfContextTooSmall,
            other => other,
        })?;
        self.adapter
            .hkdf(self.alg, salt, &z[..z_len], &local[..n], &mut kek[..kek_len])?;

        if nested {
            if !dec.bstr()?.is_empty() {
                return Err(CoseError::MalformedEncoding);
            }
            let inner = self
                .nested_dec
                .ok_or(CoseError::UnsupportedAlgorithm(self.alg.0))?;
            if dec.array()? != 1 {
                return Err(CoseError::WrongArrayLength);
            }
            inner.unwrap_cek_with_kek(
                &kek[..kek_len],
                Location::new(location.nesting + 1, 0),
                ce_alg,
                dec,
                pool,
                cek_out,
            )
        } else {
            let wrapped = dec.bstr()?;
            let n = self
                .adapter
                .kw_unwrap(kek_alg, &KeyHandle::Bytes(&kek[..kek_len]), wrapped, cek_out)
                .map_err(|_| CoseError::KeyUnwrapFailed)?;
            if n != ce_alg.key_length()? {
                return Err(CoseError::KeyUnwrapFailed);
            }
            Ok(n)
        }
    }
}

/***************************************************************************************************
 * HPKE recipient
 **************************************************************************************************/

/// HPKE base-mode single-shot (RFC 9180, draft-ietf-cose-hpke): the encapsulated key travels in
/// an unprotected header, the sealed CEK in the encrypted-key field. The recipient's protected
/// header bytes bind the algorithm as the HPKE info input.
pub struct HpkeRecipient<'k, A: CryptoAdapter> {
    adapter: &'k A,
    alg: Algorithm,
    peer_public: KeyHandle<'k>,
    own_private: KeyHandle<'k>,
    kid: Option<&'k [u8]>,
}

impl<'k, A: CryptoAdapter> HpkeRecipient<'k, A> {
    /// Encode-side constructor over the recipient's public key.
    pub fn for_encrypt(adapter: &'k A, peer_public: KeyHandle<'k>) -> Self {
        HpkeRecipient {
            adapter,
            alg: Algorithm::HPKE_BASE_P256_SHA256_AES128GCM,
            peer_public,
            own_private: KeyHandle::None,
            kid: None,
        }
    }

    /// Decode-side constructor over the recipient's private key.
    pub fn for_decrypt(adapter: &'k A, own_private: KeyHandle<'k>) -> Self {
        HpkeRecipient {
            adapter,
            alg: Algorithm::HPKE_BASE_P256_SHA256_AES128GCM,
            peer_public: KeyHandle::None,
            own_private,
            kid: None,
        }
    }

    /// Attach a kid hint.
    pub fn with_kid(mut self, kid: &'k [u8]) -> Self {
        self.kid = Some(kid);
        self
    }
}

impl<'k, A: CryptoAdapter> RecipientEncoder for HpkeRecipient<'k, A> {
    fn build(&mut self, cek: &[u8], _ce_alg: Algorithm, buf: &mut EncodeBuffer<'_>) -> Result<()> {
        let mut prot_scratch = [0u8; 16];
        let protected = recipient_protected(&mut prot_scratch, self.alg)?;

        let enc_len = EllipticCurve::P256.public_key_size();
        let ct_len = cek.len() + 16;

        buf.array(3)?;
        buf.bstr(protected)?;
        buf.map(1 + self.kid.map_or(0, |_| 1))?;
        buf.int(HDR_HPKE_ENCAPSULATED_KEY)?;
        if buf.is_size_only() {
            buf.bstr_pad(enc_len)?;
            if let Some(kid) = self.kid {
                buf.int(HDR_KID)?;
                buf.bstr(kid)?;
            }
            buf.bstr_pad(ct_len)?;
            return Ok(());
        }

        let mut enc = [0u8; MAX_EC_POINT_SIZE];
        let mut ct = [0u8; MAX_WRAPPED_CEK_SIZE + 8];
        let (enc_n, ct_n) =
            self.adapter
                .hpke_seal(self.alg, &self.peer_public, protected, &[], cek, &mut enc, &mut ct)?;
        buf.bstr(&enc[..enc_n])?;
        if let Some(kid) = self.kid {
            buf.int(HDR_KID)?;
            buf.bstr(kid)?;
        }
        buf.bstr(&ct[..ct_n])
    }
}

impl<'k, A: CryptoAdapter> RecipientDecoder for HpkeRecipient<'k, A> {
    fn unwrap_cek<'b>(
        &self,
        location: Location,
        ce_alg: Algorithm,
        dec: &mut DecodeBuffer<'b>,
        pool: &mut ParamPool<'b>,
        cek_out: &mut [u8],
    ) -> Result<usize> {
        if dec.array()? != 3 {
            return Err(CoseError::Declined);
        }
        let hdrs = decode_headers(dec, location, pool, None)?;
        let list = pool.list(hdrs.head);
        if list.alg() != self.alg {
            return Err(CoseError::Declined);
        }
        if let Some(want) = self.kid {
            match list.kid() {
                Some(got) if got == want => {}
                _ => return Err(CoseError::UnmatchedKid),
            }
        }
        let enc = match list.find(HDR_HPKE_ENCAPSULATED_KEY).map(|p| &p.value) {
            Some(ParamValue::Bstr(b)) => *b,
            _ => return Err(CoseError::KeyImportFailed),
        };
        let ct = dec.bstr()?;

        let n = self
            .adapter
            .hpke_open(self.alg, &self.own_private, enc, hdrs.protected, &[], ct, cek_out)
            .map_err(|_| CoseError::KeyUnwrapFailed)?;
        if n != ce_alg.key_length()? {
            return Err(CoseError::KeyUnwrapFailed);
        }
        Ok(n)
    }
}

/***************************************************************************************************
 * Shared parse helper
 **************************************************************************************************/

/// Parse past one COSE_Recipient whose CEK has already been acquired (or which no plugin
/// accepted), decoding its headers into the pool so the returned parameter list is complete.
pub(crate) fn skip_recipient<'b>(
    dec: &mut DecodeBuffer<'b>,
    location: Location,
    pool: &mut ParamPool<'b>,
) -> Result<()> {
    if location.nesting > 2 {
        return Err(CoseError::NestingTooDeep);
    }
    let n = dec.array()?;
    if n != 3 && n != 4 {
        return Err(CoseError::WrongArrayLength);
    }
    let mut catcher = EphemeralCatcher;
    decode_headers(dec, location, pool, Some(&mut catcher))?;
    dec.skip()?;
    if n == 4 {
        if location.nesting >= 2 {
            return Err(CoseError::NestingTooDeep);
        }
        let m = dec.array()?;
        for j in 0..m {
            skip_recipient(dec, Location::new(location.nesting + 1, j as u8), pool)?;
        }
    }
    Ok(())
}
