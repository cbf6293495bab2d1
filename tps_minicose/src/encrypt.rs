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
 * Encrypt/Decrypt engine
 *
 * The COSE_Encrypt0 and COSE_Encrypt message state machines: CEK acquisition (context key,
 * random generation, recipient iteration), IV sourcing (explicit, random, or partial IV XORed
 * with a context IV), AEAD invocation over the canonical Enc_structure, and detached-ciphertext
 * mode. Recipient plugins are tried against each COSE_Recipient with the decoder cursor and the
 * parameter pool restored between attempts.
 **************************************************************************************************/
use crate::algorithm::Algorithm;
use crate::constants::*;
use crate::crypto::CryptoAdapter;
use crate::decode::DecodeBuffer;
use crate::encode::{EncodeBuffer, Span};
use crate::error::{CoseError, Result};
use crate::keys::KeyHandle;
use crate::options::{MessageType, Options};
use crate::params::{
    decode_headers, encode_headers, Location, Param, ParamPool, SpecialDecode, SpecialEncode,
};
use crate::recipient::{skip_recipient, RecipientDecoder, RecipientEncoder};
use crate::sig_structure::{SigContext, SigStructure};
use crate::tagging::{resolve_message_type, CapturedTags};

/// Compose the AEAD nonce from a partial IV and a context IV (RFC 9052 5.2): the partial IV is
/// left-padded with zeros to the nonce length and XORed with the context IV.
pub fn nonce_from_partial_iv(
    context_iv: &[u8],
    partial_iv: &[u8],
    out: &mut [u8],
) -> Result<usize> {
    let n = context_iv.len();
    if partial_iv.len() > n || out.len() < n {
        return Err(CoseError::BufferTooSmall);
    }
    out[..n].copy_from_slice(context_iv);
    let shift = n - partial_iv.len();
    for (i, b) in partial_iv.iter().enumerate() {
        out[shift + i] ^= *b;
    }
    Ok(n)
}

enum EncState {
    Init,
    Started,
    Done,
    Failed,
}

#[derive(Copy, Clone)]
enum IvSource<'k> {
    Random,
    Given(&'k [u8]),
    Partial {
        partial: &'k [u8],
        context_iv: &'k [u8],
    },
}

/// Encode context for COSE_Encrypt0 and COSE_Encrypt.
///
/// Lifecycle: construct, `set_cek` or `add_recipient`, `start`, `finish` with the plaintext.
/// When no CEK is set and recipients are present, a random CEK of the AEAD's key length is
/// generated at `start`.
pub struct EncryptEncode<'s, 'k, A: CryptoAdapter> {
    options: Options,
    adapter: &'k A,
    ce_alg: Algorithm,
    cek: KeyHandle<'k>,
    generated_cek: [u8; MAX_CEK_SIZE],
    cek_generated: bool,
    iv_source: IvSource<'k>,
    iv: [u8; MAX_NONCE_SIZE],
    iv_len: usize,
    body_params: [Param<'s>; MAX_BODY_PARAMS],
    n_body: usize,
    special: Option<&'s dyn SpecialEncode>,
    recipients: [Option<&'s mut dyn RecipientEncoder>; MAX_RECIPIENTS],
    n_recipients: usize,
    state: EncState,
    protected_span: Span,
}

impl<'s, 'k, A: CryptoAdapter> EncryptEncode<'s, 'k, A> {
    /// New encrypt context over an AEAD content encryption algorithm.
    pub fn new(options: Options, adapter: &'k A, ce_alg: Algorithm) -> Result<Self> {
        options.validate()?;
        match options.message_type() {
            MessageType::Encrypt0 | MessageType::Encrypt => {}
            _ => return Err(CoseError::InvalidState),
        }
        if !ce_alg.is_aead() {
            return Err(CoseError::UnsupportedAlgorithm(ce_alg.0));
        }
        Ok(EncryptEncode {
            options,
            adapter,
            ce_alg,
            cek: KeyHandle::None,
            generated_cek: [0u8; MAX_CEK_SIZE],
            cek_generated: false,
            iv_source: IvSource::Random,
            iv: [0u8; MAX_NONCE_SIZE],
            iv_len: 0,
            body_params: [Param::EMPTY; MAX_BODY_PARAMS],
            n_body: 0,
            special: None,
            recipients: Default::default(),
            n_recipients: 0,
            state: EncState::Init,
            protected_span: Span::default(),
        })
    }

    /// Use a caller-provided CEK. Mandatory for Encrypt0; optional when recipients carry it.
    pub fn set_cek(&mut self, cek: KeyHandle<'k>) {
        self.cek = cek;
    }

    /// Use a caller-provided IV instead of a random one.
    pub fn set_iv(&mut self, iv: &'k [u8]) {
        self.iv_source = IvSource::Given(iv);
    }

    /// Use a partial IV: the message carries `partial`, the nonce is `partial` XORed into
    /// `context_iv`.
    pub fn set_partial_iv(&mut self, partial: &'k [u8], context_iv: &'k [u8]) {
        self.iv_source = IvSource::Partial {
            partial,
            context_iv,
        };
    }

    /// Register a recipient. Only valid for COSE_Encrypt.
    pub fn add_recipient(&mut self, r: &'s mut dyn RecipientEncoder) -> Result<()> {
        if self.options.message_type() != MessageType::Encrypt {
            return Err(CoseError::InvalidState);
        }
        if self.n_recipients >= MAX_RECIPIENTS {
            return Err(CoseError::InvalidState);
        }
        self.recipients[self.n_recipients] = Some(r);
        self.n_recipients += 1;
        Ok(())
    }

    /// Add a caller-supplied body header parameter.
    pub fn add_header(&mut self, p: Param<'s>) -> Result<()> {
        if !matches!(self.state, EncState::Init) {
            return Err(CoseError::InvalidState);
        }
        if self.n_body >= MAX_BODY_PARAMS {
            return Err(CoseError::ParamPoolExhausted);
        }
        self.body_params[self.n_body] = p;
        self.n_body += 1;
        Ok(())
    }

    /// Register the encoder for special-typed header parameters.
    pub fn set_special_encoder(&mut self, cb: &'s dyn SpecialEncode) {
        self.special = Some(cb);
    }

    /// Write the message opening: tag, outer array and header buckets (including the IV or
    /// partial IV), and resolve the CEK.
    pub fn start(&mut self, buf: &mut EncodeBuffer<'_>) -> Result<()> {
        let r = self.start_inner(buf);
        if r.is_err() {
            self.state = EncState::Failed;
        }
        r
    }

    fn start_inner(&mut self, buf: &mut EncodeBuffer<'_>) -> Result<()> {
        if !matches!(self.state, EncState::Init) {
            return Err(CoseError::InvalidState);
        }
        let mtype = self.options.message_type();
        let key_len = self.ce_alg.key_length()?;
        let nonce_len = self.ce_alg.nonce_size()?;

        // CEK acquisition
        if self.cek.is_none() {
            if mtype == MessageType::Encrypt0 || self.n_recipients == 0 {
                return Err(CoseError::InvalidState);
            }
            if !buf.is_size_only() {
                self.adapter.random(&mut self.generated_cek[..key_len])?;
            }
            self.cek_generated = true;
        }

        // Nonce resolution
        self.iv_len = nonce_len;
        match self.iv_source {
            IvSource::Random => {
                if !buf.is_size_only() {
                    self.adapter.random(&mut self.iv[..nonce_len])?;
                }
            }
            IvSource::Given(iv) => {
                if iv.len() != nonce_len {
                    return Err(CoseError::BufferTooSmall);
                }
                self.iv[..nonce_len].copy_from_slice(iv);
            }
            IvSource::Partial {
                partial,
                context_iv,
            } => {
                if context_iv.len() != nonce_len {
                    return Err(CoseError::BufferTooSmall);
                }
                nonce_from_partial_iv(context_iv, partial, &mut self.iv)?;
            }
        }

        if !self.options.is_tag_prohibited() {
            // tag() is always Some for Encrypt0/Encrypt
            buf.tag(mtype.tag().unwrap_or(0))?;
        }
        buf.array(if mtype == MessageType::Encrypt0 { 3 } else { 4 })?;

        let mut combined = [Param::EMPTY; MAX_BODY_PARAMS + 2];
        combined[0] = Param::alg(self.ce_alg);
        let mut n = 1usize;
        match self.iv_source {
            IvSource::Partial { partial, .. } => {
                combined[n] = Param::bstr(HDR_PARTIAL_IV, partial);
                n += 1;
            }
            _ => {
                combined[n] = Param::iv(&self.iv[..self.iv_len]);
                n += 1;
            }
        }
        for p in &self.body_params[..self.n_body] {
            combined[n] = *p;
            n += 1;
        }
        self.protected_span = encode_headers(buf, &combined[..n], self.special)?;

        self.state = EncState::Started;
        Ok(())
    }

    /// Complete the message with the default Enc_structure scratch. Returns the ciphertext
    /// length (useful in detached mode).
    pub fn finish(
        &mut self,
        external_aad: &[u8],
        plaintext: &[u8],
        buf: &mut EncodeBuffer<'_>,
        detached_out: Option<&mut [u8]>,
    ) -> Result<usize> {
        let mut scratch = [0u8; ENC_STRUCT_DEFAULT_SIZE];
        self.finish_with_scratch(external_aad, plaintext, buf, detached_out, &mut scratch)
    }

    /// Complete the message, serializing the Enc_structure into `scratch` (callers with long
    /// external AAD supply a bigger buffer than [`finish`] uses).
    pub fn finish_with_scratch(
        &mut self,
        external_aad: &[u8],
        plaintext: &[u8],
        buf: &mut EncodeBuffer<'_>,
        detached_out: Option<&mut [u8]>,
        scratch: &mut [u8],
    ) -> Result<usize> {
        let r = self.finish_inner(external_aad, plaintext, buf, detached_out, scratch);
        match r {
            Ok(n) => {
                self.state = EncState::Done;
                Ok(n)
            }
            Err(e) => {
                self.state = EncState::Failed;
                Err(e)
            }
        }
    }

    fn finish_inner(
        &mut self,
        external_aad: &[u8],
        plaintext: &[u8],
        buf: &mut EncodeBuffer<'_>,
        detached_out: Option<&mut [u8]>,
        scratch: &mut [u8],
    ) -> Result<usize> {
        if !matches!(self.state, EncState::Started) {
            return Err(CoseError::InvalidState);
        }
        let mtype = self.options.message_type();
        let context = if mtype == MessageType::Encrypt0 {
            SigContext::Encrypt0
        } else {
            SigContext::Encrypt
        };
        let key_len = self.ce_alg.key_length()?;
        let tag_len = self.ce_alg.tag_size()?;
        let ct_len = plaintext.len() + tag_len;

        // Materialise the Enc_structure; the AEAD needs it contiguous.
        let mut aad_buf = EncodeBuffer::new(&mut scratch[..]);
        let structure = SigStructure {
            body_protected: buf.written(self.protected_span),
            sign_protected: &[],
            external_aad,
            payload: &[],
        };
        structure
            .write(context, &mut aad_buf)
            .map_err(|_| CoseError::BufferTooSmall)?;
        let aad_len = aad_buf.len();
        drop(aad_buf);

        let cek: KeyHandle<'_> = if self.cek_generated {
            KeyHandle::Bytes(&self.generated_cek[..key_len])
        } else {
            self.cek
        };

        if self.options.is_detached() {
            buf.null()?;
            if !buf.is_size_only() {
                let out = detached_out.ok_or(CoseError::BufferTooSmall)?;
                if out.len() < ct_len {
                    return Err(CoseError::BufferTooSmall);
                }
                out[..plaintext.len()].copy_from_slice(plaintext);
                let n = self.adapter.aead_seal(
                    self.ce_alg,
                    &cek,
                    &self.iv[..self.iv_len],
                    &scratch[..aad_len],
                    &mut out[..ct_len],
                    plaintext.len(),
                )?;
                if n != ct_len {
                    return Err(CoseError::CryptoFailed);
                }
            }
        } else {
            let span = buf.bstr_pad(ct_len)?;
            if !buf.is_size_only() {
                let region = buf.written_mut(span);
                region[..plaintext.len()].copy_from_slice(plaintext);
                let n = self.adapter.aead_seal(
                    self.ce_alg,
                    &cek,
                    &self.iv[..self.iv_len],
                    &scratch[..aad_len],
                    region,
                    plaintext.len(),
                )?;
                if n != ct_len {
                    return Err(CoseError::CryptoFailed);
                }
            }
        }

        if mtype == MessageType::Encrypt {
            let cek_bytes: &[u8] = if self.cek_generated {
                &self.generated_cek[..key_len]
            } else {
                self.cek.bytes()?
            };
            buf.array(self.n_recipients)?;
            for slot in self.recipients[..self.n_recipients].iter_mut() {
                let r = slot.as_mut().ok_or(CoseError::InvalidState)?;
                r.build(cek_bytes, self.ce_alg, buf)?;
            }
        }

        Ok(ct_len)
    }
}

/***************************************************************************************************
 * Decrypt
 **************************************************************************************************/

/// Result of decoding a COSE_Encrypt0 or COSE_Encrypt message.
#[derive(Debug, Copy, Clone)]
pub struct DecodedEncrypt {
    /// The resolved message type.
    pub message_type: MessageType,
    /// Head of the combined parameter list (body first, then recipients in array order) in the
    /// caller's pool.
    pub params: u16,
    /// Extra enclosing tags found in front of the message.
    pub tags: CapturedTags,
    /// Number of recipient structures carried.
    pub n_recipients: usize,
}

/// Decode context for COSE_Encrypt0 and COSE_Encrypt.
pub struct EncryptDecode<'s, 'k, A: CryptoAdapter> {
    options: Options,
    adapter: &'k A,
    cek: KeyHandle<'k>,
    context_iv: Option<&'k [u8]>,
    recipients: [Option<&'s dyn RecipientDecoder>; MAX_RECIPIENTS],
    n_recipients: usize,
}

impl<'s, 'k, A: CryptoAdapter> EncryptDecode<'s, 'k, A> {
    /// New decrypt context.
    pub fn new(options: Options, adapter: &'k A) -> Result<Self> {
        options.validate()?;
        match options.message_type() {
            MessageType::Encrypt0 | MessageType::Encrypt | MessageType::Unspecified => {}
            _ => return Err(CoseError::InvalidState),
        }
        Ok(EncryptDecode {
            options,
            adapter,
            cek: KeyHandle::None,
            context_iv: None,
            recipients: Default::default(),
            n_recipients: 0,
        })
    }

    /// Provide the CEK directly (Encrypt0, or a known key for Encrypt).
    pub fn set_cek(&mut self, cek: KeyHandle<'k>) {
        self.cek = cek;
    }

    /// Context IV for messages carrying a partial IV.
    pub fn set_context_iv(&mut self, iv: &'k [u8]) {
        self.context_iv = Some(iv);
    }

    /// Register a recipient decoder. Tried in registration order against each COSE_Recipient.
    pub fn add_recipient(&mut self, r: &'s dyn RecipientDecoder) -> Result<()> {
        if self.n_recipients >= MAX_RECIPIENTS {
            return Err(CoseError::InvalidState);
        }
        self.recipients[self.n_recipients] = Some(r);
        self.n_recipients += 1;
        Ok(())
    }

    /// Decode `input`, acquire the CEK and decrypt into `plaintext_out`. Returns the decode
    /// result and the plaintext length (zero in decode-only mode).
    pub fn decode<'buf>(
        &self,
        input: &'buf [u8],
        detached_ciphertext: Option<&[u8]>,
        external_aad: &[u8],
        pool: &mut ParamPool<'buf>,
        mut special: Option<&mut dyn SpecialDecode>,
        plaintext_out: &mut [u8],
    ) -> Result<(DecodedEncrypt, usize)> {
        let mut dec = DecodeBuffer::new(input);
        let (mtype, tags) = resolve_message_type(
            &mut dec,
            self.options,
            &[MessageType::Encrypt0, MessageType::Encrypt],
        )?;

        let expect = if mtype == MessageType::Encrypt0 { 3 } else { 4 };
        if dec.array()? != expect {
            return Err(CoseError::WrongArrayLength);
        }

        let body = decode_headers(
            &mut dec,
            Location::BODY,
            pool,
            match &mut special {
                Some(cb) => Some(&mut **cb),
                None => None,
            },
        )?;

        let ciphertext: Option<&[u8]> = if self.options.is_detached() {
            dec.null()?;
            None
        } else {
            Some(dec.bstr()?)
        };

        let decode_only = self.options.is_decode_only();
        if mtype == MessageType::Encrypt0 && self.cek.is_none() && !decode_only {
            return Err(CoseError::WrongKeyType);
        }

        // CEK acquisition
        let mut cek_buf = [0u8; MAX_CEK_SIZE];
        let mut cek_len = 0usize;
        let mut cek_found = !self.cek.is_none();
        let ce_alg = pool.list(body.head).alg();
        let mut n_recipient_structs = 0usize;

        if mtype == MessageType::Encrypt {
            let n = dec.array()?;
            n_recipient_structs = n;
            let mut last_soft = CoseError::NoMorePlugins;
            for i in 0..n {
                let location = Location::new(1, i as u8);
                if cek_found || decode_only {
                    skip_recipient(&mut dec, location, pool)?;
                    continue;
                }
                let cursor = dec.mark();
                let pool_mark = pool.len();
                let mut accepted = false;
                for r in self.recipients[..self.n_recipients].iter().flatten() {
                    match r.unwrap_cek(location, ce_alg, &mut dec, pool, &mut cek_buf) {
                        Ok(len) => {
                            cek_len = len;
                            cek_found = true;
                            accepted = true;
                            break;
                        }
                        Err(e) if e.is_soft() => {
                            dec.reset(cursor);
                            pool.truncate(pool_mark);
                            last_soft = e;
                        }
                        Err(e) => return Err(e),
                    }
                }
                if !accepted {
                    dec.reset(cursor);
                    pool.truncate(pool_mark);
                    skip_recipient(&mut dec, location, pool)?;
                }
            }
            if !cek_found && !decode_only {
                return Err(last_soft);
            }
        }

        if !dec.at_end() {
            return Err(CoseError::MalformedEncoding);
        }

        let mut pt_len = 0usize;
        if !decode_only {
            if ce_alg.is_none() {
                return Err(CoseError::MissingAlgorithm);
            }
            if !ce_alg.is_aead() {
                return Err(CoseError::UnsupportedAlgorithm(ce_alg.0));
            }
            let nonce_len = ce_alg.nonce_size()?;

            // Nonce: iv header, or partial_iv against the context IV
            let list = pool.list(body.head);
            let mut nonce = [0u8; MAX_NONCE_SIZE];
            let nonce: &[u8] = if let Some(iv) = list.iv() {
                if iv.len() != nonce_len {
                    return Err(CoseError::MalformedEncoding);
                }
                iv
            } else if let Some(partial) = list.partial_iv() {
                let context_iv = self.context_iv.ok_or(CoseError::InvalidState)?;
                if context_iv.len() != nonce_len {
                    return Err(CoseError::BufferTooSmall);
                }
                let n = nonce_from_partial_iv(context_iv, partial, &mut nonce)?;
                &nonce[..n]
            } else {
                return Err(CoseError::MalformedEncoding);
            };

            let cek: KeyHandle<'_> = if !self.cek.is_none() {
                self.cek
            } else {
                if cek_len != ce_alg.key_length()? {
                    return Err(CoseError::KeyUnwrapFailed);
                }
                KeyHandle::Bytes(&cek_buf[..cek_len])
            };

            let ct: &[u8] = match (ciphertext, detached_ciphertext) {
                (Some(c), _) => c,
                (None, Some(c)) => c,
                (None, None) => return Err(CoseError::InvalidState),
            };
            if ct.len() < ce_alg.tag_size()? {
                return Err(CoseError::MalformedEncoding);
            }
            if plaintext_out.len() < ct.len() {
                return Err(CoseError::BufferTooSmall);
            }

            // Materialise the Enc_structure
            let mut scratch = [0u8; ENC_STRUCT_DEFAULT_SIZE];
            let mut aad_buf = EncodeBuffer::new(&mut scratch);
            let structure = SigStructure {
                body_protected: body.protected,
                sign_protected: &[],
                external_aad,
                payload: &[],
            };
            let context = if mtype == MessageType::Encrypt0 {
                SigContext::Encrypt0
            } else {
                SigContext::Encrypt
            };
            structure
                .write(context, &mut aad_buf)
                .map_err(|_| CoseError::BufferTooSmall)?;
            let aad_len = aad_buf.len();
            drop(aad_buf);

            plaintext_out[..ct.len()].copy_from_slice(ct);
            pt_len = self
                .adapter
                .aead_open(
                    ce_alg,
                    &cek,
                    nonce,
                    &scratch[..aad_len],
                    &mut plaintext_out[..ct.len()],
                    ct.len(),
                )
                .map_err(|_| CoseError::AuthenticationFailed)?;
        }

        let params = pool.chain_in_order();
        Ok((
            DecodedEncrypt {
                message_type: mtype,
                params,
                tags,
                n_recipients: n_recipient_structs,
            },
            pt_len,
        ))
    }
}
