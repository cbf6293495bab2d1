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
 * MAC engine
 *
 * The COSE_Mac0 message state machine. Structurally the mirror of Sign1, but the finalising
 * primitive is an HMAC over the MAC_structure and the key lives directly on the context rather
 * than behind a plugin chain.
 **************************************************************************************************/
use crate::constants::*;
use crate::crypto::{tags_match, CryptoAdapter, Hasher};
use crate::decode::DecodeBuffer;
use crate::encode::{EncodeBuffer, Span, WrapContext};
use crate::error::{CoseError, Result};
use crate::keys::KeyHandle;
use crate::options::{MessageType, Options};
use crate::params::{
    decode_headers, encode_headers, Location, Param, ParamPool, SpecialDecode, SpecialEncode,
};
use crate::sig_structure::{SigContext, SigStructure};
use crate::tagging::{resolve_message_type, CapturedTags};
use crate::algorithm::Algorithm;

#[derive(Copy, Clone)]
enum MacState {
    Init,
    Started,
    PayloadOpen(WrapContext),
    Done,
    Failed,
}

/// Encode context for COSE_Mac0.
pub struct Mac0Encode<'s, 'k, A: CryptoAdapter> {
    options: Options,
    adapter: &'k A,
    alg: Algorithm,
    key: KeyHandle<'k>,
    body_params: [Param<'s>; MAX_BODY_PARAMS],
    n_body: usize,
    special: Option<&'s dyn SpecialEncode>,
    state: MacState,
    protected_span: Span,
    payload_span: Span,
}

impl<'s, 'k, A: CryptoAdapter> Mac0Encode<'s, 'k, A> {
    /// New Mac0 encode context over a MAC algorithm and key.
    pub fn new(
        options: Options,
        adapter: &'k A,
        alg: Algorithm,
        key: KeyHandle<'k>,
    ) -> Result<Self> {
        options.validate()?;
        if options.message_type() != MessageType::Mac0 {
            return Err(CoseError::InvalidState);
        }
        if !alg.is_mac() {
            return Err(CoseError::UnsupportedAlgorithm(alg.0));
        }
        Ok(Mac0Encode {
            options,
            adapter,
            alg,
            key,
            body_params: [Param::EMPTY; MAX_BODY_PARAMS],
            n_body: 0,
            special: None,
            state: MacState::Init,
            protected_span: Span::default(),
            payload_span: Span::default(),
        })
    }

    /// Add a caller-supplied body header parameter.
    pub fn add_header(&mut self, p: Param<'s>) -> Result<()> {
        if !matches!(self.state, MacState::Init) {
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

    /// Write the message opening: tag, outer array and header buckets.
    pub fn start(&mut self, buf: &mut EncodeBuffer<'_>) -> Result<()> {
        if !matches!(self.state, MacState::Init) {
            self.state = MacState::Failed;
            return Err(CoseError::InvalidState);
        }
        if !self.options.is_tag_prohibited() {
            buf.tag(TAG_MAC0)?;
        }
        buf.array(4)?;

        let mut combined = [Param::EMPTY; MAX_BODY_PARAMS + 1];
        combined[0] = Param::alg(self.alg);
        let mut n = 1usize;
        for p in &self.body_params[..self.n_body] {
            combined[n] = *p;
            n += 1;
        }
        match encode_headers(buf, &combined[..n], self.special) {
            Ok(span) => {
                self.protected_span = span;
                self.state = MacState::Started;
                Ok(())
            }
            Err(e) => {
                self.state = MacState::Failed;
                Err(e)
            }
        }
    }

    /// Open the inline payload wrapper for streaming.
    pub fn payload_begin(&mut self, buf: &mut EncodeBuffer<'_>) -> Result<()> {
        if !matches!(self.state, MacState::Started) || self.options.is_detached() {
            self.state = MacState::Failed;
            return Err(CoseError::InvalidState);
        }
        let wrap = buf.bstr_wrap_start()?;
        self.state = MacState::PayloadOpen(wrap);
        Ok(())
    }

    /// Complete the message: close the payload slot and write the authentication tag.
    pub fn finish(
        &mut self,
        external_aad: &[u8],
        payload: Option<&[u8]>,
        buf: &mut EncodeBuffer<'_>,
    ) -> Result<()> {
        match self.finish_inner(external_aad, payload, buf) {
            Ok(()) => {
                self.state = MacState::Done;
                Ok(())
            }
            Err(e) => {
                self.state = MacState::Failed;
                Err(e)
            }
        }
    }

    fn finish_inner(
        &mut self,
        external_aad: &[u8],
        payload: Option<&[u8]>,
        buf: &mut EncodeBuffer<'_>,
    ) -> Result<()> {
        match self.state {
            MacState::Started => {
                if self.options.is_detached() {
                    if payload.is_none() {
                        return Err(CoseError::InvalidState);
                    }
                    buf.null()?;
                    self.payload_span = Span::default();
                } else {
                    let p = payload.ok_or(CoseError::InvalidState)?;
                    buf.bstr(p)?;
                    self.payload_span = Span {
                        start: buf.len() - p.len(),
                        len: p.len(),
                    };
                }
            }
            MacState::PayloadOpen(wrap) => {
                if self.options.is_detached() {
                    return Err(CoseError::InvalidState);
                }
                self.payload_span = buf.bstr_wrap_finalize(wrap)?;
            }
            _ => return Err(CoseError::InvalidState),
        }

        if buf.is_size_only() {
            buf.bstr_pad(self.alg.hash_size()?)?;
            return Ok(());
        }

        let mut tag = [0u8; MAX_HASH_SIZE];
        let tag_len = {
            let payload_bytes: &[u8] = match payload {
                Some(p) => p,
                None => buf.written(self.payload_span),
            };
            let structure = SigStructure {
                body_protected: buf.written(self.protected_span),
                sign_protected: &[],
                external_aad,
                payload: payload_bytes,
            };
            let mut h = self.adapter.hmac_start(self.alg, &self.key)?;
            structure.feed(SigContext::Mac0, &mut |b: &[u8]| h.update(b));
            h.finish(&mut tag)?
        };
        buf.bstr(&tag[..tag_len])
    }
}

/// Result of decoding a COSE_Mac0 message.
#[derive(Debug, Copy, Clone)]
pub struct DecodedMac<'buf> {
    /// The inline payload, or `None` when detached.
    pub payload: Option<&'buf [u8]>,
    /// Head of the decoded parameter list in the caller's pool.
    pub params: u16,
    /// Extra enclosing tags found in front of the message.
    pub tags: CapturedTags,
}

/// Decode context for COSE_Mac0.
pub struct Mac0Decode<'k, A: CryptoAdapter> {
    options: Options,
    adapter: &'k A,
    key: KeyHandle<'k>,
}

impl<'k, A: CryptoAdapter> Mac0Decode<'k, A> {
    /// New Mac0 decode context. The tag is recomputed under `key`.
    pub fn new(options: Options, adapter: &'k A, key: KeyHandle<'k>) -> Result<Self> {
        options.validate()?;
        match options.message_type() {
            MessageType::Mac0 | MessageType::Unspecified => {}
            _ => return Err(CoseError::InvalidState),
        }
        Ok(Mac0Decode {
            options,
            adapter,
            key,
        })
    }

    /// Decode `input` and verify its authentication tag.
    pub fn decode<'buf>(
        &self,
        input: &'buf [u8],
        detached_payload: Option<&[u8]>,
        external_aad: &[u8],
        pool: &mut ParamPool<'buf>,
        special: Option<&mut dyn SpecialDecode>,
    ) -> Result<DecodedMac<'buf>> {
        let mut dec = DecodeBuffer::new(input);
        let (_, tags) = resolve_message_type(&mut dec, self.options, &[MessageType::Mac0])?;

        if dec.array()? != 4 {
            return Err(CoseError::WrongArrayLength);
        }
        let body = decode_headers(&mut dec, Location::BODY, pool, special)?;

        let payload = if self.options.is_detached() {
            dec.null()?;
            None
        } else {
            Some(dec.bstr()?)
        };
        let received_tag = dec.bstr()?;
        if !dec.at_end() {
            return Err(CoseError::MalformedEncoding);
        }

        if !self.options.is_decode_only() {
            let alg = pool.list(body.head).alg();
            if alg.is_none() {
                return Err(CoseError::MissingAlgorithm);
            }
            if !alg.is_mac() {
                return Err(CoseError::UnsupportedAlgorithm(alg.0));
            }
            let tbm_payload: &[u8] = match (payload, detached_payload) {
                (Some(p), _) => p,
                (None, Some(p)) => p,
                (None, None) => return Err(CoseError::InvalidState),
            };
            let structure = SigStructure {
                body_protected: body.protected,
                sign_protected: &[],
                external_aad,
                payload: tbm_payload,
            };
            let mut expected = [0u8; MAX_HASH_SIZE];
            let mut h = self.adapter.hmac_start(alg, &self.key)?;
            structure.feed(SigContext::Mac0, &mut |b: &[u8]| h.update(b));
            let n = h.finish(&mut expected)?;
            if !tags_match(&expected[..n], received_tag) {
                return Err(CoseError::SignatureVerify);
            }
        }

        let params = pool.chain_in_order();
        Ok(DecodedMac {
            payload,
            params,
            tags,
        })
    }
}
