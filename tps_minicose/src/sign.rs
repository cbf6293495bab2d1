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
 * Sign/Verify engine
 *
 * The COSE_Sign1 and COSE_Sign message state machines, the signer and verifier capability
 * interfaces they dispatch to, and the concrete signer/verifier implementations built on the
 * crypto adapter: a general one-pass signer (ECDSA, RSA-PSS), a two-pass EdDSA path through the
 * caller's auxiliary buffer, and a restartable signer for hardware-backed keys.
 *
 * Encoding is two-pass friendly: running the same calls against a size-only buffer yields the
 * required output size with no crypto executed.
 **************************************************************************************************/
use crate::algorithm::Algorithm;
use crate::constants::*;
use crate::crypto::{CryptoAdapter, Hasher, RestartableSign, SignStatus};
use crate::decode::DecodeBuffer;
use crate::encode::{EncodeBuffer, Span, WrapContext};
use crate::error::{CoseError, Result};
use crate::keys::KeyHandle;
use crate::options::{MessageType, Options};
use crate::params::{
    decode_headers, encode_headers, Location, Param, ParamList, ParamPool, SpecialDecode,
    SpecialEncode,
};
use crate::sig_structure::{SigContext, SigStructure};
use crate::tagging::{resolve_message_type, CapturedTags};

/// The exact set of inputs a signature covers: both protected buckets, the caller's external
/// AAD and the payload.
#[derive(Debug, Copy, Clone, Default)]
pub struct SignInputs<'a> {
    /// Encoded body protected bucket content.
    pub body_protected: &'a [u8],
    /// Encoded per-signature protected bucket content (empty for Sign1).
    pub sign_protected: &'a [u8],
    /// Caller-supplied external AAD.
    pub external_aad: &'a [u8],
    /// The payload bytes.
    pub payload: &'a [u8],
}

impl<'a> SignInputs<'a> {
    /// The canonical structure over these inputs.
    pub fn structure(&self) -> SigStructure<'a> {
        SigStructure {
            body_protected: self.body_protected,
            sign_protected: self.sign_protected,
            external_aad: self.external_aad,
            payload: self.payload,
        }
    }
}

/// Outcome of one [`Signer::sign`] call.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum SignerStatus {
    /// Signature bytes written; holds their size.
    Done(usize),
    /// A restartable signer needs further `finish` calls.
    Pending,
}

/// Outcome of a `finish` call on an encode context.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum FinishStatus {
    /// The message is complete.
    Complete,
    /// A restartable signer is still working; call `finish` again.
    Pending,
}

/// One signature producer registered on an encode context.
pub trait Signer {
    /// The algorithm this signer will use.
    fn algorithm(&self) -> Algorithm;

    /// The header parameters this signer contributes (at least `alg`).
    fn headers(&self) -> &[Param<'_>];

    /// Size of the signature this signer will produce, for size-only encoding.
    fn signature_size(&self) -> Result<usize>;

    /// Produce a signature over `inputs` into `sig_out`. `aux` is the caller's auxiliary
    /// buffer for algorithms that must materialise the to-be-signed structure.
    fn sign(
        &mut self,
        context: SigContext,
        inputs: &SignInputs<'_>,
        aux: Option<&mut [u8]>,
        sig_out: &mut [u8],
    ) -> Result<SignerStatus>;
}

/// The decoded header parameters visible to one signature: the body bucket pair plus the
/// per-signature bucket pair.
#[derive(Debug, Copy, Clone)]
pub struct HeaderView<'p, 'buf> {
    /// Body bucket parameters.
    pub body: ParamList<'p, 'buf>,
    /// Per-signature parameters (empty view for Sign1).
    pub local: ParamList<'p, 'buf>,
}

impl<'p, 'buf> HeaderView<'p, 'buf> {
    /// The effective algorithm: the per-signature bucket wins over the body bucket.
    pub fn alg(&self) -> Algorithm {
        let local = self.local.alg();
        if local.is_none() {
            self.body.alg()
        } else {
            local
        }
    }

    /// The effective kid, per-signature bucket first.
    pub fn kid(&self) -> Option<&'buf [u8]> {
        self.local.kid().or_else(|| self.body.kid())
    }
}

/// One signature checker registered on a decode context.
///
/// Returning a soft error ([`CoseError::is_soft`]) lets the engine try the next verifier;
/// [`CoseError::SignatureVerify`] stops further attempts on the signature.
pub trait Verifier {
    /// Verify `signature` over `inputs`, consulting the decoded `params` for alg and kid.
    fn verify(
        &self,
        context: SigContext,
        options: Options,
        location: Location,
        inputs: &SignInputs<'_>,
        params: &HeaderView<'_, '_>,
        signature: &[u8],
        aux: Option<&mut [u8]>,
    ) -> Result<()>;
}

/***************************************************************************************************
 * Concrete signers
 **************************************************************************************************/

/// General signer: one-pass digest-then-sign algorithms (ECDSA, RSA-PSS) and two-pass EdDSA
/// through the auxiliary buffer.
pub struct CoseSigner<'k, A: CryptoAdapter> {
    adapter: &'k A,
    alg: Algorithm,
    key: KeyHandle<'k>,
    headers: [Param<'k>; MAX_SIGNER_PARAMS],
    n_headers: usize,
}

impl<'k, A: CryptoAdapter> CoseSigner<'k, A> {
    /// Construct a signer for a signature algorithm.
    pub fn new(adapter: &'k A, alg: Algorithm, key: KeyHandle<'k>) -> Result<Self> {
        if !alg.is_signature() {
            return Err(CoseError::UnsupportedAlgorithm(alg.0));
        }
        let mut headers = [Param::EMPTY; MAX_SIGNER_PARAMS];
        headers[0] = Param::alg(alg);
        Ok(CoseSigner {
            adapter,
            alg,
            key,
            headers,
            n_headers: 1,
        })
    }

    /// Add a kid hint to the emitted headers.
    pub fn with_kid(mut self, kid: &'k [u8]) -> Self {
        if self.n_headers < MAX_SIGNER_PARAMS {
            self.headers[self.n_headers] = Param::kid(kid);
            self.n_headers += 1;
        }
        self
    }

    /// Add a caller-supplied header parameter.
    pub fn add_header(&mut self, p: Param<'k>) -> Result<()> {
        if self.n_headers < MAX_SIGNER_PARAMS {
            self.headers[self.n_headers] = p;
            self.n_headers += 1;
            Ok(())
        } else {
            Err(CoseError::ParamPoolExhausted)
        }
    }
}

/// Hash the canonical structure for `inputs` with the adapter and return the digest length.
fn digest_inputs<A: CryptoAdapter>(
    adapter: &A,
    alg: Algorithm,
    context: SigContext,
    inputs: &SignInputs<'_>,
    out: &mut [u8; MAX_HASH_SIZE],
) -> Result<usize> {
    let mut h = adapter.hash_start(alg)?;
    inputs.structure().feed(context, &mut |b: &[u8]| h.update(b));
    h.finish(&mut out[..])
}

impl<'k, A: CryptoAdapter> Signer for CoseSigner<'k, A> {
    fn algorithm(&self) -> Algorithm {
        self.alg
    }

    fn headers(&self) -> &[Param<'_>] {
        &self.headers[..self.n_headers]
    }

    fn signature_size(&self) -> Result<usize> {
        self.adapter.sig_size(self.alg, &self.key)
    }

    fn sign(
        &mut self,
        context: SigContext,
        inputs: &SignInputs<'_>,
        aux: Option<&mut [u8]>,
        sig_out: &mut [u8],
    ) -> Result<SignerStatus> {
        if self.alg == Algorithm::EDDSA {
            let required = inputs.structure().required_size(context);
            let aux = match aux {
                Some(a) if a.len() >= required => a,
                _ => return Err(CoseError::AuxBufferTooSmall(required)),
            };
            let mut buf = EncodeBuffer::new(&mut aux[..]);
            inputs.structure().write(context, &mut buf)?;
            let tbs_len = buf.len();
            let n = self.adapter.sign_eddsa(&self.key, &aux[..tbs_len], sig_out)?;
            return Ok(SignerStatus::Done(n));
        }

        let mut digest = [0u8; MAX_HASH_SIZE];
        let n = digest_inputs(self.adapter, self.alg, context, inputs, &mut digest)?;
        let sig_len = self.adapter.sign(self.alg, &self.key, &digest[..n], sig_out)?;
        Ok(SignerStatus::Done(sig_len))
    }
}

#[derive(Copy, Clone)]
enum RestartState {
    Idle,
    InProgress {
        digest: [u8; MAX_HASH_SIZE],
        len: usize,
    },
}

/// Restartable signer for hardware-backed keys: `finish` on the encode context returns
/// [`FinishStatus::Pending`] until the adapter reports the signature complete.
pub struct RestartableSigner<'k, A: CryptoAdapter + RestartableSign> {
    adapter: &'k A,
    alg: Algorithm,
    key: KeyHandle<'k>,
    headers: [Param<'k>; MAX_SIGNER_PARAMS],
    n_headers: usize,
    state: RestartState,
}

impl<'k, A: CryptoAdapter + RestartableSign> RestartableSigner<'k, A> {
    /// Construct a restartable signer. EdDSA is not restartable as it cannot sign a digest.
    pub fn new(adapter: &'k A, alg: Algorithm, key: KeyHandle<'k>) -> Result<Self> {
        if !alg.is_signature() || alg == Algorithm::EDDSA {
            return Err(CoseError::UnsupportedAlgorithm(alg.0));
        }
        let mut headers = [Param::EMPTY; MAX_SIGNER_PARAMS];
        headers[0] = Param::alg(alg);
        Ok(RestartableSigner {
            adapter,
            alg,
            key,
            headers,
            n_headers: 1,
            state: RestartState::Idle,
        })
    }

    /// Add a kid hint to the emitted headers.
    pub fn with_kid(mut self, kid: &'k [u8]) -> Self {
        if self.n_headers < MAX_SIGNER_PARAMS {
            self.headers[self.n_headers] = Param::kid(kid);
            self.n_headers += 1;
        }
        self
    }
}

impl<'k, A: CryptoAdapter + RestartableSign> Signer for RestartableSigner<'k, A> {
    fn algorithm(&self) -> Algorithm {
        self.alg
    }

    fn headers(&self) -> &[Param<'_>] {
        &self.headers[..self.n_headers]
    }

    fn signature_size(&self) -> Result<usize> {
        self.adapter.sig_size(self.alg, &self.key)
    }

    fn sign(
        &mut self,
        context: SigContext,
        inputs: &SignInputs<'_>,
        _aux: Option<&mut [u8]>,
        sig_out: &mut [u8],
    ) -> Result<SignerStatus> {
        match self.state {
            RestartState::Idle => {
                let mut digest = [0u8; MAX_HASH_SIZE];
                let len = digest_inputs(self.adapter, self.alg, context, inputs, &mut digest)?;
                match self
                    .adapter
                    .sign_restart(true, self.alg, &self.key, &digest[..len], sig_out)?
                {
                    SignStatus::Done(n) => Ok(SignerStatus::Done(n)),
                    SignStatus::Pending => {
                        self.state = RestartState::InProgress { digest, len };
                        Ok(SignerStatus::Pending)
                    }
                }
            }
            RestartState::InProgress { digest, len } => {
                match self
                    .adapter
                    .sign_restart(false, self.alg, &self.key, &digest[..len], sig_out)?
                {
                    SignStatus::Done(n) => {
                        self.state = RestartState::Idle;
                        Ok(SignerStatus::Done(n))
                    }
                    SignStatus::Pending => Ok(SignerStatus::Pending),
                }
            }
        }
    }
}

/***************************************************************************************************
 * Concrete verifier
 **************************************************************************************************/

/// General verifier over the crypto adapter. Declines signatures whose alg or kid do not match
/// its configuration, so several can be registered side by side.
pub struct CoseVerifier<'k, A: CryptoAdapter> {
    adapter: &'k A,
    key: KeyHandle<'k>,
    kid: Option<&'k [u8]>,
    restrict_alg: Option<Algorithm>,
}

impl<'k, A: CryptoAdapter> CoseVerifier<'k, A> {
    /// Construct a verifier for `key`.
    pub fn new(adapter: &'k A, key: KeyHandle<'k>) -> Self {
        CoseVerifier {
            adapter,
            key,
            kid: None,
            restrict_alg: None,
        }
    }

    /// Only accept signatures whose kid matches.
    pub fn with_kid(mut self, kid: &'k [u8]) -> Self {
        self.kid = Some(kid);
        self
    }

    /// Only accept signatures made with `alg`.
    pub fn for_algorithm(mut self, alg: Algorithm) -> Self {
        self.restrict_alg = Some(alg);
        self
    }
}

impl<'k, A: CryptoAdapter> Verifier for CoseVerifier<'k, A> {
    fn verify(
        &self,
        context: SigContext,
        _options: Options,
        _location: Location,
        inputs: &SignInputs<'_>,
        params: &HeaderView<'_, '_>,
        signature: &[u8],
        aux: Option<&mut [u8]>,
    ) -> Result<()> {
        let alg = params.alg();
        if alg.is_none() {
            return Err(CoseError::MissingAlgorithm);
        }
        if let Some(r) = self.restrict_alg {
            if r != alg {
                return Err(CoseError::Declined);
            }
        }
        if let Some(want) = self.kid {
            match params.kid() {
                Some(got) if got == want => {}
                _ => return Err(CoseError::UnmatchedKid),
            }
        }

        match alg {
            Algorithm::EDDSA => {
                let required = inputs.structure().required_size(context);
                let aux = match aux {
                    Some(a) if a.len() >= required => a,
                    _ => return Err(CoseError::AuxBufferTooSmall(required)),
                };
                let mut buf = EncodeBuffer::new(&mut aux[..]);
                inputs.structure().write(context, &mut buf)?;
                let len = buf.len();
                self.adapter.verify_eddsa(&self.key, &aux[..len], signature)
            }
            Algorithm::ES256
            | Algorithm::ES384
            | Algorithm::ES512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512 => {
                let mut digest = [0u8; MAX_HASH_SIZE];
                let n = digest_inputs(self.adapter, alg, context, inputs, &mut digest)?;
                self.adapter.verify(alg, &self.key, &digest[..n], signature)
            }
            _ => Err(CoseError::UnsupportedAlgorithm(alg.0)),
        }
    }
}

/***************************************************************************************************
 * Encode state machine
 **************************************************************************************************/

#[derive(Copy, Clone)]
enum EncodeState {
    Init,
    Started,
    PayloadOpen(WrapContext),
    Signing { next: usize },
    Done,
    Failed,
}

/// Encode context for COSE_Sign1 and COSE_Sign.
///
/// Lifecycle: construct, `add_signer` (exactly one for Sign1), `start`, then either stream the
/// payload between `payload_begin` and `finish`, or hand the payload (inline or detached) to
/// `finish` directly. `finish` returns [`FinishStatus::Pending`] while a restartable signer is
/// working and must be called again with the same arguments.
pub struct SignEncode<'s> {
    options: Options,
    body_params: [Param<'s>; MAX_BODY_PARAMS],
    n_body: usize,
    signers: [Option<&'s mut dyn Signer>; MAX_SIGNERS],
    n_signers: usize,
    special: Option<&'s dyn SpecialEncode>,
    state: EncodeState,
    protected_span: Span,
    payload_span: Span,
    sig_spans: [Span; MAX_SIGNERS],
    headers_done: usize,
    signatures_opened: bool,
}

impl<'s> SignEncode<'s> {
    /// New encode context. The message type in `options` must be Sign1 or Sign.
    pub fn new(options: Options) -> Result<Self> {
        options.validate()?;
        match options.message_type() {
            MessageType::Sign1 | MessageType::Sign => {}
            _ => return Err(CoseError::InvalidState),
        }
        Ok(SignEncode {
            options,
            body_params: [Param::EMPTY; MAX_BODY_PARAMS],
            n_body: 0,
            signers: Default::default(),
            n_signers: 0,
            special: None,
            state: EncodeState::Init,
            protected_span: Span::default(),
            payload_span: Span::default(),
            sig_spans: [Span::default(); MAX_SIGNERS],
            headers_done: 0,
            signatures_opened: false,
        })
    }

    /// Register a signer. Sign1 takes exactly one.
    pub fn add_signer(&mut self, signer: &'s mut dyn Signer) -> Result<()> {
        if !matches!(self.state, EncodeState::Init) {
            return Err(CoseError::InvalidState);
        }
        let limit = match self.options.message_type() {
            MessageType::Sign1 => 1,
            _ => MAX_SIGNERS,
        };
        if self.n_signers >= limit {
            return Err(CoseError::InvalidState);
        }
        self.signers[self.n_signers] = Some(signer);
        self.n_signers += 1;
        Ok(())
    }

    /// Add a caller-supplied body header parameter.
    pub fn add_header(&mut self, p: Param<'s>) -> Result<()> {
        if !matches!(self.state, EncodeState::Init) {
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

    /// Write the message opening: tag, outer array and body header buckets.
    pub fn start(&mut self, buf: &mut EncodeBuffer<'_>) -> Result<()> {
        let r = self.start_inner(buf);
        if r.is_err() {
            self.state = EncodeState::Failed;
        }
        r
    }

    fn start_inner(&mut self, buf: &mut EncodeBuffer<'_>) -> Result<()> {
        if !matches!(self.state, EncodeState::Init) {
            return Err(CoseError::InvalidState);
        }
        if self.n_signers == 0 {
            return Err(CoseError::InvalidState);
        }
        let mtype = self.options.message_type();
        if mtype == MessageType::Sign1 && self.n_signers != 1 {
            return Err(CoseError::InvalidState);
        }

        if !self.options.is_tag_prohibited() {
            // tag() is always Some for Sign1/Sign
            buf.tag(mtype.tag().unwrap_or(0))?;
        }
        buf.array(4)?;

        // For Sign1 the single signer's headers merge into the body buckets.
        let mut combined = [Param::EMPTY; MAX_SIGNER_PARAMS + MAX_BODY_PARAMS];
        let mut n = 0usize;
        if mtype == MessageType::Sign1 {
            let signer = self.signers[0].as_ref().ok_or(CoseError::InvalidState)?;
            for p in signer.headers() {
                combined[n] = *p;
                n += 1;
            }
        }
        for p in &self.body_params[..self.n_body] {
            combined[n] = *p;
            n += 1;
        }
        self.protected_span = encode_headers(buf, &combined[..n], self.special)?;

        self.state = EncodeState::Started;
        Ok(())
    }

    /// Open the inline payload wrapper for streaming. The caller then writes raw payload bytes
    /// with [`EncodeBuffer::raw`] and calls `finish` with `payload = None`.
    pub fn payload_begin(&mut self, buf: &mut EncodeBuffer<'_>) -> Result<()> {
        if !matches!(self.state, EncodeState::Started) {
            self.state = EncodeState::Failed;
            return Err(CoseError::InvalidState);
        }
        if self.options.is_detached() {
            self.state = EncodeState::Failed;
            return Err(CoseError::InvalidState);
        }
        let wrap = buf.bstr_wrap_start()?;
        self.state = EncodeState::PayloadOpen(wrap);
        Ok(())
    }

    /// Complete the message: close the payload slot and run every signer.
    ///
    /// For an inline one-shot payload pass `Some(payload)`; after streaming pass `None`; for a
    /// detached payload pass `Some(payload)` so it can be covered by the signature (it is not
    /// written to the message). The same arguments must be passed again while a restartable
    /// signer reports [`FinishStatus::Pending`].
    pub fn finish(
        &mut self,
        external_aad: &[u8],
        payload: Option<&[u8]>,
        aux: Option<&mut [u8]>,
        buf: &mut EncodeBuffer<'_>,
    ) -> Result<FinishStatus> {
        match self.finish_inner(external_aad, payload, aux, buf) {
            Ok(s) => Ok(s),
            Err(e) => {
                self.state = EncodeState::Failed;
                Err(e)
            }
        }
    }

    fn finish_inner(
        &mut self,
        external_aad: &[u8],
        payload: Option<&[u8]>,
        mut aux: Option<&mut [u8]>,
        buf: &mut EncodeBuffer<'_>,
    ) -> Result<FinishStatus> {
        let mtype = self.options.message_type();
        let context = match mtype {
            MessageType::Sign1 => SigContext::Signature1,
            _ => SigContext::Signature,
        };

        // Close the payload slot on the first finish call.
        let start_index = match self.state {
            EncodeState::Started => {
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
                0
            }
            EncodeState::PayloadOpen(wrap) => {
                if self.options.is_detached() {
                    return Err(CoseError::InvalidState);
                }
                self.payload_span = buf.bstr_wrap_finalize(wrap)?;
                0
            }
            EncodeState::Signing { next } => next,
            _ => return Err(CoseError::InvalidState),
        };

        if mtype == MessageType::Sign && !self.signatures_opened {
            buf.array(self.n_signers)?;
            self.signatures_opened = true;
        }
        self.state = EncodeState::Signing { next: start_index };

        for i in start_index..self.n_signers {
            if mtype == MessageType::Sign && self.headers_done <= i {
                buf.array(3)?;
                let mut local = [Param::EMPTY; MAX_SIGNER_PARAMS];
                let mut n = 0usize;
                {
                    let signer = self.signers[i].as_ref().ok_or(CoseError::InvalidState)?;
                    for p in signer.headers() {
                        local[n] = *p;
                        n += 1;
                    }
                }
                self.sig_spans[i] = encode_headers(buf, &local[..n], self.special)?;
                self.headers_done = i + 1;
            }

            if buf.is_size_only() {
                let sig_len = {
                    let signer = self.signers[i].as_ref().ok_or(CoseError::InvalidState)?;
                    signer.signature_size()?
                };
                buf.bstr_pad(sig_len)?;
                continue;
            }

            let mut sig_buf = [0u8; MAX_SIGNATURE_SIZE];
            let status = {
                let payload_bytes: &[u8] = match payload {
                    Some(p) => p,
                    None => buf.written(self.payload_span),
                };
                let inputs = SignInputs {
                    body_protected: buf.written(self.protected_span),
                    sign_protected: if mtype == MessageType::Sign {
                        buf.written(self.sig_spans[i])
                    } else {
                        &[]
                    },
                    external_aad,
                    payload: payload_bytes,
                };
                let signer = self.signers[i].as_mut().ok_or(CoseError::InvalidState)?;
                signer.sign(context, &inputs, aux.as_deref_mut(), &mut sig_buf)?
            };
            match status {
                SignerStatus::Done(n) => {
                    buf.bstr(&sig_buf[..n])?;
                }
                SignerStatus::Pending => {
                    self.state = EncodeState::Signing { next: i };
                    return Ok(FinishStatus::Pending);
                }
            }
        }

        self.state = EncodeState::Done;
        Ok(FinishStatus::Complete)
    }
}

/***************************************************************************************************
 * Decode state machine
 **************************************************************************************************/

/// Result of decoding a COSE_Sign1 or COSE_Sign message.
#[derive(Debug, Copy, Clone)]
pub struct DecodedSign<'buf> {
    /// The resolved message type.
    pub message_type: MessageType,
    /// The inline payload, or `None` when detached.
    pub payload: Option<&'buf [u8]>,
    /// Head of the combined parameter list (body first, then per-signature buckets in array
    /// order) in the caller's pool.
    pub params: u16,
    /// Extra enclosing tags found in front of the message.
    pub tags: CapturedTags,
    /// Number of signatures carried (1 for Sign1).
    pub n_signatures: usize,
}

/// Decode context for COSE_Sign1 and COSE_Sign.
pub struct SignDecode<'s> {
    options: Options,
    verifiers: [Option<&'s dyn Verifier>; MAX_SIGNERS],
    n_verifiers: usize,
}

impl<'s> SignDecode<'s> {
    /// New decode context. The message type may be left unspecified to follow the leading tag.
    pub fn new(options: Options) -> Result<Self> {
        options.validate()?;
        match options.message_type() {
            MessageType::Sign1 | MessageType::Sign | MessageType::Unspecified => {}
            _ => return Err(CoseError::InvalidState),
        }
        Ok(SignDecode {
            options,
            verifiers: Default::default(),
            n_verifiers: 0,
        })
    }

    /// Register a verifier. Verifiers are tried in registration order.
    pub fn add_verifier(&mut self, v: &'s dyn Verifier) -> Result<()> {
        if self.n_verifiers >= MAX_SIGNERS {
            return Err(CoseError::InvalidState);
        }
        self.verifiers[self.n_verifiers] = Some(v);
        self.n_verifiers += 1;
        Ok(())
    }

    /// Decode `input` and verify its signature(s).
    ///
    /// Decoded slices borrow from `input`; parameter nodes are allocated from `pool`. For a
    /// detached payload, pass the payload bytes so the signature can cover them.
    pub fn decode<'buf>(
        &self,
        input: &'buf [u8],
        detached_payload: Option<&[u8]>,
        external_aad: &[u8],
        mut aux: Option<&mut [u8]>,
        pool: &mut ParamPool<'buf>,
        mut special: Option<&mut dyn SpecialDecode>,
    ) -> Result<DecodedSign<'buf>> {
        let mut dec = DecodeBuffer::new(input);
        let (mtype, tags) = resolve_message_type(
            &mut dec,
            self.options,
            &[MessageType::Sign1, MessageType::Sign],
        )?;

        if dec.array()? != 4 {
            return Err(CoseError::WrongArrayLength);
        }

        let body = decode_headers(
            &mut dec,
            Location::BODY,
            pool,
            reborrow_special(&mut special),
        )?;

        let payload = if self.options.is_detached() {
            dec.null()?;
            None
        } else {
            Some(dec.bstr()?)
        };
        let tbs_payload: &[u8] = match (payload, detached_payload) {
            (Some(p), _) => p,
            (None, Some(p)) => p,
            (None, None) => {
                if self.options.is_decode_only() {
                    &[]
                } else {
                    return Err(CoseError::InvalidState);
                }
            }
        };

        let decode_only = self.options.is_decode_only();
        let mut n_signatures = 0usize;

        match mtype {
            MessageType::Sign1 => {
                let signature = dec.bstr()?;
                n_signatures = 1;
                if !decode_only {
                    let inputs = SignInputs {
                        body_protected: body.protected,
                        sign_protected: &[],
                        external_aad,
                        payload: tbs_payload,
                    };
                    let view = HeaderView {
                        body: pool.list(body.head),
                        local: ParamList::empty(pool),
                    };
                    self.run_verifiers(
                        SigContext::Signature1,
                        Location::BODY,
                        &inputs,
                        &view,
                        signature,
                        &mut aux,
                    )?;
                }
            }
            MessageType::Sign => {
                let n_sigs = dec.array()?;
                n_signatures = n_sigs;
                if n_sigs == 0 && !decode_only {
                    return Err(CoseError::NoMorePlugins);
                }
                let mut any_ok = false;
                let mut last_soft = CoseError::NoMorePlugins;
                for i in 0..n_sigs {
                    if dec.array()? != 3 {
                        return Err(CoseError::WrongArrayLength);
                    }
                    let location = Location::new(1, i as u8);
                    let sig_hdrs = decode_headers(
                        &mut dec,
                        location,
                        pool,
                        reborrow_special(&mut special),
                    )?;
                    let signature = dec.bstr()?;

                    if decode_only || (any_ok && !self.options.is_verify_all()) {
                        continue;
                    }

                    let inputs = SignInputs {
                        body_protected: body.protected,
                        sign_protected: sig_hdrs.protected,
                        external_aad,
                        payload: tbs_payload,
                    };
                    let view = HeaderView {
                        body: pool.list(body.head),
                        local: pool.list(sig_hdrs.head),
                    };
                    match self.run_verifiers(
                        SigContext::Signature,
                        location,
                        &inputs,
                        &view,
                        signature,
                        &mut aux,
                    ) {
                        Ok(()) => any_ok = true,
                        Err(e) if e.is_soft() => {
                            if self.options.is_verify_all() {
                                return Err(e);
                            }
                            last_soft = e;
                        }
                        Err(e) => {
                            // Signature bytes mismatched. Fatal when all must verify;
                            // otherwise another signature may still satisfy the message.
                            if self.options.is_verify_all() || e != CoseError::SignatureVerify {
                                return Err(e);
                            }
                            last_soft = e;
                        }
                    }
                }
                if !decode_only && !any_ok {
                    return Err(last_soft);
                }
            }
            _ => return Err(CoseError::WrongMessageType(mtype.tag().unwrap_or(0))),
        }

        if !dec.at_end() {
            return Err(CoseError::MalformedEncoding);
        }

        let params = pool.chain_in_order();
        Ok(DecodedSign {
            message_type: mtype,
            payload,
            params,
            tags,
            n_signatures,
        })
    }

    /// Try each registered verifier in turn. Soft errors advance iteration; a signature
    /// mismatch stops attempts on this signature.
    fn run_verifiers(
        &self,
        context: SigContext,
        location: Location,
        inputs: &SignInputs<'_>,
        view: &HeaderView<'_, '_>,
        signature: &[u8],
        aux: &mut Option<&mut [u8]>,
    ) -> Result<()> {
        let mut last_soft = CoseError::NoMorePlugins;
        for v in self.verifiers[..self.n_verifiers].iter().flatten() {
            match v.verify(
                context,
                self.options,
                location,
                inputs,
                view,
                signature,
                aux.as_deref_mut(),
            ) {
                Ok(()) => return Ok(()),
                Err(e) if e.is_soft() => last_soft = e,
                Err(e) => return Err(e),
            }
        }
        Err(last_soft)
    }
}

fn reborrow_special<'x>(
    s: &'x mut Option<&mut dyn SpecialDecode>,
) -> Option<&'x mut dyn SpecialDecode> {
    match s {
        Some(cb) => Some(&mut **cb),
        None => None,
    }
}
