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
 * To-be-signed / to-be-MACed / AAD structure builder
 *
 * Produces the canonical Sig_structure (RFC 9052 4.4), MAC_structure (6.3) and Enc_structure
 * (5.3) byte strings. Two output modes: feed the bytes incrementally into a hash sink for
 * one-pass algorithms, or materialise the whole structure into an auxiliary buffer for EdDSA.
 * The payload is never serialized twice: the builder works from the spans the message encoder
 * already wrote, or from the caller's contiguous slice.
 **************************************************************************************************/
use crate::constants::*;
use crate::encode::{head_bytes, EncodeBuffer};
use crate::error::Result;

/// Which canonical structure is being built.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SigContext {
    /// `Signature1` for COSE_Sign1.
    Signature1,
    /// `Signature` for one COSE_Signature of a COSE_Sign.
    Signature,
    /// `MAC0` for COSE_Mac0.
    Mac0,
    /// `Encrypt0` for COSE_Encrypt0 AAD.
    Encrypt0,
    /// `Encrypt` for COSE_Encrypt AAD.
    Encrypt,
}

impl SigContext {
    /// The context text that leads the structure.
    pub fn text(self) -> &'static str {
        match self {
            SigContext::Signature1 => CTX_SIGNATURE1,
            SigContext::Signature => CTX_SIGNATURE,
            SigContext::Mac0 => CTX_MAC0,
            SigContext::Encrypt0 => CTX_ENCRYPT0,
            SigContext::Encrypt => CTX_ENCRYPT,
        }
    }

    /// Only per-signature structures of COSE_Sign carry a second protected bucket.
    pub fn has_sign_protected(self) -> bool {
        self == SigContext::Signature
    }

    /// The Enc_structure has no payload element; the AEAD covers the payload itself.
    pub fn is_enc(self) -> bool {
        matches!(self, SigContext::Encrypt0 | SigContext::Encrypt)
    }

    fn element_count(self) -> usize {
        match self {
            SigContext::Signature => 5,
            SigContext::Encrypt0 | SigContext::Encrypt => 3,
            _ => 4,
        }
    }
}

/// The inputs covered by a signature, MAC or AEAD: the encoded protected bucket(s), the
/// caller's external AAD and the payload. This is the exact byte set hashed.
#[derive(Debug, Copy, Clone, Default)]
pub struct SigStructure<'a> {
    /// Encoded body protected bucket content (zero-length when the bucket is empty).
    pub body_protected: &'a [u8],
    /// Encoded per-signature protected bucket content; only used for `Signature`.
    pub sign_protected: &'a [u8],
    /// Caller-supplied external AAD.
    pub external_aad: &'a [u8],
    /// The payload or plaintext bytes. Ignored for the Enc_structure.
    pub payload: &'a [u8],
}

impl<'a> SigStructure<'a> {
    /// Feed the canonical encoding into `sink` without materialising it. The large slices are
    /// fed directly; only item framing goes through a small scratch header.
    pub fn feed(&self, context: SigContext, sink: &mut impl FnMut(&[u8])) {
        let mut head = [0u8; 9];

        let n = head_bytes(MT_ARRAY, context.element_count() as u64, &mut head);
        sink(&head[..n]);

        let text = context.text();
        let n = head_bytes(MT_TSTR, text.len() as u64, &mut head);
        sink(&head[..n]);
        sink(text.as_bytes());

        let mut bstr = |bytes: &[u8]| {
            let n = head_bytes(MT_BSTR, bytes.len() as u64, &mut head);
            sink(&head[..n]);
            sink(bytes);
        };

        bstr(self.body_protected);
        if context.has_sign_protected() {
            bstr(self.sign_protected);
        }
        bstr(self.external_aad);
        if !context.is_enc() {
            bstr(self.payload);
        }
    }

    /// Materialise the canonical encoding into `buf` (which may be size-only).
    pub fn write(&self, context: SigContext, buf: &mut EncodeBuffer<'_>) -> Result<()> {
        buf.array(context.element_count())?;
        buf.tstr(context.text())?;
        buf.bstr(self.body_protected)?;
        if context.has_sign_protected() {
            buf.bstr(self.sign_protected)?;
        }
        buf.bstr(self.external_aad)?;
        if !context.is_enc() {
            buf.bstr(self.payload)?;
        }
        Ok(())
    }

    /// Size in bytes of the materialised structure.
    pub fn required_size(&self, context: SigContext) -> usize {
        let mut buf = EncodeBuffer::size_only();
        // Writes to a size-only buffer cannot fail.
        let _ = self.write(context, &mut buf);
        buf.len()
    }
}
