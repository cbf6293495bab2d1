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
 * Key handles
 *
 * The core never inspects key material. A KeyHandle is an opaque cell passed through to the
 * crypto adapter together with an algorithm id; policy enforcement is the adapter's problem.
 * Keys are owned by the caller for the whole lifetime of a message context.
 **************************************************************************************************/
use crate::error::{CoseError, Result};

/// An opaque reference to key material held by the caller or by the crypto adapter.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum KeyHandle<'k> {
    /// No key. Operations needing one fail with `WrongKeyType`.
    None,
    /// Raw key bytes borrowed from the caller. The interpretation (secret scalar, symmetric
    /// key, SEC1 point, ...) is fixed by the algorithm the handle is used with.
    Bytes(&'k [u8]),
    /// An integer handle naming a key the adapter holds (e.g. in a hardware keystore).
    Handle(u64),
}

impl<'k> KeyHandle<'k> {
    /// Return `true` if no key is present.
    #[inline]
    pub fn is_none(&self) -> bool {
        matches!(self, KeyHandle::None)
    }

    /// The raw bytes, when the handle carries any.
    pub fn bytes(&self) -> Result<&'k [u8]> {
        match self {
            KeyHandle::Bytes(b) => Ok(b),
            _ => Err(CoseError::WrongKeyType),
        }
    }

    /// The integer handle, when the handle carries one.
    pub fn handle(&self) -> Result<u64> {
        match self {
            KeyHandle::Handle(h) => Ok(*h),
            _ => Err(CoseError::WrongKeyType),
        }
    }
}

impl<'k> Default for KeyHandle<'k> {
    fn default() -> Self {
        KeyHandle::None
    }
}

impl<'k> From<&'k [u8]> for KeyHandle<'k> {
    #[inline(always)]
    fn from(b: &'k [u8]) -> Self {
        KeyHandle::Bytes(b)
    }
}
