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
 * tps_minicose Error API
 *
 * Error taxonomy for COSE message processing. Hard errors abort the current message and leave
 * the context in a failed state; soft errors only advance plugin iteration.
 **************************************************************************************************/
use std::result;

#[cfg(any(feature = "full", test))]
use thiserror::Error;

/// An alias for Result<T, CoseError> used throughout this crate.
pub type Result<T> = result::Result<T, CoseError>;

/// `CoseError` covers every failure the COSE core can report.
///
/// The soft variants ([`CoseError::Declined`], [`CoseError::UnmatchedKid`],
/// [`CoseError::UnsupportedAlgorithm`], [`CoseError::NoMorePlugins`]) never abort a message on
/// their own; the engines use them to move on to the next registered verifier or recipient and
/// only surface the last one seen if every plugin declined.
#[cfg_attr(any(feature="full", test), derive(Copy, Clone, PartialEq, Error, Debug))]
#[cfg_attr(all(not(feature="full"), not(test)), derive(Copy, Clone, PartialEq, Debug))]
pub enum CoseError {
    // ---- Format ----
    /// CBOR structure is invalid or illegal here.
    #[cfg_attr(any(feature="full", test), error("Malformed CBOR encoding"))]
    MalformedEncoding,
    /// The CBOR type indicated by the `str` was expected here.
    #[cfg_attr(any(feature="full", test), error("Did not match expected CBOR type"))]
    ExpectedType(&'static str),
    /// A COSE message array had the wrong number of elements.
    #[cfg_attr(any(feature="full", test), error("Message array has the wrong number of elements"))]
    WrongArrayLength,
    /// An indefinite-length item was found. These are prohibited in COSE messages.
    #[cfg_attr(any(feature="full", test), error("Indefinite-length items are not accepted"))]
    IndefiniteLength,
    /// A tstr input contains an invalid UTF8 sequence.
    #[cfg_attr(any(feature="full", test), error("A tstr contains an invalid UTF8 sequence"))]
    UTF8Error,
    /// A number conversion has overflowed or underflowed.
    #[cfg_attr(any(feature="full", test), error("Overflow or underflow in number conversion"))]
    OutOfRange,
    /// Input exhausted while an item remained to be read.
    #[cfg_attr(any(feature="full", test), error("Input buffer exhausted mid-item"))]
    EndOfBuffer,

    // ---- Tagging ----
    /// Options demand a leading message tag and none was present.
    #[cfg_attr(any(feature="full", test), error("Leading message tag required but absent"))]
    TagRequired,
    /// Options prohibit a leading message tag and one was present.
    #[cfg_attr(any(feature="full", test), error("Leading message tag prohibited but present"))]
    TagProhibited,
    /// More enclosing tags than the implementation captures.
    #[cfg_attr(any(feature="full", test), error("Too many enclosing tags"))]
    TooManyTags,
    /// The leading tag or the asserted message type does not match the message.
    #[cfg_attr(any(feature="full", test), error("Message type does not match tag or options"))]
    WrongMessageType(u64),

    // ---- Parameter ----
    /// The same label occurs twice in a bucket, or in both buckets.
    #[cfg_attr(any(feature="full", test), error("Duplicate header parameter label"))]
    DuplicateLabel(i64),
    /// `iv` and `partial_iv` cannot coexist in one bucket.
    #[cfg_attr(any(feature="full", test), error("iv and partial_iv are mutually exclusive"))]
    IvPartialIvConflict,
    /// A label listed in `crit` is not understood by this implementation.
    #[cfg_attr(any(feature="full", test), error("Unknown critical header parameter"))]
    UnknownCriticalParameter(i64),
    /// The `crit` parameter was present but empty.
    #[cfg_attr(any(feature="full", test), error("crit parameter must not be empty"))]
    CritListEmpty,
    /// The `crit` parameter held more labels than MAX_CRITICAL_PARAMS.
    #[cfg_attr(any(feature="full", test), error("crit parameter holds too many labels"))]
    CritListOverfull,
    /// A parameter was marked critical but placed in the unprotected bucket.
    #[cfg_attr(any(feature="full", test), error("Critical parameters must be protected"))]
    CriticalNotProtected,
    /// A parameter sits in a bucket its definition does not allow.
    #[cfg_attr(any(feature="full", test), error("Header parameter in the wrong bucket"))]
    WrongBucket(i64),
    /// The decode parameter pool has no free nodes left.
    #[cfg_attr(any(feature="full", test), error("Header parameter pool exhausted"))]
    ParamPoolExhausted,

    // ---- Algorithm ----
    /// The algorithm identifier is not supported here.
    #[cfg_attr(any(feature="full", test), error("Unsupported algorithm identifier"))]
    UnsupportedAlgorithm(i64),
    /// No `alg` parameter was found where one is mandatory.
    #[cfg_attr(any(feature="full", test), error("Missing alg header parameter"))]
    MissingAlgorithm,

    // ---- Key ----
    /// The key handle is of the wrong kind for this operation.
    #[cfg_attr(any(feature="full", test), error("Key handle has the wrong type"))]
    WrongKeyType,
    /// Unwrap of an encrypted CEK failed.
    #[cfg_attr(any(feature="full", test), error("Key unwrap failed"))]
    KeyUnwrapFailed,
    /// The adapter could not import key material.
    #[cfg_attr(any(feature="full", test), error("Key import failed"))]
    KeyImportFailed,

    // ---- Cryptographic ----
    /// Signature or MAC verification failed. The message must be considered forged.
    #[cfg_attr(any(feature="full", test), error("Signature verification failed"))]
    SignatureVerify,
    /// AEAD authentication failed. The message must be considered forged.
    #[cfg_attr(any(feature="full", test), error("AEAD authentication failed"))]
    AuthenticationFailed,
    /// The crypto adapter reported an internal failure.
    #[cfg_attr(any(feature="full", test), error("Crypto adapter failure"))]
    CryptoFailed,

    // ---- Buffer ----
    /// The output buffer cannot hold the encoding.
    #[cfg_attr(any(feature="full", test), error("Output buffer too small"))]
    BufferTooSmall,
    /// The auxiliary buffer cannot hold the to-be-signed structure; holds the required size.
    #[cfg_attr(any(feature="full", test), error("Auxiliary buffer too small"))]
    AuxBufferTooSmall(usize),
    /// The COSE_KDF_Context serialization buffer is too small.
    #[cfg_attr(any(feature="full", test), error("KDF context buffer too small"))]
    KdfContextTooSmall,

    // ---- State ----
    /// An operation was invoked out of order on a message context.
    #[cfg_attr(any(feature="full", test), error("Operation out of order for message state"))]
    InvalidState,

    // ---- Soft declines ----
    /// A verifier or recipient voluntarily skipped this item.
    #[cfg_attr(any(feature="full", test), error("Plugin declined the item"))]
    Declined,
    /// The kid in the message does not match the plugin's key.
    #[cfg_attr(any(feature="full", test), error("kid did not match"))]
    UnmatchedKid,
    /// Every registered plugin was tried without success.
    #[cfg_attr(any(feature="full", test), error("No plugin accepted the item"))]
    NoMorePlugins,
    /// Recipient structures nest deeper than this implementation supports.
    #[cfg_attr(any(feature="full", test), error("Recipient nesting too deep"))]
    NestingTooDeep,
}

impl CoseError {
    /// Return `true` for the soft codes that only advance plugin iteration.
    #[inline]
    pub fn is_soft(&self) -> bool {
        matches!(
            self,
            CoseError::Declined
                | CoseError::UnmatchedKid
                | CoseError::UnsupportedAlgorithm(_)
                | CoseError::NoMorePlugins
        )
    }
}
