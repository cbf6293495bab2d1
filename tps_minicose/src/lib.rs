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
 * tps_minicose module definition
 *
 * A compact, deterministic encoder and decoder for COSE (RFC 9052) messages: Sign1, Sign, Mac0,
 * Encrypt0 and Encrypt, designed for constrained systems. Requires neither the Rust standard
 * library nor an allocator: all processing happens on caller-provided byte buffers.
 **************************************************************************************************/

// Default configuration
#![no_std]
#![warn(missing_docs)]

//! # TPS_MINICOSE
//!
//! The `tps_minicose` crate produces and consumes COSE
//! ([RFC 9052](https://datatracker.ietf.org/doc/rfc9052/)) messages: signed, MAC'd and
//! encrypted CBOR payloads. It provides the message state machines, the header-parameter
//! subsystem with critical-parameter handling, the canonical to-be-signed / to-be-MACed / AAD
//! structures, and a pluggable signer/verifier/recipient dispatch model.
//!
//! Concrete cryptography is out of scope: the crate defines the
//! [`adapter::CryptoAdapter`] contract and everything else is built against it. The companion
//! `tps_cose_crypto` crate implements the contract over the RustCrypto stack and hosts the
//! end-to-end tests.
//!
//! ## Design properties
//!
//! - **Byte-exact**: protected header buckets are captured as encoded, and the RFC 9052
//!   Sig_structure / MAC_structure / Enc_structure layouts are produced to the byte. Decoded
//!   byte and text strings borrow from the input buffer; encoded output borrows from a single
//!   caller-provided output buffer.
//! - **Size calculation**: every encode path can run against a size-only
//!   [`encoder::EncodeBuffer`] which counts bytes, skips crypto and substitutes sizes from the
//!   algorithm tables, so callers can size their buffers exactly.
//! - **Extensible headers**: unknown non-critical parameters are tolerated, unknown critical
//!   parameters are a hard failure, and non-scalar parameters dispatch to caller-registered
//!   callbacks.
//! - **No allocator**: decoded header parameters live in a caller-owned fixed-capacity
//!   [`headers::ParamPool`]; plugin lists are fixed-size arrays.
//!
//! ## Example (Sign1, size-only then real encode)
//!
//! ```ignore
//! let mut signer = CoseSigner::new(&adapter, Algorithm::ES256, KeyHandle::Bytes(&key))?
//!     .with_kid(b"11");
//! let mut ctx = SignEncode::new(Options::new(MessageType::Sign1))?;
//! ctx.add_signer(&mut signer)?;
//!
//! let mut sizing = EncodeBuffer::size_only();
//! ctx.start(&mut sizing)?;
//! ctx.finish(b"", Some(payload), None, &mut sizing)?;
//! // sizing.len() is the exact output size
//! ```

// Pull in std if we are testing or if it is defined as feature (because we run tests on a
// platform supporting I/O and full feature set.
#[cfg(any(feature = "std", test))]
extern crate std;

// If we are really building no_std, pull in core as well. It is aliased as std so that "use"
// statements are always the same
#[cfg(all(not(feature = "std"), not(test)))]
extern crate core as std;

pub(crate) mod algorithm;
pub(crate) mod constants;
pub(crate) mod crypto;
pub(crate) mod decode;
pub(crate) mod encode;
pub(crate) mod encrypt;
pub(crate) mod keys;
pub(crate) mod mac;
pub(crate) mod options;
pub(crate) mod params;
pub(crate) mod recipient;
pub(crate) mod sig_structure;
pub(crate) mod sign;
pub(crate) mod tagging;

/// The `error` module contains error definitions used throughout `tps_minicose`.
pub mod error;

/// The `types` module exports the algorithm identifiers, key handles, option words and header
/// parameter types shared by every engine.
pub mod types {
    pub use super::algorithm::Algorithm;
    pub use super::constants::*;
    pub use super::keys::KeyHandle;
    pub use super::options::{MessageType, Options};
    pub use super::params::{Location, Param, ParamValue, SpecialValue};
    pub use super::tagging::CapturedTags;
}

/// The `encoder` module exports the CBOR output buffer used by every encode path.
pub mod encoder {
    pub use super::encode::{EncodeBuffer, Span, WrapContext};
}

/// The `decoder` module exports the CBOR input cursor used by every decode path.
pub mod decoder {
    pub use super::decode::{DecodeBuffer, ItemKind};
}

/// The `headers` module exports the header-parameter encode/decode subsystem: the storage
/// pool, list views and the special-parameter callbacks.
pub mod headers {
    pub use super::params::{
        decode_headers, encode_headers, DecodedHeaders, ParamIter, ParamList, ParamPool,
        SpecialDecode, SpecialEncode, NO_NEXT,
    };
}

/// The `adapter` module exports the contract the core consumes from external cryptography.
pub mod adapter {
    pub use super::crypto::{CryptoAdapter, EllipticCurve, Hasher, RestartableSign, SignStatus};
}

/// The `signing` module exports the Sign1/Sign engines and their plugin interfaces.
pub mod signing {
    pub use super::sig_structure::{SigContext, SigStructure};
    pub use super::sign::{
        CoseSigner, CoseVerifier, DecodedSign, FinishStatus, HeaderView, RestartableSigner,
        SignDecode, SignEncode, SignInputs, Signer, SignerStatus, Verifier,
    };
}

/// The `mac0` module exports the Mac0 engine.
pub mod mac0 {
    pub use super::mac::{DecodedMac, Mac0Decode, Mac0Encode};
}

/// The `cipher` module exports the Encrypt0/Encrypt engines and the recipient subsystem.
pub mod cipher {
    pub use super::encrypt::{
        nonce_from_partial_iv, DecodedEncrypt, EncryptDecode, EncryptEncode,
    };
    pub use super::recipient::{
        DirectRecipient, EcdhEsRecipient, HpkeRecipient, KeyWrapRecipient, RecipientDecoder,
        RecipientEncoder,
    };
}
