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
 * COSE protocol constants
 *
 * Tag numbers, header parameter labels, COSE_Key labels and implementation limits used
 * throughout tps_minicose.
 **************************************************************************************************/

// CBOR Major Type bit patterns (RFC 8949)
pub(crate) const MT_UINT: u8 = 0b000_00000;
pub(crate) const MT_NINT: u8 = 0b001_00000;
pub(crate) const MT_BSTR: u8 = 0b010_00000;
pub(crate) const MT_TSTR: u8 = 0b011_00000;
pub(crate) const MT_ARRAY: u8 = 0b100_00000;
pub(crate) const MT_MAP: u8 = 0b101_00000;
pub(crate) const MT_TAG: u8 = 0b110_00000;
pub(crate) const MT_SIMPLE: u8 = 0b111_00000;

pub(crate) const MT_MASK: u8 = 0b111_00000;
pub(crate) const AI_MASK: u8 = 0b000_11111;

// Additional Information encodings
pub(crate) const PAYLOAD_AI_BITS: u8 = 23;
pub(crate) const PAYLOAD_ONE_BYTE: u8 = 24;
pub(crate) const PAYLOAD_TWO_BYTES: u8 = 25;
pub(crate) const PAYLOAD_FOUR_BYTES: u8 = 26;
pub(crate) const PAYLOAD_EIGHT_BYTES: u8 = 27;
pub(crate) const PAYLOAD_INDEFINITE: u8 = 31;

// Simple values
pub(crate) const SIMPLE_FALSE: u8 = 20;
pub(crate) const SIMPLE_TRUE: u8 = 21;
pub(crate) const SIMPLE_NULL: u8 = 22;

/// CBOR tag number for a COSE_Encrypt0 message (RFC 9052).
pub const TAG_ENCRYPT0: u64 = 16;
/// CBOR tag number for a COSE_Mac0 message (RFC 9052).
pub const TAG_MAC0: u64 = 17;
/// CBOR tag number for a COSE_Sign1 message (RFC 9052).
pub const TAG_SIGN1: u64 = 18;
/// CBOR tag number for a COSE_Encrypt message (RFC 9052).
pub const TAG_ENCRYPT: u64 = 96;
/// CBOR tag number for a COSE_Mac message (RFC 9052).
pub const TAG_MAC: u64 = 97;
/// CBOR tag number for a COSE_Sign message (RFC 9052).
pub const TAG_SIGN: u64 = 98;

/// Header parameter label: algorithm identifier. Always protected, never critical.
pub const HDR_ALG: i64 = 1;
/// Header parameter label: the critical-parameters list.
pub const HDR_CRIT: i64 = 2;
/// Header parameter label: content type, either uint or tstr valued.
pub const HDR_CONTENT_TYPE: i64 = 3;
/// Header parameter label: key identifier hint.
pub const HDR_KID: i64 = 4;
/// Header parameter label: full initialization vector.
pub const HDR_IV: i64 = 5;
/// Header parameter label: partial initialization vector.
pub const HDR_PARTIAL_IV: i64 = 6;

/// Header parameter label: ephemeral sender key for ECDH-ES (RFC 9053), COSE_Key valued.
pub const HDR_EPHEMERAL_KEY: i64 = -1;
/// Header parameter label: PartyU identity (RFC 9053).
pub const HDR_PARTY_U_IDENTITY: i64 = -21;
/// Header parameter label: PartyU nonce (RFC 9053).
pub const HDR_PARTY_U_NONCE: i64 = -22;
/// Header parameter label: PartyV identity (RFC 9053).
pub const HDR_PARTY_V_IDENTITY: i64 = -24;
/// Header parameter label: PartyV nonce (RFC 9053).
pub const HDR_PARTY_V_NONCE: i64 = -25;
/// Header parameter label: KDF salt (RFC 9053).
pub const HDR_SALT: i64 = -20;
/// Header parameter label: HPKE encapsulated key (draft-ietf-cose-hpke).
pub const HDR_HPKE_ENCAPSULATED_KEY: i64 = -4;

/// COSE_Key label: key type.
pub const KEY_KTY: i64 = 1;
/// COSE_Key label: key identifier.
pub const KEY_KID: i64 = 2;
/// COSE_Key label: elliptic curve identifier.
pub const KEY_CRV: i64 = -1;
/// COSE_Key label: x coordinate (EC2) or public key (OKP).
pub const KEY_X: i64 = -2;
/// COSE_Key label: y coordinate (EC2 only).
pub const KEY_Y: i64 = -3;

/// COSE_Key key type: Octet Key Pair.
pub const KTY_OKP: u64 = 1;
/// COSE_Key key type: double-coordinate elliptic curve.
pub const KTY_EC2: u64 = 2;

// Sig_structure / MAC_structure / Enc_structure context strings (RFC 9052)
pub(crate) const CTX_SIGNATURE1: &str = "Signature1";
pub(crate) const CTX_SIGNATURE: &str = "Signature";
pub(crate) const CTX_MAC0: &str = "MAC0";
pub(crate) const CTX_ENCRYPT0: &str = "Encrypt0";
pub(crate) const CTX_ENCRYPT: &str = "Encrypt";

/// Maximum number of labels accepted in one bucket's `crit` parameter.
pub const MAX_CRITICAL_PARAMS: usize = 4;

/// Maximum number of enclosing tags captured in front of a message before decoding fails.
pub const MAX_MESSAGE_TAGS: usize = 4;

/// Number of header parameter nodes available in a [`crate::params::ParamPool`].
pub const PARAM_POOL_CAPACITY: usize = 24;

/// Maximum number of signers on a COSE_Sign message / verifiers on a decode context.
pub const MAX_SIGNERS: usize = 4;

/// Maximum number of recipients on a COSE_Encrypt message.
pub const MAX_RECIPIENTS: usize = 4;

/// Maximum number of caller-supplied body header parameters on an encode context.
pub const MAX_BODY_PARAMS: usize = 8;

/// Maximum number of header parameters a signer contributes.
pub const MAX_SIGNER_PARAMS: usize = 6;

/// Largest signature any supported algorithm produces (sized for RSA-PSS with 4096-bit keys).
pub const MAX_SIGNATURE_SIZE: usize = 512;

/// Largest digest any supported algorithm produces.
pub const MAX_HASH_SIZE: usize = 64;

/// Largest content encryption key any supported AEAD uses.
pub const MAX_CEK_SIZE: usize = 32;

/// Largest wrapped CEK (RFC 3394 adds one semiblock).
pub const MAX_WRAPPED_CEK_SIZE: usize = MAX_CEK_SIZE + 8;

/// Largest AEAD nonce any supported algorithm uses.
pub const MAX_NONCE_SIZE: usize = 13;

/// Largest SEC1 uncompressed point for a supported curve (P-521).
pub const MAX_EC_POINT_SIZE: usize = 1 + 2 * 66;

/// Largest private scalar for a supported curve (P-521).
pub const MAX_EC_SCALAR_SIZE: usize = 66;

/// Default size of the COSE_KDF_Context serialization buffer. Callers with long party
/// identities can supply a larger buffer on the recipient.
pub const KDF_CONTEXT_DEFAULT_SIZE: usize = 200;

/// Default size of the internal Enc_structure scratch used by the encryption engines.
/// Callers with long external AAD must use the `*_with_scratch` entry points.
pub const ENC_STRUCT_DEFAULT_SIZE: usize = 512;
