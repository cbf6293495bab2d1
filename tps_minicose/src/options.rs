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
 * Message context options
 *
 * A bit-flag option word configuring message contexts: asserted message type, leading-tag
 * policy, decode-only processing, all-signatures verification and detached content.
 **************************************************************************************************/
use crate::constants::*;
use crate::error::{CoseError, Result};

/// The COSE message shapes this implementation processes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MessageType {
    /// Determine the type from the leading tag while decoding.
    Unspecified,
    /// COSE_Sign1 (tag 18).
    Sign1,
    /// COSE_Sign (tag 98).
    Sign,
    /// COSE_Mac0 (tag 17).
    Mac0,
    /// COSE_Encrypt0 (tag 16).
    Encrypt0,
    /// COSE_Encrypt (tag 96).
    Encrypt,
}

impl MessageType {
    /// The CBOR tag number announcing this message type, if it has one.
    pub fn tag(self) -> Option<u64> {
        match self {
            MessageType::Unspecified => None,
            MessageType::Sign1 => Some(TAG_SIGN1),
            MessageType::Sign => Some(TAG_SIGN),
            MessageType::Mac0 => Some(TAG_MAC0),
            MessageType::Encrypt0 => Some(TAG_ENCRYPT0),
            MessageType::Encrypt => Some(TAG_ENCRYPT),
        }
    }

    /// Map a CBOR tag number back to a message type.
    pub fn from_tag(tag: u64) -> Option<MessageType> {
        match tag {
            TAG_SIGN1 => Some(MessageType::Sign1),
            TAG_SIGN => Some(MessageType::Sign),
            TAG_MAC0 => Some(MessageType::Mac0),
            TAG_ENCRYPT0 => Some(MessageType::Encrypt0),
            TAG_ENCRYPT => Some(MessageType::Encrypt),
            _ => None,
        }
    }

    fn bits(self) -> u32 {
        match self {
            MessageType::Unspecified => 0,
            MessageType::Sign1 => 1,
            MessageType::Sign => 2,
            MessageType::Mac0 => 3,
            MessageType::Encrypt0 => 4,
            MessageType::Encrypt => 5,
        }
    }

    fn from_bits(bits: u32) -> MessageType {
        match bits {
            1 => MessageType::Sign1,
            2 => MessageType::Sign,
            3 => MessageType::Mac0,
            4 => MessageType::Encrypt0,
            5 => MessageType::Encrypt,
            _ => MessageType::Unspecified,
        }
    }
}

// Flag bits above the 3-bit message type field
const OPT_TAG_REQUIRED: u32 = 1 << 3;
const OPT_TAG_PROHIBITED: u32 = 1 << 4;
const OPT_DECODE_ONLY: u32 = 1 << 5;
const OPT_VERIFY_ALL: u32 = 1 << 6;
const OPT_DETACHED: u32 = 1 << 7;

/// Option word for a message context.
#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct Options(u32);

impl Options {
    /// Options with an asserted message type and no flags.
    pub fn new(message_type: MessageType) -> Self {
        Options(message_type.bits())
    }

    /// The asserted message type, or `Unspecified`.
    pub fn message_type(&self) -> MessageType {
        MessageType::from_bits(self.0 & 0b111)
    }

    /// Require the leading message tag when decoding.
    pub fn tag_required(self) -> Self {
        Options(self.0 | OPT_TAG_REQUIRED)
    }

    /// Prohibit the leading message tag; when encoding, do not emit one.
    pub fn tag_prohibited(self) -> Self {
        Options(self.0 | OPT_TAG_PROHIBITED)
    }

    /// Parse everything, run no crypto.
    pub fn decode_only(self) -> Self {
        Options(self.0 | OPT_DECODE_ONLY)
    }

    /// Every signature of a COSE_Sign message must verify, not just one.
    pub fn verify_all_signatures(self) -> Self {
        Options(self.0 | OPT_VERIFY_ALL)
    }

    /// Payload or ciphertext travels outside the message.
    pub fn detached(self) -> Self {
        Options(self.0 | OPT_DETACHED)
    }

    /// Return `true` if the leading tag is required.
    #[inline]
    pub fn is_tag_required(&self) -> bool {
        self.0 & OPT_TAG_REQUIRED != 0
    }

    /// Return `true` if the leading tag is prohibited.
    #[inline]
    pub fn is_tag_prohibited(&self) -> bool {
        self.0 & OPT_TAG_PROHIBITED != 0
    }

    /// Return `true` in decode-only mode.
    #[inline]
    pub fn is_decode_only(&self) -> bool {
        self.0 & OPT_DECODE_ONLY != 0
    }

    /// Return `true` when all signatures must verify.
    #[inline]
    pub fn is_verify_all(&self) -> bool {
        self.0 & OPT_VERIFY_ALL != 0
    }

    /// Return `true` for detached content.
    #[inline]
    pub fn is_detached(&self) -> bool {
        self.0 & OPT_DETACHED != 0
    }

    /// Reject self-contradictory option words.
    pub fn validate(&self) -> Result<()> {
        if self.is_tag_required() && self.is_tag_prohibited() {
            Err(CoseError::InvalidState)
        } else {
            Ok(())
        }
    }
}
