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
 * Leading tag processing
 *
 * Shared by every decode engine: read the chain of enclosing tags in front of a message, apply
 * the tag policy from the option word, resolve the message type, and hand any extra enclosing
 * tags back to the caller.
 **************************************************************************************************/
use crate::constants::MAX_MESSAGE_TAGS;
use crate::decode::{DecodeBuffer, ItemKind};
use crate::error::{CoseError, Result};
use crate::options::{MessageType, Options};

/// The enclosing tags captured in front of a message, in outermost-first order.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct CapturedTags {
    tags: [u64; MAX_MESSAGE_TAGS],
    len: usize,
}

impl CapturedTags {
    /// The captured tags.
    pub fn as_slice(&self) -> &[u64] {
        &self.tags[..self.len]
    }
}

/// Read leading tags off `dec`, enforce the tag policy in `options`, and resolve the message
/// type against `allowed`.
pub(crate) fn resolve_message_type(
    dec: &mut DecodeBuffer<'_>,
    options: Options,
    allowed: &[MessageType],
) -> Result<(MessageType, CapturedTags)> {
    // The innermost tag, if it is a COSE message tag, announces the type; anything in front of
    // it is returned to the caller.
    let mut chain = [0u64; MAX_MESSAGE_TAGS + 1];
    let mut n = 0usize;
    while dec.kind()? == ItemKind::Tag {
        if n == chain.len() {
            return Err(CoseError::TooManyTags);
        }
        match dec.opt_tag()? {
            Some(t) => {
                chain[n] = t;
                n += 1;
            }
            None => break,
        }
    }

    let innermost = if n > 0 { Some(chain[n - 1]) } else { None };
    let message_tag = innermost.and_then(MessageType::from_tag);

    let (resolved, n_extra) = match message_tag {
        Some(t) => (Some(t), n - 1),
        None => (None, n),
    };
    if n_extra > MAX_MESSAGE_TAGS {
        return Err(CoseError::TooManyTags);
    }

    if options.is_tag_prohibited() && resolved.is_some() {
        return Err(CoseError::TagProhibited);
    }
    if options.is_tag_required() && resolved.is_none() {
        return Err(CoseError::TagRequired);
    }

    let asserted = options.message_type();
    let message_type = match (asserted, resolved) {
        (MessageType::Unspecified, Some(t)) => t,
        (MessageType::Unspecified, None) => {
            return Err(CoseError::WrongMessageType(innermost.unwrap_or(0)))
        }
        (a, Some(t)) if a != t => return Err(CoseError::WrongMessageType(t.tag().unwrap_or(0))),
        (a, _) => a,
    };

    if !allowed.contains(&message_type) {
        return Err(CoseError::WrongMessageType(
            message_type.tag().unwrap_or(0),
        ));
    }

    let mut captured = CapturedTags::default();
    captured.tags[..n_extra].copy_from_slice(&chain[..n_extra]);
    captured.len = n_extra;
    Ok((message_type, captured))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_type_from_tag() -> Result<()> {
        // 18([...]) with unspecified options
        let input: &[u8] = &[0xd2, 0x84, 0x40, 0xa0, 0x40, 0x40];
        let mut dec = DecodeBuffer::new(input);
        let (t, tags) = resolve_message_type(
            &mut dec,
            Options::new(MessageType::Unspecified),
            &[MessageType::Sign1, MessageType::Sign],
        )?;
        assert_eq!(t, MessageType::Sign1);
        assert!(tags.as_slice().is_empty());
        Ok(())
    }

    #[test]
    fn captures_extra_enclosing_tags() -> Result<()> {
        // 1000(18([...]))
        let input: &[u8] = &[0xd9, 0x03, 0xe8, 0xd2, 0x84, 0x40, 0xa0, 0x40, 0x40];
        let mut dec = DecodeBuffer::new(input);
        let (t, tags) = resolve_message_type(
            &mut dec,
            Options::new(MessageType::Sign1),
            &[MessageType::Sign1],
        )?;
        assert_eq!(t, MessageType::Sign1);
        assert_eq!(tags.as_slice(), &[1000]);
        Ok(())
    }

    #[test]
    fn tag_policy_enforced() {
        let tagged: &[u8] = &[0xd2, 0x84, 0x40, 0xa0, 0x40, 0x40];
        let untagged: &[u8] = &[0x84, 0x40, 0xa0, 0x40, 0x40];

        let mut dec = DecodeBuffer::new(tagged);
        assert_eq!(
            resolve_message_type(
                &mut dec,
                Options::new(MessageType::Sign1).tag_prohibited(),
                &[MessageType::Sign1],
            ),
            Err(CoseError::TagProhibited)
        );

        let mut dec = DecodeBuffer::new(untagged);
        assert_eq!(
            resolve_message_type(
                &mut dec,
                Options::new(MessageType::Sign1).tag_required(),
                &[MessageType::Sign1],
            ),
            Err(CoseError::TagRequired)
        );
    }

    #[test]
    fn mismatched_assertion_rejected() {
        // Mac0 tag with Sign1 asserted
        let input: &[u8] = &[0xd1, 0x84, 0x40, 0xa0, 0x40, 0x40];
        let mut dec = DecodeBuffer::new(input);
        assert_eq!(
            resolve_message_type(
                &mut dec,
                Options::new(MessageType::Sign1),
                &[MessageType::Sign1],
            ),
            Err(CoseError::WrongMessageType(17))
        );
    }
}
