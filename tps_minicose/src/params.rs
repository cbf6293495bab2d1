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
 * Header parameter subsystem
 *
 * Typed header parameter nodes, the fixed-capacity storage pool used during decode, the
 * protected/unprotected bucket encoder and decoder with critical-parameter handling, and the
 * lookup helpers over decoded lists.
 *
 * Nodes are allocated from the pool in order of discovery and released as a group when the pool
 * is cleared; `next` is an index into the pool with a sentinel for end-of-list, so no node ever
 * holds a reference into the pool that contains it.
 **************************************************************************************************/
use crate::algorithm::Algorithm;
use crate::constants::*;
use crate::decode::{DecodeBuffer, ItemKind};
use crate::encode::{EncodeBuffer, Span};
use crate::error::{CoseError, Result};

/// End-of-list sentinel for pool links.
pub const NO_NEXT: u16 = u16::MAX;

/// Where in the message a header parameter sits: body, signer/recipient, or nested recipient,
/// plus the index among its siblings.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Location {
    /// 0 = body, 1 = signer/recipient, 2 = nested recipient.
    pub nesting: u8,
    /// Index of the signature or recipient within its array.
    pub index: u8,
}

impl Location {
    /// The body bucket location.
    pub const BODY: Location = Location {
        nesting: 0,
        index: 0,
    };

    /// Construct a location.
    #[inline]
    pub fn new(nesting: u8, index: u8) -> Location {
        Location { nesting, index }
    }
}

/// Value carried by a special-typed parameter: the raw encoded CBOR of the value item plus a
/// scratch word the callback may use.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct SpecialValue<'buf> {
    /// The encoded CBOR of the value item, borrowed from the input.
    pub raw: &'buf [u8],
    /// Callback-defined scratch.
    pub word: u64,
}

/// A decoded or to-be-encoded header parameter value.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum ParamValue<'buf> {
    /// Integer value.
    Int(i64),
    /// Byte string, borrowed from the input or supplied by the caller.
    Bstr(&'buf [u8]),
    /// Text string, borrowed from the input or supplied by the caller.
    Tstr(&'buf str),
    /// Non-scalar value handled by a registered callback.
    Special(SpecialValue<'buf>),
}

/// One header parameter node.
#[derive(Debug, Copy, Clone)]
pub struct Param<'buf> {
    /// Integer label from the IANA registry (string labels are out of scope).
    pub label: i64,
    /// Whether the parameter lives in the integrity-covered bucket.
    pub in_protected: bool,
    /// Whether the parameter is listed in `crit`.
    pub critical: bool,
    /// Nesting level and index of the bucket the parameter was found in.
    pub location: Location,
    /// The value.
    pub value: ParamValue<'buf>,
    pub next: u16,
}

impl<'buf> Param<'buf> {
    pub(crate) const EMPTY: Param<'buf> = Param {
        label: 0,
        in_protected: false,
        critical: false,
        location: Location::BODY,
        value: ParamValue::Int(0),
        next: NO_NEXT,
    };

    /// An unprotected integer parameter at the body location.
    pub fn int(label: i64, v: i64) -> Param<'buf> {
        Param {
            label,
            value: ParamValue::Int(v),
            ..Param::EMPTY
        }
    }

    /// An unprotected byte string parameter at the body location.
    pub fn bstr(label: i64, v: &'buf [u8]) -> Param<'buf> {
        Param {
            label,
            value: ParamValue::Bstr(v),
            ..Param::EMPTY
        }
    }

    /// An unprotected text string parameter at the body location.
    pub fn tstr(label: i64, v: &'buf str) -> Param<'buf> {
        Param {
            label,
            value: ParamValue::Tstr(v),
            ..Param::EMPTY
        }
    }

    /// The `alg` parameter. Always protected.
    pub fn alg(alg: Algorithm) -> Param<'buf> {
        Param::int(HDR_ALG, alg.0).protected()
    }

    /// A `kid` hint, unprotected as is conventional.
    pub fn kid(kid: &'buf [u8]) -> Param<'buf> {
        Param::bstr(HDR_KID, kid)
    }

    /// An unprotected `iv` parameter.
    pub fn iv(iv: &'buf [u8]) -> Param<'buf> {
        Param::bstr(HDR_IV, iv)
    }

    /// Move this parameter to the protected bucket.
    pub fn protected(mut self) -> Self {
        self.in_protected = true;
        self
    }

    /// Mark this parameter critical. Critical parameters must be protected, so this moves it
    /// to the protected bucket as well.
    pub fn critical(mut self) -> Self {
        self.critical = true;
        self.in_protected = true;
        self
    }

    /// Place this parameter at `location`.
    pub fn at(mut self, location: Location) -> Self {
        self.location = location;
        self
    }
}

/***************************************************************************************************
 * Special parameter callbacks
 **************************************************************************************************/

/// Encode-side callback for special-typed parameters. The implementation emits its own CBOR for
/// both the label and the value.
pub trait SpecialEncode {
    /// Emit `param` (label and value) onto `buf`.
    fn encode(&self, param: &Param<'_>, buf: &mut EncodeBuffer<'_>) -> Result<()>;
}

/// Decode-side callback for parameters the core does not understand natively.
///
/// The callback either consumes the value item from `dec` and returns the captured value, or
/// declines by returning `Ok(None)` without consuming anything. A declined critical parameter
/// is a hard failure; a declined non-critical parameter is dropped.
pub trait SpecialDecode {
    /// Attempt to consume the value for `label`.
    fn decode<'b>(
        &mut self,
        label: i64,
        critical: bool,
        dec: &mut DecodeBuffer<'b>,
    ) -> Result<Option<SpecialValue<'b>>>;
}

/***************************************************************************************************
 * Parameter storage pool
 **************************************************************************************************/

/// Fixed-capacity arena for decoded header parameter nodes.
///
/// Nodes are taken in order of discovery and released as a group by [`ParamPool::clear`]. The
/// pool must outlive every [`ParamList`] over it.
#[derive(Debug)]
pub struct ParamPool<'buf> {
    nodes: [Param<'buf>; PARAM_POOL_CAPACITY],
    used: usize,
}

impl<'buf> ParamPool<'buf> {
    /// An empty pool.
    pub fn new() -> ParamPool<'buf> {
        ParamPool {
            nodes: [Param::EMPTY; PARAM_POOL_CAPACITY],
            used: 0,
        }
    }

    /// Number of nodes allocated.
    #[inline]
    pub fn len(&self) -> usize {
        self.used
    }

    /// Return `true` if no nodes are allocated.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.used == 0
    }

    /// Release every node.
    pub fn clear(&mut self) {
        self.used = 0;
    }

    /// Roll back to a previous allocation mark, releasing the nodes of an abandoned decode
    /// attempt (the engines re-try recipient plugins against the same encoded item).
    pub(crate) fn truncate(&mut self, len: usize) {
        if len <= self.used {
            self.used = len;
        }
    }

    /// Allocate a node, returning its index.
    pub(crate) fn alloc(&mut self, p: Param<'buf>) -> Result<u16> {
        if self.used < PARAM_POOL_CAPACITY {
            self.nodes[self.used] = p;
            self.used += 1;
            Ok((self.used - 1) as u16)
        } else {
            Err(CoseError::ParamPoolExhausted)
        }
    }

    /// The node at `index`, if allocated.
    pub fn get(&self, index: u16) -> Option<&Param<'buf>> {
        if (index as usize) < self.used {
            Some(&self.nodes[index as usize])
        } else {
            None
        }
    }

    pub(crate) fn set_next(&mut self, index: u16, next: u16) {
        if (index as usize) < self.used {
            self.nodes[index as usize].next = next;
        }
    }

    /// A list view starting at `head`.
    pub fn list<'p>(&'p self, head: u16) -> ParamList<'p, 'buf> {
        ParamList { pool: self, head }
    }

    /// Re-link every allocated node in allocation order (body first, then signatures or
    /// recipients in index order) and return the head of the combined list.
    pub fn chain_in_order(&mut self) -> u16 {
        if self.used == 0 {
            return NO_NEXT;
        }
        for i in 0..self.used {
            self.nodes[i].next = if i + 1 < self.used {
                (i + 1) as u16
            } else {
                NO_NEXT
            };
        }
        0
    }
}

impl<'buf> Default for ParamPool<'buf> {
    fn default() -> Self {
        ParamPool::new()
    }
}

/// A read-only linked-list view over pool nodes.
#[derive(Debug, Copy, Clone)]
pub struct ParamList<'p, 'buf> {
    pool: &'p ParamPool<'buf>,
    head: u16,
}

impl<'p, 'buf> ParamList<'p, 'buf> {
    /// An empty list over `pool`.
    pub fn empty(pool: &'p ParamPool<'buf>) -> Self {
        ParamList {
            pool,
            head: NO_NEXT,
        }
    }

    /// Iterate the nodes in list order.
    pub fn iter(&self) -> ParamIter<'p, 'buf> {
        ParamIter {
            pool: self.pool,
            cursor: self.head,
        }
    }

    /// Return `true` if the list holds no parameters.
    pub fn is_empty(&self) -> bool {
        self.head == NO_NEXT
    }

    /// Linear scan for the first parameter with `label`.
    pub fn find(&self, label: i64) -> Option<&'p Param<'buf>> {
        self.iter().find(|p| p.label == label)
    }

    /// The `alg` parameter, or the NONE sentinel when missing or of the wrong type.
    pub fn alg(&self) -> Algorithm {
        match self.find(HDR_ALG).map(|p| &p.value) {
            Some(ParamValue::Int(v)) => Algorithm(*v),
            _ => Algorithm::NONE,
        }
    }

    /// The `kid` parameter bytes, if present with the right type.
    pub fn kid(&self) -> Option<&'buf [u8]> {
        match self.find(HDR_KID).map(|p| &p.value) {
            Some(ParamValue::Bstr(b)) => Some(b),
            _ => None,
        }
    }

    /// The `iv` parameter bytes, if present with the right type.
    pub fn iv(&self) -> Option<&'buf [u8]> {
        match self.find(HDR_IV).map(|p| &p.value) {
            Some(ParamValue::Bstr(b)) => Some(b),
            _ => None,
        }
    }

    /// The `partial_iv` parameter bytes, if present with the right type.
    pub fn partial_iv(&self) -> Option<&'buf [u8]> {
        match self.find(HDR_PARTIAL_IV).map(|p| &p.value) {
            Some(ParamValue::Bstr(b)) => Some(b),
            _ => None,
        }
    }

    /// The content type parameter in its integer shape.
    pub fn content_type_uint(&self) -> Option<u64> {
        match self.find(HDR_CONTENT_TYPE).map(|p| &p.value) {
            Some(ParamValue::Int(v)) if *v >= 0 => Some(*v as u64),
            _ => None,
        }
    }

    /// The content type parameter in its text shape.
    pub fn content_type_tstr(&self) -> Option<&'buf str> {
        match self.find(HDR_CONTENT_TYPE).map(|p| &p.value) {
            Some(ParamValue::Tstr(s)) => Some(s),
            _ => None,
        }
    }
}

/// Iterator over a [`ParamList`].
#[derive(Debug)]
pub struct ParamIter<'p, 'buf> {
    pool: &'p ParamPool<'buf>,
    cursor: u16,
}

impl<'p, 'buf> Iterator for ParamIter<'p, 'buf> {
    type Item = &'p Param<'buf>;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.pool.get(self.cursor)?;
        self.cursor = node.next;
        Some(node)
    }
}

/***************************************************************************************************
 * Header bucket encoding
 **************************************************************************************************/

/// Encode both header buckets from `params` onto `buf`.
///
/// The protected bucket is emitted first, wrapped in a byte string whose exact encoded content
/// is returned as a span (zero-length when the bucket is empty). If any protected parameter is
/// marked critical, a `crit` parameter listing their labels is synthesized into the protected
/// map. Within a bucket, entries are written in list order.
pub fn encode_headers(
    buf: &mut EncodeBuffer<'_>,
    params: &[Param<'_>],
    special: Option<&dyn SpecialEncode>,
) -> Result<Span> {
    validate_params(params)?;

    let n_protected = params.iter().filter(|p| p.in_protected).count();
    let n_critical = params.iter().filter(|p| p.critical).count();
    if n_critical > MAX_CRITICAL_PARAMS {
        return Err(CoseError::CritListOverfull);
    }

    // Protected bucket, wrapped. An empty bucket is the zero-length bstr.
    let wrap = buf.bstr_wrap_start()?;
    if n_protected > 0 {
        let pairs = n_protected + if n_critical > 0 { 1 } else { 0 };
        buf.map(pairs)?;
        if n_critical > 0 {
            buf.int(HDR_CRIT)?;
            buf.array(n_critical)?;
            for p in params.iter().filter(|p| p.critical) {
                buf.int(p.label)?;
            }
        }
        for p in params.iter().filter(|p| p.in_protected) {
            encode_param(buf, p, special)?;
        }
    }
    let protected = buf.bstr_wrap_finalize(wrap)?;

    // Unprotected bucket, a plain map.
    buf.map(params.len() - n_protected)?;
    for p in params.iter().filter(|p| !p.in_protected) {
        encode_param(buf, p, special)?;
    }

    Ok(protected)
}

fn encode_param(
    buf: &mut EncodeBuffer<'_>,
    p: &Param<'_>,
    special: Option<&dyn SpecialEncode>,
) -> Result<()> {
    match p.value {
        ParamValue::Int(v) => {
            buf.int(p.label)?;
            buf.int(v)
        }
        ParamValue::Bstr(b) => {
            buf.int(p.label)?;
            buf.bstr(b)
        }
        ParamValue::Tstr(s) => {
            buf.int(p.label)?;
            buf.tstr(s)
        }
        ParamValue::Special(_) => match special {
            Some(cb) => cb.encode(p, buf),
            None => Err(CoseError::ExpectedType("special encoder")),
        },
    }
}

fn validate_params(params: &[Param<'_>]) -> Result<()> {
    for (i, p) in params.iter().enumerate() {
        if p.critical && !p.in_protected {
            return Err(CoseError::CriticalNotProtected);
        }
        if p.label == HDR_CRIT {
            // crit is synthesized, never supplied
            return Err(CoseError::WrongBucket(HDR_CRIT));
        }
        if p.label == HDR_ALG && (!p.in_protected || p.critical) {
            return Err(CoseError::WrongBucket(HDR_ALG));
        }
        for q in &params[i + 1..] {
            if q.label == p.label {
                return Err(CoseError::DuplicateLabel(p.label));
            }
            let iv_pair = (p.label == HDR_IV && q.label == HDR_PARTIAL_IV)
                || (p.label == HDR_PARTIAL_IV && q.label == HDR_IV);
            if iv_pair && p.in_protected == q.in_protected {
                return Err(CoseError::IvPartialIvConflict);
            }
        }
    }
    Ok(())
}

/***************************************************************************************************
 * Header bucket decoding
 **************************************************************************************************/

/// Result of decoding one pair of header buckets.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct DecodedHeaders<'buf> {
    /// Head of the decoded parameter list in the pool, or [`NO_NEXT`].
    pub head: u16,
    /// Tail of the decoded parameter list, or [`NO_NEXT`].
    pub tail: u16,
    /// The exact encoded bytes of the protected bucket map (zero-length when empty).
    pub protected: &'buf [u8],
}

// Labels whose semantics this implementation understands natively. A critical parameter outside
// this set must be consumed by a special callback or decoding fails.
fn is_common_label(label: i64) -> bool {
    matches!(
        label,
        HDR_ALG | HDR_CONTENT_TYPE | HDR_KID | HDR_IV | HDR_PARTIAL_IV
    )
}

/// Decode the protected (bstr-wrapped) and unprotected header buckets from `dec`, allocating
/// nodes from `pool` at `location`.
///
/// The `crit` parameter is decoded eagerly and its labels are marked on matching nodes. Unknown
/// critical parameters, duplicate labels, a label in both buckets, and iv/partial_iv in one
/// bucket are all hard errors.
pub fn decode_headers<'buf>(
    dec: &mut DecodeBuffer<'buf>,
    location: Location,
    pool: &mut ParamPool<'buf>,
    mut special: Option<&mut dyn SpecialDecode>,
) -> Result<DecodedHeaders<'buf>> {
    let protected = dec.bstr()?;

    // Eager crit scan over the protected bucket.
    let mut crit = [0i64; MAX_CRITICAL_PARAMS];
    let mut n_crit = 0usize;
    if !protected.is_empty() {
        let mut p = DecodeBuffer::new(protected);
        let pairs = p.map()?;
        let mut crit_seen = false;
        for _ in 0..pairs {
            let label = p.int()?;
            if label == HDR_CRIT {
                if crit_seen {
                    return Err(CoseError::DuplicateLabel(HDR_CRIT));
                }
                crit_seen = true;
                let n = p.array()?;
                if n == 0 {
                    return Err(CoseError::CritListEmpty);
                }
                if n > MAX_CRITICAL_PARAMS {
                    return Err(CoseError::CritListOverfull);
                }
                for _ in 0..n {
                    let l = p.int()?;
                    if l == HDR_ALG {
                        return Err(CoseError::MalformedEncoding);
                    }
                    crit[n_crit] = l;
                    n_crit += 1;
                }
            } else {
                p.skip()?;
            }
        }
    }
    let crit = &crit[..n_crit];

    let mut head = NO_NEXT;
    let mut tail = NO_NEXT;

    if !protected.is_empty() {
        let mut p = DecodeBuffer::new(protected);
        let pairs = p.map()?;
        decode_bucket(
            &mut p, pairs, true, crit, location, pool, &mut special, &mut head, &mut tail,
        )?;
        if !p.at_end() {
            return Err(CoseError::MalformedEncoding);
        }
    }

    let pairs = dec.map()?;
    decode_bucket(
        dec, pairs, false, crit, location, pool, &mut special, &mut head, &mut tail,
    )?;

    // Every critical label must have produced a protected node.
    for l in crit {
        let found = pool
            .list(head)
            .iter()
            .any(|p| p.label == *l && p.in_protected);
        if !found {
            return Err(CoseError::UnknownCriticalParameter(*l));
        }
    }

    Ok(DecodedHeaders {
        head,
        tail,
        protected,
    })
}

fn decode_bucket<'buf>(
    bucket: &mut DecodeBuffer<'buf>,
    pairs: usize,
    in_protected: bool,
    crit: &[i64],
    location: Location,
    pool: &mut ParamPool<'buf>,
    special: &mut Option<&mut dyn SpecialDecode>,
    head: &mut u16,
    tail: &mut u16,
) -> Result<()> {
    for _ in 0..pairs {
        let label = bucket.int()?;
        if in_protected && label == HDR_CRIT {
            bucket.skip()?;
            continue;
        }
        let critical = crit.contains(&label);
        if critical && !in_protected {
            return Err(CoseError::CriticalNotProtected);
        }

        // Offer non-common labels to the special callback first.
        let mut value = None;
        if !is_common_label(label) {
            if let Some(cb) = special {
                let m = bucket.mark();
                match cb.decode(label, critical, bucket)? {
                    Some(v) => value = Some(ParamValue::Special(v)),
                    None => bucket.reset(m),
                }
            }
        }

        let value = match value {
            Some(v) => v,
            None => match bucket.kind()? {
                ItemKind::UInt | ItemKind::NInt => {
                    let v = bucket.int()?;
                    if label == HDR_KID || label == HDR_IV || label == HDR_PARTIAL_IV {
                        return Err(CoseError::ExpectedType("bstr"));
                    }
                    ParamValue::Int(v)
                }
                ItemKind::Bstr => {
                    if label == HDR_ALG || label == HDR_CONTENT_TYPE {
                        return Err(CoseError::ExpectedType("int or tstr"));
                    }
                    ParamValue::Bstr(bucket.bstr()?)
                }
                ItemKind::Tstr => {
                    if label == HDR_ALG
                        || label == HDR_KID
                        || label == HDR_IV
                        || label == HDR_PARTIAL_IV
                    {
                        return Err(CoseError::ExpectedType("int or bstr"));
                    }
                    ParamValue::Tstr(bucket.tstr()?)
                }
                _ => {
                    // Non-scalar with no consumer: fatal if critical, dropped otherwise.
                    bucket.skip()?;
                    if critical {
                        return Err(CoseError::UnknownCriticalParameter(label));
                    }
                    continue;
                }
            },
        };

        // A captured scalar with critical semantics we do not actually understand is still an
        // unknown critical parameter.
        if critical && !is_common_label(label) && !matches!(value, ParamValue::Special(_)) {
            return Err(CoseError::UnknownCriticalParameter(label));
        }

        // Duplicate labels within a bucket and across the two buckets of one location.
        for existing in pool.list(*head).iter() {
            if existing.label == label {
                return Err(CoseError::DuplicateLabel(label));
            }
            let iv_pair = (existing.label == HDR_IV && label == HDR_PARTIAL_IV)
                || (existing.label == HDR_PARTIAL_IV && label == HDR_IV);
            if iv_pair && existing.in_protected == in_protected {
                return Err(CoseError::IvPartialIvConflict);
            }
        }

        let idx = pool.alloc(Param {
            label,
            in_protected,
            critical,
            location,
            value,
            next: NO_NEXT,
        })?;
        if *head == NO_NEXT {
            *head = idx;
        } else {
            pool.set_next(*tail, idx);
        }
        *tail = idx;
    }
    Ok(())
}
