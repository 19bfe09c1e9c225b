// Copyright 2017 Axel Rasmussen
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! BER-TLV primitives. This is the low-level codec the FCI walker and the
//! PKCS#15 entry parsers are built on: tag/length framing, plus decoders and
//! encoders for the handful of universal types those structures use.

use crate::error::*;
use crate::types::{ObjectId, MAX_OBJECT_ID_COMPONENTS};

pub const TAG_BOOLEAN: u32 = 0x01;
pub const TAG_INTEGER: u32 = 0x02;
pub const TAG_BIT_STRING: u32 = 0x03;
pub const TAG_OCTET_STRING: u32 = 0x04;
pub const TAG_OBJECT_IDENTIFIER: u32 = 0x06;
pub const TAG_ENUMERATED: u32 = 0x0A;
pub const TAG_UTF8_STRING: u32 = 0x0C;
pub const TAG_GENERALIZED_TIME: u32 = 0x18;
pub const TAG_SEQUENCE: u32 = 0x30;

/// Context-specific tag, e.g. `context(0, true)` for a constructed [0].
pub const fn context(n: u32, constructed: bool) -> u32 {
    0x80 | n | if constructed { 0x20 } else { 0 }
}

fn take_tag(data: &[u8]) -> Result<(u32, &[u8])> {
    let b1 = *data
        .first()
        .ok_or_else(|| Error::InvalidArguments("truncated TLV tag".to_string()))?;
    if b1 & 0x1F == 0x1F {
        let b2 = *data
            .get(1)
            .ok_or_else(|| Error::InvalidArguments("truncated multi-byte TLV tag".to_string()))?;
        if b2 & 0x80 != 0 {
            return Err(Error::NotSupported("TLV tags longer than 2 bytes".to_string()));
        }
        Ok((((b1 as u32) << 8) | b2 as u32, &data[2..]))
    } else {
        Ok((b1 as u32, &data[1..]))
    }
}

fn take_len(data: &[u8]) -> Result<(usize, &[u8])> {
    let l1 = *data
        .first()
        .ok_or_else(|| Error::InvalidArguments("truncated TLV length".to_string()))?;
    match l1 {
        0..=0x7F => Ok((l1 as usize, &data[1..])),
        0x81 => {
            let l2 = *data.get(1).ok_or_else(|| {
                Error::InvalidArguments("truncated long-form TLV length".to_string())
            })?;
            Ok((l2 as usize, &data[2..]))
        }
        0x82 => {
            if data.len() < 3 {
                return Err(Error::InvalidArguments(
                    "truncated long-form TLV length".to_string(),
                ));
            }
            Ok((((data[1] as usize) << 8) | data[2] as usize, &data[3..]))
        }
        _ => Err(Error::NotSupported(format!(
            "TLV length coding {:#04x}",
            l1
        ))),
    }
}

/// Read one TLV from the front of `data`, returning (tag, value, rest).
pub fn read_tlv(data: &[u8]) -> Result<(u32, &[u8], &[u8])> {
    let (tag, rest) = take_tag(data)?;
    let (len, rest) = take_len(rest)?;
    if rest.len() < len {
        return Err(Error::InvalidArguments(format!(
            "TLV value of {} bytes overruns the remaining {} bytes",
            len,
            rest.len()
        )));
    }
    let (value, rest) = rest.split_at(len);
    Ok((tag, value, rest))
}

/// Scan the top-level TLVs of `data` for `tag`, returning its value if found.
/// Malformed trailing data simply ends the scan.
pub fn find_tag(data: &[u8], tag: u32) -> Option<&[u8]> {
    let mut rest = data;
    while !rest.is_empty() {
        match read_tlv(rest) {
            Ok((t, value, r)) => {
                if t == tag {
                    return Some(value);
                }
                rest = r;
            }
            Err(_) => return None,
        }
    }
    None
}

/// Append one TLV to `out`.
pub fn put_tag(tag: u32, value: &[u8], out: &mut Vec<u8>) {
    if tag > 0xFF {
        out.push((tag >> 8) as u8);
    }
    out.push((tag & 0xFF) as u8);
    match value.len() {
        len if len < 0x80 => out.push(len as u8),
        len if len <= 0xFF => {
            out.push(0x81);
            out.push(len as u8);
        }
        len => {
            out.push(0x82);
            out.push((len >> 8) as u8);
            out.push((len & 0xFF) as u8);
        }
    }
    out.extend_from_slice(value);
}

/// A cursor over the TLVs within one constructed value.
pub struct Parser<'a> {
    rest: &'a [u8],
}

impl<'a> Parser<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Parser { rest: data }
    }

    pub fn is_empty(&self) -> bool {
        self.rest.is_empty()
    }

    pub fn peek_tag(&self) -> Option<u32> {
        take_tag(self.rest).ok().map(|(tag, _)| tag)
    }

    /// Read the next TLV, whatever its tag.
    pub fn take_any(&mut self) -> Result<(u32, &'a [u8])> {
        let (tag, value, rest) = read_tlv(self.rest)?;
        self.rest = rest;
        Ok((tag, value))
    }

    /// Read the next TLV, requiring its tag to be `tag`.
    pub fn take(&mut self, tag: u32) -> Result<&'a [u8]> {
        let (t, value, rest) = read_tlv(self.rest)?;
        if t != tag {
            return Err(Error::InvalidArguments(format!(
                "expected tag {:#04x}, found {:#04x}",
                tag, t
            )));
        }
        self.rest = rest;
        Ok(value)
    }

    /// Read the next TLV if its tag is `tag`; otherwise leave the cursor
    /// alone and return None.
    pub fn take_optional(&mut self, tag: u32) -> Result<Option<&'a [u8]>> {
        if self.peek_tag() == Some(tag) {
            Ok(Some(self.take(tag)?))
        } else {
            Ok(None)
        }
    }
}

/// Decode a signed big-endian INTEGER of up to 8 bytes.
pub fn decode_integer(value: &[u8]) -> Result<i64> {
    if value.is_empty() || value.len() > 8 {
        return Err(Error::InvalidArguments(format!(
            "INTEGER of {} bytes is outside the supported 1..=8 byte range",
            value.len()
        )));
    }
    let mut ret: i64 = if value[0] & 0x80 != 0 { -1 } else { 0 };
    for &b in value {
        ret = (ret << 8) | b as i64;
    }
    Ok(ret)
}

/// Encode a signed INTEGER with minimal content octets.
pub fn encode_integer(value: i64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let mut start = 0;
    while start < 7 {
        let b = bytes[start];
        let next = bytes[start + 1];
        let redundant = (b == 0x00 && next & 0x80 == 0) || (b == 0xFF && next & 0x80 != 0);
        if !redundant {
            break;
        }
        start += 1;
    }
    bytes[start..].to_vec()
}

/// Decode a BIT STRING into a flags word: bit i of the string (counting from
/// the most significant bit of the first content byte) becomes bit i of the
/// result.
pub fn decode_bit_field(value: &[u8]) -> Result<u32> {
    if value.is_empty() {
        return Err(Error::InvalidArguments("empty BIT STRING".to_string()));
    }
    let unused = value[0] as usize;
    if unused > 7 {
        return Err(Error::InvalidArguments(format!(
            "BIT STRING claims {} unused bits",
            unused
        )));
    }
    let bits = (value.len() - 1) * 8 - unused;
    if bits > 32 {
        return Err(Error::InvalidArguments(format!(
            "BIT STRING of {} bits exceeds the 32-bit field limit",
            bits
        )));
    }
    let mut field: u32 = 0;
    for i in 0..bits {
        if value[1 + i / 8] & (0x80 >> (i % 8)) != 0 {
            field |= 1 << i;
        }
    }
    Ok(field)
}

/// Encode a flags word as a BIT STRING, using as many bits as the highest
/// set flag requires.
pub fn encode_bit_field(field: u32) -> Vec<u8> {
    if field == 0 {
        return vec![0x00];
    }
    let bits = (32 - field.leading_zeros()) as usize;
    let bytes = (bits + 7) / 8;
    let mut out = vec![0_u8; 1 + bytes];
    out[0] = ((8 - bits % 8) % 8) as u8;
    for i in 0..bits {
        if field & (1 << i) != 0 {
            out[1 + i / 8] |= 0x80 >> (i % 8);
        }
    }
    out
}

pub fn decode_boolean(value: &[u8]) -> Result<bool> {
    if value.len() != 1 {
        return Err(Error::InvalidArguments(format!(
            "BOOLEAN of {} bytes",
            value.len()
        )));
    }
    Ok(value[0] != 0)
}

pub fn encode_boolean(value: bool) -> Vec<u8> {
    vec![if value { 0xFF } else { 0x00 }]
}

pub fn decode_utf8(value: &[u8]) -> Result<String> {
    String::from_utf8(value.to_vec())
        .map_err(|_| Error::InvalidArguments("string is not valid UTF-8".to_string()))
}

/// Decode an OBJECT IDENTIFIER from its content octets.
pub fn decode_object_id(value: &[u8]) -> Result<ObjectId> {
    if value.is_empty() {
        return Err(Error::InvalidArguments("empty OBJECT IDENTIFIER".to_string()));
    }
    let mut components: Vec<i64> = Vec::new();
    let mut accum: i64 = 0;
    for (i, &b) in value.iter().enumerate() {
        accum = (accum << 7) | (b & 0x7F) as i64;
        if b & 0x80 == 0 {
            if components.is_empty() {
                // The first subidentifier packs the first two components.
                let first = (accum / 40).min(2);
                components.push(first);
                components.push(accum - first * 40);
            } else {
                components.push(accum);
            }
            accum = 0;
        } else if i == value.len() - 1 {
            return Err(Error::InvalidArguments(
                "OBJECT IDENTIFIER ends mid-component".to_string(),
            ));
        }
    }

    let parts: Vec<String> = components.iter().map(|c| c.to_string()).collect();
    if parts.len() > MAX_OBJECT_ID_COMPONENTS {
        return Err(Error::InvalidArguments(format!(
            "OBJECT IDENTIFIER has {} components, more than the {} supported",
            parts.len(),
            MAX_OBJECT_ID_COMPONENTS
        )));
    }
    parts.join(".").parse()
}

/// Encode an OBJECT IDENTIFIER into its content octets.
pub fn encode_object_id(oid: &ObjectId) -> Result<Vec<u8>> {
    let components: Vec<i32> = oid.components().collect();
    if components.len() < 2 {
        return Err(Error::InvalidArguments(
            "object identifier is too short to encode".to_string(),
        ));
    }
    let mut out: Vec<u8> = Vec::new();
    let mut write_base128 = |mut v: u64, out: &mut Vec<u8>| {
        let mut chunk: Vec<u8> = vec![(v & 0x7F) as u8];
        v >>= 7;
        while v != 0 {
            chunk.push(0x80 | (v & 0x7F) as u8);
            v >>= 7;
        }
        chunk.reverse();
        out.extend_from_slice(&chunk);
    };
    write_base128(
        components[0] as u64 * 40 + components[1] as u64,
        &mut out,
    );
    for &c in &components[2..] {
        write_base128(c as u64, &mut out);
    }
    Ok(out)
}
