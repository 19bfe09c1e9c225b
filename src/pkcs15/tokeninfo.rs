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

use crate::asn1;
use crate::error::*;
use crate::util;
use bitflags::bitflags;

bitflags! {
    pub struct TokenFlags: u32 {
        const READONLY = 0x01;
        const LOGIN_REQUIRED = 0x02;
        const PRN_GENERATION = 0x04;
        const EID_COMPLIANT = 0x08;
    }
}

/// The token-wide attributes from EF(TokenInfo).
#[derive(Clone, Debug)]
pub struct TokenInfo {
    pub version: u32,
    /// The serial number, printed as hex.
    pub serial_number: String,
    pub manufacturer_id: Option<String>,
    pub label: Option<String>,
    pub flags: TokenFlags,
}

impl Default for TokenInfo {
    fn default() -> Self {
        TokenInfo {
            version: 0,
            serial_number: String::new(),
            manufacturer_id: None,
            label: None,
            flags: TokenFlags::empty(),
        }
    }
}

/// Decode EF(TokenInfo). Fields past the token flags (security environment
/// descriptions, supported algorithms, update markers) are tolerated but not
/// retained.
pub fn parse_tokeninfo(data: &[u8]) -> Result<TokenInfo> {
    let (tag, content, _) = asn1::read_tlv(data)?;
    if tag != asn1::TAG_SEQUENCE {
        return Err(Error::InvalidArguments(format!(
            "TokenInfo does not start with a SEQUENCE (tag {:#04x})",
            tag
        )));
    }

    let mut parser = asn1::Parser::new(content);
    let version = asn1::decode_integer(parser.take(asn1::TAG_INTEGER)?)?.max(0) as u32;
    let serial_number = util::bin_to_hex(parser.take(asn1::TAG_OCTET_STRING)?, None);
    let manufacturer_id = match parser.take_optional(asn1::TAG_UTF8_STRING)? {
        Some(value) => Some(asn1::decode_utf8(value)?),
        None => None,
    };
    let label = match parser.take_optional(asn1::context(0, false))? {
        Some(value) => Some(asn1::decode_utf8(value)?),
        None => None,
    };
    let flags = TokenFlags::from_bits_truncate(asn1::decode_bit_field(
        parser.take(asn1::TAG_BIT_STRING)?,
    )?);

    Ok(TokenInfo {
        version,
        serial_number,
        manufacturer_id,
        label,
        flags,
    })
}
