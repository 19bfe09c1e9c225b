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
use crate::pkcs15::object::{
    KeyAccessFlags, KeyUsage, Object, ObjectPayload, ObjectType, PrKeyInfo,
};
use crate::pkcs15::{
    apply_common_attrs, decode_common_object_attrs, decode_path, encode_common_object_attrs,
    encode_path, P15Card,
};
use log::warn;

/// Decode the CommonKeyAttributes content octets shared by the key
/// directory files. Returns (id, usage, native, access flags, reference).
pub(crate) fn decode_common_key_attrs(
    content: &[u8],
) -> Result<(crate::types::Id, KeyUsage, bool, KeyAccessFlags, Option<u32>)> {
    let mut parser = asn1::Parser::new(content);
    let id = crate::types::Id::new(parser.take(asn1::TAG_OCTET_STRING)?)?;
    let usage = KeyUsage::from_bits_truncate(asn1::decode_bit_field(
        parser.take(asn1::TAG_BIT_STRING)?,
    )?);
    let native = match parser.take_optional(asn1::TAG_BOOLEAN)? {
        Some(value) => asn1::decode_boolean(value)?,
        None => true,
    };
    let access_flags = match parser.take_optional(asn1::TAG_BIT_STRING)? {
        Some(value) => KeyAccessFlags::from_bits_truncate(asn1::decode_bit_field(value)?),
        None => KeyAccessFlags::empty(),
    };
    let key_reference = match parser.take_optional(asn1::TAG_INTEGER)? {
        Some(value) => Some(asn1::decode_integer(value)?.max(0) as u32),
        None => None,
    };
    Ok((id, usage, native, access_flags, key_reference))
}

pub(crate) fn encode_common_key_attrs(
    id: &crate::types::Id,
    usage: KeyUsage,
    native: bool,
    access_flags: KeyAccessFlags,
    key_reference: Option<u32>,
    out: &mut Vec<u8>,
) {
    let mut inner: Vec<u8> = Vec::new();
    asn1::put_tag(asn1::TAG_OCTET_STRING, id.value(), &mut inner);
    asn1::put_tag(
        asn1::TAG_BIT_STRING,
        &asn1::encode_bit_field(usage.bits()),
        &mut inner,
    );
    if !native {
        asn1::put_tag(asn1::TAG_BOOLEAN, &asn1::encode_boolean(native), &mut inner);
    }
    if !access_flags.is_empty() {
        asn1::put_tag(
            asn1::TAG_BIT_STRING,
            &asn1::encode_bit_field(access_flags.bits()),
            &mut inner,
        );
    }
    if let Some(reference) = key_reference {
        asn1::put_tag(
            asn1::TAG_INTEGER,
            &asn1::encode_integer(reference as i64),
            &mut inner,
        );
    }
    asn1::put_tag(asn1::TAG_SEQUENCE, &inner, out);
}

/// Decode one PrKDF entry from the front of `blob`, advancing past it. RSA
/// entries are plain SEQUENCEs; EC entries arrive tagged [0]. Other key
/// algorithms are skipped.
pub fn decode_prkdf_entry(p15: &P15Card, blob: &mut &[u8]) -> Result<Option<Object>> {
    let (tag, content, rest) = asn1::read_tlv(blob)?;
    *blob = rest;
    let obj_type = match tag {
        asn1::TAG_SEQUENCE => ObjectType::PrKeyRsa,
        t if t == asn1::context(0, true) => ObjectType::PrKeyEc,
        0xA1 | 0xA2 | 0xA3 => {
            warn!("skipping private key of unsupported algorithm (tag {:#04x})", tag);
            return Ok(None);
        }
        _ => {
            return Err(Error::InvalidArguments(format!(
                "unexpected PrKDF entry tag {:#04x}",
                tag
            )))
        }
    };

    let mut parser = asn1::Parser::new(content);
    let common = decode_common_object_attrs(parser.take(asn1::TAG_SEQUENCE)?)?;
    let (id, usage, native, access_flags, key_reference) =
        decode_common_key_attrs(parser.take(asn1::TAG_SEQUENCE)?)?;

    parser.take_optional(asn1::context(0, true))?;

    let type_attrs = parser.take(asn1::context(1, true))?;
    let mut type_parser = asn1::Parser::new(type_attrs);
    let mut key_parser = asn1::Parser::new(type_parser.take(asn1::TAG_SEQUENCE)?);

    let mut path = decode_path(key_parser.take(asn1::TAG_SEQUENCE)?)?;
    p15.absolutize(&mut path)?;

    let mut info = PrKeyInfo {
        id,
        usage,
        access_flags,
        native,
        key_reference,
        modulus_length: 0,
        field_length: 0,
        path,
    };
    match obj_type {
        ObjectType::PrKeyRsa => {
            info.modulus_length =
                asn1::decode_integer(key_parser.take(asn1::TAG_INTEGER)?)?.max(0) as usize;
        }
        _ => {
            if let Some(value) = key_parser.take_optional(asn1::TAG_INTEGER)? {
                info.field_length = asn1::decode_integer(value)?.max(0) as usize;
            }
        }
    }

    let mut obj = Object::new(obj_type, ObjectPayload::PrKey(info));
    apply_common_attrs(&mut obj, common);
    Ok(Some(obj))
}

/// Encode a private key object as a PrKDF entry.
pub fn encode_prkdf_entry(obj: &Object) -> Result<Vec<u8>> {
    let info = match &obj.payload {
        ObjectPayload::PrKey(info) => info,
        _ => {
            return Err(Error::InvalidArguments(
                "not a private key object".to_string(),
            ))
        }
    };

    let mut entry: Vec<u8> = Vec::new();
    encode_common_object_attrs(obj, &mut entry);
    encode_common_key_attrs(
        &info.id,
        info.usage,
        info.native,
        info.access_flags,
        info.key_reference,
        &mut entry,
    );

    let mut key_inner: Vec<u8> = Vec::new();
    encode_path(&info.path, &mut key_inner);
    match obj.obj_type {
        ObjectType::PrKeyRsa => {
            asn1::put_tag(
                asn1::TAG_INTEGER,
                &asn1::encode_integer(info.modulus_length as i64),
                &mut key_inner,
            );
        }
        ObjectType::PrKeyEc => {
            if info.field_length > 0 {
                asn1::put_tag(
                    asn1::TAG_INTEGER,
                    &asn1::encode_integer(info.field_length as i64),
                    &mut key_inner,
                );
            }
        }
        _ => {
            return Err(Error::InvalidArguments(
                "not a private key object".to_string(),
            ))
        }
    }
    let mut key_seq: Vec<u8> = Vec::new();
    asn1::put_tag(asn1::TAG_SEQUENCE, &key_inner, &mut key_seq);
    asn1::put_tag(asn1::context(1, true), &key_seq, &mut entry);

    let outer_tag = match obj.obj_type {
        ObjectType::PrKeyRsa => asn1::TAG_SEQUENCE,
        _ => asn1::context(0, true),
    };
    let mut out: Vec<u8> = Vec::new();
    asn1::put_tag(outer_tag, &entry, &mut out);
    Ok(out)
}
