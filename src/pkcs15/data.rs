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
use crate::pkcs15::object::{DataInfo, Object, ObjectPayload, ObjectType};
use crate::pkcs15::{
    apply_common_attrs, decode_common_object_attrs, decode_path, encode_common_object_attrs,
    encode_path, P15Card,
};
use log::warn;

/// Decode one DODF entry from the front of `blob`, advancing past it. Only
/// opaque data objects held in a card file are understood.
pub fn decode_dodf_entry(p15: &P15Card, blob: &mut &[u8]) -> Result<Option<Object>> {
    let (tag, content, rest) = asn1::read_tlv(blob)?;
    *blob = rest;
    if tag != asn1::TAG_SEQUENCE {
        warn!("skipping data object of unsupported kind (tag {:#04x})", tag);
        return Ok(None);
    }

    let mut parser = asn1::Parser::new(content);
    let common = decode_common_object_attrs(parser.take(asn1::TAG_SEQUENCE)?)?;

    let mut class_parser = asn1::Parser::new(parser.take(asn1::TAG_SEQUENCE)?);
    let app_label = match class_parser.take_optional(asn1::TAG_UTF8_STRING)? {
        Some(value) => asn1::decode_utf8(value)?,
        None => String::new(),
    };
    let app_oid = match class_parser.take_optional(asn1::TAG_OBJECT_IDENTIFIER)? {
        Some(value) => Some(asn1::decode_object_id(value)?),
        None => None,
    };

    parser.take_optional(asn1::context(0, true))?;

    let type_attrs = parser.take(asn1::context(1, true))?;
    let mut type_parser = asn1::Parser::new(type_attrs);
    let path = match type_parser.take_optional(asn1::TAG_SEQUENCE)? {
        Some(value) => {
            let mut path = decode_path(value)?;
            p15.absolutize(&mut path)?;
            path
        }
        None => {
            warn!("skipping data object without a card file path");
            return Ok(None);
        }
    };

    let info = DataInfo {
        id: Default::default(),
        app_label,
        app_oid,
        path,
    };
    let mut obj = Object::new(ObjectType::Data, ObjectPayload::Data(info));
    apply_common_attrs(&mut obj, common);
    Ok(Some(obj))
}

/// Encode a data object as a DODF entry.
pub fn encode_dodf_entry(obj: &Object) -> Result<Vec<u8>> {
    let info = match &obj.payload {
        ObjectPayload::Data(info) => info,
        _ => return Err(Error::InvalidArguments("not a data object".to_string())),
    };

    let mut entry: Vec<u8> = Vec::new();
    encode_common_object_attrs(obj, &mut entry);

    let mut class_inner: Vec<u8> = Vec::new();
    if !info.app_label.is_empty() {
        asn1::put_tag(
            asn1::TAG_UTF8_STRING,
            info.app_label.as_bytes(),
            &mut class_inner,
        );
    }
    if let Some(app_oid) = &info.app_oid {
        asn1::put_tag(
            asn1::TAG_OBJECT_IDENTIFIER,
            &asn1::encode_object_id(app_oid)?,
            &mut class_inner,
        );
    }
    asn1::put_tag(asn1::TAG_SEQUENCE, &class_inner, &mut entry);

    let mut path_seq: Vec<u8> = Vec::new();
    encode_path(&info.path, &mut path_seq);
    asn1::put_tag(asn1::context(1, true), &path_seq, &mut entry);

    let mut out: Vec<u8> = Vec::new();
    asn1::put_tag(asn1::TAG_SEQUENCE, &entry, &mut out);
    Ok(out)
}

impl P15Card {
    /// Read the raw contents of the data object at `index`.
    pub fn read_data_object(&mut self, index: usize) -> Result<Vec<u8>> {
        let path = match self.object(index).map(|obj| &obj.payload) {
            Some(ObjectPayload::Data(info)) => info.path.clone(),
            _ => return Err(Error::InvalidArguments("not a data object".to_string())),
        };
        self.read_file(&path)
    }
}
