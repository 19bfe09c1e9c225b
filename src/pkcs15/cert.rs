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
use crate::pkcs15::object::{CertInfo, Object, ObjectPayload, ObjectType};
use crate::pkcs15::{
    apply_common_attrs, decode_common_object_attrs, decode_path, encode_common_object_attrs,
    encode_path, P15Card,
};
use crate::types::Id;
use log::warn;

/// Decode one CDF entry from the front of `blob`, advancing past it. Only
/// X.509 certificates held in a card file (the indirect coding) are
/// understood.
pub fn decode_cdf_entry(p15: &P15Card, blob: &mut &[u8]) -> Result<Option<Object>> {
    let (tag, content, rest) = asn1::read_tlv(blob)?;
    *blob = rest;
    if tag != asn1::TAG_SEQUENCE {
        warn!("skipping certificate of unsupported kind (tag {:#04x})", tag);
        return Ok(None);
    }

    let mut parser = asn1::Parser::new(content);
    let common = decode_common_object_attrs(parser.take(asn1::TAG_SEQUENCE)?)?;

    let mut class_parser = asn1::Parser::new(parser.take(asn1::TAG_SEQUENCE)?);
    let id = Id::new(class_parser.take(asn1::TAG_OCTET_STRING)?)?;
    let authority = match class_parser.take_optional(asn1::TAG_BOOLEAN)? {
        Some(value) => asn1::decode_boolean(value)?,
        None => false,
    };

    parser.take_optional(asn1::context(0, true))?;

    let type_attrs = parser.take(asn1::context(1, true))?;
    let mut type_parser = asn1::Parser::new(type_attrs);
    let mut cert_parser = asn1::Parser::new(type_parser.take(asn1::TAG_SEQUENCE)?);

    let path = match cert_parser.take_optional(asn1::TAG_SEQUENCE)? {
        Some(value) => {
            let mut path = decode_path(value)?;
            p15.absolutize(&mut path)?;
            path
        }
        None => {
            warn!("skipping certificate without a card file path");
            return Ok(None);
        }
    };

    let info = CertInfo {
        id,
        authority,
        path,
    };
    let mut obj = Object::new(ObjectType::CertX509, ObjectPayload::Cert(info));
    apply_common_attrs(&mut obj, common);
    Ok(Some(obj))
}

/// Encode a certificate object as a CDF entry.
pub fn encode_cdf_entry(obj: &Object) -> Result<Vec<u8>> {
    let info = match &obj.payload {
        ObjectPayload::Cert(info) => info,
        _ => {
            return Err(Error::InvalidArguments(
                "not a certificate object".to_string(),
            ))
        }
    };

    let mut entry: Vec<u8> = Vec::new();
    encode_common_object_attrs(obj, &mut entry);

    let mut class_inner: Vec<u8> = Vec::new();
    asn1::put_tag(asn1::TAG_OCTET_STRING, info.id.value(), &mut class_inner);
    if info.authority {
        asn1::put_tag(
            asn1::TAG_BOOLEAN,
            &asn1::encode_boolean(info.authority),
            &mut class_inner,
        );
    }
    asn1::put_tag(asn1::TAG_SEQUENCE, &class_inner, &mut entry);

    let mut cert_inner: Vec<u8> = Vec::new();
    encode_path(&info.path, &mut cert_inner);
    let mut cert_seq: Vec<u8> = Vec::new();
    asn1::put_tag(asn1::TAG_SEQUENCE, &cert_inner, &mut cert_seq);
    asn1::put_tag(asn1::context(1, true), &cert_seq, &mut entry);

    let mut out: Vec<u8> = Vec::new();
    asn1::put_tag(asn1::TAG_SEQUENCE, &entry, &mut out);
    Ok(out)
}

impl P15Card {
    /// Read the DER of the certificate described by the object at `index`.
    pub fn read_certificate(&mut self, index: usize) -> Result<Vec<u8>> {
        let path = match self.object(index).map(|obj| &obj.payload) {
            Some(ObjectPayload::Cert(info)) => info.path.clone(),
            _ => {
                return Err(Error::InvalidArguments(
                    "not a certificate object".to_string(),
                ))
            }
        };
        let data = self.read_file(&path)?;
        if let Some(obj) = self.object_mut(index) {
            obj.set_content(&data);
        }
        Ok(data)
    }
}
