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

use crate::pkcs15::cert::{decode_cdf_entry, encode_cdf_entry};
use crate::pkcs15::data::{decode_dodf_entry, encode_dodf_entry};
use crate::pkcs15::object::{
    CertInfo, DataInfo, KeyAccessFlags, KeyUsage, Object, ObjectFlags, ObjectPayload, ObjectType,
    PrKeyInfo,
};
use crate::pkcs15::prkey::{decode_prkdf_entry, encode_prkdf_entry};
use crate::pkcs15::pubkey::{decode_pukdf_entry, encode_pukdf_entry};
use crate::tests::pkcs15::{bind, reader_for_bind};
use crate::types::{Path, PathKind};
use hex_literal::hex;

/// One PrKDF entry: label "Key", PRIVATE, protected by authentication
/// object 01, id 45, usage SIGN | NON_REPUDIATION, access flags SENSITIVE |
/// ALWAYS_SENSITIVE | NEVER_EXTRACTABLE | LOCAL, key reference 1, a
/// relative path 4401, and a 1024-bit modulus.
pub(crate) const PRKDF_ENTRY: [u8; 47] = hex!(
    "30 2D
       30 0C 0C 03 4B 65 79 03 02 07 80 04 01 01
       30 0F
          04 01 45
          03 03 06 20 40
          03 02 03 B8
          02 01 01
       A1 0C 30 0A
          30 04 04 02 44 01
          02 02 04 00"
);

/// One CDF entry: label "Cert", id 45, an authority certificate at the
/// relative path 4402.
const CDF_ENTRY: [u8; 28] = hex!(
    "30 1A
       30 06 0C 04 43 65 72 74
       30 06 04 01 45 01 01 FF
       A1 08 30 06 30 04 04 02 44 02"
);

#[test]
fn test_decode_prkdf_entry() {
    let p15 = bind(reader_for_bind(&[]), Default::default());
    let mut blob = PRKDF_ENTRY.as_ref();
    let obj = decode_prkdf_entry(&p15, &mut blob).unwrap().unwrap();
    assert!(blob.is_empty());

    assert_eq!(ObjectType::PrKeyRsa, obj.obj_type);
    assert_eq!("Key", obj.label);
    assert_eq!(ObjectFlags::PRIVATE, obj.flags);
    assert_eq!(&[0x01], obj.auth_id.value());

    let info = match &obj.payload {
        ObjectPayload::PrKey(info) => info,
        other => panic!("expected a private key, got {:?}", other),
    };
    assert_eq!(&[0x45], info.id.value());
    assert_eq!(KeyUsage::SIGN | KeyUsage::NON_REPUDIATION, info.usage);
    assert_eq!(
        KeyAccessFlags::SENSITIVE
            | KeyAccessFlags::ALWAYS_SENSITIVE
            | KeyAccessFlags::NEVER_EXTRACTABLE
            | KeyAccessFlags::LOCAL,
        info.access_flags
    );
    assert!(info.native);
    assert_eq!(Some(1), info.key_reference);
    assert_eq!(1024, info.modulus_length);
    // The relative path is rooted under the application directory.
    assert_eq!(hex!("3F 00 50 15 44 01"), info.path.value());
}

#[test]
fn test_prkdf_entry_round_trip() {
    let p15 = bind(reader_for_bind(&[]), Default::default());
    let mut blob = PRKDF_ENTRY.as_ref();
    let obj = decode_prkdf_entry(&p15, &mut blob).unwrap().unwrap();

    let encoded = encode_prkdf_entry(&obj).unwrap();
    let mut blob = encoded.as_slice();
    let reparsed = decode_prkdf_entry(&p15, &mut blob).unwrap().unwrap();

    assert_eq!(obj.label, reparsed.label);
    assert_eq!(obj.flags, reparsed.flags);
    match (&obj.payload, &reparsed.payload) {
        (ObjectPayload::PrKey(a), ObjectPayload::PrKey(b)) => {
            assert_eq!(a.id, b.id);
            assert_eq!(a.usage, b.usage);
            assert_eq!(a.access_flags, b.access_flags);
            assert_eq!(a.native, b.native);
            assert_eq!(a.key_reference, b.key_reference);
            assert_eq!(a.modulus_length, b.modulus_length);
            assert_eq!(a.path.value(), b.path.value());
        }
        _ => panic!("round trip changed the payload kind"),
    }
}

#[test]
fn test_prkdf_skips_unsupported_algorithms() {
    let p15 = bind(reader_for_bind(&[]), Default::default());
    // A [2] (DSA) entry followed by a valid RSA entry.
    let mut data = hex!("A2 03 01 01 00").to_vec();
    data.extend_from_slice(&PRKDF_ENTRY);
    let mut blob = data.as_slice();

    assert!(decode_prkdf_entry(&p15, &mut blob).unwrap().is_none());
    let obj = decode_prkdf_entry(&p15, &mut blob).unwrap().unwrap();
    assert_eq!("Key", obj.label);
}

#[test]
fn test_decode_cdf_entry() {
    let p15 = bind(reader_for_bind(&[]), Default::default());
    let mut blob = CDF_ENTRY.as_ref();
    let obj = decode_cdf_entry(&p15, &mut blob).unwrap().unwrap();
    assert!(blob.is_empty());

    assert_eq!(ObjectType::CertX509, obj.obj_type);
    assert_eq!("Cert", obj.label);
    let info = match &obj.payload {
        ObjectPayload::Cert(info) => info,
        other => panic!("expected a certificate, got {:?}", other),
    };
    assert_eq!(&[0x45], info.id.value());
    assert!(info.authority);
    assert_eq!(hex!("3F 00 50 15 44 02"), info.path.value());
}

#[test]
fn test_cdf_entry_round_trip() {
    let p15 = bind(reader_for_bind(&[]), Default::default());
    let mut obj = Object::new(
        ObjectType::CertX509,
        ObjectPayload::Cert(CertInfo {
            id: "45".parse().unwrap(),
            authority: false,
            path: Path::new(PathKind::Path, &hex!("3F 00 50 15 44 02")).unwrap(),
        }),
    );
    obj.label = "Signing certificate".to_string();

    let encoded = encode_cdf_entry(&obj).unwrap();
    let mut blob = encoded.as_slice();
    let reparsed = decode_cdf_entry(&p15, &mut blob).unwrap().unwrap();

    assert_eq!(obj.label, reparsed.label);
    match (&obj.payload, &reparsed.payload) {
        (ObjectPayload::Cert(a), ObjectPayload::Cert(b)) => {
            assert_eq!(a.id, b.id);
            assert_eq!(a.authority, b.authority);
            assert_eq!(a.path.value(), b.path.value());
        }
        _ => panic!("round trip changed the payload kind"),
    }
}

#[test]
fn test_dodf_entry_round_trip() {
    let p15 = bind(reader_for_bind(&[]), Default::default());
    let mut obj = Object::new(
        ObjectType::Data,
        ObjectPayload::Data(DataInfo {
            id: Default::default(),
            app_label: "printing".to_string(),
            app_oid: Some("1.2.3.4".parse().unwrap()),
            path: Path::new(PathKind::Path, &hex!("3F 00 50 15 44 03")).unwrap(),
        }),
    );
    obj.label = "Preferences".to_string();

    let encoded = encode_dodf_entry(&obj).unwrap();
    let mut blob = encoded.as_slice();
    let reparsed = decode_dodf_entry(&p15, &mut blob).unwrap().unwrap();

    assert_eq!(obj.label, reparsed.label);
    match (&obj.payload, &reparsed.payload) {
        (ObjectPayload::Data(a), ObjectPayload::Data(b)) => {
            assert_eq!(a.app_label, b.app_label);
            assert_eq!(a.app_oid, b.app_oid);
            assert_eq!(a.path.value(), b.path.value());
        }
        _ => panic!("round trip changed the payload kind"),
    }
}

#[test]
fn test_pukdf_entry_round_trip() {
    let p15 = bind(reader_for_bind(&[]), Default::default());
    let mut obj = Object::new(
        ObjectType::PubKeyRsa,
        ObjectPayload::PubKey(crate::pkcs15::object::PubKeyInfo {
            id: "45".parse().unwrap(),
            usage: KeyUsage::VERIFY | KeyUsage::ENCRYPT,
            access_flags: KeyAccessFlags::empty(),
            native: true,
            key_reference: None,
            modulus_length: 2048,
            field_length: 0,
            path: Path::new(PathKind::Path, &hex!("3F 00 50 15 44 04")).unwrap(),
        }),
    );
    obj.label = "Public key".to_string();

    let encoded = encode_pukdf_entry(&obj).unwrap();
    let mut blob = encoded.as_slice();
    let reparsed = decode_pukdf_entry(&p15, &mut blob).unwrap().unwrap();

    assert_eq!(obj.label, reparsed.label);
    match (&obj.payload, &reparsed.payload) {
        (ObjectPayload::PubKey(a), ObjectPayload::PubKey(b)) => {
            assert_eq!(a.id, b.id);
            assert_eq!(a.usage, b.usage);
            assert_eq!(a.modulus_length, b.modulus_length);
            assert_eq!(a.path.value(), b.path.value());
        }
        _ => panic!("round trip changed the payload kind"),
    }
}

#[test]
fn test_ec_prkdf_entry_round_trip() {
    let p15 = bind(reader_for_bind(&[]), Default::default());
    let mut obj = Object::new(
        ObjectType::PrKeyEc,
        ObjectPayload::PrKey(PrKeyInfo {
            id: "46".parse().unwrap(),
            usage: KeyUsage::SIGN,
            access_flags: KeyAccessFlags::SENSITIVE,
            native: true,
            key_reference: Some(2),
            modulus_length: 0,
            field_length: 256,
            path: Path::new(PathKind::Path, &hex!("3F 00 50 15 44 05")).unwrap(),
        }),
    );
    obj.label = "EC key".to_string();

    let encoded = encode_prkdf_entry(&obj).unwrap();
    // EC keys are distinguished by their context tag.
    assert_eq!(0xA0, encoded[0]);
    let mut blob = encoded.as_slice();
    let reparsed = decode_prkdf_entry(&p15, &mut blob).unwrap().unwrap();

    assert_eq!(ObjectType::PrKeyEc, reparsed.obj_type);
    match (&obj.payload, &reparsed.payload) {
        (ObjectPayload::PrKey(a), ObjectPayload::PrKey(b)) => {
            assert_eq!(a.field_length, b.field_length);
            assert_eq!(a.key_reference, b.key_reference);
        }
        _ => panic!("round trip changed the payload kind"),
    }
}
