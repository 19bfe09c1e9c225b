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

mod crypto;
mod entries;
mod pin;

use crate::card::Card;
use crate::pkcs15::object::{DataInfo, Object, ObjectClass, ObjectFlags, ObjectPayload, ObjectType};
use crate::pkcs15::tokeninfo::{parse_tokeninfo, TokenFlags};
use crate::pkcs15::{P15Card, P15CardOpts, SearchKey};
use crate::tests::reader::TestReader;
use crate::types::{Id, Path, PathKind};
use hex_literal::hex;

/// EF(TokenInfo) fixture: version 0, serial 1234, manufacturer "Acme",
/// label "Token", flags READONLY | LOGIN_REQUIRED.
pub(crate) const TOKENINFO: [u8; 26] = hex!(
    "30 18
       02 01 00
       04 02 12 34
       0C 04 41 63 6D 65
       80 05 54 6F 6B 65 6E
       03 02 06 C0"
);

/// A reader scripted with the whole bind flow against the default
/// application path: SELECT of the application DF, then the reads of
/// EF(TokenInfo) and EF(ODF). `odf` is the ODF's content; further
/// expectations can be chained onto the returned reader.
pub(crate) fn reader_for_bind(odf: &[u8]) -> TestReader {
    let mut tokeninfo_response = TOKENINFO.to_vec();
    tokeninfo_response.extend_from_slice(&hex!("90 00"));

    let mut odf_fci = hex!("6F 07 80 02 00 00 82 01 01").to_vec();
    odf_fci[5] = odf.len() as u8;
    odf_fci.extend_from_slice(&hex!("90 00"));

    let mut odf_read = hex!("00 B0 00 00 00").to_vec();
    odf_read[4] = odf.len() as u8;
    let mut odf_response = odf.to_vec();
    odf_response.extend_from_slice(&hex!("90 00"));

    let reader = TestReader::new()
        .expect(
            &hex!("00 A4 08 00 02 50 15"),
            &hex!("6F 07 83 02 50 15 82 01 38 90 00"),
        )
        .expect(
            &hex!("00 A4 08 00 04 50 15 50 32"),
            &hex!("6F 07 80 02 00 1A 82 01 01 90 00"),
        )
        .expect(&hex!("00 B0 00 00 1A"), &tokeninfo_response)
        .expect(&hex!("00 A4 08 00 04 50 15 50 31"), &odf_fci);
    if odf.is_empty() {
        reader
    } else {
        reader.expect(&odf_read, &odf_response)
    }
}

pub(crate) fn bind(reader: TestReader, opts: P15CardOpts) -> P15Card {
    P15Card::bind(Card::new(Box::new(reader)), None, opts).unwrap()
}

fn opts_without_caches() -> P15CardOpts {
    P15CardOpts {
        use_file_cache: false,
        use_pin_cache: true,
        pin_cache_counter: 10,
    }
}

/// A data object protected by the given authentication object, for
/// exercising the pin cache.
pub(crate) fn data_object_protected_by(auth_id: &Id) -> Object {
    let mut obj = data_object("10", "protected", "");
    obj.auth_id = auth_id.clone();
    obj
}

fn data_object(id: &str, label: &str, app_label: &str) -> Object {
    let mut obj = Object::new(
        ObjectType::Data,
        ObjectPayload::Data(DataInfo {
            id: id.parse().unwrap(),
            app_label: app_label.to_string(),
            app_oid: None,
            path: Path::new(PathKind::Path, &hex!("3F 00 50 15 44 10")).unwrap(),
        }),
    );
    obj.label = label.to_string();
    obj
}

#[test]
fn test_parse_tokeninfo() {
    let info = parse_tokeninfo(&TOKENINFO).unwrap();
    assert_eq!(0, info.version);
    assert_eq!("1234", info.serial_number);
    assert_eq!(Some("Acme".to_string()), info.manufacturer_id);
    assert_eq!(Some("Token".to_string()), info.label);
    assert_eq!(TokenFlags::READONLY | TokenFlags::LOGIN_REQUIRED, info.flags);
}

#[test]
fn test_bind_reads_tokeninfo_and_odf() {
    let odf = hex!("A8 06 30 04 04 02 44 01");
    let p15 = bind(reader_for_bind(&odf), opts_without_caches());

    assert_eq!(Some("Token".to_string()), p15.tokeninfo.label);
    assert_eq!(1, p15.dfs().len());
    assert_eq!(
        hex!("3F 00 50 15 44 01"),
        p15.dfs()[0].path.value()
    );
    assert!(!p15.dfs()[0].enumerated);
}

#[test]
fn test_object_arena_reuses_slots() {
    let mut p15 = bind(reader_for_bind(&[]), opts_without_caches());
    let a = p15.add_object(data_object("01", "a", ""));
    let b = p15.add_object(data_object("02", "b", ""));
    assert_ne!(a, b);

    p15.remove_object(a);
    assert!(p15.object(a).is_none());
    // Index b is unaffected by the removal of a.
    assert_eq!("b", p15.object(b).unwrap().label);

    let c = p15.add_object(data_object("03", "c", ""));
    assert_eq!(a, c);
    assert_eq!(2, p15.objects().count());
}

#[test]
fn test_search_by_class_and_label() {
    let mut p15 = bind(reader_for_bind(&[]), opts_without_caches());
    p15.add_object(data_object("01", "first", "app"));
    p15.add_object(data_object("02", "second", "app"));

    let all = p15.get_objects(ObjectClass::DATA, 16).unwrap();
    assert_eq!(2, all.len());

    let found = p15
        .search_objects(
            &SearchKey {
                class_mask: Some(ObjectClass::DATA),
                label: Some("second"),
                ..SearchKey::default()
            },
            16,
        )
        .unwrap();
    assert_eq!(1, found.len());
    assert_eq!("second", p15.object(found[0]).unwrap().label);

    let none = p15.get_objects(ObjectClass::PRKEY, 16).unwrap();
    assert!(none.is_empty());
}

#[test]
fn test_search_capacity_limit() {
    let mut p15 = bind(reader_for_bind(&[]), opts_without_caches());
    for i in 0..5 {
        p15.add_object(data_object(&format!("0{}", i), "obj", ""));
    }
    let limited = p15.get_objects(ObjectClass::DATA, 3).unwrap();
    assert_eq!(3, limited.len());
}

#[test]
fn test_search_by_flags() {
    let mut p15 = bind(reader_for_bind(&[]), opts_without_caches());
    let mut private = data_object("01", "private", "");
    private.flags = ObjectFlags::PRIVATE;
    p15.add_object(private);
    p15.add_object(data_object("02", "public", ""));

    let found = p15
        .search_objects(
            &SearchKey {
                flags_mask: Some((ObjectFlags::PRIVATE, ObjectFlags::PRIVATE)),
                ..SearchKey::default()
            },
            16,
        )
        .unwrap();
    assert_eq!(1, found.len());
    assert_eq!("private", p15.object(found[0]).unwrap().label);
}

#[test]
fn test_find_data_object_by_name() {
    let mut p15 = bind(reader_for_bind(&[]), opts_without_caches());
    p15.add_object(data_object("01", "config", "printing"));
    p15.add_object(data_object("02", "config", "mail"));

    let found = p15.find_data_object_by_name("mail", "config").unwrap().unwrap();
    assert_eq!("02", p15.object(found).unwrap().payload.id().to_string());
    assert!(p15.find_data_object_by_name("fax", "config").unwrap().is_none());
}

#[test]
fn test_unusedspace_parsing() {
    let mut p15 = bind(reader_for_bind(&[]), opts_without_caches());
    let der = hex!("30 09 30 04 04 02 44 05 04 01 01");
    p15.parse_unusedspace(&der).unwrap();
    assert_eq!(1, p15.unusedspace().len());
    assert_eq!(
        hex!("3F 00 50 15 44 05"),
        p15.unusedspace()[0].path.value()
    );
    assert_eq!(&[0x01], p15.unusedspace()[0].auth_id.value());

    p15.remove_unusedspace(0);
    assert!(p15.unusedspace().is_empty());
}

#[test]
fn test_unbind_returns_card() {
    let p15 = bind(reader_for_bind(&[]), opts_without_caches());
    let card = p15.unbind();
    assert_eq!(0, card.max_pin_len);
}

#[test]
fn test_find_by_id() {
    let mut p15 = bind(reader_for_bind(&[]), opts_without_caches());
    p15.add_object(data_object("45", "by-id", ""));
    let id: Id = "45".parse().unwrap();
    let found = p15.find_data_object_by_id(&id).unwrap().unwrap();
    assert_eq!("by-id", p15.object(found).unwrap().label);
    let missing: Id = "46".parse().unwrap();
    assert!(p15.find_data_object_by_id(&missing).unwrap().is_none());
}
