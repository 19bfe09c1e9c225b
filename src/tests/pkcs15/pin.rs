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

use crate::error::Error;
use crate::pkcs15::object::{ObjectPayload, ObjectType};
use crate::pkcs15::pin::*;
use crate::pkcs15::P15CardOpts;
use crate::tests::pkcs15::{bind, data_object_protected_by, reader_for_bind};
use crate::tests::reader::TestReader;
use crate::reader::ReaderCapabilities;
use hex_literal::hex;

/// An ODF naming a single AODF at 4401.
pub(crate) const ODF_WITH_AODF: [u8; 8] = hex!("A8 06 30 04 04 02 44 01");

/// One AODF entry: label "User", flags PRIVATE | MODIFIABLE, auth id 01,
/// PIN flags CASE_SENSITIVE | LOCAL | INITIALIZED | NEEDS_PADDING,
/// ASCII-numeric, lengths 4/8/8, reference encoded negatively (the legacy
/// coding of 0x81), pad character 0xFF, path 3F00/5015.
pub(crate) const AODF_ENTRY: [u8; 53] = hex!(
    "30 33
       30 0A 0C 04 55 73 65 72 03 02 06 C0
       30 03 04 01 01
       A1 20 30 1E
          03 02 02 CC
          0A 01 01
          02 01 04
          02 01 08
          02 01 08
          80 01 81
          04 01 FF
          30 06 04 04 3F 00 50 15"
);

/// Chain the AODF enumeration exchanges (SELECT of 4401, read of its
/// contents) onto a bind script.
fn reader_with_aodf() -> TestReader {
    let mut aodf_response = AODF_ENTRY.to_vec();
    aodf_response.extend_from_slice(&hex!("90 00"));
    reader_for_bind(&ODF_WITH_AODF)
        .expect(
            &hex!("00 A4 08 00 06 50 15 44 01"),
            &hex!("6F 07 80 02 00 35 82 01 01 90 00"),
        )
        .expect(&hex!("00 B0 00 00 35"), &aodf_response)
}

/// The exchanges of one PIN presentation against the fixture AODF entry:
/// select the PIN's path, then VERIFY with the padded ASCII coding.
fn expect_verify(reader: TestReader, response: &[u8]) -> TestReader {
    reader
        .expect(&hex!("00 A4 08 00 02 50 15"), &hex!("90 00"))
        .expect(
            &hex!("00 20 00 81 08 31 32 33 34 FF FF FF FF"),
            response,
        )
}

fn opts(pin_cache_counter: u32) -> P15CardOpts {
    P15CardOpts {
        use_file_cache: false,
        use_pin_cache: true,
        pin_cache_counter,
    }
}

#[test]
fn test_decode_aodf_entry() {
    let mut p15 = bind(reader_with_aodf(), opts(10));
    let auth_id = "01".parse().unwrap();
    let index = p15.find_pin_by_auth_id(&auth_id).unwrap().unwrap();

    let obj = p15.object(index).unwrap();
    assert_eq!(ObjectType::AuthPin, obj.obj_type);
    assert_eq!("User", obj.label);

    let info = match &obj.payload {
        ObjectPayload::Auth(info) => info,
        other => panic!("expected an authentication object, got {:?}", other),
    };
    assert_eq!(&[0x01], info.auth_id.value());
    assert_eq!(hex!("3F 00 50 15"), info.path.value());

    let attrs = info.pin_attrs().unwrap();
    assert_eq!(
        PinFlags::CASE_SENSITIVE | PinFlags::LOCAL | PinFlags::INITIALIZED | PinFlags::NEEDS_PADDING,
        attrs.flags
    );
    assert_eq!(PinType::AsciiNumeric, attrs.pin_type);
    assert_eq!(4, attrs.min_length);
    assert_eq!(8, attrs.stored_length);
    assert_eq!(8, attrs.max_length);
    // The negatively encoded reference is normalized by +256.
    assert_eq!(0x81, attrs.reference);
    assert_eq!(0xFF, attrs.pad_char);
}

#[test]
fn test_aodf_entry_round_trip() {
    let mut p15 = bind(reader_with_aodf(), opts(10));
    let auth_id = "01".parse().unwrap();
    let index = p15.find_pin_by_auth_id(&auth_id).unwrap().unwrap();

    let encoded = encode_aodf_entry(p15.object(index).unwrap()).unwrap();
    let mut blob = encoded.as_slice();
    let reparsed = decode_aodf_entry(&p15, &mut blob).unwrap().unwrap();
    assert!(blob.is_empty());

    let original = p15.object(index).unwrap();
    assert_eq!(original.label, reparsed.label);
    assert_eq!(original.flags, reparsed.flags);
    let original_info = match &original.payload {
        ObjectPayload::Auth(info) => info,
        _ => unreachable!(),
    };
    let reparsed_info = match &reparsed.payload {
        ObjectPayload::Auth(info) => info,
        _ => panic!("re-parsed entry is not an authentication object"),
    };
    assert_eq!(original_info.auth_id, reparsed_info.auth_id);
    assert_eq!(original_info.path.value(), reparsed_info.path.value());
    let a = original_info.pin_attrs().unwrap();
    let b = reparsed_info.pin_attrs().unwrap();
    assert_eq!(a.flags, b.flags);
    assert_eq!(a.pin_type, b.pin_type);
    assert_eq!(a.min_length, b.min_length);
    assert_eq!(a.stored_length, b.stored_length);
    assert_eq!(a.max_length, b.max_length);
    assert_eq!(a.reference, b.reference);
    assert_eq!(a.pad_char, b.pad_char);
}

#[test]
fn test_verify_pin_success_and_caching() {
    let reader = expect_verify(reader_with_aodf(), &hex!("90 00"));
    let mut p15 = bind(reader, opts(10));
    let auth_id = "01".parse().unwrap();
    let index = p15.find_pin_by_auth_id(&auth_id).unwrap().unwrap();

    p15.verify_pin(index, b"1234").unwrap();
    let obj = p15.object(index).unwrap();
    assert!(obj.content.is_some());
    assert_eq!(0, obj.usage_counter);
}

#[test]
fn test_verify_pin_wrong_code_records_tries_left() {
    let reader = expect_verify(reader_with_aodf(), &hex!("63 C2"));
    let mut p15 = bind(reader, opts(10));
    let auth_id = "01".parse().unwrap();
    let index = p15.find_pin_by_auth_id(&auth_id).unwrap().unwrap();

    match p15.verify_pin(index, b"1234") {
        Err(Error::PinIncorrect { tries_left }) => assert_eq!(Some(2), tries_left),
        other => panic!("expected an incorrect PIN, got {:?}", other),
    }
    let info = match &p15.object(index).unwrap().payload {
        ObjectPayload::Auth(info) => info.clone(),
        _ => unreachable!(),
    };
    assert_eq!(Some(2), info.tries_left);
    // A failed verification leaves nothing in the cache.
    assert!(p15.object(index).unwrap().content.is_none());
}

#[test]
fn test_verify_pin_length_limits() {
    let mut p15 = bind(reader_with_aodf(), opts(10));
    let auth_id = "01".parse().unwrap();
    let index = p15.find_pin_by_auth_id(&auth_id).unwrap().unwrap();

    assert!(matches!(
        p15.verify_pin(index, b"12"),
        Err(Error::InvalidPinLength)
    ));
    assert!(matches!(
        p15.verify_pin(index, b"123456789"),
        Err(Error::InvalidPinLength)
    ));
}

#[test]
fn test_pin_cache_counter_exhaustion() {
    // Two cached uses are allowed; the third wipes the cached value.
    let reader = expect_verify(reader_with_aodf(), &hex!("90 00"));
    let reader = expect_verify(reader, &hex!("90 00"));
    let reader = expect_verify(reader, &hex!("90 00"));
    let mut p15 = bind(reader, opts(2));
    let auth_id: crate::types::Id = "01".parse().unwrap();
    let pin_index = p15.find_pin_by_auth_id(&auth_id).unwrap().unwrap();
    let protected = p15.add_object(data_object_protected_by(&auth_id));

    p15.verify_pin(pin_index, b"1234").unwrap();

    p15.pincache_revalidate(protected).unwrap();
    assert_eq!(1, p15.object(pin_index).unwrap().usage_counter);
    p15.pincache_revalidate(protected).unwrap();
    assert_eq!(2, p15.object(pin_index).unwrap().usage_counter);

    // No card traffic this time: the counter is exhausted, the content is
    // wiped, and the caller is told to authenticate afresh.
    assert!(matches!(
        p15.pincache_revalidate(protected),
        Err(Error::SecurityStatusNotSatisfied)
    ));
    assert!(p15.object(pin_index).unwrap().content.is_none());
}

#[test]
fn test_pin_cache_wipes_on_failed_revalidation() {
    let reader = expect_verify(reader_with_aodf(), &hex!("90 00"));
    let reader = expect_verify(reader, &hex!("63 C1"));
    let mut p15 = bind(reader, opts(10));
    let auth_id: crate::types::Id = "01".parse().unwrap();
    let pin_index = p15.find_pin_by_auth_id(&auth_id).unwrap().unwrap();
    let protected = p15.add_object(data_object_protected_by(&auth_id));

    p15.verify_pin(pin_index, b"1234").unwrap();
    assert!(matches!(
        p15.pincache_revalidate(protected),
        Err(Error::SecurityStatusNotSatisfied)
    ));
    assert!(p15.object(pin_index).unwrap().content.is_none());
}

#[test]
fn test_pin_cache_refused_for_user_consent_objects() {
    let reader = expect_verify(reader_with_aodf(), &hex!("90 00"));
    let mut p15 = bind(reader, opts(10));
    let auth_id: crate::types::Id = "01".parse().unwrap();
    let pin_index = p15.find_pin_by_auth_id(&auth_id).unwrap().unwrap();
    let mut consent_obj = data_object_protected_by(&auth_id);
    consent_obj.user_consent = 1;
    p15.add_object(consent_obj);

    p15.verify_pin(pin_index, b"1234").unwrap();
    assert!(p15.object(pin_index).unwrap().content.is_none());
}

#[test]
fn test_pin_cache_disabled() {
    let reader = expect_verify(reader_with_aodf(), &hex!("90 00"));
    let mut p15 = bind(
        reader,
        P15CardOpts {
            use_file_cache: false,
            use_pin_cache: false,
            pin_cache_counter: 10,
        },
    );
    let auth_id: crate::types::Id = "01".parse().unwrap();
    let pin_index = p15.find_pin_by_auth_id(&auth_id).unwrap().unwrap();
    let protected = p15.add_object(data_object_protected_by(&auth_id));

    p15.verify_pin(pin_index, b"1234").unwrap();
    assert!(p15.object(pin_index).unwrap().content.is_none());
    assert!(matches!(
        p15.pincache_revalidate(protected),
        Err(Error::SecurityStatusNotSatisfied)
    ));
}

#[test]
fn test_pincache_clear() {
    let reader = expect_verify(reader_with_aodf(), &hex!("90 00"));
    let mut p15 = bind(reader, opts(10));
    let auth_id: crate::types::Id = "01".parse().unwrap();
    let pin_index = p15.find_pin_by_auth_id(&auth_id).unwrap().unwrap();

    p15.verify_pin(pin_index, b"1234").unwrap();
    assert!(p15.object(pin_index).unwrap().content.is_some());
    p15.pincache_clear();
    assert!(p15.object(pin_index).unwrap().content.is_none());
}

#[test]
fn test_change_pin() {
    let reader = reader_with_aodf()
        .expect(&hex!("00 A4 08 00 02 50 15"), &hex!("90 00"))
        .expect(
            &hex!("00 24 00 81 10 31 32 33 34 FF FF FF FF 35 36 37 38 FF FF FF FF"),
            &hex!("90 00"),
        );
    let mut p15 = bind(reader, opts(10));
    let auth_id = "01".parse().unwrap();
    let index = p15.find_pin_by_auth_id(&auth_id).unwrap().unwrap();

    p15.change_pin(index, b"1234", b"5678").unwrap();
    // The new PIN takes the cache slot.
    assert_eq!(
        b"5678",
        p15.object(index).unwrap().content.as_ref().unwrap().as_slice()
    );
}

#[test]
fn test_unblock_pin_falls_back_to_pin_attributes() {
    let reader = reader_with_aodf()
        .expect(&hex!("00 A4 08 00 02 50 15"), &hex!("90 00"))
        .expect(
            &hex!("00 2C 00 81 10 39 39 39 39 FF FF FF FF 35 36 37 38 FF FF FF FF"),
            &hex!("90 00"),
        );
    let mut p15 = bind(reader, opts(10));
    let auth_id = "01".parse().unwrap();
    let index = p15.find_pin_by_auth_id(&auth_id).unwrap().unwrap();

    p15.unblock_pin(index, b"9999", b"5678").unwrap();
}

#[test]
fn test_pinpad_reader_skips_length_checks_and_caching() {
    let mut aodf_response = AODF_ENTRY.to_vec();
    aodf_response.extend_from_slice(&hex!("90 00"));
    let reader = reader_for_bind(&ODF_WITH_AODF)
        .expect(
            &hex!("00 A4 08 00 06 50 15 44 01"),
            &hex!("6F 07 80 02 00 35 82 01 01 90 00"),
        )
        .expect(&hex!("00 B0 00 00 35"), &aodf_response)
        .expect(&hex!("00 A4 08 00 02 50 15"), &hex!("90 00"))
        .expect(
            &hex!("00 20 00 81 08 31 32 FF FF FF FF FF FF"),
            &hex!("90 00"),
        )
        .with_capabilities(ReaderCapabilities::PIN_PAD);
    let mut p15 = bind(reader, opts(10));
    let auth_id = "01".parse().unwrap();
    let index = p15.find_pin_by_auth_id(&auth_id).unwrap().unwrap();

    // Too short for the policy, but the PIN pad capability suspends length
    // validation; and a PIN pad reader never caches.
    p15.verify_pin(index, b"12").unwrap();
    assert!(p15.object(index).unwrap().content.is_none());
}

#[test]
fn test_encode_pin_ascii_padding() {
    let attrs = PinAttributes {
        flags: PinFlags::NEEDS_PADDING,
        pin_type: PinType::AsciiNumeric,
        min_length: 4,
        stored_length: 8,
        max_length: 8,
        reference: 1,
        pad_char: 0xFF,
    };
    let encoded = encode_pin(b"1234", &attrs).unwrap();
    assert_eq!(hex!("31 32 33 34 FF FF FF FF"), encoded.as_slice());
}

#[test]
fn test_encode_pin_bcd() {
    let attrs = PinAttributes {
        flags: PinFlags::NEEDS_PADDING,
        pin_type: PinType::Bcd,
        min_length: 4,
        stored_length: 6,
        max_length: 6,
        reference: 1,
        pad_char: 0xFF,
    };
    // Digits pack two to a byte; the stored length counts digits, so the
    // padded buffer is three bytes.
    let encoded = encode_pin(b"1234", &attrs).unwrap();
    assert_eq!(hex!("12 34 FF"), encoded.as_slice());

    let odd = encode_pin(b"123", &attrs).unwrap();
    assert_eq!(hex!("12 3F FF"), odd.as_slice());
}

#[test]
fn test_encode_pin_bcd_rejects_non_digits() {
    let attrs = PinAttributes {
        pin_type: PinType::Bcd,
        ..Default::default()
    };
    assert!(encode_pin(b"12a4", &attrs).is_err());
}

#[test]
fn test_validate_pin_rejects_hostile_stored_length() {
    let mut p15 = bind(reader_with_aodf(), opts(10));
    let auth_id = "01".parse().unwrap();
    let index = p15.find_pin_by_auth_id(&auth_id).unwrap().unwrap();
    if let Some(obj) = p15.object_mut(index) {
        if let ObjectPayload::Auth(info) = &mut obj.payload {
            if let AuthData::Pin(attrs) = &mut info.data {
                attrs.stored_length = 64;
            }
        }
    }
    assert!(matches!(
        p15.verify_pin(index, b"1234"),
        Err(Error::BufferTooSmall)
    ));
}
