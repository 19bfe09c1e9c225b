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
use crate::pkcs15::{P15Card, P15CardOpts};
use crate::tests::pkcs15::entries::PRKDF_ENTRY;
use crate::tests::pkcs15::pin::AODF_ENTRY;
use crate::tests::pkcs15::{bind, reader_for_bind};
use crate::tests::reader::TestReader;
use crate::types::Id;
use hex_literal::hex;

/// An ODF naming a PrKDF at 4402 and an AODF at 4401.
const ODF_WITH_PRKDF_AND_AODF: [u8; 16] =
    hex!("A0 06 30 04 04 02 44 02 A8 06 30 04 04 02 44 01");

const HASH: [u8; 20] = hex!("00 01 02 03 04 05 06 07 08 09 0A 0B 0C 0D 0E 0F 10 11 12 13");

/// A reader scripted with bind plus the enumeration of both directory
/// files.
fn reader_with_key_and_pin() -> TestReader {
    let mut prkdf_response = PRKDF_ENTRY.to_vec();
    prkdf_response.extend_from_slice(&hex!("90 00"));
    let mut aodf_response = AODF_ENTRY.to_vec();
    aodf_response.extend_from_slice(&hex!("90 00"));
    reader_for_bind(&ODF_WITH_PRKDF_AND_AODF)
        .expect(
            &hex!("00 A4 08 00 06 50 15 44 02"),
            &hex!("6F 07 80 02 00 2F 82 01 01 90 00"),
        )
        .expect(&hex!("00 B0 00 00 2F"), &prkdf_response)
        .expect(
            &hex!("00 A4 08 00 06 50 15 44 01"),
            &hex!("6F 07 80 02 00 35 82 01 01 90 00"),
        )
        .expect(&hex!("00 B0 00 00 35"), &aodf_response)
}

fn find_key_and_pin(p15: &mut P15Card) -> (usize, usize) {
    let key_id: Id = "45".parse().unwrap();
    let auth_id: Id = "01".parse().unwrap();
    let key = p15.find_prkey_by_id(&key_id).unwrap().unwrap();
    let pin = p15.find_pin_by_auth_id(&auth_id).unwrap().unwrap();
    (key, pin)
}

#[test]
fn test_compute_signature() {
    let signature = [0x5A_u8; 128];
    let mut pso = hex!("00 2A 9E 9A 14").to_vec();
    pso.extend_from_slice(&HASH);
    let mut pso_response = signature.to_vec();
    pso_response.extend_from_slice(&hex!("90 00"));

    let reader = reader_with_key_and_pin()
        .expect(&hex!("00 A4 08 00 06 50 15 44 01"), &hex!("90 00"))
        .expect(&hex!("00 22 81 B6 03 83 01 01"), &hex!("90 00"))
        .expect(&pso, &pso_response);
    let mut p15 = bind(reader, P15CardOpts::default());
    let (key, _) = find_key_and_pin(&mut p15);

    let mut out = [0_u8; 200];
    let len = p15.compute_signature(key, &HASH, &mut out).unwrap();
    assert_eq!(128, len);
    assert_eq!(signature, out[..len]);
}

#[test]
fn test_compute_signature_revalidates_cached_pin() {
    let signature = [0x5A_u8; 128];
    let mut pso = hex!("00 2A 9E 9A 14").to_vec();
    pso.extend_from_slice(&HASH);
    let mut pso_response = signature.to_vec();
    pso_response.extend_from_slice(&hex!("90 00"));

    let reader = reader_with_key_and_pin()
        // A fresh verification seeds the pin cache.
        .expect(&hex!("00 A4 08 00 02 50 15"), &hex!("90 00"))
        .expect(&hex!("00 20 00 81 08 31 32 33 34 FF FF FF FF"), &hex!("90 00"))
        // The signing attempt: the card has lost the security status...
        .expect(&hex!("00 A4 08 00 06 50 15 44 01"), &hex!("90 00"))
        .expect(&hex!("00 22 81 B6 03 83 01 01"), &hex!("90 00"))
        .expect(&pso, &hex!("69 82"))
        // ...so the cached PIN is re-presented and the operation retried.
        .expect(&hex!("00 A4 08 00 02 50 15"), &hex!("90 00"))
        .expect(&hex!("00 20 00 81 08 31 32 33 34 FF FF FF FF"), &hex!("90 00"))
        .expect(&pso, &pso_response);
    let mut p15 = bind(reader, P15CardOpts::default());
    let (key, pin) = find_key_and_pin(&mut p15);

    p15.verify_pin(pin, b"1234").unwrap();

    let mut out = [0_u8; 200];
    let len = p15.compute_signature(key, &HASH, &mut out).unwrap();
    assert_eq!(128, len);
    assert_eq!(signature, out[..len]);
    assert_eq!(1, p15.object(pin).unwrap().usage_counter);
}

#[test]
fn test_compute_signature_without_cached_pin() {
    let mut pso = hex!("00 2A 9E 9A 14").to_vec();
    pso.extend_from_slice(&HASH);

    let reader = reader_with_key_and_pin()
        .expect(&hex!("00 A4 08 00 06 50 15 44 01"), &hex!("90 00"))
        .expect(&hex!("00 22 81 B6 03 83 01 01"), &hex!("90 00"))
        .expect(&pso, &hex!("69 82"));
    let mut p15 = bind(reader, P15CardOpts::default());
    let (key, _) = find_key_and_pin(&mut p15);

    // With nothing cached, the missing security status surfaces so the
    // caller can prompt for a PIN.
    let mut out = [0_u8; 200];
    assert!(matches!(
        p15.compute_signature(key, &HASH, &mut out),
        Err(Error::SecurityStatusNotSatisfied)
    ));
}

#[test]
fn test_decipher_checks_key_usage() {
    let mut p15 = bind(reader_with_key_and_pin(), P15CardOpts::default());
    let (key, _) = find_key_and_pin(&mut p15);

    // The fixture key signs; it does not decipher.
    let mut out = [0_u8; 128];
    assert!(matches!(
        p15.decipher(key, &[0x77; 16], &mut out),
        Err(Error::InvalidArguments(_))
    ));
}
