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

use crate::util::*;

#[test]
fn test_hex_to_bin_with_separators() {
    assert_eq!(
        vec![0x01, 0x02, 0x0A, 0x0B],
        hex_to_bin("01:02 0A0b").unwrap()
    );
}

#[test]
fn test_hex_to_bin_plain() {
    assert_eq!(vec![0x3F, 0x00, 0x50, 0x15], hex_to_bin("3f005015").unwrap());
}

#[test]
fn test_hex_to_bin_rejects_junk() {
    assert!(hex_to_bin("zz").is_err());
    assert!(hex_to_bin("0g").is_err());
}

#[test]
fn test_hex_round_trip() {
    let cases: Vec<Vec<u8>> = vec![
        vec![],
        vec![0x00],
        vec![0xFF],
        (0..=255).collect(),
        vec![0xDE, 0xAD, 0xBE, 0xEF],
    ];
    for bytes in cases {
        assert_eq!(bytes, hex_to_bin(&bin_to_hex(&bytes, None)).unwrap());
        assert_eq!(bytes, hex_to_bin(&bin_to_hex(&bytes, Some(':'))).unwrap());
    }
}

#[test]
fn test_bin_to_hex_separator() {
    assert_eq!("3f:00:50:15", bin_to_hex(&[0x3F, 0x00, 0x50, 0x15], Some(':')));
    assert_eq!("3f005015", bin_to_hex(&[0x3F, 0x00, 0x50, 0x15], None));
}

#[test]
fn test_be_round_trip() {
    for &x in &[0_u32, 1, 0x0102_0304, 0x7FFF_FFFF, 0xFFFF_FFFF] {
        assert_eq!(x, bebytes2ulong(&ulong2bebytes(x)).unwrap());
    }
    for &x in &[0_u16, 1, 0x0102, 0xFFFF] {
        assert_eq!(x, bebytes2ushort(&ushort2bebytes(x)).unwrap());
    }
}

#[test]
fn test_be_layout() {
    assert_eq!([0x01, 0x02, 0x03, 0x04], ulong2bebytes(0x0102_0304));
    assert_eq!([0x50, 0x31], ushort2bebytes(0x5031));
    assert!(bebytes2ulong(&[0x01, 0x02]).is_err());
}

#[test]
fn test_secret_bytes_truncate() {
    let mut secret = SecretBytes::new(&[1, 2, 3, 4]);
    assert_eq!(4, secret.len());
    secret.truncate(2);
    assert_eq!(&[1, 2], secret.as_slice());
}

#[test]
fn test_secret_bytes_debug_hides_contents() {
    let secret = SecretBytes::new(&[0x31, 0x32, 0x33, 0x34]);
    let formatted = format!("{:?}", secret);
    assert!(!formatted.contains("31"));
    assert!(formatted.contains("4 bytes"));
}
