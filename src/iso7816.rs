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

//! The ISO/IEC 7816-4 command set. Every function here is a thin builder
//! over the APDU layer; they form the default implementations of the card
//! driver interface.

use crate::apdu::{Apdu, ApduCase};
use crate::asn1;
use crate::card::Card;
use crate::error::*;
use crate::file::{AccessMethod, File, FileType};
use crate::types::{Path, PathKind};
use crate::util;
use log::{debug, warn};
use zeroize::Zeroize;

const INS_SELECT_FILE: u8 = 0xA4;
const INS_READ_BINARY: u8 = 0xB0;
const INS_READ_RECORD: u8 = 0xB2;
const INS_VERIFY: u8 = 0x20;
const INS_MANAGE_SECURITY_ENV: u8 = 0x22;
const INS_CHANGE_REFERENCE_DATA: u8 = 0x24;
const INS_PERFORM_SECURITY_OP: u8 = 0x2A;
const INS_RESET_RETRY_COUNTER: u8 = 0x2C;
const INS_GET_CHALLENGE: u8 = 0x84;
const INS_WRITE_BINARY: u8 = 0xD0;
const INS_WRITE_RECORD: u8 = 0xD2;
const INS_UPDATE_BINARY: u8 = 0xD6;
const INS_UPDATE_RECORD: u8 = 0xDC;
const INS_CREATE_FILE: u8 = 0xE0;
const INS_APPEND_RECORD: u8 = 0xE2;
const INS_DELETE_FILE: u8 = 0xE4;

/// Select a file. P1 encodes the selection mode from the path kind: 0 for a
/// short file identifier (or the bare master file), 4 for a DF name, 8 for
/// an absolute path with the leading 3F00 stripped. With `want_fci` the
/// response FCI template is parsed into a `File`; without it only the status
/// is checked and no response is requested.
pub fn select_file(card: &mut Card, path: &Path, want_fci: bool) -> Result<Option<File>> {
    let mut apdu = Apdu::new(ApduCase::Case4Short, INS_SELECT_FILE, 0, 0);
    let mut value: &[u8] = path.value();

    match path.kind() {
        PathKind::FileId => {
            apdu.p1 = 0;
            if value.len() != 2 {
                return Err(Error::InvalidArguments(format!(
                    "file identifier of {} bytes",
                    value.len()
                )));
            }
        }
        PathKind::DfName => apdu.p1 = 4,
        PathKind::Path => {
            apdu.p1 = 8;
            if value.starts_with(&[0x3F, 0x00]) {
                if value.len() == 2 {
                    // Only the master file was asked for.
                    apdu.p1 = 0;
                } else {
                    value = &value[2..];
                }
            }
        }
    }

    apdu.data = value.to_vec();
    if want_fci {
        apdu.le = 256;
    } else {
        apdu.case = ApduCase::Case3Short;
    }

    let (resp, sw) = card.transmit(&apdu)?;
    if !want_fci {
        sw.check()?;
        return Ok(None);
    }
    sw.check()?;

    match resp.first() {
        Some(0x6F) => {
            let mut file = File::new();
            file.path = path.clone();
            if resp.len() >= 2 && resp[1] as usize <= resp.len() - 2 {
                parse_fci(&mut file, &resp[2..2 + resp[1] as usize]);
            }
            Ok(Some(file))
        }
        // Proprietary FCI codings are not understood here.
        _ => Err(Error::UnknownReply(sw.value())),
    }
}

/// Walk the TLVs of a File Control Information template into `file`.
/// Unrecognized tags are ignored.
pub fn parse_fci(file: &mut File, fci: &[u8]) {
    debug!("processing FCI bytes");
    if let Some(tag) = asn1::find_tag(fci, 0x83) {
        if tag.len() == 2 {
            file.id = ((tag[0] as u16) << 8) | tag[1] as u16;
            debug!("  file identifier: {:#06x}", file.id);
        }
    }
    let size_tag = match asn1::find_tag(fci, 0x81) {
        Some(tag) if tag.len() >= 2 => Some(tag),
        _ => asn1::find_tag(fci, 0x80),
    };
    if let Some(tag) = size_tag {
        if tag.len() >= 2 {
            file.size = ((tag[0] as usize) << 8) | tag[1] as usize;
            debug!("  bytes in file: {}", file.size);
        }
    }
    if let Some(tag) = asn1::find_tag(fci, 0x82) {
        if !tag.is_empty() {
            let byte = tag[0];
            file.shareable = byte & 0x40 != 0;
            file.ef_structure = byte & 0x07;
            file.file_type = match (byte >> 3) & 0x07 {
                0 => Some(FileType::WorkingEf),
                1 => Some(FileType::InternalEf),
                7 => Some(FileType::Df),
                _ => None,
            };
            debug!("  type: {:?}, EF structure: {}", file.file_type, file.ef_structure);
        }
    }
    if let Some(tag) = asn1::find_tag(fci, 0x84) {
        if !tag.is_empty() && tag.len() <= 16 {
            file.name = tag.to_vec();
            debug!("  file name: {}", util::bin_to_hex(tag, None));
        }
    }
    file.prop_attr.clear();
    if let Some(tag) = asn1::find_tag(fci, 0x85) {
        file.prop_attr = tag.to_vec();
    }
    if let Some(tag) = asn1::find_tag(fci, 0xA5) {
        file.prop_attr = tag.to_vec();
    }
    if let Some(tag) = asn1::find_tag(fci, 0x86) {
        file.sec_attr = tag.to_vec();
    }
}

/// Build the FCI template used by CREATE FILE.
pub fn construct_fci(file: &File) -> Result<Vec<u8>> {
    let mut inner: Vec<u8> = Vec::new();
    asn1::put_tag(0x81, &util::ushort2bebytes(file.size as u16), &mut inner);

    let mut descriptor = if file.shareable { 0x40_u8 } else { 0 };
    match file.file_type {
        Some(FileType::WorkingEf) => {}
        Some(FileType::InternalEf) => descriptor |= 0x08,
        Some(FileType::Df) => descriptor |= 0x38,
        None => {
            return Err(Error::NotSupported(
                "cannot construct an FCI without a file type".to_string(),
            ))
        }
    }
    descriptor |= file.ef_structure & 0x07;
    asn1::put_tag(0x82, &[descriptor], &mut inner);

    asn1::put_tag(0x83, &util::ushort2bebytes(file.id), &mut inner);
    if !file.prop_attr.is_empty() {
        asn1::put_tag(0x85, &file.prop_attr, &mut inner);
    }
    if !file.sec_attr.is_empty() {
        asn1::put_tag(0x86, &file.sec_attr, &mut inner);
    }

    let mut out: Vec<u8> = Vec::new();
    asn1::put_tag(0x6F, &inner, &mut out);
    Ok(out)
}

/// Read up to `count` bytes from the selected transparent EF. A short read
/// is not an error; the caller sees however many bytes the card returned.
pub fn read_binary(card: &mut Card, offset: u16, count: usize) -> Result<Vec<u8>> {
    if count == 0 {
        return Ok(Vec::new());
    }
    if count > 256 {
        return Err(Error::InvalidArguments(format!(
            "read of {} bytes must be chunked",
            count
        )));
    }
    let mut apdu = Apdu::new(
        ApduCase::Case2Short,
        INS_READ_BINARY,
        ((offset >> 8) & 0x7F) as u8,
        (offset & 0xFF) as u8,
    );
    apdu.le = count;

    let (resp, sw) = card.transmit(&apdu)?;
    if resp.is_empty() {
        sw.check()?;
    }
    Ok(resp)
}

fn record_p2(ef_id: u8, by_rec_nr: bool) -> u8 {
    let mut p2 = (ef_id & 0x1F) << 3;
    if by_rec_nr {
        p2 |= 0x04;
    }
    p2
}

/// Read one record from the selected record-structured EF. `ef_id` is a
/// short EF identifier carried in P2 (zero for the current EF); with
/// `by_rec_nr` the record is addressed by number rather than identifier.
pub fn read_record(
    card: &mut Card,
    rec_nr: u8,
    count: usize,
    ef_id: u8,
    by_rec_nr: bool,
) -> Result<Vec<u8>> {
    if count == 0 || count > 256 {
        return Err(Error::InvalidArguments(format!(
            "record read of {} bytes",
            count
        )));
    }
    let mut apdu = Apdu::new(ApduCase::Case2Short, INS_READ_RECORD, rec_nr, 0);
    apdu.p2 = record_p2(ef_id, by_rec_nr);
    apdu.le = count;

    let (resp, sw) = card.transmit(&apdu)?;
    if resp.is_empty() {
        sw.check()?;
    }
    Ok(resp)
}

fn record_write(
    card: &mut Card,
    ins: u8,
    rec_nr: u8,
    data: &[u8],
    ef_id: u8,
    by_rec_nr: bool,
) -> Result<usize> {
    if data.is_empty() || data.len() > 255 {
        return Err(Error::InvalidArguments(format!(
            "record write of {} bytes",
            data.len()
        )));
    }
    let mut apdu = Apdu::new(ApduCase::Case3Short, ins, rec_nr, 0);
    apdu.p2 = record_p2(ef_id, by_rec_nr);
    apdu.data = data.to_vec();

    let (_, sw) = card.transmit(&apdu)?;
    sw.check()?;
    Ok(data.len())
}

pub fn write_record(
    card: &mut Card,
    rec_nr: u8,
    data: &[u8],
    ef_id: u8,
    by_rec_nr: bool,
) -> Result<usize> {
    record_write(card, INS_WRITE_RECORD, rec_nr, data, ef_id, by_rec_nr)
}

pub fn append_record(card: &mut Card, data: &[u8], ef_id: u8) -> Result<usize> {
    record_write(card, INS_APPEND_RECORD, 0, data, ef_id, false)
}

pub fn update_record(
    card: &mut Card,
    rec_nr: u8,
    data: &[u8],
    ef_id: u8,
    by_rec_nr: bool,
) -> Result<usize> {
    record_write(card, INS_UPDATE_RECORD, rec_nr, data, ef_id, by_rec_nr)
}

fn binary_write(card: &mut Card, ins: u8, offset: u16, data: &[u8]) -> Result<usize> {
    if data.len() > card.chop_size() {
        return Err(Error::CmdTooLong);
    }
    let mut apdu = Apdu::new(
        ApduCase::Case3Short,
        ins,
        ((offset >> 8) & 0x7F) as u8,
        (offset & 0xFF) as u8,
    );
    apdu.data = data.to_vec();

    let (_, sw) = card.transmit(&apdu)?;
    sw.check()?;
    Ok(data.len())
}

pub fn write_binary(card: &mut Card, offset: u16, data: &[u8]) -> Result<usize> {
    binary_write(card, INS_WRITE_BINARY, offset, data)
}

pub fn update_binary(card: &mut Card, offset: u16, data: &[u8]) -> Result<usize> {
    binary_write(card, INS_UPDATE_BINARY, offset, data)
}

/// VERIFY: present a PIN (or other reference data) to the card. A 63xx
/// status is reported as an incorrect PIN, with the retry counter extracted
/// when the card provides one. The transmit buffers are scrubbed.
pub fn verify(card: &mut Card, method: AccessMethod, reference: u8, pin: &[u8]) -> Result<()> {
    if method != AccessMethod::Chv {
        return Err(Error::InvalidArguments(format!(
            "verification method {:?} is not supported",
            method
        )));
    }
    if pin.is_empty() || pin.len() > 255 {
        return Err(Error::InvalidArguments(format!(
            "reference data of {} bytes",
            pin.len()
        )));
    }
    let mut apdu = Apdu::new(ApduCase::Case3Short, INS_VERIFY, 0, reference);
    apdu.data = pin.to_vec();

    let result = card.transmit(&apdu);
    apdu.data.zeroize();
    let (_, sw) = result?;

    if sw.sw1 == 0x63 {
        return Err(Error::PinIncorrect {
            tries_left: if sw.sw2 & 0xF0 == 0xC0 {
                Some(sw.sw2 & 0x0F)
            } else {
                None
            },
        });
    }
    sw.check()
}

/// CHANGE REFERENCE DATA: present the old PIN and the new one in a single
/// command. When the old PIN is absent (it was verified beforehand, or the
/// card exchanges it implicitly) P1 switches to 1.
pub fn change_reference_data(
    card: &mut Card,
    method: AccessMethod,
    reference: u8,
    old: &[u8],
    new: &[u8],
) -> Result<()> {
    if method != AccessMethod::Chv {
        return Err(Error::InvalidArguments(format!(
            "verification method {:?} is not supported",
            method
        )));
    }
    if old.len() + new.len() > 255 || new.is_empty() {
        return Err(Error::InvalidArguments(format!(
            "reference data of {} bytes",
            old.len() + new.len()
        )));
    }
    let p1 = if old.is_empty() { 1 } else { 0 };
    let mut apdu = Apdu::new(ApduCase::Case3Short, INS_CHANGE_REFERENCE_DATA, p1, reference);
    apdu.data = [old, new].concat();

    let result = card.transmit(&apdu);
    apdu.data.zeroize();
    let (_, sw) = result?;

    if sw.sw1 == 0x63 && sw.sw2 & 0xF0 == 0xC0 {
        return Err(Error::PinIncorrect {
            tries_left: Some(sw.sw2 & 0x0F),
        });
    }
    sw.check()
}

/// RESET RETRY COUNTER: unblock a PIN with its PUK, optionally setting a new
/// PIN in the same command. P1 encodes which of the two halves are present.
pub fn reset_retry_counter(
    card: &mut Card,
    method: AccessMethod,
    reference: u8,
    puk: &[u8],
    new: &[u8],
) -> Result<()> {
    if method != AccessMethod::Chv {
        return Err(Error::InvalidArguments(format!(
            "verification method {:?} is not supported",
            method
        )));
    }
    if puk.len() + new.len() > 255 {
        return Err(Error::InvalidArguments(format!(
            "reference data of {} bytes",
            puk.len() + new.len()
        )));
    }
    let p1 = match (puk.is_empty(), new.is_empty()) {
        (false, false) => 0,
        (false, true) => 1,
        (true, false) => 2,
        (true, true) => 3,
    };
    if p1 == 3 {
        // Nothing to send; the counter is reset without any reference data.
        let apdu = Apdu::new(ApduCase::Case1, INS_RESET_RETRY_COUNTER, p1, reference);
        let (_, sw) = card.transmit(&apdu)?;
        return sw.check();
    }

    let mut apdu = Apdu::new(ApduCase::Case3Short, INS_RESET_RETRY_COUNTER, p1, reference);
    apdu.data = [puk, new].concat();

    let result = card.transmit(&apdu);
    apdu.data.zeroize();
    let (_, sw) = result?;
    sw.check()
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SecurityOperation {
    Sign,
    Decipher,
}

/// The parameters MANAGE SECURITY ENVIRONMENT installs before a PERFORM
/// SECURITY OPERATION command.
#[derive(Clone, Debug)]
pub struct SecurityEnv {
    pub operation: SecurityOperation,
    pub algorithm_ref: Option<u32>,
    pub file_ref: Option<Vec<u8>>,
    pub key_ref: Option<Vec<u8>>,
    /// Key references name asymmetric keys unless this is set.
    pub key_ref_symmetric: bool,
}

impl SecurityEnv {
    pub fn new(operation: SecurityOperation) -> Self {
        SecurityEnv {
            operation,
            algorithm_ref: None,
            file_ref: None,
            key_ref: None,
            key_ref_symmetric: false,
        }
    }
}

/// MANAGE SECURITY ENVIRONMENT: install the crypto parameters for the
/// upcoming operation. When a stored security environment number is given,
/// a second command restoring that environment follows, and both commands
/// are issued under one card lock.
pub fn set_security_env(card: &mut Card, env: &SecurityEnv, se_num: Option<u8>) -> Result<()> {
    let mut apdu = Apdu::new(ApduCase::Case3Short, INS_MANAGE_SECURITY_ENV, 0, 0);
    match env.operation {
        SecurityOperation::Decipher => {
            apdu.p1 = 0x41;
            apdu.p2 = 0xB8;
        }
        SecurityOperation::Sign => {
            apdu.p1 = 0x81;
            apdu.p2 = 0xB6;
        }
    }

    let mut data: Vec<u8> = Vec::new();
    if let Some(algorithm_ref) = env.algorithm_ref {
        asn1::put_tag(0x80, &[(algorithm_ref & 0xFF) as u8], &mut data);
    }
    if let Some(file_ref) = &env.file_ref {
        asn1::put_tag(0x81, file_ref, &mut data);
    }
    if let Some(key_ref) = &env.key_ref {
        let tag = if env.key_ref_symmetric { 0x84 } else { 0x83 };
        asn1::put_tag(tag, key_ref, &mut data);
    }
    apdu.data = data;

    if se_num.is_some() {
        card.lock()?;
    }
    let result = set_security_env_inner(card, &apdu, se_num);
    if se_num.is_some() {
        if let Err(e) = card.unlock() {
            warn!("failed to release card lock: {}", e);
        }
    }
    result
}

fn set_security_env_inner(card: &mut Card, apdu: &Apdu, se_num: Option<u8>) -> Result<()> {
    if !apdu.data.is_empty() {
        let (_, sw) = card.transmit(apdu)?;
        sw.check()?;
    }
    if let Some(n) = se_num {
        let set = Apdu::new(ApduCase::Case1, INS_MANAGE_SECURITY_ENV, 0xF2, n);
        let (_, sw) = card.transmit(&set)?;
        sw.check()?;
    }
    Ok(())
}

/// Restore a stored security environment.
pub fn restore_security_env(card: &mut Card, se_num: u8) -> Result<()> {
    let apdu = Apdu::new(ApduCase::Case1, INS_MANAGE_SECURITY_ENV, 0xF3, se_num);
    let (_, sw) = card.transmit(&apdu)?;
    sw.check()
}

/// PERFORM SECURITY OPERATION, compute digital signature: P1 = 0x9E (the
/// response is the signature), P2 = 0x9A (the data is the input to sign).
pub fn compute_signature(card: &mut Card, data: &[u8]) -> Result<Vec<u8>> {
    if data.is_empty() || data.len() > 255 {
        return Err(Error::InvalidArguments(format!(
            "signature input of {} bytes",
            data.len()
        )));
    }
    let mut apdu = Apdu::new(ApduCase::Case3Short, INS_PERFORM_SECURITY_OP, 0x9E, 0x9A);
    apdu.data = data.to_vec();

    let (resp, sw) = card.transmit(&apdu)?;
    sw.check()?;
    Ok(resp)
}

/// PERFORM SECURITY OPERATION, decipher: P1 = 0x80 (the response is the
/// plain value), P2 = 0x86 (the data is a padding-indicator byte followed by
/// the cryptogram).
pub fn decipher(card: &mut Card, crgram: &[u8]) -> Result<Vec<u8>> {
    if crgram.is_empty() || crgram.len() + 1 > 255 {
        return Err(Error::InvalidArguments(format!(
            "cryptogram of {} bytes",
            crgram.len()
        )));
    }
    let mut apdu = Apdu::new(ApduCase::Case3Short, INS_PERFORM_SECURITY_OP, 0x80, 0x86);
    // 0x00: no further indication about the padding.
    apdu.data = Vec::with_capacity(crgram.len() + 1);
    apdu.data.push(0x00);
    apdu.data.extend_from_slice(crgram);

    let result = card.transmit(&apdu);
    apdu.data.zeroize();
    let (resp, sw) = result?;
    sw.check()?;
    Ok(resp)
}

/// GET CHALLENGE: collect `len` random bytes from the card, 8 bytes per
/// command.
pub fn get_challenge(card: &mut Card, len: usize) -> Result<Vec<u8>> {
    let mut out: Vec<u8> = Vec::with_capacity(len);
    while out.len() < len {
        let mut apdu = Apdu::new(ApduCase::Case2Short, INS_GET_CHALLENGE, 0, 0);
        apdu.le = 8;
        let (resp, sw) = card.transmit(&apdu)?;
        if resp.len() != 8 {
            sw.check()?;
            return Err(Error::Internal(format!(
                "GET CHALLENGE returned {} bytes instead of 8",
                resp.len()
            )));
        }
        let n = 8.min(len - out.len());
        out.extend_from_slice(&resp[..n]);
    }
    Ok(out)
}

/// CREATE FILE from a constructed FCI.
pub fn create_file(card: &mut Card, file: &File) -> Result<()> {
    let mut apdu = Apdu::new(ApduCase::Case3Short, INS_CREATE_FILE, 0, 0);
    apdu.data = construct_fci(file)?;

    let (_, sw) = card.transmit(&apdu)?;
    sw.check()
}

/// DELETE FILE by short file identifier.
pub fn delete_file(card: &mut Card, path: &Path) -> Result<()> {
    if path.kind() != PathKind::FileId || path.len() != 2 {
        return Err(Error::InvalidArguments(
            "DELETE FILE requires a 2-byte file identifier".to_string(),
        ));
    }
    let mut apdu = Apdu::new(ApduCase::Case3Short, INS_DELETE_FILE, 0, 0);
    apdu.data = path.value().to_vec();

    let (_, sw) = card.transmit(&apdu)?;
    sw.check()
}
