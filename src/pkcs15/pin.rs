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
use crate::file::AccessMethod;
use crate::pkcs15::object::{Object, ObjectPayload, ObjectType};
use crate::pkcs15::{
    apply_common_attrs, decode_common_object_attrs, decode_path, encode_common_object_attrs,
    encode_path, P15Card,
};
use crate::reader::ReaderCapabilities;
use crate::types::{Id, ObjectId, Path};
use crate::util::SecretBytes;
use bitflags::bitflags;
use log::{debug, warn};
use zeroize::Zeroize;

/// The largest PIN, in characters, this library will handle.
pub const MAX_PIN_SIZE: usize = 16;

bitflags! {
    /// PinAttributes flags, as defined by PKCS#15 v1.1.
    pub struct PinFlags: u32 {
        const CASE_SENSITIVE = 0x0001;
        const LOCAL = 0x0002;
        const CHANGE_DISABLED = 0x0004;
        const UNBLOCK_DISABLED = 0x0008;
        const INITIALIZED = 0x0010;
        const NEEDS_PADDING = 0x0020;
        const UNBLOCKING_PIN = 0x0040;
        const SO_PIN = 0x0080;
        const DISABLE_ALLOW = 0x0100;
        const INTEGRITY_PROTECTED = 0x0200;
        const CONFIDENTIALITY_PROTECTED = 0x0400;
        const EXCHANGE_REF_DATA = 0x0800;
    }
}

/// How PIN characters are turned into bytes on the wire.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PinType {
    Bcd = 0,
    AsciiNumeric = 1,
    Utf8 = 2,
    HalfNibbleBcd = 3,
    Iso9564_1 = 4,
}

impl PinType {
    fn from_value(value: i64) -> Result<PinType> {
        Ok(match value {
            0 => PinType::Bcd,
            1 => PinType::AsciiNumeric,
            2 => PinType::Utf8,
            3 => PinType::HalfNibbleBcd,
            4 => PinType::Iso9564_1,
            _ => {
                return Err(Error::InvalidArguments(format!(
                    "unknown PIN type {}",
                    value
                )))
            }
        })
    }
}

#[derive(Clone, Debug)]
pub struct PinAttributes {
    pub flags: PinFlags,
    pub pin_type: PinType,
    pub min_length: usize,
    pub stored_length: usize,
    pub max_length: usize,
    /// The reference byte presented in VERIFY and friends. Kept signed
    /// because some personalizations encode it negatively; decoding
    /// normalizes those by adding 256.
    pub reference: i32,
    pub pad_char: u8,
}

impl Default for PinAttributes {
    fn default() -> Self {
        PinAttributes {
            flags: PinFlags::empty(),
            pin_type: PinType::AsciiNumeric,
            min_length: 0,
            stored_length: 0,
            max_length: 0,
            reference: 0,
            pad_char: 0,
        }
    }
}

/// The type-specific half of an authentication object.
#[derive(Clone, Debug)]
pub enum AuthData {
    Pin(PinAttributes),
    Biometric {
        flags: u32,
        template_id: ObjectId,
    },
    AuthKey {
        derived: bool,
        key_id: Id,
    },
}

#[derive(Clone, Debug)]
pub struct AuthInfo {
    /// This authentication object's own identifier; objects protected by it
    /// carry this value as their `auth_id`.
    pub auth_id: Id,
    /// Where the reference data lives; selected before presenting the PIN.
    /// Optional in the encoding.
    pub path: Path,
    pub auth_method: AccessMethod,
    pub tries_left: Option<u8>,
    pub data: AuthData,
}

impl AuthInfo {
    pub fn pin_attrs(&self) -> Option<&PinAttributes> {
        match &self.data {
            AuthData::Pin(attrs) => Some(attrs),
            _ => None,
        }
    }
}

/// Decode one AODF entry from the front of `blob`, advancing it past the
/// entry. Biometric and auth-key entries are recognized but skipped; a PIN
/// entry yields an object after normalization:
/// - a negative PIN reference is adjusted by +256,
/// - the authentication method is CHV,
/// - a local PIN with no path inherits the application's,
/// - a missing maximum length is derived from the card or the stored length.
pub fn decode_aodf_entry(p15: &P15Card, blob: &mut &[u8]) -> Result<Option<Object>> {
    let (tag, content, rest) = asn1::read_tlv(blob)?;
    *blob = rest;
    match tag {
        asn1::TAG_SEQUENCE => {}
        0xA0 | 0xA1 => {
            warn!("skipping non-PIN authentication object (tag {:#04x})", tag);
            return Ok(None);
        }
        _ => {
            return Err(Error::InvalidArguments(format!(
                "unexpected AODF entry tag {:#04x}",
                tag
            )))
        }
    }

    let mut parser = asn1::Parser::new(content);
    let common = decode_common_object_attrs(parser.take(asn1::TAG_SEQUENCE)?)?;

    let mut class_parser = asn1::Parser::new(parser.take(asn1::TAG_SEQUENCE)?);
    let auth_id = Id::new(class_parser.take(asn1::TAG_OCTET_STRING)?)?;

    // Subclass attributes carry nothing we use.
    parser.take_optional(asn1::context(0, true))?;

    let type_attrs = parser.take(asn1::context(1, true))?;
    let mut type_parser = asn1::Parser::new(type_attrs);
    let mut pin_parser = asn1::Parser::new(type_parser.take(asn1::TAG_SEQUENCE)?);

    let mut attrs = PinAttributes::default();
    attrs.flags = PinFlags::from_bits_truncate(asn1::decode_bit_field(
        pin_parser.take(asn1::TAG_BIT_STRING)?,
    )?);
    attrs.pin_type =
        PinType::from_value(asn1::decode_integer(pin_parser.take(asn1::TAG_ENUMERATED)?)?)?;
    attrs.min_length = asn1::decode_integer(pin_parser.take(asn1::TAG_INTEGER)?)?.max(0) as usize;
    attrs.stored_length =
        asn1::decode_integer(pin_parser.take(asn1::TAG_INTEGER)?)?.max(0) as usize;
    if let Some(value) = pin_parser.take_optional(asn1::TAG_INTEGER)? {
        attrs.max_length = asn1::decode_integer(value)?.max(0) as usize;
    }
    if let Some(value) = pin_parser.take_optional(asn1::context(0, false))? {
        attrs.reference = asn1::decode_integer(value)? as i32;
    }
    if let Some(value) = pin_parser.take_optional(asn1::TAG_OCTET_STRING)? {
        if !value.is_empty() {
            attrs.pad_char = value[0];
        }
    }
    // lastPinChange is not tracked.
    pin_parser.take_optional(asn1::TAG_GENERALIZED_TIME)?;
    let mut path = match pin_parser.take_optional(asn1::TAG_SEQUENCE)? {
        Some(value) => decode_path(value)?,
        None => Path::empty(),
    };

    // Some personalizations encode the reference as a negative INTEGER.
    if attrs.reference < 0 {
        attrs.reference += 256;
    }

    if attrs.max_length == 0 {
        attrs.max_length = if p15.card().max_pin_len != 0 {
            p15.card().max_pin_len
        } else if attrs.stored_length != 0 {
            match attrs.pin_type {
                PinType::Bcd => 2 * attrs.stored_length,
                _ => attrs.stored_length,
            }
        } else {
            8
        };
    }

    if attrs.flags.contains(PinFlags::LOCAL) && path.is_empty() {
        // A local PIN's reference data lives under the application; derive
        // the path from the application context when the entry omits it.
        if !p15.app.aid.is_empty() {
            path.set_aid(&p15.app.aid)?;
        } else if let Some(file_app) = &p15.file_app {
            if !file_app.path.is_empty() {
                path = file_app.path.clone();
            }
        }
    }

    debug!(
        "decoded PIN (ref {:#04x}, path {})",
        attrs.reference, path
    );

    let info = AuthInfo {
        auth_id,
        path,
        auth_method: AccessMethod::Chv,
        tries_left: None,
        data: AuthData::Pin(attrs),
    };
    let mut obj = Object::new(ObjectType::AuthPin, ObjectPayload::Auth(info));
    apply_common_attrs(&mut obj, common);
    Ok(Some(obj))
}

/// Encode an authentication object as an AODF entry. Only PIN objects have
/// an encoding here.
pub fn encode_aodf_entry(obj: &Object) -> Result<Vec<u8>> {
    let info = match &obj.payload {
        ObjectPayload::Auth(info) => info,
        _ => {
            return Err(Error::InvalidArguments(
                "not an authentication object".to_string(),
            ))
        }
    };
    let attrs = match &info.data {
        AuthData::Pin(attrs) => attrs,
        _ => {
            return Err(Error::NotSupported(
                "encoding non-PIN authentication objects".to_string(),
            ))
        }
    };

    let mut entry: Vec<u8> = Vec::new();
    encode_common_object_attrs(obj, &mut entry);

    let mut class_inner: Vec<u8> = Vec::new();
    asn1::put_tag(asn1::TAG_OCTET_STRING, info.auth_id.value(), &mut class_inner);
    asn1::put_tag(asn1::TAG_SEQUENCE, &class_inner, &mut entry);

    let mut pin_inner: Vec<u8> = Vec::new();
    asn1::put_tag(
        asn1::TAG_BIT_STRING,
        &asn1::encode_bit_field(attrs.flags.bits()),
        &mut pin_inner,
    );
    asn1::put_tag(
        asn1::TAG_ENUMERATED,
        &asn1::encode_integer(attrs.pin_type as i64),
        &mut pin_inner,
    );
    asn1::put_tag(
        asn1::TAG_INTEGER,
        &asn1::encode_integer(attrs.min_length as i64),
        &mut pin_inner,
    );
    asn1::put_tag(
        asn1::TAG_INTEGER,
        &asn1::encode_integer(attrs.stored_length as i64),
        &mut pin_inner,
    );
    if attrs.max_length > 0 {
        asn1::put_tag(
            asn1::TAG_INTEGER,
            &asn1::encode_integer(attrs.max_length as i64),
            &mut pin_inner,
        );
    }
    if attrs.reference >= 0 {
        asn1::put_tag(
            asn1::context(0, false),
            &asn1::encode_integer(attrs.reference as i64),
            &mut pin_inner,
        );
    }
    asn1::put_tag(asn1::TAG_OCTET_STRING, &[attrs.pad_char], &mut pin_inner);
    if !info.path.is_empty() {
        encode_path(&info.path, &mut pin_inner);
    }

    let mut pin_seq: Vec<u8> = Vec::new();
    asn1::put_tag(asn1::TAG_SEQUENCE, &pin_inner, &mut pin_seq);
    asn1::put_tag(asn1::context(1, true), &pin_seq, &mut entry);

    let mut out: Vec<u8> = Vec::new();
    asn1::put_tag(asn1::TAG_SEQUENCE, &entry, &mut out);
    Ok(out)
}

/// Encode a PIN for transmission, per its attributes: BCD variants pack the
/// digits, everything else sends the characters as given. With the padding
/// flag set, the buffer is extended to the stored length with the pad
/// character.
pub(crate) fn encode_pin(pin: &[u8], attrs: &PinAttributes) -> Result<SecretBytes> {
    let mut buf: Vec<u8> = Vec::with_capacity(MAX_PIN_SIZE);
    match attrs.pin_type {
        PinType::Bcd => {
            for (i, &b) in pin.iter().enumerate() {
                let digit = (b as char).to_digit(10).ok_or_else(|| {
                    Error::InvalidArguments("a BCD PIN must be numeric".to_string())
                })? as u8;
                if i % 2 == 0 {
                    buf.push(digit << 4);
                } else {
                    *buf.last_mut().unwrap() |= digit;
                }
            }
            if pin.len() % 2 == 1 {
                *buf.last_mut().unwrap() |= attrs.pad_char & 0x0F;
            }
        }
        PinType::HalfNibbleBcd => {
            for &b in pin {
                let digit = (b as char).to_digit(10).ok_or_else(|| {
                    Error::InvalidArguments("a BCD PIN must be numeric".to_string())
                })? as u8;
                buf.push(0xF0 | digit);
            }
        }
        _ => buf.extend_from_slice(pin),
    }

    if attrs.flags.contains(PinFlags::NEEDS_PADDING) {
        let mut pad_length = attrs.stored_length;
        if attrs.pin_type == PinType::Bcd {
            pad_length = (pad_length + 1) / 2;
        }
        if buf.len() > pad_length && pad_length > 0 {
            return Err(Error::BufferTooSmall);
        }
        while buf.len() < pad_length {
            buf.push(attrs.pad_char);
        }
    }

    let out = SecretBytes::new(&buf);
    buf.zeroize();
    Ok(out)
}

impl P15Card {
    fn auth_info(&self, index: usize) -> Result<&AuthInfo> {
        let obj = self
            .object(index)
            .ok_or_else(|| Error::InvalidArguments(format!("no object at index {}", index)))?;
        match &obj.payload {
            ObjectPayload::Auth(info) => Ok(info),
            _ => Err(Error::InvalidArguments(
                "not an authentication object".to_string(),
            )),
        }
    }

    fn has_pin_pad(&self) -> bool {
        self.card()
            .reader_capabilities()
            .contains(ReaderCapabilities::PIN_PAD)
    }

    /// Check a candidate PIN length against the object's policy. Non-PIN
    /// authentication objects pass through; a PIN-pad reader handles length
    /// enforcement itself.
    fn validate_pin(&self, info: &AuthInfo, pin_len: usize) -> Result<()> {
        let attrs = match info.pin_attrs() {
            Some(attrs) => attrs,
            None => return Ok(()),
        };
        // A hostile card could claim an enormous stored length.
        if attrs.stored_length > MAX_PIN_SIZE {
            return Err(Error::BufferTooSmall);
        }
        if self.has_pin_pad() {
            return Ok(());
        }
        let max_length = if attrs.max_length != 0 {
            attrs.max_length
        } else {
            MAX_PIN_SIZE
        };
        if pin_len > max_length || pin_len < attrs.min_length {
            return Err(Error::InvalidPinLength);
        }
        Ok(())
    }

    fn record_tries_left(&mut self, index: usize, result: &Result<()>) {
        if let Err(Error::PinIncorrect { tries_left }) = result {
            let tries_left = *tries_left;
            if let Some(obj) = self.object_mut(index) {
                if let ObjectPayload::Auth(info) = &mut obj.payload {
                    info.tries_left = tries_left;
                }
            }
        }
    }

    /// Verify a PIN against the card. On success the PIN is offered to the
    /// pin cache for later transparent re-authentication.
    pub fn verify_pin(&mut self, index: usize, pin: &[u8]) -> Result<()> {
        self.verify_pin_internal(index, pin, true)
    }

    fn verify_pin_internal(&mut self, index: usize, pin: &[u8], cache: bool) -> Result<()> {
        let info = self.auth_info(index)?.clone();
        let attrs = match info.pin_attrs() {
            Some(attrs) => attrs.clone(),
            None => {
                return Err(Error::NotSupported(
                    "verification of non-PIN authentication objects".to_string(),
                ))
            }
        };
        if pin.is_empty() && self.has_pin_pad() {
            return Err(Error::NotSupported(
                "PIN pad entry is the reader backend's concern".to_string(),
            ));
        }
        self.validate_pin(&info, pin.len())?;

        self.card_mut().lock()?;
        let result = (|| {
            if !info.path.is_empty() || !info.path.aid().is_empty() {
                self.select_path(&info.path, false)?;
            }
            let encoded = encode_pin(pin, &attrs)?;
            self.card_mut()
                .verify(info.auth_method, attrs.reference as u8, encoded.as_slice())
        })();
        if let Err(e) = self.card_mut().unlock() {
            warn!("failed to release card lock: {}", e);
        }

        self.record_tries_left(index, &result);
        result?;
        if cache {
            self.pincache_add(index, pin);
        }
        Ok(())
    }

    /// Change a PIN, verifying the old value in the same command.
    pub fn change_pin(&mut self, index: usize, old_pin: &[u8], new_pin: &[u8]) -> Result<()> {
        let info = self.auth_info(index)?.clone();
        let attrs = match info.pin_attrs() {
            Some(attrs) => attrs.clone(),
            None => {
                return Err(Error::NotSupported(
                    "verification of non-PIN authentication objects".to_string(),
                ))
            }
        };
        if (old_pin.is_empty() || new_pin.is_empty()) && self.has_pin_pad() {
            return Err(Error::NotSupported(
                "PIN pad entry is the reader backend's concern".to_string(),
            ));
        }
        self.validate_pin(&info, old_pin.len())?;
        self.validate_pin(&info, new_pin.len())?;

        self.card_mut().lock()?;
        let result = (|| {
            if !info.path.is_empty() || !info.path.aid().is_empty() {
                self.select_path(&info.path, false)?;
            }
            let old_encoded = encode_pin(old_pin, &attrs)?;
            let new_encoded = encode_pin(new_pin, &attrs)?;
            self.card_mut().change_reference_data(
                info.auth_method,
                attrs.reference as u8,
                old_encoded.as_slice(),
                new_encoded.as_slice(),
            )
        })();
        if let Err(e) = self.card_mut().unlock() {
            warn!("failed to release card lock: {}", e);
        }

        self.record_tries_left(index, &result);
        result?;
        self.pincache_add(index, new_pin);
        Ok(())
    }

    /// Unblock a PIN with its PUK, setting a new PIN value. The PUK's own
    /// attributes are looked up through the PIN object's `auth_id`; when no
    /// PUK object exists the PIN's attributes stand in for it.
    pub fn unblock_pin(&mut self, index: usize, puk: &[u8], new_pin: &[u8]) -> Result<()> {
        let info = self.auth_info(index)?.clone();
        let attrs = match info.pin_attrs() {
            Some(attrs) => attrs.clone(),
            None => {
                return Err(Error::NotSupported(
                    "verification of non-PIN authentication objects".to_string(),
                ))
            }
        };
        if (puk.is_empty() || new_pin.is_empty()) && self.has_pin_pad() {
            return Err(Error::NotSupported(
                "PIN pad entry is the reader backend's concern".to_string(),
            ));
        }
        self.validate_pin(&info, new_pin.len())?;

        let pin_obj_auth_id = self
            .object(index)
            .map(|obj| obj.auth_id.clone())
            .unwrap_or_default();
        let puk_info = match self.find_pin_by_auth_id(&pin_obj_auth_id)? {
            Some(puk_index) => self.auth_info(puk_index)?.clone(),
            None => {
                debug!("unable to get PUK object, using PIN object instead");
                info.clone()
            }
        };
        self.validate_pin(&puk_info, puk.len())?;
        let puk_attrs = puk_info.pin_attrs().cloned().unwrap_or_else(|| attrs.clone());

        self.card_mut().lock()?;
        let result = (|| {
            if !info.path.is_empty() || !info.path.aid().is_empty() {
                self.select_path(&info.path, false)?;
            }
            let puk_encoded = encode_pin(puk, &attrs)?;
            let new_encoded = encode_pin(new_pin, &puk_attrs)?;
            self.card_mut().reset_retry_counter(
                info.auth_method,
                attrs.reference as u8,
                puk_encoded.as_slice(),
                new_encoded.as_slice(),
            )
        })();
        if let Err(e) = self.card_mut().unlock() {
            warn!("failed to release card lock: {}", e);
        }

        self.record_tries_left(index, &result);
        result?;
        self.pincache_add(index, new_pin);
        Ok(())
    }

    // The pin cache.

    /// Offer a successfully verified PIN to the cache. Entry is refused when
    /// caching is disabled, the reader has a PIN pad, or any object
    /// protected by this PIN demands user consent.
    pub(crate) fn pincache_add(&mut self, index: usize, pin: &[u8]) {
        if !self.opts.use_pin_cache {
            debug!("PIN caching not enabled");
            return;
        }
        if self.has_pin_pad() {
            return;
        }
        let auth_id = match self.auth_info(index) {
            Ok(info) => info.auth_id.clone(),
            Err(_) => return,
        };
        let consent_required = self
            .objects()
            .any(|(_, obj)| obj.auth_id == auth_id && obj.user_consent > 0);
        if consent_required {
            debug!("caching refused (user consent)");
            return;
        }
        if let Some(obj) = self.object_mut(index) {
            obj.set_content(pin);
            obj.usage_counter = 0;
            debug!("PIN '{}' cached", obj.label);
        }
    }

    /// Transparently re-authenticate for an operation on `index` using the
    /// cached PIN of the authentication object protecting it. Every failure
    /// mode reports a missing security status so callers fall back to a
    /// fresh PIN prompt; a failed re-verification wipes the cached value
    /// immediately.
    pub fn pincache_revalidate(&mut self, index: usize) -> Result<()> {
        if !self.opts.use_pin_cache {
            return Err(Error::SecurityStatusNotSatisfied);
        }
        let (auth_id, user_consent) = match self.object(index) {
            Some(obj) => (obj.auth_id.clone(), obj.user_consent),
            None => return Err(Error::SecurityStatusNotSatisfied),
        };
        if user_consent > 0 {
            return Err(Error::SecurityStatusNotSatisfied);
        }
        if self.has_pin_pad() {
            return Err(Error::SecurityStatusNotSatisfied);
        }
        let pin_index = match self.find_pin_by_auth_id(&auth_id) {
            Ok(Some(pin_index)) => pin_index,
            _ => {
                debug!("no PIN object for auth id {}", auth_id);
                return Err(Error::SecurityStatusNotSatisfied);
            }
        };

        let counter_exhausted = match self.object(pin_index) {
            Some(obj) => obj.usage_counter >= self.opts.pin_cache_counter,
            None => return Err(Error::SecurityStatusNotSatisfied),
        };
        if counter_exhausted {
            if let Some(obj) = self.object_mut(pin_index) {
                obj.free_content();
            }
            return Err(Error::SecurityStatusNotSatisfied);
        }

        let cached = match self.object(pin_index).and_then(|obj| obj.content.clone()) {
            Some(cached) if !cached.is_empty() => cached,
            _ => return Err(Error::SecurityStatusNotSatisfied),
        };
        if let Some(obj) = self.object_mut(pin_index) {
            obj.usage_counter += 1;
        }

        if let Err(e) = self.verify_pin_internal(pin_index, cached.as_slice(), false) {
            // Make sure a wrong PIN is not presented again.
            if let Some(obj) = self.object_mut(pin_index) {
                obj.free_content();
            }
            debug!("cached PIN verification failed: {}", e);
            return Err(Error::SecurityStatusNotSatisfied);
        }
        Ok(())
    }

    /// Drop every cached PIN, scrubbing the backing memory.
    pub fn pincache_clear(&mut self) {
        let pins: Vec<usize> = self
            .objects()
            .filter(|(_, obj)| obj.obj_type == ObjectType::AuthPin)
            .map(|(index, _)| index)
            .collect();
        for index in pins {
            if let Some(obj) = self.object_mut(index) {
                obj.free_content();
            }
        }
    }
}
