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

use crate::pkcs15::pin::AuthInfo;
use crate::types::{Id, ObjectId, Path};
use crate::util::SecretBytes;
use bitflags::bitflags;

/// The maximum label length, excluding the terminator the on-card encoding
/// carries.
pub const MAX_LABEL_SIZE: usize = 255;
/// The maximum number of access rules one object carries.
pub const MAX_ACCESS_RULES: usize = 8;

bitflags! {
    /// CommonObjectAttributes flags, plus the host-side "seen" marker used
    /// by PKCS#11 frontends.
    pub struct ObjectFlags: u32 {
        const PRIVATE = 0x0000_0001;
        const MODIFIABLE = 0x0000_0002;
        const SEEN = 0x8000_0000;
    }
}

bitflags! {
    /// Key usage bits shared by private and public key objects.
    pub struct KeyUsage: u32 {
        const ENCRYPT = 0x0001;
        const DECRYPT = 0x0002;
        const SIGN = 0x0004;
        const SIGN_RECOVER = 0x0008;
        const WRAP = 0x0010;
        const UNWRAP = 0x0020;
        const VERIFY = 0x0040;
        const VERIFY_RECOVER = 0x0080;
        const DERIVE = 0x0100;
        const NON_REPUDIATION = 0x0200;
    }
}

bitflags! {
    pub struct KeyAccessFlags: u32 {
        const SENSITIVE = 0x01;
        const EXTRACTABLE = 0x02;
        const ALWAYS_SENSITIVE = 0x04;
        const NEVER_EXTRACTABLE = 0x08;
        const LOCAL = 0x10;
    }
}

bitflags! {
    /// AccessMode bits of an object access rule.
    pub struct AccessMode: u32 {
        const READ = 0x001;
        const UPDATE = 0x002;
        const EXECUTE = 0x004;
        const DELETE = 0x008;
        const ATTRIBUTE = 0x010;
        const PSO_CDS = 0x020;
        const PSO_VERIFY = 0x040;
        const PSO_DECRYPT = 0x080;
        const PSO_ENCRYPT = 0x100;
        const INT_AUTH = 0x200;
        const EXT_AUTH = 0x400;
    }
}

bitflags! {
    /// Object class bits used by search keys. The class of a type code is
    /// `1 << (code >> 8)`.
    pub struct ObjectClass: u32 {
        const PRKEY = 0x0002;
        const PUBKEY = 0x0004;
        const CERT = 0x0010;
        const DATA = 0x0020;
        const AUTH = 0x0040;
    }
}

/// Discriminates the concrete kinds of PKCS#15 objects. The numeric values
/// group kinds into classes by their high byte.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ObjectType {
    PrKeyRsa = 0x101,
    PrKeyEc = 0x104,
    PubKeyRsa = 0x201,
    PubKeyEc = 0x204,
    CertX509 = 0x401,
    Data = 0x500,
    AuthPin = 0x601,
}

impl ObjectType {
    pub fn class(&self) -> ObjectClass {
        ObjectClass::from_bits_truncate(1 << ((*self as u32) >> 8))
    }
}

/// An access rule: which access modes require which authentication object.
#[derive(Clone, Debug, Default)]
pub struct AccessRule {
    pub mode: AccessMode,
    pub auth_id: Id,
}

impl Default for AccessMode {
    fn default() -> Self {
        AccessMode::empty()
    }
}

#[derive(Clone, Debug, Default)]
pub struct PrKeyInfo {
    pub id: Id,
    pub usage: KeyUsage,
    pub access_flags: KeyAccessFlags,
    pub native: bool,
    pub key_reference: Option<u32>,
    /// RSA modulus length in bits.
    pub modulus_length: usize,
    /// EC field length in bits.
    pub field_length: usize,
    pub path: Path,
}

impl Default for KeyUsage {
    fn default() -> Self {
        KeyUsage::empty()
    }
}

impl Default for KeyAccessFlags {
    fn default() -> Self {
        KeyAccessFlags::empty()
    }
}

#[derive(Clone, Debug, Default)]
pub struct PubKeyInfo {
    pub id: Id,
    pub usage: KeyUsage,
    pub access_flags: KeyAccessFlags,
    pub native: bool,
    pub key_reference: Option<u32>,
    pub modulus_length: usize,
    pub field_length: usize,
    pub path: Path,
}

#[derive(Clone, Debug, Default)]
pub struct CertInfo {
    /// Correlates with the id of the matching private key.
    pub id: Id,
    pub authority: bool,
    pub path: Path,
}

#[derive(Clone, Debug, Default)]
pub struct DataInfo {
    pub id: Id,
    pub app_label: String,
    pub app_oid: Option<ObjectId>,
    pub path: Path,
}

/// The type-specific half of an object.
#[derive(Clone, Debug)]
pub enum ObjectPayload {
    PrKey(PrKeyInfo),
    PubKey(PubKeyInfo),
    Cert(CertInfo),
    Data(DataInfo),
    Auth(AuthInfo),
}

impl ObjectPayload {
    /// The identifier by which lookups find this object: the key/cert/data
    /// id, or the auth id for authentication objects.
    pub fn id(&self) -> &Id {
        match self {
            ObjectPayload::PrKey(info) => &info.id,
            ObjectPayload::PubKey(info) => &info.id,
            ObjectPayload::Cert(info) => &info.id,
            ObjectPayload::Data(info) => &info.id,
            ObjectPayload::Auth(info) => &info.auth_id,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            ObjectPayload::PrKey(info) => Some(&info.path),
            ObjectPayload::PubKey(info) => Some(&info.path),
            ObjectPayload::Cert(info) => Some(&info.path),
            ObjectPayload::Data(info) => Some(&info.path),
            ObjectPayload::Auth(info) => Some(&info.path),
        }
    }

    pub fn usage(&self) -> Option<KeyUsage> {
        match self {
            ObjectPayload::PrKey(info) => Some(info.usage),
            ObjectPayload::PubKey(info) => Some(info.usage),
            _ => None,
        }
    }
}

/// One PKCS#15 object: the common attributes every directory entry carries,
/// plus its type-specific payload. Objects live in the arena owned by the
/// PKCS#15 card and are referred to by index.
#[derive(Clone, Debug)]
pub struct Object {
    pub obj_type: ObjectType,
    pub label: String,
    pub flags: ObjectFlags,
    /// The id of the authentication object protecting this one; empty when
    /// no authentication is required.
    pub auth_id: Id,
    /// How many times a cached PIN has been reused since the last fresh
    /// verification.
    pub usage_counter: u32,
    pub user_consent: u32,
    pub access_rules: Vec<AccessRule>,
    /// Cached DER of the entry; for authentication objects this doubles as
    /// the PIN cache slot, so it is kept in scrubbed memory.
    pub content: Option<SecretBytes>,
    /// Index of the directory file this object was enumerated from, if any.
    pub df: Option<usize>,
    pub payload: ObjectPayload,
}

impl Object {
    pub fn new(obj_type: ObjectType, payload: ObjectPayload) -> Self {
        Object {
            obj_type,
            label: String::new(),
            flags: ObjectFlags::empty(),
            auth_id: Id::default(),
            usage_counter: 0,
            user_consent: 0,
            access_rules: Vec::new(),
            content: None,
            df: None,
            payload,
        }
    }

    pub fn set_content(&mut self, data: &[u8]) {
        self.content = Some(SecretBytes::new(data));
    }

    /// Drop the cached content, scrubbing the backing memory.
    pub fn free_content(&mut self) {
        self.content = None;
    }
}
