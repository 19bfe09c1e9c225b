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

use crate::types::Path;

/// The number of per-file operations an access-control list is kept for.
pub const MAX_AC_OPS: usize = 12;

/// Operations an access-control condition can be attached to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FileOperation {
    Select = 0,
    Lock = 1,
    Delete = 2,
    Create = 3,
    Rehabilitate = 4,
    Invalidate = 5,
    ListFiles = 6,
    Crypto = 7,
    Read = 8,
    Update = 9,
    Write = 10,
    Erase = 11,
}

/// How a guarded operation is authenticated.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum AccessMethod {
    /// Cardholder verification; the classic PIN.
    Chv,
    /// Terminal authentication.
    Term,
    /// Secure messaging.
    Pro,
    /// External key authentication.
    Aut,
    Symbolic,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AclEntry {
    pub method: AccessMethod,
    pub key_ref: Option<u32>,
}

/// The access conditions attached to one operation on one file. Besides a
/// real chain of entries there are three distinguished states: the operation
/// is never allowed, is allowed without authentication, or its conditions
/// are simply not known.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Acl {
    Never,
    None,
    Unknown,
    Chain(Vec<AclEntry>),
}

impl Default for Acl {
    fn default() -> Self {
        Acl::Chain(Vec::new())
    }
}

impl Acl {
    /// Add one real entry. NONE and UNKNOWN are zapped by the addition; on a
    /// NEVER chain the addition is dropped silently; an entry already
    /// present (same method and key reference) is not added again.
    fn add(&mut self, entry: AclEntry) {
        match self {
            Acl::Never => {}
            Acl::None | Acl::Unknown => *self = Acl::Chain(vec![entry]),
            Acl::Chain(entries) => {
                if !entries.contains(&entry) {
                    entries.push(entry);
                }
            }
        }
    }
}

/// The kind of file, from the FCI descriptor byte.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FileType {
    WorkingEf,
    InternalEf,
    Df,
}

// EF structure codings, as found in the low bits of the FCI descriptor byte.
pub const EF_UNKNOWN: u8 = 0;
pub const EF_TRANSPARENT: u8 = 1;
pub const EF_LINEAR_FIXED: u8 = 2;
pub const EF_LINEAR_FIXED_TLV: u8 = 3;
pub const EF_LINEAR_VARIABLE: u8 = 4;
pub const EF_LINEAR_VARIABLE_TLV: u8 = 5;
pub const EF_CYCLIC: u8 = 6;

/// A card file, as described by the File Control Information returned from
/// SELECT. Owned plainly by its holder: a `File` that exists is valid, and
/// releasing one releases its attribute buffers and ACL chains with it.
#[derive(Clone, Debug, Default)]
pub struct File {
    pub path: Path,
    pub id: u16,
    pub file_type: Option<FileType>,
    pub ef_structure: u8,
    pub shareable: bool,
    pub size: usize,
    pub record_length: usize,
    pub record_count: usize,
    /// The DF name (application identifier), up to 16 bytes.
    pub name: Vec<u8>,
    pub status: u32,
    pub sec_attr: Vec<u8>,
    pub prop_attr: Vec<u8>,
    pub type_attr: Vec<u8>,
    acl: [Acl; MAX_AC_OPS],
}

impl File {
    pub fn new() -> Self {
        File {
            path: Path::empty(),
            ..Default::default()
        }
    }

    pub fn is_df(&self) -> bool {
        self.file_type == Some(FileType::Df)
    }

    /// Attach an access condition to an operation. Passing a sentinel state
    /// replaces whatever chain is present; passing a real method appends to
    /// the chain under the rules described on [`Acl`].
    pub fn add_acl_entry(&mut self, op: FileOperation, acl: Acl) {
        let slot = &mut self.acl[op as usize];
        match acl {
            Acl::Never => *slot = Acl::Never,
            Acl::None => *slot = Acl::None,
            Acl::Unknown => *slot = Acl::Unknown,
            Acl::Chain(entries) => {
                for entry in entries {
                    slot.add(entry);
                }
            }
        }
    }

    /// Shorthand for adding a single real entry.
    pub fn add_acl_method(&mut self, op: FileOperation, method: AccessMethod, key_ref: Option<u32>) {
        self.acl[op as usize].add(AclEntry { method, key_ref });
    }

    pub fn acl_entry(&self, op: FileOperation) -> &Acl {
        &self.acl[op as usize]
    }

    pub fn clear_acl_entries(&mut self, op: FileOperation) {
        self.acl[op as usize] = Acl::default();
    }
}
