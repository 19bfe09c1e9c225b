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

use crate::error::*;
use crate::util;
use std::fmt;
use std::str::FromStr;

/// The maximum length, in bytes, of a card file path.
pub const MAX_PATH_SIZE: usize = 16;
/// The maximum length, in bytes, of an application identifier.
pub const MAX_AID_SIZE: usize = 16;
/// The maximum number of components in an object identifier.
pub const MAX_OBJECT_ID_COMPONENTS: usize = 16;
/// The maximum length, in bytes, of a PKCS#15 identifier.
pub const MAX_ID_SIZE: usize = 255;

/// An opaque binary identifier, compared by value.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct Id {
    value: Vec<u8>,
}

impl Id {
    pub fn new(value: &[u8]) -> Result<Self> {
        if value.len() > MAX_ID_SIZE {
            return Err(Error::InvalidArguments(format!(
                "identifier of {} bytes exceeds the {} byte limit",
                value.len(),
                MAX_ID_SIZE
            )));
        }
        Ok(Id {
            value: value.to_vec(),
        })
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }

    pub fn len(&self) -> usize {
        self.value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }
}

impl FromStr for Id {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Id::new(util::hex_to_bin(s)?.as_slice())
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", util::bin_to_hex(&self.value, None))
    }
}

/// An object identifier: a bounded sequence of integer components. Unused
/// trailing components hold the sentinel value -1; two identifiers are equal
/// iff their used prefixes are equal.
#[derive(Clone, Copy, Debug)]
pub struct ObjectId {
    value: [i32; MAX_OBJECT_ID_COMPONENTS],
}

impl ObjectId {
    pub fn components(&self) -> impl Iterator<Item = i32> + '_ {
        self.value.iter().cloned().take_while(|&c| c >= 0)
    }

    pub fn is_set(&self) -> bool {
        self.value[0] >= 0
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        ObjectId {
            value: [-1; MAX_OBJECT_ID_COMPONENTS],
        }
    }
}

impl FromStr for ObjectId {
    type Err = Error;

    /// Parse a dotted-decimal object identifier, e.g. "1.2.840.113549".
    /// Identifiers of fewer than two components are rejected.
    fn from_str(s: &str) -> Result<Self> {
        let mut oid = ObjectId::default();
        let mut count = 0;
        for component in s.split('.') {
            if count >= MAX_OBJECT_ID_COMPONENTS {
                return Err(Error::InvalidArguments(format!(
                    "object identifier '{}' has more than {} components",
                    s, MAX_OBJECT_ID_COMPONENTS
                )));
            }
            let value: i32 = component.parse().map_err(|_| {
                Error::InvalidArguments(format!("invalid object identifier component '{}'", component))
            })?;
            if value < 0 {
                return Err(Error::InvalidArguments(format!(
                    "negative object identifier component '{}'",
                    component
                )));
            }
            oid.value[count] = value;
            count += 1;
        }
        if count < 2 {
            return Err(Error::InvalidArguments(format!(
                "object identifier '{}' is too short",
                s
            )));
        }
        Ok(oid)
    }
}

impl PartialEq for ObjectId {
    fn eq(&self, other: &ObjectId) -> bool {
        for i in 0..MAX_OBJECT_ID_COMPONENTS {
            if self.value[i] != other.value[i] {
                return false;
            }
            if self.value[i] < 0 {
                break;
            }
        }
        true
    }
}

impl Eq for ObjectId {}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let parts: Vec<String> = self.components().map(|c| c.to_string()).collect();
        write!(f, "{}", parts.join("."))
    }
}

/// How the bytes of a `Path` are to be interpreted when selecting.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum PathKind {
    /// A 2-byte short file identifier.
    FileId,
    /// An application identifier (DF name), up to 16 bytes.
    DfName,
    /// A concatenation of 2-byte file identifiers from the master file down.
    Path,
}

/// A card file path. Besides the path value itself, this carries an optional
/// application identifier prefix (for applications not rooted at the master
/// file) and optional index/count hints used for ranged reads.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Path {
    kind: PathKind,
    value: Vec<u8>,
    aid: Vec<u8>,
    pub index: Option<u16>,
    pub count: Option<u16>,
}

impl Path {
    pub fn new(kind: PathKind, value: &[u8]) -> Result<Self> {
        if value.is_empty() || value.len() > MAX_PATH_SIZE {
            return Err(Error::InvalidArguments(format!(
                "path of {} bytes is outside the 1..={} byte limit",
                value.len(),
                MAX_PATH_SIZE
            )));
        }
        if kind == PathKind::FileId && value.len() != 2 {
            return Err(Error::InvalidArguments(format!(
                "file identifiers are exactly 2 bytes, got {}",
                value.len()
            )));
        }
        Ok(Path {
            kind,
            value: value.to_vec(),
            aid: Vec::new(),
            index: None,
            count: None,
        })
    }

    /// The path of the master file, 3F00.
    pub fn mf() -> Self {
        Path {
            kind: PathKind::Path,
            value: vec![0x3F, 0x00],
            aid: Vec::new(),
            index: None,
            count: None,
        }
    }

    /// An empty path; useful as a "not present" placeholder in structures
    /// whose path attribute is optional.
    pub fn empty() -> Self {
        Path {
            kind: PathKind::Path,
            value: Vec::new(),
            aid: Vec::new(),
            index: None,
            count: None,
        }
    }

    pub fn kind(&self) -> PathKind {
        self.kind
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }

    pub fn len(&self) -> usize {
        self.value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    pub fn aid(&self) -> &[u8] {
        &self.aid
    }

    pub fn set_aid(&mut self, aid: &[u8]) -> Result<()> {
        if aid.len() > MAX_AID_SIZE {
            return Err(Error::InvalidArguments(format!(
                "application identifier of {} bytes exceeds the {} byte limit",
                aid.len(),
                MAX_AID_SIZE
            )));
        }
        self.aid = aid.to_vec();
        Ok(())
    }

    /// Append another path. Concatenating DF names is not supported, and the
    /// combined value must fit within the path size limit. The result is
    /// always a `Path`-kind path; index/count hints are taken from `other`.
    pub fn append(&mut self, other: &Path) -> Result<()> {
        if self.kind == PathKind::DfName || other.kind == PathKind::DfName {
            return Err(Error::NotSupported(
                "concatenation of DF names".to_string(),
            ));
        }
        if self.value.len() + other.value.len() > MAX_PATH_SIZE {
            return Err(Error::InvalidArguments(format!(
                "concatenated path of {} bytes exceeds the {} byte limit",
                self.value.len() + other.value.len(),
                MAX_PATH_SIZE
            )));
        }
        self.value.extend_from_slice(&other.value);
        self.kind = PathKind::Path;
        self.index = other.index;
        self.count = other.count;
        Ok(())
    }

    /// Return the concatenation of this path and `other`, without modifying
    /// either.
    pub fn join(&self, other: &Path) -> Result<Path> {
        let mut ret = self.clone();
        ret.append(other)?;
        Ok(ret)
    }

    /// Append a single 2-byte file identifier.
    pub fn append_file_id(&mut self, id: u16) -> Result<()> {
        if self.value.len() + 2 > MAX_PATH_SIZE {
            return Err(Error::InvalidArguments(format!(
                "appending a file identifier to a {} byte path exceeds the {} byte limit",
                self.value.len(),
                MAX_PATH_SIZE
            )));
        }
        self.value.extend_from_slice(&util::ushort2bebytes(id));
        Ok(())
    }

    /// True iff `prefix` is a byte prefix of this path. The application
    /// identifier is not considered.
    pub fn starts_with(&self, prefix: &Path) -> bool {
        prefix.value.len() <= self.value.len()
            && self.value[..prefix.value.len()] == prefix.value[..]
    }

    /// True iff the path values are byte-identical. Kind, application
    /// identifier and hints are not considered.
    pub fn matches(&self, other: &Path) -> bool {
        self.value == other.value
    }

    /// If this path is relative (it does not start at the master file),
    /// prepend `parent` to it.
    pub fn make_absolute(&mut self, parent: &Path) -> Result<()> {
        if self.kind == PathKind::DfName || self.value.starts_with(&[0x3F, 0x00]) {
            return Ok(());
        }
        let mut absolute = parent.clone();
        absolute.append(self)?;
        *self = absolute;
        Ok(())
    }
}

impl Default for Path {
    fn default() -> Self {
        Path::empty()
    }
}

impl FromStr for Path {
    type Err = Error;

    /// Parse a path from hex notation, with optional `:` or space separators.
    /// A leading `i` or `I` marks the path as a short file identifier.
    fn from_str(s: &str) -> Result<Self> {
        let (kind, rest) = match s.strip_prefix('i').or_else(|| s.strip_prefix('I')) {
            Some(rest) => (PathKind::FileId, rest),
            None => (PathKind::Path, s),
        };
        Path::new(kind, util::hex_to_bin(rest)?.as_slice())
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if !self.aid.is_empty() {
            write!(f, "{}::", util::bin_to_hex(&self.aid, None))?;
        }
        write!(f, "{}", util::bin_to_hex(&self.value, None))?;
        if self.aid.is_empty() && self.kind == PathKind::DfName {
            write!(f, "::")?;
        }
        Ok(())
    }
}
