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

//! The PKCS#15 layer: the token's directory structure, the cross-referenced
//! object graph built from it, and the operations (authentication, signing,
//! deciphering) expressed against that graph.

pub mod cert;
pub mod crypto;
pub mod data;
pub mod object;
pub mod pin;
pub mod prkey;
pub mod pubkey;
pub mod tokeninfo;

use crate::asn1;
use crate::card::Card;
use crate::error::*;
use crate::file::File;
use crate::pkcs15::object::{
    AccessMode, AccessRule, Object, ObjectClass, ObjectFlags, ObjectPayload, ObjectType,
};
use crate::pkcs15::pin::AuthData;
use crate::pkcs15::tokeninfo::TokenInfo;
use crate::types::{Id, ObjectId, Path, PathKind};
use log::{debug, warn};
use std::path::PathBuf;

pub use crate::pkcs15::object::KeyUsage;

/// The on-disk directory the file cache lives in, relative to the user's
/// home directory.
pub const CACHE_DIR: &str = ".eid";

/// The default application directory, 3F00/5015.
const DEFAULT_APP_PATH: [u8; 4] = [0x3F, 0x00, 0x50, 0x15];
/// EF(ODF) and EF(TokenInfo) file identifiers within the application DF.
const ODF_FILE_ID: [u8; 2] = [0x50, 0x31];
const TOKENINFO_FILE_ID: [u8; 2] = [0x50, 0x32];

/// The kinds of directory files a PKCS#15 application enumerates through its
/// ODF.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DfType {
    PrKdf = 0,
    PuKdf = 1,
    PuKdfTrusted = 2,
    SKdf = 3,
    Cdf = 4,
    CdfTrusted = 5,
    CdfUseful = 6,
    Dodf = 7,
    Aodf = 8,
}

impl DfType {
    fn from_odf_index(index: u32) -> Option<DfType> {
        Some(match index {
            0 => DfType::PrKdf,
            1 => DfType::PuKdf,
            2 => DfType::PuKdfTrusted,
            3 => DfType::SKdf,
            4 => DfType::Cdf,
            5 => DfType::CdfTrusted,
            6 => DfType::CdfUseful,
            7 => DfType::Dodf,
            8 => DfType::Aodf,
            _ => return None,
        })
    }
}

/// One directory file: its path and type, and whether its entries have been
/// folded into the object list yet.
#[derive(Clone, Debug)]
pub struct DirectoryFile {
    pub df_type: DfType,
    pub path: Path,
    pub enumerated: bool,
}

/// A region of unused card space advertised by EF(UnusedSpace).
#[derive(Clone, Debug)]
pub struct UnusedSpace {
    pub path: Path,
    pub auth_id: Id,
}

/// The PKCS#15 application bound on a card.
#[derive(Clone, Debug, Default)]
pub struct AppInfo {
    /// The application identifier this application was located by, if any.
    pub aid: Vec<u8>,
    pub label: Option<String>,
    /// The application directory path.
    pub path: Path,
}

#[derive(Clone, Copy, Debug)]
pub struct P15CardOpts {
    /// Consult (and fill) the on-disk file cache when reading card files.
    pub use_file_cache: bool,
    /// Keep the last successfully verified PIN for transparent
    /// re-authentication.
    pub use_pin_cache: bool,
    /// How many times a cached PIN may be re-presented before it is
    /// discarded.
    pub pin_cache_counter: u32,
}

impl Default for P15CardOpts {
    fn default() -> Self {
        P15CardOpts {
            use_file_cache: false,
            use_pin_cache: true,
            pin_cache_counter: 10,
        }
    }
}

/// Search criteria for [`P15Card::search_objects`]. Every populated field
/// must match for an object to be returned.
#[derive(Clone, Debug, Default)]
pub struct SearchKey<'a> {
    pub class_mask: Option<ObjectClass>,
    pub obj_type: Option<ObjectType>,
    pub id: Option<&'a Id>,
    pub app_oid: Option<&'a ObjectId>,
    pub path: Option<&'a Path>,
    pub usage_mask: Option<(KeyUsage, KeyUsage)>,
    pub flags_mask: Option<(ObjectFlags, ObjectFlags)>,
    pub reference: Option<u32>,
    pub app_label: Option<&'a str>,
    pub label: Option<&'a str>,
}

/// The root aggregate of the PKCS#15 layer. Owns the underlying card, the
/// directory-file list, and the arena every decoded object lives in; objects
/// are referred to by their stable arena index.
pub struct P15Card {
    pub(crate) card: Card,
    pub app: AppInfo,
    pub file_app: Option<File>,
    pub file_tokeninfo: Option<File>,
    pub file_odf: Option<File>,
    pub tokeninfo: TokenInfo,
    dfs: Vec<DirectoryFile>,
    objects: Vec<Option<Object>>,
    unusedspace: Vec<UnusedSpace>,
    pub opts: P15CardOpts,
}

impl P15Card {
    fn new(card: Card, opts: P15CardOpts) -> Self {
        P15Card {
            card,
            app: AppInfo::default(),
            file_app: None,
            file_tokeninfo: None,
            file_odf: None,
            tokeninfo: TokenInfo::default(),
            dfs: Vec::new(),
            objects: Vec::new(),
            unusedspace: Vec::new(),
            opts,
        }
    }

    /// Bind a PKCS#15 application on `card`: locate the application
    /// directory (by `aid`, or at the default path), then read and parse
    /// EF(TokenInfo) and EF(ODF). Directory files named by the ODF are
    /// parsed lazily, on first lookup.
    pub fn bind(card: Card, aid: Option<&[u8]>, opts: P15CardOpts) -> Result<P15Card> {
        let mut p15 = P15Card::new(card, opts);
        p15.card.lock()?;
        let result = p15.bind_internal(aid);
        if let Err(e) = p15.card.unlock() {
            warn!("failed to release card lock: {}", e);
        }
        result?;
        Ok(p15)
    }

    fn bind_internal(&mut self, aid: Option<&[u8]>) -> Result<()> {
        let app_path = match aid {
            Some(aid) => Path::new(PathKind::DfName, aid)?,
            None => Path::new(PathKind::Path, &DEFAULT_APP_PATH)?,
        };

        let file_app = self
            .card
            .select_file(&app_path, true)?
            .ok_or_else(|| Error::Internal("SELECT returned no FCI".to_string()))?;
        self.app = AppInfo {
            aid: aid.map(|a| a.to_vec()).unwrap_or_default(),
            label: None,
            path: app_path,
        };
        self.file_app = Some(file_app);

        let tokeninfo_path = self.app_relative_path(&TOKENINFO_FILE_ID)?;
        let (tokeninfo_data, file_tokeninfo) = self.read_file_capturing(&tokeninfo_path)?;
        self.file_tokeninfo = file_tokeninfo;
        self.tokeninfo = tokeninfo::parse_tokeninfo(&tokeninfo_data)?;
        debug!(
            "bound token '{}'",
            self.tokeninfo.label.as_deref().unwrap_or("(unlabelled)")
        );

        let odf_path = self.app_relative_path(&ODF_FILE_ID)?;
        let (odf_data, file_odf) = self.read_file_capturing(&odf_path)?;
        self.file_odf = file_odf;
        self.parse_odf(&odf_data)?;

        Ok(())
    }

    /// A path addressing `file_id` within the application directory.
    fn app_relative_path(&self, file_id: &[u8]) -> Result<Path> {
        let mut path = Path::new(PathKind::Path, file_id)?;
        if self.app.path.kind() == PathKind::DfName {
            path.set_aid(self.app.path.value())?;
        } else {
            path.make_absolute(&self.app.path)?;
        }
        Ok(path)
    }

    /// Make a path read from a directory file absolute, the way the
    /// application is rooted: AID-rooted applications get the AID attached,
    /// others are prefixed with the application directory.
    fn absolutize(&self, path: &mut Path) -> Result<()> {
        if self.app.path.kind() == PathKind::DfName {
            if path.aid().is_empty() {
                path.set_aid(self.app.path.value())?;
            }
        } else {
            path.make_absolute(&self.app.path)?;
        }
        Ok(())
    }

    fn parse_odf(&mut self, data: &[u8]) -> Result<()> {
        let mut parser = asn1::Parser::new(data);
        while !parser.is_empty() {
            let (tag, value) = parser.take_any()?;
            if tag < 0xA0 || tag > 0xA8 {
                warn!("unrecognized ODF entry tag {:#04x}", tag);
                continue;
            }
            let df_type = match DfType::from_odf_index(tag - 0xA0) {
                Some(t) => t,
                None => continue,
            };
            let (inner_tag, inner, _) = asn1::read_tlv(value)?;
            if inner_tag != asn1::TAG_SEQUENCE {
                warn!("ODF entry for {:?} does not name a path", df_type);
                continue;
            }
            let mut path = decode_path(inner)?;
            self.absolutize(&mut path)?;
            self.add_df(df_type, path);
        }
        Ok(())
    }

    pub fn add_df(&mut self, df_type: DfType, path: Path) {
        debug!("directory file {:?} at {}", df_type, path);
        self.dfs.push(DirectoryFile {
            df_type,
            path,
            enumerated: false,
        });
    }

    pub fn remove_df(&mut self, index: usize) {
        if index < self.dfs.len() {
            self.dfs.remove(index);
            for obj in self.objects.iter_mut().flatten() {
                match obj.df {
                    Some(df) if df == index => obj.df = None,
                    Some(df) if df > index => obj.df = Some(df - 1),
                    _ => {}
                }
            }
        }
    }

    pub fn dfs(&self) -> &[DirectoryFile] {
        &self.dfs
    }

    /// Read and decode every directory file that has not been folded into
    /// the object list yet.
    pub fn enumerate(&mut self) -> Result<()> {
        for index in 0..self.dfs.len() {
            self.parse_df(index)?;
        }
        self.check_auth_references();
        Ok(())
    }

    fn parse_df(&mut self, index: usize) -> Result<()> {
        if self.dfs[index].enumerated {
            return Ok(());
        }
        let df_type = self.dfs[index].df_type;
        let df_path = self.dfs[index].path.clone();
        let data = self.read_file(&df_path)?;

        let mut decoded: Vec<Object> = Vec::new();
        {
            let mut blob = data.as_slice();
            while !blob.is_empty() {
                let entry = match df_type {
                    DfType::PrKdf => prkey::decode_prkdf_entry(self, &mut blob)?,
                    DfType::PuKdf | DfType::PuKdfTrusted => {
                        pubkey::decode_pukdf_entry(self, &mut blob)?
                    }
                    DfType::Cdf | DfType::CdfTrusted | DfType::CdfUseful => {
                        cert::decode_cdf_entry(self, &mut blob)?
                    }
                    DfType::Dodf => data::decode_dodf_entry(self, &mut blob)?,
                    DfType::Aodf => pin::decode_aodf_entry(self, &mut blob)?,
                    DfType::SKdf => {
                        warn!("secret key directory files are not supported; skipping");
                        break;
                    }
                };
                if let Some(obj) = entry {
                    decoded.push(obj);
                }
            }
        }

        for mut obj in decoded {
            obj.df = Some(index);
            self.add_object(obj);
        }
        self.dfs[index].enumerated = true;
        Ok(())
    }

    /// Every object naming an authentication object must have one; a broken
    /// reference makes authentication unsatisfiable, which is worth
    /// reporting but is not fatal.
    fn check_auth_references(&self) {
        for (_, obj) in self.objects() {
            if obj.auth_id.is_empty() {
                continue;
            }
            let satisfied = self.objects().any(|(_, pin)| {
                pin.obj_type == ObjectType::AuthPin && *pin.payload.id() == obj.auth_id
            });
            if !satisfied {
                warn!(
                    "object '{}' is protected by unknown authentication object {}",
                    obj.label, obj.auth_id
                );
            }
        }
    }

    // Object arena.

    /// Add an object, returning its stable index.
    pub fn add_object(&mut self, obj: Object) -> usize {
        match self.objects.iter().position(Option::is_none) {
            Some(index) => {
                self.objects[index] = Some(obj);
                index
            }
            None => {
                self.objects.push(Some(obj));
                self.objects.len() - 1
            }
        }
    }

    pub fn remove_object(&mut self, index: usize) -> Option<Object> {
        self.objects.get_mut(index).and_then(Option::take)
    }

    pub fn object(&self, index: usize) -> Option<&Object> {
        self.objects.get(index).and_then(Option::as_ref)
    }

    pub fn object_mut(&mut self, index: usize) -> Option<&mut Object> {
        self.objects.get_mut(index).and_then(Option::as_mut)
    }

    /// Iterate over the live objects with their indices.
    pub fn objects(&self) -> impl Iterator<Item = (usize, &Object)> {
        self.objects
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|obj| (i, obj)))
    }

    // Search.

    fn matches(&self, obj: &Object, key: &SearchKey) -> bool {
        if let Some(class_mask) = key.class_mask {
            if !class_mask.contains(obj.obj_type.class()) {
                return false;
            }
        }
        if let Some(obj_type) = key.obj_type {
            if obj.obj_type != obj_type {
                return false;
            }
        }
        if let Some(id) = key.id {
            if obj.payload.id() != id {
                return false;
            }
        }
        if let Some(app_oid) = key.app_oid {
            match &obj.payload {
                ObjectPayload::Data(info) => {
                    if info.app_oid.as_ref() != Some(app_oid) {
                        return false;
                    }
                }
                _ => return false,
            }
        }
        if let Some(path) = key.path {
            match obj.payload.path() {
                Some(obj_path) => {
                    if !obj_path.matches(path) {
                        return false;
                    }
                }
                None => return false,
            }
        }
        if let Some((mask, value)) = key.usage_mask {
            match obj.payload.usage() {
                Some(usage) => {
                    if usage & mask != value & mask {
                        return false;
                    }
                }
                None => return false,
            }
        }
        if let Some((mask, value)) = key.flags_mask {
            if obj.flags & mask != value & mask {
                return false;
            }
        }
        if let Some(reference) = key.reference {
            let obj_reference = match &obj.payload {
                ObjectPayload::PrKey(info) => info.key_reference,
                ObjectPayload::PubKey(info) => info.key_reference,
                ObjectPayload::Auth(info) => match &info.data {
                    AuthData::Pin(attrs) if attrs.reference >= 0 => {
                        Some(attrs.reference as u32)
                    }
                    _ => None,
                },
                _ => None,
            };
            if obj_reference != Some(reference) {
                return false;
            }
        }
        if let Some(app_label) = key.app_label {
            match &obj.payload {
                ObjectPayload::Data(info) => {
                    if info.app_label != app_label {
                        return false;
                    }
                }
                _ => return false,
            }
        }
        if let Some(label) = key.label {
            if obj.label != label {
                return false;
            }
        }
        true
    }

    /// Filter the object list on a search key, returning up to `max`
    /// matching indices. Unenumerated directory files are parsed first.
    pub fn search_objects(&mut self, key: &SearchKey, max: usize) -> Result<Vec<usize>> {
        self.enumerate()?;
        Ok(self
            .objects()
            .filter(|&(_, obj)| self.matches(obj, key))
            .map(|(index, _)| index)
            .take(max)
            .collect())
    }

    /// All objects of the given class.
    pub fn get_objects(&mut self, class: ObjectClass, max: usize) -> Result<Vec<usize>> {
        self.search_objects(
            &SearchKey {
                class_mask: Some(class),
                ..SearchKey::default()
            },
            max,
        )
    }

    fn find_one(&mut self, key: &SearchKey) -> Result<Option<usize>> {
        Ok(self.search_objects(key, 1)?.into_iter().next())
    }

    pub fn find_object_by_id(
        &mut self,
        class: ObjectClass,
        id: &Id,
    ) -> Result<Option<usize>> {
        self.find_one(&SearchKey {
            class_mask: Some(class),
            id: Some(id),
            ..SearchKey::default()
        })
    }

    pub fn find_prkey_by_id(&mut self, id: &Id) -> Result<Option<usize>> {
        self.find_object_by_id(ObjectClass::PRKEY, id)
    }

    pub fn find_prkey_by_id_usage(
        &mut self,
        id: &Id,
        usage: KeyUsage,
    ) -> Result<Option<usize>> {
        self.find_one(&SearchKey {
            class_mask: Some(ObjectClass::PRKEY),
            id: Some(id),
            usage_mask: Some((usage, usage)),
            ..SearchKey::default()
        })
    }

    pub fn find_prkey_by_reference(
        &mut self,
        path: Option<&Path>,
        reference: u32,
    ) -> Result<Option<usize>> {
        self.find_one(&SearchKey {
            class_mask: Some(ObjectClass::PRKEY),
            path,
            reference: Some(reference),
            ..SearchKey::default()
        })
    }

    pub fn find_pubkey_by_id(&mut self, id: &Id) -> Result<Option<usize>> {
        self.find_object_by_id(ObjectClass::PUBKEY, id)
    }

    pub fn find_cert_by_id(&mut self, id: &Id) -> Result<Option<usize>> {
        self.find_object_by_id(ObjectClass::CERT, id)
    }

    pub fn find_data_object_by_id(&mut self, id: &Id) -> Result<Option<usize>> {
        self.find_object_by_id(ObjectClass::DATA, id)
    }

    pub fn find_data_object_by_app_oid(
        &mut self,
        app_oid: &ObjectId,
    ) -> Result<Option<usize>> {
        self.find_one(&SearchKey {
            class_mask: Some(ObjectClass::DATA),
            app_oid: Some(app_oid),
            ..SearchKey::default()
        })
    }

    pub fn find_data_object_by_name(
        &mut self,
        app_label: &str,
        label: &str,
    ) -> Result<Option<usize>> {
        self.find_one(&SearchKey {
            class_mask: Some(ObjectClass::DATA),
            app_label: Some(app_label),
            label: Some(label),
            ..SearchKey::default()
        })
    }

    pub fn find_pin_by_auth_id(&mut self, auth_id: &Id) -> Result<Option<usize>> {
        self.find_one(&SearchKey {
            obj_type: Some(ObjectType::AuthPin),
            id: Some(auth_id),
            ..SearchKey::default()
        })
    }

    pub fn find_pin_by_reference(
        &mut self,
        path: Option<&Path>,
        reference: u32,
    ) -> Result<Option<usize>> {
        self.find_one(&SearchKey {
            obj_type: Some(ObjectType::AuthPin),
            path,
            reference: Some(reference),
            ..SearchKey::default()
        })
    }

    pub fn find_pin_by_type_and_reference(
        &mut self,
        path: Option<&Path>,
        method: crate::file::AccessMethod,
        reference: u32,
    ) -> Result<Option<usize>> {
        self.enumerate()?;
        Ok(self
            .objects()
            .filter(|(_, obj)| {
                if obj.obj_type != ObjectType::AuthPin {
                    return false;
                }
                let info = match &obj.payload {
                    ObjectPayload::Auth(info) => info,
                    _ => return false,
                };
                if info.auth_method != method {
                    return false;
                }
                if let Some(path) = path {
                    if !info.path.matches(path) {
                        return false;
                    }
                }
                match &info.data {
                    AuthData::Pin(attrs) => attrs.reference >= 0 && attrs.reference as u32 == reference,
                    _ => false,
                }
            })
            .map(|(index, _)| index)
            .next())
    }

    /// Find the security-officer PIN.
    pub fn find_so_pin(&mut self) -> Result<Option<usize>> {
        self.enumerate()?;
        Ok(self
            .objects()
            .filter(|(_, obj)| match &obj.payload {
                ObjectPayload::Auth(info) => match &info.data {
                    AuthData::Pin(attrs) => attrs.flags.contains(pin::PinFlags::SO_PIN),
                    _ => false,
                },
                _ => false,
            })
            .map(|(index, _)| index)
            .next())
    }

    // Unused space.

    pub fn parse_unusedspace(&mut self, data: &[u8]) -> Result<()> {
        let mut parser = asn1::Parser::new(data);
        while !parser.is_empty() {
            let entry = parser.take(asn1::TAG_SEQUENCE)?;
            let mut entry_parser = asn1::Parser::new(entry);
            let mut path = decode_path(entry_parser.take(asn1::TAG_SEQUENCE)?)?;
            self.absolutize(&mut path)?;
            let auth_id = match entry_parser.take_optional(asn1::TAG_OCTET_STRING)? {
                Some(value) => Id::new(value)?,
                None => Id::default(),
            };
            self.add_unusedspace(path, auth_id);
        }
        Ok(())
    }

    pub fn add_unusedspace(&mut self, path: Path, auth_id: Id) {
        self.unusedspace.push(UnusedSpace { path, auth_id });
    }

    pub fn remove_unusedspace(&mut self, index: usize) {
        if index < self.unusedspace.len() {
            self.unusedspace.remove(index);
        }
    }

    pub fn unusedspace(&self) -> &[UnusedSpace] {
        &self.unusedspace
    }

    // File access.

    /// Select `path`, handling an AID prefix by selecting the application DF
    /// first.
    pub(crate) fn select_path(&mut self, path: &Path, want_fci: bool) -> Result<Option<File>> {
        if !path.aid().is_empty() {
            let aid_path = Path::new(PathKind::DfName, path.aid())?;
            self.card.select_file(&aid_path, false)?;
            if path.is_empty() {
                return Ok(None);
            }
        }
        self.card.select_file(path, want_fci)
    }

    /// Read a card file's contents. With the file cache enabled, a cached
    /// copy is preferred and fresh reads are written through to disk. The
    /// path's index/count hints bound the read when present.
    pub fn read_file(&mut self, path: &Path) -> Result<Vec<u8>> {
        Ok(self.read_file_capturing(path)?.0)
    }

    /// Like [`P15Card::read_file`], but also hands back the `File` produced
    /// by the SELECT. A cache hit involves no card traffic, so no file is
    /// available then.
    fn read_file_capturing(&mut self, path: &Path) -> Result<(Vec<u8>, Option<File>)> {
        if self.opts.use_file_cache {
            if let Some(data) = self.read_cached_file(path) {
                debug!("read {} from the file cache", path);
                return Ok((data, None));
            }
        }

        self.card.lock()?;
        let result = self.read_file_from_card(path);
        if let Err(e) = self.card.unlock() {
            warn!("failed to release card lock: {}", e);
        }
        let (data, file) = result?;

        if self.opts.use_file_cache {
            if let Err(e) = self.cache_file(path, &data) {
                warn!("failed to cache {}: {}", path, e);
            }
        }
        Ok((data, Some(file)))
    }

    fn read_file_from_card(&mut self, path: &Path) -> Result<(Vec<u8>, File)> {
        let file = self
            .select_path(path, true)?
            .ok_or_else(|| Error::Internal("SELECT returned no FCI".to_string()))?;

        if file.record_count > 0
            || matches!(
                file.ef_structure,
                crate::file::EF_LINEAR_FIXED
                    | crate::file::EF_LINEAR_FIXED_TLV
                    | crate::file::EF_LINEAR_VARIABLE
                    | crate::file::EF_LINEAR_VARIABLE_TLV
                    | crate::file::EF_CYCLIC
            )
        {
            let data = self.read_records(&file)?;
            return Ok((data, file));
        }

        let offset = path.index.unwrap_or(0) as usize;
        let size = match path.count {
            Some(count) => count as usize,
            None => file.size.saturating_sub(offset),
        };

        let mut out: Vec<u8> = Vec::with_capacity(size);
        while out.len() < size {
            let chunk = 256.min(size - out.len());
            let data = self
                .card
                .read_binary((offset + out.len()) as u16, chunk)?;
            if data.is_empty() {
                break;
            }
            out.extend_from_slice(&data);
        }
        Ok((out, file))
    }

    fn read_records(&mut self, file: &File) -> Result<Vec<u8>> {
        let mut out: Vec<u8> = Vec::new();
        let mut rec_nr: u8 = 1;
        loop {
            if file.record_count > 0 && rec_nr as usize > file.record_count {
                break;
            }
            match self.card.read_record(rec_nr, 256, 0, true) {
                Ok(data) => out.extend_from_slice(&data),
                Err(Error::RecordNotFound) => break,
                Err(e) => return Err(e),
            }
            if rec_nr == 255 {
                break;
            }
            rec_nr += 1;
        }
        Ok(out)
    }

    fn cache_filename(&self, path: &Path) -> Option<PathBuf> {
        let home = std::env::var_os("HOME")?;
        Some(
            PathBuf::from(home)
                .join(CACHE_DIR)
                .join(path.to_string()),
        )
    }

    fn read_cached_file(&self, path: &Path) -> Option<Vec<u8>> {
        std::fs::read(self.cache_filename(path)?).ok()
    }

    fn cache_file(&self, path: &Path, data: &[u8]) -> Result<()> {
        let filename = self
            .cache_filename(path)
            .ok_or_else(|| Error::Internal("no home directory for the file cache".to_string()))?;
        if let Some(parent) = filename.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(filename, data)?;
        Ok(())
    }

    pub fn card(&self) -> &Card {
        &self.card
    }

    pub fn card_mut(&mut self) -> &mut Card {
        &mut self.card
    }

    /// Release the PKCS#15 binding, returning the underlying card. Cached
    /// PINs are scrubbed as the object arena is dropped.
    pub fn unbind(mut self) -> Card {
        self.pincache_clear();
        self.card
    }
}

// Shared ASN.1 helpers for the directory-file entry codecs.

/// Decode the content octets of a PKCS#15 `Path` SEQUENCE.
pub(crate) fn decode_path(content: &[u8]) -> Result<Path> {
    let mut parser = asn1::Parser::new(content);
    let value = parser.take(asn1::TAG_OCTET_STRING)?;
    let mut path = if value.is_empty() {
        Path::empty()
    } else {
        Path::new(PathKind::Path, value)?
    };
    if let Some(index) = parser.take_optional(asn1::TAG_INTEGER)? {
        path.index = Some(asn1::decode_integer(index)? as u16);
    }
    if let Some(count) = parser.take_optional(asn1::context(0, false))? {
        path.count = Some(asn1::decode_integer(count)? as u16);
    }
    Ok(path)
}

/// Append a PKCS#15 `Path` SEQUENCE TLV to `out`.
pub(crate) fn encode_path(path: &Path, out: &mut Vec<u8>) {
    let mut inner: Vec<u8> = Vec::new();
    asn1::put_tag(asn1::TAG_OCTET_STRING, path.value(), &mut inner);
    if let Some(count) = path.count {
        asn1::put_tag(
            asn1::TAG_INTEGER,
            &asn1::encode_integer(path.index.unwrap_or(0) as i64),
            &mut inner,
        );
        asn1::put_tag(
            asn1::context(0, false),
            &asn1::encode_integer(count as i64),
            &mut inner,
        );
    }
    asn1::put_tag(asn1::TAG_SEQUENCE, &inner, out);
}

pub(crate) struct CommonObjectAttrs {
    pub label: String,
    pub flags: ObjectFlags,
    pub auth_id: Id,
    pub user_consent: u32,
    pub access_rules: Vec<AccessRule>,
}

/// Decode the content octets of a CommonObjectAttributes SEQUENCE.
pub(crate) fn decode_common_object_attrs(content: &[u8]) -> Result<CommonObjectAttrs> {
    let mut parser = asn1::Parser::new(content);
    let label = match parser.take_optional(asn1::TAG_UTF8_STRING)? {
        Some(value) => {
            let mut label = asn1::decode_utf8(value)?;
            label.truncate(object::MAX_LABEL_SIZE);
            label
        }
        None => String::new(),
    };
    let flags = match parser.take_optional(asn1::TAG_BIT_STRING)? {
        Some(value) => ObjectFlags::from_bits_truncate(asn1::decode_bit_field(value)?),
        None => ObjectFlags::empty(),
    };
    let auth_id = match parser.take_optional(asn1::TAG_OCTET_STRING)? {
        Some(value) => Id::new(value)?,
        None => Id::default(),
    };
    let user_consent = match parser.take_optional(asn1::TAG_INTEGER)? {
        Some(value) => asn1::decode_integer(value)?.max(0) as u32,
        None => 0,
    };

    let mut access_rules: Vec<AccessRule> = Vec::new();
    if let Some(rules) = parser.take_optional(asn1::TAG_SEQUENCE)? {
        let mut rules_parser = asn1::Parser::new(rules);
        while !rules_parser.is_empty() && access_rules.len() < object::MAX_ACCESS_RULES {
            let rule = rules_parser.take(asn1::TAG_SEQUENCE)?;
            let mut rule_parser = asn1::Parser::new(rule);
            let mode = AccessMode::from_bits_truncate(asn1::decode_bit_field(
                rule_parser.take(asn1::TAG_BIT_STRING)?,
            )?);
            let auth_id = match rule_parser.take_optional(asn1::TAG_OCTET_STRING)? {
                Some(value) => Id::new(value)?,
                None => Id::default(),
            };
            access_rules.push(AccessRule { mode, auth_id });
        }
    }

    Ok(CommonObjectAttrs {
        label,
        flags,
        auth_id,
        user_consent,
        access_rules,
    })
}

/// Append a CommonObjectAttributes SEQUENCE TLV for `obj` to `out`.
pub(crate) fn encode_common_object_attrs(obj: &Object, out: &mut Vec<u8>) {
    let mut inner: Vec<u8> = Vec::new();
    if !obj.label.is_empty() {
        asn1::put_tag(asn1::TAG_UTF8_STRING, obj.label.as_bytes(), &mut inner);
    }
    asn1::put_tag(
        asn1::TAG_BIT_STRING,
        &asn1::encode_bit_field(obj.flags.bits()),
        &mut inner,
    );
    if !obj.auth_id.is_empty() {
        asn1::put_tag(asn1::TAG_OCTET_STRING, obj.auth_id.value(), &mut inner);
    }
    if obj.user_consent > 0 {
        asn1::put_tag(
            asn1::TAG_INTEGER,
            &asn1::encode_integer(obj.user_consent as i64),
            &mut inner,
        );
    }
    if !obj.access_rules.is_empty() {
        let mut rules: Vec<u8> = Vec::new();
        for rule in &obj.access_rules {
            let mut rule_inner: Vec<u8> = Vec::new();
            asn1::put_tag(
                asn1::TAG_BIT_STRING,
                &asn1::encode_bit_field(rule.mode.bits()),
                &mut rule_inner,
            );
            if !rule.auth_id.is_empty() {
                asn1::put_tag(asn1::TAG_OCTET_STRING, rule.auth_id.value(), &mut rule_inner);
            }
            asn1::put_tag(asn1::TAG_SEQUENCE, &rule_inner, &mut rules);
        }
        asn1::put_tag(asn1::TAG_SEQUENCE, &rules, &mut inner);
    }
    asn1::put_tag(asn1::TAG_SEQUENCE, &inner, out);
}

/// Apply decoded common object attributes to a freshly built object.
pub(crate) fn apply_common_attrs(obj: &mut Object, attrs: CommonObjectAttrs) {
    obj.label = attrs.label;
    obj.flags = attrs.flags;
    obj.auth_id = attrs.auth_id;
    obj.user_consent = attrs.user_consent;
    obj.access_rules = attrs.access_rules;
}
