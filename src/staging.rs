//! Staging stores hold selected items between selection and conversion.
//!
//! Three backends share the [`StagingStore`] trait:
//!
//! - [`MemoryStore`]: a plain vector, gone when the process exits.
//! - [`SessionStore`]: one JSON file with payloads inlined as data URLs.
//! - [`DirStore`]: a directory with a `manifest.json` index and one blob
//!   file per record, so payloads are only read back when converting.
//!
//! All of them enforce the same [`Limits`] when adding files.

use crate::config::Limits;
use crate::error::StoreError;
use crate::item::{Item, ItemKind, classify};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};

/// Why a file was not staged.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    Unsupported,
    TooLarge { size: u64, max: u64 },
    TotalExceeded { max: u64 },
    TooManyFiles { max: usize },
    Unreadable(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Unsupported => write!(f, "not an image or text file"),
            SkipReason::TooLarge { size, max } => {
                write!(f, "file is too large ({} bytes, max {})", size, max)
            }
            SkipReason::TotalExceeded { max } => {
                write!(f, "would exceed the total size limit of {} bytes", max)
            }
            SkipReason::TooManyFiles { max } => write!(f, "only {} files can be staged", max),
            SkipReason::Unreadable(e) => write!(f, "could not be read: {}", e),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Skipped {
    pub name: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AddReport {
    pub added: usize,
    pub skipped: Vec<Skipped>,
}

impl AddReport {
    fn merge(&mut self, skipped: Vec<Skipped>) {
        let mut skipped = skipped;
        skipped.append(&mut self.skipped);
        self.skipped = skipped;
    }
}

/// Read files from disk, setting aside the ones that are unsupported or
/// unreadable.
pub fn load_paths<P: AsRef<Path>>(paths: &[P]) -> (Vec<Item>, Vec<Skipped>) {
    let mut items = Vec::new();
    let mut skipped = Vec::new();
    for path in paths {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        if classify(&name, "").is_none() {
            skipped.push(Skipped {
                name,
                reason: SkipReason::Unsupported,
            });
            continue;
        }
        match Item::from_path(path) {
            Ok(item) => items.push(item),
            Err(e) => skipped.push(Skipped {
                name,
                reason: SkipReason::Unreadable(e.to_string()),
            }),
        }
    }
    (items, skipped)
}

/// Split `incoming` into items that fit the limits and the ones that do not.
fn admit(existing: &[u64], incoming: Vec<Item>, limits: &Limits) -> (Vec<Item>, AddReport) {
    let mut report = AddReport::default();
    if existing.len() + incoming.len() > limits.max_files {
        report.skipped = incoming
            .into_iter()
            .map(|item| Skipped {
                name: item.name,
                reason: SkipReason::TooManyFiles {
                    max: limits.max_files,
                },
            })
            .collect();
        return (Vec::new(), report);
    }

    let mut total: u64 = existing.iter().sum();
    let mut accepted = Vec::new();
    for item in incoming {
        let size = item.size();
        if size > limits.max_file_size {
            report.skipped.push(Skipped {
                name: item.name,
                reason: SkipReason::TooLarge {
                    size,
                    max: limits.max_file_size,
                },
            });
            continue;
        }
        if total + size > limits.max_total_size {
            report.skipped.push(Skipped {
                name: item.name,
                reason: SkipReason::TotalExceeded {
                    max: limits.max_total_size,
                },
            });
            continue;
        }
        if size > limits.large_file_warning {
            warn!(
                "[stage] {} is {} bytes; large files use a lot of memory during conversion",
                item.name, size
            );
        }
        total += size;
        accepted.push(item);
    }
    report.added = accepted.len();
    (accepted, report)
}

fn move_within<T>(list: &mut Vec<T>, from: usize, to: usize) -> bool {
    if from >= list.len() || to >= list.len() {
        return false;
    }
    let item = list.remove(from);
    list.insert(to, item);
    true
}

pub trait StagingStore {
    /// Append items in order, skipping those that break the limits.
    fn add_files(&mut self, items: Vec<Item>) -> Result<AddReport, StoreError>;

    /// All staged items in their current order.
    fn get_files(&self) -> Result<Vec<Item>, StoreError>;

    /// Remove the item at `index`; out of range is a no-op.
    fn remove_at(&mut self, index: usize) -> Result<(), StoreError>;

    /// Move the item at `from` to position `to`; out of range is a no-op.
    fn move_item(&mut self, from: usize, to: usize) -> Result<(), StoreError>;

    fn clear(&mut self) -> Result<(), StoreError>;

    fn len(&self) -> Result<usize, StoreError> {
        Ok(self.get_files()?.len())
    }

    fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }

    /// Read files from disk and stage them, reporting unsupported ones too.
    fn add_paths(&mut self, paths: &[PathBuf]) -> Result<AddReport, StoreError> {
        let (items, skipped) = load_paths(paths);
        let mut report = self.add_files(items)?;
        report.merge(skipped);
        Ok(report)
    }
}

// --- In-memory ---

#[derive(Debug, Default)]
pub struct MemoryStore {
    items: Vec<Item>,
    limits: Limits,
}

impl MemoryStore {
    pub fn new(limits: Limits) -> Self {
        MemoryStore {
            items: Vec::new(),
            limits,
        }
    }

    /// Hand the staged items over, leaving the store empty.
    pub fn take(&mut self) -> Vec<Item> {
        std::mem::take(&mut self.items)
    }
}

impl StagingStore for MemoryStore {
    fn add_files(&mut self, items: Vec<Item>) -> Result<AddReport, StoreError> {
        let sizes: Vec<u64> = self.items.iter().map(Item::size).collect();
        let (accepted, report) = admit(&sizes, items, &self.limits);
        self.items.extend(accepted);
        Ok(report)
    }

    fn get_files(&self) -> Result<Vec<Item>, StoreError> {
        Ok(self.items.clone())
    }

    fn remove_at(&mut self, index: usize) -> Result<(), StoreError> {
        if index < self.items.len() {
            self.items.remove(index);
        }
        Ok(())
    }

    fn move_item(&mut self, from: usize, to: usize) -> Result<(), StoreError> {
        move_within(&mut self.items, from, to);
        Ok(())
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        self.items.clear();
        Ok(())
    }

    fn len(&self) -> Result<usize, StoreError> {
        Ok(self.items.len())
    }
}

// --- Session file ---

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionRecord {
    kind: ItemKind,
    name: String,
    #[serde(rename = "type")]
    mime: String,
    #[serde(rename = "dataUrl", default, skip_serializing_if = "Option::is_none")]
    data_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

pub fn to_data_url(mime: &str, data: &[u8]) -> String {
    format!("data:{};base64,{}", mime, STANDARD.encode(data))
}

pub fn from_data_url(url: &str) -> Option<Vec<u8>> {
    let rest = url.strip_prefix("data:")?;
    let (meta, payload) = rest.split_once(',')?;
    if !meta.ends_with(";base64") {
        return None;
    }
    STANDARD.decode(payload).ok()
}

/// Byte length of a base64 payload without decoding it.
fn decoded_len(payload: &str) -> u64 {
    let padding = payload.bytes().rev().take_while(|&b| b == b'=').count() as u64;
    (payload.len() as u64 / 4 * 3).saturating_sub(padding)
}

impl SessionRecord {
    fn from_item(item: Item) -> Self {
        match item.kind {
            ItemKind::Image => SessionRecord {
                data_url: Some(to_data_url(&item.mime, &item.data)),
                kind: item.kind,
                name: item.name,
                mime: item.mime,
                text: None,
            },
            ItemKind::Text => SessionRecord {
                text: Some(String::from_utf8_lossy(&item.data).into_owned()),
                kind: item.kind,
                name: item.name,
                mime: "text/plain".into(),
                data_url: None,
            },
        }
    }

    fn size(&self) -> u64 {
        match (&self.text, &self.data_url) {
            (Some(text), _) => text.len() as u64,
            (None, Some(url)) => url.split_once(',').map(|(_, p)| decoded_len(p)).unwrap_or(0),
            (None, None) => 0,
        }
    }

    fn to_item(&self) -> Result<Item, StoreError> {
        let data = match (&self.text, &self.data_url) {
            (Some(text), _) => text.clone().into_bytes(),
            (None, Some(url)) => from_data_url(url).ok_or_else(|| StoreError::Payload {
                name: self.name.clone(),
                reason: "malformed data URL".into(),
            })?,
            (None, None) => {
                return Err(StoreError::Payload {
                    name: self.name.clone(),
                    reason: "record has no payload".into(),
                });
            }
        };
        Ok(Item {
            name: self.name.clone(),
            mime: self.mime.clone(),
            kind: self.kind,
            data,
        })
    }
}

/// Session-scoped store backed by a single JSON file.
#[derive(Debug)]
pub struct SessionStore {
    path: PathBuf,
    limits: Limits,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>, limits: Limits) -> Self {
        SessionStore {
            path: path.into(),
            limits,
        }
    }

    /// Missing or unreadable state reads as an empty list.
    fn read(&self) -> Vec<SessionRecord> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) => {
                debug!("[stage] no session state at {}: {}", self.path.display(), e);
                return Vec::new();
            }
        };
        match serde_json::from_str(&raw) {
            Ok(records) => records,
            Err(e) => {
                error!("[stage] failed to parse stored files in {}: {}", self.path.display(), e);
                Vec::new()
            }
        }
    }

    fn write(&self, records: &[SessionRecord]) -> Result<(), StoreError> {
        let json = serde_json::to_string(records)?;
        write_atomic(&self.path, json.as_bytes())
    }
}

fn write_atomic(path: &Path, data: &[u8]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, data)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

impl StagingStore for SessionStore {
    fn add_files(&mut self, items: Vec<Item>) -> Result<AddReport, StoreError> {
        let mut records = self.read();
        let sizes: Vec<u64> = records.iter().map(SessionRecord::size).collect();
        let (accepted, report) = admit(&sizes, items, &self.limits);
        records.extend(accepted.into_iter().map(SessionRecord::from_item));
        self.write(&records)?;
        Ok(report)
    }

    fn get_files(&self) -> Result<Vec<Item>, StoreError> {
        self.read().iter().map(SessionRecord::to_item).collect()
    }

    fn remove_at(&mut self, index: usize) -> Result<(), StoreError> {
        let mut records = self.read();
        if index >= records.len() {
            return Ok(());
        }
        records.remove(index);
        self.write(&records)
    }

    fn move_item(&mut self, from: usize, to: usize) -> Result<(), StoreError> {
        let mut records = self.read();
        if move_within(&mut records, from, to) {
            self.write(&records)?;
        }
        Ok(())
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn len(&self) -> Result<usize, StoreError> {
        Ok(self.read().len())
    }
}

// --- Directory database ---

const MANIFEST: &str = "manifest.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DirRecord {
    id: u64,
    order: usize,
    kind: ItemKind,
    name: String,
    #[serde(rename = "type")]
    mime: String,
    size: u64,
    blob: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Manifest {
    next_id: u64,
    records: Vec<DirRecord>,
}

impl Manifest {
    fn sorted(mut self) -> Self {
        self.records.sort_by_key(|r| r.order);
        self
    }

    fn renumber(&mut self) {
        for (i, record) in self.records.iter_mut().enumerate() {
            record.order = i;
        }
    }
}

/// Local per-directory database: an ordered manifest plus blob files.
#[derive(Debug)]
pub struct DirStore {
    dir: PathBuf,
    limits: Limits,
}

impl DirStore {
    pub fn open(dir: impl Into<PathBuf>, limits: Limits) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(DirStore { dir, limits })
    }

    fn manifest_path(&self) -> PathBuf {
        self.dir.join(MANIFEST)
    }

    fn read(&self) -> Result<Manifest, StoreError> {
        let path = self.manifest_path();
        if !path.exists() {
            return Ok(Manifest {
                next_id: 1,
                records: Vec::new(),
            });
        }
        let raw = fs::read_to_string(path)?;
        let manifest: Manifest = serde_json::from_str(&raw)?;
        Ok(manifest.sorted())
    }

    fn write(&self, manifest: &Manifest) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(manifest)?;
        write_atomic(&self.manifest_path(), json.as_bytes())
    }
}

impl StagingStore for DirStore {
    fn add_files(&mut self, items: Vec<Item>) -> Result<AddReport, StoreError> {
        let mut manifest = self.read()?;
        let sizes: Vec<u64> = manifest.records.iter().map(|r| r.size).collect();
        let (accepted, report) = admit(&sizes, items, &self.limits);
        let start = manifest.records.len();
        for (i, item) in accepted.into_iter().enumerate() {
            let id = manifest.next_id;
            manifest.next_id += 1;
            let blob = format!("{}.bin", id);
            fs::write(self.dir.join(&blob), &item.data)?;
            manifest.records.push(DirRecord {
                id,
                order: start + i,
                kind: item.kind,
                size: item.size(),
                name: item.name,
                mime: item.mime,
                blob,
            });
        }
        self.write(&manifest)?;
        Ok(report)
    }

    fn get_files(&self) -> Result<Vec<Item>, StoreError> {
        let manifest = self.read()?;
        manifest
            .records
            .iter()
            .map(|record| {
                let data = fs::read(self.dir.join(&record.blob)).map_err(|e| {
                    if e.kind() == std::io::ErrorKind::NotFound {
                        StoreError::MissingBlob(record.id)
                    } else {
                        StoreError::Io(e)
                    }
                })?;
                Ok(Item {
                    name: record.name.clone(),
                    mime: record.mime.clone(),
                    kind: record.kind,
                    data,
                })
            })
            .collect()
    }

    fn remove_at(&mut self, index: usize) -> Result<(), StoreError> {
        let mut manifest = self.read()?;
        if index >= manifest.records.len() {
            return Ok(());
        }
        let record = manifest.records.remove(index);
        if let Err(e) = fs::remove_file(self.dir.join(&record.blob)) {
            warn!("[stage] could not delete blob {}: {}", record.blob, e);
        }
        manifest.renumber();
        self.write(&manifest)
    }

    fn move_item(&mut self, from: usize, to: usize) -> Result<(), StoreError> {
        let mut manifest = self.read()?;
        if move_within(&mut manifest.records, from, to) {
            manifest.renumber();
            self.write(&manifest)?;
        }
        Ok(())
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        let mut manifest = self.read()?;
        for record in manifest.records.drain(..) {
            if let Err(e) = fs::remove_file(self.dir.join(&record.blob)) {
                warn!("[stage] could not delete blob {}: {}", record.blob, e);
            }
        }
        self.write(&manifest)
    }

    fn len(&self) -> Result<usize, StoreError> {
        Ok(self.read()?.records.len())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreKind {
    Memory,
    Session,
    Dir,
}

/// Open a store of the given kind. `path` is the session file or the
/// database directory; it is ignored for the in-memory store.
pub fn open_store(kind: StoreKind, path: &Path, limits: Limits) -> Result<Box<dyn StagingStore>, StoreError> {
    Ok(match kind {
        StoreKind::Memory => Box::new(MemoryStore::new(limits)),
        StoreKind::Session => Box::new(SessionStore::new(path, limits)),
        StoreKind::Dir => Box::new(DirStore::open(path, limits)?),
    })
}
