// SPDX-License-Identifier: MPL-2.0

//! Storage for captured DNG files
//!
//! Two destinations are supported: a managed media catalog (entries are
//! inserted as pending, written, then published) and a plain directory.
//! Every write goes through an [`OutputStream`] that is either committed or
//! aborted; an abandoned stream aborts itself so no partial file survives.

use crate::config::Config;
use crate::constants::{DEFAULT_ALBUM, DNG_MIME_TYPE, PICTURES_COLLECTION};
use crate::errors::CaptureError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Storage errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The requested destination does not exist
    Unavailable(String),
    /// Unknown catalog entry
    NotFound(String),
    /// Filesystem failure
    Io(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::Unavailable(msg) => write!(f, "storage unavailable: {}", msg),
            StorageError::NotFound(id) => write!(f, "catalog entry not found: {}", id),
            StorageError::Io(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<io::Error> for StorageError {
    fn from(err: io::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}

impl From<StorageError> for CaptureError {
    fn from(err: StorageError) -> Self {
        CaptureError::Io(err.to_string())
    }
}

/// Where captures are written
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageMode {
    /// Media catalog when one is configured, otherwise a directory
    #[default]
    Auto,
    /// Media catalog only
    Catalog,
    /// Directory only
    Direct,
}

impl fmt::Display for StorageMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageMode::Auto => write!(f, "auto"),
            StorageMode::Catalog => write!(f, "catalog"),
            StorageMode::Direct => write!(f, "direct"),
        }
    }
}

impl FromStr for StorageMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(StorageMode::Auto),
            "catalog" => Ok(StorageMode::Catalog),
            "direct" => Ok(StorageMode::Direct),
            other => Err(format!(
                "unknown storage mode '{}' (expected auto, catalog or direct)",
                other
            )),
        }
    }
}

/// Description of a new catalog entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub display_name: String,
    pub mime_type: String,
    /// Collection-relative folder, e.g. `Pictures/RawCapture`
    pub relative_path: String,
}

impl CatalogEntry {
    /// Entry for a DNG file in `album`
    pub fn dng(display_name: &str, album: &str) -> Self {
        Self {
            display_name: display_name.to_string(),
            mime_type: DNG_MIME_TYPE.to_string(),
            relative_path: format!("{}/{}", PICTURES_COLLECTION, album),
        }
    }
}

/// Handle to a catalog entry
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CatalogUri(pub String);

impl CatalogUri {
    const SCHEME: &'static str = "content://rawcapture/images/";

    fn from_id(id: &str) -> Self {
        Self(format!("{}{}", Self::SCHEME, id))
    }

    fn id(&self) -> &str {
        self.0.strip_prefix(Self::SCHEME).unwrap_or(&self.0)
    }
}

impl fmt::Display for CatalogUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Managed media storage
pub trait MediaCatalog: Send + Sync {
    /// Create a pending entry
    fn insert(&self, entry: &CatalogEntry) -> Result<CatalogUri, StorageError>;

    /// Writer for the entry's content
    fn open_output_stream(&self, uri: &CatalogUri) -> Result<Box<dyn Write + Send>, StorageError>;

    /// Make a fully written entry visible
    fn publish(&self, uri: &CatalogUri) -> Result<(), StorageError>;

    /// Remove an entry and its content
    fn delete(&self, uri: &CatalogUri) -> Result<(), StorageError>;

    /// Filesystem location of the entry, if it has one
    fn resolve(&self, uri: &CatalogUri) -> Option<PathBuf>;
}

/// Index record of an [`FsMediaCatalog`] entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogRecord {
    pub display_name: String,
    pub mime_type: String,
    pub relative_path: String,
    pub pending: bool,
    pub created: chrono::DateTime<chrono::Utc>,
}

/// Media catalog kept in a directory tree with a JSON index
///
/// Content lives at `<root>/<relative_path>/<display_name>`; the index at
/// `<root>/catalog.json`.
pub struct FsMediaCatalog {
    root: PathBuf,
    records: Mutex<BTreeMap<String, CatalogRecord>>,
}

impl FsMediaCatalog {
    const INDEX_FILE: &'static str = "catalog.json";

    /// Open (or create) a catalog rooted at `root`
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root)?;

        let index_path = root.join(Self::INDEX_FILE);
        let records = match fs::read(&index_path) {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(records) => records,
                Err(e) => {
                    warn!(path = %index_path.display(), error = %e, "Invalid catalog index, starting empty");
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        debug!(root = %root.display(), entries = records.len(), "Media catalog opened");
        Ok(Self {
            root,
            records: Mutex::new(records),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Published entries, oldest first
    pub fn published(&self) -> Vec<CatalogRecord> {
        let mut records: Vec<_> = self
            .lock()
            .values()
            .filter(|r| !r.pending)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.created);
        records
    }

    /// Number of entries still pending
    pub fn pending_count(&self) -> usize {
        self.lock().values().filter(|r| r.pending).count()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, CatalogRecord>> {
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn content_path(&self, record: &CatalogRecord) -> PathBuf {
        self.root
            .join(&record.relative_path)
            .join(&record.display_name)
    }

    fn persist(&self, records: &BTreeMap<String, CatalogRecord>) -> Result<(), StorageError> {
        let json = serde_json::to_vec_pretty(records)
            .map_err(|e| StorageError::Io(format!("catalog index: {}", e)))?;
        fs::write(self.root.join(Self::INDEX_FILE), json)?;
        Ok(())
    }

    /// Name not yet used in `folder`, adding ` (n)` before the extension
    fn unique_name(
        &self,
        records: &BTreeMap<String, CatalogRecord>,
        folder: &str,
        name: &str,
    ) -> String {
        let taken = |candidate: &str| {
            records
                .values()
                .any(|r| r.relative_path == folder && r.display_name == candidate)
                || self.root.join(folder).join(candidate).exists()
        };
        (0..)
            .map(|n| numbered_name(name, n))
            .find(|candidate| !taken(candidate))
            .unwrap_or_else(|| name.to_string())
    }
}

/// `name` for `n == 0`, otherwise `name` with ` (n)` before the extension
fn numbered_name(name: &str, n: u32) -> String {
    if n == 0 {
        return name.to_string();
    }
    match name.rsplit_once('.') {
        Some((stem, ext)) => format!("{} ({}).{}", stem, n, ext),
        None => format!("{} ({})", name, n),
    }
}

impl MediaCatalog for FsMediaCatalog {
    fn insert(&self, entry: &CatalogEntry) -> Result<CatalogUri, StorageError> {
        let mut records = self.lock();
        let display_name = self.unique_name(&records, &entry.relative_path, &entry.display_name);
        let id = uuid::Uuid::new_v4().to_string();
        records.insert(
            id.clone(),
            CatalogRecord {
                display_name,
                mime_type: entry.mime_type.clone(),
                relative_path: entry.relative_path.clone(),
                pending: true,
                created: chrono::Utc::now(),
            },
        );
        self.persist(&records)?;

        let uri = CatalogUri::from_id(&id);
        debug!(uri = %uri, "Catalog entry inserted");
        Ok(uri)
    }

    fn open_output_stream(&self, uri: &CatalogUri) -> Result<Box<dyn Write + Send>, StorageError> {
        let path = {
            let records = self.lock();
            let record = records
                .get(uri.id())
                .ok_or_else(|| StorageError::NotFound(uri.to_string()))?;
            self.content_path(record)
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(Box::new(BufWriter::new(File::create(&path)?)))
    }

    fn publish(&self, uri: &CatalogUri) -> Result<(), StorageError> {
        let mut records = self.lock();
        let record = records
            .get_mut(uri.id())
            .ok_or_else(|| StorageError::NotFound(uri.to_string()))?;
        record.pending = false;
        self.persist(&records)
    }

    fn delete(&self, uri: &CatalogUri) -> Result<(), StorageError> {
        let mut records = self.lock();
        let record = records
            .remove(uri.id())
            .ok_or_else(|| StorageError::NotFound(uri.to_string()))?;
        match fs::remove_file(self.content_path(&record)) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(uri = %uri, error = %e, "Failed to remove catalog content"),
        }
        self.persist(&records)
    }

    fn resolve(&self, uri: &CatalogUri) -> Option<PathBuf> {
        self.lock()
            .get(uri.id())
            .map(|record| self.content_path(record))
    }
}

/// Destination of one written file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    Catalog(CatalogUri),
    File(PathBuf),
}

impl fmt::Display for OutputTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputTarget::Catalog(uri) => write!(f, "{}", uri),
            OutputTarget::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// A committed output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub target: OutputTarget,
    /// Filesystem path of the content, when known
    pub path: Option<PathBuf>,
    pub bytes: u64,
}

/// Resolves where a new capture goes
#[derive(Clone)]
pub struct PhotoStorage {
    mode: StorageMode,
    catalog: Option<Arc<dyn MediaCatalog>>,
    direct_dir: PathBuf,
    album: String,
}

impl PhotoStorage {
    pub fn new(
        mode: StorageMode,
        catalog: Option<Arc<dyn MediaCatalog>>,
        direct_dir: PathBuf,
        album: &str,
    ) -> Self {
        Self {
            mode,
            catalog,
            direct_dir,
            album: album.to_string(),
        }
    }

    /// Storage described by the user configuration
    ///
    /// A catalog that cannot be opened is logged and left out, so `Auto`
    /// falls back to direct writes.
    pub fn from_config(config: &Config) -> Self {
        let catalog = config.catalog_root.as_ref().and_then(|root| {
            match FsMediaCatalog::open(root) {
                Ok(catalog) => Some(Arc::new(catalog) as Arc<dyn MediaCatalog>),
                Err(e) => {
                    warn!(root = %root.display(), error = %e, "Media catalog unavailable");
                    None
                }
            }
        });
        Self::new(
            config.storage_mode,
            catalog,
            config.direct_dir(),
            &config.album_name,
        )
    }

    /// Directory-only storage
    pub fn direct(dir: PathBuf) -> Self {
        Self::new(StorageMode::Direct, None, dir, DEFAULT_ALBUM)
    }

    pub fn mode(&self) -> StorageMode {
        self.mode
    }

    pub fn direct_dir(&self) -> &Path {
        &self.direct_dir
    }

    /// Open a stream for a new file named `file_name`
    pub fn open(&self, file_name: &str) -> Result<OutputStream, StorageError> {
        match (self.mode, &self.catalog) {
            (StorageMode::Catalog | StorageMode::Auto, Some(catalog)) => {
                self.open_catalog(Arc::clone(catalog), file_name)
            }
            (StorageMode::Catalog, None) => Err(StorageError::Unavailable(
                "no media catalog configured".into(),
            )),
            (StorageMode::Auto | StorageMode::Direct, _) => self.open_direct(file_name),
        }
    }

    fn open_catalog(
        &self,
        catalog: Arc<dyn MediaCatalog>,
        file_name: &str,
    ) -> Result<OutputStream, StorageError> {
        let uri = catalog.insert(&CatalogEntry::dng(file_name, &self.album))?;
        let writer = match catalog.open_output_stream(&uri) {
            Ok(writer) => writer,
            Err(e) => {
                if let Err(delete_err) = catalog.delete(&uri) {
                    warn!(uri = %uri, error = %delete_err, "Failed to remove pending entry");
                }
                return Err(e);
            }
        };
        debug!(uri = %uri, "Writing to media catalog");
        Ok(OutputStream {
            target: OutputTarget::Catalog(uri),
            writer: Some(writer),
            catalog: Some(catalog),
            bytes: 0,
        })
    }

    fn open_direct(&self, file_name: &str) -> Result<OutputStream, StorageError> {
        fs::create_dir_all(&self.direct_dir)?;
        // Existing files are never opened, so abort only removes what this stream created
        let mut n = 0;
        let (path, file) = loop {
            let path = self.direct_dir.join(numbered_name(file_name, n));
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => break (path, file),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => n += 1,
                Err(e) => return Err(e.into()),
            }
        };
        debug!(path = %path.display(), "Writing to directory");
        Ok(OutputStream {
            target: OutputTarget::File(path),
            writer: Some(Box::new(BufWriter::new(file))),
            catalog: None,
            bytes: 0,
        })
    }
}

/// Scoped writer for one output file
///
/// Finish with [`commit`](OutputStream::commit) or
/// [`abort`](OutputStream::abort). Dropping an unfinished stream aborts it.
pub struct OutputStream {
    target: OutputTarget,
    writer: Option<Box<dyn Write + Send>>,
    catalog: Option<Arc<dyn MediaCatalog>>,
    bytes: u64,
}

impl OutputStream {
    pub fn target(&self) -> &OutputTarget {
        &self.target
    }

    /// Flush, close and publish the output
    pub fn commit(mut self) -> Result<StoredFile, StorageError> {
        if let Some(mut writer) = self.writer.take()
            && let Err(e) = writer.flush()
        {
            drop(writer);
            self.discard();
            return Err(e.into());
        }

        let path = match &self.target {
            OutputTarget::Catalog(uri) => {
                let Some(catalog) = self.catalog.take() else {
                    return Err(StorageError::Unavailable("catalog handle lost".into()));
                };
                if let Err(e) = catalog.publish(uri) {
                    self.catalog = Some(catalog);
                    self.discard();
                    return Err(e);
                }
                catalog.resolve(uri)
            }
            OutputTarget::File(path) => Some(path.clone()),
        };

        info!(target = %self.target, bytes = self.bytes, "Output committed");
        Ok(StoredFile {
            target: self.target.clone(),
            path,
            bytes: self.bytes,
        })
    }

    /// Close the output and remove whatever was written
    pub fn abort(mut self) {
        self.discard();
    }

    fn discard(&mut self) {
        drop(self.writer.take());
        match &self.target {
            OutputTarget::Catalog(uri) => {
                if let Some(catalog) = self.catalog.take()
                    && let Err(e) = catalog.delete(uri)
                {
                    warn!(uri = %uri, error = %e, "Failed to delete aborted entry");
                }
            }
            OutputTarget::File(path) => {
                if let Err(e) = fs::remove_file(path)
                    && e.kind() != io::ErrorKind::NotFound
                {
                    warn!(path = %path.display(), error = %e, "Failed to remove aborted file");
                }
            }
        }
        debug!(target = %self.target, "Output aborted");
    }

    fn is_finished(&self) -> bool {
        self.writer.is_none() && self.catalog.is_none()
    }
}

impl Write for OutputStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "output stream closed"))?;
        let n = writer.write(buf)?;
        self.bytes += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.writer.as_mut() {
            Some(writer) => writer.flush(),
            None => Ok(()),
        }
    }
}

impl Drop for OutputStream {
    fn drop(&mut self) {
        if !self.is_finished() {
            warn!(target = %self.target, "Output stream dropped without commit, discarding");
            self.discard();
        }
    }
}
