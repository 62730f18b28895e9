//! The storer façade and its filesystem implementation
//!
//! [`Storer`] is the narrow interface the rest of a document-management system talks to:
//! store, read, size, list, delete and migrate the resources of a document. Every call
//! names the storage area explicitly; the storer never decides on its own where a
//! document lives.
//!
//! [`FsStorer`] implements it on top of the configured [`StorageAreas`].
//!
//! # Concurrency
//!
//! The API is synchronous and blocking, and a storer is `Send + Sync`: share it between
//! request threads behind an `Arc`. Different `(document, resource)` keys map to different
//! files and need no coordination. For the same key, every write lands in a temporary file
//! and is renamed into place, so a reader sees either the complete old content or the
//! complete new content. A stream that is already open keeps reading the content it opened
//! even if a writer replaces the file meanwhile.

use crate::area::capacity_or_io;
use crate::{
    FilesError, FilesResult, MigrationCoordinator, MigrationReport, Resources, StorageArea,
    StorageAreas, StoreConfig,
};
use chrono::{DateTime, Utc};
use docstore_naming::ResourceName;
use docstore_types::{DocId, DocumentRef, FileVersion, StorageId};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{self, BufReader, Read};
use std::path::Path;
use std::str::FromStr;

/// Character set used to decode a resource into a string.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Charset {
    #[default]
    Utf8,
    /// ISO-8859-1: every byte is the code point of the same value.
    Latin1,
}

impl Charset {
    /// Decodes `bytes`. Invalid input is an I/O error of kind `InvalidData`.
    pub fn decode(self, bytes: Vec<u8>) -> io::Result<String> {
        match self {
            Charset::Utf8 => {
                String::from_utf8(bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
            }
            Charset::Latin1 => Ok(bytes.into_iter().map(char::from).collect()),
        }
    }
}

impl FromStr for Charset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Ok(Charset::Utf8),
            "iso-8859-1" | "latin1" | "latin-1" => Ok(Charset::Latin1),
            other => Err(format!("unsupported charset: {}", other)),
        }
    }
}

/// Metadata of a stored resource.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct ResourceInfo {
    pub doc_id: DocId,
    pub resource: ResourceName,
    pub storage_id: StorageId,
    pub size_bytes: u64,
    /// Last time the content was replaced
    pub modified_at: DateTime<Utc>,
}

/// Store, read and manage the resources of documents on storage areas.
pub trait Storer: Send + Sync {
    /// Stores `source` as `resource` of `doc_id`, replacing any previous content.
    ///
    /// Returns the number of bytes written. On failure the previous content, if any, is
    /// left untouched.
    fn store(
        &self,
        area: StorageId,
        source: &mut dyn Read,
        doc_id: DocId,
        resource: &ResourceName,
    ) -> FilesResult<u64>;

    /// Stores the content of a local file.
    fn store_file(
        &self,
        area: StorageId,
        source_path: &Path,
        doc_id: DocId,
        resource: &ResourceName,
    ) -> FilesResult<u64> {
        let mut file = fs::File::open(source_path).map_err(|e| {
            FilesError::Io(io::Error::new(
                e.kind(),
                format!(
                    "Failed to open source file {}: {}",
                    source_path.display(),
                    e
                ),
            ))
        })?;
        self.store(area, &mut file, doc_id, resource)
    }

    /// Opens the resource for reading.
    ///
    /// # Errors
    ///
    /// [`FilesError::NotFound`] if the resource does not exist.
    fn get_stream(
        &self,
        area: StorageId,
        doc_id: DocId,
        resource: &ResourceName,
    ) -> FilesResult<Box<dyn Read + Send>>;

    /// Reads the whole resource into memory.
    fn get_bytes(
        &self,
        area: StorageId,
        doc_id: DocId,
        resource: &ResourceName,
    ) -> FilesResult<Vec<u8>> {
        let mut stream = self.get_stream(area, doc_id, resource)?;
        let mut buffer = Vec::new();
        stream.read_to_end(&mut buffer)?;
        Ok(buffer)
    }

    /// Reads the whole resource and decodes it with `charset`.
    fn get_string(
        &self,
        area: StorageId,
        doc_id: DocId,
        resource: &ResourceName,
        charset: Charset,
    ) -> FilesResult<String> {
        let bytes = self.get_bytes(area, doc_id, resource)?;
        Ok(charset.decode(bytes)?)
    }

    /// Copies the resource into a local file, creating or truncating `dest`.
    fn write_to_file(
        &self,
        area: StorageId,
        doc_id: DocId,
        resource: &ResourceName,
        dest: &Path,
    ) -> FilesResult<u64> {
        let mut stream = self.get_stream(area, doc_id, resource)?;
        let mut out = fs::File::create(dest).map_err(|e| {
            FilesError::Io(io::Error::new(
                e.kind(),
                format!("Failed to create {}: {}", dest.display(), e),
            ))
        })?;
        Ok(io::copy(&mut stream, &mut out)?)
    }

    /// Hex SHA-256 of the resource content.
    fn digest(
        &self,
        area: StorageId,
        doc_id: DocId,
        resource: &ResourceName,
    ) -> FilesResult<String> {
        let mut stream = self.get_stream(area, doc_id, resource)?;
        let mut hasher = Sha256::new();
        io::copy(&mut stream, &mut hasher)?;
        Ok(hex::encode(hasher.finalize()))
    }

    /// Size in bytes, or `0` if the resource does not exist.
    fn size(&self, area: StorageId, doc_id: DocId, resource: &ResourceName) -> FilesResult<u64>;

    fn exists(&self, area: StorageId, doc_id: DocId, resource: &ResourceName)
        -> FilesResult<bool>;

    /// Size and modification time of a resource.
    fn info(
        &self,
        area: StorageId,
        doc_id: DocId,
        resource: &ResourceName,
    ) -> FilesResult<ResourceInfo>;

    /// Deletes one resource. Deleting an absent resource succeeds.
    fn delete(&self, area: StorageId, doc_id: DocId, resource: &ResourceName) -> FilesResult<()>;

    /// Deletes every resource of a document and returns how many were removed.
    fn delete_all(&self, area: StorageId, doc_id: DocId) -> FilesResult<usize> {
        let resources = self
            .list_resources(area, doc_id, None)?
            .collect::<FilesResult<Vec<_>>>()?;
        for resource in &resources {
            self.delete(area, doc_id, resource)?;
        }
        Ok(resources.len())
    }

    /// Lists the resources of a document, optionally only those of one version.
    ///
    /// The listing is recomputed from disk on every call.
    fn list_resources(
        &self,
        area: StorageId,
        doc_id: DocId,
        version: Option<&FileVersion>,
    ) -> FilesResult<Resources>;

    /// Name of the resource for `(version, suffix)`.
    fn resource_name(
        &self,
        version: Option<&FileVersion>,
        suffix: Option<&str>,
    ) -> FilesResult<ResourceName> {
        Ok(ResourceName::new(version, suffix)?)
    }

    /// Name of a resource of `doc`. Without a version, the document's current file
    /// version is used.
    fn resource_name_for(
        &self,
        doc: &DocumentRef,
        version: Option<&FileVersion>,
        suffix: Option<&str>,
    ) -> FilesResult<ResourceName> {
        self.resource_name(Some(version.unwrap_or(&doc.file_version)), suffix)
    }

    /// Moves every resource of `doc_id` from `source` to `target`.
    ///
    /// Best-effort: a failing resource is recorded in the report and the others are still
    /// attempted.
    fn move_resources_to_store(
        &self,
        doc_id: DocId,
        source: StorageId,
        target: StorageId,
    ) -> FilesResult<MigrationReport>;
}

/// Filesystem-backed [`Storer`].
///
/// Stateless apart from its configuration. Clones share nothing but configuration values.
#[derive(Debug, Clone)]
pub struct FsStorer {
    config: StoreConfig,
}

impl FsStorer {
    pub fn new(config: StoreConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn areas(&self) -> &StorageAreas {
        self.config.areas()
    }

    /// Looks up a configured storage area.
    pub fn area(&self, id: StorageId) -> FilesResult<&StorageArea> {
        self.config.areas().get(id)
    }
}

impl Storer for FsStorer {
    /// Stores a resource atomically
    ///
    /// The content is streamed into a hidden temporary file in the document directory,
    /// flushed to disk, and renamed over the final name. Concurrent readers of the same
    /// resource see either the old or the new content, never a mix.
    ///
    /// # Errors
    ///
    /// Returns `FilesError` if:
    /// - `area` is not configured
    /// - The source cannot be read (I/O)
    /// - The area is full or read-only (capacity)
    /// - Directory creation, write or rename fails (I/O)
    fn store(
        &self,
        area: StorageId,
        source: &mut dyn Read,
        doc_id: DocId,
        resource: &ResourceName,
    ) -> FilesResult<u64> {
        let storage = self.area(area)?;
        let staged = storage.stage(doc_id, source)?;
        let sha256 = staged.sha256();
        let bytes = staged.commit(resource)?;

        tracing::debug!(
            "stored {} of document {} on area {} ({} bytes, sha256 {})",
            resource,
            doc_id,
            area,
            bytes,
            sha256
        );
        Ok(bytes)
    }

    /// Opens a resource for reading
    ///
    /// The returned stream reads from the file as it was when opened: a concurrent store
    /// replaces the directory entry, not the content already opened.
    ///
    /// # Errors
    ///
    /// Returns `FilesError` if:
    /// - `area` is not configured
    /// - The resource does not exist (not found)
    /// - The file cannot be opened (I/O)
    fn get_stream(
        &self,
        area: StorageId,
        doc_id: DocId,
        resource: &ResourceName,
    ) -> FilesResult<Box<dyn Read + Send>> {
        let storage = self.area(area)?;
        let path = storage.resolve(doc_id, resource);

        match fs::File::open(&path) {
            Ok(file) => Ok(Box::new(BufReader::new(file))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(FilesError::NotFound {
                doc_id,
                resource: resource.clone(),
            }),
            Err(e) => Err(capacity_or_io(area, e, format!("open {}", path.display()))),
        }
    }

    fn size(&self, area: StorageId, doc_id: DocId, resource: &ResourceName) -> FilesResult<u64> {
        let path = self.area(area)?.resolve(doc_id, resource);
        match fs::metadata(&path) {
            Ok(metadata) if metadata.is_file() => Ok(metadata.len()),
            Ok(_) => Ok(0),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(capacity_or_io(area, e, format!("stat {}", path.display()))),
        }
    }

    fn exists(
        &self,
        area: StorageId,
        doc_id: DocId,
        resource: &ResourceName,
    ) -> FilesResult<bool> {
        let path = self.area(area)?.resolve(doc_id, resource);
        match fs::metadata(&path) {
            Ok(metadata) => Ok(metadata.is_file()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(capacity_or_io(area, e, format!("stat {}", path.display()))),
        }
    }

    fn info(
        &self,
        area: StorageId,
        doc_id: DocId,
        resource: &ResourceName,
    ) -> FilesResult<ResourceInfo> {
        let path = self.area(area)?.resolve(doc_id, resource);
        let metadata = match fs::metadata(&path) {
            Ok(metadata) if metadata.is_file() => metadata,
            Ok(_) => {
                return Err(FilesError::NotFound {
                    doc_id,
                    resource: resource.clone(),
                })
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(FilesError::NotFound {
                    doc_id,
                    resource: resource.clone(),
                })
            }
            Err(e) => return Err(capacity_or_io(area, e, format!("stat {}", path.display()))),
        };

        Ok(ResourceInfo {
            doc_id,
            resource: resource.clone(),
            storage_id: area,
            size_bytes: metadata.len(),
            modified_at: DateTime::<Utc>::from(metadata.modified()?),
        })
    }

    fn delete(&self, area: StorageId, doc_id: DocId, resource: &ResourceName) -> FilesResult<()> {
        let path = self.area(area)?.resolve(doc_id, resource);
        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::debug!(
                    "deleted {} of document {} on area {}",
                    resource,
                    doc_id,
                    area
                );
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(capacity_or_io(area, e, format!("delete {}", path.display()))),
        }
    }

    fn list_resources(
        &self,
        area: StorageId,
        doc_id: DocId,
        version: Option<&FileVersion>,
    ) -> FilesResult<Resources> {
        Ok(self
            .area(area)?
            .list_resources(doc_id)?
            .with_version(version.cloned()))
    }

    fn move_resources_to_store(
        &self,
        doc_id: DocId,
        source: StorageId,
        target: StorageId,
    ) -> FilesResult<MigrationReport> {
        MigrationCoordinator::new(self.areas()).move_document(doc_id, source, target)
    }
}
