//! Storage areas: one root directory tree each.

use crate::constants::{COPY_BUFFER_SIZE, TEMP_FILE_PREFIX, TEMP_FILE_SUFFIX};
use crate::{FilesError, FilesResult};
use docstore_naming::{PathMapper, ResourceName};
use docstore_types::{DocId, FileVersion, StorageId};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// One physical storage root, identified by a numeric id.
///
/// A storage area knows how to turn `(document id, resource name)` into an absolute path
/// and how to write there atomically. It holds no other state, so any number of
/// `StorageArea` values (in any number of processes) pointing at the same root agree on
/// where every resource lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageArea {
    id: StorageId,
    root: PathBuf,
    mapper: PathMapper,
}

impl StorageArea {
    /// Creates a storage area using the default three-digit sharding.
    pub fn new(id: StorageId, root: impl Into<PathBuf>) -> Self {
        Self::with_mapper(id, root, PathMapper::default())
    }

    pub fn with_mapper(id: StorageId, root: impl Into<PathBuf>, mapper: PathMapper) -> Self {
        Self {
            id,
            root: root.into(),
            mapper,
        }
    }

    pub fn id(&self) -> StorageId {
        self.id
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn mapper(&self) -> &PathMapper {
        &self.mapper
    }

    /// Checks that the root exists and is a directory.
    ///
    /// Roots are otherwise created lazily with the first document directory, so this is
    /// only needed where a missing root should be reported rather than created.
    pub fn check_root(&self) -> FilesResult<()> {
        if !self.root.exists() {
            return Err(FilesError::InvalidRootDirectory(format!(
                "Directory does not exist: {}",
                self.root.display()
            )));
        }
        if !self.root.is_dir() {
            return Err(FilesError::InvalidRootDirectory(format!(
                "Path is not a directory: {}",
                self.root.display()
            )));
        }
        Ok(())
    }

    /// Directory holding all resources of `doc_id`. May not exist yet.
    pub fn document_dir(&self, doc_id: DocId) -> PathBuf {
        self.mapper.sharded_dir(&self.root, doc_id)
    }

    /// Absolute path of a resource: `<root>/<sharded dir>/<resource>`.
    pub fn resolve(&self, doc_id: DocId, resource: &ResourceName) -> PathBuf {
        self.document_dir(doc_id).join(resource.as_str())
    }

    /// Creates the document directory if it is absent.
    ///
    /// Losing a creation race against another writer is not an error.
    pub fn ensure_document_dir(&self, doc_id: DocId) -> FilesResult<PathBuf> {
        let dir = self.document_dir(doc_id);
        fs::create_dir_all(&dir)
            .map_err(|e| self.io_failure(e, format!("create directory {}", dir.display())))?;
        Ok(dir)
    }

    /// Lists the resources currently present for `doc_id`.
    ///
    /// A document without a directory has no resources; this is not an error. The listing
    /// is read lazily from disk and never cached.
    pub fn list_resources(&self, doc_id: DocId) -> FilesResult<Resources> {
        let dir = self.document_dir(doc_id);
        match fs::read_dir(&dir) {
            Ok(entries) => Ok(Resources {
                entries: Some(entries),
                dir,
                version: None,
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Resources::empty(dir)),
            Err(e) => Err(self.io_failure(e, format!("list directory {}", dir.display()))),
        }
    }

    /// Copies `source` into a hidden temporary file inside the document directory.
    ///
    /// Nothing is visible under the resource's name until [`StagedFile::commit`] is called.
    /// Dropping the staged file removes it.
    pub(crate) fn stage(&self, doc_id: DocId, source: &mut dyn Read) -> FilesResult<StagedFile> {
        let dir = self.ensure_document_dir(doc_id)?;
        let temp = match self.create_temp(&dir) {
            Ok(temp) => temp,
            // the directory was removed under us, e.g. by a migration cleaning up
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                self.ensure_document_dir(doc_id)?;
                self.create_temp(&dir).map_err(|e| {
                    self.io_failure(e, format!("create temporary file in {}", dir.display()))
                })?
            }
            Err(e) => {
                return Err(
                    self.io_failure(e, format!("create temporary file in {}", dir.display()))
                )
            }
        };

        let mut staged = StagedFile {
            temp,
            dir,
            area: self.id,
            bytes: 0,
            hasher: Sha256::new(),
        };
        staged.fill(source)?;
        Ok(staged)
    }

    fn create_temp(&self, dir: &Path) -> io::Result<NamedTempFile> {
        tempfile::Builder::new()
            .prefix(TEMP_FILE_PREFIX)
            .suffix(TEMP_FILE_SUFFIX)
            .tempfile_in(dir)
    }

    /// Maps an I/O error on this area, telling "disk full / read-only" apart from the rest.
    pub(crate) fn io_failure(&self, e: io::Error, context: impl std::fmt::Display) -> FilesError {
        capacity_or_io(self.id, e, context)
    }
}

pub(crate) fn capacity_or_io(
    area: StorageId,
    e: io::Error,
    context: impl std::fmt::Display,
) -> FilesError {
    match e.kind() {
        io::ErrorKind::StorageFull | io::ErrorKind::ReadOnlyFilesystem => {
            FilesError::Capacity { area, source: e }
        }
        kind => FilesError::Io(io::Error::new(kind, format!("Failed to {}: {}", context, e))),
    }
}

/// True when both paths name the same file or directory on disk, however they are spelled
/// (symlinks, `..` components, relative roots).
#[cfg(unix)]
pub(crate) fn same_file(a: &Path, b: &Path) -> io::Result<bool> {
    use std::os::unix::fs::MetadataExt;

    let (a, b) = (fs::metadata(a)?, fs::metadata(b)?);
    Ok(a.dev() == b.dev() && a.ino() == b.ino())
}

#[cfg(not(unix))]
pub(crate) fn same_file(a: &Path, b: &Path) -> io::Result<bool> {
    Ok(a.canonicalize()? == b.canonicalize()?)
}

/// Content written to a temporary file, not yet visible under its final name.
pub(crate) struct StagedFile {
    temp: NamedTempFile,
    dir: PathBuf,
    area: StorageId,
    bytes: u64,
    hasher: Sha256,
}

impl StagedFile {
    fn fill(&mut self, source: &mut dyn Read) -> FilesResult<()> {
        let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
        loop {
            let read = match source.read(&mut buffer) {
                Ok(0) => break,
                Ok(read) => read,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(FilesError::Io(io::Error::new(
                        e.kind(),
                        format!("Failed to read source: {}", e),
                    )))
                }
            };
            self.hasher.update(&buffer[..read]);
            self.temp.write_all(&buffer[..read]).map_err(|e| {
                capacity_or_io(self.area, e, format!("write {}", self.temp.path().display()))
            })?;
            self.bytes += read as u64;
        }

        self.temp.as_file().sync_all().map_err(|e| {
            capacity_or_io(self.area, e, format!("sync {}", self.temp.path().display()))
        })
    }

    pub(crate) fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Hex SHA-256 of everything written so far.
    pub(crate) fn sha256(&self) -> String {
        hex::encode(self.hasher.clone().finalize())
    }

    /// Atomically renames the temporary file over `resource`, replacing any previous content.
    pub(crate) fn commit(self, resource: &ResourceName) -> FilesResult<u64> {
        let target = self.dir.join(resource.as_str());
        let bytes = self.bytes;
        let area = self.area;
        self.temp
            .persist(&target)
            .map_err(|e| capacity_or_io(area, e.error, format!("rename into {}", target.display())))?;
        Ok(bytes)
    }
}

/// Lazy listing of a document's resources.
///
/// Hidden temporary files and names that are not valid resource names are skipped.
#[derive(Debug)]
pub struct Resources {
    entries: Option<fs::ReadDir>,
    dir: PathBuf,
    version: Option<FileVersion>,
}

impl Resources {
    pub(crate) fn empty(dir: PathBuf) -> Self {
        Self {
            entries: None,
            dir,
            version: None,
        }
    }

    /// Restricts the listing to resources of one version.
    pub fn with_version(mut self, version: Option<FileVersion>) -> Self {
        self.version = version;
        self
    }

    /// The directory being listed.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Iterator for Resources {
    type Item = FilesResult<ResourceName>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entries = self.entries.as_mut()?;
            let entry = match entries.next()? {
                Ok(entry) => entry,
                Err(e) => {
                    return Some(Err(FilesError::Io(io::Error::new(
                        e.kind(),
                        format!("Failed to list {}: {}", self.dir.display(), e),
                    ))))
                }
            };

            match entry.file_type() {
                Ok(file_type) if file_type.is_file() => {}
                Ok(_) => continue,
                Err(e) => return Some(Err(FilesError::Io(e))),
            }

            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }

            let resource = match ResourceName::parse(name) {
                Ok(resource) => resource,
                Err(e) => {
                    tracing::debug!("skipping {} in {}: {}", name, self.dir.display(), e);
                    continue;
                }
            };

            if let Some(version) = &self.version {
                if !resource.is_of_version(version) {
                    continue;
                }
            }
            return Some(Ok(resource));
        }
    }
}
