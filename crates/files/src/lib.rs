//! Document resource storage
//!
//! This crate stores the byte content of documents on one or more storage areas (root
//! directory trees) and moves it between them.
//!
//! ## Design Principles
//!
//! - A resource's location is a pure function of `(area root, document id, resource name)`
//! - Writers never expose partial content: data goes to a hidden temporary file in the
//!   destination directory and is renamed into place once complete
//! - Old versions are never removed implicitly; each version has its own resource name
//! - The storage area of a document is decided by the caller and passed in on every call
//! - No process-wide state: the storage-area table is handed over at construction time
//!
//! ## Storage Layout
//!
//! ```text
//! <area root>/
//! └── 123/            # digits of the document id, three per level
//!     └── 45/
//!         └── doc/    # resources of document 12345
//!             ├── 1.0
//!             ├── 1.0-conversion.pdf
//!             └── 1.1
//! ```
//!
//! ## Example Usage
//!
//! ```no_run
//! use docstore_files::{FsStorer, StorageArea, StorageAreas, StoreConfig, Storer};
//! use docstore_files::{DocId, FileVersion, StorageId};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let areas = StorageAreas::new([StorageArea::new(StorageId::new(1), "/srv/docstore/1")])?;
//! let storer = FsStorer::new(StoreConfig::new(areas, StorageId::new(1))?);
//!
//! let doc = DocId::new(42)?;
//! let resource = storer.resource_name(Some(&FileVersion::new("1.0")?), None)?;
//! storer.store(StorageId::new(1), &mut "hello".as_bytes(), doc, &resource)?;
//! assert_eq!(storer.size(StorageId::new(1), doc, &resource)?, 5);
//! # Ok(())
//! # }
//! ```

mod area;
mod config;
mod constants;
mod fault;
mod migration;
mod storer;

pub use area::{Resources, StorageArea};
pub use config::{
    default_area_from_env_value, storage_areas_from_env_value, StorageAreaConfig,
    StorageAreas, StoreConfig, StoreConfigFile,
};
pub use constants::{DEFAULT_FIXTURE, TEMP_FILE_PREFIX, TEMP_FILE_SUFFIX};
pub use fault::FaultInjectingStorer;
pub use migration::{MigrationCoordinator, MigrationFailure, MigrationReport, MovedResource};
pub use storer::{Charset, FsStorer, ResourceInfo, Storer};

pub use docstore_naming::{NamingError, PathMapper, ResourceName};
pub use docstore_types::{DocId, DocumentRef, FileVersion, StorageId, TenantId, TypeError};

/// Errors that can occur during storage operations
#[derive(Debug, thiserror::Error)]
pub enum FilesError {
    /// The requested resource does not exist on the storage area
    #[error("resource {resource} of document {doc_id} not found")]
    NotFound {
        doc_id: DocId,
        resource: ResourceName,
    },

    /// The resource name violates the naming convention
    #[error("invalid resource name: {0}")]
    InvalidName(#[from] NamingError),

    /// Disk or transport failure, possibly transient
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The storage area is full or mounted read-only
    #[error("storage area {area} cannot accept data: {source}")]
    Capacity {
        area: StorageId,
        #[source]
        source: std::io::Error,
    },

    /// No storage area is configured under this id
    #[error("unknown storage area: {0}")]
    UnknownStorageArea(StorageId),

    /// The storage-area table is malformed
    #[error("invalid storage configuration: {0}")]
    InvalidConfig(String),

    /// A storage area root exists but is not a directory
    #[error("Invalid root directory: {0}")]
    InvalidRootDirectory(String),

    /// An identifier supplied as text could not be parsed
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(#[from] TypeError),
}

impl FilesError {
    /// True for [`FilesError::NotFound`] and I/O errors of kind `NotFound`.
    pub fn is_not_found(&self) -> bool {
        match self {
            FilesError::NotFound { .. } => true,
            FilesError::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

/// Result type for storage operations.
pub type FilesResult<T> = Result<T, FilesError>;
