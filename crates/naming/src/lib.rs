//! Resource naming and sharded-path utilities.
//!
//! Both halves of this crate are pure functions of their inputs. Any two callers with the
//! same document id, version and suffix derive the same file name and the same directory,
//! which is what lets several processes share one storage tree without coordination.
//!
//! ## Resource names
//!
//! A resource is one byte blob belonging to a document: the file of a version, or an
//! ancillary artifact such as a PDF conversion or a thumbnail. [`ResourceName`] combines
//! the optional version and the optional suffix:
//!
//! | version | suffix           | name                  |
//! |---------|------------------|-----------------------|
//! | `1.0`   | -                | `1.0`                 |
//! | `1.0`   | `conversion.pdf` | `1.0-conversion.pdf`  |
//! | -       | `thumb.png`      | `thumb.png`           |
//!
//! Versions only ever contain digits and dots, so the first `-` of a name splits it back
//! into its parts. Version-less suffixes that would read as a versioned name are rejected.
//!
//! ## Sharded directory layout
//!
//! [`PathMapper`] splits the decimal document id into groups of three digits (from the
//! left) and appends a fixed leaf directory:
//!
//! ```text
//! <root>/123/45/doc/1.0
//! <root>/123/45/doc/1.0-conversion.pdf
//! <root>/42/doc/2.1
//! ```
//!
//! A directory level only ever holds groups of one to three digits plus `doc`, so it never
//! exceeds 1,111 entries (10 + 100 + 1,000 + 1) whatever the number of documents.

mod resource;
mod shard;

pub use resource::ResourceName;
pub use shard::{PathMapper, DEFAULT_GROUP_WIDTH, LEAF_DIR_NAME};

/// Error type for naming operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum NamingError {
    /// Neither a version nor a suffix was supplied
    #[error("a resource needs a version, a suffix, or both")]
    Empty,

    /// The name contains path separators, `..` or control characters
    #[error("illegal characters in resource name: '{0}'")]
    IllegalCharacters(String),

    /// Names starting with `.` are reserved for in-flight temporary files
    #[error("resource names must not start with '.': '{0}'")]
    Reserved(String),

    /// A version-less suffix that would be read back as a versioned resource
    #[error("suffix '{0}' is ambiguous without a version")]
    Ambiguous(String),

    /// The name does not fit in a single path component
    #[error("resource name is {0} bytes long, the limit is {max}", max = resource::MAX_NAME_LEN)]
    TooLong(usize),

    /// Shard group width outside `1..=9`
    #[error("invalid shard group width: {0}")]
    InvalidGroupWidth(usize),
}

/// Result type for naming operations.
pub type NamingResult<T> = Result<T, NamingError>;
