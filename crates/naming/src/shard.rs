//! Mapping from document ids to sharded directories.

use crate::{NamingError, NamingResult};
use docstore_types::DocId;
use std::path::{Path, PathBuf};

/// Digits per directory level unless a storage area says otherwise.
pub const DEFAULT_GROUP_WIDTH: usize = 3;

/// Leaf directory holding a document's resources.
///
/// The leaf keeps a document's files apart from the shard directories of longer ids that
/// share its prefix (`123/doc` vs `123/456/doc`).
pub const LEAF_DIR_NAME: &str = "doc";

/// Derives the relative directory of a document inside a storage area.
///
/// The decimal id is cut into groups of `group_width` digits starting from the left, one
/// directory per group, followed by [`LEAF_DIR_NAME`]:
///
/// - `12345` -> `123/45/doc`
/// - `42` -> `42/doc`
/// - `1000001` -> `100/000/1/doc`
///
/// Groups after the first keep their leading zeros, so a level can hold groups of every
/// length up to `group_width` (`0`, `00` and `000` are all distinct) plus the leaf. That
/// caps a level at `10 + 10^2 + ... + 10^group_width + 1` entries.
/// The mapping depends on nothing but the id and the width, so it stays stable for the
/// lifetime of a storage area as long as the width does not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathMapper {
    group_width: usize,
}

impl Default for PathMapper {
    fn default() -> Self {
        Self {
            group_width: DEFAULT_GROUP_WIDTH,
        }
    }
}

impl PathMapper {
    /// Creates a mapper with a custom group width.
    ///
    /// # Errors
    ///
    /// Returns [`NamingError::InvalidGroupWidth`] unless `1 <= group_width <= 9`.
    pub fn new(group_width: usize) -> NamingResult<Self> {
        if !(1..=9).contains(&group_width) {
            return Err(NamingError::InvalidGroupWidth(group_width));
        }
        Ok(Self { group_width })
    }

    pub fn group_width(&self) -> usize {
        self.group_width
    }

    /// Directory segments for `doc_id`, leaf included.
    pub fn segments(&self, doc_id: DocId) -> Vec<String> {
        let digits = doc_id.to_string();
        let mut segments: Vec<String> = digits
            .as_bytes()
            .chunks(self.group_width)
            // ASCII digits, so every chunk is valid UTF-8
            .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
            .collect();
        segments.push(LEAF_DIR_NAME.to_owned());
        segments
    }

    /// Relative path with `/` separators, e.g. `123/45/doc`.
    pub fn relative_path(&self, doc_id: DocId) -> String {
        self.segments(doc_id).join("/")
    }

    /// Returns `root/<groups...>/doc` for `doc_id`, joined with platform separators.
    pub fn sharded_dir(&self, root: &Path, doc_id: DocId) -> PathBuf {
        let mut dir = root.to_path_buf();
        dir.extend(self.segments(doc_id));
        dir
    }
}
