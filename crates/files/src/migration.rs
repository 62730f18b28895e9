//! Moving resources between storage areas
//!
//! A migration copies every resource of a document from one area to another. Each
//! resource is moved on its own:
//!
//! 1. copy the bytes into a temporary file in the target document directory
//! 2. check the copy is as long as the source file that was opened
//! 3. rename the copy into place
//! 4. delete the source
//!
//! The source is only deleted after the rename succeeded, so a failure can leave a
//! resource in both areas but never in neither. A failing resource does not stop the
//! others; the [`MigrationReport`] lists what moved and what did not.
//!
//! Writers should be quiesced for the document while it migrates. A store that races with
//! the copy is not lost from the source side, but whichever content was present when the
//! copy opened the file is what lands on the target.

use crate::area::{capacity_or_io, same_file};
use crate::{FilesError, FilesResult, StorageArea, StorageAreas};
use docstore_naming::ResourceName;
use docstore_types::{DocId, StorageId};
use std::fs;
use std::io;
use std::path::Path;

/// A resource that reached the target area.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MovedResource {
    pub doc_id: DocId,
    pub resource: ResourceName,
    pub size_bytes: u64,
    /// Hex SHA-256 of the bytes copied
    pub sha256: String,
}

/// A resource (or a whole document, when `resource` is `None`) that could not be moved.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MigrationFailure {
    pub doc_id: DocId,
    pub resource: Option<ResourceName>,
    pub error: String,
}

/// Outcome of a migration.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MigrationReport {
    pub moved: Vec<MovedResource>,
    pub failed: Vec<MigrationFailure>,
}

impl MigrationReport {
    pub fn moved_count(&self) -> usize {
        self.moved.len()
    }

    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    /// True when nothing failed.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn merge(&mut self, other: MigrationReport) {
        self.moved.extend(other.moved);
        self.failed.extend(other.failed);
    }
}

/// Moves documents' resources between configured storage areas.
#[derive(Debug, Clone, Copy)]
pub struct MigrationCoordinator<'a> {
    areas: &'a StorageAreas,
}

impl<'a> MigrationCoordinator<'a> {
    pub fn new(areas: &'a StorageAreas) -> Self {
        Self { areas }
    }

    /// Moves every resource of `doc_id` from `source` to `target`.
    ///
    /// Moving a document onto the area it already lives on, or onto an area whose document
    /// directory is the same one on disk (symlinked or `..`-spelled roots), does nothing. An
    /// alias that only shows once the target directory exists makes every resource fail and
    /// stay where it is; a resource is never deleted through another name for itself.
    ///
    /// # Errors
    ///
    /// Fails as a whole only when an area is unknown or the source listing cannot be read.
    /// Per-resource failures are reported in [`MigrationReport::failed`].
    pub fn move_document(
        &self,
        doc_id: DocId,
        source: StorageId,
        target: StorageId,
    ) -> FilesResult<MigrationReport> {
        let source_area = self.areas.get(source)?;
        let target_area = self.areas.get(target)?;
        let mut report = MigrationReport::default();

        let source_dir = source_area.document_dir(doc_id);
        let target_dir = target_area.document_dir(doc_id);
        // a missing directory cannot be an alias; move_resource checks again once it exists
        if source_dir == target_dir || same_file(&source_dir, &target_dir).unwrap_or(false) {
            tracing::debug!(
                "document {} already resolves to the same directory on areas {} and {}",
                doc_id,
                source,
                target
            );
            return Ok(report);
        }

        // Snapshot the listing first; the loop below deletes from the same directory
        let resources = source_area
            .list_resources(doc_id)?
            .collect::<FilesResult<Vec<_>>>()?;

        for resource in resources {
            match move_resource(source_area, target_area, doc_id, &resource) {
                Ok(moved) => report.moved.push(moved),
                Err(e) => {
                    tracing::warn!(
                        "failed to move {} of document {} from area {} to area {}: {}",
                        resource,
                        doc_id,
                        source,
                        target,
                        e
                    );
                    report.failed.push(MigrationFailure {
                        doc_id,
                        resource: Some(resource),
                        error: e.to_string(),
                    });
                }
            }
        }

        if report.is_complete() {
            match fs::remove_dir(&source_dir) {
                Ok(()) => {}
                // written to since the listing, or never created
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::DirectoryNotEmpty | io::ErrorKind::NotFound
                    ) => {}
                Err(e) => tracing::debug!(
                    "could not remove empty document directory {}: {}",
                    source_dir.display(),
                    e
                ),
            }
        }

        tracing::info!(
            "moved {} resources of document {} from area {} to area {} ({} failed)",
            report.moved_count(),
            doc_id,
            source,
            target,
            report.failed_count()
        );
        Ok(report)
    }

    /// Moves several documents, e.g. every document of a folder subtree.
    ///
    /// A document whose resources cannot even be listed is recorded as a failure with no
    /// resource name, and the remaining documents are still processed.
    pub fn move_documents(
        &self,
        doc_ids: impl IntoIterator<Item = DocId>,
        source: StorageId,
        target: StorageId,
    ) -> FilesResult<MigrationReport> {
        self.areas.get(source)?;
        self.areas.get(target)?;

        let mut report = MigrationReport::default();
        for doc_id in doc_ids {
            match self.move_document(doc_id, source, target) {
                Ok(document_report) => report.merge(document_report),
                Err(e) => {
                    tracing::warn!("failed to migrate document {}: {}", doc_id, e);
                    report.failed.push(MigrationFailure {
                        doc_id,
                        resource: None,
                        error: e.to_string(),
                    });
                }
            }
        }
        Ok(report)
    }
}

fn move_resource(
    source_area: &StorageArea,
    target_area: &StorageArea,
    doc_id: DocId,
    resource: &ResourceName,
) -> FilesResult<MovedResource> {
    let source_path = source_area.resolve(doc_id, resource);
    let source_dir = source_area.document_dir(doc_id);
    let target_dir = target_area.ensure_document_dir(doc_id)?;
    if same_file(&source_dir, &target_dir)
        .map_err(|e| target_area.io_failure(e, format!("stat {}", target_dir.display())))?
    {
        return Err(aliased_areas(source_area, target_area, &source_dir));
    }

    let mut file = match fs::File::open(&source_path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(FilesError::NotFound {
                doc_id,
                resource: resource.clone(),
            })
        }
        Err(e) => {
            return Err(source_area.io_failure(e, format!("open {}", source_path.display())))
        }
    };
    let expected = file
        .metadata()
        .map_err(|e| source_area.io_failure(e, format!("stat {}", source_path.display())))?
        .len();

    let staged = target_area.stage(doc_id, &mut file)?;
    if staged.bytes() != expected {
        return Err(FilesError::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!(
                "copied {} bytes of {} but the source holds {}",
                staged.bytes(),
                source_path.display(),
                expected
            ),
        )));
    }
    let sha256 = staged.sha256();
    let size_bytes = staged.commit(resource)?;

    // Never delete what was just committed
    let target_path = target_area.resolve(doc_id, resource);
    match same_file(&source_path, &target_path) {
        Ok(false) => {}
        Ok(true) => return Err(aliased_areas(source_area, target_area, &source_dir)),
        // source removed concurrently, nothing left to delete
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => {
            return Err(target_area.io_failure(e, format!("stat {}", target_path.display())))
        }
    }

    match fs::remove_file(&source_path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => {
            return Err(capacity_or_io(
                source_area.id(),
                e,
                format!(
                    "delete {} after copying it to area {}",
                    source_path.display(),
                    target_area.id()
                ),
            ))
        }
    }

    Ok(MovedResource {
        doc_id,
        resource: resource.clone(),
        size_bytes,
        sha256,
    })
}

fn aliased_areas(source: &StorageArea, target: &StorageArea, dir: &Path) -> FilesError {
    FilesError::InvalidConfig(format!(
        "storage areas {} and {} both resolve to {}",
        source.id(),
        target.id(),
        dir.display()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FsStorer, StoreConfig, Storer};
    use docstore_naming::PathMapper;
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    const A: StorageId = StorageId::new(1);
    const B: StorageId = StorageId::new(2);

    fn doc(id: u64) -> DocId {
        DocId::new(id).unwrap()
    }

    fn name(s: &str) -> ResourceName {
        ResourceName::parse(s).unwrap()
    }

    fn two_areas(temp: &TempDir) -> StorageAreas {
        StorageAreas::new([
            StorageArea::new(A, temp.path().join("a")),
            // different sharding on the target, to check it is the target's layout that is used
            StorageArea::with_mapper(B, temp.path().join("b"), PathMapper::new(2).unwrap()),
        ])
        .unwrap()
    }

    fn names(area: &StorageArea, doc_id: DocId) -> BTreeSet<String> {
        area.list_resources(doc_id)
            .unwrap()
            .map(|r| r.unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_move_conserves_every_resource() {
        let temp = TempDir::new().unwrap();
        let areas = two_areas(&temp);
        let storer = FsStorer::new(StoreConfig::new(areas.clone(), A).unwrap());

        let contents = [
            ("1.0", b"version one".to_vec()),
            ("1.0-conversion.pdf", b"%PDF-1.4".to_vec()),
            ("1.1", vec![]),
            ("thumb.png", vec![0x89, 0x50, 0x4e, 0x47]),
        ];
        for (resource, content) in &contents {
            storer
                .store(A, &mut content.as_slice(), doc(12345), &name(resource))
                .unwrap();
        }

        let report = MigrationCoordinator::new(&areas)
            .move_document(doc(12345), A, B)
            .unwrap();

        assert_eq!(report.moved_count(), contents.len());
        assert!(report.is_complete());

        let area_a = areas.get(A).unwrap();
        let area_b = areas.get(B).unwrap();
        assert!(names(area_a, doc(12345)).is_empty());
        assert!(!area_a.document_dir(doc(12345)).exists());
        assert_eq!(names(area_b, doc(12345)).len(), contents.len());

        for (resource, content) in &contents {
            assert_eq!(
                &storer.get_bytes(B, doc(12345), &name(resource)).unwrap(),
                content
            );
        }
        assert!(area_b
            .resolve(doc(12345), &name("1.0"))
            .ends_with("12/34/5/doc/1.0"));
    }

    #[test]
    fn test_report_carries_digests() {
        let temp = TempDir::new().unwrap();
        let areas = two_areas(&temp);
        let storer = FsStorer::new(StoreConfig::new(areas.clone(), A).unwrap());
        storer
            .store(A, &mut &b"hash me"[..], doc(3), &name("1.0"))
            .unwrap();

        let report = MigrationCoordinator::new(&areas)
            .move_document(doc(3), A, B)
            .unwrap();
        let moved = &report.moved[0];
        assert_eq!(moved.size_bytes, 7);
        assert_eq!(moved.sha256, storer.digest(B, doc(3), &name("1.0")).unwrap());
    }

    #[test]
    fn test_move_empty_document() {
        let temp = TempDir::new().unwrap();
        let areas = two_areas(&temp);

        let report = MigrationCoordinator::new(&areas)
            .move_document(doc(5), A, B)
            .unwrap();
        assert_eq!(report, MigrationReport::default());
    }

    #[test]
    fn test_move_to_same_area_is_noop() {
        let temp = TempDir::new().unwrap();
        let areas = StorageAreas::new([
            StorageArea::new(A, temp.path().join("a")),
            // alias of the same root
            StorageArea::new(B, temp.path().join("a")),
        ])
        .unwrap();
        let storer = FsStorer::new(StoreConfig::new(areas.clone(), A).unwrap());
        storer
            .store(A, &mut &b"keep me"[..], doc(6), &name("1.0"))
            .unwrap();

        let coordinator = MigrationCoordinator::new(&areas);
        assert_eq!(coordinator.move_document(doc(6), A, A).unwrap().moved_count(), 0);
        assert_eq!(coordinator.move_document(doc(6), A, B).unwrap().moved_count(), 0);
        assert_eq!(storer.get_bytes(A, doc(6), &name("1.0")).unwrap(), b"keep me");
    }

    #[test]
    fn test_unknown_area() {
        let temp = TempDir::new().unwrap();
        let areas = two_areas(&temp);
        let result = MigrationCoordinator::new(&areas).move_document(doc(1), A, StorageId::new(77));
        assert!(matches!(result, Err(FilesError::UnknownStorageArea(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_failure_is_recorded_and_others_continue() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let areas = two_areas(&temp);
        let storer = FsStorer::new(StoreConfig::new(areas.clone(), A).unwrap());
        for resource in ["1.0", "1.1", "1.2"] {
            storer
                .store(A, &mut resource.as_bytes(), doc(8), &name(resource))
                .unwrap();
        }

        // an unreadable source file cannot be copied
        let locked = areas.get(A).unwrap().resolve(doc(8), &name("1.1"));
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
        if fs::File::open(&locked).is_ok() {
            // running as root: permissions are not enforced
            return;
        }

        let report = MigrationCoordinator::new(&areas)
            .move_document(doc(8), A, B)
            .unwrap();

        assert_eq!(report.moved_count(), 2);
        assert_eq!(report.failed_count(), 1);
        assert_eq!(report.failed[0].resource, Some(name("1.1")));

        // the failed resource is still at the source, never lost
        assert_eq!(
            names(areas.get(A).unwrap(), doc(8)),
            BTreeSet::from(["1.1".to_string()])
        );
        assert_eq!(
            names(areas.get(B).unwrap(), doc(8)),
            BTreeSet::from(["1.0".to_string(), "1.2".to_string()])
        );

        fs::set_permissions(&locked, fs::Permissions::from_mode(0o644)).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_source_delete_keeps_both_copies() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let areas = two_areas(&temp);
        let storer = FsStorer::new(StoreConfig::new(areas.clone(), A).unwrap());
        storer
            .store(A, &mut &b"twice"[..], doc(11), &name("1.0"))
            .unwrap();

        // files stay readable, but nothing can be unlinked from the directory
        let source_dir = areas.get(A).unwrap().document_dir(doc(11));
        fs::set_permissions(&source_dir, fs::Permissions::from_mode(0o555)).unwrap();
        if fs::write(source_dir.join("1.0-writable"), b"").is_ok() {
            // running as root: permissions are not enforced
            fs::set_permissions(&source_dir, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let report = MigrationCoordinator::new(&areas)
            .move_document(doc(11), A, B)
            .unwrap();
        fs::set_permissions(&source_dir, fs::Permissions::from_mode(0o755)).unwrap();

        assert_eq!(report.moved_count(), 0);
        assert_eq!(report.failed_count(), 1);
        assert_eq!(report.failed[0].resource, Some(name("1.0")));
        assert_eq!(storer.get_bytes(A, doc(11), &name("1.0")).unwrap(), b"twice");
        assert_eq!(storer.get_bytes(B, doc(11), &name("1.0")).unwrap(), b"twice");
    }

    fn areas_with_alias(temp: &TempDir, alias_root: &Path) -> StorageAreas {
        StorageAreas::new([
            StorageArea::new(A, temp.path().join("a")),
            StorageArea::new(B, alias_root),
        ])
        .unwrap()
    }

    fn assert_alias_keeps_content(areas: &StorageAreas, doc_id: DocId) -> MigrationReport {
        let storer = FsStorer::new(StoreConfig::new(areas.clone(), A).unwrap());
        storer
            .store(A, &mut &b"keep me"[..], doc_id, &name("1.0"))
            .unwrap();
        storer
            .store(A, &mut &b"me too"[..], doc_id, &name("1.0-ocr.txt"))
            .unwrap();

        let report = MigrationCoordinator::new(areas)
            .move_document(doc_id, A, B)
            .unwrap();

        assert_eq!(report.moved_count(), 0);
        assert_eq!(storer.get_bytes(A, doc_id, &name("1.0")).unwrap(), b"keep me");
        assert_eq!(storer.get_bytes(B, doc_id, &name("1.0")).unwrap(), b"keep me");
        assert_eq!(
            storer.get_bytes(A, doc_id, &name("1.0-ocr.txt")).unwrap(),
            b"me too"
        );
        report
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_root_is_not_a_move() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("a")).unwrap();
        std::os::unix::fs::symlink(temp.path().join("a"), temp.path().join("b")).unwrap();

        let areas = areas_with_alias(&temp, &temp.path().join("b"));
        let report = assert_alias_keeps_content(&areas, doc(6));
        assert!(report.is_complete());
    }

    #[test]
    fn test_dotdot_root_is_not_a_move() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("x")).unwrap();

        let areas = areas_with_alias(&temp, &temp.path().join("x").join("..").join("a"));
        let report = assert_alias_keeps_content(&areas, doc(6));
        assert!(report.is_complete());
    }

    #[cfg(unix)]
    #[test]
    fn test_alias_through_missing_dir_fails_without_loss() {
        let temp = TempDir::new().unwrap();

        // "missing/.." only resolves once the target directory has been created
        let areas = areas_with_alias(&temp, &temp.path().join("missing").join("..").join("a"));
        let report = assert_alias_keeps_content(&areas, doc(6));
        assert_eq!(report.failed_count(), 2);
        assert!(report
            .failed
            .iter()
            .all(|failure| failure.error.contains("both resolve to")));
    }

    #[test]
    fn test_move_overwrites_stale_target_copy() {
        let temp = TempDir::new().unwrap();
        let areas = two_areas(&temp);
        let storer = FsStorer::new(StoreConfig::new(areas.clone(), A).unwrap());
        storer
            .store(B, &mut &b"stale"[..], doc(9), &name("1.0"))
            .unwrap();
        storer
            .store(A, &mut &b"fresh"[..], doc(9), &name("1.0"))
            .unwrap();

        let report = MigrationCoordinator::new(&areas)
            .move_document(doc(9), A, B)
            .unwrap();
        assert_eq!(report.moved_count(), 1);
        assert_eq!(storer.get_bytes(B, doc(9), &name("1.0")).unwrap(), b"fresh");
    }

    #[test]
    fn test_move_documents_batch() {
        let temp = TempDir::new().unwrap();
        let areas = two_areas(&temp);
        let storer = FsStorer::new(StoreConfig::new(areas.clone(), A).unwrap());
        for id in [100, 200, 300] {
            for resource in ["1.0", "1.0-ocr.txt"] {
                storer
                    .store(A, &mut &b"body"[..], doc(id), &name(resource))
                    .unwrap();
            }
        }

        let report = MigrationCoordinator::new(&areas)
            .move_documents([doc(100), doc(200), doc(300), doc(400)], A, B)
            .unwrap();

        assert_eq!(report.moved_count(), 6);
        assert!(report.is_complete());
        for id in [100, 200, 300] {
            assert_eq!(names(areas.get(B).unwrap(), doc(id)).len(), 2);
        }
    }

    #[test]
    fn test_report_serialises() {
        let report = MigrationReport {
            moved: vec![MovedResource {
                doc_id: doc(1),
                resource: name("1.0"),
                size_bytes: 3,
                sha256: "abc".into(),
            }],
            failed: vec![MigrationFailure {
                doc_id: doc(2),
                resource: None,
                error: "boom".into(),
            }],
        };
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"resource\":\"1.0\""));
        assert!(json.contains("\"resource\":null"));
    }
}
