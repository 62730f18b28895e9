//! Fault injection for test harnesses.

use crate::constants::{DEFAULT_FIXTURE, INJECTED_FAULT_MESSAGE};
use crate::{FilesError, FilesResult, MigrationReport, ResourceInfo, Resources, Storer};
use docstore_naming::ResourceName;
use docstore_types::{DocId, FileVersion, StorageId};
use std::io::{self, Cursor, Read};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

/// A [`Storer`] wrapper that can make stores fail or substitute fixed content.
///
/// - `error_on_store`: every store fails with an I/O error before the wrapped storer is
///   touched, leaving stored content as it was.
/// - `use_dummy_file`: stores write the fixture instead of the caller's content, and
///   streams return the fixture whatever is stored.
///
/// Both flags are independent and can be flipped at any time through a shared reference;
/// a change applies from the next call on. Every other operation goes straight to the
/// wrapped storer.
#[derive(Debug)]
pub struct FaultInjectingStorer<S> {
    inner: S,
    error_on_store: AtomicBool,
    use_dummy_file: AtomicBool,
    fixture: Vec<u8>,
}

impl<S: Storer> FaultInjectingStorer<S> {
    /// Wraps `inner` with both flags off and the default fixture.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            error_on_store: AtomicBool::new(false),
            use_dummy_file: AtomicBool::new(false),
            fixture: DEFAULT_FIXTURE.to_vec(),
        }
    }

    pub fn with_fixture(mut self, fixture: impl Into<Vec<u8>>) -> Self {
        self.fixture = fixture.into();
        self
    }

    /// Uses the content of a local file as the fixture.
    pub fn with_fixture_file(self, path: &Path) -> FilesResult<Self> {
        let fixture = std::fs::read(path).map_err(|e| {
            FilesError::Io(io::Error::new(
                e.kind(),
                format!("Failed to read fixture {}: {}", path.display(), e),
            ))
        })?;
        Ok(self.with_fixture(fixture))
    }

    pub fn is_error_on_store(&self) -> bool {
        self.error_on_store.load(Ordering::SeqCst)
    }

    pub fn set_error_on_store(&self, error_on_store: bool) {
        self.error_on_store.store(error_on_store, Ordering::SeqCst);
    }

    pub fn is_use_dummy_file(&self) -> bool {
        self.use_dummy_file.load(Ordering::SeqCst)
    }

    pub fn set_use_dummy_file(&self, use_dummy_file: bool) {
        self.use_dummy_file.store(use_dummy_file, Ordering::SeqCst);
    }

    pub fn fixture(&self) -> &[u8] {
        &self.fixture
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    fn injected_fault(&self) -> FilesResult<()> {
        if self.is_error_on_store() {
            return Err(FilesError::Io(io::Error::other(INJECTED_FAULT_MESSAGE)));
        }
        Ok(())
    }
}

impl<S: Storer> Storer for FaultInjectingStorer<S> {
    fn store(
        &self,
        area: StorageId,
        source: &mut dyn Read,
        doc_id: DocId,
        resource: &ResourceName,
    ) -> FilesResult<u64> {
        self.injected_fault()?;
        if self.is_use_dummy_file() {
            return self
                .inner
                .store(area, &mut self.fixture.as_slice(), doc_id, resource);
        }
        self.inner.store(area, source, doc_id, resource)
    }

    fn store_file(
        &self,
        area: StorageId,
        source_path: &Path,
        doc_id: DocId,
        resource: &ResourceName,
    ) -> FilesResult<u64> {
        self.injected_fault()?;
        if self.is_use_dummy_file() {
            return self
                .inner
                .store(area, &mut self.fixture.as_slice(), doc_id, resource);
        }
        self.inner.store_file(area, source_path, doc_id, resource)
    }

    fn get_stream(
        &self,
        area: StorageId,
        doc_id: DocId,
        resource: &ResourceName,
    ) -> FilesResult<Box<dyn Read + Send>> {
        if self.is_use_dummy_file() {
            return Ok(Box::new(Cursor::new(self.fixture.clone())));
        }
        self.inner.get_stream(area, doc_id, resource)
    }

    fn size(&self, area: StorageId, doc_id: DocId, resource: &ResourceName) -> FilesResult<u64> {
        self.inner.size(area, doc_id, resource)
    }

    fn exists(
        &self,
        area: StorageId,
        doc_id: DocId,
        resource: &ResourceName,
    ) -> FilesResult<bool> {
        self.inner.exists(area, doc_id, resource)
    }

    fn info(
        &self,
        area: StorageId,
        doc_id: DocId,
        resource: &ResourceName,
    ) -> FilesResult<ResourceInfo> {
        self.inner.info(area, doc_id, resource)
    }

    fn delete(&self, area: StorageId, doc_id: DocId, resource: &ResourceName) -> FilesResult<()> {
        self.inner.delete(area, doc_id, resource)
    }

    fn list_resources(
        &self,
        area: StorageId,
        doc_id: DocId,
        version: Option<&FileVersion>,
    ) -> FilesResult<Resources> {
        self.inner.list_resources(area, doc_id, version)
    }

    fn move_resources_to_store(
        &self,
        doc_id: DocId,
        source: StorageId,
        target: StorageId,
    ) -> FilesResult<MigrationReport> {
        self.inner.move_resources_to_store(doc_id, source, target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Charset, FsStorer, StorageArea, StorageAreas, StoreConfig};
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    const AREA: StorageId = StorageId::new(1);

    fn doc(id: u64) -> DocId {
        DocId::new(id).unwrap()
    }

    fn name(s: &str) -> ResourceName {
        ResourceName::parse(s).unwrap()
    }

    fn wrapped(temp: &TempDir) -> FaultInjectingStorer<FsStorer> {
        let areas = StorageAreas::new([StorageArea::new(AREA, temp.path())]).unwrap();
        FaultInjectingStorer::new(FsStorer::new(StoreConfig::new(areas, AREA).unwrap()))
    }

    #[test]
    fn test_flags_default_off() {
        let temp = TempDir::new().unwrap();
        let storer = wrapped(&temp);
        assert!(!storer.is_error_on_store());
        assert!(!storer.is_use_dummy_file());

        storer
            .store(AREA, &mut &b"real"[..], doc(1), &name("1.0"))
            .unwrap();
        assert_eq!(storer.get_bytes(AREA, doc(1), &name("1.0")).unwrap(), b"real");
    }

    #[test]
    fn test_error_on_store_leaves_file_unchanged() {
        let temp = TempDir::new().unwrap();
        let storer = wrapped(&temp);
        let resource = name("1.0");
        storer
            .store(AREA, &mut &b"before"[..], doc(1), &resource)
            .unwrap();

        storer.set_error_on_store(true);
        let result = storer.store(AREA, &mut &b"after"[..], doc(1), &resource);
        match result {
            Err(FilesError::Io(e)) => assert_eq!(e.to_string(), "error"),
            other => panic!("expected injected I/O error, got {:?}", other),
        }

        let from_file = temp.path().join("upload");
        fs::write(&from_file, b"after").unwrap();
        assert!(matches!(
            storer.store_file(AREA, &from_file, doc(1), &resource),
            Err(FilesError::Io(_))
        ));

        assert_eq!(
            storer.get_bytes(AREA, doc(1), &resource).unwrap(),
            b"before"
        );
        // nothing was created for a document that did not exist yet
        assert!(storer
            .store(AREA, &mut &b"x"[..], doc(2), &resource)
            .is_err());
        assert!(!storer.inner().area(AREA).unwrap().document_dir(doc(2)).exists());
    }

    #[test]
    fn test_dummy_file_on_read() {
        let temp = TempDir::new().unwrap();
        let storer = wrapped(&temp).with_fixture(b"fixture".to_vec());
        storer
            .store(AREA, &mut &b"real content"[..], doc(1), &name("1.0"))
            .unwrap();

        storer.set_use_dummy_file(true);
        assert_eq!(
            storer
                .get_string(AREA, doc(1), &name("1.0"), Charset::Utf8)
                .unwrap(),
            "fixture"
        );
        // even for resources that were never stored
        assert_eq!(
            storer.get_bytes(AREA, doc(1), &name("7.0")).unwrap(),
            b"fixture"
        );

        storer.set_use_dummy_file(false);
        assert_eq!(
            storer.get_bytes(AREA, doc(1), &name("1.0")).unwrap(),
            b"real content"
        );
    }

    #[test]
    fn test_dummy_file_on_store() {
        let temp = TempDir::new().unwrap();
        let storer = wrapped(&temp);
        storer.set_use_dummy_file(true);

        storer
            .store(AREA, &mut &b"caller content"[..], doc(3), &name("1.0"))
            .unwrap();
        storer
            .store_file(AREA, &temp.path().join("does-not-exist"), doc(3), &name("1.1"))
            .unwrap();

        let inner = storer.inner();
        assert_eq!(inner.get_bytes(AREA, doc(3), &name("1.0")).unwrap(), DEFAULT_FIXTURE);
        assert_eq!(inner.get_bytes(AREA, doc(3), &name("1.1")).unwrap(), DEFAULT_FIXTURE);
    }

    #[test]
    fn test_error_wins_over_dummy_file() {
        let temp = TempDir::new().unwrap();
        let storer = wrapped(&temp);
        storer.set_use_dummy_file(true);
        storer.set_error_on_store(true);

        assert!(storer
            .store(AREA, &mut &b"x"[..], doc(4), &name("1.0"))
            .is_err());
        assert_eq!(storer.size(AREA, doc(4), &name("1.0")).unwrap(), 0);
    }

    #[test]
    fn test_fixture_file() {
        let temp = TempDir::new().unwrap();
        let fixture = temp.path().join("fixture.xml");
        fs::write(&fixture, "<project/>").unwrap();

        let storer = wrapped(&temp).with_fixture_file(&fixture).unwrap();
        assert_eq!(storer.fixture(), b"<project/>");

        assert!(wrapped(&temp)
            .with_fixture_file(&temp.path().join("missing.xml"))
            .is_err());
    }

    #[test]
    fn test_flags_shared_across_threads() {
        let temp = TempDir::new().unwrap();
        let storer = Arc::new(wrapped(&temp));

        let toggler = Arc::clone(&storer);
        std::thread::spawn(move || toggler.set_error_on_store(true))
            .join()
            .unwrap();

        assert!(storer.is_error_on_store());
        assert!(storer
            .store(AREA, &mut &b"x"[..], doc(5), &name("1.0"))
            .is_err());
    }

    #[test]
    fn test_delegates_everything_else() {
        let temp = TempDir::new().unwrap();
        let areas = StorageAreas::new([
            StorageArea::new(AREA, temp.path().join("a")),
            StorageArea::new(StorageId::new(2), temp.path().join("b")),
        ])
        .unwrap();
        let storer =
            FaultInjectingStorer::new(FsStorer::new(StoreConfig::new(areas, AREA).unwrap()));

        storer
            .store(AREA, &mut &b"abc"[..], doc(6), &name("1.0"))
            .unwrap();
        assert_eq!(storer.size(AREA, doc(6), &name("1.0")).unwrap(), 3);
        assert_eq!(storer.list_resources(AREA, doc(6), None).unwrap().count(), 1);

        let report = storer
            .move_resources_to_store(doc(6), AREA, StorageId::new(2))
            .unwrap();
        assert_eq!(report.moved_count(), 1);
        assert!(storer.exists(StorageId::new(2), doc(6), &name("1.0")).unwrap());

        storer.delete(StorageId::new(2), doc(6), &name("1.0")).unwrap();
        assert!(!storer.exists(StorageId::new(2), doc(6), &name("1.0")).unwrap());
    }
}
