//! Identifier types shared across the docstore crates.
//!
//! Every value here is validated on construction, so code that receives a [`DocId`] or a
//! [`FileVersion`] never has to re-check it.

use std::fmt;
use std::str::FromStr;

/// Errors that can occur when creating validated identifier types.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TypeError {
    /// Document ids start at 1
    #[error("document id must be positive")]
    ZeroDocId,

    /// The input could not be parsed as a number
    #[error("not a number: '{0}'")]
    NotANumber(String),

    /// The input is not a dot-separated numeric version such as `1.0`
    #[error("invalid file version: '{0}'")]
    InvalidVersion(String),
}

/// Identifier of a document, stable for its whole lifetime (across versions and aliases).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocId(u64);

impl DocId {
    /// Creates a `DocId`, rejecting zero.
    pub fn new(id: u64) -> Result<Self, TypeError> {
        if id == 0 {
            return Err(TypeError::ZeroDocId);
        }
        Ok(Self(id))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DocId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = s
            .trim()
            .parse::<u64>()
            .map_err(|_| TypeError::NotANumber(s.to_owned()))?;
        Self::new(id)
    }
}

impl serde::Serialize for DocId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_u64(self.0)
    }
}

impl<'de> serde::Deserialize<'de> for DocId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let id = u64::deserialize(deserializer)?;
        DocId::new(id).map_err(serde::de::Error::custom)
    }
}

/// Identifier of a storage area (one physical root directory tree).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct StorageId(u32);

impl StorageId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for StorageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for StorageId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u32>()
            .map(Self)
            .map_err(|_| TypeError::NotANumber(s.to_owned()))
    }
}

/// Multi-tenant partition. Logical scoping only; it never affects where files live.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct TenantId(u64);

impl TenantId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

/// A document file version: dot-separated numeric components such as `1.0` or `2.15`.
///
/// Only ASCII digits and dots are accepted. Resource naming relies on this to split
/// `<version>-<suffix>` names without ambiguity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileVersion(String);

impl FileVersion {
    /// Validates and wraps a version string. Surrounding whitespace is trimmed.
    pub fn new(input: impl AsRef<str>) -> Result<Self, TypeError> {
        let trimmed = input.as_ref().trim();
        if !Self::is_valid(trimmed) {
            return Err(TypeError::InvalidVersion(input.as_ref().to_owned()));
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Returns true if `input` is a well-formed version, without allocating.
    pub fn is_valid(input: &str) -> bool {
        !input.is_empty()
            && input
                .split('.')
                .all(|part| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for FileVersion {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FileVersion::new(s)
    }
}

impl AsRef<str> for FileVersion {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for FileVersion {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for FileVersion {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        FileVersion::new(&s).map_err(serde::de::Error::custom)
    }
}

/// The slice of a document the storage engine needs to know about.
///
/// `file_version` is the document's current file version; resource naming falls back to
/// it when a caller asks for "the" file of the document without naming a version.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DocumentRef {
    pub id: DocId,
    pub file_version: FileVersion,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<TenantId>,
}

impl DocumentRef {
    pub fn new(id: DocId, file_version: FileVersion) -> Self {
        Self {
            id,
            file_version,
            tenant_id: None,
        }
    }

    pub fn with_tenant(mut self, tenant_id: TenantId) -> Self {
        self.tenant_id = Some(tenant_id);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doc_id_rejects_zero() {
        assert_eq!(DocId::new(0), Err(TypeError::ZeroDocId));
        assert_eq!(DocId::new(7).unwrap().get(), 7);
    }

    #[test]
    fn test_doc_id_from_str() {
        assert_eq!("42".parse::<DocId>().unwrap().get(), 42);
        assert!(matches!(
            "forty-two".parse::<DocId>(),
            Err(TypeError::NotANumber(_))
        ));
        assert_eq!("0".parse::<DocId>(), Err(TypeError::ZeroDocId));
    }

    #[test]
    fn test_file_version_valid_forms() {
        for input in ["1", "1.0", "2.15", "10.0.3"] {
            let version = FileVersion::new(input).unwrap();
            assert_eq!(version.as_str(), input);
        }
    }

    #[test]
    fn test_file_version_trims_whitespace() {
        assert_eq!(FileVersion::new("  1.2 ").unwrap().as_str(), "1.2");
    }

    #[test]
    fn test_file_version_rejects_malformed() {
        for input in ["", ".", "1.", ".1", "1..0", "1.0a", "v1", "1-0", "1/0", "../1"] {
            assert!(
                FileVersion::new(input).is_err(),
                "expected '{}' to be rejected",
                input
            );
        }
    }

    #[test]
    fn test_storage_id_parse() {
        assert_eq!("9".parse::<StorageId>().unwrap(), StorageId::new(9));
        assert!("-1".parse::<StorageId>().is_err());
    }

    #[test]
    fn test_document_ref_serde() {
        let doc = DocumentRef::new(DocId::new(5).unwrap(), FileVersion::new("1.3").unwrap())
            .with_tenant(TenantId::new(2));
        let json = serde_json::to_string(&doc).unwrap();
        assert_eq!(json, r#"{"id":5,"file_version":"1.3","tenant_id":2}"#);

        let back: DocumentRef = serde_json::from_str(&json).unwrap();
        assert_eq!(back, doc);

        let bad = serde_json::from_str::<DocumentRef>(r#"{"id":0,"file_version":"1.0"}"#);
        assert!(bad.is_err());
    }
}
