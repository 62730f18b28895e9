//! Canonical resource names.

use crate::{NamingError, NamingResult};
use docstore_types::FileVersion;
use std::fmt;
use std::str::FromStr;

/// Longest name accepted, so that a resource always fits in one path component.
pub(crate) const MAX_NAME_LEN: usize = 255;

const VERSION_SEPARATOR: char = '-';

/// Name of one resource within a document's directory.
///
/// Construct with [`ResourceName::new`] from a version and a suffix, or with
/// [`ResourceName::parse`] when reading a name back from disk. Either way the result is
/// guaranteed to be a single, safe path component that round-trips to the same parts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceName(String);

impl ResourceName {
    /// Builds the name for `(version, suffix)`.
    ///
    /// An empty suffix counts as no suffix.
    ///
    /// # Errors
    ///
    /// - [`NamingError::Empty`] when both parts are absent
    /// - [`NamingError::IllegalCharacters`], [`NamingError::Reserved`] or
    ///   [`NamingError::TooLong`] for an unsafe suffix
    /// - [`NamingError::Ambiguous`] for a version-less suffix that looks versioned
    pub fn new(version: Option<&FileVersion>, suffix: Option<&str>) -> NamingResult<Self> {
        let suffix = suffix.filter(|s| !s.is_empty());

        let name = match (version, suffix) {
            (None, None) => return Err(NamingError::Empty),
            (Some(version), None) => version.as_str().to_owned(),
            (Some(version), Some(suffix)) => {
                validate_component(suffix)?;
                format!("{}{}{}", version, VERSION_SEPARATOR, suffix)
            }
            (None, Some(suffix)) => {
                validate_component(suffix)?;
                if split_version(suffix).is_some() {
                    return Err(NamingError::Ambiguous(suffix.to_owned()));
                }
                suffix.to_owned()
            }
        };

        if name.len() > MAX_NAME_LEN {
            return Err(NamingError::TooLong(name.len()));
        }
        Ok(Self(name))
    }

    /// Validates a name found on disk (or supplied by a caller as a raw string).
    pub fn parse(input: &str) -> NamingResult<Self> {
        if input.is_empty() {
            return Err(NamingError::Empty);
        }
        if input.len() > MAX_NAME_LEN {
            return Err(NamingError::TooLong(input.len()));
        }
        validate_component(input)?;

        if let Some((_, suffix)) = split_version(input) {
            // "1.0-" can never be produced, and "1.0-.x" hides a reserved suffix
            match suffix {
                Some("") => return Err(NamingError::Ambiguous(input.to_owned())),
                Some(suffix) if suffix.starts_with('.') => {
                    return Err(NamingError::Reserved(input.to_owned()))
                }
                _ => {}
            }
        }
        Ok(Self(input.to_owned()))
    }

    /// The version part, if the name has one.
    pub fn version(&self) -> Option<FileVersion> {
        split_version(&self.0).and_then(|(version, _)| FileVersion::new(version).ok())
    }

    /// The suffix part, if the name has one.
    pub fn suffix(&self) -> Option<&str> {
        match split_version(&self.0) {
            Some((_, suffix)) => suffix,
            None => Some(&self.0),
        }
    }

    /// True when this resource belongs to `version`.
    pub fn is_of_version(&self, version: &FileVersion) -> bool {
        split_version(&self.0).is_some_and(|(v, _)| v == version.as_str())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Splits `name` into `(version, suffix)` when it starts with a version.
fn split_version(name: &str) -> Option<(&str, Option<&str>)> {
    if FileVersion::is_valid(name) {
        return Some((name, None));
    }
    let (head, tail) = name.split_once(VERSION_SEPARATOR)?;
    FileVersion::is_valid(head).then_some((head, Some(tail)))
}

/// Checks that `component` is safe to use as a single file name.
fn validate_component(component: &str) -> NamingResult<()> {
    if component.contains(['/', '\\'])
        || component.contains("..")
        || component.chars().any(char::is_control)
    {
        return Err(NamingError::IllegalCharacters(component.to_owned()));
    }
    if component.starts_with('.') {
        return Err(NamingError::Reserved(component.to_owned()));
    }
    if component.len() > MAX_NAME_LEN {
        return Err(NamingError::TooLong(component.len()));
    }
    Ok(())
}

impl fmt::Display for ResourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ResourceName {
    type Err = NamingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResourceName::parse(s)
    }
}

impl AsRef<str> for ResourceName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for ResourceName {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for ResourceName {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        ResourceName::parse(&s).map_err(serde::de::Error::custom)
    }
}
