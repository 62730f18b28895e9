/// Prefix of in-flight temporary files. Resource names can never start with `.`, so these
/// never show up in listings.
pub const TEMP_FILE_PREFIX: &str = ".docstore-";

pub const TEMP_FILE_SUFFIX: &str = ".tmp";

/// Content substituted by [`crate::FaultInjectingStorer`] when dummy files are enabled.
pub const DEFAULT_FIXTURE: &[u8] = b"docstore dummy resource\n";

/// Message of the error raised by [`crate::FaultInjectingStorer`] on store.
pub(crate) const INJECTED_FAULT_MESSAGE: &str = "error";

pub(crate) const COPY_BUFFER_SIZE: usize = 64 * 1024;
