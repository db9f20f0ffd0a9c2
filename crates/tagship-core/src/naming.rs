//! Deterministic artifact names.
//!
//! The same name is used for the stored build artifact and the release asset,
//! which is what lets a re-pushed tag overwrite rather than duplicate.

/// Extension of every archive.
pub const ARCHIVE_EXTENSION: &str = ".tar.gz";

/// Extension of the checksum sidecar written next to a stored archive.
pub const CHECKSUM_EXTENSION: &str = ".sha256";

/// `<binary>-<target>.tar.gz`
pub fn archive_name(binary: &str, target: &str) -> String {
    format!("{binary}-{target}{ARCHIVE_EXTENSION}")
}

/// `<archive>.sha256`
pub fn checksum_name(archive_name: &str) -> String {
    format!("{archive_name}{CHECKSUM_EXTENSION}")
}
