//! Pre-flight check: does `filename` already hold one of the acceptable
//! hashes, without applying anything?
//!
//! An empty acceptable-hash list means "any successfully loadable content
//! passes" — used when the caller only wants to confirm the path is
//! readable at all, not that it matches a particular version.
//!
//! If `filename` doesn't load or its hash isn't in `expected`, the
//! crash-recovery cache copy is consulted before giving up: a run killed
//! mid-patch can leave the named source missing or corrupt with the
//! pre-patch backup still sitting in the cache.

use crate::content;
use crate::hash::Sha1Digest;
use crate::mtd::MtdDevice;

#[derive(thiserror::Error, Debug)]
pub enum CheckError {
    #[error(transparent)]
    Content(#[from] content::ContentError),
    #[error("{filename} did not match any of the {expected} acceptable hash(es)")]
    NoMatch { filename: String, expected: usize },
}

pub fn check(
    filename: &str,
    expected: &[Sha1Digest],
    cache_temp_source: &str,
    device: &dyn MtdDevice,
) -> Result<(), CheckError> {
    if let Ok(loaded) = content::load(filename, device) {
        if expected.is_empty() || expected.contains(&loaded.sha1) {
            return Ok(());
        }
    }

    let cached = content::load(cache_temp_source, device)?;
    if expected.is_empty() || expected.contains(&cached.sha1) {
        return Ok(());
    }

    Err(CheckError::NoMatch {
        filename: filename.to_string(),
        expected: expected.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mtd::FsMtdDevice;

    #[test]
    fn empty_expectation_accepts_any_loadable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.bin");
        std::fs::write(&path, b"anything").unwrap();
        let cache = dir.path().join("cache-slot");
        let device = FsMtdDevice::new(dir.path());
        assert!(check(path.to_str().unwrap(), &[], cache.to_str().unwrap(), &device).is_ok());
    }

    #[test]
    fn rejects_when_hash_not_in_list_and_no_cache_copy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.bin");
        std::fs::write(&path, b"anything").unwrap();
        let cache = dir.path().join("cache-slot");
        let device = FsMtdDevice::new(dir.path());
        let other = Sha1Digest::of(b"something-else");
        assert!(check(path.to_str().unwrap(), &[other], cache.to_str().unwrap(), &device).is_err());
    }

    #[test]
    fn accepts_when_hash_is_in_list() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.bin");
        std::fs::write(&path, b"anything").unwrap();
        let cache = dir.path().join("cache-slot");
        let device = FsMtdDevice::new(dir.path());
        let matching = Sha1Digest::of(b"anything");
        assert!(check(path.to_str().unwrap(), &[matching], cache.to_str().unwrap(), &device).is_ok());
    }

    #[test]
    fn falls_back_to_cache_copy_when_named_file_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.bin");
        let cache = dir.path().join("cache-slot");
        std::fs::write(&cache, b"recovered-bits").unwrap();
        let device = FsMtdDevice::new(dir.path());
        let matching = Sha1Digest::of(b"recovered-bits");
        assert!(check(path.to_str().unwrap(), &[matching], cache.to_str().unwrap(), &device).is_ok());
    }

    #[test]
    fn falls_back_to_cache_copy_when_named_file_hash_mismatches() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.bin");
        std::fs::write(&path, b"corrupted").unwrap();
        let cache = dir.path().join("cache-slot");
        std::fs::write(&cache, b"recovered-bits").unwrap();
        let device = FsMtdDevice::new(dir.path());
        let matching = Sha1Digest::of(b"recovered-bits");
        assert!(check(path.to_str().unwrap(), &[matching], cache.to_str().unwrap(), &device).is_ok());
    }

    #[test]
    fn rejects_when_neither_file_nor_cache_match() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.bin");
        std::fs::write(&path, b"corrupted").unwrap();
        let cache = dir.path().join("cache-slot");
        std::fs::write(&cache, b"also-wrong").unwrap();
        let device = FsMtdDevice::new(dir.path());
        let matching = Sha1Digest::of(b"expected-bits");
        assert!(check(path.to_str().unwrap(), &[matching], cache.to_str().unwrap(), &device).is_err());
    }

    #[test]
    fn rejects_when_file_missing_and_no_cache_copy_either() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.bin");
        let cache = dir.path().join("cache-slot");
        let device = FsMtdDevice::new(dir.path());
        assert!(check(path.to_str().unwrap(), &[], cache.to_str().unwrap(), &device).is_err());
    }
}
