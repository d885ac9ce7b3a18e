//! Free-space arbitration for filesystem targets.
//!
//! Applying a patch to a filesystem path needs room for both the `.patch`
//! staging file and, if a cache copy of the source is made, that copy too.
//! [`has_sufficient_space`] encodes the margin the engine checks before
//! deciding whether it can decode in place or must relocate the source to
//! the cache first.

use std::path::Path;

#[derive(thiserror::Error, Debug)]
pub enum SpaceError {
    #[error("failed to stat filesystem containing {path}: {source}")]
    Statvfs { path: String, source: nix::Error },
    #[error("cache eviction failed while trying to free {bytes} bytes: {source}")]
    Evict { bytes: u64, source: std::io::Error },
}

/// External collaborator that frees up space on the cache filesystem before
/// the engine stages a source copy there. The eviction policy itself (which
/// cache entries to drop, and in what order) is out of scope for this crate;
/// this trait is only the seam a caller plugs a policy into.
pub trait CacheEvictor {
    fn ensure_free(&mut self, bytes: u64) -> std::io::Result<()>;
}

/// A [`CacheEvictor`] that evicts nothing. The default when the caller has
/// no cache-management policy to plug in — callers embedding this crate in
/// a system with a real cache manager supply their own implementation.
pub struct NoEviction;

impl CacheEvictor for NoEviction {
    fn ensure_free(&mut self, _bytes: u64) -> std::io::Result<()> {
        Ok(())
    }
}

/// Bytes free on the filesystem containing `path`, as reported by
/// `statvfs` (block count times fragment size, the conservative measure
/// `df` itself uses for "available").
pub fn free_space(path: &Path) -> Result<u64, SpaceError> {
    let stat = nix::sys::statvfs::statvfs(path).map_err(|e| SpaceError::Statvfs {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(stat.blocks_available() * stat.fragment_size())
}

/// A filesystem has enough room for a target of `target_size` bytes if it
/// clears an absolute floor AND a margin proportional to the target: the
/// floor absorbs small-file overhead, the margin absorbs the window where
/// the old file, the new `.patch` staging file, and (on a cache-copy path)
/// the saved source all coexist.
pub fn has_sufficient_space(free_bytes: u64, target_size: u64) -> bool {
    use crate::config::{FREE_SPACE_MARGIN_DEN, FREE_SPACE_MARGIN_NUM, MIN_FREE_SPACE_BYTES};

    if free_bytes <= MIN_FREE_SPACE_BYTES {
        return false;
    }
    let margin_needed = target_size.saturating_mul(FREE_SPACE_MARGIN_NUM) / FREE_SPACE_MARGIN_DEN;
    free_bytes > margin_needed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_when_below_floor() {
        assert!(!has_sufficient_space(1024, 10));
    }

    #[test]
    fn rejects_when_margin_not_cleared() {
        // 1000 bytes free, target 1000 bytes: margin needed is 1500.
        assert!(!has_sufficient_space(300 * 1024, 1000 * 1024));
    }

    #[test]
    fn accepts_ample_space() {
        assert!(has_sufficient_space(10 * 1024 * 1024, 1024 * 1024));
    }

    #[test]
    fn free_space_reports_real_filesystem() {
        let bytes = free_space(Path::new("/tmp")).unwrap();
        assert!(bytes > 0);
    }
}
