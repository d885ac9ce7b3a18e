//! Module-level constants: frozen paths, sizes, and margins the rest of the
//! crate treats as fixed points rather than recomputing.

/// Well-known path for the recovery backup of the pre-patch source.
/// Assumed to live on a filesystem distinct from the target.
pub const CACHE_TEMP_SOURCE: &str = "/cache/saved.file";

/// Minimum free space required on the target filesystem, regardless of
/// target size: a conservative floor of 256 KiB.
pub const MIN_FREE_SPACE_BYTES: u64 = 256 * 1024;

/// Safety margin multiplier applied to `target_size` when checking free
/// space: absorbs the window where both the `.patch` file and the source
/// coexist on disk.
pub const FREE_SPACE_MARGIN_NUM: u64 = 3;
pub const FREE_SPACE_MARGIN_DEN: u64 = 2;

/// Suffix applied to `target_name` for the staging file a filesystem-target
/// apply decodes into before the atomic rename.
pub const PATCH_SUFFIX: &str = ".patch";

/// Fallback mode bits applied to `FileContents` synthesized from an MTD
/// probe, since MTD partitions carry no POSIX metadata.
pub const MTD_FAKE_MODE: u32 = 0o644;
pub const MTD_FAKE_UID: u32 = 0;
pub const MTD_FAKE_GID: u32 = 0;
