//! The update engine: the retry/space/commit state machine that ties
//! together source identification, patch selection, decoding, verification,
//! and crash-safe commit.

use std::fs::{self, OpenOptions};
use std::path::Path;

use crate::config::PATCH_SUFFIX;
use crate::content::{self, ContentError, FileContents};
use crate::dispatch::{self, DecodeError};
use crate::hash::Sha1Digest;
use crate::mtd::{self, is_mtd_name, MtdDevice, MtdError};
use crate::sink::{FileSink, HashingSink, MemorySink};
use crate::space::{self, CacheEvictor, SpaceError};

/// How many times the engine will retry a failed decode after the first
/// attempt. Space relocation happens at most once regardless of this budget
/// (see "Space protocol" below).
const DECODE_RETRY_BUDGET: u32 = 1;

/// The sentinel meaning "overwrite the source in place".
const TARGET_IS_SOURCE: &str = "-";

/// The tag on a caller-supplied [`PatchValue`]. Mirrors the
/// surrounding scripting layer's typed value system (`Value->type` in the
/// original `applypatch.c`) just enough to enforce "only a blob is
/// accepted" without modeling that layer's full value system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueTag {
    String,
    Blob,
    Package,
}

/// An opaque payload handed in by the surrounding scripting layer. Only
/// [`ValueTag::Blob`] is accepted by the engine; anything else is rejected
/// with [`EngineError::NotABlob`] before it ever reaches a decoder.
pub struct PatchValue {
    pub tag: ValueTag,
    pub data: Vec<u8>,
}

impl PatchValue {
    /// Unwrap a blob-tagged value, or fail hard on any other tag.
    pub fn as_blob(&self) -> Result<&[u8], EngineError> {
        match self.tag {
            ValueTag::Blob => Ok(&self.data),
            _ => Err(EngineError::NotABlob),
        }
    }
}

/// One candidate patch: the source hash it was built against, plus the
/// patch bytes themselves (BSDIFF40 or IMGDIFF2, identified by magic at
/// apply time). Constructed from a [`PatchValue`] via [`PatchValue::as_blob`]
/// — by the time the engine sees a `PatchBlob`, the tag check has already
/// happened.
pub struct PatchBlob<'a> {
    pub source_sha1: Sha1Digest,
    pub data: &'a [u8],
}

/// Everything needed to bring `target_name` to a known-good state.
pub struct UpdateRequest<'a> {
    pub source_name: &'a str,
    /// The sentinel `"-"` means "overwrite `source_name` in place".
    pub target_name: &'a str,
    pub target_sha1: Sha1Digest,
    pub target_size: u64,
    pub patches: &'a [PatchBlob<'a>],
    /// Path for the crash-recovery copy of the source, normally
    /// [`crate::config::CACHE_TEMP_SOURCE`]. Exposed as a field (rather
    /// than hardcoded) so callers that sandbox a single apply — tests,
    /// dry runs — can point it elsewhere instead of racing every other
    /// concurrent apply over one global path.
    pub cache_temp_source: &'a str,
}

#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Content(#[from] ContentError),
    #[error(transparent)]
    Mtd(#[from] MtdError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Space(#[from] SpaceError),
    #[error("no patch in the update matches the current source state")]
    NoMatchingPatch,
    #[error("patch value is not a blob")]
    NotABlob,
    #[error("decoded output does not match the expected target hash")]
    VerifyFailed,
    #[error("insufficient space to stage the patch and the source cannot be relocated")]
    OutOfSpace,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Apply `request`, returning `Ok(())` once the target holds exactly
/// `target_size` bytes hashing to `target_sha1`.
///
/// Idempotent: if the target already matches, this is a no-op. Crash-safe
/// for filesystem targets via stage-then-`rename`; for MTD targets, safety
/// rests entirely on the cache copy made before an in-place erase+write,
/// since there is no atomic rename for raw flash.
pub fn apply(
    request: &UpdateRequest,
    device: &dyn MtdDevice,
    evictor: &mut dyn CacheEvictor,
) -> Result<(), EngineError> {
    let target_name = resolve_target_name(request);

    if target_already_applied(target_name, request, device) {
        return Ok(());
    }

    let result = apply_inner(request, target_name, device, evictor);

    // Whether the cache copy was written by this run or left over from a
    // prior interrupted one, a successful commit makes it redundant.
    if result.is_ok() {
        let _ = fs::remove_file(request.cache_temp_source);
    }
    result
}

fn resolve_target_name<'a>(request: &'a UpdateRequest<'a>) -> &'a str {
    if request.target_name == TARGET_IS_SOURCE {
        request.source_name
    } else {
        request.target_name
    }
}

/// Probe the target for the expected state without applying anything.
///
/// For a filesystem target this is a direct load. For an MTD target there
/// is nothing to "just read" — a raw partition carries no end-of-file
/// marker — so a synthetic single-candidate probe URI is built from the
/// request's own `target_size`/`target_sha1`, reusing the same probe
/// protocol a source load would use.
fn target_already_applied(target_name: &str, request: &UpdateRequest, device: &dyn MtdDevice) -> bool {
    let probe_name = if is_mtd_name(target_name) {
        match mtd::extract_write_partition(target_name) {
            Ok(partition) => format!("MTD:{partition}:{}:{}", request.target_size, request.target_sha1),
            Err(_) => return false,
        }
    } else {
        target_name.to_string()
    };

    match content::load(&probe_name, device) {
        Ok(existing) => {
            existing.length as u64 == request.target_size && existing.sha1 == request.target_sha1
        }
        Err(_) => false,
    }
}

/// A source accepted by [`select_source_and_patch`], along with whether it
/// came from the named source path or from the recovery cache copy.
struct SelectedSource<'p> {
    contents: FileContents,
    patch: &'p PatchBlob<'p>,
    from_cache: bool,
}

/// Find a source whose hash matches one of the candidate patches, trying the
/// named source first and the cache copy second. Both lookups use the same
/// "first candidate whose source hash matches" rule — the asymmetry some
/// implementations draw between the two lookups is not reproduced here.
fn select_source_and_patch<'a>(
    request: &'a UpdateRequest<'a>,
    device: &dyn MtdDevice,
) -> Result<SelectedSource<'a>, EngineError> {
    if let Ok(direct) = content::load(request.source_name, device) {
        if let Some(patch) = find_matching_patch(request.patches, direct.sha1) {
            return Ok(SelectedSource {
                contents: direct,
                patch,
                from_cache: false,
            });
        }
    }

    if let Ok(cached) = content::load(request.cache_temp_source, device) {
        if let Some(patch) = find_matching_patch(request.patches, cached.sha1) {
            return Ok(SelectedSource {
                contents: cached,
                patch,
                from_cache: true,
            });
        }
    }

    Err(EngineError::NoMatchingPatch)
}

fn find_matching_patch<'a>(
    patches: &'a [PatchBlob<'a>],
    source_sha1: Sha1Digest,
) -> Option<&'a PatchBlob<'a>> {
    patches.iter().find(|p| p.source_sha1 == source_sha1)
}

fn apply_inner(
    request: &UpdateRequest,
    target_name: &str,
    device: &dyn MtdDevice,
    evictor: &mut dyn CacheEvictor,
) -> Result<(), EngineError> {
    let selected = select_source_and_patch(request, device)?;
    let source_is_mtd = is_mtd_name(request.source_name);
    let target_is_mtd = is_mtd_name(target_name);

    // An MTD target is committed by erasing and rewriting the partition in
    // place; there is no atomic rename to fall back on, so the pre-patch
    // source is always staged to the recovery cache first ("Space protocol
    // (MTD target)" below).
    let mut relocated_to_cache = selected.from_cache;
    if target_is_mtd && !relocated_to_cache {
        evictor
            .ensure_free(selected.contents.length as u64)
            .map_err(|e| SpaceError::Evict { bytes: selected.contents.length as u64, source: e })?;
        content::save(Path::new(request.cache_temp_source), &selected.contents)?;
        relocated_to_cache = true;
    }

    let mut attempt = 0u32;
    loop {
        if !target_is_mtd {
            ensure_room_for_staging(
                Path::new(target_name),
                request.target_size,
                request.source_name,
                request.cache_temp_source,
                &selected.contents,
                source_is_mtd,
                selected.from_cache,
                &mut relocated_to_cache,
                evictor,
            )?;
        }

        match decode_verify_and_commit(request, target_name, target_is_mtd, &selected, device) {
            Ok(()) => return Ok(()),
            Err(AttemptError::Decode(_)) if attempt < DECODE_RETRY_BUDGET => {
                attempt += 1;
                continue;
            }
            Err(AttemptError::Decode(e)) => return Err(e.into()),
            Err(AttemptError::Fatal(e)) => return Err(e),
        }
    }
}

enum AttemptError {
    /// The decoder itself failed; budgeted for one retry.
    Decode(DecodeError),
    /// Verification, I/O, or MTD-write failure; never retried.
    Fatal(EngineError),
}

impl From<ContentError> for AttemptError {
    fn from(e: ContentError) -> Self {
        AttemptError::Fatal(e.into())
    }
}
impl From<MtdError> for AttemptError {
    fn from(e: MtdError) -> Self {
        AttemptError::Fatal(e.into())
    }
}
impl From<std::io::Error> for AttemptError {
    fn from(e: std::io::Error) -> Self {
        AttemptError::Fatal(e.into())
    }
}
impl From<EngineError> for AttemptError {
    fn from(e: EngineError) -> Self {
        AttemptError::Fatal(e)
    }
}

fn decode_verify_and_commit(
    request: &UpdateRequest,
    target_name: &str,
    target_is_mtd: bool,
    selected: &SelectedSource,
    device: &dyn MtdDevice,
) -> Result<(), AttemptError> {
    let source_bytes = &selected.contents.data[..selected.contents.length];
    let patch_bytes = selected.patch.data;

    if target_is_mtd {
        let mut sink = HashingSink::new(MemorySink::with_capacity(request.target_size as usize));
        if let Err(e) = dispatch::dispatch(source_bytes, patch_bytes, &mut sink) {
            return Err(AttemptError::Decode(e));
        }
        let digest = sink.digest();
        let decoded = sink.into_inner().into_written();
        verify(&decoded, digest, request.target_size, request.target_sha1)?;
        mtd::write(device, &decoded, target_name)?;
        return Ok(());
    }

    let staged_path = staged_patch_path(target_name);
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&staged_path)?;
    let mut sink = HashingSink::new(FileSink::new(file));

    let decode_result = dispatch::dispatch(source_bytes, patch_bytes, &mut sink);
    let digest = sink.digest();
    let mut file = sink.into_inner().into_inner();

    if let Err(e) = decode_result {
        let _ = fs::remove_file(&staged_path);
        return Err(AttemptError::Decode(e));
    }

    let verify_result = verify_len(&staged_path, request.target_size, digest, request.target_sha1);
    if let Err(e) = verify_result {
        let _ = fs::remove_file(&staged_path);
        return Err(e.into());
    }

    file.sync_all()?;
    drop(file);

    content::apply_metadata(&staged_path, &selected.contents)?;
    fs::rename(&staged_path, target_name)?;
    Ok(())
}

fn staged_patch_path(target_name: &str) -> std::path::PathBuf {
    std::path::PathBuf::from(format!("{target_name}{PATCH_SUFFIX}"))
}

fn verify(decoded: &[u8], digest: Sha1Digest, target_size: u64, target_sha1: Sha1Digest) -> Result<(), EngineError> {
    if decoded.len() as u64 != target_size || digest != target_sha1 {
        return Err(EngineError::VerifyFailed);
    }
    Ok(())
}

fn verify_len(
    staged_path: &Path,
    target_size: u64,
    digest: Sha1Digest,
    target_sha1: Sha1Digest,
) -> Result<(), EngineError> {
    let written = fs::metadata(staged_path).map(|m| m.len()).unwrap_or(0);
    if written != target_size || digest != target_sha1 {
        return Err(EngineError::VerifyFailed);
    }
    Ok(())
}

/// If the target filesystem can't hold the staged patch file alongside the
/// existing source, relocate the source to the recovery cache and remove it
/// from its original location — freeing its space before decoding proceeds.
/// Only attempted once per run; if space is still short afterward, the
/// apply proceeds anyway without the safety margin.
#[allow(clippy::too_many_arguments)]
fn ensure_room_for_staging(
    target_path: &Path,
    staged_size: u64,
    source_name: &str,
    cache_temp_source: &str,
    source: &FileContents,
    source_is_mtd: bool,
    source_from_cache: bool,
    relocated_to_cache: &mut bool,
    evictor: &mut dyn CacheEvictor,
) -> Result<(), EngineError> {
    let parent = target_path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| Path::new("."));
    let free = space::free_space(parent)?;
    if space::has_sufficient_space(free, staged_size) {
        return Ok(());
    }

    if source_is_mtd {
        return Err(EngineError::OutOfSpace);
    }
    if *relocated_to_cache {
        // Already relocated once; proceed without the margin guarantee.
        return Ok(());
    }

    let source_len = source.length as u64;
    evictor
        .ensure_free(source_len)
        .map_err(|e| SpaceError::Evict { bytes: source_len, source: e })?;
    content::save(Path::new(cache_temp_source), source)?;
    *relocated_to_cache = true;
    if !source_from_cache {
        let _ = fs::remove_file(source_name);
    }

    // Re-check is informational only: if space is still short the apply
    // proceeds regardless, with no further retry.
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_tagged_value_unwraps() {
        let value = PatchValue {
            tag: ValueTag::Blob,
            data: vec![1, 2, 3],
        };
        assert_eq!(value.as_blob().unwrap(), &[1, 2, 3]);
    }

    #[test]
    fn non_blob_tagged_value_is_rejected() {
        let value = PatchValue {
            tag: ValueTag::String,
            data: b"not a patch".to_vec(),
        };
        assert!(matches!(value.as_blob(), Err(EngineError::NotABlob)));
    }
}
