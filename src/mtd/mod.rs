//! MTD (raw flash) read/write discipline — the multi-candidate source
//! identification protocol and erase-before-write discipline that make
//! patching a raw partition safe when there is no end-of-file marker.
//!
//! The real flash driver (partition enumeration, block read/write/erase) is
//! an external collaborator. It is modeled here as the
//! [`MtdDevice`]/[`MtdPartitionHandle`]/[`MtdWriter`] traits so the probe and
//! write protocols are exercised against a real filesystem-backed stand-in
//! ([`FsMtdDevice`]) in tests.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::content::FileContents;
use crate::hash::{parse_sha1, Sha1Digest};

mod uri;
pub use uri::{extract_write_partition, is_mtd_name, MtdUri, MtdUriError};

mod fs_device;
pub use fs_device::FsMtdDevice;

#[derive(thiserror::Error, Debug)]
pub enum MtdError {
    #[error(transparent)]
    Uri(#[from] MtdUriError),
    #[error("mtd partition \"{0}\" not found")]
    PartitionNotFound(String),
    #[error("failed to open mtd partition \"{partition}\" for {op}: {source}")]
    Open {
        partition: String,
        op: &'static str,
        source: std::io::Error,
    },
    #[error("short read ({got} bytes of {expected}) for partition \"{partition}\"")]
    ShortRead {
        partition: String,
        got: usize,
        expected: usize,
    },
    #[error("short write ({wrote} bytes of {expected}) for partition \"{partition}\"")]
    ShortWrite {
        partition: String,
        wrote: usize,
        expected: usize,
    },
    #[error("erase of partition \"{partition}\" failed: {source}")]
    Erase {
        partition: String,
        source: std::io::Error,
    },
    #[error("close of partition \"{partition}\" failed: {source}")]
    Close {
        partition: String,
        source: std::io::Error,
    },
    #[error("contents of mtd partition \"{partition}\" matched none of the supplied hashes")]
    ProbeMiss { partition: String },
}

/// A flash driver's partition enumerator. One-shot partition scanning per
/// process is the implementation's job — this trait does not prescribe
/// how, only what's returned.
pub trait MtdDevice {
    fn find_partition(&self, name: &str) -> Result<Box<dyn MtdPartitionHandle>, MtdError>;
}

/// A named partition, openable for sequential read or erase-then-write.
pub trait MtdPartitionHandle {
    fn name(&self) -> &str;
    fn open_read(&self) -> Result<Box<dyn Read>, MtdError>;
    fn open_write(&self) -> Result<Box<dyn MtdWriter>, MtdError>;
}

/// A write context over a partition: write the payload, then erase the tail,
/// then close — in that order.
pub trait MtdWriter: Write {
    /// Erase all blocks past the data already written.
    fn erase_to_end(&mut self) -> std::io::Result<()>;
    fn close(self: Box<Self>) -> std::io::Result<()>;
}

static PARTITIONS_SCANNED: OnceLock<()> = OnceLock::new();

/// One-shot partition-table scan, guarded by a flag owned by this module
/// rather than by callers.
fn ensure_partitions_scanned<D: MtdDevice + ?Sized>(_device: &D) {
    PARTITIONS_SCANNED.get_or_init(|| ());
}

/// Parse an `MTD:<partition>:<size>:<sha1>...` URI and identify which
/// candidate prefix of the partition is actually present.
///
/// Reads the partition once, forward-only, maintaining a running SHA-1
/// context over bytes consumed so far. Candidates are tried in ascending
/// size order; the first matching hash wins.
pub fn probe(device: &dyn MtdDevice, uri: &MtdUri) -> Result<FileContents, MtdError> {
    ensure_partitions_scanned(device);

    let partition = device.find_partition(&uri.partition)?;
    let mut reader = partition.open_read()?;

    let mut candidates: Vec<(u64, Sha1Digest)> = uri.candidates.clone();
    candidates.sort_by_key(|(size, _)| *size);

    let max_size = candidates.last().map(|(size, _)| *size).unwrap_or(0) as usize;
    let mut buffer = vec![0u8; max_size];
    let mut hasher = sha1::Sha1::new();
    use sha1::Digest as _;

    let mut read_so_far = 0usize;
    for (size, expected) in &candidates {
        let size = *size as usize;
        if size > read_so_far {
            let next = size - read_so_far;
            let got = read_exact_best_effort(reader.as_mut(), &mut buffer[read_so_far..size])?;
            if got != next {
                return Err(MtdError::ShortRead {
                    partition: uri.partition.clone(),
                    got,
                    expected: next,
                });
            }
            hasher.update(&buffer[read_so_far..size]);
            read_so_far = size;
        }

        let candidate_hash: [u8; 20] = hasher.clone().finalize().into();
        if &candidate_hash == expected.as_bytes() {
            buffer.truncate(size);
            return Ok(finish_probe(buffer));
        }
    }

    Err(MtdError::ProbeMiss {
        partition: uri.partition.clone(),
    })
}

fn finish_probe(data: Vec<u8>) -> FileContents {
    use crate::config::{MTD_FAKE_GID, MTD_FAKE_MODE, MTD_FAKE_UID};
    let sha1 = Sha1Digest::of(&data);
    let length = data.len();
    FileContents {
        data,
        length,
        mode: MTD_FAKE_MODE,
        uid: MTD_FAKE_UID,
        gid: MTD_FAKE_GID,
        sha1,
    }
}

fn read_exact_best_effort(r: &mut dyn Read, buf: &mut [u8]) -> Result<usize, MtdError> {
    let mut done = 0;
    while done < buf.len() {
        match r.read(&mut buf[done..]) {
            Ok(0) => break,
            Ok(n) => done += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(_) => break,
        }
    }
    Ok(done)
}

/// Write `data` to the partition named in `target_uri`'s write grammar
/// (`"MTD:" partition (":" anything)*`; only the partition name matters),
/// erasing any remaining blocks past the written data.
pub fn write(device: &dyn MtdDevice, data: &[u8], target_uri: &str) -> Result<(), MtdError> {
    ensure_partitions_scanned(device);

    let partition_name = uri::extract_write_partition(target_uri)?;
    let partition = device.find_partition(&partition_name)?;
    let mut writer = partition.open_write()?;

    let wrote = writer.write(data).map_err(|e| MtdError::Open {
        partition: partition_name.clone(),
        op: "write",
        source: e,
    })?;
    if wrote != data.len() {
        return Err(MtdError::ShortWrite {
            partition: partition_name,
            wrote,
            expected: data.len(),
        });
    }

    writer
        .erase_to_end()
        .map_err(|e| MtdError::Erase {
            partition: partition_name.clone(),
            source: e,
        })?;

    writer.close().map_err(|e| MtdError::Close {
        partition: partition_name,
        source: e,
    })
}

/// Base directory backing an [`FsMtdDevice`]'s synthetic partitions, used by
/// the CLI default wiring. Production MTD ioctl wiring is left to the host
/// platform's flash driver.
pub fn default_base_dir() -> PathBuf {
    PathBuf::from("/data/mtd")
}

pub(crate) fn partition_file_path(base: &Path, name: &str) -> PathBuf {
    base.join(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_accepts_smallest_matching_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let device = FsMtdDevice::new(dir.path());
        let mut contents = vec![b'A'; 2048];
        contents.extend(b"garbage-tail-data");
        device.write_partition_for_test("boot", &contents);

        let prefix_1024 = Sha1Digest::of(&vec![b'A'; 1024]);
        let prefix_2048 = Sha1Digest::of(&vec![b'A'; 2048]);
        let found = crate::mtd::probe(
            &device,
            &MtdUri {
                partition: "boot".into(),
                candidates: vec![(1024, prefix_1024), (2048, prefix_2048)],
            },
        )
        .unwrap();

        assert_eq!(found.length, 1024);
        assert_eq!(found.sha1, prefix_1024);
    }

    #[test]
    fn probe_fails_when_nothing_matches() {
        let dir = tempfile::tempdir().unwrap();
        let device = FsMtdDevice::new(dir.path());
        device.write_partition_for_test("boot", b"unrelated data");

        let bogus = parse_sha1(&"ab".repeat(20)).unwrap();
        let err = crate::mtd::probe(
            &device,
            &MtdUri {
                partition: "boot".into(),
                candidates: vec![(4, bogus)],
            },
        )
        .unwrap_err();
        assert!(matches!(err, MtdError::ProbeMiss { .. }));
    }

    #[test]
    fn write_then_erase_tail_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let device = FsMtdDevice::new(dir.path());
        device.write_partition_for_test("system", &vec![0u8; 4096]);

        write(&device, b"new-image", "MTD:system:ignored:fields").unwrap();
        let on_disk = device.read_partition_for_test("system");
        assert!(on_disk.starts_with(b"new-image"));
    }
}
