//! Content loader and saver — load a file or MTD-partition prefix into
//! memory plus metadata, and persist a buffer back to a filesystem path with
//! preserved mode/ownership and explicit durability.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::Path;

use crate::hash::Sha1Digest;
use crate::mtd::{self, MtdDevice, MtdError};
use crate::sink::{FileSink, Sink};

/// An in-memory snapshot of a file or MTD partition prefix.
///
/// Invariant: after a successful load, `sha1 == Sha1Digest::of(&data)` and
/// `data.len() == length`.
#[derive(Debug, Clone)]
pub struct FileContents {
    pub data: Vec<u8>,
    pub length: usize,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub sha1: Sha1Digest,
}

impl FileContents {
    fn from_buffer(data: Vec<u8>, mode: u32, uid: u32, gid: u32) -> Self {
        let sha1 = Sha1Digest::of(&data);
        let length = data.len();
        Self {
            data,
            length,
            mode,
            uid,
            gid,
            sha1,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ContentError {
    #[error("failed to stat {path}: {source}")]
    Stat { path: String, source: std::io::Error },
    #[error("failed to open {path}: {source}")]
    Open { path: String, source: std::io::Error },
    #[error("short read of {path} ({got} bytes of {expected})")]
    ShortRead {
        path: String,
        got: usize,
        expected: usize,
    },
    #[error("failed to write {path}: {source}")]
    Write { path: String, source: std::io::Error },
    #[error("fsync of {path} failed: {source}")]
    Fsync { path: String, source: std::io::Error },
    #[error("chmod of {path} failed: {source}")]
    Chmod { path: String, source: std::io::Error },
    #[error("chown of {path} failed: {source}")]
    Chown { path: String, source: std::io::Error },
    #[error(transparent)]
    Mtd(#[from] MtdError),
}

/// Load `name` into memory.
///
/// `"MTD:..."` names dispatch to the [`mtd`] probe protocol; anything else is
/// read as a plain filesystem path via `stat` + a full read.
pub fn load(name: &str, device: &dyn MtdDevice) -> Result<FileContents, ContentError> {
    if let Some(uri) = mtd::MtdUri::parse_opt(name) {
        return Ok(mtd::probe(device, &uri)?);
    }

    let meta = fs::metadata(name).map_err(|e| ContentError::Stat {
        path: name.to_string(),
        source: e,
    })?;
    let expected = meta.len() as usize;

    let mut file = File::open(name).map_err(|e| ContentError::Open {
        path: name.to_string(),
        source: e,
    })?;
    let mut data = vec![0u8; expected];
    let got = read_best_effort(&mut file, &mut data).map_err(|e| ContentError::Open {
        path: name.to_string(),
        source: e,
    })?;
    if got != expected {
        return Err(ContentError::ShortRead {
            path: name.to_string(),
            got,
            expected,
        });
    }

    Ok(FileContents::from_buffer(
        data,
        meta.permissions().mode(),
        meta.uid(),
        meta.gid(),
    ))
}

fn read_best_effort(file: &mut File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut done = 0;
    while done < buf.len() {
        match file.read(&mut buf[done..]) {
            Ok(0) => break,
            Ok(n) => done += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(done)
}

/// Persist `contents` to `path`: create+truncate, write, `fsync`, close, then
/// `chmod`/`chown` to match the original metadata.
///
/// Any failure is fatal; `path` must be treated as undefined on error.
pub fn save(path: &Path, contents: &FileContents) -> Result<(), ContentError> {
    let path_str = path.display().to_string();
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .map_err(|e| ContentError::Open {
            path: path_str.clone(),
            source: e,
        })?;

    let mut sink = FileSink::new(file);
    sink.write(&contents.data[..contents.length])
        .map_err(|e| ContentError::Write {
            path: path_str.clone(),
            source: e,
        })?;

    sink.file_mut()
        .sync_all()
        .map_err(|e| ContentError::Fsync {
            path: path_str.clone(),
            source: e,
        })?;
    drop(sink);

    apply_metadata(path, contents)
}

/// Apply `contents`' mode/uid/gid to an already-written `path`.
///
/// Split out from [`save`] for callers that stream their own writes (the
/// engine's staged `.patch` file, written through a [`FileSink`] it owns
/// directly) and only need the metadata step afterward.
pub fn apply_metadata(path: &Path, contents: &FileContents) -> Result<(), ContentError> {
    let path_str = path.display().to_string();
    fs::set_permissions(path, fs::Permissions::from_mode(contents.mode)).map_err(|e| {
        ContentError::Chmod {
            path: path_str.clone(),
            source: e,
        }
    })?;
    chown(path, contents.uid, contents.gid).map_err(|e| ContentError::Chown {
        path: path_str.clone(),
        source: e,
    })?;

    Ok(())
}

fn chown(path: &Path, uid: u32, gid: u32) -> std::io::Result<()> {
    use nix::unistd::{Gid, Uid};
    nix::unistd::chown(path, Some(Uid::from_raw(uid)), Some(Gid::from_raw(gid)))
        .map_err(|errno| std::io::Error::from_raw_os_error(errno as i32))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mtd::FsMtdDevice;

    #[test]
    fn load_then_save_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("source.bin");
        std::fs::write(&src, b"A".repeat(1024)).unwrap();

        let device = FsMtdDevice::new(dir.path());
        let contents = load(src.to_str().unwrap(), &device).unwrap();
        assert_eq!(contents.length, 1024);
        assert_eq!(contents.sha1, Sha1Digest::of(&"A".repeat(1024).into_bytes()));

        let dst = dir.path().join("target.bin");
        save(&dst, &contents).unwrap();
        assert_eq!(std::fs::read(&dst).unwrap(), contents.data);
    }

    #[test]
    fn short_read_is_an_error() {
        // A file that shrinks between stat and read would be caught the same
        // way a short read from any source is; simulate by loading a path
        // that doesn't exist, which fails earlier at stat.
        let device = FsMtdDevice::new(Path::new("/nonexistent-base"));
        assert!(load("/nonexistent/path", &device).is_err());
    }
}
