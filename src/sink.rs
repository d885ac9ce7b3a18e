//! Sink abstraction — the uniform "write N bytes" interface patch decoders
//! write through.
//!
//! Two implementations exist: [`FileSink`], which owns a file descriptor and
//! loops on short writes, and [`MemorySink`], which copies into a pre-sized
//! buffer at a cursor and refuses to overflow it. Decoders are the only
//! callers; callers outside this crate never construct a sink directly.

use std::fs::File;
use std::io::{self, Write};

use sha1::{Digest, Sha1};

use crate::hash::Sha1Digest;

/// A destination for decoder output.
///
/// Implementations must write every byte handed to them, in order, or return
/// an error — partial, silent writes are not a valid outcome.
pub trait Sink {
    fn write(&mut self, data: &[u8]) -> io::Result<()>;
}

/// Writes to an owned file, looping internally on short writes.
///
/// A write that makes no progress (`write()` returning `Ok(0)` with data
/// still pending) is treated as an irrecoverable error, not retried forever.
pub struct FileSink {
    file: File,
}

impl FileSink {
    pub fn new(file: File) -> Self {
        Self { file }
    }

    pub fn into_inner(self) -> File {
        self.file
    }

    pub fn file_mut(&mut self) -> &mut File {
        &mut self.file
    }
}

impl Sink for FileSink {
    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        let mut done = 0;
        while done < data.len() {
            let wrote = self.file.write(&data[done..])?;
            if wrote == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "short write while streaming patch output",
                ));
            }
            done += wrote;
        }
        Ok(())
    }
}

/// Copies into a fixed-capacity buffer at a cursor.
///
/// Fails with `ErrorKind::OutOfMemory` if a write would exceed `capacity` —
/// the Rust analogue of the original sentinel `-1` return.
pub struct MemorySink {
    buffer: Vec<u8>,
    cursor: usize,
}

impl MemorySink {
    /// Pre-size a buffer of exactly `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: vec![0u8; capacity],
            cursor: 0,
        }
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Consume the sink, returning only the bytes actually written.
    pub fn into_written(mut self) -> Vec<u8> {
        self.buffer.truncate(self.cursor);
        self.buffer
    }
}

impl Sink for MemorySink {
    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        if self.buffer.len() - self.cursor < data.len() {
            return Err(io::Error::new(
                io::ErrorKind::OutOfMemory,
                "memory sink capacity exceeded",
            ));
        }
        self.buffer[self.cursor..self.cursor + data.len()].copy_from_slice(data);
        self.cursor += data.len();
        Ok(())
    }
}

/// Wraps an inner sink, feeding every byte that passes through it into a
/// running SHA-1 context as well — the "decoder feeds the sink and the hash
/// context in the same order" contract as a single pass, rather
/// than hashing the decoded buffer again afterward.
pub struct HashingSink<S> {
    inner: S,
    hasher: Sha1,
}

impl<S: Sink> HashingSink<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            hasher: Sha1::new(),
        }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    pub fn inner_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    /// Finalize the running hash without consuming the sink.
    pub fn digest(&self) -> Sha1Digest {
        Sha1Digest(self.hasher.clone().finalize().into())
    }
}

impl<S: Sink> Sink for HashingSink<S> {
    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        self.inner.write(data)?;
        self.hasher.update(data);
        Ok(())
    }
}
