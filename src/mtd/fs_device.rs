//! A filesystem-backed [`MtdDevice`] standing in for a real flash driver:
//! each partition is a plain file under a base directory. Used by the test
//! suite and by the CLI when no real flash ioctl wiring is available.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use super::{partition_file_path, MtdDevice, MtdError, MtdPartitionHandle, MtdWriter};

pub struct FsMtdDevice {
    base: PathBuf,
}

impl FsMtdDevice {
    pub fn new(base: &Path) -> Self {
        Self { base: base.to_path_buf() }
    }

    #[cfg(test)]
    pub(crate) fn write_partition_for_test(&self, name: &str, data: &[u8]) {
        fs::write(partition_file_path(&self.base, name), data).unwrap();
    }

    #[cfg(test)]
    pub(crate) fn read_partition_for_test(&self, name: &str) -> Vec<u8> {
        fs::read(partition_file_path(&self.base, name)).unwrap()
    }
}

impl MtdDevice for FsMtdDevice {
    fn find_partition(&self, name: &str) -> Result<Box<dyn MtdPartitionHandle>, MtdError> {
        let path = partition_file_path(&self.base, name);
        if !path.exists() {
            return Err(MtdError::PartitionNotFound(name.to_string()));
        }
        Ok(Box::new(FsPartitionHandle {
            name: name.to_string(),
            path,
        }))
    }
}

struct FsPartitionHandle {
    name: String,
    path: PathBuf,
}

impl MtdPartitionHandle for FsPartitionHandle {
    fn name(&self) -> &str {
        &self.name
    }

    fn open_read(&self) -> Result<Box<dyn Read>, MtdError> {
        let file = File::open(&self.path).map_err(|e| MtdError::Open {
            partition: self.name.clone(),
            op: "read",
            source: e,
        })?;
        Ok(Box::new(file))
    }

    fn open_write(&self) -> Result<Box<dyn MtdWriter>, MtdError> {
        let original_len = fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0);
        let file = OpenOptions::new()
            .write(true)
            .open(&self.path)
            .map_err(|e| MtdError::Open {
                partition: self.name.clone(),
                op: "write",
                source: e,
            })?;
        Ok(Box::new(FsPartitionWriter {
            file,
            written: 0,
            original_len,
        }))
    }
}

struct FsPartitionWriter {
    file: File,
    written: u64,
    original_len: u64,
}

impl Write for FsPartitionWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.file.flush()
    }
}

impl MtdWriter for FsPartitionWriter {
    fn erase_to_end(&mut self) -> std::io::Result<()> {
        if self.written < self.original_len {
            self.file.set_len(self.written)?;
            self.file.set_len(self.original_len)?;
        }
        Ok(())
    }

    fn close(self: Box<Self>) -> std::io::Result<()> {
        self.file.sync_all()
    }
}
