//! Block device interface (spec §4.1).
//!
//! The only object allowed to touch storage. Two implementations are
//! shipped: a file-backed image (`FileBlockDevice`) and an in-memory mock
//! used by tests (`MemBlockDevice`), matching spec §9's note that a
//! reimplementation is "polymorphic" over this capability.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::error::{FsError, FsResult};
use crate::layout::BLOCK_SIZE;

pub trait BlockDevice {
    /// Total number of `BLOCK_SIZE`-byte blocks on the device.
    fn num_blocks(&self) -> u32;

    /// Reads `buf.len() / BLOCK_SIZE` contiguous blocks starting at `first`
    /// into `buf`. `buf.len()` must be a multiple of `BLOCK_SIZE`.
    fn read(&mut self, first: u32, buf: &mut [u8]) -> FsResult<()>;

    /// Writes `buf.len() / BLOCK_SIZE` contiguous blocks starting at `first`
    /// from `buf`. `buf.len()` must be a multiple of `BLOCK_SIZE`.
    fn write(&mut self, first: u32, buf: &[u8]) -> FsResult<()>;

    /// Flushes `count` blocks starting at `first` to the medium.
    fn flush(&mut self, first: u32, count: u32) -> FsResult<()>;

    /// Releases the device. Idempotent.
    fn close(&mut self) -> FsResult<()>;
}

fn check_size(buf_len: usize) -> FsResult<u32> {
    if buf_len % BLOCK_SIZE != 0 {
        return Err(FsError::InvalidArgument);
    }
    Ok((buf_len / BLOCK_SIZE) as u32)
}

/// A regular file opened with `pread`/`pwrite`-style positioned I/O.
pub struct FileBlockDevice {
    file: File,
    num_blocks: u32,
}

impl FileBlockDevice {
    /// Opens an existing image file, inferring `num_blocks` from its length.
    pub fn open(path: impl AsRef<Path>) -> FsResult<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let len = file.metadata()?.len();
        if len % BLOCK_SIZE as u64 != 0 {
            return Err(FsError::InvalidArgument);
        }
        Ok(Self {
            file,
            num_blocks: (len / BLOCK_SIZE as u64) as u32,
        })
    }

    /// Creates a fresh image file of exactly `num_blocks` zero-filled blocks.
    pub fn create(path: impl AsRef<Path>, num_blocks: u32) -> FsResult<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(num_blocks as u64 * BLOCK_SIZE as u64)?;
        file.flush()?;
        Ok(Self { file, num_blocks })
    }
}

impl BlockDevice for FileBlockDevice {
    fn num_blocks(&self) -> u32 {
        self.num_blocks
    }

    fn read(&mut self, first: u32, buf: &mut [u8]) -> FsResult<()> {
        let blocks = check_size(buf.len())?;
        if first.checked_add(blocks).map_or(true, |end| end > self.num_blocks) {
            return Err(FsError::InvalidArgument);
        }
        self.file
            .seek(SeekFrom::Start(first as u64 * BLOCK_SIZE as u64))?;
        self.file.read_exact(buf)?;
        Ok(())
    }

    fn write(&mut self, first: u32, buf: &[u8]) -> FsResult<()> {
        let blocks = check_size(buf.len())?;
        if first.checked_add(blocks).map_or(true, |end| end > self.num_blocks) {
            return Err(FsError::InvalidArgument);
        }
        self.file
            .seek(SeekFrom::Start(first as u64 * BLOCK_SIZE as u64))?;
        self.file.write_all(buf)?;
        Ok(())
    }

    fn flush(&mut self, _first: u32, _count: u32) -> FsResult<()> {
        self.file.flush()?;
        self.file.sync_data()?;
        Ok(())
    }

    fn close(&mut self) -> FsResult<()> {
        self.flush(0, self.num_blocks)
    }
}

/// In-memory block device used by tests (spec §9).
pub struct MemBlockDevice {
    blocks: Vec<u8>,
    num_blocks: u32,
}

impl MemBlockDevice {
    pub fn new(num_blocks: u32) -> Self {
        Self {
            blocks: vec![0u8; num_blocks as usize * BLOCK_SIZE],
            num_blocks,
        }
    }
}

impl BlockDevice for MemBlockDevice {
    fn num_blocks(&self) -> u32 {
        self.num_blocks
    }

    fn read(&mut self, first: u32, buf: &mut [u8]) -> FsResult<()> {
        let blocks = check_size(buf.len())?;
        if first.checked_add(blocks).map_or(true, |end| end > self.num_blocks) {
            return Err(FsError::InvalidArgument);
        }
        let start = first as usize * BLOCK_SIZE;
        buf.copy_from_slice(&self.blocks[start..start + buf.len()]);
        Ok(())
    }

    fn write(&mut self, first: u32, buf: &[u8]) -> FsResult<()> {
        let blocks = check_size(buf.len())?;
        if first.checked_add(blocks).map_or(true, |end| end > self.num_blocks) {
            return Err(FsError::InvalidArgument);
        }
        let start = first as usize * BLOCK_SIZE;
        self.blocks[start..start + buf.len()].copy_from_slice(buf);
        Ok(())
    }

    fn flush(&mut self, _first: u32, _count: u32) -> FsResult<()> {
        Ok(())
    }

    fn close(&mut self) -> FsResult<()> {
        Ok(())
    }
}
