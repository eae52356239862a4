//! Byte-range read and write on top of the block-map; size and mtime
//! maintenance (spec §4.5).

use log::warn;

use crate::blockdev::BlockDevice;
use crate::error::{FsError, FsResult};
use crate::layout::BLOCK_SIZE;
use crate::volume::Volume;

/// Stat information returned by `Volume::stat` (spec §4.5, §6).
#[derive(Debug, Clone, Copy)]
pub struct Stat {
    pub ino: u32,
    pub mode: u32,
    pub nlink: u32,
    pub uid: u16,
    pub gid: u16,
    pub size: u32,
    pub st_blocks: u32,
    pub atime: u32,
    pub ctime: u32,
    pub mtime: u32,
}

impl<D: BlockDevice> Volume<D> {
    /// Reads up to `len` bytes of inode `inum` starting at byte offset
    /// `off` into `buf` (`buf.len() >= len`). Returns the number of bytes
    /// actually read, clamped to `size - off`; 0 if `off >= size`.
    pub fn read_file(&mut self, inum: u32, buf: &mut [u8], len: usize, off: u64) -> FsResult<usize> {
        let size = self.inodes[inum as usize].size as u64;
        if off >= size {
            return Ok(0);
        }
        let len = len.min((size - off) as usize);
        let mut done = 0usize;
        let mut block_buf = [0u8; BLOCK_SIZE];
        while done < len {
            let pos = off + done as u64;
            let logical = pos / BLOCK_SIZE as u64;
            let off_in_block = (pos % BLOCK_SIZE as u64) as usize;
            let take = (BLOCK_SIZE - off_in_block).min(len - done);

            if self.get_file_blk(inum, logical, &mut block_buf, false).is_err() {
                warn!("read_file({inum}): missing block at logical {logical}");
                return Err(FsError::Io("missing data block".into()));
            }
            buf[done..done + take].copy_from_slice(&block_buf[off_in_block..off_in_block + take]);
            done += take;
        }
        Ok(done)
    }

    /// Writes `len` bytes from `buf` into inode `inum` at byte offset `off`.
    /// `off` must not exceed the current size (no holes). Partially
    /// overwritten boundary blocks are read before being modified so
    /// unmodified bytes survive. Returns the number of bytes written; on
    /// allocator exhaustion mid-write, already-written bytes remain
    /// durable and `NoSpace` is returned after flushing metadata.
    pub fn write_file(&mut self, inum: u32, buf: &[u8], len: usize, off: u64) -> FsResult<usize> {
        let size = self.inodes[inum as usize].size as u64;
        if off > size {
            return Err(FsError::InvalidArgument);
        }

        let mut done = 0usize;
        let mut block_buf = [0u8; BLOCK_SIZE];
        let result: FsResult<()> = (|| {
            while done < len {
                let pos = off + done as u64;
                let logical = pos / BLOCK_SIZE as u64;
                let off_in_block = (pos % BLOCK_SIZE as u64) as usize;
                let take = (BLOCK_SIZE - off_in_block).min(len - done);
                let partial = off_in_block != 0 || take != BLOCK_SIZE;

                let block = self.block_of(inum, logical, true)?;
                if block == 0 {
                    return Err(FsError::NoSpace);
                }

                if partial {
                    self.read_block(block, &mut block_buf)?;
                } else {
                    block_buf.fill(0);
                }
                block_buf[off_in_block..off_in_block + take]
                    .copy_from_slice(&buf[done..done + take]);
                self.write_block(block, &block_buf)?;

                done += take;
            }
            Ok(())
        })();

        let new_size = (off + done as u64).max(size);
        self.inodes[inum as usize].size = new_size as u32;
        self.inodes[inum as usize].mtime = now();
        self.mark_inode(inum);
        self.flush_metadata()?;

        match result {
            Ok(()) => Ok(done),
            Err(e) => Err(e),
        }
    }

    /// Fills in a `Stat` for inode `inum`.
    pub fn stat(&self, inum: u32) -> Stat {
        let ino = &self.inodes[inum as usize];
        Stat {
            ino: inum,
            mode: ino.mode,
            nlink: ino.nlink,
            uid: ino.uid,
            gid: ino.gid,
            size: ino.size,
            st_blocks: (ino.size as u64 + 511).div_euclid(512) as u32,
            atime: ino.mtime,
            ctime: ino.ctime,
            mtime: ino.mtime,
        }
    }
}

/// Wall-clock seconds since the epoch, truncated to u32 as the on-disk
/// format stores 32-bit timestamps.
pub fn now() -> u32 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}
