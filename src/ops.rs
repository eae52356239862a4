//! Operation layer (spec §4.8): translates upcalls into calls on the path
//! resolver, directory/inode block-map and block device. Never translates
//! error kinds — it passes the signed integer straight back to the host
//! (spec §7).

use log::error;

use crate::blockdev::BlockDevice;
use crate::error::{FsError, FsResult};
use crate::file_io::Stat;
use crate::layout::{is_dir_mode, FileType};
use crate::volume::Volume;

/// Caller identity for a single upcall, normally supplied by the FUSE-style
/// host (out of scope for this crate, spec §1); falls back to 0/0 when the
/// host cannot supply one.
#[derive(Clone, Copy, Default)]
pub struct UpcallContext {
    pub uid: u16,
    pub gid: u16,
}

/// Total/free counts reported by `statfs`.
pub struct StatFs {
    pub num_blocks: u32,
    pub free_blocks: u32,
    pub num_inodes: u32,
    pub free_inodes: u32,
}

fn popcount_free(bitmap: &[u8], universe: u32, start: u32) -> u32 {
    (start..universe)
        .filter(|&bit| bitmap[(bit / 8) as usize] & (1 << (bit % 8)) == 0)
        .count() as u32
}

/// Thin translation layer over a mounted `Volume`.
pub struct Operations<D: BlockDevice> {
    pub volume: Volume<D>,
}

impl<D: BlockDevice> Operations<D> {
    pub fn new(volume: Volume<D>) -> Self {
        Self { volume }
    }

    pub fn getattr(&mut self, path: &str) -> FsResult<Stat> {
        let inum = self.volume.inode_of_path(path)?;
        Ok(self.volume.stat(inum))
    }

    pub fn readdir(&mut self, path: &str, skip_dots: bool) -> FsResult<Vec<(Vec<u8>, u32)>> {
        let inum = self.volume.inode_of_path(path)?;
        self.volume.readdir_entries(inum, skip_dots)
    }

    pub fn mknod(&mut self, path: &str, mode: u32, ctx: UpcallContext) -> FsResult<u32> {
        let mut leaf = Vec::new();
        let dir_inum = self.volume.inode_of_path_dir(path, &mut leaf)?;
        if leaf.is_empty() {
            return Err(FsError::InvalidArgument);
        }
        self.volume
            .mkentry(dir_inum, &leaf, mode, FileType::REG, ctx.uid, ctx.gid)
    }

    pub fn mkdir(&mut self, path: &str, mode: u32, ctx: UpcallContext) -> FsResult<u32> {
        let mut leaf = Vec::new();
        let dir_inum = self.volume.inode_of_path_dir(path, &mut leaf)?;
        if leaf.is_empty() {
            return Err(FsError::InvalidArgument);
        }
        self.volume
            .mkentry(dir_inum, &leaf, mode, FileType::DIR, ctx.uid, ctx.gid)
    }

    pub fn unlink(&mut self, path: &str) -> FsResult<()> {
        let mut leaf = Vec::new();
        let dir_inum = self.volume.inode_of_path_dir(path, &mut leaf)?;
        self.volume.unlink_entry(dir_inum, &leaf)
    }

    pub fn rmdir(&mut self, path: &str) -> FsResult<()> {
        let mut leaf = Vec::new();
        let dir_inum = self.volume.inode_of_path_dir(path, &mut leaf)?;
        self.volume.rmdir_entry(dir_inum, &leaf)
    }

    /// Same-directory rename only (spec §4.6/§6).
    pub fn rename(&mut self, src: &str, dst: &str) -> FsResult<()> {
        let mut src_leaf = Vec::new();
        let srcdir = self.volume.inode_of_path_dir(src, &mut src_leaf)?;
        let mut dst_leaf = Vec::new();
        let dstdir = self.volume.inode_of_path_dir(dst, &mut dst_leaf)?;
        self.volume
            .rename_entry(srcdir, &src_leaf, dstdir, &dst_leaf)
    }

    pub fn link(&mut self, src: &str, dst: &str) -> FsResult<()> {
        // A trailing slash leaves no real leaf component to bind the link
        // to (the resolver would otherwise synthesize a "." token), which
        // spec §4.6 calls out for -EACCES alongside an empty leaf.
        if dst.ends_with('/') {
            return Err(FsError::PermissionDenied);
        }
        let src_inum = self.volume.inode_of_path(src)?;
        let mut leaf = Vec::new();
        let dir_inum = self.volume.inode_of_path_dir(dst, &mut leaf)?;
        self.volume.link_entry(src_inum, dir_inum, &leaf)
    }

    /// Only `len == 0` is supported (spec §4.4/§4.5/§6).
    pub fn truncate(&mut self, path: &str, len: u64) -> FsResult<()> {
        if len != 0 {
            return Err(FsError::InvalidArgument);
        }
        let inum = self.volume.inode_of_path(path)?;
        self.volume.truncate_to_zero(inum)?;
        self.volume.inodes[inum as usize].mtime = crate::file_io::now();
        self.volume.mark_inode(inum);
        self.volume.flush_metadata()
    }

    /// Resolves `path` and verifies it names a regular file; `fi`-style
    /// file-handle bookkeeping is an out-of-scope host concern (spec §1).
    pub fn open(&mut self, path: &str) -> FsResult<u32> {
        let inum = self.volume.inode_of_path(path)?;
        if is_dir_mode(self.volume.inodes[inum as usize].mode) {
            return Err(FsError::IsADirectory);
        }
        Ok(inum)
    }

    pub fn read(&mut self, path: &str, buf: &mut [u8], len: usize, off: u64) -> FsResult<usize> {
        let inum = self.volume.inode_of_path(path)?;
        self.volume.read_file(inum, buf, len, off)
    }

    pub fn write(&mut self, path: &str, buf: &[u8], len: usize, off: u64) -> FsResult<usize> {
        let inum = self.volume.inode_of_path(path)?;
        self.volume.write_file(inum, buf, len, off)
    }

    pub fn statfs(&mut self, path: &str) -> FsResult<StatFs> {
        let _ = self.volume.inode_of_path(path)?;
        let sb = self.volume.superblock;
        let free_inodes = popcount_free(&self.volume.inode_bitmap, sb.num_inodes(), 1);
        let free_blocks = popcount_free(&self.volume.block_bitmap, sb.num_blocks, sb.data_start());
        Ok(StatFs {
            num_blocks: sb.num_blocks,
            free_blocks,
            num_inodes: sb.num_inodes(),
            free_inodes,
        })
    }
}

/// Collapses a `FsResult<()>` into the negative-errno convention of the
/// upcall surface (spec §6/§7): 0 on success, negative errno on failure.
pub fn status_code(r: FsResult<()>) -> i64 {
    match r {
        Ok(()) => 0,
        Err(e) => {
            error!("operation failed: {e}");
            e.errno() as i64
        }
    }
}

/// Collapses a `FsResult<usize>` (read/write byte count) into the same
/// convention: non-negative byte count, or negative errno.
pub fn count_code(r: FsResult<usize>) -> i64 {
    match r {
        Ok(n) => n as i64,
        Err(e) => {
            error!("operation failed: {e}");
            e.errno() as i64
        }
    }
}
