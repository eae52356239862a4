//! Directory entries: in-block search, slot allocation, and the
//! mkentry/unlink/rmdir/rename/link primitives (spec §4.6).
//!
//! The reference implementation relies on a single direct block (block 0)
//! of entries for every directory mutation; the read path tolerates
//! multi-block directories populated off-line, so `readdir` walks every
//! allocated data block while mutation only ever touches block 0.

use log::debug;

use crate::blockdev::BlockDevice;
use crate::error::{FsError, FsResult};
use crate::file_io::now;
use crate::layout::{Dirent, FileType, BLOCK_SIZE, DIRENTS_PER_BLOCK, DIRENT_SIZE, MAX_NAME_LEN};
use crate::volume::Volume;

fn read_dirent_block<D: BlockDevice>(vol: &mut Volume<D>, block: u32) -> FsResult<[Dirent; DIRENTS_PER_BLOCK]> {
    let mut raw = [0u8; BLOCK_SIZE];
    vol.read_block(block, &mut raw)?;
    let mut out = [Dirent::empty(); DIRENTS_PER_BLOCK];
    for (i, chunk) in raw.chunks_exact(DIRENT_SIZE).enumerate() {
        out[i] = *zerocopy::LayoutVerified::<_, Dirent>::new_unaligned(chunk)
            .expect("chunk is DIRENT_SIZE bytes")
            .into_ref();
    }
    Ok(out)
}

fn write_dirent_block<D: BlockDevice>(
    vol: &mut Volume<D>,
    block: u32,
    entries: &[Dirent; DIRENTS_PER_BLOCK],
) -> FsResult<()> {
    let mut raw = [0u8; BLOCK_SIZE];
    for (i, e) in entries.iter().enumerate() {
        raw[i * DIRENT_SIZE..(i + 1) * DIRENT_SIZE].copy_from_slice(zerocopy::AsBytes::as_bytes(e));
    }
    vol.write_block(block, &raw)
}

/// Result of a successful in-directory lookup.
pub struct FoundEntry {
    pub block: u32,
    pub slot: usize,
    pub inode: u32,
}

impl<D: BlockDevice> Volume<D> {
    fn require_dir(&self, inum: u32) -> FsResult<()> {
        if !self.inodes[inum as usize].is_dir() {
            return Err(FsError::NotADirectory);
        }
        Ok(())
    }

    /// Searches `dir_inum`'s block 0 (allocating it if `alloc`) for `name`.
    pub fn dir_lookup(&mut self, dir_inum: u32, name: &[u8], alloc: bool) -> FsResult<FoundEntry> {
        self.require_dir(dir_inum)?;
        let block = self.block_of(dir_inum, 0, alloc)?;
        if block == 0 {
            return Err(FsError::NotFound);
        }
        let entries = read_dirent_block(self, block)?;
        for (slot, e) in entries.iter().enumerate() {
            if e.valid() && e.name() == name {
                return Ok(FoundEntry {
                    block,
                    slot,
                    inode: e.inode(),
                });
            }
        }
        Err(FsError::NotFound)
    }

    /// Returns the first free slot index in `dir_inum`'s block 0,
    /// allocating the block if needed.
    pub fn dir_alloc_slot(&mut self, dir_inum: u32) -> FsResult<(u32, usize)> {
        let block = self.block_of(dir_inum, 0, true)?;
        let entries = read_dirent_block(self, block)?;
        entries
            .iter()
            .position(|e| !e.valid())
            .map(|slot| (block, slot))
            .ok_or(FsError::NoSpace)
    }

    fn set_entry(&mut self, block: u32, slot: usize, inum: u32, name: &[u8]) -> FsResult<()> {
        let mut entries = read_dirent_block(self, block)?;
        let is_dir = self.inodes[inum as usize].is_dir();
        entries[slot].set(inum, is_dir, name);
        write_dirent_block(self, block, &entries)?;
        self.inodes[inum as usize].nlink += 1;
        self.mark_inode(inum);
        Ok(())
    }

    /// Allocates a fresh inode, initialized per spec §4.6 `init_new_inode`.
    /// `uid`/`gid` come from the upcall context (operation layer); this
    /// primitive only fills in what the core controls.
    pub fn init_new_inode(&mut self, mode: u32, ftype: FileType, uid: u16, gid: u16) -> FsResult<u32> {
        let inum = self.get_free_inode()?;
        let ino = &mut self.inodes[inum as usize];
        ino.mode = (mode & !crate::layout::S_IFMT) | ftype.bits();
        let t = now();
        ino.ctime = t;
        ino.mtime = t;
        ino.size = 0;
        ino.nlink = 0;
        ino.uid = uid;
        ino.gid = gid;
        self.mark_inode(inum);
        debug!("init_new_inode: inum={inum} mode={:o}", ino.mode);
        Ok(inum)
    }

    /// Counts valid entries in `dir_inum`'s block 0.
    pub fn dir_entry_count(&mut self, dir_inum: u32) -> FsResult<u32> {
        self.require_dir(dir_inum)?;
        let block = self.block_of(dir_inum, 0, false)?;
        if block == 0 {
            return Ok(0);
        }
        let entries = read_dirent_block(self, block)?;
        Ok(entries.iter().filter(|e| e.valid()).count() as u32)
    }

    /// True if `dir_inum` has no valid entries other than `.` and `..`.
    pub fn dir_is_empty(&mut self, dir_inum: u32) -> FsResult<bool> {
        self.require_dir(dir_inum)?;
        let block = self.block_of(dir_inum, 0, false)?;
        if block == 0 {
            return Ok(true);
        }
        let entries = read_dirent_block(self, block)?;
        Ok(entries
            .iter()
            .filter(|e| e.valid())
            .all(|e| e.name() == b"." || e.name() == b".."))
    }

    /// `mkentry` (spec §4.6): creates a new file/directory entry named
    /// `leaf` under `dir_inum`. Used by `mknod` and `mkdir`.
    pub fn mkentry(
        &mut self,
        dir_inum: u32,
        leaf: &[u8],
        mode: u32,
        ftype: FileType,
        uid: u16,
        gid: u16,
    ) -> FsResult<u32> {
        self.require_dir(dir_inum)?;
        if self.dir_lookup(dir_inum, leaf, false).is_ok() {
            return Err(FsError::AlreadyExists);
        }
        let (block, slot) = self.dir_alloc_slot(dir_inum)?;
        let inum = self.init_new_inode(mode, ftype, uid, gid)?;
        if let Err(e) = self.set_entry(block, slot, inum, leaf) {
            self.return_inode(inum);
            return Err(e);
        }
        self.inodes[dir_inum as usize].size += DIRENT_SIZE as u32;
        self.inodes[dir_inum as usize].mtime = now();
        self.mark_inode(dir_inum);

        if ftype == FileType::DIR {
            self.populate_dot_entries(inum, dir_inum)?;
        }

        self.flush_metadata()?;
        Ok(inum)
    }

    /// Writes `.` and `..` entries into a freshly created directory
    /// (format version 1, spec §3/§9). Also used by the image builder to
    /// bootstrap the root directory, which is its own parent.
    pub(crate) fn populate_dot_entries(&mut self, dir_inum: u32, parent_inum: u32) -> FsResult<()> {
        let (block, slot) = self.dir_alloc_slot(dir_inum)?;
        self.set_entry(block, slot, dir_inum, b".")?;
        let (block, slot) = self.dir_alloc_slot(dir_inum)?;
        self.set_entry(block, slot, parent_inum, b"..")?;
        self.inodes[dir_inum as usize].size += 2 * DIRENT_SIZE as u32;
        self.mark_inode(dir_inum);
        Ok(())
    }

    /// `unlink` (spec §4.6): removes a non-directory entry.
    pub fn unlink_entry(&mut self, dir_inum: u32, leaf: &[u8]) -> FsResult<()> {
        self.require_dir(dir_inum)?;
        let found = self.dir_lookup(dir_inum, leaf, false)?;
        if self.inodes[found.inode as usize].is_dir() {
            return Err(FsError::IsADirectory);
        }
        self.clear_entry(found.block, found.slot)?;

        let target = found.inode;
        self.inodes[target as usize].nlink = self.inodes[target as usize].nlink.saturating_sub(1);
        self.mark_inode(target);
        if self.inodes[target as usize].nlink == 0 {
            self.truncate_to_zero(target)?;
            self.return_inode(target);
        }

        self.inodes[dir_inum as usize].size = self.inodes[dir_inum as usize]
            .size
            .saturating_sub(DIRENT_SIZE as u32);
        self.mark_inode(dir_inum);
        self.flush_metadata()?;
        Ok(())
    }

    /// `rmdir` (spec §4.6): removes an empty directory entry.
    pub fn rmdir_entry(&mut self, dir_inum: u32, leaf: &[u8]) -> FsResult<()> {
        self.require_dir(dir_inum)?;
        if leaf == b"." || leaf == b".." {
            return Err(FsError::InvalidArgument);
        }
        let found = self.dir_lookup(dir_inum, leaf, false)?;
        if !self.inodes[found.inode as usize].is_dir() {
            return Err(FsError::NotADirectory);
        }
        if !self.dir_is_empty(found.inode)? {
            return Err(FsError::NotEmpty);
        }
        self.clear_entry(found.block, found.slot)?;

        self.truncate_to_zero(found.inode)?;
        self.inodes[found.inode as usize].nlink = 0;
        self.mark_inode(found.inode);
        self.return_inode(found.inode);

        self.inodes[dir_inum as usize].size = self.inodes[dir_inum as usize]
            .size
            .saturating_sub(DIRENT_SIZE as u32);
        self.mark_inode(dir_inum);
        self.flush_metadata()?;
        Ok(())
    }

    fn clear_entry(&mut self, block: u32, slot: usize) -> FsResult<()> {
        let mut entries = read_dirent_block(self, block)?;
        entries[slot].clear();
        write_dirent_block(self, block, &entries)
    }

    /// `rename` (spec §4.6): same-directory rename only.
    pub fn rename_entry(
        &mut self,
        srcdir: u32,
        src_leaf: &[u8],
        dstdir: u32,
        dst_leaf: &[u8],
    ) -> FsResult<()> {
        if srcdir != dstdir || srcdir == 0 {
            return Err(FsError::InvalidArgument);
        }
        let found = self.dir_lookup(srcdir, src_leaf, false)?;
        if self.dir_lookup(dstdir, dst_leaf, false).is_ok() {
            return Err(FsError::AlreadyExists);
        }
        let mut entries = read_dirent_block(self, found.block)?;
        entries[found.slot].set_name(dst_leaf);
        write_dirent_block(self, found.block, &entries)?;

        self.inodes[srcdir as usize].mtime = now();
        self.mark_inode(srcdir);
        self.flush_metadata()?;
        Ok(())
    }

    /// `link` (spec §4.6): adds another name for an existing non-directory
    /// inode. `set_entry` already bumps `nlink`; this does not double-count.
    pub fn link_entry(&mut self, src_inum: u32, dir_inum: u32, leaf: &[u8]) -> FsResult<()> {
        if self.inodes[src_inum as usize].is_dir() {
            return Err(FsError::IsADirectory);
        }
        if leaf.is_empty() || leaf.len() > MAX_NAME_LEN {
            return Err(FsError::PermissionDenied);
        }
        self.require_dir(dir_inum)?;
        if self.dir_lookup(dir_inum, leaf, false).is_ok() {
            return Err(FsError::AlreadyExists);
        }
        let (block, slot) = self.dir_alloc_slot(dir_inum)?;
        self.set_entry(block, slot, src_inum, leaf)?;
        self.inodes[dir_inum as usize].size += DIRENT_SIZE as u32;
        self.mark_inode(dir_inum);
        self.flush_metadata()?;
        Ok(())
    }

    /// Iterates valid entries of `dir_inum`'s block 0, yielding `(name,
    /// inode)`. Skips `.` and `..` only if `skip_dots` is set.
    pub fn readdir_entries(&mut self, dir_inum: u32, skip_dots: bool) -> FsResult<Vec<(Vec<u8>, u32)>> {
        self.require_dir(dir_inum)?;
        let block = self.block_of(dir_inum, 0, false)?;
        if block == 0 {
            return Ok(Vec::new());
        }
        let entries = read_dirent_block(self, block)?;
        Ok(entries
            .iter()
            .filter(|e| e.valid())
            .filter(|e| !(skip_dots && (e.name() == b"." || e.name() == b"..")))
            .map(|e| (e.name().to_vec(), e.inode()))
            .collect())
    }
}
