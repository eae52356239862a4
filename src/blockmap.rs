//! Inode block-map: logical block index -> physical block, with on-demand
//! allocation of direct / indir_1 / indir_2 pages, and truncation to 0
//! (spec §4.4).

use log::{trace, warn};

use crate::blockdev::BlockDevice;
use crate::error::{FsError, FsResult};
use crate::layout::{BLOCK_SIZE, N_DIRECT, PTRS_PER_BLOCK};
use crate::volume::Volume;

pub(crate) fn read_ptr_block<D: BlockDevice>(vol: &mut Volume<D>, block: u32) -> FsResult<Vec<u32>> {
    let mut buf = [0u8; BLOCK_SIZE];
    vol.read_block(block, &mut buf)?;
    Ok(buf
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

fn write_ptr_block<D: BlockDevice>(vol: &mut Volume<D>, block: u32, ptrs: &[u32]) -> FsResult<()> {
    let mut buf = [0u8; BLOCK_SIZE];
    for (i, p) in ptrs.iter().enumerate() {
        buf[i * 4..i * 4 + 4].copy_from_slice(&p.to_le_bytes());
    }
    vol.write_block(block, &buf)
}

/// Which pointer level addresses logical block `n`.
enum Level {
    Direct(usize),
    Indir1(usize),
    Indir2 { outer: usize, inner: usize },
    OutOfRange,
}

fn classify(n: u64) -> Level {
    let p = PTRS_PER_BLOCK as u64;
    if n < N_DIRECT as u64 {
        Level::Direct(n as usize)
    } else if n - N_DIRECT as u64 < p {
        Level::Indir1((n - N_DIRECT as u64) as usize)
    } else if n - N_DIRECT as u64 - p < p * p {
        let rel = n - N_DIRECT as u64 - p;
        Level::Indir2 {
            outer: (rel / p) as usize,
            inner: (rel % p) as usize,
        }
    } else {
        Level::OutOfRange
    }
}

impl<D: BlockDevice> Volume<D> {
    /// Maps (inode, logical block index) -> physical block number,
    /// allocating intermediate pages on demand when `alloc` is set. Returns
    /// 0 if the slot is unpopulated and `alloc` is false.
    pub fn block_of(&mut self, inum: u32, n: u64, alloc: bool) -> FsResult<u32> {
        match classify(n) {
            Level::OutOfRange => Ok(0),
            Level::Direct(i) => {
                let ptr = self.inodes[inum as usize].direct[i];
                if ptr != 0 || !alloc {
                    return Ok(ptr);
                }
                let fresh = self.get_free_block()?;
                self.zero_block(fresh)?;
                self.inodes[inum as usize].direct[i] = fresh;
                self.mark_inode(inum);
                trace!("block_of({inum}, {n}): allocated direct[{i}] = {fresh}");
                Ok(fresh)
            }
            Level::Indir1(i) => {
                let indir_1 = self.ensure_indirect(inum, /*is_indir2=*/ false, alloc)?;
                if indir_1 == 0 {
                    return Ok(0);
                }
                self.slot_in_index_block(indir_1, i, alloc)
            }
            Level::Indir2 { outer, inner } => {
                let indir_2 = self.ensure_indirect(inum, /*is_indir2=*/ true, alloc)?;
                if indir_2 == 0 {
                    return Ok(0);
                }
                let inner_block = self.slot_in_index_block(indir_2, outer, alloc)?;
                if inner_block == 0 {
                    return Ok(0);
                }
                self.slot_in_index_block(inner_block, inner, alloc)
            }
        }
    }

    /// Ensures the inode's `indir_1` (or `indir_2`) pointer is populated,
    /// allocating and zero-filling it on demand.
    fn ensure_indirect(&mut self, inum: u32, is_indir2: bool, alloc: bool) -> FsResult<u32> {
        let existing = if is_indir2 {
            self.inodes[inum as usize].indir_2
        } else {
            self.inodes[inum as usize].indir_1
        };
        if existing != 0 || !alloc {
            return Ok(existing);
        }
        let fresh = self.get_free_block()?;
        self.zero_block(fresh)?;
        if is_indir2 {
            self.inodes[inum as usize].indir_2 = fresh;
        } else {
            self.inodes[inum as usize].indir_1 = fresh;
        }
        self.mark_inode(inum);
        Ok(fresh)
    }

    /// Reads pointer slot `idx` out of the index block at `block`,
    /// allocating and writing back a fresh pointer on demand.
    fn slot_in_index_block(&mut self, block: u32, idx: usize, alloc: bool) -> FsResult<u32> {
        let mut ptrs = read_ptr_block(self, block)?;
        let ptr = ptrs[idx];
        if ptr != 0 || !alloc {
            return Ok(ptr);
        }
        let fresh = self.get_free_block()?;
        self.zero_block(fresh)?;
        ptrs[idx] = fresh;
        write_ptr_block(self, block, &ptrs)?;
        Ok(fresh)
    }

    /// Reads logical block `n` of inode `inum` into `buf` (`BLOCK_SIZE`
    /// bytes), allocating on demand if `alloc`. A missing block with
    /// `alloc = false` is an I/O error (the format has no holes), mirroring
    /// the read-path contract of spec §4.5.
    pub fn get_file_blk(&mut self, inum: u32, n: u64, buf: &mut [u8], alloc: bool) -> FsResult<u32> {
        let block = self.block_of(inum, n, alloc)?;
        if block == 0 {
            if alloc {
                return Err(FsError::NoSpace);
            }
            warn!("get_file_blk({inum}, {n}): missing block, no holes allowed");
            buf.fill(0);
            return Err(FsError::Io("missing data block".into()));
        }
        self.read_block(block, buf)?;
        Ok(block)
    }

    /// Frees every block reachable from the inode's block-map, clears all
    /// pointer fields, and sets `size` to 0. `mtime` is left to the caller
    /// (file_io updates it). Does not free the inode itself.
    pub fn truncate_to_zero(&mut self, inum: u32) -> FsResult<()> {
        let indir_2 = self.inodes[inum as usize].indir_2;
        if indir_2 != 0 {
            let outer_ptrs = read_ptr_block(self, indir_2)?;
            for &inner_block in &outer_ptrs {
                if inner_block == 0 {
                    continue;
                }
                let inner_ptrs = read_ptr_block(self, inner_block)?;
                for &leaf in &inner_ptrs {
                    if leaf != 0 {
                        self.return_block(leaf);
                    }
                }
                self.return_block(inner_block);
            }
            self.return_block(indir_2);
        }

        let indir_1 = self.inodes[inum as usize].indir_1;
        if indir_1 != 0 {
            let ptrs = read_ptr_block(self, indir_1)?;
            for &leaf in &ptrs {
                if leaf != 0 {
                    self.return_block(leaf);
                }
            }
            self.return_block(indir_1);
        }

        for i in 0..N_DIRECT {
            let d = self.inodes[inum as usize].direct[i];
            if d != 0 {
                self.return_block(d);
                self.inodes[inum as usize].direct[i] = 0;
            }
        }
        self.inodes[inum as usize].indir_1 = 0;
        self.inodes[inum as usize].indir_2 = 0;
        self.inodes[inum as usize].size = 0;
        self.mark_inode(inum);
        Ok(())
    }
}
