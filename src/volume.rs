//! Volume state: the process-wide cached super-block, bitmaps and inode
//! table, plus the dirty-set write-back discipline (spec §4.2).

use std::collections::BTreeSet;

use log::{debug, info};

use crate::blockdev::BlockDevice;
use crate::error::{FsError, FsResult};
use crate::layout::{Dinode, Superblock, BLOCK_SIZE, INODES_PER_BLOCK, INODE_SIZE, MAGIC};

/// A mounted volume: one cached copy of the metadata plus the device handle
/// backing it. Single-threaded cooperative per spec §5 — there is
/// intentionally no internal locking.
pub struct Volume<D: BlockDevice> {
    pub(crate) device: D,
    pub superblock: Superblock,
    pub inode_bitmap: Vec<u8>,
    pub block_bitmap: Vec<u8>,
    pub inodes: Vec<Dinode>,
    /// Dirty inode-table block indices (relative to `inode_table_start`).
    dirty_inode_blocks: BTreeSet<u32>,
    /// Dirty bitmap block numbers, absolute (covers both bitmaps).
    dirty_bitmap_blocks: BTreeSet<u32>,
}

impl<D: BlockDevice> Volume<D> {
    /// Mounts `device`: loads the super-block, both bitmaps and the full
    /// inode table into memory.
    pub fn mount(mut device: D) -> FsResult<Self> {
        let mut sb_buf = [0u8; BLOCK_SIZE];
        device.read(0, &mut sb_buf)?;
        let superblock: Superblock = zerocopy::LayoutVerified::<_, Superblock>::new_unaligned(
            &sb_buf[..core::mem::size_of::<Superblock>()],
        )
        .map(|lv| *lv.into_ref())
        .ok_or(FsError::Io("corrupt super-block".into()))?;

        if superblock.magic != MAGIC {
            return Err(FsError::Io(format!(
                "bad magic: expected {:#x}, found {:#x}",
                MAGIC, superblock.magic
            )));
        }

        let mut inode_bitmap = vec![0u8; superblock.inode_map_sz as usize * BLOCK_SIZE];
        device.read(superblock.inode_map_start(), &mut inode_bitmap)?;

        let mut block_bitmap = vec![0u8; superblock.block_map_sz as usize * BLOCK_SIZE];
        device.read(superblock.block_map_start(), &mut block_bitmap)?;

        let mut inode_table_raw = vec![0u8; superblock.inode_region_sz as usize * BLOCK_SIZE];
        device.read(superblock.inode_table_start(), &mut inode_table_raw)?;
        let inodes: Vec<Dinode> = inode_table_raw
            .chunks_exact(INODE_SIZE)
            .map(|chunk| {
                *zerocopy::LayoutVerified::<_, Dinode>::new_unaligned(chunk)
                    .expect("inode chunk is INODE_SIZE bytes")
                    .into_ref()
            })
            .collect();

        info!(
            "mounted volume: {} blocks, {} inodes",
            superblock.num_blocks,
            inodes.len()
        );

        Ok(Self {
            device,
            superblock,
            inode_bitmap,
            block_bitmap,
            inodes,
            dirty_inode_blocks: BTreeSet::new(),
            dirty_bitmap_blocks: BTreeSet::new(),
        })
    }

    /// Marks the inode-table block containing inode `i` dirty.
    pub fn mark_inode(&mut self, i: u32) {
        let block = i / INODES_PER_BLOCK as u32;
        debug!("mark_inode({i}) -> inode-table block {block} dirty");
        self.dirty_inode_blocks.insert(block);
    }

    fn mark_inode_bitmap_dirty(&mut self, bit: u32) {
        let block = self.superblock.inode_map_start() + bit / crate::layout::BITS_PER_BLOCK;
        self.dirty_bitmap_blocks.insert(block);
    }

    fn mark_block_bitmap_dirty(&mut self, bit: u32) {
        let block = self.superblock.block_map_start() + bit / crate::layout::BITS_PER_BLOCK;
        self.dirty_bitmap_blocks.insert(block);
    }

    pub(crate) fn touch_inode_bitmap(&mut self, bit: u32) {
        self.mark_inode_bitmap_dirty(bit);
    }

    pub(crate) fn touch_block_bitmap(&mut self, bit: u32) {
        self.mark_block_bitmap_dirty(bit);
    }

    /// Writes every dirty inode-table block and every dirty bitmap block to
    /// disk, then clears the dirty sets.
    pub fn flush_metadata(&mut self) -> FsResult<()> {
        for &block in &self.dirty_inode_blocks {
            let start = block as usize * INODES_PER_BLOCK;
            let mut buf = [0u8; BLOCK_SIZE];
            for (slot, inode) in self.inodes[start..start + INODES_PER_BLOCK]
                .iter()
                .enumerate()
            {
                buf[slot * INODE_SIZE..(slot + 1) * INODE_SIZE]
                    .copy_from_slice(zerocopy::AsBytes::as_bytes(inode));
            }
            self.device
                .write(self.superblock.inode_table_start() + block, &buf)?;
        }
        for &block in &self.dirty_bitmap_blocks {
            let buf = self.bitmap_block_bytes(block);
            self.device.write(block, &buf)?;
        }
        debug!(
            "flush_metadata: {} inode blocks, {} bitmap blocks",
            self.dirty_inode_blocks.len(),
            self.dirty_bitmap_blocks.len()
        );
        self.dirty_inode_blocks.clear();
        self.dirty_bitmap_blocks.clear();
        Ok(())
    }

    fn bitmap_block_bytes(&self, block: u32) -> [u8; BLOCK_SIZE] {
        let mut buf = [0u8; BLOCK_SIZE];
        let block_map_start = self.superblock.block_map_start();
        if block < block_map_start {
            let off = (block - self.superblock.inode_map_start()) as usize * BLOCK_SIZE;
            buf.copy_from_slice(&self.inode_bitmap[off..off + BLOCK_SIZE]);
        } else {
            let off = (block - block_map_start) as usize * BLOCK_SIZE;
            buf.copy_from_slice(&self.block_bitmap[off..off + BLOCK_SIZE]);
        }
        buf
    }

    /// Flushes metadata and releases the underlying device.
    pub fn unmount(mut self) -> FsResult<()> {
        self.flush_metadata()?;
        self.device.close()
    }

    /// Reads one data block into `buf`. `buf.len()` must be `BLOCK_SIZE`.
    pub fn read_block(&mut self, block: u32, buf: &mut [u8]) -> FsResult<()> {
        self.device.read(block, buf)
    }

    /// Writes one data block from `buf`. `buf.len()` must be `BLOCK_SIZE`.
    pub fn write_block(&mut self, block: u32, buf: &[u8]) -> FsResult<()> {
        self.device.write(block, buf)
    }

    /// Zero-fills block `block` on disk.
    pub fn zero_block(&mut self, block: u32) -> FsResult<()> {
        let buf = [0u8; BLOCK_SIZE];
        self.device.write(block, &buf)
    }
}
