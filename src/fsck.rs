//! Image consistency checker (spec §2 "Image tools", §6 CLI, §11
//! supplemented from `read-img.c`): a human-readable structural walk that
//! reuses the same bitmap/block-map primitives the core's allocators and
//! block-mapper use, rather than re-deriving them.
//!
//! Reports, in order: the super-block, the allocated inode set, the
//! allocated block set, each inode's block list, a directory tree walked
//! from the root, any structural `***ERROR***` lines (spec §7
//! "surfaces structural inconsistencies as printed lines without changing
//! its exit code"), and finally the `unreachable inodes:` /
//! `unreachable blocks:` lines spec §6 requires.

use std::collections::BTreeSet;

use crate::alloc::bit_is_set;
use crate::blockdev::BlockDevice;
use crate::blockmap::read_ptr_block;
use crate::error::FsResult;
use crate::layout::{Superblock, DIRENT_SIZE};
use crate::volume::Volume;

/// The physical block list reachable from one inode's block-map (direct
/// leaves, indirect index blocks and their leaves, double-indirect index
/// blocks and their leaves), in on-disk pointer order.
pub struct InodeBlocks {
    pub inum: u32,
    pub blocks: Vec<u32>,
}

/// Full structural report produced by one pass over a mounted volume.
pub struct Report {
    pub superblock: Superblock,
    pub allocated_inodes: Vec<u32>,
    pub allocated_blocks: Vec<u32>,
    pub inode_blocks: Vec<InodeBlocks>,
    pub tree_lines: Vec<String>,
    pub errors: Vec<String>,
    /// Inodes set in the inode bitmap but not reached by walking the
    /// directory tree from the root (excludes inode 0, the permanently
    /// allocated sentinel spec §3 says is never referenced).
    pub unreachable_inodes: Vec<u32>,
    /// Data-region blocks set in the block bitmap but not reachable from
    /// any visited inode's block-map. Excludes the reserved region
    /// (super-block, bitmaps, inode table), which is always allocated but
    /// never pointed to by an inode (spec invariant 2's exception).
    pub unreachable_blocks: Vec<u32>,
}

pub(crate) fn collect_inode_blocks<D: BlockDevice>(vol: &mut Volume<D>, inum: u32) -> FsResult<Vec<u32>> {
    let mut out = Vec::new();
    let ino = vol.inodes[inum as usize];
    for &d in &ino.direct {
        if d != 0 {
            out.push(d);
        }
    }
    if ino.indir_1 != 0 {
        out.push(ino.indir_1);
        out.extend(read_ptr_block(vol, ino.indir_1)?.into_iter().filter(|&p| p != 0));
    }
    if ino.indir_2 != 0 {
        out.push(ino.indir_2);
        for outer in read_ptr_block(vol, ino.indir_2)?.into_iter().filter(|&p| p != 0) {
            out.push(outer);
            out.extend(read_ptr_block(vol, outer)?.into_iter().filter(|&p| p != 0));
        }
    }
    Ok(out)
}

#[allow(clippy::too_many_arguments)]
fn visit<D: BlockDevice>(
    vol: &mut Volume<D>,
    inum: u32,
    depth: usize,
    name: &str,
    visited: &mut BTreeSet<u32>,
    reachable_blocks: &mut BTreeSet<u32>,
    tree: &mut Vec<String>,
    errors: &mut Vec<String>,
) -> FsResult<()> {
    tree.push(format!("{}{name} (inode {inum})", "  ".repeat(depth)));
    if !visited.insert(inum) {
        return Ok(());
    }

    for b in collect_inode_blocks(vol, inum)? {
        if !bit_is_set(&vol.block_bitmap, b) {
            errors.push(format!(
                "***ERROR*** block {b} reachable from inode {inum} but not marked allocated in the block bitmap"
            ));
        }
        reachable_blocks.insert(b);
    }

    if vol.inodes[inum as usize].is_dir() {
        for (entry_name, child) in vol.readdir_entries(inum, false)? {
            let child_name = String::from_utf8_lossy(&entry_name).into_owned();
            if child_name == "." || child_name == ".." {
                continue;
            }
            visit(vol, child, depth + 1, &child_name, visited, reachable_blocks, tree, errors)?;
        }
    }
    Ok(())
}

impl Report {
    /// Runs a full structural pass over `vol`.
    pub fn build<D: BlockDevice>(vol: &mut Volume<D>) -> FsResult<Report> {
        let sb = vol.superblock;

        let allocated_inodes: Vec<u32> = (0..sb.num_inodes())
            .filter(|&i| bit_is_set(&vol.inode_bitmap, i))
            .collect();
        let allocated_blocks: Vec<u32> = (0..sb.num_blocks)
            .filter(|&b| bit_is_set(&vol.block_bitmap, b))
            .collect();

        let mut inode_blocks = Vec::new();
        let mut errors = Vec::new();
        for &i in &allocated_inodes {
            if i == 0 {
                continue;
            }
            let blocks = collect_inode_blocks(vol, i)?;
            inode_blocks.push(InodeBlocks { inum: i, blocks });

            // Invariant 4 (spec.md §3): for every directory D, sum of 32
            // over valid entries in its data blocks equals D.size.
            if vol.inodes[i as usize].is_dir() {
                let expected = vol.dir_entry_count(i)? * DIRENT_SIZE as u32;
                let actual = vol.inodes[i as usize].size;
                if expected != actual {
                    errors.push(format!(
                        "***ERROR*** directory inode {i}: size {actual} does not match valid entry count * {DIRENT_SIZE} ({expected})"
                    ));
                }
            }
        }

        let mut visited = BTreeSet::new();
        let mut reachable_blocks = BTreeSet::new();
        let mut tree_lines = Vec::new();
        visit(
            vol,
            sb.root_inode,
            0,
            "/",
            &mut visited,
            &mut reachable_blocks,
            &mut tree_lines,
            &mut errors,
        )?;

        let unreachable_inodes: Vec<u32> = allocated_inodes
            .iter()
            .copied()
            .filter(|&i| i != 0 && !visited.contains(&i))
            .collect();

        let data_start = sb.data_start();
        let unreachable_blocks: Vec<u32> = allocated_blocks
            .iter()
            .copied()
            .filter(|&b| b >= data_start && !reachable_blocks.contains(&b))
            .collect();

        Ok(Report {
            superblock: sb,
            allocated_inodes,
            allocated_blocks,
            inode_blocks,
            tree_lines,
            errors,
            unreachable_inodes,
            unreachable_blocks,
        })
    }

    /// Prints the human-readable summary spec §6 describes, ending with
    /// the `unreachable inodes:` / `unreachable blocks:` lines.
    pub fn print(&self) {
        let sb = &self.superblock;
        println!(
            "super-block: magic={:#x} num_blocks={} inode_map_sz={} block_map_sz={} inode_region_sz={} root_inode={}",
            sb.magic, sb.num_blocks, sb.inode_map_sz, sb.block_map_sz, sb.inode_region_sz, sb.root_inode
        );
        println!("allocated inodes ({}): {:?}", self.allocated_inodes.len(), self.allocated_inodes);
        println!("allocated blocks ({}): {:?}", self.allocated_blocks.len(), self.allocated_blocks);
        for ib in &self.inode_blocks {
            println!("  inode {}: blocks {:?}", ib.inum, ib.blocks);
        }
        println!("directory tree:");
        for line in &self.tree_lines {
            println!("  {line}");
        }
        for err in &self.errors {
            println!("{err}");
        }
        println!("unreachable inodes: {:?}", self.unreachable_inodes);
        println!("unreachable blocks: {:?}", self.unreachable_blocks);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockdev::MemBlockDevice;
    use crate::mkfs::{build_default_image, DEFAULT_NUM_BLOCKS};

    fn mounted_default() -> Volume<MemBlockDevice> {
        let device = MemBlockDevice::new(DEFAULT_NUM_BLOCKS);
        build_default_image(device).unwrap()
    }

    #[test]
    fn default_image_has_no_unreachable_inodes_or_blocks() {
        let mut vol = mounted_default();
        let report = Report::build(&mut vol).unwrap();
        assert!(report.unreachable_inodes.is_empty());
        assert!(report.unreachable_blocks.is_empty());
        assert!(report.errors.is_empty());
    }

    #[test]
    fn allocated_inode_zero_is_excluded_from_tree_but_counted_allocated() {
        let mut vol = mounted_default();
        let report = Report::build(&mut vol).unwrap();
        assert!(report.allocated_inodes.contains(&0));
        assert!(!report.unreachable_inodes.contains(&0));
    }

    #[test]
    fn detaching_a_directory_entry_without_freeing_makes_its_inode_unreachable() {
        let mut vol = mounted_default();
        // Simulate a corrupted image: allocate an inode but never link it
        // into any directory.
        let orphan = vol.get_free_inode().unwrap();
        vol.inodes[orphan as usize].mode = crate::layout::S_IFREG | 0o644;
        vol.mark_inode(orphan);
        vol.flush_metadata().unwrap();

        let report = Report::build(&mut vol).unwrap();
        assert!(report.unreachable_inodes.contains(&orphan));
    }

    #[test]
    fn mismatched_directory_size_is_reported_as_an_error() {
        let mut vol = mounted_default();
        let root = vol.superblock.root_inode;
        // Corrupt the root's recorded size without touching its entries.
        vol.inodes[root as usize].size += crate::layout::DIRENT_SIZE as u32;
        vol.mark_inode(root);
        vol.flush_metadata().unwrap();

        let report = Report::build(&mut vol).unwrap();
        assert!(report
            .errors
            .iter()
            .any(|e| e.contains(&format!("directory inode {root}"))));
    }
}
