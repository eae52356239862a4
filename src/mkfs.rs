//! Image builder (spec §2 "Image tools", §6 CLI, §11 supplemented from
//! `mktest.c`): formats a fresh volume and, for the `mkfs` binary's default
//! invocation, populates it with a deterministic set of files and
//! directories at well-known inumbers suitable as test input.
//!
//! The on-disk format switch described in spec §9 (FS_VERSION) is modeled
//! as `FormatVersion`; this crate targets `FormatVersion::V1` as its
//! canonical, always-on behavior (SPEC_FULL §10.4).

use log::info;
use zerocopy::AsBytes;

use crate::blockdev::BlockDevice;
use crate::error::FsResult;
use crate::layout::{Superblock, BLOCK_SIZE, BITS_PER_BLOCK, INODES_PER_BLOCK, MAGIC, ROOT_INODE};
use crate::ops::{Operations, UpcallContext};
use crate::volume::Volume;

/// Default image size used by `mkfs` with no sizing arguments, matching
/// the reference `mktest.c` test image.
pub const DEFAULT_NUM_BLOCKS: u32 = 1024;

/// Default inode count, matching `mktest.c`.
pub const DEFAULT_NUM_INODES: u32 = 64;

/// On-disk format variant (spec §3 "Link semantics", §9). The wire bytes
/// are identical across variants; only whether directories carry `.`/`..`
/// entries differs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FormatVersion {
    /// No `.`/`..` entries; hard links only implicitly via rename.
    V0,
    /// Every directory carries explicit `.`/`..` entries that contribute to
    /// `nlink`; regular files may be hard-linked by multiple directory
    /// entries. This crate's canonical, always-on behavior.
    V1,
}

/// The variant this crate always builds and assumes on mount (spec §9:
/// implementers must pick one format and document it).
pub const CANONICAL_VERSION: FormatVersion = FormatVersion::V1;

fn div_ceil(n: u32, d: u32) -> u32 {
    (n + d - 1) / d
}

/// Writes a fresh super-block and zeroes the bitmap/inode-table region of
/// `device`, then mounts and returns the resulting (empty, root-only)
/// volume. `num_blocks` and `num_inodes` determine the on-disk layout per
/// spec §3/§6.
pub fn format<D: BlockDevice>(mut device: D, num_blocks: u32, num_inodes: u32) -> FsResult<Volume<D>> {
    let inode_map_sz = div_ceil(num_inodes, BITS_PER_BLOCK);
    let block_map_sz = div_ceil(num_blocks, BITS_PER_BLOCK);
    let inode_region_sz = div_ceil(num_inodes, INODES_PER_BLOCK as u32);

    let sb = Superblock {
        magic: MAGIC,
        inode_map_sz,
        inode_region_sz,
        block_map_sz,
        num_blocks,
        root_inode: ROOT_INODE,
    };

    let mut sb_buf = [0u8; BLOCK_SIZE];
    sb_buf[..core::mem::size_of::<Superblock>()].copy_from_slice(sb.as_bytes());
    device.write(0, &sb_buf)?;

    let zero = [0u8; BLOCK_SIZE];
    let data_start = sb.data_start();
    for b in 1..data_start {
        device.write(b, &zero)?;
    }

    info!(
        "format: {num_blocks} blocks, {num_inodes} inodes, data starts at block {data_start}"
    );

    let mut vol = Volume::mount(device)?;
    vol.mark_reserved_regions();

    // Root directory (inode 1, guaranteed by get_free_inode's lowest-index
    // policy since inode 0 is already marked reserved).
    let root = vol.get_free_inode()?;
    debug_assert_eq!(root, ROOT_INODE);
    vol.inodes[root as usize].mode = crate::layout::S_IFDIR | 0o755;
    let t = crate::file_io::now();
    vol.inodes[root as usize].ctime = t;
    vol.inodes[root as usize].mtime = t;
    vol.mark_inode(root);

    // The root is its own parent; `.` and `..` both point back at it.
    vol.populate_dot_entries(root, root)?;

    vol.flush_metadata()?;
    Ok(vol)
}

/// Builds the reference `mktest.c`-equivalent test tree on a freshly
/// formatted `DEFAULT_NUM_BLOCKS`/`DEFAULT_NUM_INODES` volume:
///
/// - `/file.A` — 1000 bytes of `'A'`.
/// - `/file_link.A` — a hard link to `/file.A` (nlink becomes 2).
/// - `/file.7` — 6.5 KB of `'4'`, just past the direct-block range so it
///   exercises `indir_1` allocation.
/// - `/dir1/` — subdirectory.
/// - `/dir1/file.2` — 2012 bytes of `'2'`, spans two direct blocks.
/// - `/dir1/file.0` — a zero-length file.
/// - `/dir1/file.270` — 269 KB + 721 bytes of `'K'`, past
///   `(6+256)*1024` bytes so it exercises both `indir_1` and `indir_2`.
pub fn build_default_image<D: BlockDevice>(device: D) -> FsResult<Volume<D>> {
    let vol = format(device, DEFAULT_NUM_BLOCKS, DEFAULT_NUM_INODES)?;
    let mut ops = Operations::new(vol);
    let ctx = UpcallContext { uid: 1000, gid: 1000 };

    ops.mknod("/file.A", 0o777, ctx)?;
    ops.write("/file.A", &[b'A'; 1000], 1000, 0)?;
    ops.link("/file.A", "/file_link.A")?;

    let f7_len = 6 * 1024 + 500;
    ops.mknod("/file.7", 0o777, ctx)?;
    ops.write("/file.7", &vec![b'4'; f7_len], f7_len, 0)?;

    ops.mkdir("/dir1", 0o755, ctx)?;

    ops.mknod("/dir1/file.2", 0o777, ctx)?;
    ops.write("/dir1/file.2", &[b'2'; 2012], 2012, 0)?;

    ops.mknod("/dir1/file.0", 0o777, ctx)?;

    let f270_len = 269 * 1024 + 721;
    ops.mknod("/dir1/file.270", 0o777, ctx)?;
    ops.write("/dir1/file.270", &vec![b'K'; f270_len], f270_len, 0)?;

    info!("build_default_image: test tree complete");
    ops.volume.flush_metadata()?;
    Ok(ops.volume)
}
