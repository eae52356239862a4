//! On-disk layout: super-block, inode, directory entry.
//!
//! Disk layout:
//! [ super-block | inode bitmap | block bitmap | inode table | data blocks ]
//!
//! All integers are little-endian. Block size is fixed at 1024 bytes.

use static_assertions::const_assert_eq;
use zerocopy::{AsBytes, FromBytes};

/// Size in bytes of one block.
pub const BLOCK_SIZE: usize = 1024;

/// Magic number identifying a formatted volume.
pub const MAGIC: u32 = 0x3736_3030;

/// Always the inumber of the root directory.
pub const ROOT_INODE: u32 = 1;

/// Inode 0 is a permanently allocated sentinel; never addressable.
pub const RESERVED_INODE: u32 = 0;

/// Number of direct block pointers per inode.
pub const N_DIRECT: usize = 6;

/// Pointers per indirect block (1024 / 4).
pub const PTRS_PER_BLOCK: usize = BLOCK_SIZE / 4;

/// Inodes per block (1024 / 64).
pub const INODES_PER_BLOCK: usize = BLOCK_SIZE / INODE_SIZE;

/// Directory entries per block (1024 / 32).
pub const DIRENTS_PER_BLOCK: usize = BLOCK_SIZE / DIRENT_SIZE;

/// Bits (inodes or blocks) represented by one bitmap block.
pub const BITS_PER_BLOCK: u32 = (BLOCK_SIZE * 8) as u32;

/// Largest logical block index addressable through direct + indir_1 + indir_2.
pub const MAX_LOGICAL_BLOCK: u64 =
    (N_DIRECT + PTRS_PER_BLOCK + PTRS_PER_BLOCK * PTRS_PER_BLOCK) as u64;

pub const S_IFMT: u32 = 0o170_000;
pub const S_IFDIR: u32 = 0o040_000;
pub const S_IFREG: u32 = 0o100_000;

bitflags::bitflags! {
    /// The `S_IFMT` portion of an inode's `mode`: which type of file it
    /// names. Kept distinct from the permission bits, which callers OR in
    /// separately (spec §4.6 `init_new_inode`: `(mode & !S_IFMT) | ftype`).
    pub struct FileType: u32 {
        const REG = S_IFREG;
        const DIR = S_IFDIR;
    }
}

pub fn is_dir_mode(mode: u32) -> bool {
    mode & S_IFMT == S_IFDIR
}

pub fn is_reg_mode(mode: u32) -> bool {
    mode & S_IFMT == S_IFREG
}

/// Super-block, occupies block 0 in its entirety.
#[repr(C)]
#[derive(Clone, Copy, AsBytes, FromBytes)]
pub struct Superblock {
    pub magic: u32,
    pub inode_map_sz: u32,
    pub inode_region_sz: u32,
    pub block_map_sz: u32,
    pub num_blocks: u32,
    pub root_inode: u32,
}

const_assert_eq!(core::mem::size_of::<Superblock>(), 24);

impl Superblock {
    /// First block of the inode bitmap.
    pub const fn inode_map_start(&self) -> u32 {
        1
    }

    /// First block of the block bitmap.
    pub fn block_map_start(&self) -> u32 {
        self.inode_map_start() + self.inode_map_sz
    }

    /// First block of the inode table.
    pub fn inode_table_start(&self) -> u32 {
        self.block_map_start() + self.block_map_sz
    }

    /// First block available for file data.
    pub fn data_start(&self) -> u32 {
        self.inode_table_start() + self.inode_region_sz
    }

    /// Total number of inodes representable by the inode region.
    pub fn num_inodes(&self) -> u32 {
        self.inode_region_sz * INODES_PER_BLOCK as u32
    }
}

/// Size in bytes of one on-disk inode record.
pub const INODE_SIZE: usize = 64;

/// Fixed-size on-disk inode record, 16 per block.
#[repr(C)]
#[derive(Clone, Copy, AsBytes, FromBytes)]
pub struct Dinode {
    pub uid: u16,
    pub gid: u16,
    pub mode: u32,
    pub ctime: u32,
    pub mtime: u32,
    pub size: u32,
    pub nlink: u32,
    pub direct: [u32; N_DIRECT],
    pub indir_1: u32,
    pub indir_2: u32,
    _pad: [u32; 2],
}

const_assert_eq!(core::mem::size_of::<Dinode>(), INODE_SIZE);

impl Dinode {
    pub fn zeroed() -> Self {
        Self {
            uid: 0,
            gid: 0,
            mode: 0,
            ctime: 0,
            mtime: 0,
            size: 0,
            nlink: 0,
            direct: [0; N_DIRECT],
            indir_1: 0,
            indir_2: 0,
            _pad: [0; 2],
        }
    }

    pub fn is_allocated(&self) -> bool {
        self.mode & S_IFMT != 0
    }

    pub fn is_dir(&self) -> bool {
        is_dir_mode(self.mode)
    }
}

/// Size in bytes of one directory entry.
pub const DIRENT_SIZE: usize = 32;

/// Longest name storable in a directory entry, not counting the NUL.
pub const MAX_NAME_LEN: usize = 27;

const VALID_BIT: u32 = 1 << 31;
const ISDIR_BIT: u32 = 1 << 30;
const INODE_MASK: u32 = (1 << 30) - 1;

/// One 32-byte directory entry: a packed (valid, isDir, inumber) word plus a
/// 28-byte NUL-terminated name.
#[repr(C)]
#[derive(Clone, Copy, AsBytes, FromBytes)]
pub struct Dirent {
    flags_inode: u32,
    name: [u8; 28],
}

const_assert_eq!(core::mem::size_of::<Dirent>(), DIRENT_SIZE);

impl Dirent {
    pub fn empty() -> Self {
        Self {
            flags_inode: 0,
            name: [0; 28],
        }
    }

    pub fn valid(&self) -> bool {
        self.flags_inode & VALID_BIT != 0
    }

    pub fn is_dir(&self) -> bool {
        self.flags_inode & ISDIR_BIT != 0
    }

    pub fn inode(&self) -> u32 {
        self.flags_inode & INODE_MASK
    }

    pub fn name(&self) -> &[u8] {
        let len = self.name.iter().position(|&b| b == 0).unwrap_or(self.name.len());
        &self.name[..len]
    }

    pub fn clear(&mut self) {
        self.flags_inode &= !VALID_BIT;
    }

    /// Populates the entry; truncates `name` to `MAX_NAME_LEN` bytes.
    pub fn set(&mut self, inode: u32, is_dir: bool, name: &[u8]) {
        let mut flags = VALID_BIT | (inode & INODE_MASK);
        if is_dir {
            flags |= ISDIR_BIT;
        }
        self.flags_inode = flags;
        self.name = [0; 28];
        let len = name.len().min(MAX_NAME_LEN);
        self.name[..len].copy_from_slice(&name[..len]);
    }

    pub fn set_name(&mut self, name: &[u8]) {
        self.name = [0; 28];
        let len = name.len().min(MAX_NAME_LEN);
        self.name[..len].copy_from_slice(&name[..len]);
    }
}
