//! blockfs: a small UNIX-style file system stored in a fixed-size block
//! device. On-disk layout is super-block + inode bitmap + block bitmap +
//! inode table + data region, with direct / single-indirect / double-
//! indirect block pointers (spec §2/§3/§6).
//!
//! The crate is organized leaf-first, matching the component table: the
//! block device capability at the bottom, the cached volume state above
//! it, allocators and block-mapping above that, then directory entries,
//! the path resolver, and finally the thin upcall-translation operation
//! layer.

pub mod alloc;
pub mod blockdev;
pub mod blockmap;
pub mod dir;
pub mod error;
pub mod file_io;
pub mod fsck;
pub mod layout;
pub mod mkfs;
pub mod ops;
pub mod path;
pub mod volume;

pub use blockdev::{BlockDevice, FileBlockDevice, MemBlockDevice};
pub use error::{FsError, FsResult};
pub use ops::{Operations, UpcallContext};
pub use volume::Volume;
