//! End-to-end scenarios against a freshly formatted in-memory volume,
//! mirroring spec §8's "concrete end-to-end scenarios" and boundary
//! behaviours.

use blockfs::blockdev::MemBlockDevice;
use blockfs::layout::S_IFDIR;
use blockfs::mkfs::{format, DEFAULT_NUM_BLOCKS, DEFAULT_NUM_INODES};
use blockfs::ops::{Operations, UpcallContext};

fn fresh() -> Operations<MemBlockDevice> {
    let device = MemBlockDevice::new(DEFAULT_NUM_BLOCKS);
    let vol = format(device, DEFAULT_NUM_BLOCKS, DEFAULT_NUM_INODES).unwrap();
    Operations::new(vol)
}

const CTX: UpcallContext = UpcallContext { uid: 1000, gid: 1000 };

#[test]
fn mkdir_then_readdir_and_getattr() {
    let mut ops = fresh();
    assert!(ops.mkdir("/a", 0o755, CTX).is_ok());

    let entries = ops.readdir("/", true).unwrap();
    assert!(entries.iter().any(|(name, _)| name == b"a"));

    let st = ops.getattr("/a").unwrap();
    assert_eq!(st.mode & 0o170000, S_IFDIR);
    // v1 format: "." and ".." contribute 64 bytes to a fresh directory.
    assert_eq!(st.size, 64);
}

#[test]
fn mknod_write_read_roundtrip() {
    let mut ops = fresh();
    ops.mkdir("/a", 0o755, CTX).unwrap();
    ops.mknod("/a/f", 0o644, CTX).unwrap();

    let n = ops.write("/a/f", b"hello", 5, 0).unwrap();
    assert_eq!(n, 5);

    let mut buf = [0u8; 5];
    let n = ops.read("/a/f", &mut buf, 5, 0).unwrap();
    assert_eq!(n, 5);
    assert_eq!(&buf, b"hello");

    assert_eq!(ops.getattr("/a/f").unwrap().size, 5);
}

#[test]
fn write_past_direct_boundary_allocates_indir1_only() {
    let mut ops = fresh();
    ops.mkdir("/a", 0o755, CTX).unwrap();
    ops.mknod("/a/f", 0o644, CTX).unwrap();

    // 260 blocks (indices 0..259) stay within direct[0..5] + indir_1's 256
    // slots (indices 6..261); indir_2 is not needed yet.
    let len = 260 * 1024usize;
    let data = vec![b'K'; len];
    let n = ops.write("/a/f", &data, len, 0).unwrap();
    assert_eq!(n, len);

    let inum = ops.volume.inode_of_path("/a/f").unwrap();
    assert_ne!(ops.volume.inodes[inum as usize].indir_1, 0);
    assert_eq!(ops.volume.inodes[inum as usize].indir_2, 0);

    let mut buf = [0u8; 1024];
    let n = ops.read("/a/f", &mut buf, 1024, 259 * 1024).unwrap();
    assert_eq!(n, 1024);
    assert!(buf.iter().all(|&b| b == b'K'));
}

#[test]
fn write_past_indir2_boundary_allocates_double_indirect_block() {
    let mut ops = fresh();
    ops.mkdir("/a", 0o755, CTX).unwrap();
    ops.mknod("/a/f", 0o644, CTX).unwrap();

    // Index 262 is the first one addressed through indir_2 (6 direct +
    // 256 indir_1 slots = indices 0..261).
    let len = 263 * 1024usize;
    let data = vec![b'K'; len];
    let n = ops.write("/a/f", &data, len, 0).unwrap();
    assert_eq!(n, len);

    let inum = ops.volume.inode_of_path("/a/f").unwrap();
    assert_ne!(ops.volume.inodes[inum as usize].indir_1, 0);
    assert_ne!(ops.volume.inodes[inum as usize].indir_2, 0);

    let mut buf = [0u8; 1024];
    let n = ops.read("/a/f", &mut buf, 1024, 262 * 1024).unwrap();
    assert_eq!(n, 1024);
    assert!(buf.iter().all(|&b| b == b'K'));
}

#[test]
fn rename_preserves_inumber_and_rejects_cross_directory() {
    let mut ops = fresh();
    ops.mkdir("/a", 0o755, CTX).unwrap();
    ops.mkdir("/b", 0o755, CTX).unwrap();
    ops.mknod("/a/f", 0o644, CTX).unwrap();

    let before = ops.volume.inode_of_path("/a/f").unwrap();
    ops.rename("/a/f", "/a/g").unwrap();
    assert!(ops.getattr("/a/f").is_err());
    let after = ops.volume.inode_of_path("/a/g").unwrap();
    assert_eq!(before, after);

    let err = ops.rename("/a/g", "/b/h").unwrap_err();
    assert_eq!(err.errno(), -22); // EINVAL
}

#[test]
fn unlink_frees_blocks_and_inode() {
    let mut ops = fresh();
    ops.mkdir("/a", 0o755, CTX).unwrap();
    ops.mknod("/a/f", 0o644, CTX).unwrap();
    let len = 260 * 1024usize;
    ops.write("/a/f", &vec![b'K'; len], len, 0).unwrap();

    let free_before = ops.statfs("/").unwrap().free_blocks;
    ops.unlink("/a/f").unwrap();
    let free_after = ops.statfs("/").unwrap().free_blocks;

    assert!(free_after > free_before + 260);
    assert!(ops.getattr("/a/f").is_err());
}

#[test]
fn rmdir_on_v1_requires_only_dot_entries() {
    let mut ops = fresh();
    ops.mkdir("/a", 0o755, CTX).unwrap();
    assert!(ops.rmdir("/a").is_ok());
    assert!(ops.getattr("/a").is_err());
}

#[test]
fn rmdir_of_dot_or_dotdot_is_rejected() {
    let mut ops = fresh();
    ops.mkdir("/a", 0o755, CTX).unwrap();
    assert!(ops.rmdir("/a/.").is_err());
    assert!(ops.rmdir("/a/..").is_err());
}

#[test]
fn unlink_with_nlink_greater_than_one_keeps_inode_alive() {
    let mut ops = fresh();
    ops.mknod("/f", 0o644, CTX).unwrap();
    ops.write("/f", b"hi", 2, 0).unwrap();
    ops.link("/f", "/g").unwrap();

    let inum = ops.volume.inode_of_path("/f").unwrap();
    assert_eq!(ops.volume.inodes[inum as usize].nlink, 2);

    ops.unlink("/f").unwrap();
    assert!(ops.getattr("/f").is_err());
    // the inode is still alive through the second name
    let st = ops.getattr("/g").unwrap();
    assert_eq!(st.nlink, 1);
    let mut buf = [0u8; 2];
    assert_eq!(ops.read("/g", &mut buf, 2, 0).unwrap(), 2);
    assert_eq!(&buf, b"hi");
}

#[test]
fn zero_length_read_and_read_at_eof_return_zero() {
    let mut ops = fresh();
    ops.mknod("/f", 0o644, CTX).unwrap();
    ops.write("/f", b"hello", 5, 0).unwrap();

    let mut buf = [0u8; 0];
    assert_eq!(ops.read("/f", &mut buf, 0, 0).unwrap(), 0);

    let mut buf = [0u8; 10];
    assert_eq!(ops.read("/f", &mut buf, 10, 5).unwrap(), 0);
}

#[test]
fn write_past_eof_is_rejected_no_holes() {
    let mut ops = fresh();
    ops.mknod("/f", 0o644, CTX).unwrap();
    let err = ops.write("/f", b"hi", 2, 100).unwrap_err();
    assert_eq!(err.errno(), -22); // EINVAL
}

#[test]
fn truncate_to_zero_is_idempotent() {
    let mut ops = fresh();
    ops.mknod("/f", 0o644, CTX).unwrap();
    ops.write("/f", &vec![b'x'; 4000], 4000, 0).unwrap();

    let free_before_truncate = ops.statfs("/").unwrap().free_blocks;
    ops.truncate("/f", 0).unwrap();
    let free_after_first = ops.statfs("/").unwrap().free_blocks;
    ops.truncate("/f", 0).unwrap();
    let free_after_second = ops.statfs("/").unwrap().free_blocks;

    assert!(free_after_first > free_before_truncate);
    assert_eq!(free_after_first, free_after_second);
    assert_eq!(ops.getattr("/f").unwrap().size, 0);
}

#[test]
fn truncate_nonzero_length_is_rejected() {
    let mut ops = fresh();
    ops.mknod("/f", 0o644, CTX).unwrap();
    let err = ops.truncate("/f", 10).unwrap_err();
    assert_eq!(err.errno(), -22); // EINVAL
}

#[test]
fn path_round_trip_matches_direct_lookup() {
    let mut ops = fresh();
    ops.mkdir("/a", 0o755, CTX).unwrap();
    ops.mknod("/a/f", 0o644, CTX).unwrap();

    let direct = ops.volume.inode_of_path("/a/f").unwrap();
    let mut leaf = Vec::new();
    let parent = ops.volume.inode_of_path_dir("/a/f", &mut leaf).unwrap();
    let via_parent = ops.volume.dir_lookup(parent, &leaf, false).unwrap().inode;
    assert_eq!(direct, via_parent);
}

#[test]
fn mkentry_rejects_existing_name() {
    let mut ops = fresh();
    ops.mknod("/f", 0o644, CTX).unwrap();
    let err = ops.mknod("/f", 0o644, CTX).unwrap_err();
    assert_eq!(err.errno(), -17); // EEXIST
}

#[test]
fn link_rejects_directories_and_existing_targets() {
    let mut ops = fresh();
    ops.mkdir("/a", 0o755, CTX).unwrap();
    ops.mknod("/f", 0o644, CTX).unwrap();

    assert!(ops.link("/a", "/b").is_err()); // EISDIR
    ops.link("/f", "/g").unwrap();
    assert!(ops.link("/f", "/g").is_err()); // EEXIST
}

#[test]
fn link_with_trailing_slash_destination_is_rejected() {
    let mut ops = fresh();
    ops.mknod("/f", 0o644, CTX).unwrap();
    let err = ops.link("/f", "/g/").unwrap_err();
    assert_eq!(err.errno(), -13); // EACCES
}
