//! Path resolver (spec §4.7): tokenizes a '/'-delimited path and walks it
//! from the root inode.

use crate::blockdev::BlockDevice;
use crate::error::{FsError, FsResult};
use crate::layout::MAX_NAME_LEN;
use crate::volume::Volume;

/// Splits `path` on '/', discarding empty tokens. If the literal path ends
/// in '/', a synthetic "." token is appended so the leaf is well-defined —
/// except for the literal root "/" itself, which has no parent and no leaf
/// (spec §4.7: `inode_of_path_dir("/")` returns `(root_inode, "")`).
fn tokenize(path: &str) -> Vec<Vec<u8>> {
    if path == "/" {
        return Vec::new();
    }
    let mut toks: Vec<Vec<u8>> = path
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| s.as_bytes().to_vec())
        .collect();
    if path.ends_with('/') {
        toks.push(b".".to_vec());
    }
    toks
}

impl<D: BlockDevice> Volume<D> {
    /// Walks every token of `path` from the root inode; returns the final
    /// inumber.
    pub fn inode_of_path(&mut self, path: &str) -> FsResult<u32> {
        let toks = tokenize(path);
        let mut inum = self.superblock.root_inode;
        for tok in &toks {
            if !self.inodes[inum as usize].is_dir() {
                return Err(FsError::NotADirectory);
            }
            inum = self.dir_lookup(inum, tok, false)?.inode;
        }
        Ok(inum)
    }

    /// Walks every token of `path` except the last; returns the parent
    /// inumber and copies the last token into `out_leaf`. `out_leaf` is
    /// cleared first; for "/" the parent is the root and the leaf is empty.
    pub fn inode_of_path_dir(&mut self, path: &str, out_leaf: &mut Vec<u8>) -> FsResult<u32> {
        let toks = tokenize(path);
        out_leaf.clear();
        if toks.is_empty() {
            return Ok(self.superblock.root_inode);
        }

        let mut inum = self.superblock.root_inode;
        for tok in &toks[..toks.len() - 1] {
            if !self.inodes[inum as usize].is_dir() {
                return Err(FsError::NotADirectory);
            }
            inum = self.dir_lookup(inum, tok, false)?.inode;
        }
        let leaf = &toks[toks.len() - 1];
        out_leaf.extend_from_slice(&leaf[..leaf.len().min(MAX_NAME_LEN)]);
        Ok(inum)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_discards_empty_components() {
        assert_eq!(tokenize("/a//b/c"), vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn tokenize_trailing_slash_appends_dot() {
        assert_eq!(tokenize("/a/b/"), vec![b"a".to_vec(), b"b".to_vec(), b".".to_vec()]);
    }

    #[test]
    fn tokenize_root_is_empty() {
        assert!(tokenize("/").is_empty());
    }
}
