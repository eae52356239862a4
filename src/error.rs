//! Internal error taxonomy and its mapping to host errno values (spec §7).

use std::io;

#[derive(Debug, thiserror::Error)]
pub enum FsError {
    #[error("no such file or directory")]
    NotFound,

    #[error("not a directory")]
    NotADirectory,

    #[error("is a directory")]
    IsADirectory,

    #[error("file already exists")]
    AlreadyExists,

    #[error("directory not empty")]
    NotEmpty,

    #[error("no space left on device")]
    NoSpace,

    #[error("invalid argument")]
    InvalidArgument,

    #[error("permission denied")]
    PermissionDenied,

    #[error("I/O error: {0}")]
    Io(String),
}

impl FsError {
    /// Negative-on-error host errno, per spec §6/§7.
    pub fn errno(&self) -> i32 {
        match self {
            FsError::NotFound => -libc_enoent(),
            FsError::NotADirectory => -libc_enotdir(),
            FsError::IsADirectory => -libc_eisdir(),
            FsError::AlreadyExists => -libc_eexist(),
            FsError::NotEmpty => -libc_enotempty(),
            FsError::NoSpace => -libc_enospc(),
            FsError::InvalidArgument => -libc_einval(),
            FsError::PermissionDenied => -libc_eacces(),
            FsError::Io(_) => -libc_eio(),
        }
    }
}

impl From<io::Error> for FsError {
    fn from(e: io::Error) -> Self {
        FsError::Io(e.to_string())
    }
}

// Standard POSIX errno values. Kept as free functions (rather than a libc
// dependency) because the core has no other reason to link libc: the block
// device trait in `blockdev.rs` is the only thing that touches the OS, and
// it works entirely through `std::fs`.
fn libc_enoent() -> i32 {
    2
}
fn libc_eio() -> i32 {
    5
}
fn libc_eacces() -> i32 {
    13
}
fn libc_eexist() -> i32 {
    17
}
fn libc_enotdir() -> i32 {
    20
}
fn libc_eisdir() -> i32 {
    21
}
fn libc_einval() -> i32 {
    22
}
fn libc_enospc() -> i32 {
    28
}
fn libc_enotempty() -> i32 {
    39
}

pub type FsResult<T> = Result<T, FsError>;
