use crate::FileErrorKind;
use std::io::Read;
use std::path::{Path, PathBuf};

/// A byte stream the hash engine can consume.
pub trait Readable: Read {}

impl<T: Read> Readable for T {}

/// A source that knows its size at the time it was opened.
pub trait SizeQueryable {
    fn size(&self) -> u64;
}

/// Why a file could not be opened for reading
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenFailure {
    pub path: PathBuf,
    pub kind: FileErrorKind,
    pub message: String,
}

impl OpenFailure {
    pub fn from_io(path: &Path, err: &std::io::Error) -> Self {
        Self {
            path: path.to_path_buf(),
            kind: FileErrorKind::from(err),
            message: err.to_string(),
        }
    }
}

/// Outcome of opening a file: a readable, sized source or the failure.
#[derive(Debug)]
pub enum Opened<S: Readable + SizeQueryable> {
    Regular(S),
    Failed(OpenFailure),
}
