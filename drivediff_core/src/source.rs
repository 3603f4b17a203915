use drivediff_common::{FileErrorKind, OpenFailure, Opened, SizeQueryable};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// A regular file opened for streaming reads
#[derive(Debug)]
pub struct LocalFile {
    file: File,
    size: u64,
}

impl LocalFile {
    /// Open a regular file, following symlinks.
    ///
    /// Directories and special files are reported as failures so the hash
    /// engine never blocks on a FIFO or device node.
    pub fn open(path: &Path) -> Opened<LocalFile> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) => return Opened::Failed(OpenFailure::from_io(path, &e)),
        };

        let metadata = match file.metadata() {
            Ok(metadata) => metadata,
            Err(e) => return Opened::Failed(OpenFailure::from_io(path, &e)),
        };

        if !metadata.is_file() {
            return Opened::Failed(OpenFailure {
                path: path.to_path_buf(),
                kind: FileErrorKind::Other,
                message: "not a regular file".to_string(),
            });
        }

        Opened::Regular(LocalFile {
            file,
            size: metadata.len(),
        })
    }
}

impl Read for LocalFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl SizeQueryable for LocalFile {
    fn size(&self) -> u64 {
        self.size
    }
}
