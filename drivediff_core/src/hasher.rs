use crate::source::LocalFile;
use drivediff_common::{
    CancellationToken, ContentKind, FileErrorKind, OpenFailure, Opened, Readable, Sha256Digest,
    SizeQueryable, DEFAULT_HASH_CHUNK_SIZE,
};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, ErrorKind, Read};
use std::path::Path;
use tracing::{debug, warn};

/// Bytes inspected at the start of a file for binary detection.
pub const DEFAULT_SNIFF_LEN: usize = 1024;

/// Share of non-text bytes above which a NUL-free prefix counts as binary.
const BINARY_THRESHOLD: f64 = 0.30;

/// Digest and classification of one fully read file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileDigest {
    pub digest: Sha256Digest,
    pub content_kind: ContentKind,
    pub bytes_read: u64,
}

/// Result of hashing a single file. Failures are values, never panics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HashOutcome {
    Hashed(FileDigest),
    Failed(OpenFailure),
    Cancelled,
}

/// Streaming SHA-256 hasher with single-pass binary detection
#[derive(Debug, Clone)]
pub struct HashEngine {
    chunk_size: usize,
    sniff_len: usize,
}

impl HashEngine {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            sniff_len: DEFAULT_SNIFF_LEN,
        }
    }

    pub fn with_sniff_len(mut self, sniff_len: usize) -> Self {
        self.sniff_len = sniff_len;
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Hash a file on the local filesystem.
    pub fn hash_file(&self, path: &Path, cancel: &CancellationToken) -> HashOutcome {
        if cancel.is_cancelled() {
            return HashOutcome::Cancelled;
        }

        match LocalFile::open(path) {
            Opened::Regular(file) => self.hash_source(file, path, cancel),
            Opened::Failed(failure) => {
                warn!("Cannot open {}: {}", path.display(), failure.message);
                HashOutcome::Failed(failure)
            }
        }
    }

    /// Hash any sized byte source in `chunk_size` reads.
    ///
    /// The token is checked between chunks. A source that yields a different
    /// number of bytes than it reported at open time changed while it was
    /// being read and is reported as a failure.
    pub fn hash_source<S>(&self, mut source: S, path: &Path, cancel: &CancellationToken) -> HashOutcome
    where
        S: Readable + SizeQueryable,
    {
        let expected = source.size();
        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; self.chunk_size];
        let mut prefix = Vec::with_capacity(self.sniff_len);
        let mut total: u64 = 0;

        loop {
            if cancel.is_cancelled() {
                debug!("Hash cancelled: {}", path.display());
                return HashOutcome::Cancelled;
            }

            let n = match source.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!("Read failed for {}: {}", path.display(), e);
                    return HashOutcome::Failed(OpenFailure::from_io(path, &e));
                }
            };

            hasher.update(&buffer[..n]);
            if prefix.len() < self.sniff_len {
                let take = (self.sniff_len - prefix.len()).min(n);
                prefix.extend_from_slice(&buffer[..take]);
            }
            total += n as u64;
        }

        if total != expected {
            warn!(
                "{} changed during hashing ({} bytes expected, {} read)",
                path.display(),
                expected,
                total
            );
            return HashOutcome::Failed(OpenFailure {
                path: path.to_path_buf(),
                kind: FileErrorKind::Other,
                message: format!("file changed while reading ({expected} bytes expected, {total} read)"),
            });
        }

        let mut digest = [0u8; 32];
        digest.copy_from_slice(&hasher.finalize());

        HashOutcome::Hashed(FileDigest {
            digest: Sha256Digest(digest),
            content_kind: classify_content(&prefix),
            bytes_read: total,
        })
    }
}

impl Default for HashEngine {
    fn default() -> Self {
        Self::new(DEFAULT_HASH_CHUNK_SIZE)
    }
}

/// Classify a file prefix as text or binary.
pub fn classify_content(prefix: &[u8]) -> ContentKind {
    if prefix.is_empty() {
        return ContentKind::Text;
    }
    if prefix.contains(&0) {
        return ContentKind::Binary;
    }

    let non_text = prefix.iter().filter(|&&b| !is_text_byte(b)).count();
    if non_text as f64 / prefix.len() as f64 > BINARY_THRESHOLD {
        ContentKind::Binary
    } else {
        ContentKind::Text
    }
}

/// Classify a file by reading only its first `sniff_len` bytes.
pub fn sniff_file(path: &Path, sniff_len: usize) -> io::Result<ContentKind> {
    let mut prefix = Vec::with_capacity(sniff_len);
    File::open(path)?
        .take(sniff_len as u64)
        .read_to_end(&mut prefix)?;
    Ok(classify_content(&prefix))
}

fn is_text_byte(b: u8) -> bool {
    matches!(b, b'\n' | b'\r' | b'\t' | 0x08 | 0x20..=0x7e)
}
