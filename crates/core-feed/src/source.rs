//! Input sources a block store can drain.
//!
//! The trait seam keeps child-process plumbing (pipes, PTYs) out of this
//! crate: spawning code implements [`FeedSource`] for its own reader types
//! and hands them over boxed.

use std::fs::File;
use std::io::{Read, Stdin};
use std::path::Path;

/// A byte producer feeding a [`crate::BlockStore`].
///
/// `close` is called exactly once, either when the source reports EOF or
/// when the owning document is killed; implementations release the
/// descriptor and reap any child there.
pub trait FeedSource: Read + Send {
    /// PTY masters raise `EIO` instead of a clean EOF when the child side
    /// closes; the store normalizes that for sources answering true.
    fn is_pty(&self) -> bool {
        false
    }

    fn close(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Regular file opened for paging.
pub struct FileSource(File);

impl FileSource {
    pub fn open(path: &Path) -> std::io::Result<(Self, u64)> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        Ok((Self(file), len))
    }

    pub fn from_file(file: File) -> Self {
        Self(file)
    }
}

impl Read for FileSource {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.0.read(buf)
    }
}

impl FeedSource for FileSource {}

/// The process's standard input (redirected data, never the keyboard:
/// interactive input arrives through the terminal layer).
pub struct StdinSource(Stdin);

impl StdinSource {
    pub fn new() -> Self {
        Self(std::io::stdin())
    }
}

impl Default for StdinSource {
    fn default() -> Self {
        Self::new()
    }
}

impl Read for StdinSource {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.0.read(buf)
    }
}

impl FeedSource for StdinSource {}

/// In-memory source for injected pseudo-documents (apropos listing, file
/// list, help text).
pub struct BufferSource {
    bytes: Vec<u8>,
    at: usize,
}

impl BufferSource {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes, at: 0 }
    }

    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl Read for BufferSource {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let rest = &self.bytes[self.at..];
        let n = rest.len().min(buf.len());
        buf[..n].copy_from_slice(&rest[..n]);
        self.at += n;
        Ok(n)
    }
}

impl FeedSource for BufferSource {}

/// Block size matched to the backing filesystem's preferred I/O size,
/// falling back to [`crate::DEFAULT_BLKSIZE`] for pipes and odd mounts.
pub fn preferred_blksize(path: &Path) -> usize {
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        if let Ok(meta) = std::fs::metadata(path) {
            let bs = meta.blksize() as usize;
            if bs > 0 {
                return bs;
            }
        }
    }
    crate::DEFAULT_BLKSIZE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_source_drains_in_chunks() {
        let mut s = BufferSource::new(b"abcdef".to_vec());
        let mut buf = [0u8; 4];
        assert_eq!(s.read(&mut buf).unwrap(), 4);
        assert_eq!(&buf, b"abcd");
        assert_eq!(s.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"ef");
        assert_eq!(s.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn file_source_reports_length() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), b"hello\n").unwrap();
        let (_src, len) = FileSource::open(tmp.path()).unwrap();
        assert_eq!(len, 6);
    }
}
