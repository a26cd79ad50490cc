//! Write-then-read storage destinations for decoded part bodies
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tempfile::TempPath;
#[allow(unused_imports)]
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug)]
enum BodyKind {
    Memory(Vec<u8>),
    File {
        path: PathBuf,
        // Keeps path-backed temp bodies alive, and deletes them on drop
        _temp: Option<TempPath>,
    },
}

/// A destination for one decoded body: written once, then read back
///
/// The content is stable once the writer is dropped; reopening for read
/// yields the same bytes. The binary flag documents the content to callers
/// and never alters the stored bytes.
#[derive(Debug)]
pub struct Body {
    kind: BodyKind,
    binary: bool,
}

impl Body {
    /// Creates an in-memory body
    pub fn memory() -> Self {
        Self {
            kind: BodyKind::Memory(Vec::new()),
            binary: false,
        }
    }

    /// Creates a body backed by a regular file, owned by the caller
    pub fn file<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            kind: BodyKind::File {
                path: path.into(),
                _temp: None,
            },
            binary: false,
        }
    }

    /// Creates a body backed by a temporary file, deleted when dropped
    pub fn tempfile() -> Result<Self, std::io::Error> {
        let temp = tempfile::NamedTempFile::new()?.into_temp_path();
        Ok(Self {
            kind: BodyKind::File {
                path: temp.to_path_buf(),
                _temp: Some(temp),
            },
            binary: false,
        })
    }

    /// Opens the body for writing, truncating any previous content
    pub fn open_write(&mut self) -> Result<BodyWriter<'_>, std::io::Error> {
        Ok(match &mut self.kind {
            BodyKind::Memory(buf) => {
                buf.clear();
                BodyWriter::Memory(buf)
            }
            BodyKind::File { path, .. } => BodyWriter::File(File::create(path)?),
        })
    }

    /// Opens the body for reading
    pub fn open_read(&self) -> Result<BodyReader<'_>, std::io::Error> {
        Ok(match &self.kind {
            BodyKind::Memory(buf) => BodyReader::Memory(buf.as_slice()),
            BodyKind::File { path, .. } => BodyReader::File(File::open(path)?),
        })
    }

    /// The stored size in bytes
    pub fn size(&self) -> Result<u64, std::io::Error> {
        match &self.kind {
            BodyKind::Memory(buf) => Ok(buf.len() as u64),
            BodyKind::File { path, .. } => Ok(std::fs::metadata(path)?.len()),
        }
    }

    /// The backing path, for file-backed bodies only
    pub fn path(&self) -> Option<&Path> {
        match &self.kind {
            BodyKind::Memory(_) => None,
            BodyKind::File { path, .. } => Some(path),
        }
    }

    /// Flags the content as binary (not line-oriented text)
    pub fn set_binary(&mut self, binary: bool) {
        self.binary = binary;
    }

    /// Whether the content was flagged as binary
    pub fn is_binary(&self) -> bool {
        self.binary
    }
}

/// The writing side of a [`Body`]
pub enum BodyWriter<'a> {
    /// Appends to the in-memory buffer
    Memory(&'a mut Vec<u8>),
    /// Writes through to the backing file
    File(File),
}

impl Write for BodyWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> Result<usize, std::io::Error> {
        match self {
            BodyWriter::Memory(v) => v.write(buf),
            BodyWriter::File(f) => f.write(buf),
        }
    }

    fn flush(&mut self) -> Result<(), std::io::Error> {
        match self {
            BodyWriter::Memory(v) => v.flush(),
            BodyWriter::File(f) => f.flush(),
        }
    }
}

/// The reading side of a [`Body`]
pub enum BodyReader<'a> {
    /// Serves the in-memory buffer
    Memory(&'a [u8]),
    /// Reads back from the backing file
    File(File),
}

impl Read for BodyReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, std::io::Error> {
        match self {
            BodyReader::Memory(s) => s.read(buf),
            BodyReader::File(f) => f.read(buf),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn roundtrip(body: &mut Body, content: &[u8]) -> Vec<u8> {
        let mut w = body.open_write().unwrap();
        w.write_all(content).unwrap();
        w.flush().unwrap();
        drop(w);
        let mut back = Vec::new();
        body.open_read().unwrap().read_to_end(&mut back).unwrap();
        back
    }

    #[test]
    fn test_memory_body() {
        let mut body = Body::memory();
        assert!(body.path().is_none());
        assert_eq!(roundtrip(&mut body, b"in core"), b"in core");
        assert_eq!(body.size().unwrap(), 7);
        // Reopening for write truncates
        assert_eq!(roundtrip(&mut body, b"x"), b"x");
        assert_eq!(body.size().unwrap(), 1);
    }

    #[test]
    fn test_temp_body() {
        let mut body = Body::tempfile().unwrap();
        let path = body.path().unwrap().to_path_buf();
        assert_eq!(roundtrip(&mut body, b"on disk"), b"on disk");
        assert_eq!(body.size().unwrap(), 7);
        assert!(path.exists());
        drop(body);
        assert!(!path.exists());
    }

    #[test]
    fn test_file_body() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("part.bin");
        let mut body = Body::file(&path);
        assert_eq!(roundtrip(&mut body, b"kept"), b"kept");
        assert_eq!(body.path(), Some(path.as_path()));
        drop(body);
        // Caller-owned files survive the body
        assert!(path.exists());
    }

    #[test]
    fn test_binary_flag() {
        let mut body = Body::memory();
        assert!(!body.is_binary());
        body.set_binary(true);
        assert!(body.is_binary());
    }
}
