use std::fs::File;
use std::io::Read as _;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Error, Result};

/// Upper bound for a single read from a result stream.
pub const MAX_CHUNK_BYTES: usize = 5 * 1024 * 1024;

/// A file that is opened lazily, once it exists, and read incrementally.
///
/// Reads never wait for more data: asking for more than is currently written
/// returns only the available prefix.
#[derive(Debug)]
pub struct TailFile {
    path: PathBuf,
    file: Option<File>,
    bytes_read: u64,
}

impl TailFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: None,
            bytes_read: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Opens the file if it has appeared since the last call.
    pub fn open_if_exists(&mut self) -> Result<bool> {
        if self.file.is_some() {
            return Ok(true);
        }
        if !self.path.exists() {
            return Ok(false);
        }

        debug!(path = %self.path.display(), "opening stream");
        let file = File::open(&self.path).map_err(|e| Error::io(&self.path, e))?;
        self.file = Some(file);
        Ok(true)
    }

    /// Reads up to `max` bytes. Returns an empty buffer when nothing new is available.
    pub fn read_chunk(&mut self, max: usize) -> Result<Vec<u8>> {
        if !self.open_if_exists()? {
            return Ok(Vec::new());
        }
        let Some(file) = self.file.as_mut() else {
            return Ok(Vec::new());
        };

        let mut buf = Vec::new();
        file.take(max as u64)
            .read_to_end(&mut buf)
            .map_err(|e| Error::io(&self.path, e))?;
        self.bytes_read += buf.len() as u64;
        Ok(buf)
    }
}

/// Splits a byte stream into lines, holding back a trailing fragment until its terminator arrives.
#[derive(Debug, Default)]
pub struct LineChunker {
    partial: Vec<u8>,
}

impl LineChunker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `chunk` and returns every line completed by it, without terminators.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        let mut rest = chunk;

        while let Some(pos) = rest.iter().position(|b| *b == b'\n') {
            let (head, tail) = rest.split_at(pos);
            rest = &tail[1..];

            let line = if self.partial.is_empty() {
                decode_line(head)
            } else {
                self.partial.extend_from_slice(head);
                let joined = decode_line(&self.partial);
                self.partial.clear();
                joined
            };
            lines.push(line);
        }

        if !rest.is_empty() {
            debug!(bytes = rest.len(), "buffering incomplete line");
            self.partial.extend_from_slice(rest);
        }

        lines
    }

    /// Bytes of the line fragment still waiting for its terminator.
    pub fn pending(&self) -> &[u8] {
        &self.partial
    }
}

fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    const TEXT: &str = "1346949510.514\tmain\t74420\t66\t78\t65409\t8867\t74201\t18\t15662\t0\t200\n\
                        1346949510.600\tsecond\t1000\t1\t2\t3\t4\t999\t10\t20\t0\t404\n\
                        \n\
                        tail\tfield\r\n";

    fn whole(text: &str) -> Vec<String> {
        LineChunker::new().push(text.as_bytes())
    }

    #[test]
    fn holds_fragment_until_terminator() {
        let mut c = LineChunker::new();
        assert!(c.push(b"abc\tde").is_empty());
        assert_eq!(c.pending(), b"abc\tde");
        assert_eq!(c.push(b"f\nxy"), vec!["abc\tdef".to_string()]);
        assert_eq!(c.pending(), b"xy");
    }

    #[test]
    fn any_two_way_split_matches_unsplit_parse() {
        let expected = whole(TEXT);
        assert_eq!(expected.len(), 4);
        assert_eq!(expected[3], "tail\tfield");

        let bytes = TEXT.as_bytes();
        for cut in 0..=bytes.len() {
            let mut c = LineChunker::new();
            let mut got = c.push(&bytes[..cut]);
            got.extend(c.push(&bytes[cut..]));
            assert_eq!(got, expected, "split at {cut}");
            assert!(c.pending().is_empty());
        }
    }

    #[test]
    fn byte_at_a_time_matches_unsplit_parse() {
        let mut c = LineChunker::new();
        let mut got = Vec::new();
        for b in TEXT.as_bytes() {
            got.extend(c.push(std::slice::from_ref(b)));
        }
        assert_eq!(got, whole(TEXT));
    }

    #[test]
    fn read_chunk_returns_only_available_prefix() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("{e}"));
        let path = dir.path().join("phout.txt");

        let mut tail = TailFile::new(&path);
        assert!(tail.read_chunk(16).unwrap_or_else(|e| panic!("{e}")).is_empty());
        assert!(!tail.is_open());

        let mut f = File::create(&path).unwrap_or_else(|e| panic!("{e}"));
        f.write_all(b"0123456789").unwrap_or_else(|e| panic!("{e}"));
        f.flush().unwrap_or_else(|e| panic!("{e}"));

        assert_eq!(tail.read_chunk(4).unwrap_or_else(|e| panic!("{e}")), b"0123");
        assert_eq!(tail.read_chunk(100).unwrap_or_else(|e| panic!("{e}")), b"456789");
        assert!(tail.read_chunk(100).unwrap_or_else(|e| panic!("{e}")).is_empty());

        f.write_all(b"ab").unwrap_or_else(|e| panic!("{e}"));
        f.flush().unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(tail.read_chunk(100).unwrap_or_else(|e| panic!("{e}")), b"ab");
        assert_eq!(tail.bytes_read(), 12);
    }
}
