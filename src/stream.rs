//! Byte-exact buffered line reading over arbitrary input streams
use std::io::Read;

/// The maximum line length (set to 1000 per RFC 5322)
const MAX_LINE_LEN: usize = 1000;
/// The size of the internal buffer
const BUFSIZ: usize = 4096;

/// Splits a raw line into its payload and its line terminator
///
/// The terminator is one of `"\r\n"`, `"\n"`, `"\r"` or (on the final
/// unterminated line) empty
#[inline]
pub fn split_eol(line: &[u8]) -> (&[u8], &'static [u8]) {
    if line.ends_with(b"\r\n") {
        (&line[0..(line.len() - 2)], b"\r\n")
    } else if line.ends_with(b"\n") {
        (&line[0..(line.len() - 1)], b"\n")
    } else if line.ends_with(b"\r") {
        (&line[0..(line.len() - 1)], b"\r")
    } else {
        (line, b"")
    }
}

/// Reads until `buf` is full or the input is exhausted
pub(crate) fn read_full<R: Read + ?Sized>(r: &mut R, buf: &mut [u8]) -> Result<usize, std::io::Error> {
    let mut got = 0usize;
    while got < buf.len() {
        match r.read(&mut buf[got..]) {
            Ok(0) => break,
            Ok(n) => got += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(got)
}

/// Returns the position of the first CR or LF within the line length cap
#[inline]
fn find_line_break(line: &[u8]) -> Option<usize> {
    line.iter()
        .take(MAX_LINE_LEN)
        .position(|&v| v == b'\n' || v == b'\r')
}

/// A buffered "mail line" reader, wraps any `Read`
///
/// Line breaks on CR, LF or CRLF; terminators are returned untouched so
/// multipart boundary matching sees the raw bytes. Lines longer than the
/// RFC 5322 cap surface an `InvalidData` error.
pub struct LineReader<R: Read> {
    r: R,
    buf: [u8; BUFSIZ],
    start: usize,
    end: usize,
    eof: bool,
}

impl<R: Read> LineReader<R> {
    /// Creates the line reader
    pub fn new(r: R) -> Self {
        Self {
            r,
            buf: [0; BUFSIZ],
            start: 0,
            end: 0,
            eof: false,
        }
    }

    fn fill_buf(&mut self) -> Result<(), std::io::Error> {
        if self.start > 0 {
            // memmove
            self.buf.copy_within(self.start..self.end, 0);
            self.end -= self.start;
            self.start = 0;
        }
        loop {
            let read = match self.r.read(&mut self.buf[self.end..]) {
                Ok(v) => v,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            if read == 0 {
                self.eof = true;
            }
            self.end += read;
            break;
        }
        Ok(())
    }

    /// Length of the next buffered line (terminator included), if complete
    fn buffered_line_len(&self) -> Option<usize> {
        let line = &self.buf[self.start..self.end];
        let pos = find_line_break(line)?;
        if line[pos] == b'\n' {
            // LF only
            return Some(pos + 1);
        }
        if self.start + pos + 1 >= self.end {
            // CR on the buffer edge, one more byte needed
            None
        } else if line[pos + 1] == b'\n' {
            // CRLF
            Some(pos + 2)
        } else {
            // CR only
            Some(pos + 1)
        }
    }

    /// Reads and returns a full mail line (with its terminator)
    ///
    /// An empty slice is returned on end-of-input only: a blank line still
    /// carries its terminator
    pub fn read_line(&mut self) -> Result<&[u8], std::io::Error> {
        loop {
            if let Some(len) = self.buffered_line_len() {
                let start = self.start;
                self.start += len;
                return Ok(&self.buf[start..(start + len)]);
            } else if self.end - self.start >= MAX_LINE_LEN {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "Line too long",
                ));
            }
            self.fill_buf()?;
            if self.eof {
                let start = self.start;
                self.start = self.end;
                return Ok(&self.buf[start..self.end]);
            }
        }
    }
}

impl<R: Read> Read for LineReader<R> {
    /// Drains the internal buffer, then reads through to the wrapped stream
    ///
    /// This hands the unconsumed remainder of a stream over to a codec
    /// without losing the bytes already buffered for line scanning
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, std::io::Error> {
        if self.start < self.end {
            let len = (self.end - self.start).min(buf.len());
            buf[0..len].copy_from_slice(&self.buf[self.start..(self.start + len)]);
            self.start += len;
            return Ok(len);
        }
        self.r.read(buf)
    }
}

/// Presents a sequence of owned lines as a byte stream
///
/// Lines are served verbatim: callers wanting terminators must include them
pub struct LineSource {
    lines: Vec<Vec<u8>>,
    cur: usize,
    off: usize,
}

impl LineSource {
    /// Creates the source from pre-split lines
    pub fn new<L: Into<Vec<u8>>, I: IntoIterator<Item = L>>(lines: I) -> Self {
        Self {
            lines: lines.into_iter().map(|l| l.into()).collect(),
            cur: 0,
            off: 0,
        }
    }
}

impl Read for LineSource {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, std::io::Error> {
        while let Some(line) = self.lines.get(self.cur) {
            if self.off < line.len() {
                let len = (line.len() - self.off).min(buf.len());
                buf[0..len].copy_from_slice(&line[self.off..(self.off + len)]);
                self.off += len;
                return Ok(len);
            }
            self.cur += 1;
            self.off = 0;
        }
        Ok(0)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_readline() -> Result<(), std::io::Error> {
        let data: &[u8] = b"crlf\r\ncr\rlf\n4\n\n6";
        let mut r = LineReader::new(data);
        assert_eq!(r.read_line()?, b"crlf\r\n");
        assert_eq!(r.read_line()?, b"cr\r");
        assert_eq!(r.read_line()?, b"lf\n");
        assert_eq!(r.read_line()?, b"4\n");
        assert_eq!(r.read_line()?, b"\n");
        assert_eq!(r.read_line()?, b"6");
        assert_eq!(r.read_line()?, b"");
        assert_eq!(r.read_line()?, b"");
        Ok(())
    }

    struct LameReader<R: Read>(R);
    impl<R: Read> Read for LameReader<R> {
        fn read(&mut self, buf: &mut [u8]) -> Result<usize, std::io::Error> {
            let len = buf.len().min(1);
            self.0.read(&mut buf[0..len])
        }
    }

    #[test]
    fn test_readline_lame() -> Result<(), std::io::Error> {
        let data: &[u8] = b"crlf\r\ncr\rlf\n4\n\n6";
        let mut r = LineReader::new(LameReader(data));
        assert_eq!(r.read_line()?, b"crlf\r\n");
        assert_eq!(r.read_line()?, b"cr\r");
        assert_eq!(r.read_line()?, b"lf\n");
        assert_eq!(r.read_line()?, b"4\n");
        assert_eq!(r.read_line()?, b"\n");
        assert_eq!(r.read_line()?, b"6");
        assert_eq!(r.read_line()?, b"");
        Ok(())
    }

    #[test]
    fn test_no_trailing_newline() -> Result<(), std::io::Error> {
        let data: &[u8] = b"line1\nline2";
        let mut r = LineReader::new(data);
        assert_eq!(r.read_line()?, b"line1\n");
        assert_eq!(r.read_line()?, b"line2");
        assert_eq!(r.read_line()?, b"");
        Ok(())
    }

    #[test]
    fn test_limits() -> Result<(), std::io::Error> {
        let data = [b'a'; MAX_LINE_LEN - 1].as_ref();
        let mut r = LineReader::new(data);
        assert!(r.read_line().is_ok());

        let data = [b'a'; MAX_LINE_LEN].as_ref();
        let mut r = LineReader::new(data);
        assert_eq!(
            r.read_line().unwrap_err().kind(),
            std::io::ErrorKind::InvalidData
        );

        let data = [b'a'; MAX_LINE_LEN - 1].as_ref().chain(b"\ntail".as_ref());
        let mut r = LineReader::new(data);
        assert!(r.read_line().is_ok());
        assert_eq!(r.read_line()?, b"tail");
        Ok(())
    }

    #[test]
    fn test_refill() -> Result<(), std::io::Error> {
        fn test_size(len: usize) {
            let mut data: Vec<u8> = Vec::with_capacity(len + 4);
            while data.len() < len {
                let needed = (len - data.len() - 1).min(MAX_LINE_LEN - 1);
                for _ in 0..needed {
                    data.push(b'a');
                }
                data.push(b'\n');
            }
            data.extend_from_slice(b"last");
            let mut r = LineReader::new(data.as_slice());
            let mut is_last = false;
            loop {
                let line = r.read_line().unwrap();
                if line.is_empty() {
                    break;
                }
                is_last = line == b"last";
            }
            assert!(is_last, "refill with len {} failed", len);
        }

        for len in (BUFSIZ - 4)..(BUFSIZ + 4) {
            test_size(len);
        }
        Ok(())
    }

    #[test]
    fn test_read_passthrough() -> Result<(), std::io::Error> {
        let data: &[u8] = b"head\n\nencoded body bytes";
        let mut r = LineReader::new(data);
        assert_eq!(r.read_line()?, b"head\n");
        assert_eq!(r.read_line()?, b"\n");
        let mut rest = Vec::new();
        r.read_to_end(&mut rest)?;
        assert_eq!(rest, b"encoded body bytes");
        Ok(())
    }

    #[test]
    fn test_split_eol() {
        assert_eq!(split_eol(b"asd\r\n"), (b"asd".as_ref(), b"\r\n".as_ref()));
        assert_eq!(split_eol(b"asd\n"), (b"asd".as_ref(), b"\n".as_ref()));
        assert_eq!(split_eol(b"asd\r"), (b"asd".as_ref(), b"\r".as_ref()));
        assert_eq!(split_eol(b"asd"), (b"asd".as_ref(), b"".as_ref()));
        assert_eq!(split_eol(b"\n"), (b"".as_ref(), b"\n".as_ref()));
        assert_eq!(split_eol(b""), (b"".as_ref(), b"".as_ref()));
    }

    #[test]
    fn test_line_source() -> Result<(), std::io::Error> {
        let src = LineSource::new([b"one\n".to_vec(), b"".to_vec(), b"two\r\n".to_vec()]);
        let mut r = LineReader::new(src);
        assert_eq!(r.read_line()?, b"one\n");
        assert_eq!(r.read_line()?, b"two\r\n");
        assert_eq!(r.read_line()?, b"");
        Ok(())
    }

    #[test]
    fn test_read_full() -> Result<(), std::io::Error> {
        let mut data = LameReader(b"0123456789".as_ref());
        let mut buf = [0u8; 4];
        assert_eq!(read_full(&mut data, &mut buf)?, 4);
        assert_eq!(&buf, b"0123");
        let mut buf = [0u8; 16];
        assert_eq!(read_full(&mut data, &mut buf)?, 6);
        assert_eq!(&buf[0..6], b"456789");
        assert_eq!(read_full(&mut data, &mut buf)?, 0);
        Ok(())
    }
}
