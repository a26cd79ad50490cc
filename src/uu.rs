//! The `x-uu` / `x-uuencode` codec
//!
//! Wire form: a `begin <mode> <filename>` line, payload lines whose first
//! byte declares the decoded length, and a closing `end` line. The mode and
//! filename on `begin` are only ever captured, never applied.
use crate::codec::Codec;
use crate::error::Error;
use crate::stream::{read_full, split_eol, LineReader};
use lazy_static::lazy_static;
use regex::bytes::Regex as BinRegex;
use std::io::{Read, Write};
#[allow(unused_imports)]
use tracing::{debug, error, info, instrument, warn};

/// Decoded bytes per payload line
const UU_LINE_BYTES: usize = 45;

/// One payload sextet back to its byte value
#[inline]
fn uu_val(c: u8) -> u8 {
    c.wrapping_sub(32) & 0o77
}

/// One byte value to its payload character; zero is a backtick
#[inline]
fn uu_char(v: u8) -> u8 {
    if v == 0 {
        b'`'
    } else {
        32 + v
    }
}

/// Checks the declared-length byte against the line it heads
///
/// Lines failing this are not payload and get skipped
fn plausible_length(line: &[u8]) -> bool {
    match line.first() {
        Some(&b0) => (uu_val(b0) as usize + 2) / 3 == line.len() / 4,
        None => false,
    }
}

/// The uuencode codec
///
/// The decoder skips any payload-looking line containing lowercase letters
/// (valid uu output never has them; mailer junk between `begin` and `end`
/// commonly does) and any line whose length byte disagrees with its size.
pub struct UuCodec {
    filename: Option<String>,
}

impl UuCodec {
    /// Creates the codec; the filename only matters when encoding
    pub fn new(filename: Option<String>) -> Self {
        Self { filename }
    }
}

impl Codec for UuCodec {
    fn decode(&self, r: &mut dyn Read, w: &mut dyn Write) -> Result<(), Error> {
        lazy_static! {
            static ref BEGIN: BinRegex =
                BinRegex::new(r"(?-u)^begin\s*(\d*)\s*(\S*)").unwrap();
        }
        let mut lines = LineReader::new(r);
        loop {
            let raw = lines.read_line()?;
            if raw.is_empty() {
                return Err(Error::NoBegin);
            }
            let (line, _) = split_eol(raw);
            if let Some(caps) = BEGIN.captures(line) {
                debug!(
                    "uu payload begins (mode \"{}\", name \"{}\")",
                    String::from_utf8_lossy(&caps[1]),
                    String::from_utf8_lossy(&caps[2])
                );
                break;
            }
            debug!("skipping {} bytes before begin", line.len());
        }
        let mut dec: Vec<u8> = Vec::with_capacity(UU_LINE_BYTES);
        loop {
            let raw = lines.read_line()?;
            if raw.is_empty() {
                warn!("uuencoded data ends without an end line");
                return Ok(());
            }
            let (line, _) = split_eol(raw);
            if line.starts_with(b"end") {
                return Ok(());
            }
            if line.iter().any(|c| c.is_ascii_lowercase()) {
                debug!("skipping junk inside uu payload");
                continue;
            }
            if !plausible_length(line) {
                debug!("skipping uu line with inconsistent length byte");
                continue;
            }
            let declared = uu_val(line[0]) as usize;
            dec.clear();
            for quad in line[1..].chunks(4) {
                let q = [
                    uu_val(quad[0]),
                    uu_val(quad.get(1).copied().unwrap_or(b'`')),
                    uu_val(quad.get(2).copied().unwrap_or(b'`')),
                    uu_val(quad.get(3).copied().unwrap_or(b'`')),
                ];
                dec.push((q[0] << 2) | (q[1] >> 4));
                dec.push((q[1] << 4) | (q[2] >> 2));
                dec.push((q[2] << 6) | q[3]);
            }
            dec.truncate(declared);
            w.write_all(&dec)?;
        }
    }

    fn encode(&self, r: &mut dyn Read, w: &mut dyn Write) -> Result<(), Error> {
        let name = self.filename.as_deref().unwrap_or("");
        w.write_all(format!("begin 644 {}\n", name).as_bytes())?;
        let mut buf = [0u8; UU_LINE_BYTES];
        loop {
            let got = read_full(r, &mut buf)?;
            if got == 0 {
                break;
            }
            let mut line: Vec<u8> = Vec::with_capacity(62);
            line.push(uu_char(got as u8));
            for chunk in buf[0..got].chunks(3) {
                let b0 = chunk[0];
                let b1 = chunk.get(1).copied().unwrap_or(0);
                let b2 = chunk.get(2).copied().unwrap_or(0);
                line.push(uu_char(b0 >> 2));
                line.push(uu_char(((b0 & 0x3) << 4) | (b1 >> 4)));
                line.push(uu_char(((b1 & 0xf) << 2) | (b2 >> 6)));
                line.push(uu_char(b2 & 0x3f));
            }
            line.push(b'\n');
            w.write_all(&line)?;
            if got < buf.len() {
                break;
            }
        }
        w.write_all(b"end\n")?;
        Ok(())
    }
}
