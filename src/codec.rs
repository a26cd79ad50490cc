//! Content-transfer-encoding codecs
//!
//! Each codec decodes and encodes between a bounded reader and a writer;
//! the parser stages part bodies so readers always end where the part ends
use crate::error::Error;
use crate::header::Head;
use crate::stream::{read_full, split_eol, LineReader};
use crate::trim_wsp_end;
use crate::uu::UuCodec;
use lazy_static::lazy_static;
use regex::bytes::{Captures as BinCaptures, Regex as BinRegex};
use std::io::{Read, Write};
#[allow(unused_imports)]
use tracing::{debug, error, info, instrument, warn};

/// A content-transfer-encoding codec
///
/// Both operations run until the reader reports end-of-input and never
/// consume past it
pub trait Codec {
    /// Decodes the whole input into its raw byte form
    fn decode(&self, r: &mut dyn Read, w: &mut dyn Write) -> Result<(), Error>;
    /// Encodes the whole input into wire form
    fn encode(&self, r: &mut dyn Read, w: &mut dyn Write) -> Result<(), Error>;
}

/// Maps a lowercased content-transfer-encoding name to its codec
///
/// The header, when given, provides the recommended filename the uuencode
/// encoder writes on its `begin` line. Unknown names map to `None`; the
/// parser falls back to `binary` in that case.
pub fn codec_for(encoding: &str, head: Option<&Head>) -> Option<Box<dyn Codec>> {
    Some(match encoding {
        "binary" => Box::new(BinaryCodec),
        "7bit" | "8bit" => Box::new(TextCodec),
        "base64" => Box::new(Base64Codec),
        "quoted-printable" => Box::new(QuotedPrintableCodec),
        "x-uu" | "x-uuencode" => Box::new(UuCodec::new(
            head.and_then(|h| h.get("content-disposition", 0))
                .and_then(|f| f.get_param("filename"))
                .map(|name| name.to_string()),
        )),
        _ => return None,
    })
}

/// The identity codec: bytes are carried verbatim in both directions
pub struct BinaryCodec;

impl Codec for BinaryCodec {
    fn decode(&self, r: &mut dyn Read, w: &mut dyn Write) -> Result<(), Error> {
        std::io::copy(r, w)?;
        Ok(())
    }

    fn encode(&self, r: &mut dyn Read, w: &mut dyn Write) -> Result<(), Error> {
        std::io::copy(r, w)?;
        Ok(())
    }
}

/// The `7bit` / `8bit` codec
///
/// Decoding is line oriented: CRLF (and lone CR) line breaks become LF, a
/// final unterminated line stays unterminated. Encoding emits lines as-is.
pub struct TextCodec;

impl Codec for TextCodec {
    fn decode(&self, r: &mut dyn Read, w: &mut dyn Write) -> Result<(), Error> {
        let mut lines = LineReader::new(r);
        loop {
            let raw = lines.read_line()?;
            if raw.is_empty() {
                return Ok(());
            }
            let (line, eol) = split_eol(raw);
            w.write_all(line)?;
            if !eol.is_empty() {
                w.write_all(b"\n")?;
            }
        }
    }

    fn encode(&self, r: &mut dyn Read, w: &mut dyn Write) -> Result<(), Error> {
        std::io::copy(r, w)?;
        Ok(())
    }
}

#[rustfmt::skip]
static B64LUT: &[u8] = &[
    255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, // 0-15
    255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, // 16-31
    255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255,  62, 255, 255, 255,  63, // 31-47
     52,  53,  54,  55,  56,  57,  58,  59,  60,  61, 255, 255, 255,  64, 255, 255, // 48-63
    255,   0,   1,   2,   3,   4,   5,   6,   7,   8,   9,  10,  11,  12,  13,  14, // 64-79
     15,  16,  17,  18,  19,  20,  21,  22,  23,  24,  25, 255, 255, 255, 255, 255, // 80-95
    255,  26,  27,  28,  29,  30,  31,  32,  33,  34,  35,  36,  37,  38,  39,  40, // 96-111
     41,  42,  43,  44,  45,  46,  47,  48,  49,  50,  51, 255, 255, 255, 255, 255, // 112-127

    255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, // 128-143
    255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, // 144-159
    255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, // 160-175
    255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, // 176-191
    255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, // 192-207
    255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, // 208-223
    255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, // 224-239
    255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, // 240-255
];

static B64_ALPHABET: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

/// Decoded bytes per output line (76 columns after expansion)
const B64_LINE_BYTES: usize = 57;

/// Decodes one 4-character quantum, honoring trailing `=` padding
///
/// `None` flags a malformed quantum, `Some(true)` a padded (final) one
fn decode_quantum(chunk: &[u8; 4], out: &mut Vec<u8>) -> Option<bool> {
    let b1 = B64LUT[chunk[0] as usize];
    let b2 = B64LUT[chunk[1] as usize];
    let b3 = B64LUT[chunk[2] as usize];
    let b4 = B64LUT[chunk[3] as usize];
    if (b1 | b2 | b3 | b4) & 0b1000_0000 != 0 {
        return None;
    }
    if (b1 | b2) & (1 << 6) != 0 {
        return None;
    }
    let bytes: [u8; 3] = [(b1 << 2) | (b2 >> 4), (b2 << 4) | (b3 >> 2), (b3 << 6) | b4];
    if b4 & (1 << 6) != 0 {
        if b3 & (1 << 6) != 0 {
            out.push(bytes[0]);
        } else {
            out.extend_from_slice(&bytes[0..2]);
        }
        Some(true)
    } else if b3 & (1 << 6) != 0 {
        None
    } else {
        out.extend_from_slice(&bytes);
        Some(false)
    }
}

/// The `base64` codec (RFC 1521 alphabet)
///
/// Decoding ignores whitespace and anything else outside the alphabet and
/// stops at the first padded quantum; encoding wraps output at 76 columns
pub struct Base64Codec;

impl Codec for Base64Codec {
    fn decode(&self, r: &mut dyn Read, w: &mut dyn Write) -> Result<(), Error> {
        let mut buf = [0u8; 4096];
        let mut chunk = [0u8; 4];
        let mut pos = 0usize;
        let mut dec: Vec<u8> = Vec::with_capacity(buf.len() / 4 * 3);
        let mut ugly = false;
        let mut padded = false;
        'bulk: loop {
            let got = r.read(&mut buf)?;
            if got == 0 {
                break;
            }
            for &c in &buf[0..got] {
                if B64LUT[c as usize] & 0b1000_0000 != 0 {
                    ugly |= !c.is_ascii_whitespace();
                    continue;
                }
                chunk[pos] = c;
                pos += 1;
                if pos == 4 {
                    pos = 0;
                    match decode_quantum(&chunk, &mut dec) {
                        Some(false) => {}
                        Some(true) => {
                            padded = true;
                            break 'bulk;
                        }
                        None => ugly = true,
                    }
                }
            }
            w.write_all(&dec)?;
            dec.clear();
        }
        if padded {
            // Nothing after the padding is data
            while r.read(&mut buf)? > 0 {}
        } else if pos >= 2 {
            // Unpadded tail, complete it
            chunk[3] = b'=';
            if pos == 2 {
                chunk[2] = b'=';
            }
            if decode_quantum(&chunk, &mut dec).is_none() {
                ugly = true;
            }
        } else if pos == 1 {
            ugly = true;
        }
        w.write_all(&dec)?;
        if ugly {
            warn!("base64 body contains bytes outside the alphabet");
        }
        Ok(())
    }

    fn encode(&self, r: &mut dyn Read, w: &mut dyn Write) -> Result<(), Error> {
        let mut buf = [0u8; B64_LINE_BYTES];
        loop {
            let got = read_full(r, &mut buf)?;
            if got == 0 {
                return Ok(());
            }
            let mut line: Vec<u8> = Vec::with_capacity(77);
            for chunk in buf[0..got].chunks(3) {
                let b0 = chunk[0];
                let b1 = chunk.get(1).copied().unwrap_or(0);
                let b2 = chunk.get(2).copied().unwrap_or(0);
                line.push(B64_ALPHABET[(b0 >> 2) as usize]);
                line.push(B64_ALPHABET[(((b0 & 0x3) << 4) | (b1 >> 4)) as usize]);
                line.push(if chunk.len() > 1 {
                    B64_ALPHABET[(((b1 & 0xf) << 2) | (b2 >> 6)) as usize]
                } else {
                    b'='
                });
                line.push(if chunk.len() > 2 {
                    B64_ALPHABET[(b2 & 0x3f) as usize]
                } else {
                    b'='
                });
            }
            line.push(b'\n');
            w.write_all(&line)?;
            if got < buf.len() {
                return Ok(());
            }
        }
    }
}

static QP_HEX: &[u8; 16] = b"0123456789ABCDEF";
/// Longest output line, soft break included
const QP_WIDTH: usize = 76;

/// Value of one hex digit, flagging (tolerated) lowercase
///
/// Only called on bytes the escape regex matched
fn hex_nibble(c: u8) -> (u8, bool) {
    match c {
        b'0'..=b'9' => (c - b'0', false),
        b'A'..=b'F' => (c - b'A' + 10, false),
        _ => (c - b'a' + 10, true),
    }
}

/// The `quoted-printable` codec
///
/// The decoder is intentionally lax: lowercase hex digits are tolerated
/// (and warned about), unrecognizable escapes pass through untouched
pub struct QuotedPrintableCodec;

impl Codec for QuotedPrintableCodec {
    fn decode(&self, r: &mut dyn Read, w: &mut dyn Write) -> Result<(), Error> {
        lazy_static! {
            static ref RE: BinRegex =
                BinRegex::new(r"(?-u)=([0-9A-Fa-f][0-9A-Fa-f])").unwrap();
        }
        let mut lines = LineReader::new(r);
        let mut ugly = false;
        loop {
            let raw = lines.read_line()?;
            if raw.is_empty() {
                break;
            }
            let (line, eol) = split_eol(raw);
            let mut qp = trim_wsp_end(line);
            let soft_break = if qp.ends_with(b"=") {
                qp = &qp[0..(qp.len() - 1)];
                true
            } else {
                false
            };
            let dec = RE.replace_all(qp, |caps: &BinCaptures| {
                let (hi, ugly_hi) = hex_nibble(caps[1][0]);
                let (lo, ugly_lo) = hex_nibble(caps[1][1]);
                ugly |= ugly_hi | ugly_lo;
                [(hi << 4) | lo]
            });
            w.write_all(&dec)?;
            if !soft_break && !eol.is_empty() {
                w.write_all(b"\n")?;
            }
        }
        if ugly {
            warn!("quoted-printable body uses lowercase hex escapes");
        }
        Ok(())
    }

    fn encode(&self, r: &mut dyn Read, w: &mut dyn Write) -> Result<(), Error> {
        let mut lines = LineReader::new(r);
        loop {
            let raw = lines.read_line()?;
            if raw.is_empty() {
                return Ok(());
            }
            let (line, eol) = split_eol(raw);
            let solid = trim_wsp_end(line).len();
            let mut out: Vec<u8> = Vec::with_capacity(line.len() + 8);
            let mut col = 0usize;
            for (i, &c) in line.iter().enumerate() {
                let literal = match c {
                    b'=' => false,
                    b' ' | b'\t' => i < solid,
                    33..=126 => true,
                    _ => false,
                };
                let width = if literal { 1 } else { 3 };
                if col + width >= QP_WIDTH {
                    out.extend_from_slice(b"=\n");
                    col = 0;
                }
                if literal {
                    out.push(c);
                } else {
                    out.push(b'=');
                    out.push(QP_HEX[(c >> 4) as usize]);
                    out.push(QP_HEX[(c & 0xf) as usize]);
                }
                col += width;
            }
            if !eol.is_empty() {
                out.push(b'\n');
            }
            w.write_all(&out)?;
        }
    }
}
