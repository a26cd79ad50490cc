//! MIME message parser
//!
//! Turns an RFC 822 / RFC 1521 byte stream into a tree of [`Entity`] nodes
//! (headers plus decoded bodies), staging encoded part bodies through
//! temporary files so the transfer-encoding codecs always see bounded,
//! rewindable input.

#![warn(missing_docs)]
pub mod body;
pub mod codec;
pub mod entity;
pub mod error;
pub mod header;
pub mod stream;
pub mod uu;

pub use body::Body;
pub use entity::Entity;
pub use error::{Error, Region};
pub use header::{Field, Head};

use codec::Codec;
use std::fs::File;
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use stream::{split_eol, LineReader};
#[allow(unused_imports)]
use tracing::{debug, error, info, instrument, warn};

pub(crate) const WSP: &[u8] = &[b' ', b'\t'];

#[inline]
/// Removes whitespace from the beginning of the slice
pub(crate) fn trim_wsp_start(bytes: &[u8]) -> &[u8] {
    let mut ret = bytes;
    while let Some(v) = ret.first() {
        if WSP.contains(v) {
            ret = &ret[1..];
            continue;
        }
        break;
    }
    ret
}

#[inline]
/// Removes whitespace from the end of the slice
pub(crate) fn trim_wsp_end(bytes: &[u8]) -> &[u8] {
    let mut ret = bytes;
    while let Some(v) = ret.last() {
        if WSP.contains(v) {
            ret = &ret[0..(ret.len() - 1)];
            continue;
        }
        break;
    }
    ret
}

#[inline]
/// Removes whitespace from both sides of the slice
pub(crate) fn trim_wsp(bytes: &[u8]) -> &[u8] {
    trim_wsp_end(trim_wsp_start(bytes))
}

/// What to do with a `message/rfc822` leaf
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NestedMessage {
    /// Keep it as an opaque leaf
    #[default]
    Off,
    /// Reparse it; the inner message becomes the sole child of the envelope
    Nest,
    /// Reparse it; the inner message replaces the envelope entirely
    Replace,
}

/// How a part body ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Terminal {
    /// On the enclosing delimiter: a sibling part follows
    Delim,
    /// On the enclosing close delimiter: the multipart is done
    Close,
    /// The input ran out
    Eof,
}

/// The `--boundary` / `--boundary--` markers of one multipart level
struct Boundary {
    delim: Vec<u8>,
    close: Vec<u8>,
}

impl Boundary {
    fn new(raw: &str) -> Self {
        Self {
            delim: format!("--{}", raw).into_bytes(),
            close: format!("--{}--", raw).into_bytes(),
        }
    }

    /// Byte-exact comparison against a fully stripped line
    fn classify(&self, line: &[u8]) -> Option<Terminal> {
        if line == self.delim.as_slice() {
            Some(Terminal::Delim)
        } else if line == self.close.as_slice() {
            Some(Terminal::Close)
        } else {
            None
        }
    }
}

/// Copies body lines out until the enclosing boundary line
///
/// The line terminator preceding a boundary belongs to the boundary, not to
/// the payload: each terminator is held back for one line and only replayed
/// once the next line turns out not to be a boundary. Payload bytes are
/// otherwise preserved exactly.
fn parse_to_bound<R: Read, W: Write>(
    bound: &Boundary,
    r: &mut LineReader<R>,
    w: &mut W,
) -> Result<Terminal, Error> {
    let mut held: &'static [u8] = b"";
    loop {
        let raw = r.read_line()?;
        if raw.is_empty() {
            return Err(Error::UnexpectedEof(Region::Body));
        }
        let (line, eol) = split_eol(raw);
        if let Some(state) = bound.classify(line) {
            return Ok(state);
        }
        w.write_all(held)?;
        w.write_all(line)?;
        held = eol;
    }
}

/// Discards everything up to the first delimiter of the multipart
fn parse_preamble<R: Read>(inner: &Boundary, r: &mut LineReader<R>) -> Result<(), Error> {
    loop {
        let raw = r.read_line()?;
        if raw.is_empty() {
            return Err(Error::UnexpectedEof(Region::Preamble));
        }
        let (line, _) = split_eol(raw);
        match inner.classify(line) {
            Some(Terminal::Delim) => return Ok(()),
            Some(_) => return Err(Error::EmptyMultipart),
            None => debug!("[invisible] {}", String::from_utf8_lossy(line)),
        }
    }
}

/// Discards everything after a close delimiter, up to the enclosing
/// boundary (or end of input at the top level)
fn parse_epilogue<R: Read>(
    outer: Option<&Boundary>,
    r: &mut LineReader<R>,
) -> Result<Terminal, Error> {
    loop {
        let raw = r.read_line()?;
        if raw.is_empty() {
            return Ok(Terminal::Eof);
        }
        let (line, _) = split_eol(raw);
        if let Some(state) = outer.and_then(|bound| bound.classify(line)) {
            return Ok(state);
        }
        debug!("[invisible] {}", String::from_utf8_lossy(line));
    }
}

/// Adds the encoding name to whatever a codec choked on
fn decode_error(encoding: &str, e: Error) -> Error {
    match e {
        Error::Io(e) => Error::Io(e),
        other => Error::Decode {
            encoding: encoding.to_string(),
            source: Box::new(other),
        },
    }
}

/// The message parser
///
/// Holds the parse configuration and drives the recursive descent over the
/// multipart grammar. A single value can parse any number of streams.
pub struct Parser {
    body_policy: Box<dyn Fn(&Head) -> Result<Body, Error>>,
    nested_mode: NestedMessage,
    max_depth: usize,
    last_head: Option<Head>,
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser {
    /// Creates a parser with in-memory body sinks, nested-message reparsing
    /// off and a multipart depth limit of 32
    pub fn new() -> Self {
        Self {
            body_policy: Box::new(|_| Ok(Body::memory())),
            nested_mode: NestedMessage::default(),
            max_depth: 32,
            last_head: None,
        }
    }

    /// Replaces the body allocation policy
    ///
    /// The policy is consulted once per leaf, with the leaf's header, and
    /// decides where its decoded bytes land
    pub fn body_policy<F>(mut self, policy: F) -> Self
    where
        F: Fn(&Head) -> Result<Body, Error> + 'static,
    {
        self.body_policy = Box::new(policy);
        self
    }

    /// Selects the `message/rfc822` reparse behavior
    pub fn nested_message(mut self, mode: NestedMessage) -> Self {
        self.nested_mode = mode;
        self
    }

    /// Caps the multipart nesting depth (minimum 1)
    pub fn max_depth(mut self, limit: usize) -> Self {
        self.max_depth = limit.max(1);
        self
    }

    /// The first header parsed by the most recent [`parse`](Self::parse)
    /// call, kept around for post-mortems when the parse failed
    pub fn last_head(&self) -> Option<&Head> {
        self.last_head.as_ref()
    }

    /// Parses one message from the stream into an entity tree
    #[instrument(skip_all)]
    pub fn parse<R: Read>(&mut self, input: R) -> Result<Entity, Error> {
        self.last_head = None;
        let mut r = LineReader::new(input);
        let (entity, _) = self.parse_part(&mut r, None, 1)?;
        Ok(entity)
    }

    /// Parses one part: header, then body or child parts
    ///
    /// Returns the entity along with how its body ended relative to the
    /// enclosing boundary
    fn parse_part<R: Read>(
        &mut self,
        r: &mut LineReader<R>,
        outer: Option<&Boundary>,
        depth: usize,
    ) -> Result<(Entity, Terminal), Error> {
        if depth > self.max_depth {
            return Err(Error::TooDeep(self.max_depth));
        }
        let head = Head::read(r)?;
        if self.last_head.is_none() {
            self.last_head = Some(head.clone());
        }
        let mut entity = Entity::new(head);
        debug!("part begins: {:?}", entity.content_type());

        if entity.content_type().0 == "multipart" {
            let inner = {
                let raw = entity
                    .head()
                    .multipart_boundary()
                    .ok_or(Error::MissingBoundary)?;
                Boundary::new(raw)
            };
            parse_preamble(&inner, r)?;
            loop {
                let (child, state) = self.parse_part(r, Some(&inner), depth + 1)?;
                if state == Terminal::Eof {
                    return Err(Error::UnexpectedEof(Region::Close));
                }
                entity.add_part(child);
                if state == Terminal::Close {
                    break;
                }
            }
            let state = parse_epilogue(outer, r)?;
            debug!("multipart ends with {} parts", entity.parts().len());
            return Ok((entity, state));
        }

        // Leaf: pick the codec off the declared encoding
        let encoding = entity.head().mime_encoding().to_string();
        let codec: Box<dyn Codec> = match codec::codec_for(&encoding, Some(entity.head())) {
            Some(codec) => codec,
            None => {
                warn!(
                    "unsupported content-transfer-encoding \"{}\", using binary",
                    encoding
                );
                Box::new(codec::BinaryCodec)
            }
        };

        // Bounded parts are staged through a temp file so the codec can
        // consume to end-of-input; an unbounded part IS the rest of the
        // stream
        let mut staged: File;
        let state: Terminal;
        let enc: &mut dyn Read = match outer {
            Some(bound) => {
                let mut spool = BufWriter::new(tempfile::tempfile()?);
                state = parse_to_bound(bound, r, &mut spool)?;
                staged = spool
                    .into_inner()
                    .map_err(|e| Error::Io(e.into_error()))?;
                staged.seek(SeekFrom::Start(0))?;
                &mut staged
            }
            None => {
                state = Terminal::Eof;
                r
            }
        };

        if entity.content_type() == ("message", "rfc822")
            && self.nested_mode != NestedMessage::Off
        {
            // Decode the envelope body, then parse it as a message of its own
            let mut nested_raw = tempfile::tempfile()?;
            {
                let mut w = BufWriter::new(&mut nested_raw);
                codec
                    .decode(enc, &mut w)
                    .map_err(|e| decode_error(&encoding, e))?;
                w.flush()?;
            }
            nested_raw.seek(SeekFrom::Start(0))?;
            let mut nested = LineReader::new(nested_raw);
            let (inner_entity, _) = self.parse_part(&mut nested, None, depth + 1)?;
            match self.nested_mode {
                NestedMessage::Replace => entity = inner_entity,
                _ => entity.add_part(inner_entity),
            }
        } else {
            let mut body = (self.body_policy)(entity.head())?;
            let textlike = matches!(entity.content_type().0, "text" | "message");
            body.set_binary(!textlike);
            {
                let mut w = body.open_write()?;
                codec
                    .decode(enc, &mut w)
                    .map_err(|e| decode_error(&encoding, e))?;
                w.flush()?;
            }
            entity.set_body(body);
        }
        Ok((entity, state))
    }
}
