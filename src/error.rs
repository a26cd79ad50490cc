//! Error types reported by the parser and the codecs
use thiserror::Error;

/// The parse phase during which the input ran out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    /// Between a multipart header and the first delimiter
    Preamble,
    /// Inside a part body, before its terminating boundary
    Body,
    /// After the last part, while expecting the closing delimiter
    Close,
}

impl std::fmt::Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        match self {
            Region::Preamble => write!(f, "multipart preamble"),
            Region::Body => write!(f, "part body"),
            Region::Close => write!(f, "multipart close delimiter"),
        }
    }
}

#[derive(Error, Debug)]
/// Errors produced while parsing a message or transcoding a body
pub enum Error {
    /// Wrapper for [`std::io::Error`](https://doc.rust-lang.org/std/io/struct.Error.html)
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    /// The input starts with no parsable header block
    #[error("no message header could be parsed")]
    BadHeader,

    /// A multipart entity without a usable `boundary` parameter
    #[error("multipart entity lacks a boundary parameter")]
    MissingBoundary,

    /// The multipart closed before any part was found
    #[error("multipart entity contains no parts")]
    EmptyMultipart,

    /// The input ended where a boundary line was still expected
    #[error("unexpected end of input in {0}")]
    UnexpectedEof(Region),

    /// Multipart nesting beyond the configured limit
    #[error("multipart nesting exceeds the depth limit ({0})")]
    TooDeep(usize),

    /// A codec gave up on the body it was fed
    #[error("cannot decode \"{encoding}\" body: {source}")]
    Decode {
        /// The content-transfer-encoding whose codec failed
        encoding: String,
        /// The underlying failure
        source: Box<Error>,
    },

    /// A uuencoded body with no `begin` line
    #[error("uuencoded data has no begin line")]
    NoBegin,
}
