//! Tolerant RFC 822 header parsing and MIME field accessors
use crate::error::Error;
use crate::stream::{split_eol, LineReader};
use crate::{trim_wsp, trim_wsp_end, WSP};
use std::io::Read;
#[allow(unused_imports)]
use tracing::{debug, error, info, instrument, warn};

/// Parameters whose value is never case-folded
///
/// `boundary` comparison is byte-exact per RFC 1521; filenames keep their
/// case because they feed caller-visible naming
const CASED_PARAMS: &[&str] = &["boundary", "filename", "name"];

#[derive(Debug, Default)]
/// A header field currently being parsed
struct TmpField {
    name: String,
    value: Vec<u8>,
    valid: bool,
}

impl TmpField {
    /// Starts a field off its first line
    fn begin(line: &[u8]) -> Self {
        let mut ret = Self {
            name: String::new(),
            value: Vec::new(),
            valid: true,
        };
        match line.iter().position(|v| *v == b':') {
            Some(pos) => {
                let (name, value) = line.split_at(pos);
                ret.name = String::from_utf8_lossy(trim_wsp_end(name))
                    .to_ascii_lowercase();
                ret.update_value(&value[1..]);
            }
            None => ret.valid = false,
        }
        ret
    }

    /// Appends a continuation line (*unfolding*)
    fn unfold(&mut self, line: &[u8]) {
        if self.valid {
            self.update_value(line);
        }
    }

    fn update_value(&mut self, value: &[u8]) {
        let newvalue = trim_wsp(value);
        if !newvalue.is_empty() {
            if !self.value.is_empty() {
                self.value.push(b' ');
            }
            self.value.extend_from_slice(newvalue);
        }
    }

    /// Maps the accumulated value bytes into a printable string
    fn printable_value(&self) -> String {
        self.value
            .iter()
            .map(|c| {
                if (1..=126).contains(c) {
                    *c as char
                } else {
                    char::REPLACEMENT_CHARACTER
                }
            })
            .collect()
    }

    /// Splits a structured field body into its value and parameter list
    ///
    /// This is an intentionally lax walk: parameters without a value and
    /// quoted-strings with unquoted tails are accepted the way MUAs do
    fn body_structured(&self) -> (String, Vec<(String, String)>) {
        let body = self.printable_value();
        let (value, mut remaining) = match body.split_once(';') {
            Some((value, params)) => (value.to_string(), params),
            None => (body, ""),
        };

        let mut params: Vec<(String, String)> = Vec::new();
        while !remaining.is_empty() {
            let (attr, mut rem) = remaining
                .split_once('=')
                .unwrap_or((remaining, ""));

            // Params without a value are illegal but generally disregarded
            let mut attr = attr.to_lowercase();
            while let Some((naked, tail)) = attr.split_once(';') {
                params.push((naked.trim().to_string(), String::new()));
                attr = tail.to_string();
            }
            let attr = attr.trim().to_string();

            rem = rem.trim_start();
            let mut val = String::new();
            if rem.starts_with('"') {
                // A very tolerant quoted-string decoder
                let mut last_was_backslash = false;
                let mut chars = rem[1..].chars();
                for c in chars.by_ref() {
                    if c == '\\' {
                        if !last_was_backslash {
                            last_was_backslash = true;
                            continue;
                        }
                    } else if c == '"' && !last_was_backslash {
                        break;
                    }
                    last_was_backslash = false;
                    val.push(c);
                }
                rem = chars.as_str().trim_start();
            }

            // Token values and quoted-string tails
            let (token, tail) = rem.split_once(';').unwrap_or((rem, ""));
            remaining = tail;
            val.push_str(token);

            if CASED_PARAMS.contains(&attr.as_str()) {
                params.push((attr, val));
            } else {
                let val = val
                    .to_lowercase()
                    .split_whitespace()
                    .collect::<Vec<&str>>()
                    .join(" ");
                params.push((attr, val));
            }
        }

        let value = value
            .to_lowercase()
            .split_whitespace()
            .collect::<Vec<&str>>()
            .join(" ");
        (value, params)
    }
}

#[derive(Debug, Default, Clone)]
/// A complete header field
pub struct Field {
    /// The field name (lowercased)
    pub name: String,
    /// The field body; lowercased and whitespace-packed for the structured
    /// `content-*` fields, whitespace-packed only otherwise
    pub value: String,
    /// The parameters following the value as a key/value list
    pub params: Vec<(String, String)>,
    /// Indicates if the field could be parsed at all
    ///
    /// When false, none of the other fields have sense
    pub valid: bool,
}

impl Field {
    /// Returns the first parameter matching `name`
    pub fn get_param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|p| p.0 == name)
            .map(|p| p.1.as_str())
    }
}

impl From<TmpField> for Field {
    fn from(tmp: TmpField) -> Self {
        if !tmp.valid {
            return Self::default();
        }
        let structured = [
            "content-type",
            "content-disposition",
            "content-transfer-encoding",
        ];
        let (value, params) = if structured.contains(&tmp.name.as_str()) {
            tmp.body_structured()
        } else {
            let value = tmp
                .printable_value()
                .split_whitespace()
                .collect::<Vec<&str>>()
                .join(" ");
            (value, Vec::new())
        };
        Self {
            name: tmp.name,
            value,
            params,
            valid: true,
        }
    }
}

#[derive(Debug, Default, Clone)]
/// The parsed header block of one entity
pub struct Head {
    fields: Vec<Field>,
}

impl Head {
    /// Reads header lines through the blank separator (or end of input)
    ///
    /// A block with zero fields is acceptable for multipart parts whose body
    /// starts right away; an immediate end-of-input is not a header at all
    /// and fails with [`Error::BadHeader`]
    pub fn read<R: Read>(r: &mut LineReader<R>) -> Result<Self, Error> {
        let mut fields: Vec<Field> = Vec::new();
        let mut current: Option<TmpField> = None;
        let mut seen_input = false;
        loop {
            let raw = r.read_line()?;
            if raw.is_empty() {
                if !seen_input {
                    return Err(Error::BadHeader);
                }
                break;
            }
            seen_input = true;
            let (line, _) = split_eol(raw);
            if line.is_empty() {
                // Headers completed
                break;
            }
            match current.as_mut() {
                Some(field) if line.first().is_some_and(|b| WSP.contains(b)) => {
                    debug!("unfolding header: {}", field.name);
                    field.unfold(line);
                    continue;
                }
                _ => {}
            }
            if let Some(done) = current.take() {
                let field: Field = done.into();
                debug!("header complete: {:?}", field);
                fields.push(field);
            }
            current = Some(TmpField::begin(line));
        }
        if let Some(done) = current.take() {
            let field: Field = done.into();
            debug!("header complete: {:?}", field);
            fields.push(field);
        }
        Ok(Self { fields })
    }

    /// Returns whether the block contains no fields at all
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// All fields, in input order
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Retrieves the nth field matching `name` (lowercase), if any
    pub fn get(&self, name: &str, index: usize) -> Option<&Field> {
        self.fields.iter().filter(|f| f.name == name).nth(index)
    }

    /// The content type and subtype pair
    ///
    /// Defaults to `("text", "plain")` when the field is absent or broken
    pub fn mime_type(&self) -> (&str, &str) {
        let full = self
            .get("content-type", 0)
            .filter(|f| f.valid)
            .map(|f| f.value.as_str())
            .filter(|v| !v.is_empty())
            .unwrap_or("text/plain");
        match full.split_once('/') {
            Some((ty, sub)) => (ty.trim(), sub.trim()),
            None => (full, ""),
        }
    }

    /// The content-transfer-encoding, lowercased
    ///
    /// Defaults to `"binary"` when absent, so bodies without a declared
    /// encoding pass through untouched
    pub fn mime_encoding(&self) -> &str {
        self.get("content-transfer-encoding", 0)
            .map(|f| f.value.as_str())
            .filter(|v| !v.is_empty())
            .unwrap_or("binary")
    }

    /// The multipart boundary parameter, byte-exact, if present and nonempty
    pub fn multipart_boundary(&self) -> Option<&str> {
        self.get("content-type", 0)
            .and_then(|f| f.get_param("boundary"))
            .filter(|b| !b.is_empty())
    }

    /// The name under which this part asks to be saved, in MUA preference
    /// order: `content-disposition` `filename`, then `content-type` `name`
    pub fn recommended_filename(&self) -> Option<&str> {
        self.get("content-disposition", 0)
            .and_then(|f| f.get_param("filename"))
            .filter(|n| !n.is_empty())
            .or_else(|| {
                self.get("content-type", 0)
                    .and_then(|f| f.get_param("name"))
                    .filter(|n| !n.is_empty())
            })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn read_head(raw: &[u8]) -> Head {
        Head::read(&mut LineReader::new(raw)).unwrap()
    }

    #[test]
    fn test_field_basic() {
        let head = read_head(b"Subject : so   many \t spaces \n\n");
        let field = head.get("subject", 0).unwrap();
        assert!(field.valid);
        assert_eq!(field.value, "so many spaces");
        assert!(field.params.is_empty());
    }

    #[test]
    fn test_field_unfold() {
        let head = read_head(b"X-Folded: one\n\ttwo\n   three\nNext: v\n\n");
        assert_eq!(head.get("x-folded", 0).unwrap().value, "one two three");
        assert_eq!(head.get("next", 0).unwrap().value, "v");
    }

    #[test]
    fn test_field_invalid() {
        let head = read_head(b"not a header line\n\n");
        assert!(!head.fields()[0].valid);
        assert_eq!(head.mime_type(), ("text", "plain"));
    }

    #[test]
    fn test_structured_params() {
        let head = read_head(
            b"Content-Type: Multipart/Mixed; Boundary=\"Outer Rim\"; naked;\n\
              \tcharset = US-ASCII\n\n",
        );
        assert_eq!(head.mime_type(), ("multipart", "mixed"));
        assert_eq!(head.multipart_boundary(), Some("Outer Rim"));
        let ct = head.get("content-type", 0).unwrap();
        assert_eq!(ct.get_param("naked"), Some(""));
        assert_eq!(ct.get_param("charset"), Some("us-ascii"));
    }

    #[test]
    fn test_quoted_params() {
        let head = read_head(
            b"Content-Disposition: attachment; filename=\"Semi;Colon \\\"Q\\\".Bin\"\n\n",
        );
        assert_eq!(head.recommended_filename(), Some("Semi;Colon \"Q\".Bin"));
    }

    #[test]
    fn test_filename_fallback() {
        let head = read_head(b"Content-Type: image/gif; name=3d-EYE.gif\n\n");
        assert_eq!(head.recommended_filename(), Some("3d-EYE.gif"));
        let head = read_head(
            b"Content-Type: image/gif; name=ct.gif\n\
              Content-Disposition: inline; filename=cd.gif\n\n",
        );
        assert_eq!(head.recommended_filename(), Some("cd.gif"));
    }

    #[test]
    fn test_encoding_default() {
        let head = read_head(b"Content-Type: text/plain\n\n");
        assert_eq!(head.mime_encoding(), "binary");
        let head = read_head(b"Content-Transfer-Encoding: BASE64\n\n");
        assert_eq!(head.mime_encoding(), "base64");
    }

    #[test]
    fn test_get_indexed() {
        let head = read_head(b"Received: one\nReceived: two\n\n");
        assert_eq!(head.get("received", 0).unwrap().value, "one");
        assert_eq!(head.get("received", 1).unwrap().value, "two");
        assert!(head.get("received", 2).is_none());
    }

    #[test]
    fn test_empty_block() {
        let head = read_head(b"\nbody follows\n");
        assert!(head.is_empty());
        assert_eq!(head.mime_type(), ("text", "plain"));
        assert_eq!(head.mime_encoding(), "binary");
    }

    #[test]
    fn test_no_input() {
        assert!(matches!(
            Head::read(&mut LineReader::new(b"".as_ref())),
            Err(Error::BadHeader)
        ));
    }

    #[test]
    fn test_eof_terminates() {
        let head = read_head(b"Content-Type: text/plain");
        assert_eq!(head.mime_type(), ("text", "plain"));
    }
}
