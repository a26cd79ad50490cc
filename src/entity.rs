//! The parsed message tree
use crate::body::Body;
use crate::header::Head;
use std::io::Write;

/// One node of the parse tree: a header plus either a decoded body (leaf)
/// or an ordered list of child entities (multipart container)
///
/// The tree is built by the parser and not mutated afterwards.
#[derive(Debug, Default)]
pub struct Entity {
    head: Head,
    body: Option<Body>,
    parts: Vec<Entity>,
    content_type: (String, String),
}

impl Entity {
    /// Creates a bodiless, childless entity around its header
    pub(crate) fn new(head: Head) -> Self {
        let (ty, sub) = head.mime_type();
        let content_type = (ty.to_string(), sub.to_string());
        Self {
            head,
            body: None,
            parts: Vec::new(),
            content_type,
        }
    }

    /// The entity header
    pub fn head(&self) -> &Head {
        &self.head
    }

    /// The decoded body; `None` on multipart containers
    pub fn body(&self) -> Option<&Body> {
        self.body.as_ref()
    }

    pub(crate) fn set_body(&mut self, body: Body) {
        self.body = Some(body);
    }

    /// The child entities, in input order; empty on leaves
    pub fn parts(&self) -> &[Entity] {
        &self.parts
    }

    /// The nth child entity, if any
    pub fn part(&self, index: usize) -> Option<&Entity> {
        self.parts.get(index)
    }

    /// Appends a child entity
    pub fn add_part(&mut self, child: Entity) {
        self.parts.push(child);
    }

    /// The content type and subtype, cached off the header
    pub fn content_type(&self) -> (&str, &str) {
        (&self.content_type.0, &self.content_type.1)
    }

    /// Whether this entity is a multipart container
    pub fn is_multipart(&self) -> bool {
        self.content_type.0 == "multipart"
    }

    /// Writes an indented one-line-per-entity listing of the tree
    ///
    /// Diagnostic only: the output is not round-trippable
    pub fn dump_skeleton(&self, w: &mut dyn Write) -> Result<(), std::io::Error> {
        self.dump_at(w, 0)
    }

    fn dump_at(&self, w: &mut dyn Write, depth: usize) -> Result<(), std::io::Error> {
        let pad = "    ".repeat(depth);
        let (ty, sub) = self.content_type();
        write!(w, "{}{}/{} <{}>", pad, ty, sub, self.head.mime_encoding())?;
        if let Some(name) = self.head.recommended_filename() {
            write!(w, " name={:?}", name)?;
        }
        match self.body() {
            Some(body) => {
                write!(w, " {} bytes", body.size()?)?;
                match body.path() {
                    Some(path) => writeln!(w, " at {}", path.display())?,
                    None => writeln!(w, " in core")?,
                }
            }
            None => writeln!(w, " {} parts", self.parts.len())?,
        }
        for part in &self.parts {
            part.dump_at(w, depth + 1)?;
        }
        Ok(())
    }
}
