//! The iRODS XML dialect: packed-struct bodies with era-dependent escaping.
//!
//! Message bodies are trees of named elements without attributes. Two server
//! eras escape text differently:
//!
//! - **Standard** (server release >= 4.3): `&` `<` `>` `"` `'` are escaped
//!   with the usual XML entities; `&apos;` decodes to an apostrophe.
//! - **Legacy** (older servers): the apostrophe is NOT escaped; instead the
//!   backtick `` ` `` is transmitted as `&apos;`, and `&apos;` decodes back
//!   to a backtick.
//!
//! The era is picked from the `RODS_VERSION` message. Until the server
//! version is known, encoders use [`XmlEra::Legacy`], which every server era
//! accepts.
//!
//! # Example
//!
//! ```rust
//! use rods_proto::irods::xml::{escape, unescape, XmlEra};
//!
//! assert_eq!(escape("a<b", XmlEra::Standard), "a&lt;b");
//! assert_eq!(unescape("a&apos;b", XmlEra::Legacy).unwrap(), "a`b");
//! ```

use rods_platform::{RodsError, RodsResult};

/// The escaping rules in force for one side of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XmlEra {
    /// Strict escape set used by servers from release 4.3 on.
    Standard,
    /// Quasi-XML escape set used by older servers.
    Legacy,
}

/// Escapes text for embedding in a packed-struct element.
pub fn escape(text: &str, era: XmlEra) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' if era == XmlEra::Standard => out.push_str("&apos;"),
            '`' if era == XmlEra::Legacy => out.push_str("&apos;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Unescapes element text.
///
/// # Errors
///
/// Returns [`RodsError::Malformed`] on an unknown or unterminated entity
/// reference.
pub fn unescape(text: &str, era: XmlEra) -> RodsResult<String> {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];
        let end = rest.find(';').ok_or_else(|| {
            RodsError::Malformed(format!("unterminated entity reference in '{}'", text))
        })?;
        let entity = &rest[1..end];
        match entity {
            "amp" => out.push('&'),
            "lt" => out.push('<'),
            "gt" => out.push('>'),
            "quot" => out.push('"'),
            "apos" => out.push(match era {
                XmlEra::Standard => '\'',
                XmlEra::Legacy => '`',
            }),
            _ => {
                // Tolerate numeric character references from either era.
                let code = if let Some(hex) = entity.strip_prefix("#x") {
                    u32::from_str_radix(hex, 16).ok()
                } else if let Some(dec) = entity.strip_prefix('#') {
                    dec.parse::<u32>().ok()
                } else {
                    None
                };
                match code.and_then(char::from_u32) {
                    Some(ch) => out.push(ch),
                    None => {
                        return Err(RodsError::Malformed(format!(
                            "unknown entity reference '&{};'",
                            entity
                        )))
                    }
                }
            }
        }
        rest = &rest[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

/// A parsed packed-struct element.
///
/// An element holds either child elements or text, never both; whitespace
/// between child elements is ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlNode {
    /// Element name, e.g. `MsgHeader_PI`.
    pub name: String,
    /// Unescaped text content (empty when the element has children).
    pub text: String,
    /// Child elements in document order.
    pub children: Vec<XmlNode>,
}

impl XmlNode {
    /// Parses one element from `input`.
    ///
    /// Trailing bytes after the root element are rejected; the framing layer
    /// already sliced the body to its declared length.
    pub fn parse(input: &[u8], era: XmlEra) -> RodsResult<XmlNode> {
        let text = std::str::from_utf8(input)
            .map_err(|_| RodsError::Malformed("packed struct is not valid UTF-8".to_string()))?;
        let mut parser = Parser { rest: text, era };
        parser.skip_whitespace();
        let node = parser.element()?;
        parser.skip_whitespace();
        if !parser.rest.is_empty() {
            return Err(RodsError::Malformed(format!(
                "trailing bytes after element '{}'",
                node.name
            )));
        }
        Ok(node)
    }

    /// Returns the first child with the given name.
    pub fn child(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Returns all children with the given name, in document order.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlNode> {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Returns the text of a required child element.
    pub fn text_of(&self, name: &str) -> RodsResult<&str> {
        self.child(name)
            .map(|c| c.text.as_str())
            .ok_or_else(|| {
                RodsError::Malformed(format!("missing element '{}' in '{}'", name, self.name))
            })
    }

    /// Returns the text of an optional child element.
    pub fn opt_text_of(&self, name: &str) -> Option<&str> {
        self.child(name).map(|c| c.text.as_str())
    }

    /// Parses a required child element as `i32`.
    pub fn i32_of(&self, name: &str) -> RodsResult<i32> {
        parse_number(self.text_of(name)?, name)
    }

    /// Parses a required child element as `i64`.
    pub fn i64_of(&self, name: &str) -> RodsResult<i64> {
        parse_number(self.text_of(name)?, name)
    }

    /// Parses a required child element as `u32`.
    pub fn u32_of(&self, name: &str) -> RodsResult<u32> {
        parse_number(self.text_of(name)?, name)
    }

    /// Errors if this element contains a child not in `allowed`.
    ///
    /// Used by structs with a closed field set, such as the frame header.
    pub fn deny_unknown(&self, allowed: &[&str]) -> RodsResult<()> {
        for child in &self.children {
            if !allowed.contains(&child.name.as_str()) {
                return Err(RodsError::Malformed(format!(
                    "unexpected element '{}' in '{}'",
                    child.name, self.name
                )));
            }
        }
        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(text: &str, name: &str) -> RodsResult<T> {
    text.trim()
        .parse()
        .map_err(|_| RodsError::Malformed(format!("element '{}' is not a number: '{}'", name, text)))
}

struct Parser<'a> {
    rest: &'a str,
    era: XmlEra,
}

impl<'a> Parser<'a> {
    fn skip_whitespace(&mut self) {
        self.rest = self.rest.trim_start_matches(['\n', '\r', '\t', ' ']);
    }

    fn element(&mut self) -> RodsResult<XmlNode> {
        let name = self.open_tag()?;
        let mut node = XmlNode {
            name,
            text: String::new(),
            children: Vec::new(),
        };

        // Child elements or raw text, decided by the first non-space byte.
        loop {
            if self.rest.starts_with("</") {
                break;
            }
            let probe = self.rest.trim_start_matches(['\n', '\r', '\t', ' ']);
            if probe.starts_with("</") {
                self.rest = probe;
                break;
            }
            if probe.starts_with('<') {
                self.rest = probe;
                node.children.push(self.element()?);
            } else {
                let end = self.rest.find('<').ok_or_else(|| {
                    RodsError::Malformed(format!("unterminated element '{}'", node.name))
                })?;
                node.text = unescape(&self.rest[..end], self.era)?;
                self.rest = &self.rest[end..];
            }
        }

        self.close_tag(&node.name)?;
        Ok(node)
    }

    fn open_tag(&mut self) -> RodsResult<String> {
        if !self.rest.starts_with('<') {
            return Err(RodsError::Malformed(format!(
                "expected element, found '{}'",
                truncate(self.rest)
            )));
        }
        let end = self
            .rest
            .find('>')
            .ok_or_else(|| RodsError::Malformed("unterminated open tag".to_string()))?;
        let name = &self.rest[1..end];
        if name.is_empty()
            || name.starts_with('/')
            || name.contains(['<', ' ', '/'])
        {
            return Err(RodsError::Malformed(format!("invalid tag '<{}>'", name)));
        }
        self.rest = &self.rest[end + 1..];
        Ok(name.to_string())
    }

    fn close_tag(&mut self, name: &str) -> RodsResult<()> {
        let expected = format!("</{}>", name);
        if let Some(stripped) = self.rest.strip_prefix(expected.as_str()) {
            self.rest = stripped;
            Ok(())
        } else {
            Err(RodsError::Malformed(format!(
                "expected '{}', found '{}'",
                expected,
                truncate(self.rest)
            )))
        }
    }
}

fn truncate(s: &str) -> &str {
    &s[..s.len().min(24)]
}

/// Incremental writer for packed-struct bodies.
///
/// # Example
///
/// ```rust
/// use rods_proto::irods::xml::{PackedStructWriter, XmlEra};
///
/// let mut w = PackedStructWriter::new("CS_NEG_PI", XmlEra::Standard);
/// w.tag_i32("status", 1);
/// w.tag("result", "CS_NEG_USE_TCP");
/// assert_eq!(
///     String::from_utf8(w.finish()).unwrap(),
///     "<CS_NEG_PI><status>1</status><result>CS_NEG_USE_TCP</result></CS_NEG_PI>"
/// );
/// ```
#[derive(Debug)]
pub struct PackedStructWriter {
    buf: String,
    root: &'static str,
    era: XmlEra,
}

impl PackedStructWriter {
    /// Starts a packed struct with the given root element.
    pub fn new(root: &'static str, era: XmlEra) -> Self {
        let mut buf = String::with_capacity(128);
        buf.push('<');
        buf.push_str(root);
        buf.push('>');
        Self { buf, root, era }
    }

    /// Writes a text element.
    pub fn tag(&mut self, name: &str, value: &str) {
        self.buf.push('<');
        self.buf.push_str(name);
        self.buf.push('>');
        self.buf.push_str(&escape(value, self.era));
        self.buf.push_str("</");
        self.buf.push_str(name);
        self.buf.push('>');
    }

    /// Writes an `i32` element.
    pub fn tag_i32(&mut self, name: &str, value: i32) {
        self.tag(name, &value.to_string());
    }

    /// Writes an `i64` element.
    pub fn tag_i64(&mut self, name: &str, value: i64) {
        self.tag(name, &value.to_string());
    }

    /// Opens a nested element; close it with [`PackedStructWriter::close`].
    pub fn open(&mut self, name: &str) {
        self.buf.push('<');
        self.buf.push_str(name);
        self.buf.push('>');
    }

    /// Closes a nested element opened with [`PackedStructWriter::open`].
    pub fn close(&mut self, name: &str) {
        self.buf.push_str("</");
        self.buf.push_str(name);
        self.buf.push('>');
    }

    /// Closes the root element and returns the body bytes.
    pub fn finish(mut self) -> Vec<u8> {
        self.buf.push_str("</");
        self.buf.push_str(self.root);
        self.buf.push('>');
        self.buf.into_bytes()
    }
}
