//! XML accessor backed by `quick-xml`'s serde support.

use std::fmt;
use std::io::{self, BufReader, Write};

use super::{DecodeSink, EntityAccessor, EntityError, MIME_XML, write_rendered};
use crate::http::{HEADER_CONTENT_TYPE, Response, StatusCode};

/// Prepended to pretty-printed documents.
pub const XML_PROLOG: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n";

/// Reads and writes XML. The root element is named after the serialized type.
#[derive(Debug, Clone)]
pub struct XmlAccessor {
    content_type: String,
}

impl XmlAccessor {
    pub fn new(content_type: impl Into<String>) -> Self {
        Self {
            content_type: content_type.into(),
        }
    }
}

impl Default for XmlAccessor {
    fn default() -> Self {
        Self::new(MIME_XML)
    }
}

impl EntityAccessor for XmlAccessor {
    fn read(&self, body: &mut dyn io::Read, sink: &mut DecodeSink<'_>) -> Result<(), EntityError> {
        let mut de = quick_xml::de::Deserializer::from_reader(BufReader::new(body));
        sink(&mut <dyn erased_serde::Deserializer>::erase(&mut de))?;
        Ok(())
    }

    fn write(
        &self,
        resp: &mut Response,
        status: StatusCode,
        value: Option<&dyn erased_serde::Serialize>,
    ) -> Result<(), EntityError> {
        let Some(value) = value else {
            resp.write_header(status);
            return Ok(());
        };
        if resp.is_pretty_print() {
            let mut output = TextEdgeEscaper::new(Vec::new());
            let mut ser = quick_xml::se::Serializer::new(&mut output);
            ser.indent(' ', 2);
            serde::Serialize::serialize(&value, ser)?;
            let output = output.finish()?;
            write_rendered(resp, status, &self.content_type, Some(XML_PROLOG), &output)?;
            return Ok(());
        }
        resp.set_header(HEADER_CONTENT_TYPE, self.content_type.as_str());
        resp.write_header(status);
        let mut output = TextEdgeEscaper::new(resp);
        serde::Serialize::serialize(&value, quick_xml::se::Serializer::new(&mut output))?;
        output.finish()?;
        Ok(())
    }
}

fn is_xml_whitespace(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\r')
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scan {
    Text,
    // Just saw `<`; the next character tells whether a closing tag follows.
    TagOpen,
    Tag { closing: bool, last: char },
}

/// Passes serializer output through to `out`, writing whitespace at the
/// edges of text content as character references.
///
/// The `quick-xml` deserializer trims text nodes, so `"  padded  "` would
/// come back as `"padded"`. References such as `&#32;` are not trimmed and
/// unescape to the original characters. Whitespace between tags (the
/// indentation of pretty output) is left alone unless it is the whole value
/// of an element.
struct TextEdgeEscaper<W> {
    out: W,
    // Text since the last tag; held until the next tag shows what encloses it.
    text: String,
    state: Scan,
    after_start_tag: bool,
}

impl<W: Write> TextEdgeEscaper<W> {
    fn new(out: W) -> Self {
        Self {
            out,
            text: String::new(),
            state: Scan::Text,
            after_start_tag: false,
        }
    }

    fn emit(&mut self, s: &str) -> fmt::Result {
        self.out.write_all(s.as_bytes()).map_err(|_| fmt::Error)
    }

    fn emit_references(&mut self, whitespace: &str) -> fmt::Result {
        for c in whitespace.chars() {
            self.emit(&format!("&#{};", u32::from(c)))?;
        }
        Ok(())
    }

    fn push(&mut self, c: char) -> fmt::Result {
        match self.state {
            Scan::Text if c == '<' => self.state = Scan::TagOpen,
            Scan::Text => self.text.push(c),
            Scan::TagOpen => {
                self.flush_text(self.after_start_tag && c == '/')?;
                self.emit("<")?;
                self.emit(c.encode_utf8(&mut [0; 4]))?;
                let closing = matches!(c, '/' | '?' | '!');
                self.state = Scan::Tag { closing, last: c };
            }
            Scan::Tag { closing, last } => {
                self.emit(c.encode_utf8(&mut [0; 4]))?;
                if c == '>' {
                    self.after_start_tag = !closing && last != '/';
                    self.state = Scan::Text;
                } else {
                    self.state = Scan::Tag { closing, last: c };
                }
            }
        }
        Ok(())
    }

    fn flush_text(&mut self, element_value: bool) -> fmt::Result {
        let text = std::mem::take(&mut self.text);
        let core = text.trim_matches(is_xml_whitespace);
        if core.is_empty() {
            return if element_value {
                self.emit_references(&text)
            } else {
                self.emit(&text)
            };
        }
        let start = text.len() - text.trim_start_matches(is_xml_whitespace).len();
        let end = start + core.len();
        self.emit_references(&text[..start])?;
        self.emit(core)?;
        self.emit_references(&text[end..])
    }

    fn finish(mut self) -> io::Result<W> {
        let pending_open = self.state == Scan::TagOpen;
        let mut result = self.flush_text(false);
        if pending_open && result.is_ok() {
            result = self.emit("<");
        }
        match result {
            Ok(()) => Ok(self.out),
            Err(fmt::Error) => Err(io::Error::other("unable to write XML output")),
        }
    }
}

impl<W: Write> fmt::Write for TextEdgeEscaper<W> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        s.chars().try_for_each(|c| self.push(c))
    }
}
