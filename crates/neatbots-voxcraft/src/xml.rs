//! Minimal XML plumbing shared by the Voxcraft file formats
//!
//! Voxcraft files are small, shallow trees whose interesting content is
//! element text. Reading is done as a flat walk over open/text/close nodes
//! with the current element path; writing goes through a tiny indenting
//! writer so VXA and VXD rendering read like the documents they produce.

use std::fmt::Display;

use quick_xml::escape::{escape, EscapeError};
use quick_xml::events::Event;
use quick_xml::Reader;

/// One step of a document walk. `path` holds the element names from the root
/// down to (and including) the current element.
#[derive(Debug)]
pub(crate) enum XmlNode<'a> {
    Open { path: &'a [String] },
    Text { path: &'a [String], text: &'a str },
    Close,
}

/// Errors produced while walking a document
#[derive(Debug, thiserror::Error)]
pub enum XmlError {
    #[error("malformed XML: {0}")]
    Syntax(#[from] quick_xml::Error),
    #[error("invalid XML escape: {0}")]
    Escape(#[from] EscapeError),
}

/// Walk every element of `xml` in document order
pub(crate) fn walk<F>(xml: &str, mut visit: F) -> Result<(), XmlError>
where
    F: FnMut(XmlNode<'_>),
{
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut path: Vec<String> = Vec::new();
    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                path.push(String::from_utf8_lossy(e.name().as_ref()).into_owned());
                visit(XmlNode::Open { path: &path });
            }
            Event::Empty(e) => {
                path.push(String::from_utf8_lossy(e.name().as_ref()).into_owned());
                visit(XmlNode::Open { path: &path });
                visit(XmlNode::Close);
                path.pop();
            }
            Event::End(_) => {
                visit(XmlNode::Close);
                path.pop();
            }
            Event::Text(t) => {
                let text = t.unescape()?;
                if !text.is_empty() {
                    visit(XmlNode::Text {
                        path: &path,
                        text: &text,
                    });
                }
            }
            Event::CData(c) => {
                let text = String::from_utf8_lossy(&c).into_owned();
                visit(XmlNode::Text {
                    path: &path,
                    text: text.trim(),
                });
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(())
}

/// Check whether `path` ends with the given element names
pub(crate) fn path_ends_with(path: &[String], suffix: &[&str]) -> bool {
    path.len() >= suffix.len()
        && path[path.len() - suffix.len()..]
            .iter()
            .zip(suffix)
            .all(|(a, b)| a == b)
}

/// Indenting XML writer
pub(crate) struct XmlWriter {
    out: String,
    stack: Vec<&'static str>,
}

impl XmlWriter {
    pub(crate) fn new() -> Self {
        Self {
            out: String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n"),
            stack: Vec::new(),
        }
    }

    fn indent(&mut self) {
        for _ in 0..self.stack.len() {
            self.out.push_str("    ");
        }
    }

    pub(crate) fn open(&mut self, tag: &'static str) -> &mut Self {
        self.open_with(tag, &[])
    }

    pub(crate) fn open_with(&mut self, tag: &'static str, attrs: &[(&str, &str)]) -> &mut Self {
        self.indent();
        self.out.push('<');
        self.out.push_str(tag);
        for (key, value) in attrs {
            self.out.push(' ');
            self.out.push_str(key);
            self.out.push_str("=\"");
            self.out.push_str(&escape(*value));
            self.out.push('"');
        }
        self.out.push_str(">\n");
        self.stack.push(tag);
        self
    }

    /// Element with text content on a single line
    pub(crate) fn leaf(&mut self, tag: &str, value: impl Display) -> &mut Self {
        self.leaf_with(tag, &[], value)
    }

    pub(crate) fn leaf_with(
        &mut self,
        tag: &str,
        attrs: &[(&str, &str)],
        value: impl Display,
    ) -> &mut Self {
        self.indent();
        self.out.push('<');
        self.out.push_str(tag);
        for (key, value) in attrs {
            self.out.push(' ');
            self.out.push_str(key);
            self.out.push_str("=\"");
            self.out.push_str(&escape(*value));
            self.out.push('"');
        }
        self.out.push('>');
        self.out.push_str(&escape(value.to_string().as_str()));
        self.out.push_str("</");
        self.out.push_str(tag);
        self.out.push_str(">\n");
        self
    }

    pub(crate) fn close(&mut self) -> &mut Self {
        if let Some(tag) = self.stack.pop() {
            self.indent();
            self.out.push_str("</");
            self.out.push_str(tag);
            self.out.push_str(">\n");
        }
        self
    }

    /// Close any open elements and return the document
    pub(crate) fn finish(mut self) -> String {
        while !self.stack.is_empty() {
            self.close();
        }
        self.out
    }
}
