//! Byte-preserving XML event stream.
//!
//! [`XmlSource`] wraps the `quick-xml` pull reader and turns its borrowed
//! events into owned [`XmlEvent`]s. Every event keeps enough of the source
//! bytes to be written back unchanged, which is what lets the rewriter leave
//! untouched parts of a save byte-identical.

pub mod fragment;
pub mod tag;

pub use fragment::{Element, Node};
pub use tag::{Tag, TagError};

use quick_xml::events::Event;
use quick_xml::Reader;
use std::io::{self, BufRead, Write};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("failed to read save stream: {0}")]
    Read(#[source] io::Error),

    #[error("malformed document at byte {position}: {message}")]
    Malformed { position: u64, message: String },
}

impl ScanError {
    pub fn malformed(position: u64, message: impl Into<String>) -> Self {
        ScanError::Malformed {
            position,
            message: message.into(),
        }
    }
}

/// One owned document event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlEvent {
    Start(Tag),
    /// A self-closing element such as `<blueprint ware="x"/>`.
    Empty(Tag),
    End(String),
    /// Character data, still escaped.
    Text(Vec<u8>),
    /// Declarations, comments, CDATA, processing instructions and doctypes,
    /// delimiters included.
    Markup(Vec<u8>),
    Eof,
}

impl XmlEvent {
    /// Write the event back in its source form.
    pub fn write_to<W: Write>(&self, out: &mut W) -> io::Result<()> {
        match self {
            XmlEvent::Start(tag) => tag.write_open(out, false),
            XmlEvent::Empty(tag) => tag.write_open(out, true),
            XmlEvent::End(name) => tag::write_close(out, name),
            XmlEvent::Text(bytes) | XmlEvent::Markup(bytes) => out.write_all(bytes),
            XmlEvent::Eof => Ok(()),
        }
    }
}

/// Pull-based event source over any buffered reader.
pub struct XmlSource<R: BufRead> {
    reader: Reader<R>,
    buf: Vec<u8>,
}

impl<R: BufRead> XmlSource<R> {
    pub fn new(input: R) -> Self {
        let mut reader = Reader::from_reader(input);
        reader.config_mut().trim_text(false);
        Self {
            reader,
            buf: Vec::with_capacity(4096),
        }
    }

    /// Byte offset of the reader in the decompressed stream.
    pub fn position(&self) -> u64 {
        self.reader.buffer_position() as u64
    }

    pub fn next_event(&mut self) -> Result<XmlEvent, ScanError> {
        self.buf.clear();
        let event = match self.reader.read_event_into(&mut self.buf) {
            Ok(event) => event,
            Err(quick_xml::Error::Io(err)) => {
                return Err(ScanError::Read(io::Error::new(err.kind(), err.to_string())))
            }
            Err(err) => {
                return Err(ScanError::malformed(
                    self.reader.error_position() as u64,
                    err.to_string(),
                ))
            }
        };

        let position = self.reader.buffer_position() as u64;
        let malformed = |err: TagError| ScanError::malformed(position, err.to_string());

        Ok(match event {
            Event::Start(start) => XmlEvent::Start(Tag::from_start(&start).map_err(malformed)?),
            Event::Empty(start) => XmlEvent::Empty(Tag::from_start(&start).map_err(malformed)?),
            Event::End(end) => {
                let name = std::str::from_utf8(end.name().as_ref())
                    .map_err(|err| malformed(TagError::Utf8(err)))?
                    .to_string();
                XmlEvent::End(name)
            }
            Event::Text(text) => XmlEvent::Text(text.to_vec()),
            Event::CData(data) => XmlEvent::Markup(wrap(b"<![CDATA[", &data, b"]]>")),
            Event::Comment(text) => XmlEvent::Markup(wrap(b"<!--", &text, b"-->")),
            Event::Decl(decl) => XmlEvent::Markup(wrap(b"<?", &decl, b"?>")),
            Event::PI(pi) => XmlEvent::Markup(wrap(b"<?", &pi, b"?>")),
            Event::DocType(doctype) => XmlEvent::Markup(wrap(b"<!DOCTYPE ", &doctype, b">")),
            Event::Eof => XmlEvent::Eof,
        })
    }
}

fn wrap(open: &[u8], body: &[u8], close: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(open.len() + body.len() + close.len());
    bytes.extend_from_slice(open);
    bytes.extend_from_slice(body);
    bytes.extend_from_slice(close);
    bytes
}
