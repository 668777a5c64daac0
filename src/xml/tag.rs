use quick_xml::escape::escape;
use quick_xml::events::attributes::AttrError;
use quick_xml::events::BytesStart;
use std::io::{self, Write};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TagError {
    #[error("invalid UTF-8 in markup: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("invalid attribute: {0}")]
    Attribute(#[from] AttrError),

    #[error("invalid attribute value: {0}")]
    Value(#[from] quick_xml::Error),
}

/// One attribute of a start tag.
///
/// `value` is unescaped; `raw` keeps the source spelling so untouched
/// attributes are written back exactly as they were read.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Attr {
    key: String,
    value: String,
    raw: Option<String>,
}

impl Attr {
    fn write_to<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let text = match &self.raw {
            Some(raw) => std::borrow::Cow::Borrowed(raw.as_str()),
            None => escape(self.value.as_str()),
        };
        let quote: &[u8] = if text.contains('"') { b"'" } else { b"\"" };
        out.write_all(b" ")?;
        out.write_all(self.key.as_bytes())?;
        out.write_all(b"=")?;
        out.write_all(quote)?;
        out.write_all(text.as_bytes())?;
        out.write_all(quote)
    }
}

/// A start (or self-closing) tag with an ordered attribute list.
///
/// Tags read from a document remember their raw bytes. As long as no
/// attribute actually changes value, [`Tag::write_open`] re-emits those
/// bytes verbatim, including the original whitespace and quoting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    name: String,
    attrs: Vec<Attr>,
    raw: Option<Vec<u8>>,
}

impl Tag {
    /// Create a synthesized tag with no attributes.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: Vec::new(),
            raw: None,
        }
    }

    /// Builder form of [`Tag::set`].
    pub fn with_attr(mut self, key: &str, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub(crate) fn from_start(start: &BytesStart<'_>) -> Result<Self, TagError> {
        let name = std::str::from_utf8(start.name().as_ref())?.to_string();
        let mut attrs = Vec::new();
        for attr in start.attributes() {
            let attr = attr?;
            let key = std::str::from_utf8(attr.key.as_ref())?.to_string();
            let raw = std::str::from_utf8(&attr.value)?.to_string();
            let value = attr.unescape_value()?.into_owned();
            attrs.push(Attr {
                key,
                value,
                raw: Some(raw),
            });
        }
        let raw: &[u8] = start;
        Ok(Self {
            name,
            attrs,
            raw: Some(raw.to_vec()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Case-insensitive element name comparison.
    pub fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|attr| attr.key == key)
            .map(|attr| attr.value.as_str())
    }

    pub fn has(&self, key: &str) -> bool {
        self.attrs.iter().any(|attr| attr.key == key)
    }

    /// Attributes in document order, unescaped.
    pub fn attrs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attrs
            .iter()
            .map(|attr| (attr.key.as_str(), attr.value.as_str()))
    }

    /// Set an attribute, appending it when absent.
    ///
    /// Returns `true` when the tag changed. Setting an attribute to the
    /// value it already holds is a no-op and keeps the raw bytes.
    pub fn set(&mut self, key: &str, value: impl Into<String>) -> bool {
        let value = value.into();
        match self.attrs.iter_mut().find(|attr| attr.key == key) {
            Some(attr) if attr.value == value => return false,
            Some(attr) => {
                attr.value = value;
                attr.raw = None;
            }
            None => self.attrs.push(Attr {
                key: key.to_string(),
                value,
                raw: None,
            }),
        }
        self.raw = None;
        true
    }

    /// True once any attribute changed since the tag was read.
    pub fn is_modified(&self) -> bool {
        self.raw.is_none()
    }

    pub fn write_open<W: Write>(&self, out: &mut W, self_closing: bool) -> io::Result<()> {
        out.write_all(b"<")?;
        match &self.raw {
            Some(raw) => out.write_all(raw)?,
            None => {
                out.write_all(self.name.as_bytes())?;
                for attr in &self.attrs {
                    attr.write_to(out)?;
                }
            }
        }
        out.write_all(if self_closing { b"/>" } else { b">" })
    }

    pub fn write_close<W: Write>(&self, out: &mut W) -> io::Result<()> {
        write_close(out, &self.name)
    }
}

pub fn write_close<W: Write>(out: &mut W, name: &str) -> io::Result<()> {
    out.write_all(b"</")?;
    out.write_all(name.as_bytes())?;
    out.write_all(b">")
}
