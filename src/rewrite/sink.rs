//! Output side of the rewriter.
//!
//! Events either go straight to the writer or, while a component subtree is
//! being captured, into an [`Element`] tree that is handed back once the
//! captured element closes.

use crate::xml::{Element, Node, Tag};
use std::io::{self, Write};

pub(crate) struct Sink<'w, W: Write> {
    out: &'w mut W,
    /// Open elements of the subtree being captured, outermost first.
    capture: Vec<Element>,
}

impl<'w, W: Write> Sink<'w, W> {
    pub(crate) fn new(out: &'w mut W) -> Self {
        Self {
            out,
            capture: Vec::new(),
        }
    }

    pub(crate) fn is_capturing(&self) -> bool {
        !self.capture.is_empty()
    }

    /// Open an element. With `capture` set, or inside a capture, the element
    /// is buffered instead of written.
    pub(crate) fn start(&mut self, tag: Tag, capture: bool) -> io::Result<()> {
        if capture || self.is_capturing() {
            self.capture.push(Element::open(tag));
            return Ok(());
        }
        tag.write_open(&mut *self.out, false)
    }

    pub(crate) fn empty(&mut self, tag: Tag) -> io::Result<()> {
        match self.capture.last_mut() {
            Some(parent) => {
                parent.children.push(Node::Element(Element::empty(tag)));
                Ok(())
            }
            None => tag.write_open(&mut *self.out, true),
        }
    }

    /// Close the innermost element.
    ///
    /// Returns the captured subtree when this closes its root.
    pub(crate) fn end(&mut self, name: &str) -> io::Result<Option<Element>> {
        let Some(element) = self.capture.pop() else {
            crate::xml::tag::write_close(&mut *self.out, name)?;
            return Ok(None);
        };
        match self.capture.last_mut() {
            Some(parent) => {
                parent.children.push(Node::Element(element));
                Ok(None)
            }
            None => Ok(Some(element)),
        }
    }

    pub(crate) fn text(&mut self, bytes: Vec<u8>) -> io::Result<()> {
        self.node(Node::Text(bytes))
    }

    pub(crate) fn markup(&mut self, bytes: Vec<u8>) -> io::Result<()> {
        self.node(Node::Markup(bytes))
    }

    /// Emit a finished element, synthesized or a patched capture.
    pub(crate) fn element(&mut self, element: Element) -> io::Result<()> {
        self.node(Node::Element(element))
    }

    fn node(&mut self, node: Node) -> io::Result<()> {
        match self.capture.last_mut() {
            Some(parent) => {
                parent.children.push(node);
                Ok(())
            }
            None => node.write_to(&mut *self.out),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_writes() {
        let mut out = Vec::new();
        let mut sink = Sink::new(&mut out);
        sink.start(Tag::new("a"), false).unwrap();
        sink.text(b" x ".to_vec()).unwrap();
        sink.empty(Tag::new("b").with_attr("k", "v")).unwrap();
        assert!(sink.end("a").unwrap().is_none());
        assert_eq!(String::from_utf8(out).unwrap(), r#"<a> x <b k="v"/></a>"#);
    }

    #[test]
    fn test_capture_returns_subtree() {
        let mut out = Vec::new();
        let mut sink = Sink::new(&mut out);
        sink.start(Tag::new("root"), false).unwrap();
        sink.start(Tag::new("component"), true).unwrap();
        assert!(sink.is_capturing());
        sink.start(Tag::new("traits"), false).unwrap();
        sink.markup(b"<!-- c -->".to_vec()).unwrap();
        assert!(sink.end("traits").unwrap().is_none());
        let captured = sink.end("component").unwrap().unwrap();
        assert!(!sink.is_capturing());
        assert_eq!(captured.to_bytes(), b"<component><traits><!-- c --></traits></component>");
        sink.element(captured).unwrap();
        sink.end("root").unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "<root><component><traits><!-- c --></traits></component></root>"
        );
    }
}
