//! Small owned element trees.
//!
//! Used for synthesized insertions and for component subtrees that are
//! buffered during a rewrite so they can be patched structurally before they
//! are written out.

use super::tag::{write_close, Tag};
use std::io::{self, Write};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    /// Character data, still escaped as in the source.
    Text(Vec<u8>),
    /// Comments, CDATA sections and processing instructions, delimiters included.
    Markup(Vec<u8>),
}

impl Node {
    pub fn write_to<W: Write>(&self, out: &mut W) -> io::Result<()> {
        match self {
            Node::Element(element) => element.write_to(out),
            Node::Text(bytes) | Node::Markup(bytes) => out.write_all(bytes),
        }
    }
}

impl From<Element> for Node {
    fn from(element: Element) -> Self {
        Node::Element(element)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub tag: Tag,
    pub children: Vec<Node>,
    /// Written as `<name/>` while it has no children.
    pub self_closing: bool,
}

impl Element {
    /// A childless element written as `<name .../>`.
    pub fn empty(tag: Tag) -> Self {
        Self {
            tag,
            children: Vec::new(),
            self_closing: true,
        }
    }

    /// An element written with an explicit close tag, even without children.
    pub fn open(tag: Tag) -> Self {
        Self {
            tag,
            children: Vec::new(),
            self_closing: false,
        }
    }

    pub fn with_child(mut self, child: impl Into<Node>) -> Self {
        self.push(child);
        self
    }

    pub fn name(&self) -> &str {
        self.tag.name()
    }

    /// Append a child; a self-closing element becomes an open/close pair.
    pub fn push(&mut self, child: impl Into<Node>) {
        self.children.push(child.into());
        self.self_closing = false;
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(element) => Some(element),
            _ => None,
        })
    }

    pub fn child_elements_mut(&mut self) -> impl Iterator<Item = &mut Element> {
        self.children.iter_mut().filter_map(|node| match node {
            Node::Element(element) => Some(element),
            _ => None,
        })
    }

    pub fn find_child_mut(&mut self, name: &str) -> Option<&mut Element> {
        self.child_elements_mut().find(|element| element.tag.is(name))
    }

    /// Depth-first search for the first descendant named `name` that does
    /// not sit below an element named `boundary`.
    pub fn find_descendant_mut(&mut self, name: &str, boundary: &str) -> Option<&mut Element> {
        for element in self.child_elements_mut() {
            if element.tag.is(name) {
                return Some(element);
            }
            if element.tag.is(boundary) {
                continue;
            }
            if let Some(found) = element.find_descendant_mut(name, boundary) {
                return Some(found);
            }
        }
        None
    }

    pub fn write_to<W: Write>(&self, out: &mut W) -> io::Result<()> {
        if self.self_closing && self.children.is_empty() {
            return self.tag.write_open(out, true);
        }
        self.tag.write_open(out, false)?;
        for child in &self.children {
            child.write_to(out)?;
        }
        write_close(out, self.tag.name())
    }

    #[cfg(test)]
    pub(crate) fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        // Writing into a Vec cannot fail.
        let _ = self.write_to(&mut out);
        out
    }
}
