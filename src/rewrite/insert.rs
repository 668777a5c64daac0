//! Elements synthesized when an edit targets something the save lacks.
//!
//! The shapes match what the game itself writes, so an inserted element is
//! indistinguishable from a native one on the next load.

use crate::xml::{Element, Tag};

/// `<relation faction=".." relation=".."></relation>`
pub fn relation(target: &str, ratio: &str) -> Element {
    Element::open(
        Tag::new("relation")
            .with_attr("faction", target)
            .with_attr("relation", ratio),
    )
}

pub fn relations_block(edges: impl IntoIterator<Item = Element>) -> Element {
    block("relations", edges)
}

/// `<licence type=".." factions=".."/>`; `factions` may be empty.
pub fn licence(type_name: &str, factions: &str) -> Element {
    Element::empty(
        Tag::new("licence")
            .with_attr("type", type_name)
            .with_attr("factions", factions),
    )
}

pub fn licences_block(licences: impl IntoIterator<Item = Element>) -> Element {
    block("licences", licences)
}

pub fn blueprint(ware: &str) -> Element {
    Element::empty(Tag::new("blueprint").with_attr("ware", ware))
}

pub fn blueprints_block(blueprints: impl IntoIterator<Item = Element>) -> Element {
    block("blueprints", blueprints)
}

pub fn inventory_ware(ware: &str, amount: i64) -> Element {
    Element::empty(
        Tag::new("ware")
            .with_attr("ware", ware)
            .with_attr("amount", amount.to_string()),
    )
}

pub fn inventory_block(wares: impl IntoIterator<Item = Element>) -> Element {
    block("inventory", wares)
}

/// Element-style skill entry, `<skill type=".." value=".."/>`.
pub fn skill(key: &str, value: i64) -> Element {
    Element::empty(
        Tag::new("skill")
            .with_attr("type", key)
            .with_attr("value", value.to_string()),
    )
}

fn block(name: &str, children: impl IntoIterator<Item = Element>) -> Element {
    children
        .into_iter()
        .fold(Element::open(Tag::new(name)), |block, child| block.with_child(child))
}
