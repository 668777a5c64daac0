//! Structural patches on buffered component subtrees.
//!
//! NPC skill edits and ship crew or modification edits cannot be expressed
//! as a single attribute change on one start tag: the target may sit a few
//! levels down, may use either skill style, or may not exist yet. The
//! rewriter therefore buffers the whole component into an [`Element`] tree
//! and hands it to [`patch_fragment`].

use super::insert;
use crate::config::normalize::ShipEdit;
use crate::model::{is_known_skill, SkillStyle};
use crate::xml::{Element, Tag};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// One structural edit, used to prove every edit reached the document.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum EditTarget {
    Npc(String),
    Crew { ship: String, slot: usize },
    Modification { ship: String, slot: usize },
}

impl fmt::Display for EditTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EditTarget::Npc(id) => write!(f, "NPC '{}'", id),
            EditTarget::Crew { ship, slot } => write!(f, "crew slot {} of ship '{}'", slot, ship),
            EditTarget::Modification { ship, slot } => {
                write!(f, "modification slot {} of ship '{}'", slot, ship)
            }
        }
    }
}

/// Everything a fragment may need patched.
pub struct StructuralPlan<'a> {
    /// NPC id → skill → value, officer edits included.
    pub npc_skills: &'a BTreeMap<String, BTreeMap<String, i64>>,
    pub ships: &'a BTreeMap<String, ShipEdit>,
    /// Style for skill blocks that have to be created.
    pub style: SkillStyle,
}

impl StructuralPlan<'_> {
    /// Whether a component with this id has to be buffered.
    pub fn wants(&self, id: &str) -> bool {
        self.npc_skills.contains_key(id)
            || self.ships.get(id).is_some_and(ShipEdit::is_structural)
    }

    /// Targets that must all show up in [`StructuralReport::applied`].
    pub fn targets(&self) -> BTreeSet<EditTarget> {
        let mut targets: BTreeSet<EditTarget> = self
            .npc_skills
            .keys()
            .map(|id| EditTarget::Npc(id.clone()))
            .collect();
        for (ship, edit) in self.ships {
            targets.extend(edit.crew.keys().map(|slot| EditTarget::Crew {
                ship: ship.clone(),
                slot: *slot,
            }));
            targets.extend(edit.modifications.keys().map(|slot| EditTarget::Modification {
                ship: ship.clone(),
                slot: *slot,
            }));
        }
        targets
    }
}

#[derive(Debug, Default)]
pub struct StructuralReport {
    pub skill_updates: usize,
    pub modification_updates: usize,
    pub applied: BTreeSet<EditTarget>,
}

/// Apply every planned edit to the components inside `root`, `root`
/// included. Nested components are patched independently.
pub fn patch_fragment(
    root: &mut Element,
    plan: &StructuralPlan<'_>,
    report: &mut StructuralReport,
) {
    if root.tag.is("component") {
        let id = root.tag.get("id").unwrap_or("").trim().to_string();
        if let Some(skills) = plan.npc_skills.get(&id) {
            patch_npc(root, &id, skills, plan.style, report);
        }
        if let Some(edit) = plan.ships.get(&id) {
            patch_ship(root, &id, edit, plan.style, report);
        }
    }
    for child in root.child_elements_mut() {
        patch_fragment(child, plan, report);
    }
}

fn patch_npc(
    npc: &mut Element,
    id: &str,
    skills: &BTreeMap<String, i64>,
    style: SkillStyle,
    report: &mut StructuralReport,
) {
    if npc.find_descendant_mut("traits", "component").is_none() {
        npc.push(Element::open(Tag::new("traits")));
    }
    let Some(traits) = npc.find_descendant_mut("traits", "component") else {
        return;
    };
    let Some(block) = child_or_insert(traits, "skills") else {
        return;
    };
    report.skill_updates += apply_skills(block, skills, style);
    report.applied.insert(EditTarget::Npc(id.to_string()));
}

fn patch_ship(
    ship: &mut Element,
    id: &str,
    edit: &ShipEdit,
    style: SkillStyle,
    report: &mut StructuralReport,
) {
    if !edit.crew.is_empty() {
        if let Some(people) = ship.find_descendant_mut("people", "component") {
            let mut persons: Vec<&mut Element> = people
                .child_elements_mut()
                .filter(|element| element.tag.is("person"))
                .collect();
            for (slot, skills) in &edit.crew {
                let Some(person) = persons.get_mut(*slot) else {
                    continue;
                };
                let Some(block) = child_or_insert(person, "skills") else {
                    continue;
                };
                report.skill_updates += apply_skills(block, skills, style);
                report.applied.insert(EditTarget::Crew {
                    ship: id.to_string(),
                    slot: *slot,
                });
            }
        }
    }

    if !edit.modifications.is_empty() {
        let mut parts = Vec::new();
        modification_parts(ship, &mut parts);
        for (slot, values) in &edit.modifications {
            let Some(part) = parts.get_mut(*slot) else {
                continue;
            };
            for (key, value) in values {
                part.tag.set(key, value.as_str());
                report.modification_updates += 1;
            }
            report.applied.insert(EditTarget::Modification {
                ship: id.to_string(),
                slot: *slot,
            });
        }
    }
}

/// Parts of every modification block owned by `element`, in document order.
/// Nested components keep their own parts.
fn modification_parts<'e>(element: &'e mut Element, parts: &mut Vec<&'e mut Element>) {
    for child in element.child_elements_mut() {
        if child.tag.is("component") {
            continue;
        }
        if child.tag.is("modification") {
            parts.extend(child.child_elements_mut());
        } else {
            modification_parts(child, parts);
        }
    }
}

fn child_or_insert<'e>(parent: &'e mut Element, name: &str) -> Option<&'e mut Element> {
    if parent.find_child_mut(name).is_none() {
        parent.push(Element::empty(Tag::new(name)));
    }
    parent.find_child_mut(name)
}

/// Write `values` into a skills block in the style it already uses.
///
/// Returns the number of skill values written.
fn apply_skills(
    block: &mut Element,
    values: &BTreeMap<String, i64>,
    preferred: SkillStyle,
) -> usize {
    let style = if block.child_elements().any(|element| element.tag.is("skill")) {
        SkillStyle::Elements
    } else if block.tag.attrs().any(|(key, _)| is_known_skill(key)) {
        SkillStyle::Attributes
    } else {
        preferred
    };

    for (key, value) in values {
        match style {
            SkillStyle::Attributes => {
                block.tag.set(key, value.to_string());
            }
            SkillStyle::Elements => {
                let existing = block.child_elements_mut().find(|element| {
                    element.tag.is("skill") && element.tag.get("type") == Some(key.as_str())
                });
                match existing {
                    Some(skill) => {
                        skill.tag.set("value", value.to_string());
                    }
                    None => block.push(insert::skill(key, *value)),
                }
            }
        }
    }
    values.len()
}
