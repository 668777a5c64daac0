//! Folding a patch list into one canonical diff.
//!
//! Each [`Category`] owns a [`MergeRule`]; [`normalize`] validates the list
//! and hands every patch to the rule of its category. The rules encode the
//! conflict policy: last write wins for scalar values, union for sets, sums
//! for inventory adds, and patch order for licence membership.

use crate::config::schema::{scalar_text, validate_patches, Patch, RelationMode, ValidationError};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Upper bound of a skill value; lower bound is zero.
pub const MAX_SKILL: i64 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Category {
    Credits,
    Blueprints,
    Relations,
    Licences,
    Inventory,
    PlayerName,
    ModifiedFlag,
    NpcSkills,
    Ships,
    Deletions,
}

impl Patch {
    pub fn category(&self) -> Category {
        match self {
            Patch::SetCredits { .. } => Category::Credits,
            Patch::UnlockBlueprintWares { .. } => Category::Blueprints,
            Patch::SetFactionRelation { .. } => Category::Relations,
            Patch::AddLicenceFaction { .. }
            | Patch::RemoveLicenceFaction { .. }
            | Patch::AddLicenceType { .. }
            | Patch::RemoveLicenceType { .. } => Category::Licences,
            Patch::SetInventoryItem { .. } | Patch::AddInventoryItem { .. } => Category::Inventory,
            Patch::SetPlayerName { .. } => Category::PlayerName,
            Patch::SetModifiedFlag { .. } => Category::ModifiedFlag,
            Patch::SetNpcSkills { .. } => Category::NpcSkills,
            Patch::SetShipCrewSkills { .. }
            | Patch::SetShipOfficerSkills { .. }
            | Patch::SetShipAttribute { .. }
            | Patch::SetShipModification { .. } => Category::Ships,
            Patch::DeleteObject { .. } => Category::Deletions,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationEdit {
    /// Ratio in `[-1, 1]`, already formatted for the document.
    pub ratio: String,
    pub mode: RelationMode,
}

/// What should happen to a licence type as a whole.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Presence {
    /// Only touch the type if it already exists.
    #[default]
    Unchanged,
    /// Create the type if missing.
    Ensure,
    /// Delete every licence of this type.
    Remove,
    /// Rebuild the type from scratch, ignoring its current factions.
    Recreate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Membership {
    Add,
    Remove,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenceEdit {
    pub presence: Presence,
    /// Final membership decision per faction, in patch order.
    pub factions: BTreeMap<String, Membership>,
}

/// Result of applying a [`LicenceEdit`] to a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LicenceOutcome {
    /// Leave the type alone; it does not exist and nothing creates it.
    Absent,
    Delete,
    Factions(BTreeSet<String>),
}

impl LicenceEdit {
    /// Resolve the edit against the factions currently recorded for the
    /// type, `None` when the document has no licence of that type.
    pub fn resolve(&self, existing: Option<&BTreeSet<String>>) -> LicenceOutcome {
        let mut factions = match (self.presence, existing) {
            (Presence::Remove, _) => return LicenceOutcome::Delete,
            (Presence::Recreate, _) => BTreeSet::new(),
            (Presence::Unchanged, None) => return LicenceOutcome::Absent,
            (_, Some(existing)) => existing.clone(),
            (Presence::Ensure, None) => BTreeSet::new(),
        };
        for (faction, membership) in &self.factions {
            match membership {
                Membership::Add => {
                    factions.insert(faction.clone());
                }
                Membership::Remove => {
                    factions.remove(faction);
                }
            }
        }
        LicenceOutcome::Factions(factions)
    }

    /// True when the type has to exist after the export.
    pub fn creates(&self) -> bool {
        matches!(self.presence, Presence::Ensure | Presence::Recreate)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryEdit {
    pub set: Option<i64>,
    pub add: i64,
}

impl InventoryEdit {
    /// Quantity after the edit, given the current one (zero when absent).
    pub fn resolve(&self, existing: i64) -> i64 {
        self.set.unwrap_or(existing).saturating_add(self.add)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipEdit {
    /// Crew slot → skill → value.
    pub crew: BTreeMap<usize, BTreeMap<String, i64>>,
    /// Control post id → skill → value.
    pub officers: BTreeMap<String, BTreeMap<String, i64>>,
    pub attributes: BTreeMap<String, String>,
    /// Modification slot → attribute → value.
    pub modifications: BTreeMap<usize, BTreeMap<String, String>>,
}

impl ShipEdit {
    /// Crew or modification edits need the ship subtree buffered.
    pub fn is_structural(&self) -> bool {
        !self.crew.is_empty() || !self.modifications.is_empty()
    }
}

/// All pending edits of one export, merged per category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedDiff {
    pub credits: Option<i64>,
    pub blueprints: BTreeSet<String>,
    pub relations: BTreeMap<String, RelationEdit>,
    pub licences: BTreeMap<String, LicenceEdit>,
    pub inventory: BTreeMap<String, InventoryEdit>,
    pub player_name: Option<String>,
    pub modified: Option<bool>,
    pub npc_skills: BTreeMap<String, BTreeMap<String, i64>>,
    pub ships: BTreeMap<String, ShipEdit>,
    pub deletions: BTreeSet<String>,
}

impl NormalizedDiff {
    pub fn is_empty(&self) -> bool {
        *self == NormalizedDiff::default()
    }
}

/// Merge step for one category.
pub struct MergeRule {
    pub category: Category,
    pub merge: fn(&mut NormalizedDiff, &Patch),
}

pub const MERGE_RULES: &[MergeRule] = &[
    MergeRule {
        category: Category::Credits,
        merge: merge_credits,
    },
    MergeRule {
        category: Category::Blueprints,
        merge: merge_blueprints,
    },
    MergeRule {
        category: Category::Relations,
        merge: merge_relations,
    },
    MergeRule {
        category: Category::Licences,
        merge: merge_licences,
    },
    MergeRule {
        category: Category::Inventory,
        merge: merge_inventory,
    },
    MergeRule {
        category: Category::PlayerName,
        merge: merge_player_name,
    },
    MergeRule {
        category: Category::ModifiedFlag,
        merge: merge_modified_flag,
    },
    MergeRule {
        category: Category::NpcSkills,
        merge: merge_npc_skills,
    },
    MergeRule {
        category: Category::Ships,
        merge: merge_ships,
    },
    MergeRule {
        category: Category::Deletions,
        merge: merge_deletions,
    },
];

/// Validate `patches` and fold them into a [`NormalizedDiff`].
pub fn normalize(patches: &[Patch]) -> Result<NormalizedDiff, ValidationError> {
    validate_patches(patches)?;

    let mut diff = NormalizedDiff::default();
    for patch in patches {
        let category = patch.category();
        if let Some(rule) = MERGE_RULES.iter().find(|rule| rule.category == category) {
            (rule.merge)(&mut diff, patch);
        }
    }
    Ok(diff)
}

/// Convert a UI relation value (`-30..=30`) into the document ratio.
///
/// Integral ratios print without decimals; others are rounded to six
/// decimals with trailing zeros removed.
pub fn format_ratio(rep_ui: f64) -> String {
    let value = (rep_ui / 30.0).clamp(-1.0, 1.0);
    let text = if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        let fixed = format!("{value:.6}");
        fixed.trim_end_matches('0').trim_end_matches('.').to_string()
    };
    if text == "-0" {
        "0".to_string()
    } else {
        text
    }
}

/// Skill values are whole numbers in `0..=20`.
pub fn clamp_skill(value: f64) -> i64 {
    (value.trunc() as i64).clamp(0, MAX_SKILL)
}

fn clamp_skills(skills: &BTreeMap<String, f64>) -> impl Iterator<Item = (String, i64)> + '_ {
    skills
        .iter()
        .map(|(key, value)| (key.clone(), clamp_skill(*value)))
}

pub fn merge_credits(diff: &mut NormalizedDiff, patch: &Patch) {
    if let Patch::SetCredits { value } = patch {
        diff.credits = Some(*value);
    }
}

pub fn merge_blueprints(diff: &mut NormalizedDiff, patch: &Patch) {
    if let Patch::UnlockBlueprintWares { wares } = patch {
        diff.blueprints.extend(wares.iter().cloned());
    }
}

pub fn merge_relations(diff: &mut NormalizedDiff, patch: &Patch) {
    if let Patch::SetFactionRelation {
        faction_id,
        rep_ui,
        mode,
    } = patch
    {
        diff.relations.insert(
            faction_id.clone(),
            RelationEdit {
                ratio: format_ratio(*rep_ui),
                mode: mode.unwrap_or_default(),
            },
        );
    }
}

pub fn merge_licences(diff: &mut NormalizedDiff, patch: &Patch) {
    match patch {
        Patch::AddLicenceFaction {
            type_name,
            faction_id,
        } => {
            let edit = diff.licences.entry(type_name.clone()).or_default();
            revive(edit);
            edit.factions.insert(faction_id.clone(), Membership::Add);
        }
        Patch::RemoveLicenceFaction {
            type_name,
            faction_id,
        } => {
            let edit = diff.licences.entry(type_name.clone()).or_default();
            if edit.presence != Presence::Remove {
                edit.factions.insert(faction_id.clone(), Membership::Remove);
            }
        }
        Patch::AddLicenceType { type_name, factions } => {
            let edit = diff.licences.entry(type_name.clone()).or_default();
            revive(edit);
            for faction in factions {
                edit.factions.insert(faction.clone(), Membership::Add);
            }
        }
        Patch::RemoveLicenceType { type_name } => {
            let edit = diff.licences.entry(type_name.clone()).or_default();
            edit.presence = Presence::Remove;
            edit.factions.clear();
        }
        _ => {}
    }
}

/// An add makes the type exist; after a removal it starts from scratch.
fn revive(edit: &mut LicenceEdit) {
    edit.presence = match edit.presence {
        Presence::Remove => {
            edit.factions.clear();
            Presence::Recreate
        }
        Presence::Recreate => Presence::Recreate,
        Presence::Unchanged | Presence::Ensure => Presence::Ensure,
    };
}

pub fn merge_inventory(diff: &mut NormalizedDiff, patch: &Patch) {
    match patch {
        Patch::SetInventoryItem { ware, amount } => {
            diff.inventory.entry(ware.clone()).or_default().set = Some(*amount);
        }
        Patch::AddInventoryItem { ware, amount } => {
            let edit = diff.inventory.entry(ware.clone()).or_default();
            edit.add = edit.add.saturating_add(*amount);
        }
        _ => {}
    }
}

pub fn merge_player_name(diff: &mut NormalizedDiff, patch: &Patch) {
    if let Patch::SetPlayerName { name } = patch {
        diff.player_name = Some(name.trim().to_string());
    }
}

pub fn merge_modified_flag(diff: &mut NormalizedDiff, patch: &Patch) {
    if let Patch::SetModifiedFlag { value } = patch {
        diff.modified = Some(*value == 1);
    }
}

pub fn merge_npc_skills(diff: &mut NormalizedDiff, patch: &Patch) {
    if let Patch::SetNpcSkills { npc_id, skills } = patch {
        diff.npc_skills
            .entry(npc_id.clone())
            .or_default()
            .extend(clamp_skills(skills));
    }
}

pub fn merge_ships(diff: &mut NormalizedDiff, patch: &Patch) {
    match patch {
        Patch::SetShipCrewSkills {
            ship_id,
            slot,
            skills,
        } => {
            let ship = diff.ships.entry(ship_id.clone()).or_default();
            ship.crew.entry(*slot).or_default().extend(clamp_skills(skills));
        }
        Patch::SetShipOfficerSkills {
            ship_id,
            post_id,
            skills,
        } => {
            let ship = diff.ships.entry(ship_id.clone()).or_default();
            ship.officers
                .entry(post_id.clone())
                .or_default()
                .extend(clamp_skills(skills));
        }
        Patch::SetShipAttribute {
            ship_id,
            attribute,
            value,
        } => {
            let ship = diff.ships.entry(ship_id.clone()).or_default();
            ship.attributes.insert(attribute.clone(), value.clone());
        }
        Patch::SetShipModification {
            ship_id,
            slot,
            values,
        } => {
            let ship = diff.ships.entry(ship_id.clone()).or_default();
            let part = ship.modifications.entry(*slot).or_default();
            for (key, value) in values {
                if let Some(text) = scalar_text(value) {
                    part.insert(key.clone(), text);
                }
            }
        }
        _ => {}
    }
}

pub fn merge_deletions(diff: &mut NormalizedDiff, patch: &Patch) {
    if let Patch::DeleteObject { object_id } = patch {
        diff.deletions.insert(object_id.clone());
    }
}
