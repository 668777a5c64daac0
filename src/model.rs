//! Queryable snapshot of a save, built by the indexer.
//!
//! The model is immutable once [`crate::indexer::index`] returns it. It
//! serializes to camelCase JSON so front ends can consume it directly.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

/// Skill keys recognised in NPC and crew skill blocks.
pub const KNOWN_SKILL_KEYS: [&str; 5] = ["morale", "piloting", "management", "engineering", "boarding"];

pub fn is_known_skill(key: &str) -> bool {
    KNOWN_SKILL_KEYS.contains(&key)
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveModel {
    pub metadata: SaveInfo,
    pub credits: Credits,
    pub blueprints: Blueprints,
    pub relations: Relations,
    pub licences: Licences,
    pub inventory: Inventory,
    pub skills: Skills,
    /// Every `factions/faction@id` in the document.
    pub factions: BTreeSet<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveInfo {
    pub source_path: Option<PathBuf>,
    pub save_name: String,
    pub save_date: String,
    pub game: GameInfo,
    /// `info/game@modified`, absent when the attribute is missing.
    pub modified: Option<bool>,
    pub player_name: String,
    pub extensions: Extensions,
}

impl SaveInfo {
    pub fn product_version(&self) -> Option<&str> {
        let version = self.game.version.trim();
        (!version.is_empty()).then_some(version)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameInfo {
    pub id: String,
    pub version: String,
    pub build: String,
    pub time: String,
    pub code: String,
    pub original: String,
    pub original_build: String,
    pub start: String,
    pub seed: String,
    pub guid: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Extensions {
    pub active: Vec<Extension>,
    pub history: Vec<Extension>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Extension {
    pub id: String,
    pub version: String,
    pub name: String,
}

impl Extensions {
    /// Record an extension; a repeated id replaces the earlier record in place.
    pub fn record(&mut self, history: bool, extension: Extension) {
        let list = if history {
            &mut self.history
        } else {
            &mut self.active
        };
        match list.iter_mut().find(|known| known.id == extension.id) {
            Some(known) => *known = extension,
            None => list.push(extension),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Credits {
    /// `player@money` of the ledger element.
    pub player_money: Option<String>,
    pub player_name: String,
    pub player_location: String,
    /// `info/player@money`, the balance shown in the save header.
    pub info_money: Option<String>,
    /// `stat[@id=money_player]@value`.
    pub stat_money_player: Option<String>,
    /// Id of the first `account` inside the player faction.
    pub wallet_account_id: Option<String>,
    pub wallet_amount: Option<String>,
    /// Number of `account` elements anywhere sharing the wallet id.
    pub wallet_account_occurrences: usize,
}

impl Credits {
    /// Ledger balance, or the header balance when the ledger has none.
    pub fn money(&self) -> Option<i64> {
        self.player_money
            .as_deref()
            .or(self.info_money.as_deref())?
            .trim()
            .parse()
            .ok()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Blueprints {
    pub owned: BTreeSet<String>,
    pub block_found: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationEdge {
    pub target: String,
    /// Raw `relation` attribute, a ratio in `[-1, 1]`.
    pub value: String,
}

impl RelationEdge {
    pub fn ratio(&self) -> Option<f64> {
        self.value.trim().parse().ok()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoosterEdge {
    pub target: String,
    pub value: String,
    pub time: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Relations {
    pub by_faction: BTreeMap<String, Vec<RelationEdge>>,
    pub boosters_by_faction: BTreeMap<String, Vec<BoosterEdge>>,
    pub player: Vec<RelationEdge>,
    pub player_boosters: Vec<BoosterEdge>,
    /// Factions with any edge to or from the player, sorted.
    pub player_contact_factions: Vec<String>,
}

impl Relations {
    /// Base relation value of `faction` towards `target`.
    pub fn edge(&self, faction: &str, target: &str) -> Option<&RelationEdge> {
        self.by_faction
            .get(faction)?
            .iter()
            .find(|edge| edge.target == target)
    }

    pub(crate) fn collect_contacts(&mut self, player: &str) {
        let mut contacts = BTreeSet::new();
        for edge in &self.player {
            contacts.insert(edge.target.clone());
        }
        for edge in &self.player_boosters {
            contacts.insert(edge.target.clone());
        }
        for (faction, edges) in &self.by_faction {
            if edges.iter().any(|edge| edge.target == player) {
                contacts.insert(faction.clone());
            }
        }
        for (faction, edges) in &self.boosters_by_faction {
            if edges.iter().any(|edge| edge.target == player) {
                contacts.insert(faction.clone());
            }
        }
        contacts.remove("");
        self.player_contact_factions = contacts.into_iter().collect();
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenceEntry {
    pub type_name: String,
    /// Raw space separated `factions` attribute.
    pub factions: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Licences {
    pub player_faction_found: bool,
    pub block_found: bool,
    pub by_type: BTreeMap<String, BTreeSet<String>>,
    pub entries: Vec<LicenceEntry>,
    pub all_types: Vec<String>,
    pub all_factions: Vec<String>,
}

impl Licences {
    pub(crate) fn summarize(&mut self) {
        self.all_types = self.by_type.keys().cloned().collect();
        let all: BTreeSet<&String> = self.by_type.values().flatten().collect();
        self.all_factions = all.into_iter().cloned().collect();
    }
}

/// Split a licence `factions` attribute into its members.
pub fn parse_faction_list(raw: &str) -> BTreeSet<String> {
    raw.split_whitespace().map(str::to_string).collect()
}

/// Sorted, deduplicated, space-joined faction list.
pub fn join_faction_list<'a>(factions: impl IntoIterator<Item = &'a String>) -> String {
    let set: BTreeSet<&String> = factions.into_iter().collect();
    set.into_iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Inventory {
    pub player: BTreeMap<String, i64>,
    pub player_component_found: bool,
    pub block_found: bool,
}

/// Serialization style of a skill block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SkillStyle {
    /// `<skills morale="3" piloting="4"/>`
    Attributes,
    /// `<skills><skill type="morale" value="3"/></skills>`
    Elements,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillStyles {
    pub attributes: bool,
    pub elements: bool,
}

impl SkillStyles {
    /// Style for newly created skill blocks.
    pub fn preferred(&self) -> SkillStyle {
        if self.attributes && !self.elements {
            SkillStyle::Attributes
        } else {
            SkillStyle::Elements
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Npc {
    pub id: String,
    pub name: String,
    pub owner: String,
    pub npc_seed: String,
    pub skills: BTreeMap<String, i64>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    pub id: String,
    pub class: String,
    #[serde(rename = "macro")]
    pub macro_name: String,
    pub code: String,
    pub owner: String,
    pub name: String,
    pub location: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub post_id: String,
    pub npc_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub container_id: String,
    pub post_id: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrewMember {
    pub slot: usize,
    pub role: String,
    #[serde(rename = "macro")]
    pub macro_name: String,
    pub skills: BTreeMap<String, i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModificationPart {
    pub slot: usize,
    /// Element name, e.g. `engine` or `paint`.
    pub kind: String,
    pub attributes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Ship {
    pub id: String,
    pub crew: Vec<CrewMember>,
    pub officers: Vec<Post>,
    pub modifications: Vec<ModificationPart>,
}

impl Ship {
    pub fn has_crew_slot(&self, slot: usize) -> bool {
        self.crew.iter().any(|member| member.slot == slot)
    }

    pub fn has_modification_slot(&self, slot: usize) -> bool {
        self.modifications.iter().any(|part| part.slot == slot)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Skills {
    pub npcs: BTreeMap<String, Npc>,
    pub containers: BTreeMap<String, Container>,
    pub posts_by_container: BTreeMap<String, Vec<Post>>,
    pub npc_assignments: BTreeMap<String, Vec<Assignment>>,
    pub ships: BTreeMap<String, Ship>,
    pub supported_skill_keys: BTreeSet<String>,
    pub styles: SkillStyles,
}

impl Skills {
    /// NPC manning `post_id` on container `container_id`.
    pub fn officer(&self, container_id: &str, post_id: &str) -> Option<&str> {
        self.posts_by_container
            .get(container_id)?
            .iter()
            .find(|post| post.post_id == post_id)
            .map(|post| post.npc_id.as_str())
    }

    pub(crate) fn link_posts(&mut self) {
        self.npc_assignments.clear();
        for (container_id, posts) in &self.posts_by_container {
            for post in posts {
                self.npc_assignments
                    .entry(post.npc_id.clone())
                    .or_default()
                    .push(Assignment {
                        container_id: container_id.clone(),
                        post_id: post.post_id.clone(),
                    });
            }
            if let Some(ship) = self.ships.get_mut(container_id) {
                ship.officers = posts.clone();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extensions_dedupe_keeps_first_position() {
        let mut extensions = Extensions::default();
        let ext = |id: &str, version: &str| Extension {
            id: id.to_string(),
            version: version.to_string(),
            name: String::new(),
        };
        extensions.record(false, ext("ego_dlc_split", "100"));
        extensions.record(false, ext("ego_dlc_terran", "100"));
        extensions.record(false, ext("ego_dlc_split", "200"));

        let ids: Vec<_> = extensions.active.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["ego_dlc_split", "ego_dlc_terran"]);
        assert_eq!(extensions.active[0].version, "200");
        assert!(extensions.history.is_empty());
    }

    #[test]
    fn test_faction_list_helpers() {
        let parsed = parse_faction_list("  teladi paranid\tteladi ");
        assert_eq!(join_faction_list(&parsed), "paranid teladi");
        assert_eq!(join_faction_list(&BTreeSet::new()), "");
    }

    #[test]
    fn test_preferred_skill_style() {
        let none = SkillStyles::default();
        assert_eq!(none.preferred(), SkillStyle::Elements);
        let attrs = SkillStyles {
            attributes: true,
            elements: false,
        };
        assert_eq!(attrs.preferred(), SkillStyle::Attributes);
        let both = SkillStyles {
            attributes: true,
            elements: true,
        };
        assert_eq!(both.preferred(), SkillStyle::Elements);
    }

    #[test]
    fn test_contact_factions() {
        let mut relations = Relations::default();
        relations.player.push(RelationEdge {
            target: "argon".into(),
            value: "0.1".into(),
        });
        relations.by_faction.insert(
            "teladi".into(),
            vec![RelationEdge {
                target: "player".into(),
                value: "0".into(),
            }],
        );
        relations.collect_contacts("player");
        assert_eq!(relations.player_contact_factions, vec!["argon", "teladi"]);
    }
}
