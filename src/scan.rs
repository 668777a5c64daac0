//! Context stack shared by the indexer and the rewriter.
//!
//! Every open element gets a [`Frame`] that records what the element *means*
//! in the save: the player's faction, a relation edge, a ship's people block,
//! one crew slot, and so on. Classification only ever looks at the element
//! itself and the frames already on the stack, so both passes agree on the
//! meaning of every element without a second lookup.

use crate::xml::Tag;
use std::collections::BTreeSet;

/// Faction id of the player in `factions/faction[@id]`.
pub const PLAYER_FACTION: &str = "player";

/// `stat[@id]` mirroring the player's money.
pub const MONEY_STAT_ID: &str = "money_player";

/// Gameplay role of a `component` element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentRole {
    Player,
    Npc,
    Ship,
    Station,
    Other,
}

impl ComponentRole {
    fn classify(class: &str, id: &str) -> Self {
        let class = class.to_ascii_lowercase();
        if class == "player" {
            ComponentRole::Player
        } else if id.is_empty() {
            ComponentRole::Other
        } else if class == "npc" {
            ComponentRole::Npc
        } else if class.contains("ship") {
            ComponentRole::Ship
        } else if class.contains("station") {
            ComponentRole::Station
        } else {
            ComponentRole::Other
        }
    }

    /// Ships and stations carry control posts.
    pub fn is_container(self) -> bool {
        matches!(self, ComponentRole::Ship | ComponentRole::Station)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentFrame {
    pub id: String,
    pub class: String,
    pub role: ComponentRole,
}

/// Whose skills a `skills` block describes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkillOwner {
    Npc(String),
    Crew { ship: String, slot: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameKind {
    Info,
    InfoSave,
    InfoGame,
    InfoPlayer,
    InfoPatches,
    InfoPatchHistory,
    InfoPatch { history: bool },
    /// The `player` element outside `info` holding `money`.
    LedgerPlayer,
    MoneyStat,
    Faction { id: String },
    Relations { faction: String },
    Relation { faction: String, target: String },
    Booster { faction: String, target: String },
    Account { id: String },
    /// The player faction's `licences` block.
    Licences,
    Licence { type_name: String },
    Component(ComponentFrame),
    Traits { npc: String },
    NpcSeed { npc: String },
    Skills(SkillOwner),
    Skill(SkillOwner),
    Control { container: String },
    Post { container: String, id: String, npc: String },
    People { ship: String },
    Person { ship: String, slot: usize },
    Modification { ship: String },
    ModificationPart { ship: String, slot: usize },
    Blueprints,
    Blueprint { ware: String },
    /// The player component's `inventory` block.
    Inventory,
    InventoryWare { ware: String },
    Other,
}

/// Facts collected about the children of an open element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Marks {
    /// Keys of recognised children: relation targets (boosters excluded),
    /// licence types, blueprint and inventory wares.
    pub seen: BTreeSet<String>,
    /// Number of crew persons entered so far.
    pub ordinal: usize,
    /// Modification parts seen under a ship, counted across every
    /// modification block it carries.
    pub parts: usize,
    pub has_relations: bool,
    pub has_licences: bool,
    pub has_inventory: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub name: String,
    pub kind: FrameKind,
    pub marks: Marks,
}

#[derive(Debug, Default)]
pub struct ScanContext {
    frames: Vec<Frame>,
}

impl ScanContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn top(&self) -> Option<&Frame> {
        self.frames.last()
    }

    pub fn top_mut(&mut self) -> Option<&mut Frame> {
        self.frames.last_mut()
    }

    /// Innermost open faction id.
    pub fn current_faction(&self) -> Option<&str> {
        self.frames.iter().rev().find_map(|frame| match &frame.kind {
            FrameKind::Faction { id } => Some(id.as_str()),
            _ => None,
        })
    }

    pub fn nearest_component(&self) -> Option<&ComponentFrame> {
        self.frames.iter().rev().find_map(|frame| match &frame.kind {
            FrameKind::Component(component) => Some(component),
            _ => None,
        })
    }

    pub fn in_info(&self) -> bool {
        self.frames
            .iter()
            .any(|frame| matches!(frame.kind, FrameKind::Info))
    }

    /// Innermost open frame matching `pred`.
    pub fn enclosing_mut<F>(&mut self, pred: F) -> Option<&mut Frame>
    where
        F: Fn(&FrameKind) -> bool,
    {
        self.frames.iter_mut().rev().find(|frame| pred(&frame.kind))
    }

    /// Classify `tag`, push its frame and return the frame kind.
    pub fn enter(&mut self, tag: &Tag) -> FrameKind {
        let kind = self.classify(tag);
        self.mark_parents(&kind);
        self.frames.push(Frame {
            name: tag.name().to_string(),
            kind: kind.clone(),
            marks: Marks::default(),
        });
        kind
    }

    /// Pop the innermost frame.
    pub fn leave(&mut self) -> Option<Frame> {
        self.frames.pop()
    }

    fn classify(&mut self, tag: &Tag) -> FrameKind {
        let depth = self.frames.len();
        let attr = |key: &str| tag.get(key).unwrap_or("").trim().to_string();

        // Positional children first; they need the parent's counter.
        if let Some(parent) = self.frames.last_mut() {
            match &parent.kind {
                FrameKind::People { ship } if tag.is("person") => {
                    let slot = parent.marks.ordinal;
                    parent.marks.ordinal += 1;
                    return FrameKind::Person {
                        ship: ship.clone(),
                        slot,
                    };
                }
                _ => {}
            }
        }

        if let Some(FrameKind::Modification { ship }) = self.top().map(|frame| &frame.kind) {
            let ship = ship.clone();
            let owner = self.enclosing_mut(|kind| matches!(kind, FrameKind::Component(_)));
            let slot = owner.map_or(0, |frame| {
                frame.marks.parts += 1;
                frame.marks.parts - 1
            });
            return FrameKind::ModificationPart { ship, slot };
        }

        let (parent_kind, parent_name) = match self.frames.last() {
            Some(parent) => (parent.kind.clone(), parent.name.clone()),
            None => (FrameKind::Other, String::new()),
        };

        match parent_kind {
            FrameKind::Info => {
                if tag.is("save") {
                    return FrameKind::InfoSave;
                }
                if tag.is("game") {
                    return FrameKind::InfoGame;
                }
                if tag.is("player") {
                    return FrameKind::InfoPlayer;
                }
                if tag.is("patches") {
                    return FrameKind::InfoPatches;
                }
            }
            FrameKind::InfoPatches if tag.is("history") => return FrameKind::InfoPatchHistory,
            FrameKind::InfoPatches if tag.is("patch") => {
                return FrameKind::InfoPatch { history: false }
            }
            FrameKind::InfoPatchHistory if tag.is("patch") => {
                return FrameKind::InfoPatch { history: true }
            }
            FrameKind::Faction { id } if tag.is("relations") => {
                return FrameKind::Relations { faction: id }
            }
            FrameKind::Faction { id } if tag.is("licences") && id == PLAYER_FACTION => {
                return FrameKind::Licences
            }
            FrameKind::Relations { faction } if tag.is("relation") => {
                return FrameKind::Relation {
                    faction,
                    target: attr("faction"),
                }
            }
            FrameKind::Relations { faction } if tag.is("booster") => {
                return FrameKind::Booster {
                    faction,
                    target: attr("faction"),
                }
            }
            FrameKind::Licences if tag.is("licence") => {
                return FrameKind::Licence {
                    type_name: attr("type"),
                }
            }
            FrameKind::Traits { npc } if tag.is("skills") => {
                return FrameKind::Skills(SkillOwner::Npc(npc))
            }
            FrameKind::Person { ship, slot } if tag.is("skills") => {
                return FrameKind::Skills(SkillOwner::Crew { ship, slot })
            }
            FrameKind::Skills(owner) if tag.is("skill") => return FrameKind::Skill(owner),
            FrameKind::Control { container } if tag.is("post") => {
                return FrameKind::Post {
                    container,
                    id: attr("id"),
                    npc: attr("component"),
                }
            }
            FrameKind::Blueprints if tag.is("blueprint") => {
                return FrameKind::Blueprint {
                    ware: attr("ware"),
                }
            }
            FrameKind::Inventory if tag.is("ware") => {
                return FrameKind::InventoryWare {
                    ware: attr("ware"),
                }
            }
            _ => {}
        }

        if tag.is("info") && depth == 1 {
            return FrameKind::Info;
        }
        if tag.is("component") {
            let id = attr("id");
            let class = attr("class");
            let role = ComponentRole::classify(&class, &id);
            return FrameKind::Component(ComponentFrame { id, class, role });
        }
        if tag.is("faction") && parent_name.eq_ignore_ascii_case("factions") {
            return FrameKind::Faction { id: attr("id") };
        }
        if tag.is("account") {
            return FrameKind::Account { id: attr("id") };
        }
        if tag.is("stat") && tag.get("id") == Some(MONEY_STAT_ID) {
            return FrameKind::MoneyStat;
        }
        if tag.is("player") && tag.has("money") && !self.in_info() {
            return FrameKind::LedgerPlayer;
        }
        if tag.is("blueprints") {
            return FrameKind::Blueprints;
        }

        let component = match self.nearest_component() {
            Some(component) => component.clone(),
            None => return FrameKind::Other,
        };
        match component.role {
            ComponentRole::Npc if tag.is("traits") => FrameKind::Traits { npc: component.id },
            ComponentRole::Npc if tag.is("npcseed") => FrameKind::NpcSeed { npc: component.id },
            ComponentRole::Ship if tag.is("people") => FrameKind::People { ship: component.id },
            ComponentRole::Ship if tag.is("modification") => {
                FrameKind::Modification { ship: component.id }
            }
            ComponentRole::Player if tag.is("inventory") => FrameKind::Inventory,
            role if role.is_container() && tag.is("control") => FrameKind::Control {
                container: component.id,
            },
            _ => FrameKind::Other,
        }
    }

    fn mark_parents(&mut self, kind: &FrameKind) {
        match kind {
            FrameKind::Relations { .. } => {
                if let Some(faction) = self.top_mut() {
                    faction.marks.has_relations = true;
                }
            }
            FrameKind::Licences => {
                if let Some(faction) = self.top_mut() {
                    faction.marks.has_licences = true;
                }
            }
            FrameKind::Inventory => {
                let player = self.enclosing_mut(|kind| {
                    matches!(kind, FrameKind::Component(c) if c.role == ComponentRole::Player)
                });
                if let Some(player) = player {
                    player.marks.has_inventory = true;
                }
            }
            FrameKind::Relation { target, .. } => {
                if let Some(relations) = self.top_mut() {
                    relations.marks.seen.insert(target.clone());
                }
            }
            FrameKind::Licence { type_name } => {
                if let Some(licences) = self.top_mut() {
                    licences.marks.seen.insert(type_name.clone());
                }
            }
            FrameKind::Blueprint { ware } | FrameKind::InventoryWare { ware } => {
                if let Some(block) = self.top_mut() {
                    block.marks.seen.insert(ware.clone());
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enter(ctx: &mut ScanContext, name: &str, attrs: &[(&str, &str)]) -> FrameKind {
        let mut tag = Tag::new(name);
        for (key, value) in attrs {
            tag.set(key, *value);
        }
        ctx.enter(&tag)
    }

    #[test]
    fn test_info_children() {
        let mut ctx = ScanContext::new();
        enter(&mut ctx, "savegame", &[]);
        assert_eq!(enter(&mut ctx, "info", &[]), FrameKind::Info);
        assert_eq!(
            enter(&mut ctx, "player", &[("name", "Val"), ("money", "1")]),
            FrameKind::InfoPlayer
        );
        ctx.leave();
        assert_eq!(enter(&mut ctx, "patches", &[]), FrameKind::InfoPatches);
        assert_eq!(
            enter(&mut ctx, "patch", &[("extension", "ego_dlc_split")]),
            FrameKind::InfoPatch { history: false }
        );
        ctx.leave();
        assert_eq!(enter(&mut ctx, "history", &[]), FrameKind::InfoPatchHistory);
        assert_eq!(
            enter(&mut ctx, "patch", &[]),
            FrameKind::InfoPatch { history: true }
        );
    }

    #[test]
    fn test_ledger_player_only_outside_info() {
        let mut ctx = ScanContext::new();
        enter(&mut ctx, "savegame", &[]);
        assert_eq!(
            enter(&mut ctx, "player", &[("money", "10")]),
            FrameKind::LedgerPlayer
        );
        ctx.leave();
        assert_eq!(enter(&mut ctx, "player", &[]), FrameKind::Other);
    }

    #[test]
    fn test_faction_relations_and_marks() {
        let mut ctx = ScanContext::new();
        enter(&mut ctx, "savegame", &[]);
        enter(&mut ctx, "factions", &[]);
        enter(&mut ctx, "faction", &[("id", "player")]);
        assert_eq!(ctx.current_faction(), Some("player"));
        enter(&mut ctx, "relations", &[]);
        assert_eq!(
            enter(&mut ctx, "relation", &[("faction", "argon")]),
            FrameKind::Relation {
                faction: "player".into(),
                target: "argon".into()
            }
        );
        ctx.leave();
        let relations = ctx.leave().unwrap();
        assert!(relations.marks.seen.contains("argon"));
        assert_eq!(enter(&mut ctx, "licences", &[]), FrameKind::Licences);
        ctx.leave();
        let faction = ctx.leave().unwrap();
        assert!(faction.marks.has_relations);
        assert!(faction.marks.has_licences);
    }

    #[test]
    fn test_licences_only_for_player_faction() {
        let mut ctx = ScanContext::new();
        enter(&mut ctx, "factions", &[]);
        enter(&mut ctx, "faction", &[("id", "argon")]);
        assert_eq!(enter(&mut ctx, "licences", &[]), FrameKind::Other);
    }

    #[test]
    fn test_faction_requires_factions_parent() {
        let mut ctx = ScanContext::new();
        enter(&mut ctx, "savegame", &[]);
        assert_eq!(enter(&mut ctx, "faction", &[("id", "argon")]), FrameKind::Other);
    }

    #[test]
    fn test_crew_slots_are_positional() {
        let mut ctx = ScanContext::new();
        enter(&mut ctx, "savegame", &[]);
        enter(&mut ctx, "component", &[("class", "ship_s"), ("id", "[0x10]")]);
        enter(&mut ctx, "people", &[]);
        for expected in 0..3 {
            let kind = enter(&mut ctx, "person", &[("role", "service")]);
            assert_eq!(
                kind,
                FrameKind::Person {
                    ship: "[0x10]".into(),
                    slot: expected
                }
            );
            if expected == 1 {
                assert_eq!(
                    enter(&mut ctx, "skills", &[("morale", "3")]),
                    FrameKind::Skills(SkillOwner::Crew {
                        ship: "[0x10]".into(),
                        slot: 1
                    })
                );
                ctx.leave();
            }
            ctx.leave();
        }
    }

    #[test]
    fn test_modification_parts_any_name() {
        let mut ctx = ScanContext::new();
        enter(&mut ctx, "component", &[("class", "ship_m"), ("id", "[0x11]")]);
        enter(&mut ctx, "modification", &[]);
        assert_eq!(
            enter(&mut ctx, "engine", &[("ware", "mod_engine_01")]),
            FrameKind::ModificationPart {
                ship: "[0x11]".into(),
                slot: 0
            }
        );
        ctx.leave();
        assert_eq!(
            enter(&mut ctx, "paint", &[]),
            FrameKind::ModificationPart {
                ship: "[0x11]".into(),
                slot: 1
            }
        );
    }

    #[test]
    fn test_modification_slots_continue_across_blocks() {
        let mut ctx = ScanContext::new();
        enter(&mut ctx, "component", &[("class", "ship_l"), ("id", "[0x12]")]);
        enter(&mut ctx, "modification", &[]);
        enter(&mut ctx, "engine", &[]);
        ctx.leave();
        enter(&mut ctx, "ship", &[]);
        ctx.leave();
        ctx.leave();
        enter(&mut ctx, "connections", &[]);
        enter(&mut ctx, "modification", &[]);
        assert_eq!(
            enter(&mut ctx, "paint", &[]),
            FrameKind::ModificationPart {
                ship: "[0x12]".into(),
                slot: 2
            }
        );
    }

    #[test]
    fn test_npc_traits_do_not_leak_into_nested_components() {
        let mut ctx = ScanContext::new();
        enter(&mut ctx, "component", &[("class", "npc"), ("id", "[0x20]")]);
        assert_eq!(
            enter(&mut ctx, "traits", &[]),
            FrameKind::Traits { npc: "[0x20]".into() }
        );
        assert_eq!(
            enter(&mut ctx, "skills", &[]),
            FrameKind::Skills(SkillOwner::Npc("[0x20]".into()))
        );
        ctx.leave();
        ctx.leave();
        enter(&mut ctx, "component", &[("class", "ship_xs")]);
        assert_eq!(enter(&mut ctx, "traits", &[]), FrameKind::Other);
    }

    #[test]
    fn test_player_inventory_marks_component() {
        let mut ctx = ScanContext::new();
        enter(&mut ctx, "component", &[("class", "player")]);
        assert_eq!(enter(&mut ctx, "inventory", &[]), FrameKind::Inventory);
        assert_eq!(
            enter(&mut ctx, "ware", &[("ware", "inv_remotedetonator")]),
            FrameKind::InventoryWare {
                ware: "inv_remotedetonator".into()
            }
        );
        ctx.leave();
        let inventory = ctx.leave().unwrap();
        assert!(inventory.marks.seen.contains("inv_remotedetonator"));
        let player = ctx.leave().unwrap();
        assert!(player.marks.has_inventory);
    }

    #[test]
    fn test_control_posts_on_containers() {
        let mut ctx = ScanContext::new();
        enter(&mut ctx, "component", &[("class", "station"), ("id", "[0x30]")]);
        enter(&mut ctx, "control", &[]);
        assert_eq!(
            enter(&mut ctx, "post", &[("id", "manager"), ("component", "[0x31]")]),
            FrameKind::Post {
                container: "[0x30]".into(),
                id: "manager".into(),
                npc: "[0x31]".into()
            }
        );
    }
}
