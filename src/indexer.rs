//! Single-pass indexer building a [`SaveModel`].

use crate::compression;
use crate::error::SaveError;
use crate::model::{
    is_known_skill, parse_faction_list, BoosterEdge, Container, CrewMember, Extension,
    LicenceEntry, ModificationPart, Npc, Post, RelationEdge, SaveModel, Ship, KNOWN_SKILL_KEYS,
};
use crate::scan::{ComponentRole, FrameKind, ScanContext, SkillOwner, PLAYER_FACTION};
use crate::xml::{ScanError, Tag, XmlEvent, XmlSource};
use std::collections::{BTreeMap, HashMap};
use std::io::BufRead;
use std::path::Path;

/// Index a save from any buffered reader of decompressed XML.
pub fn index<R: BufRead>(input: R) -> Result<SaveModel, SaveError> {
    let mut source = XmlSource::new(input);
    let mut indexer = Indexer::default();

    loop {
        let event = source.next_event()?;
        match event {
            XmlEvent::Start(tag) => indexer.open(&tag),
            XmlEvent::Empty(tag) => {
                indexer.open(&tag);
                indexer.ctx.leave();
            }
            XmlEvent::End(_) => {
                indexer.ctx.leave();
            }
            XmlEvent::Text(_) | XmlEvent::Markup(_) => {}
            XmlEvent::Eof => break,
        }
    }

    if let Some(frame) = indexer.ctx.top() {
        return Err(ScanError::malformed(
            source.position(),
            format!("unexpected end of document inside <{}>", frame.name),
        )
        .into());
    }

    Ok(indexer.finish())
}

/// Index a save file, decompressing it when needed.
pub fn index_path(path: &Path) -> Result<SaveModel, SaveError> {
    let input = compression::open_input(path).map_err(SaveError::Read)?;
    let mut model = index(input)?;
    model.metadata.source_path = Some(path.to_path_buf());
    log::debug!(
        "indexed {}: {} factions, {} npcs, {} ships",
        path.display(),
        model.factions.len(),
        model.skills.npcs.len(),
        model.skills.ships.len()
    );
    Ok(model)
}

#[derive(Default)]
struct Indexer {
    ctx: ScanContext,
    model: SaveModel,
    account_counts: HashMap<String, usize>,
}

impl Indexer {
    fn open(&mut self, tag: &Tag) {
        let kind = self.ctx.enter(tag);
        let attr = |key: &str| tag.get(key).unwrap_or("").to_string();
        let model = &mut self.model;

        match kind {
            FrameKind::InfoSave => {
                if tag.has("name") {
                    model.metadata.save_name = attr("name");
                    model.metadata.save_date = attr("date");
                }
            }
            FrameKind::InfoGame => {
                let game = &mut model.metadata.game;
                game.id = attr("id");
                game.version = attr("version");
                game.build = attr("build");
                game.time = attr("time");
                game.code = attr("code");
                game.original = attr("original");
                game.original_build = attr("originalbuild");
                game.start = attr("start");
                game.seed = attr("seed");
                game.guid = attr("guid");
                model.metadata.modified = tag.get("modified").map(|value| value.trim() == "1");
            }
            FrameKind::InfoPlayer => {
                model.metadata.player_name = attr("name");
                model.credits.info_money = tag.get("money").map(str::to_string);
            }
            FrameKind::InfoPatch { history } => {
                let id = attr("extension").trim().to_string();
                if !id.is_empty() {
                    model.metadata.extensions.record(
                        history,
                        Extension {
                            id,
                            version: attr("version"),
                            name: attr("name"),
                        },
                    );
                }
            }
            FrameKind::LedgerPlayer => {
                if model.credits.player_money.is_none() {
                    model.credits.player_money = Some(attr("money"));
                    model.credits.player_name = attr("name");
                    model.credits.player_location = attr("location");
                }
            }
            FrameKind::MoneyStat => model.credits.stat_money_player = Some(attr("value")),
            FrameKind::Faction { id } => {
                if id == PLAYER_FACTION {
                    model.licences.player_faction_found = true;
                }
                if !id.is_empty() {
                    model.factions.insert(id);
                }
            }
            FrameKind::Account { id } => {
                if self.ctx.current_faction() == Some(PLAYER_FACTION)
                    && model.credits.wallet_account_id.is_none()
                {
                    model.credits.wallet_account_id = Some(id.clone());
                    model.credits.wallet_amount = Some(attr("amount"));
                }
                *self.account_counts.entry(id).or_default() += 1;
            }
            FrameKind::Relation { faction, target } => {
                let edge = RelationEdge {
                    target,
                    value: attr("relation"),
                };
                if faction == PLAYER_FACTION {
                    model.relations.player.push(edge.clone());
                }
                model.relations.by_faction.entry(faction).or_default().push(edge);
            }
            FrameKind::Booster { faction, target } => {
                let edge = BoosterEdge {
                    target,
                    value: attr("relation"),
                    time: attr("time"),
                };
                if faction == PLAYER_FACTION {
                    model.relations.player_boosters.push(edge.clone());
                }
                model
                    .relations
                    .boosters_by_faction
                    .entry(faction)
                    .or_default()
                    .push(edge);
            }
            FrameKind::Licences => model.licences.block_found = true,
            FrameKind::Licence { type_name } => {
                let factions = attr("factions");
                if !type_name.is_empty() {
                    model
                        .licences
                        .by_type
                        .entry(type_name.clone())
                        .or_default()
                        .extend(parse_faction_list(&factions));
                }
                model.licences.entries.push(LicenceEntry {
                    type_name,
                    factions,
                });
            }
            FrameKind::Blueprints => model.blueprints.block_found = true,
            FrameKind::Blueprint { ware } => {
                if !ware.is_empty() {
                    model.blueprints.owned.insert(ware);
                }
            }
            FrameKind::Component(component) => match component.role {
                ComponentRole::Player => model.inventory.player_component_found = true,
                ComponentRole::Npc => {
                    model
                        .skills
                        .npcs
                        .entry(component.id.clone())
                        .or_insert_with(|| Npc {
                            id: component.id.clone(),
                            name: attr("name"),
                            owner: attr("owner"),
                            ..Npc::default()
                        });
                }
                ComponentRole::Ship | ComponentRole::Station => {
                    model.skills.containers.insert(
                        component.id.clone(),
                        Container {
                            id: component.id.clone(),
                            class: component.class.clone(),
                            macro_name: attr("macro"),
                            code: attr("code"),
                            owner: attr("owner"),
                            name: attr("name"),
                            location: attr("location"),
                        },
                    );
                    if component.role == ComponentRole::Ship {
                        model
                            .skills
                            .ships
                            .entry(component.id.clone())
                            .or_insert_with(|| Ship {
                                id: component.id.clone(),
                                ..Ship::default()
                            });
                    }
                }
                ComponentRole::Other => {}
            },
            FrameKind::NpcSeed { npc } => {
                if let Some(npc) = model.skills.npcs.get_mut(&npc) {
                    npc.npc_seed = attr("seed");
                }
            }
            FrameKind::Skills(owner) => {
                let mut found = false;
                for key in KNOWN_SKILL_KEYS {
                    if let Some(raw) = tag.get(key) {
                        found = true;
                        model.skills.supported_skill_keys.insert(key.to_string());
                        if let Some(value) = parse_skill(raw, key) {
                            if let Some(skills) = skill_map(model, &owner) {
                                skills.insert(key.to_string(), value);
                            }
                        }
                    }
                }
                if found {
                    model.skills.styles.attributes = true;
                }
            }
            FrameKind::Skill(owner) => {
                let key = attr("type").trim().to_string();
                if is_known_skill(&key) {
                    model.skills.styles.elements = true;
                    model.skills.supported_skill_keys.insert(key.clone());
                    if let Some(value) = parse_skill(tag.get("value").unwrap_or(""), &key) {
                        if let Some(skills) = skill_map(model, &owner) {
                            skills.insert(key, value);
                        }
                    }
                }
            }
            FrameKind::Post { container, id, npc } => {
                if !npc.is_empty() {
                    model
                        .skills
                        .posts_by_container
                        .entry(container)
                        .or_default()
                        .push(Post {
                            post_id: id,
                            npc_id: npc,
                        });
                }
            }
            FrameKind::Person { ship, slot } => {
                if let Some(ship) = model.skills.ships.get_mut(&ship) {
                    ship.crew.push(CrewMember {
                        slot,
                        role: attr("role"),
                        macro_name: attr("macro"),
                        skills: BTreeMap::new(),
                    });
                }
            }
            FrameKind::ModificationPart { ship, slot } => {
                if let Some(ship) = model.skills.ships.get_mut(&ship) {
                    ship.modifications.push(ModificationPart {
                        slot,
                        kind: tag.name().to_string(),
                        attributes: tag
                            .attrs()
                            .map(|(key, value)| (key.to_string(), value.to_string()))
                            .collect(),
                    });
                }
            }
            FrameKind::Inventory => model.inventory.block_found = true,
            FrameKind::InventoryWare { ware } => {
                if !ware.is_empty() {
                    let amount = tag.get("amount").unwrap_or("0");
                    let amount = match parse_number(amount) {
                        Some(amount) => amount.trunc() as i64,
                        None => {
                            log::warn!("inventory ware '{ware}' has unparsable amount '{amount}'");
                            0
                        }
                    };
                    model.inventory.player.insert(ware, amount);
                }
            }
            _ => {}
        }
    }

    fn finish(mut self) -> SaveModel {
        let model = &mut self.model;
        if let Some(wallet) = &model.credits.wallet_account_id {
            model.credits.wallet_account_occurrences =
                self.account_counts.get(wallet).copied().unwrap_or(0);
        }
        model.relations.collect_contacts(PLAYER_FACTION);
        model.licences.summarize();
        model.skills.link_posts();
        self.model
    }
}

fn skill_map<'a>(model: &'a mut SaveModel, owner: &SkillOwner) -> Option<&'a mut BTreeMap<String, i64>> {
    match owner {
        SkillOwner::Npc(id) => model.skills.npcs.get_mut(id).map(|npc| &mut npc.skills),
        SkillOwner::Crew { ship, slot } => model
            .skills
            .ships
            .get_mut(ship)?
            .crew
            .iter_mut()
            .find(|member| member.slot == *slot)
            .map(|member| &mut member.skills),
    }
}

pub(crate) fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|value| value.is_finite())
}

fn parse_skill(raw: &str, key: &str) -> Option<i64> {
    let value = parse_number(raw).map(|value| value.trunc() as i64);
    if value.is_none() {
        log::warn!("skill '{key}' has unparsable value '{raw}'");
    }
    value
}
