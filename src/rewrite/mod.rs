//! Streaming rewrite of a save document.
//!
//! [`rewrite`] reads the document a second time, classifies every element
//! with the same [`ScanContext`] the indexer uses, and re-emits it. Each
//! element is either passed through byte for byte, written with some
//! attributes changed, dropped together with its subtree, or buffered so a
//! structural patch can be applied to the whole component. Elements an edit
//! needs but the document lacks are inserted when their parent closes.

pub mod insert;
pub mod structural;

mod sink;

use crate::config::normalize::{LicenceOutcome, NormalizedDiff, RelationEdit};
use crate::error::{ReferenceError, SaveError};
use crate::indexer::parse_number;
use crate::model::{join_faction_list, parse_faction_list, SaveModel};
use crate::scan::{ComponentRole, Frame, FrameKind, ScanContext, PLAYER_FACTION};
use crate::xml::{Element, ScanError, Tag, XmlEvent, XmlSource};
use serde::Serialize;
use sink::Sink;
use std::collections::{BTreeMap, BTreeSet};
use std::io::{BufRead, Write};
use structural::{patch_fragment, StructuralPlan, StructuralReport};

/// Lifecycle of one rewrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Scanning,
    /// Stream consumed; post-pass reference checks running.
    Finalizing,
    Committed,
    Aborted,
}

/// How many document locations each category touched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryCounts {
    pub credits_anchors_updated: usize,
    pub wallet_accounts_updated: usize,
    pub blueprints_inserted: usize,
    pub relations_updated: usize,
    pub relations_inserted: usize,
    pub boosters_deleted: usize,
    pub licences_updated: usize,
    pub licences_inserted: usize,
    pub licences_removed: usize,
    pub inventory_updated: usize,
    pub inventory_inserted: usize,
    pub player_names_updated: usize,
    pub modified_flags_updated: usize,
    pub skill_updates: usize,
    pub ship_attribute_updates: usize,
    pub ship_modification_updates: usize,
    pub objects_deleted: usize,
}

impl CategoryCounts {
    /// Labelled counters in report order.
    pub fn entries(&self) -> [(&'static str, usize); 17] {
        [
            ("credits anchors updated", self.credits_anchors_updated),
            ("wallet accounts updated", self.wallet_accounts_updated),
            ("blueprints inserted", self.blueprints_inserted),
            ("relations updated", self.relations_updated),
            ("relations inserted", self.relations_inserted),
            ("boosters deleted", self.boosters_deleted),
            ("licences updated", self.licences_updated),
            ("licences inserted", self.licences_inserted),
            ("licences removed", self.licences_removed),
            ("inventory updated", self.inventory_updated),
            ("inventory inserted", self.inventory_inserted),
            ("player names updated", self.player_names_updated),
            ("modified flags updated", self.modified_flags_updated),
            ("skill updates", self.skill_updates),
            ("ship attribute updates", self.ship_attribute_updates),
            ("ship modification updates", self.ship_modification_updates),
            ("objects deleted", self.objects_deleted),
        ]
    }

    pub fn total(&self) -> usize {
        self.entries().iter().map(|(_, count)| count).sum()
    }
}

/// What to do with an opening element.
enum Action {
    Keep,
    Suppress,
    Capture,
}

/// Rewrite `input` into `output`, applying `diff`.
///
/// `model` must be the index of the same document. Nothing is validated
/// here beyond references: `diff` is expected to come from
/// [`crate::config::normalize`].
pub fn rewrite<R: BufRead, W: Write>(
    input: R,
    output: &mut W,
    diff: &NormalizedDiff,
    model: &SaveModel,
) -> Result<CategoryCounts, SaveError> {
    let mut rewriter = Rewriter::new(diff, model);
    rewriter.run(input, output)?;
    Ok(rewriter.counts)
}

pub struct Rewriter<'a> {
    diff: &'a NormalizedDiff,
    model: &'a SaveModel,
    phase: Phase,
    ctx: ScanContext,
    /// Open elements left in the subtree being dropped.
    skip: usize,
    /// NPC skill edits with officer edits resolved to their NPCs.
    npc_skills: BTreeMap<String, BTreeMap<String, i64>>,
    structural: StructuralReport,
    seen_factions: BTreeSet<String>,
    player_component_found: bool,
    blueprints_done: bool,
    /// Requested deletions that left the document.
    deleted: BTreeSet<String>,
    /// Every component id that left the document, nested ones included.
    dropped: BTreeSet<String>,
    /// Ships whose attribute edits were written.
    attributes_applied: BTreeSet<String>,
    counts: CategoryCounts,
}

impl<'a> Rewriter<'a> {
    pub fn new(diff: &'a NormalizedDiff, model: &'a SaveModel) -> Self {
        Self {
            diff,
            model,
            phase: Phase::Idle,
            ctx: ScanContext::new(),
            skip: 0,
            npc_skills: BTreeMap::new(),
            structural: StructuralReport::default(),
            seen_factions: BTreeSet::new(),
            player_component_found: false,
            blueprints_done: false,
            deleted: BTreeSet::new(),
            dropped: BTreeSet::new(),
            attributes_applied: BTreeSet::new(),
            counts: CategoryCounts::default(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn counts(&self) -> &CategoryCounts {
        &self.counts
    }

    /// Run the whole pass. Any error leaves the rewriter `Aborted`; the
    /// caller must discard whatever reached `output`.
    pub fn run<R: BufRead, W: Write>(
        &mut self,
        input: R,
        output: &mut W,
    ) -> Result<(), SaveError> {
        let result = self.pass(input, output);
        match &result {
            Ok(()) => self.transition(Phase::Committed),
            Err(err) => {
                log::debug!("rewrite aborted: {err}");
                self.transition(Phase::Aborted);
            }
        }
        result
    }

    fn transition(&mut self, to: Phase) {
        log::debug!("rewrite phase {:?} -> {:?}", self.phase, to);
        self.phase = to;
    }

    fn pass<R: BufRead, W: Write>(&mut self, input: R, output: &mut W) -> Result<(), SaveError> {
        self.prepare()?;
        self.transition(Phase::Scanning);

        let mut source = XmlSource::new(input);
        let mut sink = Sink::new(output);
        loop {
            match source.next_event()? {
                XmlEvent::Start(tag) => self.on_start(tag, &mut sink)?,
                XmlEvent::Empty(tag) => self.on_empty(tag, &mut sink)?,
                XmlEvent::End(name) => {
                    let position = source.position();
                    self.on_end(&name, &mut sink, position)?
                }
                XmlEvent::Text(bytes) if self.skip == 0 => {
                    sink.text(bytes).map_err(SaveError::Write)?
                }
                XmlEvent::Markup(bytes) if self.skip == 0 => {
                    sink.markup(bytes).map_err(SaveError::Write)?
                }
                XmlEvent::Text(_) | XmlEvent::Markup(_) => {}
                XmlEvent::Eof => break,
            }
        }
        if let Some(frame) = self.ctx.top() {
            return Err(ScanError::malformed(
                source.position(),
                format!("unclosed element <{}> at end of document", frame.name),
            )
            .into());
        }
        output.flush().map_err(SaveError::Write)?;

        self.transition(Phase::Finalizing);
        self.verify()?;
        log::debug!("rewrite counts: {:?}", self.counts);
        Ok(())
    }

    /// Reference checks that only need the model.
    fn prepare(&mut self) -> Result<(), ReferenceError> {
        let skills = &self.model.skills;
        let supported = &skills.supported_skill_keys;
        let check_keys = |values: &BTreeMap<String, i64>| -> Result<(), ReferenceError> {
            match values.keys().find(|key| !supported.is_empty() && !supported.contains(*key)) {
                Some(key) => Err(ReferenceError::UnsupportedSkill {
                    key: key.clone(),
                    supported: supported.iter().cloned().collect::<Vec<_>>().join(", "),
                }),
                None => Ok(()),
            }
        };

        let mut npc_skills = self.diff.npc_skills.clone();
        for (npc, values) in &self.diff.npc_skills {
            if !skills.npcs.contains_key(npc) {
                return Err(ReferenceError::UnknownNpc { npc: npc.clone() });
            }
            check_keys(values)?;
        }

        for (ship_id, edit) in &self.diff.ships {
            let ship = skills
                .ships
                .get(ship_id)
                .ok_or_else(|| ReferenceError::UnknownShip {
                    ship: ship_id.clone(),
                })?;
            for (slot, values) in &edit.crew {
                if !ship.has_crew_slot(*slot) {
                    return Err(ReferenceError::UnknownCrewSlot {
                        ship: ship_id.clone(),
                        slot: *slot,
                    });
                }
                check_keys(values)?;
            }
            for slot in edit.modifications.keys() {
                if !ship.has_modification_slot(*slot) {
                    return Err(ReferenceError::UnknownModificationSlot {
                        ship: ship_id.clone(),
                        slot: *slot,
                    });
                }
            }
            for (post, values) in &edit.officers {
                let npc = skills.officer(ship_id, post).ok_or_else(|| {
                    ReferenceError::UnknownOfficerPost {
                        ship: ship_id.clone(),
                        post: post.clone(),
                    }
                })?;
                if !skills.npcs.contains_key(npc) {
                    return Err(ReferenceError::UnknownNpc {
                        npc: npc.to_string(),
                    });
                }
                check_keys(values)?;
                npc_skills
                    .entry(npc.to_string())
                    .or_default()
                    .extend(values.iter().map(|(key, value)| (key.clone(), *value)));
            }
        }

        self.npc_skills = npc_skills;
        Ok(())
    }

    /// Reference checks against what the pass actually saw.
    fn verify(&self) -> Result<(), ReferenceError> {
        let player_found = self.seen_factions.contains(PLAYER_FACTION);
        if !self.diff.relations.is_empty() && !player_found {
            return Err(ReferenceError::MissingPlayerFaction {
                operation: "relations",
            });
        }
        if let Some(faction) = self
            .diff
            .relations
            .keys()
            .find(|faction| !self.seen_factions.contains(*faction))
        {
            return Err(ReferenceError::MissingFaction {
                faction: faction.clone(),
            });
        }
        if !self.diff.licences.is_empty() && !player_found {
            return Err(ReferenceError::MissingPlayerFaction {
                operation: "licences",
            });
        }
        if !self.diff.inventory.is_empty() && !self.player_component_found {
            return Err(ReferenceError::MissingPlayerComponent);
        }
        if let Some(id) = self
            .diff
            .deletions
            .iter()
            .find(|id| !self.deleted.contains(*id))
        {
            return Err(ReferenceError::ObjectNotFound { id: id.clone() });
        }
        if let Some(id) = self
            .diff
            .ships
            .keys()
            .chain(self.npc_skills.keys())
            .find(|id| self.dropped.contains(*id))
        {
            return Err(ReferenceError::EditOnDeletedObject { id: id.clone() });
        }
        if let Some(ship) = self
            .diff
            .ships
            .iter()
            .find(|(id, edit)| !edit.attributes.is_empty() && !self.attributes_applied.contains(*id))
            .map(|(id, _)| id)
        {
            return Err(ReferenceError::EditNotApplied {
                target: format!("attributes of ship '{ship}'"),
            });
        }
        if let Some(target) = self
            .plan()
            .targets()
            .into_iter()
            .find(|target| !self.structural.applied.contains(target))
        {
            return Err(ReferenceError::EditNotApplied {
                target: target.to_string(),
            });
        }
        Ok(())
    }

    fn plan(&self) -> StructuralPlan<'_> {
        StructuralPlan {
            npc_skills: &self.npc_skills,
            ships: &self.diff.ships,
            style: self.model.skills.styles.preferred(),
        }
    }

    fn on_start<W: Write>(
        &mut self,
        mut tag: Tag,
        sink: &mut Sink<'_, W>,
    ) -> Result<(), SaveError> {
        if self.skip > 0 {
            self.skip += 1;
            self.drop_nested(&tag);
            return Ok(());
        }
        let kind = self.ctx.enter(&tag);
        match self.open(&mut tag, &kind) {
            Action::Suppress => {
                self.ctx.leave();
                self.skip = 1;
                Ok(())
            }
            Action::Capture => sink.start(tag, true).map_err(SaveError::Write),
            Action::Keep => sink.start(tag, false).map_err(SaveError::Write),
        }
    }

    fn on_empty<W: Write>(
        &mut self,
        mut tag: Tag,
        sink: &mut Sink<'_, W>,
    ) -> Result<(), SaveError> {
        if self.skip > 0 {
            self.drop_nested(&tag);
            return Ok(());
        }
        let kind = self.ctx.enter(&tag);
        let action = self.open(&mut tag, &kind);
        let Some(frame) = self.ctx.leave() else {
            return Ok(());
        };
        if matches!(action, Action::Suppress) {
            return Ok(());
        }

        let inserts = self.close(&frame);
        let capture = matches!(action, Action::Capture);
        if inserts.is_empty() && !capture {
            return sink.empty(tag).map_err(SaveError::Write);
        }

        // A self-closing element that gains children is written expanded.
        let mut element = Element::empty(tag);
        for child in inserts {
            element.push(child);
        }
        if capture && !sink.is_capturing() {
            self.patch(&mut element);
        }
        sink.element(element).map_err(SaveError::Write)
    }

    fn on_end<W: Write>(
        &mut self,
        name: &str,
        sink: &mut Sink<'_, W>,
        position: u64,
    ) -> Result<(), SaveError> {
        if self.skip > 0 {
            self.skip -= 1;
            return Ok(());
        }
        let frame = self.ctx.leave().ok_or_else(|| {
            SaveError::from(ScanError::malformed(
                position,
                format!("unexpected closing tag </{name}>"),
            ))
        })?;
        for child in self.close(&frame) {
            sink.element(child).map_err(SaveError::Write)?;
        }
        if let Some(mut fragment) = sink.end(name).map_err(SaveError::Write)? {
            self.patch(&mut fragment);
            sink.element(fragment).map_err(SaveError::Write)?;
        }
        Ok(())
    }

    /// Note a component leaving the document inside a dropped subtree.
    /// A requested deletion found here counts as deleted.
    fn drop_nested(&mut self, tag: &Tag) {
        if !tag.is("component") {
            return;
        }
        let id = tag.get("id").unwrap_or("").trim();
        if id.is_empty() {
            return;
        }
        if self.diff.deletions.contains(id) && self.deleted.insert(id.to_string()) {
            self.counts.objects_deleted += 1;
        }
        self.dropped.insert(id.to_string());
    }

    fn patch(&mut self, fragment: &mut Element) {
        let plan = StructuralPlan {
            npc_skills: &self.npc_skills,
            ships: &self.diff.ships,
            style: self.model.skills.styles.preferred(),
        };
        patch_fragment(fragment, &plan, &mut self.structural);
        self.counts.skill_updates = self.structural.skill_updates;
        self.counts.ship_modification_updates = self.structural.modification_updates;
    }

    fn relation_edit(&self, faction: &str, target: &str) -> Option<&'a RelationEdit> {
        let diff: &'a NormalizedDiff = self.diff;
        if faction == PLAYER_FACTION {
            diff.relations.get(target)
        } else if target == PLAYER_FACTION {
            diff.relations.get(faction)
        } else {
            None
        }
    }

    /// Apply in-place edits to an opening tag.
    fn open(&mut self, tag: &mut Tag, kind: &FrameKind) -> Action {
        let diff = self.diff;
        match kind {
            FrameKind::InfoPlayer => {
                if let Some(credits) = diff.credits {
                    if tag.has("money") {
                        tag.set("money", credits.to_string());
                        self.counts.credits_anchors_updated += 1;
                    }
                }
                if let Some(name) = &diff.player_name {
                    tag.set("name", name.as_str());
                    self.counts.player_names_updated += 1;
                }
            }
            FrameKind::InfoGame => {
                if let Some(modified) = diff.modified {
                    tag.set("modified", if modified { "1" } else { "0" });
                    self.counts.modified_flags_updated += 1;
                }
            }
            FrameKind::LedgerPlayer => {
                if let Some(credits) = diff.credits {
                    tag.set("money", credits.to_string());
                    self.counts.credits_anchors_updated += 1;
                }
                if let Some(name) = &diff.player_name {
                    tag.set("name", name.as_str());
                    self.counts.player_names_updated += 1;
                }
            }
            FrameKind::MoneyStat => {
                if let Some(credits) = diff.credits {
                    tag.set("value", credits.to_string());
                    self.counts.credits_anchors_updated += 1;
                }
            }
            FrameKind::Account { id } => {
                let wallet = self.model.credits.wallet_account_id.as_deref();
                if let (Some(credits), Some(wallet)) = (diff.credits, wallet) {
                    if wallet == id {
                        tag.set("amount", credits.to_string());
                        self.counts.wallet_accounts_updated += 1;
                    }
                }
            }
            FrameKind::Faction { id } => {
                self.seen_factions.insert(id.clone());
            }
            FrameKind::Relation { faction, target } => {
                if let Some(edit) = self.relation_edit(faction, target) {
                    tag.set("relation", edit.ratio.as_str());
                    self.counts.relations_updated += 1;
                }
            }
            FrameKind::Booster { faction, target } => {
                let hard = self
                    .relation_edit(faction, target)
                    .is_some_and(|edit| edit.mode.deletes_boosters());
                if hard {
                    self.counts.boosters_deleted += 1;
                    return Action::Suppress;
                }
            }
            FrameKind::Licence { type_name } => {
                if let Some(edit) = diff.licences.get(type_name) {
                    let existing = parse_faction_list(tag.get("factions").unwrap_or(""));
                    match edit.resolve(Some(&existing)) {
                        LicenceOutcome::Delete => {
                            self.counts.licences_removed += 1;
                            return Action::Suppress;
                        }
                        LicenceOutcome::Factions(factions) => {
                            tag.set("factions", join_faction_list(&factions));
                            self.counts.licences_updated += 1;
                        }
                        LicenceOutcome::Absent => {}
                    }
                }
            }
            FrameKind::InventoryWare { ware } => {
                if let Some(edit) = diff.inventory.get(ware) {
                    let raw = tag.get("amount").unwrap_or("0");
                    let existing = match parse_number(raw) {
                        Some(amount) => amount.trunc() as i64,
                        None => {
                            log::warn!("inventory ware '{ware}' has unparsable amount '{raw}'");
                            0
                        }
                    };
                    tag.set("amount", edit.resolve(existing).to_string());
                    self.counts.inventory_updated += 1;
                }
            }
            FrameKind::Component(component) => {
                if diff.deletions.contains(&component.id) {
                    if self.deleted.insert(component.id.clone()) {
                        self.counts.objects_deleted += 1;
                    }
                    self.dropped.insert(component.id.clone());
                    return Action::Suppress;
                }
                match component.role {
                    ComponentRole::Player => {
                        self.player_component_found = true;
                        if let Some(name) = &diff.player_name {
                            tag.set("name", name.as_str());
                            self.counts.player_names_updated += 1;
                        }
                    }
                    ComponentRole::Ship => {
                        if let Some(edit) = diff.ships.get(&component.id) {
                            for (attribute, value) in &edit.attributes {
                                tag.set(attribute, value.as_str());
                                self.counts.ship_attribute_updates += 1;
                            }
                            if !edit.attributes.is_empty() {
                                self.attributes_applied.insert(component.id.clone());
                            }
                        }
                    }
                    _ => {}
                }
                if self.plan().wants(&component.id) {
                    return Action::Capture;
                }
            }
            _ => {}
        }
        Action::Keep
    }

    /// Elements to insert right before the close of `frame`.
    fn close(&mut self, frame: &Frame) -> Vec<Element> {
        let diff = self.diff;
        let mut inserts = Vec::new();
        match &frame.kind {
            FrameKind::Relations { faction } => {
                for (target, edit) in self.missing_edges(faction, &frame.marks.seen) {
                    inserts.push(insert::relation(&target, &edit.ratio));
                }
                self.counts.relations_inserted += inserts.len();
            }
            FrameKind::Faction { id } => {
                if !frame.marks.has_relations {
                    let edges: Vec<Element> = self
                        .missing_edges(id, &BTreeSet::new())
                        .into_iter()
                        .map(|(target, edit)| insert::relation(&target, &edit.ratio))
                        .collect();
                    if !edges.is_empty() {
                        self.counts.relations_inserted += edges.len();
                        inserts.push(insert::relations_block(edges));
                    }
                }
                if id == PLAYER_FACTION && !frame.marks.has_licences {
                    let licences = self.missing_licences(&BTreeSet::new());
                    if !licences.is_empty() {
                        inserts.push(insert::licences_block(licences));
                    }
                }
            }
            FrameKind::Licences => {
                inserts.extend(self.missing_licences(&frame.marks.seen));
            }
            FrameKind::Blueprints if !self.blueprints_done => {
                self.blueprints_done = true;
                inserts.extend(self.missing_blueprints(&frame.marks.seen));
            }
            FrameKind::Inventory => {
                inserts.extend(self.missing_wares(&frame.marks.seen));
            }
            FrameKind::Component(component)
                if component.role == ComponentRole::Player && !frame.marks.has_inventory =>
            {
                let wares = self.missing_wares(&BTreeSet::new());
                if !wares.is_empty() {
                    inserts.push(insert::inventory_block(wares));
                }
            }
            _ => {}
        }

        if self.ctx.depth() == 0 && !self.blueprints_done && !diff.blueprints.is_empty() {
            self.blueprints_done = true;
            let blueprints = self.missing_blueprints(&BTreeSet::new());
            if !blueprints.is_empty() {
                inserts.push(insert::blueprints_block(blueprints));
            }
        }
        inserts
    }

    /// Relation edges `faction` must gain, given the targets it has.
    fn missing_edges(
        &self,
        faction: &str,
        seen: &BTreeSet<String>,
    ) -> Vec<(String, &'a RelationEdit)> {
        let diff: &'a NormalizedDiff = self.diff;
        let relations = &diff.relations;
        if faction == PLAYER_FACTION {
            relations
                .iter()
                .filter(|(target, _)| !seen.contains(*target))
                .map(|(target, edit)| (target.clone(), edit))
                .collect()
        } else {
            match relations.get(faction) {
                Some(edit) if !seen.contains(PLAYER_FACTION) => {
                    vec![(PLAYER_FACTION.to_string(), edit)]
                }
                _ => Vec::new(),
            }
        }
    }

    fn missing_licences(&mut self, seen: &BTreeSet<String>) -> Vec<Element> {
        let mut licences = Vec::new();
        for (type_name, edit) in &self.diff.licences {
            if !edit.creates() || seen.contains(type_name) {
                continue;
            }
            if let LicenceOutcome::Factions(factions) = edit.resolve(None) {
                licences.push(insert::licence(type_name, &join_faction_list(&factions)));
            }
        }
        self.counts.licences_inserted += licences.len();
        licences
    }

    fn missing_blueprints(&mut self, seen: &BTreeSet<String>) -> Vec<Element> {
        let owned = &self.model.blueprints.owned;
        let blueprints: Vec<Element> = self
            .diff
            .blueprints
            .iter()
            .filter(|ware| !seen.contains(*ware) && !owned.contains(*ware))
            .map(|ware| insert::blueprint(ware))
            .collect();
        self.counts.blueprints_inserted += blueprints.len();
        blueprints
    }

    fn missing_wares(&mut self, seen: &BTreeSet<String>) -> Vec<Element> {
        let wares: Vec<Element> = self
            .diff
            .inventory
            .iter()
            .filter(|(ware, _)| !seen.contains(*ware))
            .map(|(ware, edit)| insert::inventory_ware(ware, edit.resolve(0)))
            .collect();
        self.counts.inventory_inserted += wares.len();
        wares
    }
}
