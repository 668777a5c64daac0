use crate::model::KNOWN_SKILL_KEYS;
use crate::scan::PLAYER_FACTION;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Relation values accepted from callers, in UI units.
pub const REP_UI_RANGE: std::ops::RangeInclusive<f64> = -30.0..=30.0;

pub const MAX_PLAYER_NAME_CHARS: usize = 64;

/// Ship component attributes that `SetShipAttribute` may change.
pub const SHIP_ATTRIBUTES: [&str; 3] = ["name", "code", "owner"];

#[derive(Debug, Deserialize, Serialize, Default, Clone, PartialEq)]
pub struct Metadata {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Semver requirement on the save's product version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_range: Option<String>,
}

/// A patch file after loading.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PatchSet {
    pub meta: Metadata,
    pub patches: Vec<Patch>,
}

impl PatchSet {
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_patches(&self.patches)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum RelationMode {
    /// Overwrite both base values and delete boosters on both sides.
    #[default]
    Hard,
    /// Overwrite both base values, keep boosters.
    Soft,
    SetBooster,
}

impl RelationMode {
    pub fn deletes_boosters(self) -> bool {
        self == RelationMode::Hard
    }
}

impl fmt::Display for RelationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelationMode::Hard => write!(f, "hard"),
            RelationMode::Soft => write!(f, "soft"),
            RelationMode::SetBooster => write!(f, "setBooster"),
        }
    }
}

/// One user-requested edit, tagged by `type`.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum Patch {
    SetCredits {
        value: i64,
    },
    UnlockBlueprintWares {
        wares: Vec<String>,
    },
    #[serde(alias = "SetFactionRep")]
    SetFactionRelation {
        faction_id: String,
        #[serde(rename = "repUI")]
        rep_ui: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mode: Option<RelationMode>,
    },
    AddLicenceFaction {
        #[serde(alias = "licenceType", alias = "targetType")]
        type_name: String,
        faction_id: String,
    },
    RemoveLicenceFaction {
        #[serde(alias = "licenceType", alias = "targetType")]
        type_name: String,
        faction_id: String,
    },
    AddLicenceType {
        #[serde(alias = "licenceType", alias = "targetType")]
        type_name: String,
        #[serde(default)]
        factions: Vec<String>,
    },
    RemoveLicenceType {
        #[serde(alias = "licenceType", alias = "targetType")]
        type_name: String,
    },
    SetInventoryItem {
        ware: String,
        amount: i64,
    },
    AddInventoryItem {
        ware: String,
        amount: i64,
    },
    SetPlayerName {
        name: String,
    },
    SetModifiedFlag {
        value: i64,
    },
    SetNpcSkills {
        npc_id: String,
        skills: BTreeMap<String, f64>,
    },
    SetShipCrewSkills {
        ship_id: String,
        slot: usize,
        skills: BTreeMap<String, f64>,
    },
    SetShipOfficerSkills {
        ship_id: String,
        post_id: String,
        skills: BTreeMap<String, f64>,
    },
    SetShipAttribute {
        ship_id: String,
        attribute: String,
        value: String,
    },
    SetShipModification {
        ship_id: String,
        slot: usize,
        values: BTreeMap<String, serde_json::Value>,
    },
    DeleteObject {
        object_id: String,
    },
}

impl Patch {
    /// Wire name of the patch kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Patch::SetCredits { .. } => "SetCredits",
            Patch::UnlockBlueprintWares { .. } => "UnlockBlueprintWares",
            Patch::SetFactionRelation { .. } => "SetFactionRelation",
            Patch::AddLicenceFaction { .. } => "AddLicenceFaction",
            Patch::RemoveLicenceFaction { .. } => "RemoveLicenceFaction",
            Patch::AddLicenceType { .. } => "AddLicenceType",
            Patch::RemoveLicenceType { .. } => "RemoveLicenceType",
            Patch::SetInventoryItem { .. } => "SetInventoryItem",
            Patch::AddInventoryItem { .. } => "AddInventoryItem",
            Patch::SetPlayerName { .. } => "SetPlayerName",
            Patch::SetModifiedFlag { .. } => "SetModifiedFlag",
            Patch::SetNpcSkills { .. } => "SetNpcSkills",
            Patch::SetShipCrewSkills { .. } => "SetShipCrewSkills",
            Patch::SetShipOfficerSkills { .. } => "SetShipOfficerSkills",
            Patch::SetShipAttribute { .. } => "SetShipAttribute",
            Patch::SetShipModification { .. } => "SetShipModification",
            Patch::DeleteObject { .. } => "DeleteObject",
        }
    }

    /// Check the field contract of this patch on its own.
    ///
    /// Returns one human-readable reason per problem; an empty list means
    /// the patch is well formed. Whether the ids exist in a save is checked
    /// later, against the indexed model.
    pub fn validate(&self) -> Vec<String> {
        let mut reasons = Vec::new();
        match self {
            Patch::SetCredits { value } => {
                if *value < 0 {
                    reasons.push(format!("value must be an integer >= 0, got {value}"));
                }
            }
            Patch::UnlockBlueprintWares { wares } => {
                if wares.is_empty() {
                    reasons.push("wares must not be empty".to_string());
                }
                for ware in wares {
                    check_identifier("wares[]", ware, &mut reasons);
                }
            }
            Patch::SetFactionRelation {
                faction_id, rep_ui, ..
            } => {
                check_identifier("factionId", faction_id, &mut reasons);
                if faction_id == PLAYER_FACTION {
                    reasons.push("factionId cannot be the player faction itself".to_string());
                }
                if !rep_ui.is_finite() || !REP_UI_RANGE.contains(rep_ui) {
                    reasons.push(format!("repUI must be a number in -30..30, got {rep_ui}"));
                }
            }
            Patch::AddLicenceFaction {
                type_name,
                faction_id,
            }
            | Patch::RemoveLicenceFaction {
                type_name,
                faction_id,
            } => {
                check_identifier("typeName", type_name, &mut reasons);
                check_identifier("factionId", faction_id, &mut reasons);
            }
            Patch::AddLicenceType { type_name, factions } => {
                check_identifier("typeName", type_name, &mut reasons);
                for faction in factions {
                    check_identifier("factions[]", faction, &mut reasons);
                }
            }
            Patch::RemoveLicenceType { type_name } => {
                check_identifier("typeName", type_name, &mut reasons);
            }
            Patch::SetInventoryItem { ware, amount } | Patch::AddInventoryItem { ware, amount } => {
                check_identifier("ware", ware, &mut reasons);
                if *amount < 0 {
                    reasons.push(format!("amount must be an integer >= 0, got {amount}"));
                }
            }
            Patch::SetPlayerName { name } => {
                let name = name.trim();
                if name.is_empty() {
                    reasons.push("name must not be empty".to_string());
                } else if name.chars().count() > MAX_PLAYER_NAME_CHARS {
                    reasons.push(format!(
                        "name must be 1-{MAX_PLAYER_NAME_CHARS} characters, got {}",
                        name.chars().count()
                    ));
                }
            }
            Patch::SetModifiedFlag { value } => {
                if !matches!(*value, 0 | 1) {
                    reasons.push(format!("value must be 0 or 1, got {value}"));
                }
            }
            Patch::SetNpcSkills { npc_id, skills } => {
                check_identifier("npcId", npc_id, &mut reasons);
                check_skills(skills, &mut reasons);
            }
            Patch::SetShipCrewSkills {
                ship_id, skills, ..
            } => {
                check_identifier("shipId", ship_id, &mut reasons);
                check_skills(skills, &mut reasons);
            }
            Patch::SetShipOfficerSkills {
                ship_id,
                post_id,
                skills,
            } => {
                check_identifier("shipId", ship_id, &mut reasons);
                check_identifier("postId", post_id, &mut reasons);
                check_skills(skills, &mut reasons);
            }
            Patch::SetShipAttribute {
                ship_id,
                attribute,
                value,
            } => {
                check_identifier("shipId", ship_id, &mut reasons);
                if !SHIP_ATTRIBUTES.contains(&attribute.as_str()) {
                    reasons.push(format!(
                        "attribute must be one of {}, got '{attribute}'{}",
                        SHIP_ATTRIBUTES.join(", "),
                        suggest(attribute, &SHIP_ATTRIBUTES)
                    ));
                }
                if value.trim().is_empty() {
                    reasons.push("value must not be empty".to_string());
                }
            }
            Patch::SetShipModification {
                ship_id, values, ..
            } => {
                check_identifier("shipId", ship_id, &mut reasons);
                if values.is_empty() {
                    reasons.push("values must not be empty".to_string());
                }
                for (key, value) in values {
                    check_identifier("values key", key, &mut reasons);
                    if scalar_text(value).is_none() {
                        reasons.push(format!(
                            "values.{key} must be a string, number or boolean"
                        ));
                    }
                }
            }
            Patch::DeleteObject { object_id } => {
                check_identifier("objectId", object_id, &mut reasons);
            }
        }
        reasons
    }
}

/// Attribute text for a scalar JSON value.
pub fn scalar_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(text) => Some(text.clone()),
        serde_json::Value::Number(number) => Some(number.to_string()),
        serde_json::Value::Bool(flag) => Some(if *flag { "1" } else { "0" }.to_string()),
        _ => None,
    }
}

fn check_identifier(field: &str, value: &str, reasons: &mut Vec<String>) {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        reasons.push(format!("{field} must not be empty"));
        return;
    }
    if let Some(bad) = value
        .chars()
        .find(|c| c.is_whitespace() || matches!(c, '"' | '\'' | '<' | '>' | '&'))
    {
        reasons.push(format!("{field} '{value}' contains disallowed character {bad:?}"));
    }
}

fn check_skills(skills: &BTreeMap<String, f64>, reasons: &mut Vec<String>) {
    if skills.is_empty() {
        reasons.push("skills must not be empty".to_string());
    }
    for (key, value) in skills {
        if !KNOWN_SKILL_KEYS.contains(&key.as_str()) {
            reasons.push(format!(
                "unsupported skill key '{key}'{}",
                suggest(key, &KNOWN_SKILL_KEYS)
            ));
        }
        if !value.is_finite() {
            reasons.push(format!("skills.{key} must be a finite number"));
        }
    }
}

/// ", did you mean 'x'?" for the closest candidate, or nothing.
fn suggest(input: &str, candidates: &[&str]) -> String {
    candidates
        .iter()
        .map(|candidate| (strsim::levenshtein(input, candidate), candidate))
        .filter(|(distance, _)| *distance <= 3)
        .min_by_key(|(distance, _)| *distance)
        .map(|(_, candidate)| format!(", did you mean '{candidate}'?"))
        .unwrap_or_default()
}

/// Validate every patch, collecting all failures.
pub fn validate_patches(patches: &[Patch]) -> Result<(), ValidationError> {
    let issues: Vec<ValidationIssue> = patches
        .iter()
        .enumerate()
        .flat_map(|(index, patch)| {
            patch.validate().into_iter().map(move |reason| ValidationIssue {
                index,
                kind: patch.kind().to_string(),
                reason,
            })
        })
        .collect();

    if issues.is_empty() {
        Ok(())
    } else {
        Err(ValidationError { issues })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationIssue {
    /// Position of the patch in the submitted list.
    pub index: usize,
    pub kind: String,
    pub reason: String,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "patch #{} ({}): {}", self.index, self.kind, self.reason)
    }
}
