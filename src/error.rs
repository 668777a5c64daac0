use crate::config::{ValidationError, VersionError};
use crate::safety::SafetyError;
use crate::xml::ScanError;
use std::io;
use thiserror::Error;

/// A patch points at something the save does not contain.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReferenceError {
    #[error("faction '{faction}' not found in save")]
    MissingFaction { faction: String },

    #[error("cannot edit {operation}: player faction not found")]
    MissingPlayerFaction { operation: &'static str },

    #[error("cannot edit inventory: player component not found")]
    MissingPlayerComponent,

    #[error("NPC '{npc}' not found in save")]
    UnknownNpc { npc: String },

    #[error("ship '{ship}' not found in save")]
    UnknownShip { ship: String },

    #[error("ship '{ship}' has no crew slot {slot}")]
    UnknownCrewSlot { ship: String, slot: usize },

    #[error("ship '{ship}' has no modification slot {slot}")]
    UnknownModificationSlot { ship: String, slot: usize },

    #[error("ship '{ship}' has no officer post '{post}'")]
    UnknownOfficerPost { ship: String, post: String },

    #[error("skill '{key}' is not used by this save (supported: {supported})")]
    UnsupportedSkill { key: String, supported: String },

    #[error("object '{id}' not found in save")]
    ObjectNotFound { id: String },

    #[error("object '{id}' is edited but removed by a deletion in the same patch set")]
    EditOnDeletedObject { id: String },

    #[error("edit for {target} was never applied")]
    EditNotApplied { target: String },
}

#[derive(Error, Debug)]
pub enum SaveError {
    #[error("invalid patches:\n{0}")]
    Validation(#[from] ValidationError),

    #[error("{0}")]
    Reference(#[from] ReferenceError),

    #[error("malformed document at byte {position}: {message}")]
    MalformedDocument { position: u64, message: String },

    #[error("failed to read save: {0}")]
    Read(#[source] io::Error),

    #[error("failed to write save: {0}")]
    Write(#[source] io::Error),

    #[error("{0}")]
    Version(#[from] VersionError),

    #[error("save version {version} does not satisfy {requirement}")]
    VersionMismatch { version: String, requirement: String },

    #[error("{0}")]
    Safety(#[from] SafetyError),
}

impl From<ScanError> for SaveError {
    fn from(err: ScanError) -> Self {
        match err {
            ScanError::Read(source) => SaveError::Read(source),
            ScanError::Malformed { position, message } => {
                SaveError::MalformedDocument { position, message }
            }
        }
    }
}
