//! X4 Save Patcher: streaming indexer and byte-preserving patcher for X4
//! save games
//!
//! Saves are large (often hundreds of megabytes uncompressed) gzip-wrapped
//! XML documents. Nothing here builds a tree of the whole document: the
//! indexer and the rewriter both stream events through a shared
//! [`scan::ScanContext`] frame stack.
//!
//! # Architecture
//!
//! - [`indexer`] reads a save once and produces a [`SaveModel`]: currency
//!   anchors, relations, licences, blueprints, inventory, NPC and ship skills.
//! - [`config`] loads patch sets, validates them and folds them into one
//!   [`NormalizedDiff`] per export.
//! - [`rewrite`] re-emits the document event by event, rewriting only the
//!   attributes and blocks a diff targets. Every untouched byte is copied
//!   through verbatim.
//! - [`export`] ties these together with the on-disk guarantees.
//!
//! # Safety
//!
//! - Patches are validated before any stream is opened
//! - The output never replaces the source or its backup
//! - Atomic file writes (tempfile + fsync + rename)
//! - Referential failures discard the temporary output
//! - Re-applying a set-style patch set is byte-identical
//!
//! # Example
//!
//! ```no_run
//! use x4_save_patcher::{export_patched, ExportOptions, Patch};
//! use std::path::Path;
//!
//! let patches = vec![Patch::SetCredits { value: 1_000_000 }];
//! let report = export_patched(
//!     Path::new("quicksave.xml.gz"),
//!     Path::new("quicksave.edited.xml.gz"),
//!     &patches,
//!     &ExportOptions::default(),
//! )?;
//! println!("{} locations changed", report.counts.total());
//! # Ok::<(), x4_save_patcher::SaveError>(())
//! ```

pub mod compression;
pub mod config;
pub mod error;
pub mod export;
pub mod indexer;
pub mod model;
pub mod rewrite;
pub mod safety;
pub mod scan;
pub mod xml;

// Re-exports
pub use config::{
    load_from_path, load_from_str, matches_requirement, normalize, ConfigError, NormalizedDiff,
    Patch, PatchFormat, PatchSet, ValidationError, ValidationIssue, VersionError,
};
pub use error::{ReferenceError, SaveError};
pub use export::{default_output_path, export_patched, ExportOptions, ExportReport};
pub use indexer::{index, index_path};
pub use model::SaveModel;
pub use rewrite::{rewrite, CategoryCounts, Phase, Rewriter};
pub use safety::{OutputGuard, SafetyError};
pub use xml::ScanError;
