//! Export orchestration.
//!
//! validate → index → version gate → backup → rewrite into a temporary file
//! next to the output → fsync → atomic rename. Nothing reaches the output
//! path unless every step succeeded.

use crate::compression::{self, OutputStream};
use crate::config::normalize::normalize;
use crate::config::schema::Patch;
use crate::config::version::matches_requirement;
use crate::error::SaveError;
use crate::indexer;
use crate::model::SaveModel;
use crate::rewrite::{rewrite, CategoryCounts};
use crate::safety::OutputGuard;
use serde::Serialize;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOptions {
    /// Gzip the output.
    pub compress: bool,
    /// Copy the source to `<source>.backup<ext>` before writing.
    pub create_backup: bool,
    /// Semver requirement the save's product version must meet.
    pub version_range: Option<String>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            compress: true,
            create_backup: true,
            version_range: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportReport {
    pub output_path: PathBuf,
    pub backup_path: Option<PathBuf>,
    pub backup_created: bool,
    pub compressed: bool,
    pub counts: CategoryCounts,
}

/// Output path proposed for an edited copy of `source`:
/// `<stem>.edited.xml`, plus `.gz` when compressing.
pub fn default_output_path(source: &Path, compress: bool) -> PathBuf {
    let name = source
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = strip_suffix_ignore_case(&name, ".gz");
    let stem = strip_suffix_ignore_case(stem, ".xml");
    let stem = if stem.is_empty() { "save" } else { stem };
    let file_name = format!(
        "{}.edited.xml{}",
        stem,
        if compress { ".gz" } else { "" }
    );
    source.with_file_name(file_name)
}

fn strip_suffix_ignore_case<'s>(name: &'s str, suffix: &str) -> &'s str {
    let split = name.len().saturating_sub(suffix.len());
    match (name.get(..split), name.get(split..)) {
        (Some(stem), Some(tail)) if tail.eq_ignore_ascii_case(suffix) => stem,
        _ => name,
    }
}

/// Write a patched copy of `source` to `output`.
pub fn export_patched(
    source: &Path,
    output: &Path,
    patches: &[Patch],
    options: &ExportOptions,
) -> Result<ExportReport, SaveError> {
    let diff = normalize(patches)?;
    let guard = OutputGuard::new(source)?;
    let output = guard.validate_output(output)?;

    let model = indexer::index_path(source)?;
    if let Some(range) = options.version_range.as_deref() {
        check_version(&model, range)?;
    }

    let backup_path = options
        .create_backup
        .then(|| guard.backup_path().to_path_buf());
    if let Some(backup) = &backup_path {
        create_backup(source, backup)?;
        log::info!("backed up {} to {}", source.display(), backup.display());
    }

    let parent = output.parent().unwrap_or_else(|| Path::new("."));
    let temp = NamedTempFile::new_in(parent).map_err(SaveError::Write)?;
    let input = compression::open_input(source).map_err(SaveError::Read)?;

    let counts = {
        let mut stream = OutputStream::new(BufWriter::new(temp.as_file()), options.compress);
        let counts = rewrite(input, &mut stream, &diff, &model)?;
        let mut writer = stream.finish().map_err(SaveError::Write)?;
        writer.flush().map_err(SaveError::Write)?;
        counts
    };
    temp.as_file().sync_all().map_err(SaveError::Write)?;

    guard.revalidate(&output)?;
    temp.persist(&output)
        .map_err(|err| SaveError::Write(err.error))?;

    log::info!(
        "exported {} to {} ({} locations changed)",
        source.display(),
        output.display(),
        counts.total()
    );

    Ok(ExportReport {
        output_path: output,
        backup_created: backup_path.is_some(),
        backup_path,
        compressed: options.compress,
        counts,
    })
}

fn check_version(model: &SaveModel, range: &str) -> Result<(), SaveError> {
    let version = model.metadata.product_version().unwrap_or("0");
    if matches_requirement(version, Some(range))? {
        Ok(())
    } else {
        Err(SaveError::VersionMismatch {
            version: version.to_string(),
            requirement: range.to_string(),
        })
    }
}

/// Copy `source` to `backup`, keeping the source's modification time.
fn create_backup(source: &Path, backup: &Path) -> Result<(), SaveError> {
    fs::copy(source, backup).map_err(SaveError::Write)?;
    let metadata = fs::metadata(source).map_err(SaveError::Read)?;
    let mtime = filetime::FileTime::from_last_modification_time(&metadata);
    filetime::set_file_mtime(backup, mtime).map_err(SaveError::Write)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReferenceError;
    use std::io::Read;

    const SAVE: &str = concat!(
        r#"<?xml version="1.0"?><savegame><info><game id="X4" version="710"/></info>"#,
        r#"<player name="Val" money="100"></player>"#,
        r#"<factions><faction id="player"><account id="[0x1]" amount="100"/></faction></factions>"#,
        r#"</savegame>"#
    );

    fn credits(value: i64) -> Vec<Patch> {
        vec![Patch::SetCredits { value }]
    }

    #[test]
    fn test_default_output_path() {
        assert_eq!(
            default_output_path(Path::new("/s/quicksave.xml.gz"), true),
            PathBuf::from("/s/quicksave.edited.xml.gz")
        );
        assert_eq!(
            default_output_path(Path::new("/s/save_002.XML"), false),
            PathBuf::from("/s/save_002.edited.xml")
        );
        assert_eq!(
            default_output_path(Path::new("autosave"), false),
            PathBuf::from("autosave.edited.xml")
        );
    }

    #[test]
    fn test_export_plain_with_backup() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("save.xml");
        fs::write(&source, SAVE).unwrap();
        let old = filetime::FileTime::from_unix_time(1_500_000_000, 0);
        filetime::set_file_mtime(&source, old).unwrap();

        let output = dir.path().join("out.xml");
        let options = ExportOptions {
            compress: false,
            ..ExportOptions::default()
        };
        let report = export_patched(&source, &output, &credits(5), &options).unwrap();

        let edited = fs::read_to_string(&output).unwrap();
        assert!(edited.contains(r#"<player name="Val" money="5">"#));
        assert!(edited.contains(r#"<account id="[0x1]" amount="5"/>"#));
        assert_eq!(report.counts.credits_anchors_updated, 1);
        assert_eq!(report.counts.wallet_accounts_updated, 1);

        let backup = report.backup_path.unwrap();
        assert!(report.backup_created);
        assert_eq!(fs::read_to_string(&backup).unwrap(), SAVE);
        let meta = fs::metadata(&backup).unwrap();
        assert_eq!(filetime::FileTime::from_last_modification_time(&meta), old);
    }

    #[test]
    fn test_export_compressed_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("save.xml");
        fs::write(&source, SAVE).unwrap();
        let output = dir.path().join("out.xml.gz");

        let options = ExportOptions {
            create_backup: false,
            ..ExportOptions::default()
        };
        let report = export_patched(&source, &output, &[], &options).unwrap();
        assert!(report.compressed);
        assert!(report.backup_path.is_none());
        assert!(compression::is_compressed(&output).unwrap());

        let mut text = String::new();
        compression::open_input(&output)
            .unwrap()
            .read_to_string(&mut text)
            .unwrap();
        assert_eq!(text, SAVE);
    }

    #[test]
    fn test_reference_failure_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("save.xml");
        fs::write(&source, SAVE).unwrap();
        let output = dir.path().join("out.xml");

        let patches = vec![Patch::SetFactionRelation {
            faction_id: "argon".into(),
            rep_ui: 10.0,
            mode: None,
        }];
        let options = ExportOptions {
            compress: false,
            create_backup: false,
            version_range: None,
        };
        let err = export_patched(&source, &output, &patches, &options).unwrap_err();
        assert!(matches!(
            err,
            SaveError::Reference(ReferenceError::MissingFaction { .. })
        ));
        assert!(!output.exists());
        assert_eq!(fs::read_to_string(&source).unwrap(), SAVE);
        let leftovers: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[test]
    fn test_validation_failure_touches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("save.xml");
        fs::write(&source, SAVE).unwrap();
        let output = dir.path().join("out.xml");

        let err = export_patched(&source, &output, &credits(-1), &ExportOptions::default())
            .unwrap_err();
        assert!(matches!(err, SaveError::Validation(_)));
        assert!(!output.exists());
        assert!(!dir.path().join("save.xml.backup.xml").exists());
    }

    #[test]
    fn test_version_range_gate() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("save.xml");
        fs::write(&source, SAVE).unwrap();
        let output = dir.path().join("out.xml");

        let options = ExportOptions {
            compress: false,
            create_backup: false,
            version_range: Some(">=8.0.0".into()),
        };
        let err = export_patched(&source, &output, &credits(1), &options).unwrap_err();
        assert!(matches!(err, SaveError::VersionMismatch { .. }));

        let options = ExportOptions {
            version_range: Some(">=7.0.0, <8.0.0".into()),
            ..options
        };
        assert!(export_patched(&source, &output, &credits(1), &options).is_ok());
    }

    #[test]
    fn test_output_over_source_refused() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("save.xml");
        fs::write(&source, SAVE).unwrap();

        let err = export_patched(&source, &source, &credits(1), &ExportOptions::default())
            .unwrap_err();
        assert!(matches!(err, SaveError::Safety(_)));
        assert_eq!(fs::read_to_string(&source).unwrap(), SAVE);
    }
}
