use std::ffi::OsString;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Output path checks for an export.
///
/// An export must never replace the save it reads from, nor the backup it
/// just made of that save.
#[derive(Debug, Clone)]
pub struct OutputGuard {
    /// Canonical path of the source save
    source: PathBuf,
    /// Where the backup of the source goes
    backup: PathBuf,
}

#[derive(Error, Debug)]
pub enum SafetyError {
    #[error("Output would overwrite the source save: {path}")]
    OverwritesSource { path: PathBuf },

    #[error("Output would overwrite the source backup: {path}")]
    OverwritesBackup { path: PathBuf },

    #[error("Output directory does not exist: {path}")]
    MissingParent { path: PathBuf },

    #[error("Output path has no file name: {path}")]
    NoFileName { path: PathBuf },

    #[error("Failed to canonicalize path: {0}")]
    Canonicalize(#[from] std::io::Error),
}

/// Backup location for `source`: `<source>.backup<ext>`, so
/// `save.xml.gz` is backed up to `save.xml.gz.backup.gz`.
pub fn backup_path_for(source: &Path) -> PathBuf {
    let mut name = OsString::from(source.as_os_str());
    name.push(".backup");
    if let Some(ext) = source.extension() {
        name.push(".");
        name.push(ext);
    }
    PathBuf::from(name)
}

impl OutputGuard {
    /// Create a guard for exports of `source`.
    ///
    /// The source is canonicalized, so it must exist.
    pub fn new(source: impl AsRef<Path>) -> Result<Self, SafetyError> {
        let source = source.as_ref().canonicalize()?;
        let backup = backup_path_for(&source);
        Ok(Self { source, backup })
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn backup_path(&self) -> &Path {
        &self.backup
    }

    /// Check that `output` is a safe export target.
    ///
    /// Returns the absolute output path with its directory canonicalized.
    pub fn validate_output(&self, output: impl AsRef<Path>) -> Result<PathBuf, SafetyError> {
        let output = output.as_ref();
        let file_name = output.file_name().ok_or_else(|| SafetyError::NoFileName {
            path: output.to_path_buf(),
        })?;

        let parent = match output.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        if !parent.is_dir() {
            return Err(SafetyError::MissingParent {
                path: parent.to_path_buf(),
            });
        }
        let candidate = parent.canonicalize()?.join(file_name);

        self.check_candidate(&candidate)?;
        Ok(candidate)
    }

    /// Re-check a validated output path right before it is replaced.
    ///
    /// Catches a symlink swapped in at the output location since
    /// [`OutputGuard::validate_output`] ran.
    pub fn revalidate(&self, output: &Path) -> Result<(), SafetyError> {
        self.check_candidate(output)
    }

    fn check_candidate(&self, candidate: &Path) -> Result<(), SafetyError> {
        // An existing output may be a symlink onto the source.
        let resolved = if candidate.exists() {
            candidate.canonicalize()?
        } else {
            candidate.to_path_buf()
        };

        if candidate == self.source || resolved == self.source {
            return Err(SafetyError::OverwritesSource {
                path: candidate.to_path_buf(),
            });
        }
        if candidate == self.backup || resolved == self.backup {
            return Err(SafetyError::OverwritesBackup {
                path: candidate.to_path_buf(),
            });
        }
        Ok(())
    }
}
