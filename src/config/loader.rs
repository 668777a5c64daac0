use crate::config::schema::{Metadata, Patch, PatchSet, ValidationError, ValidationIssue};
use serde_json::Value;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Patch files are JSON or TOML.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchFormat {
    Json,
    Toml,
}

impl PatchFormat {
    /// `.toml` files are TOML, everything else is read as JSON.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => PatchFormat::Toml,
            _ => PatchFormat::Json,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Toml {
        path: Option<PathBuf>,
        source: toml_edit::de::Error,
    },
    Json {
        path: Option<PathBuf>,
        source: serde_json::Error,
    },
    Shape {
        path: Option<PathBuf>,
        message: String,
    },
    Validation {
        path: Option<PathBuf>,
        source: ValidationError,
    },
}

impl ConfigError {
    fn with_path(self, path: &Path) -> Self {
        let path = Some(path.to_path_buf());
        match self {
            ConfigError::Toml { path: None, source } => ConfigError::Toml { path, source },
            ConfigError::Json { path: None, source } => ConfigError::Json { path, source },
            ConfigError::Shape {
                path: None,
                message,
            } => ConfigError::Shape { path, message },
            ConfigError::Validation { path: None, source } => {
                ConfigError::Validation { path, source }
            }
            other => other,
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let location = |path: &Option<PathBuf>| match path {
            Some(path) => format!(" ({})", path.display()),
            None => String::new(),
        };
        match self {
            ConfigError::Io { path, source } => {
                write!(
                    f,
                    "failed to read patch file {}: {}",
                    path.display(),
                    source
                )
            }
            ConfigError::Toml { path, source } => {
                write!(f, "failed to parse patch TOML{}: {}", location(path), source)
            }
            ConfigError::Json { path, source } => {
                write!(f, "failed to parse patch JSON{}: {}", location(path), source)
            }
            ConfigError::Shape { path, message } => {
                write!(f, "unexpected patch file layout{}: {}", location(path), message)
            }
            ConfigError::Validation { path, source } => {
                write!(f, "invalid patches{}:\n{}", location(path), source)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Toml { source, .. } => Some(source),
            ConfigError::Json { source, .. } => Some(source),
            ConfigError::Shape { .. } => None,
            ConfigError::Validation { source, .. } => Some(source),
        }
    }
}

/// Parse a patch set.
///
/// Accepted layouts are a bare list of patches, or a table with an optional
/// `meta` header and a `patches` list. Every entry is decoded on its own so
/// that all broken entries are reported together, each with its index.
pub fn load_from_str(input: &str, format: PatchFormat) -> Result<PatchSet, ConfigError> {
    let document: Value = match format {
        PatchFormat::Json => serde_json::from_str(input)
            .map_err(|source| ConfigError::Json { path: None, source })?,
        PatchFormat::Toml => toml_edit::de::from_str(input)
            .map_err(|source| ConfigError::Toml { path: None, source })?,
    };

    let (meta, entries) = match document {
        Value::Array(entries) => (Metadata::default(), entries),
        Value::Object(mut table) => {
            let meta = match table.remove("meta") {
                Some(meta) => serde_json::from_value(meta)
                    .map_err(|source| ConfigError::Json { path: None, source })?,
                None => Metadata::default(),
            };
            let entries = match table.remove("patches") {
                Some(Value::Array(entries)) => entries,
                Some(_) => {
                    return Err(ConfigError::Shape {
                        path: None,
                        message: "`patches` must be a list".to_string(),
                    })
                }
                None => Vec::new(),
            };
            (meta, entries)
        }
        _ => {
            return Err(ConfigError::Shape {
                path: None,
                message: "expected a list of patches or a table with `patches`".to_string(),
            })
        }
    };

    let mut patches = Vec::with_capacity(entries.len());
    let mut issues = Vec::new();
    for (index, entry) in entries.into_iter().enumerate() {
        let kind = entry
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("?")
            .to_string();
        match serde_json::from_value::<Patch>(entry) {
            Ok(patch) => {
                issues.extend(patch.validate().into_iter().map(|reason| ValidationIssue {
                    index,
                    kind: kind.clone(),
                    reason,
                }));
                patches.push(patch);
            }
            Err(err) => issues.push(ValidationIssue {
                index,
                kind,
                reason: err.to_string(),
            }),
        }
    }

    if !issues.is_empty() {
        return Err(ConfigError::Validation {
            path: None,
            source: ValidationError { issues },
        });
    }

    Ok(PatchSet { meta, patches })
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<PatchSet, ConfigError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    load_from_str(&contents, PatchFormat::from_path(path)).map_err(|error| error.with_path(path))
}
