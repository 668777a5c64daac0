//! Save version gating for patch sets.
//!
//! X4 records its product version in `info/game@version`, usually in the
//! compact form `710` for 7.10. A patch set may carry a semver range such as
//! `">=7.0.0, <8.0.0"` that the save must satisfy before anything is written.

use semver::{Version, VersionReq};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    #[error("save version '{value}' is not a product version: {reason}")]
    InvalidSaveVersion { value: String, reason: String },

    #[error("patch set version range '{value}' is invalid: {reason}")]
    InvalidRange { value: String, reason: String },
}

/// Parse a product version as the game records it.
///
/// Compact versions keep the minor in the last two digits: `710` is 7.10.0
/// and `600` is 6.0.0. Dotted versions may omit trailing components.
pub fn product_version(raw: &str) -> Result<Version, VersionError> {
    let raw = raw.trim();
    let invalid = |reason: &str| VersionError::InvalidSaveVersion {
        value: raw.to_string(),
        reason: reason.to_string(),
    };
    let number = |digits: &str| {
        digits
            .trim()
            .parse::<u64>()
            .map_err(|e| invalid(&e.to_string()))
    };

    if raw.is_empty() {
        return Err(invalid("empty"));
    }

    if raw.bytes().all(|b| b.is_ascii_digit()) {
        let split = raw.len().saturating_sub(2).max(1).min(raw.len());
        let (major, minor) = raw.split_at(split);
        let minor = if minor.is_empty() { 0 } else { number(minor)? };
        return Ok(Version::new(number(major)?, minor, 0));
    }

    let components: Vec<&str> = raw.split('.').collect();
    if components.len() > 3 {
        return Err(invalid("more than three components"));
    }
    let mut parts = [0u64; 3];
    for (slot, component) in parts.iter_mut().zip(&components) {
        *slot = number(component)?;
    }
    Ok(Version::new(parts[0], parts[1], parts[2]))
}

/// Whether a save's product version satisfies a patch set's range.
///
/// A missing or blank range accepts every save.
///
/// # Examples
///
/// ```
/// use x4_save_patcher::config::version::matches_requirement;
///
/// assert!(matches_requirement("710", Some(">=7.0.0, <8.0.0")).unwrap());
/// assert!(!matches_requirement("620", Some(">=7.0.0")).unwrap());
/// assert!(matches_requirement("600", None).unwrap());
/// ```
pub fn matches_requirement(
    version: &str,
    requirement: Option<&str>,
) -> Result<bool, VersionError> {
    let range = match requirement.map(str::trim) {
        Some(range) if !range.is_empty() => range,
        _ => return Ok(true),
    };

    let range = VersionReq::parse(range).map_err(|e| VersionError::InvalidRange {
        value: range.to_string(),
        reason: e.to_string(),
    })?;
    Ok(range.matches(&product_version(version)?))
}
