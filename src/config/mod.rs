pub mod loader;
pub mod normalize;
pub mod schema;
pub mod version;

pub use loader::{load_from_path, load_from_str, ConfigError, PatchFormat};
pub use normalize::{normalize, Category, NormalizedDiff};
pub use schema::{
    Metadata, Patch, PatchSet, RelationMode, ValidationError, ValidationIssue,
};
pub use version::{matches_requirement, product_version, VersionError};
