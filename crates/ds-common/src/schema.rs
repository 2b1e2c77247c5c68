//! Schema versioning for serialized documents.

/// Version of the relevance map document and bundle summary formats.
///
/// Bumped on any breaking change to field names or array layout.
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Returns true if `version` shares the major component of [`SCHEMA_VERSION`].
pub fn is_compatible(version: &str) -> bool {
    let major = |v: &str| v.split('.').next().map(str::to_string);
    match (major(version), major(SCHEMA_VERSION)) {
        (Some(a), Some(b)) => !a.is_empty() && a == b,
        _ => false,
    }
}
