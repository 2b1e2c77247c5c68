//! Run identity types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Run ID for tracking one relevance computation across logs, events and
/// bundles.
///
/// Format: `ds-YYYYMMDD-HHMMSS-XXXX`
/// Example: `ds-20261018-143022-a7xq`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub String);

impl RunId {
    /// Generate a new run ID.
    pub fn new() -> Self {
        let now = chrono::Utc::now();
        RunId(format!(
            "ds-{}-{}-{}",
            now.format("%Y%m%d"),
            now.format("%H%M%S"),
            base32_suffix()
        ))
    }

    /// Parse an existing run ID string.
    pub fn parse(s: &str) -> Option<Self> {
        if s.len() != 23 || !s.is_ascii() {
            return None;
        }
        let bytes = s.as_bytes();
        if !s.starts_with("ds-") || bytes[11] != b'-' || bytes[18] != b'-' {
            return None;
        }
        let date = &s[3..11];
        let time = &s[12..18];
        let suffix = &s[19..23];
        if !date.chars().all(|c| c.is_ascii_digit()) || !time.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        if !suffix.chars().all(|c| matches!(c, 'a'..='z' | '2'..='7')) {
            return None;
        }
        Some(RunId(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn base32_suffix() -> String {
    let uuid = uuid::Uuid::new_v4();
    let bytes = uuid.as_bytes();
    let value =
        (((bytes[0] as u32) << 16) | ((bytes[1] as u32) << 8) | (bytes[2] as u32)) & 0x000F_FFFF;
    let alphabet = b"abcdefghijklmnopqrstuvwxyz234567";
    [15_u32, 10, 5, 0]
        .iter()
        .map(|shift| alphabet[((value >> shift) & 0x1F) as usize] as char)
        .collect()
}
