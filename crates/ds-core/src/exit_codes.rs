//! Exit codes for the ds-core CLI.
//!
//! Ranges:
//! - 0-9: operational outcomes (the run happened; parse the outcome from the code)
//! - 10-19: user/environment errors (fixable by changing inputs or settings)
//! - 20-29: internal errors

use ds_common::{Error, ErrorCategory};

/// Process exit codes. Stable contract for automation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Every sample scored.
    Clean = 0,
    /// Some samples failed or were skipped.
    PartialFail = 3,
    /// No sample could be scored.
    AllFailed = 4,
    /// Aborted by timeout before all samples started.
    Interrupted = 6,

    /// Invalid arguments or unreadable input files.
    ArgsError = 10,
    /// Settings, shapes or model/loss layout disagree.
    ConfigError = 11,
    /// Locations or sample counts meaningless for the grid.
    DomainError = 12,
    /// Settings or bundle schema version mismatch.
    VersionError = 13,

    /// Bug; please report.
    InternalError = 20,
    IoError = 21,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn is_success(self) -> bool {
        self == ExitCode::Clean
    }

    /// Codes 0-9.
    pub fn is_operational(self) -> bool {
        (self as i32) < 10
    }

    /// Codes 10-19.
    pub fn is_user_error(self) -> bool {
        (10..20).contains(&(self as i32))
    }

    /// Codes 20-29.
    pub fn is_internal_error(self) -> bool {
        (self as i32) >= 20
    }

    /// Name used in JSON output.
    pub fn code_name(&self) -> &'static str {
        match self {
            ExitCode::Clean => "OK_CLEAN",
            ExitCode::PartialFail => "ERR_PARTIAL",
            ExitCode::AllFailed => "ERR_ALL_FAILED",
            ExitCode::Interrupted => "ERR_INTERRUPTED",
            ExitCode::ArgsError => "ERR_ARGS",
            ExitCode::ConfigError => "ERR_CONFIG",
            ExitCode::DomainError => "ERR_DOMAIN",
            ExitCode::VersionError => "ERR_VERSION",
            ExitCode::InternalError => "ERR_INTERNAL",
            ExitCode::IoError => "ERR_IO",
        }
    }

    /// Exit code for a fatal engine error.
    pub fn for_error(err: &Error) -> Self {
        match err.category() {
            ErrorCategory::Config => ExitCode::ConfigError,
            ErrorCategory::Domain => ExitCode::DomainError,
            ErrorCategory::Run => ExitCode::Interrupted,
            ErrorCategory::Io => match err {
                Error::Json(_) => ExitCode::ArgsError,
                _ => ExitCode::IoError,
            },
            ErrorCategory::Numerical | ErrorCategory::Model => ExitCode::InternalError,
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.code_name(), self.as_i32())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [ExitCode; 10] = [
        ExitCode::Clean,
        ExitCode::PartialFail,
        ExitCode::AllFailed,
        ExitCode::Interrupted,
        ExitCode::ArgsError,
        ExitCode::ConfigError,
        ExitCode::DomainError,
        ExitCode::VersionError,
        ExitCode::InternalError,
        ExitCode::IoError,
    ];

    #[test]
    fn test_ranges_are_disjoint() {
        for code in ALL {
            let buckets = [
                code.is_operational(),
                code.is_user_error(),
                code.is_internal_error(),
            ];
            assert_eq!(buckets.iter().filter(|b| **b).count(), 1, "{code}");
        }
    }

    #[test]
    fn test_values_are_stable() {
        assert_eq!(ExitCode::Clean.as_i32(), 0);
        assert_eq!(ExitCode::PartialFail.as_i32(), 3);
        assert_eq!(ExitCode::AllFailed.as_i32(), 4);
        assert_eq!(ExitCode::Interrupted.as_i32(), 6);
        assert_eq!(ExitCode::DomainError.as_i32(), 12);
        assert_eq!(ExitCode::IoError.as_i32(), 21);
    }

    #[test]
    fn test_for_error() {
        let domain = Error::InvalidSampleCount { num_samples: 0 };
        assert_eq!(ExitCode::for_error(&domain), ExitCode::DomainError);

        let layout = Error::ParameterLayout {
            expected: 6,
            actual: 4,
            params: 3,
            locations: 2,
        };
        assert_eq!(ExitCode::for_error(&layout), ExitCode::ConfigError);

        let io = Error::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "x"));
        assert_eq!(ExitCode::for_error(&io), ExitCode::IoError);
    }

    #[test]
    fn test_display() {
        assert_eq!(ExitCode::PartialFail.to_string(), "ERR_PARTIAL (3)");
    }
}
