//! Error contract tests: codes, categories and JSON shape are part of the
//! public interface consumed by scripts, so they must stay stable.

use ds_common::{BatchResult, Error, ErrorCategory, StructuredError};
use std::fs;

fn all_variants() -> Vec<Error> {
    vec![
        Error::Config("c".into()),
        Error::ShapeMismatch {
            what: "test inputs".into(),
            expected: "(3, 3, 2)".into(),
            actual: "(3, 4, 2)".into(),
        },
        Error::ParameterLayout {
            expected: 6,
            actual: 4,
            params: 3,
            locations: 2,
        },
        Error::InvalidSettings("batch_size".into()),
        Error::LocationOutsideGrid {
            lon: 1.0,
            lat: 2.0,
            extent: "e".into(),
        },
        Error::InvalidSampleCount { num_samples: 0 },
        Error::EmptyInput("no samples".into()),
        Error::NumericalInstability {
            sample: 1,
            detail: "nan".into(),
        },
        Error::Prediction("p".into()),
        Error::Aborted {
            reason: "timeout".into(),
        },
        Error::Io(std::io::Error::other("disk")),
    ]
}

#[test]
fn codes_fall_in_their_category_range() {
    for err in all_variants() {
        let range = match err.category() {
            ErrorCategory::Config => 10..20,
            ErrorCategory::Domain => 20..30,
            ErrorCategory::Numerical => 30..40,
            ErrorCategory::Model => 40..50,
            ErrorCategory::Run => 50..60,
            ErrorCategory::Io => 60..70,
        };
        assert!(range.contains(&err.code()), "{err} has code {}", err.code());
    }
}

#[test]
fn codes_are_unique() {
    let mut codes: Vec<u32> = all_variants().iter().map(Error::code).collect();
    let n = codes.len();
    codes.sort_unstable();
    codes.dedup();
    assert_eq!(codes.len(), n);
}

#[test]
fn only_configuration_domain_and_io_are_fatal() {
    for err in all_variants() {
        let expected = matches!(
            err.category(),
            ErrorCategory::Config | ErrorCategory::Domain | ErrorCategory::Io
        );
        assert_eq!(err.is_fatal(), expected, "{err}");
    }
}

#[test]
fn batch_result_survives_a_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("outcome.json");

    let mut batch: BatchResult<usize> = BatchResult::default();
    batch.add_success(0);
    batch.add_failure(
        "sample-1",
        &Error::NumericalInstability {
            sample: 1,
            detail: "nan".into(),
        },
    );
    fs::write(&path, serde_json::to_vec_pretty(&batch).unwrap()).unwrap();

    let loaded: BatchResult<usize> =
        serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
    assert_eq!(loaded.succeeded, vec![0]);
    assert_eq!(loaded.summary.failed, 1);
    assert_eq!(loaded.failed[0].item_id, "sample-1");
    assert_eq!(loaded.failed[0].error.code, 30);
}

#[test]
fn structured_error_with_context() {
    let structured = StructuredError::from(&Error::Prediction("x".into()))
        .with_context("sample", 4usize);
    let value: serde_json::Value = serde_json::from_str(&structured.to_json()).unwrap();
    assert_eq!(value["context"]["sample"], 4);
    assert_eq!(value["suggested_action"], "skip");
}
