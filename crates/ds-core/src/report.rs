//! Run summaries: the payload printed by `ds-core relevance` and stored as
//! `summary.json` in bundles.

use ds_common::{BatchError, SCHEMA_VERSION};
use ds_config::{ConfigSnapshot, LossKind, ScoreMode, ScoreTarget};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

use crate::exit_codes::ExitCode;
use crate::relevance::RelevanceRun;

/// Mean |score| of one channel at one location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelRanking {
    pub location: String,
    pub channel: String,
    pub importance: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Complete,
    Partial,
    Failed,
    Aborted,
}

impl RunStatus {
    pub fn exit_code(&self) -> ExitCode {
        match self {
            RunStatus::Complete => ExitCode::Clean,
            RunStatus::Partial => ExitCode::PartialFail,
            RunStatus::Failed => ExitCode::AllFailed,
            RunStatus::Aborted => ExitCode::Interrupted,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub schema_version: String,
    pub run_id: String,
    pub generated_at: String,
    pub status: RunStatus,
    /// `[samples, rows, cols, channels, locations]`.
    pub shape: [usize; 5],
    pub loss: LossKind,
    pub score_mode: ScoreMode,
    pub score_target: ScoreTarget,
    pub samples_scored: usize,
    pub samples_failed: usize,
    pub samples_skipped: Vec<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<BatchError>,
    pub elapsed_ms: u64,
    /// Channels ordered by importance, per location.
    pub ranking: Vec<ChannelRanking>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<ConfigSnapshot>,
}

impl RunSummary {
    pub fn from_run(run_id: &str, run: &RelevanceRun, config: Option<ConfigSnapshot>) -> Self {
        let (s, r, c, ch, l) = run.map.shape();
        let summary = &run.outcome.summary;
        let status = if run.was_aborted() {
            RunStatus::Aborted
        } else if summary.all_succeeded {
            RunStatus::Complete
        } else if summary.any_succeeded {
            RunStatus::Partial
        } else {
            RunStatus::Failed
        };

        let importance = run.map.channel_importance();
        let mut ranking = Vec::with_capacity(ch * l);
        for (li, location) in run.map.locations.iter().enumerate() {
            let mut rows: Vec<ChannelRanking> = (0..ch)
                .map(|chi| {
                    let v = importance[[chi, li]];
                    ChannelRanking {
                        location: location.label(),
                        channel: run.map.grid.channels[chi].clone(),
                        importance: v.is_finite().then_some(v),
                    }
                })
                .collect();
            rows.sort_by(|a, b| {
                b.importance
                    .unwrap_or(f64::NEG_INFINITY)
                    .total_cmp(&a.importance.unwrap_or(f64::NEG_INFINITY))
            });
            ranking.extend(rows);
        }

        RunSummary {
            schema_version: SCHEMA_VERSION.to_string(),
            run_id: run_id.to_string(),
            generated_at: chrono::Utc::now().to_rfc3339(),
            status,
            shape: [s, r, c, ch, l],
            loss: run.map.loss,
            score_mode: run.map.score_mode,
            score_target: run.map.score_target,
            samples_scored: summary.succeeded,
            samples_failed: summary.failed,
            samples_skipped: run.skipped.clone(),
            failures: run.outcome.failed.clone(),
            elapsed_ms: run.elapsed_ms,
            ranking,
            config,
        }
    }

    pub fn exit_code(&self) -> ExitCode {
        self.status.exit_code()
    }

    /// One line for `--format summary`.
    pub fn one_line(&self) -> String {
        let [s, r, c, ch, l] = self.shape;
        format!(
            "[{}] relevance: {:?} {}/{} samples scored ({} failed, {} skipped) grid {}x{} {} channels {} locations in {}ms",
            self.run_id,
            self.status,
            self.samples_scored,
            s,
            self.samples_failed,
            self.samples_skipped.len(),
            r,
            c,
            ch,
            l,
            self.elapsed_ms
        )
    }

    pub fn to_markdown(&self) -> String {
        let [s, r, c, ch, l] = self.shape;
        let mut out = String::new();
        let _ = writeln!(out, "# Relevance run {}", self.run_id);
        let _ = writeln!(out);
        let _ = writeln!(out, "- status: {:?}", self.status);
        let _ = writeln!(out, "- grid: {r} x {c}, {ch} channels, {s} samples, {l} locations");
        let _ = writeln!(
            out,
            "- loss: {}, score: {:?} {:?}",
            self.loss.as_str(),
            self.score_mode,
            self.score_target
        );
        let _ = writeln!(
            out,
            "- samples: {} scored, {} failed, {} skipped",
            self.samples_scored,
            self.samples_failed,
            self.samples_skipped.len()
        );
        let _ = writeln!(out, "- elapsed: {} ms", self.elapsed_ms);
        let _ = writeln!(out);
        let _ = writeln!(out, "## Channel importance");
        let _ = writeln!(out);
        let _ = writeln!(out, "| location | channel | mean abs score |");
        let _ = writeln!(out, "|---|---|---|");
        for row in &self.ranking {
            let value = match row.importance {
                Some(v) => format!("{v:.6}"),
                None => "n/a".to_string(),
            };
            let _ = writeln!(out, "| {} | {} | {} |", row.location, row.channel, value);
        }
        if !self.failures.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "## Failed samples");
            let _ = writeln!(out);
            for failure in &self.failures {
                let _ = writeln!(out, "- {}: {}", failure.item_id, failure.error.message);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::OutputLocation;
    use crate::relevance::RelevanceMap;
    use crate::tensor::GridMetadata;
    use ds_common::{BatchResult, Error};
    use ndarray::Array5;

    fn run(failed: bool, skipped: Vec<usize>) -> RelevanceRun {
        let mut scores = Array5::zeros((2, 1, 1, 2, 1));
        scores[[0, 0, 0, 1, 0]] = 4.0;
        scores[[1, 0, 0, 1, 0]] = -2.0;
        scores[[0, 0, 0, 0, 0]] = 1.0;
        let map = RelevanceMap::new(
            scores,
            GridMetadata::indexed(2, 1, 1, 2),
            vec![OutputLocation::named(0.0, 0.0, "site")],
            LossKind::Gaussian,
            ScoreMode::Signed,
            ScoreTarget::Expectation,
        )
        .unwrap();
        let mut outcome = BatchResult::default();
        outcome.add_success(0);
        if failed {
            outcome.add_failure("sample-1", &Error::Prediction("boom".into()));
        } else {
            outcome.add_success(1);
        }
        RelevanceRun {
            map,
            outcome,
            skipped,
            elapsed_ms: 12,
        }
    }

    #[test]
    fn test_status_and_exit_code() {
        assert_eq!(
            RunSummary::from_run("r", &run(false, vec![]), None).exit_code(),
            ExitCode::Clean
        );
        let partial = RunSummary::from_run("r", &run(true, vec![]), None);
        assert_eq!(partial.status, RunStatus::Partial);
        assert_eq!(partial.exit_code(), ExitCode::PartialFail);
        let aborted = RunSummary::from_run("r", &run(false, vec![1]), None);
        assert_eq!(aborted.exit_code(), ExitCode::Interrupted);
    }

    #[test]
    fn test_ranking_orders_channels() {
        let summary = RunSummary::from_run("r", &run(false, vec![]), None);
        assert_eq!(summary.ranking[0].channel, "ch1");
        assert_eq!(summary.ranking[0].importance, Some(3.0));
        assert_eq!(summary.ranking[1].importance, Some(0.5));
    }

    #[test]
    fn test_renderings() {
        let summary = RunSummary::from_run("ds-run", &run(true, vec![]), None);
        assert!(summary.one_line().starts_with("[ds-run] relevance: Partial 1/2"));
        let md = summary.to_markdown();
        assert!(md.contains("| site | ch1 | 3.000000 |"));
        assert!(md.contains("sample-1: model prediction failed: boom"));
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["status"], "partial");
        assert!(json.get("config").is_none());
    }
}
