//! Prediction-difference scoring.
//!
//! For each test sample and each perturbation unit the engine compares the
//! model's prediction on the untouched sample with its predictions on
//! copies whose unit cells were resampled from the baseline. The mean
//! difference per output location is that unit's relevance.

use ds_common::{BatchResult, Error, Result, RunId};
use ds_config::{RelevanceSettings, ScoreMode, ScoreTarget};
use ndarray::{Array2, Array4, Array5, ArrayView1, ArrayView3, Axis};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::baseline::{Baseline, SamplingScope};
use crate::events::{event_names as progress_events, Phase, ProgressEmitter, ProgressEvent};
use crate::grid::OutputLocation;
use crate::log_event;
use crate::logging::{event_names, get_host_id, LogContext, Stage};
use crate::loss::DistributionalLoss;
use crate::model::Predictor;
use crate::relevance::map::RelevanceMap;
use crate::relevance::units::{Unit, UnitScheme};
use crate::tensor::ChannelTensor;

/// Knobs of one relevance computation.
#[derive(Debug, Clone, PartialEq)]
pub struct RelevanceOptions {
    pub unit: UnitScheme,
    pub sampling: SamplingScope,
    /// Perturbed copies per unit.
    pub num_samples: usize,
    /// Copies per model call.
    pub batch_size: usize,
    /// Samples scored concurrently. `None` uses the pool's thread count.
    pub max_in_flight: Option<usize>,
    pub score_mode: ScoreMode,
    pub score_target: ScoreTarget,
    pub seed: u64,
    /// Dedicated pool size. `None` runs on the global rayon pool.
    pub threads: Option<usize>,
}

impl Default for RelevanceOptions {
    fn default() -> Self {
        Self::from_settings(&RelevanceSettings::default())
    }
}

impl RelevanceOptions {
    pub fn from_settings(settings: &RelevanceSettings) -> Self {
        RelevanceOptions {
            unit: UnitScheme::from_settings(&settings.unit),
            sampling: SamplingScope::from_settings(&settings.sampling),
            num_samples: settings.num_samples,
            batch_size: settings.batch_size,
            max_in_flight: settings.max_in_flight,
            score_mode: settings.score.mode,
            score_target: settings.score.target,
            seed: settings.seed,
            threads: settings.threads,
        }
    }
}

/// Cooperative cancellation flag, checked before each sample starts.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle {
    flag: Arc<AtomicBool>,
}

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Result of a relevance computation.
#[derive(Debug, Clone)]
pub struct RelevanceRun {
    pub map: RelevanceMap,
    /// Scored sample indices and per-sample failures.
    pub outcome: BatchResult<usize>,
    /// Samples never started because the run was aborted.
    pub skipped: Vec<usize>,
    pub elapsed_ms: u64,
}

impl RelevanceRun {
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty() && self.outcome.summary.all_succeeded
    }

    pub fn was_aborted(&self) -> bool {
        !self.skipped.is_empty()
    }
}

/// Seed of the sampler for one `(sample, unit)` pair.
pub fn unit_seed(seed: u64, sample: usize, unit: usize) -> u64 {
    let h = splitmix64(seed);
    let h = splitmix64(h ^ sample as u64);
    splitmix64(h ^ (unit as u64).rotate_left(32))
}

fn splitmix64(x: u64) -> u64 {
    let mut z = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Scores single samples. Holds only shared references, so one scorer is
/// used from every worker.
pub struct SampleScorer<'a> {
    model: &'a dyn Predictor,
    loss: DistributionalLoss,
    baseline: &'a Baseline,
    options: &'a RelevanceOptions,
    num_locations: usize,
}

impl<'a> SampleScorer<'a> {
    pub fn new(
        model: &'a dyn Predictor,
        loss: DistributionalLoss,
        baseline: &'a Baseline,
        options: &'a RelevanceOptions,
        num_locations: usize,
    ) -> Self {
        SampleScorer {
            model,
            loss,
            baseline,
            options,
            num_locations,
        }
    }

    /// Scores of every unit of sample `sample`, `(row, col, channel, location)`.
    ///
    /// `observed` is this sample's row of observed targets and is required
    /// for the log-likelihood target.
    pub fn score(
        &self,
        sample: usize,
        x: ArrayView3<'_, f64>,
        units: &[Unit],
        observed: Option<ArrayView1<'_, f64>>,
    ) -> Result<Array4<f64>> {
        let (rows, cols, channels) = x.dim();
        let locations = self.num_locations;
        let observed = match (self.options.score_target, observed) {
            (ScoreTarget::LogLikelihood, None) => {
                return Err(Error::Config(
                    "log-likelihood target needs observed values".into(),
                ))
            }
            (ScoreTarget::LogLikelihood, Some(obs)) => Some(obs),
            (ScoreTarget::Expectation, _) => None,
        };

        let reference_out = self.predict(x.insert_axis(Axis(0)))?;
        let mut reference = vec![0.0; locations];
        self.targets(reference_out.row(0), observed.as_ref(), &mut reference);
        if let Some(l) = reference.iter().position(|v| !v.is_finite()) {
            return Err(Error::NumericalInstability {
                sample,
                detail: format!("reference target at location {l} is {}", reference[l]),
            });
        }

        let mut scores = Array4::zeros((rows, cols, channels, locations));
        let mut perturbed = vec![0.0; locations];
        let mut sums = vec![0.0; locations];
        for unit in units {
            let seed = unit_seed(self.options.seed, sample, unit.index);
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            sums.iter_mut().for_each(|v| *v = 0.0);

            let mut remaining = self.options.num_samples;
            while remaining > 0 {
                let n = remaining.min(self.options.batch_size);
                let mut batch = Array4::zeros((n, rows, cols, channels));
                for mut copy in batch.outer_iter_mut() {
                    copy.assign(&x);
                    self.baseline
                        .resample_unit(&mut rng, unit, self.options.sampling, &mut copy);
                }
                let out = self.predict(batch.view())?;
                for row in out.rows() {
                    self.targets(row, observed.as_ref(), &mut perturbed);
                    for (sum, (r, p)) in sums.iter_mut().zip(reference.iter().zip(&perturbed)) {
                        *sum += r - p;
                    }
                }
                remaining -= n;
            }

            for (l, sum) in sums.iter().enumerate() {
                let mut score = sum / self.options.num_samples as f64;
                if self.options.score_mode == ScoreMode::Absolute {
                    score = score.abs();
                }
                if !score.is_finite() {
                    return Err(Error::NumericalInstability {
                        sample,
                        detail: format!(
                            "score for unit {} at location {l} is {score}",
                            unit.index
                        ),
                    });
                }
                for (r, c) in unit.cells() {
                    scores[[r, c, unit.channel, l]] = score;
                }
            }
        }
        Ok(scores)
    }

    /// Run the model, attributing any failure to the model.
    fn predict(&self, batch: ndarray::ArrayView4<'_, f64>) -> Result<Array2<f64>> {
        let n = batch.len_of(Axis(0));
        let out = self.model.predict(batch).map_err(|e| match e {
            Error::Prediction(_) => e,
            other => Error::Prediction(other.to_string()),
        })?;
        let expected = (n, self.model.output_len());
        if out.dim() != expected {
            return Err(Error::Prediction(format!(
                "model returned {:?} values for a batch expecting {expected:?}",
                out.dim()
            )));
        }
        Ok(out)
    }

    /// Scalar target per location from one output row.
    fn targets(
        &self,
        row: ArrayView1<'_, f64>,
        observed: Option<&ArrayView1<'_, f64>>,
        out: &mut [f64],
    ) {
        let owned;
        let row = match row.as_slice() {
            Some(slice) => slice,
            None => {
                owned = row.to_vec();
                owned.as_slice()
            }
        };
        let count = self.loss.param_count();
        for (l, slot) in out.iter_mut().enumerate() {
            let params = self.loss.gather(row, l, self.num_locations);
            *slot = match observed {
                Some(obs) => -self.loss.negative_log_likelihood(obs[l], &params[..count]),
                None => self.loss.expectation(&params[..count]),
            };
        }
    }
}

enum SampleOutcome {
    Scored(Array4<f64>),
    Failed(Error),
    Skipped,
}

/// Computes relevance maps for a model, loss and baseline.
pub struct RelevanceEngine<'a> {
    model: &'a dyn Predictor,
    loss: DistributionalLoss,
    options: RelevanceOptions,
    emitter: Option<Arc<dyn ProgressEmitter>>,
    abort: AbortHandle,
    observed: Option<Array2<f64>>,
    log: LogContext,
}

impl<'a> RelevanceEngine<'a> {
    pub fn new(
        model: &'a dyn Predictor,
        loss: DistributionalLoss,
        options: RelevanceOptions,
    ) -> Self {
        RelevanceEngine {
            model,
            loss,
            options,
            emitter: None,
            abort: AbortHandle::new(),
            observed: None,
            log: LogContext::new(RunId::new().to_string(), get_host_id()),
        }
    }

    pub fn with_emitter(mut self, emitter: Arc<dyn ProgressEmitter>) -> Self {
        self.emitter = Some(emitter);
        self
    }

    pub fn with_abort(mut self, abort: AbortHandle) -> Self {
        self.abort = abort;
        self
    }

    /// Observed targets `(sample, location)` for the log-likelihood target.
    pub fn with_observed(mut self, observed: Array2<f64>) -> Self {
        self.observed = Some(observed);
        self
    }

    pub fn with_log_context(mut self, log: LogContext) -> Self {
        self.log = log;
        self
    }

    pub fn options(&self) -> &RelevanceOptions {
        &self.options
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(emitter) = &self.emitter {
            emitter.emit(event.with_run_id(self.log.run_id.clone()));
        }
    }

    /// Check every precondition and enumerate the units.
    fn validate(
        &self,
        inputs: &ChannelTensor,
        locations: &[OutputLocation],
        baseline: &Baseline,
    ) -> Result<Vec<Unit>> {
        if inputs.samples() == 0 {
            return Err(Error::EmptyInput("test inputs have no samples".into()));
        }
        let shape = inputs.spatial_shape();
        if shape != self.model.input_shape() {
            return Err(Error::ShapeMismatch {
                what: "test inputs (rows, cols, channels)".into(),
                expected: format!("{:?}", self.model.input_shape()),
                actual: format!("{shape:?}"),
            });
        }
        baseline.check_compatible(shape)?;

        if locations.is_empty() {
            return Err(Error::EmptyInput("no output locations given".into()));
        }
        let expected = self.loss.param_count() * locations.len();
        if self.model.output_len() != expected {
            return Err(Error::ParameterLayout {
                expected,
                actual: self.model.output_len(),
                params: self.loss.param_count(),
                locations: locations.len(),
            });
        }
        self.model.template().check_locations(locations)?;

        if self.options.num_samples == 0 {
            return Err(Error::InvalidSampleCount { num_samples: 0 });
        }
        if self.options.batch_size == 0 {
            return Err(Error::InvalidSettings("batch_size must be at least 1".into()));
        }
        if self.options.max_in_flight == Some(0) {
            return Err(Error::InvalidSettings("max_in_flight must be at least 1".into()));
        }
        if self.options.threads == Some(0) {
            return Err(Error::InvalidSettings("threads must be at least 1".into()));
        }
        if let SamplingScope::Local { window_size: 0 } = self.options.sampling {
            return Err(Error::InvalidSettings(
                "window_size must be at least 1 for local sampling".into(),
            ));
        }

        if self.options.score_target == ScoreTarget::LogLikelihood {
            let expected = (inputs.samples(), locations.len());
            match &self.observed {
                None => {
                    return Err(Error::Config(
                        "log-likelihood target needs observed values".into(),
                    ))
                }
                Some(obs) if obs.dim() != expected => {
                    return Err(Error::ShapeMismatch {
                        what: "observed targets (samples, locations)".into(),
                        expected: format!("{expected:?}"),
                        actual: format!("{:?}", obs.dim()),
                    })
                }
                Some(_) => {}
            }
        }

        let (rows, cols, channels) = shape;
        self.options.unit.units(rows, cols, channels)
    }

    /// Compute the relevance map of every test sample.
    ///
    /// Configuration and domain errors are returned before scoring starts.
    /// A sample whose scoring fails is recorded in the outcome and its map
    /// slice is NaN.
    pub fn compute(
        &self,
        inputs: &ChannelTensor,
        locations: &[OutputLocation],
        baseline: &Baseline,
    ) -> Result<RelevanceRun> {
        let started = Instant::now();
        let units = match self.validate(inputs, locations, baseline) {
            Ok(units) => units,
            Err(err) => {
                let reason = err.to_string();
                log_event!(
                    self.log,
                    WARN,
                    event_names::VALIDATION_FAILED,
                    Stage::Validate,
                    "Relevance inputs rejected",
                    code = err.code(),
                    reason = reason.as_str()
                );
                return Err(err);
            }
        };

        let samples = inputs.samples();
        log_event!(
            self.log,
            INFO,
            event_names::SCORE_STARTED,
            Stage::Score,
            "Scoring relevance",
            samples = samples,
            units = units.len(),
            locations = locations.len(),
            num_samples = self.options.num_samples
        );
        self.emit(
            ProgressEvent::new(progress_events::RELEVANCE_STARTED, Phase::Score)
                .with_progress(0, Some(samples as u64))
                .with_detail("units", units.len())
                .with_detail("locations", locations.len())
                .with_detail("loss", self.loss.kind().as_str()),
        );

        let outcomes = match self.options.threads {
            Some(threads) => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .build()
                    .map_err(|e| Error::Config(format!("cannot build worker pool: {e}")))?;
                pool.install(|| self.score_all(inputs, &units, locations.len(), baseline, started))
            }
            None => self.score_all(inputs, &units, locations.len(), baseline, started),
        };

        let (rows, cols, channels) = inputs.spatial_shape();
        let mut scores =
            Array5::from_elem((samples, rows, cols, channels, locations.len()), f64::NAN);
        let mut outcome = BatchResult::default();
        let mut skipped = Vec::new();
        for (s, result) in outcomes.into_iter().enumerate() {
            match result {
                SampleOutcome::Scored(slice) => {
                    scores.index_axis_mut(Axis(0), s).assign(&slice);
                    outcome.add_success(s);
                }
                SampleOutcome::Failed(err) => outcome.add_failure(format!("sample-{s}"), &err),
                SampleOutcome::Skipped => skipped.push(s),
            }
        }

        let map = RelevanceMap::new(
            scores,
            inputs.metadata().clone(),
            locations.to_vec(),
            self.loss.kind(),
            self.options.score_mode,
            self.options.score_target,
        )?;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        if !skipped.is_empty() {
            log_event!(
                self.log,
                WARN,
                event_names::SCORE_ABORTED,
                Stage::Score,
                "Run aborted before all samples started",
                skipped = skipped.len()
            );
            self.emit(
                ProgressEvent::new(progress_events::RELEVANCE_ABORTED, Phase::Score)
                    .with_elapsed_ms(elapsed_ms)
                    .with_detail("skipped", &skipped),
            );
        }
        log_event!(
            self.log,
            INFO,
            event_names::SCORE_FINISHED,
            Stage::Score,
            "Relevance scoring finished",
            scored = outcome.summary.succeeded,
            failed = outcome.summary.failed,
            skipped = skipped.len(),
            elapsed_ms = elapsed_ms
        );
        self.emit(
            ProgressEvent::new(progress_events::RELEVANCE_COMPLETE, Phase::Score)
                .with_progress(outcome.summary.total as u64, Some(samples as u64))
                .with_elapsed_ms(elapsed_ms)
                .with_detail("scored", outcome.summary.succeeded)
                .with_detail("failed", outcome.summary.failed)
                .with_detail("skipped", skipped.len()),
        );

        Ok(RelevanceRun {
            map,
            outcome,
            skipped,
            elapsed_ms,
        })
    }

    fn score_all(
        &self,
        inputs: &ChannelTensor,
        units: &[Unit],
        num_locations: usize,
        baseline: &Baseline,
        started: Instant,
    ) -> Vec<SampleOutcome> {
        let samples = inputs.samples();
        let scorer =
            SampleScorer::new(self.model, self.loss, baseline, &self.options, num_locations);
        let window = self
            .options
            .max_in_flight
            .unwrap_or_else(rayon::current_num_threads)
            .max(1);
        let done = AtomicU64::new(0);

        let mut outcomes = Vec::with_capacity(samples);
        for start in (0..samples).step_by(window) {
            let end = (start + window).min(samples);
            let chunk: Vec<SampleOutcome> = (start..end)
                .into_par_iter()
                .map(|s| {
                    if self.abort.is_aborted() {
                        return SampleOutcome::Skipped;
                    }
                    let observed = self.observed.as_ref().map(|obs| obs.row(s));
                    let result = scorer.score(s, inputs.sample(s), units, observed);
                    let current = done.fetch_add(1, Ordering::SeqCst) + 1;
                    self.report_sample(s, &result, current, samples, started);
                    match result {
                        Ok(slice) => SampleOutcome::Scored(slice),
                        Err(err) => SampleOutcome::Failed(err),
                    }
                })
                .collect();
            outcomes.extend(chunk);
        }
        outcomes
    }

    fn report_sample(
        &self,
        sample: usize,
        result: &Result<Array4<f64>>,
        current: u64,
        total: usize,
        started: Instant,
    ) {
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match result {
            Ok(_) => {
                log_event!(
                    self.log,
                    DEBUG,
                    event_names::SCORE_SAMPLE_DONE,
                    Stage::Score,
                    "Sample scored",
                    sample = sample
                );
                self.emit(
                    ProgressEvent::new(progress_events::SAMPLE_SCORED, Phase::Score)
                        .with_progress(current, Some(total as u64))
                        .with_elapsed_ms(elapsed_ms)
                        .with_detail("sample", sample),
                );
            }
            Err(err) => {
                let reason = err.to_string();
                log_event!(
                    self.log,
                    WARN,
                    event_names::SCORE_SAMPLE_FAILED,
                    Stage::Score,
                    "Sample scoring failed",
                    sample = sample,
                    code = err.code(),
                    reason = reason.as_str()
                );
                self.emit(
                    ProgressEvent::new(progress_events::SAMPLE_FAILED, Phase::Score)
                        .with_progress(current, Some(total as u64))
                        .with_elapsed_ms(elapsed_ms)
                        .with_detail("sample", sample)
                        .with_detail("code", err.code())
                        .with_detail("reason", reason),
                );
            }
        }
    }
}

/// One-shot entry point: build an engine and run it.
pub fn compute_relevance_maps(
    test_inputs: &ChannelTensor,
    model: &dyn Predictor,
    loss: DistributionalLoss,
    locations: &[OutputLocation],
    baseline: &Baseline,
    options: RelevanceOptions,
) -> Result<RelevanceRun> {
    RelevanceEngine::new(model, loss, options).compute(test_inputs, locations, baseline)
}
