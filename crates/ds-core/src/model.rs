//! Predictive models.
//!
//! The engine only needs a read-only capability: map a batch of inputs to
//! distribution parameters. `Predictor` is that capability; trained
//! networks live outside this crate and plug in through it.
//!
//! Two implementations ship here: `LinearReadout`, a serializable dense
//! readout loaded from a JSON checkpoint, and `ConstantPredictor` for
//! smoke tests.

use ds_common::{Error, Result};
use ds_config::LossKind;
use ndarray::{Array2, ArrayView2, ArrayView4, Axis};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::grid::TrainingTemplate;
use crate::loss::DistributionalLoss;

/// A trained model mapping `(row, col, channel)` inputs to a parameter-major
/// row of distribution parameters per output location.
pub trait Predictor: Send + Sync {
    /// `(rows, cols, channels)` of one input sample.
    fn input_shape(&self) -> (usize, usize, usize);

    /// Values emitted per sample.
    fn output_len(&self) -> usize;

    /// Target grid the model was trained on.
    fn template(&self) -> &TrainingTemplate;

    /// Predict a batch `(n, rows, cols, channels)`, returning `(n, output_len)`.
    fn predict(&self, batch: ArrayView4<'_, f64>) -> Result<Array2<f64>>;
}

fn check_batch(model: &dyn Predictor, batch: &ArrayView4<'_, f64>) -> Result<()> {
    let (_, r, c, ch) = batch.dim();
    if (r, c, ch) != model.input_shape() {
        return Err(Error::Prediction(format!(
            "batch sample shape {:?} does not match model input {:?}",
            (r, c, ch),
            model.input_shape()
        )));
    }
    Ok(())
}

/// Emits the same parameter row for every input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstantPredictor {
    pub input_shape: [usize; 3],
    pub output: Vec<f64>,
    pub template: TrainingTemplate,
}

impl ConstantPredictor {
    pub fn new(
        input_shape: (usize, usize, usize),
        output: Vec<f64>,
        template: TrainingTemplate,
    ) -> Self {
        ConstantPredictor {
            input_shape: [input_shape.0, input_shape.1, input_shape.2],
            output,
            template,
        }
    }
}

impl Predictor for ConstantPredictor {
    fn input_shape(&self) -> (usize, usize, usize) {
        (self.input_shape[0], self.input_shape[1], self.input_shape[2])
    }

    fn output_len(&self) -> usize {
        self.output.len()
    }

    fn template(&self) -> &TrainingTemplate {
        &self.template
    }

    fn predict(&self, batch: ArrayView4<'_, f64>) -> Result<Array2<f64>> {
        check_batch(self, &batch)?;
        let n = batch.len_of(Axis(0));
        Ok(Array2::from_shape_fn((n, self.output.len()), |(_, j)| self.output[j]))
    }
}

/// Dense readout: `link(W · flatten(x) + b)`.
///
/// Inputs are flattened in `(row, col, channel)` order. `weights` is
/// row-major `(output_len, rows * cols * channels)`. Raw outputs are mapped
/// through the loss's link functions, parameter by parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearReadout {
    pub loss: LossKind,
    pub input_shape: [usize; 3],
    pub num_locations: usize,
    pub weights: Vec<f64>,
    pub bias: Vec<f64>,
    pub template: TrainingTemplate,
}

impl LinearReadout {
    fn features(&self) -> usize {
        self.input_shape.iter().product()
    }

    fn link_loss(&self) -> DistributionalLoss {
        match self.loss {
            LossKind::BernoulliGamma => DistributionalLoss::bernoulli_gamma(),
            LossKind::Gaussian => DistributionalLoss::gaussian(),
        }
    }

    /// Check weight and bias lengths against the declared shapes.
    pub fn validate(&self) -> Result<()> {
        let out = self.output_len();
        if self.num_locations == 0 || self.features() == 0 {
            return Err(Error::Config(
                "linear readout needs at least one location and one input feature".into(),
            ));
        }
        if self.weights.len() != out * self.features() {
            return Err(Error::ShapeMismatch {
                what: "linear readout weights".into(),
                expected: format!("{} ({} x {})", out * self.features(), out, self.features()),
                actual: self.weights.len().to_string(),
            });
        }
        if self.bias.len() != out {
            return Err(Error::ShapeMismatch {
                what: "linear readout bias".into(),
                expected: out.to_string(),
                actual: self.bias.len().to_string(),
            });
        }
        if self.weights.iter().chain(&self.bias).any(|v| !v.is_finite()) {
            return Err(Error::Config("linear readout contains non-finite coefficients".into()));
        }
        Ok(())
    }

    fn weight_matrix(&self) -> Result<ArrayView2<'_, f64>> {
        ArrayView2::from_shape((self.output_len(), self.features()), self.weights.as_slice())
            .map_err(|e| Error::Prediction(format!("weight layout: {e}")))
    }
}

impl Predictor for LinearReadout {
    fn input_shape(&self) -> (usize, usize, usize) {
        (self.input_shape[0], self.input_shape[1], self.input_shape[2])
    }

    fn output_len(&self) -> usize {
        self.link_loss().param_count() * self.num_locations
    }

    fn template(&self) -> &TrainingTemplate {
        &self.template
    }

    fn predict(&self, batch: ArrayView4<'_, f64>) -> Result<Array2<f64>> {
        check_batch(self, &batch)?;
        let n = batch.len_of(Axis(0));
        let flat = batch
            .as_standard_layout()
            .into_owned()
            .into_shape_with_order((n, self.features()))
            .map_err(|e| Error::Prediction(format!("input layout: {e}")))?;

        let mut out = flat.dot(&self.weight_matrix()?.t());
        out += &ArrayView2::from_shape((1, self.bias.len()), self.bias.as_slice())
            .map_err(|e| Error::Prediction(format!("bias layout: {e}")))?;

        let loss = self.link_loss();
        let per_param = self.num_locations;
        for mut row in out.rows_mut() {
            for (j, value) in row.iter_mut().enumerate() {
                *value = loss.link(j / per_param, *value);
            }
        }
        Ok(out)
    }
}

/// Model checkpoint file, tagged by `kind`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelCheckpoint {
    LinearReadout(LinearReadout),
    Constant(ConstantPredictor),
}

impl ModelCheckpoint {
    pub fn from_json_str(content: &str) -> Result<Self> {
        let checkpoint: ModelCheckpoint = serde_json::from_str(content)?;
        if let ModelCheckpoint::LinearReadout(readout) = &checkpoint {
            readout.validate()?;
        }
        Ok(checkpoint)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Loss the checkpoint was trained with, when it records one.
    pub fn loss(&self) -> Option<LossKind> {
        match self {
            ModelCheckpoint::LinearReadout(r) => Some(r.loss),
            ModelCheckpoint::Constant(_) => None,
        }
    }

    pub fn into_predictor(self) -> Box<dyn Predictor> {
        match self {
            ModelCheckpoint::LinearReadout(r) => Box::new(r),
            ModelCheckpoint::Constant(c) => Box::new(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array4;

    fn template() -> TrainingTemplate {
        TrainingTemplate::new(vec![0.0, 1.0], vec![0.0, 1.0])
    }

    fn gaussian_readout() -> LinearReadout {
        // 1x2 grid, 1 channel, 1 location: mean = 2*x0 - x1 + 0.5, log_scale = 0.1
        LinearReadout {
            loss: LossKind::Gaussian,
            input_shape: [1, 2, 1],
            num_locations: 1,
            weights: vec![2.0, -1.0, 0.0, 0.0],
            bias: vec![0.5, 0.1],
            template: template(),
        }
    }

    #[test]
    fn test_constant_predictor_broadcasts() {
        let model = ConstantPredictor::new((3, 3, 2), vec![1.0, 0.0], template());
        let out = model.predict(Array4::zeros((4, 3, 3, 2)).view()).unwrap();
        assert_eq!(out.dim(), (4, 2));
        assert!(out.rows().into_iter().all(|r| r[0] == 1.0 && r[1] == 0.0));
    }

    #[test]
    fn test_predict_rejects_wrong_shape() {
        let model = ConstantPredictor::new((3, 3, 2), vec![1.0, 0.0], template());
        let err = model.predict(Array4::zeros((1, 3, 3, 1)).view()).unwrap_err();
        assert!(matches!(err, Error::Prediction(_)));
    }

    #[test]
    fn test_linear_readout_gaussian() {
        let model = gaussian_readout();
        model.validate().unwrap();
        let mut batch = Array4::zeros((2, 1, 2, 1));
        batch[[0, 0, 0, 0]] = 1.0;
        batch[[0, 0, 1, 0]] = 3.0;
        batch[[1, 0, 0, 0]] = -1.0;
        let out = model.predict(batch.view()).unwrap();
        assert!((out[[0, 0]] - (2.0 - 3.0 + 0.5)).abs() < 1e-12);
        assert!((out[[1, 0]] - (-2.0 + 0.5)).abs() < 1e-12);
        assert!((out[[1, 1]] - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_linear_readout_bernoulli_gamma_links() {
        let model = LinearReadout {
            loss: LossKind::BernoulliGamma,
            input_shape: [1, 1, 1],
            num_locations: 2,
            weights: vec![0.0; 6],
            bias: vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0],
            template: template(),
        };
        model.validate().unwrap();
        let out = model.predict(Array4::zeros((1, 1, 1, 1)).view()).unwrap();
        assert!((out[[0, 0]] - 0.5).abs() < 1e-12);
        assert!((out[[0, 1]] - 0.5).abs() < 1e-12);
        assert!((out[[0, 2]] - 1.0).abs() < 1e-12);
        assert!((out[[0, 3]] - std::f64::consts::E).abs() < 1e-12);
    }

    #[test]
    fn test_validate_catches_bad_lengths() {
        let mut model = gaussian_readout();
        model.weights.pop();
        assert!(matches!(model.validate(), Err(Error::ShapeMismatch { .. })));

        let mut model = gaussian_readout();
        model.bias = vec![0.0];
        assert!(matches!(model.validate(), Err(Error::ShapeMismatch { .. })));
    }

    #[test]
    fn test_checkpoint_tagging() {
        let json =
            serde_json::to_string(&ModelCheckpoint::LinearReadout(gaussian_readout())).unwrap();
        assert!(json.contains(r#""kind":"linear_readout""#));

        let checkpoint = ModelCheckpoint::from_json_str(&json).unwrap();
        assert_eq!(checkpoint.loss(), Some(LossKind::Gaussian));
        let model = checkpoint.into_predictor();
        assert_eq!(model.output_len(), 2);
        assert_eq!(model.input_shape(), (1, 2, 1));
    }

    #[test]
    fn test_checkpoint_rejects_unknown_kind() {
        assert!(ModelCheckpoint::from_json_str(r#"{"kind":"transformer"}"#).is_err());
    }
}
