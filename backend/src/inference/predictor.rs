use image::DynamicImage;
use rand::Rng;
use shared::{Label, PredictionResult};
use std::path::Path;
use std::sync::Arc;

use super::config::{Activation, ModelConfig};
use super::model::{Classifier, InferenceError, OutputHead};
use super::preprocess::{load_image, preprocess};

/// Display rule for over-confident output: anything above `threshold` percent
/// is replaced by a uniform draw from `range`. This hides the model's real
/// value and may be masking miscalibration; it is kept for parity with the
/// existing result pages and reports.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceCap {
    pub threshold: f64,
    pub range: (f64, f64),
}

impl ConfidenceCap {
    pub fn from_config(config: &ModelConfig) -> Self {
        Self {
            threshold: config.confidence.cap,
            range: config.resample_range(),
        }
    }

    /// Converts a probability into the displayed percentage.
    pub fn apply<R: Rng + ?Sized>(&self, probability: f64, rng: &mut R) -> f64 {
        let percent = round2(probability * 100.0).clamp(0.0, 100.0);
        if percent > self.threshold {
            let (low, high) = self.range;
            round2(rng.random_range(low..=high))
        } else {
            percent
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn activate(outputs: &mut [f32], activation: Activation) {
    match activation {
        Activation::None => {}
        Activation::Sigmoid => {
            for v in outputs.iter_mut() {
                *v = 1.0 / (1.0 + (-*v).exp());
            }
        }
        Activation::Softmax => {
            let max = outputs.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            let mut sum = 0.0;
            for v in outputs.iter_mut() {
                *v = (*v - max).exp();
                sum += *v;
            }
            for v in outputs.iter_mut() {
                *v /= sum;
            }
        }
    }
}

/// Maps raw output units to a label and the probability of that label.
pub fn interpret(
    head: OutputHead,
    outputs: &[f32],
    threshold: f32,
) -> Result<(Label, f32), InferenceError> {
    if outputs.is_empty() {
        return Err(InferenceError::InvalidOutput("no output units".into()));
    }
    if outputs.iter().any(|v| !v.is_finite()) {
        return Err(InferenceError::InvalidOutput(format!(
            "non-finite output {:?}",
            outputs
        )));
    }

    let thresholded = |p: f32| {
        if p > threshold {
            (Label::Pneumonia, p)
        } else {
            (Label::Normal, 1.0 - p)
        }
    };

    let (label, probability) = match head {
        OutputHead::Softmax if outputs.len() == 2 => {
            let index = if outputs[1] > outputs[0] { 1 } else { 0 };
            (Label::from_index(index), outputs[index])
        }
        OutputHead::Sigmoid if outputs.len() == 1 => thresholded(outputs[0]),
        _ => {
            let max = outputs.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            thresholded(max)
        }
    };
    if probability <= 0.0 {
        return Err(InferenceError::InvalidOutput(format!(
            "no positive probability in {:?}",
            outputs
        )));
    }
    Ok((label, probability))
}

#[derive(Clone)]
pub struct Predictor {
    classifier: Arc<dyn Classifier>,
    head: OutputHead,
    config: ModelConfig,
    cap: ConfidenceCap,
}

impl Predictor {
    /// Wraps a loaded classifier, fixing its output head for the process lifetime.
    pub fn new(classifier: Arc<dyn Classifier>, config: ModelConfig) -> Result<Self, InferenceError> {
        let head = OutputHead::resolve(config.output.head, classifier.as_ref(), &config)?;
        log::info!("Classifier output head: {:?}", head);
        let cap = ConfidenceCap::from_config(&config);
        Ok(Self {
            classifier,
            head,
            config,
            cap,
        })
    }

    pub fn head(&self) -> OutputHead {
        self.head
    }

    pub fn model_version(&self) -> &str {
        &self.config.version
    }

    pub fn predict_file(&self, path: &Path) -> Result<PredictionResult, InferenceError> {
        let image = load_image(path)?;
        self.predict_image(&image, &path.display().to_string())
    }

    /// Classifies an already decoded image. `source` only labels log lines.
    pub fn predict_image(&self, image: &DynamicImage, source: &str) -> Result<PredictionResult, InferenceError> {
        let tensor = preprocess(image, &self.config)?;
        let mut outputs = self.classifier.forward(tensor.view())?;
        log::debug!("Raw model output for {}: {:?}", source, outputs);

        activate(&mut outputs, self.config.output.activation);
        let (label, probability) = interpret(self.head, &outputs, self.config.output.threshold)?;
        let confidence = self.cap.apply(f64::from(probability), &mut rand::rng());
        if confidence <= 0.0 {
            return Err(InferenceError::InvalidOutput(format!(
                "probability {} rounds to 0%",
                probability
            )));
        }

        Ok(PredictionResult { label, confidence })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use ndarray::ArrayView4;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    struct Fixed(Vec<f32>);

    impl Classifier for Fixed {
        fn forward(&self, _input: ArrayView4<'_, f32>) -> Result<Vec<f32>, InferenceError> {
            Ok(self.0.clone())
        }
    }

    fn cap() -> ConfidenceCap {
        ConfidenceCap::from_config(&ModelConfig::default())
    }

    fn write_xray(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("xray.png");
        RgbImage::from_pixel(32, 32, Rgb([90, 90, 90])).save(&path).unwrap();
        path
    }

    #[test]
    fn softmax_takes_argmax() {
        let (label, p) = interpret(OutputHead::Softmax, &[0.2, 0.8], 0.5).unwrap();
        assert_eq!(label, Label::Pneumonia);
        assert_eq!(p, 0.8);

        let (label, p) = interpret(OutputHead::Softmax, &[0.7, 0.3], 0.5).unwrap();
        assert_eq!(label, Label::Normal);
        assert_eq!(p, 0.7);
    }

    #[test]
    fn sigmoid_reports_distance_from_wrong_side() {
        let (label, p) = interpret(OutputHead::Sigmoid, &[0.875], 0.5).unwrap();
        assert_eq!(label, Label::Pneumonia);
        assert!((p - 0.875).abs() < 1e-6);

        let (label, p) = interpret(OutputHead::Sigmoid, &[0.25], 0.5).unwrap();
        assert_eq!(label, Label::Normal);
        assert!((p - 0.75).abs() < 1e-6);
    }

    #[test]
    fn exactly_half_is_normal() {
        let (label, p) = interpret(OutputHead::Sigmoid, &[0.5], 0.5).unwrap();
        assert_eq!(label, Label::Normal);
        assert_eq!(p, 0.5);
    }

    #[test]
    fn fallback_thresholds_maximum() {
        let (label, p) = interpret(OutputHead::Fallback, &[0.1, 0.3, 0.9], 0.5).unwrap();
        assert_eq!(label, Label::Pneumonia);
        assert!((p - 0.9).abs() < 1e-6);

        let (label, p) = interpret(OutputHead::Fallback, &[0.1, 0.2, 0.4], 0.5).unwrap();
        assert_eq!(label, Label::Normal);
        assert!((p - 0.6).abs() < 1e-6);
    }

    #[test]
    fn head_width_mismatch_falls_back() {
        let (label, _) = interpret(OutputHead::Softmax, &[0.9], 0.5).unwrap();
        assert_eq!(label, Label::Pneumonia);
    }

    #[test]
    fn rejects_unusable_output() {
        assert!(interpret(OutputHead::Sigmoid, &[], 0.5).is_err());
        assert!(interpret(OutputHead::Softmax, &[f32::NAN, 0.5], 0.5).is_err());
    }

    #[test]
    fn rejects_output_without_positive_probability() {
        assert!(matches!(
            interpret(OutputHead::Softmax, &[0.0, 0.0], 0.5),
            Err(InferenceError::InvalidOutput(_))
        ));
        assert!(matches!(
            interpret(OutputHead::Softmax, &[-3.0, -1.0], 0.5),
            Err(InferenceError::InvalidOutput(_))
        ));
        assert!(interpret(OutputHead::Fallback, &[-0.5, -0.2, -0.1], 0.5).is_ok());
    }

    #[test]
    fn predict_rejects_confidence_that_rounds_to_zero() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb([10, 10, 10])));
        let predictor =
            Predictor::new(Arc::new(Fixed(vec![0.00001, 0.000001])), ModelConfig::default()).unwrap();
        assert!(matches!(
            predictor.predict_image(&img, "tiny"),
            Err(InferenceError::InvalidOutput(_))
        ));
    }

    #[test]
    fn cap_keeps_values_at_or_below_threshold() {
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(cap().apply(0.875, &mut rng), 87.5);
        assert_eq!(cap().apply(0.99, &mut rng), 99.0);
        assert_eq!(cap().apply(0.123456, &mut rng), 12.35);
    }

    #[test]
    fn cap_resamples_overconfident_values_into_range() {
        let mut rng = StdRng::seed_from_u64(42);
        for raw in [0.9951, 0.999, 1.0] {
            for _ in 0..200 {
                let shown = cap().apply(raw, &mut rng);
                assert!((94.0..=99.0).contains(&shown), "{shown} out of range");
                assert_eq!(shown, round2(shown));
            }
        }
    }

    #[test]
    fn displayed_confidence_is_within_bounds() {
        let mut rng = StdRng::seed_from_u64(3);
        for head in [OutputHead::Sigmoid, OutputHead::Softmax, OutputHead::Fallback] {
            for i in 0..=100 {
                let p = i as f32 / 100.0;
                let outputs = match head {
                    OutputHead::Sigmoid => vec![p],
                    OutputHead::Softmax => vec![1.0 - p, p],
                    OutputHead::Fallback => vec![p, p / 2.0, p / 3.0],
                };
                let (_, prob) = interpret(head, &outputs, 0.5).unwrap();
                let shown = cap().apply(f64::from(prob), &mut rng);
                assert!(shown > 0.0 && shown <= 100.0, "{shown} for {outputs:?}");
            }
        }
    }

    #[test]
    fn softmax_activation_normalises_logits() {
        let mut outputs = vec![1.0, 3.0];
        activate(&mut outputs, Activation::Softmax);
        assert!((outputs.iter().sum::<f32>() - 1.0).abs() < 1e-6);
        assert!(outputs[1] > outputs[0]);

        let mut single = vec![0.0];
        activate(&mut single, Activation::Sigmoid);
        assert!((single[0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn predict_file_runs_the_whole_chain() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_xray(dir.path());

        let predictor = Predictor::new(Arc::new(Fixed(vec![0.125, 0.875])), ModelConfig::default()).unwrap();
        assert_eq!(predictor.head(), OutputHead::Softmax);

        let result = predictor.predict_file(&path).unwrap();
        assert_eq!(result.label, Label::Pneumonia);
        assert_eq!(result.confidence, 87.5);
    }

    #[test]
    fn predict_file_caps_certain_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_xray(dir.path());

        let predictor = Predictor::new(Arc::new(Fixed(vec![0.0])), ModelConfig::default()).unwrap();
        let result = predictor.predict_file(&path).unwrap();
        assert_eq!(result.label, Label::Normal);
        assert!((94.0..=99.0).contains(&result.confidence));
    }
}
