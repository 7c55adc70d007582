use ndarray::{Array4, ArrayView4};
use std::path::Path;

#[cfg(feature = "torch")]
use std::sync::Mutex;
#[cfg(feature = "torch")]
use tch::{CModule, Device, Kind, Tensor};

use super::config::{HeadSetting, ModelConfig};
#[cfg(feature = "torch")]
use super::config::TensorLayout;

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("Failed to read image: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to decode image: {0}")]
    Image(#[from] image::ImageError),
    #[error("Preprocessing error: {0}")]
    Preprocessing(String),
    #[error("Model error: {0}")]
    Model(String),
    #[error("Model produced unusable output: {0}")]
    InvalidOutput(String),
    #[error("Model backend unavailable: {0}")]
    BackendUnavailable(String),
}

#[cfg(feature = "torch")]
impl From<tch::TchError> for InferenceError {
    fn from(err: tch::TchError) -> Self {
        InferenceError::Model(err.to_string())
    }
}

/// Opaque pre-trained image classifier. Takes a `1 x H x W x 3` batch and
/// returns the flattened output units.
pub trait Classifier: Send + Sync {
    fn forward(&self, input: ArrayView4<'_, f32>) -> Result<Vec<f32>, InferenceError>;
}

/// How raw output units map to a label, decided once when the model is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputHead {
    /// One unit: probability of pneumonia.
    Sigmoid,
    /// Two units: per-class probabilities.
    Softmax,
    /// Unexpected width: threshold the largest unit.
    Fallback,
}

impl OutputHead {
    pub fn from_width(width: usize) -> Self {
        match width {
            1 => OutputHead::Sigmoid,
            2 => OutputHead::Softmax,
            _ => OutputHead::Fallback,
        }
    }

    /// Resolves the head from config, running one zero-filled probe batch when set to `auto`.
    pub fn resolve(
        setting: HeadSetting,
        classifier: &dyn Classifier,
        config: &ModelConfig,
    ) -> Result<Self, InferenceError> {
        match setting {
            HeadSetting::Sigmoid => Ok(OutputHead::Sigmoid),
            HeadSetting::Softmax => Ok(OutputHead::Softmax),
            HeadSetting::Auto => {
                let (width, height) = config.input_size();
                let probe = Array4::<f32>::zeros((1, height as usize, width as usize, 3));
                let output = classifier.forward(probe.view())?;
                if output.is_empty() {
                    return Err(InferenceError::InvalidOutput(
                        "probe returned no output units".into(),
                    ));
                }
                let head = OutputHead::from_width(output.len());
                if head == OutputHead::Fallback {
                    log::warn!(
                        "Model emits {} output units, thresholding the maximum value",
                        output.len()
                    );
                }
                Ok(head)
            }
        }
    }
}

#[cfg(feature = "torch")]
pub struct TorchClassifier {
    module: Mutex<CModule>,
    device: Device,
    layout: TensorLayout,
}

#[cfg(feature = "torch")]
impl TorchClassifier {
    pub fn load(model_path: &Path, layout: TensorLayout) -> Result<Self, InferenceError> {
        let device = Device::cuda_if_available();
        let module = CModule::load_on_device(model_path, device)?;
        log::info!("Loaded TorchScript model {} on {:?}", model_path.display(), device);
        Ok(Self {
            module: Mutex::new(module),
            device,
            layout,
        })
    }
}

#[cfg(feature = "torch")]
impl Classifier for TorchClassifier {
    fn forward(&self, input: ArrayView4<'_, f32>) -> Result<Vec<f32>, InferenceError> {
        let shape: Vec<i64> = input.shape().iter().map(|&d| d as i64).collect();
        let data: Vec<f32> = input.iter().copied().collect();
        let mut tensor = Tensor::from_slice(&data)
            .view(shape.as_slice())
            .to_device(self.device);
        if self.layout == TensorLayout::Nchw {
            tensor = tensor.permute([0, 3, 1, 2]);
        }

        let output = self
            .module
            .lock()
            .map_err(|_| InferenceError::Model("model mutex poisoned".into()))?
            .forward_ts(&[tensor])?;

        let output_flat = output.to_kind(Kind::Float).view([-1]);
        let num_elements = output_flat.size()[0] as usize;
        let mut output_vec = vec![0.0f32; num_elements];
        output_flat.copy_data(&mut output_vec, num_elements);
        Ok(output_vec)
    }
}

/// Loads the classifier backend compiled into this build.
#[cfg(feature = "torch")]
pub fn load_classifier(
    model_path: &Path,
    config: &ModelConfig,
) -> Result<Box<dyn Classifier>, InferenceError> {
    Ok(Box::new(TorchClassifier::load(model_path, config.image.layout)?))
}

#[cfg(not(feature = "torch"))]
pub fn load_classifier(
    model_path: &Path,
    _config: &ModelConfig,
) -> Result<Box<dyn Classifier>, InferenceError> {
    Err(InferenceError::BackendUnavailable(format!(
        "cannot load {}: built without the `torch` feature",
        model_path.display()
    )))
}
