use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum ModelConfigError {
    #[error("Failed to read model config: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid model config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid model config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub version: String,
    pub image: ImageConfig,
    pub output: OutputConfig,
    pub confidence: ConfidenceConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageConfig {
    pub size: Vec<u32>,
    pub channels: u32,
    pub layout: TensorLayout,
    pub preprocessing: PreprocessingConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TensorLayout {
    Nhwc,
    Nchw,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessingConfig {
    pub resize_method: ResizeMethod,
    pub scale: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResizeMethod {
    Nearest,
    Triangle,
    Lanczos3,
}

impl ResizeMethod {
    pub fn filter(self) -> image::imageops::FilterType {
        match self {
            ResizeMethod::Nearest => image::imageops::FilterType::Nearest,
            ResizeMethod::Triangle => image::imageops::FilterType::Triangle,
            ResizeMethod::Lanczos3 => image::imageops::FilterType::Lanczos3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    pub head: HeadSetting,
    pub activation: Activation,
    pub threshold: f32,
}

/// `auto` probes the model once at load time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeadSetting {
    Auto,
    Sigmoid,
    Softmax,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    None,
    Sigmoid,
    Softmax,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceConfig {
    pub cap: f64,
    pub resample: Vec<f64>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            version: "v1.2".to_string(),
            image: ImageConfig {
                size: vec![224, 224],
                channels: 3,
                layout: TensorLayout::Nhwc,
                preprocessing: PreprocessingConfig {
                    resize_method: ResizeMethod::Nearest,
                    scale: 255.0,
                },
            },
            output: OutputConfig {
                head: HeadSetting::Auto,
                activation: Activation::None,
                threshold: 0.5,
            },
            confidence: ConfidenceConfig {
                cap: 99.0,
                resample: vec![94.0, 99.0],
            },
        }
    }
}

impl ModelConfig {
    pub fn load(path: &Path) -> Result<Self, ModelConfigError> {
        let config_str = std::fs::read_to_string(path)?;
        Self::from_yaml(&config_str)
    }

    /// Loads the config, falling back to the defaults when the file does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self, ModelConfigError> {
        if !path.exists() {
            log::warn!(
                "Model config {} not found, using built-in defaults",
                path.display()
            );
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn from_yaml(source: &str) -> Result<Self, ModelConfigError> {
        let config: ModelConfig = serde_yaml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ModelConfigError> {
        if self.image.size.len() != 2 || self.image.size.contains(&0) {
            return Err(ModelConfigError::Invalid(format!(
                "image.size must be [width, height], got {:?}",
                self.image.size
            )));
        }
        if self.image.channels != 3 {
            return Err(ModelConfigError::Invalid(format!(
                "only 3-channel input is supported, got {}",
                self.image.channels
            )));
        }
        if self.image.preprocessing.scale <= 0.0 {
            return Err(ModelConfigError::Invalid(
                "image.preprocessing.scale must be positive".into(),
            ));
        }
        match self.confidence.resample.as_slice() {
            [low, high] if low <= high => Ok(()),
            other => Err(ModelConfigError::Invalid(format!(
                "confidence.resample must be [low, high], got {:?}",
                other
            ))),
        }
    }

    pub fn input_size(&self) -> (u32, u32) {
        (self.image.size[0], self.image.size[1])
    }

    pub fn resample_range(&self) -> (f64, f64) {
        (self.confidence.resample[0], self.confidence.resample[1])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_shipped_config() {
        let yaml = include_str!("../../../config/model.yaml");
        let config = ModelConfig::from_yaml(yaml).unwrap();
        assert_eq!(config, ModelConfig::default());
    }

    #[test]
    fn rejects_inverted_resample_range() {
        let yaml = include_str!("../../../config/model.yaml").replace("[94.0, 99.0]", "[99.0, 94.0]");
        assert!(matches!(
            ModelConfig::from_yaml(&yaml),
            Err(ModelConfigError::Invalid(_))
        ));
    }

    #[test]
    fn rejects_non_square_input_size() {
        let yaml = include_str!("../../../config/model.yaml").replace("[224, 224]", "[224]");
        assert!(ModelConfig::from_yaml(&yaml).is_err());
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ModelConfig::load_or_default(&dir.path().join("absent.yaml")).unwrap();
        assert_eq!(config.input_size(), (224, 224));
        assert_eq!(config.resample_range(), (94.0, 99.0));
    }
}
