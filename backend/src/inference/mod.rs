pub mod config;
pub mod model;
pub mod predictor;
pub mod preprocess;

pub use config::ModelConfig;
pub use model::{Classifier, InferenceError, OutputHead, load_classifier};
pub use predictor::{ConfidenceCap, Predictor};
pub use preprocess::decode_image;
