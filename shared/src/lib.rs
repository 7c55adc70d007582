use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Diagnosis class produced by the classifier. Index order matches the
/// model's output units.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum Label {
    Normal,
    Pneumonia,
}

impl Label {
    pub fn from_index(index: usize) -> Self {
        if index == 1 { Label::Pneumonia } else { Label::Normal }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub label: Label,
    /// Percentage in (0, 100], rounded to two decimals.
    pub confidence: f64,
}

impl PredictionResult {
    /// Confidence as shown to users; whole numbers keep their `.0` (`80.0`, `87.5`).
    pub fn confidence_text(&self) -> String {
        format!("{:?}", self.confidence)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientRecord {
    pub name: String,
    pub age: String,
    pub gender: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatestPrediction {
    pub patient: PatientRecord,
    pub filename: String,
    pub result: PredictionResult,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ChatResponse {
    pub reply: String,
}
