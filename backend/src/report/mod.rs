pub mod chart;
pub mod pdf;

use shared::LatestPrediction;

use crate::storage::StorageError;

pub use pdf::{ReportGenerator, ReportRequest};

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("Report I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Report storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("PDF build error: {0}")]
    Pdf(String),
    #[error("Chart rendering error: {0}")]
    Chart(String),
    #[error("Image embedding error: {0}")]
    Image(String),
}

fn path_segment(value: &str) -> String {
    if value.is_empty() {
        "-".to_string()
    } else {
        urlencoding::encode(value).into_owned()
    }
}

/// Relative link to the report endpoint for a stored prediction.
pub fn report_link(prediction: &LatestPrediction) -> String {
    let confidence = prediction.result.confidence_text();
    let label = prediction.result.label.to_string();
    let segments = [
        prediction.patient.name.as_str(),
        prediction.patient.age.as_str(),
        prediction.patient.gender.as_str(),
        prediction.filename.as_str(),
        label.as_str(),
        confidence.as_str(),
    ];
    let encoded: Vec<String> = segments.iter().map(|s| path_segment(s)).collect();
    format!("/report/{}", encoded.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{Label, PatientRecord, PredictionResult};

    #[test]
    fn link_encodes_every_segment() {
        let prediction = LatestPrediction {
            patient: PatientRecord {
                name: "Jane Doe/2".into(),
                age: "".into(),
                gender: "F".into(),
            },
            filename: "scan.png".into(),
            result: PredictionResult {
                label: Label::Pneumonia,
                confidence: 87.5,
            },
        };
        assert_eq!(
            report_link(&prediction),
            "/report/Jane%20Doe%2F2/-/F/scan.png/PNEUMONIA/87.5"
        );
    }
}
