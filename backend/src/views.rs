use shared::{LatestPrediction, Label, PatientRecord, PredictionResult};
use std::fmt::Write;

use crate::report::report_link;

/// Values shown on the upload page. Patient fields echo what was submitted;
/// the prediction fields stay unset until an image has been classified.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexPage {
    pub patient: Option<PatientRecord>,
    pub filename: Option<String>,
    pub result: Option<PredictionResult>,
}

impl IndexPage {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_prediction(prediction: &LatestPrediction) -> Self {
        Self {
            patient: Some(prediction.patient.clone()),
            filename: Some(prediction.filename.clone()),
            result: Some(prediction.result),
        }
    }

    fn latest(&self) -> Option<LatestPrediction> {
        Some(LatestPrediction {
            patient: self.patient.clone().unwrap_or_default(),
            filename: self.filename.clone()?,
            result: self.result?,
        })
    }

    pub fn render(&self) -> String {
        let patient = self.patient.clone().unwrap_or_default();
        let mut html = String::with_capacity(4096);

        html.push_str(
            r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Pneumonia Detection</title>
<link rel="stylesheet" href="/static/style.css">
</head>
<body>
<main class="container">
<h1>Chest X-ray Pneumonia Detection</h1>
<form method="post" action="/" enctype="multipart/form-data" class="upload-form">
"#,
        );
        let _ = write!(
            html,
            r#"<label>Patient name <input type="text" name="patient_name" value="{}"></label>
<label>Age <input type="text" name="age" value="{}"></label>
<label>Gender <input type="text" name="gender" value="{}"></label>
<label>Chest X-ray <input type="file" name="file" accept="image/*"></label>
<button type="submit">Predict</button>
</form>
"#,
            escape(&patient.name),
            escape(&patient.age),
            escape(&patient.gender),
        );

        if let Some(latest) = self.latest() {
            let class = match latest.result.label {
                Label::Pneumonia => "pneumonia",
                Label::Normal => "normal",
            };
            let _ = write!(
                html,
                r#"<section class="result" id="result">
<img src="/uploads/{file}" alt="Uploaded chest X-ray" class="xray">
<p class="label {class}">Prediction: <strong>{label}</strong></p>
<p class="confidence">Confidence: <strong>{confidence}%</strong></p>
<a class="button" href="{link}">Download PDF report</a>
</section>
"#,
                file = escape(&urlencoding::encode(&latest.filename)),
                class = class,
                label = latest.result.label,
                confidence = latest.result.confidence_text(),
                link = escape(&report_link(&latest)),
            );
        }

        html.push_str(
            r#"</main>
<button id="chat-btn" class="chat-btn" type="button">Chat</button>
<div id="chat-popup" class="chat-popup">
<div id="chat-box" class="chat-box"></div>
<div class="chat-input">
<input id="user-input" type="text" placeholder="Ask about pneumonia or your result">
<button id="send-btn" type="button">Send</button>
</div>
</div>
<script src="/static/chatbot.js"></script>
</body>
</html>
"#,
        );
        html
    }
}

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}
