//! Keyword assistant behind `/chatbot`.
//!
//! Rules are checked in order and the first one with a trigger phrase
//! contained in the message wins, so the table order is significant
//! ("report" is answered by the report-link rule before the canned entry).

use shared::LatestPrediction;

use crate::report::report_link;

pub const NO_PREDICTION: &str = "No recent prediction found. Please upload a new X-ray first.";
pub const NO_REPORT: &str = "No report available. Please upload an X-ray first!";
pub const FALLBACK: &str = "I'm here to help! Could you clarify your question?";

enum Reply {
    LastPrediction,
    ReportLink,
    Canned(&'static str),
}

struct Rule {
    triggers: &'static [&'static str],
    reply: Reply,
}

const RULES: &[Rule] = &[
    Rule {
        triggers: &["last prediction", "my result", "result"],
        reply: Reply::LastPrediction,
    },
    Rule {
        triggers: &["report", "pdf", "download report"],
        reply: Reply::ReportLink,
    },
    Rule {
        triggers: &["hello"],
        reply: Reply::Canned(
            "Hello! 👋 I am your Pneumonia AI Assistant. Ask me about pneumonia or X-ray prediction.",
        ),
    },
    Rule {
        triggers: &["hi"],
        reply: Reply::Canned(
            "Hi! I can help explain pneumonia and assist with chest X-ray analysis.",
        ),
    },
    Rule {
        triggers: &["pneumonia"],
        reply: Reply::Canned(
            "Pneumonia is an infection inflaming air sacs in lungs. Symptoms: cough, fever, \
             shortness of breath. Upload X-ray to get AI prediction.",
        ),
    },
    Rule {
        triggers: &["x-ray"],
        reply: Reply::Canned("Upload a chest X-ray using the form above to get a prediction."),
    },
    Rule {
        triggers: &["report"],
        reply: Reply::Canned(
            "After prediction, you can download a PDF report containing patient info and AI result.",
        ),
    },
    Rule {
        triggers: &["how"],
        reply: Reply::Canned(
            "You can ask things like 'What is pneumonia?', 'How to upload X-ray?', or \
             'How to download report?'.",
        ),
    },
    Rule {
        triggers: &["thanks"],
        reply: Reply::Canned("You're welcome! 😊 Stay healthy!"),
    },
    Rule {
        triggers: &["thank you"],
        reply: Reply::Canned("Glad I could help! 🩺"),
    },
];

/// Answers a chat message given the sender's most recent prediction, if any.
pub fn respond(message: &str, latest: Option<&LatestPrediction>) -> String {
    let message = message.trim().to_lowercase();

    let Some(rule) = RULES
        .iter()
        .find(|rule| rule.triggers.iter().any(|t| message.contains(t)))
    else {
        return FALLBACK.to_string();
    };

    match (&rule.reply, latest) {
        (Reply::LastPrediction, Some(p)) => format!(
            "🩺 Last Prediction: {} (Confidence: {}%)",
            p.result.label,
            p.result.confidence_text()
        ),
        (Reply::LastPrediction, None) => NO_PREDICTION.to_string(),
        (Reply::ReportLink, Some(p)) => {
            format!("📄 Download your latest report here: {}", report_link(p))
        }
        (Reply::ReportLink, None) => NO_REPORT.to_string(),
        (Reply::Canned(text), _) => text.to_string(),
    }
}
