use chrono::{DateTime, Local};
use printpdf::image_crate::{self, DynamicImage};
use printpdf::{
    BuiltinFont, Image, ImageTransform, IndirectFontRef, Mm, PdfDocument, PdfLayerReference,
};
use shared::PatientRecord;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use super::ReportError;
use super::chart::render_confidence_chart;
use crate::storage::{FileStore, patient_file_token};

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const LEFT: f32 = 20.0;
const VALUE_COLUMN: f32 = 62.0;
const MM_PER_INCH: f32 = 25.4;
const EMBED_DPI: f32 = 300.0;

pub const TITLE: &str = "Pneumonia Detection Report";
pub const DISCLAIMER: &str = "This report was generated using an AI-based pneumonia detection model. \
It is intended for research and educational use only. Please consult a certified radiologist or \
physician for medical confirmation.";

/// Everything a report needs, taken verbatim from the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRequest {
    pub patient: PatientRecord,
    pub filename: String,
    pub result: String,
    pub confidence: String,
}

/// Text content of a report, independent of layout and file naming.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportContent {
    pub fields: Vec<(&'static str, String)>,
    pub prediction: String,
    pub confidence: String,
    pub impression: &'static str,
}

impl ReportContent {
    pub fn new(request: &ReportRequest, model_version: &str, generated_at: DateTime<Local>) -> Self {
        let impression = if request.result == "PNEUMONIA" {
            "Findings consistent with pneumonia. Clinical correlation advised."
        } else {
            "No signs of pneumonia detected."
        };
        Self {
            fields: vec![
                ("Patient Name:", latin1_text(&request.patient.name)),
                ("Age:", latin1_text(&request.patient.age)),
                ("Gender:", latin1_text(&request.patient.gender)),
                ("Date:", generated_at.format("%Y-%m-%d %H:%M:%S").to_string()),
                ("Model Version:", model_version.to_string()),
            ],
            prediction: latin1_text(&request.result),
            confidence: format!("{}%", latin1_text(&request.confidence)),
            impression,
        }
    }
}

/// The builtin PDF fonts only cover Latin-1; anything past U+00FF becomes `?`.
fn latin1_text(text: &str) -> String {
    text.chars()
        .map(|c| if u32::from(c) <= 0xFF { c } else { '?' })
        .collect()
}

#[derive(Clone)]
pub struct ReportGenerator {
    store: FileStore,
    model_version: String,
}

impl ReportGenerator {
    pub fn new(store: FileStore, model_version: impl Into<String>) -> Self {
        Self {
            store,
            model_version: model_version.into(),
        }
    }

    /// Builds a fresh PDF for the request and returns its path. A missing
    /// X-ray or chart leaves that section out rather than failing.
    pub fn generate(&self, request: &ReportRequest) -> Result<PathBuf, ReportError> {
        let now = Local::now();
        let content = ReportContent::new(request, &self.model_version, now);

        let image_path = self
            .store
            .upload_path(&request.filename)
            .ok()
            .map(|(_, path)| path)
            .filter(|path| path.is_file());
        if image_path.is_none() {
            log::warn!("Uploaded image {:?} not found, omitting it from the report", request.filename);
        }
        let chart_path = self.render_chart(request);

        let bytes = build_pdf(&content, image_path.as_deref(), chart_path.as_deref())?;

        let stem = format!(
            "Report_{}_{}",
            now.format("%Y%m%d_%H%M%S"),
            patient_file_token(&request.patient.name)
        );
        let (mut file, path) = self.store.create_report_file(&stem, "pdf")?;
        file.write_all(&bytes)?;
        log::info!("Generated report {}", path.display());

        self.store.sweep();
        Ok(path)
    }

    fn render_chart(&self, request: &ReportRequest) -> Option<PathBuf> {
        let confidence: f64 = match request.confidence.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                log::warn!("Confidence {:?} is not numeric, omitting chart", request.confidence);
                return None;
            }
        };
        let path = self.store.chart_path(&request.filename);
        match render_confidence_chart(confidence, &path) {
            Ok(()) => Some(path),
            Err(e) => {
                log::warn!("Failed to render confidence chart: {}", e);
                None
            }
        }
    }
}

struct Fonts {
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    italic: IndirectFontRef,
}

fn pdf_err(e: printpdf::Error) -> ReportError {
    ReportError::Pdf(e.to_string())
}

pub fn build_pdf(
    content: &ReportContent,
    image_path: Option<&Path>,
    chart_path: Option<&Path>,
) -> Result<Vec<u8>, ReportError> {
    let (doc, page1, layer1) =
        PdfDocument::new(TITLE, Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
    let layer = doc.get_page(page1).get_layer(layer1);
    let fonts = Fonts {
        regular: doc.add_builtin_font(BuiltinFont::Helvetica).map_err(pdf_err)?,
        bold: doc.add_builtin_font(BuiltinFont::HelveticaBold).map_err(pdf_err)?,
        italic: doc.add_builtin_font(BuiltinFont::HelveticaOblique).map_err(pdf_err)?,
    };

    let mut y = Mm(277.0);

    layer.use_text(TITLE, 18.0, Mm(52.0), y, &fonts.bold);
    y -= Mm(14.0);

    for (label, value) in &content.fields {
        layer.use_text(*label, 11.0, Mm(LEFT), y, &fonts.bold);
        layer.use_text(value.as_str(), 11.0, Mm(VALUE_COLUMN), y, &fonts.regular);
        y -= Mm(6.0);
    }
    y -= Mm(4.0);

    if let Some(path) = image_path {
        let side = 4.0 * MM_PER_INCH;
        match embed_image(&layer, path, LEFT, y.0 - side, side, side) {
            Ok(()) => y -= Mm(side + 6.0),
            Err(e) => log::warn!("Skipping X-ray image {}: {}", path.display(), e),
        }
    }

    layer.use_text("AI Prediction:", 11.0, Mm(LEFT), y, &fonts.bold);
    layer.use_text(content.prediction.as_str(), 11.0, Mm(VALUE_COLUMN), y, &fonts.regular);
    y -= Mm(6.0);
    layer.use_text("Predicted Confidence:", 11.0, Mm(LEFT), y, &fonts.bold);
    layer.use_text(content.confidence.as_str(), 11.0, Mm(VALUE_COLUMN), y, &fonts.regular);
    y -= Mm(8.0);
    layer.use_text("Impression:", 11.0, Mm(LEFT), y, &fonts.bold);
    layer.use_text(content.impression, 11.0, Mm(VALUE_COLUMN), y, &fonts.regular);
    y -= Mm(10.0);

    if let Some(path) = chart_path {
        let (width, height) = (4.0 * MM_PER_INCH, 0.5 * MM_PER_INCH);
        match embed_image(&layer, path, LEFT, y.0 - height, width, height) {
            Ok(()) => {
                y -= Mm(height + 4.0);
                layer.use_text("Confidence (0-100%)", 8.0, Mm(LEFT), y, &fonts.regular);
                y -= Mm(8.0);
            }
            Err(e) => log::warn!("Skipping confidence chart {}: {}", path.display(), e),
        }
    }

    for line in wrap_text(DISCLAIMER, 95) {
        layer.use_text(line, 9.0, Mm(LEFT), y, &fonts.italic);
        y -= Mm(4.5);
    }

    let mut buf = BufWriter::new(Vec::new());
    doc.save(&mut buf).map_err(pdf_err)?;
    buf.into_inner()
        .map_err(|e| ReportError::Pdf(format!("PDF buffer error: {}", e)))
}

/// Places the image with its bottom-left corner at (`x`, `y`), stretched to `width` x `height` mm.
fn embed_image(
    layer: &PdfLayerReference,
    path: &Path,
    x: f32,
    y: f32,
    width: f32,
    height: f32,
) -> Result<(), ReportError> {
    let decoded = image_crate::open(path).map_err(|e| ReportError::Image(e.to_string()))?;
    let buffer = decoded.to_rgb8();
    let (px_w, px_h) = buffer.dimensions();
    if px_w == 0 || px_h == 0 {
        return Err(ReportError::Image("image has no pixels".into()));
    }
    let rgb = DynamicImage::ImageRgb8(buffer);
    let (px_w, px_h) = (px_w as f32, px_h as f32);

    let natural_w = px_w / EMBED_DPI * MM_PER_INCH;
    let natural_h = px_h / EMBED_DPI * MM_PER_INCH;
    Image::from_dynamic_image(&rgb).add_to_layer(
        layer.clone(),
        ImageTransform {
            translate_x: Some(Mm(x)),
            translate_y: Some(Mm(y)),
            scale_x: Some(width / natural_w),
            scale_y: Some(height / natural_h),
            dpi: Some(EMBED_DPI),
            ..Default::default()
        },
    );
    Ok(())
}

fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if current.len() + word.len() + 1 > max_chars && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::RetentionPolicy;
    use chrono::TimeZone;
    use image::{Rgb, RgbImage};

    fn request(name: &str, filename: &str) -> ReportRequest {
        ReportRequest {
            patient: PatientRecord {
                name: name.to_string(),
                age: "42".to_string(),
                gender: "F".to_string(),
            },
            filename: filename.to_string(),
            result: "PNEUMONIA".to_string(),
            confidence: "87.5".to_string(),
        }
    }

    fn generator(dir: &Path) -> (ReportGenerator, FileStore) {
        let store = FileStore::new(
            dir.join("uploads"),
            dir.join("reports"),
            1 << 20,
            RetentionPolicy::KeepAll,
        );
        store.ensure_dirs().unwrap();
        (ReportGenerator::new(store.clone(), "v1.2"), store)
    }

    fn file_name(path: &Path) -> String {
        path.file_name().unwrap().to_string_lossy().into_owned()
    }

    #[test]
    fn report_name_uses_sanitized_patient_token() {
        let dir = tempfile::tempdir().unwrap();
        let (generator, _) = generator(dir.path());

        let path = generator.generate(&request("Jane Doe!", "scan.png")).unwrap();
        let name = file_name(&path);
        assert!(name.starts_with("Report_"), "{name}");
        assert!(name.ends_with("_JaneDoe.pdf"), "{name}");
        assert!(!name.contains(' ') && !name.contains('!'));
    }

    #[test]
    fn report_is_a_pdf_with_chart_and_image() {
        let dir = tempfile::tempdir().unwrap();
        let (generator, store) = generator(dir.path());
        RgbImage::from_pixel(40, 40, Rgb([120, 120, 120]))
            .save(store.upload_dir().join("scan.png"))
            .unwrap();

        let path = generator.generate(&request("Jane", "scan.png")).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
        assert!(store.chart_path("scan.png").is_file());
    }

    #[test]
    fn missing_image_and_non_numeric_confidence_are_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        let (generator, store) = generator(dir.path());

        let mut req = request("", "absent.png");
        req.confidence = "n/a".to_string();
        let path = generator.generate(&req).unwrap();

        assert!(file_name(&path).ends_with("_patient.pdf"));
        assert!(std::fs::read(&path).unwrap().starts_with(b"%PDF"));
        assert!(!store.chart_path("absent.png").exists());
    }

    #[test]
    fn repeated_generation_creates_distinct_files() {
        let dir = tempfile::tempdir().unwrap();
        let (generator, _) = generator(dir.path());
        let req = request("Jane Doe", "scan.png");

        let first = generator.generate(&req).unwrap();
        let second = generator.generate(&req).unwrap();
        assert_ne!(first, second);
        assert!(first.is_file() && second.is_file());
    }

    #[test]
    fn names_outside_latin1_are_replaced_not_garbled() {
        let at = Local.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap();
        let content = ReportContent::new(&request("Zoë 李雷", "scan.png"), "v1.2", at);
        assert_eq!(content.fields[0], ("Patient Name:", "Zoë ??".to_string()));

        let dir = tempfile::tempdir().unwrap();
        let (generator, _) = generator(dir.path());
        let path = generator.generate(&request("Zoë 李雷", "scan.png")).unwrap();
        assert!(file_name(&path).ends_with("_Zoë李雷.pdf"));
    }

    #[test]
    fn content_depends_only_on_inputs_and_time() {
        let at = Local.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap();
        let req = request("Jane Doe", "scan.png");
        assert_eq!(
            ReportContent::new(&req, "v1.2", at),
            ReportContent::new(&req, "v1.2", at)
        );

        let content = ReportContent::new(&req, "v1.2", at);
        assert_eq!(content.fields[3].1, "2024-03-01 09:30:00");
        assert_eq!(content.confidence, "87.5%");
        assert!(content.impression.starts_with("Findings consistent"));

        let mut normal = req.clone();
        normal.result = "NORMAL".to_string();
        assert_eq!(
            ReportContent::new(&normal, "v1.2", at).impression,
            "No signs of pneumonia detected."
        );
    }

    #[test]
    fn wrap_text_respects_width() {
        let lines = wrap_text(DISCLAIMER, 40);
        assert!(lines.len() > 1);
        assert!(lines.iter().all(|l| l.len() <= 40));
        assert_eq!(lines.join(" "), DISCLAIMER.split_whitespace().collect::<Vec<_>>().join(" "));
    }
}
