use plotters::drawing::DrawingAreaErrorKind;
use plotters::prelude::*;
use std::path::Path;

use super::ReportError;

pub const CHART_SIZE: (u32, u32) = (400, 50);
pub const BAR_COLOR: RGBColor = RGBColor(0x2e, 0x7d, 0x32);
const TRACK_COLOR: RGBColor = RGBColor(0xe0, 0xe0, 0xe0);
const MARGIN: i32 = 8;

/// Pixel column where a bar of `confidence` percent ends.
pub fn bar_end(confidence: f64) -> i32 {
    let (width, _) = CHART_SIZE;
    let inner = width as i32 - 2 * MARGIN;
    MARGIN + (inner as f64 * confidence.clamp(0.0, 100.0) / 100.0).round() as i32
}

/// Renders a horizontal confidence bar on a 0-100 scale with a tick every 10%.
pub fn render_confidence_chart(confidence: f64, path: &Path) -> Result<(), ReportError> {
    let (width, height) = CHART_SIZE;
    let (width, height) = (width as i32, height as i32);
    let root = BitMapBackend::new(path, CHART_SIZE).into_drawing_area();
    let chart_err = |e: DrawingAreaErrorKind<_>| ReportError::Chart(e.to_string());

    root.fill(&WHITE).map_err(chart_err)?;

    let top = MARGIN;
    let bottom = height - MARGIN - 8;
    let left = MARGIN;
    let right = width - MARGIN;

    root.draw(&Rectangle::new([(left, top), (right, bottom)], TRACK_COLOR.filled()))
        .map_err(chart_err)?;
    if confidence > 0.0 {
        root.draw(&Rectangle::new(
            [(left, top), (bar_end(confidence), bottom)],
            BAR_COLOR.filled(),
        ))
        .map_err(chart_err)?;
    }
    root.draw(&Rectangle::new([(left, top), (right, bottom)], &BLACK))
        .map_err(chart_err)?;

    for tick in 0..=10 {
        let x = bar_end(f64::from(tick * 10));
        let len = if tick % 5 == 0 { 6 } else { 3 };
        root.draw(&PathElement::new(vec![(x, bottom), (x, bottom + len)], &BLACK))
            .map_err(chart_err)?;
    }

    root.present().map_err(chart_err)?;
    Ok(())
}
