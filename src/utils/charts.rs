//! SVG Chart Generator
//!
//! Renders line charts as standalone SVG. Several charts can be laid out
//! side by side in a single document.

use std::fs;
use std::path::Path;

const PANEL_WIDTH: f64 = 600.0;
const PANEL_HEIGHT: f64 = 420.0;
const MARGIN_TOP: f64 = 50.0;
const MARGIN_RIGHT: f64 = 30.0;
const MARGIN_BOTTOM: f64 = 60.0;
const MARGIN_LEFT: f64 = 70.0;
const GRID_LINES: usize = 5;

pub const COLOR_TRAIN: &str = "#3498db";
pub const COLOR_VALIDATION: &str = "#e67e22";
const COLOR_GRID: &str = "#ecf0f1";
const COLOR_AXIS: &str = "#2c3e50";
const COLOR_TEXT: &str = "#2c3e50";

const FONT: &str = "Arial, sans-serif";

/// A data series for a line chart
#[derive(Debug, Clone)]
pub struct DataSeries {
    pub name: String,
    pub points: Vec<(f64, f64)>,
    pub color: String,
}

impl DataSeries {
    pub fn new(name: &str, color: &str, points: Vec<(f64, f64)>) -> Self {
        Self {
            name: name.to_string(),
            points,
            color: color.to_string(),
        }
    }
}

/// One chart panel: title, axis labels and its series
#[derive(Debug, Clone)]
pub struct LineChart {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub series: Vec<DataSeries>,
}

impl LineChart {
    pub fn new(title: &str, x_label: &str, y_label: &str) -> Self {
        Self {
            title: title.to_string(),
            x_label: x_label.to_string(),
            y_label: y_label.to_string(),
            series: Vec::new(),
        }
    }

    pub fn with_series(mut self, series: DataSeries) -> Self {
        self.series.push(series);
        self
    }

    fn render(&self, offset_x: f64) -> String {
        let plot_width = PANEL_WIDTH - MARGIN_LEFT - MARGIN_RIGHT;
        let plot_height = PANEL_HEIGHT - MARGIN_TOP - MARGIN_BOTTOM;
        let (x_min, x_max, y_min, y_max) = padded_ranges(&self.series);

        let to_x = |x: f64| MARGIN_LEFT + (x - x_min) / (x_max - x_min) * plot_width;
        let to_y = |y: f64| MARGIN_TOP + plot_height - (y - y_min) / (y_max - y_min) * plot_height;

        let mut svg = format!(r#"<g transform="translate({} 0)">"#, offset_x);

        svg.push_str(&format!(
            r#"<text x="{}" y="30" text-anchor="middle" font-family="{}" font-size="16" font-weight="bold" fill="{}">{}</text>"#,
            PANEL_WIDTH / 2.0, FONT, COLOR_TEXT, escape_xml(&self.title)
        ));

        for i in 0..=GRID_LINES {
            let frac = i as f64 / GRID_LINES as f64;
            let y = MARGIN_TOP + plot_height - frac * plot_height;
            let value = y_min + frac * (y_max - y_min);
            svg.push_str(&format!(
                r#"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="{}" stroke-width="1"/>"#,
                MARGIN_LEFT, y, MARGIN_LEFT + plot_width, y, COLOR_GRID
            ));
            svg.push_str(&format!(
                r#"<text x="{}" y="{}" text-anchor="end" font-family="{}" font-size="11" fill="{}">{:.3}</text>"#,
                MARGIN_LEFT - 8.0, y + 4.0, FONT, COLOR_TEXT, value
            ));
        }

        // Axes
        svg.push_str(&format!(
            r#"<line x1="{0}" y1="{1}" x2="{2}" y2="{1}" stroke="{3}" stroke-width="2"/><line x1="{0}" y1="{4}" x2="{0}" y2="{1}" stroke="{3}" stroke-width="2"/>"#,
            MARGIN_LEFT, MARGIN_TOP + plot_height, MARGIN_LEFT + plot_width, COLOR_AXIS, MARGIN_TOP
        ));
        svg.push_str(&format!(
            r#"<text x="{}" y="{}" text-anchor="middle" font-family="{}" font-size="13" fill="{}">{}</text>"#,
            MARGIN_LEFT + plot_width / 2.0, PANEL_HEIGHT - 15.0, FONT, COLOR_TEXT, escape_xml(&self.x_label)
        ));
        svg.push_str(&format!(
            r#"<text x="18" y="{0}" text-anchor="middle" font-family="{1}" font-size="13" fill="{2}" transform="rotate(-90 18 {0})">{3}</text>"#,
            PANEL_HEIGHT / 2.0, FONT, COLOR_TEXT, escape_xml(&self.y_label)
        ));

        if let Some(first) = self.series.iter().find(|s| !s.points.is_empty()) {
            for &(x, _) in &first.points {
                svg.push_str(&format!(
                    r#"<text x="{}" y="{}" text-anchor="middle" font-family="{}" font-size="11" fill="{}">{:.0}</text>"#,
                    to_x(x), MARGIN_TOP + plot_height + 18.0, FONT, COLOR_TEXT, x
                ));
            }
        }

        for series in self.series.iter().filter(|s| !s.points.is_empty()) {
            let path: Vec<String> = series
                .points
                .iter()
                .enumerate()
                .map(|(i, &(x, y))| {
                    format!("{} {:.2} {:.2}", if i == 0 { "M" } else { "L" }, to_x(x), to_y(y))
                })
                .collect();
            svg.push_str(&format!(
                r#"<path d="{}" fill="none" stroke="{}" stroke-width="2.5"/>"#,
                path.join(" "),
                series.color
            ));
            for &(x, y) in &series.points {
                svg.push_str(&format!(
                    r#"<circle cx="{:.2}" cy="{:.2}" r="4" fill="{}" stroke="white" stroke-width="1.5"/>"#,
                    to_x(x), to_y(y), series.color
                ));
            }
        }

        let mut legend_y = MARGIN_TOP + 8.0;
        for series in &self.series {
            svg.push_str(&format!(
                r#"<rect x="{}" y="{}" width="14" height="14" fill="{}"/><text x="{}" y="{}" font-family="{}" font-size="12" fill="{}">{}</text>"#,
                PANEL_WIDTH - MARGIN_RIGHT - 130.0, legend_y, series.color,
                PANEL_WIDTH - MARGIN_RIGHT - 110.0, legend_y + 11.0, FONT, COLOR_TEXT,
                escape_xml(&series.name)
            ));
            legend_y += 22.0;
        }

        svg.push_str("</g>");
        svg
    }
}

/// Write the given charts side by side into one SVG file
pub fn write_charts(charts: &[LineChart], output_path: &Path) -> std::io::Result<()> {
    let width = PANEL_WIDTH * charts.len().max(1) as f64;

    let mut svg = format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 {0} {1}" width="{0}" height="{1}">"#,
        width, PANEL_HEIGHT
    );
    svg.push_str(&format!(
        r#"<rect width="{}" height="{}" fill="white"/>"#,
        width, PANEL_HEIGHT
    ));
    for (i, chart) in charts.iter().enumerate() {
        svg.push_str(&chart.render(i as f64 * PANEL_WIDTH));
    }
    svg.push_str("</svg>");

    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(output_path, svg)
}

/// Data ranges with a little headroom; degenerate ranges are widened
fn padded_ranges(series: &[DataSeries]) -> (f64, f64, f64, f64) {
    let mut x_min = f64::INFINITY;
    let mut x_max = f64::NEG_INFINITY;
    let mut y_min = f64::INFINITY;
    let mut y_max = f64::NEG_INFINITY;

    for &(x, y) in series.iter().flat_map(|s| s.points.iter()) {
        if !x.is_finite() || !y.is_finite() {
            continue;
        }
        x_min = x_min.min(x);
        x_max = x_max.max(x);
        y_min = y_min.min(y);
        y_max = y_max.max(y);
    }

    if !x_min.is_finite() {
        return (0.0, 1.0, 0.0, 1.0);
    }
    if x_max - x_min < f64::EPSILON {
        x_min -= 1.0;
        x_max += 1.0;
    }
    let pad = ((y_max - y_min) * 0.05).max(1e-3);
    (x_min, x_max, y_min - pad, y_max + pad)
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
