use std::{
    fs::create_dir_all,
    path::{Path, PathBuf},
};

use image::{Rgb, RgbImage};
use tracing::info;

use crate::aggregate::Snapshot;
use crate::common::{Count, SeriesPoint, ALL_FIELDS, HEATMAP_FIELDS, TOP_FIELDS};
use crate::error::RenderError;
use crate::forecast::ForecastResult;

pub const WIDTH: u32 = 960;
pub const HEIGHT: u32 = 600;
const MARGIN: f64 = 60.0;
const CURVE_SAMPLES: usize = 200;
const Y_GRID_LINES: usize = 5;

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const GRID: Rgb<u8> = Rgb([225, 225, 225]);
const AXIS: Rgb<u8> = Rgb([40, 40, 40]);
const HISTORY: Rgb<u8> = Rgb([31, 119, 180]);
const FIT: Rgb<u8> = Rgb([255, 127, 14]);
const FORECAST: Rgb<u8> = Rgb([214, 39, 40]);
const BAR: Rgb<u8> = Rgb([144, 238, 144]);

pub const TOTALS_CHART: &str = "yearly_totals.png";
pub const TOP_FIELDS_CHART: &str = "top_fields.png";
pub const HEATMAP_CHART: &str = "top_fields_heatmap.png";

/// `<field>.png` (or `all.png`) in `dir`, with `_<suffix>` before the extension when given.
pub fn chart_path(dir: &Path, field: Option<&str>, suffix: Option<&str>) -> PathBuf {
    let mut stem = field.map(sanitize).unwrap_or_default();
    if stem.is_empty() {
        stem = ALL_FIELDS.to_string();
    }
    if let Some(s) = suffix {
        stem = format!("{stem}_{s}");
    }
    dir.join(format!("{stem}.png"))
}

fn sanitize(field: &str) -> String {
    field
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

/// Writes the chart for one forecast, replacing any previous file at `path`.
pub fn render(
    path: &Path,
    history: &[SeriesPoint],
    result: &ForecastResult,
) -> Result<(), RenderError> {
    save(path, &draw(history, result)?)?;
    info!(path = %path.display(), model = %result.model, "chart written");
    Ok(())
}

/// Startup charts of the whole snapshot: yearly totals, the largest fields
/// and a field-by-year heatmap. Each file is attempted independently.
pub fn render_overview(
    dir: &Path,
    snapshot: &Snapshot,
) -> Vec<(PathBuf, Result<(), RenderError>)> {
    let ranked = snapshot.ranked_by_total(HEATMAP_FIELDS);
    let bars: Vec<Count> = ranked.iter().take(TOP_FIELDS).map(|r| r.1).collect();
    let names: Vec<String> = ranked.into_iter().map(|r| r.0).collect();
    let (_, rows) = snapshot.year_matrix(&names);

    let charts: [(&str, Result<RgbImage, RenderError>); 3] = [
        (TOTALS_CHART, draw_totals(snapshot.yearly_totals())),
        (TOP_FIELDS_CHART, draw_bars(&bars)),
        (HEATMAP_CHART, draw_heatmap(&rows)),
    ];
    charts
        .into_iter()
        .map(|(name, img)| {
            let path = dir.join(name);
            let res = img.and_then(|img| save(&path, &img));
            if res.is_ok() {
                info!(path = %path.display(), "overview chart written");
            }
            (path, res)
        })
        .collect()
}

fn save(path: &Path, img: &RgbImage) -> Result<(), RenderError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        create_dir_all(parent)?;
    }
    img.save(path)?;
    Ok(())
}

/// Publications per year as a marked polyline.
pub fn draw_totals(points: &[SeriesPoint]) -> Result<RgbImage, RenderError> {
    let (first, last) = match (points.first(), points.last()) {
        (Some(f), Some(l)) => (f.year, l.year),
        _ => return Err(RenderError::NoPoints),
    };
    let hi = points.iter().map(|p| p.count as f64).fold(0.0, f64::max);
    let (y0, y1) = (0.0, hi + (hi * 0.1).max(1.0));
    let (x0, x1) = (f64::from(first) - 0.5, f64::from(last) + 0.5);
    let mut canvas = Canvas::new(Frame { x0, x1, y0, y1 });

    for year in first..=last {
        let x = f64::from(year);
        canvas.line((x, y0), (x, y1), GRID, 0);
    }
    canvas.grid_rows(GRID);
    canvas.border(AXIS);
    for pair in points.windows(2) {
        canvas.line(pair[0].xy(), pair[1].xy(), HISTORY, 1);
    }
    for p in points {
        canvas.dot(p.xy(), 4, HISTORY);
    }
    Ok(canvas.img)
}

/// Horizontal bars, the first value on top, lengths relative to the largest.
pub fn draw_bars(values: &[Count]) -> Result<RgbImage, RenderError> {
    if values.is_empty() {
        return Err(RenderError::NoPoints);
    }
    let hi = values.iter().copied().max().unwrap_or(0) as f64;
    let n = values.len() as f64;
    let mut canvas = Canvas::new(Frame {
        x0: 0.0,
        x1: hi.max(1.0) * 1.05,
        y0: 0.0,
        y1: n,
    });
    canvas.border(AXIS);
    for (i, v) in values.iter().enumerate() {
        let top = n - i as f64 - 0.15;
        let bottom = n - i as f64 - 0.85;
        canvas.fill((0.0, bottom), (*v as f64, top), BAR);
    }
    Ok(canvas.img)
}

/// One row per field and one column per year, darker for larger counts.
pub fn draw_heatmap(rows: &[Vec<Count>]) -> Result<RgbImage, RenderError> {
    let cols = rows.first().map_or(0, Vec::len);
    if cols == 0 {
        return Err(RenderError::NoPoints);
    }
    let hi = rows.iter().flatten().copied().max().unwrap_or(0).max(1) as f64;
    let n = rows.len() as f64;
    let mut canvas = Canvas::new(Frame {
        x0: 0.0,
        x1: cols as f64,
        y0: 0.0,
        y1: n,
    });
    for (i, row) in rows.iter().enumerate() {
        let top = n - i as f64;
        for (j, v) in row.iter().enumerate() {
            let color = heat(*v as f64 / hi);
            canvas.fill((j as f64, top - 1.0), (j as f64 + 1.0, top), color);
        }
    }
    for j in 0..=cols {
        canvas.line((j as f64, 0.0), (j as f64, n), BACKGROUND, 0);
    }
    for i in 0..=rows.len() {
        canvas.line((0.0, i as f64), (cols as f64, i as f64), BACKGROUND, 0);
    }
    canvas.border(AXIS);
    Ok(canvas.img)
}

// pale yellow through green to dark blue
fn heat(share: f64) -> Rgb<u8> {
    const STOPS: [[f64; 3]; 3] = [
        [255.0, 255.0, 217.0],
        [65.0, 182.0, 196.0],
        [8.0, 29.0, 88.0],
    ];
    let s = share.clamp(0.0, 1.0) * 2.0;
    let (a, b, f) = if s <= 1.0 {
        (STOPS[0], STOPS[1], s)
    } else {
        (STOPS[1], STOPS[2], s - 1.0)
    };
    let mix = |k: usize| (a[k] + (b[k] - a[k]) * f).round() as u8;
    Rgb([mix(0), mix(1), mix(2)])
}

/// History as a marked polyline, the fitted curve up to the target year and the
/// forecast as a cross.
pub fn draw(history: &[SeriesPoint], result: &ForecastResult) -> Result<RgbImage, RenderError> {
    let first = history.first().ok_or(RenderError::NoPoints)?;
    let x0 = f64::from(first.year) - 0.5;
    let x1 = f64::from(result.target_year) + 0.5;

    let curve: Vec<(f64, f64)> = (0..=CURVE_SAMPLES)
        .map(|i| {
            let step = f64::from(result.target_year - first.year) / CURVE_SAMPLES as f64;
            let x = f64::from(first.year) + step * i as f64;
            (x, result.fit.eval(x))
        })
        .collect();
    let values = history
        .iter()
        .map(|p| p.count as f64)
        .chain(curve.iter().map(|c| c.1))
        .chain(std::iter::once(result.predicted_count));
    let (lo, hi) = values.fold((0.0_f64, 0.0_f64), |(lo, hi), v| (lo.min(v), hi.max(v)));
    let pad = ((hi - lo) * 0.1).max(1.0);

    let y0 = if lo < 0.0 { lo - pad } else { 0.0 };
    let y1 = hi + pad;
    let mut canvas = Canvas::new(Frame { x0, x1, y0, y1 });

    for year in first.year..=result.target_year {
        let x = f64::from(year);
        canvas.line((x, y0), (x, y1), GRID, 0);
    }
    canvas.grid_rows(GRID);
    canvas.border(AXIS);
    if y0 < 0.0 {
        canvas.line((x0, 0.0), (x1, 0.0), AXIS, 0);
    }

    for pair in curve.windows(2) {
        canvas.line(pair[0], pair[1], FIT, 1);
    }
    for pair in history.windows(2) {
        canvas.line(pair[0].xy(), pair[1].xy(), HISTORY, 1);
    }
    for p in history {
        canvas.dot(p.xy(), 4, HISTORY);
    }
    canvas.cross((f64::from(result.target_year), result.predicted_count), 8, FORECAST);

    Ok(canvas.img)
}

struct Frame {
    x0: f64,
    x1: f64,
    y0: f64,
    y1: f64,
}

struct Canvas {
    img: RgbImage,
    frame: Frame,
}

impl Canvas {
    fn new(frame: Frame) -> Self {
        Self {
            img: RgbImage::from_pixel(WIDTH, HEIGHT, BACKGROUND),
            frame,
        }
    }

    fn to_px(&self, (x, y): (f64, f64)) -> (i64, i64) {
        let w = f64::from(WIDTH) - 2.0 * MARGIN;
        let h = f64::from(HEIGHT) - 2.0 * MARGIN;
        let f = &self.frame;
        let px = MARGIN + (x - f.x0) / (f.x1 - f.x0) * w;
        let py = f64::from(HEIGHT) - MARGIN - (y - f.y0) / (f.y1 - f.y0) * h;
        (px.round() as i64, py.round() as i64)
    }

    fn put(&mut self, x: i64, y: i64, color: Rgb<u8>) {
        if x >= 0 && y >= 0 && x < i64::from(WIDTH) && y < i64::from(HEIGHT) {
            self.img.put_pixel(x as u32, y as u32, color);
        }
    }

    fn blot(&mut self, x: i64, y: i64, radius: i64, color: Rgb<u8>) {
        for dx in -radius..=radius {
            for dy in -radius..=radius {
                self.put(x + dx, y + dy, color);
            }
        }
    }

    // Bresenham
    fn line_px(
        &mut self,
        (mut x, mut y): (i64, i64),
        (x_end, y_end): (i64, i64),
        color: Rgb<u8>,
        radius: i64,
    ) {
        let dx = (x_end - x).abs();
        let dy = -(y_end - y).abs();
        let sx = if x < x_end { 1 } else { -1 };
        let sy = if y < y_end { 1 } else { -1 };
        let mut err = dx + dy;
        loop {
            self.blot(x, y, radius, color);
            if x == x_end && y == y_end {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x += sx;
            }
            if e2 <= dx {
                err += dx;
                y += sy;
            }
        }
    }

    fn line(&mut self, from: (f64, f64), to: (f64, f64), color: Rgb<u8>, radius: i64) {
        let (a, b) = (self.to_px(from), self.to_px(to));
        self.line_px(a, b, color, radius);
    }

    fn grid_rows(&mut self, color: Rgb<u8>) {
        let (x0, x1, y0, y1) = (self.frame.x0, self.frame.x1, self.frame.y0, self.frame.y1);
        for i in 0..=Y_GRID_LINES {
            let y = y0 + (y1 - y0) * i as f64 / Y_GRID_LINES as f64;
            self.line((x0, y), (x1, y), color, 0);
        }
    }

    /// Axis-aligned rectangle between two data corners.
    fn fill(&mut self, a: (f64, f64), b: (f64, f64), color: Rgb<u8>) {
        let (ax, ay) = self.to_px(a);
        let (bx, by) = self.to_px(b);
        for x in ax.min(bx)..=ax.max(bx) {
            for y in ay.min(by)..=ay.max(by) {
                self.put(x, y, color);
            }
        }
    }

    fn border(&mut self, color: Rgb<u8>) {
        let (l, t) = (MARGIN as i64, MARGIN as i64);
        let (r, b) = (i64::from(WIDTH) - l, i64::from(HEIGHT) - t);
        self.line_px((l, t), (r, t), color, 0);
        self.line_px((r, t), (r, b), color, 0);
        self.line_px((r, b), (l, b), color, 0);
        self.line_px((l, b), (l, t), color, 0);
    }

    fn dot(&mut self, at: (f64, f64), radius: i64, color: Rgb<u8>) {
        let (cx, cy) = self.to_px(at);
        for dx in -radius..=radius {
            for dy in -radius..=radius {
                if dx * dx + dy * dy <= radius * radius {
                    self.put(cx + dx, cy + dy, color);
                }
            }
        }
    }

    fn cross(&mut self, at: (f64, f64), size: i64, color: Rgb<u8>) {
        let (cx, cy) = self.to_px(at);
        self.line_px((cx - size, cy - size), (cx + size, cy + size), color, 1);
        self.line_px((cx - size, cy + size), (cx + size, cy - size), color, 1);
    }
}
