use crate::dendrogram::SegmentSet;
use crate::error::{PipelineError, Result};
use crate::reshape::{CellRecord, LongTable};
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use serde::Serialize;
use std::error::Error;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

/// Consumer of the long table and dendrogram. Implementations must not
/// need anything beyond the cell records and segments.
pub trait Renderer {
    fn render(
        &self,
        long: &LongTable,
        action_column: &str,
        dendrogram: Option<&SegmentSet>,
    ) -> Result<()>;
}

#[derive(Serialize)]
struct RenderPayload<'a> {
    categories: &'a [String],
    row_ids: Vec<&'a str>,
    cells: Vec<CellRecord>,
    dendrogram: Option<&'a SegmentSet>,
}

/// Writes the render contract as JSON, for an external (e.g. web) renderer.
#[derive(Debug, Clone)]
pub struct JsonPayload {
    pub path: PathBuf,
}

impl Renderer for JsonPayload {
    fn render(
        &self,
        long: &LongTable,
        action_column: &str,
        dendrogram: Option<&SegmentSet>,
    ) -> Result<()> {
        let payload = RenderPayload {
            categories: long.categories().levels(),
            row_ids: long.row_ids(),
            cells: long.cell_records(action_column)?,
            dendrogram,
        };
        let mut writer = BufWriter::new(File::create(&self.path)?);
        serde_json::to_writer_pretty(&mut writer, &payload)?;
        writer.flush()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Svg,
    Png,
}

impl std::str::FromStr for ImageFormat {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "svg" => Ok(ImageFormat::Svg),
            "png" => Ok(ImageFormat::Png),
            _ => Err(format!("Unknown image format: {}", s)),
        }
    }
}

/// Static heatmap drawn with plotters: categories along x, rows along y in
/// long-table order, dendrogram to the right of the grid.
#[derive(Debug, Clone)]
pub struct HeatmapPlot {
    pub path: PathBuf,
    pub size: (u32, u32),
    pub format: ImageFormat,
    pub title: Option<String>,
}

impl Renderer for HeatmapPlot {
    fn render(
        &self,
        long: &LongTable,
        action_column: &str,
        dendrogram: Option<&SegmentSet>,
    ) -> Result<()> {
        let records = long.cell_records(action_column)?;
        let drawn = match self.format {
            ImageFormat::Svg => {
                let root = SVGBackend::new(&self.path, self.size).into_drawing_area();
                draw_heatmap(&root, long, &records, dendrogram, self.title.as_deref())
            }
            ImageFormat::Png => {
                let root = BitMapBackend::new(&self.path, self.size).into_drawing_area();
                draw_heatmap(&root, long, &records, dendrogram, self.title.as_deref())
            }
        };
        drawn.map_err(|e| PipelineError::Render(e.to_string()))
    }
}

/// Diverging blue-white-red scale; non-finite values are grey.
fn value_color(value: f64, min: f64, max: f64) -> RGBColor {
    if !value.is_finite() {
        return RGBColor(169, 169, 169);
    }
    let t = if max > min {
        ((value - min) / (max - min)).clamp(0.0, 1.0)
    } else {
        0.5
    };
    let lerp = |a: u8, b: u8, f: f64| (a as f64 + (b as f64 - a as f64) * f).round() as u8;
    let (low, mid, high) = ((49, 54, 149), (255, 255, 255), (165, 0, 38));
    let (from, to, f): ((u8, u8, u8), (u8, u8, u8), f64) = if t < 0.5 {
        (low, mid, t * 2.0)
    } else {
        (mid, high, (t - 0.5) * 2.0)
    };
    RGBColor(lerp(from.0, to.0, f), lerp(from.1, to.1, f), lerp(from.2, to.2, f))
}

fn draw_heatmap<DB>(
    root: &DrawingArea<DB, Shift>,
    long: &LongTable,
    records: &[CellRecord],
    dendrogram: Option<&SegmentSet>,
    title: Option<&str>,
) -> std::result::Result<(), Box<dyn Error>>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    root.fill(&WHITE)?;

    let row_ids = long.row_ids();
    let n_cols = long.categories().len() as f64;
    let n_rows = row_ids.len() as f64;
    // Column k (1-based) spans [k-1, k], so the grid ends at x = n_cols
    // and the dendrogram, shifted past n_cols, never overlaps it.
    let x_max = dendrogram
        .and_then(|d| d.max_x())
        .unwrap_or(n_cols)
        .max(n_cols)
        + 0.5;

    let (min, max) = records
        .iter()
        .filter_map(|r| r.value.as_number())
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));

    let mut builder = ChartBuilder::on(root);
    builder.margin(20).margin_left(120).margin_bottom(60);
    if let Some(title) = title {
        builder.caption(title, ("sans-serif", 28));
    }
    let mut chart = builder.build_cartesian_2d(0.0..x_max, 0.5..n_rows + 0.5)?;

    let row_of: std::collections::HashMap<&str, f64> = row_ids
        .iter()
        .enumerate()
        .map(|(i, id)| (*id, (i + 1) as f64))
        .collect();

    chart.draw_series(records.iter().map(|r| {
        let x0 = r.category_rank as f64;
        let y = row_of.get(r.row_id.as_str()).copied().unwrap_or(0.0);
        let color = match r.value.as_number() {
            Some(v) => value_color(v, min, max),
            None => RGBColor(169, 169, 169),
        };
        Rectangle::new([(x0, y - 0.5), (x0 + 1.0, y + 0.5)], color.filled())
    }))?;

    if let Some(set) = dendrogram {
        chart.draw_series(
            set.iter()
                .map(|s| PathElement::new(vec![(s.x, s.y), (s.xend, s.yend)], BLACK.stroke_width(1))),
        )?;
    }

    let category_style = TextStyle::from(("sans-serif", 14).into_font()).pos(Pos::new(HPos::Center, VPos::Top));
    for (rank, label) in long.categories().levels().iter().enumerate() {
        let (px, py) = chart.backend_coord(&(rank as f64 + 0.5, 0.5));
        root.draw(&Text::new(label.clone(), (px, py + 6), category_style.clone()))?;
    }
    let row_style = TextStyle::from(("sans-serif", 12).into_font()).pos(Pos::new(HPos::Right, VPos::Center));
    for (i, id) in row_ids.iter().enumerate() {
        let (px, py) = chart.backend_coord(&(0.0, (i + 1) as f64));
        root.draw(&Text::new(id.to_string(), (px - 6, py), row_style.clone()))?;
    }

    root.present()?;
    Ok(())
}
