//! PNG rendering of group overlays and the combined fit comparison.
//!
//! Charts are drawn with plotters' bitmap backend. Errors from the backend are
//! flattened into `RenderError::Draw` so the caller can record a failed artifact
//! and move on to the next one.

use std::ops::Range;
use std::path::{Path, PathBuf};

use plotters::prelude::*;
use plotters::series::{DashedLineSeries, LineSeries};
use thiserror::Error;

use crate::domain::FitResult;
use crate::fit::ConcentrationGroup;

pub const PLOT_WIDTH: u32 = 1200;
pub const PLOT_HEIGHT: u32 = 800;

pub const X_AXIS_LABEL: &str = "Time from Start (sec)";
pub const Y_AXIS_LABEL: &str = "UWA_BaselineCorr_2";

/// Fit curve and inflection marker colour on group plots (`#FF69B4`).
pub const FIT_COLOR: RGBColor = RGBColor(255, 105, 180);

const FONT_SIZE_TITLE: i32 = 26;
const FONT_SIZE_AXIS: i32 = 18;
const FONT_SIZE_LEGEND: i32 = 13;
const DASH_SIZE: u32 = 10;
const DASH_SPACING: u32 = 6;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to render '{path}': {message}")]
    Draw { path: PathBuf, message: String },
    #[error("nothing to plot for '{path}'")]
    Empty { path: PathBuf },
}

/// Padded axis range. Flat data gets a fixed half-unit margin.
pub fn padded_range(min_val: f64, max_val: f64) -> Range<f64> {
    let (min, max) = if min_val <= max_val {
        (min_val, max_val)
    } else {
        (max_val, min_val)
    };
    let span = max - min;
    let pad = if span < 1e-9 { 0.5 } else { span * 0.05 };
    (min - pad)..(max + pad)
}

fn bounds(points: impl Iterator<Item = (f64, f64)>) -> Option<(Range<f64>, Range<f64>)> {
    let mut x = (f64::INFINITY, f64::NEG_INFINITY);
    let mut y = (f64::INFINITY, f64::NEG_INFINITY);
    for (px, py) in points.filter(|(a, b)| a.is_finite() && b.is_finite()) {
        x = (x.0.min(px), x.1.max(px));
        y = (y.0.min(py), y.1.max(py));
    }
    (x.0 <= x.1).then(|| (padded_range(x.0, x.1), padded_range(y.0, y.1)))
}

/// Overlay every contributing file's raw series, plus the fit if there is one.
pub fn render_group_plot(
    path: &Path,
    group: &ConcentrationGroup,
    fit: Option<&FitResult>,
) -> Result<(), RenderError> {
    let fit_points = fit.into_iter().flat_map(|f| f.curve_points());
    let raw_points = group.batches.iter().flat_map(|b| b.points());
    let (x_range, y_range) = bounds(raw_points.chain(fit_points)).ok_or_else(|| RenderError::Empty {
        path: path.to_path_buf(),
    })?;

    draw_group(path, group, fit, x_range, y_range).map_err(|e| RenderError::Draw {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

fn draw_group(
    path: &Path,
    group: &ConcentrationGroup,
    fit: Option<&FitResult>,
    x_range: Range<f64>,
    y_range: Range<f64>,
) -> Result<(), Box<dyn std::error::Error>> {
    let root = BitMapBackend::new(path, (PLOT_WIDTH, PLOT_HEIGHT)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(
            format!("UWA_BaselineCorr_2 for Concentration {}", group.concentration),
            ("sans-serif", FONT_SIZE_TITLE),
        )
        .margin(15)
        .x_label_area_size(50)
        .y_label_area_size(70)
        .build_cartesian_2d(x_range, y_range.clone())?;

    chart
        .configure_mesh()
        .x_desc(X_AXIS_LABEL)
        .y_desc(Y_AXIS_LABEL)
        .axis_desc_style(("sans-serif", FONT_SIZE_AXIS))
        .draw()?;

    for (idx, batch) in group.batches.iter().enumerate() {
        let color = Palette99::pick(idx).mix(0.5);
        chart.draw_series(LineSeries::new(batch.points(), color.stroke_width(1)))?;
    }

    if let Some(fit) = fit {
        let curve: Vec<(f64, f64)> = fit.curve_points().collect();
        chart.draw_series(DashedLineSeries::new(
            curve,
            DASH_SIZE,
            DASH_SPACING,
            FIT_COLOR.stroke_width(2),
        ))?;
        chart.draw_series(DashedLineSeries::new(
            vertical(fit.inflection_x, &y_range),
            DASH_SIZE,
            DASH_SPACING,
            FIT_COLOR.stroke_width(1),
        ))?;
    }

    root.present()?;
    Ok(())
}

/// Every fitted curve on one chart, coloured by position in `fits`.
///
/// `fits` should already be ordered by concentration; the legend follows it.
pub fn render_combined_plot(path: &Path, fits: &[FitResult]) -> Result<(), RenderError> {
    let (x_range, y_range) =
        bounds(fits.iter().flat_map(|f| f.curve_points())).ok_or_else(|| RenderError::Empty {
            path: path.to_path_buf(),
        })?;

    draw_combined(path, fits, x_range, y_range).map_err(|e| RenderError::Draw {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

fn draw_combined(
    path: &Path,
    fits: &[FitResult],
    x_range: Range<f64>,
    y_range: Range<f64>,
) -> Result<(), Box<dyn std::error::Error>> {
    let root = BitMapBackend::new(path, (PLOT_WIDTH, PLOT_HEIGHT)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(
            "Grouped UWA_BaselineCorr_2 for All Concentrations",
            ("sans-serif", FONT_SIZE_TITLE),
        )
        .margin(15)
        .x_label_area_size(50)
        .y_label_area_size(70)
        .build_cartesian_2d(x_range, y_range.clone())?;

    chart
        .configure_mesh()
        .x_desc(X_AXIS_LABEL)
        .y_desc(Y_AXIS_LABEL)
        .axis_desc_style(("sans-serif", FONT_SIZE_AXIS))
        .draw()?;

    for (idx, fit) in fits.iter().enumerate() {
        let color = Palette99::pick(idx).to_rgba();
        let curve: Vec<(f64, f64)> = fit.curve_points().collect();
        chart
            .draw_series(DashedLineSeries::new(
                curve,
                DASH_SIZE,
                DASH_SPACING,
                color.stroke_width(2),
            ))?
            .label(format!("Sigmoid Fit {}", fit.concentration))
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 24, y)], color.stroke_width(2)));

        chart.draw_series(DashedLineSeries::new(
            vertical(fit.inflection_x, &y_range),
            DASH_SIZE,
            DASH_SPACING,
            color.stroke_width(1),
        ))?;
    }

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::LowerRight)
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .label_font(("sans-serif", FONT_SIZE_LEGEND))
        .draw()?;

    root.present()?;
    Ok(())
}

fn vertical(x: f64, y_range: &Range<f64>) -> Vec<(f64, f64)> {
    vec![(x, y_range.start), (x, y_range.end)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Concentration, SeriesBatch};

    #[test]
    fn padded_range_handles_flat_and_reversed_input() {
        assert_eq!(padded_range(2.0, 2.0), 1.5..2.5);
        let r = padded_range(10.0, 0.0);
        assert!(r.start < 0.0 && r.end > 10.0);
    }

    #[test]
    fn bounds_ignore_non_finite_points() {
        let pts = vec![(0.0, 1.0), (f64::NAN, 5.0), (10.0, 3.0)];
        let (x, y) = bounds(pts.into_iter()).unwrap();
        assert!(x.start < 0.0 && x.end > 10.0);
        assert!(y.start < 1.0 && y.end > 3.0);
        assert!(bounds(std::iter::empty()).is_none());
    }

    #[test]
    fn empty_inputs_are_reported_not_drawn() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("combined.png");
        assert!(matches!(
            render_combined_plot(&path, &[]),
            Err(RenderError::Empty { .. })
        ));

        let mut group = ConcentrationGroup::new(Concentration::new(1.0).unwrap());
        group.batches.push(SeriesBatch::new("/x/a.csv"));
        assert!(matches!(
            render_group_plot(&path, &group, None),
            Err(RenderError::Empty { .. })
        ));
        assert!(!path.exists());
    }
}
