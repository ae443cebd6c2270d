//! PNG renderings of classified sweeps.
//!
//! - [`plot_classified_sweep`]: top-down (x/y) scatter of the colored output
//! - [`plot_feature_map`]: rows x columns heat map of one feature channel

use std::path::Path;

use log::debug;
use plotters::prelude::*;
use plotters_bitmap::BitMapBackend;
use thiserror::Error;

use crate::core::loaders::PointCloud;
use crate::core::transforms::subsample_cloud;
use crate::processors::grid::{FeatureChannel, FeatureTable};

/// Errors that can occur during visualization.
#[derive(Error, Debug)]
pub enum VisualizationError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Plotting error: {0}")]
    PlottingError(String),

    #[error("Empty point cloud")]
    EmptyPointCloud,
}

/// Result type for visualization operations.
pub type Result<T> = std::result::Result<T, VisualizationError>;

const DEFAULT_WIDTH: u32 = 1200;
const DEFAULT_HEIGHT: u32 = 1200;

const FEATURE_MAP_WIDTH: u32 = 1440;
const FEATURE_MAP_HEIGHT: u32 = 320;

/// Color for uncolored input points.
const UNCLASSIFIED_COLOR: RGBColor = RGBColor(100, 149, 237);

fn plot_err<E: std::fmt::Display>(e: E) -> VisualizationError {
    VisualizationError::PlottingError(e.to_string())
}

/// Draw a classified sweep seen from above and save it as PNG.
///
/// The sensor sits at the origin, marked with a small black cross. At most
/// `max_points` points are drawn.
pub fn plot_classified_sweep(output_path: &Path, cloud: &PointCloud, max_points: usize) -> Result<()> {
    if cloud.is_empty() {
        return Err(VisualizationError::EmptyPointCloud);
    }

    let (cloud, stride) = subsample_cloud(cloud, max_points);
    if stride > 1 {
        debug!("Plotting every {}th point ({} points)", stride, cloud.len());
    }

    // Square view centered on the sensor so distances read the same on both axes.
    let extent = (0..cloud.len())
        .map(|i| {
            let [x, y, _] = cloud.point(i);
            x.abs().max(y.abs())
        })
        .filter(|v| v.is_finite())
        .fold(1.0f32, f32::max)
        * 1.05;

    let root = BitMapBackend::new(output_path, (DEFAULT_WIDTH, DEFAULT_HEIGHT)).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;

    let mut chart = ChartBuilder::on(&root)
        .margin(10)
        .build_cartesian_2d(-extent..extent, -extent..extent)
        .map_err(plot_err)?;

    chart
        .draw_series((0..cloud.len()).map(|i| {
            let [x, y, _] = cloud.point(i);
            let color = cloud
                .color(i)
                .map_or(UNCLASSIFIED_COLOR, |[r, g, b]| RGBColor(r, g, b));
            Circle::new((x, y), 2, color.filled())
        }))
        .map_err(plot_err)?;

    let mark = extent * 0.02;
    chart
        .draw_series([
            PathElement::new(vec![(-mark, 0.0), (mark, 0.0)], BLACK.stroke_width(2)),
            PathElement::new(vec![(0.0, -mark), (0.0, mark)], BLACK.stroke_width(2)),
        ])
        .map_err(plot_err)?;

    root.present().map_err(plot_err)?;
    Ok(())
}

/// Map a normalized value onto a blue (0) to red (1) ramp.
fn heat_color(value: f32) -> HSLColor {
    let v = value.clamp(0.0, 1.0) as f64;
    HSLColor((1.0 - v) * 240.0 / 360.0, 1.0, 0.5)
}

/// Draw one feature channel as a heat map, row 0 at the bottom.
///
/// Probability channels are drawn on a fixed [0, 1] scale; the radius
/// channel is scaled by its maximum. Cells with a zero value stay white.
pub fn plot_feature_map(output_path: &Path, features: &FeatureTable, channel: FeatureChannel) -> Result<()> {
    let rows = features.rows();
    let cols = features.cols();

    let scale = match channel {
        FeatureChannel::Radius => features
            .iter()
            .map(|(_, _, f)| f.radius)
            .filter(|v| v.is_finite())
            .fold(0.0f32, f32::max),
        _ => 1.0,
    };

    let root = BitMapBackend::new(output_path, (FEATURE_MAP_WIDTH, FEATURE_MAP_HEIGHT)).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;

    let mut chart = ChartBuilder::on(&root)
        .margin(5)
        .build_cartesian_2d(0..cols, 0..rows)
        .map_err(plot_err)?;

    chart
        .draw_series(features.iter().filter_map(|(row, col, feature)| {
            let value = feature.channel(channel);
            if !(value > 0.0) || scale <= 0.0 {
                return None;
            }
            Some(Rectangle::new(
                [(col, row), (col + 1, row + 1)],
                heat_color(value / scale).filled(),
            ))
        }))
        .map_err(plot_err)?;

    root.present().map_err(plot_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_plot_empty_cloud_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.png");

        let result = plot_classified_sweep(&path, &PointCloud::new(), 1000);
        assert!(matches!(result, Err(VisualizationError::EmptyPointCloud)));
    }

    #[test]
    fn test_plot_classified_sweep_writes_png() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sweep.png");

        let mut cloud = PointCloud::new();
        for i in 0..200 {
            let a = i as f32 * 0.03;
            let color = if i % 10 == 0 { [255, 0, 0] } else { [0, 255, 0] };
            cloud.push_with_color(5.0 * a.cos(), 5.0 * a.sin(), -1.0, color);
        }

        plot_classified_sweep(&path, &cloud, 50).unwrap();
        assert!(std::fs::metadata(&path).unwrap().len() > 0);
    }

    #[test]
    fn test_plot_feature_map_writes_png() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("continuity.png");

        let mut features = FeatureTable::new(16, 720);
        features.get_mut(3, 100).continuity_prob = 0.8;
        features.get_mut(3, 100).radius = 4.0;
        features.get_mut(9, 500).radius = 12.0;

        plot_feature_map(&path, &features, FeatureChannel::Continuity).unwrap();
        plot_feature_map(&path, &features, FeatureChannel::Radius).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_heat_color_endpoints() {
        let HSLColor(cold, _, _) = heat_color(0.0);
        let HSLColor(hot, _, _) = heat_color(2.0);
        assert!((cold - 240.0 / 360.0).abs() < 1e-9);
        assert_eq!(hot, 0.0);
    }
}
