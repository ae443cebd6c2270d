//! Local surface normal filter.
//!
//! Each occupied cell spans a small triangle with its nearest occupied
//! neighbor along the scan-line and its nearest one on an adjacent
//! scan-line. The tilt of that triangle's normal away from vertical is
//! mapped through the slope band: level ground points straight up, a wall
//! points sideways.

use std::f32::consts::PI;

use nalgebra::Vector3;

use crate::config::{ColorConfig, SlopeConfig};

use super::cross_section::slope_score;
use super::grid::{occupied_radius, Feature, FeatureTable, PolarGrid};
use super::TerrainFilter;

const ALONG_ROW_OFFSETS: [isize; 4] = [1, -1, 2, -2];
const CROSS_ROW_COL_OFFSETS: [isize; 3] = [0, 1, -1];

#[derive(Debug, Clone)]
pub struct NormalFilter {
    config: SlopeConfig,
    palette: ColorConfig,
}

/// Angle in degrees between the line along `normal` and the z axis.
fn tilt_deg(normal: &Vector3<f32>) -> Option<f32> {
    if normal.norm() <= f32::EPSILON {
        return None;
    }
    let angle = normal.angle(&Vector3::z());
    Some(angle.min(PI - angle).to_degrees())
}

impl NormalFilter {
    pub fn new(config: SlopeConfig, palette: ColorConfig) -> Self {
        Self { config, palette }
    }

    fn occupied_point(
        grid: &PolarGrid,
        features: &FeatureTable,
        row: usize,
        col: usize,
    ) -> Option<Vector3<f32>> {
        occupied_radius(grid, features, row, col)?;
        grid.get(row, col).map(Vector3::from)
    }

    fn along_row(grid: &PolarGrid, features: &FeatureTable, row: usize, col: usize) -> Option<Vector3<f32>> {
        ALONG_ROW_OFFSETS.iter().find_map(|&offset| {
            let c = grid.neighbor_col(col, offset)?;
            Self::occupied_point(grid, features, row, c)
        })
    }

    fn cross_row(grid: &PolarGrid, features: &FeatureTable, row: usize, col: usize) -> Option<Vector3<f32>> {
        let above = (row + 1 < grid.rows()).then_some(row + 1);
        let below = row.checked_sub(1);
        [above, below].into_iter().flatten().find_map(|r| {
            CROSS_ROW_COL_OFFSETS.iter().find_map(|&offset| {
                let c = grid.neighbor_col(col, offset)?;
                Self::occupied_point(grid, features, r, c)
            })
        })
    }
}

impl TerrainFilter for NormalFilter {
    fn name(&self) -> &'static str {
        "normal"
    }

    fn filtering_all_sets(&self, grid: &PolarGrid, features: &mut FeatureTable) {
        for row in 0..grid.rows() {
            for col in 0..grid.cols() {
                let Some(center) = Self::occupied_point(grid, features, row, col) else {
                    continue;
                };
                let (Some(along), Some(across)) = (
                    Self::along_row(grid, features, row, col),
                    Self::cross_row(grid, features, row, col),
                ) else {
                    continue;
                };

                let normal = (along - center).cross(&(across - center));
                if let Some(tilt) = tilt_deg(&normal) {
                    features.get_mut(row, col).normal_prob = slope_score(tilt, &self.config);
                }
            }
        }
    }

    fn score(&self, feature: &Feature) -> f32 {
        feature.normal_prob
    }

    fn obstacle_threshold(&self) -> f32 {
        self.config.obstacle_threshold
    }

    fn palette(&self) -> &ColorConfig {
        &self.palette
    }
}
