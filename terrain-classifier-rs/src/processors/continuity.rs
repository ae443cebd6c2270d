//! Scan-line continuity filter.
//!
//! Along a scan-line, ground returns change range smoothly. An obstacle face
//! shows up as a cell markedly nearer to the sensor than its neighbors: it
//! occludes what lies behind it. Each occupied cell is scored by the largest
//! amount by which a neighbor within the window is farther away, normalized
//! by `continuity_threshold` and clamped to [0, 1]. The farther side of a
//! discontinuity scores zero, so background next to an obstacle stays
//! terrain.
//!
//! A single cell farther than both of its nearest occupied neighbors on the
//! scan-line by more than the threshold is a spike. It is scored by that gap
//! and left out of its neighbors' comparisons.

use crate::config::{ColorConfig, ContinuityConfig};

use super::grid::{occupied_radius, Feature, FeatureTable, PolarGrid};
use super::TerrainFilter;

#[derive(Debug, Clone)]
pub struct ContinuityFilter {
    config: ContinuityConfig,
    palette: ColorConfig,
}

impl ContinuityFilter {
    pub fn new(config: ContinuityConfig, palette: ColorConfig) -> Self {
        Self { config, palette }
    }

    pub fn config(&self) -> &ContinuityConfig {
        &self.config
    }

    /// Radius of the first occupied cell walking from `col` in direction `step`.
    fn nearest_on_side(
        &self,
        grid: &PolarGrid,
        features: &FeatureTable,
        row: usize,
        col: usize,
        step: isize,
    ) -> Option<f32> {
        let window = self.config.neighbor_window as isize;
        (1..=window).find_map(|k| {
            grid.neighbor_col(col, step * k)
                .and_then(|c| occupied_radius(grid, features, row, c))
        })
    }

    /// Gap by which (row, col) stands out beyond both nearest scan-line
    /// neighbors, when it exceeds the threshold.
    fn spike_gap(&self, grid: &PolarGrid, features: &FeatureTable, row: usize, col: usize) -> Option<f32> {
        let radius = occupied_radius(grid, features, row, col)?;
        let left = self.nearest_on_side(grid, features, row, col, -1)?;
        let right = self.nearest_on_side(grid, features, row, col, 1)?;
        let gap = radius - left.max(right);
        (gap > self.config.continuity_threshold).then_some(gap)
    }

    /// Largest range by which a valid, non-spike neighbor of (row, col) lies
    /// beyond `radius`.
    fn occlusion_gap(
        &self,
        grid: &PolarGrid,
        features: &FeatureTable,
        spikes: &[bool],
        row: usize,
        col: usize,
        radius: f32,
    ) -> f32 {
        let window = self.config.neighbor_window as isize;
        let cols = grid.cols();
        let mut gap = 0.0f32;

        let mut consider = |r: usize, c: usize| {
            if spikes[r * cols + c] {
                return;
            }
            if let Some(neighbor) = occupied_radius(grid, features, r, c) {
                gap = gap.max(neighbor - radius);
            }
        };

        for offset in (-window..=window).filter(|&o| o != 0) {
            if let Some(c) = grid.neighbor_col(col, offset) {
                consider(row, c);
            }
        }

        if self.config.compare_adjacent_rows {
            let below = row.checked_sub(1);
            let above = (row + 1 < grid.rows()).then_some(row + 1);
            for r in [below, above].into_iter().flatten() {
                for offset in -1..=1 {
                    if let Some(c) = grid.neighbor_col(col, offset) {
                        consider(r, c);
                    }
                }
            }
        }

        gap
    }
}

impl TerrainFilter for ContinuityFilter {
    fn name(&self) -> &'static str {
        "continuity"
    }

    fn filtering_all_sets(&self, grid: &PolarGrid, features: &mut FeatureTable) {
        let threshold = self.config.continuity_threshold;
        let cols = grid.cols();

        let mut spikes = vec![false; grid.rows() * cols];
        for row in 0..grid.rows() {
            for col in 0..cols {
                if let Some(gap) = self.spike_gap(grid, features, row, col) {
                    spikes[row * cols + col] = true;
                    features.get_mut(row, col).continuity_prob = (gap / threshold).clamp(0.0, 1.0);
                }
            }
        }

        for row in 0..grid.rows() {
            for col in 0..cols {
                if spikes[row * cols + col] {
                    continue;
                }
                let Some(radius) = occupied_radius(grid, features, row, col) else {
                    continue;
                };
                let gap = self.occlusion_gap(grid, features, &spikes, row, col, radius);
                features.get_mut(row, col).continuity_prob = (gap / threshold).clamp(0.0, 1.0);
            }
        }
    }

    fn score(&self, feature: &Feature) -> f32 {
        feature.continuity_prob
    }

    fn obstacle_threshold(&self) -> f32 {
        self.config.obstacle_threshold
    }

    fn palette(&self) -> &ColorConfig {
        &self.palette
    }
}
