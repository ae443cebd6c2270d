//! Range histogram filter.
//!
//! Buckets the radii of a cell's scan-line neighborhood into fixed-width
//! bins. Smooth terrain piles up in one bucket (or two adjacent ones);
//! rough terrain spreads out. The score is the fraction of samples outside
//! the dominant bucket and its two neighbors, relative to `max_spread`.

use crate::config::{ColorConfig, HistogramConfig};

use super::grid::{occupied_radius, Feature, FeatureTable, PolarGrid};
use super::TerrainFilter;

#[derive(Debug, Clone)]
pub struct HistogramFilter {
    config: HistogramConfig,
    palette: ColorConfig,
}

impl HistogramFilter {
    pub fn new(config: HistogramConfig, palette: ColorConfig) -> Self {
        Self { config, palette }
    }

    /// Fraction of `bins` (sorted bucket keys) outside the densest bucket ±1.
    fn spread(bins: &[i64]) -> f32 {
        let mut best_count = 0usize;
        let mut best_key = 0i64;
        let mut start = 0;
        while start < bins.len() {
            let end = start + bins[start..].iter().take_while(|&&k| k == bins[start]).count();
            if end - start > best_count {
                best_count = end - start;
                best_key = bins[start];
            }
            start = end;
        }

        let supported = bins
            .iter()
            .filter(|&&k| (k - best_key).abs() <= 1)
            .count();
        1.0 - supported as f32 / bins.len() as f32
    }
}

impl TerrainFilter for HistogramFilter {
    fn name(&self) -> &'static str {
        "histogram"
    }

    fn filtering_all_sets(&self, grid: &PolarGrid, features: &mut FeatureTable) {
        let window = self.config.neighbor_window as isize;
        let mut bins: Vec<i64> = Vec::with_capacity(2 * self.config.neighbor_window + 1);

        for row in 0..grid.rows() {
            for col in 0..grid.cols() {
                if occupied_radius(grid, features, row, col).is_none() {
                    continue;
                }

                bins.clear();
                for offset in -window..=window {
                    let Some(c) = grid.neighbor_col(col, offset) else {
                        continue;
                    };
                    if let Some(radius) = occupied_radius(grid, features, row, c) {
                        bins.push((radius / self.config.bin_width).floor() as i64);
                    }
                }

                let score = if bins.len() < self.config.min_samples {
                    0.0
                } else {
                    bins.sort_unstable();
                    (Self::spread(&bins) / self.config.max_spread).clamp(0.0, 1.0)
                };
                features.get_mut(row, col).histogram_prob = score;
            }
        }
    }

    fn score(&self, feature: &Feature) -> f32 {
        feature.histogram_prob
    }

    fn obstacle_threshold(&self) -> f32 {
        self.config.obstacle_threshold
    }

    fn palette(&self) -> &ColorConfig {
        &self.palette
    }
}
