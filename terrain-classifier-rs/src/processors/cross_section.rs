//! Cross-section filter over the vertical profile of each azimuth column.
//!
//! Walking up the scan-lines of one column, ground returns move outward
//! while gaining little height; a wall returns at nearly the same range
//! with height increasing, and an overhang even comes back closer. The
//! slope between consecutive occupied cells, `atan2(|dz|, dr)`, captures
//! all three: ~0 deg for flat ground, ~90 deg for a wall, above 90 deg when
//! the upper return is nearer.

use crate::config::{ColorConfig, SlopeConfig};

use super::grid::{occupied_radius, Feature, FeatureTable, PolarGrid};
use super::TerrainFilter;

#[derive(Debug, Clone)]
pub struct CrossSectionFilter {
    config: SlopeConfig,
    palette: ColorConfig,
}

/// Map a slope in degrees onto [0, 1] across the configured band.
pub(crate) fn slope_score(slope_deg: f32, band: &SlopeConfig) -> f32 {
    let span = band.wall_slope_deg - band.traversable_slope_deg;
    if span <= 0.0 {
        return if slope_deg > band.traversable_slope_deg { 1.0 } else { 0.0 };
    }
    ((slope_deg - band.traversable_slope_deg) / span).clamp(0.0, 1.0)
}

impl CrossSectionFilter {
    pub fn new(config: SlopeConfig, palette: ColorConfig) -> Self {
        Self { config, palette }
    }
}

impl TerrainFilter for CrossSectionFilter {
    fn name(&self) -> &'static str {
        "cross_section"
    }

    fn filtering_all_sets(&self, grid: &PolarGrid, features: &mut FeatureTable) {
        // (row, radius, z) of the occupied cells of one column, bottom up
        let mut profile: Vec<(usize, f32, f32)> = Vec::with_capacity(grid.rows());

        for col in 0..grid.cols() {
            profile.clear();
            for row in 0..grid.rows() {
                if let (Some(radius), Some(point)) =
                    (occupied_radius(grid, features, row, col), grid.get(row, col))
                {
                    profile.push((row, radius, point[2]));
                }
            }

            for pair in profile.windows(2) {
                let (lower_row, lower_r, lower_z) = pair[0];
                let (upper_row, upper_r, upper_z) = pair[1];

                let slope = (upper_z - lower_z).abs().atan2(upper_r - lower_r).to_degrees();
                let score = slope_score(slope, &self.config);

                for row in [lower_row, upper_row] {
                    let feature = features.get_mut(row, col);
                    feature.cross_section_prob = feature.cross_section_prob.max(score);
                }
            }
        }
    }

    fn score(&self, feature: &Feature) -> f32 {
        feature.cross_section_prob
    }

    fn obstacle_threshold(&self) -> f32 {
        self.config.obstacle_threshold
    }

    fn palette(&self) -> &ColorConfig {
        &self.palette
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processors::grid::test_support::place;

    fn filter() -> CrossSectionFilter {
        CrossSectionFilter::new(SlopeConfig::default(), ColorConfig::default())
    }

    #[test]
    fn test_slope_score_band() {
        let band = SlopeConfig::default();
        assert_eq!(slope_score(5.0, &band), 0.0);
        assert_eq!(slope_score(40.0, &band), 0.5);
        assert_eq!(slope_score(90.0, &band), 1.0);
        assert_eq!(slope_score(150.0, &band), 1.0);
    }

    #[test]
    fn test_flat_ground_profile_is_traversable() {
        let mut grid = PolarGrid::new(16, 8, true);
        let mut features = FeatureTable::new(16, 8);
        // Sensor 1.5 above flat ground: lower lines land nearer.
        for (row, r) in [(0, 3.0f32), (1, 3.6), (2, 4.4), (3, 5.6)] {
            place(&mut grid, &mut features, row, 2, [r, 0.0, -1.5], r);
        }

        filter().filtering_all_sets(&grid, &mut features);
        for row in 0..4 {
            assert_eq!(features.get(row, 2).cross_section_prob, 0.0);
        }
    }

    #[test]
    fn test_wall_profile_is_obstacle() {
        let mut grid = PolarGrid::new(16, 8, true);
        let mut features = FeatureTable::new(16, 8);
        place(&mut grid, &mut features, 3, 4, [3.0, 0.0, -1.4], 3.0);
        // Wall at 4.0, stacked over three lines (with a blind line between).
        place(&mut grid, &mut features, 4, 4, [4.0, 0.0, -0.6], 4.0);
        place(&mut grid, &mut features, 5, 4, [4.02, 0.0, -0.2], 4.02);
        place(&mut grid, &mut features, 7, 4, [4.01, 0.0, 0.5], 4.01);

        let f = filter();
        f.filtering_all_sets(&grid, &mut features);
        assert!(features.get(5, 4).cross_section_prob > f.obstacle_threshold());
        assert!(features.get(7, 4).cross_section_prob > f.obstacle_threshold());

        let cloud = f.color_all_sets(&grid, &features);
        assert_eq!(cloud.len(), 4);
        assert_eq!(cloud.color(3), Some([255, 0, 0]));
    }

    #[test]
    fn test_single_return_column_scores_zero() {
        let mut grid = PolarGrid::new(16, 8, true);
        let mut features = FeatureTable::new(16, 8);
        place(&mut grid, &mut features, 9, 1, [2.0, 0.0, 1.0], 2.0);

        filter().filtering_all_sets(&grid, &mut features);
        assert_eq!(features.get(9, 1).cross_section_prob, 0.0);
    }
}
