//! Color compositing of classified cells into a flat output cloud.

use crate::config::ColorConfig;
use crate::core::loaders::PointCloud;

use super::grid::{Feature, FeatureTable, PolarGrid};

/// Final label of one cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Classification {
    Obstacle,
    /// Traversable terrain; `roughness` in [0, 1] relative to the obstacle threshold
    Terrain { roughness: f32 },
}

impl Classification {
    /// Label a score. Scores strictly above `threshold` are obstacles.
    pub fn from_score(score: f32, threshold: f32) -> Self {
        let score = if score.is_nan() { 0.0 } else { score };
        if score > threshold {
            return Classification::Obstacle;
        }
        let roughness = if threshold > 0.0 {
            (score / threshold).clamp(0.0, 1.0)
        } else {
            0.0
        };
        Classification::Terrain { roughness }
    }

    pub fn is_obstacle(&self) -> bool {
        matches!(self, Classification::Obstacle)
    }

    /// RGB for this label. Terrain dims from full brightness (smooth) down
    /// to `min_terrain_brightness` (just below the threshold).
    pub fn color(&self, palette: &ColorConfig) -> [u8; 3] {
        match *self {
            Classification::Obstacle => palette.obstacle,
            Classification::Terrain { roughness } => {
                let floor = palette.min_terrain_brightness.clamp(0.0, 1.0);
                let brightness = 1.0 - roughness * (1.0 - floor);
                palette
                    .terrain
                    .map(|channel| (channel as f32 * brightness).round().clamp(0.0, 255.0) as u8)
            }
        }
    }
}

/// Obstacle / terrain cell counts of one classification pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClassCounts {
    pub obstacles: usize,
    pub terrain: usize,
}

/// Emit one colored point per occupied cell, in row-major order.
///
/// Empty cells are skipped. The returned cloud always carries a color
/// channel, even when empty.
pub fn compose<F>(
    grid: &PolarGrid,
    features: &FeatureTable,
    palette: &ColorConfig,
    threshold: f32,
    score: F,
) -> PointCloud
where
    F: Fn(&Feature) -> f32,
{
    let capacity = grid.occupied_count();
    let mut cloud = PointCloud::with_capacity(capacity);
    cloud.colors = Some(Vec::with_capacity(capacity));

    for (row, col, [x, y, z]) in grid.occupied() {
        let class = Classification::from_score(score(features.get(row, col)), threshold);
        cloud.push_with_color(x, y, z, class.color(palette));
    }

    cloud
}

/// Count obstacle and terrain cells under the same rule as [`compose`].
pub fn tally<F>(grid: &PolarGrid, features: &FeatureTable, threshold: f32, score: F) -> ClassCounts
where
    F: Fn(&Feature) -> f32,
{
    grid.occupied()
        .fold(ClassCounts::default(), |mut counts, (row, col, _)| {
            if Classification::from_score(score(features.get(row, col)), threshold).is_obstacle() {
                counts.obstacles += 1;
            } else {
                counts.terrain += 1;
            }
            counts
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_threshold_is_strict() {
        assert!(Classification::from_score(0.51, 0.5).is_obstacle());
        assert_eq!(
            Classification::from_score(0.5, 0.5),
            Classification::Terrain { roughness: 1.0 }
        );
        assert_eq!(
            Classification::from_score(f32::NAN, 0.5),
            Classification::Terrain { roughness: 0.0 }
        );
    }

    #[test]
    fn test_terrain_brightness_follows_roughness() {
        let palette = ColorConfig::default();
        let smooth = Classification::Terrain { roughness: 0.0 }.color(&palette);
        let rough = Classification::Terrain { roughness: 1.0 }.color(&palette);

        assert_eq!(smooth, [0, 255, 0]);
        assert_eq!(rough[0], 0);
        assert!(rough[1] < smooth[1]);
        assert_eq!(rough[1], (255.0f32 * 0.35).round() as u8);
        assert_eq!(Classification::Obstacle.color(&palette), [255, 0, 0]);
    }

    #[test]
    fn test_compose_skips_empty_cells() {
        let mut grid = PolarGrid::new(2, 3, false);
        let mut features = FeatureTable::new(2, 3);
        grid.set(0, 2, [1.0, 2.0, 3.0]);
        grid.set(1, 0, [4.0, 5.0, 6.0]);
        features.get_mut(1, 0).continuity_prob = 0.9;

        let palette = ColorConfig::default();
        let cloud = compose(&grid, &features, &palette, 0.5, |f| f.continuity_prob);

        assert_eq!(cloud.len(), 2);
        assert_eq!(cloud.point(0), [1.0, 2.0, 3.0]);
        assert_eq!(cloud.color(0), Some([0, 255, 0]));
        assert_eq!(cloud.color(1), Some([255, 0, 0]));

        let counts = tally(&grid, &features, 0.5, |f| f.continuity_prob);
        assert_eq!(counts, ClassCounts { obstacles: 1, terrain: 1 });
    }

    #[test]
    fn test_compose_empty_grid_is_valid_colored_cloud() {
        let grid = PolarGrid::new(4, 4, true);
        let features = FeatureTable::new(4, 4);
        let cloud = compose(&grid, &features, &ColorConfig::default(), 0.5, |f| f.sum);
        assert!(cloud.is_empty());
        assert_eq!(cloud.colors, Some(Vec::new()));
    }
}
