//! Per-sweep driver: grid construction, strategy dispatch and compositing.
//!
//! A [`SweepProcessor`] owns the grid and feature arena for its whole
//! lifetime and reuses it for every sweep, strictly one sweep at a time.

use std::time::Instant;

use log::{debug, warn};

use crate::config::{ConfigError, PipelineConfig, Strategy};
use crate::core::loaders::PointCloud;

use super::combine::CombinedFilter;
use super::compositor::ClassCounts;
use super::continuity::ContinuityFilter;
use super::cross_section::CrossSectionFilter;
use super::grid::{BuildStats, FeatureTable, GridBuilder, PolarGrid, SweepError, SweepInput};
use super::histogram::HistogramFilter;
use super::normal::NormalFilter;
use super::TerrainFilter;

/// Colored output of one sweep.
#[derive(Debug, Clone)]
pub struct ClassifiedSweep {
    /// Frame the output points are expressed in
    pub frame_id: String,
    pub strategy: Strategy,
    /// One colored point per occupied cell
    pub cloud: PointCloud,
    pub stats: BuildStats,
    pub counts: ClassCounts,
}

/// Instantiate the filter for `strategy`.
pub fn make_filter(strategy: Strategy, config: &PipelineConfig) -> Box<dyn TerrainFilter> {
    let palette = config.colors.clone();
    match strategy {
        Strategy::Continuity => Box::new(ContinuityFilter::new(config.continuity.clone(), palette)),
        Strategy::CrossSection => {
            Box::new(CrossSectionFilter::new(config.cross_section.clone(), palette))
        }
        Strategy::Histogram => Box::new(HistogramFilter::new(config.histogram.clone(), palette)),
        Strategy::Normal => Box::new(NormalFilter::new(config.normal.clone(), palette)),
        Strategy::Combined => Box::new(CombinedFilter::new(config)),
    }
}

pub struct SweepProcessor {
    config: PipelineConfig,
    builder: GridBuilder,
    grid: PolarGrid,
    features: FeatureTable,
    strategy: Strategy,
    filter: Box<dyn TerrainFilter>,
}

impl SweepProcessor {
    /// Validate `config` and allocate the arena.
    pub fn new(config: PipelineConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let builder = GridBuilder::new(config.grid.clone());
        let (grid, features) = builder.allocate();
        let strategy = config.active_strategy;
        let filter = make_filter(strategy, &config);

        debug!(
            "Sweep processor ready: {}x{} grid (azimuth wrap: {}), strategy {}",
            grid.rows(),
            grid.cols(),
            grid.wraps_azimuth(),
            strategy
        );

        Ok(Self {
            config,
            builder,
            grid,
            features,
            strategy,
            filter,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Switch the published strategy for subsequent sweeps.
    pub fn set_strategy(&mut self, strategy: Strategy) {
        if strategy != self.strategy {
            self.filter = make_filter(strategy, &self.config);
            self.strategy = strategy;
        }
    }

    /// Grid of the most recent sweep.
    pub fn grid(&self) -> &PolarGrid {
        &self.grid
    }

    /// Features of the most recent sweep.
    pub fn features(&self) -> &FeatureTable {
        &self.features
    }

    /// Rebuild the grid from `input` without classifying it.
    pub fn build_only(&mut self, input: &SweepInput<'_>) -> Result<BuildStats, SweepError> {
        self.builder.build(input, &mut self.grid, &mut self.features)
    }

    /// Classify one sweep.
    ///
    /// Fails with [`SweepError::GeometryUnavailable`] before touching the
    /// arena when the auxiliary clouds do not line up with the sweep. A sweep
    /// with no usable points yields an empty colored cloud.
    pub fn process(&mut self, input: &SweepInput<'_>) -> Result<ClassifiedSweep, SweepError> {
        let start = Instant::now();
        let stats = self.build_only(input)?;
        let built = start.elapsed();

        if stats.malformed > 0 {
            warn!("Dropped {} malformed points", stats.malformed);
        }
        if stats.occupied_cells == 0 {
            warn!(
                "Sweep of {} points produced no occupied cells",
                stats.input_points
            );
        }

        let scoring = Instant::now();
        self.filter.filtering_all_sets(&self.grid, &mut self.features);
        let scored = scoring.elapsed();

        let cloud = self.filter.color_all_sets(&self.grid, &self.features);
        let counts = self.filter.count_classes(&self.grid, &self.features);

        debug!(
            "Sweep classified by {}: {} obstacles, {} terrain (build {:.2?}, score {:.2?}, total {:.2?})",
            self.filter.name(),
            counts.obstacles,
            counts.terrain,
            built,
            scored,
            start.elapsed()
        );

        Ok(ClassifiedSweep {
            frame_id: self.config.frame_id.clone(),
            strategy: self.strategy,
            cloud,
            stats,
            counts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processors::combine::combined_score;
    use crate::processors::grid::test_support::cell_center_point;

    const ROWS: usize = 16;
    const COLS: usize = 720;

    fn full_circle_config() -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.grid.front_hemisphere_only = false;
        config
    }

    /// Constant-range sweep over every cell, with a nearer 3x3 patch.
    fn obstacle_patch_sweep(config: &PipelineConfig) -> PointCloud {
        let mut points = Vec::with_capacity(ROWS * COLS);
        for row in 0..ROWS {
            for col in 0..COLS {
                let in_patch = (4..=6).contains(&row) && (100..=102).contains(&col);
                let range = if in_patch { 2.0 } else { 5.0 };
                points.push(cell_center_point(&config.grid, row, col, range));
            }
        }
        PointCloud::from_points(&points)
    }

    #[test]
    fn test_obstacle_patch_end_to_end() {
        let config = full_circle_config();
        let sweep = obstacle_patch_sweep(&config);
        let builder = GridBuilder::new(config.grid.clone());
        let mut processor = SweepProcessor::new(config).unwrap();

        let result = processor.process(&SweepInput::new(&sweep)).unwrap();
        assert_eq!(result.stats.occupied_cells, ROWS * COLS);
        assert_eq!(result.stats.overwritten, 0);
        assert_eq!(result.cloud.len(), ROWS * COLS);
        assert_eq!(result.counts.obstacles, 9);
        assert_eq!(result.counts.terrain, ROWS * COLS - 9);

        for i in 0..result.cloud.len() {
            let cell = builder.locate(result.cloud.point(i)).unwrap();
            let in_patch = (4..=6).contains(&cell.row) && (100..=102).contains(&cell.col);
            let expected = if in_patch { [255, 0, 0] } else { [0, 255, 0] };
            assert_eq!(result.cloud.color(i), Some(expected), "cell {:?}", cell);
        }
    }

    #[test]
    fn test_rear_points_excluded_by_default() {
        let config = PipelineConfig::default();
        let sweep = obstacle_patch_sweep(&config);
        let mut processor = SweepProcessor::new(config).unwrap();

        let result = processor.process(&SweepInput::new(&sweep)).unwrap();
        assert!(result.stats.behind_sensor > 0);
        assert!(result.cloud.len() < ROWS * COLS);
        for i in 0..result.cloud.len() {
            assert!(result.cloud.point(i)[0] >= 0.0);
        }
    }

    #[test]
    fn test_misaligned_reference_fails_sweep() {
        let mut processor = SweepProcessor::new(PipelineConfig::default()).unwrap();
        let sweep = PointCloud::from_points(&[[4.0, 0.0, 0.0], [4.0, 0.1, 0.0]]);
        let reference = PointCloud::from_points(&[[4.0, 0.0, 0.0]]);

        let result = processor.process(&SweepInput::new(&sweep).with_ranges(&reference));
        assert!(matches!(result, Err(SweepError::GeometryUnavailable { .. })));
    }

    #[test]
    fn test_empty_sweep_yields_empty_colored_cloud() {
        let mut processor = SweepProcessor::new(PipelineConfig::default()).unwrap();
        let sweep = PointCloud::from_points(&[[-1.0, 0.0, 0.0], [50.0, 0.0, 0.0]]);

        let result = processor.process(&SweepInput::new(&sweep)).unwrap();
        assert!(result.cloud.is_empty());
        assert_eq!(result.cloud.colors, Some(Vec::new()));
        assert_eq!(result.counts, ClassCounts::default());
        assert_eq!(result.frame_id, "base_link");
    }

    #[test]
    fn test_point_at_sensor_origin_is_not_emitted() {
        let mut processor = SweepProcessor::new(PipelineConfig::default()).unwrap();
        let sweep = PointCloud::from_points(&[[0.0, 0.0, 0.0]]);

        let result = processor.process(&SweepInput::new(&sweep)).unwrap();
        assert_eq!(result.stats.malformed, 1);
        assert_eq!(result.stats.occupied_cells, 0);
        assert!(result.cloud.is_empty());
        assert_eq!(result.counts, ClassCounts::default());
    }

    #[test]
    fn test_invalid_config_rejected_before_any_sweep() {
        let mut config = PipelineConfig::default();
        config.grid.azimuth_bin_count = 0;
        assert!(matches!(SweepProcessor::new(config), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_combined_strategy_writes_sum() {
        let mut config = full_circle_config();
        config.active_strategy = Strategy::Combined;
        let sweep = obstacle_patch_sweep(&config);
        let mut processor = SweepProcessor::new(config).unwrap();

        let result = processor.process(&SweepInput::new(&sweep)).unwrap();
        assert_eq!(result.strategy, Strategy::Combined);
        assert_eq!(result.cloud.len(), ROWS * COLS);

        let combine = &processor.config().combine;
        let patch = processor.features().get(5, 101);
        assert_eq!(patch.continuity_prob, 1.0);
        assert!((patch.sum - combined_score(patch, combine)).abs() < 1e-6);
        assert!(patch.sum > 0.0);
    }

    #[test]
    fn test_combined_strategy_marks_only_obstacle_patch() {
        let mut config = full_circle_config();
        config.active_strategy = Strategy::Combined;
        let sweep = obstacle_patch_sweep(&config);
        let builder = GridBuilder::new(config.grid.clone());
        let mut processor = SweepProcessor::new(config).unwrap();

        let result = processor.process(&SweepInput::new(&sweep)).unwrap();
        assert_eq!(result.counts.obstacles, 9);
        for i in 0..result.cloud.len() {
            if result.cloud.color(i) == Some([255, 0, 0]) {
                let cell = builder.locate(result.cloud.point(i)).unwrap();
                assert!((4..=6).contains(&cell.row) && (100..=102).contains(&cell.col), "cell {:?}", cell);
            }
        }
    }

    #[test]
    fn test_set_strategy_switches_published_channel() {
        let config = full_circle_config();
        let sweep = obstacle_patch_sweep(&config);
        let mut processor = SweepProcessor::new(config).unwrap();

        processor.set_strategy(Strategy::CrossSection);
        let result = processor.process(&SweepInput::new(&sweep)).unwrap();
        assert_eq!(result.strategy, Strategy::CrossSection);
        // Constant range up a column is a vertical surface.
        assert!(result.counts.obstacles > 9);
    }
}
