//! Grid construction, classification filters and output compositing.

pub mod combine;
pub mod compositor;
pub mod continuity;
pub mod cross_section;
pub mod grid;
pub mod histogram;
pub mod normal;
pub mod pipeline;

use crate::config::ColorConfig;
use crate::core::loaders::PointCloud;

use self::grid::{Feature, FeatureTable, PolarGrid};

// Re-export key types for convenience
pub use combine::{combine, combined_score, CombinedFilter};
pub use compositor::{compose, tally, ClassCounts, Classification};
pub use continuity::ContinuityFilter;
pub use cross_section::CrossSectionFilter;
pub use grid::{
    BuildStats, FeatureChannel, GridBuilder, Rejection, SweepError, SweepInput,
};
pub use histogram::HistogramFilter;
pub use normal::NormalFilter;
pub use pipeline::{ClassifiedSweep, SweepProcessor};

/// A classification strategy over the polar grid.
///
/// `filtering_all_sets` writes the strategy's own feature channel and leaves
/// the others alone; `color_all_sets` turns that channel into a colored cloud.
pub trait TerrainFilter: Send + Sync {
    /// Short strategy name used in logs.
    fn name(&self) -> &'static str;

    /// Score every occupied cell.
    fn filtering_all_sets(&self, grid: &PolarGrid, features: &mut FeatureTable);

    /// The score this strategy classifies by.
    fn score(&self, feature: &Feature) -> f32;

    /// Scores strictly above this are obstacles.
    fn obstacle_threshold(&self) -> f32;

    /// Output palette.
    fn palette(&self) -> &ColorConfig;

    /// Color every occupied cell by [`TerrainFilter::score`].
    fn color_all_sets(&self, grid: &PolarGrid, features: &FeatureTable) -> PointCloud {
        compose(
            grid,
            features,
            self.palette(),
            self.obstacle_threshold(),
            |feature| self.score(feature),
        )
    }

    /// Obstacle / terrain counts matching [`TerrainFilter::color_all_sets`].
    fn count_classes(&self, grid: &PolarGrid, features: &FeatureTable) -> ClassCounts {
        tally(grid, features, self.obstacle_threshold(), |feature| self.score(feature))
    }
}
