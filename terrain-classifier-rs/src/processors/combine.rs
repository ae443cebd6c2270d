//! Aggregate score over all per-strategy probabilities.

use crate::config::{ColorConfig, CombineConfig, CombineMethod, PipelineConfig};

use super::continuity::ContinuityFilter;
use super::cross_section::CrossSectionFilter;
use super::grid::{Feature, FeatureTable, PolarGrid};
use super::histogram::HistogramFilter;
use super::normal::NormalFilter;
use super::TerrainFilter;

/// Fold the probability channels of one cell into a single score.
///
/// `WeightedSum` is normalized by the total weight so the result stays in
/// [0, 1]; `Max` takes the largest probability among strategies with a
/// positive weight. All-zero weights yield 0.
pub fn combined_score(feature: &Feature, config: &CombineConfig) -> f32 {
    let w = &config.weights;
    let channels = [
        (w.continuity, feature.continuity_prob),
        (w.cross_section, feature.cross_section_prob),
        (w.histogram, feature.histogram_prob),
        (w.normal, feature.normal_prob),
    ];

    match config.method {
        CombineMethod::WeightedSum => {
            let total: f32 = channels.iter().map(|(weight, _)| weight).sum();
            if total <= 0.0 {
                return 0.0;
            }
            let weighted: f32 = channels.iter().map(|(weight, prob)| weight * prob).sum();
            (weighted / total).clamp(0.0, 1.0)
        }
        CombineMethod::Max => channels
            .iter()
            .filter(|(weight, _)| *weight > 0.0)
            .map(|(_, prob)| *prob)
            .fold(0.0, f32::max),
    }
}

/// Write [`combined_score`] into the `sum` channel of every cell.
pub fn combine(features: &mut FeatureTable, config: &CombineConfig) {
    for feature in features.iter_mut() {
        feature.sum = combined_score(feature, config);
    }
}

/// Runs every single-channel filter, then combines their scores.
pub struct CombinedFilter {
    filters: Vec<Box<dyn TerrainFilter>>,
    config: CombineConfig,
    palette: ColorConfig,
}

impl CombinedFilter {
    pub fn new(config: &PipelineConfig) -> Self {
        let palette = config.colors.clone();
        let filters: Vec<Box<dyn TerrainFilter>> = vec![
            Box::new(ContinuityFilter::new(config.continuity.clone(), palette.clone())),
            Box::new(CrossSectionFilter::new(config.cross_section.clone(), palette.clone())),
            Box::new(HistogramFilter::new(config.histogram.clone(), palette.clone())),
            Box::new(NormalFilter::new(config.normal.clone(), palette.clone())),
        ];
        Self {
            filters,
            config: config.combine.clone(),
            palette,
        }
    }
}

impl TerrainFilter for CombinedFilter {
    fn name(&self) -> &'static str {
        "combined"
    }

    fn filtering_all_sets(&self, grid: &PolarGrid, features: &mut FeatureTable) {
        for filter in &self.filters {
            filter.filtering_all_sets(grid, features);
        }
        combine(features, &self.config);
    }

    fn score(&self, feature: &Feature) -> f32 {
        feature.sum
    }

    fn obstacle_threshold(&self) -> f32 {
        self.config.obstacle_threshold
    }

    fn palette(&self) -> &ColorConfig {
        &self.palette
    }
}
