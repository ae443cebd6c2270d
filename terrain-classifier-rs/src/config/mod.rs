//! Configuration types for the terrain classifier.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Unknown strategy '{0}' (expected continuity, cross_section, histogram, normal or combined)")]
    UnknownStrategy(String),
}

/// Geometry of the polar grid and the sensor that feeds it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridConfig {
    /// Number of scan-lines (grid rows)
    #[serde(default = "default_vertical_channel_count")]
    pub vertical_channel_count: usize,

    /// Number of azimuth bins (grid columns)
    #[serde(default = "default_azimuth_bin_count")]
    pub azimuth_bin_count: usize,

    /// Angular spacing between scan-lines in degrees
    #[serde(default = "default_vertical_resolution")]
    pub vertical_resolution_deg: f64,

    /// Azimuth step in degrees
    #[serde(default = "default_horizontal_resolution")]
    pub horizontal_resolution_deg: f64,

    /// Downward tilt of the lowest scan-line in degrees
    #[serde(default = "default_tilt_offset")]
    pub sensor_tilt_offset_deg: f64,

    /// Points with a larger planar range are dropped
    #[serde(default = "default_max_range")]
    pub max_range: f32,

    /// Drop points behind the forward reference plane (x < 0)
    #[serde(default = "default_true")]
    pub front_hemisphere_only: bool,
}

fn default_vertical_channel_count() -> usize {
    16
}

fn default_azimuth_bin_count() -> usize {
    720
}

fn default_vertical_resolution() -> f64 {
    2.0
}

fn default_horizontal_resolution() -> f64 {
    0.5
}

fn default_tilt_offset() -> f64 {
    15.0
}

fn default_max_range() -> f32 {
    20.0
}

fn default_true() -> bool {
    true
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            vertical_channel_count: default_vertical_channel_count(),
            azimuth_bin_count: default_azimuth_bin_count(),
            vertical_resolution_deg: default_vertical_resolution(),
            horizontal_resolution_deg: default_horizontal_resolution(),
            sensor_tilt_offset_deg: default_tilt_offset(),
            max_range: default_max_range(),
            front_hemisphere_only: true,
        }
    }
}

/// Parameters of the scan-line continuity filter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContinuityConfig {
    /// Range gap (distance units) at which the continuity score saturates at 1.0
    #[serde(default = "default_continuity_threshold")]
    pub continuity_threshold: f32,

    /// Columns compared on each side of a cell
    #[serde(default = "default_continuity_window")]
    pub neighbor_window: usize,

    /// Also compare against the same columns on the adjacent scan-lines
    #[serde(default)]
    pub compare_adjacent_rows: bool,

    /// Cells scoring above this are obstacles
    #[serde(default = "default_obstacle_threshold")]
    pub obstacle_threshold: f32,
}

fn default_continuity_threshold() -> f32 {
    1.0
}

fn default_continuity_window() -> usize {
    2
}

fn default_obstacle_threshold() -> f32 {
    0.5
}

impl Default for ContinuityConfig {
    fn default() -> Self {
        Self {
            continuity_threshold: default_continuity_threshold(),
            neighbor_window: default_continuity_window(),
            compare_adjacent_rows: false,
            obstacle_threshold: default_obstacle_threshold(),
        }
    }
}

/// Slope band shared by the cross-section and normal filters.
///
/// Slopes at or below `traversable_slope_deg` score 0, slopes at or above
/// `wall_slope_deg` score 1, linear in between.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlopeConfig {
    #[serde(default = "default_traversable_slope")]
    pub traversable_slope_deg: f32,

    #[serde(default = "default_wall_slope")]
    pub wall_slope_deg: f32,

    #[serde(default = "default_obstacle_threshold")]
    pub obstacle_threshold: f32,
}

fn default_traversable_slope() -> f32 {
    20.0
}

fn default_wall_slope() -> f32 {
    60.0
}

impl Default for SlopeConfig {
    fn default() -> Self {
        Self {
            traversable_slope_deg: default_traversable_slope(),
            wall_slope_deg: default_wall_slope(),
            obstacle_threshold: default_obstacle_threshold(),
        }
    }
}

/// Parameters of the range histogram filter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistogramConfig {
    /// Width of one range bucket
    #[serde(default = "default_bin_width")]
    pub bin_width: f32,

    /// Columns gathered on each side of a cell
    #[serde(default = "default_histogram_window")]
    pub neighbor_window: usize,

    /// Neighborhoods with fewer occupied cells score 0
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,

    /// Fraction of samples outside the dominant buckets that saturates the score
    #[serde(default = "default_max_spread")]
    pub max_spread: f32,

    #[serde(default = "default_obstacle_threshold")]
    pub obstacle_threshold: f32,
}

fn default_bin_width() -> f32 {
    0.1
}

fn default_histogram_window() -> usize {
    3
}

fn default_min_samples() -> usize {
    3
}

fn default_max_spread() -> f32 {
    0.5
}

impl Default for HistogramConfig {
    fn default() -> Self {
        Self {
            bin_width: default_bin_width(),
            neighbor_window: default_histogram_window(),
            min_samples: default_min_samples(),
            max_spread: default_max_spread(),
            obstacle_threshold: default_obstacle_threshold(),
        }
    }
}

/// How per-strategy probabilities are folded into the aggregate score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombineMethod {
    WeightedSum,
    Max,
}

/// Per-strategy weights for [`CombineMethod::WeightedSum`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyWeights {
    #[serde(default = "default_continuity_weight")]
    pub continuity: f32,
    #[serde(default = "default_minor_weight")]
    pub cross_section: f32,
    #[serde(default = "default_minor_weight")]
    pub histogram: f32,
    #[serde(default = "default_minor_weight")]
    pub normal: f32,
}

// Continuity alone must clear the default threshold; the three slope and
// spread channels together must not.
fn default_continuity_weight() -> f32 {
    0.55
}

fn default_minor_weight() -> f32 {
    0.15
}

impl Default for StrategyWeights {
    fn default() -> Self {
        Self {
            continuity: default_continuity_weight(),
            cross_section: default_minor_weight(),
            histogram: default_minor_weight(),
            normal: default_minor_weight(),
        }
    }
}

/// Configuration of the combined strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombineConfig {
    #[serde(default = "default_combine_method")]
    pub method: CombineMethod,

    #[serde(default)]
    pub weights: StrategyWeights,

    #[serde(default = "default_obstacle_threshold")]
    pub obstacle_threshold: f32,
}

fn default_combine_method() -> CombineMethod {
    CombineMethod::WeightedSum
}

impl Default for CombineConfig {
    fn default() -> Self {
        Self {
            method: default_combine_method(),
            weights: StrategyWeights::default(),
            obstacle_threshold: default_obstacle_threshold(),
        }
    }
}

/// Output palette.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColorConfig {
    #[serde(default = "default_obstacle_color")]
    pub obstacle: [u8; 3],

    /// Color of perfectly smooth terrain
    #[serde(default = "default_terrain_color")]
    pub terrain: [u8; 3],

    /// Brightness factor applied to terrain right below the obstacle threshold
    #[serde(default = "default_min_terrain_brightness")]
    pub min_terrain_brightness: f32,
}

fn default_obstacle_color() -> [u8; 3] {
    [255, 0, 0]
}

fn default_terrain_color() -> [u8; 3] {
    [0, 255, 0]
}

fn default_min_terrain_brightness() -> f32 {
    0.35
}

impl Default for ColorConfig {
    fn default() -> Self {
        Self {
            obstacle: default_obstacle_color(),
            terrain: default_terrain_color(),
            min_terrain_brightness: default_min_terrain_brightness(),
        }
    }
}

/// Rigid mounting of the sensor on the vehicle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MountConfig {
    /// Sensor origin in the vehicle frame
    #[serde(default)]
    pub translation: [f32; 3],

    #[serde(default)]
    pub roll_deg: f32,

    #[serde(default)]
    pub pitch_deg: f32,

    #[serde(default)]
    pub yaw_deg: f32,
}

/// Classification strategy whose output is published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Continuity,
    CrossSection,
    Histogram,
    Normal,
    Combined,
}

impl Strategy {
    pub const ALL: [Strategy; 5] = [
        Strategy::Continuity,
        Strategy::CrossSection,
        Strategy::Histogram,
        Strategy::Normal,
        Strategy::Combined,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Continuity => "continuity",
            Strategy::CrossSection => "cross_section",
            Strategy::Histogram => "histogram",
            Strategy::Normal => "normal",
            Strategy::Combined => "combined",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        Strategy::ALL
            .into_iter()
            .find(|strategy| strategy.as_str() == wanted)
            .ok_or_else(|| ConfigError::UnknownStrategy(s.to_string()))
    }
}

fn default_strategy() -> Strategy {
    Strategy::Continuity
}

fn default_frame_id() -> String {
    "base_link".to_string()
}

/// Main pipeline configuration combining all sub-configs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub grid: GridConfig,

    #[serde(default)]
    pub continuity: ContinuityConfig,

    #[serde(default)]
    pub cross_section: SlopeConfig,

    #[serde(default)]
    pub histogram: HistogramConfig,

    #[serde(default = "default_normal_config")]
    pub normal: SlopeConfig,

    #[serde(default)]
    pub combine: CombineConfig,

    #[serde(default)]
    pub colors: ColorConfig,

    #[serde(default = "default_strategy")]
    pub active_strategy: Strategy,

    /// Frame tag attached to classified sweeps
    #[serde(default = "default_frame_id")]
    pub frame_id: String,

    /// Sensor mount used to derive the reference cloud when none is supplied
    #[serde(default)]
    pub mount: Option<MountConfig>,
}

fn default_normal_config() -> SlopeConfig {
    SlopeConfig {
        traversable_slope_deg: 25.0,
        ..SlopeConfig::default()
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            grid: GridConfig::default(),
            continuity: ContinuityConfig::default(),
            cross_section: SlopeConfig::default(),
            histogram: HistogramConfig::default(),
            normal: default_normal_config(),
            combine: CombineConfig::default(),
            colors: ColorConfig::default(),
            active_strategy: default_strategy(),
            frame_id: default_frame_id(),
            mount: None,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a YAML file and validate it.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Parse configuration from YAML text and validate it.
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a YAML file.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject settings that would make grid indexing or scoring meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let grid = &self.grid;
        if grid.vertical_channel_count == 0 || grid.azimuth_bin_count == 0 {
            return Err(ConfigError::Invalid(
                "grid dimensions must be non-zero".to_string(),
            ));
        }
        if !(grid.vertical_resolution_deg > 0.0) || !(grid.horizontal_resolution_deg > 0.0) {
            return Err(ConfigError::Invalid(
                "angular resolutions must be positive".to_string(),
            ));
        }
        if !(grid.max_range > 0.0) {
            return Err(ConfigError::Invalid("max_range must be positive".to_string()));
        }

        // A window reaching half way around would compare a cell with itself after wrapping.
        let half_ring = grid.azimuth_bin_count / 2;
        for (name, window) in [
            ("continuity", self.continuity.neighbor_window),
            ("histogram", self.histogram.neighbor_window),
        ] {
            if window == 0 || window >= half_ring.max(1) {
                return Err(ConfigError::Invalid(format!(
                    "{} neighbor_window must be in 1..{}",
                    name, half_ring
                )));
            }
        }

        if !(self.continuity.continuity_threshold > 0.0) {
            return Err(ConfigError::Invalid(
                "continuity_threshold must be positive".to_string(),
            ));
        }
        if !(self.histogram.bin_width > 0.0) || !(self.histogram.max_spread > 0.0) {
            return Err(ConfigError::Invalid(
                "histogram bin_width and max_spread must be positive".to_string(),
            ));
        }

        for (name, slope) in [("cross_section", &self.cross_section), ("normal", &self.normal)] {
            if slope.wall_slope_deg <= slope.traversable_slope_deg {
                return Err(ConfigError::Invalid(format!(
                    "{} wall_slope_deg must exceed traversable_slope_deg",
                    name
                )));
            }
        }

        let w = &self.combine.weights;
        if [w.continuity, w.cross_section, w.histogram, w.normal]
            .iter()
            .any(|weight| *weight < 0.0 || !weight.is_finite())
        {
            return Err(ConfigError::Invalid(
                "combine weights must be finite and non-negative".to_string(),
            ));
        }

        Ok(())
    }
}
