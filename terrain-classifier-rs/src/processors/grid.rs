//! Polar grid construction.
//!
//! A sweep is reorganized into a fixed `rows x cols` grid keyed by
//! (scan-line, azimuth bin). The grid and its parallel [`FeatureTable`] are
//! allocated once and cleared per sweep; each cell holds at most one point,
//! the last one that fell into it.

use log::debug;
use thiserror::Error;

use crate::config::GridConfig;
use crate::core::loaders::PointCloud;

/// Errors that abort a whole sweep.
#[derive(Debug, Error)]
pub enum SweepError {
    #[error("Geometry unavailable: {reason}")]
    GeometryUnavailable { reason: String },
}

/// Per-cell features, populated incrementally by the filters.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Feature {
    /// Planar distance from the sensor origin (0 for empty cells)
    pub radius: f32,
    /// Scan-line discontinuity score
    pub continuity_prob: f32,
    /// Vertical profile score
    pub cross_section_prob: f32,
    /// Local range-distribution spread score
    pub histogram_prob: f32,
    /// Surface normal tilt score
    pub normal_prob: f32,
    /// Combined score
    pub sum: f32,
}

/// Selects one scalar channel of a [`Feature`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureChannel {
    Radius,
    Continuity,
    CrossSection,
    Histogram,
    Normal,
    Sum,
}

impl Feature {
    pub fn channel(&self, channel: FeatureChannel) -> f32 {
        match channel {
            FeatureChannel::Radius => self.radius,
            FeatureChannel::Continuity => self.continuity_prob,
            FeatureChannel::CrossSection => self.cross_section_prob,
            FeatureChannel::Histogram => self.histogram_prob,
            FeatureChannel::Normal => self.normal_prob,
            FeatureChannel::Sum => self.sum,
        }
    }
}

/// Fixed-size grid of points indexed by (scan-line, azimuth bin).
#[derive(Debug, Clone)]
pub struct PolarGrid {
    rows: usize,
    cols: usize,
    wraps_azimuth: bool,
    cells: Vec<Option<[f32; 3]>>,
}

impl PolarGrid {
    /// Allocate an empty grid. `wraps_azimuth` makes column neighbors wrap
    /// around the 0/360 degree seam.
    pub fn new(rows: usize, cols: usize, wraps_azimuth: bool) -> Self {
        Self {
            rows,
            cols,
            wraps_azimuth,
            cells: vec![None; rows * cols],
        }
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn wraps_azimuth(&self) -> bool {
        self.wraps_azimuth
    }

    /// Empty every cell without releasing the arena.
    pub fn clear(&mut self) {
        self.cells.fill(None);
    }

    #[inline]
    fn index(&self, row: usize, col: usize) -> usize {
        debug_assert!(row < self.rows && col < self.cols);
        row * self.cols + col
    }

    /// Point stored at (row, col), if any.
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> Option<[f32; 3]> {
        self.cells[self.index(row, col)]
    }

    #[inline]
    pub fn is_occupied(&self, row: usize, col: usize) -> bool {
        self.get(row, col).is_some()
    }

    /// Store a point, returning true if it replaced an earlier one.
    pub fn set(&mut self, row: usize, col: usize, point: [f32; 3]) -> bool {
        let idx = self.index(row, col);
        self.cells[idx].replace(point).is_some()
    }

    /// Column reached by moving `offset` bins from `col`.
    ///
    /// Wraps at the azimuth seam when the grid spans the full circle,
    /// otherwise returns `None` past either edge.
    #[inline]
    pub fn neighbor_col(&self, col: usize, offset: isize) -> Option<usize> {
        let target = col as isize + offset;
        if self.wraps_azimuth {
            Some(target.rem_euclid(self.cols as isize) as usize)
        } else if (0..self.cols as isize).contains(&target) {
            Some(target as usize)
        } else {
            None
        }
    }

    /// Occupied cells in row-major order as `(row, col, point)`.
    pub fn occupied(&self) -> impl Iterator<Item = (usize, usize, [f32; 3])> + '_ {
        let cols = self.cols;
        self.cells
            .iter()
            .enumerate()
            .filter_map(move |(idx, cell)| cell.map(|p| (idx / cols, idx % cols, p)))
    }

    pub fn occupied_count(&self) -> usize {
        self.cells.iter().filter(|cell| cell.is_some()).count()
    }

    /// Occupied cells per scan-line.
    pub fn row_occupancy(&self) -> Vec<usize> {
        self.cells
            .chunks(self.cols)
            .map(|row| row.iter().filter(|cell| cell.is_some()).count())
            .collect()
    }
}

/// Features laid out in parallel with a [`PolarGrid`].
#[derive(Debug, Clone)]
pub struct FeatureTable {
    rows: usize,
    cols: usize,
    cells: Vec<Feature>,
}

impl FeatureTable {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            cells: vec![Feature::default(); rows * cols],
        }
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Reset every feature to zero.
    pub fn clear(&mut self) {
        self.cells.fill(Feature::default());
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> &Feature {
        &self.cells[row * self.cols + col]
    }

    #[inline]
    pub fn get_mut(&mut self, row: usize, col: usize) -> &mut Feature {
        &mut self.cells[row * self.cols + col]
    }

    /// Features in row-major order as `(row, col, feature)`.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, &Feature)> + '_ {
        let cols = self.cols;
        self.cells
            .iter()
            .enumerate()
            .map(move |(idx, f)| (idx / cols, idx % cols, f))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Feature> + '_ {
        self.cells.iter_mut()
    }
}

/// Radius of (row, col) when the cell holds a point with a usable range.
///
/// Every neighbor comparison goes through here so that empty cells never
/// take part in scoring.
#[inline]
pub fn occupied_radius(
    grid: &PolarGrid,
    features: &FeatureTable,
    row: usize,
    col: usize,
) -> Option<f32> {
    if !grid.is_occupied(row, col) {
        return None;
    }
    let radius = features.get(row, col).radius;
    (radius > 0.0).then_some(radius)
}

/// Why a point did not make it into the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Non-finite coordinates, or a zero planar range (the empty-cell sentinel)
    Malformed,
    /// x < 0 with the front-hemisphere model enabled
    BehindSensor,
    /// Planar range beyond `max_range`
    OutOfRange,
    /// Angles outside the grid
    OutOfGrid,
}

/// Grid cell a point maps to, plus its planar range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellAssignment {
    pub row: usize,
    pub col: usize,
    pub range: f32,
}

/// Point accounting for one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildStats {
    pub input_points: usize,
    /// Points written to the grid, overwrites included
    pub assigned: usize,
    /// Writes that replaced an earlier point in the same cell
    pub overwritten: usize,
    pub malformed: usize,
    pub behind_sensor: usize,
    pub out_of_range: usize,
    pub out_of_grid: usize,
    /// Distinct occupied cells after the sweep
    pub occupied_cells: usize,
}

impl BuildStats {
    fn record(&mut self, rejection: Rejection) {
        match rejection {
            Rejection::Malformed => self.malformed += 1,
            Rejection::BehindSensor => self.behind_sensor += 1,
            Rejection::OutOfRange => self.out_of_range += 1,
            Rejection::OutOfGrid => self.out_of_grid += 1,
        }
    }

    /// Points that were dropped for any reason.
    pub fn dropped(&self) -> usize {
        self.malformed + self.behind_sensor + self.out_of_range + self.out_of_grid
    }
}

/// Point sources for one sweep.
///
/// `points` decides which cell each point falls into. The stored position
/// and the range used for scoring default to the same cloud but can each
/// come from a second, index-aligned cloud (for example the same sweep
/// transformed into the vehicle frame).
#[derive(Debug, Clone, Copy)]
pub struct SweepInput<'a> {
    pub points: &'a PointCloud,
    pub positions: Option<&'a PointCloud>,
    pub ranges: Option<&'a PointCloud>,
}

impl<'a> SweepInput<'a> {
    pub fn new(points: &'a PointCloud) -> Self {
        Self {
            points,
            positions: None,
            ranges: None,
        }
    }

    /// Take stored positions from `positions`.
    pub fn with_positions(mut self, positions: &'a PointCloud) -> Self {
        self.positions = Some(positions);
        self
    }

    /// Take scoring ranges from `ranges`.
    pub fn with_ranges(mut self, ranges: &'a PointCloud) -> Self {
        self.ranges = Some(ranges);
        self
    }

    fn check_alignment(&self) -> Result<(), SweepError> {
        for (role, cloud) in [("position", self.positions), ("range", self.ranges)] {
            if let Some(cloud) = cloud {
                if cloud.len() != self.points.len() {
                    return Err(SweepError::GeometryUnavailable {
                        reason: format!(
                            "{} cloud has {} points, sweep has {}",
                            role,
                            cloud.len(),
                            self.points.len()
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}

#[inline]
fn is_finite_point(p: [f32; 3]) -> bool {
    p.iter().all(|v| v.is_finite())
}

#[inline]
fn planar_range(p: [f32; 3]) -> f32 {
    (p[0] * p[0] + p[1] * p[1]).sqrt()
}

/// Maps points to grid cells according to a [`GridConfig`].
#[derive(Debug, Clone)]
pub struct GridBuilder {
    config: GridConfig,
}

impl GridBuilder {
    pub fn new(config: GridConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    /// True when the azimuth bins cover exactly one revolution.
    pub fn spans_full_circle(&self) -> bool {
        let span = self.config.azimuth_bin_count as f64 * self.config.horizontal_resolution_deg;
        (span - 360.0).abs() < 1e-6
    }

    /// Allocate a matching grid / feature table pair.
    pub fn allocate(&self) -> (PolarGrid, FeatureTable) {
        let rows = self.config.vertical_channel_count;
        let cols = self.config.azimuth_bin_count;
        (
            PolarGrid::new(rows, cols, self.spans_full_circle()),
            FeatureTable::new(rows, cols),
        )
    }

    /// Compute the cell a point falls into.
    pub fn locate(&self, point: [f32; 3]) -> Result<CellAssignment, Rejection> {
        if !is_finite_point(point) {
            return Err(Rejection::Malformed);
        }

        let [x, y, z] = point;
        if self.config.front_hemisphere_only && x < 0.0 {
            return Err(Rejection::BehindSensor);
        }

        let range = planar_range(point);
        if range > self.config.max_range {
            return Err(Rejection::OutOfRange);
        }

        let angle_v = (z as f64).atan2(range as f64).to_degrees() + self.config.sensor_tilt_offset_deg;
        let mut angle_h = (y as f64).atan2(x as f64).to_degrees() + 180.0;
        if angle_h >= 360.0 {
            angle_h -= 360.0;
        }

        // Scan-lines sit on multiples of the vertical resolution; snap to the
        // nearest one so calibration noise below a line does not drop a row.
        let steps = angle_v / self.config.vertical_resolution_deg;
        let mut row = steps.floor();
        if steps - row > 0.5 {
            row += 1.0;
        }
        let col = (angle_h / self.config.horizontal_resolution_deg).floor();

        if row < 0.0
            || col < 0.0
            || row >= self.config.vertical_channel_count as f64
            || col >= self.config.azimuth_bin_count as f64
        {
            return Err(Rejection::OutOfGrid);
        }

        Ok(CellAssignment {
            row: row as usize,
            col: col as usize,
            range,
        })
    }

    /// Rebuild `grid` and `features` from one sweep.
    ///
    /// Both tables are cleared first. Later points overwrite earlier ones in
    /// the same cell. Malformed or out-of-bounds points are skipped and
    /// counted; misaligned auxiliary clouds fail the sweep before anything is
    /// written.
    pub fn build(
        &self,
        input: &SweepInput<'_>,
        grid: &mut PolarGrid,
        features: &mut FeatureTable,
    ) -> Result<BuildStats, SweepError> {
        input.check_alignment()?;

        if grid.rows() != features.rows() || grid.cols() != features.cols() {
            return Err(SweepError::GeometryUnavailable {
                reason: format!(
                    "grid is {}x{} but feature table is {}x{}",
                    grid.rows(),
                    grid.cols(),
                    features.rows(),
                    features.cols()
                ),
            });
        }

        grid.clear();
        features.clear();

        let mut stats = BuildStats {
            input_points: input.points.len(),
            ..BuildStats::default()
        };

        for i in 0..input.points.len() {
            let cell = match self.locate(input.points.point(i)) {
                Ok(cell) => cell,
                Err(rejection) => {
                    stats.record(rejection);
                    continue;
                }
            };

            let position = input.positions.map_or(input.points.point(i), |c| c.point(i));
            let radius = match input.ranges {
                Some(cloud) => planar_range(cloud.point(i)),
                None => cell.range,
            };
            if !is_finite_point(position) || !radius.is_finite() || radius <= 0.0 {
                stats.record(Rejection::Malformed);
                continue;
            }

            if cell.row >= grid.rows() || cell.col >= grid.cols() {
                stats.record(Rejection::OutOfGrid);
                continue;
            }

            if grid.set(cell.row, cell.col, position) {
                stats.overwritten += 1;
            }
            features.get_mut(cell.row, cell.col).radius = radius;
            stats.assigned += 1;
        }

        stats.occupied_cells = grid.occupied_count();
        debug!(
            "Grid built: {} points -> {} cells ({} overwritten, {} dropped: {} malformed, {} behind, {} out of range, {} off grid)",
            stats.input_points,
            stats.occupied_cells,
            stats.overwritten,
            stats.dropped(),
            stats.malformed,
            stats.behind_sensor,
            stats.out_of_range,
            stats.out_of_grid
        );

        Ok(stats)
    }
}
