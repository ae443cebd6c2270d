//! Point cloud container and sweep loaders.
//!
//! Sweeps arrive either as ASCII PLY files (x, y, z with optional
//! red/green/blue) or as CSV files with x, y, z columns. Directories of
//! numbered sweep files can be discovered in frame order for batch runs.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use csv::ReaderBuilder;
use regex::Regex;
use thiserror::Error;

/// Errors that can occur during sweep loading.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Empty file: {0}")]
    EmptyFile(PathBuf),

    #[error("Invalid PLY file: {0}")]
    InvalidPly(String),

    #[error("Missing required columns: {0}")]
    MissingColumns(String),

    #[error("Unsupported sweep format: {0}")]
    UnsupportedFormat(PathBuf),
}

/// Result type for loader operations.
pub type Result<T> = std::result::Result<T, LoaderError>;

/// Struct-of-arrays point cloud with optional per-point RGB colors.
///
/// Input sweeps carry no colors; classified sweeps carry one color per point.
#[derive(Debug, Clone, PartialEq)]
pub struct PointCloud {
    /// X coordinates of all points.
    pub x: Vec<f32>,
    /// Y coordinates of all points.
    pub y: Vec<f32>,
    /// Z coordinates of all points.
    pub z: Vec<f32>,
    /// Optional RGB colors for each point.
    pub colors: Option<Vec<[u8; 3]>>,
}

impl PointCloud {
    /// Creates a new empty point cloud.
    pub fn new() -> Self {
        Self {
            x: Vec::new(),
            y: Vec::new(),
            z: Vec::new(),
            colors: None,
        }
    }

    /// Creates a new point cloud with pre-allocated capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            x: Vec::with_capacity(capacity),
            y: Vec::with_capacity(capacity),
            z: Vec::with_capacity(capacity),
            colors: None,
        }
    }

    /// Creates a point cloud from `[x, y, z]` triples.
    pub fn from_points(points: &[[f32; 3]]) -> Self {
        let mut cloud = Self::with_capacity(points.len());
        for &[x, y, z] in points {
            cloud.push(x, y, z);
        }
        cloud
    }

    /// Returns the number of points.
    #[inline]
    pub fn len(&self) -> usize {
        self.x.len()
    }

    /// Returns true if the point cloud is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Returns the point at `index` as `[x, y, z]`.
    #[inline]
    pub fn point(&self, index: usize) -> [f32; 3] {
        [self.x[index], self.y[index], self.z[index]]
    }

    /// Returns the color at `index`, if the cloud is colored.
    #[inline]
    pub fn color(&self, index: usize) -> Option<[u8; 3]> {
        self.colors.as_ref().map(|c| c[index])
    }

    /// Adds an uncolored point.
    #[inline]
    pub fn push(&mut self, x: f32, y: f32, z: f32) {
        self.x.push(x);
        self.y.push(y);
        self.z.push(z);
    }

    /// Adds a point with color.
    pub fn push_with_color(&mut self, x: f32, y: f32, z: f32, color: [u8; 3]) {
        self.push(x, y, z);

        let capacity = self.x.capacity();
        self.colors
            .get_or_insert_with(|| Vec::with_capacity(capacity))
            .push(color);
    }
}

impl Default for PointCloud {
    fn default() -> Self {
        Self::new()
    }
}

/// Load a sweep, picking the parser from the file extension.
pub fn load_sweep<P: AsRef<Path>>(path: P) -> Result<PointCloud> {
    let path = path.as_ref();
    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase());

    match extension.as_deref() {
        Some("ply") => load_ply(path),
        Some("csv") => load_cartesian_csv(path),
        _ => Err(LoaderError::UnsupportedFormat(path.to_path_buf())),
    }
}

/// Load a point cloud from a CSV file with x, y, z columns.
///
/// Columns are looked up by (case-insensitive) name, falling back to the
/// first three columns. Cells that do not parse become NaN so the grid
/// builder can drop them as malformed instead of silently moving them to
/// the origin.
pub fn load_cartesian_csv<P: AsRef<Path>>(path: P) -> Result<PointCloud> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(BufReader::new(file));

    let headers = reader.headers()?.clone();
    let col_map: HashMap<String, usize> = headers
        .iter()
        .enumerate()
        .map(|(i, name)| (name.trim().to_lowercase(), i))
        .collect();

    let x_idx = col_map.get("x").copied().unwrap_or(0);
    let y_idx = col_map.get("y").copied().unwrap_or(1);
    let z_idx = col_map.get("z").copied().unwrap_or(2);

    // One 16-channel sweep is roughly 30k points
    let mut cloud = PointCloud::with_capacity(32 * 1024);

    for result in reader.records() {
        let record = result?;
        let field = |idx: usize| -> f32 {
            record
                .get(idx)
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(f32::NAN)
        };
        cloud.push(field(x_idx), field(y_idx), field(z_idx));
    }

    if cloud.is_empty() {
        return Err(LoaderError::EmptyFile(path.to_path_buf()));
    }

    Ok(cloud)
}

/// Load a point cloud from an ASCII PLY file.
///
/// Requires x, y, z vertex properties. Colors are kept when red, green and
/// blue are all present.
pub fn load_ply<P: AsRef<Path>>(path: P) -> Result<PointCloud> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let mut lines = BufReader::new(file).lines();

    let first_line = lines
        .next()
        .ok_or_else(|| LoaderError::InvalidPly("Empty file".to_string()))??;

    if !first_line.trim().starts_with("ply") {
        return Err(LoaderError::InvalidPly(format!(
            "{} is not a PLY file",
            path.display()
        )));
    }

    let mut num_vertices: Option<usize> = None;
    let mut prop_names: Vec<String> = Vec::new();
    let mut in_vertex = false;
    // Rows of elements declared before the vertex element come first in the body.
    let mut leading_rows = 0usize;
    let mut header_done = false;

    for line in &mut lines {
        let line = line?;
        let stripped = line.trim();

        if stripped.starts_with("format") && !stripped.contains("ascii") {
            return Err(LoaderError::InvalidPly(format!(
                "only ascii PLY is supported, got '{}'",
                stripped
            )));
        } else if stripped.starts_with("element") {
            let count = stripped
                .split_whitespace()
                .last()
                .and_then(|count| count.parse::<usize>().ok());
            in_vertex = stripped.starts_with("element vertex");
            if in_vertex {
                num_vertices = count;
            } else if num_vertices.is_none() {
                leading_rows += count.unwrap_or(0);
            }
        } else if stripped.starts_with("property") && in_vertex {
            if let Some(name) = stripped.split_whitespace().last() {
                prop_names.push(name.to_string());
            }
        } else if stripped == "end_header" {
            header_done = true;
            break;
        }
    }

    let num_vertices = num_vertices
        .ok_or_else(|| LoaderError::InvalidPly("No vertex count in header".to_string()))?;

    if !header_done {
        return Err(LoaderError::InvalidPly("Missing end_header".to_string()));
    }

    let prop_idx: HashMap<&str, usize> = prop_names
        .iter()
        .enumerate()
        .map(|(i, name)| (name.as_str(), i))
        .collect();

    let require = |name: &str| {
        prop_idx
            .get(name)
            .copied()
            .ok_or_else(|| LoaderError::MissingColumns(name.to_string()))
    };
    let (x_idx, y_idx, z_idx) = (require("x")?, require("y")?, require("z")?);

    let color_idx = match (
        prop_idx.get("red"),
        prop_idx.get("green"),
        prop_idx.get("blue"),
    ) {
        (Some(&r), Some(&g), Some(&b)) => Some((r, g, b)),
        _ => None,
    };

    let mut cloud = PointCloud::with_capacity(num_vertices);
    if color_idx.is_some() {
        cloud.colors = Some(Vec::with_capacity(num_vertices));
    }

    let mut vertex_count = 0;
    for line in lines.skip(leading_rows) {
        if vertex_count >= num_vertices {
            break;
        }

        let line = line?;
        let values: Vec<&str> = line.split_whitespace().collect();
        if values.len() < prop_names.len() {
            continue;
        }

        let coord = |idx: usize| values[idx].parse::<f32>().unwrap_or(f32::NAN);
        cloud.push(coord(x_idx), coord(y_idx), coord(z_idx));

        if let (Some((r, g, b)), Some(colors)) = (color_idx, cloud.colors.as_mut()) {
            let channel = |idx: usize| values[idx].parse::<u8>().unwrap_or(0);
            colors.push([channel(r), channel(g), channel(b)]);
        }

        vertex_count += 1;
    }

    if vertex_count < num_vertices {
        return Err(LoaderError::InvalidPly(format!(
            "Expected {} vertices, found {}",
            num_vertices, vertex_count
        )));
    }

    Ok(cloud)
}

/// Find numbered sweep files (`<name>_<frame>.ply|csv`) in frame order.
///
/// Files without a trailing frame number are ignored.
pub fn find_sweep_files(directory: &Path) -> Result<Vec<(u64, PathBuf)>> {
    let pattern = Regex::new(r"(?i)_(\d+)\.(ply|csv)$").expect("valid sweep file regex");

    let mut sweeps: Vec<(u64, PathBuf)> = fs::read_dir(directory)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter_map(|path| {
            let name = path.file_name()?.to_string_lossy().to_string();
            let frame = pattern.captures(&name)?.get(1)?.as_str().parse().ok()?;
            Some((frame, path))
        })
        .collect();

    sweeps.sort();
    Ok(sweeps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn test_point_cloud_operations() {
        let mut cloud = PointCloud::new();
        assert!(cloud.is_empty());

        cloud.push(1.0, 2.0, 3.0);
        cloud.push(4.0, 5.0, 6.0);

        assert_eq!(cloud.len(), 2);
        assert_eq!(cloud.point(1), [4.0, 5.0, 6.0]);
        assert_eq!(cloud.color(0), None);
    }

    #[test]
    fn test_point_cloud_with_colors() {
        let mut cloud = PointCloud::new();
        cloud.push_with_color(1.0, 2.0, 3.0, [255, 0, 0]);
        cloud.push_with_color(4.0, 5.0, 6.0, [0, 255, 0]);

        assert_eq!(cloud.len(), 2);
        assert_eq!(cloud.color(0), Some([255, 0, 0]));
        assert_eq!(cloud.color(1), Some([0, 255, 0]));
    }

    #[test]
    fn test_load_cartesian_csv_marks_bad_cells_nan() -> Result<()> {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "z,y,x").unwrap();
        writeln!(file, "3.0,2.0,1.0").unwrap();
        writeln!(file, "oops,5.0,4.0").unwrap();
        file.flush().unwrap();

        let cloud = load_cartesian_csv(file.path())?;
        assert_eq!(cloud.len(), 2);
        assert_eq!(cloud.point(0), [1.0, 2.0, 3.0]);
        assert!(cloud.z[1].is_nan());
        Ok(())
    }

    #[test]
    fn test_load_ply_with_colors() -> Result<()> {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "ply").unwrap();
        writeln!(file, "format ascii 1.0").unwrap();
        writeln!(file, "element vertex 2").unwrap();
        writeln!(file, "property float x").unwrap();
        writeln!(file, "property float y").unwrap();
        writeln!(file, "property float z").unwrap();
        writeln!(file, "property uchar red").unwrap();
        writeln!(file, "property uchar green").unwrap();
        writeln!(file, "property uchar blue").unwrap();
        writeln!(file, "end_header").unwrap();
        writeln!(file, "1.0 2.0 3.0 255 0 0").unwrap();
        writeln!(file, "4.0 5.0 6.0 0 255 0").unwrap();
        file.flush().unwrap();

        let cloud = load_ply(file.path())?;
        assert_eq!(cloud.len(), 2);
        assert_eq!(cloud.y[1], 5.0);
        assert_eq!(cloud.color(0), Some([255, 0, 0]));
        Ok(())
    }

    #[test]
    fn test_load_ply_without_colors() -> Result<()> {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "ply\nformat ascii 1.0\nelement vertex 1").unwrap();
        writeln!(file, "property float x\nproperty float y\nproperty float z").unwrap();
        writeln!(file, "end_header\n0.5 0.25 -1.0").unwrap();
        file.flush().unwrap();

        let cloud = load_ply(file.path())?;
        assert_eq!(cloud.point(0), [0.5, 0.25, -1.0]);
        assert!(cloud.colors.is_none());
        Ok(())
    }

    #[test]
    fn test_load_ply_ignores_other_elements() -> Result<()> {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "ply\nformat ascii 1.0").unwrap();
        writeln!(file, "element origin 1\nproperty float ox").unwrap();
        writeln!(file, "element vertex 3").unwrap();
        writeln!(file, "property float x\nproperty float y\nproperty float z").unwrap();
        writeln!(file, "element face 1").unwrap();
        writeln!(file, "property list uchar int vertex_indices").unwrap();
        writeln!(file, "end_header").unwrap();
        writeln!(file, "9.5").unwrap();
        writeln!(file, "1.0 0.0 0.0\n0.0 1.0 0.0\n0.0 0.0 1.0").unwrap();
        writeln!(file, "3 0 1 2").unwrap();
        file.flush().unwrap();

        let cloud = load_ply(file.path())?;
        assert_eq!(cloud.len(), 3);
        assert_eq!(cloud.point(0), [1.0, 0.0, 0.0]);
        assert_eq!(cloud.point(2), [0.0, 0.0, 1.0]);
        Ok(())
    }

    #[test]
    fn test_load_ply_rejects_binary() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "ply\nformat binary_little_endian 1.0\nelement vertex 0\nend_header").unwrap();
        file.flush().unwrap();

        assert!(matches!(load_ply(file.path()), Err(LoaderError::InvalidPly(_))));
    }

    #[test]
    fn test_load_sweep_unsupported_extension() {
        let file = tempfile::Builder::new().suffix(".pcd").tempfile().unwrap();
        assert!(matches!(
            load_sweep(file.path()),
            Err(LoaderError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_find_sweep_files_in_frame_order() -> Result<()> {
        let dir = TempDir::new().unwrap();
        for name in ["sweep_10.ply", "sweep_2.csv", "sweep_0001.PLY", "notes.txt", "sweep.ply"] {
            File::create(dir.path().join(name))?;
        }

        let sweeps = find_sweep_files(dir.path())?;
        let frames: Vec<u64> = sweeps.iter().map(|(frame, _)| *frame).collect();
        assert_eq!(frames, vec![1, 2, 10]);
        Ok(())
    }
}
