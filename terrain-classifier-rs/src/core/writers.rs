//! Writers for classified sweeps.
//!
//! - ASCII PLY with per-vertex RGB, the colored output cloud
//! - CSV dump of the per-cell feature table, for offline inspection

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use thiserror::Error;

use super::loaders::PointCloud;
use crate::processors::grid::{FeatureTable, PolarGrid};

/// Color used for points of an uncolored cloud.
const DEFAULT_COLOR: [u8; 3] = [180, 180, 180];

/// Errors that can occur during write operations.
#[derive(Error, Debug)]
pub enum WriteError {
    #[error("failed to create parent directories for '{path}': {source}")]
    CreateDirectory {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to create file '{path}': {source}")]
    CreateFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write to file '{path}': {source}")]
    WriteFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV write error for '{path}': {source}")]
    CsvError {
        path: String,
        #[source]
        source: csv::Error,
    },

    /// Grid and feature table disagree on their dimensions.
    #[error("grid is {grid_rows}x{grid_cols} but feature table is {feature_rows}x{feature_cols}")]
    ShapeMismatch {
        grid_rows: usize,
        grid_cols: usize,
        feature_rows: usize,
        feature_cols: usize,
    },
}

/// Result type for write operations.
pub type Result<T> = std::result::Result<T, WriteError>;

fn ensure_parent_dirs(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| WriteError::CreateDirectory {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
    }
    Ok(())
}

fn create_buffered_writer(path: &Path) -> Result<BufWriter<File>> {
    let file = File::create(path).map_err(|e| WriteError::CreateFile {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(BufWriter::new(file))
}

/// Write a colored cloud to an ASCII PLY file.
///
/// Vertices carry `x y z red green blue`. Clouds without a color channel are
/// written in light gray. Parent directories are created as needed.
///
/// # Example
///
/// ```no_run
/// use terrain_classifier::core::loaders::PointCloud;
/// use terrain_classifier::core::writers::write_ply;
/// use std::path::Path;
///
/// let cloud = PointCloud::default();
/// write_ply(Path::new("classified.ply"), &cloud).unwrap();
/// ```
pub fn write_ply(path: &Path, cloud: &PointCloud) -> Result<()> {
    ensure_parent_dirs(path)?;
    let mut writer = create_buffered_writer(path)?;

    let io_err = |e: std::io::Error| WriteError::WriteFile {
        path: path.display().to_string(),
        source: e,
    };

    let header = format!(
        "ply\n\
         format ascii 1.0\n\
         element vertex {}\n\
         property float x\n\
         property float y\n\
         property float z\n\
         property uchar red\n\
         property uchar green\n\
         property uchar blue\n\
         end_header",
        cloud.len()
    );
    writeln!(writer, "{}", header).map_err(io_err)?;

    for i in 0..cloud.len() {
        let [x, y, z] = cloud.point(i);
        let [r, g, b] = cloud.color(i).unwrap_or(DEFAULT_COLOR);
        writeln!(writer, "{:.6} {:.6} {:.6} {} {} {}", x, y, z, r, g, b).map_err(io_err)?;
    }

    writer.flush().map_err(io_err)?;
    Ok(())
}

/// Dump every occupied cell's features as CSV.
///
/// Columns: `row,col,x,y,z,radius,continuity,cross_section,histogram,normal,sum`,
/// row-major like the colored output.
pub fn write_features_csv(path: &Path, grid: &PolarGrid, features: &FeatureTable) -> Result<()> {
    if grid.rows() != features.rows() || grid.cols() != features.cols() {
        return Err(WriteError::ShapeMismatch {
            grid_rows: grid.rows(),
            grid_cols: grid.cols(),
            feature_rows: features.rows(),
            feature_cols: features.cols(),
        });
    }

    ensure_parent_dirs(path)?;
    let mut csv_writer = csv::Writer::from_writer(create_buffered_writer(path)?);

    let csv_err = |e: csv::Error| WriteError::CsvError {
        path: path.display().to_string(),
        source: e,
    };

    csv_writer
        .write_record([
            "row",
            "col",
            "x",
            "y",
            "z",
            "radius",
            "continuity",
            "cross_section",
            "histogram",
            "normal",
            "sum",
        ])
        .map_err(csv_err)?;

    for (row, col, [x, y, z]) in grid.occupied() {
        let f = features.get(row, col);
        csv_writer
            .write_record(&[
                row.to_string(),
                col.to_string(),
                format!("{:.6}", x),
                format!("{:.6}", y),
                format!("{:.6}", z),
                format!("{:.6}", f.radius),
                format!("{:.6}", f.continuity_prob),
                format!("{:.6}", f.cross_section_prob),
                format!("{:.6}", f.histogram_prob),
                format!("{:.6}", f.normal_prob),
                format!("{:.6}", f.sum),
            ])
            .map_err(csv_err)?;
    }

    csv_writer.flush().map_err(|e| WriteError::WriteFile {
        path: path.display().to_string(),
        source: e,
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::loaders::load_ply;
    use std::fs;
    use tempfile::tempdir;

    fn classified_cloud() -> PointCloud {
        PointCloud {
            x: vec![1.0, 2.0],
            y: vec![3.0, 4.0],
            z: vec![5.0, 6.0],
            colors: Some(vec![[255, 0, 0], [0, 255, 0]]),
        }
    }

    #[test]
    fn test_write_ply_with_colors() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sweep.ply");

        write_ply(&path, &classified_cloud()).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "ply");
        assert_eq!(lines[2], "element vertex 2");
        assert_eq!(lines[9], "end_header");
        assert!(lines[10].ends_with("255 0 0"));
        assert!(lines[11].ends_with("0 255 0"));
    }

    #[test]
    fn test_write_ply_without_colors_uses_gray() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("plain.ply");
        let cloud = PointCloud::from_points(&[[1.0, 2.0, 3.0]]);

        write_ply(&path, &cloud).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.lines().nth(10).unwrap().ends_with("180 180 180"));
    }

    #[test]
    fn test_written_ply_loads_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("out").join("sweep.ply");
        let cloud = classified_cloud();

        write_ply(&path, &cloud).unwrap();
        let loaded = load_ply(&path).unwrap();

        assert_eq!(loaded, cloud);
    }

    #[test]
    fn test_empty_cloud_is_valid_ply() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.ply");
        let cloud = PointCloud {
            colors: Some(Vec::new()),
            ..PointCloud::default()
        };

        write_ply(&path, &cloud).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 10);
        assert!(content.contains("element vertex 0"));
    }

    #[test]
    fn test_write_features_csv_lists_occupied_cells() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("features.csv");

        let mut grid = PolarGrid::new(2, 4, true);
        let mut features = FeatureTable::new(2, 4);
        grid.set(1, 3, [4.0, 0.0, -1.0]);
        let f = features.get_mut(1, 3);
        f.radius = 4.0;
        f.continuity_prob = 0.25;

        write_features_csv(&path, &grid, &features).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("row,col,x,y,z,radius,continuity"));
        assert!(lines[1].starts_with("1,3,4.000000,0.000000,-1.000000,4.000000,0.250000"));
    }

    #[test]
    fn test_write_features_csv_shape_mismatch() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("features.csv");
        let grid = PolarGrid::new(2, 4, true);
        let features = FeatureTable::new(3, 4);

        let result = write_features_csv(&path, &grid, &features);
        assert!(matches!(result, Err(WriteError::ShapeMismatch { feature_rows: 3, .. })));
        assert!(!path.exists());
    }
}
