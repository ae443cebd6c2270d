//! Core data types and I/O operations.

pub mod loaders;
pub mod transforms;
pub mod writers;

pub use loaders::{find_sweep_files, load_sweep, PointCloud};
pub use transforms::MountTransform;
pub use writers::{write_features_csv, write_ply, WriteError};
