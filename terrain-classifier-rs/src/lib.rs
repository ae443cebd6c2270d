//! Obstacle / terrain classification of 3D sensor sweeps.
//!
//! This crate provides tools for:
//! - Loading sweeps from ASCII PLY and x/y/z CSV files
//! - Reorganizing a sweep into a polar grid keyed by (scan-line, azimuth bin)
//! - Scoring grid cells with continuity, cross-section, histogram and
//!   surface-normal strategies, alone or combined
//! - Writing the colored result (red obstacles, green terrain) as PLY
//!
//! # Example
//!
//! ```no_run
//! use terrain_classifier::core::loaders::load_sweep;
//! use terrain_classifier::processors::{SweepInput, SweepProcessor};
//! use terrain_classifier::PipelineConfig;
//!
//! let sweep = load_sweep("sweep_0001.ply").unwrap();
//! let mut processor = SweepProcessor::new(PipelineConfig::default()).unwrap();
//! let classified = processor.process(&SweepInput::new(&sweep)).unwrap();
//! println!("{} obstacle cells", classified.counts.obstacles);
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod processors;
pub mod visualization;

pub use config::{ConfigError, PipelineConfig, Strategy};
pub use core::loaders::PointCloud;
pub use processors::{ClassifiedSweep, SweepError, SweepInput, SweepProcessor};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
