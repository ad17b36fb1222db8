//! Marker heatmap command line application
//!
//! Argument handling, progress display and output persistence around the
//! `markheat-cv` analysis pipeline.

pub mod cli;
pub mod progress;
pub mod report;

pub use cli::Args;
pub use progress::ProgressReporter;
pub use report::Reporter;
