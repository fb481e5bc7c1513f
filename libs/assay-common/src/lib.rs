//! Shared data model and working-area storage for the assay grading pipeline.

pub mod codec;
pub mod config;
pub mod error;
pub mod types;
pub mod workdir;

pub use error::{PipelineError, PipelineResult};
