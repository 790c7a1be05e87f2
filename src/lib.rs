#![deny(dead_code)]
#![deny(unused_imports)]

pub mod allocate;
pub mod archive;
pub mod augment;
pub mod binning;
pub mod config;
pub mod discretize;
pub mod faer_ndarray;
pub mod observations;
pub mod pipeline;
pub mod reduce;
pub mod source;
pub mod state;
pub mod types;
pub mod weights;

pub use config::PipelineConfig;
pub use pipeline::{ExamDropPipeline, PipelineError};
pub use state::FittedPipelineState;
