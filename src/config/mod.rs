pub mod pipeline;

pub use pipeline::{Mode, PipelineConfig};
