// src/config/mod.rs
//! Configuration: the lane registry and the pipeline's tunables.

pub mod lanes;
pub mod pipeline;

pub use lanes::{CompiledLane, CompiledRegistry, LaneRegistry, LaneSpec};
pub use pipeline::PipelineConfig;
