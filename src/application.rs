//! Application layer: pipeline orchestration plus the mechanical edges of a
//! run (roll number input, JSON dumps).

pub mod dump;
pub mod input;
pub mod pipeline;

pub use pipeline::{
    Pipeline, PipelineOptions, PipelineStage, RollNumberFailure, RollNumberResult,
    RollNumberTarget, RunSummary,
};
