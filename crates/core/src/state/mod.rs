//! # Output State
//!
//! Persisted stage artifacts and the file layout of the results directory.

pub mod io;
pub mod sink;

pub use sink::{FileOutputSink, OutputSink, StageArtifact};
#[cfg(test)]
pub use sink::MemoryOutputSink;
