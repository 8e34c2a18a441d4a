//! Orchestration for the GenSys terrain generator.
//!
//! The generator itself is an external executable. This crate gathers its
//! parameters, writes them to the exchange file it reads, runs it, and imports
//! the rasters it produces into a managed content store.

pub mod bootstrap;
pub mod cli;
pub mod error;
pub mod exchange;
pub mod import;
pub mod invoke;
pub mod locate;
pub mod model;
pub mod orchestrator;
pub mod params;
pub mod registry;
pub mod storage;
pub mod text_summary;

pub use error::{GensysError, Result};
pub use model::{RunConfig, RunEvent, RunOutcome, RunReport};
pub use orchestrator::Orchestrator;
pub use params::GensysParameters;
