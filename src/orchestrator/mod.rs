//! Generation run orchestration.
//!
//! `pipeline` owns the export → invoke → import sequence for one run;
//! `controller` serializes run requests coming from a presentation layer and
//! reports their progress back as events.

mod controller;
mod pipeline;

pub use controller::{run_controller, ControlCommand};
pub use pipeline::Orchestrator;
