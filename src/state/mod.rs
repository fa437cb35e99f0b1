//! Run state for the crawl engine
//!
//! # Components
//!
//! - `FrontierItem`: a discovered profile plus its discovery lineage
//! - `RunState`: shared shutdown flag, reason and phase for one run
//! - `ThresholdPolicy`: operator bounds on profile count and wall-clock time

mod frontier_item;
mod run_state;

pub use frontier_item::{FrontierItem, PATH_SEPARATOR};
pub use run_state::{RunPhase, RunState, ShutdownReason, ThresholdPolicy};
