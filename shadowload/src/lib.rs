#![doc = include_str!("../README.md")]

pub mod catalog;
pub mod evaluator;
pub mod executor;
pub mod recorder;
pub mod scheduler;

mod error;
mod progress;
mod run;

pub use error::RunError;
pub use run::{summarize, LoadTest};
pub use shadowload_core as core;

pub mod prelude {
    pub use crate::catalog::{RouteCatalog, RouteParams};
    pub use crate::executor::{RouteExecutor, RouteTable};
    pub use crate::recorder::{MetricRecorder, MetricSnapshot, RequestOutcome};
    pub use crate::{LoadTest, RunError};

    pub use shadowload_core::{
        parse_thresholds, Route, RouteWeights, RunConfig, RunReport, SuccessPolicy, ThresholdSpec,
        Verdict,
    };
}
