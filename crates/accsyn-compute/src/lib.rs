//! `accsyn-compute` - Render farm compute engines
//!
//! This library provides the node side of a render farm: engines that know
//! how to find and drive a render application, and a runner that executes
//! them for one task and reports progress back to the farm.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod arguments;
pub mod cli;
pub mod config;
pub mod data;
pub mod engine;
pub mod engines;
pub mod error;
pub mod item;
pub mod job;
pub mod logging;
pub mod paths;
pub mod platform;
pub mod report;
pub mod runner;

pub use config::Config;
pub use data::ComputeData;
pub use engine::{CommandLine, Engine, EngineContext, EngineSettings, OutputEvent};
pub use error::{Error, Result};
pub use item::{FrameRange, Item};
pub use job::{Job, JobReport, Session};
pub use logging::init_logging;
pub use paths::PathNormalizer;
pub use platform::{Os, Priority};
pub use report::TaskReport;
pub use runner::Runner;
