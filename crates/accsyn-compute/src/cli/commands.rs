//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand};

use crate::job::COMPUTE_JOB_TYPE;

/// List command arguments.
#[derive(Debug, Args)]
pub struct ListCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Describe command arguments.
#[derive(Debug, Args)]
pub struct DescribeCommand {
    /// Engine name, e.g. nuke-13
    pub engine: String,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Probe command arguments.
#[derive(Debug, Args)]
pub struct ProbeCommand {
    /// Engine name
    pub engine: String,
}

/// Run command arguments.
#[derive(Debug, Args)]
pub struct RunCommand {
    /// Engine name
    pub engine: String,

    /// Path to the compute data JSON file
    pub data: PathBuf,

    /// Item to compute: all, a frame, a frame range or a URI
    #[arg(short, long, env = "ACCSYN_ITEM")]
    pub item: Option<String>,
}

/// Job command arguments.
#[derive(Debug, Args)]
pub struct JobCommand {
    /// Path to the job document JSON file
    pub file: PathBuf,

    /// Job type
    #[arg(short = 't', long, default_value = COMPUTE_JOB_TYPE)]
    pub job_type: String,

    /// Directory to write task data to
    #[arg(short, long, value_name = "DIR")]
    pub work_dir: Option<PathBuf>,

    /// Print the job report as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}
