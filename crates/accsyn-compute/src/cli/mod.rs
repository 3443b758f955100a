//! Command-line interface for accsyn-compute.
//!
//! This module provides the CLI structure for the `accsyn-engine` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    ConfigCommand, DescribeCommand, JobCommand, ListCommand, ProbeCommand, RunCommand,
};

use crate::logging::Verbosity;

/// accsyn-engine - Run render applications on a farm node
///
/// Locates the render application for an engine, builds its command line
/// from compute data, runs it and reports progress back to the farm.
#[derive(Debug, Parser)]
#[command(name = "accsyn-engine")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Development mode; also raises logging to debug
    #[arg(long, global = true)]
    pub dev: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// List the available engines
    List(ListCommand),

    /// Show an engine's settings and default parameters
    Describe(DescribeCommand),

    /// Check that an engine's application is installed
    Probe(ProbeCommand),

    /// Compute one task
    Run(RunCommand),

    /// Run all tasks of a job document locally
    Job(JobCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> Verbosity {
        if self.quiet {
            Verbosity::Quiet
        } else {
            match self.verbose {
                0 => Verbosity::Normal,
                1 => Verbosity::Verbose,
                _ => Verbosity::Trace,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn cli(verbose: u8, quiet: bool) -> Cli {
        Cli {
            config: None,
            verbose,
            quiet,
            dev: false,
            command: Command::List(ListCommand { json: false }),
        }
    }

    #[test]
    fn test_cli_name() {
        let cli = Cli::command();
        assert_eq!(cli.get_name(), "accsyn-engine");
    }

    #[test]
    fn test_verbosity() {
        assert_eq!(cli(0, true).verbosity(), Verbosity::Quiet);
        assert_eq!(cli(0, false).verbosity(), Verbosity::Normal);
        assert_eq!(cli(1, false).verbosity(), Verbosity::Verbose);
        assert_eq!(cli(2, false).verbosity(), Verbosity::Trace);
    }

    #[test]
    fn test_cli_verify() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run() {
        let args = vec![
            "accsyn-engine",
            "run",
            "nuke-13",
            "/tmp/data.json",
            "--item",
            "1001-1005",
        ];
        let cli = Cli::try_parse_from(args).unwrap();
        match cli.command {
            Command::Run(run) => {
                assert_eq!(run.engine, "nuke-13");
                assert_eq!(run.data, PathBuf::from("/tmp/data.json"));
                assert_eq!(run.item.as_deref(), Some("1001-1005"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_job_defaults() {
        let args = vec!["accsyn-engine", "--dev", "job", "job.json"];
        let cli = Cli::try_parse_from(args).unwrap();
        assert!(cli.dev);
        match cli.command {
            Command::Job(job) => {
                assert_eq!(job.job_type, "compute");
                assert_eq!(job.work_dir, None);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_describe_json() {
        let args = vec!["accsyn-engine", "describe", "ffmpeg", "--json"];
        let cli = Cli::try_parse_from(args).unwrap();
        assert!(matches!(cli.command, Command::Describe(DescribeCommand { json: true, .. })));
    }

    #[test]
    fn test_parse_with_config() {
        let args = vec!["accsyn-engine", "-c", "/custom/compute.toml", "list"];
        let cli = Cli::try_parse_from(args).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/custom/compute.toml")));
    }

    #[test]
    fn test_parse_with_verbose() {
        let args = vec!["accsyn-engine", "-vv", "probe", "blender-3"];
        let cli = Cli::try_parse_from(args).unwrap();
        assert_eq!(cli.verbose, 2);
    }
}
