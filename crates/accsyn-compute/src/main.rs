//! `accsyn-engine` - CLI for accsyn-compute
//!
//! This binary is what the farm invokes on a render node to compute a task,
//! and what administrators use to inspect and probe engines.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};

use accsyn_compute::cli::{
    Cli, Command, ConfigCommand, DescribeCommand, JobCommand, ListCommand, ProbeCommand,
    RunCommand,
};
use accsyn_compute::engine::EngineDescription;
use accsyn_compute::logging::debug_from_env;
use accsyn_compute::{
    engines, init_logging, ComputeData, Config, Engine, EngineContext, Error, Item, Runner,
    Session,
};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // Load configuration first so its debug flag can raise the log level
    let config = Config::load_from(cli.config.clone());
    let debug = cli.dev
        || debug_from_env()
        || config.as_ref().is_ok_and(|c| c.debug || c.dev);
    init_logging(cli.verbosity().with_debug(debug));
    let mut config = config?;
    config.dev |= cli.dev;

    match cli.command {
        Command::List(cmd) => handle_list(&cmd),
        Command::Describe(cmd) => handle_describe(&cmd),
        Command::Probe(cmd) => Ok(handle_probe(&config, &cmd)),
        Command::Run(cmd) => handle_run(config, cmd).await,
        Command::Job(cmd) => handle_job(&config, cmd).await,
        Command::Config(cmd) => handle_config(&config, cmd),
    }
}

fn lookup(name: &str) -> Result<Box<dyn Engine>, Error> {
    engines::lookup(name).ok_or_else(|| Error::UnknownEngine(name.to_string()))
}

fn handle_list(cmd: &ListCommand) -> anyhow::Result<ExitCode> {
    let engines = engines::all();
    if cmd.json {
        let descriptions: Vec<_> = engines
            .iter()
            .map(|engine| EngineDescription::of(engine.as_ref()))
            .collect();
        println!("{}", serde_json::to_string_pretty(&descriptions)?);
    } else {
        for engine in &engines {
            let settings = engine.settings();
            println!(
                "{:<20} r{:<3} {}",
                engine.name(),
                engine.revision(),
                if settings.items { "frames" } else { "all" }
            );
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn handle_describe(cmd: &DescribeCommand) -> anyhow::Result<ExitCode> {
    let engine = lookup(&cmd.engine)?;
    let description = EngineDescription::of(engine.as_ref());
    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&description)?);
        return Ok(ExitCode::SUCCESS);
    }

    let settings = &description.settings;
    println!("{} (revision {})", description.name, description.revision);
    println!("{}", "=".repeat(description.name.len() + 13));
    println!();
    println!("  Items:              {}", settings.items);
    if let Some(range) = &settings.default_range {
        println!("  Default range:      {range}");
    }
    if let Some(size) = settings.default_bucketsize {
        println!("  Default bucketsize: {size}");
    }
    if let Some(size) = settings.max_bucketsize {
        println!("  Max bucketsize:     {size}");
    }
    if !settings.filename_extensions.is_empty() {
        println!("  Extensions:         {}", settings.filename_extensions);
    }
    if let Some(kind) = &settings.kind {
        println!("  Type:               {kind}");
    }
    for (name, profile) in &settings.profiles {
        println!("  Profile {name}: {}", profile.description);
    }
    println!();
    println!("[Default parameters]");
    println!("{}", serde_json::to_string_pretty(&description.parameters)?);
    Ok(ExitCode::SUCCESS)
}

fn handle_probe(config: &Config, cmd: &ProbeCommand) -> ExitCode {
    let engine = match lookup(&cmd.engine) {
        Ok(engine) => engine,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };
    let ctx = EngineContext::new(
        engine.as_ref(),
        ComputeData::default(),
        Item::All,
        PathBuf::from("."),
        config,
    );
    match engine.probe(&ctx) {
        Ok(exe) => {
            println!("{}: {}", engine.name(), exe.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            println!("{}: not available ({e})", engine.name());
            ExitCode::FAILURE
        }
    }
}

async fn handle_run(config: Config, cmd: RunCommand) -> anyhow::Result<ExitCode> {
    let engine = lookup(&cmd.engine)?;
    let data = ComputeData::load(&cmd.data)?;
    let item = Item::parse(cmd.item.as_deref())?;
    info!(
        "Computing {} item '{item}' from {}",
        engine.name(),
        cmd.data.display()
    );

    let ctx = EngineContext::new(engine.as_ref(), data, item, cmd.data.clone(), &config);
    match Runner::new(config).run(engine.as_ref(), &ctx).await {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(Error::ExecutionFailed { code: Some(code) }) => {
            error!("Engine exited with code {code}");
            Ok(ExitCode::from(u8::try_from(code).unwrap_or(1)))
        }
        Err(e) => Err(e.into()),
    }
}

async fn handle_job(config: &Config, cmd: JobCommand) -> anyhow::Result<ExitCode> {
    let content = std::fs::read_to_string(&cmd.file)
        .with_context(|| format!("reading job document {}", cmd.file.display()))?;
    let document: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("parsing job document {}", cmd.file.display()))?;

    let session = match cmd.work_dir {
        Some(dir) => Session::with_work_dir(config.dev, dir),
        None => Session::new(config.dev),
    };
    let job = session.create_job(&cmd.job_type, document)?;
    let report = job.run(config).await?;

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Job {} ({})", report.code, report.engine);
        for task in &report.tasks {
            let site = task.site.as_deref().unwrap_or("-");
            match &task.error {
                None => println!("  #{:<3} {:<12} {site:<10} done", task.index, task.item),
                Some(e) => println!("  #{:<3} {:<12} {site:<10} FAILED: {e}", task.index, task.item),
            }
        }
        println!(
            "{} completed, {} failed in {}s",
            report.completed(),
            report.failed(),
            (report.finished - report.started).num_seconds()
        );
    }

    Ok(if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> anyhow::Result<ExitCode> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("  Dev mode:           {}", config.dev);
                println!("  Debug:              {}", config.debug);
                println!();
                println!("[Execution]");
                println!("  PID file name:      {}", config.execution.pid_file_name);
                println!(
                    "  Hung render grace:  {}s",
                    config.execution.hung_render_grace_secs
                );
                println!("  Check mounts:       {}", config.execution.check_mounts);
                for mount in &config.execution.mounts {
                    println!("  Mount:              {}", mount.display());
                }
                println!();
                println!("[Engines]");
                if config.engines.is_empty() {
                    println!("  (no overrides)");
                }
                for (name, overrides) in &config.engines {
                    println!("  {name}:");
                    if let Some(exe) = &overrides.executable {
                        println!("    Executable:       {}", exe.display());
                    }
                    if let Some(root) = &overrides.install_root {
                        println!("    Install root:     {}", root.display());
                    }
                    if let Some(priority) = overrides.priority {
                        println!("    Priority:         {priority:?}");
                    }
                    if !overrides.envs.is_empty() {
                        println!("    Envs:             {}", overrides.envs.len());
                    }
                }
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => {
                    println!("Configuration error: {e}");
                    return Ok(ExitCode::FAILURE);
                }
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}
