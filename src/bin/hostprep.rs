// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use hostprep::{
    config::ProvisionConfig,
    download::Downloader,
    exec::SystemRunner,
    host::{self, target_user_name, TargetUser},
    materialize::Materializer,
    package::{apt::Apt, lock::LockWait},
    path::default_config_path,
    prompt::{stdin_is_interactive, terminal_prompter, Selector},
    runlog,
    step::Context,
    steps::{declare, plan},
};

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use std::{
    fs,
    path::{Path, PathBuf},
    process::exit,
    time::Duration,
};
use tracing::{error, info};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "hostprep [options] <hostprep-command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    fn run(self) -> Result<i32> {
        match self.command {
            Command::Run(opts) => run_provision(opts),
            Command::Config(opts) => run_config(opts),
            Command::Steps(opts) => run_steps(opts),
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Provision this host.
    #[command(override_usage = "hostprep run [options]")]
    Run(RunOptions),

    /// Print default configuration.
    #[command(override_usage = "hostprep config [options]")]
    Config(ConfigOptions),

    /// List provisioning steps without running them.
    #[command(override_usage = "hostprep steps [options]")]
    Steps(StepsOptions),
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct RunOptions {
    /// Never prompt, use configured defaults for every step.
    #[arg(short = 'y', long)]
    pub non_interactive: bool,

    /// Path to configuration file.
    #[arg(short, long, value_name = "path")]
    pub config: Option<PathBuf>,

    /// Path to append run log to.
    #[arg(long, value_name = "path")]
    pub log_file: Option<PathBuf>,

    /// Root prefix to write configuration files under.
    #[arg(long, value_name = "path", default_value = "/")]
    pub root: PathBuf,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct ConfigOptions {
    /// Write configuration to file instead of standard output.
    #[arg(short, long, value_name = "path")]
    pub output: Option<PathBuf>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct StepsOptions {
    /// Path to configuration file.
    #[arg(short, long, value_name = "path")]
    pub config: Option<PathBuf>,
}

fn main() {
    match Cli::parse().run() {
        Ok(code) => exit(code),
        Err(error) => {
            error!("{error:?}");
            exit(1);
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<ProvisionConfig> {
    let Some(path) = path.map(Path::to_path_buf).or_else(default_config_path) else {
        return Ok(ProvisionConfig::default());
    };

    let data = fs::read_to_string(&path)
        .with_context(|| format!("failed to read configuration {:?}", path.display()))?;
    let config = data
        .parse::<ProvisionConfig>()
        .with_context(|| format!("invalid configuration {:?}", path.display()))?;

    Ok(config)
}

fn run_provision(opts: RunOptions) -> Result<i32> {
    let config = load_config(opts.config.as_deref());

    // INVARIANT: Open the run log before reporting anything, even a bad config.
    let log_file = opts
        .log_file
        .clone()
        .or_else(|| config.as_ref().ok().map(|config| config.log_file.clone()));
    runlog::init(log_file.as_deref())?;

    let mut config = config?;
    config.non_interactive |= opts.non_interactive;
    info!("hostprep {} starting", env!("CARGO_PKG_VERSION"));

    let runner = SystemRunner;
    let apt = Apt::new(
        &runner,
        LockWait::apt(Duration::from_secs(config.packages.lock_timeout_secs)),
    );
    let downloader = Downloader::new(
        Duration::from_secs(config.download.timeout_secs),
        config.download.retries,
    );
    let mut ctx = Context::new(&runner, &apt, Materializer::new(opts.root))
        .with_downloader(downloader);
    ctx.user = TargetUser::lookup(&target_user_name(Some(config.user.as_str()))).ok();

    let interactive = !config.non_interactive && stdin_is_interactive();
    let mut selector = Selector::new(terminal_prompter(), interactive);
    let sequencer = plan(&config, &ctx, &mut selector)?;

    let summary = sequencer.run(&mut ctx);
    summary.log();

    Ok(summary.exit_code())
}

fn run_config(opts: ConfigOptions) -> Result<i32> {
    runlog::init(None)?;
    let config = ProvisionConfig::default().to_string();

    match opts.output {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                mkdirp::mkdirp(parent)?;
            }
            fs::write(&path, config)?;
            info!("wrote default configuration to {:?}", path.display());
        }
        None => print!("{config}"),
    }

    Ok(0)
}

fn run_steps(opts: StepsOptions) -> Result<i32> {
    runlog::init(None)?;
    let config = load_config(opts.config.as_deref())?;

    println!("{:<18} {:<9} DEFAULT", "STEP", "CRITICAL");
    for declared in declare(&config, host::is_wsl(Path::new("/"))) {
        let default = match declared.reason {
            Some(reason) => format!("off ({reason})"),
            None if declared.enabled => "on".to_string(),
            None => "off".to_string(),
        };
        let critical = if declared.critical { "yes" } else { "no" };
        println!("{:<18} {critical:<9} {default}", declared.kind.name());
    }

    Ok(0)
}
