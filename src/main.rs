use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use color_eyre::Result;
use color_eyre::eyre::eyre;
use treewatch::config::{self, load_config, load_config_from_path};
use treewatch::format::parse_duration;
use treewatch::launch::Workload;
use treewatch::logging;
use treewatch::report::{render_json, render_text, render_tick_rows};
use treewatch::sampler::{ChildSource, Sampler, SamplerOptions, Sources, StopReason};
use treewatch::stop::stop_channel;
use treewatch::summary::SortMode;
use treewatch::system::procfs::ProcFs;

#[derive(Parser)]
#[command(
    name = "treewatch",
    about = "Runs a command and reports CPU and memory usage of its whole process tree",
    after_help = "Example: treewatch -v -d 30s -- ./mem-stresser --workers 4"
)]
struct Cli {
    /// Path to config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Sample an already running process instead of starting one
    #[arg(long, conflicts_with = "command")]
    pid: Option<u32>,

    /// How long to sample, e.g. 30, 30s, 5m, 1h
    #[arg(short, long)]
    duration: Option<String>,

    /// Seconds between samples
    #[arg(long)]
    interval: Option<u64>,

    /// Print current usage after every sample
    #[arg(short, long)]
    verbose: bool,

    /// Report format: text, json
    #[arg(long)]
    format: Option<String>,

    /// Report order: pid, cpu, memory, name
    #[arg(long)]
    sort: Option<String>,

    /// Child lookup: sysinfo, procfs
    #[arg(long)]
    children: Option<String>,

    /// Mount point of procfs
    #[arg(long)]
    proc_root: Option<PathBuf>,

    /// Leave the process tree running when sampling stops
    #[arg(long)]
    no_terminate: bool,

    /// Let the workload write to this terminal
    #[arg(long)]
    inherit_stdio: bool,

    /// Default log filter when RUST_LOG is unset
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Log as JSON lines
    #[arg(long, default_value_t = false)]
    log_json: bool,

    /// Command to run and monitor
    #[arg(
        trailing_var_arg = true,
        allow_hyphen_values = true,
        required_unless_present = "pid"
    )]
    command: Vec<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    logging::init(&cli.log_level, cli.log_json)?;
    let config = load_config_for_cli(&cli);

    let duration = parse_duration(&config.general.duration).ok_or_else(|| {
        eyre!(
            "invalid duration {:?}; use whole seconds such as 30, 30s, 5m or 1h",
            config.general.duration
        )
    })?;
    let interval_secs = config.general.interval_secs;
    if interval_secs == 0 {
        return Err(eyre!("--interval must be at least 1 second"));
    }

    let mut workload = match cli.pid {
        Some(pid) => Workload::Attached(pid),
        None => Workload::spawn(&cli.command, cli.inherit_stdio)?,
    };

    let (trigger, mut stop) = stop_channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, stopping");
            trigger.stop();
        }
    });

    let sources = Sources::from_procfs(
        ProcFs::new(&config.general.proc_root),
        ChildSource::from_str_config(&config.general.child_source),
    );
    let options = SamplerOptions {
        interval: Duration::from_secs(interval_secs),
        terminate_on_stop: config.general.should_terminate(cli.pid.is_some()),
    };
    let mut sampler = Sampler::new(workload.pid(), sources, options);

    let verbose = config.general.verbose;
    sampler
        .run(duration, &mut stop, |tick| {
            if verbose {
                print!("{}", render_tick_rows(&tick.samples));
            }
        })
        .await;

    let report = sampler
        .finish()
        .sorted(SortMode::from_str_config(&config.report.sort));
    workload.reap(Duration::from_secs(2)).await;

    match config.report.format.to_lowercase().as_str() {
        "json" => println!("{}", render_json(&report, interval_secs)?),
        _ => print!("{}", render_text(&report, interval_secs)),
    }

    if let StopReason::Aborted(cause) = &report.reason {
        return Err(eyre!("sampling aborted: {cause}"));
    }
    Ok(())
}

fn load_config_for_cli(cli: &Cli) -> config::Config {
    let mut config = match &cli.config {
        Some(path) => load_config_from_path(path),
        None => load_config(),
    };

    if let Some(ref duration) = cli.duration {
        config.general.duration = duration.clone();
    }
    if let Some(interval) = cli.interval {
        config.general.interval_secs = interval;
    }
    if cli.verbose {
        config.general.verbose = true;
    }
    if let Some(ref format) = cli.format {
        config.report.format = format.clone();
    }
    if let Some(ref sort) = cli.sort {
        config.report.sort = sort.clone();
    }
    if let Some(ref children) = cli.children {
        config.general.child_source = children.clone();
    }
    if let Some(ref root) = cli.proc_root {
        config.general.proc_root = root.clone();
    }
    if cli.no_terminate {
        config.general.terminate_on_stop = Some(false);
    }

    config
}
