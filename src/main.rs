use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod app;
mod audio;
mod color;
mod config;
mod controller;
mod display;
mod error;
mod ipc;
mod renderer;
#[cfg(test)]
mod testing;
mod visualizer;

use config::Config;
use visualizer::VisualStyle;

#[derive(Parser, Debug)]
#[command(name = "scopeviz")]
#[command(author, version, about = "Real-time microphone visualizer for the terminal")]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Capture device to open (see `scopeviz devices`)
    #[arg(short, long, global = true)]
    device: Option<String>,

    /// Capture sample rate in Hz
    #[arg(long, global = true)]
    sample_rate: Option<u32>,

    /// Analysis window size (power of two)
    #[arg(long, global = true)]
    fft_size: Option<usize>,

    /// Spectrum smoothing between frames (0.0-1.0)
    #[arg(long, global = true)]
    smoothing: Option<f32>,

    /// Decibel level mapped to an empty bar
    #[arg(long, global = true, allow_hyphen_values = true)]
    min_decibels: Option<f32>,

    /// Decibel level mapped to a full bar
    #[arg(long, global = true, allow_hyphen_values = true)]
    max_decibels: Option<f32>,

    /// Visualization style
    #[arg(short, long, global = true)]
    style: Option<VisualStyle>,

    /// Color scheme: spectrum, rainbow, fire, ocean, mono
    #[arg(long, global = true)]
    colors: Option<String>,

    /// Hide the center line and radial reference circle
    #[arg(long, global = true)]
    no_guides: bool,

    /// Target frames per second
    #[arg(long, global = true)]
    fps: Option<u32>,

    /// Fade trail between frames (0.0 = hard clear)
    #[arg(long, global = true)]
    trail: Option<f32>,

    /// Log frame statistics (implies debug logging)
    #[arg(long, global = true)]
    telemetry: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Open the visualizer in this terminal (default)
    Run,
    /// List capture devices and exit
    Devices,
    /// Send a control command to a running instance
    Ctl {
        /// e.g. `start`, `stop`, `style bars`, `color next`, `status`, `save`
        #[arg(required = true, trailing_var_arg = true)]
        command: Vec<String>,
    },
    /// Write the default config file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print shell completions
    Completions {
        shell: clap_complete::Shell,
    },
}

fn init_logging(log_file: Option<&Path>, default_directive: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(io::stderr)
                .init();
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut args = Args::parse();
    let command = args.command.take().unwrap_or(Command::Run);

    // Log lines on stderr would tear the full-screen shell
    let default_directive = if args.telemetry {
        "scopeviz=debug"
    } else if matches!(command, Command::Run) && args.log_file.is_none() {
        "scopeviz=warn"
    } else {
        "scopeviz=info"
    };
    init_logging(args.log_file.as_deref(), default_directive)?;

    match command {
        Command::Run => run(args).await,
        Command::Devices => {
            for device in audio::list_sources()? {
                println!("{}\t{}", device.id, device.label);
            }
            Ok(())
        }
        Command::Ctl { command } => {
            let response = ipc::send_command(&command.join(" ")).await?;
            anyhow::ensure!(!response.starts_with("err"), "{}", response);
            println!("{}", response);
            Ok(())
        }
        Command::InitConfig { force } => {
            if let Some(path) = Config::default_path() {
                anyhow::ensure!(
                    force || !path.exists(),
                    "{} already exists (use --force to overwrite)",
                    path.display()
                );
            }
            let path = Config::init_default_config()?;
            println!("Wrote {}", path.display());
            Ok(())
        }
        Command::Completions { shell } => {
            clap_complete::generate(shell, &mut Args::command(), "scopeviz", &mut io::stdout());
            Ok(())
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_from_default_path().unwrap_or_default(),
    };
    config.merge_args(&args);
    config.validate()?;

    info!(
        "Starting scopeviz: style={} colors={} fps={}",
        config.visualizer.style, config.visualizer.color_scheme, config.display.fps
    );

    let (ipc_tx, ipc_rx) = mpsc::channel(16);
    tokio::spawn(async move {
        if let Err(e) = ipc::start_server(ipc_tx).await {
            warn!("IPC server stopped: {:#}", e);
        }
    });

    let config_path = args.config.clone().or_else(Config::default_path);
    let result = display::terminal::run(config, config_path, ipc_rx).await;
    let _ = std::fs::remove_file(ipc::socket_path());
    result
}
