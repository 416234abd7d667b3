//! dualsensitive-agent CLI
//!
//! Command-line front end for running the adaptive-trigger agent in solo,
//! server, or client mode, and for poking individual trigger profiles by
//! hand while testing.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use dualsensitive_agent::agent::{Agent, AgentMode, DEFAULT_PORT};
use dualsensitive_agent::config::AgentConfig;
use dualsensitive_agent::device::HidBackend;
use dualsensitive_agent::output::Side;
use dualsensitive_agent::trigger::TriggerProfile;

/// DualSense adaptive-trigger agent
#[derive(Parser)]
#[command(name = "dualsensitive-agent")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Optional JSON configuration file (see `AgentConfig`)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Run standalone, owning the device directly
    Solo,

    /// Run as the privileged device owner for bound clients
    Server {
        #[arg(short, long, default_value_t = DEFAULT_PORT)]
        port: u16,
    },

    /// Forward trigger requests to a running server
    Client {
        #[arg(short, long, default_value_t = DEFAULT_PORT)]
        port: u16,

        /// Trigger profile to send once, then exit
        #[arg(long, value_enum)]
        profile: Option<CliProfile>,

        #[arg(long, default_value = "right")]
        side: CliSide,
    },
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum CliSide {
    Left,
    Right,
}

impl From<CliSide> for Side {
    fn from(s: CliSide) -> Self {
        match s {
            CliSide::Left => Side::Left,
            CliSide::Right => Side::Right,
        }
    }
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum CliProfile {
    Normal,
    GameCube,
    Soft,
    Hard,
    Rigid,
}

impl From<CliProfile> for TriggerProfile {
    fn from(p: CliProfile) -> Self {
        match p {
            CliProfile::Normal => TriggerProfile::Normal,
            CliProfile::GameCube => TriggerProfile::GameCube,
            CliProfile::Soft => TriggerProfile::Soft,
            CliProfile::Hard => TriggerProfile::Hard,
            CliProfile::Rigid => TriggerProfile::Rigid,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(format!("dualsensitive_agent={}", log_level).parse().unwrap()),
        )
        .with_target(false)
        .init();

    let config = match &cli.config {
        Some(path) => AgentConfig::load(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => AgentConfig::default(),
    };

    match cli.command {
        Commands::Solo => run_solo(),
        Commands::Server { port } => run_server(port.max(config.port)),
        Commands::Client { port, profile, side } => run_client(port, profile, side),
    }
}

fn install_ctrlc_handler() -> Arc<AtomicBool> {
    let running = Arc::new(AtomicBool::new(true));
    let handler_flag = Arc::clone(&running);
    ctrlc::set_handler(move || {
        handler_flag.store(false, Ordering::SeqCst);
    })
    .expect("failed to install Ctrl-C handler");
    running
}

fn run_solo() -> Result<()> {
    let mut agent = Agent::new();
    agent
        .init(AgentMode::Solo, Box::new(HidBackend), 0)
        .context("failed to initialise solo agent")?;
    println!("{}", "Agent running in solo mode. Press Ctrl-C to exit.".green());

    let running = install_ctrlc_handler();
    while running.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(200));
    }

    agent.terminate().context("failed to terminate agent cleanly")?;
    info!("solo agent shut down");
    Ok(())
}

fn run_server(port: u16) -> Result<()> {
    let mut agent = Agent::new();
    agent
        .init(AgentMode::Server, Box::new(HidBackend), port)
        .context("failed to initialise server agent")?;
    println!(
        "{}",
        format!("Agent running in server mode on port {port}. Press Ctrl-C to exit.").green()
    );

    let running = install_ctrlc_handler();
    while running.load(Ordering::SeqCst) && !agent.should_terminate() {
        std::thread::sleep(Duration::from_millis(200));
    }
    if agent.should_terminate() {
        info!("bound client disappeared; shutting down");
    }

    agent.terminate().context("failed to terminate agent cleanly")?;
    info!("server agent shut down");
    Ok(())
}

fn run_client(port: u16, profile: Option<CliProfile>, side: CliSide) -> Result<()> {
    let mut agent = Agent::new();
    agent
        .init(AgentMode::Client, Box::new(HidBackend), port)
        .context("failed to initialise client agent")?;

    let pid = std::process::id();
    agent
        .send_pid_to_server(pid)
        .context("failed to bind to server")?;

    if let Some(profile) = profile {
        let result = match side.into() {
            Side::Left => agent.set_left_trigger(profile.into(), vec![]),
            Side::Right => agent.set_right_trigger(profile.into(), vec![]),
        };
        result.context("failed to send trigger profile")?;
        println!("{}", "Trigger profile sent.".green());
    } else {
        error!("no --profile given; nothing to send");
    }

    agent.terminate().ok();
    Ok(())
}
