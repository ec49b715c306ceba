//! Interactive console standing in for the desktop panel.

pub mod console;

use std::ops::ControlFlow;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

use crate::config::AppConfig;
use crate::process::Supervisor;
use crate::state::AppState;
use crate::store::TaskStore;
use crate::tasks::types::{Mode, TaskConfig};
use console::ConsoleSink;

#[derive(Parser, Debug)]
#[command(name = "proxy-panel", version, about = "Run and watch gost proxy tasks")]
pub struct Args {
    /// Config file (TOML). Defaults to the user config directory.
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Proxy executable, overriding the config file.
    #[arg(long)]
    pub binary: Option<PathBuf>,
    /// Task list file, overriding the config file.
    #[arg(long)]
    pub tasks_file: Option<PathBuf>,
    /// Start every stored task right away.
    #[arg(long)]
    pub autostart: bool,
    /// Print notifications as JSON lines.
    #[arg(long)]
    pub json: bool,
    /// Log filter used when RUST_LOG is not set.
    #[arg(long, default_value = "warn")]
    pub log_level: String,
}

impl Args {
    pub fn apply(&self, mut config: AppConfig) -> AppConfig {
        if let Some(binary) = &self.binary {
            config.proxy_binary = binary.clone();
        }
        if let Some(tasks_file) = &self.tasks_file {
            config.tasks_file = tasks_file.clone();
        }
        config.autostart |= self.autostart;
        config
    }
}

/// One line typed at the prompt.
#[derive(Parser, Debug)]
#[command(no_binary_name = true)]
pub struct Line {
    #[command(subcommand)]
    pub command: LineCommand,
}

#[derive(Subcommand, Debug)]
pub enum LineCommand {
    /// Add a task and start it.
    Create(CreateArgs),
    Start { id: String },
    Stop { id: String },
    Remove { id: String },
    List,
    StartAll,
    StopAll,
    /// Show recent output of one task, or of all tasks.
    Logs {
        id: Option<String>,
        #[arg(short = 'n', long, default_value_t = 50)]
        lines: usize,
    },
    #[command(alias = "quit")]
    Exit,
}

#[derive(clap::Args, Debug)]
pub struct CreateArgs {
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long, value_enum, default_value = "proxy")]
    pub mode: Mode,
    #[arg(long, default_value = "http")]
    pub local_proto: String,
    #[arg(long)]
    pub local_port: u16,
    #[arg(long)]
    pub remote_proto: Option<String>,
    #[arg(long)]
    pub remote_addr: Option<String>,
    #[arg(long)]
    pub remote_port: Option<u16>,
    #[arg(long)]
    pub target_addr: Option<String>,
    #[arg(long)]
    pub target_port: Option<u16>,
    #[arg(long)]
    pub interface: Option<String>,
    #[arg(long)]
    pub debug: bool,
}

impl From<CreateArgs> for TaskConfig {
    fn from(args: CreateArgs) -> Self {
        TaskConfig {
            name: args.name,
            mode: args.mode,
            local_proto: args.local_proto,
            local_port: args.local_port,
            remote_proto: args.remote_proto,
            remote_addr: args.remote_addr,
            remote_port: args.remote_port,
            target_addr: args.target_addr,
            target_port: args.target_port,
            interface: args.interface,
            debug: args.debug,
        }
    }
}

pub async fn run(args: Args) -> anyhow::Result<()> {
    let config = args.apply(AppConfig::load(args.config.as_deref())?);

    let console = Arc::new(ConsoleSink::new(args.json, config.log_history));
    let store = TaskStore::new(&config.tasks_file);
    let supervisor = Supervisor::new(config.proxy_binary.clone(), store, console.clone());
    let (state, owner) = AppState::spawn(supervisor, config.shutdown_grace());

    if config.autostart {
        state.start_all();
    }
    if !args.json {
        println!(
            "proxy-panel ready, using {}. Type `help` for commands.",
            config.proxy_binary.display()
        );
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if handle_line(&line, &state, &console).is_break() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("failed to read stdin: {}", e);
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    state.shutdown();
    owner.await?;
    Ok(())
}

fn handle_line(line: &str, state: &AppState, console: &ConsoleSink) -> ControlFlow<()> {
    let Some(words) = shlex::split(line) else {
        println!("unbalanced quotes");
        return ControlFlow::Continue(());
    };
    if words.is_empty() {
        return ControlFlow::Continue(());
    }

    let line = match Line::try_parse_from(words) {
        Ok(line) => line,
        Err(e) => {
            let _ = e.print();
            return ControlFlow::Continue(());
        }
    };

    match line.command {
        LineCommand::Create(args) => state.create_task(args.into()),
        LineCommand::Start { id } => with_task(console, &id, |id| state.start_task(id)),
        LineCommand::Stop { id } => with_task(console, &id, |id| state.stop_task(id)),
        LineCommand::Remove { id } => with_task(console, &id, |id| state.remove_task(id)),
        LineCommand::List => {
            console.request_list();
            state.list_tasks();
        }
        LineCommand::StartAll => state.start_all(),
        LineCommand::StopAll => state.stop_all(),
        LineCommand::Logs { id, lines } => {
            let id = match id.as_deref().map(|id| console.resolve(id)).transpose() {
                Ok(id) => id,
                Err(e) => {
                    println!("{e}");
                    return ControlFlow::Continue(());
                }
            };
            for entry in console.history(id.as_deref(), lines) {
                println!("  {entry}");
            }
        }
        LineCommand::Exit => return ControlFlow::Break(()),
    }
    ControlFlow::Continue(())
}

fn with_task(console: &ConsoleSink, prefix: &str, action: impl FnOnce(String)) {
    match console.resolve(prefix) {
        Ok(id) => action(id),
        Err(e) => println!("{e}"),
    }
}
