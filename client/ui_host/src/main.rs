mod console;
mod logging;

use crate::console::{Command, ConsoleHost, parse_command, resolve_page};
use crate::logging::{LogConfig, LogLevel};
use anyhow::Context;
use clap::Parser;
use remote_ui_host_runtime::{ClientConfig, RemoteUiClient, TcpConnector, render_round};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process;
use tracing::{info, warn};

const DEFAULT_CONFIG: &str = "config.toml";
/// Server-driven reruns allowed back to back before waiting for input.
const MAX_CHAINED_RERUNS: u32 = 8;

type ConsoleClient = RemoteUiClient<TcpConnector, ConsoleHost<io::Stdout>>;

#[derive(Debug, Parser)]
#[command(name = "ui_host", about = "Terminal host for server-driven UIs")]
struct Cli {
    /// Configuration file. A missing default file means built-in defaults.
    #[arg(long, env = "REMOTE_UI_CONFIG")]
    config: Option<PathBuf>,

    /// Application name sent with every request; overrides the config.
    #[arg(long, env = "REMOTE_UI_APP")]
    app: Option<String>,

    /// Write logs to `<dir>/app.log` instead of stderr.
    #[arg(long, env = "REMOTE_UI_LOG_DIR")]
    log_dir: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = LogLevel::Warn)]
    log_level: LogLevel,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("ui_host fatal error: {err:#}");
        process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(&LogConfig {
        level: cli.log_level,
        dir: cli.log_dir.clone(),
    })?;

    let mut config = load_config(cli.config.as_deref())?;
    if let Some(app) = cli.app {
        config.app = Some(app);
    }
    info!(address = %config.address(), app = ?config.app, "starting ui host");

    let mut host = ConsoleHost::stdout();
    let mut client = connect(&config, &mut host)?;
    host.notice("type 'help' for commands");

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    let mut chained = 0;

    loop {
        host.begin_round();
        render_round(&mut client, &mut host);
        host.finish_round();

        if client.is_terminated() {
            info!(session = client.session().short_id(), "session terminated; starting a new one");
            client = connect(&config, &mut host)?;
        }

        if host.take_rerun() {
            chained += 1;
            if chained <= MAX_CHAINED_RERUNS {
                continue;
            }
            warn!("server keeps requesting reruns; waiting for input");
        }
        chained = 0;

        print!("> ");
        io::stdout().flush()?;
        let Some(line) = lines.next() else {
            break;
        };

        match parse_command(&line?) {
            Ok(Command::Quit) => break,
            Ok(Command::Page(name)) => {
                let page = resolve_page(client.pages(), name);
                if let Err(err) = host.execute(Command::Page(page)) {
                    host.notice(&err.to_string());
                }
            }
            Ok(command) => {
                if let Err(err) = host.execute(command) {
                    host.notice(&err.to_string());
                }
            }
            Err(err) => host.notice(&err.to_string()),
        }
    }

    client.disconnect();
    info!("ui host stopped");
    Ok(())
}

fn connect(config: &ClientConfig, host: &mut ConsoleHost<io::Stdout>) -> anyhow::Result<ConsoleClient> {
    RemoteUiClient::connect(config, host)
        .with_context(|| format!("failed to connect to {}", config.address()))
}

fn load_config(path: Option<&Path>) -> anyhow::Result<ClientConfig> {
    match path {
        Some(path) => ClientConfig::load(path).with_context(|| format!("failed to load {}", path.display())),
        None if Path::new(DEFAULT_CONFIG).exists() => {
            ClientConfig::load(Path::new(DEFAULT_CONFIG)).context("failed to load default config")
        }
        None => {
            info!("no {DEFAULT_CONFIG} found; using defaults");
            Ok(ClientConfig::default())
        }
    }
}
