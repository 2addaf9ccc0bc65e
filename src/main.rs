mod host;
mod settings;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use mls_config::Config;
use mls_core::logging::{
    default_log_file_path, filter_directive, prepare_log_file, DEFAULT_MAX_LOG_FILES,
    DEFAULT_MAX_LOG_SIZE,
};
use mls_core::{DefaultPaths, PlatformPaths};
use mls_lsp::{FileWatcher, WatchEvent, MARKER_FILE_NAME};
use mls_supervisor::{
    Collaborators, Command, ExtensionLayout, LspLauncher, SettingsSource, Supervisor,
    TokioCommandRunner,
};

use crate::host::TerminalHost;
use crate::settings::FileSettings;

/// Supervise the Multi Language Server from a terminal.
#[derive(Debug, Parser)]
#[command(name = "mls", version, about)]
struct Cli {
    /// Directory containing `server/python_server/main.py`.
    #[arg(long, env = "MLS_EXTENSION_ROOT", default_value = ".")]
    extension_root: PathBuf,

    /// Workspace root; defaults to the current directory.
    #[arg(long)]
    workspace: Option<PathBuf>,

    /// Directory holding the global `config.toml`.
    #[arg(long, env = "MLS_CONFIG_DIR")]
    config_dir: Option<PathBuf>,

    /// Log level, overriding `[log] level`.
    #[arg(long)]
    log_level: Option<String>,
}

const HELP: &str = "commands: restart | output | open <path> | quit";

fn init_logging(paths: &DefaultPaths, config: &Config, level_override: Option<&str>) -> Result<PathBuf> {
    let log_path = config
        .log
        .file
        .clone()
        .unwrap_or_else(|| default_log_file_path(paths));
    prepare_log_file(&log_path, DEFAULT_MAX_LOG_SIZE, DEFAULT_MAX_LOG_FILES)
        .with_context(|| format!("failed to prepare log file {}", log_path.display()))?;
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("failed to open log file {}", log_path.display()))?;

    let level = level_override.unwrap_or(config.log.level.as_str());
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(level)));

    // Stdout belongs to the command loop, so tracing goes to the file.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::sync::Mutex::new(log_file))
        .with_ansi(false)
        .init();
    Ok(log_path)
}

/// Handle one line from the terminal. Returns `false` to quit.
async fn handle_line(supervisor: &Supervisor, line: &str) -> bool {
    let line = line.trim();
    let (word, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    match word {
        "" => {}
        "quit" | "exit" => return false,
        "help" => println!("{HELP}"),
        "open" => open_document(supervisor, Path::new(rest.trim())).await,
        other => match other.parse::<Command>() {
            Ok(command) => {
                let outcome = command.execute(supervisor).await;
                info!(?outcome, "command finished");
                println!("{command}: {outcome:?} (state: {})", supervisor.state());
            }
            Err(e) => println!("{e}; {HELP}"),
        },
    }
    true
}

async fn open_document(supervisor: &Supervisor, path: &Path) {
    if path.as_os_str().is_empty() {
        println!("usage: open <path>");
        return;
    }
    let text = match tokio::fs::read_to_string(path).await {
        Ok(text) => text,
        Err(e) => {
            println!("cannot read {}: {e}", path.display());
            return;
        }
    };
    match supervisor.open_document(path, &text).await {
        Ok(true) => println!("opened {}", path.display()),
        Ok(false) => println!("{} is not handled by the language server", path.display()),
        Err(e) => {
            warn!("didOpen failed: {e}");
            println!("could not open {}: {e}", path.display());
        }
    }
}

async fn handle_watch_event(supervisor: &Supervisor, event: WatchEvent) {
    let result = match &event {
        WatchEvent::Marker { path, change } => supervisor.watched_file_changed(path, *change).await,
        WatchEvent::Config { path } => {
            info!(path = %path.display(), "settings file changed");
            supervisor.configuration_changed().await
        }
    };
    if let Err(e) = result {
        warn!(?event, "could not forward change: {e}");
    }
}

async fn serve(
    layout: ExtensionLayout,
    workspace: PathBuf,
    settings: Arc<FileSettings>,
) -> Result<()> {
    let host = Arc::new(TerminalHost::new());
    let (line_tx, mut line_rx) = mpsc::channel(32);
    host.spawn_stdin_reader(line_tx);

    let supervisor = Supervisor::new(
        Collaborators {
            host: host.clone(),
            launcher: Arc::new(LspLauncher),
            runner: Arc::new(TokioCommandRunner),
            settings: settings.clone(),
        },
        layout,
        Some(workspace.clone()),
    );

    let (watch_tx, mut watch_rx) = mpsc::channel(64);
    let _watcher = match FileWatcher::spawn(&workspace, MARKER_FILE_NAME, settings.files(), watch_tx) {
        Ok(watcher) => Some(watcher),
        Err(e) => {
            warn!("file watch disabled: {e}");
            None
        }
    };

    let activation = tokio::spawn({
        let supervisor = supervisor.clone();
        async move { supervisor.activate().await }
    });
    println!("{HELP}");

    loop {
        tokio::select! {
            line = line_rx.recv() => match line {
                Some(line) => {
                    if !handle_line(&supervisor, &line).await {
                        break;
                    }
                }
                None => break,
            },
            Some(event) = watch_rx.recv() => handle_watch_event(&supervisor, event).await,
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
        }
    }

    host.cancel_prompt();
    supervisor.deactivate().await;
    match activation.await {
        Ok(outcome) => info!(?outcome, "activation finished"),
        Err(e) => error!("activation task failed: {e}"),
    }
    info!("shutdown complete");
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    let paths = DefaultPaths::new().context("failed to detect platform paths")?;
    let config_dir = cli.config_dir.unwrap_or_else(|| paths.config_dir());
    let workspace = match cli.workspace {
        Some(dir) => dir,
        None => std::env::current_dir().context("failed to read current directory")?,
    };

    let settings = Arc::new(FileSettings::new(config_dir, workspace.clone()));
    let initial = settings.load().config;
    let log_path = init_logging(&paths, &initial, cli.log_level.as_deref())?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        workspace = %workspace.display(),
        extension_root = %cli.extension_root.display(),
        log = %log_path.display(),
        "mls starting"
    );

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start the async runtime")?;
    runtime.block_on(serve(ExtensionLayout::new(cli.extension_root), workspace, settings))
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("mls: {:#}", e);
        std::process::exit(1);
    }
}
