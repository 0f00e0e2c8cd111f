use anyhow::{Context, Result as AnyhowResult};
use clap::Parser;
use sandbox_ide::appearance::Background;
use sandbox_ide::config::Config;
use sandbox_ide::services::sandbox::LocalSandbox;
use sandbox_ide::services::tracing_setup;
use sandbox_ide::terminal::OutputEvent;
use sandbox_ide::SessionController;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

/// How often pending editor writes are checked against their deadline
const DEBOUNCE_TICK: Duration = Duration::from_millis(100);

/// Terminal front end for the sandbox IDE session core
#[derive(Parser, Debug)]
#[command(name = "sandbox-ide")]
#[command(about = "Run a project directory through the sandbox IDE session core", long_about = None)]
#[command(version)]
struct Args {
    /// Project directory; commands run with it as their working directory
    #[arg(long, value_name = "DIR", default_value = ".")]
    root: PathBuf,

    /// Path to configuration file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Background theme class, overriding the configured one (e.g. bg-three)
    #[arg(long, value_name = "CLASS", value_parser = parse_background)]
    background: Option<Background>,

    /// Path to log file for diagnostics (default: system temp dir)
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,
}

fn parse_background(name: &str) -> Result<Background, String> {
    Background::from_class_name(name).ok_or_else(|| {
        let known: Vec<&str> = Background::ALL.iter().map(|bg| bg.class_name()).collect();
        format!("unknown background '{}', expected one of: {}", name, known.join(", "))
    })
}

fn load_config(path: Option<&Path>) -> AnyhowResult<Config> {
    let config = match path {
        Some(path) => Config::load_from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::default(),
    };
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Read every file under `root` that is not ignored, keyed by its
/// `/`-separated path relative to `root`
fn collect_project_files(root: &Path) -> Vec<(String, String)> {
    let mut files = Vec::new();
    for entry in ignore::WalkBuilder::new(root).build() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("skipping unreadable entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let path = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        match std::fs::read_to_string(entry.path()) {
            Ok(content) => files.push((path, content)),
            // Binary files have no editor session
            Err(e) => tracing::debug!("skipping {}: {}", path, e),
        }
    }
    files
}

async fn run(root: PathBuf, config: Config) -> AnyhowResult<()> {
    let root = root
        .canonicalize()
        .with_context(|| format!("Project directory {} not found", root.display()))?;
    let sandbox = LocalSandbox::new(&root)
        .with_context(|| format!("Failed to open sandbox at {}", root.display()))?;
    let controller = Arc::new(SessionController::new(Arc::new(sandbox), config));

    let mut output = controller.subscribe_output();
    print!("{}", controller.terminal_output());
    let printer = tokio::spawn(async move {
        let mut stdout = std::io::stdout();
        loop {
            match output.recv().await {
                Ok(OutputEvent::Appended(chunk)) => {
                    let _ = write!(stdout, "{chunk}");
                }
                Ok(OutputEvent::Cleared) => {
                    let _ = write!(stdout, "\x1b[2J\x1b[H");
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "terminal output lagged");
                }
                Err(RecvError::Closed) => break,
            }
            let _ = stdout.flush();
        }
    });

    let mut server_state = controller.subscribe_server_state();
    let state_reporter = tokio::spawn(async move {
        while server_state.changed().await.is_ok() {
            let state = server_state.borrow_and_update().clone();
            match state.url() {
                Some(url) => eprintln!("[server {} at {}]", state.name(), url),
                None => eprintln!("[server {}]", state.name()),
            }
        }
    });

    let ticker_controller = Arc::clone(&controller);
    let ticker = tokio::spawn(async move {
        let mut interval = tokio::time::interval(DEBOUNCE_TICK);
        loop {
            interval.tick().await;
            if let Err(e) = ticker_controller.flush_due_edits().await {
                tracing::error!("debounced write failed: {}", e);
            }
        }
    });

    let files = collect_project_files(&root);
    tracing::info!(files = files.len(), root = %root.display(), "mounting project");
    controller
        .mount_project(files)
        .await
        .context("Failed to mount project")?;

    // The host terminal is line-buffered and has already echoed what was
    // typed, so each stdin line is fed as one committed line.
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(mut line) = lines.next_line().await.context("Failed to read stdin")? {
        line.push('\r');
        let effect = controller.terminal_input(&line);
        for emission in effect.emissions {
            if let Err(e) = controller.dispatch(emission).await {
                tracing::debug!("terminal command reported: {}", e);
            }
        }
    }

    controller.shutdown().await.context("Failed to shut down")?;
    ticker.abort();
    state_reporter.abort();
    printer.abort();
    tracing::info!("sandbox-ide exiting");
    Ok(())
}

fn main() -> AnyhowResult<()> {
    let args = Args::parse();

    let log_file = args
        .log_file
        .clone()
        .unwrap_or_else(|| std::env::temp_dir().join("sandbox-ide.log"));
    if let Err(e) = tracing_setup::init_global(&log_file) {
        eprintln!(
            "Warning: logging to {} is disabled: {}",
            log_file.display(),
            e
        );
    }
    tracing::info!("sandbox-ide starting");

    let mut config = load_config(args.config.as_deref())?;
    if let Some(background) = args.background {
        config.background = background;
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to create async runtime")?;
    runtime.block_on(run(args.root, config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_background_flag() {
        let args = Args::try_parse_from(["sandbox-ide", "--background", "bg-four"]).unwrap();
        assert_eq!(args.background, Some(Background::Four));

        let err = Args::try_parse_from(["sandbox-ide", "--background", "bg-six"]).unwrap_err();
        assert!(err.to_string().contains("expected one of: bg-one"));
    }
}
