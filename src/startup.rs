use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

use probewire_config::{load_config, Config};
use probewire_core::logging;
use probewire_core::{HexInterpreter, WatchRegistry};
use probewire_engine::{DebuggerService, EngineOptions, TargetImage, TcpTransport};
use probewire_platform::{DefaultPaths, PlatformPaths};

use crate::console::{self, Console, Outcome};

pub(crate) const USAGE: &str = "usage: probewire [--config-dir DIR] [--crc HEX] [--poll] <host:port>";

/// Command-line arguments.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct Args {
    pub(crate) config_dir: Option<PathBuf>,
    pub(crate) crc: Option<String>,
    pub(crate) poll: bool,
    pub(crate) port: Option<String>,
}

impl Args {
    pub(crate) fn parse<I>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut parsed = Args::default();
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config-dir" => {
                    let dir = args.next().context("--config-dir needs a directory")?;
                    parsed.config_dir = Some(PathBuf::from(dir));
                }
                "--crc" => parsed.crc = Some(args.next().context("--crc needs a value")?),
                "--poll" => parsed.poll = true,
                flag if flag.starts_with("--") => bail!("unknown option '{flag}'\n{USAGE}"),
                _ if parsed.port.is_some() => bail!("unexpected argument '{arg}'\n{USAGE}"),
                _ => parsed.port = Some(arg),
            }
        }
        Ok(parsed)
    }
}

/// Load configuration, install logging, and run the console to completion.
pub(crate) fn run(args: Args) -> Result<()> {
    let paths = DefaultPaths::new().context("failed to detect platform paths")?;

    let config_dir = args.config_dir.clone().unwrap_or_else(|| paths.config_dir());
    let project_dir = std::env::current_dir().ok();
    let (config, config_error) = match load_config(&config_dir, project_dir.as_deref()) {
        Ok(config) => (config, None),
        Err(e) => (Config::default(), Some(e)),
    };

    init_logging(&config, &paths);
    if let Some(e) = config_error {
        error!("config load failed, using defaults: {}", e);
    }

    let port = args
        .port
        .clone()
        .or_else(|| config.target.port.clone())
        .with_context(|| format!("no target given\n{USAGE}"))?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    runtime.block_on(run_session(args, config, port))
}

fn init_logging(config: &Config, paths: &DefaultPaths) {
    let log_path = config
        .log
        .file
        .clone()
        .unwrap_or_else(|| logging::log_file_in(&paths.log_dir()));

    logging::ensure_log_dir(&log_path).ok();
    logging::rotate_log_files(
        &log_path,
        logging::DEFAULT_MAX_LOG_SIZE,
        logging::DEFAULT_MAX_LOG_FILES,
    )
    .ok();

    let level = logging::log_level_to_filter(config.log.level.as_str());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    // Without a log file, tracing output is dropped rather than mixed into the console.
    let writer = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .map(|file| Box::new(file) as Box<dyn std::io::Write + Send>)
        .unwrap_or_else(|_| Box::new(std::io::sink()));

    tracing_subscriber::fmt()
        .with_writer(std::sync::Mutex::new(writer))
        .with_ansi(false)
        .with_env_filter(env_filter)
        .init();

    info!("probewire starting, log level: {}", level);
}

async fn run_session(args: Args, config: Config, port: String) -> Result<()> {
    let mut options = EngineOptions::from_config(&config);
    options.poll_enabled |= args.poll;

    let registry = Arc::new(tokio::sync::Mutex::new(WatchRegistry::new()));
    let service = Arc::new(DebuggerService::new(
        Arc::new(TcpTransport::new(options.connect_timeout)),
        Arc::new(HexInterpreter::new()),
        Arc::clone(&registry),
        options,
    ));

    let image = TargetImage {
        name: port.clone(),
        code_crc: args.crc.unwrap_or_default(),
    };
    service
        .start_session(image, &port)
        .await
        .with_context(|| format!("failed to open debug session on {port}"))?;
    println!("connected to {port}; type 'help' for commands");

    let printer = tokio::spawn(console::print_events(service.subscribe()));
    let console = Console::new(Arc::clone(&service), registry);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        let command = match console::parse_line(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                println!("{e:#}");
                continue;
            }
        };
        match console.execute(command).await {
            Ok(Outcome::Print(text)) => println!("{text}"),
            Ok(Outcome::Quit) => break,
            Err(e) => {
                warn!("command failed: {:#}", e);
                println!("error: {e:#}");
            }
        }
    }

    service.stop_session().await;
    printer.abort();
    info!("probewire exiting");
    Ok(())
}
