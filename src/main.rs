//! termconf
//!
//! Inspect, validate and watch the layered configuration, and produce
//! encrypted values for it.

use anyhow::{Result, bail};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use termconf::cli::secrets::{encrypt, keygen};
use termconf::cli::{Cli, Command, ShowArgs};
use termconf::config::{
    LiveConfig, LoadOptions, LogFormat, Loader, ResolvedConfig, WatchEvent, WatchEventKind,
    WatchOptions, Watcher,
};
use termconf::error::ConfigError;
use termconf::logging::{LogLevel, LogLevelFilter, TracingLogger, init_tracing};
use termconf::paths::display_path;
use termconf::secrets::KeychainManager;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let keychain = Arc::new(KeychainManager::platform().with_env_prefix(cli.env_prefix.clone()));
    let loader = Loader::new(Arc::clone(&keychain));

    match cli.command {
        Some(Command::Encrypt(ref args)) => {
            init_tracing(&cli.log, cli.bootstrap_log_level(), false)?;
            let (tagged, guidance) = encrypt(loader.encryptor(), args)?;
            println!("{}", tagged);
            eprintln!("{}", guidance);
        }
        Some(Command::Keygen(ref args)) => {
            init_tracing(&cli.log, cli.bootstrap_log_level(), false)?;
            let (export, guidance) = keygen(&keychain, args)?;
            println!("{}", export);
            eprintln!("{}", guidance);
        }
        Some(Command::Validate) => {
            let options = cli.load_options().strict(true);
            match loader.load(&options) {
                Ok(resolved) => {
                    init_logging(&cli, &resolved)?;
                    println!("{}: configuration is valid", resolved.config.loaded_from);
                }
                Err(ConfigError::Invalid(findings)) => {
                    for finding in &findings {
                        println!("{}", finding);
                    }
                    bail!("configuration has {} problem(s)", findings.len());
                }
                Err(e) => return Err(e.into()),
            }
        }
        Some(Command::Watch) => {
            let options = cli.load_options();
            let resolved = loader.load(&options)?;
            init_logging(&cli, &resolved)?;
            report_findings(&resolved);
            run_watch(loader, options, resolved).await?;
        }
        Some(Command::Show(ref args)) => run_show(&cli, &loader, args)?,
        None => run_show(&cli, &loader, &ShowArgs::default())?,
    }

    Ok(())
}

/// Install the subscriber once the config (and thus `logLevel`/`logFormat`) is known.
fn init_logging(cli: &Cli, resolved: &ResolvedConfig) -> Result<()> {
    let level = if cli.verbose {
        LogLevel::Debug
    } else {
        resolved.config.log_level
    };
    let destination = match (&resolved.config.paths.log_file, cli.log.as_str()) {
        (Some(file), "2") => file.display().to_string(),
        _ => cli.log.clone(),
    };
    init_tracing(
        &destination,
        level,
        resolved.config.log_format == LogFormat::Json,
    )
}

fn report_findings(resolved: &ResolvedConfig) {
    for finding in &resolved.findings {
        eprintln!("{}", finding);
    }
}

fn run_show(cli: &Cli, loader: &Loader, args: &ShowArgs) -> Result<()> {
    let resolved = loader.load(&cli.load_options())?;
    init_logging(cli, &resolved)?;
    report_findings(&resolved);
    print!("{}", resolved.show(args.format)?);
    Ok(())
}

async fn run_watch(loader: Loader, options: LoadOptions, resolved: ResolvedConfig) -> Result<()> {
    let config = resolved.config;
    if !config.hot_reload {
        info!("hotReload is disabled, nothing to watch");
        return Ok(());
    }
    if config.is_from_defaults() {
        bail!("no config file to watch; create one or pass --config");
    }

    // Reload messages follow the logLevel of the config currently in effect.
    let filter = Arc::new(LogLevelFilter::new(config.log_level));
    let logger = TracingLogger::new()
        .with_name("watch")
        .with_level_filter(Arc::clone(&filter));
    let options = options.with_logger(Arc::new(logger));

    let path = PathBuf::from(&config.loaded_from);
    let live = LiveConfig::new(config);
    let reload_filter = Arc::clone(&filter);
    let watch_options = WatchOptions::new(path.clone(), options)
        .on_reload(move |config| reload_filter.set(config.log_level))
        .on_file_deleted(|| warn!("Config file removed; keeping the last loaded config"));
    let watcher = Watcher::new(loader, live.clone(), watch_options);

    let token = CancellationToken::new();
    let (mut events, mut errors) = watcher.watch(&token)?;
    eprintln!("Watching {} (Ctrl-C to stop)", display_path(&path));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            Some(event) = events.recv() => report_event(&event),
            Some(err) = errors.recv() => eprintln!("watch error: {}", err),
            else => break,
        }
    }

    token.cancel();
    watcher.shutdown().await;
    info!(
        max_concurrent_ops = live.load().max_concurrent_ops,
        log_level = %filter.get(),
        "Config watcher stopped"
    );
    Ok(())
}

fn report_event(event: &WatchEvent) {
    match (event.kind, &event.new_config, &event.error) {
        (WatchEventKind::ConfigDeleted, _, _) => {
            eprintln!("config file deleted; previous config stays in effect");
        }
        (WatchEventKind::ConfigUpdated, Some(config), _) => {
            eprintln!("config reloaded from {}", config.loaded_from);
            for finding in &event.findings {
                eprintln!("  {}", finding);
            }
        }
        (WatchEventKind::ConfigUpdated, None, Some(err)) => {
            eprintln!("config reload failed, previous config stays in effect: {}", err);
        }
        (WatchEventKind::ConfigUpdated, None, None) => {}
    }
}
