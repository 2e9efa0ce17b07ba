//! goobsync - Entry Point
//!
//! `--serve` runs the deployment server, `--deploy` pushes a project to one.

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use colored::Colorize;
use goobsync::app::options::ServerOptions;
use goobsync::app::run::run_server;
use goobsync::client::{DeployOutcome, Deployer};
use goobsync::errors::EngineError;
use goobsync::filesys::dir::Dir;
use goobsync::filesys::file::File;
use goobsync::logs::{init_logging, LogLevel, LogOptions};
use goobsync::storage::settings::ServerSettings;
use goobsync::utils::version_info;

use tracing::{error, info};

const USAGE: &str = "\
usage:
  goobsync --serve [--settings=<file>] [--host=<host>] [--port=<port>] [--data-dir=<dir>]
  goobsync --deploy [--project=<dir>] [--api-key=<key>] [--log-level=<level>]
  goobsync --version";

#[tokio::main]
async fn main() -> ExitCode {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            // Handle standalone flags like --version
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    // Print version and exit
    if cli_args.contains_key("version") {
        match serde_json::to_string_pretty(&version_info()) {
            Ok(json) => println!("{json}"),
            Err(e) => eprintln!("{e}"),
        }
        return ExitCode::SUCCESS;
    }

    let result = if cli_args.contains_key("serve") {
        serve(&cli_args).await
    } else if cli_args.contains_key("deploy") {
        deploy(&cli_args).await
    } else {
        eprintln!("{USAGE}");
        return ExitCode::from(2);
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            eprintln!("{} {}", "error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

async fn serve(cli_args: &HashMap<String, String>) -> Result<(), EngineError> {
    // Retrieve the settings file
    let mut settings = match cli_args.get("settings") {
        Some(path) => File::new(path).read_json::<ServerSettings>().await.map_err(|e| {
            EngineError::ConfigError(format!("Unable to read settings file {path}: {e}"))
        })?,
        None => ServerSettings::default(),
    };

    if let Some(host) = cli_args.get("host") {
        settings.host = host.clone();
    }
    if let Some(port) = cli_args.get("port") {
        settings.port = port
            .parse()
            .map_err(|e| EngineError::ConfigError(format!("--port={port}: {e}")))?;
    }
    if let Some(dir) = cli_args.get("data-dir") {
        settings.data_dir = Some(PathBuf::from(dir));
    }
    settings.validate()?;

    // Initialize logging
    let log_options = LogOptions {
        log_level: settings.log_level.clone(),
        json_format: settings.json_logs,
    };
    if let Err(e) = init_logging(log_options) {
        eprintln!("Failed to initialize logging: {e}");
    }

    let options = ServerOptions::from_settings(&settings);
    info!("Running deployment server with options: {:?}", options);
    run_server(options, await_shutdown_signal()).await
}

async fn deploy(cli_args: &HashMap<String, String>) -> Result<(), EngineError> {
    let log_level = match cli_args.get("log-level") {
        Some(level) => level.parse::<LogLevel>().map_err(EngineError::ConfigError)?,
        None => LogLevel::Info,
    };
    if let Err(e) = init_logging(LogOptions {
        log_level,
        ..Default::default()
    }) {
        eprintln!("Failed to initialize logging: {e}");
    }

    let project = cli_args.get("project").map(String::as_str).unwrap_or(".");
    let root = Dir::new(project);
    let deployer = Deployer::from_project(&root, cli_args.get("api-key").cloned()).await?;
    let outcome = deployer.deploy(&root).await?;
    print_summary(&outcome);
    Ok(())
}

fn print_summary(outcome: &DeployOutcome) {
    println!(
        "{} {} is live as {}",
        "deployed".green().bold(),
        outcome.project_name.bold(),
        outcome.deploy_name.cyan()
    );
    println!(
        "  {} files in manifest, {} uploaded, {} already on server",
        outcome.manifest_len,
        outcome.report.uploaded.len(),
        outcome.manifest_len.saturating_sub(outcome.needed)
    );
    for failed in &outcome.report.failed {
        println!("  {} {}: {}", "failed".yellow(), failed.rel_path, failed.error);
    }
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => {
                        info!("SIGTERM received, shutting down...");
                    }
                    _ = sigint.recv() => {
                        info!("SIGINT received, shutting down...");
                    }
                }
                return;
            }
            _ => error!("Unable to install signal handlers, falling back to Ctrl+C"),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Ctrl+C received, shutting down...");
}
