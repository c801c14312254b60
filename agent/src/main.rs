//! Updater Agent - Entry Point
//!
//! Receives signed archive uploads over HTTP and swaps them into app pools
//! and supervised processes on this host.

use std::collections::HashMap;
use std::env;
use std::process::ExitCode;

use anyhow::Context;
use tracing::{error, info};

use updater_agent::app::options::AppOptions;
use updater_agent::app::run::run;
use updater_agent::logs::{init_logging, LogOptions};
use updater_agent::storage::layout::StorageLayout;
use updater_agent::storage::settings::Settings;
use updater_agent::utils::{run_diagnostic, version_info};

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
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("Unable to print version: {}", e),
        }
        return ExitCode::SUCCESS;
    }

    let layout = StorageLayout::default();
    let settings = match load_settings(&layout, cli_args.get("config").map(String::as_str)).await {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{:#}", e);
            return ExitCode::FAILURE;
        }
    };

    // Run diagnostics
    if cli_args.contains_key("diagnostic") || cli_args.contains_key("diag") {
        return if run_diagnostic(&settings).await {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        };
    }

    // Initialize logging
    let log_options = LogOptions {
        log_level: settings.log_level.clone(),
        log_dir: settings.log_dir.clone(),
        json_format: settings.log_json,
        ..Default::default()
    };
    let _log_guard = match init_logging(log_options) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            None
        }
    };

    // Run the server
    let options = AppOptions {
        storage: layout,
        server: settings.server.clone().into(),
        ..Default::default()
    };

    info!("Running updater agent with options: {:?}", options);
    match run(options, &settings, await_shutdown_signal()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Failed to run the agent: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn load_settings(layout: &StorageLayout, explicit: Option<&str>) -> anyhow::Result<Settings> {
    let settings_file = layout.resolve_settings_file(explicit);
    let settings = settings_file
        .read_json::<Settings>()
        .await
        .with_context(|| format!("Unable to read settings file {}", settings_file.path().display()))?;
    settings.validate().context("Invalid settings")?;
    Ok(settings)
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let (Ok(mut sigterm), Ok(mut sigint)) =
            (signal(SignalKind::terminate()), signal(SignalKind::interrupt()))
        else {
            error!("Unable to install signal handlers, waiting for Ctrl+C only");
            let _ = tokio::signal::ctrl_c().await;
            return;
        };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down...");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
        }
        info!("Ctrl+C received, shutting down...");
    }
}
