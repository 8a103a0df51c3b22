// src/main.rs

use axum::serve;
use keypool_proxy::{
    cli::{Cli, Commands, KeyCommands},
    config::{keys_file_path, load_config, load_keys_file, preview_secret},
    key_check::{self, KeyCheckOptions},
    run, AppConfig, AppError, ConfigOverrides,
};
use secrecy::ExposeSecret;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::Notify;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!(signal = "Ctrl+C", "Received signal. Initiating graceful shutdown...") },
        () = terminate => { info!(signal = "Terminate", "Received signal. Initiating graceful shutdown...") },
    }
}

fn init_tracing(cli: &Cli) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    let registry = tracing_subscriber::registry().with(env_filter);
    if cli.json_logs {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse_args();
    init_tracing(&cli);

    let overrides = ConfigOverrides {
        host: cli.host.clone(),
        port: cli.port,
    };

    let outcome = match cli.command() {
        Commands::Serve => serve_proxy(&cli.config, &overrides).await,
        Commands::Config { file, verbose } => {
            validate_config(file.as_deref().unwrap_or(cli.config.as_path()), &overrides, verbose)
        }
        Commands::Keys {
            action:
                KeyCommands::Check {
                    concurrency,
                    timeout,
                    models,
                    output,
                },
        } => {
            let options = KeyCheckOptions {
                concurrency,
                timeout: Duration::from_secs(timeout),
                models: if models.is_empty() {
                    KeyCheckOptions::default().models
                } else {
                    models
                },
            };
            check_keys(&cli.config, &overrides, &options, output.as_deref()).await
        }
    };

    match outcome {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn serve_proxy(config_path: &Path, overrides: &ConfigOverrides) -> Result<ExitCode, AppError> {
    let (app, config) = run(config_path, overrides)?;

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr).await.map_err(|e| {
        error!(server.address = %addr, error = ?e, "Failed to bind to address. Exiting.");
        AppError::from(e)
    })?;
    info!(server.address = %addr, "Server listening");

    // Connections still open when the grace period ends are dropped.
    let grace = config.server.shutdown_grace();
    let shutdown_started = Arc::new(Notify::new());
    let notify = Arc::clone(&shutdown_started);
    let server = async move {
        serve(listener, app.into_make_service())
            .with_graceful_shutdown(async move {
                shutdown_signal().await;
                notify.notify_one();
            })
            .await
    };

    tokio::select! {
        result = server => {
            result.map_err(|e| {
                error!(error = ?e, "Server run loop encountered an error. Exiting.");
                AppError::from(e)
            })?;
            info!("Server shut down gracefully.");
        }
        () = async {
            shutdown_started.notified().await;
            tokio::time::sleep(grace).await;
        } => {
            warn!(grace_secs = grace.as_secs(), "Grace period elapsed, closing remaining connections");
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn validate_config(
    config_path: &Path,
    overrides: &ConfigOverrides,
    verbose: bool,
) -> Result<ExitCode, AppError> {
    let config = load_config(config_path, overrides)?;
    println!("Configuration is valid: {}", config_path.display());
    if verbose {
        print_config_details(&config);
    }
    Ok(ExitCode::SUCCESS)
}

fn print_config_details(config: &AppConfig) {
    println!("  listen:            {}:{}", config.server.host, config.server.port);
    println!("  upstream:          {}", config.upstream.base_url);
    println!("  failure threshold: {}", config.pool.failure_threshold);
    println!(
        "  backoff:           {}s doubling, max {}s",
        config.pool.backoff_base_secs, config.pool.backoff_max_secs
    );
    println!("  max retries:       {}", config.pool.max_retries);
    println!("  admin token:       {}", if config.server.admin_token.is_some() { "set" } else { "not set" });
    println!("  keys ({}):", config.keys.len());
    for (id, entry) in config.resolved_keys() {
        println!("    {id:<20} {}", preview_secret(entry.secret.expose_secret()));
    }
}

async fn check_keys(
    config_path: &Path,
    overrides: &ConfigOverrides,
    options: &KeyCheckOptions,
    output: Option<&Path>,
) -> Result<ExitCode, AppError> {
    let config = load_config(config_path, overrides)?;
    let results = key_check::check_keys(&config, options).await?;
    print!("{}", key_check::render_report(&results));

    if let Some(dir) = output {
        let duplicates = match keys_file_path(config_path, &config) {
            Some(path) => load_keys_file(&path)?.duplicates,
            None => Vec::new(),
        };
        let saved = key_check::save_results(&config, &results, &duplicates, dir)?;
        println!("Valid keys written to {}", saved.valid_file.display());
        println!("Invalid keys written to {}", saved.invalid_file.display());
        if let Some(path) = saved.duplicate_file {
            println!("{} duplicate keys written to {}", duplicates.len(), path.display());
        }
    }

    if results.iter().all(|r| r.valid) {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}
