mod config;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use console::style;
use tracing_subscriber::{fmt, EnvFilter};

use uptime_core::{HttpProber, Monitor, TargetRegistry, WebhookNotifier};

/// Uptime monitor: poll HTTP endpoints and alert webhooks on up/down changes.
#[derive(Parser)]
#[command(name = "uptime-monitor", version, about)]
struct Cli {
    /// Path to the setup document (JSON, or TOML when ending in `.toml`).
    #[arg(short, long, default_value = "setup.json")]
    config: PathBuf,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let app_config = match config::AppConfig::load(&cli.config) {
        Ok(c) => {
            init_tracing(&c.log_format);
            tracing::info!(path = %cli.config.display(), "Loaded config file");
            c
        }
        Err(e) => {
            init_tracing("pretty");
            tracing::error!("{}", e);
            std::process::exit(1);
        }
    };
    let config = app_config.monitor;

    let registry = match TargetRegistry::from_config(&config) {
        Ok(r) => r,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            std::process::exit(1);
        }
    };

    let prober = match HttpProber::new() {
        Ok(p) => p,
        Err(e) => {
            tracing::error!(error = %e, "Failed to initialise HTTP client");
            std::process::exit(1);
        }
    };
    let notifier = WebhookNotifier::new(prober.client().clone(), config.webhook_timeout());

    print_banner(&cli.config, &config, &registry);

    let monitor = Monitor::new(
        registry,
        config.interval(),
        Arc::new(prober),
        Arc::new(notifier),
    )
    .with_shutdown_grace(config.shutdown_grace());

    monitor.start().await;
    shutdown_signal().await;

    tracing::info!("Shutdown signal received, stopping monitor...");
    monitor.stop().await;
    tracing::info!("Shutdown complete");
}

fn print_banner(path: &std::path::Path, config: &uptime_core::MonitorConfig, registry: &TargetRegistry) {
    println!(
        "{} {}",
        style("uptime-monitor").bold(),
        style(env!("CARGO_PKG_VERSION")).dim()
    );
    println!("  {} {}", style("config:  ").dim(), path.display());
    println!("  {} {}s", style("interval:").dim(), config.interval().as_secs());
    for t in registry.targets() {
        println!(
            "  {} {} {} {}",
            style("target:  ").dim(),
            style(&t.name).bold(),
            t.url,
            style(format!("timeout={}s webhooks={}", t.timeout.as_secs(), t.webhooks.len())).dim()
        );
    }
    println!();
    println!("{}", style("Press Ctrl+C to stop").dim());
    println!();
}

fn init_tracing(log_format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match log_format {
        "json" => {
            fmt().with_env_filter(filter).json().init();
        }
        _ => {
            fmt().with_env_filter(filter).init();
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
