use std::sync::Arc;

use clap::Parser;

use mailhook::config::Config;
use mailhook::relay::{RelayHandler, RelayOptions};
use mailhook::smtp::SmtpServer;
use mailhook::sniff::FileCommandSniffer;
use mailhook::webhook::WebhookClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = Config::parse();

    eprintln!("📮 mailhook v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   SMTP: {}", config.bind_addr());
    eprintln!("   Webhook: {}", config.webhook);
    eprintln!(
        "   Headers dump: {}",
        if config.send_headers { "enabled" } else { "disabled" }
    );
    eprintln!(
        "   Attach original: {}",
        if config.attach { "enabled" } else { "disabled" }
    );
    eprintln!("   Sniffer: {}\n", config.file_command);

    let client = WebhookClient::new(config.webhook.clone());
    let sniffer = Arc::new(FileCommandSniffer::new(config.file_command.clone()));
    let handler = Arc::new(RelayHandler::new(
        client,
        sniffer,
        RelayOptions {
            send_headers: config.send_headers,
            attach_original: config.attach,
            wait: false,
        },
    ));

    let server = SmtpServer::bind(&config.bind_addr(), handler).await?;

    tokio::select! {
        result = server.serve() => result?,
        _ = shutdown_signal() => {
            tracing::info!("shutting down");
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
