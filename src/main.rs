mod allowlist;
mod api;
mod client;
mod config;
mod executor;
mod speckit;
mod state;

use std::net::SocketAddr;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{Cli, Commands, GatewayArgs, SpeckitArgs, SpeckitWebArgs};
use crate::executor::CommandExecutor;
use crate::speckit::stdio::StdioServer;
use crate::speckit::SpecifyRunner;
use crate::state::{AppState, SpeckitState};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Load environment variables before clap reads them
    dotenvy::dotenv().ok();

    // Logs go to stderr; stdout belongs to command output and the stdio protocol
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "linuxops=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let success = match cli.command {
        Commands::Serve(args) => {
            serve_gateway(args).await?;
            true
        }
        Commands::Exec { client: args, words } => {
            client::run_remote_cmd(&args, &words.join(" ")).await?
        }
        Commands::List(args) => client::print_commands(&args).await?,
        Commands::Health(args) => client::check_health(&args).await?,
        Commands::SpeckitWeb(args) => {
            serve_speckit_web(args).await?;
            true
        }
        Commands::SpeckitStdio(args) => {
            serve_speckit_stdio(args).await?;
            true
        }
    };

    Ok(if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn serve_gateway(args: GatewayArgs) -> Result<()> {
    let executor = CommandExecutor::new(args.allowlist.clone(), args.shell.clone(), args.timeout());
    tracing::info!(
        "Allowlist: {} (timeout {}s, shell {})",
        args.allowlist.display(),
        executor.timeout().as_secs(),
        args.shell
    );
    let app = api::router(AppState::new(executor, args.server_name.as_str()));

    serve(app, args.addr()).await
}

async fn serve_speckit_web(args: SpeckitWebArgs) -> Result<()> {
    let runner = SpecifyRunner::new(
        args.shell.clone(),
        args.launcher.clone(),
        Duration::from_secs(args.timeout_secs),
    );
    let app = speckit::web::router(SpeckitState::new(runner));
    serve(app, args.addr()).await
}

async fn serve_speckit_stdio(args: SpeckitArgs) -> Result<()> {
    let runner = SpecifyRunner::new(
        args.shell,
        args.launcher,
        Duration::from_secs(args.timeout_secs),
    );
    let server = StdioServer::new(runner);
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    server
        .serve(stdin, tokio::io::stdout())
        .await
        .context("stdio transport failed")
}

async fn serve(app: Router, addr: SocketAddr) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server exited")?;
    tracing::info!("Server stopped");
    Ok(())
}

/// Completes on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
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
                tracing::error!("Failed to install SIGTERM handler: {}", e);
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
    tracing::info!("Shutdown signal received");
}
