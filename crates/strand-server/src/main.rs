//! Conversational-agent server: commands in, SSE patch frames out.

mod http;
mod request;
mod tools;

use clap::Parser;
use std::sync::Arc;
use strand_contract::GenaiModelExecutor;
use strand_graph::{DelegateSpec, GraphConfig, ToolRegistry};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "strand-server")]
struct Args {
    #[arg(long, env = "STRAND_HTTP_ADDR", default_value = "127.0.0.1:8080")]
    http_addr: String,

    /// Model for agent turns and, unless overridden, delegated tasks.
    #[arg(long, env = "STRAND_MODEL", default_value = "gpt-4o-mini")]
    model: String,

    /// Model override for delegated sub-tasks.
    #[arg(long, env = "STRAND_TASK_MODEL")]
    task_model: Option<String>,

    /// Bound on agent-tools cycles per run; unbounded when unset.
    #[arg(long, env = "STRAND_MAX_CYCLES")]
    max_cycles: Option<usize>,
}

fn build_registry(task_model: Option<&str>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register_backend(Arc::new(tools::WeatherTool));
    registry.register_backend(Arc::new(tools::SearchProductsTool));
    registry.register_backend(Arc::new(tools::DisplayChartTool));

    let mut delegate = DelegateSpec::new(tools::delegate_task_descriptor());
    if let Some(model) = task_model {
        delegate = delegate.with_model(model);
    }
    registry.register_delegate(delegate);
    registry
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let executor = Arc::new(GenaiModelExecutor::new(genai::Client::default()));
    let config = Arc::new(
        GraphConfig::new(args.model.clone(), executor)
            .with_max_cycles(args.max_cycles)
            .with_system_instruction(request::DEFAULT_SYSTEM_INSTRUCTION),
    );
    let registry = Arc::new(build_registry(args.task_model.as_deref()));

    let app = http::router(http::AppState { config, registry });

    let listener = match tokio::net::TcpListener::bind(&args.http_addr).await {
        Ok(listener) => listener,
        Err(err) => {
            eprintln!("failed to bind {}: {err}", args.http_addr);
            std::process::exit(2);
        }
    };
    info!(addr = %args.http_addr, model = %args.model, "strand server listening");

    if let Err(err) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        eprintln!("server error: {err}");
        std::process::exit(1);
    }
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown signal received");
    }
}
