//! Strangler-fig reverse proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ http server ──▶ ProxyDispatcher
//!                                        │
//!                                        ├─ RouteTable: path → route (backend, migrated?)
//!                                        │
//!                                        ├─ BreakerRegistry: backend → CircuitBreaker
//!                                        │      Open? ──▶ 503 circuit open (backend untouched)
//!                                        │
//!                                        └─ BackendInvoker ──▶ legacy / migrated backend
//!     Client Response                          │
//!     ◀────────────── response mapping ◀───────┘
//!
//!     config file ──▶ watcher ──▶ route/backend reload (breaker state kept)
//!     admin API   ──▶ status, breakers, routes
//! ```

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser)]
#[command(name = "strangler-proxy")]
#[command(about = "Strangler-fig reverse proxy with per-backend circuit breakers", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file. Built-in defaults when omitted.
    #[arg(short, long, env = "STRANGLER_PROXY_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    strangler_proxy::lifecycle::run(cli.config.as_deref()).await?;
    Ok(())
}
