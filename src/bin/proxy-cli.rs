use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "proxy-cli")]
#[command(about = "Management CLI for the strangler proxy", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8081")]
    url: String,

    #[arg(short, long, env = "STRANGLER_PROXY_ADMIN_KEY")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check proxy status, uptime and open circuits
    Status,
    /// List every circuit breaker with its state and failure count
    Breakers {
        /// Only show breakers that are not closed
        #[arg(long)]
        tripped: bool,
    },
    /// Show the routing table and migration progress
    Routes,
}

impl Commands {
    fn endpoint(&self) -> &'static str {
        match self {
            Commands::Status => "/admin/status",
            Commands::Breakers { .. } => "/admin/breakers",
            Commands::Routes => "/admin/routes",
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let url = format!("{}{}", cli.url.trim_end_matches('/'), cli.command.endpoint());
    let res = client.get(url).headers(headers).send().await?;

    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        std::process::exit(1);
    }

    let mut json: Value = res.json().await?;
    if let (Commands::Breakers { tripped: true }, Value::Array(breakers)) = (&cli.command, &mut json) {
        breakers.retain(|b| b["status"] != "closed");
    }
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
