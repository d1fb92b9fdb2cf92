//! Control CLI for a running lasd.

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;

#[derive(Parser, Debug)]
#[command(version, about = "Control a running Lightning assets server", long_about = None)]
struct Cli {
    /// Base URL of the server's request API
    #[arg(long, default_value = "http://localhost:8081", env = "LAS_API_URL")]
    api_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Close a contract, selling its hedge if it is open
    Closecontract {
        /// Contract id
        #[arg(long)]
        id: String,
    },
    /// List supported assets
    Assets,
    /// Show one contract, or all of them
    Contracts {
        #[arg(long)]
        id: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.api_url.trim_end_matches('/');

    let request = match &cli.command {
        Command::Closecontract { id } => client.delete(format!("{base}/v1/contracts/{id}")),
        Command::Assets => client.get(format!("{base}/v1/assets")),
        Command::Contracts { id: Some(id) } => client.get(format!("{base}/v1/contracts/{id}")),
        Command::Contracts { id: None } => client.get(format!("{base}/v1/contracts")),
    };

    let response = request.send().await?;
    let status = response.status();
    let body: Value = response.json().await.unwrap_or(Value::Null);
    if !status.is_success() {
        let message = body["error"].as_str().unwrap_or("request failed");
        bail!("HTTP {status}: {message}");
    }

    match cli.command {
        Command::Closecontract { id } => println!("closed contract {id}"),
        _ => println!("{}", serde_json::to_string_pretty(&body)?),
    }
    Ok(())
}
