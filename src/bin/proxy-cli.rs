use clap::{Parser, Subcommand};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "proxy-cli")]
#[command(about = "Management CLI for the capability proxy", long_about = None)]
struct Cli {
    /// Base URL of the admin API.
    #[arg(short, long, default_value = "http://localhost:8081")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check proxy system status
    Status,
    /// Request and breaker counters
    Stats,
    /// List in-flight requests
    Requests,
    /// Cancel an in-flight request
    Cancel { request_id: String },
    /// Show circuit breakers, or a single server's breaker
    Breakers { server_id: Option<String> },
    /// Reset a server's circuit breaker
    Reset { server_id: String },
    /// List configured servers and their reachability
    Servers,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    let request = match cli.command {
        Commands::Status => client.get(format!("{base}/admin/status")),
        Commands::Stats => client.get(format!("{base}/admin/stats")),
        Commands::Requests => client.get(format!("{base}/admin/requests")),
        Commands::Cancel { request_id } => {
            client.delete(format!("{base}/admin/requests/{request_id}"))
        }
        Commands::Breakers { server_id: None } => client.get(format!("{base}/admin/breakers")),
        Commands::Breakers {
            server_id: Some(server_id),
        } => client.get(format!("{base}/admin/breakers/{server_id}")),
        Commands::Reset { server_id } => {
            client.post(format!("{base}/admin/breakers/{server_id}/reset"))
        }
        Commands::Servers => client.get(format!("{base}/admin/servers")),
    };

    print_response(request.send().await?).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
