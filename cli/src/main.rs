use clap::{Parser, Subcommand};

mod commands;
mod util;

#[derive(Parser)]
#[command(
    name = "relay-probe",
    version,
    about = "Deployment checks for a running serper-relay"
)]
struct Cli {
    /// Relay base URL
    #[arg(long, env = "RELAY_URL", default_value = "http://localhost:8000")]
    base_url: String,

    /// API key sent as the `api_key` query parameter
    #[arg(long, env = "SERPER_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Message endpoint path
    #[arg(long, env = "RELAY_MESSAGE_PATH", default_value = "/mcp")]
    message_path: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the relay's version payload
    Health,
    /// Run the deployment checks and print a JSON report
    Check,
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    let api_key = cli
        .api_key
        .as_deref()
        .map(str::trim)
        .filter(|key| !key.is_empty());

    let code = match cli.command {
        Commands::Health => commands::health::run(&cli.base_url).await,
        Commands::Check => commands::check::run(&cli.base_url, api_key, &cli.message_path).await,
    };
    std::process::exit(code);
}
