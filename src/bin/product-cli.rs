use clap::{Parser, Subcommand};
use reqwest::StatusCode;
use serde_json::{json, Value};
use url::Url;

#[derive(Parser)]
#[command(name = "product-cli")]
#[command(about = "Command-line client for the product service", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080", env = "PRODUCT_SERVICE_URL")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the service is up
    Health,
    /// Create a product and print its id
    Create {
        #[arg(short, long)]
        name: String,
    },
    /// Fetch a product by id
    Get { id: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    match cli.command {
        Commands::Health => {
            let res = client.get(format!("{}/healthcheck", base)).send().await?;
            let status = res.status();
            let text = res.text().await?;
            if status == StatusCode::OK {
                println!("{}", text);
            } else {
                eprintln!("Error: service returned status {}", status);
                std::process::exit(1);
            }
        }
        Commands::Create { name } => {
            let res = client
                .post(format!("{}/products", base))
                .json(&json!({ "name": name }))
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Get { id } => {
            let mut url = Url::parse(base)?;
            url.path_segments_mut()
                .map_err(|_| "service url cannot be a base")?
                .pop_if_empty()
                .extend(["products", id.as_str()]);
            let res = client.get(url).send().await?;
            print_response(res).await?;
        }
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let json: Value = res.json().await.unwrap_or(Value::Null);
    if !status.is_success() {
        eprintln!("Error: service returned status {}", status);
        if let Some(message) = json.get("error").and_then(Value::as_str) {
            eprintln!("Response: {}", message);
        }
        std::process::exit(1);
    }

    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
