use clap::{Parser, Subcommand};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "service-cli")]
#[command(about = "Client for a running microserve instance", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    /// Controller group segment.
    #[arg(short, long, default_value = "ws")]
    group: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the service answers
    Ping,
    /// Show requests currently in flight
    Stats,
    /// Show version and database connections
    Info,
    /// Call a controller method: <version> <resource> <method> [args...]
    Call {
        version: String,
        resource: String,
        method: String,
        args: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    match cli.command {
        Commands::Ping => {
            let res = client.get(format!("{base}/ping")).send().await?;
            println!("{}", res.text().await?);
        }
        Commands::Stats => {
            let res = client.get(format!("{base}/stats")).send().await?;
            print_response(res).await?;
        }
        Commands::Info => {
            for method in ["version", "connections"] {
                let res = client
                    .get(format!("{base}/{}/v1/system/{method}", cli.group))
                    .send()
                    .await?;
                print_response(res).await?;
            }
        }
        Commands::Call {
            version,
            resource,
            method,
            args,
        } => {
            let mut url = reqwest::Url::parse(base)?;
            url.path_segments_mut()
                .map_err(|_| "base URL can't carry a path")?
                .pop_if_empty()
                .extend([cli.group.as_str(), version.as_str(), resource.as_str(), method.as_str()])
                .extend(args.iter().map(String::as_str));
            let res = client.get(url).send().await?;
            print_response(res).await?;
        }
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;
    match serde_json::from_str::<Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{text}"),
    }
    if !status.is_success() {
        eprintln!("Error: service returned status {status}");
    }
    Ok(())
}
