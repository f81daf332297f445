use anyhow::Context;
use clap::{Parser, Subcommand};
use generator::GeneratorConfig;
use http::SpecClient;
use log::info;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

mod generator;
mod http;

#[derive(Parser)]
#[command(author, version, about = "Client for the device ranking server")]
struct Args {
    #[arg(long, default_value = "http://127.0.0.1:8080", env = "DEVICECTL_SERVER")]
    server: String,
    #[arg(long, default_value_t = 5_000)]
    timeout_ms: u64,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Submit one batch read from a JSON file
    Submit { file: PathBuf },
    /// Print every stored record as JSON
    List,
    /// Delete every stored record
    Clear,
    /// Show a device's position among devices reporting the same sensor
    Rank { mac: String, sensor: String },
    /// Submit synthetic batches, one per device, then print their rankings
    Generate {
        #[arg(long, default_value_t = 8)]
        devices: usize,
        #[arg(long, default_value = "temp")]
        sensor: String,
        #[arg(long, default_value_t = 16)]
        detections: usize,
        #[arg(long, default_value_t = 0)]
        seed: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();
    http::ensure_base_url(&args.server)?;
    let client = SpecClient::new(&args.server, Duration::from_millis(args.timeout_ms))?;

    match args.command {
        Command::Submit { file } => {
            let contents = fs::read_to_string(&file)
                .with_context(|| format!("reading batch {}", file.display()))?;
            let batch = serde_json::from_str(&contents)
                .with_context(|| format!("parsing batch {}", file.display()))?;
            let stored = client.submit(&batch).await?;
            println!("{}", serde_json::to_string_pretty(&stored)?);
        }
        Command::List => {
            let records = client.list().await?;
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        Command::Clear => {
            let removed = client.clear().await?;
            println!("removed {removed} records");
        }
        Command::Rank { mac, sensor } => match client.rank(&mac, &sensor).await? {
            Some(ranking) => println!(
                "{mac} ranks {} on {sensor} at {:.6} Hz",
                ranking.ranking, ranking.rate
            ),
            None => println!("no {sensor} records for {mac}"),
        },
        Command::Generate {
            devices,
            sensor,
            detections,
            seed,
        } => {
            let config = GeneratorConfig {
                devices,
                sensor,
                detections,
                seed,
                ..Default::default()
            };
            let batches = generator::build_batches(&config)?;
            for batch in &batches {
                let stored = client.submit(batch).await?;
                info!("submitted {} rate {:.6}", stored.mac, stored.rate);
            }
            for batch in &batches {
                if let Some(ranking) = client.rank(&batch.mac, &batch.sensor).await? {
                    println!("{:>4}  {}  {:.6} Hz", ranking.ranking, batch.mac, ranking.rate);
                }
            }
        }
    }

    Ok(())
}
