use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::path::PathBuf;

const DEFAULT_URL: &str = "http://127.0.0.1:3000";

#[derive(Parser)]
#[command(name = "presence", about = "Presence attendance CLI")]
struct Cli {
    /// Base URL of the running presenced daemon
    #[arg(long, global = true, default_value = DEFAULT_URL)]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a probe for recognition
    Recognize {
        /// File holding the probe data (e.g. a JSON embedding)
        #[arg(short, long)]
        image: PathBuf,
        /// Camera the probe was captured on
        #[arg(short, long)]
        camera: String,
    },
    /// Show today's attendance
    Today,
    /// Show all attendance, newest first
    List,
    /// Show daemon status
    Status,
    /// Write sample employees and cameras into a database
    Seed {
        /// Database file to seed
        #[arg(long)]
        db: PathBuf,
    },
}

fn recognize_body(image_data: &str, camera_id: &str) -> Value {
    json!({ "imageData": image_data.trim(), "cameraId": camera_id })
}

fn endpoint(base: &str, path: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), path)
}

async fn get_json(client: &reqwest::Client, url: String) -> Result<Value> {
    let response = client
        .get(&url)
        .send()
        .await
        .with_context(|| format!("presenced not reachable at {url}"))?;
    let status = response.status();
    let body: Value = response.json().await.context("invalid response body")?;
    if !status.is_success() {
        bail!("{status}: {}", body["message"].as_str().unwrap_or("request failed"));
    }
    Ok(body)
}

fn print_entries(entries: &Value) {
    let Some(entries) = entries.as_array() else {
        println!("No attendance recorded");
        return;
    };
    if entries.is_empty() {
        println!("No attendance recorded");
        return;
    }
    for entry in entries {
        println!(
            "{}  {:<9}  {:<20}  {}",
            entry["timestamp"].as_str().unwrap_or("-"),
            entry["eventType"].as_str().unwrap_or("-"),
            entry["employee"]["name"].as_str().unwrap_or("-"),
            entry["camera"]["name"].as_str().unwrap_or("-"),
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let client = reqwest::Client::new();

    match cli.command {
        Commands::Recognize { image, camera } => {
            let data = std::fs::read_to_string(&image)
                .with_context(|| format!("cannot read probe file {}", image.display()))?;
            let url = endpoint(&cli.url, "/attendance/recognize");
            tracing::debug!(%url, camera = %camera, "submitting probe");

            let response = client
                .post(&url)
                .json(&recognize_body(&data, &camera))
                .send()
                .await
                .with_context(|| format!("presenced not reachable at {url}"))?;
            let status = response.status();
            let body: Value = response.json().await.context("invalid response body")?;

            println!("{}", body["message"].as_str().unwrap_or("no message"));
            if let Some(confidence) = body["confidence"].as_f64() {
                println!("confidence: {confidence:.3}");
            }
            if let Some(event) = body["attendance"]["eventType"].as_str() {
                println!("recorded:   {event}");
            }
            if !status.is_success() {
                std::process::exit(1);
            }
        }
        Commands::Today => {
            print_entries(&get_json(&client, endpoint(&cli.url, "/attendance/today")).await?);
        }
        Commands::List => {
            print_entries(&get_json(&client, endpoint(&cli.url, "/attendance")).await?);
        }
        Commands::Status => match get_json(&client, endpoint(&cli.url, "/health")).await {
            Ok(body) => println!(
                "presenced {}: {} ({} live subscribers)",
                body["version"].as_str().unwrap_or("?"),
                body["status"].as_str().unwrap_or("unknown"),
                body["subscribers"].as_u64().unwrap_or(0),
            ),
            Err(e) => {
                println!("presenced: not connected ({e})");
                std::process::exit(1);
            }
        },
        Commands::Seed { db } => {
            let store = presence_store::Store::open(&db)
                .await
                .with_context(|| format!("cannot open database {}", db.display()))?;
            let (employees, cameras) = presence_store::sample::seed(&store).await?;
            println!("Seeded {employees} employees and {cameras} cameras into {}", db.display());
        }
    }

    Ok(())
}
