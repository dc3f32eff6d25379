//! DiadCtl - Command line tool for operating a Diad service
//!
//! Usage:
//!   diadctl events --campaign 1       - List a campaign's election events
//!   diadctl activate 12               - Activate an event scheduled today
//!   diadctl vote 12 --document 1020   - Record a vote by document number
//!   diadctl close 12 --user 7         - Deactivate and finalize an event

use clap::{Parser, Subcommand};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

/// Diad Control Tool
#[derive(Parser)]
#[command(name = "diadctl")]
#[command(about = "Operate election events on a Diad service", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "/etc/diad/config.toml")]
    config: PathBuf,

    /// API endpoint to connect to (overrides config)
    #[arg(short, long)]
    endpoint: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List a campaign's election events
    Events {
        #[arg(long)]
        campaign: i64,
    },
    /// Show the active event of a campaign
    Active {
        #[arg(long)]
        campaign: i64,
    },
    /// Create an election event
    CreateEvent {
        #[arg(long)]
        campaign: i64,
        #[arg(long)]
        name: String,
        /// simulation | real
        #[arg(long, default_value = "simulation")]
        event_type: String,
        /// Event date (YYYY-MM-DD)
        #[arg(long)]
        date: String,
        /// Voting window start (HH:MM:SS)
        #[arg(long)]
        start: Option<String>,
        /// Voting window end (HH:MM:SS)
        #[arg(long)]
        end: Option<String>,
        #[arg(long)]
        simulation_number: Option<i64>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Activate an event (must be scheduled today)
    Activate { event: i64 },
    /// Deactivate an event
    Deactivate { event: i64 },
    /// Delete an inactive event
    Delete { event: i64 },
    /// Record a vote for a voter
    Vote {
        event: i64,
        #[arg(long, conflicts_with = "document")]
        voter: Option<i64>,
        #[arg(long)]
        document: Option<String>,
    },
    /// Deactivate an event and queue its finalization
    Close {
        event: i64,
        /// User recorded as `validated_by`
        #[arg(long)]
        user: i64,
    },
    /// Show a background job's status
    Job { id: String },
}

// ============ API Response Types ============

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
    #[serde(default)]
    code: String,
}

#[derive(Debug, Deserialize)]
struct ActionResponse {
    success: bool,
    message: String,
}

#[allow(dead_code)]
#[derive(Debug, Deserialize)]
struct EventSummary {
    id: i64,
    name: String,
    event_type: String,
    date: String,
    #[serde(default)]
    start_time: Option<String>,
    #[serde(default)]
    end_time: Option<String>,
    is_active: bool,
    #[serde(default)]
    vote_count: u64,
    #[serde(default)]
    admitting_votes: bool,
}

#[derive(Debug, Deserialize)]
struct JobAccepted {
    job_id: String,
}

// ============ Config ============

#[derive(Debug, Deserialize)]
struct Config {
    #[serde(default)]
    api: ApiConfig,
}

#[derive(Debug, Deserialize, Default)]
struct ApiConfig {
    #[serde(default = "default_api_bind")]
    bind_address: String,
}

fn default_api_bind() -> String {
    "0.0.0.0:8080".to_string()
}

fn endpoint_from_config(path: &Path) -> String {
    let config = std::fs::read_to_string(path)
        .ok()
        .and_then(|content| toml::from_str::<Config>(&content).ok());

    match config {
        Some(config) => {
            // Convert bind address to localhost if it's 0.0.0.0
            let addr = config.api.bind_address;
            if addr.starts_with("0.0.0.0") {
                format!("http://127.0.0.1:{}", addr.split(':').nth(1).unwrap_or("8080"))
            } else {
                format!("http://{}", addr)
            }
        }
        None => "http://127.0.0.1:8080".to_string(),
    }
}

// ============ Main ============

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let endpoint = match &cli.endpoint {
        Some(e) => e.trim_end_matches('/').to_string(),
        None => endpoint_from_config(&cli.config),
    };
    let client = reqwest::Client::new();

    let result = match cli.command {
        Commands::Events { campaign } => list_events(&client, &endpoint, campaign).await,
        Commands::Active { campaign } => show_active(&client, &endpoint, campaign).await,
        Commands::CreateEvent { campaign, name, event_type, date, start, end, simulation_number, notes } => {
            let body = json!({
                "campaign_id": campaign,
                "name": name,
                "event_type": event_type,
                "date": date,
                "start_time": start,
                "end_time": end,
                "simulation_number": simulation_number,
                "notes": notes,
            });
            create_event(&client, &endpoint, body).await
        }
        Commands::Activate { event } => action(&client, &endpoint, &format!("/events/{}/activate", event)).await,
        Commands::Deactivate { event } => action(&client, &endpoint, &format!("/events/{}/deactivate", event)).await,
        Commands::Delete { event } => delete_event(&client, &endpoint, event).await,
        Commands::Vote { event, voter, document } => {
            let body = match (voter, document) {
                (Some(voter), _) => json!({ "voter_id": voter }),
                (None, Some(document)) => json!({ "document_number": document }),
                (None, None) => {
                    eprintln!("Error: either --voter or --document is required");
                    std::process::exit(2);
                }
            };
            record_vote(&client, &endpoint, event, body).await
        }
        Commands::Close { event, user } => close_event(&client, &endpoint, event, user).await,
        Commands::Job { id } => show_job(&client, &endpoint, &id).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

// ============ Commands ============

type CmdResult = Result<(), Box<dyn std::error::Error>>;

/// Turn a non-success response into an error carrying the service's message
async fn check(response: reqwest::Response) -> Result<reqwest::Response, Box<dyn std::error::Error>> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    match response.json::<ErrorResponse>().await {
        Ok(err) => Err(format!("{} ({}, {})", err.error, err.code, status).into()),
        Err(_) => Err(format!("API error: {}", status).into()),
    }
}

async fn list_events(client: &reqwest::Client, endpoint: &str, campaign: i64) -> CmdResult {
    let url = format!("{}/campaigns/{}/events", endpoint, campaign);
    let response = check(client.get(&url).send().await?).await?;
    let events: Vec<EventSummary> = response.json().await?;

    println!();
    println!("Election Events - campaign {}", campaign);
    println!("==============================");
    println!();
    println!("{:<6} {:<28} {:<11} {:<12} {:<8} {:<6}",
        "ID", "NAME", "TYPE", "DATE", "ACTIVE", "VOTES");
    println!("{}", "-".repeat(76));

    for event in &events {
        // Pad before adding color codes
        let active_padded = format!("{:<8}", if event.is_active { "yes" } else { "no" });
        let active = if event.is_active {
            format!("\x1b[32m{}\x1b[0m", active_padded)
        } else {
            active_padded
        };

        println!("{:<6} {:<28} {:<11} {:<12} {} {:<6}",
            event.id,
            event.name,
            event.event_type,
            event.date,
            active,
            event.vote_count
        );
    }
    println!();

    Ok(())
}

async fn show_active(client: &reqwest::Client, endpoint: &str, campaign: i64) -> CmdResult {
    let url = format!("{}/campaigns/{}/events/active", endpoint, campaign);
    let response = check(client.get(&url).send().await?).await?;
    let event: Option<Value> = response.json().await?;

    match event {
        Some(event) => println!("{}", serde_json::to_string_pretty(&event)?),
        None => println!("No active event for campaign {}", campaign),
    }

    Ok(())
}

async fn create_event(client: &reqwest::Client, endpoint: &str, body: Value) -> CmdResult {
    let url = format!("{}/events", endpoint);
    let response = check(client.post(&url).json(&body).send().await?).await?;
    let created: Value = response.json().await?;

    println!("Event created: {}", created["event_id"]);
    Ok(())
}

async fn action(client: &reqwest::Client, endpoint: &str, path: &str) -> CmdResult {
    let url = format!("{}{}", endpoint, path);
    let response = check(client.post(&url).send().await?).await?;
    let result: ActionResponse = response.json().await?;

    if result.success {
        println!("{}", result.message);
    }
    Ok(())
}

async fn delete_event(client: &reqwest::Client, endpoint: &str, event: i64) -> CmdResult {
    let url = format!("{}/events/{}", endpoint, event);
    let response = check(client.delete(&url).send().await?).await?;
    let result: ActionResponse = response.json().await?;

    println!("{}", result.message);
    Ok(())
}

async fn record_vote(client: &reqwest::Client, endpoint: &str, event: i64, body: Value) -> CmdResult {
    let url = format!("{}/events/{}/votes", endpoint, event);
    let response = check(client.post(&url).json(&body).send().await?).await?;
    let recorded: Value = response.json().await?;

    println!("{} (record {})", recorded["message"].as_str().unwrap_or("Voto registrado"), recorded["vote_record_id"]);
    Ok(())
}

async fn close_event(client: &reqwest::Client, endpoint: &str, event: i64, user: i64) -> CmdResult {
    let url = format!("{}/events/{}/close", endpoint, event);
    let response = check(client.post(&url).json(&json!({ "validated_by": user })).send().await?).await?;
    let accepted: JobAccepted = response.json().await?;

    println!("Event {} closed; finalization queued as job {}", event, accepted.job_id);
    println!("Follow with: diadctl job {}", accepted.job_id);
    Ok(())
}

async fn show_job(client: &reqwest::Client, endpoint: &str, id: &str) -> CmdResult {
    let url = format!("{}/jobs/{}", endpoint, id);
    let response = check(client.get(&url).send().await?).await?;
    let status: Value = response.json().await?;

    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}
