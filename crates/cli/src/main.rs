//! Geostage CLI - command-line client for the Geostage Orchestrator daemon.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tabled::{Table, Tabled};

const DEFAULT_RPC_URL: &str = "http://127.0.0.1:9527";

#[derive(Parser)]
#[command(name = "geostage")]
#[command(about = "Geostage Orchestrator CLI", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// RPC server URL
    #[arg(long, env = "GEOSTAGE_RPC_URL", default_value = DEFAULT_RPC_URL)]
    rpc_url: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a new job
    Submit {
        /// Job type (e.g., echo, fan_out_squares, two_stage_sum)
        #[arg(short, long)]
        job_type: String,

        /// Parameters as a JSON string
        #[arg(short, long, default_value = "{}")]
        parameters: String,
    },

    /// Fetch a job's current state
    Status {
        /// Job ID
        job_id: String,
    },

    /// Cancel a non-terminal job
    Cancel {
        /// Job ID
        job_id: String,
    },

    /// Show aggregate queue/job/task stats
    Stats,

    /// Trigger an on-demand janitor sweep
    Maintenance,
}

#[derive(Serialize)]
struct JsonRpcRequest {
    jsonrpc: String,
    method: String,
    params: serde_json::Value,
    id: u64,
}

#[derive(Deserialize)]
struct JsonRpcResponse {
    #[allow(dead_code)]
    jsonrpc: String,
    #[allow(dead_code)]
    id: u64,
    result: Option<serde_json::Value>,
    error: Option<JsonRpcError>,
}

#[derive(Deserialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

#[derive(Deserialize, Tabled)]
struct SubmitResult {
    job_id: String,
    status: String,
}

#[derive(Tabled)]
struct StatusRow {
    field: String,
    value: String,
}

async fn call_rpc(url: &str, method: &str, params: serde_json::Value) -> Result<serde_json::Value> {
    let request = JsonRpcRequest {
        jsonrpc: "2.0".to_string(),
        method: method.to_string(),
        params,
        id: 1,
    };

    let client = reqwest::Client::new();
    let response: JsonRpcResponse = client
        .post(url)
        .json(&request)
        .send()
        .await
        .context("Failed to connect to daemon")?
        .json()
        .await
        .context("Failed to parse response")?;

    if let Some(error) = response.error {
        anyhow::bail!("RPC error ({}): {}", error.code, error.message);
    }

    response.result.ok_or_else(|| anyhow::anyhow!("No result in response"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Submit { job_type, parameters } => {
            let parameters_json: serde_json::Value = serde_json::from_str(&parameters).context("Invalid JSON parameters")?;

            let params = json!({
                "job_type": job_type,
                "parameters": parameters_json,
            });

            let result = call_rpc(&cli.rpc_url, "job.submit.v1", params).await?;
            let submitted: SubmitResult = serde_json::from_value(result)?;

            println!("{}", "✓ Job submitted".green().bold());
            println!();
            println!("{}", Table::new(vec![submitted]));
        }

        Commands::Status { job_id } => {
            let params = json!({ "job_id": job_id });
            let result = call_rpc(&cli.rpc_url, "job.status.v1", params).await?;

            let rows = vec![
                StatusRow { field: "job_id".into(), value: result["job_id"].as_str().unwrap_or_default().into() },
                StatusRow { field: "job_type".into(), value: result["job_type"].as_str().unwrap_or_default().into() },
                StatusRow { field: "status".into(), value: result["status"].as_str().unwrap_or_default().into() },
                StatusRow {
                    field: "stage".into(),
                    value: format!("{}/{}", result["current_stage"], result["total_stages"]),
                },
                StatusRow { field: "result".into(), value: result["result"].to_string() },
                StatusRow {
                    field: "error_details".into(),
                    value: result["error_details"].as_str().unwrap_or("-").into(),
                },
            ];
            println!("{}", Table::new(rows));
        }

        Commands::Cancel { job_id } => {
            let params = json!({ "job_id": job_id });
            let result = call_rpc(&cli.rpc_url, "job.cancel.v1", params).await?;

            if result["cancelled"].as_bool().unwrap_or(false) {
                println!("{}", format!("✓ Job {} cancelled", job_id).green().bold());
            } else {
                println!("{}", format!("○ Job {} was already terminal, nothing to cancel", job_id).yellow());
            }
        }

        Commands::Stats => {
            println!("{}", "System Stats".cyan().bold());
            println!();

            match call_rpc(&cli.rpc_url, "admin.stats.v1", json!({})).await {
                Ok(stats) => {
                    println!("  {} {}", "RPC URL:".bold(), cli.rpc_url);
                    println!("  {} {}", "Status:".bold(), "ONLINE".green());
                    println!();
                    println!("  {} {}", "Jobs total:".bold(), stats["jobs_total"]);
                    println!("  {} {}", "Jobs processing:".bold(), stats["jobs_processing"]);
                    println!("  {} {}", "Jobs terminal:".bold(), stats["jobs_terminal"]);
                    println!();
                    println!("  {} {}", "Tasks total:".bold(), stats["tasks_total"]);
                    println!("  {} {}", "Tasks queued:".bold(), stats["tasks_queued"]);
                    println!("  {} {}", "Tasks processing:".bold(), stats["tasks_processing"]);
                    println!("  {} {}", "Tasks terminal:".bold(), stats["tasks_terminal"]);
                    println!();
                    println!("  {} {} seconds", "Uptime:".bold(), stats["uptime_seconds"]);
                }
                Err(e) => {
                    println!("  {} {}", "Status:".bold(), "ERROR".red());
                    println!("  {} {}", "Error:".bold(), e);
                }
            }
        }

        Commands::Maintenance => {
            println!("{}", "Triggering janitor sweep...".cyan().bold());

            match call_rpc(&cli.rpc_url, "admin.maintenance.v1", json!({})).await {
                Ok(_) => println!("  {} sweep complete", "✓".green()),
                Err(e) => println!("  {} sweep failed: {}", "✗".red(), e),
            }
        }
    }

    Ok(())
}
