//! burrow — operator CLI for the tenant lifecycle controller.
//!
//! ```text
//! burrow tenant create alice --secret-token tok --idle-budget 600
//! burrow tenant list
//! burrow wake alice
//! ```

mod client;

use anyhow::Result;
use clap::{Parser, Subcommand};

use client::{ApiClient, CreateTenant, PatchTenant};

#[derive(Parser)]
#[command(name = "burrow", about = "Tenant lifecycle operations")]
struct Cli {
    /// Orchestrator API base URL.
    #[arg(long, env = "BURROW_API", default_value = "http://localhost:8080")]
    api: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Tenant record operations.
    Tenant {
        #[command(subcommand)]
        command: TenantCommand,
    },
    /// Wake a tenant and print its pod address.
    Wake {
        tenant_id: String,
    },
}

#[derive(Subcommand)]
enum TenantCommand {
    /// Create a tenant record.
    Create {
        tenant_id: String,
        /// Tenant-owned messaging credential.
        #[arg(long, default_value = "")]
        secret_token: String,
        /// Idle budget in seconds (0 = server default).
        #[arg(long, default_value = "0")]
        idle_budget: i64,
    },
    /// List all tenants.
    List,
    /// Show one tenant.
    Get {
        tenant_id: String,
    },
    /// Update the secret token and/or idle budget.
    Update {
        tenant_id: String,
        #[arg(long)]
        secret_token: Option<String>,
        #[arg(long)]
        idle_budget: Option<i64>,
    },
    /// Delete a tenant and all of its resources.
    Delete {
        tenant_id: String,
    },
    /// Refresh a tenant's activity stamp.
    Activity {
        tenant_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let client = ApiClient::new(&cli.api)?;

    match cli.command {
        Command::Tenant { command } => run_tenant(&client, command).await,
        Command::Wake { tenant_id } => {
            let body = client.wake(&tenant_id).await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
            Ok(())
        }
    }
}

async fn run_tenant(client: &ApiClient, command: TenantCommand) -> Result<()> {
    match command {
        TenantCommand::Create {
            tenant_id,
            secret_token,
            idle_budget,
        } => {
            let body = client
                .create_tenant(&CreateTenant {
                    tenant_id: &tenant_id,
                    secret_token: &secret_token,
                    idle_budget_seconds: idle_budget,
                })
                .await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        TenantCommand::List => {
            let body = client.list_tenants().await?;
            for rec in body.as_array().into_iter().flatten() {
                println!(
                    "{:<24} {:<14} {:<16} {}",
                    rec["tenant_id"].as_str().unwrap_or("-"),
                    rec["status"].as_str().unwrap_or("-"),
                    rec["pod_address"].as_str().filter(|a| !a.is_empty()).unwrap_or("-"),
                    rec["last_active_at"].as_str().unwrap_or("-"),
                );
            }
        }
        TenantCommand::Get { tenant_id } => {
            let body = client.get_tenant(&tenant_id).await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        TenantCommand::Update {
            tenant_id,
            secret_token,
            idle_budget,
        } => {
            let body = client
                .update_tenant(
                    &tenant_id,
                    &PatchTenant {
                        secret_token: secret_token.as_deref(),
                        idle_budget_seconds: idle_budget,
                    },
                )
                .await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        TenantCommand::Delete { tenant_id } => {
            client.delete_tenant(&tenant_id).await?;
            println!("deleted {tenant_id}");
        }
        TenantCommand::Activity { tenant_id } => {
            client.touch_activity(&tenant_id).await?;
            println!("touched {tenant_id}");
        }
    }
    Ok(())
}
