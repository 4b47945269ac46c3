//! Intake CLI - vehicle inspection server and client
//!
//! # Server
//!
//! ```bash
//! intake serve                         # Start HTTP server (port 3000)
//! intake serve --storage s3 -p 8080    # Use the S3 backend
//! ```
//!
//! # Client
//!
//! ```bash
//! intake draft-template > draft.json   # Blank draft to fill in
//! intake validate draft.json           # Check answers offline
//! intake submit draft.json             # Upload media and submit (resumable)
//! intake list                          # Latest inspections
//! intake show <id>                     # One inspection with media links
//! intake review <id> approved          # Set reviewer status
//! intake purge --yes                   # Delete every record
//! ```

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use intake::{
    client::{submit_draft, Draft, IntakeClient},
    validate_answers, validate_inspection, Config, ReviewStatus, StorageKind,
};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt::format::Format, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "intake")]
#[command(about = "Vehicle inspection intake server and client", long_about = None)]
struct Cli {
    /// Server base URL for client commands
    #[arg(long, global = true, env = "INTAKE_SERVER_URL", default_value = "http://localhost:3000")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start HTTP server
    Serve {
        /// Port to listen on (overrides PORT)
        #[arg(short, long)]
        port: Option<u16>,

        /// Storage backend: s3 or local (overrides STORAGE_BACKEND)
        #[arg(long)]
        storage: Option<StorageKind>,
    },

    /// Upload a draft's media and submit it
    Submit {
        /// Draft JSON file (see draft-template)
        draft: PathBuf,
    },

    /// Print a blank draft
    DraftTemplate,

    /// Validate a draft or a final payload without contacting the server
    Validate {
        /// Draft file, or a JSON payload with media URLs
        input: PathBuf,
    },

    /// List the latest inspections
    List,

    /// Show one inspection
    Show {
        id: Uuid,
    },

    /// Set the reviewer status of an inspection
    Review {
        id: Uuid,

        /// checked, approved or rejected
        status: ReviewStatus,
    },

    /// Delete every inspection record
    Purge {
        /// Confirm deletion
        #[arg(long)]
        yes: bool,
    },
}

fn init_tracing() {
    let console_fmt = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .event_format(Format::default().compact().with_target(false));
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "intake=info,tower_http=info".into()),
        )
        .with(console_fmt)
        .init();
}

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let client = IntakeClient::new(&cli.server);

    let result = match cli.command {
        Commands::Serve { port, storage } => cmd_serve(port, storage).await,
        Commands::Submit { draft } => cmd_submit(&client, &draft).await,
        Commands::DraftTemplate => cmd_draft_template(),
        Commands::Validate { input } => cmd_validate(&input),
        Commands::List => cmd_list(&client).await,
        Commands::Show { id } => cmd_show(&client, id).await,
        Commands::Review { id, status } => cmd_review(&client, id, status).await,
        Commands::Purge { yes } => cmd_purge(&client, yes).await,
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn cmd_serve(port: Option<u16>, storage: Option<StorageKind>) -> anyhow::Result<()> {
    let mut config = Config::from_env().map_err(anyhow::Error::msg)?;
    if let Some(port) = port {
        config = config.with_port(port);
    }
    if let Some(storage) = storage {
        config.storage = storage;
    }

    intake::start_server(config)
        .await
        .map_err(|e| anyhow::anyhow!("{}", e))
}

async fn cmd_submit(client: &IntakeClient, draft: &Path) -> anyhow::Result<()> {
    eprintln!("📄 Submitting draft: {}", draft.display());

    let response = submit_draft(client, draft).await?;

    eprintln!("✅ Inspection {} stored ({})", response.outcome.id, response.outcome.status);
    for target in &response.outcome.forwarded {
        match &target.error {
            None => eprintln!("   📤 {}: delivered", target.target),
            Some(err) => eprintln!("   ⚠️  {}: {}", target.target, err),
        }
    }
    println!("{}", response.outcome.id);
    Ok(())
}

fn cmd_draft_template() -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(&Draft::template())?);
    Ok(())
}

fn cmd_validate(input: &Path) -> anyhow::Result<()> {
    eprintln!("✔️  Validating: {}", input.display());

    let content = fs::read_to_string(input)
        .with_context(|| format!("cannot read {}", input.display()))?;
    let value: Value = serde_json::from_str(&content)?;

    // A draft carries its answers under "fields"
    let result = match value.get("fields") {
        Some(_) => {
            let draft: Draft = serde_json::from_value(value)?;
            draft.validate(input).map_err(|e| match e {
                intake::ClientError::Invalid(errors) => errors,
                other => vec![other.to_string()],
            })
        }
        None if value.get("crlvPhotoUrl").is_some() => validate_inspection(&value),
        None => validate_answers(&value),
    };

    match result {
        Ok(()) => {
            eprintln!("✅ Valid");
            Ok(())
        }
        Err(errors) => {
            for err in &errors {
                eprintln!("   - {}", err);
            }
            bail!("{} problem(s) found", errors.len())
        }
    }
}

async fn cmd_list(client: &IntakeClient) -> anyhow::Result<()> {
    let records = client.list().await?;
    if records.is_empty() {
        eprintln!("📋 No inspections yet.");
        return Ok(());
    }

    eprintln!("📋 Inspections ({}):\n", records.len());
    for r in records {
        println!(
            "  {}  {:<9} {:<10} {} ({})",
            r.created_at.format("%Y-%m-%d %H:%M"),
            r.status,
            r.form.license_plate,
            r.form.owner_name,
            r.id
        );
    }
    Ok(())
}

async fn cmd_show(client: &IntakeClient, id: Uuid) -> anyhow::Result<()> {
    let detail = client.get(id).await?;
    println!("{}", serde_json::to_string_pretty(&detail)?);
    Ok(())
}

async fn cmd_review(client: &IntakeClient, id: Uuid, status: ReviewStatus) -> anyhow::Result<()> {
    let record = client.review(id, status).await?;
    eprintln!("✅ {} is now {}", record.id, record.status);
    Ok(())
}

async fn cmd_purge(client: &IntakeClient, yes: bool) -> anyhow::Result<()> {
    if !yes {
        bail!("refusing to delete every record without --yes");
    }
    let deleted = client.purge().await?;
    eprintln!("🗑️  Deleted {} records", deleted);
    Ok(())
}
