use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use dato_backup_lib::cms::{DatoCmsClient, DEFAULT_API_BASE_URL};
use dato_backup_lib::crypto::TokenCipher;
use dato_backup_lib::server::{run_server, ServerAppState};
use dato_backup_lib::storage::Storage;
use dato_backup_lib::sweep::run_scheduled_sweep;

/// Scheduled environment backups for DatoCMS projects
#[derive(Parser, Debug)]
#[command(name = "dato-backup")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory for configs, registrations, and run history
    /// (defaults to the platform data dir)
    #[arg(long, env = "DATO_BACKUP_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Shared secret required by the cron endpoint; also derives the token
    /// encryption key when --encryption-key is unset
    #[arg(long, env = "CRON_SECRET", hide_env_values = true)]
    cron_secret: Option<String>,

    /// 64 hex character key for API token encryption at rest
    #[arg(long, env = "ENCRYPTION_KEY", hide_env_values = true)]
    encryption_key: Option<String>,

    /// Base URL of the DatoCMS site API
    #[arg(long, env = "DATO_API_BASE_URL", default_value = DEFAULT_API_BASE_URL)]
    cms_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server
    Serve {
        /// Port to bind the server to
        #[arg(long, default_value = "3420")]
        port: u16,

        /// Address to bind the server to
        #[arg(long, default_value = "0.0.0.0")]
        bind: String,

        /// Allowed CORS origin (repeatable; any origin when omitted)
        #[arg(long = "cors-origin")]
        cors_origins: Vec<String>,
    },
    /// Run one backup sweep and exit
    Sweep,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    let cron_secret = cli.cron_secret.clone().unwrap_or_default();
    if cron_secret.is_empty() {
        log::warn!("CRON_SECRET is not set; the cron endpoint will reject all requests");
    }

    let cipher = TokenCipher::from_secrets(
        cli.encryption_key.as_deref(),
        cli.cron_secret.as_deref(),
    )
    .map_err(anyhow::Error::msg)?;

    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => dirs::data_dir()
            .context("Could not determine the platform data directory; set --data-dir")?
            .join("dato-backup"),
    };

    let storage = Storage::new(data_dir, cipher).map_err(anyhow::Error::msg)?;
    log::info!("Using data directory {:?}", storage.data_dir());

    let cms = Arc::new(DatoCmsClient::new(cli.cms_url));

    match cli.command {
        Command::Serve {
            port,
            bind,
            cors_origins,
        } => {
            let cors = if cors_origins.is_empty() {
                None
            } else {
                Some(cors_origins)
            };
            let state = ServerAppState::new(storage, cms, cron_secret);
            run_server(port, &bind, state, cors)
                .await
                .map_err(anyhow::Error::msg)?;
        }
        Command::Sweep => {
            let response = run_scheduled_sweep(&storage, cms.as_ref())
                .await
                .map_err(anyhow::Error::msg)?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
    }

    Ok(())
}
