use anyhow::Context;
use clap::{Parser, Subcommand};
use classroom::api::{start_server, AppState, Services};
use classroom::config::AppConfig;
use classroom::domain::user::{NewUser, Role};
use classroom::logging;
use classroom::metrics::init_metrics;
use classroom::storage::{SqliteStorage, Storage};
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "classroom")]
#[command(about = "Online classroom backend")]
#[command(version)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API
    Serve {
        /// Override the configured port
        #[arg(long)]
        port: Option<u16>,
    },
    /// Create or update the database schema
    Migrate,
    /// Create a staff administrator
    CreateAdmin {
        #[arg(long)]
        email: String,
        #[arg(long)]
        phone: String,
        #[arg(long)]
        name: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let _log_guard = logging::init_logging("logs");

    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref()).context("loading configuration")?;

    match cli.command {
        Commands::Serve { port } => {
            config.validate()?;
            init_metrics(config.metrics.addr.as_deref());

            let storage: Arc<dyn Storage> = Arc::new(
                SqliteStorage::open(&config.database.path)
                    .with_context(|| format!("opening database {}", config.database.path))?,
            );
            let services = Services::from_config(&config)?;
            let state = AppState::new(&config, storage, services);
            let port = port.unwrap_or(config.server.port);
            start_server(state, &config.server.host, port).await?;
        }
        Commands::Migrate => {
            // opening applies the schema
            SqliteStorage::open(&config.database.path)
                .with_context(|| format!("migrating {}", config.database.path))?;
            println!("✅ Database at {} is up to date", config.database.path);
        }
        Commands::CreateAdmin { email, phone, name } => {
            let storage = SqliteStorage::open(&config.database.path)?;
            let admin = NewUser {
                email,
                phone_number: phone,
                full_name: name,
                role: Role::Admin,
                is_staff: true,
            }
            .validated()?;
            let user = storage.create_user(&admin).await?;
            info!("Created admin user {}", user.id);
            println!("✅ Created admin {} ({})", user.email, user.phone_number);
        }
    }

    Ok(())
}
