//! # Key Migrate CLI (`keymig`)
//!
//! ## Usage
//!
//! ```bash
//! keymig --config ./config/keymig.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `keymig init` | Create the SQLite database and run schema migrations |
//! | `keymig keys` | List configured keys and their artifacts |
//! | `keymig convert [KEY\|all]` | Fetch, transform and validate legacy keys |
//! | `keymig insert [KEY\|all]` | Materialize converted keys with their media |
//! | `keymig show <KEY_ID>` | Print a persisted key |
//!
//! ## Exit codes
//!
//! `0` success, `2` configuration, `3` transformation, `4` validation,
//! `5` materialization, `6` legacy fetch or I/O. A batch exits with the
//! highest code of its keys.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use key_migrate::error::MigrationError;
use key_migrate::{config, convert, db, insert, keys, migrate, show, sqlite_store};

/// Migrates identification keys from the legacy key API.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/keymig.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "keymig",
    about = "Migrate legacy identification keys into validated documents and a relational store",
    version
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true, default_value = "./config/keymig.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// List configured keys with the presence of their artifacts.
    Keys,

    /// Fetch keys from the legacy API and write validated documents.
    Convert {
        /// A configured key, or `all`.
        key: Option<String>,
    },

    /// Insert converted documents into the database, fetching media.
    Insert {
        /// A configured key, or `all`.
        key: Option<String>,
    },

    /// Print a persisted key.
    Show { key_id: i64 },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<i32, MigrationError> {
    let cfg = config::load_config(&cli.config).map_err(MigrationError::Config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await.map_err(MigrationError::Io)?;
            println!("Database initialized successfully.");
            Ok(0)
        }
        Commands::Keys => {
            keys::list_keys(&cfg).map_err(MigrationError::Io)?;
            Ok(0)
        }
        Commands::Convert { key } => convert::run_convert(&cfg, key.as_deref()).await,
        Commands::Insert { key } => insert::run_insert(&cfg, key.as_deref()).await,
        Commands::Show { key_id } => {
            let pool = db::connect(&cfg).await.map_err(MigrationError::Io)?;
            let store = sqlite_store::SqliteStore::new(pool);
            let result = show::run_show(&store, key_id).await;
            store.pool().close().await;
            result.map_err(MigrationError::Io)?;
            Ok(0)
        }
    }
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            e.exit_code()
        }
    };
    std::process::exit(code);
}
