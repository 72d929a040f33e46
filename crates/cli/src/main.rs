//! Pharmacy back-office CLI: migrations, admin bootstrap and seed data.
//!
//! # Usage
//!
//! ```bash
//! # Apply pending migrations
//! rx-cli migrate
//!
//! # Create a verified admin account
//! rx-cli admin create -e admin@example.com -n "Admin Name" -p 'long passphrase'
//!
//! # Load the development catalog and sample orders
//! rx-cli seed --file crates/cli/seed/catalog.yaml --orders 120
//! ```
//!
//! All commands read `DATABASE_URL` (and `.env`).

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "rx-cli")]
#[command(author, version, about = "Pharmacy back-office CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Manage admin accounts
    Admin {
        #[command(subcommand)]
        action: AdminAction,
    },
    /// Seed the database with development data
    Seed {
        /// YAML file describing the catalog, discount codes and customers
        #[arg(short, long, default_value = "crates/cli/seed/catalog.yaml")]
        file: String,

        /// Number of sample orders to generate
        #[arg(short, long, default_value_t = 120)]
        orders: u32,
    },
}

#[derive(Subcommand)]
enum AdminAction {
    /// Create a verified admin account
    Create {
        /// Admin email address
        #[arg(short, long)]
        email: String,

        /// Admin display name
        #[arg(short, long)]
        name: String,

        /// Initial password (at least 6 characters)
        #[arg(short, long)]
        password: String,
    },
    /// Promote an existing account to admin
    Promote {
        /// Account email address
        #[arg(short, long)]
        email: String,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rx_cli=info,pharmacy_admin=info".into()),
        )
        .init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let pool = commands::connect().await?;
    match cli.command {
        Commands::Migrate => commands::migrate::run(&pool).await?,
        Commands::Admin { action } => match action {
            AdminAction::Create {
                email,
                name,
                password,
            } => {
                commands::admin::create_user(&pool, &email, &name, &password).await?;
            }
            AdminAction::Promote { email } => {
                commands::admin::promote(&pool, &email).await?;
            }
        },
        Commands::Seed { file, orders } => {
            commands::seed::run(&pool, &file, orders).await?;
        }
    }
    Ok(())
}
