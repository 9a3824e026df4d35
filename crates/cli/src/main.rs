//! Cartwright CLI - Migrations and operator tooling for the checkout core.
//!
//! # Usage
//!
//! ```bash
//! # Run checkout database migrations
//! cw-cli migrate
//!
//! # Seed products and stock from a YAML catalog
//! cw-cli seed crates/cli/seed/catalog.yaml
//!
//! # Inspect and adjust stock
//! cw-cli stock check 1 --quantity 3
//! cw-cli stock set 1 --quantity 40 --min 5 --max 100
//! cw-cli stock low
//!
//! # Inspect and cancel orders
//! cw-cli order list 4f1c2a8e-9b3d-4c5e-8f6a-1b2c3d4e5f60
//! cw-cli order show 4f1c2a8e-9b3d-4c5e-8f6a-1b2c3d4e5f60 12
//! cw-cli order cancel 4f1c2a8e-9b3d-4c5e-8f6a-1b2c3d4e5f60 12
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `seed` - Insert products with initial stock
//! - `stock` - Check, set and report stock levels
//! - `order` - List, show or cancel a user's orders

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use cartwright_core::UserId;

mod commands;

#[derive(Parser)]
#[command(name = "cw-cli")]
#[command(author, version, about = "Cartwright checkout CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Seed products and initial stock from a YAML file
    Seed {
        /// Path to the catalog YAML file
        file: PathBuf,
    },
    /// Inspect and adjust stock
    Stock {
        #[command(subcommand)]
        action: StockAction,
    },
    /// Inspect and cancel orders
    Order {
        #[command(subcommand)]
        action: OrderAction,
    },
}

#[derive(Subcommand)]
enum StockAction {
    /// Show availability of a product
    Check {
        /// Product ID
        product_id: i32,

        /// Units to check for
        #[arg(short, long, default_value_t = 1)]
        quantity: i32,
    },
    /// Set a product's stock counters (reservations are kept)
    Set {
        /// Product ID
        product_id: i32,

        /// Units on hand
        #[arg(short, long)]
        quantity: i32,

        /// Low-water mark
        #[arg(long, default_value_t = 0)]
        min: i32,

        /// Target level (defaults to the larger of quantity and min)
        #[arg(long)]
        max: Option<i32>,

        /// Unit cost
        #[arg(long)]
        cost_price: Option<Decimal>,
    },
    /// Count active products running low
    Low,
}

#[derive(Subcommand)]
enum OrderAction {
    /// List a user's orders, most recent first
    List {
        /// Owner's user ID (UUID)
        user_id: UserId,
    },
    /// Show an order and its lines
    Show {
        /// Owner's user ID (UUID)
        user_id: UserId,

        /// Order ID
        order_id: i32,
    },
    /// Cancel an order and release its stock
    Cancel {
        /// Owner's user ID (UUID)
        user_id: UserId,

        /// Order ID
        order_id: i32,
    },
}

#[tokio::main]
async fn main() {
    // Defaults to info level for our crates if RUST_LOG is not set
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "cartwright_cli=info,cartwright_checkout=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Seed { file } => commands::seed::catalog(&file).await?,
        Commands::Stock { action } => match action {
            StockAction::Check {
                product_id,
                quantity,
            } => commands::stock::check(product_id, quantity).await?,
            StockAction::Set {
                product_id,
                quantity,
                min,
                max,
                cost_price,
            } => {
                let levels = commands::stock::levels(quantity, min, max, cost_price);
                commands::stock::set(product_id, levels).await?;
            }
            StockAction::Low => commands::stock::low().await?,
        },
        Commands::Order { action } => match action {
            OrderAction::List { user_id } => commands::order::list(user_id).await?,
            OrderAction::Show { user_id, order_id } => {
                commands::order::show(user_id, order_id).await?;
            }
            OrderAction::Cancel { user_id, order_id } => {
                commands::order::cancel(user_id, order_id).await?;
            }
        },
    }
    Ok(())
}
