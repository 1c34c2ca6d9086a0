//! DCA core - operator CLI
//!
//! This binary provides three groups of subcommands:
//! - keys: generate, inspect and use encryption keys (keygen, keys, seal, open, rotate)
//! - market: price snapshot with MA200 and RSI14 (price)
//! - exchange: account and order operations (balance, orders, trades, buy, cancel, test-connection)

use anyhow::Result;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "dca-core")]
#[command(about = "Credential vault and exchange tooling for the DCA dashboard", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file (defaults apply when omitted)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON log lines on the console
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a new 256-bit encryption key (hex)
    Keygen,

    /// Show configured key ids, fingerprints and the primary
    Keys,

    /// Encrypt a value under the primary key
    Seal {
        /// Value to encrypt; read from stdin when omitted
        value: Option<String>,
    },

    /// Decrypt a stored token
    Open {
        /// Ciphertext token (3, 5, 6 or 10 fields)
        token: String,

        /// Print the plaintext instead of only its key id
        #[arg(long)]
        reveal: bool,
    },

    /// Re-encrypt a token under the primary key if it is not already current
    Rotate {
        /// Ciphertext token
        token: String,
    },

    /// Current BTC/AUD price with MA200 and RSI14
    Price {
        /// Take the price from the exchange midpoint instead of the market data provider
        #[arg(long)]
        exchange: bool,

        #[command(flatten)]
        credential: commands::CredentialArgs,
    },

    /// Show account balances
    Balance {
        /// Only this asset (e.g. AUD, BTC)
        asset: Option<String>,

        #[command(flatten)]
        credential: commands::CredentialArgs,
    },

    /// List orders
    Orders {
        /// Only open orders
        #[arg(long, conflicts_with = "history")]
        active: bool,

        /// Only closed and cancelled orders
        #[arg(long)]
        history: bool,

        #[command(flatten)]
        credential: commands::CredentialArgs,
    },

    /// List trades
    Trades {
        #[command(flatten)]
        credential: commands::CredentialArgs,
    },

    /// Buy BTC with AUD as an immediate-or-cancel limit order
    Buy {
        /// AUD to spend
        #[arg(long)]
        aud: Decimal,

        /// Limit price allowance above the best ask, in percent (0-10)
        #[arg(long, default_value = "1")]
        slippage: Decimal,

        /// Actually submit the order (otherwise only the terms are shown)
        #[arg(long)]
        confirm: bool,

        #[command(flatten)]
        credential: commands::CredentialArgs,
    },

    /// Cancel an order
    Cancel {
        /// Order id
        order_id: u64,

        #[command(flatten)]
        credential: commands::CredentialArgs,
    },

    /// Check that the exchange accepts the API key
    TestConnection {
        #[command(flatten)]
        credential: commands::CredentialArgs,
    },
}

fn setup_logging(verbose: bool, json: bool, command_name: &str) -> Result<()> {
    // Create logs directory
    std::fs::create_dir_all("logs")?;

    // Create log file with naming pattern: {command}_{date}.log
    let log_filename = format!(
        "{}_{}.log",
        command_name,
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
    );
    let log_path = PathBuf::from("logs").join(&log_filename);

    // Set log level - filter out noisy external crates
    let level = if verbose { "debug" } else { "info" };
    let filter_str = format!(
        "{},hyper=warn,hyper_util=warn,reqwest=warn,rustls=warn,h2=warn",
        level
    );
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    // File appender
    let file_appender = tracing_appender::rolling::never("logs", &log_filename);
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file_appender)
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(false);

    // Console goes to stderr so command output stays pipeable
    if json {
        let console_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer)
            .with(console_layer)
            .init();
    } else {
        let console_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(true);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer)
            .with(console_layer)
            .init();
    }

    info!("Logging initialized");
    info!("Log file: {}", log_path.display());

    Ok(())
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let command_name = match &cli.command {
        Commands::Keygen => "keygen",
        Commands::Keys => "keys",
        Commands::Seal { .. } => "seal",
        Commands::Open { .. } => "open",
        Commands::Rotate { .. } => "rotate",
        Commands::Price { .. } => "price",
        Commands::Balance { .. } => "balance",
        Commands::Orders { .. } => "orders",
        Commands::Trades { .. } => "trades",
        Commands::Buy { .. } => "buy",
        Commands::Cancel { .. } => "cancel",
        Commands::TestConnection { .. } => "test-connection",
    };

    // Setup logging
    setup_logging(cli.verbose, cli.json_logs, command_name)?;

    let config = cli.config;

    // Execute command
    match cli.command {
        Commands::Keygen => commands::keys::keygen(),
        Commands::Keys => commands::keys::list(),
        Commands::Seal { value } => commands::keys::seal(value),
        Commands::Open { token, reveal } => commands::keys::open(token, reveal),
        Commands::Rotate { token } => commands::keys::rotate(token),

        Commands::Price {
            exchange,
            credential,
        } => commands::market::price(config, exchange, credential),

        Commands::Balance { asset, credential } => {
            commands::exchange::balance(config, credential, asset)
        }
        Commands::Orders {
            active,
            history,
            credential,
        } => commands::exchange::orders(config, credential, active, history),
        Commands::Trades { credential } => commands::exchange::trades(config, credential),
        Commands::Buy {
            aud,
            slippage,
            confirm,
            credential,
        } => commands::exchange::buy(config, credential, aud, slippage, confirm),
        Commands::Cancel {
            order_id,
            credential,
        } => commands::exchange::cancel(config, credential, order_id),
        Commands::TestConnection { credential } => {
            commands::exchange::test_connection(config, credential)
        }
    }
}
