use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod config;

use commands::*;

#[derive(Parser)]
#[command(version, about = "Offline tools for the Tangem card protocol")]
struct Cli {
    /// Trace level output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a derivation path and show its encodings
    Path {
        /// Path such as m/44'/0'/0'/0/0
        #[arg(required = true)]
        path: String,
    },

    /// Print the BIP44 path of the first address of a coin
    Bip44 {
        /// SLIP-44 coin type
        #[arg(required = true)]
        coin: u32,

        #[arg(long, default_value_t = 0)]
        account: u32,

        /// Use the change chain instead of the receiving one
        #[arg(long)]
        change: bool,

        #[arg(long, default_value_t = 0)]
        index: u32,
    },

    /// Derive a child public key without a card
    Derive {
        /// Compressed secp256k1 wallet key in hex
        #[arg(long)]
        public_key: String,

        /// Wallet chain code in hex
        #[arg(long)]
        chain_code: String,

        /// Non hardened derivation path
        #[arg(required = true)]
        path: String,
    },

    /// Decode a TLV payload
    Tlv {
        /// Payload in hex
        #[arg(required = true)]
        data: String,
    },

    /// Decode a raw card response, status word included
    Response {
        /// Response bytes in hex
        #[arg(required = true)]
        data: String,
    },

    /// Compute the CRC-16 that guards secure channel frames
    Crc {
        /// Data in hex
        #[arg(required = true)]
        data: String,
    },

    /// Show the effective engine configuration
    Config {
        /// TOML file layered over the defaults
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match &cli.command {
        Commands::Path { path } => path_command(path),
        Commands::Bip44 {
            coin,
            account,
            change,
            index,
        } => bip44_command(*coin, *account, *change, *index),
        Commands::Derive {
            public_key,
            chain_code,
            path,
        } => derive_command(public_key, chain_code, path),
        Commands::Tlv { data } => tlv_command(data),
        Commands::Response { data } => response_command(data),
        Commands::Crc { data } => crc_command(data),
        Commands::Config { file } => config_command(file.as_deref()),
    }
}

fn setup_logging(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_ansi(true)
        .init();
}
