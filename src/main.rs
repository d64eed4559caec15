use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use tracing::Level;

use fnsign::config::ConfigLoader;
use fnsign::fnsign::canonical::Canonicalizer;
use fnsign::fnsign::credentials::Credential;
use fnsign::fnsign::replay_window::{parse_timestamp, TIMESTAMP_HEADER};
use fnsign::fnsign::sign_request::sign_parts;

#[derive(Parser)]
#[command(name = "fnsign", version, about = "FNSIGN request signing and verification")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the verifying HTTP server
    Serve {
        /// Path to a TOML config file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Print the headers for a signed request
    Sign {
        #[arg(long)]
        access_key_id: String,
        #[arg(long, env = "FNSIGN_SECRET_KEY", hide_env_values = true)]
        secret: String,
        #[arg(long, default_value = "GET")]
        method: String,
        #[arg(long, default_value = "/")]
        path: String,
        #[arg(long, default_value = "")]
        query: String,
        #[arg(long, default_value = "")]
        body: String,
        /// Signing time as YYYYMMDDTHHMMSSZ; defaults to now
        #[arg(long)]
        timestamp: Option<String>,
        #[arg(long)]
        encode_path_separators: bool,
    },
    /// Describe the environment variables read at startup
    ConfigHelp,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve { config } => {
            let config = ConfigLoader::load(config.as_deref())?;

            tracing_subscriber::fmt()
                .with_max_level(Level::from_str(&config.log_level)?)
                .with_level(true)
                .with_thread_names(true)
                .with_target(true)
                .with_ansi(config.environment.ansi_logs())
                .with_file(config.environment.log_source_locations())
                .with_line_number(config.environment.log_source_locations())
                .init();

            tracing::info!("starting in {:?} mode", config.environment);

            fnsign::fnsign::run(config.fnsign).await
        }
        Command::Sign {
            access_key_id,
            secret,
            method,
            path,
            query,
            body,
            timestamp,
            encode_path_separators,
        } => {
            let credential = Credential::new(access_key_id, secret)?;
            let now = match timestamp {
                Some(ts) => parse_timestamp(&ts).context("invalid --timestamp")?,
                None => Utc::now(),
            };

            let signed = sign_parts(
                &Canonicalizer::new(encode_path_separators),
                &credential,
                &method.to_uppercase(),
                &path,
                &query,
                body.as_bytes(),
                now,
            );

            println!("{}: {}", TIMESTAMP_HEADER, signed.timestamp);
            println!("Authorization: {}", signed.authorization);
            Ok(())
        }
        Command::ConfigHelp => {
            ConfigLoader::print_help();
            Ok(())
        }
    }
}
