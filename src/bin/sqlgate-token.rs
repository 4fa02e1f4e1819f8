//! sqlgate-token - issue and inspect API keys.
//!
//! ```text
//! sqlgate-token --config config.toml issue alice --days 30
//! sqlgate-token inspect <key>
//! ```
//!
//! The secret comes from `--secret`, then `SQLGATE_SECRET_KEY`, then the
//! `[security]` section of `--config`.

use anyhow::{Context, bail};
use chrono::DateTime;
use clap::{Parser, Subcommand};
use sqlgate::auth::{TokenAuthority, Verification, is_weak_secret};
use sqlgate::config::Config;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "sqlgate-token", version, about = "Issue and inspect sqlgate API keys")]
struct Cli {
    /// HMAC secret used to sign keys.
    #[arg(long, env = "SQLGATE_SECRET_KEY", hide_env_values = true)]
    secret: Option<String>,

    /// Read the secret from this sqlgate config file.
    #[arg(long, short)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Issue a key for a subject.
    Issue {
        /// Identity the key is issued to. Must not contain ':'.
        subject: String,
        /// Validity in days.
        #[arg(long, default_value_t = 7)]
        days: u32,
        /// Issue a key that never expires.
        #[arg(long, conflicts_with = "days")]
        unlimited: bool,
    },
    /// Verify a key and print its claims.
    Inspect {
        token: String,
    },
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let secret = match (cli.secret, cli.config) {
        (Some(secret), _) => secret,
        (None, Some(path)) => Config::load(&path)
            .with_context(|| format!("loading {}", path.display()))?
            .security
            .secret_key
            .with_context(|| format!("{} has no security.secret_key", path.display()))?,
        (None, None) => bail!("no secret: pass --secret, set SQLGATE_SECRET_KEY or use --config"),
    };

    if is_weak_secret(&secret) {
        eprintln!("warning: secret is shorter than 32 bytes");
    }
    let authority = TokenAuthority::from_secret(Some(&secret));

    match cli.command {
        Command::Issue {
            subject,
            days,
            unlimited,
        } => {
            let token = authority.issue(&subject, days, unlimited)?;
            println!("{token}");
            Ok(ExitCode::SUCCESS)
        }
        Command::Inspect { token } => match authority.verify(&token) {
            Verification::Valid(claims) => {
                println!("subject: {}", claims.subject);
                if claims.is_unlimited() {
                    println!("expires: never");
                } else {
                    let expires = DateTime::from_timestamp(claims.expiry, 0)
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_else(|| claims.expiry.to_string());
                    println!("expires: {expires}");
                }
                Ok(ExitCode::SUCCESS)
            }
            other => {
                println!("{}", other.label());
                Ok(ExitCode::FAILURE)
            }
        },
    }
}
