//! Warden CLI - operator commands
//!
//! Usage:
//!   warden migrate
//!   warden create-superuser --username <name> --email <email> [--password <pw>]
//!   warden list-users [--skip N] [--limit N]
//!   warden revoke-tokens <username>
//!
//! Configuration is read the same way as the server (`WARDEN_CONFIG` plus
//! environment overrides).

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use validator::Validate;
use warden_api::auth::models::RegisterRequest;
use warden_api::auth::Registration;
use warden_api::state::AppState;
use warden_core::config::AppConfig;
use warden_core::db;

#[derive(Parser)]
#[command(name = "warden")]
#[command(about = "Warden authentication service administration")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending database migrations
    Migrate,
    /// Create an active superuser account
    CreateSuperuser {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        /// Read from WARDEN_PASSWORD when omitted
        #[arg(long, env = "WARDEN_PASSWORD", hide_env_values = true)]
        password: String,
        #[arg(long)]
        full_name: Option<String>,
    },
    /// List users, newest first
    ListUsers {
        #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(i64).range(0..))]
        skip: i64,
        #[arg(long, default_value_t = 100, value_parser = clap::value_parser!(i64).range(1..=1000))]
        limit: i64,
    },
    /// Revoke every refresh token of a user
    RevokeTokens {
        /// Username (case-insensitive)
        username: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let cli = Cli::parse();

    let config = AppConfig::load().context("failed to load configuration")?;
    config.validate()?;

    let pool = db::connect(&config.database).await?;

    if let Commands::Migrate = cli.command {
        db::run_migrations(&pool).await?;
        println!("Migrations applied");
        return Ok(());
    }

    let state = AppState::from_pool(config, pool)?;

    match cli.command {
        Commands::Migrate => {}
        Commands::CreateSuperuser {
            username,
            email,
            password,
            full_name,
        } => {
            let request = RegisterRequest {
                username,
                email,
                password,
                full_name,
            };
            if let Err(errors) = request.validate() {
                bail!("invalid superuser details: {errors}");
            }

            let user = state
                .auth
                .register(
                    Registration::new(request.username, request.email, request.password)
                        .with_full_name(request.full_name)
                        .superuser(),
                )
                .await?;
            println!("Created superuser {} ({})", user.username, user.id);
        }
        Commands::ListUsers { skip, limit } => {
            let (users, total) = state.auth.list_users(skip, limit).await?;
            println!(
                "{:<36}  {:<24}  {:<32}  {:<6}  {:<5}",
                "ID", "USERNAME", "EMAIL", "ACTIVE", "SUPER"
            );
            for user in &users {
                println!(
                    "{:<36}  {:<24}  {:<32}  {:<6}  {:<5}",
                    user.id, user.username, user.email, user.is_active, user.is_superuser
                );
            }
            println!("{} of {} users", users.len(), total);
        }
        Commands::RevokeTokens { username } => {
            let Some(user) = state.auth.get_user_by_username(&username).await? else {
                bail!("no user named '{username}'");
            };
            let revoked = state.auth.revoke_all(user.id).await?;
            tracing::info!(target: "audit", user_id = %user.id, revoked, "Sessions revoked from CLI");
            println!("Revoked {revoked} session(s) of {}", user.username);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_create_superuser() {
        let cli = Cli::try_parse_from([
            "warden",
            "create-superuser",
            "--username",
            "root",
            "--email",
            "root@x.com",
            "--password",
            "Rootpass1",
        ])
        .unwrap();

        match cli.command {
            Commands::CreateSuperuser {
                username, email, ..
            } => {
                assert_eq!(username, "root");
                assert_eq!(email, "root@x.com");
            }
            _ => panic!("expected create-superuser"),
        }
    }

    #[test]
    fn test_list_users_limit_bounds() {
        assert!(Cli::try_parse_from(["warden", "list-users", "--limit", "0"]).is_err());
        assert!(Cli::try_parse_from(["warden", "list-users", "--limit", "1001"]).is_err());
        assert!(Cli::try_parse_from(["warden", "list-users", "--skip", "-1"]).is_err());
        assert!(Cli::try_parse_from(["warden", "list-users", "--skip", "20"]).is_ok());

        let cli = Cli::try_parse_from(["warden", "list-users"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::ListUsers {
                skip: 0,
                limit: 100
            }
        ));
    }

    #[test]
    fn test_revoke_tokens_requires_username() {
        assert!(Cli::try_parse_from(["warden", "revoke-tokens"]).is_err());
        assert!(Cli::try_parse_from(["warden", "revoke-tokens", "alice"]).is_ok());
    }
}
