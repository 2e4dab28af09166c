//! tradekit - command-line access to the trading API.
//!
//! Only the authentication plumbing lives here: storing the API secret,
//! inspecting and refreshing the cached token, and a raw authenticated
//! request command that exercises the self-healing client.

use std::io;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local};
use reqwest::Method;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tradekit_core::auth::{
    EnvOverrideStore, KeyringStore, Secret, SecretStore, SessionProvider, SessionStatus, Token,
    SECRET_KEY, SERVICE_NAME,
};
use tradekit_core::error::SECRET_ENV_VAR;
use tradekit_core::{ApiClient, Config};

const USAGE: &str = "\
Usage: tradekit <command>

Commands:
  auth set-secret                 Store the API secret in the system keychain
  auth clear-secret               Remove the stored secret and cached token
  auth logout                     Remove the cached access token
  auth status                     Show the cached access token state
  auth refresh                    Exchange the secret for a new access token
  request <METHOD> <PATH> [JSON]  Send an authenticated API request

Environment:
  TRADEKIT_API_SECRET   API secret, takes precedence over the keychain
  TRADEKIT_CONFIG_DIR   Config directory (default: OS config dir/tradekit)
  TRADEKIT_BASE_URL     API base URL
  RUST_LOG              Log filter (default: warn)";

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let args: Vec<&str> = args.iter().map(String::as_str).collect();

    run(&args).await
}

/// Dispatch one command. Configuration is loaded only by the commands that
/// need it, so `help` works even when `config.json` is broken.
async fn run(args: &[&str]) -> Result<()> {
    let store = Arc::new(EnvOverrideStore::new(KeyringStore));

    match args {
        ["auth", "set-secret"] => set_secret(&*store, &load_config()?),
        ["auth", "clear-secret"] => clear_secret(&*store, &load_config()?),
        ["auth", "logout"] => logout(&*store, &load_config()?),
        ["auth", "status"] => status(&*store, &load_config()?),
        ["auth", "refresh"] => refresh(&*store, &load_config()?).await,
        ["request", method, path] => request(store, &load_config()?, method, path, None).await,
        ["request", method, path, body] => {
            request(store, &load_config()?, method, path, Some(*body)).await
        }
        ["help"] | ["--help"] | ["-h"] => {
            println!("{}", USAGE);
            Ok(())
        }
        _ => {
            eprintln!("{}", USAGE);
            bail!("Unknown command");
        }
    }
}

fn load_config() -> Result<Config> {
    Config::load().context("Failed to load configuration")
}

/// Turn prompt input into the stored secret. Only the line terminator is
/// removed; every other character is part of the credential.
fn secret_from_input(input: &str) -> Result<Secret> {
    let secret = input.trim_end_matches(['\r', '\n']);
    if secret.is_empty() {
        bail!("Secret must not be empty");
    }
    Ok(Secret::new(secret))
}

fn set_secret<S: SecretStore>(store: &S, config: &Config) -> Result<()> {
    let input = rpassword::prompt_password("API secret: ").context("Failed to read secret")?;
    let secret = secret_from_input(&input)?;

    store
        .set(SERVICE_NAME, SECRET_KEY, &secret)
        .context("Failed to store secret in keychain")?;
    // Tokens issued for a previous secret should not outlive it
    SessionProvider::new(store, config)?.clear_cache()?;

    info!("API secret stored");
    println!("API secret stored in the system keychain.");
    if std::env::var(SECRET_ENV_VAR).is_ok_and(|v| !v.is_empty()) {
        println!("Note: {} is set and takes precedence over the keychain.", SECRET_ENV_VAR);
    }
    Ok(())
}

fn clear_secret<S: SecretStore>(store: &S, config: &Config) -> Result<()> {
    store
        .delete(SERVICE_NAME, SECRET_KEY)
        .context("Failed to delete secret from keychain")?;
    SessionProvider::new(store, config)?.clear_cache()?;
    println!("API secret and cached token removed.");
    Ok(())
}

fn logout<S: SecretStore>(store: &S, config: &Config) -> Result<()> {
    SessionProvider::new(store, config)?.clear_cache()?;
    println!("Cached access token removed.");
    Ok(())
}

fn status<S: SecretStore>(store: &S, config: &Config) -> Result<()> {
    let provider = SessionProvider::new(store, config)?;
    println!("API:         {}", config.base_url);
    println!("Token cache: {}", provider.cache().path().display());

    match provider.status() {
        SessionStatus::NotAuthenticated => println!("Status:      not authenticated"),
        SessionStatus::Valid {
            seconds_remaining,
            expires_at,
        } => println!(
            "Status:      valid, expires {} ({}m remaining)",
            format_expiry(expires_at),
            seconds_remaining / 60
        ),
        SessionStatus::Expired { expires_at } => {
            println!("Status:      expired at {}", format_expiry(expires_at))
        }
        SessionStatus::Corrupt => println!("Status:      unreadable cache, will re-authenticate"),
    }
    Ok(())
}

async fn refresh<S: SecretStore>(store: &S, config: &Config) -> Result<()> {
    let token: Token = SessionProvider::new(store, config)?.get_token(true).await?;
    println!("New access token expires {}", format_expiry(token.expires_at));
    Ok(())
}

async fn request<S: SecretStore + 'static>(
    store: Arc<S>,
    config: &Config,
    method: &str,
    path: &str,
    body: Option<&str>,
) -> Result<()> {
    let method = Method::from_str(&method.to_ascii_uppercase())
        .with_context(|| format!("Invalid HTTP method: {}", method))?;

    let api = ApiClient::authenticated(store, config).await?;
    let mut builder = api.request(method, path);
    if let Some(body) = body {
        let json: serde_json::Value =
            serde_json::from_str(body).context("Request body must be valid JSON")?;
        builder = builder.json(&json);
    }

    let response = api.send(builder.build()?).await?;
    let status = response.status();
    let text = response.text().await.context("Failed to read response body")?;

    match serde_json::from_str::<serde_json::Value>(&text) {
        Ok(value) => println!("{}", serde_json::to_string_pretty(&value)?),
        Err(_) => println!("{}", text),
    }
    if !status.is_success() {
        bail!("Request failed with status {}", status);
    }
    Ok(())
}

fn format_expiry(expires_at: i64) -> String {
    DateTime::from_timestamp(expires_at, 0)
        .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| expires_at.to_string())
}
