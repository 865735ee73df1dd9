//! sessionkeep - command line front end for the session core.
//!
//! Plays the part of the app's screens: signs in, signs up, signs out,
//! shows the current user and issues authenticated requests, all through
//! the same `Session` a UI would use.

use std::io::{self, Write};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sessionkeep_core::{ApiError, Config, ProfileUpdate, Session, SessionState};
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Minimum password length accepted by the sign-up and profile forms
const MIN_PASSWORD_LENGTH: usize = 6;

#[derive(Parser, Debug)]
#[command(name = "sessionkeep")]
#[command(about = "Sign in to the API and make authenticated requests", long_about = None)]
struct Args {
    /// API base URL (overrides the config file)
    #[arg(long, env = "SESSIONKEEP_BASE_URL")]
    base_url: Option<String>,

    /// Credential storage: file, keyring or memory (overrides the config file)
    #[arg(long, env = "SESSIONKEEP_STORAGE")]
    storage: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign in with e-mail and password
    Login {
        #[arg(short, long)]
        email: Option<String>,
    },
    /// Create an account and sign in
    Signup {
        #[arg(short, long)]
        name: String,
        #[arg(short, long)]
        email: String,
    },
    /// Sign out and forget stored credentials
    Logout,
    /// Show the signed-in user
    Whoami,
    /// GET an API path with the session's token and print the JSON
    Get { path: String },
    /// Change display name and, optionally, password
    Profile {
        #[arg(short, long)]
        name: String,
        #[arg(long)]
        change_password: bool,
    },
}

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

    let args = Args::parse();

    init_tracing();
    debug!(command = ?args.command, "sessionkeep starting");

    let mut config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "Failed to load config, using defaults");
            Config::default()
        }
    }
    .with_overrides(args.base_url.clone(), args.storage.clone())?;

    let store = config.open_store().context("Failed to open credential store")?;
    let session = Session::launch(&config, store).context("Failed to start session")?;
    watch_session(&session);

    match args.command {
        Command::Login { email } => login(&session, &mut config, email).await,
        Command::Signup { name, email } => signup(&session, &mut config, &name, &email).await,
        Command::Logout => {
            session.sign_out().context("Failed to clear stored credentials")?;
            println!("Signed out.");
            Ok(())
        }
        Command::Whoami => {
            whoami(&session);
            Ok(())
        }
        Command::Get { path } => get(&session, &path).await,
        Command::Profile {
            name,
            change_password,
        } => profile(&session, name, change_password).await,
    }
}

/// Log every state transition, forced sign-outs included.
fn watch_session(session: &Session) {
    let mut rx = session.subscribe();
    tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let state = rx.borrow_and_update().clone();
            info!(state = state.label(), "Session state changed");
        }
    });
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

fn prompt_password(label: &str) -> Result<String> {
    Ok(rpassword::prompt_password(label)?)
}

/// Same rules as the sign-up form: minimum length, confirmation must match.
fn check_new_password(password: &str, confirm: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        anyhow::bail!("Password must be at least {} characters", MIN_PASSWORD_LENGTH);
    }
    if confirm != password {
        anyhow::bail!("Passwords do not match");
    }
    Ok(())
}

fn prompt_new_password() -> Result<String> {
    let password = prompt_password("Password: ")?;
    let confirm = prompt_password("Confirm password: ")?;
    check_new_password(&password, &confirm)?;
    Ok(password)
}

/// Turn a core error into the message a screen would show.
fn report(err: ApiError) -> anyhow::Error {
    debug!(error = ?err, "Request failed");
    anyhow::anyhow!(err.user_message())
}

fn remember_email(config: &mut Config, email: &str) {
    config.last_email = Some(email.to_string());
    if let Err(e) = config.save() {
        warn!(error = %e, "Failed to save config");
    }
}

async fn login(session: &Session, config: &mut Config, email: Option<String>) -> Result<()> {
    let email = match email {
        Some(email) => email,
        None => match config.last_email.clone() {
            Some(last) => {
                let input = prompt(&format!("E-mail [{}]: ", last))?;
                if input.is_empty() {
                    last
                } else {
                    input
                }
            }
            None => prompt("E-mail: ")?,
        },
    };
    if email.is_empty() {
        anyhow::bail!("E-mail is required");
    }
    let password = prompt_password("Password: ")?;

    let user = session.sign_in(&email, &password).await.map_err(report)?;
    remember_email(config, &email);
    println!("Signed in as {}.", user.name);
    Ok(())
}

async fn signup(session: &Session, config: &mut Config, name: &str, email: &str) -> Result<()> {
    let password = prompt_new_password()?;

    let user = session.sign_up(name, email, &password).await.map_err(report)?;
    remember_email(config, email);
    println!("Account created. Signed in as {}.", user.name);
    Ok(())
}

fn whoami(session: &Session) {
    match session.state() {
        SessionState::Authenticated(user) | SessionState::RefreshingSession(user) => {
            println!("{} <{}>", user.name, user.email);
            println!("id: {}", user.id);
            if let Some(url) = user.avatar_url(session.base_url()) {
                println!("avatar: {}", url);
            }
        }
        _ => println!("Not signed in."),
    }
}

async fn get(session: &Session, path: &str) -> Result<()> {
    if session.user().is_none() {
        warn!("No stored session, sending request without a token");
    }

    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    };

    match session.client().get_json::<serde_json::Value>(&path).await {
        Ok(body) => {
            println!("{}", serde_json::to_string_pretty(&body)?);
            Ok(())
        }
        Err(e) if e.is_session_expired() => {
            Err(anyhow::anyhow!("Session expired. Run `sessionkeep login` to sign in again."))
        }
        Err(e) => Err(report(e)),
    }
}

async fn profile(session: &Session, name: String, change_password: bool) -> Result<()> {
    if name.trim().is_empty() {
        anyhow::bail!("Name is required");
    }

    let (old_password, password) = if change_password {
        let old = prompt_password("Current password: ")?;
        let new = prompt_new_password()?;
        if new == old {
            anyhow::bail!("New password must differ from the current one");
        }
        (Some(old), Some(new))
    } else {
        (None, None)
    };

    let user = session
        .update_profile(ProfileUpdate {
            name,
            password,
            old_password,
        })
        .await
        .map_err(report)?;
    println!("Profile updated: {}.", user.name);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_new_password() {
        assert!(check_new_password("secret1", "secret1").is_ok());
        // Too short
        assert!(check_new_password("abc", "abc").is_err());
        // Confirmation mismatch
        assert!(check_new_password("secret1", "secret2").is_err());
    }

    #[test]
    fn test_args_parse_subcommands() {
        let args = Args::try_parse_from(["sessionkeep", "login", "--email", "a@x.com"]).unwrap();
        assert!(matches!(args.command, Command::Login { email: Some(ref e) } if e == "a@x.com"));

        let args = Args::try_parse_from(["sessionkeep", "--storage", "memory", "get", "/exercises"]).unwrap();
        assert_eq!(args.storage.as_deref(), Some("memory"));
        assert!(matches!(args.command, Command::Get { ref path } if path == "/exercises"));

        assert!(Args::try_parse_from(["sessionkeep", "signup", "--name", "A"]).is_err());
    }

    #[test]
    fn test_flags_override_config_file() {
        let args = Args::try_parse_from([
            "sessionkeep",
            "--base-url",
            "https://api.example.com/",
            "--storage",
            "keyring",
            "whoami",
        ])
        .unwrap();

        let config = Config::default()
            .with_overrides(args.base_url, args.storage)
            .unwrap();

        assert_eq!(config.base_url, "https://api.example.com");
        assert_eq!(config.storage, sessionkeep_core::StorageBackend::Keyring);
    }
}
