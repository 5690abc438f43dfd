//! CLI entry point for the skyport campus portal.
//!
//! This binary provides the `skyport` command with subcommands for signing
//! in and out, inspecting the current session, and browsing campus events.

use std::path::Path;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use skyport_auth::{
    AuthController, ProviderConfig, DEFAULT_CALLBACK_PORT, DEFAULT_CALLBACK_TIMEOUT_SECS,
};
use skyport_campus::{CampusClient, DEFAULT_EVENT_PAGE_SIZE};
use skyport_session::{crypto, SessionStore};

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

/// skyport — campus community portal.
#[derive(Parser)]
#[command(
    name = "skyport",
    version,
    about = "skyport — campus community portal",
    long_about = "Sign in with your campus account and browse upcoming campus events \
                  from the terminal."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in via the campus OAuth provider.
    Login {
        /// Local port for the OAuth redirect listener.
        #[arg(long, default_value_t = DEFAULT_CALLBACK_PORT)]
        port: u16,

        /// Seconds to wait for the browser redirect before giving up.
        #[arg(long, default_value_t = DEFAULT_CALLBACK_TIMEOUT_SECS)]
        timeout: u64,
    },

    /// Sign out and clear the stored session.
    Logout,

    /// Show the currently signed-in user.
    Whoami,

    /// List upcoming events for a campus.
    Events {
        /// Campus name to list events for.
        #[arg(long, default_value = "Abu Dhabi")]
        campus: String,

        /// Maximum number of events to list.
        #[arg(long, default_value_t = DEFAULT_EVENT_PAGE_SIZE)]
        limit: u32,
    },

    /// Show details for a campus.
    Campus {
        /// Campus name to look up.
        name: String,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // .env is optional; real deployments set the environment directly.
    let _ = dotenvy::dotenv();
    init_tracing("warn");

    let cli = Cli::parse();

    match cli.command {
        Commands::Login { port, timeout } => cmd_login(port, timeout).await,
        Commands::Logout => cmd_logout().await,
        Commands::Whoami => cmd_whoami().await,
        Commands::Events { campus, limit } => cmd_events(&campus, limit).await,
        Commands::Campus { name } => cmd_campus(&name).await,
    }
}

// ---------------------------------------------------------------------------
// Subcommands
// ---------------------------------------------------------------------------

async fn cmd_login(port: u16, timeout: u64) -> Result<()> {
    let config = load_provider_config()?;
    let store = open_store()?;
    let controller = AuthController::new(store, config)?;

    if let Some(user) = controller.restore().await?.map(|u| u.login_handle) {
        println!("Already signed in as {user}. Run `skyport logout` first to switch accounts.");
        return Ok(());
    }

    println!("Opening the sign-in flow. Finish logging in from your browser.");

    let session = controller
        .authenticate_interactive(port, timeout)
        .await
        .context("sign-in failed")?;

    println!(
        "Signed in as {} ({}).",
        session.display_name, session.login_handle
    );
    Ok(())
}

async fn cmd_logout() -> Result<()> {
    let store = open_store()?;
    let controller = AuthController::new(store, load_provider_config()?)?;

    controller.logout().await.context("logout failed")?;
    println!("Signed out.");
    Ok(())
}

async fn cmd_whoami() -> Result<()> {
    let store = open_store()?;
    let controller = AuthController::new(store, load_provider_config()?)?;

    match controller.restore().await? {
        Some(user) => {
            println!("{} ({})", user.display_name, user.login_handle);
            if let Some(email) = &user.email {
                println!("  email:   {email}");
            }
            println!("  expires: {}", user.expires_at.format("%Y-%m-%d %H:%M UTC"));
        }
        None => println!("Not signed in. Run `skyport login`."),
    }
    Ok(())
}

async fn cmd_events(campus_name: &str, limit: u32) -> Result<()> {
    let client = CampusClient::new(load_provider_config()?)?;

    let campus = client
        .find_campus(campus_name)
        .await
        .with_context(|| format!("could not look up campus '{campus_name}'"))?;

    let events = client
        .upcoming_events(campus.id, limit)
        .await
        .context("could not fetch events")?;

    if events.is_empty() {
        println!("No upcoming events at {}.", campus.name);
        return Ok(());
    }

    println!("Upcoming events at {}:", campus.name);
    println!();
    for event in events {
        let capacity = match event.max_attendees {
            Some(max) => format!("{}/{max}", event.attendee_count),
            None => format!("{} signed up", event.attendee_count),
        };
        let full = if event.is_full() { " [FULL]" } else { "" };

        println!(
            "  {:>6}  {}  {:<12} {}{}",
            event.short_date(),
            event.time_range(),
            event.category.label(),
            event.title,
            full
        );
        if !event.location.is_empty() {
            println!("          at {}  ({capacity})", event.location);
        }
    }
    Ok(())
}

async fn cmd_campus(name: &str) -> Result<()> {
    let client = CampusClient::new(load_provider_config()?)?;

    let campus = client
        .find_campus(name)
        .await
        .with_context(|| format!("could not look up campus '{name}'"))?;

    println!("{} (id {})", campus.name, campus.id);
    if let (Some(city), Some(country)) = (&campus.city, &campus.country) {
        println!("  location: {city}, {country}");
    }
    if let Some(count) = campus.student_count {
        println!("  students: {count}");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Configuration and storage
// ---------------------------------------------------------------------------

const DEFAULT_AUTH_URL: &str = "https://api.intra.42.fr/oauth/authorize";
const DEFAULT_TOKEN_URL: &str = "https://api.intra.42.fr/oauth/token";
const DEFAULT_API_BASE_URL: &str = "https://api.intra.42.fr";

/// Build the provider config from the environment.
///
/// `SKYPORT_CLIENT_ID` and `SKYPORT_CLIENT_SECRET` are mandatory; endpoint
/// URLs default to the campus provider and can be overridden for staging.
fn load_provider_config() -> Result<ProviderConfig> {
    let client_id =
        std::env::var("SKYPORT_CLIENT_ID").context("SKYPORT_CLIENT_ID is not set")?;
    let client_secret =
        std::env::var("SKYPORT_CLIENT_SECRET").context("SKYPORT_CLIENT_SECRET is not set")?;

    let redirect_uri = std::env::var("SKYPORT_REDIRECT_URI")
        .unwrap_or_else(|_| format!("http://127.0.0.1:{DEFAULT_CALLBACK_PORT}/callback"));

    Ok(ProviderConfig {
        client_id,
        client_secret,
        auth_url: env_or("SKYPORT_AUTH_URL", DEFAULT_AUTH_URL),
        token_url: env_or("SKYPORT_TOKEN_URL", DEFAULT_TOKEN_URL),
        api_base_url: env_or("SKYPORT_API_BASE_URL", DEFAULT_API_BASE_URL),
        redirect_uri,
        scopes: vec!["public".to_string()],
    })
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

/// Open the session store under `data/`, creating the encryption key on
/// first use.
fn open_store() -> Result<SessionStore> {
    let data_dir = Path::new("data");
    if !data_dir.exists() {
        std::fs::create_dir_all(data_dir).context("failed to create data directory")?;
    }

    let key = load_or_create_key(&data_dir.join("skyport.key"))?;

    let db_path = data_dir.join("skyport.db");
    let store =
        SessionStore::open(&db_path, &key).context("failed to open the session store")?;

    info!(path = %db_path.display(), "session store opened");
    Ok(store)
}

/// Load the store encryption key, minting a fresh random one on first run.
fn load_or_create_key(path: &Path) -> Result<Vec<u8>> {
    if path.exists() {
        let key = std::fs::read(path).context("failed to read the store key")?;
        anyhow::ensure!(
            key.len() == crypto::KEY_LEN,
            "store key at {} has the wrong length; delete it to reset (this signs you out)",
            path.display()
        );
        return Ok(key);
    }

    let key = crypto::generate_key().context("failed to generate a store key")?;
    std::fs::write(path, key).context("failed to write the store key")?;

    // The key gates the session database; keep it owner-only.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .context("failed to restrict store key permissions")?;
    }

    info!(path = %path.display(), "created new store key");
    Ok(key.to_vec())
}

// ---------------------------------------------------------------------------
// Tracing
// ---------------------------------------------------------------------------

/// Initialize the tracing subscriber. `RUST_LOG` overrides the default.
fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
