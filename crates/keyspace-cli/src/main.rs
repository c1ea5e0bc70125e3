//! keyspace: Keyspace vault client CLI
//!
//! Commands:
//!   login               - pair with the mobile app by scanning a QR code
//!   logout              - forget the stored session
//!   whoami              - show the logged-in account
//!   vault list          - list and decrypt vault items
//!   vault add-note      - create an encrypted secure note
//!   vault favorite <id> - toggle the favorite flag of an item
//!   vault delete <id>   - delete an item
//!   config show         - display current configuration

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use keyspace_core::config::{expand_tilde, KeyspaceConfig};
use keyspace_core::types::{unix_now, ItemMeta, ItemType, SecureNote, VaultItem};
use keyspace_crypto::to_hex;
use keyspace_session::http::build_client;
use keyspace_session::store::restore_session;
use keyspace_session::{
    FileSessionStore, HandshakeState, HandshakeStatus, HttpTokenService, KeyrouteDriver,
    SessionStore, VaultClient, WsConnector,
};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "keyspace",
    version,
    about = "Keyspace vault client",
    long_about = "keyspace: pair with the Keyspace mobile app and work with the encrypted vault"
)]
struct Cli {
    /// Path to keyspace.toml configuration file
    #[arg(
        long,
        short = 'c',
        env = "KEYSPACE_CONFIG",
        default_value = "~/.config/keyspace/keyspace.toml"
    )]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides [log] level
    #[arg(long, env = "KEYSPACE_LOG")]
    log: Option<String>,

    /// Log format (json, text); overrides [log] format
    #[arg(long, env = "KEYSPACE_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Pair with the mobile app and store the session
    ///
    /// Prints the QR payload as JSON on stdout each time it rotates.
    Login,

    /// Remove the stored session
    Logout,

    /// Show the logged-in account
    Whoami,

    /// Vault item management
    Vault {
        #[command(subcommand)]
        action: VaultAction,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum VaultAction {
    /// List and decrypt every item
    List {
        /// Only show items of this type (login, note, card, tag)
        #[arg(long = "type", value_parser = parse_item_type)]
        item_type: Option<ItemType>,
    },

    /// Create a secure note
    AddNote {
        /// Note body
        notes: String,
        #[arg(long)]
        name: Option<String>,
        /// Tag id to file the note under
        #[arg(long)]
        tag: Option<String>,
        #[arg(long)]
        color: Option<String>,
    },

    /// Toggle the favorite flag of an item
    Favorite { id: String },

    /// Delete an item
    Delete { id: String },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

fn parse_item_type(tag: &str) -> Result<ItemType, String> {
    ItemType::from_tag(tag).ok_or_else(|| {
        let known: Vec<_> = ItemType::ALL.iter().map(|t| t.as_str()).collect();
        format!("unknown item type '{tag}' (expected one of: {})", known.join(", "))
    })
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = expand_tilde(&cli.config);
    let config = KeyspaceConfig::load(&config_path)
        .with_context(|| format!("loading config: {}", config_path.display()))?;

    let level = cli.log.as_deref().unwrap_or(&config.log.level);
    let format = match cli.log_format {
        Some(format) => format,
        None if config.log.format.eq_ignore_ascii_case("json") => LogFormat::Json,
        None => LogFormat::Text,
    };
    init_logging(level, &format);

    debug!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path.display(),
        "keyspace starting"
    );

    match cli.command {
        Commands::Login => cmd_login(&config).await,
        Commands::Logout => cmd_logout(&config).await,
        Commands::Whoami => cmd_whoami(&config).await,
        Commands::Vault { action: VaultAction::List { item_type } } => {
            cmd_vault_list(&config, item_type).await
        }
        Commands::Vault { action: VaultAction::AddNote { notes, name, tag, color } } => {
            cmd_vault_add_note(&config, notes, name, tag, color).await
        }
        Commands::Vault { action: VaultAction::Favorite { id } } => {
            cmd_vault_favorite(&config, &id).await
        }
        Commands::Vault { action: VaultAction::Delete { id } } => {
            cmd_vault_delete(&config, &id).await
        }
        Commands::Config { action: ConfigAction::Show } => cmd_config_show(&config, &config_path),
    }
}

/// Logs go to stderr so stdout stays machine-readable.
fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn session_store(config: &KeyspaceConfig) -> FileSessionStore {
    FileSessionStore::new(expand_tilde(&config.session.store_path))
}

async fn vault_client(config: &KeyspaceConfig) -> Result<VaultClient> {
    let store = session_store(config);
    let session = restore_session(&store)
        .await
        .with_context(|| format!("reading session: {}", store.path().display()))?
        .context("not logged in (run `keyspace login` first)")?;

    let http = build_client(&config.api)?;
    let tokens = Arc::new(HttpTokenService::new(http.clone(), &config.api));
    Ok(VaultClient::new(http, config, tokens, session))
}

// ── `keyspace login` ──────────────────────────────────────────────────────────

async fn cmd_login(config: &KeyspaceConfig) -> Result<()> {
    let http = build_client(&config.api)?;
    let tokens = Arc::new(HttpTokenService::new(http, &config.api));
    let connector = Arc::new(WsConnector::new(config.api.clone()));
    let store = Arc::new(session_store(config));

    let driver = KeyrouteDriver::new(config, tokens, connector).with_store(store.clone());
    let render = tokio::spawn(render_status(driver.subscribe()));

    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    eprintln!("Scan the QR code with the Keyspace app (Ctrl-C to abort)");
    let outcome = driver.run(cancel).await;
    interrupt.abort();
    render.abort();
    eprintln!();

    match outcome.context("pairing failed")? {
        Some(session) => {
            info!(email = %session.email, path = %store.path().display(), "logged in");
            println!("Logged in as {}", session.email);
        }
        None => eprintln!("Login cancelled"),
    }
    Ok(())
}

/// Print each new QR payload to stdout and keep a countdown line on stderr.
async fn render_status(mut status: watch::Receiver<HandshakeStatus>) {
    let mut shown_generation = 0;
    let mut last_state = HandshakeState::Idle;

    while status.changed().await.is_ok() {
        let current = status.borrow_and_update().clone();

        if let Some(qr) = &current.qr {
            if current.generation != shown_generation {
                shown_generation = current.generation;
                match serde_json::to_string(qr) {
                    Ok(json) => {
                        eprintln!();
                        println!("{json}");
                    }
                    Err(e) => debug!(error = %e, "serializing QR payload"),
                }
            }
        }

        if current.state != last_state {
            if let HandshakeState::Error(reason) = &current.state {
                eprintln!("\n{reason}");
            }
            last_state = current.state.clone();
        }

        match current.state {
            HandshakeState::QrDisplayed | HandshakeState::ChannelOpen => {
                eprint!("\rQR code refreshes in {:>3}s", current.countdown);
            }
            HandshakeState::Error(_) => {
                eprint!("\rRetrying in {:>3}s", current.countdown);
            }
            HandshakeState::PayloadReceived => eprint!("\rDecrypting keyring...     "),
            _ => {}
        }
        let _ = std::io::stderr().flush();
    }
}

// ── `keyspace logout` / `keyspace whoami` ─────────────────────────────────────

async fn cmd_logout(config: &KeyspaceConfig) -> Result<()> {
    let store = session_store(config);
    store
        .remove()
        .await
        .with_context(|| format!("removing session: {}", store.path().display()))?;
    println!("Logged out");
    Ok(())
}

async fn cmd_whoami(config: &KeyspaceConfig) -> Result<()> {
    let store = session_store(config);
    match restore_session(&store).await? {
        Some(session) => {
            println!("{}", session.email);
            println!("  public key: {}", to_hex(&session.keyring.public_key));
            println!("  session:    {}", store.path().display());
        }
        None => println!("Not logged in"),
    }
    Ok(())
}

// ── `keyspace vault ...` ──────────────────────────────────────────────────────

async fn cmd_vault_list(config: &KeyspaceConfig, item_type: Option<ItemType>) -> Result<()> {
    let client = vault_client(config).await?;
    let load = client.list_items().await.context("listing vault items")?;

    let items: Vec<_> = load
        .items
        .iter()
        .filter(|item| item_type.map_or(true, |t| item.data.item_type() == t))
        .collect();
    println!(
        "{}",
        serde_json::to_string_pretty(&items).context("serializing vault items")?
    );

    for failure in &load.failures {
        eprintln!("could not open item {}: {}", failure.id, failure.error);
    }
    Ok(())
}

async fn cmd_vault_add_note(
    config: &KeyspaceConfig,
    notes: String,
    name: Option<String>,
    tag: Option<String>,
    color: Option<String>,
) -> Result<()> {
    let client = vault_client(config).await?;
    let now = unix_now();
    let note = VaultItem::Note(SecureNote {
        meta: ItemMeta {
            id: uuid::Uuid::new_v4().to_string(),
            tag_id: tag,
            organization_id: None,
            frequency_accessed: 0,
            date_created: now,
            date_modified: now,
            favorite: false,
        },
        name,
        notes,
        color,
    });

    let resp = client.add_item(&note).await.context("adding note")?;
    println!("{} {} ({})", resp.status, note.id(), resp.message);
    Ok(())
}

async fn cmd_vault_favorite(config: &KeyspaceConfig, id: &str) -> Result<()> {
    let client = vault_client(config).await?;
    let load = client.list_items().await.context("listing vault items")?;
    let mut item = load
        .items
        .into_iter()
        .find(|item| item.id == id || item.data.id() == id)
        .map(|item| item.data)
        .with_context(|| format!("no readable vault item with id {id}"))?;

    let meta = item.meta_mut();
    meta.favorite = !meta.favorite;
    meta.date_modified = unix_now();
    let favorite = meta.favorite;

    let resp = client.edit_item(&item).await.context("editing item")?;
    println!("{} {id} favorite={favorite} ({})", resp.status, resp.message);
    Ok(())
}

async fn cmd_vault_delete(config: &KeyspaceConfig, id: &str) -> Result<()> {
    let client = vault_client(config).await?;
    let resp = client.delete_item(id).await.context("deleting item")?;
    println!("{} {id} ({})", resp.status, resp.message);
    Ok(())
}

// ── `keyspace config show` ────────────────────────────────────────────────────

fn cmd_config_show(config: &KeyspaceConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}
