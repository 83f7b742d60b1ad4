//! Command line client for Nostr relays. Encodes and decodes NIP-19
//! identifiers, signs and verifies events, and fetches from or publishes to a
//! single relay. Every invocation prints exactly one JSON value on stdout.

mod builder;
mod config;
mod error;
mod event;
mod media;
mod nip19;
mod query;
mod relay;
mod signer;

use std::{fs, path::PathBuf, process::ExitCode};

use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

use builder::{EventBuilder, PublishIntent};
use config::{Overrides, Settings};
use error::Error;
use event::Event;
use nip19::{Decoded, EncodeParams, Prefix};
use query::{ClientMessage, FetchIntent, QueryBuilder};
use relay::{RelaySession, SessionError};
use signer::Keys;

/// Command line interface entry point.
#[derive(Parser)]
#[command(
    name = "nostr-publisher",
    author,
    version,
    about = "Fetch, sign and publish Nostr events"
)]
struct Cli {
    /// Path to the JSON config file. Defaults to `nostr-publisher.conf`, or
    /// `nostr-publisher-cli.conf` when only that one exists.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Path to the `.env` file.
    #[arg(long, global = true, default_value = ".env")]
    env: String,
    /// Private key, hex or nsec.
    #[arg(long, global = true)]
    key: Option<String>,
    /// Relay host or ws(s):// URL.
    #[arg(long, global = true)]
    relay: Option<String>,
    /// Seconds to wait for the relay before giving up.
    #[arg(long, global = true, value_name = "SECS")]
    timeout: Option<u64>,
    /// SOCKS5 proxy (host:port) for the relay connection.
    #[arg(long, global = true)]
    proxy: Option<String>,
    /// Print the message that would be sent instead of sending it.
    #[arg(long, global = true)]
    dry_run: bool,
    /// Add a random suffix to subscription ids.
    #[arg(long, global = true)]
    unique_ids: bool,
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Generate a new keypair.
    RandomKey,
    /// Print the public key of the configured private key.
    PublicKey,
    /// Decode hex or a NIP-19 identifier.
    Decode { id: String },
    /// Encode a NIP-19 identifier.
    Bech32 {
        #[arg(long)]
        prefix: Prefix,
        /// Payload, or event id / pubkey for nevent and nprofile.
        #[arg(long)]
        hex: Option<String>,
        /// `d` identifier for naddr.
        #[arg(long)]
        slug: Option<String>,
        #[arg(long)]
        relay_hint: Option<String>,
        #[arg(long)]
        author: Option<String>,
        #[arg(long)]
        kind: Option<u32>,
    },
    /// Check an event's signature. Takes JSON or `@path`.
    Verify {
        event: String,
        /// Also require the id to be the hash of the event fields.
        #[arg(long)]
        check_id: bool,
    },
    /// Sign an event with the configured key. Takes JSON or `@path`.
    Sign { event: String },
    /// Query the relay.
    Fetch {
        #[command(subcommand)]
        target: FetchCommand,
    },
    /// Publish an event to the relay.
    Publish {
        /// Unix timestamp for the event instead of the current time.
        #[arg(long, value_name = "SECS")]
        created_at: Option<u64>,
        #[command(subcommand)]
        kind: PublishCommand,
    },
}

/// Operations available under `nostr-publisher fetch`.
#[derive(Subcommand)]
enum FetchCommand {
    /// A single note by id, note, nevent or naddr.
    Note { id: String },
    /// Replies to a note.
    Comments { id: String },
    /// Recent notes by an author (hex or npub).
    Author {
        author: String,
        #[arg(long)]
        since: Option<u64>,
        #[arg(long)]
        limit: Option<u64>,
    },
    /// Full-text search.
    Search {
        #[arg(required = true)]
        terms: Vec<String>,
        #[arg(long)]
        since: Option<u64>,
        #[arg(long)]
        limit: Option<u64>,
    },
    /// Send a literal message, JSON or `@path`.
    Raw { message: String },
}

/// Operations available under `nostr-publisher publish`.
#[derive(Subcommand)]
enum PublishCommand {
    /// A kind 1 note.
    Text {
        content: Option<String>,
        /// Read the content from a file.
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// A reply to a note.
    Comment {
        note: String,
        content: Option<String>,
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// A long-form article read from a file.
    Article {
        #[arg(long)]
        slug: String,
        #[arg(long, default_value = "")]
        title: String,
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Same as `article`.
    Html {
        #[arg(long)]
        slug: String,
        #[arg(long, default_value = "")]
        title: String,
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// A file embedded as a data URI.
    File { path: PathBuf },
    /// Ask relays to delete a note.
    Delete { note: String },
    /// A literal `["EVENT", event]`, JSON or `@path`. Signed if unsigned.
    Raw { message: String },
}

/// Execute the selected CLI subcommand and return its JSON result.
async fn run(cli: Cli) -> Result<Value, SessionError> {
    let cfg = Settings::load(
        cli.config.as_deref(),
        &cli.env,
        Overrides {
            key: cli.key,
            relay: cli.relay,
            timeout_secs: cli.timeout,
            proxy: cli.proxy,
        },
    )?;
    match cli.command {
        Commands::RandomKey => {
            let keys = Keys::generate();
            Ok(json!({
                "private_key": keys.secret_key_hex(),
                "public_key": keys.public_key_hex(),
                "nsec": keys.nsec()?,
                "npub": keys.npub()?,
            }))
        }
        Commands::PublicKey => {
            let keys = cfg.keys()?.ok_or(Error::SigningUnavailable)?;
            Ok(json!({
                "public_key": keys.public_key_hex(),
                "npub": keys.npub()?,
            }))
        }
        Commands::Decode { id } => Ok(match nip19::decode(id.trim()).map_err(Error::from)? {
            Decoded::AlreadyHex(hex) => Value::String(hex),
            Decoded::Bech32(ident) => serde_json::to_value(ident).map_err(Error::from)?,
        }),
        Commands::Bech32 {
            prefix,
            hex,
            slug,
            relay_hint,
            author,
            kind,
        } => {
            let params = EncodeParams {
                prefix,
                hex,
                slug,
                relay: relay_hint,
                author,
                kind,
            };
            Ok(Value::String(nip19::encode(&params).map_err(Error::from)?))
        }
        Commands::Verify { event, check_id } => {
            let ev = parse_event(&event)?;
            let valid = signer::verify(&ev) && (!check_id || signer::verify_id(&ev));
            Ok(Value::Bool(valid))
        }
        Commands::Sign { event } => {
            let ev = parse_event(&event)?;
            let keys = cfg.keys()?;
            let signed = signer::sign(ev, keys.as_ref())?;
            Ok(serde_json::to_value(signed).map_err(Error::from)?)
        }
        Commands::Fetch { target } => {
            let intent = fetch_intent(target)?;
            let mut queries = QueryBuilder::new();
            queries.unique_ids = cli.unique_ids;
            let msg = queries.build(&intent)?;
            dispatch(&cfg, msg, cli.dry_run).await
        }
        Commands::Publish { created_at, kind } => {
            let intent = publish_intent(kind)?;
            let keys = cfg.keys()?;
            let mut events = EventBuilder::new(keys.as_ref());
            if let Some(ts) = created_at {
                events = events.created_at(ts);
            }
            let msg = events.build(&intent)?;
            dispatch(&cfg, msg, cli.dry_run).await
        }
    }
}

/// Send `msg` to the configured relay, or just print it on a dry run.
async fn dispatch(cfg: &Settings, msg: ClientMessage, dry_run: bool) -> Result<Value, SessionError> {
    if dry_run {
        return Ok(msg.to_value()?);
    }
    let relay = cfg
        .relay
        .as_deref()
        .ok_or_else(|| Error::InvalidRelay("no relay configured".into()))?;
    let session = RelaySession::new(relay)?
        .proxy(cfg.proxy.clone())
        .timeout(cfg.timeout);
    let responses = session.exchange(&msg).await?;
    Ok(Value::Array(responses))
}

fn fetch_intent(cmd: FetchCommand) -> error::Result<FetchIntent> {
    Ok(match cmd {
        FetchCommand::Note { id } => FetchIntent::Note(id),
        FetchCommand::Comments { id } => FetchIntent::Comments(id),
        FetchCommand::Author {
            author,
            since,
            limit,
        } => FetchIntent::Author {
            author,
            since,
            limit,
        },
        FetchCommand::Search {
            terms,
            since,
            limit,
        } => FetchIntent::Search {
            terms: terms.join(" "),
            since,
            limit,
        },
        FetchCommand::Raw { message } => FetchIntent::Raw(read_arg(&message)?),
    })
}

fn publish_intent(cmd: PublishCommand) -> error::Result<PublishIntent> {
    Ok(match cmd {
        PublishCommand::Text { content, file } => PublishIntent::Text(text_or_file(content, file)?),
        PublishCommand::Comment {
            note,
            content,
            file,
        } => PublishIntent::Comment {
            note,
            content: text_or_file(content, file)?,
        },
        PublishCommand::Article { slug, title, file } => PublishIntent::Article {
            slug,
            title,
            body: text_or_file(None, file)?,
        },
        PublishCommand::Html { slug, title, file } => PublishIntent::Html {
            slug,
            title,
            body: text_or_file(None, file)?,
        },
        PublishCommand::File { path } => {
            let bytes = fs::read(&path)?;
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            PublishIntent::File { name, bytes }
        }
        PublishCommand::Delete { note } => PublishIntent::Delete { note },
        PublishCommand::Raw { message } => PublishIntent::Raw(read_arg(&message)?),
    })
}

/// File contents win over literal text; neither yields an empty string.
fn text_or_file(text: Option<String>, file: Option<PathBuf>) -> error::Result<String> {
    match file {
        Some(path) => Ok(fs::read_to_string(path)?),
        None => Ok(text.unwrap_or_default()),
    }
}

/// A literal argument, or the contents of the file named after a leading `@`.
fn read_arg(arg: &str) -> error::Result<String> {
    match arg.strip_prefix('@') {
        Some(path) => Ok(fs::read_to_string(path)?),
        None => Ok(arg.to_string()),
    }
}

fn parse_event(arg: &str) -> error::Result<Event> {
    let data = read_arg(arg)?;
    serde_json::from_str(&data).map_err(|e| Error::InvalidEvent(e.to_string()))
}

/// The error object printed on failure, with any relay replies received
/// before it.
fn render_error(err: &SessionError) -> Value {
    let mut out = err.error.to_json();
    if !err.responses.is_empty() {
        out["responses"] = Value::Array(err.responses.clone());
    }
    out
}

fn init_tracing() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!(e))
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    init_tracing()?;
    let cli = Cli::parse();
    match run(cli).await {
        Ok(value) => {
            println!("{value}");
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            println!("{}", render_error(&err));
            Ok(ExitCode::FAILURE)
        }
    }
}
