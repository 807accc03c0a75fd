//! murmur CLI
//!
//! Flood-routed, end-to-end encrypted messaging over plain TCP links.

mod config;
mod console;

use anyhow::Context;
use clap::{Parser, Subcommand};
use murmur_core::{Engine, NodeId};
use murmur_crypto::{PrivateKey, PublicKey};
use std::fs;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use config::{Config, validate_host_port};
use console::{Directory, parse_line};

/// murmur - every node hears every block, only the recipient can read it
#[derive(Parser)]
#[command(name = "murmur")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a new RSA identity
    Keygen {
        /// Modulus size in bits
        #[arg(long)]
        bits: Option<usize>,

        /// Output file for the private key (defaults to the configured key file)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show this node's id and public key
    Id,

    /// Manage the nickname book
    Friend {
        #[command(subcommand)]
        action: FriendCommand,
    },

    /// Join the overlay and chat
    Run {
        /// Listen address
        #[arg(short, long)]
        listen: Option<String>,

        /// Peer to dial (host:port), may be repeated
        #[arg(short, long = "peer")]
        peers: Vec<String>,

        /// Do not accept incoming connections
        #[arg(long)]
        no_server: bool,
    },
}

#[derive(Subcommand)]
enum FriendCommand {
    /// Add or replace a friend from a public key PEM file
    Add {
        /// Nickname used on the console
        nick: String,

        /// SPKI PEM public key file
        pem_file: PathBuf,
    },

    /// List known friends
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let mut config = Config::load_or_default(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    // Initialize logging; RUST_LOG wins over the configured level
    let level = if cli.verbose {
        "debug".to_string()
    } else {
        config.logging.level.clone()
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&level)),
        )
        .init();

    config.validate()?;

    match cli.command {
        Commands::Keygen { bits, output } => {
            let bits = bits.unwrap_or(config.node.key_bits);
            let output = output.unwrap_or_else(|| config.node.private_key_file.clone());
            keygen(bits, &output).await?;
        }
        Commands::Id => {
            let key = load_private_key(&config.node.private_key_file)?;
            print_identity(key.public_key())?;
        }
        Commands::Friend { action } => match action {
            FriendCommand::Add { nick, pem_file } => {
                let pem = fs::read_to_string(&pem_file)
                    .with_context(|| format!("reading {}", pem_file.display()))?;
                let key = PublicKey::from_pem(&pem)?;
                config.add_friend(&nick, &key)?;
                config.save(&config_path)?;
                println!("{nick} = {}", NodeId::of(&key));
            }
            FriendCommand::List => {
                for (nick, key) in config.friend_keys()? {
                    println!("{nick:<16} {}", NodeId::of(&key));
                }
            }
        },
        Commands::Run {
            listen,
            peers,
            no_server,
        } => {
            if let Some(listen) = listen {
                config.network.listen_addr = listen;
            }
            config.network.no_server |= no_server;
            for peer in &peers {
                validate_host_port(peer, "Peer")?;
            }
            config.network.peers.extend(peers);
            config.validate()?;

            let key = ensure_identity(&mut config, &config_path).await?;
            run(config, key).await?;
        }
    }

    Ok(())
}

async fn generate_key(bits: usize) -> anyhow::Result<PrivateKey> {
    tracing::info!("Generating {bits}-bit RSA key, this can take a while");
    Ok(tokio::task::spawn_blocking(move || PrivateKey::generate(bits)).await??)
}

async fn keygen(bits: usize, output: &Path) -> anyhow::Result<()> {
    if output.exists() {
        anyhow::bail!(
            "{} already exists; refusing to overwrite an identity",
            output.display()
        );
    }

    let key = generate_key(bits).await?;
    save_private_key(&key, output)?;

    println!("Private key written to {}", output.display());
    print_identity(key.public_key())
}

fn print_identity(key: &PublicKey) -> anyhow::Result<()> {
    println!("Node id: {}", NodeId::of(key));
    print!("{}", key.to_pem()?);
    Ok(())
}

fn load_private_key(path: &Path) -> anyhow::Result<PrivateKey> {
    let pem = fs::read_to_string(path)
        .with_context(|| format!("reading private key {}", path.display()))?;
    Ok(PrivateKey::from_pem(&pem)?)
}

fn save_private_key(key: &PrivateKey, path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, key.to_pem()?.as_bytes())?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }

    Ok(())
}

/// Load the configured key, creating it and a `self` friend on first run.
async fn ensure_identity(config: &mut Config, config_path: &Path) -> anyhow::Result<PrivateKey> {
    let path = config.node.private_key_file.clone();
    if path.exists() {
        return load_private_key(&path);
    }

    let key = generate_key(config.node.key_bits).await?;
    save_private_key(&key, &path)?;
    if !config.friends.contains_key("self") {
        config.add_friend("self", key.public_key())?;
    }
    config.save(config_path)?;

    tracing::info!("Created identity {}", NodeId::of(key.public_key()));
    Ok(key)
}

async fn run(config: Config, key: PrivateKey) -> anyhow::Result<()> {
    let directory = Directory::new(config.friend_keys()?);
    let engine = Engine::new(key, config.engine.clone())?;
    let mut deliveries = engine
        .deliveries()
        .context("delivery stream already taken")?;

    println!("Node id: {}", engine.node_id());

    if !config.network.no_server {
        let listener = TcpListener::bind(config.parse_listen_addr()?).await?;
        tracing::info!("Listening on {}", listener.local_addr()?);
        tokio::spawn(accept_loop(listener, engine.clone()));
    }

    for peer in &config.network.peers {
        match TcpStream::connect(peer).await {
            Ok(stream) => attach(&engine, stream, peer),
            Err(e) => tracing::warn!("Failed to connect to {peer}: {e}"),
        }
    }

    // RSA signing and wrapping stay off the runtime, one message at a time
    let (queue, pending) = mpsc::unbounded_channel();
    let sender = tokio::task::spawn_blocking({
        let engine = engine.clone();
        move || send_loop(&engine, pending)
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            Some(block) = deliveries.recv() => println!("{}", directory.render(&block)),
            line = lines.next_line() => match line? {
                Some(line) => queue_line(&queue, &directory, &line),
                None => break,
            },
        }
    }

    drop(queue);
    sender.await?;
    engine.shutdown().await;

    while let Some(block) = deliveries.try_recv() {
        println!("{}", directory.render(&block));
    }
    Ok(())
}

/// A console message waiting for the send worker
#[derive(Debug)]
struct QueuedMessage {
    nick: String,
    recipient: PublicKey,
    payload: Vec<u8>,
}

fn queue_line(queue: &mpsc::UnboundedSender<QueuedMessage>, directory: &Directory, line: &str) {
    if line.trim().is_empty() {
        return;
    }

    let Some(outgoing) = parse_line(line) else {
        eprintln!("Expected 'nick: message'");
        return;
    };
    let Some(recipient) = directory.key_of(outgoing.nick) else {
        eprintln!("Unknown friend '{}'", outgoing.nick);
        return;
    };

    let message = QueuedMessage {
        nick: outgoing.nick.to_string(),
        recipient: recipient.clone(),
        payload: outgoing.message.as_bytes().to_vec(),
    };
    if queue.send(message).is_err() {
        eprintln!("Send worker stopped, message to {} dropped", outgoing.nick);
    }
}

/// Sign, encrypt and broadcast queued messages in order. Runs on a blocking thread.
fn send_loop(engine: &Engine, mut pending: mpsc::UnboundedReceiver<QueuedMessage>) {
    while let Some(message) = pending.blocking_recv() {
        match engine.send(&message.recipient, Vec::new(), message.payload) {
            Ok(hash) => tracing::debug!("Sent {hash} to {}", message.nick),
            Err(e) => eprintln!("Send to {} failed: {e}", message.nick),
        }
    }
}

async fn accept_loop(listener: TcpListener, engine: Engine) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => attach(&engine, stream, &addr.to_string()),
            Err(e) => {
                tracing::warn!("Accept failed: {e}");
                if engine.is_shut_down() {
                    return;
                }
            }
        }
    }
}

fn attach(engine: &Engine, stream: TcpStream, peer: &str) {
    if let Err(e) = stream.set_nodelay(true) {
        tracing::debug!("Failed to set TCP_NODELAY for {peer}: {e}");
    }

    let (reader, writer) = stream.into_split();
    match engine.add_split_link(reader, writer) {
        Ok(id) => tracing::info!("{id}: connected to {peer}"),
        Err(e) => tracing::warn!("Could not attach {peer}: {e}"),
    }
}
