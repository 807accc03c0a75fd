//! Configuration system for the murmur CLI.

use murmur_core::EngineConfig;
use murmur_crypto::{DEFAULT_KEY_BITS, MAX_KEY_BITS, MIN_KEY_BITS, PublicKey};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// murmur configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Node configuration
    pub node: NodeConfig,
    /// Network configuration
    pub network: NetworkConfig,
    /// Nickname to SPKI PEM public key
    pub friends: BTreeMap<String, String>,
    /// Engine tuning
    pub engine: EngineConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Private key file path (PKCS#8 PEM)
    #[serde(default = "default_private_key_path")]
    pub private_key_file: PathBuf,
    /// Modulus size for a generated key
    #[serde(default = "default_key_bits")]
    pub key_bits: usize,
}

/// Network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Do not accept incoming connections
    #[serde(default)]
    pub no_server: bool,
    /// Peers to dial on start (host:port)
    #[serde(default)]
    pub peers: Vec<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default values

fn default_private_key_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(".murmur/private_key.pem")
}

fn default_key_bits() -> usize {
    DEFAULT_KEY_BITS
}

fn default_listen_addr() -> String {
    "0.0.0.0:3030".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            private_key_file: default_private_key_path(),
            key_bits: default_key_bits(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            no_server: false,
            peers: Vec::new(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;

        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(path, contents)?;
        Ok(())
    }

    /// Get default config path
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("murmur/config.toml")
    }

    /// Load config from `path`, or create and save the default if it doesn't exist
    ///
    /// # Errors
    ///
    /// Returns an error if reading or creating the config fails.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();

        if path.exists() {
            Self::load(path)
        } else {
            let config = Self::default();
            config.save(path)?;
            Ok(config)
        }
    }

    /// Parse listen address as `SocketAddr`
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be parsed.
    pub fn parse_listen_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.network.listen_addr.parse()?)
    }

    /// Parse every friend's public key
    ///
    /// # Errors
    ///
    /// Returns an error naming the first friend whose key does not parse.
    pub fn friend_keys(&self) -> anyhow::Result<Vec<(String, PublicKey)>> {
        self.friends
            .iter()
            .map(|(nick, pem)| {
                PublicKey::from_pem(pem)
                    .map(|key| (nick.clone(), key))
                    .map_err(|e| anyhow::anyhow!("Friend '{nick}' has an invalid key: {e}"))
            })
            .collect()
    }

    /// Add or replace a friend
    ///
    /// # Errors
    ///
    /// Returns an error if the nickname is unusable.
    pub fn add_friend(&mut self, nick: &str, key: &PublicKey) -> anyhow::Result<()> {
        validate_nick(nick)?;
        self.friends.insert(nick.to_string(), key.to_pem()?);
        Ok(())
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns an error if configuration is invalid.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.parse_listen_addr()?;

        if !(MIN_KEY_BITS..=MAX_KEY_BITS).contains(&self.node.key_bits) {
            anyhow::bail!(
                "Key size must be between {MIN_KEY_BITS} and {MAX_KEY_BITS} bits, got {}",
                self.node.key_bits
            );
        }

        for peer in &self.network.peers {
            validate_host_port(peer, "Peer")?;
        }

        for nick in self.friends.keys() {
            validate_nick(nick)?;
        }
        self.friend_keys()?;

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!(
                "Invalid log level: {}. Must be one of: {}",
                self.logging.level,
                valid_log_levels.join(", ")
            );
        }

        self.engine.validate()?;

        Ok(())
    }
}

/// Nicknames appear before the `:` of a console line
fn validate_nick(nick: &str) -> anyhow::Result<()> {
    if nick.is_empty() {
        anyhow::bail!("Nickname cannot be empty");
    }
    if nick.contains(':') || nick.chars().any(char::is_whitespace) {
        anyhow::bail!("Nickname '{nick}' cannot contain ':' or whitespace");
    }
    Ok(())
}

/// Validate host:port format
pub fn validate_host_port(addr: &str, name: &str) -> anyhow::Result<()> {
    let Some((host, port_str)) = addr.rsplit_once(':') else {
        anyhow::bail!("{name} '{addr}' missing port (expected format: host:port)");
    };

    let port: u16 = port_str
        .parse()
        .map_err(|_| anyhow::anyhow!("{name} '{addr}' has invalid port: {port_str}"))?;

    if port == 0 {
        anyhow::bail!("{name} '{addr}' has invalid port: 0");
    }

    if host.is_empty() {
        anyhow::bail!("{name} '{addr}' has empty hostname");
    }

    if host.contains("..") || host.contains('/') || host.contains('\\') {
        anyhow::bail!("{name} '{addr}' contains invalid characters");
    }

    Ok(())
}
