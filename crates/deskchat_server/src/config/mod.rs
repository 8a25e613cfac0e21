#![forbid(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context as _, anyhow};
use deskchat_auth::SecretString;
use serde::Deserialize;
use tracing::{info, warn};

/// Default config path: `~/.deskchat/config.toml`.
pub fn default_config_path() -> anyhow::Result<PathBuf> {
	let home = dirs::home_dir().ok_or_else(|| anyhow!("could not determine home directory"))?;
	Ok(home.join(".deskchat").join("config.toml"))
}

/// Load the server config from TOML and env overrides.
#[allow(dead_code)]
pub fn load_server_config() -> anyhow::Result<ServerConfig> {
	let path = default_config_path()?;
	load_server_config_from_path(&path)
}

/// Same as `load_server_config` but with an explicit config path.
pub fn load_server_config_from_path(path: &Path) -> anyhow::Result<ServerConfig> {
	let file_cfg = read_toml_if_exists(path)
		.with_context(|| format!("read config from {}", path.display()))?
		.unwrap_or_default();

	let mut cfg = ServerConfig::from_file(file_cfg);

	apply_env_overrides(&mut cfg);

	Ok(cfg)
}

/// Server config (v1).
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
	pub server: ServerSettings,
	pub users: Vec<UserEntry>,
}

/// Server settings loaded by the server.
#[derive(Debug, Clone)]
pub struct ServerSettings {
	/// Optional metrics exporter bind address (host:port).
	pub metrics_bind: Option<String>,
	/// HMAC passphrase for legacy session tokens.
	pub auth_hmac_secret: Option<SecretString>,
	/// Session token validity window.
	pub token_validity: Duration,
	/// X.509 PEM public key path for current-scheme verification.
	pub rsa_public_key_path: Option<PathBuf>,
	/// PKCS#8 PEM private key path for current-scheme issuing.
	pub rsa_private_key_path: Option<PathBuf>,
	/// Per-connection outbound queue capacity.
	pub delivery_queue_capacity: usize,
	/// Greeting seeded on first join (optional override).
	pub welcome_message: Option<String>,
}

impl Default for ServerSettings {
	fn default() -> Self {
		Self {
			metrics_bind: None,
			auth_hmac_secret: None,
			token_validity: Duration::from_secs(3600),
			rsa_public_key_path: None,
			rsa_private_key_path: None,
			delivery_queue_capacity: 256,
			welcome_message: None,
		}
	}
}

/// Bootstrap user-record entry for the in-memory user store.
#[derive(Debug, Clone, Deserialize)]
pub struct UserEntry {
	pub id: i64,
	pub username: String,
	pub password_hash: String,
	pub role: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileConfig {
	#[serde(default)]
	server: FileServerSettings,

	#[serde(default)]
	users: Vec<UserEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileServerSettings {
	metrics_bind: Option<String>,
	auth_hmac_secret: Option<String>,
	token_validity_secs: Option<u64>,
	rsa_public_key_path: Option<String>,
	rsa_private_key_path: Option<String>,
	delivery_queue_capacity: Option<usize>,
	welcome_message: Option<String>,
}

impl ServerConfig {
	fn from_file(file: FileConfig) -> Self {
		Self {
			server: ServerSettings {
				metrics_bind: file.server.metrics_bind.filter(|s| !s.trim().is_empty()),
				auth_hmac_secret: file
					.server
					.auth_hmac_secret
					.filter(|s| !s.trim().is_empty())
					.map(SecretString::new),
				token_validity: file
					.server
					.token_validity_secs
					.filter(|v| *v > 0)
					.map(Duration::from_secs)
					.unwrap_or(Duration::from_secs(3600)),
				rsa_public_key_path: file
					.server
					.rsa_public_key_path
					.filter(|s| !s.trim().is_empty())
					.map(PathBuf::from),
				rsa_private_key_path: file
					.server
					.rsa_private_key_path
					.filter(|s| !s.trim().is_empty())
					.map(PathBuf::from),
				delivery_queue_capacity: file.server.delivery_queue_capacity.filter(|v| *v > 0).unwrap_or(256),
				welcome_message: file.server.welcome_message.filter(|s| !s.trim().is_empty()),
			},
			users: file.users,
		}
	}
}

fn read_toml_if_exists(path: &Path) -> anyhow::Result<Option<FileConfig>> {
	match fs::read_to_string(path) {
		Ok(s) => {
			let cfg: FileConfig = toml::from_str(&s).context("parse TOML")?;
			Ok(Some(cfg))
		}
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
		Err(e) => Err(anyhow!(e).context("read config file")),
	}
}

fn apply_env_overrides(cfg: &mut ServerConfig) {
	if let Ok(v) = std::env::var("DESKCHAT_METRICS_BIND") {
		let v = v.trim().to_string();
		if !v.is_empty() {
			cfg.server.metrics_bind = Some(v);
			info!("server config: metrics_bind overridden by env");
		}
	}

	if let Ok(v) = std::env::var("DESKCHAT_AUTH_HMAC_SECRET") {
		let v = v.trim().to_string();
		if !v.is_empty() {
			cfg.server.auth_hmac_secret = Some(SecretString::new(v));
			info!("server auth: auth_hmac_secret overridden by env");
		}
	}

	if let Ok(v) = std::env::var("DESKCHAT_TOKEN_VALIDITY_SECS")
		&& let Ok(secs) = v.trim().parse::<u64>()
		&& secs > 0
	{
		cfg.server.token_validity = Duration::from_secs(secs);
		info!(secs, "server auth: token_validity overridden by env");
	}

	if let Ok(v) = std::env::var("DESKCHAT_RSA_PUBLIC_KEY") {
		let v = v.trim().to_string();
		if !v.is_empty() {
			cfg.server.rsa_public_key_path = Some(PathBuf::from(v));
			info!("server auth: rsa_public_key_path overridden by env");
		}
	}

	if let Ok(v) = std::env::var("DESKCHAT_RSA_PRIVATE_KEY") {
		let v = v.trim().to_string();
		if !v.is_empty() {
			cfg.server.rsa_private_key_path = Some(PathBuf::from(v));
			info!("server auth: rsa_private_key_path overridden by env");
		}
	}

	if let Ok(v) = std::env::var("DESKCHAT_DELIVERY_QUEUE_CAPACITY")
		&& let Ok(capacity) = v.trim().parse::<usize>()
		&& capacity > 0
	{
		cfg.server.delivery_queue_capacity = capacity;
		info!(capacity, "server config: delivery_queue_capacity overridden by env");
	}

	if cfg.server.auth_hmac_secret.is_none() {
		warn!("server auth: no auth_hmac_secret configured; legacy credentials will not verify against a real secret");
	}
}
