use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Lectern presentation engagement server
#[derive(Parser, Serialize, Deserialize, Clone, Debug)]
#[command(name = "lectern-server", version, about = "Lectern presentation engagement server")]
pub struct Config {
    /// Port to listen on
    #[arg(long, env = "LECTERN_PORT", default_value = "5000")]
    pub port: u16,

    /// Bind address
    #[arg(long, env = "LECTERN_BIND_ADDRESS", default_value = "0.0.0.0")]
    pub bind_address: String,

    /// Path to TOML config file
    #[arg(long, default_value = "./lectern.toml")]
    pub config: String,

    /// Enable structured JSON logging (for Docker/production)
    #[arg(long, env = "LECTERN_JSON_LOGS")]
    pub json_logs: bool,

    /// Output a commented TOML config template and exit
    #[arg(long)]
    pub generate_config: bool,

    /// Data directory for persistent state (DB, signing key)
    #[arg(long, env = "LECTERN_DATA_DIR", default_value = "./data")]
    pub data_dir: String,

    /// Lifetime of issued access tokens, in seconds
    #[arg(long, env = "LECTERN_TOKEN_TTL_SECS", default_value = "3600")]
    pub token_ttl_secs: i64,

    /// Room housekeeping (loaded from [rooms] section in TOML)
    #[arg(skip)]
    #[serde(default)]
    pub rooms: RoomsConfig,
}

/// Configuration for in-memory presentation rooms.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RoomsConfig {
    /// Seconds a room may stay empty before it is evicted (default: 600)
    #[serde(default = "default_idle_eviction")]
    pub idle_eviction_secs: u64,

    /// Interval in seconds between eviction sweeps (default: 60)
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for RoomsConfig {
    fn default() -> Self {
        Self {
            idle_eviction_secs: default_idle_eviction(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

fn default_idle_eviction() -> u64 {
    600
}

fn default_sweep_interval() -> u64 {
    60
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 5000,
            bind_address: "0.0.0.0".to_string(),
            config: "./lectern.toml".to_string(),
            json_logs: false,
            generate_config: false,
            data_dir: "./data".to_string(),
            token_ttl_secs: 3600,
            rooms: RoomsConfig::default(),
        }
    }
}

impl Config {
    /// Load config with layered precedence:
    /// built-in defaults < TOML file < env vars (LECTERN_*) < CLI args
    pub fn load() -> Result<Self, figment::Error> {
        let cli = Config::parse();
        Self::layered(cli)
    }

    fn layered(cli: Config) -> Result<Self, figment::Error> {
        let config_path = cli.config.clone();
        // The CLI struct always carries its own [rooms] defaults; keep the file's values for that section.
        let file: Figment = Figment::new().merge(Toml::file(&config_path));
        let rooms: RoomsConfig = file.extract_inner("rooms").unwrap_or_default();

        let mut config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(file)
            .merge(Env::prefixed("LECTERN_"))
            .merge(Serialized::defaults(cli))
            .extract()?;
        config.rooms = rooms;
        Ok(config)
    }
}

/// Generate a commented TOML config template
pub fn generate_config_template() -> String {
    r#"# Lectern Server Configuration
# Place this file at ./lectern.toml or specify with --config <path>
# All settings can be overridden via environment variables (LECTERN_PORT, etc.)
# or CLI flags (--port, etc.)

# Server port (default: 5000)
# port = 5000

# Bind address (default: 0.0.0.0, all interfaces)
# bind_address = "0.0.0.0"

# Enable structured JSON logging for Docker/production
# json_logs = false

# Data directory for SQLite database and JWT signing key
# data_dir = "./data"

# Access token lifetime in seconds (default: 3600)
# token_ttl_secs = 3600

# ---- Presentation Rooms ----
# [rooms]

# Evict a room after it has had no connected members for this long (default: 600)
# idle_eviction_secs = 600

# Interval in seconds between eviction sweeps (default: 60)
# sweep_interval_secs = 60
"#
    .to_string()
}
