use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{bail, Result};

use crate::auth::tokens::DEFAULT_ACCESS_TOKEN_LIFETIME_MINUTES;
use crate::db::DbConfig;
use crate::device::ArduinoConfig;

/// Where users, tokens, and bookings live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    /// Process memory; everything is lost on restart.
    Memory,
}

impl StorageBackend {
    fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "memory" => Ok(Self::Memory),
            other => bail!("SLOTGATE_STORAGE must be 'postgres' or 'memory', got '{other}'"),
        }
    }
}

/// What the device gateway drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceBackend {
    ArduinoCli,
    Mock,
}

impl DeviceBackend {
    fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "arduino-cli" | "arduino" => Ok(Self::ArduinoCli),
            "mock" => Ok(Self::Mock),
            other => bail!("SLOTGATE_DEVICE must be 'arduino-cli' or 'mock', got '{other}'"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub log_level: String,
    pub dev_mode: bool,
    pub storage: StorageBackend,
    pub database: DbConfig,
    pub token_lifetime_minutes: i64,
    pub device: DeviceBackend,
    pub arduino: ArduinoConfig,
    pub staging_dir: PathBuf,
    pub cors_origin: Option<String>,
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_flag(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let listen_addr = env_or("SLOTGATE_LISTEN_ADDR", "127.0.0.1:8000").parse()?;

        let log_level = env_or("SLOTGATE_LOG_LEVEL", "info");

        let dev_mode = std::env::var("SLOTGATE_DEV")
            .map(|v| parse_flag(&v))
            .unwrap_or(false);

        let storage = StorageBackend::parse(&env_or("SLOTGATE_STORAGE", "postgres"))?;
        let database = DbConfig::from_env();

        let token_lifetime_minutes: i64 = env_or(
            "SLOTGATE_TOKEN_LIFETIME_MINUTES",
            &DEFAULT_ACCESS_TOKEN_LIFETIME_MINUTES.to_string(),
        )
        .parse()?;
        if token_lifetime_minutes <= 0 {
            bail!("SLOTGATE_TOKEN_LIFETIME_MINUTES must be positive");
        }

        let device = DeviceBackend::parse(&env_or("SLOTGATE_DEVICE", "arduino-cli"))?;
        let defaults = ArduinoConfig::default();
        let arduino = ArduinoConfig {
            cli: std::env::var("SLOTGATE_ARDUINO_CLI")
                .map(PathBuf::from)
                .unwrap_or(defaults.cli),
            port: std::env::var("SLOTGATE_ARDUINO_PORT").unwrap_or(defaults.port),
            fqbn: std::env::var("SLOTGATE_ARDUINO_FQBN").unwrap_or(defaults.fqbn),
            baud_rate: match std::env::var("SLOTGATE_ARDUINO_BAUD") {
                Ok(v) => v.parse()?,
                Err(_) => defaults.baud_rate,
            },
        };

        let staging_dir = PathBuf::from(env_or("SLOTGATE_STAGING_DIR", "./codes"));

        let cors_origin = std::env::var("SLOTGATE_CORS_ORIGIN")
            .ok()
            .filter(|v| !v.trim().is_empty() && v.trim() != "*");

        Ok(Self {
            listen_addr,
            log_level,
            dev_mode,
            storage,
            database,
            token_lifetime_minutes,
            device,
            arduino,
            staging_dir,
            cors_origin,
        })
    }
}
