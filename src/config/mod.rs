//! Configuration management for GameHub
//!
//! Configuration is loaded from a TOML file chosen by environment
//! (`GAMEHUB_ENV`, `GAMEHUB_CONFIG_PATH`), falls back to the environment's
//! built-in defaults when no file exists, and is then overridden by
//! `GAMEHUB_*` environment variables and validated.

use crate::error::{Error, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Stand-in printed for secret values
const REDACTED: &str = "<redacted>";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub economy: EconomyConfig,
    pub chain: ChainConfig,
    pub matches: MatchConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub name: String,
    pub environment: Environment,
    pub log_level: String,
    pub json_logs: bool,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub listen_address: String,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    pub permissive_cors: bool,
}

/// Database configuration
///
/// `url` is either `memory` or `sqlite://<path>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(with = "humantime_serde")]
    pub busy_timeout: Duration,
}

/// Hearts, prices and leaderboard sizes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EconomyConfig {
    pub starting_hearts: u32,
    /// Passive refill never raises the balance above this
    pub free_heart_ceiling: u32,
    /// Purchases never raise the balance above this
    pub max_hearts: u32,
    #[serde(with = "humantime_serde")]
    pub refill_interval: Duration,
    pub heart_price: Decimal,
    pub premium_game_price: Decimal,
    pub currency: String,
    /// Entries kept in a cached per-game leaderboard
    pub leaderboard_capacity: usize,
    /// Entries returned by leaderboard queries
    pub leaderboard_page: usize,
    pub powerup_prices: PowerupPrices,
}

/// Unit price per powerup kind
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PowerupPrices {
    pub sonar: Decimal,
    pub xray: Decimal,
    pub timefreeze: Decimal,
    pub lucky: Decimal,
    pub extra_time: Decimal,
}

/// How purchase transactions are checked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VerifierMode {
    /// Look up the receipt on the configured JSON-RPC endpoint
    Rpc,
    /// Accept every transaction hash; local development only
    AcceptAll,
}

/// Chain RPC and payment addresses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    pub verifier: VerifierMode,
    pub rpc_url: String,
    pub chain_id: u64,
    /// Stable token whose Transfer events count as payment
    pub token_address: String,
    /// Address payments must be sent to
    pub treasury_address: String,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

/// Wagering match configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchConfig {
    /// Shared secret required by the resolve endpoint; resolve is disabled when unset
    pub resolver_token: Option<String>,
    pub event_buffer: usize,
}

/// Environment enumeration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Testing,
    Production,
}

impl Environment {
    pub fn from_env() -> Self {
        let env = env::var("GAMEHUB_ENV").unwrap_or_else(|_| "development".to_string());
        match env.to_lowercase().as_str() {
            "production" | "prod" => Environment::Production,
            "testing" | "test" => Environment::Testing,
            _ => Environment::Development,
        }
    }
}

impl Config {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration, reading `path` instead of the environment's file when given
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let environment = Environment::from_env();
        let config_path = match path {
            Some(p) => {
                if !p.exists() {
                    return Err(Error::Config(format!("Config file not found: {}", p.display())));
                }
                p.to_path_buf()
            }
            None => Self::get_config_path(&environment),
        };

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            tracing::warn!(
                path = %config_path.display(),
                "config file not found, using {:?} defaults",
                environment
            );
            Self::default_for_environment(environment)
        };

        config.override_from_env()?;
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;

        toml::from_str(&contents).map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
    }

    fn get_config_path(environment: &Environment) -> PathBuf {
        if let Ok(path) = env::var("GAMEHUB_CONFIG_PATH") {
            return PathBuf::from(path);
        }

        let filename = match environment {
            Environment::Production => "production.toml",
            Environment::Testing => "testing.toml",
            Environment::Development => "development.toml",
        };
        PathBuf::from("config").join(filename)
    }

    /// Override configuration with environment variables
    fn override_from_env(&mut self) -> Result<()> {
        if let Ok(val) = env::var("GAMEHUB_LISTEN_ADDR") {
            self.server.listen_address = val;
        }

        if let Ok(val) = env::var("GAMEHUB_DATABASE_URL") {
            self.database.url = val;
        }

        if let Ok(val) = env::var("GAMEHUB_LOG_LEVEL") {
            self.app.log_level = val;
        }

        if let Ok(val) = env::var("GAMEHUB_RPC_URL") {
            self.chain.rpc_url = val;
        }

        if let Ok(val) = env::var("GAMEHUB_TREASURY_ADDRESS") {
            self.chain.treasury_address = val;
        }

        if let Ok(val) = env::var("GAMEHUB_CHAIN_ID") {
            self.chain.chain_id = val
                .parse()
                .map_err(|_| Error::Config("Invalid chain id".to_string()))?;
        }

        if let Ok(val) = env::var("GAMEHUB_RESOLVER_TOKEN") {
            self.matches.resolver_token = Some(val).filter(|t| !t.is_empty());
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.server.listen_address.is_empty() {
            return Err(Error::Config("Listen address cannot be empty".to_string()));
        }

        if self.database.url.is_empty() {
            return Err(Error::Config("Database URL cannot be empty".to_string()));
        }

        let economy = &self.economy;
        if economy.free_heart_ceiling > economy.max_hearts {
            return Err(Error::Config(
                "Free heart ceiling cannot exceed max hearts".to_string(),
            ));
        }

        if economy.starting_hearts > economy.max_hearts {
            return Err(Error::Config("Starting hearts cannot exceed max hearts".to_string()));
        }

        if economy.refill_interval.is_zero() {
            return Err(Error::Config("Refill interval must be > 0".to_string()));
        }

        let prices = [
            economy.heart_price,
            economy.premium_game_price,
            economy.powerup_prices.sonar,
            economy.powerup_prices.xray,
            economy.powerup_prices.timefreeze,
            economy.powerup_prices.lucky,
            economy.powerup_prices.extra_time,
        ];
        if prices.iter().any(|p| *p <= Decimal::ZERO) {
            return Err(Error::Config("Prices must be > 0".to_string()));
        }

        if economy.leaderboard_page == 0 || economy.leaderboard_capacity < economy.leaderboard_page {
            return Err(Error::Config(
                "Leaderboard capacity must be >= page size > 0".to_string(),
            ));
        }

        if self.chain.verifier == VerifierMode::Rpc {
            if self.chain.rpc_url.is_empty() {
                return Err(Error::Config("RPC URL cannot be empty".to_string()));
            }
            for (name, address) in [
                ("token", &self.chain.token_address),
                ("treasury", &self.chain.treasury_address),
            ] {
                if !is_address(address) {
                    return Err(Error::Config(format!("Invalid {} address: {}", name, address)));
                }
            }
        }

        if self.app.environment == Environment::Production && self.chain.verifier == VerifierMode::AcceptAll {
            return Err(Error::Config(
                "accept-all verifier is not allowed in production".to_string(),
            ));
        }

        if self.matches.event_buffer == 0 {
            return Err(Error::Config("Match event buffer must be > 0".to_string()));
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_toml()?)
            .map_err(|e| Error::Config(format!("Failed to write config: {}", e)))
    }

    /// A copy safe to display, with secrets masked
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if config.matches.resolver_token.is_some() {
            config.matches.resolver_token = Some(REDACTED.to_string());
        }
        config
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))
    }

    /// Generate default configuration for an environment
    pub fn default_for_environment(environment: Environment) -> Self {
        match environment {
            Environment::Production => Self::production_defaults(),
            Environment::Testing => Self::testing_defaults(),
            Environment::Development => Self::development_defaults(),
        }
    }

    fn production_defaults() -> Self {
        Config {
            app: AppConfig {
                name: "GameHub".to_string(),
                environment: Environment::Production,
                log_level: "info".to_string(),
                json_logs: true,
            },
            server: ServerConfig {
                listen_address: "0.0.0.0:3000".to_string(),
                request_timeout: Duration::from_secs(30),
                permissive_cors: false,
            },
            database: DatabaseConfig {
                url: "sqlite:///var/lib/gamehub/gamehub.db".to_string(),
                busy_timeout: Duration::from_secs(5),
            },
            economy: EconomyConfig {
                starting_hearts: 5,
                free_heart_ceiling: 5,
                max_hearts: 10,
                refill_interval: Duration::from_secs(30 * 60),
                heart_price: dec!(0.02),
                premium_game_price: dec!(0.1),
                currency: "cUSD".to_string(),
                leaderboard_capacity: 100,
                leaderboard_page: 50,
                powerup_prices: PowerupPrices {
                    sonar: dec!(0.03),
                    xray: dec!(0.03),
                    timefreeze: dec!(0.05),
                    lucky: dec!(0.08),
                    extra_time: dec!(0.05),
                },
            },
            chain: ChainConfig {
                verifier: VerifierMode::Rpc,
                rpc_url: "https://forno.celo.org".to_string(),
                chain_id: 42220,
                token_address: "0x765DE816845861e75A25fCA122bb6898B8B1282a".to_string(),
                treasury_address: "0x0000000000000000000000000000000000000000".to_string(),
                request_timeout: Duration::from_secs(60),
            },
            matches: MatchConfig {
                resolver_token: None,
                event_buffer: 256,
            },
        }
    }

    fn development_defaults() -> Self {
        let mut config = Self::production_defaults();
        config.app.environment = Environment::Development;
        config.app.log_level = "debug".to_string();
        config.app.json_logs = false;
        config.server.listen_address = "127.0.0.1:3000".to_string();
        config.server.permissive_cors = true;
        config.database.url = "sqlite://./data/gamehub.db".to_string();
        config.chain.rpc_url = "https://forno.celo-sepolia.celo-testnet.org".to_string();
        config.chain.chain_id = 11142220;
        config.chain.token_address = "0xdE9e4C3ce781b4bA68120d6261cbad65ce0aB00b".to_string();
        config
    }

    fn testing_defaults() -> Self {
        let mut config = Self::development_defaults();
        config.app.environment = Environment::Testing;
        config.server.listen_address = "127.0.0.1:0".to_string();
        config.database.url = "memory".to_string();
        config.chain.verifier = VerifierMode::AcceptAll;
        config.matches.resolver_token = Some("test-resolver-token".to_string());
        config
    }
}

/// `0x` followed by 40 hex digits
pub fn is_address(value: &str) -> bool {
    value
        .strip_prefix("0x")
        .map(|hex_part| hex_part.len() == 40 && hex::decode(hex_part).is_ok())
        .unwrap_or(false)
}
