//! Configuration management

use clap::Parser;
use config::builder::DefaultState;
use config::{Config as ConfigSource, ConfigBuilder, ConfigError as BuilderError, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid server configuration: {0}")]
    InvalidServer(String),

    #[error("Invalid database configuration: {0}")]
    InvalidDatabase(String),

    #[error("Invalid logging configuration: {0}")]
    InvalidLogging(String),

    #[error("Invalid security configuration: {0}")]
    InvalidSecurity(String),

    #[error("Invalid lending configuration: {0}")]
    InvalidLending(String),

    #[error("Invalid gamification configuration: {0}")]
    InvalidGamification(String),

    #[error("Invalid seed configuration: {0}")]
    InvalidSeed(String),

    #[error("Failed to load configuration: {0}")]
    LoadError(String),

    #[error("Configuration file not found: {0}")]
    FileNotFound(String),
}

impl From<BuilderError> for ConfigError {
    fn from(err: BuilderError) -> Self {
        ConfigError::LoadError(err.to_string())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub security: SecurityConfig,
    pub lending: LendingConfig,
    pub gamification: GamificationConfig,
    pub seed: SeedConfig,
}

impl Config {
    /// Load configuration with precedence: CLI args > Environment variables > Config file > Defaults
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_args(CliArgs::parse())
    }

    /// Load configuration using already parsed command-line arguments
    pub fn load_from_args(cli_args: CliArgs) -> Result<Self, ConfigError> {
        // 1. Defaults (lowest priority)
        let mut builder = with_defaults(ConfigSource::builder())?;

        // 2. Config file, if given
        if let Some(config_path) = &cli_args.config {
            if !config_path.exists() {
                return Err(ConfigError::FileNotFound(config_path.display().to_string()));
            }
            builder = builder.add_source(File::from(config_path.as_path()));
        }

        // 3. Environment, e.g. LEAF_SERVER__PORT=8080
        builder = builder.add_source(
            Environment::with_prefix("LEAF")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("security.allowed_origins"),
        );

        // 4. CLI arguments (highest priority)
        if let Some(host) = &cli_args.host {
            builder = builder.set_override("server.host", host.clone())?;
        }
        if let Some(port) = cli_args.port {
            builder = builder.set_override("server.port", port)?;
        }
        if let Some(db_path) = &cli_args.database {
            builder = builder.set_override("database.path", db_path.display().to_string())?;
        }
        if let Some(log_level) = &cli_args.log_level {
            builder = builder.set_override("logging.level", log_level.clone())?;
        }

        let config: Config = builder.build()?.try_deserialize()?;
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file path, falling back to defaults for missing keys
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let config: Config = with_defaults(ConfigSource::builder())?
            .add_source(File::from(path))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Result<Self, ConfigError> {
        let config: Config = with_defaults(ConfigSource::builder())?
            .add_source(
                Environment::with_prefix("LEAF")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Built-in defaults with no file or environment involved
    pub fn defaults() -> Result<Self, ConfigError> {
        let config: Config = with_defaults(ConfigSource::builder())?
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate all configuration parameters
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.database.validate()?;
        self.logging.validate()?;
        self.security.validate()?;
        self.lending.validate()?;
        self.gamification.validate()?;
        self.seed.validate()?;
        Ok(())
    }
}

fn with_defaults(
    builder: ConfigBuilder<DefaultState>,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Ok(builder
        .set_default("server.host", "127.0.0.1")?
        .set_default("server.port", 5000)?
        .set_default("server.request_timeout", 30)?
        .set_default("database.path", "./data/leaf.db")?
        .set_default("database.connection_pool_size", 10)?
        .set_default("database.busy_timeout", 5000)?
        .set_default("logging.level", "info")?
        .set_default("logging.format", "json")?
        .set_default("logging.output", "stdout")?
        .set_default("logging.max_file_size", 10485760)? // 10 MB
        .set_default("logging.max_backups", 5)?
        .set_default("security.jwt_secret", "change-this-secret-in-production")?
        .set_default("security.token_ttl_hours", 168)?
        .set_default("security.allowed_origins", vec!["*"])?
        .set_default("security.enable_hsts", false)?
        .set_default("security.hsts_max_age", 31536000)?
        .set_default("lending.default_loan_days", 14)?
        .set_default("lending.max_loan_days", 90)?
        .set_default("gamification.online_window_secs", 300)?
        .set_default("gamification.leaderboard_size", 20)?
        .set_default("gamification.store_min_points", 150)?
        .set_default("gamification.leech_interval_secs", 300)?
        .set_default("gamification.leech_min_percent", 0.05)?
        .set_default("gamification.leech_max_percent", 0.06)?
        .set_default("gamification.leech_candidate_pool", 10)?
        .set_default("gamification.leech_min_target_points", 100)?
        .set_default("gamification.banner_cost", 50)?
        .set_default("gamification.title_cost", 100)?
        .set_default("gamification.title_color_cost", 25)?
        .set_default("gamification.background_cost", 50)?
        .set_default("seed.catalog_on_startup", true)?
        .set_default("seed.sample_books", false)?
        .set_default("seed.admin_username", "admin")?
        .set_default("seed.admin_email", "admin@leaf.local")?
        .set_default("seed.admin_password", "admin123")?)
}

/// Command-line arguments for configuration override
#[derive(Debug, Default, Parser)]
#[command(name = "leaf-server")]
#[command(about = "L.E.A.F book lending server", long_about = None)]
pub struct CliArgs {
    /// Path to configuration file (TOML format)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Server host address
    #[arg(long, value_name = "HOST")]
    pub host: Option<String>,

    /// Server port
    #[arg(short, long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Database file path
    #[arg(short, long, value_name = "PATH")]
    pub database: Option<PathBuf>,

    /// Log level (debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub request_timeout: u64, // seconds
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.is_empty() {
            return Err(ConfigError::InvalidServer("host cannot be empty".to_string()));
        }

        if self.port == 0 {
            return Err(ConfigError::InvalidServer("port must be greater than 0".to_string()));
        }

        if self.request_timeout == 0 {
            return Err(ConfigError::InvalidServer(
                "request_timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub connection_pool_size: usize,
    pub busy_timeout: u64, // milliseconds
}

impl DatabaseConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.path.as_os_str().is_empty() {
            return Err(ConfigError::InvalidDatabase("path cannot be empty".to_string()));
        }

        if self.connection_pool_size == 0 {
            return Err(ConfigError::InvalidDatabase(
                "connection_pool_size must be greater than 0".to_string(),
            ));
        }

        if self.busy_timeout == 0 {
            return Err(ConfigError::InvalidDatabase(
                "busy_timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    pub output: String,
    pub log_file: Option<PathBuf>,
    pub max_file_size: usize, // bytes
    pub max_backups: usize,
}

impl LoggingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.level.as_str()) {
            return Err(ConfigError::InvalidLogging(format!(
                "level must be one of: {:?}",
                valid_levels
            )));
        }

        let valid_formats = ["json", "text"];
        if !valid_formats.contains(&self.format.as_str()) {
            return Err(ConfigError::InvalidLogging(format!(
                "format must be one of: {:?}",
                valid_formats
            )));
        }

        let valid_outputs = ["stdout", "file"];
        if !valid_outputs.contains(&self.output.as_str()) {
            return Err(ConfigError::InvalidLogging(format!(
                "output must be one of: {:?}",
                valid_outputs
            )));
        }

        if self.output == "file" && self.log_file.is_none() {
            return Err(ConfigError::InvalidLogging(
                "log_file must be specified when output is 'file'".to_string(),
            ));
        }

        if self.max_file_size == 0 {
            return Err(ConfigError::InvalidLogging(
                "max_file_size must be greater than 0".to_string(),
            ));
        }

        if self.max_backups == 0 {
            return Err(ConfigError::InvalidLogging(
                "max_backups must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    pub jwt_secret: String,
    pub token_ttl_hours: i64,
    pub allowed_origins: Vec<String>,
    pub enable_hsts: bool,
    pub hsts_max_age: u64, // seconds
}

impl SecurityConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt_secret.is_empty() {
            return Err(ConfigError::InvalidSecurity("jwt_secret cannot be empty".to_string()));
        }

        if self.token_ttl_hours <= 0 {
            return Err(ConfigError::InvalidSecurity(
                "token_ttl_hours must be greater than 0".to_string(),
            ));
        }

        if self.allowed_origins.is_empty() {
            return Err(ConfigError::InvalidSecurity(
                "allowed_origins cannot be empty".to_string(),
            ));
        }

        if self.enable_hsts && self.hsts_max_age == 0 {
            return Err(ConfigError::InvalidSecurity(
                "hsts_max_age must be greater than 0 when enable_hsts is true".to_string(),
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LendingConfig {
    /// Loan length used when a borrower proposes no due date
    pub default_loan_days: i64,
    /// Longest loan a borrower may propose
    pub max_loan_days: i64,
}

impl LendingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_loan_days <= 0 {
            return Err(ConfigError::InvalidLending(
                "default_loan_days must be greater than 0".to_string(),
            ));
        }

        if self.max_loan_days < self.default_loan_days {
            return Err(ConfigError::InvalidLending(
                "max_loan_days must be at least default_loan_days".to_string(),
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GamificationConfig {
    pub online_window_secs: i64,
    pub leaderboard_size: usize,
    pub store_min_points: i64,
    pub leech_interval_secs: u64,
    pub leech_min_percent: f64,
    pub leech_max_percent: f64,
    pub leech_candidate_pool: usize,
    pub leech_min_target_points: i64,
    pub banner_cost: i64,
    pub title_cost: i64,
    pub title_color_cost: i64,
    pub background_cost: i64,
}

impl GamificationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.online_window_secs <= 0 {
            return Err(ConfigError::InvalidGamification(
                "online_window_secs must be greater than 0".to_string(),
            ));
        }

        if self.leaderboard_size == 0 {
            return Err(ConfigError::InvalidGamification(
                "leaderboard_size must be greater than 0".to_string(),
            ));
        }

        if self.leech_interval_secs == 0 {
            return Err(ConfigError::InvalidGamification(
                "leech_interval_secs must be greater than 0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.leech_min_percent)
            || !(0.0..=1.0).contains(&self.leech_max_percent)
            || self.leech_min_percent > self.leech_max_percent
        {
            return Err(ConfigError::InvalidGamification(
                "leech percentages must satisfy 0 <= min <= max <= 1".to_string(),
            ));
        }

        if self.leech_candidate_pool == 0 {
            return Err(ConfigError::InvalidGamification(
                "leech_candidate_pool must be greater than 0".to_string(),
            ));
        }

        let costs = [
            self.banner_cost,
            self.title_cost,
            self.title_color_cost,
            self.background_cost,
        ];
        if costs.iter().any(|c| *c < 0) {
            return Err(ConfigError::InvalidGamification(
                "profile costs cannot be negative".to_string(),
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedConfig {
    /// Seed the achievement and power-up catalogs when they are empty
    pub catalog_on_startup: bool,
    /// Seed the sample books when the catalog is empty
    pub sample_books: bool,
    pub admin_username: String,
    pub admin_email: String,
    pub admin_password: String,
}

impl SeedConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.admin_username.trim().is_empty() || self.admin_email.trim().is_empty() {
            return Err(ConfigError::InvalidSeed(
                "admin_username and admin_email cannot be empty".to_string(),
            ));
        }

        if self.admin_password.len() < 6 {
            return Err(ConfigError::InvalidSeed(
                "admin_password must be at least 6 characters".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::defaults().unwrap();
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.lending.default_loan_days, 14);
        assert_eq!(config.gamification.store_min_points, 150);
        assert_eq!(config.gamification.leech_interval_secs, 300);
        assert_eq!(config.gamification.leaderboard_size, 20);
        assert_eq!(config.security.allowed_origins, vec!["*".to_string()]);
    }

    #[test]
    fn test_from_file_overrides_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("leaf.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "[server]\nport = 8088\n\n[gamification]\nleech_interval_secs = 60").unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.server.port, 8088);
        assert_eq!(config.gamification.leech_interval_secs, 60);
        assert_eq!(config.server.host, "127.0.0.1");
    }

    #[test]
    fn test_missing_file_is_reported() {
        let result = Config::from_file(Path::new("/definitely/not/here.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_cli_overrides() {
        let args = CliArgs {
            port: Some(9191),
            log_level: Some("debug".to_string()),
            ..Default::default()
        };
        let config = Config::load_from_args(args).unwrap();
        assert_eq!(config.server.port, 9191);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_invalid_leech_range_rejected() {
        let mut config = Config::defaults().unwrap();
        config.gamification.leech_min_percent = 0.2;
        config.gamification.leech_max_percent = 0.1;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidGamification(_))
        ));
    }

    #[test]
    fn test_invalid_logging_rejected() {
        let mut config = Config::defaults().unwrap();
        config.logging.output = "file".to_string();
        config.logging.log_file = None;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidLogging(_))));
    }
}
