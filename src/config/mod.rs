use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_yml;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use utoipa::ToSchema;

const CONFIG_PATHS: [&str; 2] = ["config/energomera.yaml", "energomera.yaml"];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Unable to read config file {0}: {1}")]
    Read(String, #[source] std::io::Error),
    #[error("Unable to parse config file {0}: {1}")]
    Parse(String, #[source] serde_yml::Error),
    #[error("No serial port configured, set serial.port or SERIAL_PORT")]
    MissingSerialPort,
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}

fn httpd_port_default() -> u16 { return 8240 }

#[derive(Deserialize, Serialize, Clone, Debug, ToSchema)]
pub struct HttpdConfig {
    #[serde(default="httpd_port_default")]
    pub port: u16
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, ToSchema)]
pub struct SerialConfig {
    /// Device path, e.g. /dev/ttyUSB0
    pub port: Option<String>,
}

fn meter_password_default() -> String { return "777777".to_string() }
fn meter_poll_interval_default() -> u64 { return 10 }
fn meter_max_frame_len_default() -> usize { return 512 }

#[derive(Deserialize, Serialize, Clone, Debug, ToSchema)]
pub struct MeterConfig {
    #[serde(default="meter_password_default")]
    pub password: String,
    /// Seconds to sleep between two polls
    #[serde(default="meter_poll_interval_default")]
    pub poll_interval: u64,
    /// Upper bound for every variable length read
    #[serde(default="meter_max_frame_len_default")]
    pub max_frame_len: usize,
}

impl MeterConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval)
    }
}

fn httpd_default() -> HttpdConfig { return HttpdConfig { port: httpd_port_default() } }
fn meter_default() -> MeterConfig {
    return MeterConfig {
        password: meter_password_default(),
        poll_interval: meter_poll_interval_default(),
        max_frame_len: meter_max_frame_len_default(),
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, ToSchema)]
pub struct Config {
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default="meter_default")]
    pub meter: MeterConfig,
    #[serde(default="httpd_default")]
    pub httpd: HttpdConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config { serial: SerialConfig::default(), meter: meter_default(), httpd: httpd_default() }
    }
}

impl Config {
    /// Loads `E2P_CONFIG`, `config/energomera.yaml` or `energomera.yaml`, the first one found,
    /// then applies `SERIAL_PORT` and `HTTP_PORT` from the environment
    pub fn load() -> Result<Self, ConfigError> {
        let explicit = std::env::var("E2P_CONFIG").ok().map(PathBuf::from);
        let path = explicit.or_else(|| CONFIG_PATHS.iter().map(PathBuf::from).find(|p| p.exists()));

        let mut config = match path {
            Some(path) => Self::load_from_path(&path)?,
            None => {
                info!("No config file found, using defaults and environment");
                Config::default()
            }
        };

        config.apply_overrides(std::env::var("SERIAL_PORT").ok(), std::env::var("HTTP_PORT").ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::Read(path.display().to_string(), e))?;
        let config: Config = serde_yml::from_str(&contents).map_err(|e| ConfigError::Parse(path.display().to_string(), e))?;
        info!("Config loaded from {}", path.display());
        Ok(config)
    }

    pub fn apply_overrides(&mut self, serial_port: Option<String>, http_port: Option<String>) -> Result<(), ConfigError> {
        if let Some(port) = serial_port {
            debug!("Serial port {port} taken from environment");
            self.serial.port = Some(port);
        }

        if let Some(port) = http_port {
            self.httpd.port = port.trim().parse().map_err(|_| ConfigError::InvalidValue("HTTP_PORT", port.clone()))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match &self.serial.port {
            Some(p) if !p.trim().is_empty() => {}
            _ => return Err(ConfigError::MissingSerialPort),
        }

        if self.meter.poll_interval == 0 {
            return Err(ConfigError::InvalidValue("meter.poll_interval", "0".to_string()));
        }

        if self.meter.max_frame_len == 0 {
            return Err(ConfigError::InvalidValue("meter.max_frame_len", "0".to_string()));
        }
        Ok(())
    }

    pub fn serial_port(&self) -> Result<String, ConfigError> {
        self.serial.port.clone().ok_or(ConfigError::MissingSerialPort)
    }

    /// Copy that is safe to hand out over the API
    pub fn redacted(&self) -> Config {
        let mut copy = self.clone();
        copy.meter.password = "***".to_string();
        copy
    }
}
