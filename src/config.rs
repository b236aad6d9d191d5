// src/config.rs
use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::info;
use serde::Deserialize;

use crate::battery;
use crate::error::ConfigError;

pub const DEFAULT_CONFIG_PATH: &str = "config.json";
pub const CONFIG_ENV: &str = "NFC_BRIDGE_CONFIG";

/// How much tag memory is read when a tag appears.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReadMode {
    /// stop once the NDEF TLV is covered
    #[default]
    Ndef,
    /// every page the capability container declares
    Raw,
}

/// How the NFC reader chip is attached.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum InterfaceKind {
    #[default]
    Pcsc,
    I2c,
    Spi,
    Uart,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub system: SystemConfig,
    pub nfc: NfcConfig,
    pub interfaces: InterfacesConfig,
    pub server: ServerConfig,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct SystemConfig {
    pub name: String,
    /// sysfs `voltage_now` file; battery reporting is off without it
    pub battery_path: Option<PathBuf>,
    pub battery_check_secs: u64,
}

impl Default for SystemConfig {
    fn default() -> Self {
        SystemConfig {
            name: "NFC Bridge".into(),
            battery_path: None,
            battery_check_secs: battery::CHECK_INTERVAL.as_secs(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct NfcConfig {
    pub interface: InterfaceKind,
    pub reader_name: Option<String>,
    pub reset_pin: Option<String>,
    pub req_pin: Option<String>,
    pub cs_pin: Option<String>,
    pub detect_timeout_ms: u64,
    pub read_mode: ReadMode,
}

impl Default for NfcConfig {
    fn default() -> Self {
        NfcConfig {
            interface: InterfaceKind::Pcsc,
            reader_name: None,
            reset_pin: None,
            req_pin: None,
            cs_pin: None,
            detect_timeout_ms: 1000,
            read_mode: ReadMode::Ndef,
        }
    }
}

impl NfcConfig {
    pub fn detect_timeout(&self) -> Duration {
        Duration::from_millis(self.detect_timeout_ms)
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct InterfacesConfig {
    pub i2c: Option<I2cSettings>,
    pub spi: Option<SpiSettings>,
    pub uart: Option<UartSettings>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct I2cSettings {
    pub enabled: bool,
    pub scl: String,
    pub sda: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct SpiSettings {
    pub enabled: bool,
    pub sck: String,
    pub mosi: String,
    pub miso: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct UartSettings {
    pub enabled: bool,
    pub tx: String,
    pub rx: String,
    pub baudrate: u32,
    #[serde(default)]
    pub timeout_ms: u64,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 3500,
        }
    }
}

impl ServerConfig {
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl Config {
    pub fn from_json(text: &str) -> Result<Config, ConfigError> {
        let config: Config = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        let text = fs::read_to_string(path)?;
        Config::from_json(&text)
    }

    /// Resolves the config path from argv / env. Only the implicit default
    /// path is allowed to be missing.
    pub fn load_from_env() -> Result<Config, ConfigError> {
        let explicit = std::env::args()
            .nth(1)
            .or_else(|| std::env::var(CONFIG_ENV).ok());

        match explicit {
            Some(path) => Config::load(Path::new(&path)),
            None => {
                let path = Path::new(DEFAULT_CONFIG_PATH);
                if path.exists() {
                    Config::load(path)
                } else {
                    info!("No {} found, using built-in defaults", DEFAULT_CONFIG_PATH);
                    Ok(Config::default())
                }
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.nfc.detect_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "nfc.detect_timeout_ms must be greater than zero".into(),
            ));
        }

        let enabled = match self.nfc.interface {
            InterfaceKind::Pcsc => true,
            InterfaceKind::I2c => self.interfaces.i2c.as_ref().is_some_and(|s| s.enabled),
            InterfaceKind::Spi => self.interfaces.spi.as_ref().is_some_and(|s| s.enabled),
            InterfaceKind::Uart => self.interfaces.uart.as_ref().is_some_and(|s| s.enabled),
        };
        if !enabled {
            return Err(ConfigError::Invalid(format!(
                "nfc.interface is {:?} but that bus is not enabled in interfaces",
                self.nfc.interface
            )));
        }

        if self.nfc.interface == InterfaceKind::Spi && self.nfc.cs_pin.is_none() {
            return Err(ConfigError::Invalid(
                "No CS pin defined, SPI reader needs nfc.cs_pin".into(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_gives_defaults() {
        let config = Config::from_json("{}").unwrap();
        assert_eq!(config.nfc.interface, InterfaceKind::Pcsc);
        assert_eq!(config.nfc.detect_timeout(), Duration::from_secs(1));
        assert_eq!(config.server.addr().to_string(), "127.0.0.1:3500");
        assert!(config.system.battery_path.is_none());
        assert_eq!(config.nfc.read_mode, ReadMode::Ndef);
    }

    #[test]
    fn raw_read_mode() {
        let config = Config::from_json(r#"{ "nfc": { "read_mode": "raw" } }"#).unwrap();
        assert_eq!(config.nfc.read_mode, ReadMode::Raw);
    }

    #[test]
    fn spi_without_chip_select_is_rejected() {
        let json = r#"{
            "nfc": { "interface": "spi" },
            "interfaces": {
                "spi": { "enabled": true, "sck": "SCK", "mosi": "MOSI", "miso": "MISO" }
            }
        }"#;
        let err = Config::from_json(json).unwrap_err();
        assert!(err.to_string().contains("CS pin"));
    }

    #[test]
    fn spi_with_chip_select_is_accepted() {
        let json = r#"{
            "nfc": { "interface": "spi", "cs_pin": "D5" },
            "interfaces": {
                "spi": { "enabled": true, "sck": "SCK", "mosi": "MOSI", "miso": "MISO" }
            }
        }"#;
        let config = Config::from_json(json).unwrap();
        assert_eq!(config.nfc.cs_pin.as_deref(), Some("D5"));
    }

    #[test]
    fn selected_bus_must_be_enabled() {
        let json = r#"{
            "nfc": { "interface": "i2c" },
            "interfaces": { "i2c": { "enabled": false, "scl": "SCL", "sda": "SDA" } }
        }"#;
        assert!(matches!(
            Config::from_json(json),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn zero_detect_timeout_is_rejected() {
        let json = r#"{ "nfc": { "detect_timeout_ms": 0 } }"#;
        assert!(Config::from_json(json).is_err());
    }

    #[test]
    fn bad_json_is_reported() {
        assert!(matches!(
            Config::from_json("{ nope"),
            Err(ConfigError::Json(_))
        ));
    }
}
