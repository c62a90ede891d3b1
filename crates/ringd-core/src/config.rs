//! Application configuration management.
//!
//! Handles loading, saving, and validating ringd configuration:
//! - The ring to track (Bluetooth address and display name)
//! - Sampling cadence (per-metric poll interval, flush interval, timeouts)
//! - Server settings
//!
//! Configuration is layered: a TOML file, overridden by `RINGD_`-prefixed
//! environment variables (`RINGD_SAMPLING__POLL_INTERVAL_SECS=10`).

use std::path::{Path, PathBuf};
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, RingdError};
use crate::session::SessionConfig;

static MAC_ADDRESS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([0-9A-Fa-f]{2}:){5}[0-9A-Fa-f]{2}$").expect("MAC address regex")
});

/// Returns `true` when `address` is a well-formed Bluetooth MAC address.
#[must_use]
pub fn is_valid_address(address: &str) -> bool {
    MAC_ADDRESS.is_match(address)
}

/// Main application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RingdConfig {
    /// The ring to track.
    pub device: DeviceConfig,

    /// Sampling cadence and timeouts.
    pub sampling: SamplingConfig,

    /// Server settings.
    pub server: ServerConfig,
}

/// The ring to track.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Bluetooth MAC address of the ring, once one has been chosen.
    pub address: Option<String>,

    /// Display name of the ring (as broadcast during discovery).
    pub name: Option<String>,
}

/// Sampling cadence and timeouts.
///
/// The poll and flush intervals are independent knobs: polling is
/// per-metric and frequent, flushing is the multi-minute persistence
/// cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Seconds between polls of each tracked metric.
    pub poll_interval_secs: u64,

    /// Seconds between flushes of accumulated readings to storage.
    pub flush_interval_secs: u64,

    /// Deadline in seconds for a single metric request.
    pub request_timeout_secs: u64,

    /// Deadline in seconds for a connect attempt.
    pub connect_timeout_secs: u64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 30,
            flush_interval_secs: 300,
            request_timeout_secs: 5,
            connect_timeout_secs: 20,
        }
    }
}

impl SamplingConfig {
    /// Converts the configured cadence into session timing knobs.
    #[must_use]
    pub fn session(&self) -> SessionConfig {
        SessionConfig {
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            flush_interval: Duration::from_secs(self.flush_interval_secs),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
        }
    }
}

/// Server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// TCP port the REST API listens on.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 3000 }
    }
}

impl RingdConfig {
    /// Load configuration from the default path, falling back to defaults
    /// when no file exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be parsed or fails validation.
    pub fn load() -> Result<Self> {
        Self::load_or_default(&Self::config_path()?)
    }

    /// Load configuration from `path` layered with `RINGD_` environment
    /// variables, falling back to defaults when no file exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be parsed or fails validation.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.to_path_buf()).required(false))
            .add_source(config::Environment::with_prefix("RINGD").separator("__"))
            .build()?;
        let loaded: Self = settings.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Save configuration to the default path.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be written.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check invariants that cannot be expressed in the type system.
    ///
    /// # Errors
    ///
    /// Returns `ConfigValidationError` naming the offending field.
    pub fn validate(&self) -> Result<()> {
        if let Some(address) = &self.device.address {
            if !is_valid_address(address) {
                return Err(RingdError::ConfigValidationError(format!(
                    "device.address: '{address}' is not a MAC address"
                )));
            }
        }
        if self.sampling.poll_interval_secs == 0 {
            return Err(RingdError::ConfigValidationError(
                "sampling.poll_interval_secs must be greater than zero".into(),
            ));
        }
        if self.sampling.flush_interval_secs == 0 {
            return Err(RingdError::ConfigValidationError(
                "sampling.flush_interval_secs must be greater than zero".into(),
            ));
        }
        if self.sampling.request_timeout_secs == 0 {
            return Err(RingdError::ConfigValidationError(
                "sampling.request_timeout_secs must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Get the configuration file path.
    ///
    /// On Linux: `/etc/ringd/config.toml`. Elsewhere (development): the
    /// platform config directory for `ringd`.
    fn config_path() -> Result<PathBuf> {
        #[cfg(target_os = "linux")]
        {
            Ok(PathBuf::from("/etc/ringd/config.toml"))
        }
        #[cfg(not(target_os = "linux"))]
        {
            let dirs = directories::ProjectDirs::from("", "", "ringd").ok_or_else(|| {
                RingdError::ConfigParseError("Cannot determine config directory".into())
            })?;
            Ok(dirs.config_dir().join("config.toml"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RingdConfig::default();
        assert!(config.device.address.is_none());
        assert_eq!(config.sampling.poll_interval_secs, 30);
        assert_eq!(config.sampling.flush_interval_secs, 300);
        assert_eq!(config.server.port, 3000);
        config.validate().unwrap();
    }

    #[test]
    fn test_address_validation() {
        assert!(is_valid_address("AA:BB:CC:DD:EE:FF"));
        assert!(is_valid_address("aa:bb:cc:dd:ee:0f"));
        assert!(!is_valid_address("AA:BB:CC:DD:EE"));
        assert!(!is_valid_address("AA:BB:CC:DD:EE:GG"));
        assert!(!is_valid_address("AABBCCDDEEFF"));
        assert!(!is_valid_address(""));
    }

    #[test]
    fn test_validate_rejects_bad_address() {
        let config = RingdConfig {
            device: DeviceConfig {
                address: Some("not-a-mac".into()),
                name: None,
            },
            ..RingdConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, RingdError::ConfigValidationError(_)));
    }

    #[test]
    fn test_validate_rejects_zero_intervals() {
        let config = RingdConfig {
            sampling: SamplingConfig {
                poll_interval_secs: 0,
                ..SamplingConfig::default()
            },
            ..RingdConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = RingdConfig {
            device: DeviceConfig {
                address: Some("AA:BB:CC:DD:EE:FF".into()),
                name: Some("QRing R3".into()),
            },
            ..RingdConfig::default()
        };
        let toml = toml::to_string_pretty(&config).unwrap();
        let parsed: RingdConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.device.address.as_deref(), Some("AA:BB:CC:DD:EE:FF"));
        assert_eq!(parsed.device.name.as_deref(), Some("QRing R3"));
    }

    #[test]
    fn test_load_or_default_with_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = RingdConfig::load_or_default(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config.sampling.poll_interval_secs, 30);
    }

    #[test]
    fn test_load_or_default_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[device]\naddress = \"AA:BB:CC:DD:EE:FF\"\n\n[sampling]\npoll_interval_secs = 10\n",
        )
        .unwrap();

        let config = RingdConfig::load_or_default(&path).unwrap();
        assert_eq!(config.device.address.as_deref(), Some("AA:BB:CC:DD:EE:FF"));
        assert_eq!(config.sampling.poll_interval_secs, 10);
        // Unspecified fields keep their defaults.
        assert_eq!(config.sampling.flush_interval_secs, 300);
    }

    #[test]
    fn test_session_config_conversion() {
        let sampling = SamplingConfig::default();
        let session = sampling.session();
        assert_eq!(session.poll_interval, Duration::from_secs(30));
        assert_eq!(session.flush_interval, Duration::from_secs(300));
    }
}
