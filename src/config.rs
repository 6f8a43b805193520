//! Bridge configuration: a small TOML file with every field optional.

use std::net::{SocketAddr, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

pub const DEFAULT_CONFIG_FILE: &str = "fcu-bridge.toml";

#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeConfig {
    pub xplane: XPlaneSection,
    pub engine: EngineSection,
    pub device: DeviceSection,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct XPlaneSection {
    /// Machine running X-Plane.
    pub host: String,
    /// X-Plane's UDP command port.
    pub port: u16,
    /// Local receive port; 0 picks an ephemeral one.
    pub local_port: u16,
    pub keepalive_secs: u64,
    pub staleness_secs: u64,
    pub poll_timeout_ms: u64,
}

impl Default for XPlaneSection {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 49000,
            local_port: 0,
            keepalive_secs: 10,
            staleness_secs: 3,
            poll_timeout_ms: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineSection {
    pub tick_ms: u64,
    pub debounce_ms: u64,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            tick_ms: 50,
            debounce_ms: 150,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeviceSection {
    /// Power-on panel backlight, overridden once the cockpit rheostat
    /// dataref arrives.
    pub backlight: u8,
    pub lcd_backlight: u8,
    pub read_timeout_ms: u64,
    pub reopen_backoff_secs: u64,
}

impl Default for DeviceSection {
    fn default() -> Self {
        Self {
            backlight: 80,
            lcd_backlight: 180,
            read_timeout_ms: 5,
            reopen_backoff_secs: 1,
        }
    }
}

impl BridgeConfig {
    /// Explicit path: must parse. No path: `fcu-bridge.toml` beside the
    /// process if present, otherwise compiled-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => {
                let p = Path::new(DEFAULT_CONFIG_FILE);
                if !p.exists() {
                    return Ok(Self::default());
                }
                p.to_path_buf()
            }
        };
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn remote_addr(&self) -> Result<SocketAddr> {
        let spec = format!("{}:{}", self.xplane.host, self.xplane.port);
        spec.to_socket_addrs()
            .with_context(|| format!("resolving simulator address {spec}"))?
            .next()
            .ok_or_else(|| anyhow!("simulator address {spec} resolved to nothing"))
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.engine.tick_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.engine.debounce_ms)
    }

    pub fn staleness(&self) -> Duration {
        Duration::from_secs(self.xplane.staleness_secs)
    }

    pub fn keepalive(&self) -> Duration {
        Duration::from_secs(self.xplane.keepalive_secs)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.xplane.poll_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.device.read_timeout_ms)
    }

    pub fn reopen_backoff(&self) -> Duration {
        Duration::from_secs(self.device.reopen_backoff_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_point_at_local_xplane() {
        let cfg = BridgeConfig::default();
        assert_eq!(cfg.xplane.host, "127.0.0.1");
        assert_eq!(cfg.xplane.port, 49000);
        assert_eq!(cfg.remote_addr().unwrap().port(), 49000);
        assert_eq!(cfg.tick(), Duration::from_millis(50));
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let cfg: BridgeConfig = toml::from_str(
            r#"
            [xplane]
            host = "192.168.1.20"
            staleness_secs = 5

            [device]
            backlight = 120
            "#,
        )
        .unwrap();
        assert_eq!(cfg.xplane.host, "192.168.1.20");
        assert_eq!(cfg.staleness(), Duration::from_secs(5));
        assert_eq!(cfg.xplane.port, 49000);
        assert_eq!(cfg.device.backlight, 120);
        assert_eq!(cfg.device.lcd_backlight, 180);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let parsed: std::result::Result<BridgeConfig, _> = toml::from_str(
            r#"
            [xplane]
            hostname = "oops"
            "#,
        );
        assert!(parsed.is_err());
    }

    #[test]
    fn load_reads_an_explicit_path() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "[engine]\ntick_ms = 25").unwrap();
        let cfg = BridgeConfig::load(Some(f.path())).unwrap();
        assert_eq!(cfg.tick(), Duration::from_millis(25));
    }

    #[test]
    fn load_fails_loudly_on_bad_toml() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "not toml at all [").unwrap();
        assert!(BridgeConfig::load(Some(f.path())).is_err());
    }
}
