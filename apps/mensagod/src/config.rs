//! Server configuration, loaded from a TOML file with defaults for
//! everything except the org domain.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Who may create new workspaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationMode {
    /// Only accounts preregistered by the admin.
    Prereg,
    /// Anyone who can reach the server.
    Open,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the listener binds to.
    pub listen_address: String,
    pub port: u16,
    /// The organization's domain. Every hosted workspace lives under it.
    pub domain: String,
    /// Human-readable org name, published in the org keycard.
    pub org_name: String,
    /// Sandbox root for workspace blob storage.
    pub top_dir: PathBuf,
    pub db_path: PathBuf,
    /// Advisory cap on concurrent delivery workers.
    pub delivery_workers: usize,
    pub registration: RegistrationMode,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: "127.0.0.1".to_string(),
            port: 2001,
            domain: "example.com".to_string(),
            org_name: "Mensago".to_string(),
            top_dir: PathBuf::from("/var/mensagod"),
            db_path: PathBuf::from("/var/mensagod/mensago.db"),
            delivery_workers: 4,
            registration: RegistrationMode::Prereg,
        }
    }
}

impl ServerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.listen_address, self.port)
            .parse()
            .context("bad listen address")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_fills_defaults() {
        let cfg: ServerConfig = toml::from_str(r#"domain = "example.com""#).unwrap();
        assert_eq!(cfg.port, 2001);
        assert_eq!(cfg.registration, RegistrationMode::Prereg);
        assert_eq!(cfg.delivery_workers, 4);
    }

    #[test]
    fn full_config_roundtrip() {
        let cfg = ServerConfig {
            domain: "mensago.example".into(),
            port: 2999,
            registration: RegistrationMode::Open,
            ..Default::default()
        };
        let text = toml::to_string(&cfg).unwrap();
        let parsed: ServerConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.domain, "mensago.example");
        assert_eq!(parsed.port, 2999);
        assert_eq!(parsed.registration, RegistrationMode::Open);
    }
}
