//! Daemon configuration.
//!
//! Mirrors the options recognized by the original `gixflow` reference
//! (pid file, log file, listen port, queue/worker sizing, forwarding,
//! ASN enrichment) plus two additions the expanded decoder and cache need:
//! `local_prefixes` and `template_cache_size`.

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{GixflowError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub pid_file: PathBuf,
    pub log_file: PathBuf,
    pub debug: bool,
    pub db_file: PathBuf,
    pub listen_port: u16,
    pub netflow_queue: usize,
    pub netflow_workers: usize,
    pub forwardto_enable: bool,
    pub forwardto_ip: Ipv4Addr,
    pub forwardto_port: u16,
    pub ip2asn: bool,
    pub local_prefixes: Vec<String>,
    pub template_cache_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pid_file: PathBuf::from("/opt/gixflow/gixflow.pid"),
            log_file: PathBuf::from("/opt/gixflow/log_gixflow"),
            debug: true,
            db_file: PathBuf::from("/opt/gixflow/gixflow.db"),
            listen_port: 9000,
            netflow_queue: 50_000,
            netflow_workers: 50,
            forwardto_enable: false,
            forwardto_ip: Ipv4Addr::new(127, 0, 0, 1),
            forwardto_port: 2100,
            ip2asn: false,
            local_prefixes: Vec::new(),
            template_cache_size: 10_000,
        }
    }
}

impl Config {
    /// Loads a config file, falling back to defaults for any key it omits.
    /// A missing file is not an error: the daemon runs on defaults alone,
    /// same as the reference's hardcoded `config` dict before any CLI
    /// overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(GixflowError::ConfigRead {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        toml::from_str(&text).map_err(|source| GixflowError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_values() {
        let config = Config::default();
        assert_eq!(config.listen_port, 9000);
        assert_eq!(config.netflow_queue, 50_000);
        assert_eq!(config.netflow_workers, 50);
        assert!(!config.forwardto_enable);
        assert!(!config.ip2asn);
        assert_eq!(config.forwardto_port, 2100);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = Config::load(Path::new("/nonexistent/gixflow.toml")).unwrap();
        assert_eq!(config.listen_port, Config::default().listen_port);
    }

    #[test]
    fn partial_file_overrides_only_named_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gixflow.toml");
        std::fs::write(&path, "listen_port = 2055\nip2asn = true\n").unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.listen_port, 2055);
        assert!(config.ip2asn);
        assert_eq!(config.netflow_workers, Config::default().netflow_workers);
    }
}
