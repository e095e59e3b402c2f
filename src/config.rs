use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::logging::LogLevel;

/// Admin id shipped in the defaults; anyone who knows it may reset the pool.
pub const DEFAULT_ADMIN_ID: &str = "0000000000000000";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub pool_size: u32,
    pub pool_file: Option<PathBuf>,
    pub admin_id: String,
    pub log_level: LogLevel,
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub timeout: u64,
    pub retry_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub max_claim_attempts: u32,
    pub identity_file: PathBuf,
    pub log_level: LogLevel,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            pool_size: 150,
            pool_file: None,
            admin_id: DEFAULT_ADMIN_ID.to_string(),
            log_level: LogLevel::Info,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            timeout: 30,
            retry_attempts: 3,
            retry_base_delay_ms: 300,
            max_claim_attempts: 5,
            identity_file: PathBuf::from("data/device.conf"),
            log_level: LogLevel::Info,
        }
    }
}

impl ClientConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let content = fs::read_to_string(path)?;
        let config_map = parse_config(&content)?;
        Ok(Self::from_map(&config_map))
    }

    fn from_map(config_map: &HashMap<String, String>) -> Self {
        let defaults = Self::default();

        let host = config_map.get("host").cloned().unwrap_or(defaults.host);

        let port = config_map.get("port")
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(defaults.port);

        let timeout = config_map.get("timeout")
            .and_then(|t| t.parse::<u64>().ok())
            .unwrap_or(defaults.timeout);

        let retry_attempts = config_map.get("retry_attempts")
            .and_then(|r| r.parse::<u32>().ok())
            .unwrap_or(defaults.retry_attempts);

        let retry_base_delay_ms = config_map.get("retry_base_delay_ms")
            .and_then(|r| r.parse::<u64>().ok())
            .unwrap_or(defaults.retry_base_delay_ms);

        let max_claim_attempts = config_map.get("max_claim_attempts")
            .and_then(|r| r.parse::<u32>().ok())
            .filter(|&n| n > 0)
            .unwrap_or(defaults.max_claim_attempts);

        let identity_file = config_map.get("identity_file")
            .map(PathBuf::from)
            .unwrap_or(defaults.identity_file);

        let log_level = config_map.get("log_level")
            .map(|l| LogLevel::parse(l))
            .unwrap_or(defaults.log_level);

        ClientConfig {
            host,
            port,
            timeout,
            retry_attempts,
            retry_base_delay_ms,
            max_claim_attempts,
            identity_file,
            log_level,
        }
    }

    pub fn load_or_default() -> Self {
        let config_path = "conf/client.conf";

        match Self::from_file(config_path) {
            Ok(config) => {
                println!("📄 Loaded client configuration from {}", config_path);
                config
            }
            Err(e) => {
                println!("⚠️  Could not load client config from {}: {}. Using defaults.", config_path, e);
                Self::default()
            }
        }
    }

    pub fn server_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}

impl ServerConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let content = fs::read_to_string(path)?;
        let config_map = parse_config(&content)?;
        Ok(Self::from_map(&config_map))
    }

    fn from_map(config_map: &HashMap<String, String>) -> Self {
        let defaults = Self::default();

        let host = config_map.get("host").cloned().unwrap_or(defaults.host);

        let port = config_map.get("port")
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(defaults.port);

        let pool_size = config_map.get("pool_size")
            .and_then(|p| p.parse::<u32>().ok())
            .unwrap_or(defaults.pool_size);

        // An empty value disables the pool file
        let pool_file = match config_map.get("pool_file") {
            Some(path) if !path.is_empty() => Some(PathBuf::from(path)),
            Some(_) => None,
            None => defaults.pool_file,
        };

        let admin_id = config_map.get("admin_id").cloned().unwrap_or(defaults.admin_id);

        let log_level = config_map.get("log_level")
            .map(|l| LogLevel::parse(l))
            .unwrap_or(defaults.log_level);

        ServerConfig { host, port, pool_size, pool_file, admin_id, log_level }
    }

    /// Warning to print at startup when the pool reset is guarded by the default admin id.
    pub fn admin_id_warning(&self) -> Option<String> {
        (self.admin_id == DEFAULT_ADMIN_ID).then(|| {
            format!("admin_id is the default {DEFAULT_ADMIN_ID}: set admin_id in conf/server.conf to protect POST /reset")
        })
    }

    pub fn load_or_default() -> Self {
        let config_path = "conf/server.conf";

        match Self::from_file(config_path) {
            Ok(config) => {
                println!("📄 Loaded configuration from {}", config_path);
                config
            }
            Err(e) => {
                println!("⚠️  Could not load config from {}: {}. Using defaults.", config_path, e);
                Self::default()
            }
        }
    }
}

pub(crate) fn parse_config(content: &str) -> Result<HashMap<String, String>, Box<dyn std::error::Error>> {
    let mut config = HashMap::new();

    for line in content.lines() {
        let line = line.trim();

        // Skip empty lines and comments
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        // Parse key = value pairs
        if let Some((key, value)) = line.split_once('=') {
            let key = key.trim().to_string();
            let value = value.trim().to_string();
            config.insert(key, value);
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let content = r#"
            # card pool server
            host = 192.168.1.100
            port = 8080
            # Another comment
            pool_size = 90
        "#;

        let config = parse_config(content).unwrap();
        assert_eq!(config.get("host"), Some(&"192.168.1.100".to_string()));
        assert_eq!(config.get("port"), Some(&"8080".to_string()));
        assert_eq!(config.get("pool_size"), Some(&"90".to_string()));
    }

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 3000);
        assert_eq!(config.pool_size, 150);
        assert!(config.pool_file.is_none());
    }

    #[test]
    fn test_server_config_from_map() {
        let map = parse_config("pool_size = 12\npool_file = data/pool.json\nadmin_id = boss\nlog_level = debug").unwrap();
        let config = ServerConfig::from_map(&map);
        assert_eq!(config.pool_size, 12);
        assert_eq!(config.pool_file, Some(PathBuf::from("data/pool.json")));
        assert_eq!(config.admin_id, "boss");
        assert_eq!(config.log_level, LogLevel::Debug);
        assert_eq!(config.port, 3000);
        assert_eq!(config.admin_id_warning(), None);
    }

    #[test]
    fn test_default_admin_id_is_flagged() {
        let config = ServerConfig::default();
        assert_eq!(config.admin_id, DEFAULT_ADMIN_ID);
        assert!(config.admin_id_warning().unwrap().contains("POST /reset"));
    }

    #[test]
    fn test_client_config_default() {
        let config = ClientConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 3000);
        assert_eq!(config.timeout, 30);
        assert_eq!(config.retry_attempts, 3);
        assert_eq!(config.retry_base_delay(), Duration::from_millis(300));
        assert_eq!(config.max_claim_attempts, 5);
    }

    #[test]
    fn test_client_config_rejects_zero_claim_attempts() {
        let map = parse_config("max_claim_attempts = 0\nport = notaport").unwrap();
        let config = ClientConfig::from_map(&map);
        assert_eq!(config.max_claim_attempts, 5);
        assert_eq!(config.port, 3000);
    }

    #[test]
    fn test_client_config_server_url() {
        let config = ClientConfig {
            host: "192.168.1.100".to_string(),
            port: 8080,
            ..ClientConfig::default()
        };
        assert_eq!(config.server_url(), "http://192.168.1.100:8080");
    }
}
