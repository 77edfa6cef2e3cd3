use std::env;
use std::path::PathBuf;

use dotenvy::dotenv;

use crate::constants::DEFAULT_API_BASE;

pub struct Config {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    /// Management API base pre-filled on the login form
    pub default_api_base: String,
    /// Timeout applied to every management API call
    pub request_timeout_secs: u64,
    pub session_ttl_secs: u64,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the config from an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let host = lookup("CPA_DASHBOARD_HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let port = lookup("CPA_DASHBOARD_PORT")
            .and_then(|p| p.parse().ok())
            .unwrap_or(8318);

        let data_dir = lookup("CPA_DASHBOARD_DATA_DIR")
            .filter(|d| !d.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                dirs::data_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("cpa-dashboard")
            });

        let default_api_base = lookup("CPA_DASHBOARD_API_BASE")
            .map(|b| b.trim().trim_end_matches('/').to_string())
            .filter(|b| !b.is_empty())
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());

        let request_timeout_secs = lookup("CPA_DASHBOARD_TIMEOUT_SECS")
            .and_then(|v| v.parse().ok())
            .filter(|v| *v > 0)
            .unwrap_or(30);

        let session_ttl_secs = lookup("CPA_DASHBOARD_SESSION_TTL_SECS")
            .and_then(|v| v.parse().ok())
            .filter(|v| *v > 0)
            .unwrap_or(86400);

        Self {
            host,
            port,
            data_dir,
            default_api_base,
            request_timeout_secs,
            session_ttl_secs,
        }
    }

    pub fn sessions_path(&self) -> PathBuf {
        self.data_dir.join("sessions.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(|_| None);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8318);
        assert_eq!(config.default_api_base, DEFAULT_API_BASE);
        assert_eq!(config.request_timeout_secs, 30);
        assert_eq!(config.session_ttl_secs, 86400);
        assert!(config.sessions_path().ends_with("cpa-dashboard/sessions.json"));
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("CPA_DASHBOARD_HOST", "0.0.0.0"),
            ("CPA_DASHBOARD_PORT", "9000"),
            ("CPA_DASHBOARD_API_BASE", "http://proxy:8317/"),
            ("CPA_DASHBOARD_DATA_DIR", "/tmp/dash"),
            ("CPA_DASHBOARD_TIMEOUT_SECS", "0"),
        ]));
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 9000);
        assert_eq!(config.default_api_base, "http://proxy:8317");
        assert_eq!(config.sessions_path(), PathBuf::from("/tmp/dash/sessions.json"));
        // Zero is not a usable timeout
        assert_eq!(config.request_timeout_secs, 30);
    }

    #[test]
    fn test_invalid_port_falls_back() {
        let config = Config::from_lookup(lookup_from(&[("CPA_DASHBOARD_PORT", "http")]));
        assert_eq!(config.port, 8318);
    }
}
