//! API server configuration

use serde::Deserialize;

/// Configuration for the campaign HTTP server
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Address to bind the API server
    ///
    /// Common values:
    /// - `[::]:3000` (IPv6 any address, port 3000)
    /// - `127.0.0.1:3000` (localhost only, port 3000)
    #[serde(default = "default_listen_address")]
    pub listen_address: String,
}

fn default_listen_address() -> String {
    "[::]:3000".to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_listen_address_defaults() {
        let config: ApiConfig = ron::from_str("()").unwrap();
        assert_eq!(config.listen_address, "[::]:3000");

        let config: ApiConfig = ron::from_str(r#"(listen_address: "127.0.0.1:8025")"#).unwrap();
        assert_eq!(config.listen_address, "127.0.0.1:8025");
    }
}
