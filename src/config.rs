use serde::Deserialize;

/// Process configuration loaded from environment variables
///
/// Per-widget settings live in [`crate::models::InstanceConfig`]; this struct
/// only covers what is shared by every instance in the process.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Base URL of the content API (providers and new releases)
    #[serde(default = "default_justwatch_api_url")]
    pub justwatch_api_url: String,

    /// Host prefixed to poster and provider icon paths
    #[serde(default = "default_image_base_url")]
    pub image_base_url: String,

    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Filter directive used when RUST_LOG is not set
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_justwatch_api_url() -> String {
    "https://apis.justwatch.com/content".to_string()
}

fn default_image_base_url() -> String {
    "https://images.justwatch.com".to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_log_level() -> String {
    "watchfeed=info,tower_http=info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            justwatch_api_url: default_justwatch_api_url(),
            image_base_url: default_image_base_url(),
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        envy::from_env::<Config>().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_environment() {
        let vars: Vec<(String, String)> = Vec::new();
        let config: Config = envy::from_iter(vars).unwrap();
        assert_eq!(config.justwatch_api_url, "https://apis.justwatch.com/content");
        assert_eq!(config.image_base_url, "https://images.justwatch.com");
        assert_eq!(config.bind_address(), "127.0.0.1:3000");
    }

    #[test]
    fn test_overrides() {
        let vars = vec![
            ("PORT".to_string(), "8080".to_string()),
            (
                "JUSTWATCH_API_URL".to_string(),
                "http://localhost:9000".to_string(),
            ),
        ];
        let config: Config = envy::from_iter(vars).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.justwatch_api_url, "http://localhost:9000");
    }
}
