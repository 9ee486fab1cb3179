use serde::Deserialize;
use serde_json::{Map, Value};
use std::{collections::HashMap, fs::File, path::Path};

use crate::{error::ConfigError, utils};

/// Environment variable holding the path of the JSON config file.
pub const CONFIG_PATH_VAR: &str = "CHATTER_CONFIG_PATH";

/// Where and how to reach the chat completion API.
///
/// `headers` values may reference environment variables (`${OPENAI_API_KEY}`),
/// `params` become query parameters, and `json` holds extra body fields added
/// to every request that doesn't set them itself.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub base_url: String,
    #[serde(deserialize_with = "utils::deserialize_with_envsubst")]
    pub headers: HashMap<String, String>,
    pub params: HashMap<String, String>,
    pub json: Map<String, Value>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: utils::default_base_url(),
            headers: HashMap::new(),
            params: HashMap::new(),
            json: Map::new(),
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        Ok(serde_json::from_reader(file)?)
    }

    /// Loads the file named by `CHATTER_CONFIG_PATH`, honoring `.env`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let path = dotenvy::var(CONFIG_PATH_VAR)?;
        Self::from_path(path)
    }
}

#[cfg(test)]
mod tests {
    use super::ClientConfig;
    use serde_json::json;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: ClientConfig = serde_json::from_value(json!({
            "headers": {"X-Team": "chat"},
            "json": {"temperature": 0.2}
        }))
        .unwrap();
        assert_eq!(config.base_url, "https://api.openai.com/v1");
        assert_eq!(config.headers["X-Team"], "chat");
        assert!(config.params.is_empty());
        assert_eq!(config.json["temperature"], json!(0.2));
    }

    #[test]
    fn loads_from_file() {
        let path = std::env::temp_dir().join(format!("chatter-config-{}.json", std::process::id()));
        std::fs::write(
            &path,
            r#"{"base_url": "http://127.0.0.1:8080/v1", "params": {"api-version": "1"}}"#,
        )
        .unwrap();
        let config = ClientConfig::from_path(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(config.base_url, "http://127.0.0.1:8080/v1");
        assert_eq!(config.params["api-version"], "1");
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(ClientConfig::from_path("/definitely/not/here.json").is_err());
    }
}
