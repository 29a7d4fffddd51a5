// src/config/server.rs
// Web server configuration (config_webserver.yaml)

use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use super::helpers::{get_bool, get_raw_str, get_u64};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub static_directory: String,
    pub enable_cors: bool,
    /// max-age for static file responses, in seconds.
    pub static_cache_seconds: u64,
    /// Interval between SSE keep-alive comment frames, in seconds.
    pub sse_keepalive_seconds: u64,
}

impl ServerConfig {
    pub fn from_yaml(data: &Value) -> Self {
        Self {
            host: get_raw_str(data, "host", "0.0.0.0"),
            port: get_u64(data, "port", 8000) as u16,
            static_directory: get_raw_str(data, "static_directory", "./static"),
            enable_cors: get_bool(data, "enable_cors", true),
            static_cache_seconds: get_u64(data, "static_cache_seconds", 3600),
            sse_keepalive_seconds: get_u64(data, "sse_keepalive_seconds", 30),
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from_yaml(&Value::Null)
    }
}
