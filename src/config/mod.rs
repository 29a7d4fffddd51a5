// src/config/mod.rs
// Central configuration for the nlweb server, loaded once at startup
// from a directory of YAML files plus prompts.xml / tools.xml.

pub mod embedding;
pub mod helpers;
pub mod llm;
pub mod nlweb;
pub mod retrieval;
pub mod server;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub use embedding::EmbeddingConfig;
pub use llm::LlmConfig;
pub use nlweb::NlwebConfig;
pub use retrieval::RetrievalConfig;
pub use server::ServerConfig;

/// Run mode. Testing mode re-raises LLM and prompt failures that
/// production degrades to defaults; development mode additionally allows
/// per-request provider overrides via query params.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    Development,
    Production,
    Testing,
}

impl FromStr for Mode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "development" => Ok(Mode::Development),
            "production" => Ok(Mode::Production),
            "testing" => Ok(Mode::Testing),
            other => Err(anyhow::anyhow!("unknown mode: {other}")),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Mode::Development => "development",
            Mode::Production => "production",
            Mode::Testing => "testing",
        };
        write!(f, "{name}")
    }
}

/// Main configuration structure - composes all domain configs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub mode: Mode,
    pub server: ServerConfig,
    pub llm: LlmConfig,
    pub retrieval: RetrievalConfig,
    pub embedding: EmbeddingConfig,
    pub nlweb: NlwebConfig,
    pub config_dir: PathBuf,
}

impl AppConfig {
    /// Load from a config directory. Missing files fall back to defaults;
    /// malformed files fail fast.
    pub fn load(config_dir: &Path) -> Result<Self> {
        dotenvy::dotenv().ok();

        let webserver = helpers::load_yaml(&config_dir.join("config_webserver.yaml"))?;
        let mode: Mode = helpers::get_raw_str(&webserver, "mode", "production").parse()?;

        Ok(Self {
            mode,
            server: ServerConfig::from_yaml(&webserver),
            llm: LlmConfig::from_yaml(&helpers::load_yaml(&config_dir.join("config_llm.yaml"))?),
            retrieval: RetrievalConfig::from_yaml(&helpers::load_yaml(
                &config_dir.join("config_retrieval.yaml"),
            )?),
            embedding: EmbeddingConfig::from_yaml(&helpers::load_yaml(
                &config_dir.join("config_embedding.yaml"),
            )?),
            nlweb: NlwebConfig::from_yaml(&helpers::load_yaml(
                &config_dir.join("config_nlweb.yaml"),
            )?),
            config_dir: config_dir.to_path_buf(),
        })
    }

    /// Config suitable for tests: mock LLM, in-memory retrieval and
    /// storage, testing-mode error propagation off by default so pipeline
    /// tests exercise the production degradation paths.
    pub fn for_tests() -> Self {
        Self {
            mode: Mode::Production,
            server: ServerConfig::default(),
            llm: LlmConfig::default(),
            retrieval: RetrievalConfig::default(),
            embedding: EmbeddingConfig::default(),
            nlweb: NlwebConfig::default(),
            config_dir: PathBuf::from("./config"),
        }
    }

    pub fn is_development_mode(&self) -> bool {
        self.mode == Mode::Development
    }

    pub fn is_production_mode(&self) -> bool {
        self.mode == Mode::Production
    }

    /// Whether LLM and prompt failures should propagate instead of
    /// degrading to defaults.
    pub fn should_raise_exceptions(&self) -> bool {
        self.mode == Mode::Testing
    }

    /// Validate config on startup.
    pub fn validate(&self) -> Result<()> {
        if self.llm.preferred().is_none() {
            return Err(anyhow::anyhow!(
                "preferred LLM endpoint '{}' is not configured",
                self.llm.preferred_endpoint
            ));
        }
        if self.retrieval.enabled_endpoints().next().is_none() {
            return Err(anyhow::anyhow!("no retrieval endpoints are enabled"));
        }
        Ok(())
    }

    pub fn prompts_xml_path(&self) -> PathBuf {
        self.config_dir.join("prompts.xml")
    }

    pub fn tools_xml_path(&self) -> PathBuf {
        self.config_dir.join("tools.xml")
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::for_tests()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let config = AppConfig::for_tests();
        config.validate().unwrap();
        assert!(!config.should_raise_exceptions());
    }

    #[test]
    fn missing_directory_loads_defaults() {
        let config = AppConfig::load(Path::new("/nonexistent/config/dir")).unwrap();
        assert_eq!(config.mode, Mode::Production);
        assert_eq!(config.llm.preferred_endpoint, "mock");
    }
}
