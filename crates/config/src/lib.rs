use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use core_types::{SessionConfig, UiLanguage};
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const CURRENT_SCHEMA_VERSION: u32 = 2;
pub const DEFAULT_MODEL_ID: &str = "us.amazon.nova-lite-v1:0";
pub const DEFAULT_PREFIX: &str = "documents/";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentConfig {
    #[serde(default = "default_model_id")]
    pub model_id: String,
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_retrieval_results")]
    pub retrieval_results: u32,
    #[serde(default = "default_min_score")]
    pub min_score: f64,
    #[serde(default = "default_web_fetch_limit")]
    pub web_fetch_limit_bytes: usize,
}

fn default_model_id() -> String {
    DEFAULT_MODEL_ID.to_string()
}

const fn default_max_rounds() -> usize {
    6
}

const fn default_max_tokens() -> u32 {
    2048
}

const fn default_retrieval_results() -> u32 {
    5
}

const fn default_min_score() -> f64 {
    0.4
}

const fn default_web_fetch_limit() -> usize {
    64 * 1024
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model_id: default_model_id(),
            max_rounds: default_max_rounds(),
            max_tokens: default_max_tokens(),
            retrieval_results: default_retrieval_results(),
            min_score: default_min_score(),
            web_fetch_limit_bytes: default_web_fetch_limit(),
        }
    }
}

/// Overrides for S3-compatible stores or local mock endpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EndpointOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s3: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bedrock_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bedrock_agent_runtime: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bedrock_runtime: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    pub schema_version: u32,
    pub language: UiLanguage,
    #[serde(default = "default_prefix")]
    pub default_prefix: String,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub endpoints: EndpointOverrides,
}

fn default_prefix() -> String {
    DEFAULT_PREFIX.to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            language: UiLanguage::KoKr,
            default_prefix: default_prefix(),
            agent: AgentConfig::default(),
            endpoints: EndpointOverrides::default(),
        }
    }
}

impl AppConfig {
    /// Seeds the per-session values from the process environment.
    pub fn seed_session_from_env(&self) -> SessionConfig {
        self.seed_session(|key| std::env::var(key).ok())
    }

    pub fn seed_session(&self, lookup: impl Fn(&str) -> Option<String>) -> SessionConfig {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        SessionConfig {
            region: non_empty("AWS_REGION").or_else(|| non_empty("AWS_DEFAULT_REGION")),
            knowledge_base_id: non_empty("KNOWLEDGE_BASE_ID").unwrap_or_default(),
            bucket: non_empty("LECTERN_BUCKET").unwrap_or_default(),
            prefix: self.default_prefix.clone(),
        }
    }
}

pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn from_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            path: dir.into().join("config.json"),
        }
    }

    pub fn from_default_location() -> Result<Self> {
        let mut dir = dirs::config_dir().context("failed to resolve config_dir")?;
        dir.push("lectern");
        Ok(Self::from_dir(dir))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load_or_init(&self) -> Result<AppConfig> {
        if !self.path.exists() {
            let config = AppConfig::default();
            self.save(&config)?;
            return Ok(config);
        }

        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        let mut config: AppConfig =
            serde_json::from_str(&raw).context("failed to parse app config json")?;
        self.migrate(&mut config);
        self.save(&config)?;
        Ok(config)
    }

    pub fn save(&self, config: &AppConfig) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let text = serde_json::to_string_pretty(config).context("failed to serialize config")?;
        fs::write(&self.path, text)
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        Ok(())
    }

    fn migrate(&self, config: &mut AppConfig) {
        if config.schema_version >= CURRENT_SCHEMA_VERSION {
            return;
        }

        warn!(
            from = config.schema_version,
            to = CURRENT_SCHEMA_VERSION,
            "migrating app config schema"
        );

        // v1 stored the prefix without a trailing slash and had no round limit.
        if !config.default_prefix.ends_with('/') {
            config.default_prefix.push('/');
        }
        config.agent.max_rounds = config.agent.max_rounds.max(1);
        config.schema_version = CURRENT_SCHEMA_VERSION;
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use tempfile::tempdir;

    use super::*;

    #[test]
    fn creates_default_config_when_missing() {
        let dir = tempdir().expect("tempdir");
        let store = ConfigStore::from_dir(dir.path());
        let config = store.load_or_init().expect("load default");
        assert_eq!(config.schema_version, CURRENT_SCHEMA_VERSION);
        assert_eq!(config.agent.model_id, DEFAULT_MODEL_ID);
        assert!(store.path().exists());
    }

    #[test]
    fn migrates_v1_config_and_fills_defaults() {
        let dir = tempdir().expect("tempdir");
        let store = ConfigStore::from_dir(dir.path());
        fs::write(
            store.path(),
            r#"{"schema_version":1,"language":"en_us","default_prefix":"papers"}"#,
        )
        .expect("write v1 config");

        let config = store.load_or_init().expect("load v1");
        assert_eq!(config.schema_version, CURRENT_SCHEMA_VERSION);
        assert_eq!(config.language, UiLanguage::EnUs);
        assert_eq!(config.default_prefix, "papers/");
        assert_eq!(config.agent, AgentConfig::default());
    }

    #[test]
    fn seeds_session_from_environment_lookup() {
        let env = HashMap::from([
            ("AWS_REGION", ""),
            ("AWS_DEFAULT_REGION", "ap-northeast-2"),
            ("KNOWLEDGE_BASE_ID", "KB12345"),
        ]);
        let config = AppConfig::default();
        let session = config.seed_session(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(session.region.as_deref(), Some("ap-northeast-2"));
        assert_eq!(session.knowledge_base_id, "KB12345");
        assert_eq!(session.bucket, "");
        assert_eq!(session.prefix, DEFAULT_PREFIX);
    }
}
