//! Layered configuration for Scribe.
//!
//! Reads configuration from multiple sources with precedence:
//! CLI flags > env vars > `config.toml` > defaults

use scribe_types::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The default Anthropic API base URL.
pub const DEFAULT_API_BASE_URL: &str = "https://api.anthropic.com";

/// The default model to use.
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5-20250929";

/// The default max tokens for a response.
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// The default GitHub REST API base URL.
pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";

/// Application name sessions are stored under.
pub const APP_NAME: &str = "document_app";

pub const DEFAULT_USER_ID: &str = "doc_user_1";
pub const DEFAULT_SESSION_ID: &str = "doc_chat_session";

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 5000;

/// Resolved configuration for a Scribe process.
#[derive(Debug, Clone)]
pub struct ScribeConfig {
    /// Only model-backed commands need this; see [`ScribeConfig::require_api_key`].
    pub api_key: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    pub api_base_url: String,
    pub github: GithubConfig,
    pub server: ServerConfig,
    pub config_dir: PathBuf,
    /// Where the two JSON databases live.
    pub data_dir: PathBuf,
    /// Base for `resumes/`, `user_upload/`, `static/` and relative file references.
    pub project_root: PathBuf,
}

#[derive(Debug, Clone)]
pub struct GithubConfig {
    pub username: Option<String>,
    pub token: Option<String>,
    pub base_url: String,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Settings that can be read from a TOML config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsFile {
    #[serde(default)]
    pub api: ApiSettings,
    #[serde(default)]
    pub github: GithubSettings,
    #[serde(default)]
    pub paths: PathSettings,
    #[serde(default)]
    pub server: ServerSettings,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiSettings {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GithubSettings {
    pub username: Option<String>,
    pub token: Option<String>,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathSettings {
    pub data_dir: Option<PathBuf>,
    pub project_root: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// CLI overrides that take highest precedence.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub host: Option<String>,
    pub port: Option<u16>,
}

impl ScribeConfig {
    /// Load configuration from CLI flags, the process environment, and
    /// `<config_dir>/config.toml`.
    pub fn load(overrides: CliOverrides) -> Result<Self, ConfigError> {
        let config_dir = config_dir();
        let settings = load_settings_file(&config_dir.join("config.toml"));
        let env: HashMap<String, String> = std::env::vars().collect();
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::resolve(overrides, settings, &env, config_dir, cwd)
    }

    /// Apply precedence rules over already-read sources.
    pub fn resolve(
        overrides: CliOverrides,
        settings: SettingsFile,
        env: &HashMap<String, String>,
        config_dir: PathBuf,
        cwd: PathBuf,
    ) -> Result<Self, ConfigError> {
        let var = |key: &str| env.get(key).filter(|v| !v.trim().is_empty()).cloned();

        let api_key = overrides
            .api_key
            .or_else(|| var("ANTHROPIC_API_KEY"))
            .or(settings.api.api_key);

        let model = overrides
            .model
            .or_else(|| var("SCRIBE_MODEL"))
            .or(settings.api.model)
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let max_tokens = overrides
            .max_tokens
            .or(settings.api.max_tokens)
            .unwrap_or(DEFAULT_MAX_TOKENS);

        let api_base_url = var("ANTHROPIC_API_BASE_URL")
            .or(settings.api.base_url)
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());

        let github = GithubConfig {
            username: var("GITHUB_USERNAME").or(settings.github.username),
            token: var("GITHUB_TOKEN").or(settings.github.token),
            base_url: settings
                .github
                .base_url
                .unwrap_or_else(|| DEFAULT_GITHUB_API_URL.to_string()),
        };

        let env_port = match var("SCRIBE_PORT") {
            Some(raw) => Some(raw.parse::<u16>().map_err(|e| ConfigError::InvalidValue {
                key: "SCRIBE_PORT".into(),
                message: e.to_string(),
            })?),
            None => None,
        };
        let server = ServerConfig {
            host: overrides
                .host
                .or_else(|| var("SCRIBE_HOST"))
                .or(settings.server.host)
                .unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: overrides
                .port
                .or(env_port)
                .or(settings.server.port)
                .unwrap_or(DEFAULT_PORT),
        };

        let data_dir = var("SCRIBE_DATA_DIR")
            .map(PathBuf::from)
            .or(settings.paths.data_dir)
            .unwrap_or_else(|| config_dir.clone());

        let project_root = var("SCRIBE_ROOT")
            .map(PathBuf::from)
            .or(settings.paths.project_root)
            .unwrap_or(cwd);

        Ok(ScribeConfig {
            api_key,
            model,
            max_tokens,
            api_base_url,
            github,
            server,
            config_dir,
            data_dir,
            project_root,
        })
    }

    /// The API key, or an error naming where to set it.
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| ConfigError::MissingKey {
                key: "api_key (set ANTHROPIC_API_KEY or add to ~/.scribe/config.toml)".into(),
            })
    }

    pub fn chat_db_path(&self) -> PathBuf {
        self.data_dir.join("chat_history_db.json")
    }

    pub fn knowledge_db_path(&self) -> PathBuf {
        self.data_dir.join("knowledge_db.json")
    }

    pub fn resumes_dir(&self) -> PathBuf {
        self.project_root.join("resumes")
    }

    pub fn upload_dir(&self) -> PathBuf {
        self.project_root.join("user_upload")
    }

    pub fn static_dir(&self) -> PathBuf {
        self.project_root.join("static")
    }
}

/// Get the Scribe config directory path (~/.scribe/).
pub fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("SCRIBE_CONFIG_DIR") {
        return PathBuf::from(dir);
    }
    dirs_next::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".scribe")
}

/// Load and parse a TOML settings file, returning defaults on any error.
fn load_settings_file(path: &Path) -> SettingsFile {
    match std::fs::read_to_string(path) {
        Ok(content) => toml::from_str(&content).unwrap_or_else(|e| {
            tracing::warn!("Failed to parse {}: {}", path.display(), e);
            SettingsFile::default()
        }),
        Err(_) => SettingsFile::default(),
    }
}
