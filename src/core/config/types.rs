use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Deployment profile. Selects the default log level and, for `Testing`,
/// isolates the persisted index in its own subdirectory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Testing,
    Production,
}

impl Environment {
    pub fn default_log_level(self) -> &'static str {
        match self {
            Environment::Development | Environment::Testing => "debug",
            Environment::Production => "info",
        }
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "testing" | "test" => Ok(Environment::Testing),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(format!("unknown environment '{}'", other)),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Environment::Development => "development",
            Environment::Testing => "testing",
            Environment::Production => "production",
        };
        f.write_str(name)
    }
}

/// How policy documents are cut into chunks before embedding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitterKind {
    /// Sliding character window that prefers sentence boundaries.
    Fixed,
    /// Heading-aware splitting that keeps markdown sections together.
    #[default]
    Markdown,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub env: Environment,
    pub log_level: Option<String>,
    pub log_dir: PathBuf,
    pub server: ServerConfig,
    pub paths: PathsConfig,
    pub rag: RagConfig,
    pub embedding: EmbeddingConfig,
    pub llm: LlmConfig,
    pub openai: OpenAiConfig,
}

impl AppConfig {
    pub fn effective_log_level(&self) -> &str {
        self.log_level
            .as_deref()
            .filter(|level| !level.trim().is_empty())
            .unwrap_or_else(|| self.env.default_log_level())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            cors_allowed_origins: vec!["*".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub policies_dir: PathBuf,
    pub index_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            policies_dir: PathBuf::from("policies"),
            index_dir: PathBuf::from("vector_index"),
        }
    }
}

/// Retrieval parameters. Chunk sizes are measured in characters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    pub splitter: SplitterKind,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
    /// Number of trailing chat turns rendered into the prompt.
    pub history_window: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            splitter: SplitterKind::Markdown,
            chunk_size: 500,
            chunk_overlap: 150,
            top_k: 3,
            history_window: 6,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub model: String,
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "text-embedding-3-large".to_string(),
            batch_size: 64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub model: String,
    pub temperature: f64,
    pub max_tokens: Option<u32>,
    /// Ask the provider for a JSON object response.
    pub json_mode: bool,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            temperature: 0.0,
            max_tokens: None,
            json_mode: true,
            timeout_secs: 60,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    pub base_url: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
        }
    }
}

impl fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "****"))
            .finish()
    }
}
