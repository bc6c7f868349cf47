pub mod error;
pub mod paths;
pub mod service;
pub mod types;
pub mod validation;

pub use error::ConfigError;
pub use paths::AppPaths;
pub use service::{load_config, load_config_with};
pub use types::{
    AppConfig, EmbeddingConfig, Environment, LlmConfig, OpenAiConfig, PathsConfig, RagConfig,
    ServerConfig, SplitterKind,
};
