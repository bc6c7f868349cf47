use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use super::error::ConfigError;
use super::types::AppConfig;
use super::validation::validate_config;

pub const CONFIG_PATH_ENV: &str = "POLICY_ASSISTANT_CONFIG";
const DEFAULT_CONFIG_FILE: &str = "config.yml";
const SECRETS_FILE: &str = "secrets.yml";

/// Loads configuration from the process environment.
///
/// Sources, later ones winning:
/// 1. built-in defaults
/// 2. the YAML file named by `POLICY_ASSISTANT_CONFIG`, else `./config.yml`
/// 3. `secrets.yml` next to that file (kept out of the public config)
/// 4. environment variables such as `OPENAI_API_KEY` and `LOG_LEVEL`
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_with(|key| env::var(key).ok())
}

pub fn load_config_with<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let config_path = match lookup(CONFIG_PATH_ENV) {
        Some(path) => {
            let path = PathBuf::from(path);
            if !path.exists() {
                return Err(ConfigError::NotFound(path));
            }
            Some(path)
        }
        None => {
            let path = PathBuf::from(DEFAULT_CONFIG_FILE);
            path.exists().then_some(path)
        }
    };

    let mut merged = Value::Object(Map::new());
    if let Some(path) = &config_path {
        merged = deep_merge(&merged, &load_yaml_file(path)?);

        let secrets_path = path
            .parent()
            .map(|dir| dir.join(SECRETS_FILE))
            .unwrap_or_else(|| PathBuf::from(SECRETS_FILE));
        if secrets_path.exists() {
            merged = deep_merge(&merged, &load_yaml_file(&secrets_path)?);
        }
    }

    let mut config: AppConfig =
        serde_json::from_value(merged).map_err(|e| ConfigError::Parse(e.to_string()))?;
    apply_env_overrides(&mut config, &lookup)?;
    validate_config(&config)?;
    Ok(config)
}

fn load_yaml_file(path: &Path) -> Result<Value, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    if contents.trim().is_empty() {
        return Ok(Value::Object(Map::new()));
    }

    match serde_yaml::from_str::<Value>(&contents) {
        Ok(value @ Value::Object(_)) => Ok(value),
        Ok(Value::Null) => Ok(Value::Object(Map::new())),
        Ok(_) => Err(ConfigError::Parse(format!(
            "{}: top level must be a mapping",
            path.display()
        ))),
        Err(e) => Err(ConfigError::Parse(format!("{}: {}", path.display(), e))),
    }
}

fn apply_env_overrides<F>(config: &mut AppConfig, lookup: &F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

    if let Some(key) = get("OPENAI_API_KEY") {
        config.openai.api_key = Some(key.trim().to_string());
    }
    if let Some(url) = get("OPENAI_BASE_URL") {
        config.openai.base_url = url;
    }
    if let Some(env_name) = get("APP_ENV").or_else(|| get("FLASK_ENV")) {
        config.env = env_name
            .parse()
            .map_err(|message: String| ConfigError::invalid("APP_ENV", message))?;
    }
    if let Some(level) = get("LOG_LEVEL") {
        config.log_level = Some(level.trim().to_lowercase());
    }
    if let Some(dir) = get("POLICIES_DIRECTORY") {
        config.paths.policies_dir = PathBuf::from(dir);
    }
    if let Some(dir) = get("INDEX_DIRECTORY") {
        config.paths.index_dir = PathBuf::from(dir);
    }
    if let Some(model) = get("OPENAI_CHAT_MODEL") {
        config.llm.model = model;
    }
    if let Some(model) = get("OPENAI_EMBEDDING_MODEL") {
        config.embedding.model = model;
    }
    if let Some(host) = get("HOST") {
        config.server.host = host;
    }
    if let Some(port) = get("PORT") {
        config.server.port = port
            .trim()
            .parse::<u16>()
            .map_err(|e| ConfigError::invalid("PORT", e.to_string()))?;
    }

    Ok(())
}

fn deep_merge(base: &Value, override_value: &Value) -> Value {
    match (base, override_value) {
        (Value::Object(base_map), Value::Object(override_map)) => {
            let mut merged: Map<String, Value> = base_map.clone();
            for (key, value) in override_map {
                let merged_value = match merged.get(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value.clone(),
                };
                merged.insert(key.clone(), merged_value);
            }
            Value::Object(merged)
        }
        _ => override_value.clone(),
    }
}
