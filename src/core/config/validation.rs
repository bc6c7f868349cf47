use super::error::ConfigError;
use super::types::AppConfig;

pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    match config.openai.api_key.as_deref() {
        Some(key) if !key.trim().is_empty() => {}
        _ => return Err(ConfigError::MissingApiKey),
    }

    validate_non_empty("openai.base_url", &config.openai.base_url)?;
    validate_non_empty("embedding.model", &config.embedding.model)?;
    validate_non_empty("llm.model", &config.llm.model)?;
    validate_non_empty("server.host", &config.server.host)?;

    let rag = &config.rag;
    validate_range("rag.chunk_size", rag.chunk_size, 1, 100_000)?;
    if rag.chunk_overlap >= rag.chunk_size {
        return Err(ConfigError::invalid(
            "rag.chunk_overlap",
            format!(
                "must be smaller than rag.chunk_size ({} >= {})",
                rag.chunk_overlap, rag.chunk_size
            ),
        ));
    }
    validate_range("rag.top_k", rag.top_k, 1, 50)?;
    validate_range("rag.history_window", rag.history_window, 0, 100)?;

    validate_range("embedding.batch_size", config.embedding.batch_size, 1, 2048)?;

    let temperature = config.llm.temperature;
    if !(0.0..=2.0).contains(&temperature) {
        return Err(ConfigError::invalid(
            "llm.temperature",
            format!("must be between 0 and 2, got {}", temperature),
        ));
    }
    if config.llm.max_tokens == Some(0) {
        return Err(ConfigError::invalid("llm.max_tokens", "must be positive"));
    }
    if config.llm.timeout_secs == 0 {
        return Err(ConfigError::invalid("llm.timeout_secs", "must be positive"));
    }

    Ok(())
}

fn validate_non_empty(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::invalid(field, "must not be empty"));
    }
    Ok(())
}

fn validate_range(field: &str, value: usize, min: usize, max: usize) -> Result<(), ConfigError> {
    if value < min || value > max {
        return Err(ConfigError::invalid(
            field,
            format!("must be between {} and {}, got {}", min, max, value),
        ));
    }
    Ok(())
}
