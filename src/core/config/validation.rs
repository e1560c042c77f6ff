use serde_json::{Map, Value};

use crate::core::errors::ApiError;

const WEB_PROVIDERS: [&str; 4] = ["duckduckgo", "google", "brave", "bing"];

pub fn validate_config(config: &Value) -> Result<(), ApiError> {
    let root = config
        .as_object()
        .ok_or_else(|| config_type_error("root", "object"))?;

    if let Some(server) = expect_optional_object(root, "server")? {
        validate_optional_string_field(server, "server.host", "host")?;
        validate_u64_field(server, "server.port", "port", 1, 65535)?;
        validate_string_array_field(
            server,
            "server.cors_allowed_origins",
            "cors_allowed_origins",
        )?;
    }

    if let Some(data) = expect_optional_object(root, "data")? {
        validate_non_empty_string_field(data, "data.store_path", "store_path")?;
        validate_non_empty_string_field(data, "data.index_path", "index_path")?;
        validate_non_empty_string_field(data, "data.mapping_path", "mapping_path")?;
    }

    if let Some(retrieval) = expect_optional_object(root, "retrieval")? {
        validate_u64_field(retrieval, "retrieval.default_top_k", "default_top_k", 1, 1_000)?;
        validate_u64_field(retrieval, "retrieval.max_top_k", "max_top_k", 1, 1_000)?;
        validate_u64_field(
            retrieval,
            "retrieval.candidate_multiplier",
            "candidate_multiplier",
            1,
            100,
        )?;
        validate_u64_field(
            retrieval,
            "retrieval.min_term_length",
            "min_term_length",
            1,
            64,
        )?;
        validate_u64_field(retrieval, "retrieval.lexical_limit", "lexical_limit", 1, 10_000)?;
        validate_bool_field(retrieval, "retrieval.dedup_documents", "dedup_documents")?;
        validate_i64_field(retrieval, "retrieval.year_min", "year_min", 0, 9_999)?;
        validate_i64_field(retrieval, "retrieval.year_max", "year_max", 0, 9_999)?;

        let year_min = retrieval.get("year_min").and_then(Value::as_i64);
        let year_max = retrieval.get("year_max").and_then(Value::as_i64);
        if let (Some(min), Some(max)) = (year_min, year_max) {
            if min > max {
                return Err(ApiError::BadRequest(
                    "Invalid config at 'retrieval.year_min': must not exceed year_max".to_string(),
                ));
            }
        }
    }

    if let Some(context) = expect_optional_object(root, "context")? {
        validate_u64_field(context, "context.max_documents", "max_documents", 1, 100)?;
        validate_u64_field(
            context,
            "context.max_chars_per_document",
            "max_chars_per_document",
            1,
            1_000_000,
        )?;
    }

    if let Some(llm) = expect_optional_object(root, "llm")? {
        validate_optional_string_field(llm, "llm.base_url", "base_url")?;
        validate_non_empty_string_field(llm, "llm.model", "model")?;
        validate_optional_string_field(llm, "llm.api_key", "api_key")?;
        validate_optional_string_field(llm, "llm.system_prompt", "system_prompt")?;
        validate_f64_field(llm, "llm.temperature", "temperature", 0.0, 2.0)?;
        validate_u64_field(llm, "llm.max_tokens", "max_tokens", 1, 1_000_000)?;
        validate_u64_field(llm, "llm.timeout_secs", "timeout_secs", 1, 3_600)?;
        validate_u64_field(llm, "llm.max_sources", "max_sources", 1, 100)?;
    }

    if let Some(embedding) = expect_optional_object(root, "embedding")? {
        validate_optional_string_field(embedding, "embedding.base_url", "base_url")?;
        validate_non_empty_string_field(embedding, "embedding.model", "model")?;
        validate_optional_string_field(embedding, "embedding.api_key", "api_key")?;
        validate_u64_field(embedding, "embedding.timeout_secs", "timeout_secs", 1, 3_600)?;
    }

    if let Some(web) = expect_optional_object(root, "web")? {
        validate_bool_field(web, "web.enabled", "enabled")?;
        if let Some(provider) = web.get("provider") {
            let Some(name) = provider.as_str() else {
                return Err(config_type_error("web.provider", "string"));
            };
            if !WEB_PROVIDERS.contains(&name.to_lowercase().as_str()) {
                return Err(ApiError::BadRequest(format!(
                    "Invalid config at 'web.provider': expected one of {}",
                    WEB_PROVIDERS.join(", ")
                )));
            }
        }
        validate_u64_field(web, "web.max_results", "max_results", 1, 20)?;
        validate_u64_field(web, "web.timeout_secs", "timeout_secs", 1, 300)?;
        validate_u64_field(web, "web.max_bytes", "max_bytes", 1, 100_000_000)?;
        validate_u64_field(web, "web.snippet_chars", "snippet_chars", 1, 100_000)?;
        validate_string_array_field(web, "web.url_denylist", "url_denylist")?;
    }

    Ok(())
}

fn expect_optional_object<'a>(
    root: &'a Map<String, Value>,
    key: &str,
) -> Result<Option<&'a Map<String, Value>>, ApiError> {
    match root.get(key) {
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(Value::Null) | None => Ok(None),
        Some(_) => Err(config_type_error(key, "object")),
    }
}

fn validate_bool_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    if value.as_bool().is_some() {
        return Ok(());
    }
    Err(config_type_error(path, "boolean"))
}

fn validate_u64_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    min: u64,
    max: u64,
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(number) = value.as_u64() else {
        return Err(config_type_error(path, "integer"));
    };
    if number < min || number > max {
        return Err(out_of_range(path, min, max));
    }
    Ok(())
}

fn validate_i64_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    min: i64,
    max: i64,
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(number) = value.as_i64() else {
        return Err(config_type_error(path, "integer"));
    };
    if number < min || number > max {
        return Err(out_of_range(path, min, max));
    }
    Ok(())
}

fn validate_f64_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    min: f64,
    max: f64,
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(number) = value.as_f64() else {
        return Err(config_type_error(path, "number"));
    };
    if number < min || number > max {
        return Err(out_of_range(path, min, max));
    }
    Ok(())
}

fn validate_non_empty_string_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(text) = value.as_str() else {
        return Err(config_type_error(path, "string"));
    };
    if text.trim().is_empty() {
        return Err(ApiError::BadRequest(format!(
            "Invalid config at '{}': value cannot be empty",
            path
        )));
    }
    Ok(())
}

fn validate_optional_string_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), ApiError> {
    match section.get(key) {
        None | Some(Value::Null) | Some(Value::String(_)) => Ok(()),
        Some(_) => Err(config_type_error(path, "string")),
    }
}

fn validate_string_array_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(items) = value.as_array() else {
        return Err(config_type_error(path, "array of strings"));
    };
    for (index, item) in items.iter().enumerate() {
        let Some(text) = item.as_str() else {
            return Err(config_type_error(&format!("{}[{}]", path, index), "string"));
        };
        if text.trim().is_empty() {
            return Err(ApiError::BadRequest(format!(
                "Invalid config at '{}[{}]': value cannot be empty",
                path, index
            )));
        }
    }
    Ok(())
}

fn out_of_range<T: std::fmt::Display>(path: &str, min: T, max: T) -> ApiError {
    ApiError::BadRequest(format!(
        "Invalid config at '{}': must be between {} and {}",
        path, min, max
    ))
}

fn config_type_error(path: &str, expected: &str) -> ApiError {
    ApiError::BadRequest(format!(
        "Invalid config at '{}': expected {}",
        path, expected
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_empty_and_typical_configs() {
        assert!(validate_config(&json!({})).is_ok());
        assert!(validate_config(&json!({
            "server": { "port": 8000 },
            "retrieval": { "default_top_k": 5, "year_min": 1300, "year_max": 2029 },
            "llm": { "temperature": 0.7, "api_key": null },
            "web": { "provider": "Brave", "url_denylist": ["example.com"] }
        }))
        .is_ok());
    }

    #[test]
    fn rejects_out_of_range_and_wrong_types() {
        let err = validate_config(&json!({ "retrieval": { "default_top_k": 0 } })).unwrap_err();
        assert!(err.to_string().contains("retrieval.default_top_k"));

        assert!(validate_config(&json!({ "llm": { "temperature": "hot" } })).is_err());
        assert!(validate_config(&json!({ "web": { "provider": "altavista" } })).is_err());
        assert!(validate_config(&json!({ "context": [] })).is_err());
    }

    #[test]
    fn rejects_inverted_year_bounds() {
        let err = validate_config(&json!({
            "retrieval": { "year_min": 2000, "year_max": 1500 }
        }))
        .unwrap_err();
        assert!(err.to_string().contains("year_min"));
    }
}
