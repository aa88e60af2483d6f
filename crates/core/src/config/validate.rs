use super::{types::Config, AuthMethod, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Engine concurrency is at least 1
/// - Synthesis URL looks like an HTTP endpoint
/// - An api_key is present when auth method = "api_key"
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.engine.concurrency == 0 {
        return Err(ConfigError::ValidationError(
            "engine.concurrency must be at least 1".to_string(),
        ));
    }

    if !config.synthesis.url.starts_with("http://") && !config.synthesis.url.starts_with("https://")
    {
        return Err(ConfigError::ValidationError(format!(
            "synthesis.url must be an http(s) URL, got: {}",
            config.synthesis.url
        )));
    }

    if config.auth.method == AuthMethod::ApiKey
        && config.auth.api_key.as_ref().is_none_or(|k| k.is_empty())
    {
        return Err(ConfigError::ValidationError(
            "auth.api_key must be set when auth.method = \"api_key\"".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config_from_str;

    fn base_config() -> Config {
        load_config_from_str(
            r#"
[auth]
method = "none"

[synthesis]
url = "http://localhost:9880"
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_validate_valid_config() {
        let config = base_config();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_port_zero_fails() {
        let mut config = base_config();
        config.server.port = 0;
        let result = validate_config(&config);
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_validate_zero_concurrency_fails() {
        let mut config = base_config();
        config.engine.concurrency = 0;
        let result = validate_config(&config);
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_validate_zero_streak_limit_disables_breaker() {
        let mut config = base_config();
        config.engine.failure_streak_limit = 0;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_bad_synthesis_url_fails() {
        let mut config = base_config();
        config.synthesis.url = "localhost:9880".to_string();
        let result = validate_config(&config);
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_validate_api_key_method_without_key_fails() {
        let mut config = base_config();
        config.auth.method = AuthMethod::ApiKey;
        config.auth.api_key = None;
        let result = validate_config(&config);
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_validate_api_key_method_with_key_ok() {
        let mut config = base_config();
        config.auth.method = AuthMethod::ApiKey;
        config.auth.api_key = Some("secret".to_string());
        assert!(validate_config(&config).is_ok());
    }
}
