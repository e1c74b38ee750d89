use crate::config::{parse_duration, Config};
use crate::error::{Result, SearchError, ValidationError};

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration, reporting every violation at once
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_search(config, &mut errors);
        Self::validate_indexed(config, &mut errors);

        if config.unindexed.max_concurrency == 0 {
            errors.push(ValidationError::new(
                "unindexed.max_concurrency",
                "Concurrency must be greater than 0",
            ));
        }

        if config.logging.filter.trim().is_empty() {
            errors.push(ValidationError::new(
                "logging.filter",
                "Log filter cannot be empty",
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(SearchError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != "1.0.0" {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_search(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.search.max_concurrency == 0 {
            errors.push(ValidationError::new(
                "search.max_concurrency",
                "Concurrency must be greater than 0",
            ));
        }

        if config.search.default_limit == 0 {
            errors.push(ValidationError::new(
                "search.default_limit",
                "Default limit must be greater than 0",
            ));
        }

        if config.search.max_results == 0 {
            errors.push(ValidationError::new(
                "search.max_results",
                "Result budget must be greater than 0",
            ));
        }

        Self::validate_duration("search.timeout", &config.search.timeout, errors);
    }

    fn validate_indexed(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.indexed.buffer_size == 0 {
            errors.push(ValidationError::new(
                "indexed.buffer_size",
                "Buffer size must be greater than 0",
            ));
        }

        Self::validate_duration("indexed.list_timeout", &config.indexed.list_timeout, errors);
        Self::validate_duration("indexed.max_wall_time", &config.indexed.max_wall_time, errors);
    }

    fn validate_duration(path: &str, value: &str, errors: &mut Vec<ValidationError>) {
        match parse_duration(path, value) {
            Ok(d) if d.is_zero() => {
                errors.push(ValidationError::new(path, "Duration must be greater than 0"))
            }
            Ok(_) => {}
            Err(_) => errors.push(ValidationError::new(
                path,
                format!("Invalid duration format: {}", value),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_config() {
        let config = Config::default();
        assert!(ConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = Config::default();
        config.search.max_concurrency = 0;
        config.indexed.max_wall_time = "forever".to_string();
        config.meta.schema_version = "2.0.0".to_string();

        match ConfigValidator::validate(&config) {
            Err(SearchError::ConfigValidation { errors }) => {
                let paths: Vec<&str> = errors.iter().map(|e| e.path.as_str()).collect();
                assert_eq!(
                    paths,
                    vec!["_meta.schema_version", "search.max_concurrency", "indexed.max_wall_time"]
                );
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_zero_duration() {
        let mut config = Config::default();
        config.search.timeout = "0s".to_string();
        assert!(ConfigValidator::validate(&config).is_err());
    }
}
