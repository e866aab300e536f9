use super::Config;
use anyhow::Result;

/// Validate a configuration. Unusable values are errors; odd-but-usable
/// values come back as warnings for the caller to print.
pub fn validate_config(config: &Config) -> Result<Vec<String>> {
    let mut warnings = Vec::new();

    if config.beanstalkd.address.is_empty() {
        anyhow::bail!("beanstalkd.address must not be empty");
    }

    if config.beanstalkd.tube_stat_workers == 0 {
        anyhow::bail!("beanstalkd.tube_stat_workers must be at least 1");
    }

    if !config.web.telemetry_path.starts_with('/') {
        anyhow::bail!(
            "web.telemetry_path must start with '/', got '{}'",
            config.web.telemetry_path
        );
    }

    if config.web.telemetry_path == "/" {
        anyhow::bail!("web.telemetry_path '/' conflicts with the landing page");
    }

    if config.web.listen_address.is_empty() {
        anyhow::bail!("web.listen_address must not be empty");
    }

    if config.beanstalkd.tube_stat_workers > 32 {
        warnings.push(format!(
            "Warning: {} tube stat workers share one beanstalkd connection; extra workers mostly wait on it",
            config.beanstalkd.tube_stat_workers
        ));
    }

    if config.beanstalkd.connection_timeout_ms == 0 {
        warnings.push(
            "Warning: no connection timeout set; a stalled beanstalkd will block collection"
                .to_string(),
        );
    }

    Ok(warnings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        let warnings = validate_config(&config).unwrap();
        // Default has no timeout, which warns but does not fail.
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn test_zero_workers_rejected() {
        let mut config = Config::default();
        config.beanstalkd.tube_stat_workers = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_empty_address_rejected() {
        let mut config = Config::default();
        config.beanstalkd.address = String::new();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_relative_telemetry_path_rejected() {
        let mut config = Config::default();
        config.web.telemetry_path = "metrics".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_root_telemetry_path_rejected() {
        let mut config = Config::default();
        config.web.telemetry_path = "/".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_many_workers_warns() {
        let mut config = Config::default();
        config.beanstalkd.tube_stat_workers = 64;
        config.beanstalkd.connection_timeout_ms = 1000;
        let warnings = validate_config(&config).unwrap();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("tube stat workers"));
    }
}
