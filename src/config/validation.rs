use thiserror::Error;

use super::models::Config;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("platform.portal_base must be an http(s) URL, got '{0}'")]
    InvalidPortalBase(String),

    #[error("{0} must be greater than zero")]
    ZeroTimeout(&'static str),

    #[error("platform.app_id must be greater than zero")]
    ZeroAppId,
}

pub fn validate(config: &Config) -> Result<(), ValidationError> {
    let base = &config.platform.portal_base;
    if !base.starts_with("http://") && !base.starts_with("https://") {
        return Err(ValidationError::InvalidPortalBase(base.clone()));
    }

    if config.http.connect_timeout_secs == 0 {
        return Err(ValidationError::ZeroTimeout("http.connect_timeout_secs"));
    }
    if config.http.request_timeout_secs == 0 {
        return Err(ValidationError::ZeroTimeout("http.request_timeout_secs"));
    }
    if config.signer.timeout_secs == 0 {
        return Err(ValidationError::ZeroTimeout("signer.timeout_secs"));
    }

    if config.platform.app_id == 0 {
        return Err(ValidationError::ZeroAppId);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn rejects_non_http_portal_base() {
        let mut config = Config::default();
        config.platform.portal_base = "ftp://example.com".to_string();

        assert!(matches!(
            validate(&config),
            Err(ValidationError::InvalidPortalBase(_))
        ));
    }

    #[test]
    fn rejects_zero_timeouts() {
        let mut config = Config::default();
        config.signer.timeout_secs = 0;

        assert!(matches!(
            validate(&config),
            Err(ValidationError::ZeroTimeout("signer.timeout_secs"))
        ));
    }
}
