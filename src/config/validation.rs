use crate::config::types::{
    Config, CrawlerConfig, OutputConfig, PaginationConfig, SiteConfig, UserAgentConfig,
};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_output_config(&config.output)?;
    validate_site_config(&config.site)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.max_retries < 1 {
        return Err(ConfigError::Validation(format!(
            "max_retries must be >= 1, got {}",
            config.max_retries
        )));
    }

    if config.max_requests_per_minute < 1 {
        return Err(ConfigError::Validation(format!(
            "max_requests_per_minute must be >= 1, got {}",
            config.max_requests_per_minute
        )));
    }

    if config.max_concurrent_requests < 1 || config.max_concurrent_requests > 100 {
        return Err(ConfigError::Validation(format!(
            "max_concurrent_requests must be between 1 and 100, got {}",
            config.max_concurrent_requests
        )));
    }

    if config.checkpoint_interval_secs < 1 {
        return Err(ConfigError::Validation(
            "checkpoint_interval_secs must be >= 1".to_string(),
        ));
    }

    if config.request_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "request_timeout_secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    // Validate crawler name: non-empty, alphanumeric + hyphens only
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    if config.dataset_path.is_empty() {
        return Err(ConfigError::Validation(
            "dataset_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates the site section: entry points and the paging policy
fn validate_site_config(config: &SiteConfig) -> Result<(), ConfigError> {
    if config.name.is_empty() {
        return Err(ConfigError::Validation("site name cannot be empty".to_string()));
    }

    if let Some(base_url) = &config.base_url {
        validate_http_url(base_url, "base-url")?;
    }

    if config.start.is_empty() {
        return Err(ConfigError::Validation(format!(
            "Site '{}' must have at least one start request",
            config.name
        )));
    }

    for entry in &config.start {
        validate_http_url(&entry.url, "start URL")?;
    }

    match &config.pagination {
        PaginationConfig::CountedTotal {
            page_size,
            page_param,
        } => {
            if *page_size < 1 {
                return Err(ConfigError::Validation(
                    "page-size must be >= 1".to_string(),
                ));
            }
            if page_param.is_empty() {
                return Err(ConfigError::Validation(
                    "page-param cannot be empty".to_string(),
                ));
            }
        }
        PaginationConfig::DerivedPageCount { page_url_template } => {
            for placeholder in ["{category}", "{page}"] {
                if !page_url_template.contains(placeholder) {
                    return Err(ConfigError::Validation(format!(
                        "page-url-template '{}' must contain {}",
                        page_url_template, placeholder
                    )));
                }
            }
            let sample = page_url_template
                .replace("{category}", "1")
                .replace("{page}", "2");
            validate_http_url(&sample, "page-url-template")?;
        }
    }

    Ok(())
}

/// Validates that a string is an absolute http(s) URL
fn validate_http_url(value: &str, what: &str) -> Result<(), ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {} '{}': {}", what, value, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "{} '{}' must use http or https",
            what, value
        )));
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    if email.is_empty() {
        return Err(ConfigError::Validation(
            "contact_email cannot be empty".to_string(),
        ));
    }

    let Some((local, domain)) = email.split_once('@') else {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    };

    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !domain.contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}
