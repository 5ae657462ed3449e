//! Configuration validation.

use crate::error::ConfigError;
use crate::schema::{Config, ProviderKind, TransportKind};

/// Cache lifetimes beyond a day are almost always a unit mistake.
const TTL_WARN_SECS: u64 = 86_400;

/// Validation result.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }
}

/// A validation error.
#[derive(Debug)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// A validation warning.
#[derive(Debug)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration.
    pub fn validate(config: &Config) -> Result<ValidationResult, ConfigError> {
        let mut result = ValidationResult::default();

        Self::validate_bridge(config, &mut result);
        Self::validate_transport(config, &mut result);
        Self::validate_coordinator(config, &mut result);
        Self::validate_registry(config, &mut result);
        Self::validate_providers(config, &mut result);

        Ok(result)
    }

    fn validate_bridge(config: &Config, result: &mut ValidationResult) {
        if config.bridge.request_timeout_ms == 0 {
            result.add_error(ValidationError::new(
                "bridge.request_timeout_ms",
                "request_timeout_ms must be greater than 0",
            ));
        }

        if config.bridge.sweep_interval_ms == 0 {
            result.add_error(ValidationError::new(
                "bridge.sweep_interval_ms",
                "sweep_interval_ms must be greater than 0",
            ));
        }

        let reconnect = &config.bridge.reconnect;
        if reconnect.base_delay_ms > reconnect.max_delay_ms {
            result.add_error(ValidationError::new(
                "bridge.reconnect.base_delay_ms",
                "base_delay_ms cannot exceed max_delay_ms",
            ));
        }
    }

    fn validate_transport(config: &Config, result: &mut ValidationResult) {
        if config.transport.kind == TransportKind::Websocket {
            if config.transport.port == 0 {
                result.add_error(ValidationError::new("transport.port", "Port cannot be 0"));
            }
            if config.transport.host.is_empty() {
                result.add_error(ValidationError::new(
                    "transport.host",
                    "Host cannot be empty",
                ));
            }
            if !config.transport.path.starts_with('/') {
                result.add_error(ValidationError::new(
                    "transport.path",
                    "path must start with '/'",
                ));
            }
        }

        if config.transport.kind == TransportKind::Native
            && config.transport.command.is_none()
            && !config.transport.args.is_empty()
        {
            result.add_warning(ValidationWarning::new(
                "transport.args",
                "args are ignored without a command",
            ));
        }
    }

    fn validate_coordinator(config: &Config, result: &mut ValidationResult) {
        let coordinator = &config.coordinator;

        if coordinator.max_attempts == 0 {
            result.add_error(ValidationError::new(
                "coordinator.max_attempts",
                "max_attempts must be greater than 0",
            ));
        }

        if coordinator.attempt_timeout_ms == 0 {
            result.add_error(ValidationError::new(
                "coordinator.attempt_timeout_ms",
                "attempt_timeout_ms must be greater than 0",
            ));
        }

        if coordinator.base_delay_ms > coordinator.max_delay_ms {
            result.add_error(ValidationError::new(
                "coordinator.base_delay_ms",
                "base_delay_ms cannot exceed max_delay_ms",
            ));
        }

        if coordinator.default_ttl_secs > TTL_WARN_SECS {
            result.add_warning(ValidationWarning::new(
                "coordinator.default_ttl_secs",
                "default_ttl_secs is longer than a day",
            ));
        }

        for (operation, ttl) in &coordinator.ttl_secs {
            if *ttl > TTL_WARN_SECS {
                result.add_warning(ValidationWarning::new(
                    format!("coordinator.ttl_secs.{}", operation),
                    "ttl is longer than a day",
                ));
            }
        }
    }

    fn validate_registry(config: &Config, result: &mut ValidationResult) {
        if config.registry.unavailable_threshold == 0 {
            result.add_error(ValidationError::new(
                "registry.unavailable_threshold",
                "unavailable_threshold must be greater than 0",
            ));
        }
    }

    fn validate_providers(config: &Config, result: &mut ValidationResult) {
        if config.providers.is_empty() {
            result.add_warning(ValidationWarning::new(
                "providers",
                "No providers configured, every ai request will fail",
            ));
        }

        for (name, provider) in &config.providers {
            match provider.kind {
                ProviderKind::Http => match provider.endpoint {
                    None => result.add_error(ValidationError::new(
                        format!("providers.{}.endpoint", name),
                        "http providers require an endpoint",
                    )),
                    Some(ref url)
                        if !url.starts_with("http://") && !url.starts_with("https://") =>
                    {
                        result.add_error(ValidationError::new(
                            format!("providers.{}.endpoint", name),
                            "endpoint must start with http:// or https://",
                        ))
                    }
                    Some(_) => {}
                },
                ProviderKind::Bridge => {
                    if provider.endpoint.is_some() {
                        result.add_warning(ValidationWarning::new(
                            format!("providers.{}.endpoint", name),
                            "endpoint is ignored for bridge providers",
                        ));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "validator_tests.rs"]
mod tests;
