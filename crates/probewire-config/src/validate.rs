use crate::config::Config;
use crate::error::ConfigError;

/// Highest accepted attempt budget.
const MAX_ATTEMPTS: u32 = 10;

/// Validate a [`Config`], returning all detected violations.
///
/// Returns `Ok(())` when the config is valid, or `Err` with a
/// vector of every validation error found.
pub fn validate(config: &Config) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    let durations = [
        ("timing.dispatcher_tick_ms", config.timing.dispatcher_tick_ms),
        ("timing.listener_tick_ms", config.timing.listener_tick_ms),
        ("timing.response_wait_ms", config.timing.response_wait_ms),
        ("timing.retry_backoff_ms", config.timing.retry_backoff_ms),
        ("timing.busy_wait_ms", config.timing.busy_wait_ms),
        ("target.connect_timeout_ms", config.target.connect_timeout_ms),
    ];
    for (field, value) in durations {
        if value == 0 {
            errors.push(invalid(field, "must be greater than 0".to_string()));
        }
    }

    let budgets = [
        ("retry.attempts", config.retry.attempts),
        ("retry.resume_attempts", config.retry.resume_attempts),
    ];
    for (field, value) in budgets {
        if value == 0 || value > MAX_ATTEMPTS {
            errors.push(invalid(
                field,
                format!("must be 1-{MAX_ATTEMPTS}, got {value}"),
            ));
        }
    }

    if config.timing.poll_every_idle_ticks == 0 {
        errors.push(invalid(
            "timing.poll_every_idle_ticks",
            "must be at least 1".to_string(),
        ));
    }

    if config.timing.stale_drain_limit == 0 {
        errors.push(invalid(
            "timing.stale_drain_limit",
            "must be at least 1".to_string(),
        ));
    }

    if config
        .target
        .port
        .as_deref()
        .is_some_and(|p| p.trim().is_empty())
    {
        errors.push(invalid("target.port", "must not be empty".to_string()));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn invalid(field: &str, message: String) -> ConfigError {
    ConfigError::Validation {
        field: field.to_string(),
        message,
    }
}
