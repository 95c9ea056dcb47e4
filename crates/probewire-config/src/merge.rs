use crate::config::Config;
use crate::error::ConfigError;

/// Merge an overlay TOML fragment on top of a base [`Config`].
///
/// Keys present in `overlay_toml` override those in `base`; tables are
/// merged key by key so an overlay can change one timing without
/// restating the rest.
pub fn merge_configs(base: &Config, overlay_toml: &str) -> Result<Config, ConfigError> {
    let mut merged = toml::Value::try_from(base).map_err(|e| ConfigError::Parse(e.to_string()))?;
    let overlay: toml::Value =
        toml::from_str(overlay_toml).map_err(|e| ConfigError::Parse(e.to_string()))?;

    overlay_into(&mut merged, overlay);

    merged
        .try_into()
        .map_err(|e: toml::de::Error| ConfigError::Parse(e.to_string()))
}

fn overlay_into(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, val) in overlay_table {
                match base_table.get_mut(&key) {
                    Some(existing) => overlay_into(existing, val),
                    None => {
                        base_table.insert(key, val);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_empty_overlay_returns_base() {
        let base = Config::default();
        let merged = merge_configs(&base, "").expect("merge empty");
        assert_eq!(merged, base);
    }

    #[test]
    fn merge_overrides_single_key_in_table() {
        let base = Config::default();
        let merged =
            merge_configs(&base, "[timing]\nresponse_wait_ms = 900\n").expect("merge timing");
        assert_eq!(merged.timing.response_wait_ms, 900);
        assert_eq!(merged.timing.retry_backoff_ms, 50);
    }

    #[test]
    fn merge_adds_optional_port() {
        let base = Config::default();
        let merged =
            merge_configs(&base, "[target]\nport = \"127.0.0.1:3333\"\n").expect("merge port");
        assert_eq!(merged.target.port.as_deref(), Some("127.0.0.1:3333"));
        assert_eq!(merged.target.connect_timeout_ms, 2000);
    }

    #[test]
    fn merge_layers_apply_in_order() {
        let base = Config::default();
        let global = merge_configs(&base, "[retry]\nattempts = 5\nresume_attempts = 2\n").unwrap();
        let project = merge_configs(&global, "[retry]\nattempts = 4\n").unwrap();
        assert_eq!(project.retry.attempts, 4);
        assert_eq!(project.retry.resume_attempts, 2);
    }

    #[test]
    fn merge_rejects_invalid_toml() {
        let result = merge_configs(&Config::default(), "[timing\n");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn merge_rejects_wrong_type() {
        let result = merge_configs(&Config::default(), "[retry]\nattempts = \"many\"\n");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }
}
