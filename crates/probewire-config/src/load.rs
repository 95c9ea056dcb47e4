use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::ConfigError;
use crate::merge::merge_configs;
use crate::validate::validate;

/// Directory holding a project-level config file.
const PROJECT_DIR: &str = ".probewire";

/// Content written into a newly-created default config file.
const DEFAULT_CONFIG_CONTENT: &str = r#"# probewire configuration
# Uncomment and edit settings below to override defaults.

# [target]
# port = "127.0.0.1:3333"
# connect_timeout_ms = 2000

# [timing]
# dispatcher_tick_ms = 150
# listener_tick_ms = 100
# response_wait_ms = 300
# retry_backoff_ms = 50
# busy_wait_ms = 500
# poll_every_idle_ticks = 2
# stale_drain_limit = 100

# [retry]
# attempts = 3
# resume_attempts = 1

# [poll]
# enabled = false

# [log]
# level = "info"
"#;

/// Load and merge configuration.
///
/// 1. Reads the global config from `config_dir/config.toml`, creating it
///    with commented-out defaults when missing.
/// 2. Optionally reads a project config from
///    `project_dir/.probewire/config.toml` (walks upward).
/// 3. Merges: `Config::default() <- global <- project`.
/// 4. Validates the merged result.
///
/// # Errors
///
/// Returns [`ConfigError`] on I/O failure, parse failure, or
/// validation failure.
pub fn load_config(config_dir: &Path, project_dir: Option<&Path>) -> Result<Config, ConfigError> {
    let global_path = config_dir.join("config.toml");

    if !config_dir.exists() {
        std::fs::create_dir_all(config_dir)?;
    }

    if !global_path.exists() {
        std::fs::write(&global_path, DEFAULT_CONFIG_CONTENT)
            .map_err(|e| ConfigError::CreateDefault(e.to_string()))?;
        tracing::info!("Created default config at {}", global_path.display());
    }

    let mut config = Config::default();

    let global_content = std::fs::read_to_string(&global_path)?;
    if has_non_comment_content(&global_content) {
        config = merge_configs(&config, &global_content)?;
    }

    if let Some(project_path) = project_dir.and_then(find_project_config) {
        tracing::debug!("Merging project config {}", project_path.display());
        let project_content = std::fs::read_to_string(&project_path)?;
        config = merge_configs(&config, &project_content)?;
    }

    check(config)
}

/// Parse a TOML string directly into a validated [`Config`].
///
/// # Errors
///
/// Returns [`ConfigError`] on parse or validation failure.
pub fn load_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(toml_str).map_err(|e| ConfigError::Parse(e.to_string()))?;
    check(config)
}

fn check(config: Config) -> Result<Config, ConfigError> {
    match validate(&config) {
        Ok(()) => Ok(config),
        Err(errors) => Err(errors
            .into_iter()
            .next()
            .unwrap_or_else(|| ConfigError::Validation {
                field: "unknown".to_string(),
                message: "validation failed".to_string(),
            })),
    }
}

/// Walk from `start` upward looking for `.probewire/config.toml`.
fn find_project_config(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(PROJECT_DIR).join("config.toml"))
        .find(|candidate| candidate.exists())
}

/// Returns `true` when the content has at least one
/// non-empty, non-comment line.
fn has_non_comment_content(content: &str) -> bool {
    content.lines().any(|l| {
        let trimmed = l.trim();
        !trimmed.is_empty() && !trimmed.starts_with('#')
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn load_config_creates_default_when_missing() {
        let tmp = TempDir::new().unwrap();
        let cfg_dir = tmp.path().join("config");

        let config = load_config(&cfg_dir, None).unwrap();
        assert_eq!(config, Config::default());
        assert!(cfg_dir.join("config.toml").exists());
    }

    #[test]
    fn load_config_reads_existing_global() {
        let tmp = TempDir::new().unwrap();
        let cfg_dir = tmp.path().join("config");
        std::fs::create_dir_all(&cfg_dir).unwrap();
        std::fs::write(
            cfg_dir.join("config.toml"),
            "[timing]\nresponse_wait_ms = 800\n",
        )
        .unwrap();

        let config = load_config(&cfg_dir, None).unwrap();
        assert_eq!(config.timing.response_wait_ms, 800);
        assert_eq!(config.timing.dispatcher_tick_ms, 150);
    }

    #[test]
    fn load_config_merges_project_over_global() {
        let tmp = TempDir::new().unwrap();
        let cfg_dir = tmp.path().join("config");
        std::fs::create_dir_all(&cfg_dir).unwrap();
        std::fs::write(cfg_dir.join("config.toml"), "[retry]\nattempts = 5\n").unwrap();

        let proj_dir = tmp.path().join("project");
        let dot_dir = proj_dir.join(PROJECT_DIR);
        std::fs::create_dir_all(&dot_dir).unwrap();
        std::fs::write(
            dot_dir.join("config.toml"),
            "[target]\nport = \"10.1.1.1:3333\"\n",
        )
        .unwrap();

        let config = load_config(&cfg_dir, Some(&proj_dir)).unwrap();
        assert_eq!(config.retry.attempts, 5);
        assert_eq!(config.target.port.as_deref(), Some("10.1.1.1:3333"));
    }

    #[test]
    fn load_config_rejects_invalid_merged_values() {
        let tmp = TempDir::new().unwrap();
        let cfg_dir = tmp.path().join("config");
        std::fs::create_dir_all(&cfg_dir).unwrap();
        std::fs::write(cfg_dir.join("config.toml"), "[retry]\nattempts = 0\n").unwrap();

        let err = load_config(&cfg_dir, None).unwrap_err();
        assert!(err.to_string().contains("retry.attempts"), "got: {err}");
    }

    #[test]
    fn load_from_str_parses_valid_toml() {
        let config = load_from_str("[poll]\nenabled = true\n").unwrap();
        assert!(config.poll.enabled);
    }

    #[test]
    fn load_from_str_rejects_invalid_toml() {
        assert!(matches!(
            load_from_str("{{bad}}"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn find_project_config_walks_up() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("repo");
        let dot = root.join(PROJECT_DIR);
        std::fs::create_dir_all(&dot).unwrap();
        std::fs::write(dot.join("config.toml"), "[poll]\nenabled = true\n").unwrap();

        let deep = root.join("fw").join("src");
        std::fs::create_dir_all(&deep).unwrap();

        let found = find_project_config(&deep).expect("project config");
        assert!(found.ends_with(".probewire/config.toml"));
    }

    #[test]
    fn default_config_content_is_comment_only() {
        assert!(!has_non_comment_content(DEFAULT_CONFIG_CONTENT));
        assert!(has_non_comment_content("# comment\n[poll]\n"));
    }
}
