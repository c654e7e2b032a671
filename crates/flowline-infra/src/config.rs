//! Configuration loader for the execution core.
//!
//! Reads `flowline.toml` from the given data directory and deserializes it
//! into [`CoreConfig`]. A missing or malformed file is never fatal: the
//! loader logs and falls back to defaults so a bare deployment still runs.

use std::path::Path;

use flowline_types::config::CoreConfig;

/// Load configuration from `{data_dir}/flowline.toml`.
///
/// - Missing file: returns `CoreConfig::default()` silently (debug log).
/// - Unreadable or unparseable file: logs a warning and returns the default.
pub async fn load_core_config(data_dir: &Path) -> CoreConfig {
    let config_path = data_dir.join("flowline.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(
                "no flowline.toml at {}, using defaults",
                config_path.display()
            );
            return CoreConfig::default();
        }
        Err(err) => {
            tracing::warn!(
                "failed to read {}: {err}, using defaults",
                config_path.display()
            );
            return CoreConfig::default();
        }
    };

    match toml::from_str::<CoreConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(
                "failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            CoreConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_file_returns_defaults() {
        let tmp = TempDir::new().unwrap();
        let config = load_core_config(tmp.path()).await;
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.default_queue, "workflow-executions");
    }

    #[tokio::test]
    async fn test_valid_toml_is_parsed() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(
            tmp.path().join("flowline.toml"),
            r#"
default_queue = "priority-executions"
cleanup_retention_days = 7

[retry]
max_attempts = 5
base_delay_secs = 10
"#,
        )
        .await
        .unwrap();

        let config = load_core_config(tmp.path()).await;
        assert_eq!(config.default_queue, "priority-executions");
        assert_eq!(config.cleanup_retention_days, 7);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_delay_secs, 10);
        // Unspecified fields keep their defaults.
        assert_eq!(config.stuck_threshold_minutes, 30);
    }

    #[tokio::test]
    async fn test_malformed_toml_returns_defaults() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(tmp.path().join("flowline.toml"), "not { valid toml !!!")
            .await
            .unwrap();

        let config = load_core_config(tmp.path()).await;
        assert_eq!(config.retry.max_attempts, 3);
    }
}
