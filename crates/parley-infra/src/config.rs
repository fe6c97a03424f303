//! Configuration loader for Parley.
//!
//! Reads `parley.toml` and deserializes it into [`AppConfig`]. Falls back to
//! defaults when the file is missing or malformed, then applies the
//! `PARLEY_*` environment overrides.

use std::path::Path;

use parley_types::config::AppConfig;

/// Default configuration file name, resolved against the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "parley.toml";

pub const ENV_DATABASE_URL: &str = "PARLEY_DATABASE_URL";
pub const ENV_HOST: &str = "PARLEY_HOST";
pub const ENV_PORT: &str = "PARLEY_PORT";

/// Load configuration from `path` and apply environment overrides.
///
/// - If the file does not exist, starts from [`AppConfig::default()`].
/// - If the file exists but fails to parse, logs a warning and starts from the default.
pub async fn load_config(path: &Path) -> AppConfig {
    let config = read_config_file(path).await;
    apply_overrides(config, |key| std::env::var(key).ok())
}

async fn read_config_file(path: &Path) -> AppConfig {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config found at {}, using defaults", path.display());
            return AppConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", path.display());
            return AppConfig::default();
        }
    };

    match toml::from_str::<AppConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!("Failed to parse {}: {err}, using defaults", path.display());
            AppConfig::default()
        }
    }
}

/// Overlay `PARLEY_DATABASE_URL`, `PARLEY_HOST` and `PARLEY_PORT` onto `config`.
///
/// An unparsable port is ignored with a warning.
pub fn apply_overrides(mut config: AppConfig, lookup: impl Fn(&str) -> Option<String>) -> AppConfig {
    if let Some(url) = lookup(ENV_DATABASE_URL) {
        config.database.url = url;
    }
    if let Some(host) = lookup(ENV_HOST) {
        config.server.host = host;
    }
    if let Some(port) = lookup(ENV_PORT) {
        match port.parse::<u16>() {
            Ok(port) => config.server.port = port,
            Err(err) => tracing::warn!("Ignoring {ENV_PORT}={port}: {err}"),
        }
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[tokio::test]
    async fn test_missing_file_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config = read_config_file(&tmp.path().join("parley.toml")).await;
        assert_eq!(config.server.port, 8080);
        assert!(config.models.is_empty());
    }

    #[tokio::test]
    async fn test_valid_toml_returns_parsed() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("parley.toml");
        tokio::fs::write(
            &path,
            r#"
[server]
port = 9100

[database]
url = "sqlite://other.db?mode=rwc"

[[models]]
id = "echo-1"
provider = "echo"
chunk_delay_ms = 5
"#,
        )
        .await
        .unwrap();

        let config = read_config_file(&path).await;
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.database.url, "sqlite://other.db?mode=rwc");
        assert_eq!(config.models.len(), 1);
        assert_eq!(config.models[0].chunk_delay_ms, Some(5));
    }

    #[tokio::test]
    async fn test_invalid_toml_returns_default() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("parley.toml");
        tokio::fs::write(&path, "this is not { valid toml !!!")
            .await
            .unwrap();

        let config = read_config_file(&path).await;
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.context.reply_reserve_percent, 20);
    }

    #[test]
    fn test_env_overrides_apply() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_DATABASE_URL, "sqlite://env.db"),
            (ENV_HOST, "0.0.0.0"),
            (ENV_PORT, "3000"),
        ]);
        let config = apply_overrides(AppConfig::default(), |k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.database.url, "sqlite://env.db");
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 3000);
    }

    #[test]
    fn test_invalid_port_override_is_ignored() {
        let config = apply_overrides(AppConfig::default(), |k| {
            (k == ENV_PORT).then(|| "not-a-port".to_string())
        });
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_no_overrides_keeps_values() {
        let config = apply_overrides(AppConfig::default(), no_env);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.database.url, "sqlite://parley.db?mode=rwc");
    }
}
