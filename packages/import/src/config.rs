//! Loading and validation of [`ImportConfig`].
//!
//! The configuration is read once at startup from an optional TOML file,
//! patched with CLI overrides by the binary, validated, and then passed by
//! reference into the pipeline. Nothing mutates it afterwards.

use std::path::Path;

use traj_import_models::ImportConfig;

/// Errors from loading or validating the configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("Failed to read config {path}: {source}")]
    Read {
        /// Path of the config file.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The config file is not valid TOML for [`ImportConfig`].
    #[error("Failed to parse config {path}: {source}")]
    Parse {
        /// Path of the config file.
        path: String,
        /// Underlying TOML error.
        source: toml::de::Error,
    },

    /// A value is out of range or missing.
    #[error("Invalid config: {message}")]
    Invalid {
        /// Description of what went wrong.
        message: String,
    },
}

/// Parses an [`ImportConfig`] from a TOML string. Missing sections and
/// fields take their defaults.
///
/// # Errors
///
/// Returns a TOML error if the string is malformed or a field has the
/// wrong type.
pub fn parse_config_toml(toml_str: &str) -> Result<ImportConfig, toml::de::Error> {
    toml::from_str(toml_str)
}

/// Reads and parses the config file at `path`.
///
/// # Errors
///
/// Returns [`ConfigError`] if the file cannot be read or parsed.
pub fn load(path: &Path) -> Result<ImportConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.display().to_string(),
        source: e,
    })?;

    parse_config_toml(&contents).map_err(|e| ConfigError::Parse {
        path: path.display().to_string(),
        source: e,
    })
}

/// Checks the values the pipeline relies on before any command runs.
///
/// # Errors
///
/// Returns [`ConfigError::Invalid`] describing the first problem found.
pub fn validate(config: &ImportConfig) -> Result<(), ConfigError> {
    let invalid = |message: &str| {
        Err(ConfigError::Invalid {
            message: message.to_string(),
        })
    };

    let target = &config.target;
    if target.table.trim().is_empty() {
        return invalid("target.table must not be empty");
    }
    if target.columns.is_empty() || target.columns.iter().any(|c| c.trim().is_empty()) {
        return invalid("target.columns must list at least one non-empty column");
    }
    if matches!(target.delimiter, '\n' | '\r') {
        return invalid("target.delimiter must not be a line break");
    }
    if config.source.suffix.is_empty() {
        return invalid("source.suffix must not be empty");
    }
    if config
        .database
        .container
        .as_deref()
        .is_some_and(|c| c.trim().is_empty())
    {
        return invalid("database.container must not be empty when set");
    }
    if config.features.shell.trim().is_empty() {
        return invalid("features.shell must not be empty");
    }
    if config.verify.threshold_pct > 100 {
        return invalid("verify.threshold_pct must be between 0 and 100");
    }
    if config.import.timeout_secs == Some(0) {
        return invalid("import.timeout_secs must be positive when set");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config = parse_config_toml("").unwrap();
        assert_eq!(config, ImportConfig::default());
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn loads_config_file() {
        let tmp = std::env::temp_dir().join("traj_import_config_load_test");
        let _ = std::fs::remove_dir_all(&tmp);
        std::fs::create_dir_all(&tmp).unwrap();
        let path = tmp.join("import.toml");
        std::fs::write(
            &path,
            "[source]\ndir = \"/data/beijing\"\n\n[verify]\nthreshold_pct = 95\n",
        )
        .unwrap();

        let config = load(&path).unwrap();
        assert_eq!(config.source.dir, Path::new("/data/beijing"));
        assert_eq!(config.verify.threshold_pct, 95);

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn missing_file_is_read_error() {
        let err = load(Path::new("/nonexistent/traj_import/import.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn malformed_toml_is_parse_error() {
        let tmp = std::env::temp_dir().join("traj_import_config_parse_test");
        let _ = std::fs::remove_dir_all(&tmp);
        std::fs::create_dir_all(&tmp).unwrap();
        let path = tmp.join("import.toml");
        std::fs::write(&path, "[verify]\nthreshold_pct = \"lots\"\n").unwrap();

        let err = load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn rejects_threshold_above_100() {
        let mut config = ImportConfig::default();
        config.verify.threshold_pct = 101;
        assert!(matches!(
            validate(&config),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn rejects_empty_columns() {
        let mut config = ImportConfig::default();
        config.target.columns.clear();
        assert!(validate(&config).is_err());

        config.target.columns = vec!["fid".to_string(), " ".to_string()];
        assert!(validate(&config).is_err());
    }

    #[test]
    fn rejects_blank_container() {
        let mut config = ImportConfig::default();
        config.database.container = Some(String::new());
        assert!(validate(&config).is_err());

        config.database.container = None;
        assert!(validate(&config).is_ok());
    }
}
