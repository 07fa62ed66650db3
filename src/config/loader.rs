//! Configuration loading from disk.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::schema::RouterConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Why a config file was refused.
#[derive(Debug)]
pub enum ConfigError {
    /// The file could not be read at all.
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The file is not valid TOML for the router schema.
    Toml {
        path: PathBuf,
        source: toml::de::Error,
    },
    /// The file parsed but violates a semantic rule (queue naming, message
    /// geometry, dispatch tuning).
    Invalid(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "cannot read config {}: {}", path.display(), source)
            }
            ConfigError::Toml { path, source } => {
                write!(f, "config {} is not valid TOML: {}", path.display(), source)
            }
            ConfigError::Invalid(errors) => {
                write!(f, "config rejected ({} problem(s))", errors.len())?;
                for err in errors {
                    write!(f, "; {}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Toml { source, .. } => Some(source),
            ConfigError::Invalid(_) => None,
        }
    }
}

/// Read a TOML config file and check it against the semantic rules in
/// [`validation`](crate::config::validation). Both binaries accept the same
/// file; each reads only the sections it cares about.
pub fn load_config(path: &Path) -> Result<RouterConfig, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let config: RouterConfig = toml::from_str(&raw).map_err(|source| ConfigError::Toml {
        path: path.to_path_buf(),
        source,
    })?;

    validate_config(&config).map_err(ConfigError::Invalid)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_a_valid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[listener]\nhost = \"127.0.0.1\"\nport = 6001\n\n[dispatch]\nworkers = 4\n"
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.listener.host, "127.0.0.1");
        assert_eq!(config.listener.port, 6001);
        assert_eq!(config.dispatch.workers, 4);
    }

    #[test]
    fn missing_file_reports_the_path() {
        let err = load_config(Path::new("/nonexistent/router.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
        assert!(err.to_string().contains("/nonexistent/router.toml"));
    }

    #[test]
    fn invalid_toml_is_a_syntax_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[listener\nport = ").unwrap();

        assert!(matches!(
            load_config(file.path()),
            Err(ConfigError::Toml { .. })
        ));
    }

    #[test]
    fn semantic_violations_surface_every_problem() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[ipc]\nrequest_queue = \"no-leading-slash\"\nmax_messages = 0\n"
        )
        .unwrap();

        match load_config(file.path()) {
            Err(ConfigError::Invalid(errors)) => {
                assert_eq!(errors.len(), 2);
                assert!(errors.iter().any(|e| e.0.contains("/name")));
                assert!(errors.iter().any(|e| e.0.contains("max_messages")));
            }
            other => panic!("expected validation failure, got {other:?}"),
        }
    }
}
