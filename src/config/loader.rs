//! Generic configuration loader for reading sections of a YAML file.

use config::{Config, File, FileFormat};
use serde::de::DeserializeOwned;
use std::{fs, path::PathBuf};
use thiserror::Error;

use super::ConfigurationError;

/// A generic loader for YAML files.
pub struct ConfigLoader {
    path: PathBuf,
}

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum LoaderError {
    /// The file could not be read.
    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    /// The file is not valid YAML or does not match the expected shape.
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] config::ConfigError),

    /// The file extension is not `.yaml` or `.yml`.
    #[error("Unsupported configuration format")]
    UnsupportedFormat,

    /// The content parsed but describes an invalid component.
    #[error("Invalid configuration: {0}")]
    Invalid(#[from] ConfigurationError),
}

impl ConfigLoader {
    /// Creates a new `ConfigLoader`.
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn read(&self) -> Result<Config, LoaderError> {
        if !self.is_yaml_file() {
            return Err(LoaderError::UnsupportedFormat);
        }
        let config_str = fs::read_to_string(&self.path)?;
        Ok(Config::builder().add_source(File::from_str(&config_str, FileFormat::Yaml)).build()?)
    }

    /// Loads the list stored under the top-level `key`.
    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Vec<T>, LoaderError> {
        Ok(self.read()?.get(key)?)
    }

    /// Loads the value stored under `key`, or `None` when the key is absent.
    pub fn load_optional<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, LoaderError> {
        match self.read()?.get(key) {
            Ok(value) => Ok(Some(value)),
            Err(config::ConfigError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Checks if the file has a YAML extension.
    fn is_yaml_file(&self) -> bool {
        matches!(self.path.extension().and_then(|ext| ext.to_str()), Some("yaml") | Some("yml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, Deserialize, PartialEq)]
    struct TestItem {
        name: String,
        value: i32,
    }

    fn write(dir: &TempDir, filename: &str, content: &str) -> PathBuf {
        let path = dir.path().join(filename);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_load_list() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "items.yaml", "items:\n  - name: A\n    value: 1\n  - name: B\n    value: 2\n");

        let items: Vec<TestItem> = ConfigLoader::new(path).load("items").unwrap();

        assert_eq!(items, vec![
            TestItem { name: "A".into(), value: 1 },
            TestItem { name: "B".into(), value: 2 }
        ]);
    }

    #[test]
    fn test_load_optional_missing_key() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "items.yml", "items: []\n");

        let missing: Option<TestItem> = ConfigLoader::new(path).load_optional("defaults").unwrap();

        assert!(missing.is_none());
    }

    #[test]
    fn test_rejects_non_yaml_extension() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "items.json", "{}");

        let result: Result<Vec<TestItem>, _> = ConfigLoader::new(path).load("items");

        assert!(matches!(result, Err(LoaderError::UnsupportedFormat)));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result: Result<Vec<TestItem>, _> =
            ConfigLoader::new(PathBuf::from("/nonexistent/monitors.yaml")).load("monitors");

        assert!(matches!(result, Err(LoaderError::IoError(_))));
    }
}
