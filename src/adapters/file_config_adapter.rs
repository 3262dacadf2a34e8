//! INI file configuration adapter.

use crate::domain::error::PortoptError;
use crate::ports::config_port::ConfigPort;
use configparser::ini::Ini;
use std::path::Path;

#[derive(Debug)]
pub struct FileConfigAdapter {
    config: Ini,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, PortoptError> {
        let path = path.as_ref();
        let mut config = Ini::new();
        config.load(path).map_err(|reason| PortoptError::ConfigParse {
            file: path.display().to_string(),
            reason,
        })?;
        Ok(Self { config })
    }

    pub fn from_string(content: &str) -> Result<Self, PortoptError> {
        let mut config = Ini::new();
        config
            .read(content.to_string())
            .map_err(|reason| PortoptError::ConfigParse {
                file: "<string>".to_string(),
                reason,
            })?;
        Ok(Self { config })
    }

    fn parse_bool(value: &str) -> Option<bool> {
        match value.to_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        }
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.config.get(section, key)
    }

    fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        self.config
            .getint(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_double(&self, section: &str, key: &str, default: f64) -> f64 {
        self.config
            .getfloat(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        self.config
            .get(section, key)
            .as_ref()
            .and_then(|v| Self::parse_bool(v))
            .unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn reads_every_section() {
        let content = r#"
[data]
source = csv
path = ./market

[optimizer]
iterations = 10000
min_weight = 0.05

[risk_free]
1M = 0.015
"#;
        let adapter = FileConfigAdapter::from_string(content).unwrap();
        assert_eq!(adapter.get_string("data", "source"), Some("csv".to_string()));
        assert_eq!(adapter.get_int("optimizer", "iterations", 0), 10000);
        assert_eq!(adapter.get_double("optimizer", "min_weight", 0.0), 0.05);
        assert_eq!(adapter.get_double("risk_free", "1M", 0.0), 0.015);
    }

    #[test]
    fn missing_keys_fall_back() {
        let adapter = FileConfigAdapter::from_string("[optimizer]\n").unwrap();
        assert_eq!(adapter.get_string("optimizer", "seed"), None);
        assert_eq!(adapter.get_int("optimizer", "iterations", 42), 42);
        assert_eq!(adapter.get_double("metrics", "ewma_lambda", 0.94), 0.94);
        assert!(adapter.get_bool("data", "strict", true));
    }

    #[test]
    fn non_numeric_values_fall_back() {
        let adapter =
            FileConfigAdapter::from_string("[optimizer]\niterations = many\nmax_weight = half\n")
                .unwrap();
        assert_eq!(adapter.get_int("optimizer", "iterations", 7), 7);
        assert_eq!(adapter.get_double("optimizer", "max_weight", 0.4), 0.4);
    }

    #[test]
    fn bool_spellings() {
        let adapter =
            FileConfigAdapter::from_string("[x]\na = yes\nb = 0\nc = maybe\n").unwrap();
        assert!(adapter.get_bool("x", "a", false));
        assert!(!adapter.get_bool("x", "b", true));
        assert!(adapter.get_bool("x", "c", true));
    }

    #[test]
    fn from_file_reads_config() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "[sqlite]\npath = /tmp/prices.db\n").unwrap();
        let adapter = FileConfigAdapter::from_file(file.path()).unwrap();
        assert_eq!(
            adapter.get_string("sqlite", "path"),
            Some("/tmp/prices.db".to_string())
        );
    }

    #[test]
    fn missing_file_is_config_parse_error() {
        let err = FileConfigAdapter::from_file("/nonexistent/path/portopt.ini")
            .err()
            .unwrap();
        assert!(matches!(err, PortoptError::ConfigParse { .. }));
    }
}
