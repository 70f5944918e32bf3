// ⚙️ Settings - embedded defaults, then an optional TOML file, then the environment
//
// Environment variables use the EXPENSES_ prefix; nested keys use `__`
// (EXPENSES_SERVER__BIND). Settings::defaults() reads neither the filesystem
// nor the environment.

use serde::Deserialize;
use std::path::{Path, PathBuf};

const DEFAULT_CONFIG: &str = r#"
data_file        = "expenses.csv"
report_file      = "expense_report.csv"
currency_symbol  = "₹"
spike_multiplier = 2.0

[server]
bind = "0.0.0.0:3000"
"#;

/// File picked up from the working directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "expense-dashboard.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Backing CSV file of the expense store.
    pub data_file: PathBuf,
    /// Where "download report" writes the filtered subset.
    pub report_file: PathBuf,
    pub currency_symbol: String,
    pub spike_multiplier: f64,
    #[serde(default)]
    pub server: ServerSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub bind: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        ServerSettings {
            bind: "0.0.0.0:3000".to_string(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::defaults()
    }
}

impl Settings {
    /// Defaults, then `path` (or `./expense-dashboard.toml` if it exists),
    /// then the environment.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(DEFAULT_CONFIG, config::FileFormat::Toml));

        builder = match path {
            Some(p) => builder.add_source(config::File::from(p).required(true)),
            None => builder.add_source(config::File::from(Path::new(DEFAULT_CONFIG_FILE)).required(false)),
        };

        builder
            .add_source(
                config::Environment::with_prefix("EXPENSES")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()
            .map_err(Into::into)
    }

    /// Return the built-in defaults without touching the filesystem.
    pub fn defaults() -> Self {
        config::Config::builder()
            .add_source(config::File::from_str(DEFAULT_CONFIG, config::FileFormat::Toml))
            .build()
            .expect("built-in default config must be valid TOML")
            .try_deserialize()
            .expect("built-in default config must deserialize correctly")
    }

    /// Builder: point the store at a different file
    pub fn with_data_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_file = path.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_load() {
        let settings = Settings::defaults();

        assert_eq!(settings.data_file, PathBuf::from("expenses.csv"));
        assert_eq!(settings.report_file, PathBuf::from("expense_report.csv"));
        assert_eq!(settings.currency_symbol, "₹");
        assert_eq!(settings.spike_multiplier, 2.0);
        assert_eq!(settings.server.bind, "0.0.0.0:3000");
    }

    #[test]
    fn test_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "data_file = \"/tmp/site-expenses.csv\"").unwrap();
        writeln!(file, "spike_multiplier = 3.0").unwrap();
        file.flush().unwrap();

        let settings = Settings::load(Some(file.path())).unwrap();

        assert_eq!(settings.data_file, PathBuf::from("/tmp/site-expenses.csv"));
        assert_eq!(settings.spike_multiplier, 3.0);
        assert_eq!(settings.currency_symbol, "₹");
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        assert!(Settings::load(Some(Path::new("/no/such/config.toml"))).is_err());
    }

    #[test]
    fn test_with_data_file() {
        let settings = Settings::defaults().with_data_file("other.csv");
        assert_eq!(settings.data_file, PathBuf::from("other.csv"));
    }
}
