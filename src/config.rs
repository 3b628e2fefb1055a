use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// User whose cards are reviewed when none is given (default: "default")
    #[serde(default = "default_user")]
    pub default_user: String,

    /// Interval in days from which a card counts as mastered (default: 21)
    #[serde(default = "default_mastered_interval_days")]
    pub mastered_interval_days: u32,

    /// Log filter used when RUST_LOG is unset (default: "phrasedeck=info")
    #[serde(default = "default_log_filter")]
    pub log_filter: String,

    /// Path to database file
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Directory for log files
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
}

fn default_user() -> String {
    "default".to_string()
}

fn default_mastered_interval_days() -> u32 {
    21
}

fn default_log_filter() -> String {
    "phrasedeck=info".to_string()
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .map(|p| p.join("phrasedeck").join("phrasedeck.db"))
        .unwrap_or_else(|| PathBuf::from("phrasedeck.db"))
}

fn default_log_dir() -> PathBuf {
    dirs::data_dir()
        .map(|p| p.join("phrasedeck").join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"))
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_user: default_user(),
            mastered_interval_days: default_mastered_interval_days(),
            log_filter: default_log_filter(),
            db_path: default_db_path(),
            log_dir: default_log_dir(),
        }
    }
}

fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(suffix) = path.strip_prefix("~")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(suffix);
    }
    path.to_path_buf()
}

impl Config {
    /// Load config from the default location or return defaults
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load config from `path`, falling back to defaults if it does not exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))?;
        config.db_path = expand_tilde(&config.db_path);
        config.log_dir = expand_tilde(&config.log_dir);
        Ok(config)
    }

    /// Path to config file
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .map(|p| p.join("phrasedeck").join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("config.toml"))
    }

    /// Ensure required directories exist
    pub fn ensure_dirs(&self) -> Result<()> {
        if let Some(parent) = self.db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::create_dir_all(&self.log_dir)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_missing_file_gives_defaults() {
        let config = Config::load_from(Path::new("/nonexistent/phrasedeck.toml")).unwrap();
        assert_eq!(config.default_user, "default");
        assert_eq!(config.mastered_interval_days, 21);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = NamedTempFile::with_suffix(".toml").unwrap();
        writeln!(file, "default_user = \"ana\"").unwrap();
        writeln!(file, "db_path = \"/tmp/cards.db\"").unwrap();

        let config = Config::load_from(file.path()).unwrap();
        assert_eq!(config.default_user, "ana");
        assert_eq!(config.db_path, PathBuf::from("/tmp/cards.db"));
        assert_eq!(config.log_filter, "phrasedeck=info");
    }

    #[test]
    fn test_tilde_expansion() {
        let Some(home) = dirs::home_dir() else {
            return;
        };
        let mut file = NamedTempFile::with_suffix(".toml").unwrap();
        writeln!(file, "db_path = \"~/cards/phrasedeck.db\"").unwrap();

        let config = Config::load_from(file.path()).unwrap();
        assert_eq!(config.db_path, home.join("cards/phrasedeck.db"));
    }

    #[test]
    fn test_bad_toml_is_reported() {
        let mut file = NamedTempFile::with_suffix(".toml").unwrap();
        writeln!(file, "mastered_interval_days = \"many\"").unwrap();

        let err = Config::load_from(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config"));
    }
}
