use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use anyhow::{Result, anyhow};

use crate::theme::Theme;

/// The two persisted client settings: UI theme and cached display name.
/// Everything else is session state and resets on launch.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Config {
    pub theme: Option<String>,
    pub display_name: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(Self::config_path()?)
    }

    pub fn load_from(path: PathBuf) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(Self::config_path()?)
    }

    pub fn save_to(&self, path: PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        fs::write(&path, content)?;
        Ok(())
    }

    /// Unknown or missing theme names fall back to the default.
    pub fn resolved_theme(&self) -> Theme {
        self.theme
            .as_deref()
            .and_then(Theme::from_str)
            .unwrap_or_default()
    }

    pub fn save_theme(theme: Theme) -> Result<()> {
        let mut config = Self::load().unwrap_or_default();
        config.theme = Some(theme.as_str().to_string());
        config.save()
    }

    pub fn save_display_name(name: &str) -> Result<()> {
        let mut config = Self::load().unwrap_or_default();
        config.display_name = Some(name.to_string());
        config.save()
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("companion").join("config.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::theme::Theme;

    #[test]
    fn round_trips_theme_and_display_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let config = Config {
            theme: Some("midnight".to_string()),
            display_name: Some("Ada".to_string()),
        };
        config.save_to(path.clone()).unwrap();

        let loaded = Config::load_from(path).unwrap();
        assert_eq!(loaded.resolved_theme(), Theme::Midnight);
        assert_eq!(loaded.display_name.as_deref(), Some("Ada"));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = Config::load_from(dir.path().join("nope.json")).unwrap();
        assert_eq!(loaded.resolved_theme(), Theme::Dark);
        assert!(loaded.display_name.is_none());
    }

    #[test]
    fn unknown_theme_falls_back_to_default() {
        let config = Config {
            theme: Some("solarized".to_string()),
            display_name: None,
        };
        assert_eq!(config.resolved_theme(), Theme::Dark);
    }
}
