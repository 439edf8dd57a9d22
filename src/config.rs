use hex_color::HexColor;
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
};

const CONFIG_PATH: &str = "~/.config/wswitch/config.toml";

#[derive(Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BackendChoice {
    #[default]
    Auto,
    Hyprland,
    Wlr,
}

/// Which windows the Hyprland backend folds into a single entry.
#[derive(Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GroupBy {
    #[default]
    None,
    Class,
    WorkspaceClass,
}

#[derive(Deserialize, Clone, Debug)]
pub struct Appearance {
    #[serde(default = "default_background_color")]
    pub background_color: HexColor,
    #[serde(default = "default_tile_color")]
    pub tile_color: HexColor,
    #[serde(default = "default_selected_color")]
    pub selected_color: HexColor,
    #[serde(default = "default_accent_color")]
    pub accent_color: HexColor,
    #[serde(default = "default_tile_size")]
    pub tile_size: u32,
    #[serde(default = "default_padding")]
    pub padding: u32,
    #[serde(default = "default_max_columns")]
    pub max_columns: u32,
}

fn default_background_color() -> HexColor {
    HexColor::rgba(30, 30, 46, 235)
}

fn default_tile_color() -> HexColor {
    HexColor::rgb(49, 50, 68)
}

fn default_selected_color() -> HexColor {
    HexColor::rgb(250, 179, 135)
}

fn default_accent_color() -> HexColor {
    HexColor::rgb(205, 214, 244)
}

fn default_tile_size() -> u32 {
    96
}

fn default_padding() -> u32 {
    16
}

fn default_max_columns() -> u32 {
    6
}

impl Default for Appearance {
    fn default() -> Self {
        Self {
            background_color: default_background_color(),
            tile_color: default_tile_color(),
            selected_color: default_selected_color(),
            accent_color: default_accent_color(),
            tile_size: default_tile_size(),
            padding: default_padding(),
            max_columns: default_max_columns(),
        }
    }
}

#[derive(Deserialize, Clone, Debug)]
pub struct Config {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub backend: BackendChoice,
    /// Destroy the overlay on hide so it reappears on the focused monitor.
    #[serde(default)]
    pub follow_monitor: bool,
    #[serde(default)]
    pub group_by: GroupBy,
    #[serde(default = "default_show_group_count")]
    pub show_group_count: bool,
    #[serde(default = "default_icon_theme")]
    pub icon_theme: String,
    #[serde(default = "default_icon_fallback")]
    pub icon_fallback: String,
    #[serde(default)]
    pub appearance: Appearance,
}

fn default_log_level() -> String {
    "info".to_owned()
}

fn default_show_group_count() -> bool {
    true
}

fn default_icon_theme() -> String {
    "Papirus".to_owned()
}

fn default_icon_fallback() -> String {
    "hicolor".to_owned()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            backend: BackendChoice::default(),
            follow_monitor: false,
            group_by: GroupBy::default(),
            show_group_count: default_show_group_count(),
            icon_theme: default_icon_theme(),
            icon_fallback: default_icon_fallback(),
            appearance: Appearance::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    Read(PathBuf, std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from(shellexpand::tilde(CONFIG_PATH).as_ref())
}

/// Reads the config at `path`; a missing file yields the defaults.
pub fn read_config(path: &Path) -> Result<Config, ConfigError> {
    match fs::read_to_string(path) {
        Ok(content) => {
            log::info!("Reading config file {path:?}");
            parse_config(&content)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::info!("No config file at {path:?}, using defaults");
            Ok(Config::default())
        }
        Err(e) => Err(ConfigError::Read(path.to_path_buf(), e)),
    }
}

pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    Ok(toml::from_str(content)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.backend, BackendChoice::Auto);
        assert_eq!(config.group_by, GroupBy::None);
        assert!(!config.follow_monitor);
        assert!(config.show_group_count);
        assert_eq!(config.appearance.tile_size, 96);
    }

    #[test]
    fn parses_options() {
        let config = parse_config(
            r##"
            log_level = "debug"
            backend = "wlr"
            follow_monitor = true
            group_by = "workspace_class"
            show_group_count = false
            icon_theme = "Adwaita"

            [appearance]
            selected_color = "#89b4fa"
            tile_size = 64
            "##,
        )
        .unwrap();

        assert_eq!(config.log_level, "debug");
        assert_eq!(config.backend, BackendChoice::Wlr);
        assert!(config.follow_monitor);
        assert_eq!(config.group_by, GroupBy::WorkspaceClass);
        assert!(!config.show_group_count);
        assert_eq!(config.icon_theme, "Adwaita");
        assert_eq!(config.icon_fallback, "hicolor");
        assert_eq!(config.appearance.selected_color, HexColor::rgb(0x89, 0xb4, 0xfa));
        assert_eq!(config.appearance.tile_size, 64);
        assert_eq!(config.appearance.padding, 16);
    }

    #[test]
    fn rejects_unknown_grouping() {
        assert!(matches!(
            parse_config(r#"group_by = "monitor""#),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = read_config(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn invalid_file_reports_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "follow_monitor = \"yes please\"").unwrap();
        assert!(matches!(read_config(&path), Err(ConfigError::Parse(_))));
    }
}
