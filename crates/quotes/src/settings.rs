use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;
use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized},
};
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

use super::colors::{DEFAULT_NAME_COLOR_PALETTE, NameColor, parse_palette};
use super::error::QuoteResult;

pub const SETTINGS_DIRECTORY_NAME: &str = "quoteline";
pub const SETTINGS_FILE_NAME: &str = "settings.json";
pub const SETTINGS_ENV_PREFIX: &str = "QUOTELINE_";
pub const DEFAULT_DATABASE_RELATIVE_PATH: &str = ".quoteline/quoteline.db";
pub const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotelineSettings {
    #[serde(default = "default_database_path")]
    pub database_path: String,
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    #[serde(default = "default_name_color_palette")]
    pub name_color_palette: Vec<String>,
}

impl Default for QuotelineSettings {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            log_filter: default_log_filter(),
            name_color_palette: default_name_color_palette(),
        }
    }
}

impl QuotelineSettings {
    pub fn normalized(mut self) -> Self {
        self.database_path = if self.database_path.trim().is_empty() {
            default_database_path()
        } else {
            self.database_path.trim().to_string()
        };
        self.log_filter = if self.log_filter.trim().is_empty() {
            default_log_filter()
        } else {
            self.log_filter.trim().to_string()
        };

        // Blank rows are dropped; an emptied palette falls back to the defaults.
        self.name_color_palette = self
            .name_color_palette
            .into_iter()
            .map(|raw| raw.trim().to_string())
            .filter(|raw| !raw.is_empty())
            .collect();
        if self.name_color_palette.is_empty() {
            self.name_color_palette = default_name_color_palette();
        }

        self
    }

    pub fn name_colors(&self) -> QuoteResult<Vec<NameColor>> {
        parse_palette(&self.name_color_palette)
    }
}

pub struct SettingsStore {
    settings: ArcSwap<QuotelineSettings>,
    config_path: PathBuf,
}

impl SettingsStore {
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|path| path.join(SETTINGS_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(".quoteline"))
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join(SETTINGS_FILE_NAME)
    }

    pub fn new(config_path: PathBuf) -> Self {
        let settings = Self::load_from_disk(&config_path);
        Self {
            settings: ArcSwap::from_pointee(settings),
            config_path,
        }
    }

    pub fn load() -> Self {
        Self::new(Self::default_config_path())
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn settings(&self) -> Arc<QuotelineSettings> {
        self.settings.load_full()
    }

    /// Re-reads the settings file and environment, publishing the result.
    pub fn reload(&self) -> Arc<QuotelineSettings> {
        let settings = Arc::new(Self::load_from_disk(&self.config_path));
        self.settings.store(Arc::clone(&settings));
        settings
    }

    /// Defaults, then the JSON file (if present), then `QUOTELINE_*` variables.
    pub fn try_load_from(path: &Path) -> Result<QuotelineSettings, SettingsError> {
        let figment = Figment::from(Serialized::defaults(QuotelineSettings::default()))
            .merge(Json::file(path))
            .merge(Env::prefixed(SETTINGS_ENV_PREFIX));

        figment
            .extract::<QuotelineSettings>()
            .map(QuotelineSettings::normalized)
            .context(ExtractSnafu {
                stage: "extract-settings",
                path: path.to_path_buf(),
            })
    }

    fn load_from_disk(path: &Path) -> QuotelineSettings {
        if !path.exists() {
            tracing::info!("settings file not found at {:?}, using defaults", path);
        }

        match Self::try_load_from(path) {
            Ok(settings) => settings,
            Err(error) => {
                tracing::warn!("{error}. using defaults");
                QuotelineSettings::default()
            }
        }
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SettingsError {
    #[snafu(display("failed to load settings from {path:?} on `{stage}`: {source}"))]
    Extract {
        stage: &'static str,
        path: PathBuf,
        source: figment::Error,
    },
}

fn default_database_path() -> String {
    DEFAULT_DATABASE_RELATIVE_PATH.to_string()
}

fn default_log_filter() -> String {
    DEFAULT_LOG_FILTER.to_string()
}

fn default_name_color_palette() -> Vec<String> {
    DEFAULT_NAME_COLOR_PALETTE
        .iter()
        .map(|raw| raw.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use figment::Jail;

    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        Jail::expect_with(|_jail| {
            let settings = SettingsStore::try_load_from(Path::new("absent.json"))
                .expect("defaults extract");
            assert_eq!(settings, QuotelineSettings::default());
            Ok(())
        });
    }

    #[test]
    fn file_overrides_defaults_and_env_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "settings.json",
                r##"{
                    "database_path": "  data/threads.db ",
                    "log_filter": "debug",
                    "name_color_palette": ["#112233", " ", "#445566"]
                }"##,
            )?;
            jail.set_env("QUOTELINE_LOG_FILTER", "quoteline=trace");

            let settings = SettingsStore::try_load_from(Path::new("settings.json"))
                .expect("settings extract");
            assert_eq!(settings.database_path, "data/threads.db");
            assert_eq!(settings.log_filter, "quoteline=trace");
            assert_eq!(settings.name_color_palette, vec!["#112233", "#445566"]);
            assert_eq!(
                settings.name_colors().expect("palette"),
                vec![NameColor::from_rgb(0x112233), NameColor::from_rgb(0x445566)]
            );
            Ok(())
        });
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file("settings.json", "{ not json")?;

            assert!(SettingsStore::try_load_from(Path::new("settings.json")).is_err());
            let store = SettingsStore::new(PathBuf::from("settings.json"));
            assert_eq!(*store.settings(), QuotelineSettings::default());
            Ok(())
        });
    }

    #[test]
    fn reload_publishes_new_file_contents() {
        Jail::expect_with(|jail| {
            let store = SettingsStore::new(PathBuf::from("settings.json"));
            assert_eq!(store.settings().log_filter, DEFAULT_LOG_FILTER);

            jail.create_file("settings.json", r#"{ "log_filter": "warn" }"#)?;
            assert_eq!(store.reload().log_filter, "warn");
            assert_eq!(store.settings().log_filter, "warn");
            Ok(())
        });
    }
}
