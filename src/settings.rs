use ::config::{Config, Environment, File, FileFormat};
use dirs_next::{cache_dir, config_dir, data_dir};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::error::{Error, Result};
use crate::types::Translation;

const APP_DIR: &str = "anidesk";
const ENV_PREFIX: &str = "ANIDESK";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub quality: String,
    pub mode: Translation,
    /// Exported to ani-cli as `ANI_CLI_PLAYER` when non-empty.
    pub player: String,
    pub ani_cli: String,
    pub cache_dir: Option<PathBuf>,
    pub store_path: Option<PathBuf>,
    pub api_timeout_secs: u64,
    pub jikan_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            quality: "best".to_string(),
            mode: Translation::Sub,
            player: "mpv".to_string(),
            ani_cli: "ani-cli".to_string(),
            cache_dir: None,
            store_path: None,
            api_timeout_secs: 20,
            jikan_timeout_secs: 10,
        }
    }
}

impl Settings {
    /// Defaults, then the TOML file (if any), then `ANIDESK_*` variables.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let file = file.map(Path::to_path_buf).or_else(default_config_path);
        let mut builder = Config::builder().add_source(Config::try_from(&Settings::default())?);
        if let Some(path) = &file {
            builder = builder.add_source(
                File::from(path.as_path())
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }
        let settings = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }

    pub fn write_defaults(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let body = toml::to_string_pretty(&Settings::default())
            .map_err(|err| Error::Config(err.to_string()))?;
        fs::write(path, body)?;
        Ok(())
    }

    pub fn thumbnail_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.cache_dir {
            return Ok(dir.clone());
        }
        let base = cache_dir()
            .ok_or_else(|| Error::Config("could not determine cache directory".into()))?;
        Ok(base.join(APP_DIR).join("thumbnails"))
    }

    pub fn store_file(&self) -> Result<PathBuf> {
        if let Some(path) = &self.store_path {
            return Ok(path.clone());
        }
        let base =
            data_dir().ok_or_else(|| Error::Config("could not determine data directory".into()))?;
        Ok(base.join(APP_DIR).join("store.json"))
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs.max(1))
    }

    pub fn jikan_timeout(&self) -> Duration {
        Duration::from_secs(self.jikan_timeout_secs.max(1))
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    config_dir().map(|base| base.join(APP_DIR).join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_survive_a_missing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let settings = Settings::load(Some(&tmp.path().join("absent.toml"))).unwrap();
        assert_eq!(settings.quality, "best");
        assert_eq!(settings.mode, Translation::Sub);
        assert_eq!(settings.api_timeout(), Duration::from_secs(20));
    }

    #[test]
    fn file_values_override_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        fs::write(
            &path,
            "quality = \"720p\"\nmode = \"dub\"\ncache_dir = \"/tmp/thumbs\"\n",
        )
        .unwrap();

        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(settings.quality, "720p");
        assert_eq!(settings.mode, Translation::Dub);
        assert_eq!(settings.player, "mpv");
        assert_eq!(settings.thumbnail_dir().unwrap(), PathBuf::from("/tmp/thumbs"));
    }

    #[test]
    fn written_defaults_load_back() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("config.toml");
        Settings::write_defaults(&path).unwrap();
        assert_eq!(Settings::load(Some(&path)).unwrap(), Settings::default());
    }
}
