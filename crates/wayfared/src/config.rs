use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use wayfare_core::{MatchThresholds, ThumbnailSpec};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("bad config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("{name} threshold must be a finite, non-negative distance, got {value}")]
    InvalidThreshold { name: &'static str, value: f32 },
    #[error("maybe threshold {maybe} is below strict threshold {strict}")]
    InvertedThresholds { strict: f32, maybe: f32 },
}

/// Daemon configuration.
///
/// Resolved from built-in defaults, then an optional TOML file named by
/// `WAYFARE_CONFIG`, then `WAYFARE_*` environment variables.
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Directory face thumbnails are written to.
    pub thumbnail_dir: PathBuf,
    pub thresholds: MatchThresholds,
    pub thumbnail: ThumbnailSpec,
}

/// Keys accepted in the TOML config file. All optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    db_path: Option<PathBuf>,
    thumbnail_dir: Option<PathBuf>,
    strict_threshold: Option<f32>,
    maybe_threshold: Option<f32>,
    min_face_height: Option<u32>,
    thumbnail_padding: Option<u32>,
    thumbnail_max_size: Option<u32>,
}

impl FileConfig {
    fn read(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl Config {
    /// Load configuration from the config file (if any) and the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        let file = match std::env::var("WAYFARE_CONFIG") {
            Ok(path) => {
                tracing::info!(path = %path, "reading config file");
                FileConfig::read(Path::new(&path))?
            }
            Err(_) => FileConfig::default(),
        };
        Self::resolve(file, |key| std::env::var(key).ok())
    }

    fn resolve(
        file: FileConfig,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let data_dir = env("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                let home = env("HOME").unwrap_or_else(|| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("wayfare");

        let defaults = MatchThresholds::default();
        let thresholds = MatchThresholds {
            strict: parsed(&env, "WAYFARE_STRICT_THRESHOLD")
                .or(file.strict_threshold)
                .unwrap_or(defaults.strict),
            maybe: parsed(&env, "WAYFARE_MAYBE_THRESHOLD")
                .or(file.maybe_threshold)
                .unwrap_or(defaults.maybe),
            min_face_height: parsed(&env, "WAYFARE_MIN_FACE_HEIGHT")
                .or(file.min_face_height)
                .unwrap_or(defaults.min_face_height),
        };
        for (name, value) in [("strict", thresholds.strict), ("maybe", thresholds.maybe)] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidThreshold { name, value });
            }
        }
        if thresholds.maybe < thresholds.strict {
            return Err(ConfigError::InvertedThresholds {
                strict: thresholds.strict,
                maybe: thresholds.maybe,
            });
        }

        let spec = ThumbnailSpec::default();
        let thumbnail = ThumbnailSpec {
            padding: parsed(&env, "WAYFARE_THUMBNAIL_PADDING")
                .or(file.thumbnail_padding)
                .unwrap_or(spec.padding),
            max_size: parsed(&env, "WAYFARE_THUMBNAIL_MAX_SIZE")
                .or(file.thumbnail_max_size)
                .unwrap_or(spec.max_size),
        };

        Ok(Self {
            db_path: env("WAYFARE_DB_PATH")
                .map(PathBuf::from)
                .or(file.db_path)
                .unwrap_or_else(|| data_dir.join("wayfare.db")),
            thumbnail_dir: env("WAYFARE_THUMBNAIL_DIR")
                .map(PathBuf::from)
                .or(file.thumbnail_dir)
                .unwrap_or_else(|| data_dir.join("faces")),
            thresholds,
            thumbnail,
        })
    }
}

fn parsed<T: std::str::FromStr>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = env(key)?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparsable setting");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config =
            Config::resolve(FileConfig::default(), env_of(&[("HOME", "/home/ana")])).unwrap();
        assert_eq!(config.db_path, PathBuf::from("/home/ana/.local/share/wayfare/wayfare.db"));
        assert_eq!(config.thumbnail_dir, PathBuf::from("/home/ana/.local/share/wayfare/faces"));
        assert_eq!(config.thresholds, MatchThresholds::default());
        assert_eq!(config.thumbnail, ThumbnailSpec { padding: 50, max_size: 200 });
    }

    #[test]
    fn test_env_overrides_file() {
        let file: FileConfig = toml::from_str(
            r#"
            db_path = "/srv/wayfare/file.db"
            strict_threshold = 0.4
            min_face_height = 60
            "#,
        )
        .unwrap();
        let config = Config::resolve(
            file,
            env_of(&[
                ("XDG_DATA_HOME", "/data"),
                ("WAYFARE_STRICT_THRESHOLD", "0.5"),
                ("WAYFARE_THUMBNAIL_MAX_SIZE", "128"),
            ]),
        )
        .unwrap();

        assert_eq!(config.db_path, PathBuf::from("/srv/wayfare/file.db"));
        assert_eq!(config.thumbnail_dir, PathBuf::from("/data/wayfare/faces"));
        assert_eq!(config.thresholds.strict, 0.5);
        assert_eq!(config.thresholds.min_face_height, 60);
        assert_eq!(config.thumbnail.max_size, 128);
    }

    #[test]
    fn test_unparsable_env_falls_back() {
        let config = Config::resolve(
            FileConfig::default(),
            env_of(&[("WAYFARE_MIN_FACE_HEIGHT", "tall")]),
        )
        .unwrap();
        assert_eq!(config.thresholds.min_face_height, 40);
    }

    #[test]
    fn test_inverted_thresholds_rejected() {
        let err = Config::resolve(
            FileConfig::default(),
            env_of(&[("WAYFARE_STRICT_THRESHOLD", "0.7")]),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvertedThresholds { .. }));
    }

    #[test]
    fn test_non_finite_or_negative_thresholds_rejected() {
        for (key, raw) in [
            ("WAYFARE_STRICT_THRESHOLD", "NaN"),
            ("WAYFARE_MAYBE_THRESHOLD", "inf"),
            ("WAYFARE_STRICT_THRESHOLD", "-0.1"),
        ] {
            let err = Config::resolve(FileConfig::default(), env_of(&[(key, raw)])).unwrap_err();
            assert!(matches!(err, ConfigError::InvalidThreshold { .. }), "{key}={raw}");
        }

        let file: FileConfig = toml::from_str("maybe_threshold = nan").unwrap();
        let err = Config::resolve(file, env_of(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidThreshold { name: "maybe", .. }));
    }

    #[test]
    fn test_unknown_file_key_rejected() {
        assert!(toml::from_str::<FileConfig>("tolerance = 0.5").is_err());
    }
}
