use anyhow::{bail, Context, Result};
use rollcall_core::{FaceSelector, MatchConfig, MatchPolicy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

const CONFIG_FILE_NAME: &str = "rollcall.toml";

/// Resolved CLI configuration.
///
/// Precedence: `ROLLCALL_*` environment variables, then the TOML file, then
/// built-in defaults.
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    pub data_dir: PathBuf,
    /// CSV of enrolled embeddings.
    pub store_path: PathBuf,
    /// Directory of `Attendance_<DD-MM-YYYY>.csv` ledgers.
    pub attendance_dir: PathBuf,
    /// `<person>/<image>` tree consumed by `train`.
    pub training_dir: PathBuf,
    /// Directory containing the ONNX model files.
    pub model_dir: PathBuf,
    pub matching: MatchConfig,
    /// Config file that was applied, if any.
    pub source: Option<PathBuf>,
}

/// Optional overrides read from `rollcall.toml`.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    data_dir: Option<PathBuf>,
    store_path: Option<PathBuf>,
    attendance_dir: Option<PathBuf>,
    training_dir: Option<PathBuf>,
    model_dir: Option<PathBuf>,
    tolerance: Option<f32>,
    match_policy: Option<MatchPolicy>,
    face_selector: Option<FaceSelector>,
}

impl Config {
    /// Load from the process environment.
    pub fn load() -> Result<Self> {
        Self::resolve(|key| std::env::var(key).ok())
    }

    fn resolve(env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let env_path = |key: &str| env(key).filter(|v| !v.is_empty()).map(PathBuf::from);

        let explicit_file = env_path("ROLLCALL_CONFIG");
        let base_dir = env_path("ROLLCALL_DATA_DIR").unwrap_or_else(|| default_data_dir(&env));
        let file_path = explicit_file.clone().unwrap_or_else(|| base_dir.join(CONFIG_FILE_NAME));

        let (file, source) = if file_path.exists() {
            (read_file(&file_path)?, Some(file_path))
        } else if explicit_file.is_some() {
            bail!("config file {} does not exist", file_path.display());
        } else {
            (FileConfig::default(), None)
        };

        let data_dir = env_path("ROLLCALL_DATA_DIR")
            .or(file.data_dir)
            .unwrap_or(base_dir);

        let defaults = MatchConfig::default();
        let matching = MatchConfig {
            tolerance: env_parse(&env, "ROLLCALL_TOLERANCE")
                .or(file.tolerance)
                .unwrap_or(defaults.tolerance),
            policy: env_parse(&env, "ROLLCALL_MATCH_POLICY")
                .or(file.match_policy)
                .unwrap_or(defaults.policy),
            selector: env_parse(&env, "ROLLCALL_FACE_SELECTOR")
                .or(file.face_selector)
                .unwrap_or(defaults.selector),
        };
        if !matching.tolerance.is_finite() || matching.tolerance <= 0.0 {
            bail!("tolerance must be a positive number, got {}", matching.tolerance);
        }

        Ok(Self {
            store_path: env_path("ROLLCALL_STORE_PATH")
                .or(file.store_path)
                .unwrap_or_else(|| data_dir.join("known_encodings.csv")),
            attendance_dir: env_path("ROLLCALL_ATTENDANCE_DIR")
                .or(file.attendance_dir)
                .unwrap_or_else(|| data_dir.join("Attendance")),
            training_dir: env_path("ROLLCALL_TRAINING_DIR")
                .or(file.training_dir)
                .unwrap_or_else(|| data_dir.join("Training_Images")),
            model_dir: env_path("ROLLCALL_MODEL_DIR")
                .or(file.model_dir)
                .unwrap_or_else(|| data_dir.join("models")),
            data_dir,
            matching,
            source,
        })
    }
}

fn read_file(path: &Path) -> Result<FileConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("parsing config file {}", path.display()))
}

/// `$XDG_DATA_HOME/rollcall`, else `~/.local/share/rollcall`.
fn default_data_dir(env: &impl Fn(&str) -> Option<String>) -> PathBuf {
    env("XDG_DATA_HOME")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            let home = env("HOME").unwrap_or_else(|| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("rollcall")
}

fn env_parse<T>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = env(key)?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(key, value = %raw, error = %e, "ignoring invalid environment override");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::resolve(env_of(&[("HOME", "/home/ana")])).unwrap();
        let data = PathBuf::from("/home/ana/.local/share/rollcall");
        assert_eq!(config.data_dir, data);
        assert_eq!(config.store_path, data.join("known_encodings.csv"));
        assert_eq!(config.attendance_dir, data.join("Attendance"));
        assert_eq!(config.training_dir, data.join("Training_Images"));
        assert_eq!(config.model_dir, data.join("models"));
        assert_eq!(config.matching, MatchConfig::default());
        assert!(config.source.is_none());
    }

    #[test]
    fn test_xdg_data_home() {
        let config = Config::resolve(env_of(&[("XDG_DATA_HOME", "/xdg"), ("HOME", "/h")])).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/xdg/rollcall"));
    }

    #[test]
    fn test_file_overrides_defaults_and_env_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            r#"
tolerance = 0.45
match_policy = "nearest-neighbor"
face_selector = "largest"
attendance_dir = "/srv/attendance"
"#,
        )
        .unwrap();
        let data_dir = dir.path().to_string_lossy().into_owned();

        let config = Config::resolve(env_of(&[
            ("ROLLCALL_DATA_DIR", &data_dir),
            ("ROLLCALL_TOLERANCE", "0.5"),
        ]))
        .unwrap();

        assert_eq!(config.matching.tolerance, 0.5);
        assert_eq!(config.matching.policy, MatchPolicy::NearestNeighbor);
        assert_eq!(config.matching.selector, FaceSelector::Largest);
        assert_eq!(config.attendance_dir, PathBuf::from("/srv/attendance"));
        assert_eq!(config.store_path, dir.path().join("known_encodings.csv"));
        assert_eq!(config.source, Some(dir.path().join(CONFIG_FILE_NAME)));
    }

    #[test]
    fn test_invalid_env_value_falls_back() {
        let config = Config::resolve(env_of(&[
            ("HOME", "/h"),
            ("ROLLCALL_MATCH_POLICY", "best-guess"),
        ]))
        .unwrap();
        assert_eq!(config.matching.policy, MatchPolicy::FirstMatch);
    }

    #[test]
    fn test_non_positive_tolerance_rejected() {
        assert!(Config::resolve(env_of(&[("HOME", "/h"), ("ROLLCALL_TOLERANCE", "0")])).is_err());
    }

    #[test]
    fn test_missing_explicit_config_file_is_an_error() {
        let err = Config::resolve(env_of(&[
            ("HOME", "/h"),
            ("ROLLCALL_CONFIG", "/definitely/not/here.toml"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_unknown_file_key_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "tolerence = 0.5\n").unwrap();
        let path = path.to_string_lossy().into_owned();

        assert!(Config::resolve(env_of(&[("HOME", "/h"), ("ROLLCALL_CONFIG", &path)])).is_err());
    }
}
