//! Runtime configuration.
//!
//! Layered once at startup: built-in defaults, then an optional TOML file,
//! then `ATTENDANCE_*` environment variables.

use crate::matcher::DEFAULT_TOLERANCE;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

const DEFAULT_CONFIG_FILE: &str = "attendance.toml";
const DEFAULT_FRAME_SKIP: u32 = 2;
const DEFAULT_ENROLL_ATTEMPTS: usize = 30;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Runtime configuration, built once at startup and passed to each component.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Directory holding the gallery and ledger files.
    pub data_dir: PathBuf,
    /// Path to the enrolled-faces gallery (JSON).
    pub gallery_path: PathBuf,
    /// Path to the attendance ledger (CSV).
    pub ledger_path: PathBuf,
    /// Maximum encoding distance for a positive match. Lower is stricter.
    pub tolerance: f32,
    /// Process every Nth frame; always at least 1.
    pub frame_skip: u32,
    /// V4L2 device path.
    pub camera_device: String,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Frames to try during enrollment before giving up.
    pub enroll_attempts: usize,
}

/// Optional TOML overrides. Every key may be omitted.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    data_dir: Option<PathBuf>,
    gallery_path: Option<PathBuf>,
    ledger_path: Option<PathBuf>,
    tolerance: Option<f32>,
    frame_skip: Option<u32>,
    camera_device: Option<String>,
    model_dir: Option<PathBuf>,
    enroll_attempts: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self::with_data_dir(PathBuf::from("data"))
    }
}

impl Config {
    /// Defaults rooted at `data_dir`.
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            gallery_path: data_dir.join("face_encodings.json"),
            ledger_path: data_dir.join("attendance.csv"),
            data_dir,
            tolerance: DEFAULT_TOLERANCE,
            frame_skip: DEFAULT_FRAME_SKIP,
            camera_device: "/dev/video0".to_string(),
            model_dir: default_model_dir(),
            enroll_attempts: DEFAULT_ENROLL_ATTEMPTS,
        }
    }

    /// Load configuration: defaults, then the TOML file, then `ATTENDANCE_*`
    /// environment variables.
    ///
    /// The file is `$ATTENDANCE_CONFIG` if set (and must exist), otherwise
    /// `attendance.toml` in the working directory if present.
    pub fn load() -> Result<Self, ConfigError> {
        let file = match std::env::var("ATTENDANCE_CONFIG") {
            Ok(path) => Some(read_file_config(Path::new(&path))?),
            Err(_) if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Some(read_file_config(Path::new(DEFAULT_CONFIG_FILE))?)
            }
            Err(_) => None,
        };
        Ok(Self::resolve(file.unwrap_or_default(), |key| {
            std::env::var(key).ok()
        }))
    }

    /// Parse configuration from TOML text layered over the defaults, without
    /// consulting the environment.
    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        let file: FileConfig = toml::from_str(text)?;
        Ok(Self::resolve(file, |_| None))
    }

    fn resolve(file: FileConfig, env: impl Fn(&str) -> Option<String>) -> Self {
        let data_dir = env("ATTENDANCE_DATA_DIR")
            .map(PathBuf::from)
            .or(file.data_dir)
            .unwrap_or_else(|| PathBuf::from("data"));
        let base = Self::with_data_dir(data_dir);

        let gallery_path = env("ATTENDANCE_GALLERY_PATH")
            .map(PathBuf::from)
            .or(file.gallery_path)
            .unwrap_or(base.gallery_path);
        let ledger_path = env("ATTENDANCE_LEDGER_PATH")
            .map(PathBuf::from)
            .or(file.ledger_path)
            .unwrap_or(base.ledger_path);
        let model_dir = env("ATTENDANCE_MODEL_DIR")
            .map(PathBuf::from)
            .or(file.model_dir)
            .unwrap_or(base.model_dir);

        let tolerance = parsed(&env, "ATTENDANCE_TOLERANCE")
            .or(file.tolerance)
            .unwrap_or(base.tolerance);
        let frame_skip = parsed(&env, "ATTENDANCE_FRAME_SKIP")
            .or(file.frame_skip)
            .unwrap_or(base.frame_skip)
            .max(1);
        let enroll_attempts = parsed(&env, "ATTENDANCE_ENROLL_ATTEMPTS")
            .or(file.enroll_attempts)
            .unwrap_or(base.enroll_attempts);

        Self {
            data_dir: base.data_dir,
            gallery_path,
            ledger_path,
            tolerance,
            frame_skip,
            camera_device: env("ATTENDANCE_CAMERA_DEVICE")
                .or(file.camera_device)
                .unwrap_or(base.camera_device),
            model_dir,
            enroll_attempts,
        }
    }

    /// Path to the SCRFD detection model.
    pub fn detector_model_path(&self) -> PathBuf {
        self.model_dir.join("det_10g.onnx")
    }

    /// Path to the ArcFace recognition model.
    pub fn encoder_model_path(&self) -> PathBuf {
        self.model_dir.join("w600k_r50.onnx")
    }
}

/// `$XDG_DATA_HOME/attendance/models`, falling back to `~/.local/share`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("attendance")
        .join("models")
}

fn read_file_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let file = toml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::debug!(path = %path.display(), "loaded config file");
    Ok(file)
}

/// Unparseable values fall through to the next layer.
fn parsed<T: std::str::FromStr>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    env(key).and_then(|v| v.parse().ok())
}
