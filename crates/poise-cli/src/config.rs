use poise_capture::{CaptureConfig, CaptureRequest};
use poise_core::{DetectorOptions, ExtractorConfig, FaceSelection};
use poise_speech::murf::DEFAULT_BASE_URL;
use poise_speech::MurfConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// CLI configuration: defaults, then the TOML file, then `POISE_*` variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding the detector weight manifests and shards.
    pub model_dir: PathBuf,
    /// Minimum milliseconds between two detector passes.
    pub frame_interval_ms: u64,
    pub capture_width: u32,
    pub capture_height: u32,
    /// Frames must score strictly above this to count.
    pub min_confidence: f32,
    pub face_selection: FaceSelection,
    pub detector_input_size: u32,
    pub detector_score_threshold: f32,
    #[serde(skip_serializing)]
    pub murf_api_key: Option<String>,
    pub murf_base_url: String,
}

impl Default for Config {
    fn default() -> Self {
        let capture = CaptureConfig::default();
        let detector = DetectorOptions::default();
        Self {
            model_dir: default_model_dir(),
            frame_interval_ms: capture.frame_interval.as_millis() as u64,
            capture_width: capture.request.width,
            capture_height: capture.request.height,
            min_confidence: capture.extractor.min_confidence,
            face_selection: capture.extractor.face_selection,
            detector_input_size: detector.input_size,
            detector_score_threshold: detector.score_threshold,
            murf_api_key: None,
            murf_base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

impl Config {
    /// Load configuration from `POISE_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    /// Load `path` (if given), then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::from_env());
        };
        let mut config = Self::from_file(path)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn apply_env<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = var("POISE_MODEL_DIR") {
            self.model_dir = PathBuf::from(dir);
        }
        self.frame_interval_ms = parsed(&var, "POISE_FRAME_INTERVAL_MS", self.frame_interval_ms);
        self.capture_width = parsed(&var, "POISE_CAPTURE_WIDTH", self.capture_width);
        self.capture_height = parsed(&var, "POISE_CAPTURE_HEIGHT", self.capture_height);
        self.min_confidence = parsed(&var, "POISE_MIN_CONFIDENCE", self.min_confidence);
        self.detector_input_size = parsed(&var, "POISE_DETECTOR_INPUT_SIZE", self.detector_input_size);
        self.detector_score_threshold = parsed(
            &var,
            "POISE_DETECTOR_SCORE_THRESHOLD",
            self.detector_score_threshold,
        );

        match var("POISE_FACE_SELECTION").as_deref() {
            Some("first") => self.face_selection = FaceSelection::First,
            Some("highest-score") => self.face_selection = FaceSelection::HighestScore,
            Some(other) => tracing::warn!(value = other, "ignoring unknown POISE_FACE_SELECTION"),
            None => {}
        }

        if let Some(key) = var("POISE_MURF_API_KEY").or_else(|| var("MURF_API_KEY")) {
            self.murf_api_key = Some(key);
        }
        if let Some(url) = var("POISE_MURF_BASE_URL") {
            self.murf_base_url = url;
        }
    }

    /// Engine settings derived from this configuration.
    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            frame_interval: Duration::from_millis(self.frame_interval_ms),
            request: CaptureRequest {
                width: self.capture_width,
                height: self.capture_height,
                ..CaptureRequest::default()
            },
            extractor: ExtractorConfig {
                min_confidence: self.min_confidence,
                face_selection: self.face_selection,
                detector_options: DetectorOptions {
                    input_size: self.detector_input_size,
                    score_threshold: self.detector_score_threshold,
                },
            },
        }
    }

    pub fn murf_config(&self) -> MurfConfig {
        MurfConfig {
            api_key: self.murf_api_key.clone().unwrap_or_default(),
            base_url: self.murf_base_url.clone(),
        }
    }
}

/// `$XDG_DATA_HOME/poise/models`, falling back to `~/.local/share`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("poise/models")
}

fn parsed<F, T>(var: &F, key: &str, current: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match var(key) {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "ignoring unparsable config override");
            current
        }),
        None => current,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_match_engine() {
        let config = Config::default();
        assert_eq!(config.frame_interval_ms, 100);
        assert_eq!((config.capture_width, config.capture_height), (320, 240));
        assert!((config.min_confidence - 0.5).abs() < 1e-6);
        assert_eq!(config.face_selection, FaceSelection::First);
        assert_eq!(config.detector_input_size, 224);
        assert_eq!(config.murf_base_url, "https://api.murf.ai/v1");

        let capture = config.capture_config();
        assert_eq!(capture.frame_interval, Duration::from_millis(100));
        assert_eq!(capture.request, CaptureRequest::default());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_env(env(&[
            ("POISE_MODEL_DIR", "/opt/models"),
            ("POISE_FRAME_INTERVAL_MS", "250"),
            ("POISE_MIN_CONFIDENCE", "0.7"),
            ("POISE_FACE_SELECTION", "highest-score"),
            ("MURF_API_KEY", "ap2_abc"),
        ]));

        assert_eq!(config.model_dir, PathBuf::from("/opt/models"));
        assert_eq!(config.frame_interval_ms, 250);
        assert!((config.min_confidence - 0.7).abs() < 1e-6);
        assert_eq!(config.face_selection, FaceSelection::HighestScore);
        assert_eq!(config.murf_api_key.as_deref(), Some("ap2_abc"));
    }

    #[test]
    fn test_prefixed_murf_key_wins() {
        let mut config = Config::default();
        config.apply_env(env(&[("MURF_API_KEY", "plain"), ("POISE_MURF_API_KEY", "prefixed")]));
        assert_eq!(config.murf_api_key.as_deref(), Some("prefixed"));
    }

    #[test]
    fn test_bad_values_keep_previous() {
        let mut config = Config::default();
        config.apply_env(env(&[
            ("POISE_CAPTURE_WIDTH", "wide"),
            ("POISE_FACE_SELECTION", "loudest"),
        ]));
        assert_eq!(config.capture_width, 320);
        assert_eq!(config.face_selection, FaceSelection::First);
    }

    #[test]
    fn test_toml_file_layer() {
        let parsed: Config = toml::from_str(
            r#"
            frame_interval_ms = 50
            min_confidence = 0.6
            face_selection = "highest-score"
            "#,
        )
        .unwrap();
        assert_eq!(parsed.frame_interval_ms, 50);
        assert_eq!(parsed.face_selection, FaceSelection::HighestScore);
        // Unset keys keep their defaults.
        assert_eq!(parsed.capture_height, 240);

        let capture = parsed.capture_config();
        assert!((capture.extractor.min_confidence - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_load_file_then_env() {
        let path = std::env::temp_dir().join(format!("poise-config-{}.toml", std::process::id()));
        std::fs::write(&path, "capture_width = 640\ncapture_height = 480\n").unwrap();
        let config = Config::load(Some(&path)).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!((config.capture_width, config.capture_height), (640, 480));
        assert_eq!(config.murf_base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn test_missing_file() {
        let result = Config::from_file(Path::new("/nonexistent/poise.toml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}
