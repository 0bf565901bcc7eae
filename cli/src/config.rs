use crate::api::DEFAULT_BASE_URL;
use anyhow::{anyhow, Context, Result};
use directories::ProjectDirs;
use serde::Deserialize;
use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

const CONFIG_FILE_NAME: &str = "config.toml";
const ENV_CONFIG_PATH: &str = "COMPOSER_CONFIG_PATH";
const ENV_API_URL: &str = "COMPOSER_API_URL";
const ENV_ARTIFACT_DIR: &str = "COMPOSER_ARTIFACT_DIR";
const ENV_STREAMING: &str = "COMPOSER_STREAMING";
const ENV_MOCK: &str = "COMPOSER_MOCK";
const ENV_RENDER_TIMEOUT: &str = "COMPOSER_RENDER_TIMEOUT";
const DEFAULT_RENDER_TIMEOUT_SECONDS: u64 = 300;

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    api_url: String,
    artifact_dir: PathBuf,
    streaming_render: bool,
    mock_mode: bool,
    render_timeout_seconds: u64,
}

/// Values given on the command line; they win over file and environment.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub api_url: Option<String>,
    pub artifact_dir: Option<PathBuf>,
    pub mock_mode: bool,
    pub no_stream: bool,
}

impl AppConfig {
    pub fn load(overrides: &CliOverrides) -> Result<Self> {
        let mut config = Self::default();

        let path = match config_file_override() {
            Some(path) => Some(path),
            None => Self::default_config_path().ok(),
        };
        if let Some(path) = path.filter(|path| path.exists()) {
            config.apply_partial(read_partial(&path)?)
                .with_context(|| format!("invalid config file {}", path.display()))?;
        }

        config.apply_env(|key| env::var(key).ok())?;
        config.apply_overrides(overrides);
        Ok(config)
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    pub fn artifact_dir(&self) -> &PathBuf {
        &self.artifact_dir
    }

    pub fn streaming_render(&self) -> bool {
        self.streaming_render
    }

    pub fn mock_mode(&self) -> bool {
        self.mock_mode
    }

    pub fn render_timeout(&self) -> Duration {
        Duration::from_secs(self.render_timeout_seconds)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        Ok(project_dirs()?.config_dir().join(CONFIG_FILE_NAME))
    }

    /// Log files for the interactive UI, which owns the terminal.
    pub fn log_dir() -> Result<PathBuf> {
        Ok(project_dirs()?.data_local_dir().join("logs"))
    }

    fn apply_partial(&mut self, partial: PartialConfig) -> Result<()> {
        if let Some(url) = partial.api_url.filter(|url| !url.trim().is_empty()) {
            self.api_url = url;
        }
        if let Some(dir) = partial.artifact_dir {
            self.artifact_dir = dir;
        }
        if let Some(streaming) = partial.streaming_render {
            self.streaming_render = streaming;
        }
        if let Some(mock) = partial.mock_mode {
            self.mock_mode = mock;
        }
        if let Some(timeout) = partial.render_timeout_seconds {
            if timeout == 0 {
                return Err(anyhow!("render_timeout_seconds must be greater than zero"));
            }
            self.render_timeout_seconds = timeout;
        }
        Ok(())
    }

    fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(url) = value(ENV_API_URL) {
            self.api_url = url;
        }
        if let Some(dir) = value(ENV_ARTIFACT_DIR) {
            self.artifact_dir = PathBuf::from(dir);
        }
        if let Some(raw) = value(ENV_STREAMING) {
            self.streaming_render = parse_flag(ENV_STREAMING, &raw)?;
        }
        if let Some(raw) = value(ENV_MOCK) {
            self.mock_mode = parse_flag(ENV_MOCK, &raw)?;
        }
        if let Some(raw) = value(ENV_RENDER_TIMEOUT) {
            let seconds = raw
                .trim()
                .parse::<u64>()
                .with_context(|| format!("{ENV_RENDER_TIMEOUT} must be a number of seconds"))?;
            if seconds == 0 {
                return Err(anyhow!("{ENV_RENDER_TIMEOUT} must be greater than zero"));
            }
            self.render_timeout_seconds = seconds;
        }
        Ok(())
    }

    fn apply_overrides(&mut self, overrides: &CliOverrides) {
        if let Some(url) = overrides.api_url.as_ref().filter(|url| !url.trim().is_empty()) {
            self.api_url = url.clone();
        }
        if let Some(dir) = &overrides.artifact_dir {
            self.artifact_dir = dir.clone();
        }
        if overrides.mock_mode {
            self.mock_mode = true;
        }
        if overrides.no_stream {
            self.streaming_render = false;
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_BASE_URL.to_string(),
            artifact_dir: default_artifact_dir(),
            streaming_render: true,
            mock_mode: false,
            render_timeout_seconds: DEFAULT_RENDER_TIMEOUT_SECONDS,
        }
    }
}

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("com", "ComposerStudio", "ComposerStudio")
        .ok_or_else(|| anyhow!("unable to determine config directory"))
}

fn config_file_override() -> Option<PathBuf> {
    let value = env::var_os(ENV_CONFIG_PATH)?;
    if value.is_empty() {
        return None;
    }
    let path = PathBuf::from(value);
    if path.is_dir() {
        return Some(path.join(CONFIG_FILE_NAME));
    }
    Some(path)
}

fn read_partial(path: &Path) -> Result<PartialConfig> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    let partial: PartialConfig =
        toml::from_str(&contents).with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(partial)
}

fn parse_flag(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(anyhow!("{key} must be true or false, got {other:?}")),
    }
}

fn default_artifact_dir() -> PathBuf {
    env::var_os("HOME")
        .map(PathBuf::from)
        .map(|home| home.join("Music").join("ComposerStudio"))
        .unwrap_or_else(|| PathBuf::from("./artifacts"))
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct PartialConfig {
    api_url: Option<String>,
    artifact_dir: Option<PathBuf>,
    streaming_render: Option<bool>,
    mock_mode: Option<bool>,
    render_timeout_seconds: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(
            &path,
            "api_url = \"https://music.example.com\"\nstreaming_render = false\nrender_timeout_seconds = 60\n",
        )
        .unwrap();

        let mut config = AppConfig::default();
        config.apply_partial(read_partial(&path).unwrap()).unwrap();
        assert_eq!(config.api_url(), "https://music.example.com");
        assert!(!config.streaming_render());
        assert!(!config.mock_mode());
        assert_eq!(config.render_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn malformed_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "api_url = [").unwrap();
        let err = read_partial(&path).unwrap_err();
        assert!(format!("{err:#}").contains("failed to parse"));
    }

    #[test]
    fn zero_timeout_in_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "render_timeout_seconds = 0\n").unwrap();

        let mut config = AppConfig::default();
        let err = config.apply_partial(read_partial(&path).unwrap()).unwrap_err();
        assert!(err.to_string().contains("greater than zero"));
        assert_eq!(config.render_timeout(), AppConfig::default().render_timeout());
    }

    #[test]
    fn env_then_cli_layering() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_API_URL, "http://10.0.0.2:8000"),
            (ENV_MOCK, "yes"),
            (ENV_STREAMING, "   "),
            (ENV_RENDER_TIMEOUT, "45"),
        ]);
        let mut config = AppConfig::default();
        config.apply_env(|key| env.get(key).map(|value| value.to_string())).unwrap();
        assert_eq!(config.api_url(), "http://10.0.0.2:8000");
        assert!(config.mock_mode());
        assert!(config.streaming_render());
        assert_eq!(config.render_timeout(), Duration::from_secs(45));

        config.apply_overrides(&CliOverrides {
            api_url: Some("http://override:9000".into()),
            artifact_dir: Some(PathBuf::from("/tmp/out")),
            mock_mode: false,
            no_stream: true,
        });
        assert_eq!(config.api_url(), "http://override:9000");
        assert_eq!(config.artifact_dir(), &PathBuf::from("/tmp/out"));
        assert!(config.mock_mode());
        assert!(!config.streaming_render());
    }

    #[test]
    fn bad_env_values_are_errors() {
        let mut config = AppConfig::default();
        assert!(config.apply_env(|key| (key == ENV_MOCK).then(|| "maybe".to_string())).is_err());
        assert!(config
            .apply_env(|key| (key == ENV_RENDER_TIMEOUT).then(|| "0".to_string()))
            .is_err());
    }
}
