//! Configuration structures and layered loading logic.

use crate::config::modes::{OutputFormat, Quality};
use crate::error::{Error, Result};
use crate::manga::Language;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Config file looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = ".mloader.toml";

/// Environment variable naming an explicit config file.
pub const CONFIG_FILE_ENV: &str = "MLOADER_CONFIG_FILE";

/// Default output directory.
pub const DEFAULT_OUT_DIR: &str = "mloader_downloads";

/// Default bulk-mode list pages.
pub const DEFAULT_LIST_PAGES: [&str; 3] = [
    "https://mangaplus.shueisha.co.jp/manga_list/ongoing",
    "https://mangaplus.shueisha.co.jp/manga_list/completed",
    "https://mangaplus.shueisha.co.jp/manga_list/one_shot",
];

/// Default bulk-mode title index endpoint.
pub const DEFAULT_TITLE_INDEX_ENDPOINT: &str =
    "https://jumpg-webapi.tokyo-cdn.com/api/title_list/allV2";

/// Main configuration structure.
///
/// Resolved once at startup and passed by reference afterwards.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub auth: AuthSettings,

    #[serde(default)]
    pub options: OptionsConfig,

    #[serde(default)]
    pub discovery: DiscoveryConfig,
}

/// Upstream authentication parameters sent with every API request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSettings {
    #[serde(default = "default_app_ver")]
    pub app_ver: String,

    #[serde(default = "default_os")]
    pub os: String,

    #[serde(default = "default_os_ver")]
    pub os_ver: String,

    #[serde(default = "default_secret")]
    pub secret: String,
}

/// Download options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionsConfig {
    /// Base directory for downloads.
    #[serde(default = "default_out_dir")]
    pub out_dir: PathBuf,

    /// Chapter output format.
    #[serde(default)]
    pub format: OutputFormat,

    /// Requested image quality.
    #[serde(default)]
    pub quality: Quality,

    /// Ask the viewer to split double spreads into single pages.
    #[serde(default)]
    pub split: bool,

    /// Write `title_metadata.json` for each title.
    #[serde(default)]
    pub meta: bool,

    /// Skip chapters already recorded as completed.
    #[serde(default = "default_true")]
    pub resume: bool,

    /// Wipe each title's manifest before downloading.
    #[serde(default)]
    pub manifest_reset: bool,

    /// Use chapter subtitles as document titles.
    #[serde(default)]
    pub chapter_title: bool,

    /// Put raw pages in a per-chapter directory.
    #[serde(default)]
    pub chapter_subdir: bool,

    /// Lowest chapter number to download from a title.
    #[serde(default)]
    pub begin: u32,

    /// Highest chapter number to download from a title.
    #[serde(default)]
    pub end: Option<u32>,

    /// Only download the latest chapter of a title.
    #[serde(default)]
    pub last: bool,

    /// Record raw API payloads into this directory.
    #[serde(default)]
    pub capture_dir: Option<PathBuf>,

    /// Timeout for a single HTTP request.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Retries of a transiently failing network operation before it is terminal.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Whether to show progress bars.
    #[serde(default = "default_true")]
    pub show_progress: bool,
}

impl Default for OptionsConfig {
    fn default() -> Self {
        Self {
            out_dir: default_out_dir(),
            format: OutputFormat::default(),
            quality: Quality::default(),
            split: false,
            meta: false,
            resume: true,
            manifest_reset: false,
            chapter_title: false,
            chapter_subdir: false,
            begin: 0,
            end: None,
            last: false,
            capture_dir: None,
            request_timeout_secs: default_request_timeout(),
            max_retries: default_max_retries(),
            show_progress: true,
        }
    }
}

/// Bulk-mode title discovery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// List pages scraped when the API listing yields nothing.
    #[serde(default = "default_list_pages")]
    pub pages: Vec<String>,

    /// Title index API endpoint.
    #[serde(default = "default_title_index_endpoint")]
    pub title_index_endpoint: String,

    /// Keep only title IDs with exactly this many digits.
    #[serde(default)]
    pub id_length: Option<usize>,

    /// Render list pages in a headless browser as a last resort.
    #[serde(default = "default_true")]
    pub browser_fallback: bool,

    /// Restrict the API listing to these languages.
    #[serde(default)]
    pub languages: Vec<Language>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            pages: default_list_pages(),
            title_index_endpoint: default_title_index_endpoint(),
            id_length: None,
            browser_fallback: true,
            languages: Vec::new(),
        }
    }
}

fn default_app_ver() -> String {
    "97".to_string()
}

fn default_os() -> String {
    "ios".to_string()
}

fn default_os_ver() -> String {
    "18.1".to_string()
}

fn default_secret() -> String {
    "f40080bcb01a9a963912f46688d411a3".to_string()
}

fn default_out_dir() -> PathBuf {
    PathBuf::from(DEFAULT_OUT_DIR)
}

fn default_true() -> bool {
    true
}

fn default_request_timeout() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_list_pages() -> Vec<String> {
    DEFAULT_LIST_PAGES.iter().map(|p| p.to_string()).collect()
}

fn default_title_index_endpoint() -> String {
    DEFAULT_TITLE_INDEX_ENDPOINT.to_string()
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            app_ver: default_app_ver(),
            os: default_os(),
            os_ver: default_os_ver(),
            secret: default_secret(),
        }
    }
}

impl AuthSettings {
    /// Environment variables consulted for each auth field.
    pub const ENV_KEYS: [(&'static str, &'static str); 4] = [
        ("app_ver", "APP_VER"),
        ("os", "OS"),
        ("os_ver", "OS_VER"),
        ("secret", "SECRET"),
    ];

    fn field_mut(&mut self, key: &str) -> Option<&mut String> {
        match key {
            "app_ver" => Some(&mut self.app_ver),
            "os" => Some(&mut self.os),
            "os_ver" => Some(&mut self.os_ver),
            "secret" => Some(&mut self.secret),
            _ => None,
        }
    }

    /// Overlay values found in the environment.
    pub fn apply_env<F>(&mut self, env: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        for (field, var) in Self::ENV_KEYS {
            if let Some(value) = env(var).filter(|v| !v.is_empty()) {
                if let Some(slot) = self.field_mut(field) {
                    *slot = value;
                }
            }
        }
    }

    /// Overlay explicit runtime overrides. Unknown keys are rejected.
    pub fn apply_overrides(&mut self, overrides: &[(String, String)]) -> Result<()> {
        for (key, value) in overrides {
            let slot = self.field_mut(key).ok_or_else(|| {
                Error::Config(format!("Unsupported auth override key: {}", key))
            })?;
            *slot = value.clone();
        }
        Ok(())
    }

    /// Query parameters attached to every API request.
    pub fn query_params(&self) -> [(&'static str, &str); 4] {
        [
            ("app_ver", self.app_ver.as_str()),
            ("os", self.os.as_str()),
            ("os_ver", self.os_ver.as_str()),
            ("secret", self.secret.as_str()),
        ]
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::Config(format!("Configuration file not found: {}", path.display()))
            } else {
                Error::Io(e)
            }
        })?;

        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Pick the config file: explicit path, then `MLOADER_CONFIG_FILE`, then
    /// `.mloader.toml` in `cwd` when it exists.
    pub fn resolve_path<F>(explicit: Option<&Path>, cwd: &Path, env: F) -> Option<PathBuf>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = explicit {
            return Some(path.to_path_buf());
        }
        if let Some(path) = env(CONFIG_FILE_ENV).filter(|p| !p.is_empty()) {
            return Some(PathBuf::from(path));
        }
        let default = cwd.join(DEFAULT_CONFIG_FILE);
        default.is_file().then_some(default)
    }

    /// Build the configuration from defaults, the config file and the environment.
    ///
    /// CLI flags are applied afterwards with `Args::merge_into_config`.
    pub fn load_layered<F>(explicit: Option<&Path>, cwd: &Path, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match Self::resolve_path(explicit, cwd, &env) {
            Some(path) => {
                tracing::debug!("Loading configuration from {}", path.display());
                Self::load(&path)?
            }
            None => Config::default(),
        };

        config.auth.apply_env(&env);
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_file_or_env() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_layered(None, dir.path(), env_from(&[])).unwrap();
        assert_eq!(config.auth, AuthSettings::default());
        assert_eq!(config.options.out_dir, PathBuf::from(DEFAULT_OUT_DIR));
        assert!(config.options.resume);
        assert_eq!(config.discovery.pages.len(), 3);
    }

    #[test]
    fn test_file_then_env_then_override() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(DEFAULT_CONFIG_FILE),
            "[auth]\napp_ver = \"100\"\nos = \"android\"\n\n[options]\nformat = \"pdf\"\n",
        )
        .unwrap();

        let mut config =
            Config::load_layered(None, dir.path(), env_from(&[("OS", "windows")])).unwrap();
        assert_eq!(config.auth.app_ver, "100");
        assert_eq!(config.auth.os, "windows");
        assert_eq!(config.auth.os_ver, "18.1");
        assert_eq!(config.options.format, OutputFormat::Pdf);

        config
            .auth
            .apply_overrides(&[("os".to_string(), "linux".to_string())])
            .unwrap();
        assert_eq!(config.auth.os, "linux");
    }

    #[test]
    fn test_env_config_file_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("custom.toml");
        fs::write(&path, "[auth]\nsecret = \"abc\"\n").unwrap();

        let env = env_from(&[(CONFIG_FILE_ENV, path.to_str().unwrap())]);
        let config = Config::load_layered(None, dir.path(), env).unwrap();
        assert_eq!(config.auth.secret, "abc");
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope.toml");
        let result = Config::load_layered(Some(&missing), dir.path(), env_from(&[]));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_unknown_override_key_rejected() {
        let mut auth = AuthSettings::default();
        let result = auth.apply_overrides(&[("token".to_string(), "x".to_string())]);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_empty_env_value_is_ignored() {
        let mut auth = AuthSettings::default();
        auth.apply_env(env_from(&[("SECRET", "")]));
        assert_eq!(auth.secret, default_secret());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("saved.toml");
        let mut config = Config::default();
        config.options.max_retries = 7;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.options.max_retries, 7);
    }
}
