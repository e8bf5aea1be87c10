use crate::error::{GenError, Result};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-3-pro-image-preview";
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_STYLES_DIR: &str = "reference_styles";
pub const DEFAULT_OUTPUT_DIR: &str = "generated_images";
pub const DEFAULT_CONFIG_FILE: &str = ".env";

/// Environment variables consulted for the API key, in priority order.
pub const API_KEY_VARS: [&str; 2] = ["GEMINI_API_KEY", "GOOGLE_API_KEY"];

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_base: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        GeminiConfig {
            api_base: DEFAULT_API_BASE.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl GeminiConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads `GEMINI_API_BASE`, `GEMINI_MODEL` and `GEMINI_TIMEOUT_SECS`.
    /// The API key is deliberately left unset; see [`ApiKeyResolver`].
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom environment lookup.
    /// A zero or unparsable timeout is ignored in favour of the default.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let var = |name: &str| lookup(name).as_deref().and_then(non_blank);

        let api_base = var("GEMINI_API_BASE")
            .map(|base| base.trim_end_matches('/').to_string())
            .unwrap_or(defaults.api_base);
        let model = var("GEMINI_MODEL").unwrap_or(defaults.model);
        let timeout = match var("GEMINI_TIMEOUT_SECS") {
            Some(raw) => parse_timeout_secs(&raw).unwrap_or_else(|| {
                log::warn!(
                    "Ignoring GEMINI_TIMEOUT_SECS={}: expected a whole number of seconds above 0",
                    raw
                );
                defaults.timeout
            }),
            None => defaults.timeout,
        };

        GeminiConfig {
            api_base,
            model,
            api_key: None,
            timeout,
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub gemini: GeminiConfig,
    pub styles_dir: PathBuf,
    pub output_root: PathBuf,
    pub config_file: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            gemini: GeminiConfig::default(),
            styles_dir: PathBuf::from(DEFAULT_STYLES_DIR),
            output_root: PathBuf::from(DEFAULT_OUTPUT_DIR),
            config_file: PathBuf::from(DEFAULT_CONFIG_FILE),
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_env() -> Self {
        let defaults = Self::default();
        Config {
            gemini: GeminiConfig::from_env(),
            styles_dir: non_empty_env("STYLEGEN_STYLES_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.styles_dir),
            output_root: non_empty_env("STYLEGEN_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_root),
            config_file: defaults.config_file,
        }
    }

    pub fn with_gemini(mut self, gemini: GeminiConfig) -> Self {
        self.gemini = gemini;
        self
    }

    pub fn with_styles_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.styles_dir = dir.into();
        self
    }

    pub fn with_output_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_root = dir.into();
        self
    }

    pub fn with_config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = path.into();
        self
    }

    /// Resolves the API key into `gemini.api_key`, failing when no source has one.
    pub fn resolve_api_key(mut self, explicit: Option<&str>) -> Result<Self> {
        let explicit = explicit
            .map(str::to_string)
            .or_else(|| self.gemini.api_key.clone());
        let key = ApiKeyResolver::new()
            .with_explicit(explicit)
            .with_config_file(&self.config_file)
            .resolve()?;
        self.gemini.api_key = Some(key);
        Ok(self)
    }
}

/// Finds the API key: explicit value, then environment, then config file.
/// The first non-blank value wins.
#[derive(Debug, Clone, Default)]
pub struct ApiKeyResolver {
    explicit: Option<String>,
    config_file: Option<PathBuf>,
}

impl ApiKeyResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_explicit(mut self, key: Option<String>) -> Self {
        self.explicit = key;
        self
    }

    pub fn with_config_file(mut self, path: impl AsRef<Path>) -> Self {
        self.config_file = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn resolve(&self) -> Result<String> {
        self.resolve_with(|name| env::var(name).ok())
    }

    /// Same as [`resolve`](Self::resolve) with a custom environment lookup.
    pub fn resolve_with<F>(&self, lookup: F) -> Result<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = self.explicit.as_deref().and_then(non_blank) {
            log::debug!("API key taken from explicit argument");
            return Ok(key);
        }

        for var in API_KEY_VARS {
            if let Some(key) = lookup(var).as_deref().and_then(non_blank) {
                log::debug!("API key taken from environment variable {}", var);
                return Ok(key);
            }
        }

        if let Some(path) = &self.config_file {
            if let Some(key) = read_key_from_file(path)? {
                log::debug!("API key taken from config file {}", path.display());
                return Ok(key);
            }
        }

        Err(GenError::Configuration(format!(
            "no API key found: pass --api-key, set {} or add it to {}",
            API_KEY_VARS.join(" / "),
            self.config_file
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_string())
        )))
    }
}

/// A missing file is not an error; a malformed one is.
fn read_key_from_file(path: &Path) -> Result<Option<String>> {
    if !path.is_file() {
        return Ok(None);
    }

    let entries = dotenv::from_path_iter(path).map_err(|e| {
        GenError::Configuration(format!("cannot read {}: {}", path.display(), e))
    })?;

    let mut found: Vec<(String, String)> = Vec::new();
    for entry in entries {
        let (name, value) = entry.map_err(|e| {
            GenError::Configuration(format!("cannot parse {}: {}", path.display(), e))
        })?;
        if API_KEY_VARS.contains(&name.as_str()) {
            found.push((name, value));
        }
    }

    Ok(API_KEY_VARS.iter().find_map(|var| {
        found
            .iter()
            .find(|(name, _)| name == var)
            .and_then(|(_, value)| non_blank(value))
    }))
}

fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Whole seconds above zero; anything else is `None`.
pub fn parse_timeout_secs(raw: &str) -> Option<Duration> {
    raw.trim()
        .parse::<u64>()
        .ok()
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
}

fn non_empty_env(name: &str) -> Option<String> {
    env::var(name).ok().as_deref().and_then(non_blank)
}

/// Shows only the first few characters of a secret.
pub fn mask_secret(secret: &str) -> String {
    let prefix: String = secret.chars().take(4).collect();
    format!("{}…({} chars)", prefix, secret.chars().count())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn test_explicit_key_wins() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join(".env");
        fs::write(&file, "GEMINI_API_KEY=from-file\n").unwrap();

        let key = ApiKeyResolver::new()
            .with_explicit(Some("from-flag".into()))
            .with_config_file(&file)
            .resolve_with(env_of(&[("GEMINI_API_KEY", "from-env")]))
            .unwrap();
        assert_eq!(key, "from-flag");
    }

    #[test]
    fn test_env_before_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join(".env");
        fs::write(&file, "GEMINI_API_KEY=from-file\n").unwrap();

        let key = ApiKeyResolver::new()
            .with_config_file(&file)
            .resolve_with(env_of(&[("GOOGLE_API_KEY", "google-env")]))
            .unwrap();
        assert_eq!(key, "google-env");
    }

    #[test]
    fn test_file_is_last_resort() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join(".env");
        fs::write(&file, "# keys\nOTHER=1\nGEMINI_API_KEY=from-file\n").unwrap();

        let key = ApiKeyResolver::new()
            .with_explicit(Some("   ".into()))
            .with_config_file(&file)
            .resolve_with(env_of(&[("GEMINI_API_KEY", "")]))
            .unwrap();
        assert_eq!(key, "from-file");
    }

    #[test]
    fn test_missing_everywhere_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ApiKeyResolver::new()
            .with_config_file(dir.path().join("absent.env"))
            .resolve_with(env_of(&[]))
            .unwrap_err();
        assert!(matches!(err, GenError::Configuration(_)));
    }

    #[test]
    fn test_builders() {
        let config = Config::new()
            .with_styles_dir("styles")
            .with_gemini(
                GeminiConfig::new()
                    .with_api_base("http://localhost:9000/")
                    .with_model("gemini-test")
                    .with_timeout(Duration::from_secs(5)),
            );
        assert_eq!(config.styles_dir, PathBuf::from("styles"));
        assert_eq!(config.gemini.api_base, "http://localhost:9000");
        assert_eq!(config.gemini.model, "gemini-test");
        assert_eq!(config.gemini.timeout, Duration::from_secs(5));
        assert_eq!(config.output_root, PathBuf::from(DEFAULT_OUTPUT_DIR));
    }

    #[test]
    fn test_from_lookup_reads_overrides() {
        let config = GeminiConfig::from_lookup(env_of(&[
            ("GEMINI_API_BASE", "http://localhost:9000/"),
            ("GEMINI_MODEL", "gemini-test"),
            ("GEMINI_TIMEOUT_SECS", "30"),
        ]));
        assert_eq!(config.api_base, "http://localhost:9000");
        assert_eq!(config.model, "gemini-test");
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_zero_timeout_falls_back_to_default() {
        let default = Duration::from_secs(DEFAULT_TIMEOUT_SECS);
        for raw in ["0", " 0 ", "-5", "soon"] {
            let config = GeminiConfig::from_lookup(env_of(&[("GEMINI_TIMEOUT_SECS", raw)]));
            assert_eq!(config.timeout, default, "GEMINI_TIMEOUT_SECS={:?}", raw);
        }
        assert_eq!(parse_timeout_secs("0"), None);
        assert_eq!(parse_timeout_secs("15"), Some(Duration::from_secs(15)));
    }

    #[test]
    fn test_mask_secret() {
        assert_eq!(mask_secret("abcdefgh"), "abcd…(8 chars)");
    }
}
