use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::{
    env,
    path::{Path, PathBuf},
};
use tracing::{debug, info};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub file_extensions: Vec<String>,
    /// Directory names pruned in addition to the built-in exclusions.
    pub extra_excluded_dirs: Vec<String>,
    pub max_file_size: u64,
    pub output_dir: PathBuf,
    pub llm: LLMConfig,
    pub scanner: ScannerConfig,
    pub packager: PackagerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LLMConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_seconds: u64,
    /// Per-file content budget sent with security reviews.
    pub max_file_chars: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScannerStrategy {
    Auto,
    Maven,
    Cli,
    Docker,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    pub enabled: bool,
    pub strategy: ScannerStrategy,
    pub timeout_seconds: u64,
    pub nvd_api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PackagerConfig {
    pub command: String,
    pub timeout_seconds: u64,
    pub max_context_chars: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            file_extensions: [
                "java", "kt", "scala", "groovy", "py", "js", "jsx", "ts", "tsx", "go", "rs",
                "cs", "php", "rb", "c", "cpp", "h", "jsp", "xml", "properties", "yaml", "yml",
                "json", "toml", "html", "sql", "sh",
            ]
            .iter()
            .map(|ext| ext.to_string())
            .collect(),
            extra_excluded_dirs: Vec::new(),
            max_file_size: 1024 * 1024, // 1MB
            output_dir: PathBuf::from("./reports"),
            llm: LLMConfig::default(),
            scanner: ScannerConfig::default(),
            packager: PackagerConfig::default(),
        }
    }
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            max_tokens: 4000,
            temperature: 0.1,
            timeout_seconds: 60,
            max_file_chars: 12_000,
        }
    }
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            strategy: ScannerStrategy::Auto,
            timeout_seconds: 600,
            nvd_api_key: None,
        }
    }
}

impl Default for PackagerConfig {
    fn default() -> Self {
        Self {
            command: "repomix".to_string(),
            timeout_seconds: 120,
            max_context_chars: 60_000,
        }
    }
}

impl Config {
    const API_KEY_ENV: &'static str = "CODEWARDEN_API_KEY";
    const OPENAI_KEY_ENV: &'static str = "OPENAI_API_KEY";
    const BASE_URL_ENV: &'static str = "CODEWARDEN_BASE_URL";
    const MODEL_ENV: &'static str = "CODEWARDEN_MODEL";
    const NVD_KEY_ENV: &'static str = "NVD_API_KEY";

    /// Get the default config file path (~/.codewarden.toml)
    pub fn default_config_path() -> crate::Result<PathBuf> {
        let home_dir = env::var("HOME")
            .or_else(|_| env::var("USERPROFILE"))
            .map_err(|_| anyhow::anyhow!("Could not determine home directory"))?;
        Ok(PathBuf::from(home_dir).join(".codewarden.toml"))
    }

    /// Load config from an explicit file, or the default location, falling back
    /// to defaults. Environment overrides are applied last.
    pub fn load(explicit: Option<&Path>) -> crate::Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => {
                let config_path = Self::default_config_path()?;
                if config_path.exists() {
                    info!("loading configuration from {}", config_path.display());
                    Self::from_file(&config_path)?
                } else {
                    debug!("no config file at {}, using defaults", config_path.display());
                    Self::default()
                }
            }
        };

        config.apply_env(|name| env::var(name).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("invalid config file {}", path.display()))?;
        Ok(config)
    }

    /// Overlay environment variables. The API key from the file wins over the
    /// environment; endpoint and model overrides always win.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if self.llm.api_key.as_deref().map_or(true, |k| k.trim().is_empty()) {
            self.llm.api_key =
                non_empty(Self::API_KEY_ENV).or_else(|| non_empty(Self::OPENAI_KEY_ENV));
        }
        if let Some(base_url) = non_empty(Self::BASE_URL_ENV) {
            self.llm.base_url = base_url;
        }
        if let Some(model) = non_empty(Self::MODEL_ENV) {
            self.llm.model = model;
        }
        if self.scanner.nvd_api_key.is_none() {
            self.scanner.nvd_api_key = non_empty(Self::NVD_KEY_ENV);
        }
    }

    /// Create a config file with all available options documented
    pub fn create_documented_config() -> String {
        r#"# codewarden configuration file

# File extensions to include (empty list = every file)
file_extensions = [
    "java", "kt", "scala", "groovy", "py", "js", "jsx", "ts", "tsx", "go", "rs",
    "cs", "php", "rb", "c", "cpp", "h", "jsp", "xml", "properties", "yaml", "yml",
    "json", "toml", "html", "sql", "sh"
]

# Directory names to skip on top of the built-in list
# (node_modules, .git, target, build, dist, __pycache__, .venv, venv, .gradle, .idea, vendor, .mvn)
extra_excluded_dirs = []

# Maximum file size to analyze (in bytes, default 1MB)
max_file_size = 1048576

# Where reports are written
output_dir = "./reports"

[llm]
# API key (or set CODEWARDEN_API_KEY / OPENAI_API_KEY)
# api_key = "your-api-key-here"

# Any OpenAI-compatible endpoint (override with CODEWARDEN_BASE_URL)
base_url = "https://api.openai.com/v1"

# Model to use (override with CODEWARDEN_MODEL)
model = "gpt-4o-mini"

max_tokens = 4000
temperature = 0.1

# Request timeout in seconds
timeout_seconds = 60

# Characters of each file sent with a security review
max_file_chars = 12000

[scanner]
# Run OWASP Dependency-Check during `scan`
enabled = true

# auto | maven | cli | docker
strategy = "auto"

# Subprocess timeout in seconds
timeout_seconds = 600

# NVD API key speeds up database updates (or set NVD_API_KEY)
# nvd_api_key = ""

[packager]
# External packager; a built-in one is used when it fails
command = "repomix"
timeout_seconds = 120

# Maximum characters of packaged code sent to the LLM
max_context_chars = 60000
"#
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn defaults_carry_no_api_key() {
        let config = Config::default();
        assert!(config.llm.api_key.is_none());
        assert_eq!(config.scanner.timeout_seconds, 600);
        assert!(config.llm.timeout_seconds < config.scanner.timeout_seconds);
    }

    #[test]
    fn env_key_prefers_codewarden_variable() {
        let mut config = Config::default();
        config.apply_env(lookup(&[
            ("CODEWARDEN_API_KEY", "primary"),
            ("OPENAI_API_KEY", "secondary"),
        ]));
        assert_eq!(config.llm.api_key.as_deref(), Some("primary"));

        let mut config = Config::default();
        config.apply_env(lookup(&[("OPENAI_API_KEY", "secondary")]));
        assert_eq!(config.llm.api_key.as_deref(), Some("secondary"));
    }

    #[test]
    fn file_key_wins_and_blank_env_is_ignored() {
        let mut config = Config::default();
        config.llm.api_key = Some("from-file".into());
        config.apply_env(lookup(&[("CODEWARDEN_API_KEY", "from-env")]));
        assert_eq!(config.llm.api_key.as_deref(), Some("from-file"));

        let mut config = Config::default();
        config.apply_env(lookup(&[("CODEWARDEN_API_KEY", "   "), ("CODEWARDEN_MODEL", "")]));
        assert!(config.llm.api_key.is_none());
        assert_eq!(config.llm.model, "gpt-4o-mini");
    }

    #[test]
    fn documented_config_parses() {
        let config: Config = toml::from_str(&Config::create_documented_config()).unwrap();
        assert_eq!(config.scanner.strategy, ScannerStrategy::Auto);
        assert_eq!(config.packager.command, "repomix");
        assert_eq!(config.max_file_size, 1_048_576);
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("codewarden.toml");
        std::fs::write(&path, "[llm]\nmodel = \"local-model\"\n").unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.llm.model, "local-model");
        assert_eq!(config.llm.base_url, "https://api.openai.com/v1");
        assert!(!config.file_extensions.is_empty());
    }
}
