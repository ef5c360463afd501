use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub sandbox: SandboxConfig,
    pub llm: LlmConfig,
    pub agent: AgentConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SandboxConfig {
    /// Docker CLI binary
    pub docker: String,
    pub image: String,
    /// Container name prefix; a short unique suffix is appended
    pub name_prefix: String,
    /// Directory the session starts in
    pub initial_directory: String,
    /// Run the apt setup sequence after the container starts
    pub setup: bool,
    /// Ubuntu mirror written to /etc/apt/sources.list (unset keeps the image default)
    pub mirror: Option<String>,
    /// Release codename used with `mirror`, e.g. "jammy"
    pub release: String,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            docker: "docker".to_string(),
            image: "ubuntu:22.04".to_string(),
            name_prefix: "sandbox-pilot".to_string(),
            initial_directory: "/".to_string(),
            setup: true,
            mirror: None,
            release: "jammy".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LlmConfig {
    /// "ollama" or "anthropic"
    pub provider: String,
    pub model: String,
    /// Supports ${ENV_VAR} substitution
    pub api_key: String,
    pub max_tokens_per_request: u32,
    /// API base URL (Ollama only), e.g. "http://localhost:11434"
    pub host: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            model: "qwen2.5-coder:7b".to_string(),
            api_key: String::new(),
            max_tokens_per_request: default_max_tokens(),
            host: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AgentConfig {
    pub name: String,
    /// Conversation entries shown to the planner
    pub history_window: usize,
    /// Maximum entries per state listing (directories, files, packages)
    pub snapshot_limit: usize,
    /// Recovery plans longer than this are truncated
    pub max_recovery_steps: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: "sandbox-pilot".to_string(),
            history_window: 6,
            snapshot_limit: 20,
            max_recovery_steps: 5,
        }
    }
}

fn default_max_tokens() -> u32 {
    1024
}

impl Config {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Loads `path` if it exists, otherwise returns the built-in defaults.
    pub fn load_or_default(path: &str) -> anyhow::Result<Self> {
        if Path::new(path).exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        // Expand environment variables like ${ANTHROPIC_API_KEY}
        let expanded = shellexpand::env(content)?;
        let config: Config = toml::from_str(&expanded)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.sandbox.image, "ubuntu:22.04");
        assert_eq!(config.sandbox.initial_directory, "/");
        assert_eq!(config.llm.provider, "ollama");
        assert_eq!(config.agent.snapshot_limit, 20);
        assert_eq!(config.agent.history_window, 6);
        assert_eq!(config.agent.max_recovery_steps, 5);
    }

    #[test]
    fn test_parse_empty_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.sandbox.docker, "docker");
        assert!(config.sandbox.setup);
        assert!(config.sandbox.mirror.is_none());
    }

    #[test]
    fn test_parse_partial_sections() {
        let config = Config::parse(
            r#"
[sandbox]
image = "debian:12"
setup = false

[llm]
provider = "anthropic"
model = "claude-sonnet-4-5-20250929"
"#,
        )
        .unwrap();
        assert_eq!(config.sandbox.image, "debian:12");
        assert!(!config.sandbox.setup);
        // Untouched fields keep their defaults
        assert_eq!(config.sandbox.release, "jammy");
        assert_eq!(config.llm.provider, "anthropic");
        assert_eq!(config.llm.max_tokens_per_request, 1024);
        assert_eq!(config.agent.name, "sandbox-pilot");
    }

    #[test]
    fn test_parse_expands_env_vars() {
        std::env::set_var("SANDBOX_PILOT_TEST_KEY", "sk-test-123");
        let config = Config::parse(
            r#"
[llm]
api_key = "${SANDBOX_PILOT_TEST_KEY}"
"#,
        )
        .unwrap();
        assert_eq!(config.llm.api_key, "sk-test-123");
    }

    #[test]
    fn test_parse_missing_env_var_is_error() {
        let result = Config::parse(
            r#"
[llm]
api_key = "${SANDBOX_PILOT_DEFINITELY_UNSET_VAR}"
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_rejects_bad_types() {
        let result = Config::parse("[agent]\nsnapshot_limit = \"many\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[agent]\nsnapshot_limit = 5\nmax_recovery_steps = 2").unwrap();
        let config = Config::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.agent.snapshot_limit, 5);
        assert_eq!(config.agent.max_recovery_steps, 2);
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let config = Config::load_or_default(path.to_str().unwrap()).unwrap();
        assert_eq!(config.sandbox.image, "ubuntu:22.04");
    }

    #[test]
    fn test_example_config_parses() {
        let config = Config::load("config/agent.toml.example").unwrap();
        assert_eq!(config.llm.provider, "ollama");
        assert!(config.sandbox.mirror.is_none());
        assert_eq!(config.agent.history_window, 6);
    }

    #[test]
    fn test_load_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        assert!(Config::load(path.to_str().unwrap()).is_err());
    }
}
