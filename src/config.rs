use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use serde::Deserialize;

#[derive(Parser)]
#[command(name = "coderun", version = "1.0", about, long_about = None)]
pub struct CliArgs {
    /// Path to the configuration file
    #[arg(long = "config", short = 'c')]
    pub config_path: Option<PathBuf>,

    /// Port to listen on, overriding the configuration file
    #[arg(long = "port", short = 'p')]
    pub port: Option<u16>,
}

impl CliArgs {
    /// Load the configuration from the specified file
    ///
    /// Without `--config`, the platform config directory is searched for a
    /// `config.json`; if there is none the built-in defaults are used.
    pub fn to_config(&self) -> Result<Config> {
        let path = match &self.config_path {
            Some(path) => Some(path.clone()),
            None => default_config_path().filter(|p| p.exists()),
        };

        let mut config = match path {
            Some(path) => {
                log::info!("Loading configuration from {}", path.display());
                Config::from_file(&path)?
            }
            None => {
                log::info!("No configuration file found, using defaults");
                Config::default()
            }
        };

        if let Some(port) = self.port {
            config.server.bind_port = Some(port);
        }
        config.validate()?;
        Ok(config)
    }
}

fn default_config_path() -> Option<PathBuf> {
    use directories::ProjectDirs;

    ProjectDirs::from("", "", "coderun").map(|dirs| dirs.config_dir().join("config.json"))
}

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub execution: ExecutionConfig,
    pub languages: LanguagesConfig,
}

impl Config {
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open config file {}", path.display()))?;
        let reader = std::io::BufReader::new(file);
        serde_json::from_reader(reader)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.execution.timeout_ms == 0 {
            bail!("execution.timeout_ms must not be 0");
        }
        if self.execution.max_concurrent == 0 {
            bail!("execution.max_concurrent must not be 0");
        }
        if self.execution.max_output_bytes == 0 {
            bail!("execution.max_output_bytes must not be 0");
        }
        if self.languages.java.total_timeout_ms == Some(0) {
            bail!("languages.java.total_timeout_ms must not be 0");
        }
        Ok(())
    }
}

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: Option<String>,
    pub bind_port: Option<u16>,
    /// Shared bearer token; requests are unauthenticated when unset
    pub api_token: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Wall-clock limit for every spawned process
    pub timeout_ms: u64,
    pub max_concurrent: usize,
    /// Cap on captured stdout and on captured stderr, per process
    pub max_output_bytes: u64,
    /// Parent directory of per-request workspaces, the host temp dir if unset
    pub workspace_root: Option<PathBuf>,
}

impl ExecutionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn workspace_root(&self) -> PathBuf {
        self.workspace_root
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            max_concurrent: 8,
            max_output_bytes: 1024 * 1024,
            workspace_root: None,
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct LanguagesConfig {
    pub javascript: JavaScriptConfig,
    pub python: PythonConfig,
    pub java: JavaConfig,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct JavaScriptConfig {
    pub runtime: String,
}

impl Default for JavaScriptConfig {
    fn default() -> Self {
        Self {
            runtime: "node".to_string(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct PythonConfig {
    pub interpreter: String,
}

impl Default for PythonConfig {
    fn default() -> Self {
        Self {
            interpreter: "python3".to_string(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct JavaConfig {
    pub compiler: String,
    pub runtime: String,
    /// Upper bound for compile and run together; each phase only gets the
    /// per-process timeout when unset
    pub total_timeout_ms: Option<u64>,
}

impl JavaConfig {
    pub fn total_timeout(&self) -> Option<Duration> {
        self.total_timeout_ms.map(Duration::from_millis)
    }
}

impl Default for JavaConfig {
    fn default() -> Self {
        Self {
            compiler: "javac".to_string(),
            runtime: "java".to_string(),
            total_timeout_ms: None,
        }
    }
}
