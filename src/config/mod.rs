use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::scheduler::SchedulerConfig;

/// Top-level configuration loaded from `config.yaml`.
///
/// Every section is optional; a missing section takes its defaults.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub scheduler: SchedulerSection,
    #[serde(default)]
    pub python: PythonConfig,
    #[serde(default)]
    pub publish: PublishConfig,
    #[serde(default)]
    pub workspace: WorkspaceConfig,
}

/// Text-generation backend (OpenAI-compatible chat completions).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct GenerationConfig {
    pub endpoint: String,
    /// API key (plain text or env-var reference like `$GEMINI_API_KEY`).
    pub api_key: Option<String>,
    /// Default model for `generate_text` when no `modelId` is given.
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://generativelanguage.googleapis.com/v1beta/openai/chat/completions".into(),
            api_key: Some("$GEMINI_API_KEY".into()),
            model: "gemini-2.5-pro".into(),
            timeout_secs: 300,
        }
    }
}

impl GenerationConfig {
    /// Resolve the API key, following a `$VAR` reference.
    ///
    /// An unset variable resolves to an empty key.
    pub fn resolved_api_key(&self) -> String {
        match self.api_key.as_deref().map(str::trim) {
            Some(k) if k.starts_with('$') => std::env::var(&k[1..]).unwrap_or_default(),
            Some(k) => k.to_string(),
            None => String::new(),
        }
    }
}

/// Call scheduler knobs, all durations in milliseconds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct SchedulerSection {
    pub max_parallel: usize,
    pub min_interval_between_start_ms: u64,
    pub start_jitter_ms: u64,
    pub max_attempts: u32,
    pub base_retry_delay_ms: u64,
    pub max_retry_delay_ms: u64,
    pub retry_jitter_ms: u64,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        let d = SchedulerConfig::default();
        Self {
            max_parallel: d.max_parallel,
            min_interval_between_start_ms: d.min_interval_between_start.as_millis() as u64,
            start_jitter_ms: d.start_jitter.as_millis() as u64,
            max_attempts: d.max_attempts,
            base_retry_delay_ms: d.base_retry_delay.as_millis() as u64,
            max_retry_delay_ms: d.max_retry_delay.as_millis() as u64,
            retry_jitter_ms: d.retry_jitter.as_millis() as u64,
        }
    }
}

impl SchedulerSection {
    pub fn to_scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            max_parallel: self.max_parallel,
            min_interval_between_start: Duration::from_millis(self.min_interval_between_start_ms),
            start_jitter: Duration::from_millis(self.start_jitter_ms),
            max_attempts: self.max_attempts,
            base_retry_delay: Duration::from_millis(self.base_retry_delay_ms),
            max_retry_delay: Duration::from_millis(self.max_retry_delay_ms),
            retry_jitter: Duration::from_millis(self.retry_jitter_ms),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct PythonConfig {
    pub interpreter: String,
    pub timeout_secs: u64,
}

impl Default for PythonConfig {
    fn default() -> Self {
        Self {
            interpreter: "python3".into(),
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct PublishConfig {
    /// Where published lessons are copied.  Relative paths resolve
    /// against `SPARK_HOME`; default `$SPARK_HOME/published`.
    pub dir: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct WorkspaceConfig {
    pub enforce_lesson_pipeline: bool,
}

impl Config {
    /// Load configuration from `path`, or from `$SPARK_HOME/config.yaml`
    /// when no path is given.  A missing file at the default location
    /// yields defaults; a missing explicit file is an error.
    pub fn load_or_default(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => {
                let default_path = crate::spark_home().join("config.yaml");
                if default_path.exists() {
                    Self::load(&default_path)
                } else {
                    tracing::debug!(path = %default_path.display(), "no config file, using defaults");
                    Ok(Self::default())
                }
            }
        }
    }

    /// Load and validate a YAML config file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config = Self::parse(&contents)?;
        tracing::debug!(path = %path.display(), model = %config.generation.model, "configuration loaded");
        Ok(config)
    }

    /// Parse and validate YAML config text.
    pub fn parse(contents: &str) -> anyhow::Result<Self> {
        let config: Config = if contents.trim().is_empty() {
            Config::default()
        } else {
            serde_yaml_ng::from_str(contents).context("failed to parse config YAML")?
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate semantic constraints that serde cannot enforce.
    pub fn validate(&self) -> anyhow::Result<()> {
        let s = &self.scheduler;
        if s.max_parallel == 0 {
            anyhow::bail!("config: scheduler.max_parallel must be at least 1");
        }
        if s.max_attempts == 0 {
            anyhow::bail!("config: scheduler.max_attempts must be at least 1");
        }
        if s.base_retry_delay_ms > s.max_retry_delay_ms {
            anyhow::bail!(
                "config: scheduler.base_retry_delay_ms ({}) exceeds max_retry_delay_ms ({})",
                s.base_retry_delay_ms,
                s.max_retry_delay_ms
            );
        }
        if self.generation.endpoint.trim().is_empty() {
            anyhow::bail!("config: generation.endpoint must not be empty");
        }
        if self.generation.model.trim().is_empty() {
            anyhow::bail!("config: generation.model must not be empty");
        }
        if self.generation.timeout_secs == 0 || self.python.timeout_secs == 0 {
            anyhow::bail!("config: timeouts must be at least 1 second");
        }
        Ok(())
    }

    /// Directory the lesson publisher copies into.
    pub fn publish_dir(&self) -> PathBuf {
        let home = crate::spark_home();
        match self.publish.dir.as_deref() {
            Some(d) if Path::new(d).is_absolute() => PathBuf::from(d),
            Some(d) => home.join(d),
            None => home.join("published"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_defaults() {
        let c = Config::parse("").unwrap();
        assert_eq!(c.scheduler.max_parallel, 3);
        assert_eq!(c.scheduler.max_attempts, 3);
        assert_eq!(c.python.interpreter, "python3");
        assert!(!c.workspace.enforce_lesson_pipeline);
    }

    #[test]
    fn partial_sections_keep_defaults() {
        let c = Config::parse("scheduler:\n  max_parallel: 5\nworkspace:\n  enforce_lesson_pipeline: true\n").unwrap();
        assert_eq!(c.scheduler.max_parallel, 5);
        assert_eq!(c.scheduler.base_retry_delay_ms, 500);
        assert!(c.workspace.enforce_lesson_pipeline);
        let sc = c.scheduler.to_scheduler_config();
        assert_eq!(sc.max_retry_delay, Duration::from_millis(4000));
    }

    #[test]
    fn validation_rejects_bad_scheduler_values() {
        assert!(Config::parse("scheduler:\n  max_parallel: 0\n").is_err());
        assert!(Config::parse("scheduler:\n  max_attempts: 0\n").is_err());
        assert!(Config::parse("scheduler:\n  base_retry_delay_ms: 5000\n").is_err());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(Config::parse("generation:\n  modle: x\n").is_err());
    }

    #[test]
    fn api_key_indirection() {
        let mut g = GenerationConfig {
            api_key: Some("literal-key".into()),
            ..GenerationConfig::default()
        };
        assert_eq!(g.resolved_api_key(), "literal-key");
        g.api_key = Some("$SPARK_TEST_SURELY_UNSET_VAR".into());
        assert_eq!(g.resolved_api_key(), "");
        g.api_key = None;
        assert_eq!(g.resolved_api_key(), "");
    }
}
