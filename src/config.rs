use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::db::Database;
use crate::deletion::DeletionPolicy;
use crate::extract::DEFAULT_BODY_WINDOW;
use crate::merge::AiTriggers;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub extraction: ExtractionConfig,
    pub ai: AiConfig,
    pub deletion: DeletionPolicy,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub path: Option<PathBuf>,
    /// Commit the store every N processed messages during a scan.
    pub save_after_n_messages: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            save_after_n_messages: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    pub use_ai: bool,
    pub body_window: usize,
    pub ai_triggers_low_confidence: bool,
    pub ai_triggers_unknown_employer: bool,
    pub ai_triggers_unclear_status: bool,
    /// Scores below this count as low confidence for the AI trigger.
    pub confidence_threshold: f64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            use_ai: false,
            body_window: DEFAULT_BODY_WINDOW,
            ai_triggers_low_confidence: true,
            ai_triggers_unknown_employer: true,
            ai_triggers_unclear_status: true,
            confidence_threshold: 0.4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    pub provider: String,
    pub host: String,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub retry_delay_secs: u64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            host: "http://localhost:11434".to_string(),
            model: "llama3.2:3b".to_string(),
            timeout_secs: 30,
            max_retries: 2,
            retry_delay_secs: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub log_extractions: bool,
    pub log_classifications: bool,
    pub log_deletions: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_extractions: true,
            log_classifications: true,
            log_deletions: true,
        }
    }
}

impl AppConfig {
    pub fn default_path() -> PathBuf {
        if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "jobtrail") {
            proj_dirs.config_dir().join("config.toml")
        } else {
            PathBuf::from("jobtrail.toml")
        }
    }

    /// Reads the config file (an explicit path must exist, the default one
    /// may be missing) and applies `JOBTRAIL_*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => {
                let p = Self::default_path();
                if p.exists() { Self::from_file(&p)? } else { Self::default() }
            }
        };
        config.apply_overrides(|key| env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = lookup("JOBTRAIL_DB") {
            self.store.path = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("JOBTRAIL_USE_AI") {
            self.extraction.use_ai = parse_bool(&v).context("JOBTRAIL_USE_AI")?;
        }
        if let Some(v) = lookup("JOBTRAIL_AI_PROVIDER") {
            self.ai.provider = v;
        }
        if let Some(v) = lookup("JOBTRAIL_AI_HOST") {
            self.ai.host = v;
        }
        if let Some(v) = lookup("JOBTRAIL_AI_MODEL") {
            self.ai.model = v;
        }
        if let Some(v) = lookup("JOBTRAIL_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Some(v) = lookup("JOBTRAIL_CONFIDENCE_THRESHOLD") {
            self.extraction.confidence_threshold = v
                .trim()
                .parse()
                .with_context(|| format!("JOBTRAIL_CONFIDENCE_THRESHOLD: invalid number '{v}'"))?;
        }
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.store.path.clone().unwrap_or_else(Database::default_path)
    }

    pub fn triggers(&self) -> AiTriggers {
        AiTriggers {
            low_confidence: self.extraction.ai_triggers_low_confidence,
            unknown_employer: self.extraction.ai_triggers_unknown_employer,
            unclear_status: self.extraction.ai_triggers_unclear_status,
            confidence_threshold: self.extraction.confidence_threshold,
        }
    }

    /// Settings that are legal but probably unintended.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.deletion.delete_interviewing {
            warnings.push("deletion.delete_interviewing is enabled: interview threads may be deleted".to_string());
        }
        if self.deletion.delete_offer {
            warnings.push("deletion.delete_offer is enabled: offer threads may be deleted".to_string());
        }
        if self.deletion.safety_keywords.is_empty() {
            warnings.push("deletion.safety_keywords is empty: no keyword protection".to_string());
        }
        if self.extraction.body_window == 0 {
            warnings.push("extraction.body_window is 0: body text is never searched".to_string());
        }
        if self.store.save_after_n_messages == 0 {
            warnings.push("store.save_after_n_messages is 0: progress is only saved at the end of a scan".to_string());
        }
        if !(0.0..=1.0).contains(&self.extraction.confidence_threshold) {
            warnings.push(format!(
                "extraction.confidence_threshold {} is outside [0, 1]",
                self.extraction.confidence_threshold
            ));
        }
        if self.extraction.use_ai && self.ai.provider.parse::<crate::ai::ProviderKind>().is_err() {
            warnings.push(format!("ai.provider '{}' is not recognised", self.ai.provider));
        }
        warnings
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }

    /// Writes the default configuration to `path`, refusing to overwrite.
    pub fn write_default(path: &Path) -> Result<()> {
        if path.exists() {
            bail!("Config file already exists at {}", path.display());
        }
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, Self::default().to_toml()?)
            .with_context(|| format!("Failed to write {}", path.display()))
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(anyhow!("expected a boolean, got '{other}'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert!(!config.extraction.use_ai);
        assert_eq!(config.extraction.body_window, 500);
        assert_eq!(config.store.save_after_n_messages, 100);
        assert_eq!(config.ai.host, "http://localhost:11434");
        assert!(config.deletion.protect_starred);
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [extraction]
            use_ai = true

            [deletion]
            delete_rejected = false
            safety_keywords = ["visa"]
            "#,
        )
        .unwrap();
        assert!(config.extraction.use_ai);
        assert_eq!(config.extraction.body_window, 500);
        assert!(!config.deletion.delete_rejected);
        assert!(config.deletion.delete_applied);
        assert_eq!(config.deletion.safety_keywords, vec!["visa".to_string()]);
        assert_eq!(config.ai.model, "llama3.2:3b");
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("JOBTRAIL_DB", "/tmp/x.db"),
            ("JOBTRAIL_USE_AI", "yes"),
            ("JOBTRAIL_AI_MODEL", "mistral"),
            ("JOBTRAIL_CONFIDENCE_THRESHOLD", "0.55"),
        ]
        .into_iter()
        .collect();
        let mut config = AppConfig::default();
        config
            .apply_overrides(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.database_path(), PathBuf::from("/tmp/x.db"));
        assert!(config.extraction.use_ai);
        assert_eq!(config.ai.model, "mistral");
        assert_eq!(config.triggers().confidence_threshold, 0.55);
    }

    #[test]
    fn test_bad_override_is_an_error() {
        let mut config = AppConfig::default();
        let result = config.apply_overrides(|k| (k == "JOBTRAIL_USE_AI").then(|| "maybe".to_string()));
        assert!(result.is_err());
    }

    #[test]
    fn test_env_override() {
        let original = env::var("JOBTRAIL_AI_HOST").ok();
        unsafe { env::set_var("JOBTRAIL_AI_HOST", "http://gpu-box:11434"); }

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[ai]\nhost = \"http://file-host:11434\"\n").unwrap();
        let config = AppConfig::load(Some(&path));

        match original {
            Some(val) => unsafe { env::set_var("JOBTRAIL_AI_HOST", val) },
            None => unsafe { env::remove_var("JOBTRAIL_AI_HOST") },
        }

        assert_eq!(config.unwrap().ai.host, "http://gpu-box:11434");
    }

    #[test]
    fn test_validate_warnings() {
        let mut config = AppConfig::default();
        config.deletion.delete_offer = true;
        config.deletion.safety_keywords.clear();
        config.extraction.confidence_threshold = 1.5;
        let warnings = config.validate();
        assert_eq!(warnings.len(), 3);
        assert!(warnings.iter().any(|w| w.contains("delete_offer")));
    }

    #[test]
    fn test_missing_explicit_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(AppConfig::load(Some(&dir.path().join("nope.toml"))).is_err());
    }

    #[test]
    fn test_write_default_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        AppConfig::write_default(&path).unwrap();
        assert_eq!(AppConfig::from_file(&path).unwrap(), AppConfig::default());
        assert!(AppConfig::write_default(&path).is_err());
    }
}
