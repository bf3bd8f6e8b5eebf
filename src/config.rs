use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub command_prefix: String,
    pub owner_id: Option<u64>,

    // Audio
    pub default_volume: f32,
    pub max_queue_size: usize,

    // Chat IA
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub chat_trigger: String,

    // Presencia
    pub status_interval_secs: u64,
    pub status_text: String,

    // Paths
    pub data_dir: PathBuf,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self::from_lookup(|key| std::env::var(key).ok())?;

        // Crear directorio de datos si no existe
        std::fs::create_dir_all(&config.data_dir)
            .with_context(|| format!("No se pudo crear {}", config.data_dir.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Builds a config from any key lookup. `load` passes the process
    /// environment; tests pass a map.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let var = |key: &str| get(key).filter(|v| !v.trim().is_empty());

        Ok(Self {
            discord_token: var("DISCORD_TOKEN").context("DISCORD_TOKEN no está definido")?,
            command_prefix: var("COMMAND_PREFIX").unwrap_or(defaults.command_prefix),
            owner_id: match var("OWNER_ID") {
                Some(raw) => Some(raw.trim().parse().context("OWNER_ID inválido")?),
                None => None,
            }
            .filter(|id| *id != 0),

            default_volume: var("DEFAULT_VOLUME")
                .unwrap_or_else(|| "0.5".to_string())
                .parse()
                .context("DEFAULT_VOLUME inválido")?,
            max_queue_size: var("MAX_QUEUE_SIZE")
                .unwrap_or_else(|| "500".to_string())
                .parse()
                .context("MAX_QUEUE_SIZE inválido")?,

            gemini_api_key: var("GEMINI_API_KEY"),
            gemini_model: var("GEMINI_MODEL").unwrap_or(defaults.gemini_model),
            chat_trigger: var("CHAT_TRIGGER")
                .unwrap_or(defaults.chat_trigger)
                .to_lowercase(),

            status_interval_secs: var("STATUS_INTERVAL_SECS")
                .unwrap_or_else(|| "15".to_string())
                .parse()
                .context("STATUS_INTERVAL_SECS inválido")?,
            status_text: var("STATUS_TEXT").unwrap_or(defaults.status_text),

            data_dir: var("DATA_DIR").map(PathBuf::from).unwrap_or(defaults.data_dir),
        })
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Volume must be between 0.0 and 2.0
    /// - The command prefix must not be empty or contain whitespace
    /// - Queue size and status interval must be greater than 0
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.default_volume) {
            anyhow::bail!(
                "Default volume must be between 0.0 and 2.0, got: {}",
                self.default_volume
            );
        }

        if self.command_prefix.is_empty() || self.command_prefix.chars().any(char::is_whitespace) {
            anyhow::bail!("Command prefix must be non-empty and without spaces");
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.status_interval_secs == 0 {
            anyhow::bail!("Status interval must be greater than 0");
        }

        Ok(())
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_secs(self.status_interval_secs)
    }

    pub fn chat_enabled(&self) -> bool {
        self.gemini_api_key.is_some()
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Tokens and API keys are never included.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Commands: prefix '{}' (owner: {})\n  \
            Audio: {}% vol, {} max queue\n  \
            Chat: {} (model {}, trigger '{}')\n  \
            Status: every {}s\n  \
            Data: {}",
            self.command_prefix,
            self.owner_id.map_or("none".to_string(), |id| id.to_string()),
            (self.default_volume * 100.0) as u32,
            self.max_queue_size,
            if self.chat_enabled() { "enabled" } else { "disabled" },
            self.gemini_model,
            self.chat_trigger,
            self.status_interval_secs,
            self.data_dir.display(),
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            discord_token: String::new(),
            command_prefix: ".".to_string(),
            owner_id: None,

            default_volume: 0.5,
            max_queue_size: 500,

            gemini_api_key: None,
            gemini_model: "gemini-1.5-flash".to_string(),
            chat_trigger: "cogsworth".to_string(),

            status_interval_secs: 15,
            status_text: "Developed by Mehdi".to_string(),

            data_dir: "data".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_apply() {
        let config = Config::from_lookup(lookup(&[("DISCORD_TOKEN", "abc")])).unwrap();
        assert_eq!(config.command_prefix, ".");
        assert_eq!(config.default_volume, 0.5);
        assert_eq!(config.owner_id, None);
        assert!(!config.chat_enabled());
        config.validate().unwrap();
    }

    #[test]
    fn test_missing_token_fails() {
        assert!(Config::from_lookup(lookup(&[])).is_err());
        assert!(Config::from_lookup(lookup(&[("DISCORD_TOKEN", "  ")])).is_err());
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("DISCORD_TOKEN", "abc"),
            ("COMMAND_PREFIX", "!"),
            ("OWNER_ID", "1234"),
            ("GEMINI_API_KEY", "key"),
            ("CHAT_TRIGGER", "Jarvis"),
            ("DEFAULT_VOLUME", "1.0"),
        ]))
        .unwrap();
        assert_eq!(config.command_prefix, "!");
        assert_eq!(config.owner_id, Some(1234));
        assert_eq!(config.chat_trigger, "jarvis");
        assert!(config.chat_enabled());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config {
            discord_token: "abc".into(),
            ..Default::default()
        };
        config.default_volume = 2.5;
        assert!(config.validate().is_err());

        config.default_volume = 1.0;
        config.command_prefix = "a b".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_summary_hides_secrets() {
        let config = Config {
            discord_token: "secret-token".into(),
            gemini_api_key: Some("secret-key".into()),
            ..Default::default()
        };
        let summary = config.summary();
        assert!(!summary.contains("secret"));
        assert!(summary.contains("Chat: enabled"));
    }
}
