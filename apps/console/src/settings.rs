use std::{fs, path::Path, time::Duration};

use anyhow::{Context, Result};
use console_core::{textarea::TextareaSizing, ConflictPolicy, ViewletOptions};
use serde::Deserialize;
use tracing::warn;
use url::Url;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub api_url: Option<String>,
    pub log_filter: String,
    pub conflict_policy: ConflictPolicy,
    pub saved_highlight_ms: u64,
    pub reply_timeout_ms: u64,
    pub environment_latency_ms: u64,
    pub command_queue: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_url: None,
            log_filter: "info".into(),
            conflict_policy: ConflictPolicy::Preserve,
            saved_highlight_ms: 1000,
            reply_timeout_ms: 5000,
            environment_latency_ms: 0,
            command_queue: 256,
        }
    }
}

impl Settings {
    pub fn viewlet_options(&self) -> ViewletOptions {
        ViewletOptions {
            conflict_policy: self.conflict_policy,
            saved_highlight_delay: Duration::from_millis(self.saved_highlight_ms),
            textarea: TextareaSizing::default(),
        }
    }

    pub fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.reply_timeout_ms)
    }

    pub fn environment_latency(&self) -> Duration {
        Duration::from_millis(self.environment_latency_ms)
    }

    /// The remote environment url, if one is configured and parses.
    pub fn api_url(&self) -> Result<Option<Url>> {
        self.api_url
            .as_deref()
            .map(|raw| Url::parse(raw).with_context(|| format!("invalid api_url '{raw}'")))
            .transpose()
    }

    fn apply(&mut self, key: &str, value: &str) {
        let value = value.trim();
        match key {
            "api_url" => self.api_url = (!value.is_empty()).then(|| value.to_string()),
            "log_filter" => self.log_filter = value.to_string(),
            "conflict_policy" => match parse_policy(value) {
                Some(policy) => self.conflict_policy = policy,
                None => warn!(value, "unknown conflict_policy; keeping {:?}", self.conflict_policy),
            },
            "saved_highlight_ms" => parse_into(key, value, &mut self.saved_highlight_ms),
            "reply_timeout_ms" => parse_into(key, value, &mut self.reply_timeout_ms),
            "environment_latency_ms" => parse_into(key, value, &mut self.environment_latency_ms),
            "command_queue" => parse_into(key, value, &mut self.command_queue),
            _ => warn!(key, "ignoring unknown setting"),
        }
    }
}

fn parse_policy(value: &str) -> Option<ConflictPolicy> {
    match value.to_ascii_lowercase().as_str() {
        "preserve" => Some(ConflictPolicy::Preserve),
        "overwrite" => Some(ConflictPolicy::Overwrite),
        _ => None,
    }
}

fn parse_into<T: std::str::FromStr>(key: &str, value: &str, slot: &mut T) {
    match value.parse() {
        Ok(parsed) => *slot = parsed,
        Err(_) => warn!(key, value, "ignoring unparsable setting"),
    }
}

const KEYS: &[&str] = &[
    "api_url",
    "log_filter",
    "conflict_policy",
    "saved_highlight_ms",
    "reply_timeout_ms",
    "environment_latency_ms",
    "command_queue",
];

/// Defaults, then the settings file (when present), then `APP__*`
/// environment variables.
pub fn load_settings(path: &Path) -> Result<Settings> {
    let mut settings = if path.exists() {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read settings file '{}'", path.display()))?;
        from_toml(&raw).with_context(|| format!("invalid settings file '{}'", path.display()))?
    } else {
        Settings::default()
    };

    apply_env(&mut settings, |key| std::env::var(key).ok());
    settings.api_url()?;
    Ok(settings)
}

/// Keys missing from the file keep their defaults.
fn from_toml(raw: &str) -> Result<Settings> {
    Ok(toml::from_str(raw)?)
}

fn apply_env(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    for key in KEYS {
        if let Some(value) = lookup(&format!("APP__{}", key.to_ascii_uppercase())) {
            settings.apply(key, &value);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        env,
        time::{SystemTime, UNIX_EPOCH},
    };

    use super::*;

    #[test]
    fn file_values_override_defaults() {
        let settings = from_toml(
            r#"
api_url = "http://127.0.0.1:17070/api"
conflict_policy = "overwrite"
saved_highlight_ms = 250
"#,
        )
        .expect("settings file");

        assert_eq!(settings.conflict_policy, ConflictPolicy::Overwrite);
        assert_eq!(settings.saved_highlight_ms, 250);
        assert_eq!(
            settings.api_url().expect("url").map(|url| url.to_string()),
            Some("http://127.0.0.1:17070/api".to_string())
        );
        assert_eq!(settings.reply_timeout_ms, 5000);
    }

    #[test]
    fn env_overrides_file() {
        let mut settings = from_toml("reply_timeout_ms = 100\n").expect("settings file");
        let env = HashMap::from([
            ("APP__REPLY_TIMEOUT_MS".to_string(), "900".to_string()),
            ("APP__LOG_FILTER".to_string(), "debug".to_string()),
            ("APP__COMMAND_QUEUE".to_string(), "lots".to_string()),
        ]);
        apply_env(&mut settings, |key| env.get(key).cloned());

        assert_eq!(settings.reply_timeout_ms, 900);
        assert_eq!(settings.log_filter, "debug");
        assert_eq!(settings.command_queue, 256);
    }

    #[test]
    fn mistyped_file_values_are_errors() {
        assert!(from_toml("saved_highlight_ms = \"soon\"\n").is_err());
        assert!(from_toml("conflict_policy = \"merge\"\n").is_err());
        let settings = from_toml("command_queue = 8\nconflict_policy = \"preserve\"\n")
            .expect("settings file");
        assert_eq!(settings.command_queue, 8);
        assert_eq!(settings.conflict_policy, ConflictPolicy::Preserve);
        assert_eq!(settings.log_filter, "info");
    }

    #[test]
    fn invalid_api_url_is_rejected() {
        let settings = Settings {
            api_url: Some("not a url".into()),
            ..Settings::default()
        };
        assert!(settings.api_url().is_err());
    }

    #[test]
    fn missing_settings_file_yields_defaults() {
        let suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos();
        let path = env::temp_dir().join(format!("console_settings_missing_{suffix}.toml"));
        let settings = load_settings(&path).expect("load");
        assert_eq!(settings.viewlet_options().saved_highlight_delay, Duration::from_millis(1000));
    }
}
