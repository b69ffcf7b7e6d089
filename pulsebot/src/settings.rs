use std::time::Duration;

use anyhow::{bail, Result};
use common::BotConfig;

pub const DEFAULT_API_BASE_URL: &str = "http://api:8000";
pub const DEFAULT_TOKEN_ENV: &str = "TELEGRAM_BOT_TOKEN";

/// Effective bot settings: command line and environment win over the config file
#[derive(Debug, Clone, PartialEq)]
pub struct BotSettings {
    pub api_base_url: String,
    pub token_env: String,
    pub report_interval: Duration,
    pub request_timeout: Duration,
}

impl BotSettings {
    pub fn resolve(
        file: Option<&BotConfig>,
        api_base_url: Option<String>,
        report_interval_hours: Option<u64>,
    ) -> Self {
        let hours = report_interval_hours
            .or_else(|| file.and_then(|f| f.report_interval_hours))
            .unwrap_or(12)
            .max(1);
        Self {
            api_base_url: api_base_url
                .or_else(|| file.and_then(|f| f.api_base_url.clone()))
                .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string()),
            token_env: file
                .and_then(|f| f.token_env.clone())
                .unwrap_or_else(|| DEFAULT_TOKEN_ENV.to_string()),
            report_interval: Duration::from_secs(hours * 60 * 60),
            request_timeout: Duration::from_secs(
                file.and_then(|f| f.request_timeout_seconds).unwrap_or(60),
            ),
        }
    }

    /// Read the bot token from the configured env var
    pub fn token(&self) -> Result<String> {
        match std::env::var(&self.token_env) {
            Ok(t) if !t.trim().is_empty() => Ok(t),
            _ => bail!("Please set the {} environment variable", self.token_env),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_config() {
        let s = BotSettings::resolve(None, None, None);
        assert_eq!(s.api_base_url, "http://api:8000");
        assert_eq!(s.token_env, "TELEGRAM_BOT_TOKEN");
        assert_eq!(s.report_interval, Duration::from_secs(12 * 3600));
        assert_eq!(s.request_timeout, Duration::from_secs(60));
    }

    #[test]
    fn overrides_beat_config_file() {
        let file = BotConfig {
            api_base_url: Some("http://localhost:8000".into()),
            token_env: Some("PULSE_TOKEN".into()),
            report_interval_hours: Some(6),
            request_timeout_seconds: Some(5),
        };
        let s = BotSettings::resolve(Some(&file), None, None);
        assert_eq!(s.api_base_url, "http://localhost:8000");
        assert_eq!(s.report_interval, Duration::from_secs(6 * 3600));

        let s = BotSettings::resolve(Some(&file), Some("http://api:9000".into()), Some(24));
        assert_eq!(s.api_base_url, "http://api:9000");
        assert_eq!(s.report_interval, Duration::from_secs(24 * 3600));
        assert_eq!(s.token_env, "PULSE_TOKEN");
    }

    #[test]
    fn missing_token_is_reported() {
        let s = BotSettings {
            token_env: "PULSEBOT_TEST_UNSET_TOKEN".into(),
            ..BotSettings::resolve(None, None, None)
        };
        let err = s.token().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Please set the PULSEBOT_TEST_UNSET_TOKEN environment variable"
        );
    }
}
