use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::crm::salesforce::{
    SalesforceSettings, DEFAULT_API_VERSION, DEFAULT_LOGIN_URL, DEFAULT_OBJECT,
};
use crate::explain::ExplainerConfig;
use crate::mail::SmtpSettings;
use crate::scoring::pipeline::DEFAULT_LOW_CONFIDENCE_THRESHOLD;

/// Upload ceiling for single resumes and bulk archives.
const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub rust_log: String,
    pub model_path: PathBuf,
    pub vectorizer_path: PathBuf,
    pub report_path: PathBuf,
    pub max_upload_bytes: usize,
    pub salesforce: SalesforceSettings,
    /// `None` unless `MAIL_USERNAME` and `MAIL_PASSWORD` are both set.
    pub mail: Option<SmtpSettings>,
    pub explainer: ExplainerConfig,
    pub low_confidence_threshold: f64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key → value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);
        let defaults = ExplainerConfig::default();

        let explainer = ExplainerConfig {
            num_features: env.parse_or("EXPLAIN_NUM_FEATURES", defaults.num_features)?,
            num_samples: env.parse_or("EXPLAIN_NUM_SAMPLES", defaults.num_samples)?,
            seed: env.parse_or("EXPLAIN_SEED", defaults.seed)?,
            timeout: Duration::from_secs(
                env.parse_or("EXPLAIN_TIMEOUT_SECS", defaults.timeout.as_secs())?,
            ),
            workers: env.parse_or("EXPLAIN_WORKERS", defaults.workers)?,
            kernel_width: defaults.kernel_width,
            max_words: env.parse_or("EXPLAIN_MAX_WORDS", defaults.max_words)?,
            max_vocabulary: env.parse_or("EXPLAIN_MAX_VOCABULARY", defaults.max_vocabulary)?,
        };
        anyhow::ensure!(
            explainer.num_features > 0,
            "EXPLAIN_NUM_FEATURES must be at least 1"
        );
        anyhow::ensure!(
            explainer.num_samples >= 2,
            "EXPLAIN_NUM_SAMPLES must be at least 2"
        );
        anyhow::ensure!(
            explainer.max_vocabulary >= 2,
            "EXPLAIN_MAX_VOCABULARY must be at least 2"
        );
        anyhow::ensure!(
            explainer.max_words >= explainer.max_vocabulary,
            "EXPLAIN_MAX_WORDS must not be below EXPLAIN_MAX_VOCABULARY"
        );

        let low_confidence_threshold =
            env.parse_or("LOW_CONFIDENCE_THRESHOLD", DEFAULT_LOW_CONFIDENCE_THRESHOLD)?;
        anyhow::ensure!(
            (0.0..=1.0).contains(&low_confidence_threshold),
            "LOW_CONFIDENCE_THRESHOLD must be within [0, 1]"
        );

        let mail = match (env.get("MAIL_USERNAME"), env.get("MAIL_PASSWORD")) {
            (Some(username), Some(password)) => Some(SmtpSettings {
                host: env.or("MAIL_HOST", "smtp.gmail.com"),
                port: env.parse_or("MAIL_PORT", 587)?,
                from: env.get("MAIL_FROM").unwrap_or_else(|| username.clone()),
                username,
                password,
            }),
            _ => None,
        };

        Ok(Config {
            port: env.parse_or("PORT", 8080)?,
            rust_log: env.or("RUST_LOG", "info"),
            model_path: env.or("MODEL_PATH", "model/hiring_model.json").into(),
            vectorizer_path: env
                .or("VECTORIZER_PATH", "model/tfidf_vectorizer.json")
                .into(),
            report_path: env.or("REPORT_PATH", "powerbi/hiring_insights.csv").into(),
            max_upload_bytes: MAX_UPLOAD_BYTES,
            salesforce: SalesforceSettings {
                login_url: env.or("SF_LOGIN_URL", DEFAULT_LOGIN_URL),
                api_version: env.or("SF_API_VERSION", DEFAULT_API_VERSION),
                object: env.or("SF_OBJECT", DEFAULT_OBJECT),
                client_id: env.require("SF_CLIENT_ID")?,
                client_secret: env.require("SF_CLIENT_SECRET")?,
                username: env.require("SF_USERNAME")?,
                password: env.require("SF_PASSWORD")?,
                security_token: env.require("SF_TOKEN")?,
            },
            mail,
            explainer,
            low_confidence_threshold,
        })
    }
}

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Set and non-blank.
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn require(&self, key: &str) -> Result<String> {
        self.get(key)
            .with_context(|| format!("Required environment variable '{key}' is not set"))
    }

    fn parse_or<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        match self.get(key) {
            Some(raw) => raw
                .trim()
                .parse::<T>()
                .with_context(|| format!("{key} has an invalid value '{raw}'")),
            None => Ok(default),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(extra: &[(&str, &str)]) -> Result<Config> {
        let mut vars: HashMap<String, String> = [
            ("SF_USERNAME", "hr@example.com"),
            ("SF_PASSWORD", "pw"),
            ("SF_TOKEN", "tok"),
            ("SF_CLIENT_ID", "cid"),
            ("SF_CLIENT_SECRET", "secret"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        for (k, v) in extra {
            vars.insert(k.to_string(), v.to_string());
        }
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.rust_log, "info");
        assert_eq!(config.model_path, PathBuf::from("model/hiring_model.json"));
        assert_eq!(config.report_path, PathBuf::from("powerbi/hiring_insights.csv"));
        assert_eq!(config.salesforce.object, "Candidate__c");
        assert_eq!(config.salesforce.login_url, DEFAULT_LOGIN_URL);
        assert!(config.mail.is_none());
        assert_eq!(config.explainer.num_samples, 1000);
        assert_eq!(config.explainer.seed, 42);
        assert_eq!(config.explainer.timeout, Duration::from_secs(20));
        assert_eq!(config.explainer.max_words, 5000);
        assert_eq!(config.explainer.max_vocabulary, 300);
        assert_eq!(config.low_confidence_threshold, 0.2);
    }

    #[test]
    fn test_missing_required_variable_is_error() {
        let err = Config::from_lookup(|_| None).unwrap_err();
        assert!(err.to_string().contains("is not set"));
    }

    #[test]
    fn test_mail_enabled_with_credentials() {
        let config = config(&[
            ("MAIL_USERNAME", "hr@example.com"),
            ("MAIL_PASSWORD", "app-password"),
            ("MAIL_PORT", "2525"),
        ])
        .unwrap();
        let mail = config.mail.unwrap();
        assert_eq!(mail.host, "smtp.gmail.com");
        assert_eq!(mail.port, 2525);
        assert_eq!(mail.from, "hr@example.com");
    }

    #[test]
    fn test_overrides_and_invalid_numbers() {
        let config = config(&[
            ("EXPLAIN_NUM_SAMPLES", "250"),
            ("LOW_CONFIDENCE_THRESHOLD", "0.35"),
            ("PORT", "9000"),
        ])
        .unwrap();
        assert_eq!(config.explainer.num_samples, 250);
        assert_eq!(config.low_confidence_threshold, 0.35);
        assert_eq!(config.port, 9000);

        assert!(config_err("PORT", "eighty"));
        assert!(config_err("LOW_CONFIDENCE_THRESHOLD", "1.5"));
        assert!(config_err("EXPLAIN_NUM_SAMPLES", "1"));
        assert!(config_err("EXPLAIN_MAX_VOCABULARY", "1"));
        assert!(config_err("EXPLAIN_MAX_WORDS", "10"));
    }

    fn config_err(key: &str, value: &str) -> bool {
        config(&[(key, value)]).is_err()
    }
}
