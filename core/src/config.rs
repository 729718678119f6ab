//! Configuration management
use crate::error::{ChatError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";

/// Sync engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Gateway origin, without trailing slash (e.g. `https://panel.example.com`)
    pub base_url: String,

    /// Sent as `X-CSRFToken` on POST requests
    pub csrf_token: Option<String>,

    /// Timeout for REST calls (not applied to the push stream)
    pub request_timeout: Duration,

    /// First reconnect delay; doubled per failed attempt
    pub backoff_base: Duration,

    /// Upper bound for the reconnect delay
    pub backoff_max: Duration,

    /// Consecutive failures before fallback polling starts
    pub fallback_threshold: u32,

    /// Fallback polling period
    pub poll_interval: Duration,

    /// Quiet period before a read acknowledgement is sent
    pub read_ack_delay: Duration,

    /// Push session is considered dead after this long without any frame
    pub heartbeat_timeout: Option<Duration>,

    /// Max clock distance when matching an optimistic message to its echo
    pub optimistic_match_window: Duration,

    /// How many recently applied message ids the dispatcher remembers
    pub seen_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            csrf_token: None,
            request_timeout: Duration::from_secs(15),
            backoff_base: Duration::from_secs(1),
            backoff_max: Duration::from_secs(30),
            fallback_threshold: 5,
            poll_interval: Duration::from_secs(30),
            read_ack_delay: Duration::from_secs(2),
            heartbeat_timeout: Some(Duration::from_secs(90)),
            optimistic_match_window: Duration::from_secs(120),
            seen_capacity: 512,
        }
    }
}

impl Config {
    /// Create config from command line arguments and the process environment
    pub fn from_args(args: &[String]) -> Result<Self> {
        Self::from_args_with_env(args, |key| std::env::var(key).ok())
    }

    /// Same as [`Config::from_args`], reading the env overrides through `env`
    pub fn from_args_with_env<F>(args: &[String], env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();
        let mut base_url: Option<String> = None;

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--csrf-token" => {
                    let token = args.get(i + 1).ok_or_else(|| {
                        ChatError::Config("--csrf-token requires a value".to_string())
                    })?;
                    config.csrf_token = Some(token.clone());
                    i += 2;
                }
                "--poll-interval" => {
                    config.poll_interval = parse_secs(args.get(i + 1), "--poll-interval")?;
                    i += 2;
                }
                "--read-delay" => {
                    config.read_ack_delay = parse_secs(args.get(i + 1), "--read-delay")?;
                    i += 2;
                }
                "--no-heartbeat" => {
                    config.heartbeat_timeout = None;
                    i += 1;
                }
                other if other.starts_with("--") => {
                    return Err(ChatError::Config(format!(
                        "Unknown flag {}. Usage: {} [base_url] [--csrf-token <token>] [--poll-interval <secs>] [--read-delay <secs>] [--no-heartbeat]",
                        other,
                        args.first().map(String::as_str).unwrap_or("console")
                    )));
                }
                other => {
                    base_url = Some(other.to_string());
                    i += 1;
                }
            }
        }

        // Env overrides (nice for scripts)
        if let Some(url) = env("CHAT_SYNC_BASE_URL") {
            base_url = Some(url);
        }
        if let Some(token) = env("CHAT_SYNC_CSRF_TOKEN") {
            config.csrf_token = Some(token);
        }

        if let Some(url) = base_url {
            config.base_url = url.trim_end_matches('/').to_string();
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(ChatError::Config(format!(
                "base URL must start with http:// or https://, got {:?}",
                self.base_url
            )));
        }
        if self.fallback_threshold == 0 {
            return Err(ChatError::Config(
                "fallback threshold must be at least 1".to_string(),
            ));
        }
        if self.backoff_base.is_zero() || self.backoff_base > self.backoff_max {
            return Err(ChatError::Config(
                "backoff base must be non-zero and not exceed the backoff cap".to_string(),
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(ChatError::Config("poll interval must be non-zero".to_string()));
        }
        Ok(())
    }

    /// Absolute URL for a gateway path such as `/api/chat/list/`
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

fn parse_secs(value: Option<&String>, flag: &str) -> Result<Duration> {
    let raw = value.ok_or_else(|| ChatError::Config(format!("{} requires a value", flag)))?;
    let secs = raw
        .parse::<f64>()
        .ok()
        .filter(|s| s.is_finite() && *s > 0.0)
        .ok_or_else(|| ChatError::Config(format!("{} must be a positive number of seconds", flag)))?;
    Ok(Duration::from_secs_f64(secs))
}
