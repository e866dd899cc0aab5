use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;

use crate::auth::roles::RolePolicy;

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub http_timeout: Duration,
    pub refresh_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub token_file: PathBuf,
    pub role_policy: RolePolicy,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig {
                base_url: "http://127.0.0.1:8000".into(),
                http_timeout: Duration::from_secs(30),
                refresh_timeout: Duration::from_secs(5),
            },
            token_file: PathBuf::from(".fitwork/session.json"),
            role_policy: RolePolicy::default(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();
        let api = ApiConfig {
            base_url: std::env::var("FITWORK_API_URL")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or(defaults.api.base_url),
            http_timeout: secs_from_env("FITWORK_HTTP_TIMEOUT_SECS")?
                .unwrap_or(defaults.api.http_timeout),
            refresh_timeout: secs_from_env("FITWORK_REFRESH_TIMEOUT_SECS")?
                .unwrap_or(defaults.api.refresh_timeout),
        };
        let token_file = std::env::var("FITWORK_TOKEN_FILE")
            .map(PathBuf::from)
            .unwrap_or(defaults.token_file);
        let role_policy = match std::env::var("FITWORK_ROLE_PRECEDENCE") {
            Ok(list) => RolePolicy::parse(&list).context("FITWORK_ROLE_PRECEDENCE")?,
            Err(_) => defaults.role_policy,
        };
        Ok(Self {
            api,
            token_file,
            role_policy,
        })
    }
}

fn secs_from_env(key: &str) -> anyhow::Result<Option<Duration>> {
    match std::env::var(key) {
        Ok(v) => {
            let secs = v
                .trim()
                .parse::<u64>()
                .with_context(|| format!("{key} must be a whole number of seconds"))?;
            anyhow::ensure!(secs > 0, "{key} must be greater than zero");
            Ok(Some(Duration::from_secs(secs)))
        }
        Err(_) => Ok(None),
    }
}
