use std::{env, net::SocketAddr, time::Duration};

use reqwest::Url;

use crate::{error::HookError, hook::FailurePolicy};

const DEFAULT_TIMEOUT_SEC: u64 = 30;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub http_bind: SocketAddr,
    pub compliance: ComplianceConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let port = env::var("PORT").unwrap_or_else(|_| "8080".to_owned());
        let http_bind = env::var("HTTP_BIND").unwrap_or_else(|_| format!("0.0.0.0:{port}"));
        let http_bind = http_bind.parse()?;

        Ok(Self {
            http_bind,
            compliance: ComplianceConfig::from_env()?,
        })
    }
}

/// Where the compliance model lives and how to talk to it.
#[derive(Debug, Clone)]
pub struct ComplianceConfig {
    pub endpoint_url: Url,
    /// Sent as the target model and exempt from checking.
    pub model: String,
    pub api_key: Option<String>,
    pub allow_insecure_tls: bool,
    pub request_timeout: Duration,
    pub failure_policy: FailurePolicy,
}

impl ComplianceConfig {
    pub fn new(endpoint_url: &str, model: &str) -> Result<Self, HookError> {
        let endpoint_url = endpoint_url.trim();
        if endpoint_url.is_empty() {
            return Err(HookError::Config("COMPLIANCE_MODEL_URL is empty".to_owned()));
        }
        let model = model.trim();
        if model.is_empty() {
            return Err(HookError::Config("COMPLIANCE_MODEL is empty".to_owned()));
        }

        let endpoint_url = Url::parse(endpoint_url).map_err(|error| {
            HookError::Config(format!("COMPLIANCE_MODEL_URL is not a valid url: {error}"))
        })?;
        if !matches!(endpoint_url.scheme(), "http" | "https") {
            return Err(HookError::Config(format!(
                "COMPLIANCE_MODEL_URL must be http or https, got `{}`",
                endpoint_url.scheme()
            )));
        }

        Ok(Self {
            endpoint_url,
            model: model.to_owned(),
            api_key: None,
            allow_insecure_tls: false,
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SEC),
            failure_policy: FailurePolicy::default(),
        })
    }

    pub fn from_env() -> Result<Self, HookError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, HookError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let endpoint_url = lookup("COMPLIANCE_MODEL_URL").unwrap_or_default();
        let model = lookup("COMPLIANCE_MODEL").unwrap_or_default();
        let mut config = Self::new(&endpoint_url, &model)?;

        config.api_key = lookup("COMPLIANCE_MODEL_API_KEY").filter(|key| !key.trim().is_empty());
        config.allow_insecure_tls = lookup("COMPLIANCE_ALLOW_INSECURE_TLS")
            .map(|raw| parse_bool(&raw))
            .unwrap_or(false);
        config.request_timeout = Duration::from_secs(
            lookup("COMPLIANCE_TIMEOUT_SEC")
                .and_then(|raw| raw.trim().parse::<u64>().ok())
                .filter(|secs| *secs > 0)
                .unwrap_or(DEFAULT_TIMEOUT_SEC),
        );
        if let Some(raw) = lookup("COMPLIANCE_FAILURE_POLICY") {
            config.failure_policy = raw.parse()?;
        }

        Ok(config)
    }
}

fn parse_bool(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
