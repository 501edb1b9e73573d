use crate::config::UnitConfig;
use crate::error::{Error, Result};
use crate::unit::{InitContext, Report, ResourceStrategy};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::{Duration, Instant};
use url::Url;

pub const DEFAULT_HEALTH_PATH: &str = "/health";

/// HTTP client bound to one API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base: Url,
    timeout: Duration,
}

impl ApiClient {
    pub fn base_url(&self) -> &Url {
        &self.base
    }
}

/// External HTTP API bring-up.
///
/// The probe only needs an HTTP answer of any status from `base_url`;
/// initialization requires `health_path` to answer with `expected_status`
/// (any 2xx when unset).
#[derive(Debug, Default, Clone, Copy)]
pub struct ExternalApiStrategy;

impl ExternalApiStrategy {
    pub fn new() -> Self {
        Self
    }
}

/// Validate that a URL is well-formed and uses HTTP/HTTPS scheme.
fn parse_base_url(raw: &str) -> std::result::Result<Url, String> {
    let parsed = Url::parse(raw).map_err(|e| format!("invalid base_url '{}': {}", raw, e))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        scheme => Err(format!(
            "invalid base_url '{}': scheme must be http or https, got '{}'",
            raw, scheme
        )),
    }
}

fn header_map(config: &UnitConfig) -> std::result::Result<HeaderMap, String> {
    let mut headers = HeaderMap::new();
    if !config.has("headers") {
        return Ok(headers);
    }
    let raw = config
        .string_map("headers")
        .ok_or_else(|| "'headers' must map header names to string values".to_string())?;
    for (name, value) in raw {
        let header = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| format!("invalid header name '{}'", name))?;
        let value = HeaderValue::from_str(&value)
            .map_err(|_| format!("invalid value for header '{}'", name))?;
        headers.insert(header, value);
    }
    Ok(headers)
}

fn expected_status(config: &UnitConfig) -> std::result::Result<Option<StatusCode>, String> {
    if !config.has("expected_status") {
        return Ok(None);
    }
    config
        .u64("expected_status")
        .and_then(|code| u16::try_from(code).ok())
        .and_then(|code| StatusCode::from_u16(code).ok())
        .map(Some)
        .ok_or_else(|| "'expected_status' must be an HTTP status code".to_string())
}

fn health_url(base: &Url, path: &str) -> Result<Url> {
    // Join relative to the base path, so "/api" + "/health" is "/api/health"
    let mut joined = base.clone();
    let prefix = base.path().trim_end_matches('/');
    joined.set_path(&format!("{}/{}", prefix, path.trim_start_matches('/')));
    if joined.scheme() != base.scheme() {
        return Err(Error::Protocol(format!("cannot join '{}' onto {}", path, base)));
    }
    Ok(joined)
}

#[async_trait]
impl ResourceStrategy for ExternalApiStrategy {
    type Handle = ApiClient;

    fn kind(&self) -> &'static str {
        "external_api"
    }

    fn required_keys(&self) -> &'static [&'static str] {
        &["base_url"]
    }

    fn validate(&self, config: &UnitConfig) -> Vec<String> {
        let mut problems = Vec::new();
        match config.str("base_url") {
            Some(raw) => {
                if let Err(problem) = parse_base_url(raw) {
                    problems.push(problem);
                }
            }
            None => problems.push("'base_url' must be a string".to_string()),
        }
        if config.has("health_path") && config.str("health_path").is_none() {
            problems.push("'health_path' must be a string".to_string());
        }
        if let Err(problem) = header_map(config) {
            problems.push(problem);
        }
        if let Err(problem) = expected_status(config) {
            problems.push(problem);
        }
        problems
    }

    async fn connect(&self, config: &UnitConfig, timeout: Duration) -> Result<ApiClient> {
        let raw = config
            .str("base_url")
            .ok_or_else(|| Error::Protocol("'base_url' is not set".to_string()))?;
        let base = parse_base_url(raw).map_err(Error::Protocol)?;
        let headers = header_map(config).map_err(Error::Protocol)?;

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;
        Ok(ApiClient {
            client,
            base,
            timeout,
        })
    }

    async fn probe(&self, api: &mut ApiClient) -> Result<()> {
        api.client
            .get(api.base.clone())
            .timeout(api.timeout)
            .send()
            .await?;
        Ok(())
    }

    async fn initialize(&self, api: &mut ApiClient, ctx: &InitContext<'_>) -> Result<Report> {
        let path = ctx.config.str("health_path").unwrap_or(DEFAULT_HEALTH_PATH);
        let url = health_url(&api.base, path)?;
        let expected = expected_status(ctx.config).map_err(Error::Protocol)?;

        let started = Instant::now();
        let response = api
            .client
            .get(url.clone())
            .timeout(api.timeout)
            .send()
            .await?;
        let latency = started.elapsed();
        let status = response.status();

        let accepted = match expected {
            Some(code) => status == code,
            None => status.is_success(),
        };
        if !accepted {
            return Err(Error::Protocol(format!(
                "GET {} returned {}, expected {}",
                url,
                status,
                expected.map_or_else(|| "2xx".to_string(), |c| c.as_u16().to_string())
            )));
        }

        let mut report = Report::new();
        report.insert("url".to_string(), Value::from(url.to_string()));
        report.insert("status".to_string(), Value::from(status.as_u16()));
        report.insert("latency_ms".to_string(), Value::from(latency.as_millis() as u64));
        Ok(report)
    }

    async fn cleanup(&self, _api: &mut ApiClient, _ctx: &InitContext<'_>) -> Result<()> {
        // A GET leaves nothing behind
        Ok(())
    }
}
